#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP transport for the `StudyMate` API client
//!
//! This crate provides a hyper-based HTTP client with:
//! - Automatic TLS via rustls (HTTPS only by default)
//! - Connection pooling
//! - Per-attempt timeouts
//! - User-Agent header injection
//! - Transparent response decompression (gzip, brotli, deflate)
//! - A single pluggable authentication layer (see [`HttpClientBuilder::with_auth_layer`])
//!
//! `send()` resolves to `Ok` for every HTTP status. Non-2xx responses only turn
//! into [`HttpError::HttpStatus`] through [`HttpResponse::error_for_status`] or
//! the checked body readers, so middleware above the transport can inspect
//! the status (for example to detect an expired session) before callers do.
//!
//! # Example
//!
//! ```ignore
//! use studymate_http::HttpClient;
//! use std::time::Duration;
//!
//! let client = HttpClient::builder()
//!     .timeout(Duration::from_secs(10))
//!     .build()?;
//!
//! let tasks: Vec<Task> = client
//!     .get("https://api.studymate.example/mentee/tasks")
//!     .send()
//!     .await?
//!     .json()
//!     .await?;
//! ```

mod builder;
mod client;
mod config;
mod error;
mod layers;
mod request;
mod response;
pub mod security;
mod tls;

pub use builder::{HttpClientBuilder, InnerService};
pub use client::HttpClient;
pub use config::{DEFAULT_USER_AGENT, HttpClientConfig, TlsRootConfig, TransportSecurity};
pub use error::{HttpError, InvalidUriKind};
pub use layers::{UserAgentLayer, UserAgentService};
pub use request::RequestBuilder;
pub use response::{HttpResponse, ResponseBody};

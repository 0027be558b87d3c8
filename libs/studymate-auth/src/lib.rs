#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Session authentication for the `StudyMate` API client.
//!
//! The centrepiece is the authenticated request gateway: a tower layer that
//! attaches the session's bearer token to every outbound request, treats
//! configured statuses (401 and 403 by default) as an expired session, runs a
//! single shared refresh for all concurrently failing requests and replays
//! them in arrival order once the new token is in the session store.
//!
//! ```ignore
//! let auth = Authenticator::new(auth_config, HttpClientConfig::auth_endpoint())?;
//! auth.login(&LoginRequest::new("mentee1", SecretString::new("pw"))).await?;
//! let api = auth.api_client(HttpClientConfig::default())?;
//! let tasks = api.get("https://api.studymate.example/mentee/tasks").send().await?;
//! ```

pub mod authenticator;
pub mod backend;
pub mod builder_ext;
pub mod classify;
pub mod config;
pub mod coordinator;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod secret;
pub mod session;

pub use authenticator::Authenticator;
pub use backend::{AuthBackend, CookieJar, LoginRequest};
pub use builder_ext::HttpClientBuilderExt;
pub use classify::{ExpiryPolicy, FailureKind};
pub use config::AuthConfig;
pub use coordinator::{RefreshClient, RefreshCoordinator, RefreshPhase};
pub use credential::{Credential, IssuedCredential, Role};
pub use error::{AuthError, format_http_error};
pub use gateway::{AuthGatewayLayer, AuthGatewayService, Replayed, refresh_failure};
pub use secret::{REDACTED, SecretString};
pub use session::{InMemorySessionStore, SessionStore};

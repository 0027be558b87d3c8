use std::future::Future;
use std::pin::Pin;
use std::task::Poll;

use bytes::Bytes;
use http::{Method, Request, Response};
use http_body_util::Full;
use tower::Service;
use tower::buffer::Buffer;

use crate::builder::HttpClientBuilder;
use crate::config::TransportSecurity;
use crate::error::HttpError;
use crate::request::RequestBuilder;
use crate::response::ResponseBody;

pub type ServiceFuture =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>>;

/// Handle to the buffer worker; cloning it is cheap.
pub type BufferedService = Buffer<Request<Full<Bytes>>, ServiceFuture>;

/// Client for the `StudyMate` API.
///
/// Clones share one buffer worker and one connection pool, so a client can
/// be stored in an `Arc` or cloned into tasks freely.
#[derive(Clone)]
pub struct HttpClient {
    pub(crate) service: BufferedService,
    pub(crate) max_body_size: usize,
    pub(crate) transport_security: TransportSecurity,
}

impl HttpClient {
    /// Client with default settings and no authentication.
    ///
    /// # Errors
    ///
    /// Same as [`HttpClientBuilder::build`].
    pub fn new() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// `url` must be absolute. Scheme and host are checked on send.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        RequestBuilder::new(
            self.service.clone(),
            self.max_body_size,
            method,
            url.to_owned(),
            self.transport_security,
        )
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: &str) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    pub fn patch(&self, url: &str) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }
}

/// Unbox an error coming out of the buffer.
///
/// Errors produced by the stack are `HttpError`s boxed by tower. Anything
/// else means the worker has shut down.
pub fn map_buffer_error(err: tower::BoxError) -> HttpError {
    err.downcast::<HttpError>().map_or_else(
        |err| {
            tracing::error!(error = %err, "request buffer worker has stopped");
            HttpError::ServiceClosed
        },
        |typed| *typed,
    )
}

/// Claim a buffer slot or fail with `Overloaded` straight away.
pub async fn try_acquire_buffer_slot(service: &mut BufferedService) -> Result<(), HttpError> {
    let ready = std::future::poll_fn(|cx| Poll::Ready(service.poll_ready(cx))).await;
    match ready {
        Poll::Ready(Ok(())) => Ok(()),
        Poll::Ready(Err(e)) => Err(map_buffer_error(e)),
        Poll::Pending => Err(HttpError::Overloaded),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::io::Write;

    fn test_client() -> HttpClient {
        HttpClientBuilder::new().allow_insecure_http().build().unwrap()
    }

    #[tokio::test]
    async fn get_returns_ok_for_every_status() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/mentee/tasks");
            then.status(403);
        });

        let resp = test_client()
            .get(&server.url("/mentee/tasks"))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn post_json_sets_content_type() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST)
                .path("/mentee/tasks")
                .header("content-type", "application/json")
                .json_body(json!({"title": "Solve 20 problems"}));
            then.status(201).json_body(json!({"id": 7}));
        });

        let resp = test_client()
            .post(&server.url("/mentee/tasks"))
            .json(&json!({"title": "Solve 20 problems"}))
            .unwrap()
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), http::StatusCode::CREATED);
        m.assert();
    }

    #[tokio::test]
    async fn default_user_agent_is_sent() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET)
                .path("/ping")
                .header("user-agent", crate::DEFAULT_USER_AGENT);
            then.status(200);
        });

        test_client()
            .get(&server.url("/ping"))
            .send()
            .await
            .unwrap();
        m.assert();
    }

    #[tokio::test]
    async fn gzip_response_is_decompressed() {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(br#"{"feedback":"good work"}"#).unwrap();
        let compressed = encoder.finish().unwrap();

        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/feedback/1");
            then.status(200)
                .header("content-type", "application/json")
                .header("content-encoding", "gzip")
                .body(compressed);
        });

        let body: serde_json::Value = test_client()
            .get(&server.url("/feedback/1"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["feedback"], "good work");
    }

    #[tokio::test]
    async fn http_url_rejected_when_tls_only() {
        let client = HttpClientBuilder::new().build().unwrap();
        let err = client
            .get("http://localhost:1/never")
            .send()
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidScheme { .. }));
    }

    #[test]
    fn client_is_send_sync_clone() {
        fn assert_traits<T: Send + Sync + Clone>() {}
        assert_traits::<HttpClient>();
    }
}

use crate::error::HttpError;
use crate::security::ERROR_BODY_PREVIEW_LIMIT;
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;

/// Boxed response body (raw or decompressed).
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// HTTP response wrapper with body-reading helpers
///
/// - `resp.error_for_status()?` - check status without reading the body
/// - `resp.bytes().await?` - raw bytes, any status
/// - `resp.checked_bytes().await?` - bytes, non-2xx becomes an error
/// - `resp.json::<T>().await?` / `resp.text().await?` - checked and decoded
///
/// Every body read enforces the configured `max_body_size`.
#[derive(Debug)]
pub struct HttpResponse {
    pub(crate) inner: Response<ResponseBody>,
    pub(crate) max_body_size: usize,
}

impl HttpResponse {
    /// Response status code
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// Response headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Consume the wrapper and return the inner response
    #[must_use]
    pub fn into_inner(self) -> Response<ResponseBody> {
        self.inner
    }

    /// Return an error for non-2xx responses without reading the body
    ///
    /// # Errors
    ///
    /// Returns `HttpError::HttpStatus` (with an empty preview) if the status is not 2xx.
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.inner.status().is_success() {
            return Ok(self);
        }
        Err(HttpError::HttpStatus {
            status: self.inner.status(),
            body_preview: String::new(),
            content_type: content_type(self.inner.headers()),
        })
    }

    /// Read the body without a status check
    ///
    /// # Errors
    /// Returns `HttpError::BodyTooLarge` if the body exceeds the limit.
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        read_limited(self.inner.into_body(), self.max_body_size).await
    }

    /// Read the body, turning non-2xx responses into `HttpError::HttpStatus`
    ///
    /// The error carries up to [`ERROR_BODY_PREVIEW_LIMIT`] bytes of the body.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` if status is not 2xx.
    /// Returns `HttpError::BodyTooLarge` if the body exceeds the limit.
    pub async fn checked_bytes(self) -> Result<Bytes, HttpError> {
        let status = self.inner.status();
        if status.is_success() {
            return self.bytes().await;
        }

        let content_type = content_type(self.inner.headers());
        let preview_limit = ERROR_BODY_PREVIEW_LIMIT.min(self.max_body_size);
        let body_preview = match read_limited(self.inner.into_body(), preview_limit).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(HttpError::BodyTooLarge { .. }) => "<error body too large>".to_owned(),
            Err(e) => return Err(e),
        };

        Err(HttpError::HttpStatus {
            status,
            body_preview,
            content_type,
        })
    }

    /// Parse the body as JSON with status check
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` if status is not 2xx.
    /// Returns `HttpError::BodyTooLarge` if the body exceeds the limit.
    /// Returns `HttpError::Json` if parsing fails.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        let body = self.checked_bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Read the body as UTF-8 text (lossy) with status check
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` if status is not 2xx.
    /// Returns `HttpError::BodyTooLarge` if the body exceeds the limit.
    pub async fn text(self) -> Result<String, HttpError> {
        let body = self.checked_bytes().await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Collect a body, failing as soon as more than `limit` bytes arrive.
async fn read_limited(mut body: ResponseBody, limit: usize) -> Result<Bytes, HttpError> {
    let mut buf = BytesMut::new();
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Ok(data) = frame.into_data() {
            let actual = buf.len() + data.len();
            if actual > limit {
                return Err(HttpError::BodyTooLarge { limit, actual });
            }
            buf.extend_from_slice(&data);
        }
    }
    Ok(buf.freeze())
}

use thiserror::Error;

/// Why a URL was rejected before sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    ParseError,
    /// No host, e.g. a relative path such as `/mentee/tasks`
    MissingAuthority,
    MissingScheme,
}

/// Errors from building, sending or reading a request.
///
/// An HTTP status is only an error once the caller asks for it through
/// [`HttpResponse::error_for_status`](crate::HttpResponse::error_for_status)
/// or a checked body reader.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    #[error("request build failed: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// One attempt exceeded the configured timeout. A replay gets its own.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Connection, protocol or body stream failure
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("TLS setup failed: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("response body exceeds {limit} bytes (got {actual})")]
    BodyTooLarge { limit: usize, actual: usize },

    /// Non-2xx status. `body_preview` is truncated and meant for logs.
    #[error("HTTP {status}: {body_preview}")]
    HttpStatus {
        status: http::StatusCode,
        body_preview: String,
        content_type: Option<String>,
    },

    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("form encode failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    /// The request buffer was full; nothing was sent.
    #[error("client overloaded: request buffer full")]
    Overloaded,

    /// The buffer worker is gone; the client can no longer send.
    #[error("client closed")]
    ServiceClosed,

    /// Match on `kind`; `reason` is free text for logs.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUri {
        url: String,
        kind: InvalidUriKind,
        reason: String,
    },

    /// Scheme not allowed by the client's [`TransportSecurity`](crate::TransportSecurity).
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme { scheme: String, reason: String },

    /// The session could not be refreshed and was signed out. The source is
    /// the authentication layer's error.
    #[error("session expired: {0}")]
    SessionExpired(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl HttpError {
    /// HTTP status carried by this error, if it is an [`HttpError::HttpStatus`].
    #[must_use]
    pub fn status(&self) -> Option<http::StatusCode> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

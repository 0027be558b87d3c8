use studymate_http::HttpError;
use thiserror::Error;

/// Errors from login, refresh and logout.
///
/// `Clone` so one refresh outcome can be handed to every queued request.
/// Messages never contain tokens, passwords or response bodies.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Transport or status failure, rendered by [`format_http_error`].
    #[error("{0}")]
    Http(String),

    /// The backend answered 2xx with a payload that is not a credential.
    #[error("invalid auth response: {0}")]
    InvalidResponse(String),

    #[error("auth config error: {0}")]
    Config(String),

    /// The refresh cycle ended without producing an outcome.
    #[error("session refresh interrupted")]
    Interrupted,

    /// The session was signed out or replaced while the refresh was running.
    #[error("session ended during refresh")]
    SignedOut,
}

/// Render an [`HttpError`] with a context prefix.
///
/// Status errors carry only the status code; the body preview is dropped so
/// backend diagnostics do not leak into logs.
#[must_use]
pub fn format_http_error(e: &HttpError, prefix: &str) -> String {
    match e {
        HttpError::HttpStatus { status, .. } => format!("{prefix} HTTP {status}"),
        HttpError::Json(err) => format!("{prefix} JSON parse failed: {err}"),
        HttpError::Timeout(duration) => {
            format!("{prefix} request timed out after {}ms", duration.as_millis())
        }
        HttpError::Transport(err) => format!("{prefix} transport error: {err}"),
        HttpError::BodyTooLarge { limit, actual } => {
            format!("{prefix} response too large: limit {limit} bytes, got {actual} bytes")
        }
        HttpError::Tls(err) => format!("{prefix} TLS error: {err}"),
        HttpError::RequestBuild(err) => format!("{prefix} request build failed: {err}"),
        HttpError::InvalidHeaderName(err) => format!("{prefix} invalid header name: {err}"),
        HttpError::InvalidHeaderValue(err) => format!("{prefix} invalid header value: {err}"),
        HttpError::FormEncode(err) => format!("{prefix} form encode error: {err}"),
        HttpError::Overloaded => format!("{prefix} request rejected: service overloaded"),
        HttpError::ServiceClosed => format!("{prefix} service unavailable"),
        HttpError::InvalidUri { url, reason, .. } => {
            format!("{prefix} invalid URL '{url}': {reason}")
        }
        HttpError::InvalidScheme { scheme, reason } => {
            format!("{prefix} invalid scheme '{scheme}': {reason}")
        }
        HttpError::SessionExpired(err) => format!("{prefix} session expired: {err}"),
        _ => format!("{prefix} request failed"),
    }
}

//! Failure classification at the gateway boundary.
//!
//! Every response or error is classified once; the rest of the gateway only
//! looks at the resulting [`FailureKind`].

use http::{Response, StatusCode};
use studymate_http::HttpError;

/// How a failed attempt is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Credentials were rejected; refresh and replay.
    Expired,
    /// Worth retrying at a higher level; propagated unchanged.
    Transient,
    /// Propagated unchanged.
    Fatal,
}

/// Set of statuses that mean "the session expired".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryPolicy {
    statuses: Vec<StatusCode>,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            statuses: vec![StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN],
        }
    }
}

impl ExpiryPolicy {
    #[must_use]
    pub fn new(statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        let mut statuses: Vec<StatusCode> = statuses.into_iter().collect();
        statuses.sort_unstable();
        statuses.dedup();
        Self { statuses }
    }

    #[must_use]
    pub fn statuses(&self) -> &[StatusCode] {
        &self.statuses
    }

    #[must_use]
    pub fn is_expiry(&self, status: StatusCode) -> bool {
        self.statuses.contains(&status)
    }

    /// Classify the outcome of one attempt. `None` means success.
    #[must_use]
    pub fn classify<B>(&self, outcome: &Result<Response<B>, HttpError>) -> Option<FailureKind> {
        match outcome {
            Ok(response) => self.classify_status(response.status()),
            Err(HttpError::HttpStatus { status, .. }) => {
                Some(self.classify_status(*status).unwrap_or(FailureKind::Fatal))
            }
            Err(
                HttpError::Timeout(_)
                | HttpError::Transport(_)
                | HttpError::Overloaded
                | HttpError::ServiceClosed,
            ) => Some(FailureKind::Transient),
            Err(_) => Some(FailureKind::Fatal),
        }
    }

    fn classify_status(&self, status: StatusCode) -> Option<FailureKind> {
        if status.is_success() || status.is_informational() || status.is_redirection() {
            None
        } else if self.is_expiry(status) {
            Some(FailureKind::Expired)
        } else if status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            Some(FailureKind::Transient)
        } else {
            Some(FailureKind::Fatal)
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn status(code: u16) -> Result<Response<()>, HttpError> {
        Ok(Response::builder().status(code).body(()).unwrap())
    }

    #[test]
    fn default_policy_treats_401_and_403_alike() {
        let policy = ExpiryPolicy::default();
        assert_eq!(policy.classify(&status(401)), Some(FailureKind::Expired));
        assert_eq!(policy.classify(&status(403)), Some(FailureKind::Expired));
    }

    #[test]
    fn success_and_redirects_are_not_failures() {
        let policy = ExpiryPolicy::default();
        assert_eq!(policy.classify(&status(200)), None);
        assert_eq!(policy.classify(&status(204)), None);
        assert_eq!(policy.classify(&status(304)), None);
    }

    #[test]
    fn server_errors_are_transient() {
        let policy = ExpiryPolicy::default();
        for code in [408, 429, 500, 502, 503] {
            assert_eq!(
                policy.classify(&status(code)),
                Some(FailureKind::Transient),
                "{code}"
            );
        }
    }

    #[test]
    fn other_client_errors_are_fatal() {
        let policy = ExpiryPolicy::default();
        assert_eq!(policy.classify(&status(400)), Some(FailureKind::Fatal));
        assert_eq!(policy.classify(&status(404)), Some(FailureKind::Fatal));
    }

    #[test]
    fn custom_policy_narrows_expiry() {
        let policy = ExpiryPolicy::new([StatusCode::UNAUTHORIZED]);
        assert_eq!(policy.classify(&status(401)), Some(FailureKind::Expired));
        assert_eq!(policy.classify(&status(403)), Some(FailureKind::Fatal));
    }

    #[test]
    fn errors_are_classified() {
        let policy = ExpiryPolicy::default();
        let timeout: Result<Response<()>, _> = Err(HttpError::Timeout(Duration::from_secs(1)));
        assert_eq!(policy.classify(&timeout), Some(FailureKind::Transient));

        let overloaded: Result<Response<()>, _> = Err(HttpError::Overloaded);
        assert_eq!(policy.classify(&overloaded), Some(FailureKind::Transient));

        let forbidden: Result<Response<()>, _> = Err(HttpError::HttpStatus {
            status: StatusCode::FORBIDDEN,
            body_preview: String::new(),
            content_type: None,
        });
        assert_eq!(policy.classify(&forbidden), Some(FailureKind::Expired));

        let scheme: Result<Response<()>, _> = Err(HttpError::InvalidScheme {
            scheme: "ftp".into(),
            reason: "unsupported".into(),
        });
        assert_eq!(policy.classify(&scheme), Some(FailureKind::Fatal));
    }
}

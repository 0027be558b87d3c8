use http::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::classify::ExpiryPolicy;
use crate::error::AuthError;

/// Authentication endpoints and expiry detection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Absolute base URL of the backend, e.g. `https://api.studymate.example`.
    pub base_url: String,
    pub login_path: String,
    pub refresh_path: String,
    pub logout_path: String,
    /// Statuses that mean "session expired". Must be 4xx codes.
    pub expiry_statuses: Vec<u16>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_owned(),
            login_path: "/auth/login".to_owned(),
            refresh_path: "/auth/refresh".to_owned(),
            logout_path: "/auth/logout".to_owned(),
            expiry_statuses: vec![401, 403],
        }
    }
}

impl AuthConfig {
    /// Config for the given base URL with default paths.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Check that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if:
    /// - `base_url` is not an absolute `http`/`https` URL,
    /// - a path does not start with `/`,
    /// - `expiry_statuses` is empty or holds a code outside 400..=499.
    pub fn validate(&self) -> Result<(), AuthError> {
        let base = Url::parse(&self.base_url).map_err(|e| {
            AuthError::Config(format!("base_url '{}' is not absolute: {e}", self.base_url))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(AuthError::Config(format!(
                "base_url scheme '{}' is not http or https",
                base.scheme()
            )));
        }

        for (name, path) in [
            ("login_path", &self.login_path),
            ("refresh_path", &self.refresh_path),
            ("logout_path", &self.logout_path),
        ] {
            if !path.starts_with('/') {
                return Err(AuthError::Config(format!(
                    "{name} '{path}' must start with '/'"
                )));
            }
        }

        if self.expiry_statuses.is_empty() {
            return Err(AuthError::Config(
                "expiry_statuses must not be empty".into(),
            ));
        }
        if let Some(code) = self
            .expiry_statuses
            .iter()
            .find(|code| !(400..=499).contains(*code))
        {
            return Err(AuthError::Config(format!(
                "expiry status {code} is not a 4xx client error"
            )));
        }
        Ok(())
    }

    /// Absolute URL for an auth path. The path is appended to the base URL,
    /// so a base with a path prefix keeps it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the joined URL does not parse.
    pub fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        let joined = format!("{}{path}", self.base_url.trim_end_matches('/'));
        Url::parse(&joined)
            .map_err(|e| AuthError::Config(format!("invalid endpoint URL '{joined}': {e}")))
    }

    /// Expiry policy built from `expiry_statuses`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] for codes `http` cannot represent.
    pub fn expiry_policy(&self) -> Result<ExpiryPolicy, AuthError> {
        let statuses = self
            .expiry_statuses
            .iter()
            .map(|code| {
                StatusCode::from_u16(*code)
                    .map_err(|e| AuthError::Config(format!("expiry status {code}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ExpiryPolicy::new(statuses))
    }
}

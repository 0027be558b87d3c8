//! Layered application configuration.
//!
//! Order (later wins): built-in defaults, YAML file, `STUDYMATE__*`
//! environment variables (`__` separates nested keys, e.g.
//! `STUDYMATE__API__TIMEOUT=5s`).

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::{Deserialize, Serialize, Serializer};
use studymate_auth::{AuthConfig, REDACTED, SecretString};
use studymate_http::{HttpClientConfig, TlsRootConfig, TransportSecurity};

pub const ENV_PREFIX: &str = "STUDYMATE__";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub login: LoginConfig,
    pub logging: LoggingConfig,
}

/// API endpoint and HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub max_body_size: usize,
    pub buffer_capacity: usize,
    /// Trust the OS certificate store instead of the bundled roots.
    pub native_roots: bool,
    /// Accept plain `http://` URLs. Local development only.
    pub allow_insecure_http: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let http = HttpClientConfig::default();
        Self {
            base_url: "http://localhost:8080".to_owned(),
            timeout: http.request_timeout,
            user_agent: None,
            max_body_size: http.max_body_size,
            buffer_capacity: http.buffer_capacity,
            native_roots: false,
            allow_insecure_http: false,
        }
    }
}

impl ApiConfig {
    fn transport(&self) -> TransportSecurity {
        if self.allow_insecure_http {
            TransportSecurity::AllowInsecureHttp
        } else {
            TransportSecurity::TlsOnly
        }
    }

    fn tls_roots(&self) -> TlsRootConfig {
        if self.native_roots {
            TlsRootConfig::Native
        } else {
            TlsRootConfig::WebPki
        }
    }

    /// Client settings for API calls.
    #[must_use]
    pub fn http_config(&self) -> HttpClientConfig {
        let mut config = HttpClientConfig {
            request_timeout: self.timeout,
            max_body_size: self.max_body_size,
            buffer_capacity: self.buffer_capacity.max(1),
            transport: self.transport(),
            tls_roots: self.tls_roots(),
            ..HttpClientConfig::default()
        };
        if let Some(ua) = &self.user_agent {
            config.user_agent.clone_from(ua);
        }
        config
    }

    /// Client settings for the authentication endpoints; shares transport
    /// and trust settings with the API client.
    #[must_use]
    pub fn auth_http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            transport: self.transport(),
            tls_roots: self.tls_roots(),
            ..HttpClientConfig::auth_endpoint()
        }
    }

    /// Absolute URL for an API path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_owned();
        }
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoginConfig {
    pub username: Option<String>,
    #[serde(serialize_with = "redacted")]
    pub password: Option<SecretString>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `warn` or `studymate_auth=debug`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_owned(),
            format: LogFormat::Text,
        }
    }
}

impl AppConfig {
    /// Load defaults, then the YAML file if given, then the environment.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing or malformed, a value has the wrong type,
    /// or the result does not validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            anyhow::ensure!(
                path.is_file(),
                "config file does not exist: {}",
                path.display()
            );
            figment = figment.merge(Yaml::file_exact(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment
            .extract()
            .context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.api.base_url)
            .with_context(|| format!("api.base_url '{}' is not absolute", self.api.base_url))?;
        anyhow::ensure!(
            matches!(base.scheme(), "http" | "https"),
            "api.base_url must use http or https"
        );
        anyhow::ensure!(
            base.scheme() == "https" || self.api.allow_insecure_http,
            "api.base_url uses http:// but api.allow_insecure_http is false"
        );
        anyhow::ensure!(!self.api.timeout.is_zero(), "api.timeout must be positive");
        self.auth.validate().context("invalid auth section")?;
        if self.login.username.is_some() != self.login.password.is_some() {
            anyhow::bail!("login.username and login.password must be set together");
        }
        Ok(())
    }

    /// Effective configuration as pretty JSON, password redacted.
    ///
    /// # Errors
    ///
    /// Fails only if serialization fails.
    pub fn to_pretty_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to render configuration")
    }
}

#[allow(clippy::ref_option)]
fn redacted<S: Serializer>(value: &Option<SecretString>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(_) => serializer.serialize_some(REDACTED),
        None => serializer.serialize_none(),
    }
}

/// `Duration` as a human-readable string (`"30s"`, `"1m 30s"`).
mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::io::Write;

    fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn default_plain_http_base_requires_opt_in() {
        // The default base URL is plain HTTP, which TLS-only mode refuses.
        let err = AppConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("allow_insecure_http"));
    }

    #[test]
    fn loads_yaml_with_human_durations() {
        let file = yaml_file(
            r"
api:
  base_url: https://api.studymate.example
  timeout: 1m 30s
  native_roots: true
auth:
  base_url: https://api.studymate.example
  expiry_statuses: [401]
login:
  username: mentee1
  password: pw
logging:
  level: debug
  format: json
",
        );

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.api.timeout, Duration::from_secs(90));
        assert_eq!(config.auth.expiry_statuses, vec![401]);
        assert_eq!(config.auth.refresh_path, "/auth/refresh");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.login.username.as_deref(), Some("mentee1"));

        let http = config.api.http_config();
        assert_eq!(http.request_timeout, Duration::from_secs(90));
        assert_eq!(http.tls_roots, TlsRootConfig::Native);
        assert_eq!(http.transport, TransportSecurity::TlsOnly);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/studymate.yaml"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let file = yaml_file("api:\n  base_url: https://x.example\n  retries: 3\n");
        assert!(AppConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn bad_duration_is_rejected() {
        let file = yaml_file("api:\n  base_url: https://x.example\n  timeout: soon\n");
        assert!(AppConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn half_configured_login_is_rejected() {
        let file = yaml_file(
            "api:\n  base_url: https://x.example\nauth:\n  base_url: https://x.example\nlogin:\n  username: mentor1\n",
        );
        let err = AppConfig::load(Some(file.path())).unwrap_err();
        assert!(format!("{err:#}").contains("set together"));
    }

    #[test]
    fn printed_config_hides_password() {
        let config = AppConfig {
            login: LoginConfig {
                username: Some("mentee1".into()),
                password: Some(SecretString::new("hunter2")),
            },
            ..AppConfig::default()
        };
        let rendered = config.to_pretty_json().unwrap();
        assert!(rendered.contains(REDACTED));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("\"timeout\": \"30s\""));
    }

    #[test]
    fn url_joins_paths() {
        let api = ApiConfig {
            base_url: "https://api.studymate.example/v1/".into(),
            ..ApiConfig::default()
        };
        assert_eq!(api.url("/mentee/tasks"), "https://api.studymate.example/v1/mentee/tasks");
        assert_eq!(api.url("mentee/tasks"), "https://api.studymate.example/v1/mentee/tasks");
        assert_eq!(api.url("https://other.example/x"), "https://other.example/x");
    }

    #[test]
    fn auth_client_follows_api_transport() {
        let api = ApiConfig {
            allow_insecure_http: true,
            ..ApiConfig::default()
        };
        let http = api.auth_http_config();
        assert_eq!(http.transport, TransportSecurity::AllowInsecureHttp);
        assert_eq!(http.request_timeout, HttpClientConfig::auth_endpoint().request_timeout);
    }
}

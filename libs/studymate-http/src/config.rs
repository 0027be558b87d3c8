use std::time::Duration;

/// Default User-Agent string for HTTP requests
pub const DEFAULT_USER_AGENT: &str = concat!("studymate-http/", env!("CARGO_PKG_VERSION"));

/// Default response body limit (10 MiB). Proof-of-work photos are uploaded,
/// never downloaded through this client, so API responses stay small.
const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Transport security mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportSecurity {
    /// Only `https://` URLs are accepted
    #[default]
    TlsOnly,
    /// Plain `http://` is accepted as well (mock servers, local backends)
    AllowInsecureHttp,
}

/// Source of trusted root certificates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsRootConfig {
    /// Mozilla roots bundled through `webpki-roots`
    #[default]
    WebPki,
    /// Roots from the OS certificate store
    Native,
}

/// HTTP client configuration
///
/// Presets cover the two kinds of traffic the client issues: API calls
/// ([`HttpClientConfig::default`]) and calls to the authentication endpoints
/// ([`HttpClientConfig::auth_endpoint`]).
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Timeout for a single request attempt (default: 30s)
    pub request_timeout: Duration,

    /// User-Agent header value (default: `studymate-http/<version>`)
    pub user_agent: String,

    /// Maximum response body size in bytes, applied after decompression
    pub max_body_size: usize,

    /// Which URL schemes are accepted
    pub transport: TransportSecurity,

    /// Which root certificates are trusted
    pub tls_roots: TlsRootConfig,

    /// Number of requests that may wait for the service stack (minimum 1)
    pub buffer_capacity: usize,

    /// Idle connections are closed after this long; `None` keeps them forever
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum idle connections kept per host
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::WebPki,
            buffer_capacity: 1024,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl HttpClientConfig {
    /// Configuration for login, refresh and logout calls.
    ///
    /// Short timeout and a small body limit: these endpoints only ever
    /// return a token and a role.
    #[must_use]
    pub fn auth_endpoint() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 64 * 1024,
            buffer_capacity: 64,
            ..Self::default()
        }
    }

    /// Configuration for tests against local mock servers.
    ///
    /// Plain HTTP is allowed and the timeout is short.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            transport: TransportSecurity::AllowInsecureHttp,
            pool_idle_timeout: None,
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn default_is_tls_only() {
        let config = HttpClientConfig::default();
        assert_eq!(config.transport, TransportSecurity::TlsOnly);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("studymate-http/"));
    }

    #[test]
    fn auth_endpoint_is_tighter_than_default() {
        let api = HttpClientConfig::default();
        let auth = HttpClientConfig::auth_endpoint();
        assert!(auth.request_timeout < api.request_timeout);
        assert!(auth.max_body_size < api.max_body_size);
        assert_eq!(auth.transport, TransportSecurity::TlsOnly);
    }

    #[test]
    fn testing_preset_allows_plain_http() {
        let config = HttpClientConfig::for_testing();
        assert_eq!(config.transport, TransportSecurity::AllowInsecureHttp);
    }
}

//! Login, refresh and logout calls to the authentication backend.
//!
//! These calls use their own plain [`HttpClient`], never the gateway, so a
//! failing refresh cannot trigger another refresh.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use async_trait::async_trait;
use http::HeaderMap;
use http::header::{COOKIE, HeaderValue, SET_COOKIE};
use parking_lot::Mutex;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use studymate_http::{HttpClient, HttpClientBuilder, HttpClientConfig, HttpError, RequestBuilder};
use zeroize::Zeroizing;

use crate::config::AuthConfig;
use crate::coordinator::RefreshClient;
use crate::credential::IssuedCredential;
use crate::error::{AuthError, format_http_error};
use crate::secret::SecretString;

/// Username and password for the login call.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: SecretString,
}

impl LoginRequest {
    #[must_use]
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

impl Serialize for LoginRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("LoginRequest", 2)?;
        s.serialize_field("username", &self.username)?;
        s.serialize_field("password", self.password.expose())?;
        s.end()
    }
}

/// Session cookies set by the backend.
///
/// Captures `Set-Cookie` name/value pairs (attributes are ignored) and
/// replays them as a single `Cookie` header. A cookie set with an empty value
/// or `Max-Age=0` is removed.
#[derive(Default)]
pub struct CookieJar {
    cookies: Mutex<BTreeMap<String, SecretString>>,
}

impl fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.cookies.lock().keys().cloned().collect();
        f.debug_struct("CookieJar").field("names", &names).finish()
    }
}

impl CookieJar {
    /// Record every `Set-Cookie` header in `headers`.
    pub fn capture(&self, headers: &HeaderMap) {
        let mut cookies = self.cookies.lock();
        for value in headers.get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else {
                tracing::debug!("ignoring non-UTF-8 Set-Cookie header");
                continue;
            };
            let mut parts = raw.split(';');
            let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() {
                continue;
            }
            if value.is_empty() || parts.any(is_expiry_attribute) {
                cookies.remove(name);
            } else {
                cookies.insert(name.to_owned(), SecretString::new(value));
            }
        }
    }

    /// `Cookie` header carrying every stored cookie, or `None` when empty.
    #[must_use]
    pub fn header_value(&self) -> Option<HeaderValue> {
        let cookies = self.cookies.lock();
        if cookies.is_empty() {
            return None;
        }
        let joined = Zeroizing::new(
            cookies
                .iter()
                .map(|(name, value)| format!("{name}={}", value.expose()))
                .collect::<Vec<_>>()
                .join("; "),
        );
        let mut header = HeaderValue::from_str(&joined).ok()?;
        header.set_sensitive(true);
        Some(header)
    }

    pub fn clear(&self) {
        self.cookies.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.lock().is_empty()
    }
}

/// `Max-Age` of zero or less, or an `Expires` date already passed.
fn is_expiry_attribute(attr: &str) -> bool {
    let Some((name, value)) = attr.split_once('=') else {
        return false;
    };
    let (name, value) = (name.trim(), value.trim());
    if name.eq_ignore_ascii_case("max-age") {
        value.parse::<i64>().is_ok_and(|secs| secs <= 0)
    } else if name.eq_ignore_ascii_case("expires") {
        httpdate::parse_http_date(value).is_ok_and(|at| at <= SystemTime::now())
    } else {
        false
    }
}

/// Client for the authentication endpoints.
pub struct AuthBackend {
    client: HttpClient,
    login_url: String,
    refresh_url: String,
    logout_url: String,
    cookies: CookieJar,
}

impl fmt::Debug for AuthBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthBackend")
            .field("login_url", &self.login_url)
            .field("refresh_url", &self.refresh_url)
            .field("logout_url", &self.logout_url)
            .field("cookies", &self.cookies)
            .finish_non_exhaustive()
    }
}

impl AuthBackend {
    /// Build a backend client. `http_config` is usually
    /// [`HttpClientConfig::auth_endpoint`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] for an invalid config and
    /// [`AuthError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &AuthConfig, http_config: HttpClientConfig) -> Result<Self, AuthError> {
        config.validate()?;
        let client = HttpClientBuilder::with_config(http_config)
            .build()
            .map_err(|e| AuthError::Http(format_http_error(&e, "auth client")))?;

        Ok(Self {
            client,
            login_url: config.endpoint(&config.login_path)?.into(),
            refresh_url: config.endpoint(&config.refresh_path)?.into(),
            logout_url: config.endpoint(&config.logout_path)?.into(),
            cookies: CookieJar::default(),
        })
    }

    #[must_use]
    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Exchange username and password for a credential.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Http`] for transport failures and non-2xx
    /// statuses, [`AuthError::InvalidResponse`] for a malformed payload.
    pub async fn login(&self, request: &LoginRequest) -> Result<IssuedCredential, AuthError> {
        tracing::debug!(username = %request.username, "logging in");
        let builder = self
            .client
            .post(&self.login_url)
            .json(request)
            .map_err(|e| AuthError::Http(format_http_error(&e, "login")))?;
        self.issue(builder, "login").await
    }

    /// End the session on the backend and forget the session cookies.
    ///
    /// The jar is emptied even if the call fails.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Http`] for transport failures and non-2xx statuses.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let result = self
            .with_cookies(self.client.post(&self.logout_url))
            .send()
            .await
            .and_then(studymate_http::HttpResponse::error_for_status);
        self.cookies.clear();
        result
            .map(|_| ())
            .map_err(|e| AuthError::Http(format_http_error(&e, "logout")))
    }

    fn with_cookies(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.cookies.header_value() {
            Some(value) => builder.header_value(COOKIE, value),
            None => builder,
        }
    }

    async fn issue(
        &self,
        builder: RequestBuilder,
        context: &str,
    ) -> Result<IssuedCredential, AuthError> {
        let response = builder
            .send()
            .await
            .map_err(|e| AuthError::Http(format_http_error(&e, context)))?;
        self.cookies.capture(response.headers());

        let issued: IssuedCredential = response.json().await.map_err(|e| match e {
            HttpError::Json(err) => AuthError::InvalidResponse(format!("{context}: {err}")),
            other => AuthError::Http(format_http_error(&other, context)),
        })?;

        if issued.access_token.is_empty() {
            return Err(AuthError::InvalidResponse(format!(
                "{context}: empty accessToken"
            )));
        }
        Ok(issued)
    }
}

#[async_trait]
impl RefreshClient for AuthBackend {
    async fn refresh(&self) -> Result<IssuedCredential, AuthError> {
        let builder = self.with_cookies(self.client.post(&self.refresh_url));
        self.issue(builder, "session refresh").await
    }
}

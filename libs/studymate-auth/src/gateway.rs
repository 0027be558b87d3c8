//! Authenticated request gateway.
//!
//! [`AuthGatewayLayer`] attaches the session token to every request. When a
//! response says the session expired, the request waits for the shared
//! refresh cycle and is replayed once with the new token.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue, Method, Request, Response, Uri, Version};
use http_body_util::Full;
use studymate_http::HttpError;
use tower::{Layer, Service, ServiceExt};
use zeroize::Zeroizing;

use crate::classify::{ExpiryPolicy, FailureKind};
use crate::coordinator::RefreshCoordinator;
use crate::error::AuthError;
use crate::secret::SecretString;

/// Request extension marking a replay. A replayed request is never replayed
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replayed;

/// The [`AuthError`] behind an [`HttpError::SessionExpired`], if any.
#[must_use]
pub fn refresh_failure(err: &HttpError) -> Option<&AuthError> {
    match err {
        HttpError::SessionExpired(source) => source.downcast_ref::<AuthError>(),
        _ => None,
    }
}

/// Tower layer installing the gateway in front of an HTTP service.
#[derive(Clone, Debug)]
pub struct AuthGatewayLayer {
    gateway: Gateway,
}

#[derive(Clone, Debug)]
struct Gateway {
    coordinator: RefreshCoordinator,
    policy: Arc<ExpiryPolicy>,
}

impl AuthGatewayLayer {
    /// Tokens are read from, and refreshed into, the coordinator's store.
    #[must_use]
    pub fn new(coordinator: RefreshCoordinator, policy: ExpiryPolicy) -> Self {
        Self {
            gateway: Gateway {
                coordinator,
                policy: Arc::new(policy),
            },
        }
    }

    #[must_use]
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.gateway.coordinator
    }
}

impl<S> Layer<S> for AuthGatewayLayer {
    type Service = AuthGatewayService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthGatewayService {
            inner,
            gateway: self.gateway.clone(),
        }
    }
}

/// Service created by [`AuthGatewayLayer`].
#[derive(Clone, Debug)]
pub struct AuthGatewayService<S> {
    inner: S,
    gateway: Gateway,
}

impl<S, ResBody> Service<Request<Full<Bytes>>> for AuthGatewayService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Response<ResBody>, HttpError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        // Clone-swap: the readied service goes into the future.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let gateway = self.gateway.clone();
        Box::pin(gateway.dispatch(inner, req))
    }
}

/// Everything needed to reissue a request.
struct Snapshot {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Full<Bytes>,
}

impl Snapshot {
    fn capture(req: &Request<Full<Bytes>>) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            version: req.version(),
            headers: req.headers().clone(),
            body: req.body().clone(),
        }
    }

    fn into_replay(self) -> Request<Full<Bytes>> {
        let mut req = Request::new(self.body);
        *req.method_mut() = self.method;
        *req.uri_mut() = self.uri;
        *req.version_mut() = self.version;
        *req.headers_mut() = self.headers;
        req.extensions_mut().insert(Replayed);
        req
    }
}

fn bearer(token: &SecretString) -> Result<HeaderValue, HttpError> {
    let raw = Zeroizing::new(format!("Bearer {}", token.expose()));
    let mut value = HeaderValue::from_str(&raw)?;
    value.set_sensitive(true);
    Ok(value)
}

impl Gateway {
    async fn dispatch<S, ResBody>(
        self,
        mut inner: S,
        mut req: Request<Full<Bytes>>,
    ) -> Result<Response<ResBody>, HttpError>
    where
        S: Service<Request<Full<Bytes>>, Response = Response<ResBody>, Error = HttpError>,
    {
        let snapshot = if req.extensions().get::<Replayed>().is_some() {
            None
        } else {
            Some(Snapshot::capture(&req))
        };

        if let Some(token) = self.coordinator.store().current().access_token() {
            req.headers_mut().insert(AUTHORIZATION, bearer(token)?);
        }

        let outcome = inner.call(req).await;
        if self.policy.classify(&outcome) != Some(FailureKind::Expired) {
            return outcome;
        }

        let Some(snapshot) = snapshot else {
            tracing::debug!("replayed request expired again, not retrying");
            return outcome;
        };
        // Release the stale response and its connection before waiting.
        drop(outcome);
        tracing::debug!(
            method = %snapshot.method,
            uri = %snapshot.uri,
            "session expired, waiting for refresh"
        );

        let token = self
            .coordinator
            .fresh_token()
            .await
            .map_err(|e| HttpError::SessionExpired(Box::new(e)))?;

        let mut replay = snapshot.into_replay();
        replay.headers_mut().insert(AUTHORIZATION, bearer(&token)?);
        tracing::debug!(method = %replay.method(), uri = %replay.uri(), "replaying request");
        inner.ready().await?.call(replay).await
    }
}

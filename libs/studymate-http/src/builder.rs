use std::time::Duration;

use bytes::Bytes;
use http::Response;
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tower::buffer::Buffer;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

use crate::client::BufferedService;
use crate::config::{HttpClientConfig, TlsRootConfig, TransportSecurity};
use crate::error::HttpError;
use crate::layers::UserAgentLayer;
use crate::response::ResponseBody;
use crate::tls;

/// The boxed stack below the buffer, as seen by an authentication wrapper.
pub type InnerService =
    BoxCloneService<http::Request<Full<Bytes>>, http::Response<ResponseBody>, HttpError>;

type WrapFn = Box<dyn FnOnce(InnerService) -> InnerService + Send>;

/// Assembles an [`HttpClient`](crate::HttpClient).
///
/// Outer to inner, a request passes through:
/// `Buffer -> auth wrapper (optional) -> error mapping -> Timeout ->
/// User-Agent -> Decompression -> hyper`.
pub struct HttpClientBuilder {
    config: HttpClientConfig,
    wrap: Option<WrapFn>,
}

impl HttpClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HttpClientConfig::default())
    }

    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self { config, wrap: None }
    }

    /// Timeout for one attempt. A replayed request starts a new one.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Queue depth in front of the stack; zero is raised to one.
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity.max(1);
        self
    }

    /// Permit `http://` URLs, for mock servers and local backends.
    ///
    /// Compiled only into debug builds or with the `allow-insecure-http`
    /// feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    /// Wrap the stack with an authentication service.
    ///
    /// The wrapper sits directly under the buffer, so each request it sends,
    /// replays included, still goes through the timeout and transport.
    /// Calling this again replaces the previous wrapper.
    #[must_use]
    pub fn with_auth_layer(
        mut self,
        wrap: impl FnOnce(InnerService) -> InnerService + Send + 'static,
    ) -> Self {
        self.wrap = Some(Box::new(wrap));
        self
    }

    /// Spawns the buffer worker, so a tokio runtime must be running.
    ///
    /// # Errors
    ///
    /// `HttpError::Tls` if the root store cannot be loaded and
    /// `HttpError::InvalidHeaderValue` for a malformed user agent.
    pub fn build(self) -> Result<crate::HttpClient, HttpError> {
        let Self { config, wrap } = self;
        if config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                target: "studymate_http::security",
                "plain HTTP allowed; requests and tokens may travel unencrypted"
            );
        }

        let transport = hyper_client(&config)?;
        let timeout = config.request_timeout;
        let stack: InnerService = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .layer(UserAgentLayer::try_new(&config.user_agent)?)
            .layer(DecompressionLayer::new())
            .service(transport)
            .map_response(box_response_body)
            .map_err(move |e: tower::BoxError| into_http_error(e, timeout))
            .boxed_clone();

        let stack = match wrap {
            Some(wrap) => wrap(stack),
            None => stack,
        };
        let service: BufferedService = Buffer::new(stack, config.buffer_capacity.max(1));

        Ok(crate::HttpClient {
            service,
            max_body_size: config.max_body_size,
            transport_security: config.transport,
        })
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

fn hyper_client(config: &HttpClientConfig) -> Result<HyperClient, HttpError> {
    let connector = https_connector(config.tls_roots, config.transport)?;
    let mut builder = Client::builder(TokioExecutor::new());
    // idle expiry needs a timer
    builder
        .pool_timer(TokioTimer::new())
        .pool_max_idle_per_host(config.pool_max_idle_per_host);
    if let Some(idle) = config.pool_idle_timeout {
        builder.pool_idle_timeout(idle);
    }
    Ok(builder.build(connector))
}

fn https_connector(
    roots: TlsRootConfig,
    transport: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let with_roots = match roots {
        TlsRootConfig::WebPki => HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(tls::crypto_provider())
            .map_err(|e| HttpError::Tls(Box::new(e)))?,
        TlsRootConfig::Native => HttpsConnectorBuilder::new()
            .with_tls_config(tls::native_roots_client_config()?),
    };
    let connector = match transport {
        TransportSecurity::TlsOnly => with_roots.https_only().enable_all_versions().build(),
        TransportSecurity::AllowInsecureHttp => {
            with_roots.https_or_http().enable_all_versions().build()
        }
    };
    Ok(connector)
}

/// Recover typed errors that tower boxed on the way up.
fn into_http_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }
    let err = match err.downcast::<HttpError>() {
        Ok(typed) => return *typed,
        Err(err) => err,
    };
    match err.downcast::<hyper_util::client::legacy::Error>() {
        Ok(hyper) => HttpError::from(*hyper),
        Err(err) => HttpError::Transport(err),
    }
}

fn box_response_body<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: http_body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    response.map(|body| body.map_err(Into::into).boxed())
}

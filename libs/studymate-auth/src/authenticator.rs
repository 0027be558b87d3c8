//! One-stop wiring of store, backend, coordinator and gateway.

use std::sync::Arc;

use studymate_http::{HttpClient, HttpClientBuilder, HttpClientConfig};
use tokio::sync::watch;

use crate::backend::{AuthBackend, LoginRequest};
use crate::builder_ext::HttpClientBuilderExt;
use crate::classify::ExpiryPolicy;
use crate::config::AuthConfig;
use crate::coordinator::RefreshCoordinator;
use crate::credential::{Credential, Role};
use crate::error::{AuthError, format_http_error};
use crate::gateway::AuthGatewayLayer;
use crate::session::{InMemorySessionStore, SessionStore};

/// Session owner for one signed-in user.
///
/// Every API client from [`api_client`](Self::api_client) shares the same
/// store and refresh coordinator, so concurrent expiries across clients still
/// cause a single refresh.
#[derive(Debug, Clone)]
pub struct Authenticator {
    store: Arc<InMemorySessionStore>,
    backend: Arc<AuthBackend>,
    coordinator: RefreshCoordinator,
    policy: ExpiryPolicy,
}

impl Authenticator {
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] for an invalid config, or
    /// [`AuthError::Http`] if the backend client cannot be built.
    pub fn new(config: &AuthConfig, http_config: HttpClientConfig) -> Result<Self, AuthError> {
        let policy = config.expiry_policy()?;
        let backend = Arc::new(AuthBackend::new(config, http_config)?);
        let store = Arc::new(InMemorySessionStore::new());
        let coordinator = RefreshCoordinator::new(store.clone(), backend.clone());

        Ok(Self {
            store,
            backend,
            coordinator,
            policy,
        })
    }

    /// Log in and store the issued credential.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the store is left unchanged.
    pub async fn login(&self, request: &LoginRequest) -> Result<Role, AuthError> {
        let issued = self.backend.login(request).await?;
        let role = issued.role;
        self.coordinator.sign_in(issued);
        tracing::info!(username = %request.username, role = role.as_str(), "logged in");
        Ok(role)
    }

    /// Sign out locally and tell the backend.
    ///
    /// The local session is cleared even when the backend call fails, and a
    /// refresh still in flight cannot restore it.
    ///
    /// # Errors
    ///
    /// Returns the backend error after clearing the local session.
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.coordinator.sign_out();
        let result = self.backend.logout().await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "backend logout failed, local session cleared");
        }
        result
    }

    #[must_use]
    pub fn credential(&self) -> Credential {
        self.store.current()
    }

    /// Authenticated flag; turns `false` on logout or a failed refresh.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.store.subscribe()
    }

    #[must_use]
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    #[must_use]
    pub fn gateway_layer(&self) -> AuthGatewayLayer {
        AuthGatewayLayer::new(self.coordinator.clone(), self.policy.clone())
    }

    /// HTTP client with the gateway installed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Http`] if the client cannot be built.
    pub fn api_client(&self, http_config: HttpClientConfig) -> Result<HttpClient, AuthError> {
        HttpClientBuilder::with_config(http_config)
            .with_auth_gateway(self.gateway_layer())
            .build()
            .map_err(|e| AuthError::Http(format_http_error(&e, "api client")))
    }
}

use tower::ServiceExt;

use crate::gateway::AuthGatewayLayer;

/// Extension trait installing the gateway on a
/// [`studymate_http::HttpClientBuilder`].
///
/// ```ignore
/// use studymate_auth::HttpClientBuilderExt;
///
/// let api = HttpClientBuilder::new()
///     .with_auth_gateway(authenticator.gateway_layer())
///     .build()?;
/// ```
pub trait HttpClientBuilderExt {
    /// Attach bearer tokens and refresh-and-replay expired requests.
    #[must_use]
    fn with_auth_gateway(self, layer: AuthGatewayLayer) -> Self;
}

impl HttpClientBuilderExt for studymate_http::HttpClientBuilder {
    fn with_auth_gateway(self, layer: AuthGatewayLayer) -> Self {
        self.with_auth_layer(move |svc| {
            tower::ServiceBuilder::new()
                .layer(layer)
                .service(svc)
                .boxed_clone()
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::classify::ExpiryPolicy;
    use crate::coordinator::RefreshCoordinator;
    use crate::coordinator::tests::{MockRefresher, issued};
    use crate::credential::{Credential, Role};
    use crate::secret::SecretString;
    use crate::session::InMemorySessionStore;
    use httpmock::prelude::*;
    use std::sync::Arc;
    use studymate_http::HttpClientBuilder;

    #[tokio::test]
    async fn client_with_gateway_refreshes_on_403() {
        let server = MockServer::start();
        let stale = server.mock(|when, then| {
            when.method(GET)
                .path("/mentor/feedback")
                .header("authorization", "Bearer old-token");
            then.status(403);
        });
        let fresh = server.mock(|when, then| {
            when.method(GET)
                .path("/mentor/feedback")
                .header("authorization", "Bearer new-token");
            then.status(200).body("[]");
        });

        let store = Arc::new(InMemorySessionStore::with_credential(Credential::authenticated(
            SecretString::new("old-token"),
            Role::Mentor,
        )));
        let refresher = Arc::new(MockRefresher::new(vec![issued("new-token", Role::Mentor)]));
        let coordinator = RefreshCoordinator::new(store, refresher.clone());

        let client = HttpClientBuilder::new()
            .allow_insecure_http()
            .with_auth_gateway(AuthGatewayLayer::new(coordinator, ExpiryPolicy::default()))
            .build()
            .unwrap();

        let body = client
            .get(&server.url("/mentor/feedback"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert_eq!(body, "[]");
        stale.assert();
        fresh.assert();
        assert_eq!(refresher.calls(), 1);
    }
}

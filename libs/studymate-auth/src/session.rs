//! Session credential store.
//!
//! Reads are lock-free; writes replace the whole credential in one store so a
//! reader never sees a token without its role.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;

use crate::credential::{Credential, Role};
use crate::secret::SecretString;

/// Holder of the current session credential.
///
/// The gateway reads it on every request and writes it only after a refresh.
pub trait SessionStore: Send + Sync {
    /// Snapshot of the current credential.
    fn current(&self) -> Credential;

    /// Replace token and role together.
    fn set_credential(&self, access_token: SecretString, role: Role);

    /// Sign out: token and role become absent.
    fn clear(&self);
}

/// In-process [`SessionStore`] that also broadcasts the authenticated flag.
pub struct InMemorySessionStore {
    credential: ArcSwap<Credential>,
    authenticated: watch::Sender<bool>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_credential(Credential::anonymous())
    }

    #[must_use]
    pub fn with_credential(credential: Credential) -> Self {
        let (authenticated, _) = watch::channel(credential.is_authenticated());
        Self {
            credential: ArcSwap::from_pointee(credential),
            authenticated,
        }
    }

    /// Watch the authenticated flag; flips to `false` on deauthentication.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.authenticated.subscribe()
    }

    fn publish(&self, credential: Credential) {
        let is_authenticated = credential.is_authenticated();
        self.credential.store(Arc::new(credential));
        self.authenticated.send_replace(is_authenticated);
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemorySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySessionStore")
            .field("credential", &**self.credential.load())
            .finish()
    }
}

impl SessionStore for InMemorySessionStore {
    fn current(&self) -> Credential {
        Credential::clone(&self.credential.load())
    }

    fn set_credential(&self, access_token: SecretString, role: Role) {
        tracing::debug!(role = role.as_str(), "session credential updated");
        self.publish(Credential::authenticated(access_token, role));
    }

    fn clear(&self) {
        tracing::debug!("session credential cleared");
        self.publish(Credential::anonymous());
    }
}

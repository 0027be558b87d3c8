//! Single-flight session refresh.
//!
//! At most one refresh cycle runs at a time. Every caller that needs a fresh
//! token while a cycle is in flight is queued and receives the outcome of
//! that same cycle, in the order it asked.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::credential::IssuedCredential;
use crate::error::AuthError;
use crate::secret::SecretString;
use crate::session::SessionStore;

/// Issues the refresh call to the authentication backend.
///
/// Implementations must not route through the gateway layer.
#[async_trait]
pub trait RefreshClient: Send + Sync {
    async fn refresh(&self) -> Result<IssuedCredential, AuthError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
}

type RefreshOutcome = Result<SecretString, AuthError>;

#[derive(Default)]
struct RefreshState {
    in_progress: bool,
    waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
    /// Bumped by every sign-in and sign-out. A cycle only commits its result
    /// while the generation it started under is still current.
    generation: u64,
}

struct Shared {
    state: Mutex<RefreshState>,
    store: Arc<dyn SessionStore>,
    client: Arc<dyn RefreshClient>,
    cycles: AtomicU64,
}

/// Owner of the refresh flag and the queue of waiting requests.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    shared: Arc<Shared>,
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("phase", &self.phase())
            .field("pending", &self.pending())
            .field("cycles", &self.cycles())
            .finish()
    }
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, client: Arc<dyn RefreshClient>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RefreshState::default()),
                store,
                client,
                cycles: AtomicU64::new(0),
            }),
        }
    }

    /// The store this coordinator writes refreshed credentials to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.shared.store
    }

    /// Wait for the outcome of the current refresh cycle, starting one if
    /// none is running.
    ///
    /// On success the new token is already in the session store when this
    /// resolves. On failure the store has been cleared.
    ///
    /// # Errors
    ///
    /// Returns the refresh failure shared by every waiter of the cycle,
    /// [`AuthError::SignedOut`] if the session was signed out or replaced
    /// meanwhile, or [`AuthError::Interrupted`] if the cycle died without an
    /// outcome.
    pub async fn fresh_token(&self) -> Result<SecretString, AuthError> {
        let (tx, rx) = oneshot::channel();
        let start_cycle = {
            let mut state = self.shared.state.lock();
            state.waiters.push_back(tx);
            let idle = !std::mem::replace(&mut state.in_progress, true);
            idle.then_some(state.generation)
        };

        if let Some(generation) = start_cycle {
            let guard = CycleGuard {
                shared: Arc::clone(&self.shared),
                outcome: None,
            };
            // Detached so that cancelling the first caller does not strand
            // the rest of the queue.
            tokio::spawn(run_cycle(guard, generation));
        } else {
            tracing::debug!(pending = self.pending(), "waiting for in-flight session refresh");
        }

        rx.await.unwrap_or(Err(AuthError::Interrupted))
    }

    /// Store a credential from a login. A cycle already in flight will not
    /// overwrite it.
    pub fn sign_in(&self, issued: IssuedCredential) {
        let mut state = self.shared.state.lock();
        state.generation += 1;
        self.shared.store.set_credential(issued.access_token, issued.role);
    }

    /// Clear the session. A cycle already in flight resolves its waiters
    /// with [`AuthError::SignedOut`] and leaves the store empty.
    pub fn sign_out(&self) {
        let mut state = self.shared.state.lock();
        state.generation += 1;
        self.shared.store.clear();
    }

    #[must_use]
    pub fn phase(&self) -> RefreshPhase {
        if self.shared.state.lock().in_progress {
            RefreshPhase::Refreshing
        } else {
            RefreshPhase::Idle
        }
    }

    /// Number of callers waiting on the in-flight cycle.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.state.lock().waiters.len()
    }

    /// Number of refresh cycles started so far.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::Relaxed)
    }
}

/// Ends a cycle when dropped: clears the in-progress flag, takes the whole
/// queue under the same lock and resolves it front to back.
struct CycleGuard {
    shared: Arc<Shared>,
    outcome: Option<RefreshOutcome>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        let waiters = {
            let mut state = self.shared.state.lock();
            state.in_progress = false;
            std::mem::take(&mut state.waiters)
        };

        let outcome = self.outcome.take().unwrap_or_else(|| {
            tracing::error!("session refresh cycle ended without an outcome");
            Err(AuthError::Interrupted)
        });

        for waiter in waiters {
            if waiter.send(outcome.clone()).is_err() {
                tracing::trace!("refresh waiter went away before the outcome");
            }
        }
    }
}

async fn run_cycle(mut guard: CycleGuard, generation: u64) {
    let shared = Arc::clone(&guard.shared);
    let cycle = shared.cycles.fetch_add(1, Ordering::Relaxed) + 1;
    tracing::debug!(cycle, "session refresh started");

    let result = shared.client.refresh().await;

    // Store writes happen under the state lock so a concurrent sign-out
    // either precedes the check or follows the write.
    let state = shared.state.lock();
    let outcome = match result {
        _ if state.generation != generation => {
            tracing::info!(cycle, "session ended during refresh, discarding result");
            Err(AuthError::SignedOut)
        }
        Ok(issued) => {
            let token = issued.access_token.clone();
            tracing::info!(cycle, role = issued.role.as_str(), "session refreshed");
            shared.store.set_credential(issued.access_token, issued.role);
            Ok(token)
        }
        Err(e) => {
            tracing::warn!(cycle, error = %e, "session refresh failed, signing out");
            shared.store.clear();
            Err(e)
        }
    };
    drop(state);

    guard.outcome = Some(outcome);
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
pub(crate) mod tests {
    use super::*;
    use crate::credential::{Credential, Role};
    use crate::session::InMemorySessionStore;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Scripted refresher. Each call pops the next outcome; a gate, when set,
    /// holds the call until released.
    pub struct MockRefresher {
        pub calls: AtomicUsize,
        outcomes: Mutex<VecDeque<Result<IssuedCredential, AuthError>>>,
        gate: Option<Arc<Notify>>,
    }

    impl MockRefresher {
        pub fn new(outcomes: Vec<Result<IssuedCredential, AuthError>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                outcomes: Mutex::new(outcomes.into()),
                gate: None,
            }
        }

        pub fn gated(
            outcomes: Vec<Result<IssuedCredential, AuthError>>,
            gate: Arc<Notify>,
        ) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(outcomes)
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RefreshClient for MockRefresher {
        async fn refresh(&self) -> Result<IssuedCredential, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let next = self.outcomes.lock().pop_front();
            next.unwrap_or_else(|| panic!("unexpected refresh call"))
        }
    }

    pub fn issued(token: &str, role: Role) -> Result<IssuedCredential, AuthError> {
        Ok(IssuedCredential {
            access_token: SecretString::new(token),
            role,
        })
    }

    pub async fn wait_for_pending(coordinator: &RefreshCoordinator, n: usize) {
        while coordinator.pending() < n {
            tokio::task::yield_now().await;
        }
    }

    fn signed_in_store() -> Arc<InMemorySessionStore> {
        Arc::new(InMemorySessionStore::with_credential(Credential::authenticated(
            SecretString::new("old-token"),
            Role::Mentee,
        )))
    }

    #[test]
    fn coordinator_is_send_sync_clone() {
        fn assert_traits<T: Send + Sync + Clone>() {}
        assert_traits::<RefreshCoordinator>();
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let gate = Arc::new(Notify::new());
        let refresher = Arc::new(MockRefresher::gated(
            vec![issued("new-token", Role::Mentor)],
            Arc::clone(&gate),
        ));
        let store = signed_in_store();
        let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let c = coordinator.clone();
                tokio::spawn(async move { c.fresh_token().await })
            })
            .collect();

        wait_for_pending(&coordinator, 5).await;
        assert_eq!(coordinator.phase(), RefreshPhase::Refreshing);
        gate.notify_one();

        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token.expose(), "new-token");
        }
        assert_eq!(refresher.calls(), 1);
        assert_eq!(coordinator.cycles(), 1);
        assert_eq!(coordinator.phase(), RefreshPhase::Idle);
        assert_eq!(coordinator.pending(), 0);

        let current = store.current();
        assert_eq!(current.access_token().map(SecretString::expose), Some("new-token"));
        assert_eq!(current.role(), Some(Role::Mentor));
    }

    #[tokio::test]
    async fn waiters_resolve_in_arrival_order() {
        let gate = Arc::new(Notify::new());
        let refresher = Arc::new(MockRefresher::gated(
            vec![issued("new-token", Role::Mentee)],
            Arc::clone(&gate),
        ));
        let coordinator = RefreshCoordinator::new(signed_in_store(), refresher);
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for id in 0..4 {
            let c = coordinator.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                c.fresh_token().await.unwrap();
                order.lock().push(id);
            }));
            wait_for_pending(&coordinator, id + 1).await;
        }

        gate.notify_one();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn failure_clears_store_and_rejects_every_waiter() {
        let gate = Arc::new(Notify::new());
        let refresher = Arc::new(MockRefresher::gated(
            vec![Err(AuthError::Http("session refresh HTTP 500".into()))],
            Arc::clone(&gate),
        ));
        let store = signed_in_store();
        let mut signed_in = store.subscribe();
        let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let c = coordinator.clone();
                tokio::spawn(async move { c.fresh_token().await })
            })
            .collect();
        wait_for_pending(&coordinator, 3).await;
        gate.notify_one();

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, AuthError::Http(ref msg) if msg.contains("500")));
        }
        assert_eq!(refresher.calls(), 1);

        let current = store.current();
        assert!(!current.is_authenticated());
        assert!(current.role().is_none());
        signed_in.changed().await.unwrap();
        assert!(!*signed_in.borrow());
    }

    #[tokio::test]
    async fn next_request_after_cycle_starts_new_cycle() {
        let refresher = Arc::new(MockRefresher::new(vec![
            Err(AuthError::Http("session refresh HTTP 401 Unauthorized".into())),
            issued("second", Role::Mentee),
        ]));
        let coordinator = RefreshCoordinator::new(signed_in_store(), refresher.clone());

        assert!(coordinator.fresh_token().await.is_err());
        assert_eq!(coordinator.phase(), RefreshPhase::Idle);

        let token = coordinator.fresh_token().await.unwrap();
        assert_eq!(token.expose(), "second");
        assert_eq!(coordinator.cycles(), 2);
        assert_eq!(refresher.calls(), 2);
    }

    #[tokio::test]
    async fn dead_cycle_interrupts_waiters() {
        // Empty script: the refresher panics inside the cycle task.
        let coordinator = RefreshCoordinator::new(
            signed_in_store(),
            Arc::new(MockRefresher::new(Vec::new())),
        );

        let err = coordinator.fresh_token().await.unwrap_err();
        assert!(matches!(err, AuthError::Interrupted));
        assert_eq!(coordinator.phase(), RefreshPhase::Idle);
        assert_eq!(coordinator.pending(), 0);
    }

    #[tokio::test]
    async fn sign_out_during_refresh_discards_new_token() {
        let gate = Arc::new(Notify::new());
        let refresher = Arc::new(MockRefresher::gated(
            vec![issued("new-token", Role::Mentee)],
            Arc::clone(&gate),
        ));
        let store = signed_in_store();
        let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());

        let waiter = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.fresh_token().await })
        };
        wait_for_pending(&coordinator, 1).await;

        coordinator.sign_out();
        gate.notify_one();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, AuthError::SignedOut));
        assert_eq!(refresher.calls(), 1);
        assert!(!store.current().is_authenticated());
        assert!(!*store.subscribe().borrow());
    }

    #[tokio::test]
    async fn sign_in_during_failed_refresh_keeps_new_session() {
        let gate = Arc::new(Notify::new());
        let refresher = Arc::new(MockRefresher::gated(
            vec![Err(AuthError::Http("session refresh HTTP 401".into()))],
            Arc::clone(&gate),
        ));
        let store = signed_in_store();
        let coordinator = RefreshCoordinator::new(store.clone(), refresher);

        let waiter = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.fresh_token().await })
        };
        wait_for_pending(&coordinator, 1).await;

        coordinator.sign_in(issued("login-token", Role::Mentor).unwrap());
        gate.notify_one();

        assert!(matches!(waiter.await.unwrap(), Err(AuthError::SignedOut)));
        let current = store.current();
        assert_eq!(current.access_token().map(SecretString::expose), Some("login-token"));
        assert_eq!(current.role(), Some(Role::Mentor));
    }

    #[tokio::test]
    async fn cancelled_initiator_does_not_strand_queue() {
        let gate = Arc::new(Notify::new());
        let refresher = Arc::new(MockRefresher::gated(
            vec![issued("new-token", Role::Mentor)],
            Arc::clone(&gate),
        ));
        let coordinator = RefreshCoordinator::new(signed_in_store(), refresher);

        let initiator = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.fresh_token().await })
        };
        wait_for_pending(&coordinator, 1).await;
        let follower = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.fresh_token().await })
        };
        wait_for_pending(&coordinator, 2).await;

        initiator.abort();
        gate.notify_one();

        let token = follower.await.unwrap().unwrap();
        assert_eq!(token.expose(), "new-token");
    }
}

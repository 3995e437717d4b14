//! The single owned `AuthState` value behind a watch channel. Readers get
//! immutable snapshots; only the session manager mutates it, and every
//! reconciliation attempt is sequence-tagged so a slow, stale attempt can
//! never overwrite a newer outcome.

use crate::error::AuthError;
use crate::model::AuthState;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

pub struct AuthPublisher {
    tx: watch::Sender<AuthState>,
    // Monotonic reconciliation sequence: an attempt may publish only if no
    // newer attempt has started since it began.
    seq: AtomicU64,
    last_error: RwLock<Option<AuthError>>,
}

impl AuthPublisher {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState::bootstrapping());
        Self {
            tx,
            seq: AtomicU64::new(0),
            last_error: RwLock::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    /// Start a reconciliation attempt; the returned tag is required to publish.
    pub fn begin_attempt(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Publish unless a newer attempt has started since `attempt` was issued.
    pub fn publish_if_current(&self, attempt: u64, state: AuthState) -> bool {
        if self.seq.load(Ordering::SeqCst) != attempt {
            return false;
        }
        self.tx.send_replace(state);
        true
    }

    /// Unconditional transition to logged out. Bumps the sequence so any
    /// in-flight reconciliation becomes stale.
    pub fn force_signed_out(&self) {
        self.begin_attempt();
        self.tx.send_replace(AuthState::signed_out());
    }

    pub fn clear_loading(&self) {
        self.tx.send_modify(|s| s.set_loading(false));
    }

    /// Raise the loading flag for the duration of the returned guard; release
    /// is guaranteed on every exit path, including early error returns.
    pub fn begin_loading(&self) -> LoadingGuard<'_> {
        self.tx.send_modify(|s| s.set_loading(true));
        LoadingGuard(self)
    }

    pub fn record_profile_error(&self, err: AuthError) {
        *self.last_error.write() = Some(err);
    }

    pub fn last_profile_error(&self) -> Option<AuthError> {
        self.last_error.read().clone()
    }

    pub fn clear_profile_error(&self) {
        *self.last_error.write() = None;
    }
}

impl Default for AuthPublisher {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LoadingGuard<'a>(&'a AuthPublisher);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.clear_loading();
    }
}

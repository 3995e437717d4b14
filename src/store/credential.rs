//! Credential store contract: password auth, session issuance/refresh and the
//! change-notification stream every subscriber reconciles against.

use crate::error::AuthResult;
use crate::model::{Session, SignupMetadata};
use tokio::sync::broadcast;

/// One change-stream notification. `SignedOut` carries no session; the other
/// two carry the session the store just issued or re-issued.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
}

impl AuthEvent {
    /// Session attached to the event, if any.
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthEvent::SignedIn(s) | AuthEvent::TokenRefreshed(s) => Some(s),
            AuthEvent::SignedOut => None,
        }
    }
}

#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Session held by this process, if any. Fresh processes have none.
    async fn current_session(&self) -> AuthResult<Option<Session>>;

    /// Password sign-in. Fails with `InvalidCredentials` on bad email/password.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session>;

    /// Create a new credential with auxiliary signup metadata attached.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignupMetadata,
    ) -> AuthResult<Session>;

    async fn sign_out(&self) -> AuthResult<()>;

    /// Best-effort re-issue of session claims (picks up server-side changes
    /// derived from a just-updated profile).
    async fn refresh_session(&self) -> AuthResult<()>;

    /// Subscribe to the change-notification stream. May fire at any time,
    /// including immediately after subscription.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

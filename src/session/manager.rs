//! The session manager: bootstraps from the credential store, reconciles
//! profiles, and owns the login/signup/logout flows including the one-time
//! bank verification elevation.

use crate::error::{AuthError, AuthResult};
use crate::model::{AuthState, ClientSummary, ProfileRow, Role, Session, SignupMetadata, User};
use crate::registry::VerificationRegistry;
use crate::session::state::AuthPublisher;
use crate::store::{AuthEvent, BankDirectory, CredentialStore, ProfilePatch, ProfileStore};
use crate::tprintln;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
    pub bank: Option<String>,
    pub account_number: Option<String>,
    pub verification_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub bank: Option<String>,
    pub account_number: Option<String>,
    pub verification_code: Option<String>,
}

pub struct SessionManager {
    credentials: Arc<dyn CredentialStore>,
    profiles: Arc<dyn ProfileStore>,
    banks: Arc<dyn BankDirectory>,
    registry: VerificationRegistry,
    publisher: Arc<AuthPublisher>,
    bootstrap_timeout: Duration,
    // Handle to ourselves for the long-lived stream task; weak, so dropping
    // the last external Arc tears the task down instead of leaking a cycle.
    weak: Weak<Self>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        profiles: Arc<dyn ProfileStore>,
        banks: Arc<dyn BankDirectory>,
        registry: VerificationRegistry,
        bootstrap_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            credentials,
            profiles,
            banks,
            registry,
            publisher: Arc::new(AuthPublisher::new()),
            bootstrap_timeout,
            weak: weak.clone(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Immutable snapshot of the current auth state.
    pub fn state(&self) -> AuthState {
        self.publisher.snapshot()
    }

    /// Watch the auth state; each borrow is an immutable snapshot.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.publisher.subscribe()
    }

    pub fn registry(&self) -> &VerificationRegistry {
        &self.registry
    }

    /// Reconciliation failure surfaced as a dismissible banner, if any.
    pub fn last_profile_error(&self) -> Option<AuthError> {
        self.publisher.last_profile_error()
    }

    pub fn clear_profile_error(&self) {
        self.publisher.clear_profile_error()
    }

    /// Runs once per process lifetime: arm the fail-open timer, subscribe to
    /// the change stream, then resolve the initial session.
    pub async fn bootstrap(&self) {
        // Fail open to logged-out rather than hanging forever on an
        // unreachable credential store.
        let timer = {
            let publisher = Arc::clone(&self.publisher);
            let deadline = self.bootstrap_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                if publisher.snapshot().is_loading() {
                    warn!("auth bootstrap did not settle within {:?}, failing open to logged out", deadline);
                    publisher.clear_loading();
                }
            })
        };

        // Change stream lives for the lifetime of the manager. Notifications
        // are handled on their own tasks, never inline in the recv loop, so a
        // notification can never re-enter the store from its own callback.
        let stream = {
            let mut rx = self.credentials.subscribe();
            let weak = self.weak.clone();
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(event) => {
                            let Some(mgr) = weak.upgrade() else { break };
                            match event {
                                AuthEvent::SignedOut => {
                                    tprintln!("auth.stream signed_out");
                                    mgr.publisher.force_signed_out();
                                }
                                AuthEvent::SignedIn(session)
                                | AuthEvent::TokenRefreshed(session) => {
                                    let attempt = mgr.publisher.begin_attempt();
                                    tokio::spawn(async move {
                                        mgr.reconcile(attempt, &session).await;
                                    });
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("auth stream lagged, skipped {} events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        };
        self.tasks.lock().push(stream);

        match self.credentials.current_session().await {
            Ok(Some(session)) => {
                let attempt = self.publisher.begin_attempt();
                self.reconcile(attempt, &session).await;
            }
            Ok(None) => self.publisher.force_signed_out(),
            Err(e) => {
                warn!("initial session fetch failed: {}", e);
                self.publisher.force_signed_out();
            }
        }
        timer.abort();
    }

    /// Unsubscribe from the stream and drop pending work.
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Turn a raw session into published state: fetch the profile row, project
    /// it, publish unless a newer attempt has started. A row that cannot be
    /// loaded yields logged-out, never a partial user.
    async fn reconcile(&self, attempt: u64, session: &Session) {
        tprintln!("auth.reconcile subject={} attempt={}", session.user_id, attempt);
        let state = match self.profiles.profile_by_id(&session.user_id).await {
            Ok(Some(row)) => {
                self.publisher.clear_profile_error();
                AuthState::signed_in(User::project(&row))
            }
            Ok(None) => {
                warn!("no profile row for authenticated subject {}", session.user_id);
                self.publisher.record_profile_error(AuthError::ProfileLoad(
                    "no profile row for authenticated subject".into(),
                ));
                AuthState::signed_out()
            }
            Err(e) => {
                warn!("profile fetch failed for {}: {}", session.user_id, e);
                self.publisher
                    .record_profile_error(AuthError::ProfileLoad(e.to_string()));
                AuthState::signed_out()
            }
        };
        if !self.publisher.publish_if_current(attempt, state) {
            tprintln!("auth.reconcile stale attempt={} dropped", attempt);
        }
    }

    pub async fn login(&self, req: &LoginRequest) -> AuthResult<()> {
        let _loading = self.publisher.begin_loading();
        tprintln!("auth.login email={} role={}", req.email, req.role);

        let session = self
            .credentials
            .sign_in_with_password(&req.email, &req.password)
            .await?;
        let profile = self
            .profiles
            .profile_by_id(&session.user_id)
            .await?
            .ok_or(AuthError::ProfileNotFound)?;

        if let Err(e) = self.gate_login(req, &session, &profile).await {
            tprintln!("auth.login gate failed: {}", e.code_str());
            // Undo the partial sign-in: the store already holds a session at
            // this point, and its change stream would otherwise reconcile the
            // user into a logged-in state the caller was just denied.
            if let Err(so) = self.credentials.sign_out().await {
                warn!("compensating sign out failed: {}", so);
            }
            return Err(e);
        }

        // Best effort: pick up server-side claims derived from the profile we
        // may have just updated, before re-reading it.
        if let Err(e) = self.credentials.refresh_session().await {
            tprintln!("auth.refresh best-effort failure: {}", e);
        }

        let attempt = self.publisher.begin_attempt();
        self.reconcile(attempt, &session).await;
        Ok(())
    }

    /// Role/account/verification gating plus the one-time bank elevation.
    async fn gate_login(
        &self,
        req: &LoginRequest,
        session: &Session,
        profile: &ProfileRow,
    ) -> AuthResult<()> {
        if profile.user_type != req.role {
            return Err(AuthError::RoleMismatch {
                stored: profile.user_type,
                requested: req.role,
            });
        }

        match req.role {
            Role::Client => {
                let account = req.account_number.as_deref().unwrap_or("");
                if account.is_empty() {
                    return Err(AuthError::AccountNumberRequired);
                }
                if profile.account_number.as_deref() != Some(account) {
                    return Err(AuthError::InvalidAccountNumber);
                }
            }
            Role::Bank => {
                let (bank, code) = match (
                    req.bank.as_deref().filter(|b| !b.is_empty()),
                    req.verification_code.as_deref().filter(|c| !c.is_empty()),
                ) {
                    (Some(b), Some(c)) => (b, c),
                    _ => return Err(AuthError::BankAndCodeRequired),
                };
                if !self.registry.is_valid(bank, code) {
                    return Err(AuthError::InvalidVerificationCode);
                }
                // One-time elevation: bind the profile to the bank on first
                // verified login. Re-login with the same valid code re-confirms
                // the same values and skips the write entirely.
                if !profile.is_verified || profile.bank_name.as_deref() != Some(bank) {
                    if let Some(bank_id) = self.banks.bank_id_by_name(bank).await? {
                        let patch = ProfilePatch {
                            bank_name: Some(bank.to_string()),
                            bank_id: Some(bank_id),
                            is_verified: Some(true),
                            verification_code: Some(code.to_string()),
                            ..Default::default()
                        };
                        self.profiles.update_profile(&session.user_id, &patch).await?;
                        tprintln!("auth.elevate subject={} bank={}", session.user_id, bank);
                    }
                }
            }
        }
        Ok(())
    }

    pub async fn signup(&self, req: &SignupRequest) -> AuthResult<()> {
        let _loading = self.publisher.begin_loading();
        tprintln!("auth.signup email={} role={}", req.email, req.role);

        let metadata = SignupMetadata {
            name: req.name.clone(),
            user_type: req.role,
            bank_name: req.bank.clone(),
            account_number: req.account_number.clone(),
            verification_code: req.verification_code.clone(),
        };
        let session = self
            .credentials
            .sign_up(&req.email, &req.password, &metadata)
            .await?;

        let mut patch = ProfilePatch {
            user_type: Some(req.role),
            ..Default::default()
        };
        match req.role {
            Role::Client => {
                if let Some(account) = req.account_number.as_deref().filter(|a| !a.is_empty()) {
                    patch.account_number = Some(account.to_string());
                }
            }
            Role::Bank => {
                if let Some(bank) = req.bank.as_deref().filter(|b| !b.is_empty()) {
                    if let Some(bank_id) = self.banks.bank_id_by_name(bank).await? {
                        patch.bank_name = Some(bank.to_string());
                        patch.bank_id = Some(bank_id);
                        patch.is_verified = Some(true);
                        patch.verification_code = req.verification_code.clone();
                    }
                }
            }
        }

        // Upsert by fallback: a store trigger may already have created the
        // stub row. Either way exactly one row exists afterwards.
        let affected = self.profiles.update_profile(&session.user_id, &patch).await?;
        if affected == 0 {
            self.profiles
                .insert_profile(&session.user_id, &req.email, &req.name, &patch)
                .await?;
        }

        if let Err(e) = self.credentials.refresh_session().await {
            tprintln!("auth.refresh best-effort failure: {}", e);
        }

        let attempt = self.publisher.begin_attempt();
        self.reconcile(attempt, &session).await;
        Ok(())
    }

    /// Sign out remotely, then clear local state unconditionally: the user and
    /// the authenticated flag must never diverge, even when the remote call
    /// fails.
    pub async fn logout(&self) {
        if let Err(e) = self.credentials.sign_out().await {
            warn!("remote sign out failed: {}, clearing local session anyway", e);
        }
        self.publisher.force_signed_out();
        self.publisher.clear_profile_error();
    }

    /// Exact-match client lookup for bank dashboards. A missing match (or a
    /// store fault) is `None`, never an error.
    pub async fn get_client_by_account_number(&self, account_number: &str)
        -> Option<ClientSummary> {
        match self.profiles.client_by_account_number(account_number).await {
            Ok(row) => row.as_ref().map(ClientSummary::project),
            Err(e) => {
                warn!("client lookup failed for {}: {}", account_number, e);
                None
            }
        }
    }
}

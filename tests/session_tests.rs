//! Session manager integration tests: bootstrap, login/signup gating, bank
//! elevation, logout and the reconciliation race guards, all against the
//! in-process backend.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use creditscore::error::{AuthError, AuthResult};
use creditscore::model::{ProfileRow, Role, Session, SignupMetadata};
use creditscore::registry::VerificationRegistry;
use creditscore::session::{LoginRequest, SessionManager, SignupRequest};
use creditscore::store::{
    AuthEvent, CredentialStore, MemoryBackend, ProfilePatch, ProfileStore,
};
use tokio::sync::broadcast;

const BOOT_TIMEOUT: Duration = Duration::from_secs(3);

fn manager_over(backend: &Arc<MemoryBackend>) -> Arc<SessionManager> {
    SessionManager::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        VerificationRegistry::default(),
        BOOT_TIMEOUT,
    )
}

fn client_login(email: &str, account: &str) -> LoginRequest {
    LoginRequest {
        email: email.into(),
        password: "s3cr3t!".into(),
        role: Role::Client,
        bank: None,
        account_number: Some(account.into()),
        verification_code: None,
    }
}

fn bank_login(email: &str, bank: &str, code: &str) -> LoginRequest {
    LoginRequest {
        email: email.into(),
        password: "s3cr3t!".into(),
        role: Role::Bank,
        bank: Some(bank.into()),
        account_number: None,
        verification_code: Some(code.into()),
    }
}

// Give the stream task a chance to drain pending notifications.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn login_and_logout_keep_flags_consistent() -> Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_client("Alice", "alice@example.com", "s3cr3t!", "ACC001234567");
    let mgr = manager_over(&backend);
    mgr.bootstrap().await;

    let state = mgr.state();
    assert!(!state.is_loading());
    assert_eq!(state.is_authenticated(), state.user().is_some());
    assert!(state.user().is_none());

    mgr.login(&client_login("alice@example.com", "ACC001234567")).await?;
    let state = mgr.state();
    assert!(state.is_authenticated() && state.user().is_some());
    assert_eq!(state.user().unwrap().role, Role::Client);
    assert!(!state.is_loading());

    mgr.logout().await;
    let state = mgr.state();
    assert!(!state.is_authenticated() && state.user().is_none());
    mgr.shutdown();
    Ok(())
}

/// Credential store that never answers the initial session fetch.
struct StalledStore {
    events: broadcast::Sender<AuthEvent>,
}

impl StalledStore {
    fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self { events }
    }
}

#[async_trait::async_trait]
impl CredentialStore for StalledStore {
    async fn current_session(&self) -> AuthResult<Option<Session>> {
        std::future::pending().await
    }
    async fn sign_in_with_password(&self, _: &str, _: &str) -> AuthResult<Session> {
        Err(AuthError::Backend("unreachable".into()))
    }
    async fn sign_up(&self, _: &str, _: &str, _: &SignupMetadata) -> AuthResult<Session> {
        Err(AuthError::Backend("unreachable".into()))
    }
    async fn sign_out(&self) -> AuthResult<()> {
        Ok(())
    }
    async fn refresh_session(&self) -> AuthResult<()> {
        Ok(())
    }
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[tokio::test(start_paused = true)]
async fn bootstrap_fails_open_when_store_never_responds() {
    let backend = Arc::new(MemoryBackend::new());
    let mgr = SessionManager::new(
        Arc::new(StalledStore::new()),
        backend.clone(),
        backend,
        VerificationRegistry::default(),
        BOOT_TIMEOUT,
    );

    let boot = {
        let mgr = mgr.clone();
        tokio::spawn(async move { mgr.bootstrap().await })
    };
    assert!(mgr.state().is_loading());

    // Just past the fallback deadline (virtual time).
    tokio::time::sleep(BOOT_TIMEOUT + Duration::from_millis(100)).await;
    let state = mgr.state();
    assert!(!state.is_loading());
    assert!(state.user().is_none());

    boot.abort();
    mgr.shutdown();
}

#[tokio::test]
async fn role_mismatch_rejected_and_state_unchanged() -> Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_client("Alice", "alice@example.com", "s3cr3t!", "ACC001234567");
    let mgr = manager_over(&backend);
    mgr.bootstrap().await;
    let before = mgr.state();

    let err = mgr
        .login(&bank_login("alice@example.com", "CBZ Bank", "CBZ-VERIFY-2024"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::RoleMismatch { .. }));
    assert_eq!(err.to_string(), "Account is registered as client, not bank");

    settle().await;
    assert_eq!(mgr.state(), before);
    mgr.shutdown();
    Ok(())
}

#[tokio::test]
async fn bank_elevation_happens_once_and_is_idempotent() -> Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let subject = backend.seed_bank_user("Bob", "bob@cbz.co.zw", "s3cr3t!");
    let mgr = manager_over(&backend);
    mgr.bootstrap().await;

    mgr.login(&bank_login("bob@cbz.co.zw", "CBZ Bank", "CBZ-VERIFY-2024")).await?;
    let first = backend.profile(&subject).unwrap();
    assert!(first.is_verified);
    assert_eq!(first.bank_name.as_deref(), Some("CBZ Bank"));
    assert_eq!(first.bank_id.as_deref(), Some("1"));
    assert_eq!(first.verification_code.as_deref(), Some("CBZ-VERIFY-2024"));

    // Second login with the same valid code: no duplicate elevation effects.
    mgr.login(&bank_login("bob@cbz.co.zw", "CBZ Bank", "CBZ-VERIFY-2024")).await?;
    let second = backend.profile(&subject).unwrap();
    assert_eq!(first, second);

    let state = mgr.state();
    assert!(state.user().unwrap().is_verified);
    mgr.shutdown();
    Ok(())
}

#[tokio::test]
async fn invalid_verification_code_rejects_without_mutation() -> Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let subject = backend.seed_bank_user("Bob", "bob@cbz.co.zw", "s3cr3t!");
    let mgr = manager_over(&backend);
    mgr.bootstrap().await;

    let err = mgr
        .login(&bank_login("bob@cbz.co.zw", "CBZ Bank", "WRONG"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidVerificationCode));

    let row = backend.profile(&subject).unwrap();
    assert!(!row.is_verified);
    assert!(row.bank_name.is_none() && row.bank_id.is_none());

    // Case-sensitive gate: the right code in the wrong case is still invalid.
    let err = mgr
        .login(&bank_login("bob@cbz.co.zw", "CBZ Bank", "cbz-verify-2024"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidVerificationCode));
    mgr.shutdown();
    Ok(())
}

#[tokio::test]
async fn missing_bank_or_code_is_rejected_up_front() -> Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_bank_user("Bob", "bob@cbz.co.zw", "s3cr3t!");
    let mgr = manager_over(&backend);
    mgr.bootstrap().await;

    let mut req = bank_login("bob@cbz.co.zw", "CBZ Bank", "CBZ-VERIFY-2024");
    req.verification_code = None;
    let err = mgr.login(&req).await.unwrap_err();
    assert!(matches!(err, AuthError::BankAndCodeRequired));

    let mut req = bank_login("bob@cbz.co.zw", "", "CBZ-VERIFY-2024");
    req.bank = Some(String::new());
    let err = mgr.login(&req).await.unwrap_err();
    assert!(matches!(err, AuthError::BankAndCodeRequired));
    mgr.shutdown();
    Ok(())
}

#[tokio::test]
async fn client_account_number_gating() -> Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_client("Alice", "alice@example.com", "s3cr3t!", "ACC001234567");
    let mgr = manager_over(&backend);
    mgr.bootstrap().await;

    let err = mgr.login(&client_login("alice@example.com", "")).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountNumberRequired));

    let err = mgr
        .login(&client_login("alice@example.com", "ACC999"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidAccountNumber));

    settle().await;
    assert!(mgr.state().user().is_none());
    mgr.shutdown();
    Ok(())
}

#[tokio::test]
async fn signup_takes_update_path_when_trigger_created_a_stub() -> Result<()> {
    // Stub creation on: the hosted trigger pre-creates the profile row.
    let backend = Arc::new(MemoryBackend::with_signup_stub(true));
    let mgr = manager_over(&backend);
    mgr.bootstrap().await;

    mgr.signup(&SignupRequest {
        name: "Carol".into(),
        email: "carol@example.com".into(),
        password: "s3cr3t!".into(),
        role: Role::Client,
        bank: None,
        account_number: Some("ACC555".into()),
        verification_code: None,
    })
    .await?;

    assert_eq!(backend.profile_count(), 1);
    let state = mgr.state();
    let user = state.user().expect("signed in after signup");
    assert_eq!(user.role, Role::Client);
    assert_eq!(user.account_number.as_deref(), Some("ACC555"));
    let row = backend.profile(&user.id).unwrap();
    assert_eq!(row.user_type, Role::Client);
    mgr.shutdown();
    Ok(())
}

#[tokio::test]
async fn signup_falls_back_to_insert_without_a_stub() -> Result<()> {
    let backend = Arc::new(MemoryBackend::with_signup_stub(false));
    let mgr = manager_over(&backend);
    mgr.bootstrap().await;

    mgr.signup(&SignupRequest {
        name: "Dana".into(),
        email: "dana@zb.co.zw".into(),
        password: "s3cr3t!".into(),
        role: Role::Bank,
        bank: Some("ZB Bank".into()),
        account_number: None,
        verification_code: Some("ZB-VERIFY-2024".into()),
    })
    .await?;

    assert_eq!(backend.profile_count(), 1);
    let state = mgr.state();
    let user = state.user().expect("signed in after signup");
    assert_eq!(user.role, Role::Bank);
    assert!(user.is_verified);
    assert_eq!(user.bank.as_deref(), Some("ZB Bank"));
    assert_eq!(user.bank_id.as_deref(), Some("6"));
    mgr.shutdown();
    Ok(())
}

#[tokio::test]
async fn logout_clears_state_even_when_remote_sign_out_fails() -> Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_client("Alice", "alice@example.com", "s3cr3t!", "ACC001234567");
    let mgr = manager_over(&backend);
    mgr.bootstrap().await;
    mgr.login(&client_login("alice@example.com", "ACC001234567")).await?;
    assert!(mgr.state().is_authenticated());

    backend.fail_next_sign_out();
    mgr.logout().await;
    let state = mgr.state();
    assert!(state.user().is_none());
    assert!(!state.is_authenticated());
    mgr.shutdown();
    Ok(())
}

#[tokio::test]
async fn stream_sign_out_clears_state() -> Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_client("Alice", "alice@example.com", "s3cr3t!", "ACC001234567");
    let mgr = manager_over(&backend);
    mgr.bootstrap().await;
    mgr.login(&client_login("alice@example.com", "ACC001234567")).await?;
    assert!(mgr.state().is_authenticated());

    // Sign-out from elsewhere (another tab): only the stream tells us.
    backend.sign_out().await?;
    settle().await;
    assert!(mgr.state().user().is_none());
    mgr.shutdown();
    Ok(())
}

/// Profile store wrapper that delays every fetch, for staleness races.
struct DelayedProfiles {
    inner: Arc<MemoryBackend>,
    delay: Duration,
}

#[async_trait::async_trait]
impl ProfileStore for DelayedProfiles {
    async fn profile_by_id(&self, id: &str) -> AuthResult<Option<ProfileRow>> {
        tokio::time::sleep(self.delay).await;
        self.inner.profile_by_id(id).await
    }
    async fn client_by_account_number(&self, n: &str) -> AuthResult<Option<ProfileRow>> {
        self.inner.client_by_account_number(n).await
    }
    async fn update_profile(&self, id: &str, patch: &ProfilePatch) -> AuthResult<usize> {
        self.inner.update_profile(id, patch).await
    }
    async fn insert_profile(&self, id: &str, email: &str, name: &str, patch: &ProfilePatch)
        -> AuthResult<()> {
        self.inner.insert_profile(id, email, name, patch).await
    }
}

#[tokio::test(start_paused = true)]
async fn slow_bootstrap_cannot_resurrect_a_newer_logout() -> Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_client("Alice", "alice@example.com", "s3cr3t!", "ACC001234567");
    // Session already held when the process starts.
    backend.sign_in_with_password("alice@example.com", "s3cr3t!").await?;

    let mgr = SessionManager::new(
        backend.clone(),
        Arc::new(DelayedProfiles { inner: backend.clone(), delay: Duration::from_secs(5) }),
        backend.clone(),
        VerificationRegistry::default(),
        BOOT_TIMEOUT,
    );

    let boot = {
        let mgr = mgr.clone();
        tokio::spawn(async move { mgr.bootstrap().await })
    };
    // Let bootstrap reach the slow profile fetch, then sign out underneath it.
    tokio::time::sleep(Duration::from_millis(10)).await;
    backend.sign_out().await?;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(mgr.state().user().is_none());

    // The stale fetch completes with a valid row; it must be dropped.
    tokio::time::sleep(Duration::from_secs(10)).await;
    let state = mgr.state();
    assert!(state.user().is_none());
    assert!(!state.is_loading());

    boot.await?;
    mgr.shutdown();
    Ok(())
}

/// Profile store that fails every fetch, for the banner path.
struct FailingProfiles;

#[async_trait::async_trait]
impl ProfileStore for FailingProfiles {
    async fn profile_by_id(&self, _: &str) -> AuthResult<Option<ProfileRow>> {
        Err(AuthError::Backend("profiles table unavailable".into()))
    }
    async fn client_by_account_number(&self, _: &str) -> AuthResult<Option<ProfileRow>> {
        Err(AuthError::Backend("profiles table unavailable".into()))
    }
    async fn update_profile(&self, _: &str, _: &ProfilePatch) -> AuthResult<usize> {
        Err(AuthError::Backend("profiles table unavailable".into()))
    }
    async fn insert_profile(&self, _: &str, _: &str, _: &str, _: &ProfilePatch)
        -> AuthResult<()> {
        Err(AuthError::Backend("profiles table unavailable".into()))
    }
}

#[tokio::test]
async fn unresolvable_profile_records_banner_and_presents_logged_out() -> Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_client("Alice", "alice@example.com", "s3cr3t!", "ACC001234567");
    backend.sign_in_with_password("alice@example.com", "s3cr3t!").await?;

    let mgr = SessionManager::new(
        backend.clone(),
        Arc::new(FailingProfiles),
        backend.clone(),
        VerificationRegistry::default(),
        BOOT_TIMEOUT,
    );
    mgr.bootstrap().await;

    let state = mgr.state();
    assert!(state.user().is_none());
    assert!(!state.is_loading());
    let banner = mgr.last_profile_error().expect("banner recorded");
    assert_eq!(banner.code_str(), "profile_load_failure");

    // The banner's forced-logout action clears it.
    mgr.logout().await;
    assert!(mgr.last_profile_error().is_none());
    mgr.shutdown();
    Ok(())
}

#[tokio::test]
async fn client_lookup_by_account_number_is_trimmed_and_total() -> Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_client("Alice", "alice@example.com", "s3cr3t!", "ACC001234567");
    let mgr = manager_over(&backend);
    mgr.bootstrap().await;

    let found = mgr.get_client_by_account_number("ACC001234567").await.unwrap();
    assert_eq!(found.name, "Alice");
    assert_eq!(found.account_number.as_deref(), Some("ACC001234567"));

    assert!(mgr.get_client_by_account_number("ACC000000000").await.is_none());
    mgr.shutdown();
    Ok(())
}

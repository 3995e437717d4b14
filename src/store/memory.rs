//! In-process backend: argon2-verified credentials and plain table maps.
//! Drives the test suite and local development without a hosted backend.

use crate::error::{AuthError, AuthResult};
use crate::model::{ProfileRow, Role, Session, SignupMetadata};
use crate::registry::VerificationRegistry;
use crate::store::{AuthEvent, BankDirectory, CredentialStore, ProfilePatch, ProfileStore};
use crate::tprintln;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use base64::Engine;
use chrono::Utc;
use parking_lot::RwLock;
use password_hash::{PasswordHash, SaltString};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

fn hash_password(password: &str) -> AuthResult<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| AuthError::Backend(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Backend(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Backend(e.to_string()))?
        .to_string();
    Ok(phc)
}

fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else {
        false
    }
}

fn gen_token() -> String {
    // 256-bit random token, base64url without padding
    let mut buf = [0u8; 32];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

#[derive(Debug, Clone)]
struct StoredCredential {
    subject_id: String,
    phc: String,
}

pub struct MemoryBackend {
    credentials: RwLock<HashMap<String, StoredCredential>>,
    profiles: RwLock<HashMap<String, ProfileRow>>,
    bank_ids: HashMap<String, String>,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
    // When set, signup pre-creates the profile stub row the way the hosted
    // backend's trigger does; the manager's upsert then takes the update path.
    signup_creates_stub: bool,
    fail_next_sign_out: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_signup_stub(true)
    }

    pub fn with_signup_stub(signup_creates_stub: bool) -> Self {
        let (events, _) = broadcast::channel(16);
        let bank_ids = VerificationRegistry::default()
            .list()
            .iter()
            .map(|e| (e.name.clone(), e.id.clone()))
            .collect();
        Self {
            credentials: RwLock::new(HashMap::new()),
            profiles: RwLock::new(HashMap::new()),
            bank_ids,
            session: RwLock::new(None),
            events,
            signup_creates_stub,
            fail_next_sign_out: AtomicBool::new(false),
        }
    }

    /// Seed a credential + client profile row; returns the subject id.
    pub fn seed_client(&self, name: &str, email: &str, password: &str, account_number: &str) -> String {
        self.seed_profile(name, email, password, Role::Client, Some(account_number))
    }

    /// Seed a credential + unverified bank profile row; returns the subject id.
    pub fn seed_bank_user(&self, name: &str, email: &str, password: &str) -> String {
        self.seed_profile(name, email, password, Role::Bank, None)
    }

    fn seed_profile(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
        account_number: Option<&str>,
    ) -> String {
        let subject_id = uuid::Uuid::new_v4().to_string();
        let phc = hash_password(password).expect("argon2 hash");
        self.credentials.write().insert(
            email.to_string(),
            StoredCredential { subject_id: subject_id.clone(), phc },
        );
        self.profiles.write().insert(
            subject_id.clone(),
            ProfileRow {
                id: subject_id.clone(),
                name: name.to_string(),
                email: email.to_string(),
                user_type: role,
                bank_name: None,
                bank_id: None,
                account_number: account_number.map(str::to_string),
                phone: None,
                address: None,
                is_verified: false,
                verification_code: None,
                created_at: Some(Utc::now()),
                updated_at: None,
                credit_scores: Vec::new(),
            },
        );
        subject_id
    }

    pub fn profile(&self, id: &str) -> Option<ProfileRow> {
        self.profiles.read().get(id).cloned()
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.read().len()
    }

    /// Make the next `sign_out` call fail, for remote-fault tests.
    pub fn fail_next_sign_out(&self) {
        self.fail_next_sign_out.store(true, Ordering::SeqCst);
    }

    fn issue_session(&self, subject_id: &str, email: &str) -> Session {
        let session = Session {
            user_id: subject_id.to_string(),
            email: email.to_string(),
            access_token: gen_token(),
            refresh_token: gen_token(),
        };
        *self.session.write() = Some(session.clone());
        session
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryBackend {
    async fn current_session(&self) -> AuthResult<Option<Session>> {
        Ok(self.session.read().clone())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        let cred = self
            .credentials
            .read()
            .get(email)
            .cloned()
            .ok_or_else(|| AuthError::InvalidCredentials("Invalid login credentials".into()))?;
        if !verify_password(&cred.phc, password) {
            return Err(AuthError::InvalidCredentials("Invalid login credentials".into()));
        }
        let session = self.issue_session(&cred.subject_id, email);
        tprintln!("store.sign_in email={} subject={}", email, cred.subject_id);
        let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignupMetadata,
    ) -> AuthResult<Session> {
        if self.credentials.read().contains_key(email) {
            return Err(AuthError::Signup("User already registered".into()));
        }
        let subject_id = uuid::Uuid::new_v4().to_string();
        let phc = hash_password(password)?;
        self.credentials.write().insert(
            email.to_string(),
            StoredCredential { subject_id: subject_id.clone(), phc },
        );
        if self.signup_creates_stub {
            // Trigger-style stub: identity columns only, patch fields come later.
            self.profiles.write().insert(
                subject_id.clone(),
                ProfileRow {
                    id: subject_id.clone(),
                    name: metadata.name.clone(),
                    email: email.to_string(),
                    user_type: metadata.user_type,
                    bank_name: None,
                    bank_id: None,
                    account_number: None,
                    phone: None,
                    address: None,
                    is_verified: false,
                    verification_code: None,
                    created_at: Some(Utc::now()),
                    updated_at: None,
                    credit_scores: Vec::new(),
                },
            );
        }
        let session = self.issue_session(&subject_id, email);
        tprintln!("store.sign_up email={} subject={}", email, subject_id);
        let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> AuthResult<()> {
        if self.fail_next_sign_out.swap(false, Ordering::SeqCst) {
            return Err(AuthError::Backend("sign out unavailable".into()));
        }
        *self.session.write() = None;
        let _ = self.events.send(AuthEvent::SignedOut);
        Ok(())
    }

    async fn refresh_session(&self) -> AuthResult<()> {
        let refreshed = {
            let mut guard = self.session.write();
            match guard.as_mut() {
                Some(session) => {
                    session.access_token = gen_token();
                    Some(session.clone())
                }
                None => None,
            }
        };
        if let Some(session) = refreshed {
            let _ = self.events.send(AuthEvent::TokenRefreshed(session));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[async_trait::async_trait]
impl ProfileStore for MemoryBackend {
    async fn profile_by_id(&self, id: &str) -> AuthResult<Option<ProfileRow>> {
        Ok(self.profiles.read().get(id).cloned())
    }

    async fn client_by_account_number(&self, account_number: &str)
        -> AuthResult<Option<ProfileRow>> {
        Ok(self
            .profiles
            .read()
            .values()
            .find(|p| {
                p.user_type == Role::Client
                    && p.account_number.as_deref() == Some(account_number)
            })
            .cloned())
    }

    async fn update_profile(&self, id: &str, patch: &ProfilePatch) -> AuthResult<usize> {
        let mut profiles = self.profiles.write();
        match profiles.get_mut(id) {
            Some(row) => {
                patch.apply_to(row);
                row.updated_at = Some(Utc::now());
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn insert_profile(
        &self,
        id: &str,
        email: &str,
        name: &str,
        patch: &ProfilePatch,
    ) -> AuthResult<()> {
        let mut row = ProfileRow {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            user_type: Role::Client,
            bank_name: None,
            bank_id: None,
            account_number: None,
            phone: None,
            address: None,
            is_verified: false,
            verification_code: None,
            created_at: Some(Utc::now()),
            updated_at: None,
            credit_scores: Vec::new(),
        };
        patch.apply_to(&mut row);
        self.profiles.write().insert(id.to_string(), row);
        Ok(())
    }
}

#[async_trait::async_trait]
impl BankDirectory for MemoryBackend {
    async fn bank_id_by_name(&self, name: &str) -> AuthResult<Option<String>> {
        Ok(self.bank_ids.get(name).cloned())
    }
}

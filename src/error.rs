//! Unified error model for the auth core. Every login/signup failure surfaces
//! here with the human-readable message the form layer renders inline;
//! reconciliation failures are recorded, not thrown (see session::state).

use crate::model::Role;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum AuthError {
    /// Bad email/password, propagated from the credential store.
    #[error("{0}")]
    InvalidCredentials(String),

    /// Authenticated subject has no profile row.
    #[error("Profile not found")]
    ProfileNotFound,

    /// Stored role differs from the role the form asked for.
    #[error("Account is registered as {stored}, not {requested}")]
    RoleMismatch { stored: Role, requested: Role },

    #[error("Account number is required for client login")]
    AccountNumberRequired,

    #[error("Invalid account number")]
    InvalidAccountNumber,

    #[error("Bank selection and verification code are required")]
    BankAndCodeRequired,

    /// Unknown bank or code mismatch (exact, case-sensitive lookup).
    #[error("Invalid verification code")]
    InvalidVerificationCode,

    #[error("Signup failed: {0}")]
    Signup(String),

    /// Reconciliation-only: recorded in the last-error slot, never re-thrown.
    #[error("Profile load failed: {0}")]
    ProfileLoad(String),

    /// Transport or backend fault outside the auth taxonomy.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl AuthError {
    /// Stable snake_case code for logs and wire payloads.
    pub fn code_str(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials(_) => "invalid_credentials",
            AuthError::ProfileNotFound => "profile_not_found",
            AuthError::RoleMismatch { .. } => "role_mismatch",
            AuthError::AccountNumberRequired => "account_number_required",
            AuthError::InvalidAccountNumber => "invalid_account_number",
            AuthError::BankAndCodeRequired => "bank_and_code_required",
            AuthError::InvalidVerificationCode => "invalid_verification_code",
            AuthError::Signup(_) => "signup_error",
            AuthError::ProfileLoad(_) => "profile_load_failure",
            AuthError::Backend(_) => "backend_error",
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Backend(err.to_string())
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

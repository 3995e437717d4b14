//! Profile table and bank directory contracts. The table is addressed only by
//! exact-match filters; updates report how many rows they touched so the
//! signup upsert can fall back to an insert.

use crate::error::AuthResult;
use crate::model::{ProfileRow, Role};
use serde::Serialize;

/// Partial update of a profile row. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_type: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
}

impl ProfilePatch {
    pub(crate) fn apply_to(&self, row: &mut ProfileRow) {
        if let Some(t) = self.user_type {
            row.user_type = t;
        }
        if let Some(b) = &self.bank_name {
            row.bank_name = Some(b.clone());
        }
        if let Some(b) = &self.bank_id {
            row.bank_id = Some(b.clone());
        }
        if let Some(a) = &self.account_number {
            row.account_number = Some(a.clone());
        }
        if let Some(v) = self.is_verified {
            row.is_verified = v;
        }
        if let Some(c) = &self.verification_code {
            row.verification_code = Some(c.clone());
        }
    }
}

#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    /// 0 or 1 row by credential subject id.
    async fn profile_by_id(&self, id: &str) -> AuthResult<Option<ProfileRow>>;

    /// 0 or 1 row by account number, restricted to client profiles.
    async fn client_by_account_number(&self, account_number: &str)
        -> AuthResult<Option<ProfileRow>>;

    /// Apply a patch; returns the affected row count (0 when the row is absent).
    async fn update_profile(&self, id: &str, patch: &ProfilePatch) -> AuthResult<usize>;

    /// Insert a fresh row carrying the patch fields. Used only when an update
    /// touched zero rows.
    async fn insert_profile(
        &self,
        id: &str,
        email: &str,
        name: &str,
        patch: &ProfilePatch,
    ) -> AuthResult<()>;
}

#[async_trait::async_trait]
pub trait BankDirectory: Send + Sync {
    /// Resolve a bank's id by exact name; `None` when unknown.
    async fn bank_id_by_name(&self, name: &str) -> AuthResult<Option<String>>;
}

//! Core data model: roles, sessions, profile rows as the backend returns them,
//! and the published projections (User, ClientSummary, AuthState).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Account role, fixed at signup. There is no transition between the two
/// without a logout in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Bank,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Bank => "bank",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Opaque proof of authentication issued by the credential store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// One computed scoring record joined onto a profile; only the most recent
/// is ever consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditScoreRow {
    pub score: i64,
    pub risk_level: RiskLevel,
    pub created_at: DateTime<Utc>,
}

/// A `profiles` table row, exactly as the backend returns it (one row per
/// credential subject, `credit_scores` embedded by the select).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub user_type: Role,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub bank_id: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub verification_code: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub credit_scores: Vec<CreditScoreRow>,
}

impl ProfileRow {
    /// Most recent scoring record, if the client has been scored at all.
    pub fn latest_score(&self) -> Option<&CreditScoreRow> {
        self.credit_scores.iter().max_by_key(|s| s.created_at)
    }
}

/// A `banks` directory row (login form listing, id resolution).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankRow {
    pub id: String,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Public projection of a profile row, the only user shape screens ever see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub bank: Option<String>,
    pub bank_id: Option<String>,
    pub account_number: Option<String>,
    pub credit_score: Option<i64>,
    pub risk_level: Option<RiskLevel>,
    pub is_verified: bool,
}

impl User {
    pub fn project(row: &ProfileRow) -> Self {
        let latest = row.latest_score();
        Self {
            id: row.id.clone(),
            name: row.name.clone(),
            email: row.email.clone(),
            role: row.user_type,
            bank: row.bank_name.clone(),
            bank_id: row.bank_id.clone(),
            account_number: row.account_number.clone(),
            credit_score: latest.map(|s| s.score),
            risk_level: latest.map(|s| s.risk_level),
            is_verified: row.is_verified,
        }
    }
}

/// Trimmed client projection served to bank dashboards: no bank-internal
/// fields, no verification state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub account_number: Option<String>,
    pub credit_score: Option<i64>,
    pub risk_level: Option<RiskLevel>,
}

impl ClientSummary {
    pub fn project(row: &ProfileRow) -> Self {
        let latest = row.latest_score();
        Self {
            id: row.id.clone(),
            name: row.name.clone(),
            email: row.email.clone(),
            account_number: row.account_number.clone(),
            credit_score: latest.map(|s| s.score),
            risk_level: latest.map(|s| s.risk_level),
        }
    }
}

/// Auxiliary metadata attached to a credential at signup; a backend trigger
/// may use it to pre-create the profile stub the upsert path expects.
#[derive(Debug, Clone, Serialize)]
pub struct SignupMetadata {
    pub name: String,
    pub user_type: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
}

/// Process-wide authentication snapshot. Constructed only through the three
/// constructors below, so `is_authenticated == user.is_some()` holds for
/// every reachable value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthState {
    user: Option<User>,
    is_loading: bool,
}

impl AuthState {
    /// Initial state at process start: nothing known yet.
    pub fn bootstrapping() -> Self {
        Self { user: None, is_loading: true }
    }

    pub fn signed_in(user: User) -> Self {
        Self { user: Some(user), is_loading: false }
    }

    pub fn signed_out() -> Self {
        Self { user: None, is_loading: false }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub(crate) fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scored_row() -> ProfileRow {
        ProfileRow {
            id: "u1".into(),
            name: "Alice".into(),
            email: "alice@example.com".into(),
            user_type: Role::Client,
            bank_name: None,
            bank_id: None,
            account_number: Some("ACC001234567".into()),
            phone: None,
            address: None,
            is_verified: false,
            verification_code: None,
            created_at: None,
            updated_at: None,
            credit_scores: vec![
                CreditScoreRow {
                    score: 540,
                    risk_level: RiskLevel::High,
                    created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                },
                CreditScoreRow {
                    score: 710,
                    risk_level: RiskLevel::Low,
                    created_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
                },
            ],
        }
    }

    #[test]
    fn projection_takes_most_recent_score() {
        let user = User::project(&scored_row());
        assert_eq!(user.credit_score, Some(710));
        assert_eq!(user.risk_level, Some(RiskLevel::Low));
    }

    #[test]
    fn client_summary_drops_bank_fields() {
        let mut row = scored_row();
        row.bank_name = Some("CBZ Bank".into());
        row.bank_id = Some("1".into());
        let summary = ClientSummary::project(&row);
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("bank").is_none());
        assert!(json.get("bank_id").is_none());
        assert!(json.get("is_verified").is_none());
    }

    #[test]
    fn auth_state_invariant_by_construction() {
        let boot = AuthState::bootstrapping();
        assert!(!boot.is_authenticated() && boot.user().is_none() && boot.is_loading());
        let out = AuthState::signed_out();
        assert!(!out.is_authenticated() && out.user().is_none() && !out.is_loading());
        let inn = AuthState::signed_in(User::project(&scored_row()));
        assert!(inn.is_authenticated() && inn.user().is_some() && !inn.is_loading());
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Client).unwrap(), "\"client\"");
        assert_eq!(serde_json::to_string(&Role::Bank).unwrap(), "\"bank\"");
        assert_eq!(serde_json::from_str::<RiskLevel>("\"medium\"").unwrap(), RiskLevel::Medium);
    }
}

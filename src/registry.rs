//! Verification code registry: the fixed bank-name -> code mapping that gates
//! bank-role elevation. Injectable so a real secret backend can replace the
//! seeded table without touching call sites. Lookups are exact and
//! case-sensitive, no normalization.

use crate::error::AuthResult;
use crate::store::BankDirectory;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BankEntry {
    pub id: String,
    pub name: String,
    pub code: String,
    pub verification_code: String,
}

impl BankEntry {
    fn new(id: &str, name: &str, code: &str, verification_code: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            code: code.to_string(),
            verification_code: verification_code.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerificationRegistry {
    entries: Vec<BankEntry>,
}

impl Default for VerificationRegistry {
    /// The ten recognized banks, codes 1:1 with names.
    fn default() -> Self {
        Self::with_entries(vec![
            BankEntry::new("1", "CBZ Bank", "CBZ", "CBZ-VERIFY-2024"),
            BankEntry::new("2", "Steward Bank", "STEW", "STEW-VERIFY-2024"),
            BankEntry::new("3", "Nedbank Zimbabwe", "NED", "NED-VERIFY-2024"),
            BankEntry::new("4", "Standard Chartered Bank", "SCB", "SCB-VERIFY-2024"),
            BankEntry::new("5", "First Capital Bank", "FCB", "FCB-VERIFY-2024"),
            BankEntry::new("6", "ZB Bank", "ZB", "ZB-VERIFY-2024"),
            BankEntry::new("7", "BancABC", "ABC", "ABC-VERIFY-2024"),
            BankEntry::new("8", "CABS", "CABS", "CABS-VERIFY-2024"),
            BankEntry::new("9", "Ecobank Zimbabwe", "ECO", "ECO-VERIFY-2024"),
            BankEntry::new("10", "NMB Bank", "NMB", "NMB-VERIFY-2024"),
        ])
    }
}

impl VerificationRegistry {
    pub fn with_entries(entries: Vec<BankEntry>) -> Self {
        Self { entries }
    }

    /// Full listing for the login form's bank selector.
    pub fn list(&self) -> &[BankEntry] {
        &self.entries
    }

    pub fn code_for(&self, bank_name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == bank_name)
            .map(|e| e.verification_code.as_str())
    }

    pub fn is_valid(&self, bank_name: &str, code: &str) -> bool {
        self.code_for(bank_name) == Some(code)
    }
}

// The seeded registry doubles as an in-process bank directory for the
// elevation path (bank name -> id), matching the hosted `banks` table ids.
#[async_trait::async_trait]
impl BankDirectory for VerificationRegistry {
    async fn bank_id_by_name(&self, name: &str) -> AuthResult<Option<String>> {
        Ok(self
            .entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.id.clone()))
    }
}

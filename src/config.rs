//! Environment-driven configuration. Mirrors the CREDSCORE_* variable
//! convention: every knob has a default so a bare process still starts.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the hosted backend, e.g. https://xyz.supabase.co
    pub supabase_url: String,
    /// Publishable (anon) API key sent as the `apikey` header.
    pub supabase_anon_key: String,
    /// Fail-open deadline for bootstrap: if neither the initial session fetch
    /// nor the change stream has cleared the loading flag by then, we force it.
    pub bootstrap_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let supabase_url = std::env::var("CREDSCORE_SUPABASE_URL")
            .unwrap_or_else(|_| "http://localhost:54321".to_string());
        let supabase_anon_key =
            std::env::var("CREDSCORE_SUPABASE_ANON_KEY").unwrap_or_default();
        let timeout_ms = std::env::var("CREDSCORE_BOOTSTRAP_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(3_000);
        Self {
            supabase_url,
            supabase_anon_key,
            bootstrap_timeout: Duration::from_millis(timeout_ms),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: String::new(),
            bootstrap_timeout: Duration::from_millis(3_000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_three_seconds() {
        assert_eq!(AppConfig::default().bootstrap_timeout, Duration::from_millis(3000));
    }
}

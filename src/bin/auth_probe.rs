//! Diagnostic entry point: bootstrap the session core against the configured
//! hosted backend and report the resolved auth state. Useful for checking
//! backend connectivity and the fail-open timer without the UI.

use creditscore::config::AppConfig;
use creditscore::registry::VerificationRegistry;
use creditscore::session::SessionManager;
use creditscore::store::SupabaseBackend;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let cfg = AppConfig::from_env();
    info!(
        "creditscore auth probe: backend='{}', bootstrap_timeout={:?}",
        cfg.supabase_url, cfg.bootstrap_timeout
    );

    let backend = Arc::new(SupabaseBackend::new(&cfg)?);
    let manager = SessionManager::new(
        backend.clone(),
        backend.clone(),
        backend,
        VerificationRegistry::default(),
        cfg.bootstrap_timeout,
    );

    manager.bootstrap().await;

    let state = manager.state();
    info!(
        "bootstrap settled: authenticated={}, loading={}",
        state.is_authenticated(),
        state.is_loading()
    );
    println!("{}", serde_json::to_string_pretty(&state)?);
    if let Some(err) = manager.last_profile_error() {
        println!("profile error banner: {}", err);
    }

    manager.shutdown();
    Ok(())
}

//! Session and authorization core for the CreditScore Pro application.
//! Owns the process-wide auth state: bootstrap from the credential store,
//! profile reconciliation, login/signup/logout flows and role-gated routing.

pub mod config;
pub mod error;
pub mod model;
pub mod registry;
pub mod router;
pub mod session;
pub mod store;

// Test-only printing helper: expands to tprintln! during tests and is absent otherwise.
// Usage: tprintln!("auth.login user={}", email);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In non-test builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        // Preserve formatting checks in release without producing code
        if false { let _ = format!($($arg)*); }
    });
}

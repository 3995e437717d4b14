//! Session management: the owned auth state, its publisher, and the manager
//! driving bootstrap, reconciliation and the login/signup/logout flows.

mod manager;
mod state;

pub use manager::{LoginRequest, SessionManager, SignupRequest};
pub use state::{AuthPublisher, LoadingGuard};

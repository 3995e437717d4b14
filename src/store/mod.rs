//! External store contracts and their two implementations: the in-process
//! backend (argon2-verified credentials, table maps) and the hosted backend
//! (GoTrue auth + PostgREST tables). Keep the public surface thin.

mod credential;
mod memory;
mod profile;
mod supabase;

pub use credential::{AuthEvent, CredentialStore};
pub use memory::MemoryBackend;
pub use profile::{BankDirectory, ProfilePatch, ProfileStore};
pub use supabase::SupabaseBackend;

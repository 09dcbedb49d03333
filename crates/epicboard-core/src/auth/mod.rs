//! Authentication module for managing credentials.
//!
//! This module provides:
//! - `CredentialStore`: Cookie-jar style token storage (memory, file, OS keyring)
//! - `Session`: Login persistence, token rotation and logout eviction
//!
//! "Remember me" logins keep tokens for 7 days; other logins keep them
//! until logout.

pub mod credentials;
pub mod session;

pub use credentials::{
    CookieAttributes, CredentialStore, FileCredentialStore, KeyringCredentialStore,
    MemoryCredentialStore, SameSite, StoredCredential, ACCESS_TOKEN, REFRESH_TOKEN,
};
pub use session::{CredentialPair, Session};

//! epicboard-core: authenticated API client, credential storage and models
//! for the epicboard project tracker.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod notify;

pub use api::{ApiClient, ApiError, RefreshPolicy, RequestContext};
pub use auth::{CredentialStore, Session};
pub use config::{ApiConfig, Config};
pub use notify::{Notifier, TracingNotifier};

//! REST API client module for the hosted backend.
//!
//! This module provides the `ApiClient` for signing in and managing
//! projects, epics and members.
//!
//! Every request goes through a `Pipeline` that attaches the API key and
//! bearer token and, on 401, renews the access token once with the stored
//! refresh token before replaying the request.

pub mod account;
pub mod client;
pub mod epics;
pub mod error;
pub mod members;
pub mod pipeline;
pub mod projects;
pub mod refresh;
pub mod request;


pub use client::{ApiClient, ApiClientBuilder};
pub use error::ApiError;
pub use pipeline::{HttpResponse, Outcome, Pipeline, RequestStage, ResponseStage, Transport};
pub use refresh::{RefreshExchange, RefreshPolicy, TokenResponse};
pub use request::RequestContext;

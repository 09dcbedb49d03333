//! Access token renewal on 401.
//!
//! `TokenRefresh` is a response stage. When a request comes back 401 and a
//! refresh token is stored, it exchanges the refresh token for a new access
//! token over a side channel (never through the pipeline), stores the
//! rotated tokens and replays the original request once. A request that
//! was already replayed is never refreshed again.
//!
//! If the exchange fails, both tokens are evicted, the user is notified and
//! the caller sees the original 401.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::pipeline::{HttpResponse, Outcome, Pipeline, ResponseStage};
use super::request::RequestContext;
use super::ApiError;
use crate::auth::Session;
use crate::config::ApiConfig;
use crate::notify::Notifier;

/// Token endpoint path for the refresh grant
pub const REFRESH_PATH: &str = "/auth/v1/token?grant_type=refresh_token";

/// How concurrent 401s share a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    /// One exchange at a time. A request that waited while another one
    /// rotated the token replays with the new token without exchanging.
    #[default]
    SingleFlight,
    /// Every 401 performs its own exchange.
    Naive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[async_trait]
pub trait RefreshExchange: Send + Sync {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenResponse, ApiError>;
}

/// Refresh grant against the hosted auth service.
pub struct TokenEndpoint {
    client: Client,
    url: String,
    api_key: String,
}

impl TokenEndpoint {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &ApiConfig) -> Self {
        Self {
            client,
            url: config.endpoint(REFRESH_PATH),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl RefreshExchange for TokenEndpoint {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenResponse, ApiError> {
        let response = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .header("apikey", &self.api_key)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::RefreshFailed(
                ApiError::from_status(status, &body).to_string(),
            ));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("Bad token response: {}", e)))
    }
}

pub struct TokenRefresh {
    session: Session,
    exchange: Arc<dyn RefreshExchange>,
    notifier: Arc<dyn Notifier>,
    policy: RefreshPolicy,
    in_flight: Mutex<()>,
}

impl TokenRefresh {
    pub fn new(
        session: Session,
        exchange: Arc<dyn RefreshExchange>,
        notifier: Arc<dyn Notifier>,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            session,
            exchange,
            notifier,
            policy,
            in_flight: Mutex::new(()),
        }
    }

    /// New access token for replaying `request`, or `None` when the
    /// original 401 should be returned.
    async fn renew(&self, request: &RequestContext, refresh_token: String) -> Option<String> {
        match self.policy {
            RefreshPolicy::Naive => self.exchange_and_store(&refresh_token).await,
            RefreshPolicy::SingleFlight => {
                let _guard = self.in_flight.lock().await;

                // Another request may have rotated the token while we waited.
                match self.session.access_token() {
                    Ok(Some(current)) if request.bearer() != Some(current.as_str()) => {
                        debug!(url = request.url(), "Token already rotated, replaying");
                        return Some(current);
                    }
                    _ => {}
                }

                match self.session.refresh_token() {
                    Ok(Some(latest)) => self.exchange_and_store(&latest).await,
                    Ok(None) => {
                        debug!("Refresh token evicted while waiting");
                        None
                    }
                    Err(e) => {
                        self.evict(&format!("Session expired: {}", e));
                        None
                    }
                }
            }
        }
    }

    async fn exchange_and_store(&self, refresh_token: &str) -> Option<String> {
        let tokens = match self.exchange.exchange(refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                self.evict(&format!("Session expired: {}", e));
                return None;
            }
        };

        if let Err(e) = self
            .session
            .rotate(&tokens.access_token, tokens.refresh_token.as_deref())
        {
            warn!(error = %e, "Failed to store refreshed tokens");
            self.evict(&format!("Session expired: {}", e));
            return None;
        }

        info!(
            rotated_refresh = tokens.refresh_token.is_some(),
            "Access token refreshed"
        );
        Some(tokens.access_token)
    }

    fn evict(&self, message: &str) {
        self.notifier.error(message);
        if let Err(e) = self.session.clear() {
            warn!(error = %e, "Failed to clear credentials");
        }
    }
}

#[async_trait]
impl ResponseStage for TokenRefresh {
    async fn inspect(
        &self,
        request: &RequestContext,
        outcome: Outcome,
        pipeline: &Pipeline,
    ) -> Outcome {
        let response: HttpResponse = match outcome {
            Ok(response) if response.status == StatusCode::UNAUTHORIZED => response,
            other => return other,
        };

        if !request.is_refreshable() {
            debug!(url = request.url(), "401 on request with its own credential");
            return Ok(response);
        }

        let refresh_token = match self.session.refresh_token() {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!(url = request.url(), "401 with no refresh token");
                return Ok(response);
            }
            Err(e) => {
                warn!(error = %e, "Failed to read refresh token");
                return Ok(response);
            }
        };

        if request.is_retried() {
            debug!(url = request.url(), "401 on replayed request, giving up");
            return Ok(response);
        }
        if request.is_cancelled() {
            debug!(url = request.url(), "401 on aborted request, not refreshing");
            return Ok(response);
        }

        match self.renew(request, refresh_token).await {
            Some(token) => {
                let replay = request.clone().mark_retried().with_bearer(token);
                pipeline.execute(replay).await
            }
            None => Ok(response),
        }
    }
}

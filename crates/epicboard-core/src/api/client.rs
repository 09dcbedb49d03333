//! API client for the hosted project management backend.
//!
//! `ApiClient` sends every request through the authenticated pipeline:
//! API key and bearer attachment on the way out, token refresh and a single
//! replay on 401 on the way back. Callers get the same response they would
//! get from the bare transport.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};

use super::pipeline::{
    ApiKeyHeader, BearerAuth, HttpResponse, Pipeline, ReqwestTransport, Transport,
};
use super::refresh::{RefreshExchange, RefreshPolicy, TokenEndpoint, TokenRefresh};
use super::request::RequestContext;
use super::ApiError;
use crate::auth::{CredentialStore, Session};
use crate::config::ApiConfig;
use crate::notify::{Notifier, TracingNotifier};

/// API client. Clone is cheap - the pipeline and session are shared.
#[derive(Clone)]
pub struct ApiClient {
    config: Arc<ApiConfig>,
    session: Session,
    notifier: Arc<dyn Notifier>,
    pipeline: Arc<Pipeline>,
    refresh_policy: RefreshPolicy,
}

pub struct ApiClientBuilder {
    config: ApiConfig,
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    policy: RefreshPolicy,
    transport: Option<Arc<dyn Transport>>,
    exchange: Option<Arc<dyn RefreshExchange>>,
}

impl ApiClientBuilder {
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the HTTP transport the pipeline wraps.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the side-channel refresh exchange.
    pub fn refresh_exchange(mut self, exchange: Arc<dyn RefreshExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(timeout)?),
        };
        let exchange: Arc<dyn RefreshExchange> = match self.exchange {
            Some(exchange) => exchange,
            None => Arc::new(TokenEndpoint::new(&self.config)?),
        };

        let session = Session::new(self.store, self.config.secure_cookies());
        let refresh = TokenRefresh::new(
            session.clone(),
            exchange,
            self.notifier.clone(),
            self.policy,
        );
        let pipeline = Pipeline::new(transport)
            .with_request_stage(Arc::new(ApiKeyHeader::new(&self.config.api_key)?))
            .with_request_stage(Arc::new(BearerAuth::new(session.clone())))
            .with_response_stage(Arc::new(refresh));

        Ok(ApiClient {
            config: Arc::new(self.config),
            session,
            notifier: self.notifier,
            pipeline: Arc::new(pipeline),
            refresh_policy: self.policy,
        })
    }
}

impl ApiClient {
    /// Create a client with default notifier, transport and single-flight
    /// refresh.
    pub fn new(config: ApiConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        Self::builder(config, store).build()
    }

    pub fn builder(config: ApiConfig, store: Arc<dyn CredentialStore>) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            store,
            notifier: Arc::new(TracingNotifier),
            policy: RefreshPolicy::default(),
            transport: None,
            exchange: None,
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        self.refresh_policy
    }

    /// Build a request for a path relative to the base URL.
    pub fn request(&self, method: Method, path: &str) -> RequestContext {
        RequestContext::new(method, self.config.endpoint(path))
            .with_header(
                reqwest::header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
    }

    /// Send through the pipeline. Non-2xx statuses are returned as
    /// responses, not errors.
    pub async fn send(&self, request: RequestContext) -> Result<HttpResponse, ApiError> {
        self.pipeline.execute(request).await
    }

    /// Check if response is successful, returning an error with body if not.
    pub fn check_response(response: HttpResponse) -> Result<HttpResponse> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(ApiError::from_status(response.status, &response.text()).into())
        }
    }

    /// Send and require a 2xx status.
    pub async fn execute(&self, request: RequestContext) -> Result<HttpResponse> {
        let url = request.url().to_string();
        let response = self
            .send(request)
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;
        Self::check_response(response)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.execute(self.request(Method::GET, path)).await?;
        response
            .json()
            .with_context(|| format!("Failed to parse JSON response from {}", path))
    }

    /// POST a body; PostgREST is asked to return the written rows.
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let request = self
            .request(Method::POST, path)
            .with_header(prefer(), HeaderValue::from_static("return=representation"))
            .with_json(serde_json::to_value(body)?);
        let response = self.execute(request).await?;
        response
            .json()
            .with_context(|| format!("Failed to parse JSON response from {}", path))
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = self
            .request(Method::PATCH, path)
            .with_header(prefer(), HeaderValue::from_static("return=representation"))
            .with_json(serde_json::to_value(body)?);
        let response = self.execute(request).await?;
        response
            .json()
            .with_context(|| format!("Failed to parse JSON response from {}", path))
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.execute(self.request(Method::DELETE, path)).await?;
        Ok(())
    }
}

fn prefer() -> HeaderName {
    HeaderName::from_static("prefer")
}

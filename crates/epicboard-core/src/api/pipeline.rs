//! Request pipeline.
//!
//! A `Pipeline` wraps a `Transport` with an ordered list of request stages
//! (run before every send, replays included) and response stages (run on
//! every outcome, in order). Response stages receive the pipeline itself so
//! they can resubmit a request through the full chain.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::request::RequestContext;
use super::ApiError;
use crate::auth::Session;

/// Result of sending a request: any HTTP response, or a transport failure.
pub type Outcome = Result<HttpResponse, ApiError>;

/// A fully-read HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON: {}", e)))
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestContext) -> Outcome;
}

/// Pre-send transform.
pub trait RequestStage: Send + Sync {
    fn prepare(&self, request: RequestContext) -> RequestContext;
}

/// Post-receive transform.
#[async_trait]
pub trait ResponseStage: Send + Sync {
    async fn inspect(
        &self,
        request: &RequestContext,
        outcome: Outcome,
        pipeline: &Pipeline,
    ) -> Outcome;
}

// ============================================================================
// Transport
// ============================================================================

/// Transport backed by a shared reqwest client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn dispatch(&self, request: &RequestContext) -> Outcome {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url())
            .headers(request.headers().clone());
        if let Some(token) = request.bearer() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &RequestContext) -> Outcome {
        match request.cancellation() {
            Some(token) => {
                if token.is_cancelled() {
                    return Err(ApiError::Aborted);
                }
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(url = request.url(), "Request aborted");
                        Err(ApiError::Aborted)
                    }
                    outcome = self.dispatch(request) => outcome,
                }
            }
            None => self.dispatch(request).await,
        }
    }
}

// ============================================================================
// Request stages
// ============================================================================

/// Adds the static `apikey` header every backend route requires.
pub struct ApiKeyHeader {
    value: HeaderValue,
}

impl ApiKeyHeader {
    pub fn new(api_key: &str) -> Result<Self, ApiError> {
        let value = HeaderValue::from_str(api_key)
            .map_err(|_| ApiError::InvalidConfig("API key is not a valid header value".into()))?;
        Ok(Self { value })
    }
}

impl RequestStage for ApiKeyHeader {
    fn prepare(&self, request: RequestContext) -> RequestContext {
        request.with_header(HeaderName::from_static("apikey"), self.value.clone())
    }
}

/// Attaches the stored access token as the bearer credential.
///
/// A request that already carries a bearer keeps it. With no stored token
/// the request goes out without an `Authorization` header.
pub struct BearerAuth {
    session: Session,
}

impl BearerAuth {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

impl RequestStage for BearerAuth {
    fn prepare(&self, request: RequestContext) -> RequestContext {
        if request.bearer().is_some() {
            return request;
        }
        match self.session.access_token() {
            Ok(Some(token)) => request.with_bearer(token),
            Ok(None) => request,
            Err(e) => {
                warn!(error = %e, "Failed to read access token, sending unauthenticated");
                request
            }
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct Pipeline {
    transport: Arc<dyn Transport>,
    request_stages: Vec<Arc<dyn RequestStage>>,
    response_stages: Vec<Arc<dyn ResponseStage>>,
}

impl Pipeline {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            request_stages: Vec::new(),
            response_stages: Vec::new(),
        }
    }

    pub fn with_request_stage(mut self, stage: Arc<dyn RequestStage>) -> Self {
        self.request_stages.push(stage);
        self
    }

    pub fn with_response_stage(mut self, stage: Arc<dyn ResponseStage>) -> Self {
        self.response_stages.push(stage);
        self
    }

    /// Run a request through every stage and the transport.
    pub fn execute(&self, request: RequestContext) -> BoxFuture<'_, Outcome> {
        async move {
            let request = self
                .request_stages
                .iter()
                .fold(request, |request, stage| stage.prepare(request));

            debug!(
                method = %request.method(),
                url = request.url(),
                retried = request.is_retried(),
                "Sending request"
            );
            let mut outcome = self.transport.send(&request).await;
            for stage in &self.response_stages {
                outcome = stage.inspect(&request, outcome, self).await;
            }
            outcome
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryCredentialStore;
    use std::sync::Mutex;

    /// Transport that records requests and answers from a script.
    struct ScriptedTransport {
        seen: Mutex<Vec<RequestContext>>,
        status: StatusCode,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: &RequestContext) -> Outcome {
            self.seen.lock().unwrap().push(request.clone());
            Ok(HttpResponse::new(self.status, b"{}".to_vec()))
        }
    }

    fn scripted(status: StatusCode) -> Arc<ScriptedTransport> {
        Arc::new(ScriptedTransport {
            seen: Mutex::new(Vec::new()),
            status,
        })
    }

    #[tokio::test]
    async fn test_bearer_attached_when_token_stored() {
        let transport = scripted(StatusCode::OK);
        let store = Arc::new(MemoryCredentialStore::with_tokens(Some("A1"), None));
        let pipeline = Pipeline::new(transport.clone())
            .with_request_stage(Arc::new(BearerAuth::new(Session::new(store, true))));

        pipeline
            .execute(RequestContext::get("http://localhost/x"))
            .await
            .unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].authorization().as_deref(), Some("Bearer A1"));
    }

    #[tokio::test]
    async fn test_no_authorization_without_token() {
        let transport = scripted(StatusCode::OK);
        let store = Arc::new(MemoryCredentialStore::new());
        let pipeline = Pipeline::new(transport.clone())
            .with_request_stage(Arc::new(ApiKeyHeader::new("anon").unwrap()))
            .with_request_stage(Arc::new(BearerAuth::new(Session::new(store, true))));

        pipeline
            .execute(RequestContext::get("http://localhost/x"))
            .await
            .unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].bearer(), None);
        assert_eq!(seen[0].authorization(), None);
        assert_eq!(seen[0].headers().get("apikey").unwrap(), "anon");
    }

    #[tokio::test]
    async fn test_explicit_bearer_is_kept() {
        let transport = scripted(StatusCode::OK);
        let store = Arc::new(MemoryCredentialStore::with_tokens(Some("A1"), None));
        let pipeline = Pipeline::new(transport.clone())
            .with_request_stage(Arc::new(BearerAuth::new(Session::new(store, true))));

        pipeline
            .execute(RequestContext::get("http://localhost/x").with_bearer("recovery"))
            .await
            .unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].bearer(), Some("recovery"));
    }

    #[tokio::test]
    async fn test_error_statuses_pass_through_without_stages() {
        let transport = scripted(StatusCode::INTERNAL_SERVER_ERROR);
        let pipeline = Pipeline::new(transport.clone());
        let response = pipeline
            .execute(RequestContext::get("http://localhost/x"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(transport.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_http_response_json() {
        let response = HttpResponse::new(StatusCode::OK, br#"{"access_token":"A2"}"#.to_vec());
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["access_token"], "A2");

        let broken = HttpResponse::new(StatusCode::OK, b"not json".to_vec());
        assert!(matches!(
            broken.json::<serde_json::Value>(),
            Err(ApiError::InvalidResponse(_))
        ));
    }
}

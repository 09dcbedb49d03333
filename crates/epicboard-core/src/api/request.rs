//! Outbound request values.
//!
//! A `RequestContext` is never mutated in place: every transformation
//! returns a modified copy, so the request a stage inspects is exactly the
//! one that was sent.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Value>,
    bearer: Option<String>,
    retried: bool,
    refreshable: bool,
    cancel: Option<CancellationToken>,
}

impl RequestContext {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            bearer: None,
            retried: false,
            refreshable: true,
            cancel: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach a bearer credential. Empty tokens are ignored so a request
    /// never goes out with a blank `Authorization` header.
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.bearer = if token.is_empty() { None } else { Some(token) };
        self
    }

    /// Copy with the retry marker set. The marker only ever goes from
    /// false to true.
    pub fn mark_retried(mut self) -> Self {
        self.retried = true;
        self
    }

    /// Copy that is never refreshed or replayed on 401. Used when the
    /// bearer is not the stored session token.
    pub fn without_refresh(mut self) -> Self {
        self.refreshable = false;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    /// `Authorization` header value, if a bearer is attached.
    pub fn authorization(&self) -> Option<String> {
        self.bearer.as_ref().map(|token| format!("Bearer {}", token))
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub fn is_refreshable(&self) -> bool {
        self.refreshable
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_request_is_unauthenticated_and_fresh() {
        let request = RequestContext::get("http://localhost/rest/v1/projects");
        assert_eq!(request.bearer(), None);
        assert_eq!(request.authorization(), None);
        assert!(!request.is_retried());
        assert!(request.is_refreshable());
        assert!(!request.is_cancelled());
    }

    #[test]
    fn test_without_refresh_survives_copies() {
        let request = RequestContext::get("http://localhost")
            .with_bearer("recovery")
            .without_refresh();
        let copy = request.clone().with_bearer("other");
        assert!(!request.is_refreshable());
        assert!(!copy.is_refreshable());
    }

    #[test]
    fn test_empty_bearer_is_not_attached() {
        let request = RequestContext::get("http://localhost").with_bearer("");
        assert_eq!(request.authorization(), None);
    }

    #[test]
    fn test_transformations_copy() {
        let original = RequestContext::post("http://localhost/rest/v1/epics")
            .with_json(serde_json::json!({"title": "Launch"}))
            .with_bearer("A1");
        let retry = original.clone().mark_retried().with_bearer("A2");

        assert!(!original.is_retried());
        assert_eq!(original.authorization().as_deref(), Some("Bearer A1"));
        assert!(retry.is_retried());
        assert_eq!(retry.authorization().as_deref(), Some("Bearer A2"));
        assert_eq!(retry.method(), original.method());
        assert_eq!(retry.url(), original.url());
        assert_eq!(retry.body(), original.body());
    }

    #[test]
    fn test_cancellation_is_shared_with_copies() {
        let token = CancellationToken::new();
        let request = RequestContext::get("http://localhost").with_cancellation(token.clone());
        let copy = request.clone().mark_retried();
        token.cancel();
        assert!(request.is_cancelled());
        assert!(copy.is_cancelled());
    }
}

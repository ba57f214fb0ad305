//! HTTP dispatch seam: one trait the executor calls, a reqwest implementation, and a
//! scripted mock for tests.
//!
//! Non-JSON response bodies are kept verbatim as strings; a later JSONPath miss on such
//! a body is the normal failure path, not a crash.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::metadata::HttpMethod;

/// Default outbound timeout; the engine overrides it from settings.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatch failure (no HTTP status was obtained).
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl DispatchError {
    /// Timeouts and connection resets get one retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connect(_))
    }
}

/// One outgoing HTTP call, fully constructed by the executor.
#[derive(Clone, Debug)]
pub struct HttpCall {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpCall {
    /// First value of a header, case-insensitive on the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The response as the executor sees it: status plus parsed-or-verbatim body.
#[derive(Clone, Debug)]
pub struct HttpReply {
    pub status: u16,
    pub body: Value,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outbound HTTP seam. Implementations must honor the configured timeout.
#[async_trait]
pub trait HttpDispatcher: Send + Sync {
    async fn dispatch(&self, call: &HttpCall) -> Result<HttpReply, DispatchError>;
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Options => reqwest::Method::OPTIONS,
    }
}

/// Reqwest-backed dispatcher.
pub struct ReqwestDispatcher {
    client: reqwest::Client,
}

impl ReqwestDispatcher {
    /// Client with the given timeout; JSON bodies set `Content-Type: application/json`.
    pub fn new(timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Other(e.to_string()))?;
        Ok(Self { client })
    }

    /// Use a caller-configured client (proxies, TLS, etc.).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpDispatcher for ReqwestDispatcher {
    async fn dispatch(&self, call: &HttpCall) -> Result<HttpReply, DispatchError> {
        let mut request = self
            .client
            .request(to_reqwest_method(call.method), call.url.clone());
        for (name, value) in &call.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DispatchError::Timeout
            } else if e.is_connect() {
                DispatchError::Connect(e.to_string())
            } else {
                DispatchError::Other(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| DispatchError::Other(e.to_string()))?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(HttpReply { status, body })
    }
}

type MockHandler = Box<dyn Fn(&HttpCall) -> Result<HttpReply, DispatchError> + Send + Sync>;

/// Scripted dispatcher for tests: a handler decides the reply, every call is recorded.
pub struct MockDispatcher {
    handler: MockHandler,
    calls: Mutex<Vec<HttpCall>>,
}

impl MockDispatcher {
    pub fn with_handler(
        handler: impl Fn(&HttpCall) -> Result<HttpReply, DispatchError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call gets the same status and body.
    pub fn always(status: u16, body: Value) -> Self {
        Self::with_handler(move |_| {
            Ok(HttpReply {
                status,
                body: body.clone(),
            })
        })
    }

    /// All dispatched calls so far, in order.
    pub fn calls(&self) -> Vec<HttpCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }
}

#[async_trait]
impl HttpDispatcher for MockDispatcher {
    async fn dispatch(&self, call: &HttpCall) -> Result<HttpReply, DispatchError> {
        self.calls.lock().expect("calls lock").push(call.clone());
        (self.handler)(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn mock_records_calls_and_replies() {
        let mock = MockDispatcher::always(200, json!({"ok": true}));
        let call = HttpCall {
            method: HttpMethod::Get,
            url: Url::parse("https://api.example/pets?status=available").unwrap(),
            headers: vec![("Authorization".to_string(), "Bearer t".to_string())],
            body: None,
        };
        let reply = mock.dispatch(&call).await.unwrap();
        assert!(reply.is_success());
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.calls()[0].header("authorization"), Some("Bearer t"));
    }

    #[test]
    fn retryable_classification() {
        assert!(DispatchError::Timeout.is_retryable());
        assert!(DispatchError::Connect("reset".into()).is_retryable());
        assert!(!DispatchError::Other("tls".into()).is_retryable());
    }
}

//! HTTP client port
//!
//! The engine hands fully built requests (URL with query, headers, encoded
//! body) to an `HttpClient` and gets back status, headers and body text.
//! Timeouts and cancellation belong to the client; whatever goes wrong below
//! the HTTP layer comes back as a `TransportError`.

use std::time::Duration;

use reqwest::Method;
use reqwest::header::HeaderMap;
use tracing::debug;

use crate::BoxFuture;

/// Outbound request, already encoded.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

/// Provider response as seen by the engine.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Media type without parameters, lowercased (`application/json`).
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
    }
}

/// Network-level failure: connect, TLS, timeout, broken body stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

/// Sends one request and returns the raw response.
///
/// Non-2xx statuses are *responses*, not errors. Only failures to get a
/// response at all are reported as `TransportError`.
pub trait HttpClient: Send + Sync {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>>;
}

/// `HttpClient` backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Client with a whole-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError(format!("building HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestHttpClient {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        Box::pin(async move {
            debug!(method = %request.method, url = %request.url, "sending provider request");

            let mut builder = self
                .client
                .request(request.method, &request.url)
                .headers(request.headers);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| TransportError(format!("request to {} failed: {e}", request.url)))?;

            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response
                .text()
                .await
                .map_err(|e| TransportError(format!("reading response body: {e}")))?;

            debug!(status, bytes = body.len(), "provider responded");
            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{CONTENT_TYPE, HeaderValue};

    #[test]
    fn success_range_is_2xx() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(301, "").is_success());
        assert!(!HttpResponse::new(401, "").is_success());
        assert!(!HttpResponse::new(500, "").is_success());
    }

    #[test]
    fn content_type_strips_parameters() {
        let mut response = HttpResponse::new(200, "{}");
        response.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("Application/JSON; charset=utf-8"),
        );
        assert_eq!(response.content_type().as_deref(), Some("application/json"));
    }

    #[test]
    fn content_type_absent() {
        assert!(HttpResponse::new(200, "").content_type().is_none());
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let client = ReqwestHttpClient::with_timeout(Duration::from_secs(2)).unwrap();
        // Port 1 on loopback has no listener.
        let request = HttpRequest::new(Method::GET, "http://127.0.0.1:1/");
        let err = client.send(request).await.unwrap_err();
        assert!(err.to_string().starts_with("transport failure:"), "got: {err}");
    }

    #[tokio::test]
    async fn malformed_url_is_transport_error() {
        let client = ReqwestHttpClient::default();
        let request = HttpRequest::new(Method::GET, "not a url");
        assert!(client.send(request).await.is_err());
    }
}

//! Test doubles shared by the engine's unit tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use ports::header::{CONTENT_TYPE, HeaderValue};
use ports::{BoxFuture, HttpClient, HttpRequest, HttpResponse, Logger, TransportError};
use reqwest::Url;
use serde_json::Value;
use tracing::Level;

use crate::config::{AdapterConfig, OAuth1Config, OAuth2Config, Protocol};

/// `HttpClient` that replays scripted responses in order and records every
/// request it was given.
#[derive(Default)]
pub(crate) struct StubHttpClient {
    responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl StubHttpClient {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push_json(&self, status: u16, body: Value) {
        let mut response = HttpResponse::new(status, body.to_string());
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub(crate) fn push_form(&self, status: u16, body: &str) {
        let mut response = HttpResponse::new(status, body);
        response.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub(crate) fn push_transport_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(TransportError(message.into())));
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl HttpClient for StubHttpClient {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        self.requests.lock().unwrap().push(request);
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError("no scripted response left".into())));
        Box::pin(async move { next })
    }
}

/// `Logger` that keeps every record for assertions.
#[derive(Default)]
pub(crate) struct RecordingLogger {
    records: Mutex<Vec<(Level, String)>>,
}

impl RecordingLogger {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn messages(&self, level: Level) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: Level, message: &str, _context: &[(&str, &str)]) {
        self.records
            .lock()
            .unwrap()
            .push((level, message.to_owned()));
    }
}

/// OAuth 2.0 adapter for a provider called `github`, code grant, no PKCE.
pub(crate) fn oauth2_config() -> AdapterConfig {
    AdapterConfig::new(
        "github",
        "https://app.example.com/callback",
        Protocol::OAuth2(
            OAuth2Config::new(
                "client-id",
                "https://provider.example.com/authorize",
                "https://provider.example.com/token",
            )
            .with_secret("client-secret"),
        ),
    )
    .with_api_base_url("https://api.example.com")
}

/// Same as `oauth2_config` with PKCE enabled.
pub(crate) fn oauth2_pkce_config() -> AdapterConfig {
    let mut config = oauth2_config();
    if let Protocol::OAuth2(oauth2) = &mut config.protocol {
        oauth2.pkce = true;
    }
    config
}

/// OAuth 1.0a adapter for a provider called `twitter`.
pub(crate) fn oauth1_config() -> AdapterConfig {
    AdapterConfig::new(
        "twitter",
        "https://app.example.com/callback",
        Protocol::OAuth1(OAuth1Config::new(
            "consumer-key",
            "consumer-secret",
            "https://provider.example.com/oauth/request_token",
            "https://provider.example.com/oauth/authorize",
            "https://provider.example.com/oauth/access_token",
        )),
    )
    .with_api_base_url("https://api.example.com/1.1")
}

pub(crate) fn query_param(url: &str, key: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

pub(crate) fn form_param(body: &str, key: &str) -> Option<String> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(body)
        .ok()?
        .into_iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
}

//! Token endpoint interactions
//!
//! Handles the two OAuth 2.0 token endpoint calls:
//! 1. Authorization code exchange (callback completion)
//! 2. Token refresh (proactive, or after an unexpected 401)
//!
//! Both POST form-encoded grants and turn the response (JSON or
//! form-encoded, providers differ) into a `CredentialSet`. The OAuth 1.0a
//! access-token response goes through the same conversion.

use common::Secret;
use ports::HttpResponse;
use serde_json::{Map, Value};

use crate::config::OAuth2Config;
use crate::credentials::{CredentialSet, now_secs};
use crate::dispatch::{Dispatcher, RequestDescriptor, accept_json, parse_body};
use crate::error::{Error, Result};

/// Where and how to refresh an OAuth 2.0 access token.
#[derive(Debug, Clone)]
pub struct RefreshEndpoint {
    pub url: String,
    pub client_id: String,
    pub client_secret: Option<Secret<String>>,
}

impl RefreshEndpoint {
    pub fn from_config(config: &OAuth2Config) -> Self {
        Self {
            url: config.refresh_url().to_owned(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }
}

/// Form for `grant_type=authorization_code`.
pub fn authorization_code_request(
    config: &OAuth2Config,
    redirect_uri: &str,
    code: &str,
    verifier: Option<&str>,
) -> RequestDescriptor {
    let mut descriptor = accept_json(RequestDescriptor::post(&config.access_token_url))
        .param("grant_type", "authorization_code")
        .param("code", code)
        .param("redirect_uri", redirect_uri)
        .param("client_id", &config.client_id);
    if let Some(secret) = &config.client_secret {
        descriptor = descriptor.param("client_secret", secret.expose());
    }
    if let Some(verifier) = verifier {
        descriptor = descriptor.param("code_verifier", verifier);
    }
    descriptor.params(
        config
            .token_parameters
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str())),
    )
}

/// Form for `grant_type=refresh_token`.
pub fn refresh_request(endpoint: &RefreshEndpoint, refresh_token: &str) -> RequestDescriptor {
    let descriptor = accept_json(RequestDescriptor::post(&endpoint.url))
        .param("grant_type", "refresh_token")
        .param("refresh_token", refresh_token)
        .param("client_id", &endpoint.client_id);
    match &endpoint.client_secret {
        Some(secret) => descriptor.param("client_secret", secret.expose()),
        None => descriptor,
    }
}

/// Exchange an authorization code for a credential set.
pub async fn exchange_code(
    dispatcher: &Dispatcher,
    config: &OAuth2Config,
    redirect_uri: &str,
    code: &str,
    verifier: Option<&str>,
) -> Result<CredentialSet> {
    let response = dispatcher
        .execute(authorization_code_request(config, redirect_uri, code, verifier))
        .await?;
    credentials_from_response(&response, now_secs())
}

/// Fetch a fresh token. The caller merges it into the current set.
pub async fn refresh_token(
    dispatcher: &Dispatcher,
    endpoint: &RefreshEndpoint,
    refresh_token: &str,
) -> Result<CredentialSet> {
    let response = dispatcher
        .execute(refresh_request(endpoint, refresh_token))
        .await?;
    credentials_from_response(&response, now_secs())
}

/// Parse a token endpoint response into a credential set.
pub fn credentials_from_response(response: &HttpResponse, now: u64) -> Result<CredentialSet> {
    CredentialSet::from_token_fields(object_fields(parse_body(response))?, now)
}

/// Token endpoints must answer with an object (JSON or form-encoded).
pub(crate) fn object_fields(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Err(Error::TokenResponse("empty response body".into())),
        other => Err(Error::TokenResponse(format!(
            "expected an object, got: {other}"
        ))),
    }
}

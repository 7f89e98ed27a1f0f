//! Signed request dispatcher
//!
//! Turns a `RequestDescriptor` into an encoded `HttpRequest`, attaches the
//! adapter's credentials, hands it to the `HttpClient` collaborator, and maps
//! the outcome onto engine errors:
//! - no response at all → `Error::Transport`
//! - non-2xx → `Error::Api { status, body }`
//!
//! `api_request` adds the one recovery the engine performs: a 401 on a token
//! that looked valid locally triggers a single refresh and a single replay.

use std::sync::Arc;

use ports::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use ports::{HttpClient, HttpRequest, HttpResponse, Logger, Method};
use serde_json::{Map, Value};
use tracing::Level;

use crate::credentials::CredentialSet;
use crate::error::{Error, Result};
use crate::lifecycle::TokenLifecycle;
use crate::signing::SigningScheme;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const JSON: &str = "application/json";

/// One outbound call, before encoding and signing.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
    /// Query parameters for GET/HEAD/DELETE/OPTIONS, body fields otherwise.
    pub parameters: Vec<(String, String)>,
    pub headers: HeaderMap,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            parameters: Vec::new(),
            headers: HeaderMap::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((key.into(), value.into()));
        self
    }

    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.parameters
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Send parameters as a JSON object body.
    pub fn json(self) -> Self {
        self.header(CONTENT_TYPE, HeaderValue::from_static(JSON))
    }

    /// Method sends parameters in the body rather than the query string.
    pub fn carries_body(&self) -> bool {
        !(self.method == Method::GET
            || self.method == Method::HEAD
            || self.method == Method::DELETE
            || self.method == Method::OPTIONS)
    }

    pub fn has_json_body(&self) -> bool {
        self.carries_body()
            && self
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.to_ascii_lowercase().starts_with(JSON))
    }
}

/// Sends provider requests on behalf of one adapter.
pub struct Dispatcher {
    http: Arc<dyn HttpClient>,
    logger: Arc<dyn Logger>,
    scheme: SigningScheme,
    api_base_url: Option<String>,
    identity: String,
}

impl Dispatcher {
    pub fn new(
        http: Arc<dyn HttpClient>,
        logger: Arc<dyn Logger>,
        scheme: SigningScheme,
        api_base_url: Option<String>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            http,
            logger,
            scheme,
            api_base_url,
            identity: identity.into(),
        }
    }

    pub fn scheme(&self) -> &SigningScheme {
        &self.scheme
    }

    /// Absolute URLs pass through; relative ones are joined onto the API base.
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_owned();
        }
        match &self.api_base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                url.trim_start_matches('/')
            ),
            None => url.to_owned(),
        }
    }

    /// Send without attaching credentials (token endpoints, OAuth 1.0a legs
    /// that sign themselves).
    pub async fn execute(&self, mut descriptor: RequestDescriptor) -> Result<HttpResponse> {
        descriptor.url = self.resolve_url(&descriptor.url);
        let request = encode_request(descriptor)?;
        let method = request.method.to_string();
        let target = strip_query(&request.url).to_owned();

        let response = match self.http.send(request).await {
            Ok(response) => response,
            Err(err) => {
                self.logger.log(
                    Level::WARN,
                    "provider request failed in transport",
                    &[
                        ("identity", self.identity.as_str()),
                        ("method", method.as_str()),
                        ("url", target.as_str()),
                        ("error", err.0.as_str()),
                    ],
                );
                return Err(err.into());
            }
        };

        if !response.is_success() {
            let status = response.status.to_string();
            self.logger.log(
                Level::WARN,
                "provider rejected request",
                &[
                    ("identity", self.identity.as_str()),
                    ("method", method.as_str()),
                    ("url", target.as_str()),
                    ("status", status.as_str()),
                ],
            );
            return Err(Error::Api {
                status: response.status,
                body: response.body,
            });
        }

        self.logger.log(
            Level::DEBUG,
            "provider request succeeded",
            &[
                ("identity", self.identity.as_str()),
                ("method", method.as_str()),
                ("url", target.as_str()),
            ],
        );
        Ok(response)
    }

    /// Attach `credentials` per the adapter's scheme, then send.
    pub async fn execute_signed(
        &self,
        mut descriptor: RequestDescriptor,
        credentials: &CredentialSet,
    ) -> Result<HttpResponse> {
        descriptor.url = self.resolve_url(&descriptor.url);
        self.scheme.apply(&mut descriptor, credentials)?;
        self.execute(descriptor).await
    }

    /// Signed API call with proactive refresh and a single 401 replay.
    pub async fn api_request(
        &self,
        lifecycle: &TokenLifecycle,
        descriptor: RequestDescriptor,
    ) -> Result<Value> {
        let credentials = lifecycle.valid_credentials(self).await?;

        match self.execute_signed(descriptor.clone(), &credentials).await {
            Ok(response) => Ok(parse_body(&response)),
            Err(err) if err.is_unauthorized() && lifecycle.can_refresh(&credentials) => {
                self.logger.log(
                    Level::INFO,
                    "provider rejected a locally valid token, refreshing and replaying once",
                    &[("identity", self.identity.as_str())],
                );
                let refreshed = lifecycle.refresh(self, credentials).await?;
                let response = self.execute_signed(descriptor, &refreshed).await?;
                Ok(parse_body(&response))
            }
            Err(err) => Err(err),
        }
    }
}

/// Encode parameters into the query or body and fill default headers.
pub fn encode_request(descriptor: RequestDescriptor) -> Result<HttpRequest> {
    let carries_body = descriptor.carries_body();
    let json_body = descriptor.has_json_body();
    let RequestDescriptor {
        method,
        url,
        parameters,
        mut headers,
    } = descriptor;

    headers
        .entry(USER_AGENT)
        .or_insert(HeaderValue::from_static(crate::constants::USER_AGENT));

    if !carries_body {
        return Ok(HttpRequest {
            url: append_query(&url, &parameters)?,
            method,
            headers,
            body: None,
        });
    }

    let body = if json_body {
        let object: Map<String, Value> = parameters
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        Some(Value::Object(object).to_string())
    } else if parameters.is_empty() {
        None
    } else {
        headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(FORM_URLENCODED));
        Some(
            serde_urlencoded::to_string(&parameters)
                .map_err(|e| Error::InvalidRequest(format!("encoding form body: {e}")))?,
        )
    };

    Ok(HttpRequest {
        method,
        url,
        headers,
        body,
    })
}

/// Provider-agnostic body parsing.
///
/// Empty → `null`; JSON as is; form-encoded → object of strings; anything
/// else → a JSON string.
pub fn parse_body(response: &HttpResponse) -> Value {
    let body = response.body.trim();
    if body.is_empty() {
        return Value::Null;
    }
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return value;
    }

    let declared_form = response.content_type().as_deref() == Some(FORM_URLENCODED);
    let looks_like_form = body.contains('=') && !body.contains(char::is_whitespace);
    if (declared_form || looks_like_form)
        && let Ok(pairs) = serde_urlencoded::from_str::<Vec<(String, String)>>(body)
    {
        return Value::Object(
            pairs
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        );
    }

    Value::String(body.to_owned())
}

/// Append form-encoded `params` to `url`'s query string.
pub(crate) fn append_query(url: &str, params: &[(String, String)]) -> Result<String> {
    if params.is_empty() {
        return Ok(url.to_owned());
    }
    let query = serde_urlencoded::to_string(params)
        .map_err(|e| Error::InvalidRequest(format!("encoding query: {e}")))?;
    let separator = if url.contains('?') { '&' } else { '?' };
    Ok(format!("{url}{separator}{query}"))
}

/// Request an `Accept: application/json` response (token endpoints).
pub(crate) fn accept_json(descriptor: RequestDescriptor) -> RequestDescriptor {
    descriptor.header(ACCEPT, HeaderValue::from_static(JSON))
}

/// URL without its query string, safe to log.
fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

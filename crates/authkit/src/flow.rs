//! Authentication flow state machine
//!
//! ```text
//! Unauthenticated ──begin──▶ AwaitingCallback ──finish──▶ Connected
//!        ▲                         │
//!        └──── callback error ─────┘
//! ```
//!
//! The state is never held in memory. `FlowState::resolve` derives it from
//! what storage holds, so a redirect issued by one process can be finished by
//! another.

use std::collections::HashMap;
use std::sync::Arc;

use ports::{Logger, Method};
use reqwest::Url;
use serde_json::{Map, Value};
use tracing::Level;

use crate::config::{AdapterConfig, OAuth1Config, OAuth2Config, Protocol, ResponseType};
use crate::credentials::{CredentialSet, now_secs};
use crate::dispatch::{Dispatcher, RequestDescriptor, append_query, parse_body};
use crate::error::{Error, Result};
use crate::lifecycle::TokenLifecycle;
use crate::pkce;
use crate::signing::OAuth1Signer;
use crate::store::{TokenField, TokenStore};
use crate::token;

/// Where an identity stands in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Unauthenticated,
    AwaitingCallback,
    Connected,
}

impl FlowState {
    pub async fn resolve(lifecycle: &TokenLifecycle) -> Result<Self> {
        if lifecycle.is_connected().await? {
            return Ok(FlowState::Connected);
        }
        let pending = lifecycle
            .store()
            .get(TokenField::FlowStateToken)
            .await?
            .is_some();
        Ok(if pending {
            FlowState::AwaitingCallback
        } else {
            FlowState::Unauthenticated
        })
    }
}

/// Query parameters of the request that hit the callback URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackRequest {
    params: HashMap<String, String>,
}

impl CallbackRequest {
    /// Parse a raw query string, with or without the leading `?`.
    pub fn from_query(query: &str) -> Result<Self> {
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_str(query.trim_start_matches('?'))
                .map_err(|e| Error::InvalidCallback(format!("unparseable query: {e}")))?;
        Ok(Self::from_pairs(pairs))
    }

    /// Parse a full callback URL. Fragment parameters (implicit grant) are
    /// merged over query parameters.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| Error::InvalidCallback(format!("invalid callback URL: {e}")))?;
        let mut request = Self::from_query(url.query().unwrap_or(""))?;
        if let Some(fragment) = url.fragment() {
            request.params.extend(Self::from_query(fragment)?.params);
        }
        Ok(request)
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            params: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Non-empty parameter value.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    fn has_any(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.params.contains_key(*k))
    }
}

/// Where the host must send the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectInstruction {
    pub url: String,
}

/// Outcome of `authenticate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    Connected,
    Redirect(RedirectInstruction),
}

impl Authentication {
    pub fn is_connected(&self) -> bool {
        matches!(self, Authentication::Connected)
    }

    pub fn redirect_url(&self) -> Option<&str> {
        match self {
            Authentication::Redirect(r) => Some(&r.url),
            Authentication::Connected => None,
        }
    }
}

const OAUTH2_CALLBACK_KEYS: [&str; 4] = ["code", "state", "error", "access_token"];
const OAUTH1_CALLBACK_KEYS: [&str; 3] = ["oauth_token", "oauth_verifier", "denied"];

enum Handshake {
    OAuth2(OAuth2Config),
    OAuth1 {
        config: OAuth1Config,
        signer: OAuth1Signer,
    },
}

/// Begins and finishes handshakes for one adapter.
pub struct AuthFlow {
    callback: String,
    handshake: Handshake,
    logger: Arc<dyn Logger>,
}

impl AuthFlow {
    pub fn new(config: &AdapterConfig, logger: Arc<dyn Logger>) -> Result<Self> {
        let handshake = match &config.protocol {
            Protocol::OAuth2(c) => Handshake::OAuth2(c.clone()),
            Protocol::OAuth1(c) => {
                let secret = c.consumer_secret.clone().ok_or_else(|| {
                    Error::Config("OAuth 1.0a adapter has no consumer secret".into())
                })?;
                Handshake::OAuth1 {
                    signer: OAuth1Signer::new(c.consumer_key.clone(), secret),
                    config: c.clone(),
                }
            }
        };
        Ok(Self {
            callback: config.callback.clone(),
            handshake,
            logger,
        })
    }

    /// Drive the handshake one step.
    ///
    /// Already connected → `Connected` without touching the network. No
    /// callback parameters → a new redirect. Callback parameters → verify and
    /// exchange; on failure every flow marker is cleared.
    pub async fn authenticate(
        &self,
        lifecycle: &TokenLifecycle,
        dispatcher: &Dispatcher,
        request: Option<&CallbackRequest>,
    ) -> Result<Authentication> {
        if lifecycle.is_connected().await? {
            return Ok(Authentication::Connected);
        }

        let store = lifecycle.store();
        let outcome = match request.filter(|r| self.is_callback(r)) {
            None => self.begin(store, dispatcher).await.map(Authentication::Redirect),
            Some(callback) => self.complete(store, dispatcher, callback).await,
        };

        if let Err(err) = &outcome {
            let reason = err.to_string();
            self.logger.log(
                Level::WARN,
                "authentication failed, flow reset",
                &[("identity", store.identity()), ("error", reason.as_str())],
            );
            if let Err(clear_err) = store.clear_flow().await {
                let reason = clear_err.to_string();
                self.logger.log(
                    Level::ERROR,
                    "failed to clear flow markers",
                    &[("identity", store.identity()), ("error", reason.as_str())],
                );
            }
        }
        outcome
    }

    fn is_callback(&self, request: &CallbackRequest) -> bool {
        match self.handshake {
            Handshake::OAuth2(_) => request.has_any(&OAUTH2_CALLBACK_KEYS),
            Handshake::OAuth1 { .. } => request.has_any(&OAUTH1_CALLBACK_KEYS),
        }
    }

    async fn begin(&self, store: &TokenStore, dispatcher: &Dispatcher) -> Result<RedirectInstruction> {
        store.clear_flow().await?;
        let url = match &self.handshake {
            Handshake::OAuth2(config) => self.begin_oauth2(store, config).await?,
            Handshake::OAuth1 { config, signer } => {
                self.begin_oauth1(store, dispatcher, config, signer).await?
            }
        };
        self.logger.log(
            Level::INFO,
            "authorization redirect issued",
            &[("identity", store.identity())],
        );
        Ok(RedirectInstruction { url })
    }

    async fn complete(
        &self,
        store: &TokenStore,
        dispatcher: &Dispatcher,
        callback: &CallbackRequest,
    ) -> Result<Authentication> {
        let credentials = match &self.handshake {
            Handshake::OAuth2(config) => {
                self.finish_oauth2(store, dispatcher, config, callback).await?
            }
            Handshake::OAuth1 { config, signer } => {
                self.finish_oauth1(store, dispatcher, config, signer, callback)
                    .await?
            }
        };
        store.save_credentials(&credentials).await?;
        store.clear_flow().await?;
        self.logger.log(
            Level::INFO,
            "authentication completed",
            &[("identity", store.identity())],
        );
        Ok(Authentication::Connected)
    }

    async fn begin_oauth2(&self, store: &TokenStore, config: &OAuth2Config) -> Result<String> {
        let state = pkce::generate_state_token();
        let mut params: Vec<(String, String)> = vec![
            ("response_type".into(), config.response_type.as_str().into()),
            ("client_id".into(), config.client_id.clone()),
            ("redirect_uri".into(), self.callback.clone()),
        ];
        if let Some(scope) = &config.scope {
            params.push(("scope".into(), scope.clone()));
        }
        params.extend(
            config
                .authorize_parameters
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        params.push(("state".into(), state.clone()));

        if uses_pkce(config) {
            let verifier = pkce::generate_verifier();
            params.push(("code_challenge".into(), pkce::compute_challenge(&verifier)));
            params.push(("code_challenge_method".into(), "S256".into()));
            store.set(TokenField::CodeVerifier, verifier).await?;
        }

        store.set(TokenField::FlowStateToken, state).await?;
        append_query(&config.authorize_url, &params)
    }

    async fn finish_oauth2(
        &self,
        store: &TokenStore,
        dispatcher: &Dispatcher,
        config: &OAuth2Config,
        callback: &CallbackRequest,
    ) -> Result<CredentialSet> {
        verify_state(store, callback.param("state")).await?;

        if let Some(error) = callback.param("error") {
            let detail = callback.param("error_description").unwrap_or(error);
            return Err(Error::AuthorizationDenied(format!("{error}: {detail}")));
        }

        match config.response_type {
            ResponseType::Code => {
                let code = callback.param("code").ok_or_else(|| {
                    Error::InvalidCallback("code grant callback carries no code".into())
                })?;
                let verifier = if uses_pkce(config) {
                    Some(
                        store
                            .get(TokenField::CodeVerifier)
                            .await?
                            .ok_or(Error::InvalidState)?,
                    )
                } else {
                    None
                };
                token::exchange_code(dispatcher, config, &self.callback, code, verifier.as_deref())
                    .await
            }
            ResponseType::Token => {
                if callback.param("access_token").is_none() {
                    return Err(Error::InvalidCallback(
                        "implicit grant callback carries no access_token".into(),
                    ));
                }
                let fields: Map<String, Value> = callback
                    .params
                    .iter()
                    .filter(|(k, _)| k.as_str() != "state")
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                CredentialSet::from_token_fields(fields, now_secs())
            }
        }
    }

    async fn begin_oauth1(
        &self,
        store: &TokenStore,
        dispatcher: &Dispatcher,
        config: &OAuth1Config,
        signer: &OAuth1Signer,
    ) -> Result<String> {
        let mut descriptor = RequestDescriptor::new(Method::POST, &config.request_token_url);
        signer.sign(&mut descriptor, None, &[("oauth_callback", self.callback.as_str())])?;
        let response = dispatcher.execute(descriptor).await?;
        let fields = token::object_fields(parse_body(&response))?;

        if let Some(confirmed) = fields.get("oauth_callback_confirmed")
            && confirmed.as_str() != Some("true")
        {
            return Err(Error::TokenResponse(
                "provider did not confirm the callback URL".into(),
            ));
        }
        let request_token = required_string(&fields, "oauth_token")?;
        let request_secret = required_string(&fields, "oauth_token_secret")?;

        store
            .set(TokenField::RequestTokenSecret, request_secret)
            .await?;
        store
            .set(TokenField::FlowStateToken, request_token.clone())
            .await?;
        append_query(
            &config.authorize_url,
            &[("oauth_token".into(), request_token)],
        )
    }

    async fn finish_oauth1(
        &self,
        store: &TokenStore,
        dispatcher: &Dispatcher,
        config: &OAuth1Config,
        signer: &OAuth1Signer,
        callback: &CallbackRequest,
    ) -> Result<CredentialSet> {
        // Denials echo the request token in `denied` instead of `oauth_token`.
        let echoed = callback
            .param("oauth_token")
            .or_else(|| callback.param("denied"));
        let request_token = verify_state(store, echoed).await?;

        if callback.param("denied").is_some() {
            return Err(Error::AuthorizationDenied(format!(
                "request token {request_token} was denied"
            )));
        }

        let verifier = callback
            .param("oauth_verifier")
            .ok_or_else(|| Error::InvalidCallback("missing oauth_verifier".into()))?;
        let request_secret = store
            .get(TokenField::RequestTokenSecret)
            .await?
            .ok_or(Error::InvalidState)?;

        let mut descriptor = RequestDescriptor::new(Method::POST, &config.access_token_url);
        signer.sign(
            &mut descriptor,
            Some((request_token.as_str(), request_secret.as_str())),
            &[("oauth_verifier", verifier)],
        )?;
        let response = dispatcher.execute(descriptor).await?;
        token::credentials_from_response(&response, now_secs())
    }
}

fn uses_pkce(config: &OAuth2Config) -> bool {
    config.pkce && config.response_type == ResponseType::Code
}

/// Compare the returned anti-forgery value with the pending one.
async fn verify_state(store: &TokenStore, received: Option<&str>) -> Result<String> {
    let expected = store.get(TokenField::FlowStateToken).await?;
    match (expected, received) {
        (Some(expected), Some(received)) if pkce::constant_time_eq(&expected, received) => {
            Ok(expected)
        }
        _ => Err(Error::InvalidState),
    }
}

fn required_string(fields: &Map<String, Value>, key: &str) -> Result<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| Error::TokenResponse(format!("request token response lacks {key}")))
}

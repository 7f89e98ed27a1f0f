//! Adapter facade
//!
//! One `Adapter` per provider identity, wired at construction from an
//! `AdapterConfig` and its `Collaborators`. It owns no session state; build
//! one per inbound request or share one across requests, storage decides
//! what the engine sees.

use std::sync::Arc;
use std::time::Duration;

use ports::{HttpClient, Logger, ReqwestHttpClient, Storage, TracingLogger};
use serde_json::Value;

use crate::config::{AdapterConfig, Protocol};
use crate::credentials::CredentialSet;
use crate::dispatch::{Dispatcher, RequestDescriptor};
use crate::error::Result;
use crate::flow::{AuthFlow, Authentication, CallbackRequest, FlowState};
use crate::lifecycle::TokenLifecycle;
use crate::signing::SigningScheme;
use crate::store::TokenStore;
use crate::token::RefreshEndpoint;
use crate::user::{
    Activity, ActivityStream, Contact, NoProviderApi, Page, Profile, ProviderApi, Status,
};

/// Pluggable dependencies, supplied once at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub http_client: Arc<dyn HttpClient>,
    pub storage: Arc<dyn Storage>,
    pub logger: Arc<dyn Logger>,
}

impl Collaborators {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        storage: Arc<dyn Storage>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            http_client,
            storage,
            logger,
        }
    }

    /// reqwest client with the configured timeout and a `tracing` logger.
    pub fn with_defaults(config: &AdapterConfig, storage: Arc<dyn Storage>) -> Result<Self> {
        let http = ReqwestHttpClient::with_timeout(Duration::from_secs(config.timeout_secs))?;
        Ok(Self::new(Arc::new(http), storage, Arc::new(TracingLogger)))
    }
}

pub struct Adapter {
    config: AdapterConfig,
    collaborators: Collaborators,
    dispatcher: Dispatcher,
    lifecycle: TokenLifecycle,
    flow: AuthFlow,
    api: Arc<dyn ProviderApi>,
}

impl Adapter {
    pub fn new(config: AdapterConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let store = TokenStore::new(collaborators.storage.clone(), config.identity.clone());
        let refresh = match &config.protocol {
            Protocol::OAuth2(c) => Some(RefreshEndpoint::from_config(c)),
            Protocol::OAuth1(_) => None,
        };
        let lifecycle = TokenLifecycle::new(
            store,
            refresh,
            config.refresh_skew_secs,
            collaborators.logger.clone(),
        );
        let dispatcher = Dispatcher::new(
            collaborators.http_client.clone(),
            collaborators.logger.clone(),
            SigningScheme::for_protocol(&config.protocol)?,
            config.api_base_url.clone(),
            config.identity.clone(),
        );
        let flow = AuthFlow::new(&config, collaborators.logger.clone())?;

        Ok(Self {
            config,
            collaborators,
            dispatcher,
            lifecycle,
            flow,
            api: Arc::new(NoProviderApi),
        })
    }

    /// Attach the provider's profile/contacts/status calls.
    pub fn with_provider_api(mut self, api: Arc<dyn ProviderApi>) -> Self {
        self.api = api;
        self
    }

    pub fn identity(&self) -> &str {
        &self.config.identity
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// `None` (or a request without callback parameters) starts a handshake;
    /// the provider's callback finishes it.
    pub async fn authenticate(&self, request: Option<&CallbackRequest>) -> Result<Authentication> {
        self.flow
            .authenticate(&self.lifecycle, &self.dispatcher, request)
            .await
    }

    /// Stored credentials are unexpired or refreshable. No network call.
    pub async fn is_connected(&self) -> Result<bool> {
        self.lifecycle.is_connected().await
    }

    pub async fn flow_state(&self) -> Result<FlowState> {
        FlowState::resolve(&self.lifecycle).await
    }

    /// Forget everything stored for this identity.
    pub async fn disconnect(&self) -> Result<()> {
        self.lifecycle.store().clear_all().await?;
        self.collaborators.logger.log(
            tracing::Level::INFO,
            "adapter disconnected",
            &[("identity", self.identity())],
        );
        Ok(())
    }

    pub async fn user_profile(&self) -> Result<Profile> {
        self.api.user_profile(self).await
    }

    pub async fn user_contacts(&self) -> Result<Vec<Contact>> {
        self.api.user_contacts(self).await
    }

    pub async fn user_pages(&self) -> Result<Vec<Page>> {
        self.api.user_pages(self).await
    }

    pub async fn user_activity(&self, stream: ActivityStream) -> Result<Vec<Activity>> {
        self.api.user_activity(self, stream).await
    }

    pub async fn set_user_status(&self, status: impl Into<Status>) -> Result<Value> {
        self.api.set_user_status(self, status.into()).await
    }

    pub async fn set_page_status(&self, status: impl Into<Status>, page_id: &str) -> Result<Value> {
        self.api.set_page_status(self, status.into(), page_id).await
    }

    /// Signed call to the provider's API; the parsed response body.
    pub async fn api_request(&self, descriptor: RequestDescriptor) -> Result<Value> {
        self.dispatcher
            .api_request(&self.lifecycle, descriptor)
            .await
    }

    /// `api_request` for a plain GET.
    pub async fn get(&self, url: &str) -> Result<Value> {
        self.api_request(RequestDescriptor::get(url)).await
    }

    pub async fn access_token(&self) -> Result<Option<CredentialSet>> {
        self.lifecycle.access_token().await
    }

    /// Install credentials obtained outside the handshake (e.g. migrated
    /// from another system).
    pub async fn set_access_token(&self, credentials: &CredentialSet) -> Result<()> {
        self.lifecycle.set_access_token(credentials).await
    }

    pub fn http_client(&self) -> &Arc<dyn HttpClient> {
        &self.collaborators.http_client
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.collaborators.storage
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.collaborators.logger
    }
}

//! Token lifecycle: keeps the stored credential set usable
//!
//! Every API call asks `valid_credentials` first:
//! - nothing stored → `ReauthenticationRequired`
//! - close to expiry with a refresh token → refresh, persist, return the new set
//! - expired without a refresh token → clear, `ReauthenticationRequired`
//! - otherwise the stored set as is
//!
//! A failed refresh never leaves a half-valid set behind: the credentials are
//! cleared and the caller has to start a new handshake.

use std::sync::Arc;

use ports::Logger;
use tracing::Level;

use crate::credentials::{CredentialSet, now_secs};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::store::TokenStore;
use crate::token::{self, RefreshEndpoint};

pub struct TokenLifecycle {
    store: TokenStore,
    refresh: Option<RefreshEndpoint>,
    skew_secs: u64,
    logger: Arc<dyn Logger>,
}

impl TokenLifecycle {
    /// `refresh` is `None` for protocols without a refresh grant (OAuth 1.0a).
    pub fn new(
        store: TokenStore,
        refresh: Option<RefreshEndpoint>,
        skew_secs: u64,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            store,
            refresh,
            skew_secs,
            logger,
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Stored set, without any freshness check.
    pub async fn access_token(&self) -> Result<Option<CredentialSet>> {
        self.store.load_credentials().await
    }

    /// Replace the stored set with one obtained elsewhere.
    pub async fn set_access_token(&self, credentials: &CredentialSet) -> Result<()> {
        self.store.save_credentials(credentials).await?;
        self.log(Level::INFO, "credentials replaced by host");
        Ok(())
    }

    /// A set is stored and it is either unexpired or refreshable.
    pub async fn is_connected(&self) -> Result<bool> {
        let now = now_secs();
        Ok(self
            .store
            .load_credentials()
            .await?
            .is_some_and(|set| !set.is_expired(now) || self.can_refresh(&set)))
    }

    pub fn can_refresh(&self, credentials: &CredentialSet) -> bool {
        self.refresh.is_some() && credentials.can_refresh()
    }

    /// Credentials fit to sign a request right now.
    pub async fn valid_credentials(&self, dispatcher: &Dispatcher) -> Result<CredentialSet> {
        let Some(current) = self.store.load_credentials().await? else {
            return Err(Error::ReauthenticationRequired(format!(
                "no credentials stored for {}",
                self.store.identity()
            )));
        };

        let now = now_secs();
        if !current.needs_refresh(now, self.skew_secs) {
            return Ok(current);
        }

        if self.can_refresh(&current) {
            self.log(Level::DEBUG, "access token close to expiry, refreshing");
            return self.refresh(dispatcher, current).await;
        }

        if current.is_expired(now) {
            self.store.clear_credentials().await?;
            self.log(Level::WARN, "access token expired and cannot be refreshed");
            return Err(Error::ReauthenticationRequired(
                "access token expired and no refresh token is available".into(),
            ));
        }

        Ok(current)
    }

    /// Run the refresh grant and persist the merged set.
    ///
    /// Any failure clears the stored credentials.
    pub async fn refresh(
        &self,
        dispatcher: &Dispatcher,
        current: CredentialSet,
    ) -> Result<CredentialSet> {
        let (Some(endpoint), Some(refresh_token)) = (&self.refresh, current.refresh_token.clone())
        else {
            self.store.clear_credentials().await?;
            return Err(Error::ReauthenticationRequired(
                "credentials cannot be refreshed".into(),
            ));
        };

        match token::refresh_token(dispatcher, endpoint, &refresh_token).await {
            Ok(fresh) => {
                let merged = current.refreshed_with(fresh);
                self.store.save_credentials(&merged).await?;
                self.log(Level::INFO, "access token refreshed");
                Ok(merged)
            }
            Err(err) => {
                self.store.clear_credentials().await?;
                let reason = err.to_string();
                self.logger.log(
                    Level::WARN,
                    "token refresh failed, credentials cleared",
                    &[
                        ("identity", self.store.identity()),
                        ("error", reason.as_str()),
                    ],
                );
                Err(Error::ReauthenticationRequired(format!(
                    "token refresh failed: {reason}"
                )))
            }
        }
    }

    fn log(&self, level: Level, message: &str) {
        self.logger
            .log(level, message, &[("identity", self.store.identity())]);
    }
}

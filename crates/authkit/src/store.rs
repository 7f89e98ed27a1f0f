//! Token store: typed access to one identity's slice of `Storage`
//!
//! Every value is kept under `{identity}.{field}`. A credential set is spread
//! over several keys; `load_credentials` only returns it when the pieces form
//! a structurally valid set.

use std::sync::Arc;

use ports::Storage;
use serde_json::{Map, Value};

use crate::credentials::CredentialSet;
use crate::error::{Error, Result};

/// Fields the engine persists per identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenField {
    AccessToken,
    AccessTokenSecret,
    RefreshToken,
    ExpiresAt,
    RawProviderFields,
    FlowStateToken,
    CodeVerifier,
    RequestTokenSecret,
}

impl TokenField {
    /// Fields making up a credential set.
    pub const CREDENTIALS: [TokenField; 5] = [
        TokenField::AccessToken,
        TokenField::AccessTokenSecret,
        TokenField::RefreshToken,
        TokenField::ExpiresAt,
        TokenField::RawProviderFields,
    ];

    /// Markers of a handshake in progress.
    pub const FLOW: [TokenField; 3] = [
        TokenField::FlowStateToken,
        TokenField::CodeVerifier,
        TokenField::RequestTokenSecret,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenField::AccessToken => "access_token",
            TokenField::AccessTokenSecret => "access_token_secret",
            TokenField::RefreshToken => "refresh_token",
            TokenField::ExpiresAt => "expires_at",
            TokenField::RawProviderFields => "raw_provider_fields",
            TokenField::FlowStateToken => "flow_state_token",
            TokenField::CodeVerifier => "code_verifier",
            TokenField::RequestTokenSecret => "request_token_secret",
        }
    }
}

/// Namespaced view over a `Storage` collaborator.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn Storage>,
    identity: String,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn Storage>, identity: impl Into<String>) -> Self {
        Self {
            storage,
            identity: identity.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn key(&self, field: TokenField) -> String {
        format!("{}.{}", self.identity, field.as_str())
    }

    pub async fn get(&self, field: TokenField) -> Result<Option<String>> {
        Ok(self.storage.get(&self.key(field)).await?)
    }

    pub async fn set(&self, field: TokenField, value: impl Into<String>) -> Result<()> {
        Ok(self.storage.set(&self.key(field), value.into()).await?)
    }

    pub async fn remove(&self, field: TokenField) -> Result<()> {
        Ok(self.storage.delete(&self.key(field)).await?)
    }

    /// Stored credential set, or `None` if absent or structurally broken.
    pub async fn load_credentials(&self) -> Result<Option<CredentialSet>> {
        let Some(access_token) = self.get(TokenField::AccessToken).await? else {
            return Ok(None);
        };

        let expires_at = match self.get(TokenField::ExpiresAt).await? {
            Some(raw) => match raw.parse::<u64>() {
                Ok(at) => Some(at),
                Err(_) => return Ok(None),
            },
            None => None,
        };

        let raw_provider_fields = match self.get(TokenField::RawProviderFields).await? {
            Some(raw) => match serde_json::from_str::<Map<String, Value>>(&raw) {
                Ok(map) => map,
                Err(_) => return Ok(None),
            },
            None => Map::new(),
        };

        let set = CredentialSet {
            access_token,
            access_token_secret: self.get(TokenField::AccessTokenSecret).await?,
            refresh_token: self.get(TokenField::RefreshToken).await?,
            expires_at,
            raw_provider_fields,
        };
        Ok(set.validate().is_ok().then_some(set))
    }

    /// Replace the stored credential set.
    ///
    /// Optional fields the new set lacks are deleted, so nothing of a
    /// previous set survives. The access token is written last.
    pub async fn save_credentials(&self, set: &CredentialSet) -> Result<()> {
        set.validate()?;

        self.put_optional(TokenField::AccessTokenSecret, set.access_token_secret.clone())
            .await?;
        self.put_optional(TokenField::RefreshToken, set.refresh_token.clone())
            .await?;
        self.put_optional(TokenField::ExpiresAt, set.expires_at.map(|at| at.to_string()))
            .await?;

        let raw = serde_json::to_string(&set.raw_provider_fields)
            .map_err(|e| Error::Storage(format!("encoding provider fields: {e}")))?;
        self.set(TokenField::RawProviderFields, raw).await?;
        self.set(TokenField::AccessToken, set.access_token.clone())
            .await
    }

    pub async fn clear_credentials(&self) -> Result<()> {
        for field in TokenField::CREDENTIALS {
            self.remove(field).await?;
        }
        Ok(())
    }

    pub async fn clear_flow(&self) -> Result<()> {
        for field in TokenField::FLOW {
            self.remove(field).await?;
        }
        Ok(())
    }

    /// Remove every key under this identity's namespace.
    pub async fn clear_all(&self) -> Result<()> {
        let prefix = format!("{}.", self.identity);
        Ok(self.storage.delete_matching(&prefix).await?)
    }

    async fn put_optional(&self, field: TokenField, value: Option<String>) -> Result<()> {
        match value {
            Some(value) => self.set(field, value).await,
            None => self.remove(field).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ports::MemoryStorage;
    use serde_json::json;

    fn store() -> (Arc<MemoryStorage>, TokenStore) {
        let storage = Arc::new(MemoryStorage::new());
        let store = TokenStore::new(storage.clone(), "github");
        (storage, store)
    }

    #[test]
    fn keys_are_namespaced() {
        let (_, store) = store();
        assert_eq!(store.key(TokenField::AccessToken), "github.access_token");
        assert_eq!(
            store.key(TokenField::FlowStateToken),
            "github.flow_state_token"
        );
        assert_eq!(store.identity(), "github");
    }

    #[tokio::test]
    async fn credentials_roundtrip() {
        let (_, store) = store();
        let mut set = CredentialSet::bearer("T")
            .with_refresh_token("R")
            .with_expires_at(4_600);
        set.raw_provider_fields
            .insert("scope".into(), json!("read:user"));

        store.save_credentials(&set).await.unwrap();
        assert_eq!(store.load_credentials().await.unwrap(), Some(set));
    }

    #[tokio::test]
    async fn absent_credentials_load_as_none() {
        let (_, store) = store();
        assert_eq!(store.load_credentials().await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_expiry_loads_as_none() {
        let (storage, store) = store();
        storage
            .set("github.access_token", "T".into())
            .await
            .unwrap();
        storage
            .set("github.expires_at", "tomorrow".into())
            .await
            .unwrap();
        assert_eq!(store.load_credentials().await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_access_token_loads_as_none() {
        let (storage, store) = store();
        storage.set("github.access_token", String::new()).await.unwrap();
        assert_eq!(store.load_credentials().await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_overwrites_every_field_of_previous_set() {
        let (storage, store) = store();
        let mut first = CredentialSet::bearer("T1")
            .with_refresh_token("R1")
            .with_expires_at(100);
        first.raw_provider_fields.insert("uid".into(), json!("1"));
        store.save_credentials(&first).await.unwrap();

        let second = CredentialSet::bearer("T2");
        store.save_credentials(&second).await.unwrap();

        assert_eq!(store.load_credentials().await.unwrap(), Some(second));
        assert_eq!(storage.get("github.refresh_token").await.unwrap(), None);
        assert_eq!(storage.get("github.expires_at").await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_rejects_invalid_set() {
        let (storage, store) = store();
        assert!(store.save_credentials(&CredentialSet::bearer("")).await.is_err());
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn clear_flow_leaves_credentials() {
        let (_, store) = store();
        store
            .save_credentials(&CredentialSet::bearer("T"))
            .await
            .unwrap();
        store.set(TokenField::FlowStateToken, "S").await.unwrap();
        store.set(TokenField::CodeVerifier, "V").await.unwrap();

        store.clear_flow().await.unwrap();
        assert_eq!(store.get(TokenField::FlowStateToken).await.unwrap(), None);
        assert_eq!(store.get(TokenField::CodeVerifier).await.unwrap(), None);
        assert!(store.load_credentials().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn clear_all_only_touches_own_namespace() {
        let storage = Arc::new(MemoryStorage::new());
        let github = TokenStore::new(storage.clone(), "github");
        let gitlab = TokenStore::new(storage.clone(), "gitlab");
        github
            .save_credentials(&CredentialSet::bearer("T"))
            .await
            .unwrap();
        gitlab
            .save_credentials(&CredentialSet::bearer("U"))
            .await
            .unwrap();

        github.clear_all().await.unwrap();
        assert!(github.load_credentials().await.unwrap().is_none());
        assert!(gitlab.load_credentials().await.unwrap().is_some());
    }
}

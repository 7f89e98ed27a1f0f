//! Adapter configuration
//!
//! One `AdapterConfig` describes one provider: its identity (the storage
//! namespace), the callback URL, and the protocol section with endpoints and
//! client credentials. Secrets never live in the TOML. They come from the
//! `{IDENTITY}_CLIENT_SECRET` env var, or from `client_secret_file`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use common::Secret;
use serde::Deserialize;

use crate::constants::{CLIENT_SECRET_ENV_SUFFIX, DEFAULT_REFRESH_SKEW_SECS, DEFAULT_TIMEOUT_SECS};

/// Root configuration for one adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    /// Storage namespace. Keys are written as `{identity}.{field}`.
    pub identity: String,
    /// Where the provider sends the user back (`redirect_uri` / `oauth_callback`).
    pub callback: String,
    /// Base for relative URLs passed to `api_request`.
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default = "default_refresh_skew")]
    pub refresh_skew_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    pub protocol: Protocol,
}

/// Protocol section, `[protocol.oauth2]` or `[protocol.oauth1]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    OAuth2(OAuth2Config),
    OAuth1(OAuth1Config),
}

/// OAuth 2.0 client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuth2Config {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    pub authorize_url: String,
    pub access_token_url: String,
    /// Defaults to `access_token_url`.
    #[serde(default)]
    pub refresh_token_url: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub pkce: bool,
    #[serde(default)]
    pub response_type: ResponseType,
    #[serde(default)]
    pub bearer: BearerPlacement,
    /// Extra query parameters on the authorization URL.
    #[serde(default)]
    pub authorize_parameters: BTreeMap<String, String>,
    /// Extra form parameters on the code exchange.
    #[serde(default)]
    pub token_parameters: BTreeMap<String, String>,
}

/// `code` (authorization code grant) or `token` (implicit grant).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    Code,
    Token,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Code => "code",
            ResponseType::Token => "token",
        }
    }
}

/// Where an OAuth 2.0 access token goes on API calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BearerPlacement {
    /// `Authorization: Bearer <token>`
    #[default]
    Header,
    /// `?<parameter>=<token>`
    Query { parameter: String },
}

/// OAuth 1.0a consumer settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuth1Config {
    pub consumer_key: String,
    #[serde(skip)]
    pub consumer_secret: Option<Secret<String>>,
    #[serde(default)]
    pub consumer_secret_file: Option<PathBuf>,
    pub request_token_url: String,
    pub authorize_url: String,
    pub access_token_url: String,
}

fn default_refresh_skew() -> u64 {
    DEFAULT_REFRESH_SKEW_SECS
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl OAuth2Config {
    pub fn new(
        client_id: impl Into<String>,
        authorize_url: impl Into<String>,
        access_token_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            client_secret_file: None,
            authorize_url: authorize_url.into(),
            access_token_url: access_token_url.into(),
            refresh_token_url: None,
            scope: None,
            pkce: false,
            response_type: ResponseType::Code,
            bearer: BearerPlacement::Header,
            authorize_parameters: BTreeMap::new(),
            token_parameters: BTreeMap::new(),
        }
    }

    pub fn with_secret(mut self, secret: impl Into<Secret<String>>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn refresh_url(&self) -> &str {
        self.refresh_token_url
            .as_deref()
            .unwrap_or(&self.access_token_url)
    }
}

impl OAuth1Config {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<Secret<String>>,
        request_token_url: impl Into<String>,
        authorize_url: impl Into<String>,
        access_token_url: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: Some(consumer_secret.into()),
            consumer_secret_file: None,
            request_token_url: request_token_url.into(),
            authorize_url: authorize_url.into(),
            access_token_url: access_token_url.into(),
        }
    }
}

impl AdapterConfig {
    pub fn new(identity: impl Into<String>, callback: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            identity: identity.into(),
            callback: callback.into(),
            api_base_url: None,
            refresh_skew_secs: DEFAULT_REFRESH_SKEW_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            protocol,
        }
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Load from a TOML file, resolve secrets, and validate.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse TOML, resolve secrets, and validate.
    ///
    /// Secret resolution order:
    /// 1. `{IDENTITY}_CLIENT_SECRET` env var
    /// 2. `client_secret_file` / `consumer_secret_file`
    pub fn from_toml(contents: &str) -> common::Result<Self> {
        let mut config: AdapterConfig = toml::from_str(contents)?;
        config.resolve_secret()?;
        config.validate()?;
        Ok(config)
    }

    /// Name of the env var consulted for this adapter's client secret.
    pub fn secret_env_var(&self) -> String {
        let prefix: String = self
            .identity
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{prefix}{CLIENT_SECRET_ENV_SUFFIX}")
    }

    fn resolve_secret(&mut self) -> common::Result<()> {
        let from_env = std::env::var(self.secret_env_var()).ok();
        let (slot, file) = match &mut self.protocol {
            Protocol::OAuth2(c) => (&mut c.client_secret, c.client_secret_file.as_ref()),
            Protocol::OAuth1(c) => (&mut c.consumer_secret, c.consumer_secret_file.as_ref()),
        };

        if let Some(secret) = from_env {
            *slot = Some(Secret::new(secret));
        } else if let Some(file) = file {
            let secret = std::fs::read_to_string(file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read secret file {}: {e}",
                    file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                *slot = Some(Secret::new(secret));
            }
        }
        Ok(())
    }

    /// Check the invariants the engine relies on.
    pub fn validate(&self) -> common::Result<()> {
        if self.identity.trim().is_empty() {
            return Err(common::Error::Config("identity must not be empty".into()));
        }
        if self.identity.contains('.') {
            return Err(common::Error::Config(format!(
                "identity must not contain '.', got: {}",
                self.identity
            )));
        }
        if self.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        require_http("callback", &self.callback)?;
        if let Some(base) = &self.api_base_url {
            require_http("api_base_url", base)?;
        }

        match &self.protocol {
            Protocol::OAuth2(c) => {
                if c.client_id.is_empty() {
                    return Err(common::Error::Config("client_id must not be empty".into()));
                }
                require_http("authorize_url", &c.authorize_url)?;
                require_http("access_token_url", &c.access_token_url)?;
                if let Some(url) = &c.refresh_token_url {
                    require_http("refresh_token_url", url)?;
                }
                if let BearerPlacement::Query { parameter } = &c.bearer
                    && parameter.is_empty()
                {
                    return Err(common::Error::Config(
                        "bearer query parameter must not be empty".into(),
                    ));
                }
            }
            Protocol::OAuth1(c) => {
                if c.consumer_key.is_empty() {
                    return Err(common::Error::Config(
                        "consumer_key must not be empty".into(),
                    ));
                }
                if c.consumer_secret.is_none() {
                    return Err(common::Error::Config(format!(
                        "OAuth 1.0a needs a consumer secret ({} or consumer_secret_file)",
                        self.secret_env_var()
                    )));
                }
                require_http("request_token_url", &c.request_token_url)?;
                require_http("authorize_url", &c.authorize_url)?;
                require_http("access_token_url", &c.access_token_url)?;
            }
        }
        Ok(())
    }
}

fn require_http(field: &str, value: &str) -> common::Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that touch process env vars.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn oauth2_toml() -> &'static str {
        r#"
identity = "github"
callback = "https://app.example.com/auth/callback"
api_base_url = "https://api.github.com/"

[protocol.oauth2]
client_id = "Iv1.abc"
authorize_url = "https://github.com/login/oauth/authorize"
access_token_url = "https://github.com/login/oauth/access_token"
scope = "read:user user:email"
pkce = true

[protocol.oauth2.authorize_parameters]
allow_signup = "false"
"#
    }

    #[test]
    fn parses_oauth2_config_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("GITHUB_CLIENT_SECRET") };

        let config = AdapterConfig::from_toml(oauth2_toml()).unwrap();
        assert_eq!(config.identity, "github");
        assert_eq!(config.refresh_skew_secs, DEFAULT_REFRESH_SKEW_SECS);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        let Protocol::OAuth2(oauth2) = &config.protocol else {
            panic!("expected oauth2 section");
        };
        assert!(oauth2.pkce);
        assert_eq!(oauth2.response_type, ResponseType::Code);
        assert_eq!(oauth2.bearer, BearerPlacement::Header);
        assert_eq!(oauth2.authorize_parameters["allow_signup"], "false");
        assert_eq!(oauth2.refresh_url(), oauth2.access_token_url);
        assert!(oauth2.client_secret.is_none());
    }

    #[test]
    fn client_secret_comes_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("GITHUB_CLIENT_SECRET", "shh") };

        let config = AdapterConfig::from_toml(oauth2_toml()).unwrap();
        unsafe { remove_env("GITHUB_CLIENT_SECRET") };

        let Protocol::OAuth2(oauth2) = &config.protocol else {
            panic!("expected oauth2 section");
        };
        assert_eq!(oauth2.client_secret.as_ref().unwrap().expose(), "shh");
        // never printed
        assert!(!format!("{config:?}").contains("shh"));
    }

    #[test]
    fn consumer_secret_comes_from_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("TWITTER_CLIENT_SECRET") };

        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("consumer.secret");
        std::fs::write(&secret_path, "  kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw\n").unwrap();

        let toml = format!(
            r#"
identity = "twitter"
callback = "https://app.example.com/auth/callback"

[protocol.oauth1]
consumer_key = "xvz1evFS4wEEPTGEFPHBog"
consumer_secret_file = "{}"
request_token_url = "https://api.twitter.com/oauth/request_token"
authorize_url = "https://api.twitter.com/oauth/authenticate"
access_token_url = "https://api.twitter.com/oauth/access_token"
"#,
            secret_path.display()
        );
        let config = AdapterConfig::from_toml(&toml).unwrap();
        let Protocol::OAuth1(oauth1) = &config.protocol else {
            panic!("expected oauth1 section");
        };
        assert_eq!(
            oauth1.consumer_secret.as_ref().unwrap().expose(),
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw"
        );
    }

    #[test]
    fn oauth1_without_secret_is_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("TUMBLR_CLIENT_SECRET") };

        let toml = r#"
identity = "tumblr"
callback = "https://app.example.com/cb"

[protocol.oauth1]
consumer_key = "ck"
request_token_url = "https://www.tumblr.com/oauth/request_token"
authorize_url = "https://www.tumblr.com/oauth/authorize"
access_token_url = "https://www.tumblr.com/oauth/access_token"
"#;
        let err = AdapterConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("TUMBLR_CLIENT_SECRET"), "got: {err}");
    }

    #[test]
    fn bearer_query_placement_parses() {
        let toml = r#"
identity = "legacy"
callback = "https://app.example.com/cb"

[protocol.oauth2]
client_id = "cid"
authorize_url = "https://legacy.example.com/authorize"
access_token_url = "https://legacy.example.com/token"
response_type = "token"
bearer = { query = { parameter = "access_token" } }
"#;
        let config = AdapterConfig::from_toml(toml).unwrap();
        let Protocol::OAuth2(oauth2) = &config.protocol else {
            panic!("expected oauth2 section");
        };
        assert_eq!(oauth2.response_type, ResponseType::Token);
        assert_eq!(
            oauth2.bearer,
            BearerPlacement::Query {
                parameter: "access_token".into()
            }
        );
    }

    #[test]
    fn rejects_non_http_urls() {
        let config = AdapterConfig::new(
            "github",
            "app.example.com/callback",
            Protocol::OAuth2(OAuth2Config::new(
                "cid",
                "https://github.com/login/oauth/authorize",
                "https://github.com/login/oauth/access_token",
            )),
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("callback"), "got: {err}");
    }

    #[test]
    fn rejects_dotted_or_empty_identity() {
        let protocol = Protocol::OAuth2(OAuth2Config::new(
            "cid",
            "https://p.example.com/authorize",
            "https://p.example.com/token",
        ));
        let dotted = AdapterConfig::new("a.b", "https://app.example.com/cb", protocol.clone());
        assert!(dotted.validate().is_err());

        let empty = AdapterConfig::new("  ", "https://app.example.com/cb", protocol);
        assert!(empty.validate().is_err());
    }

    #[test]
    fn secret_env_var_is_derived_from_identity() {
        let config = AdapterConfig::new(
            "windows-live",
            "https://app.example.com/cb",
            Protocol::OAuth2(OAuth2Config::new(
                "cid",
                "https://p.example.com/authorize",
                "https://p.example.com/token",
            )),
        );
        assert_eq!(config.secret_env_var(), "WINDOWS_LIVE_CLIENT_SECRET");
    }

    #[test]
    fn load_missing_file_fails() {
        assert!(AdapterConfig::load(Path::new("/nonexistent/adapter.toml")).is_err());
    }
}

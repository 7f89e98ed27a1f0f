//! Credential sets: the token bundle one adapter identity holds
//!
//! `expires_at` is a unix timestamp in seconds (absolute). A missing
//! `expires_at` means the token does not expire; a missing `refresh_token`
//! means an expired token can only be replaced by a new handshake.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Access credentials for one adapter identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialSet {
    pub access_token: String,
    /// OAuth 1.0a token secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// Every field the provider returned with the token, verbatim.
    #[serde(default)]
    pub raw_provider_fields: Map<String, Value>,
}

impl CredentialSet {
    /// Non-expiring bearer token with no refresh capability.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            access_token_secret: None,
            refresh_token: None,
            expires_at: None,
            raw_provider_fields: Map::new(),
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expires_at(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.access_token_secret = Some(secret.into());
        self
    }

    /// Reject sets that could not be used to sign anything.
    pub fn validate(&self) -> Result<()> {
        if self.access_token.is_empty() {
            return Err(Error::InvalidCredentials(
                "access_token must not be empty".into(),
            ));
        }
        if self.refresh_token.as_deref() == Some("") {
            return Err(Error::InvalidCredentials(
                "refresh_token must be absent or non-empty".into(),
            ));
        }
        if self.access_token_secret.as_deref() == Some("") {
            return Err(Error::InvalidCredentials(
                "access_token_secret must be absent or non-empty".into(),
            ));
        }
        Ok(())
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Past its literal expiry.
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Within `skew` seconds of expiry, or past it.
    pub fn needs_refresh(&self, now: u64, skew: u64) -> bool {
        self.expires_at
            .is_some_and(|at| at <= now.saturating_add(skew))
    }

    /// Still valid, or expired but recoverable through a refresh.
    pub fn is_usable(&self, now: u64) -> bool {
        !self.is_expired(now) || self.can_refresh()
    }

    /// Merge a refresh response into this set.
    ///
    /// The refresh token is carried over unless the provider rotated it.
    /// Raw fields are merged, newer values win.
    pub fn refreshed_with(mut self, fresh: CredentialSet) -> CredentialSet {
        self.access_token = fresh.access_token;
        self.expires_at = fresh.expires_at;
        if fresh.access_token_secret.is_some() {
            self.access_token_secret = fresh.access_token_secret;
        }
        if fresh.refresh_token.is_some() {
            self.refresh_token = fresh.refresh_token;
        }
        self.raw_provider_fields.extend(fresh.raw_provider_fields);
        self
    }

    /// Build a set from a token endpoint (or implicit callback) payload.
    ///
    /// Accepts OAuth 2.0 (`access_token`) and OAuth 1.0a (`oauth_token` +
    /// `oauth_token_secret`) field names. Expiry comes from `expires_in` or
    /// `expires` (seconds from `now`), or from `expires_at` (absolute).
    pub fn from_token_fields(mut fields: Map<String, Value>, now: u64) -> Result<Self> {
        let access_token = string_field(&fields, "access_token")
            .or_else(|| string_field(&fields, "oauth_token"))
            .ok_or_else(|| {
                Error::TokenResponse(format!(
                    "no access token in provider response (fields: {})",
                    field_names(&fields)
                ))
            })?;

        let expires_at = match expiry_field(&fields, "expires_in")?
            .or(expiry_field(&fields, "expires")?)
        {
            Some(delta) => Some(now.saturating_add(delta)),
            None => expiry_field(&fields, "expires_at")?,
        };

        let access_token_secret = string_field(&fields, "oauth_token_secret");
        let refresh_token = string_field(&fields, "refresh_token");
        // Tokens live in their own fields; keep only one copy of each.
        for key in TOKEN_KEYS {
            fields.remove(key);
        }

        let set = Self {
            access_token,
            access_token_secret,
            refresh_token,
            expires_at,
            raw_provider_fields: fields,
        };
        set.validate()
            .map_err(|e| Error::TokenResponse(e.to_string()))?;
        Ok(set)
    }
}

/// Seconds since the unix epoch.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Provider fields already held as typed values.
const TOKEN_KEYS: [&str; 4] = [
    "access_token",
    "oauth_token",
    "oauth_token_secret",
    "refresh_token",
];

/// Expiry in seconds. Providers send JSON numbers (sometimes floats) or
/// numeric strings; anything else, or a negative value, is rejected.
fn expiry_field(fields: &Map<String, Value>, key: &str) -> Result<Option<u64>> {
    let value = match fields.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(value) => value,
    };
    let seconds = match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(whole_seconds)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole_seconds))
        }
        _ => None,
    };
    seconds.map(Some).ok_or_else(|| {
        Error::TokenResponse(format!("{key} is not a non-negative number: {value}"))
    })
}

fn whole_seconds(value: f64) -> Option<u64> {
    (value.is_finite() && value >= 0.0).then(|| value as u64)
}

fn field_names(fields: &Map<String, Value>) -> String {
    fields.keys().cloned().collect::<Vec<_>>().join(", ")
}

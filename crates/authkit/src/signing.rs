//! Credential attachment for outbound API calls
//!
//! Two schemes, chosen per adapter from its protocol section:
//! - `OAuth2Bearer`: access token as `Authorization: Bearer` or as a query
//!   parameter
//! - `OAuth1Signing`: RFC 5849 HMAC-SHA1 signature in an
//!   `Authorization: OAuth` header
//!
//! Signing works on a `RequestDescriptor` before it is encoded, so the
//! signature covers exactly the parameters that go on the wire.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::Secret;
use hmac::{Hmac, Mac};
use ports::header::{AUTHORIZATION, HeaderValue};
use reqwest::Url;
use sha1::Sha1;

use crate::config::{BearerPlacement, Protocol};
use crate::credentials::{CredentialSet, now_secs};
use crate::dispatch::{RequestDescriptor, append_query};
use crate::error::{Error, Result};

type HmacSha1 = Hmac<Sha1>;

/// How credentials are attached to API calls.
#[derive(Debug, Clone)]
pub enum SigningScheme {
    OAuth2Bearer(BearerPlacement),
    OAuth1Signing(OAuth1Signer),
}

impl SigningScheme {
    pub fn for_protocol(protocol: &Protocol) -> Result<Self> {
        match protocol {
            Protocol::OAuth2(c) => Ok(SigningScheme::OAuth2Bearer(c.bearer.clone())),
            Protocol::OAuth1(c) => {
                let secret = c.consumer_secret.clone().ok_or_else(|| {
                    Error::Config("OAuth 1.0a adapter has no consumer secret".into())
                })?;
                Ok(SigningScheme::OAuth1Signing(OAuth1Signer::new(
                    c.consumer_key.clone(),
                    secret,
                )))
            }
        }
    }

    /// Attach `credentials` to the request.
    pub fn apply(&self, descriptor: &mut RequestDescriptor, credentials: &CredentialSet) -> Result<()> {
        match self {
            SigningScheme::OAuth2Bearer(BearerPlacement::Header) => {
                let value = HeaderValue::from_str(&format!("Bearer {}", credentials.access_token))
                    .map_err(|e| Error::InvalidCredentials(format!("invalid token value: {e}")))?;
                descriptor.headers.insert(AUTHORIZATION, value);
                Ok(())
            }
            SigningScheme::OAuth2Bearer(BearerPlacement::Query { parameter }) => {
                descriptor.url = append_query(
                    &descriptor.url,
                    &[(parameter.clone(), credentials.access_token.clone())],
                )?;
                Ok(())
            }
            SigningScheme::OAuth1Signing(signer) => {
                let secret = credentials.access_token_secret.as_deref().unwrap_or("");
                signer.sign(descriptor, Some((credentials.access_token.as_str(), secret)), &[])
            }
        }
    }
}

/// OAuth 1.0a HMAC-SHA1 request signer for one consumer.
#[derive(Debug, Clone)]
pub struct OAuth1Signer {
    consumer_key: String,
    consumer_secret: Secret<String>,
}

impl OAuth1Signer {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<Secret<String>>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
        }
    }

    /// Sign with a fresh nonce and the current time.
    ///
    /// `token` is `(token, token_secret)`; `None` for the request-token call.
    /// `extra` carries protocol parameters such as `oauth_callback` or
    /// `oauth_verifier`.
    pub fn sign(
        &self,
        descriptor: &mut RequestDescriptor,
        token: Option<(&str, &str)>,
        extra: &[(&str, &str)],
    ) -> Result<()> {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        self.sign_at(descriptor, token, extra, &nonce, now_secs())
    }

    /// Deterministic signing with caller-chosen nonce and timestamp.
    pub fn sign_at(
        &self,
        descriptor: &mut RequestDescriptor,
        token: Option<(&str, &str)>,
        extra: &[(&str, &str)],
        nonce: &str,
        timestamp: u64,
    ) -> Result<()> {
        let mut oauth: Vec<(String, String)> = vec![
            ("oauth_consumer_key".into(), self.consumer_key.clone()),
            ("oauth_nonce".into(), nonce.to_owned()),
            ("oauth_signature_method".into(), "HMAC-SHA1".into()),
            ("oauth_timestamp".into(), timestamp.to_string()),
            ("oauth_version".into(), "1.0".into()),
        ];
        if let Some((token, _)) = token {
            oauth.push(("oauth_token".into(), token.to_owned()));
        }
        oauth.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));

        let base = signature_base_string(descriptor, &oauth)?;
        let signature = hmac_sha1_signature(
            &base,
            self.consumer_secret.expose(),
            token.map(|(_, secret)| secret).unwrap_or(""),
        )?;
        oauth.push(("oauth_signature".into(), signature));
        oauth.sort();

        let header = format!(
            "OAuth {}",
            oauth
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let value = HeaderValue::from_str(&header)
            .map_err(|e| Error::InvalidRequest(format!("invalid OAuth header: {e}")))?;
        descriptor.headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// RFC 5849 §3.4.1 signature base string.
///
/// Covers URL query parameters, form/query parameters of the descriptor
/// (not a JSON body) and the oauth protocol parameters.
pub fn signature_base_string(
    descriptor: &RequestDescriptor,
    oauth_params: &[(String, String)],
) -> Result<String> {
    let url = Url::parse(&descriptor.url)
        .map_err(|e| Error::InvalidRequest(format!("cannot sign {}: {e}", descriptor.url)))?;

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !descriptor.has_json_body() {
        params.extend(descriptor.parameters.iter().cloned());
    }
    params.extend(oauth_params.iter().cloned());

    let mut encoded: Vec<(String, String)> =
        params.iter().map(|(k, v)| (encode(k), encode(v))).collect();
    encoded.sort();
    let normalized = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    Ok(format!(
        "{}&{}&{}",
        descriptor.method.as_str().to_ascii_uppercase(),
        encode(&base_uri(&url)?),
        encode(&normalized)
    ))
}

/// `BASE64(HMAC-SHA1(base, encode(consumer_secret) & encode(token_secret)))`
pub fn hmac_sha1_signature(base: &str, consumer_secret: &str, token_secret: &str) -> Result<String> {
    let key = format!("{}&{}", encode(consumer_secret), encode(token_secret));
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| Error::InvalidRequest(format!("invalid signing key: {e}")))?;
    mac.update(base.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Scheme, host, non-default port and path. No query, no fragment.
fn base_uri(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::InvalidRequest(format!("URL has no host: {url}")))?;
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    Ok(format!("{}://{}{}{}", url.scheme(), host, port, url.path()))
}

/// RFC 3986 percent-encoding: everything but `A-Z a-z 0-9 - . _ ~`.
fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

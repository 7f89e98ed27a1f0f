//! Random flow values: anti-forgery state tokens and PKCE (RFC 7636)
//!
//! The state token rides along in the authorization URL and must come back
//! unchanged in the callback. The PKCE verifier stays in storage and is only
//! sent on the token exchange; the authorization URL carries its S256
//! challenge, so a stolen authorization code is useless without it.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

use crate::constants::{PKCE_VERIFIER_BYTES, STATE_TOKEN_BYTES};

/// Fresh anti-forgery state token, URL-safe base64 without padding.
pub fn generate_state_token() -> String {
    random_urlsafe::<STATE_TOKEN_BYTES>()
}

/// Fresh PKCE code verifier, URL-safe base64 without padding.
pub fn generate_verifier() -> String {
    random_urlsafe::<PKCE_VERIFIER_BYTES>()
}

/// `BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Equality whose running time depends only on the lengths of the inputs.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn random_urlsafe<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

//! Engine-wide defaults

/// Refresh a token this many seconds before its literal expiry, so requests
/// already in flight don't race the deadline.
pub const DEFAULT_REFRESH_SKEW_SECS: u64 = 60;

/// Default whole-request timeout for the bundled HTTP client.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Random bytes behind each anti-forgery state token (43 base64url chars).
pub const STATE_TOKEN_BYTES: usize = 32;

/// Random bytes behind each PKCE verifier (86 base64url chars, inside the
/// 43-128 range RFC 7636 allows).
pub const PKCE_VERIFIER_BYTES: usize = 64;

/// Sent when the caller doesn't set its own `User-Agent`.
pub const USER_AGENT: &str = concat!("authkit/", env!("CARGO_PKG_VERSION"));

/// Suffix of the env var holding an adapter's client secret
/// (`GITHUB_CLIENT_SECRET` for identity `github`).
pub const CLIENT_SECRET_ENV_SUFFIX: &str = "_CLIENT_SECRET";

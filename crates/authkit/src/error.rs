//! Error types for the authentication engine
//!
//! Callers need to tell "not connected" apart from "provider said no" and
//! from "network broke", so each lands in its own variant and nothing is
//! flattened into an empty result.

use ports::{StorageError, TransportError};

/// Errors surfaced by the engine and the `Adapter` facade.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Callback state didn't match the pending request. Flow was reset.
    #[error("callback state does not match the pending authorization request")]
    InvalidState,

    /// No usable credentials. Call `authenticate` again.
    #[error("re-authentication required: {0}")]
    ReauthenticationRequired(String),

    /// Provider answered a well-formed request with a non-2xx status.
    #[error("provider API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("authorization denied by provider: {0}")]
    AuthorizationDenied(String),

    #[error("malformed callback: {0}")]
    InvalidCallback(String),

    #[error("invalid token response: {0}")]
    TokenResponse(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0} is not supported by this provider")]
    NotImplemented(&'static str),
}

impl Error {
    /// `Api` error with status 401.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Api { status: 401, .. })
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Transport(err.0)
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<common::Error> for Error {
    fn from(err: common::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

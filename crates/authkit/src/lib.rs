//! Uniform authentication adapter engine
//!
//! Drives OAuth 2.0 and OAuth 1.0a handshakes, keeps the resulting tokens
//! fresh, and signs API calls to the provider, all behind one contract. A
//! concrete provider adapter is an `AdapterConfig` (endpoints, client
//! credentials) plus, optionally, a `ProviderApi` that knows the provider's
//! profile and contacts endpoints.
//!
//! Request flow:
//! 1. Host calls `Adapter::authenticate(None)` → `Authentication::Redirect`
//!    with a state token persisted in storage
//! 2. Provider redirects back; host calls `authenticate(Some(&callback))`
//! 3. Engine verifies the state, exchanges the code, stores the credentials
//! 4. `Adapter::api_request` signs calls, refreshing tokens when they are
//!    about to expire and replaying once on an unexpected 401
//!
//! No state is held in memory between calls. Everything lives in the
//! `Storage` collaborator, so one `Adapter` per request is fine.

pub mod adapter;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod flow;
pub mod lifecycle;
pub mod pkce;
pub mod signing;
pub mod store;
pub mod token;
pub mod user;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{Adapter, Collaborators};
pub use config::{
    AdapterConfig, BearerPlacement, OAuth1Config, OAuth2Config, Protocol, ResponseType,
};
pub use credentials::CredentialSet;
pub use dispatch::{Dispatcher, RequestDescriptor, parse_body};
pub use error::{Error, Result};
pub use flow::{AuthFlow, Authentication, CallbackRequest, FlowState, RedirectInstruction};
pub use lifecycle::TokenLifecycle;
pub use signing::SigningScheme;
pub use store::{TokenField, TokenStore};
pub use user::{
    Activity, ActivityStream, ActivityUser, Contact, NoProviderApi, Page, Profile, ProviderApi,
    Status,
};

pub use ports::{
    BoxFuture, FileStorage, HttpClient, HttpRequest, HttpResponse, Logger, MemoryStorage, Method,
    ReqwestHttpClient, Storage, TracingLogger, TransportError, header,
};

//! Collaborator ports for the authentication engine
//!
//! The engine never talks to the network, a key/value store, or a log sink
//! directly. It goes through the three traits defined here, so a host can
//! swap any of them (a stub client in tests, a Redis-backed store in a web
//! app, its own log pipeline) without touching engine code.
//!
//! Default implementations ship alongside each trait:
//! - `ReqwestHttpClient` for `HttpClient`
//! - `MemoryStorage` and `FileStorage` for `Storage`
//! - `TracingLogger` for `Logger`
//!
//! Trait methods return `Pin<Box<dyn Future>>` so the traits stay
//! dyn-compatible (`Arc<dyn HttpClient>`, `Arc<dyn Storage>`).

pub mod http;
pub mod logger;
pub mod storage;

pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient, TransportError};
pub use logger::{Logger, TracingLogger};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};

pub use reqwest::Method;
pub use reqwest::header;

use std::future::Future;
use std::pin::Pin;

/// Boxed, sendable future returned by every port method.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

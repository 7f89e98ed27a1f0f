//! Shared building blocks for the authkit workspace
//!
//! Holds the pieces every crate leans on: the `Secret` wrapper for client
//! secrets and tokens, the configuration error type, and tracing setup for
//! hosts embedding the engine.

mod error;
mod secret;
mod telemetry;

pub use error::{Error, Result};
pub use secret::Secret;
pub use telemetry::{LogFormat, init_tracing};

//! HTTP client for a GitHub-compatible forge.
//!
//! [`ForgeClient`] speaks both the REST v2022-11-28 surface and the
//! GraphQL endpoint of the configured server, authenticated either by
//! a GitHub App installation (RSA key → short-lived JWT → installation
//! access token, refreshed transparently) or a personal access token.
//!
//! Rate-limit responses are absorbed inside the client: a throttled
//! request sleeps until the advertised reset and is retried, with the
//! event counted on the pass statistics. Callers therefore only see
//! real errors.
//!
//! The client is a [tower](https://docs.rs/tower) service stack and is
//! cheap to clone; a single instance is shared by every loader and
//! executor of a reconciliation pass.

pub mod auth;
pub use auth::ForgeAuth;

mod body;
pub use body::Body;

pub mod client;
pub use client::{ForgeClient, GraphQlErrorItem};

pub mod config;
pub use config::{AuthConfig, Config};

pub mod ctx;
pub use ctx::{ApiCounters, PassContext};

pub mod middleware;

pub mod paginate;
pub use paginate::{paginate, PageInfo, MAX_PAGES};

mod error;
pub use error::Error;

/// Convenient alias for `Result` with the crate error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

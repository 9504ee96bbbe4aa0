//! Error handling in [`goliac-client`][crate]
use thiserror::Error;

/// Possible errors when talking to the forge.
#[derive(Error, Debug)]
pub enum Error {
    /// The forge answered with a non-2xx status.
    ///
    /// Throttling responses (429, rate-limited 403) never surface
    /// here; they are retried inside the client.
    #[error("forge API error: {status}: {message}")]
    Api {
        /// HTTP status of the response
        status: http::StatusCode,
        /// Response body, usually a JSON error document
        message: String,
    },

    /// The GraphQL endpoint returned 200 with an `errors` array
    #[error("GraphQL error: {0}")]
    GraphQl(String),

    /// Authentication failed (JWT signing, token exchange, bad header)
    #[error("auth error: {0}")]
    Auth(#[from] crate::auth::Error),

    /// Connection-level failure from the hyper client
    #[error("client error: {0}")]
    Client(#[from] hyper_util::client::legacy::Error),

    /// Body-streaming failure
    #[error("hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    /// Error from another middleware in the stack
    #[error("service error: {0}")]
    Service(tower::BoxError),

    /// Error building a request
    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    /// The configured server URL is not a valid URI
    #[error(transparent)]
    InvalidUri(#[from] http::uri::InvalidUri),

    /// The response was not the JSON shape the caller expected
    #[error("error deserializing response: {0}")]
    Serde(#[from] serde_json::Error),

    /// The response body was not UTF-8
    #[error("UTF-8 error: {0}")]
    FromUtf8(#[from] std::string::FromUtf8Error),

    /// The pass context was cancelled while the request was in flight
    #[error("request cancelled")]
    Cancelled,

    /// Required configuration was missing or inconsistent
    #[error("configuration error: {0}")]
    Config(String),
}

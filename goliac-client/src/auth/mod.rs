//! Authentication: personal tokens and GitHub App installations.
//!
//! In App mode the client never holds a long-lived credential: a
//! 10-minute RS256 JWT signed with the App's RSA key is exchanged for
//! an installation access token, which is cached and refreshed once
//! its remaining lifetime drops under five minutes. Token mode skips
//! all of that and uses the configured personal token directly.
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use http::{header, HeaderValue, Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client as HyperClient},
    rt::TokioExecutor,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::{AuthConfig, Config};

// chrono's panicking constructors are not const; the fallible ones are
macro_rules! const_unwrap {
    ($e:expr) => {
        match $e {
            Some(v) => v,
            None => panic!(),
        }
    };
}

/// Refresh the cached installation token when its remaining lifetime
/// drops below this.
const REFRESH_MARGIN: chrono::TimeDelta = const_unwrap!(chrono::TimeDelta::try_minutes(5));

/// Lifetime of the signed App JWT.
const JWT_LIFETIME: chrono::TimeDelta = const_unwrap!(chrono::TimeDelta::try_minutes(10));

/// Client auth errors
#[derive(Error, Debug)]
pub enum Error {
    /// The token produced an invalid `Authorization` header value
    #[error("invalid bearer token: {0}")]
    InvalidBearerToken(#[source] http::header::InvalidHeaderValue),

    /// The configured private key is not a usable RSA PEM
    #[error("invalid App private key: {0}")]
    InvalidPrivateKey(#[source] jsonwebtoken::errors::Error),

    /// Signing the App JWT failed
    #[error("failed to sign App JWT: {0}")]
    SignJwt(#[source] jsonwebtoken::errors::Error),

    /// No native root CA certificates could be loaded
    #[error("no valid native root CA certificates found: {0}")]
    NoValidNativeRootCA(#[source] std::io::Error),

    /// The token-exchange request could not be sent
    #[error("token exchange transport error: {0}")]
    ExchangeTransport(#[source] hyper_util::client::legacy::Error),

    /// The token-exchange endpoint answered with an error status
    #[error("token exchange failed with {status}: {message}")]
    ExchangeFailed {
        /// HTTP status of the refusal
        status: http::StatusCode,
        /// Response body
        message: String,
    },

    /// The token-exchange response was not the expected JSON
    #[error("failed to parse token exchange response: {0}")]
    ExchangeParse(#[source] serde_json::Error),

    /// The App is not installed on the configured organization
    #[error("no App installation found for organization '{0}'")]
    NoInstallation(String),

    /// Request-building error in the exchange plumbing
    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    /// Body-streaming error in the exchange plumbing
    #[error("hyper error: {0}")]
    Hyper(#[from] hyper::Error),
}

/// The credential the bearer middleware attaches to each request.
#[derive(Clone)]
pub enum ForgeAuth {
    /// A personal access token, used as-is
    Token(SecretString),
    /// An App installation token, minted and refreshed on demand
    App(AppAuth),
}

impl ForgeAuth {
    /// Build the credential from a [`Config`].
    ///
    /// App mode resolves the installation id here, which takes one
    /// JWT-authenticated call to `/app/installations`.
    pub async fn from_config(config: &Config) -> Result<Self, Error> {
        match &config.auth {
            AuthConfig::Token(token) => Ok(ForgeAuth::Token(token.clone())),
            AuthConfig::App { app_id, private_key } => Ok(ForgeAuth::App(
                AppAuth::new(config, *app_id, private_key).await?,
            )),
        }
    }

    /// The current access token, refreshed if necessary.
    ///
    /// Used both by the bearer middleware and for HTTPS git
    /// credentials when pushing to the teams repository.
    pub async fn token(&self) -> Result<SecretString, Error> {
        match self {
            ForgeAuth::Token(token) => Ok(token.clone()),
            ForgeAuth::App(app) => app.token().await,
        }
    }

    pub(crate) async fn to_header(&self) -> Result<HeaderValue, Error> {
        let token = self.token().await?;
        bearer_header(&token)
    }
}

pub(crate) fn bearer_header(token: &SecretString) -> Result<HeaderValue, Error> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
        .map_err(Error::InvalidBearerToken)?;
    value.set_sensitive(true);
    Ok(value)
}

#[derive(Serialize)]
struct Claims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Deserialize)]
struct InstallationToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct Installation {
    id: u64,
    account: InstallationAccount,
}

#[derive(Deserialize)]
struct InstallationAccount {
    login: String,
}

struct CachedToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

type ExchangeClient = HyperClient<
    hyper_rustls::HttpsConnector<HttpConnector>,
    Full<Bytes>,
>;

/// GitHub App credential: RSA key, resolved installation, token cache.
///
/// The mutex serializes refreshes so concurrent callers never race a
/// half-expired token; it is held across the exchange request, which
/// is the point — everyone else waits for the fresh token.
#[derive(Clone)]
pub struct AppAuth {
    inner: Arc<AppInner>,
}

struct AppInner {
    app_id: u64,
    installation_id: u64,
    key: EncodingKey,
    token_uri: Uri,
    user_agent: HeaderValue,
    http: ExchangeClient,
    state: Mutex<Option<CachedToken>>,
}

impl AppAuth {
    async fn new(config: &Config, app_id: u64, private_key: &SecretString) -> Result<Self, Error> {
        let key = EncodingKey::from_rsa_pem(private_key.expose_secret().as_bytes())
            .map_err(Error::InvalidPrivateKey)?;
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(Error::NoValidNativeRootCA)?
            .https_or_http()
            .enable_http1()
            .build();
        let http: ExchangeClient = HyperClient::builder(TokioExecutor::new()).build(https);
        let user_agent =
            HeaderValue::from_str(&config.user_agent).map_err(http::Error::from)?;

        let server = &config.server;
        let prefix = config.rest_prefix();
        let jwt = sign_jwt(&key, app_id)?;
        let installations: Vec<Installation> = exchange_request(
            &http,
            Method::GET,
            join_uri(server, &format!("{prefix}/app/installations?per_page=100"))?,
            &jwt,
            &user_agent,
        )
        .await?;
        let installation_id = installations
            .iter()
            .find(|i| i.account.login.eq_ignore_ascii_case(&config.organization))
            .map(|i| i.id)
            .ok_or_else(|| Error::NoInstallation(config.organization.clone()))?;
        tracing::debug!(app_id, installation_id, "resolved App installation");

        let token_uri = join_uri(
            server,
            &format!("{prefix}/app/installations/{installation_id}/access_tokens"),
        )?;
        Ok(AppAuth {
            inner: Arc::new(AppInner {
                app_id,
                installation_id,
                key,
                token_uri,
                user_agent,
                http,
                state: Mutex::new(None),
            }),
        })
    }

    /// The resolved installation id.
    pub fn installation_id(&self) -> u64 {
        self.inner.installation_id
    }

    async fn token(&self) -> Result<SecretString, Error> {
        let mut state = self.inner.state.lock().await;
        if let Some(cached) = &*state {
            if cached.expires_at - Utc::now() > REFRESH_MARGIN {
                return Ok(cached.token.clone());
            }
        }
        let jwt = sign_jwt(&self.inner.key, self.inner.app_id)?;
        let minted: InstallationToken = exchange_request(
            &self.inner.http,
            Method::POST,
            self.inner.token_uri.clone(),
            &jwt,
            &self.inner.user_agent,
        )
        .await?;
        tracing::debug!(expires_at = %minted.expires_at, "minted installation access token");
        let token = SecretString::from(minted.token);
        *state = Some(CachedToken {
            token: token.clone(),
            expires_at: minted.expires_at,
        });
        Ok(token)
    }
}

fn sign_jwt(key: &EncodingKey, app_id: u64) -> Result<SecretString, Error> {
    let now = Utc::now();
    // Backdate iat to absorb clock drift between us and the forge
    let claims = Claims {
        iat: (now - Duration::seconds(60)).timestamp(),
        exp: (now + JWT_LIFETIME).timestamp(),
        iss: app_id.to_string(),
    };
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, key)
        .map(SecretString::from)
        .map_err(Error::SignJwt)
}

// Join the server root and a path, preserving any path in the root.
fn join_uri(server: &Uri, path_and_query: &str) -> Result<Uri, Error> {
    let mut builder = Uri::builder();
    if let Some(scheme) = server.scheme() {
        builder = builder.scheme(scheme.as_str());
    }
    if let Some(authority) = server.authority() {
        builder = builder.authority(authority.as_str());
    }
    let root = server.path().trim_end_matches('/');
    Ok(builder
        .path_and_query(format!("{root}{path_and_query}"))
        .build()?)
}

async fn exchange_request<T: serde::de::DeserializeOwned>(
    http: &ExchangeClient,
    method: Method,
    uri: Uri,
    jwt: &SecretString,
    user_agent: &HeaderValue,
) -> Result<T, Error> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, bearer_header(jwt)?)
        .header(header::ACCEPT, "application/vnd.github+json")
        .header(header::USER_AGENT, user_agent.clone())
        .body(Full::new(Bytes::new()))?;
    let response = http.request(request).await.map_err(Error::ExchangeTransport)?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    if !status.is_success() {
        return Err(Error::ExchangeFailed {
            status,
            message: String::from_utf8_lossy(&body).into_owned(),
        });
    }
    serde_json::from_slice(&body).map_err(Error::ExchangeParse)
}

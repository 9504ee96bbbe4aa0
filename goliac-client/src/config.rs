//! Client configuration: server location, organization and credentials.
use http::Uri;
use secrecy::SecretString;

use crate::{
    middleware::{ForgeHeadersLayer, ForgeUriLayer},
    Error, Result,
};

const CLOUD_API_HOST: &str = "api.github.com";

/// Credentials for the forge.
#[derive(Clone)]
pub enum AuthConfig {
    /// A long-lived personal access token, used as-is
    Token(SecretString),
    /// A GitHub App: the installation token is minted and refreshed
    /// from the RSA key
    App {
        /// Numeric application id (the `iss` claim)
        app_id: u64,
        /// PEM-encoded RSA private key
        private_key: SecretString,
    },
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthConfig::Token(_) => f.write_str("AuthConfig::Token(..)"),
            AuthConfig::App { app_id, .. } => {
                f.debug_struct("AuthConfig::App").field("app_id", app_id).finish_non_exhaustive()
            }
        }
    }
}

/// Connection parameters for a [`ForgeClient`](crate::ForgeClient).
#[derive(Debug, Clone)]
pub struct Config {
    /// Root URL of the forge API server, e.g. `https://api.github.com`
    /// for the cloud or `https://github.example.com` for a GHES host
    pub server: Uri,
    /// Organization login the client operates on
    pub organization: String,
    /// Credentials
    pub auth: AuthConfig,
    /// `User-Agent` sent on every request
    pub user_agent: String,
}

impl Config {
    /// Build a configuration for the given server and organization.
    pub fn new(server: Uri, organization: impl Into<String>, auth: AuthConfig) -> Self {
        Config {
            server,
            organization: organization.into(),
            auth,
            user_agent: concat!("goliac/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Read the configuration from `GOLIAC_*` environment variables.
    ///
    /// `GOLIAC_GITHUB_PERSONAL_ACCESS_TOKEN` selects token mode;
    /// otherwise `GOLIAC_GITHUB_APP_ID` and
    /// `GOLIAC_GITHUB_APP_PRIVATE_KEY_FILE` select App mode.
    pub fn from_env() -> Result<Self> {
        let server: Uri = std::env::var("GOLIAC_GITHUB_SERVER")
            .unwrap_or_else(|_| format!("https://{CLOUD_API_HOST}"))
            .parse()?;
        let organization = std::env::var("GOLIAC_GITHUB_APP_ORGANIZATION")
            .map_err(|_| Error::Config("GOLIAC_GITHUB_APP_ORGANIZATION is not set".into()))?;

        let auth = if let Ok(token) = std::env::var("GOLIAC_GITHUB_PERSONAL_ACCESS_TOKEN") {
            AuthConfig::Token(SecretString::from(token))
        } else {
            let app_id = std::env::var("GOLIAC_GITHUB_APP_ID")
                .map_err(|_| Error::Config("GOLIAC_GITHUB_APP_ID is not set".into()))?
                .parse::<u64>()
                .map_err(|e| Error::Config(format!("invalid GOLIAC_GITHUB_APP_ID: {e}")))?;
            let key_file = std::env::var("GOLIAC_GITHUB_APP_PRIVATE_KEY_FILE")
                .map_err(|_| Error::Config("GOLIAC_GITHUB_APP_PRIVATE_KEY_FILE is not set".into()))?;
            let private_key = std::fs::read_to_string(&key_file)
                .map_err(|e| Error::Config(format!("cannot read '{key_file}': {e}")))?;
            AuthConfig::App {
                app_id,
                private_key: SecretString::from(private_key),
            }
        };

        Ok(Config::new(server, organization, auth))
    }

    /// Whether the server is the hosted cloud rather than a GHES install.
    pub fn is_cloud(&self) -> bool {
        self.server.host() == Some(CLOUD_API_HOST)
    }

    /// Path prefix for REST endpoints (`/api/v3` on GHES).
    pub fn rest_prefix(&self) -> &'static str {
        if self.is_cloud() {
            ""
        } else {
            "/api/v3"
        }
    }

    /// Path of the GraphQL endpoint.
    pub fn graphql_path(&self) -> &'static str {
        if self.is_cloud() {
            "/graphql"
        } else {
            "/api/graphql"
        }
    }

    /// Layer resolving logical API paths against the server.
    pub fn uri_layer(&self) -> ForgeUriLayer {
        ForgeUriLayer::new(self.server.clone(), self.rest_prefix(), self.graphql_path())
    }

    /// Layer stamping the static REST headers on every request.
    pub fn headers_layer(&self) -> Result<ForgeHeadersLayer> {
        Ok(ForgeHeadersLayer::new(&self.user_agent)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(server: &str) -> Config {
        Config::new(
            server.parse().unwrap(),
            "acme-corp",
            AuthConfig::Token(SecretString::from("t")),
        )
    }

    #[test]
    fn cloud_paths_have_no_prefix() {
        let c = config("https://api.github.com");
        assert!(c.is_cloud());
        assert_eq!(c.rest_prefix(), "");
        assert_eq!(c.graphql_path(), "/graphql");
    }

    #[test]
    fn enterprise_paths_use_api_v3() {
        let c = config("https://github.example.com");
        assert!(!c.is_cloud());
        assert_eq!(c.rest_prefix(), "/api/v3");
        assert_eq!(c.graphql_path(), "/api/graphql");
    }
}

//! The merge-webhook receiver.
//!
//! Verifies the HMAC-SHA256 signature the forge puts on every
//! delivery, then fires the apply trigger for pushes landing on the
//! configured branch. Everything else is acknowledged without side
//! effects.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hmac::{Hmac, Mac};
use http::{Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::Error;

/// Grace period for in-flight deliveries on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type HmacSha256 = Hmac<Sha256>;

/// Connection settings for the webhook endpoint.
#[derive(Clone)]
pub struct WebhookConfig {
    /// Shared secret the forge signs deliveries with
    pub secret: SecretString,
    /// URL path deliveries arrive on
    pub path: String,
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
}

impl WebhookConfig {
    /// Read the endpoint settings from `GOLIAC_*` environment
    /// variables: `GOLIAC_GITHUB_WEBHOOK_SECRET` (required),
    /// `GOLIAC_GITHUB_WEBHOOK_PATH` (default `/webhook`),
    /// `GOLIAC_SERVER_HOST` (default `0.0.0.0`) and
    /// `GOLIAC_SERVER_PORT` (default `18000`).
    pub fn from_env() -> crate::Result<Self> {
        let secret = std::env::var("GOLIAC_GITHUB_WEBHOOK_SECRET")
            .map_err(|_| Error::Config("GOLIAC_GITHUB_WEBHOOK_SECRET is not set".to_string()))?;
        let path = std::env::var("GOLIAC_GITHUB_WEBHOOK_PATH")
            .unwrap_or_else(|_| "/webhook".to_string());
        let host = std::env::var("GOLIAC_SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match std::env::var("GOLIAC_SERVER_PORT") {
            Ok(port) => port
                .parse::<u16>()
                .map_err(|e| Error::Config(format!("invalid GOLIAC_SERVER_PORT: {e}")))?,
            Err(_) => 18000,
        };
        Ok(WebhookConfig {
            secret: SecretString::from(secret),
            path,
            host,
            port,
        })
    }

    /// The address [`GitHubWebhook::serve`] should bind.
    pub fn addr(&self) -> crate::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid webhook bind address: {e}")))
    }
}

/// Webhook endpoint state: shared secret, watched branch, callback.
pub struct GitHubWebhook<F> {
    secret: SecretString,
    branch: String,
    path: String,
    on_push: F,
}

#[derive(Deserialize)]
struct PushEvent {
    #[serde(rename = "ref")]
    git_ref: String,
}

impl<F> GitHubWebhook<F>
where
    F: Fn() + Send + Sync + 'static,
{
    /// A webhook firing `on_push` for pushes to `branch`, served
    /// under `path`.
    pub fn new(
        secret: SecretString,
        branch: impl Into<String>,
        path: impl Into<String>,
        on_push: F,
    ) -> Self {
        GitHubWebhook {
            secret,
            branch: branch.into(),
            path: path.into(),
            on_push,
        }
    }

    /// A webhook built from a [`WebhookConfig`].
    pub fn from_config(config: &WebhookConfig, branch: impl Into<String>, on_push: F) -> Self {
        GitHubWebhook::new(config.secret.clone(), branch, config.path.clone(), on_push)
    }

    /// Process one delivery.
    ///
    /// - bad or missing signature → 401, no side effect;
    /// - `ping` → 200, no side effect;
    /// - `push` on the configured branch → callback once, 200;
    /// - `push` elsewhere → 400, no side effect;
    /// - anything else → 200, ignored.
    pub fn handle(&self, event: Option<&str>, signature: Option<&str>, body: &[u8]) -> StatusCode {
        if !self.verify(signature, body) {
            tracing::warn!("webhook delivery with invalid signature");
            return StatusCode::UNAUTHORIZED;
        }
        match event {
            Some("ping") => StatusCode::OK,
            Some("push") => {
                let Ok(push) = serde_json::from_slice::<PushEvent>(body) else {
                    return StatusCode::BAD_REQUEST;
                };
                if push.git_ref == format!("refs/heads/{}", self.branch) {
                    tracing::debug!(git_ref = %push.git_ref, "push on watched branch, triggering apply");
                    (self.on_push)();
                    StatusCode::OK
                } else {
                    StatusCode::BAD_REQUEST
                }
            }
            _ => StatusCode::OK,
        }
    }

    fn verify(&self, signature: Option<&str>, body: &[u8]) -> bool {
        let Some(hex_digest) = signature.and_then(|s| s.strip_prefix("sha256=")) else {
            return false;
        };
        let Ok(expected) = hex::decode(hex_digest) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes()) else {
            return false;
        };
        mac.update(body);
        // constant-time comparison via the Mac verifier
        mac.verify_slice(&expected).is_ok()
    }

    /// Serve deliveries on `addr` until `shutdown` fires, then give
    /// in-flight requests a short grace.
    pub async fn serve(
        self: Arc<Self>,
        addr: SocketAddr,
        shutdown: CancellationToken,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, path = %self.path, "webhook listening");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    let (stream, _) = accepted?;
                    let webhook = self.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |request| {
                            let webhook = webhook.clone();
                            async move { webhook.respond(request).await }
                        });
                        let io = TokioIo::new(stream);
                        if let Err(e) = hyper::server::conn::http1::Builder::new()
                            .serve_connection(io, service)
                            .await
                        {
                            tracing::debug!(error = %e, "webhook connection error");
                        }
                    });
                }
            }
        }
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        Ok(())
    }

    async fn respond(
        &self,
        request: http::Request<hyper::body::Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let (parts, body) = request.into_parts();
        let status = if parts.uri.path() != self.path {
            StatusCode::NOT_FOUND
        } else {
            let body = body.collect().await?.to_bytes();
            let event = parts
                .headers
                .get("x-github-event")
                .and_then(|v| v.to_str().ok());
            let signature = parts
                .headers
                .get("x-hub-signature-256")
                .and_then(|v| v.to_str().ok());
            self.handle(event, signature, &body)
        };
        Ok(Response::builder()
            .status(status)
            .body(Full::new(Bytes::new()))
            .expect("static response"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn webhook(calls: Arc<AtomicUsize>) -> GitHubWebhook<impl Fn() + Send + Sync + 'static> {
        GitHubWebhook::new(
            SecretString::from("s3cret"),
            "main",
            "/webhook",
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
            },
        )
    }

    #[test]
    fn valid_push_invokes_callback_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hook = webhook(calls.clone());
        let body = br#"{"ref":"refs/heads/main"}"#;

        let status = hook.handle(Some("push"), Some(&sign("s3cret", body)), body);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn push_to_another_branch_is_rejected_without_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hook = webhook(calls.clone());
        let body = br#"{"ref":"refs/heads/feature"}"#;

        let status = hook.handle(Some("push"), Some(&sign("s3cret", body)), body);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn ping_is_acknowledged_without_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hook = webhook(calls.clone());
        let body = br#"{"zen":"Keep it logically awesome."}"#;

        let status = hook.handle(Some("ping"), Some(&sign("s3cret", body)), body);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn bad_signature_is_unauthorized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hook = webhook(calls.clone());
        let body = br#"{"ref":"refs/heads/main"}"#;

        assert_eq!(
            hook.handle(Some("push"), Some("sha256=deadbeef"), body),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            hook.handle(Some("push"), Some(&sign("wrong", body)), body),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(hook.handle(Some("push"), None, body), StatusCode::UNAUTHORIZED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    // one test owns the GOLIAC_* variables; parallel tests must not share them
    #[test]
    fn endpoint_config_reads_the_environment() {
        std::env::remove_var("GOLIAC_GITHUB_WEBHOOK_SECRET");
        assert!(matches!(WebhookConfig::from_env(), Err(Error::Config(_))));

        std::env::set_var("GOLIAC_GITHUB_WEBHOOK_SECRET", "s3cret");
        std::env::set_var("GOLIAC_SERVER_PORT", "18080");
        let config = WebhookConfig::from_env().unwrap();
        std::env::remove_var("GOLIAC_GITHUB_WEBHOOK_SECRET");
        std::env::remove_var("GOLIAC_SERVER_PORT");

        assert_eq!(config.path, "/webhook");
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.addr().unwrap().port(), 18080);

        let hook = GitHubWebhook::from_config(&config, "main", || {});
        let body = br#"{"zen":"ok"}"#;
        assert_eq!(
            hook.handle(Some("ping"), Some(&sign("s3cret", body)), body),
            StatusCode::OK
        );
    }

    #[test]
    fn unknown_events_are_ignored() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hook = webhook(calls.clone());
        let body = br#"{}"#;

        let status = hook.handle(Some("issues"), Some(&sign("s3cret", body)), body);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

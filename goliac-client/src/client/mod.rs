//! The forge API client.
//!
//! [`ForgeClient`] is a thin typed surface over a tower service
//! stack: REST and GraphQL calls, transparent throttling, and access
//! to the underlying credential for collaborators that need the raw
//! token (HTTPS git pushes).
use bytes::Bytes;
use futures::future::BoxFuture;
use http::{header::AUTHORIZATION, Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tower::{buffer::Buffer, util::BoxService, BoxError, Layer, Service, ServiceExt};

use crate::{auth, middleware::GRAPHQL, Body, Config, Error, ForgeAuth, PassContext, Result};

mod builder;
pub use builder::ClientBuilder;

/// Client for a GitHub-compatible forge organization.
///
/// Requests are built against the logical API surface; the
/// [`ForgeUriLayer`](crate::middleware::ForgeUriLayer) in the stack
/// routes them onto the configured server. Cheap to clone; all
/// clones share the same connection pool, token cache and buffer.
#[derive(Clone)]
pub struct ForgeClient {
    // - `Buffer` for cheap clone
    // - `BoxService` for dynamic response future type
    inner: Buffer<Request<Body>, BoxFuture<'static, Result<Response<Body>, BoxError>>>,
    auth: ForgeAuth,
    organization: String,
}

/// One entry of a GraphQL `errors` array.
#[derive(Deserialize, Debug, Clone)]
pub struct GraphQlErrorItem {
    /// Human-readable error message
    pub message: String,
}

impl ForgeClient {
    /// Create a [`ForgeClient`] using a custom `Service` stack.
    ///
    /// To create with the default stack, use [`ForgeClient::try_new`].
    pub fn new<S, B>(service: S, auth: ForgeAuth, organization: impl Into<String>) -> Self
    where
        S: Service<Request<Body>, Response = Response<B>> + Send + 'static,
        S::Future: Send + 'static,
        S::Error: Into<BoxError>,
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        // Transform response body to the crate Body and use type erased error to avoid type parameters.
        let service = tower_http::map_response_body::MapResponseBodyLayer::new(Body::wrap_body)
            .layer(service)
            .map_err(|e| e.into());
        Self {
            inner: Buffer::new(BoxService::new(service), 1024),
            auth,
            organization: organization.into(),
        }
    }

    /// Create and initialize a [`ForgeClient`] from a [`Config`].
    ///
    /// In App mode this resolves the installation id, which costs one
    /// API round trip.
    pub async fn try_new(config: Config) -> Result<Self> {
        Ok(ClientBuilder::try_from_config(config).await?.build())
    }

    /// The organization login this client operates on.
    pub fn organization(&self) -> &str {
        &self.organization
    }

    /// The current access token, refreshed if necessary.
    pub async fn access_token(&self) -> Result<SecretString> {
        Ok(self.auth.token().await?)
    }

    /// Perform a raw HTTP request against the forge and return the
    /// raw response. No throttling handling at this level.
    pub async fn send(&self, request: Request<Body>) -> Result<Response<Body>> {
        let mut svc = self.inner.clone();
        let res = svc
            .ready()
            .await
            .map_err(Error::Service)?
            .call(request)
            .await
            .map_err(|err| {
                // Error attaching the credential
                err.downcast::<auth::Error>()
                    .map(|e| Error::Auth(*e))
                    // Error requesting
                    .or_else(|err| {
                        err.downcast::<hyper_util::client::legacy::Error>()
                            .map(|err| Error::Client(*err))
                    })
                    // Error from another middleware
                    .unwrap_or_else(Error::Service)
            })?;
        Ok(res)
    }

    /// Issue a REST call and return the response body bytes.
    ///
    /// `query` pairs are appended to the path; `body` is sent as JSON
    /// when present; `override_token` replaces the client credential
    /// for this one call.
    pub async fn rest_raw(
        &self,
        ctx: &PassContext,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
        override_token: Option<&SecretString>,
    ) -> Result<Bytes> {
        ctx.stats.count_rest();
        let pandq = path_with_query(path, query);
        let payload = match body {
            Some(value) => Bytes::from(serde_json::to_vec(value)?),
            None => Bytes::new(),
        };
        let (status, bytes) = self.issue(ctx, method, &pandq, payload, override_token).await?;
        if !status.is_success() {
            return Err(Error::Api {
                status,
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(bytes)
    }

    /// Issue a REST call and deserialize the JSON response.
    pub async fn rest<T>(
        &self,
        ctx: &PassContext,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
        override_token: Option<&SecretString>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let bytes = self
            .rest_raw(ctx, method, path, query, body, override_token)
            .await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::warn!(error = %e, "unexpected REST response shape");
            Error::Serde(e)
        })
    }

    /// Issue a GraphQL query and deserialize the `data` payload.
    pub async fn graphql<T>(
        &self,
        ctx: &PassContext,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        #[derive(Deserialize)]
        struct Envelope<T> {
            data: Option<T>,
            #[serde(default)]
            errors: Vec<GraphQlErrorItem>,
        }

        ctx.stats.count_graphql();
        let payload = serde_json::to_vec(&serde_json::json!({
            "query": query,
            "variables": variables,
        }))?;
        let (status, bytes) = self
            .issue(ctx, Method::POST, GRAPHQL, Bytes::from(payload), None)
            .await?;
        if !status.is_success() {
            return Err(Error::Api {
                status,
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;
        if !envelope.errors.is_empty() {
            let joined = envelope
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::GraphQl(joined));
        }
        envelope
            .data
            .ok_or_else(|| Error::GraphQl("response contained no data".to_string()))
    }

    /// Send one logical request, absorbing throttling responses.
    ///
    /// Each rate-limit response sleeps until the advertised reset and
    /// replays the request; repeated throttles keep retrying, so the
    /// caller only ever sees a settled response.
    async fn issue(
        &self,
        ctx: &PassContext,
        method: Method,
        path_and_query: &str,
        payload: Bytes,
        override_token: Option<&SecretString>,
    ) -> Result<(StatusCode, Bytes)> {
        loop {
            let mut builder = Request::builder().method(method.clone()).uri(path_and_query);
            if let Some(token) = override_token {
                builder = builder.header(AUTHORIZATION, auth::bearer_header(token)?);
            }
            if !payload.is_empty() {
                builder = builder.header(http::header::CONTENT_TYPE, "application/json");
            }
            let request = builder.body(Body::from(payload.clone()))?;

            let response = tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
                response = self.send(request) => response?,
            };
            let status = response.status();

            if let Some(delay) = throttle_delay(status, response.headers()) {
                ctx.stats.count_throttled();
                tracing::warn!(
                    %status,
                    delay_secs = delay.as_secs(),
                    "throttled by the forge, backing off"
                );
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                continue;
            }

            let bytes = response.into_body().collect().await?.to_bytes();
            return Ok((status, bytes));
        }
    }

}

fn path_with_query(path: &str, query: &[(&str, &str)]) -> String {
    let mut pandq = path.to_string();
    if !query.is_empty() {
        let qs = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(query)
            .finish();
        pandq.push('?');
        pandq.push_str(&qs);
    }
    pandq
}

/// How long a rate-limited response asks us to wait, if it is one.
fn throttle_delay(status: StatusCode, headers: &http::HeaderMap) -> Option<std::time::Duration> {
    let header_int = |name: &str| -> Option<i64> {
        headers.get(name)?.to_str().ok()?.trim().parse().ok()
    };

    let exhausted = header_int("x-ratelimit-remaining") == Some(0);
    let throttled = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && exhausted);
    if !throttled {
        return None;
    }

    if let Some(secs) = header_int("retry-after") {
        let secs = secs.max(0) as u64;
        // Secondary rate limits over-ask; halve long waits
        let secs = if secs > 30 { secs / 2 } else { secs };
        return Some(std::time::Duration::from_secs(secs));
    }
    if let Some(reset) = header_int("x-ratelimit-reset") {
        let now = chrono::Utc::now().timestamp();
        return Some(std::time::Duration::from_secs((reset - now).max(0) as u64 + 1));
    }
    // A 429 with no hint at all; be gentle and try shortly
    (status == StatusCode::TOO_MANY_REQUESTS).then(|| std::time::Duration::from_secs(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> http::HeaderMap {
        let mut map = http::HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                http::header::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                v.parse().unwrap(),
            );
        }
        map
    }

    #[test]
    fn plain_responses_are_not_throttled() {
        assert!(throttle_delay(StatusCode::OK, &headers(&[])).is_none());
        assert!(throttle_delay(StatusCode::NOT_FOUND, &headers(&[])).is_none());
        // A real permission error must surface, not loop
        assert!(throttle_delay(
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "42")])
        )
        .is_none());
    }

    #[test]
    fn rate_limited_forbidden_uses_reset_epoch() {
        let reset = (chrono::Utc::now().timestamp() + 2).to_string();
        let delay = throttle_delay(
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset", &reset)]),
        )
        .unwrap();
        assert!(delay.as_secs() >= 2 && delay.as_secs() <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn one_throttle_causes_one_retry_after_the_reset() {
        use std::sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        };

        use secrecy::SecretString;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let service = tower::service_fn(move |_req: Request<crate::Body>| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                let response = if attempt == 0 {
                    Response::builder()
                        .status(429)
                        .header("x-ratelimit-remaining", "0")
                        .header(
                            "x-ratelimit-reset",
                            (chrono::Utc::now().timestamp() + 2).to_string(),
                        )
                        .body(crate::Body::empty())
                        .expect("static response")
                } else {
                    Response::builder()
                        .status(200)
                        .body(crate::Body::from(b"{}".to_vec()))
                        .expect("static response")
                };
                Ok::<_, std::convert::Infallible>(response)
            }
        });
        let client = ForgeClient::new(
            service,
            crate::ForgeAuth::Token(SecretString::from("token")),
            "acme-corp",
        );

        let ctx = PassContext::new();
        let start = tokio::time::Instant::now();
        let _: serde_json::Value = client
            .rest(&ctx, Method::GET, "/meta", &[], None, None)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2, "exactly one retry");
        assert_eq!(ctx.stats.throttled(), 1);
        assert!(start.elapsed() >= std::time::Duration::from_secs(2));
    }

    #[test]
    fn long_retry_after_is_halved() {
        let delay = throttle_delay(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[("retry-after", "60")]),
        )
        .unwrap();
        assert_eq!(delay.as_secs(), 30);

        let short = throttle_delay(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[("retry-after", "10")]),
        )
        .unwrap();
        assert_eq!(short.as_secs(), 10);
    }
}

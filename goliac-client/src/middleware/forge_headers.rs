//! The static headers every forge request carries.
use http::{header, header::HeaderName, HeaderValue, Request};
use tower::{Layer, Service};

/// REST API version this client is written against.
const API_VERSION: &str = "2022-11-28";

/// Layer stamping requests with the forge media type, the pinned
/// REST API version and this engine's `User-Agent`.
///
/// The forge rejects requests without a user agent, so building the
/// layer validates it up front.
#[derive(Clone)]
pub struct ForgeHeadersLayer {
    user_agent: HeaderValue,
}

impl ForgeHeadersLayer {
    /// A layer identifying itself as `user_agent`.
    pub fn new(user_agent: &str) -> Result<Self, http::Error> {
        Ok(Self {
            user_agent: HeaderValue::from_str(user_agent).map_err(http::Error::from)?,
        })
    }
}

impl<S> Layer<S> for ForgeHeadersLayer {
    type Service = ForgeHeaders<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ForgeHeaders {
            user_agent: self.user_agent.clone(),
            inner,
        }
    }
}

/// Service applying [`ForgeHeadersLayer`].
#[derive(Clone)]
pub struct ForgeHeaders<S> {
    user_agent: HeaderValue,
    inner: S,
}

impl<S, ReqBody> Service<Request<ReqBody>> for ForgeHeaders<S>
where
    S: Service<Request<ReqBody>>,
{
    type Error = S::Error;
    type Future = S::Future;
    type Response = S::Response;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let headers = req.headers_mut();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            HeaderName::from_static("x-github-api-version"),
            HeaderValue::from_static(API_VERSION),
        );
        headers.insert(header::USER_AGENT, self.user_agent.clone());
        self.inner.call(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::pin_mut;
    use http::Response;
    use tokio_test::assert_ready_ok;
    use tower_test::{mock, mock::Handle};

    use crate::Body;

    #[tokio::test(flavor = "current_thread")]
    async fn stamps_the_rest_headers() {
        let layer = ForgeHeadersLayer::new("goliac/0.1.0").unwrap();
        let (mut service, handle): (_, Handle<Request<Body>, Response<Body>>) =
            mock::spawn_layer(layer);

        let spawned = tokio::spawn(async move {
            // Receive the requests and respond
            pin_mut!(handle);
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(
                request.headers().get(header::ACCEPT).unwrap(),
                "application/vnd.github+json"
            );
            assert_eq!(
                request.headers().get("x-github-api-version").unwrap(),
                API_VERSION
            );
            assert_eq!(
                request.headers().get(header::USER_AGENT).unwrap(),
                "goliac/0.1.0"
            );
            send.send_response(Response::builder().body(Body::empty()).unwrap());
        });

        assert_ready_ok!(service.poll_ready());
        service
            .call(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        spawned.await.unwrap();
    }

    #[test]
    fn rejects_an_invalid_user_agent() {
        assert!(ForgeHeadersLayer::new("line\nbreak").is_err());
    }
}

//! `Layer` to decorate requests with a refreshed `Authorization` header.
use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::{ready, Future};
use http::{header::AUTHORIZATION, Request, Response};
use pin_project::pin_project;
use tower::{layer::Layer, BoxError, Service};

use crate::auth::ForgeAuth;

/// `Layer` that attaches a bearer token to every request, refreshing
/// it first when the cached one is close to expiry.
pub struct BearerLayer {
    auth: ForgeAuth,
}

impl BearerLayer {
    pub(crate) fn new(auth: ForgeAuth) -> Self {
        Self { auth }
    }
}

impl<S> Layer<S> for BearerLayer {
    type Service = Bearer<S>;

    fn layer(&self, service: S) -> Self::Service {
        Bearer {
            auth: self.auth.clone(),
            service,
        }
    }
}

/// Service returned by [`BearerLayer`].
pub struct Bearer<S> {
    auth: ForgeAuth,
    service: S,
}

impl<S, ReqB, ResB> Service<Request<ReqB>> for Bearer<S>
where
    S: Service<Request<ReqB>, Response = Response<ResB>> + Clone,
    S::Error: Into<BoxError>,
    ReqB: http_body::Body + Send + Unpin + 'static,
    ResB: http_body::Body,
{
    type Error = BoxError;
    type Future = BearerFuture<S, ReqB>;
    type Response = S::Response;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut req: Request<ReqB>) -> Self::Future {
        // Comment from `AsyncFilter`
        // > In case the inner service has state that's driven to readiness and
        // > not tracked by clones (such as `Buffer`), pass the version we have
        // > already called `poll_ready` on into the future, and leave its clone
        // > behind.
        let service = self.service.clone();
        let service = std::mem::replace(&mut self.service, service);

        let auth = self.auth.clone();
        let request = async move {
            // An override token set by the caller wins
            if req.headers().contains_key(AUTHORIZATION) {
                return Ok(req);
            }
            auth.to_header().await.map_err(BoxError::from).map(|value| {
                req.headers_mut().insert(AUTHORIZATION, value);
                req
            })
        };

        BearerFuture {
            state: State::Request(Box::pin(request)),
            service,
        }
    }
}

#[pin_project(project = StateProj)]
enum State<F, G> {
    /// Waiting for the header to be attached
    Request(#[pin] F),
    /// Waiting for the response future
    Response(#[pin] G),
}

type RequestFuture<B> = Pin<Box<dyn Future<Output = Result<Request<B>, BoxError>> + Send>>;

/// Future returned by [`Bearer`].
#[pin_project]
pub struct BearerFuture<S, B>
where
    S: Service<Request<B>>,
    B: http_body::Body,
{
    #[pin]
    state: State<RequestFuture<B>, S::Future>,
    service: S,
}

impl<S, B> Future for BearerFuture<S, B>
where
    S: Service<Request<B>>,
    S::Error: Into<BoxError>,
    B: http_body::Body,
{
    type Output = Result<S::Response, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        loop {
            match this.state.as_mut().project() {
                StateProj::Request(mut req) => {
                    let request = ready!(req.as_mut().poll(cx))?;
                    let response = this.service.call(request);
                    this.state.set(State::Response(response));
                }

                StateProj::Response(response) => {
                    return response.poll(cx).map_err(Into::into);
                }
            }
        }
    }
}

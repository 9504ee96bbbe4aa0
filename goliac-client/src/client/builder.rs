use bytes::Bytes;
use http::{Request, Response};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client as HyperClient},
    rt::TokioExecutor,
};
use tower::{util::BoxService, BoxError, Layer, Service, ServiceBuilder};
use tower_http::{
    classify::ServerErrorsFailureClass, map_response_body::MapResponseBodyLayer, trace::TraceLayer,
};

use crate::{auth, middleware::BearerLayer, Body, Config, Error, ForgeAuth, ForgeClient, Result};

/// HTTP body of a dynamic backing type.
pub type DynBody = dyn http_body::Body<Data = Bytes, Error = BoxError> + Send + Unpin;

/// Builder for [`ForgeClient`] instances with customized
/// [tower](`Service`) middleware.
pub struct ClientBuilder<Svc> {
    service: Svc,
    auth: ForgeAuth,
    organization: String,
}

impl<Svc> ClientBuilder<Svc> {
    /// Construct a [`ClientBuilder`] from scratch with a fully custom
    /// [`Service`] stack.
    ///
    /// Most users will want [`ClientBuilder::try_from_config`], which
    /// provides the default stack as a starting point.
    pub fn new(service: Svc, auth: ForgeAuth, config: &Config) -> Self
    where
        Svc: Service<Request<Body>>,
    {
        Self {
            service,
            auth,
            organization: config.organization.clone(),
        }
    }

    /// Add a [`Layer`] to the current [`Service`] stack.
    pub fn with_layer<L: Layer<Svc>>(self, layer: &L) -> ClientBuilder<L::Service> {
        let Self {
            service: stack,
            auth,
            organization,
        } = self;
        ClientBuilder {
            service: layer.layer(stack),
            auth,
            organization,
        }
    }

    /// Build a [`ForgeClient`] instance with the current [`Service`] stack.
    pub fn build<B>(self) -> ForgeClient
    where
        Svc: Service<Request<Body>, Response = Response<B>> + Send + 'static,
        Svc::Future: Send + 'static,
        Svc::Error: Into<BoxError>,
        B: http_body::Body<Data = bytes::Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        ForgeClient::new(self.service, self.auth, self.organization)
    }
}

impl ClientBuilder<BoxService<Request<Body>, Response<Box<DynBody>>, BoxError>> {
    /// Build the default stack from a configuration: HTTPS connector,
    /// base URI, REST headers, bearer auth and request tracing.
    pub async fn try_from_config(config: Config) -> Result<Self> {
        use std::time::Duration;
        use tracing::Span;

        let auth = ForgeAuth::from_config(&config).await?;

        let mut connector = HttpConnector::new();
        connector.enforce_http(false);
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| Error::Auth(auth::Error::NoValidNativeRootCA(e)))?
            .https_or_http()
            .enable_http1()
            .wrap_connector(connector);
        let client: HyperClient<_, Body> = HyperClient::builder(TokioExecutor::new()).build(https);

        let service = ServiceBuilder::new()
            .layer(config.uri_layer())
            .layer(config.headers_layer()?)
            .layer(BearerLayer::new(auth.clone()))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|req: &Request<Body>| {
                        tracing::debug_span!(
                            "HTTP",
                            http.method = %req.method(),
                            http.url = %req.uri(),
                            http.status_code = tracing::field::Empty,
                        )
                    })
                    .on_request(|_req: &Request<Body>, _span: &Span| {
                        tracing::debug!("requesting");
                    })
                    .on_response(
                        |res: &Response<hyper::body::Incoming>, _latency: Duration, span: &Span| {
                            span.record("http.status_code", res.status().as_u16());
                        },
                    )
                    .on_failure(
                        |ec: ServerErrorsFailureClass, _latency: Duration, _span: &Span| match ec {
                            ServerErrorsFailureClass::StatusCode(status) => {
                                tracing::debug!("failed with status {}", status)
                            }
                            ServerErrorsFailureClass::Error(err) => {
                                tracing::debug!("failed with error {}", err)
                            }
                        },
                    ),
            )
            .service(client);

        Ok(Self::new(
            BoxService::new(
                MapResponseBodyLayer::new(|body| {
                    Box::new(http_body_util::BodyExt::map_err(body, BoxError::from)) as Box<DynBody>
                })
                .layer(service),
            ),
            auth,
            &config,
        ))
    }
}

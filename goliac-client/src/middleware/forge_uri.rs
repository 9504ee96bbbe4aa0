//! Maps logical API paths onto the configured forge server.
use http::{uri, Request, Uri};
use tower::{Layer, Service};

/// The logical GraphQL path callers use; rewritten per server flavor.
pub(crate) const GRAPHQL: &str = "/graphql";

/// Layer resolving logical request paths against the server.
///
/// The rest of the client builds requests against the logical API
/// surface — `/orgs/{org}/teams`, `/graphql` — and this layer owns
/// the difference between the cloud and a GHES install: scheme and
/// authority come from the configured server, REST paths gain the
/// `/api/v3` prefix on GHES, the GraphQL endpoint moves to
/// `/api/graphql`, and a server reached through a path-mounting
/// proxy keeps its mount in front of everything.
#[derive(Debug, Clone)]
pub struct ForgeUriLayer {
    server: Uri,
    rest_prefix: &'static str,
    graphql_path: &'static str,
}

impl ForgeUriLayer {
    /// Resolve requests against `server` with the given prefixes
    /// (empty REST prefix and `/graphql` on the cloud).
    pub fn new(server: Uri, rest_prefix: &'static str, graphql_path: &'static str) -> Self {
        Self {
            server,
            rest_prefix,
            graphql_path,
        }
    }

    fn resolve(&self, requested: Option<&uri::PathAndQuery>) -> Uri {
        let mount = self.server.path().trim_end_matches('/');
        let target = match requested {
            Some(pq) if pq.path() == GRAPHQL => format!("{mount}{}", self.graphql_path),
            Some(pq) => format!("{mount}{}{pq}", self.rest_prefix),
            None => format!("{mount}/"),
        };
        let mut builder = Uri::builder();
        if let Some(scheme) = self.server.scheme() {
            builder = builder.scheme(scheme.as_str());
        }
        if let Some(authority) = self.server.authority() {
            builder = builder.authority(authority.as_str());
        }
        // valid server parts joined with a valid path stay a valid URI
        builder.path_and_query(target).build().expect("valid URI")
    }
}

impl<S> Layer<S> for ForgeUriLayer {
    type Service = ForgeUri<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ForgeUri {
            layer: self.clone(),
            inner,
        }
    }
}

/// Middleware applying [`ForgeUriLayer`]'s resolution to each request.
#[derive(Debug, Clone)]
pub struct ForgeUri<S> {
    layer: ForgeUriLayer,
    inner: S,
}

impl<S, ReqBody> Service<Request<ReqBody>> for ForgeUri<S>
where
    S: Service<Request<ReqBody>>,
{
    type Error = S::Error;
    type Future = S::Future;
    type Response = S::Response;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let (mut parts, body) = req.into_parts();
        parts.uri = self.layer.resolve(parts.uri.path_and_query());
        self.inner.call(Request::from_parts(parts, body))
    }
}

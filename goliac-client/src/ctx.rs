//! Per-pass context: cancellation and API-call accounting.
//!
//! A [`PassContext`] is created at the start of every apply pass and
//! threaded explicitly through every client call. Cancelling its
//! token aborts in-flight requests; the counters are read by the
//! statistics reporter when the pass ends.
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio_util::sync::CancellationToken;

/// Counters incremented by the client.
#[derive(Debug, Default)]
pub struct ApiCounters {
    rest: AtomicU64,
    graphql: AtomicU64,
    throttled: AtomicU64,
}

impl ApiCounters {
    pub(crate) fn count_rest(&self) {
        self.rest.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_graphql(&self) {
        self.graphql.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_throttled(&self) {
        self.throttled.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of REST calls issued so far.
    pub fn rest_calls(&self) -> u64 {
        self.rest.load(Ordering::Relaxed)
    }

    /// Number of GraphQL calls issued so far.
    pub fn graphql_calls(&self) -> u64 {
        self.graphql.load(Ordering::Relaxed)
    }

    /// Number of throttling events absorbed so far.
    pub fn throttled(&self) -> u64 {
        self.throttled.load(Ordering::Relaxed)
    }
}

/// Cancellation and statistics carried through one apply pass.
#[derive(Debug, Clone, Default)]
pub struct PassContext {
    /// Cancelling this token aborts in-flight requests
    pub cancel: CancellationToken,
    /// Call counters shared with the statistics reporter
    pub stats: Arc<ApiCounters>,
}

impl PassContext {
    /// A fresh context with its own token and counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context cancelled together with `parent`.
    pub fn child_of(parent: &CancellationToken) -> Self {
        PassContext {
            cancel: parent.child_token(),
            stats: Arc::new(ApiCounters::default()),
        }
    }
}

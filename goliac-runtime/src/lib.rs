//! The reconciliation engine behind goliac.
//!
//! A teams repository declares the desired state of a forge
//! organization; this crate loads that declaration, projects the live
//! organization into a TTL-bucketed snapshot, computes a minimum
//! ordered command stream between the two, and applies it with
//! changeset guardrails, a dry-run overlay, and serialized passes.
//!
//! The pieces, bottom-up:
//! - [`remote`] — the snapshot cache, its loaders and the dry-run
//!   [`remote::CacheOverlay`];
//! - [`local`] — the teams-repository store seam, the parsed
//!   [`LocalModel`] and CODEOWNERS regeneration;
//! - [`reconcile`] — the [`reconcile::Reconciler`], the command set,
//!   the guarded [`reconcile::CommandBatch`] and the
//!   [`reconcile::LiveExecutor`];
//! - [`scheduler`] — the apply lobby (one running pass, one queued,
//!   bursts coalesced) and the trigger loop;
//! - [`controller`] — [`Goliac`], tying a whole pass together;
//! - [`webhook`], [`usersync`], [`errors`], [`stats`] — the receiving
//!   and reporting edges.

pub mod controller;
pub use controller::{ControllerConfig, Goliac};

pub mod errors;
pub use errors::{ErrorCollection, ErrorReporter, NotificationSink, TracingSink};

pub mod local;
pub use local::{GitTeamsStore, LocalModel, MemoryTeamsStore, TeamsStore};

pub mod reconcile;
pub use reconcile::{
    Command, CommandBatch, CommandExecutor, LiveExecutor, Reconciler, UnmanagedResources,
};

pub mod remote;
pub use remote::{CacheOptions, CacheOverlay, RemoteCache, RemoteState};

pub mod scheduler;
pub use scheduler::{ApplyLobby, Scheduler, Trigger};

pub mod stats;
pub use stats::{PassReport, Statistics};

pub mod usersync;
pub use usersync::{NoopUserSync, UserSyncPlugin, UserSyncRegistry};

pub mod webhook;
pub use webhook::{GitHubWebhook, WebhookConfig};

mod error;
pub use error::{Error, ValidationErrors};

/// Convenient alias for `Result` with the crate error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

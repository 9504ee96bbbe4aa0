//! Goliac manages a GitHub-compatible organization from a reviewed
//! git repository: members, teams, repositories, rulesets, branch
//! protections, environments and variables are declared as YAML,
//! and the engine continuously reconciles the live organization
//! against that declaration.
//!
//! This crate is a facade over the three implementation crates:
//!
//! - [`goliac_core`] (re-exported as [`core`]) — the declarative
//!   model, `goliac.yaml`, slugs and the generic differ;
//! - [`goliac_client`] (re-exported as [`client`]) — the REST/GraphQL
//!   client with App and token authentication and throttling;
//! - [`goliac_runtime`] (re-exported as [`runtime`]) — the snapshot
//!   cache, the reconciler and executors, the scheduler and the
//!   webhook.
//!
//! A minimal embedding wires the engine to the scheduler:
//!
//! ```no_run
//! use std::sync::Arc;
//! use goliac::{
//!     client::{Config, ForgeClient},
//!     runtime::{local::GitTeamsStore, remote::CacheOptions, ControllerConfig, Goliac, Scheduler},
//! };
//! use tokio::sync::Mutex;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn doc() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ForgeClient::try_new(Config::from_env()?).await?;
//! let config = ControllerConfig::from_env()?;
//! let store = GitTeamsStore::new(&config.git_url, "/var/lib/goliac/teams", "goliac", "goliac@example.com");
//!
//! let engine = Arc::new(Mutex::new(Goliac::new(client, store, config.clone(), CacheOptions::default())));
//! let scheduler = Scheduler::new(config.apply_interval);
//! let apply = {
//!     let engine = engine.clone();
//!     move || {
//!         let engine = engine.clone();
//!         async move {
//!             if let Err(e) = engine.lock().await.apply(false, false).await {
//!                 tracing::error!(error = %e, "apply pass failed");
//!             }
//!         }
//!     }
//! };
//! scheduler.run(CancellationToken::new(), apply).await;
//! # Ok(())
//! # }
//! ```

pub use goliac_client as client;
pub use goliac_core as core;
pub use goliac_runtime as runtime;

pub use goliac_client::{Config, ForgeClient, PassContext};
pub use goliac_core::{GoliacConfig, Repository, Ruleset, Team, User};
pub use goliac_runtime::{
    Command, ControllerConfig, Error, Goliac, LocalModel, Reconciler, RemoteCache, Scheduler,
    UnmanagedResources,
};

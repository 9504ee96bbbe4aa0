//! Client-less types and behavior shared across the goliac crates.
//!
//! This crate holds the declarative model parsed from a teams
//! repository (users, teams, repositories, rulesets and the global
//! `goliac.yaml` configuration), the manifest envelope those documents
//! share, and the generic set comparison the reconciler is built on.
//!
//! Nothing in here talks to a forge; the HTTP side lives in
//! `goliac-client` and the reconciliation engine in `goliac-runtime`.

pub mod config;
pub use config::{DestructiveOperations, GoliacConfig, RulesetMapping, VisibilityRules};

pub mod diff;
pub use diff::{compare, compare_with, Changes};

pub mod manifest;
pub use manifest::{Kind, Manifest};

pub mod repository;
pub use repository::{Autolink, BranchProtection, Environment, Permission, Repository, Visibility};

pub mod ruleset;
pub use ruleset::{BypassMode, Enforcement, Ruleset};

pub mod team;
pub use team::{slugify, Team, OWNERS_SUFFIX};

pub mod user;
pub use user::{User, UserKind};

mod error;
pub use error::Error;

/// Convenient alias for `Result` with the crate error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

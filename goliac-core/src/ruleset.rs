//! Ruleset declarations, shared between the organization level and
//! individual repositories.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Whether and how a ruleset is enforced.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    /// Rules exist but are not applied
    Disabled,
    /// Rules are applied
    #[default]
    Active,
    /// Rules run in dry-run, surfacing would-be violations
    Evaluate,
}

impl Enforcement {
    /// The string the REST API uses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Enforcement::Disabled => "disabled",
            Enforcement::Active => "active",
            Enforcement::Evaluate => "evaluate",
        }
    }
}

/// How a bypass actor may skip the ruleset.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BypassMode {
    /// Bypass on any push
    Always,
    /// Bypass only through a pull request
    PullRequest,
}

impl BypassMode {
    /// The string the REST API uses.
    pub fn as_str(&self) -> &'static str {
        match self {
            BypassMode::Always => "always",
            BypassMode::PullRequest => "pull_request",
        }
    }
}

/// Ref include/exclude conditions. Patterns use the forge's
/// `refs/heads/...` syntax with the `~DEFAULT_BRANCH` and `~ALL`
/// shorthands passed through untouched.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct RefConditions {
    /// Refs the ruleset applies to
    #[serde(default)]
    pub include: Vec<String>,
    /// Refs exempted from the ruleset
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// A ruleset: enforcement, bypass actors, ref conditions and rules.
///
/// Equality is structural; call [`Ruleset::normalize`] after building
/// one by hand so list-valued fields compare independently of input
/// order (loaders do this for every parsed document).
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Ruleset {
    /// Ruleset name, unique within its scope
    pub name: String,
    /// Enforcement mode
    pub enforcement: Enforcement,
    /// App slug → bypass mode
    #[serde(rename = "bypassApps")]
    pub bypass_apps: BTreeMap<String, BypassMode>,
    /// Ref conditions
    pub conditions: RefConditions,
    /// Rule type → parameter object, e.g.
    /// `pull_request: {required_approving_review_count: 1}`
    pub rules: BTreeMap<String, serde_json::Value>,
}

impl Ruleset {
    /// Sort set-like fields for order-insensitive structural equality.
    pub fn normalize(&mut self) {
        self.conditions.include.sort();
        self.conditions.exclude.sort();
    }
}

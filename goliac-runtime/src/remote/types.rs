//! In-memory projections of the live organization.
use std::collections::{BTreeMap, BTreeSet};

use goliac_core::{BranchProtection, Autolink, Permission, Ruleset, Visibility};
use serde::Deserialize;

/// Role of a user on a team.
///
/// REST uses lowercase, GraphQL uppercase; both deserialize.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    /// Plain member
    #[serde(alias = "MEMBER")]
    Member,
    /// Team maintainer
    #[serde(alias = "MAINTAINER")]
    Maintainer,
}

impl TeamRole {
    /// The role string REST membership endpoints expect.
    pub fn as_api_str(&self) -> &'static str {
        match self {
            TeamRole::Member => "member",
            TeamRole::Maintainer => "maintainer",
        }
    }
}

/// A team as it exists on the forge.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTeam {
    /// Display name
    pub name: String,
    /// Canonical slug
    pub slug: String,
    /// Numeric id, needed for parent updates
    pub id: u64,
    /// Slug of the parent team, if nested
    pub parent_slug: Option<String>,
    /// Description shown on the forge
    pub description: String,
    /// Direct members: login → role
    pub members: BTreeMap<String, TeamRole>,
}

/// A repository-level ruleset with its remote id.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRuleset {
    /// Remote id; `None` for entries minted by a dry-run overlay
    pub id: Option<u64>,
    /// The structural payload compared against declarations
    pub ruleset: Ruleset,
}

/// An organization-level ruleset: payload plus resolved repository scope.
#[derive(Debug, Clone, PartialEq)]
pub struct OrgRuleset {
    /// Remote id; `None` for entries minted by a dry-run overlay
    pub id: Option<u64>,
    /// The structural payload
    pub ruleset: Ruleset,
    /// Repository names the ruleset is scoped to
    pub repositories: BTreeSet<String>,
}

/// A classic branch protection rule with its GraphQL node id.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteBranchProtection {
    /// GraphQL node id; `None` for entries minted by a dry-run overlay
    pub id: Option<String>,
    /// The structural payload
    pub protection: BranchProtection,
}

/// An autolink reference with its remote id.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAutolink {
    /// Remote id; `None` for entries minted by a dry-run overlay
    pub id: Option<u64>,
    /// The structural payload
    pub autolink: Autolink,
}

/// A repository as it exists on the forge, including the per-repo
/// slices loaded over REST.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteRepo {
    /// Repository name
    pub name: String,
    /// Numeric id
    pub id: u64,
    /// GraphQL node id, needed for branch protection mutations
    pub node_id: String,
    /// Current visibility
    pub visibility: Visibility,
    /// Whether the repository is archived
    pub archived: bool,
    /// Whether the repository is a fork
    pub is_fork: bool,
    /// Current default branch
    pub default_branch: String,
    /// Description
    pub description: String,
    /// The boolean properties the reconciler manages
    pub bool_properties: BTreeMap<String, bool>,
    /// Outside collaborators: login → permission
    pub external_users: BTreeMap<String, Permission>,
    /// Repository rulesets by name
    pub rulesets: BTreeMap<String, RemoteRuleset>,
    /// Branch protections by pattern
    pub branch_protections: BTreeMap<String, RemoteBranchProtection>,
    /// Environments: name → variables
    pub environments: BTreeMap<String, BTreeMap<String, String>>,
    /// Repository-scoped action variables
    pub variables: BTreeMap<String, String>,
    /// Autolinks by key prefix
    pub autolinks: BTreeMap<String, RemoteAutolink>,
}

/// The full projected organization state.
///
/// Slices correspond to the TTL buckets of the cache; nested per-repo
/// data lives inside [`RemoteRepo`] and ages with the repository
/// slice.
#[derive(Debug, Clone, Default)]
pub struct RemoteData {
    /// Organization member logins
    pub users: BTreeSet<String>,
    /// Teams by slug
    pub teams: BTreeMap<String, RemoteTeam>,
    /// Repositories by name
    pub repositories: BTreeMap<String, RemoteRepo>,
    /// Team grants: team slug → repository name → permission
    pub team_repos: BTreeMap<String, BTreeMap<String, Permission>>,
    /// Organization rulesets by name
    pub rulesets: BTreeMap<String, OrgRuleset>,
    /// Installed apps: app slug → app id, for ruleset bypass actors
    pub app_ids: BTreeMap<String, u64>,
}

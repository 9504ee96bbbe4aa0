//! Repository declarations and their nested entities.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ruleset::Ruleset;

/// Repository visibility on the forge.
///
/// `Internal` requires an enterprise-capable organization and is
/// downgraded to `Private` by the reconciler everywhere else.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible to granted teams and collaborators only
    #[default]
    Private,
    /// Visible to every organization member
    Internal,
    /// World readable
    Public,
}

impl Visibility {
    /// The string the REST API uses for this visibility.
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Internal => "internal",
            Visibility::Public => "public",
        }
    }

    /// Parse the REST representation, tolerating unknown values as private.
    pub fn from_api(s: &str) -> Self {
        match s {
            "public" => Visibility::Public,
            "internal" => Visibility::Internal,
            _ => Visibility::Private,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access level of a team or outside collaborator on a repository.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permission {
    /// Pull access
    Read,
    /// Push access
    Write,
    /// Full administration
    Admin,
}

impl Permission {
    /// The role string REST mutation endpoints expect.
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Permission::Read => "pull",
            Permission::Write => "push",
            Permission::Admin => "admin",
        }
    }

    /// Map the forge's role strings back onto the three levels we manage.
    ///
    /// `triage` collapses to read and `maintain` to write; the finer
    /// grades are not expressible in the declarative model.
    pub fn from_api(s: &str) -> Self {
        match s {
            "admin" => Permission::Admin,
            "push" | "write" | "maintain" => Permission::Write,
            _ => Permission::Read,
        }
    }
}

/// A classic branch protection rule, keyed by branch pattern.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BranchProtection {
    /// Branch name pattern the rule applies to (e.g. `main`, `release/*`)
    pub pattern: String,
    /// Require pull-request reviews before merging
    pub requires_approving_reviews: bool,
    /// How many approvals are required
    pub required_approving_review_count: u32,
    /// Dismiss stale reviews when new commits land
    pub dismisses_stale_reviews: bool,
    /// Require status checks to pass
    pub requires_status_checks: bool,
    /// Require the branch to be up to date before merging
    pub requires_strict_status_checks: bool,
    /// Check contexts that must pass; kept sorted for stable diffs
    pub required_status_check_contexts: Vec<String>,
    /// Apply the rule to administrators as well
    pub is_admin_enforced: bool,
}

impl BranchProtection {
    /// Sort set-like fields so structural equality ignores input order.
    pub fn normalize(&mut self) {
        self.required_status_check_contexts.sort();
    }
}

/// A deployment environment and its variables.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Environment {
    /// Environment name
    pub name: String,
    /// Variables scoped to this environment
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// An autolink reference mapping a key prefix to a URL template.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Autolink {
    /// Prefix that triggers the link (e.g. `TICKET-`)
    pub key_prefix: String,
    /// Target URL with a `<num>` placeholder
    pub url_template: String,
    /// Whether the reference may contain letters as well as digits
    #[serde(default = "default_true")]
    pub is_alphanumeric: bool,
}

fn default_true() -> bool {
    true
}

/// Spec payload of a `kind: Repository` document.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RepositorySpec {
    /// Description propagated to the forge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Repository visibility
    pub visibility: Visibility,
    /// Names of teams granted write access (beyond the owner team)
    pub writers: Vec<String>,
    /// Names of teams granted read access
    pub readers: Vec<String>,
    /// Forge logins of outside collaborators with write access
    #[serde(rename = "externalWriters")]
    pub external_writers: Vec<String>,
    /// Forge logins of outside collaborators with read access
    #[serde(rename = "externalReaders")]
    pub external_readers: Vec<String>,
    /// Allow auto-merge on pull requests
    #[serde(rename = "allowAutoMerge")]
    pub allow_auto_merge: bool,
    /// Delete head branches once merged
    #[serde(rename = "deleteBranchOnMerge")]
    pub delete_branch_on_merge: bool,
    /// Permit the update-branch button
    #[serde(rename = "allowUpdateBranch")]
    pub allow_update_branch: bool,
    /// Default branch name
    #[serde(rename = "defaultBranch")]
    pub default_branch: Option<String>,
    /// Repository-level rulesets
    pub rulesets: Vec<Ruleset>,
    /// Classic branch protections
    #[serde(rename = "branchProtections")]
    pub branch_protections: Vec<BranchProtection>,
    /// Deployment environments
    pub environments: Vec<Environment>,
    /// Repository-scoped action variables
    pub variables: BTreeMap<String, String>,
    /// Autolink references
    pub autolinks: Vec<Autolink>,
    /// Create as a fork of this `owner/name` source
    #[serde(rename = "forkFrom", skip_serializing_if = "Option::is_none")]
    pub fork_from: Option<String>,
}

/// A declared repository, owned by at most one team.
#[derive(Debug, Clone, PartialEq)]
pub struct Repository {
    /// Unique repository name
    pub name: String,
    /// Owning team name; `None` only for archived leftovers
    pub owner: Option<String>,
    /// Whether the declaration sits under `archived/`
    pub archived: bool,
    /// The declared spec
    pub spec: RepositorySpec,
}

impl Repository {
    /// Build a repository from its manifest name and spec.
    pub fn new(name: impl Into<String>, spec: RepositorySpec) -> Self {
        let mut repo = Repository {
            name: name.into(),
            owner: None,
            archived: false,
            spec,
        };
        for ruleset in &mut repo.spec.rulesets {
            ruleset.normalize();
        }
        for protection in &mut repo.spec.branch_protections {
            protection.normalize();
        }
        repo
    }

    /// Default branch, falling back to `main`.
    pub fn default_branch(&self) -> &str {
        self.spec.default_branch.as_deref().unwrap_or("main")
    }

    /// The boolean properties diffed (and patched) one by one.
    pub fn bool_properties(&self) -> BTreeMap<&'static str, bool> {
        BTreeMap::from([
            ("allow_auto_merge", self.spec.allow_auto_merge),
            ("allow_update_branch", self.spec.allow_update_branch),
            ("delete_branch_on_merge", self.spec.delete_branch_on_merge),
        ])
    }

    /// Outside collaborators as a login → permission map.
    pub fn external_users(&self) -> BTreeMap<String, Permission> {
        let mut users = BTreeMap::new();
        for login in &self.spec.external_readers {
            users.insert(login.clone(), Permission::Read);
        }
        // writers win on double declaration
        for login in &self.spec.external_writers {
            users.insert(login.clone(), Permission::Write);
        }
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_round_trips_through_api_strings() {
        for v in [Visibility::Private, Visibility::Internal, Visibility::Public] {
            assert_eq!(Visibility::from_api(v.as_str()), v);
        }
    }

    #[test]
    fn permission_collapses_fine_grained_roles() {
        assert_eq!(Permission::from_api("triage"), Permission::Read);
        assert_eq!(Permission::from_api("maintain"), Permission::Write);
        assert_eq!(Permission::from_api("admin"), Permission::Admin);
    }

    #[test]
    fn external_writers_shadow_readers() {
        let repo = Repository::new("svc", RepositorySpec {
            external_readers: vec!["gh-x".into()],
            external_writers: vec!["gh-x".into()],
            ..RepositorySpec::default()
        });
        assert_eq!(repo.external_users()["gh-x"], Permission::Write);
    }

    #[test]
    fn spec_parses_with_defaults() {
        let spec: RepositorySpec = serde_yaml::from_str("visibility: public\n").unwrap();
        assert_eq!(spec.visibility, Visibility::Public);
        assert!(!spec.allow_auto_merge);
        assert!(spec.writers.is_empty());
        let repo = Repository::new("svc", spec);
        assert_eq!(repo.default_branch(), "main");
    }
}

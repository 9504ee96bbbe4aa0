//! The command set: one record per intended forge mutation.
//!
//! Commands are plain data. The reconciler emits them in a
//! deterministic order, the batch enforces the changeset guardrail,
//! and the executor maps each to exactly one REST or GraphQL mutation
//! plus the matching snapshot update. No command reads state from
//! another command.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use goliac_core::{Autolink, BranchProtection, Permission, Ruleset, Visibility};

use crate::remote::TeamRole;

/// A single intended mutation on the forge.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)] // field names mirror the REST payloads they become
pub enum Command {
    AddUserToOrg {
        login: String,
    },
    RemoveUserFromOrg {
        login: String,
    },

    CreateTeam {
        slug: String,
        name: String,
        description: String,
        parent_slug: Option<String>,
        members: Vec<String>,
    },
    UpdateTeamAddMember {
        team_slug: String,
        login: String,
        role: TeamRole,
    },
    UpdateTeamUpdateMember {
        team_slug: String,
        login: String,
        role: TeamRole,
    },
    UpdateTeamRemoveMember {
        team_slug: String,
        login: String,
    },
    UpdateTeamSetParent {
        team_slug: String,
        parent_slug: Option<String>,
    },
    DeleteTeam {
        team_slug: String,
    },

    CreateRepository {
        name: String,
        description: String,
        visibility: Visibility,
        default_branch: String,
        writers: Vec<String>,
        readers: Vec<String>,
        properties: BTreeMap<String, bool>,
        fork_from: Option<String>,
    },
    UpdateRepositoryUpdateProperty {
        repo: String,
        property: String,
        value: serde_json::Value,
    },
    UpdateRepositoryAddTeamAccess {
        repo: String,
        team_slug: String,
        permission: Permission,
    },
    UpdateRepositoryUpdateTeamAccess {
        repo: String,
        team_slug: String,
        permission: Permission,
    },
    UpdateRepositoryRemoveTeamAccess {
        repo: String,
        team_slug: String,
    },
    UpdateRepositorySetExternalUser {
        repo: String,
        login: String,
        permission: Permission,
    },
    UpdateRepositoryRemoveExternalUser {
        repo: String,
        login: String,
    },
    DeleteRepository {
        name: String,
    },

    AddRuleset {
        ruleset: Ruleset,
        repositories: BTreeSet<String>,
    },
    UpdateRuleset {
        id: Option<u64>,
        ruleset: Ruleset,
        repositories: BTreeSet<String>,
    },
    DeleteRuleset {
        name: String,
        id: Option<u64>,
    },

    AddRepositoryRuleset {
        repo: String,
        ruleset: Ruleset,
    },
    UpdateRepositoryRuleset {
        repo: String,
        id: Option<u64>,
        ruleset: Ruleset,
    },
    DeleteRepositoryRuleset {
        repo: String,
        name: String,
        id: Option<u64>,
    },

    AddRepositoryBranchProtection {
        repo: String,
        protection: BranchProtection,
    },
    UpdateRepositoryBranchProtection {
        repo: String,
        id: Option<String>,
        protection: BranchProtection,
    },
    DeleteRepositoryBranchProtection {
        repo: String,
        pattern: String,
        id: Option<String>,
    },

    AddRepositoryEnvironment {
        repo: String,
        environment: String,
    },
    DeleteRepositoryEnvironment {
        repo: String,
        environment: String,
    },

    AddRepositoryVariable {
        repo: String,
        name: String,
        value: String,
    },
    UpdateRepositoryVariable {
        repo: String,
        name: String,
        value: String,
    },
    DeleteRepositoryVariable {
        repo: String,
        name: String,
    },

    AddRepositoryEnvironmentVariable {
        repo: String,
        environment: String,
        name: String,
        value: String,
    },
    UpdateRepositoryEnvironmentVariable {
        repo: String,
        environment: String,
        name: String,
        value: String,
    },
    DeleteRepositoryEnvironmentVariable {
        repo: String,
        environment: String,
        name: String,
    },

    AddRepositoryAutolink {
        repo: String,
        autolink: Autolink,
    },
    DeleteRepositoryAutolink {
        repo: String,
        key_prefix: String,
        id: Option<u64>,
    },
}

impl Command {
    /// Whether this command removes or archives remote state.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Command::RemoveUserFromOrg { .. }
                | Command::DeleteTeam { .. }
                | Command::DeleteRepository { .. }
                | Command::DeleteRuleset { .. }
                | Command::DeleteRepositoryRuleset { .. }
                | Command::DeleteRepositoryBranchProtection { .. }
                | Command::DeleteRepositoryEnvironment { .. }
                | Command::DeleteRepositoryVariable { .. }
                | Command::DeleteRepositoryEnvironmentVariable { .. }
                | Command::DeleteRepositoryAutolink { .. }
        ) || matches!(
            self,
            Command::UpdateRepositoryUpdateProperty { property, value, .. }
                if property == "archived" && value == &serde_json::Value::Bool(true)
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::AddUserToOrg { login } => write!(f, "AddUserToOrg({login})"),
            Command::RemoveUserFromOrg { login } => write!(f, "RemoveUserFromOrg({login})"),
            Command::CreateTeam { slug, .. } => write!(f, "CreateTeam({slug})"),
            Command::UpdateTeamAddMember { team_slug, login, .. } => {
                write!(f, "UpdateTeamAddMember({team_slug}, {login})")
            }
            Command::UpdateTeamUpdateMember { team_slug, login, .. } => {
                write!(f, "UpdateTeamUpdateMember({team_slug}, {login})")
            }
            Command::UpdateTeamRemoveMember { team_slug, login } => {
                write!(f, "UpdateTeamRemoveMember({team_slug}, {login})")
            }
            Command::UpdateTeamSetParent { team_slug, parent_slug } => {
                write!(f, "UpdateTeamSetParent({team_slug}, {parent_slug:?})")
            }
            Command::DeleteTeam { team_slug } => write!(f, "DeleteTeam({team_slug})"),
            Command::CreateRepository { name, .. } => write!(f, "CreateRepository({name})"),
            Command::UpdateRepositoryUpdateProperty { repo, property, value } => {
                write!(f, "UpdateRepositoryUpdateProperty({repo}, {property}, {value})")
            }
            Command::UpdateRepositoryAddTeamAccess { repo, team_slug, permission } => {
                write!(f, "UpdateRepositoryAddTeamAccess({repo}, {team_slug}, {})", permission.as_api_str())
            }
            Command::UpdateRepositoryUpdateTeamAccess { repo, team_slug, permission } => {
                write!(f, "UpdateRepositoryUpdateTeamAccess({repo}, {team_slug}, {})", permission.as_api_str())
            }
            Command::UpdateRepositoryRemoveTeamAccess { repo, team_slug } => {
                write!(f, "UpdateRepositoryRemoveTeamAccess({repo}, {team_slug})")
            }
            Command::UpdateRepositorySetExternalUser { repo, login, permission } => {
                write!(f, "UpdateRepositorySetExternalUser({repo}, {login}, {})", permission.as_api_str())
            }
            Command::UpdateRepositoryRemoveExternalUser { repo, login } => {
                write!(f, "UpdateRepositoryRemoveExternalUser({repo}, {login})")
            }
            Command::DeleteRepository { name } => write!(f, "DeleteRepository({name})"),
            Command::AddRuleset { ruleset, .. } => write!(f, "AddRuleset({})", ruleset.name),
            Command::UpdateRuleset { ruleset, .. } => write!(f, "UpdateRuleset({})", ruleset.name),
            Command::DeleteRuleset { name, .. } => write!(f, "DeleteRuleset({name})"),
            Command::AddRepositoryRuleset { repo, ruleset } => {
                write!(f, "AddRepositoryRuleset({repo}, {})", ruleset.name)
            }
            Command::UpdateRepositoryRuleset { repo, ruleset, .. } => {
                write!(f, "UpdateRepositoryRuleset({repo}, {})", ruleset.name)
            }
            Command::DeleteRepositoryRuleset { repo, name, .. } => {
                write!(f, "DeleteRepositoryRuleset({repo}, {name})")
            }
            Command::AddRepositoryBranchProtection { repo, protection } => {
                write!(f, "AddRepositoryBranchProtection({repo}, {})", protection.pattern)
            }
            Command::UpdateRepositoryBranchProtection { repo, protection, .. } => {
                write!(f, "UpdateRepositoryBranchProtection({repo}, {})", protection.pattern)
            }
            Command::DeleteRepositoryBranchProtection { repo, pattern, .. } => {
                write!(f, "DeleteRepositoryBranchProtection({repo}, {pattern})")
            }
            Command::AddRepositoryEnvironment { repo, environment } => {
                write!(f, "AddRepositoryEnvironment({repo}, {environment})")
            }
            Command::DeleteRepositoryEnvironment { repo, environment } => {
                write!(f, "DeleteRepositoryEnvironment({repo}, {environment})")
            }
            Command::AddRepositoryVariable { repo, name, .. } => {
                write!(f, "AddRepositoryVariable({repo}, {name})")
            }
            Command::UpdateRepositoryVariable { repo, name, .. } => {
                write!(f, "UpdateRepositoryVariable({repo}, {name})")
            }
            Command::DeleteRepositoryVariable { repo, name } => {
                write!(f, "DeleteRepositoryVariable({repo}, {name})")
            }
            Command::AddRepositoryEnvironmentVariable { repo, environment, name, .. } => {
                write!(f, "AddRepositoryEnvironmentVariable({repo}, {environment}, {name})")
            }
            Command::UpdateRepositoryEnvironmentVariable { repo, environment, name, .. } => {
                write!(f, "UpdateRepositoryEnvironmentVariable({repo}, {environment}, {name})")
            }
            Command::DeleteRepositoryEnvironmentVariable { repo, environment, name } => {
                write!(f, "DeleteRepositoryEnvironmentVariable({repo}, {environment}, {name})")
            }
            Command::AddRepositoryAutolink { repo, autolink } => {
                write!(f, "AddRepositoryAutolink({repo}, {})", autolink.key_prefix)
            }
            Command::DeleteRepositoryAutolink { repo, key_prefix, .. } => {
                write!(f, "DeleteRepositoryAutolink({repo}, {key_prefix})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_counts_as_destructive() {
        let archive = Command::UpdateRepositoryUpdateProperty {
            repo: "svc".into(),
            property: "archived".into(),
            value: serde_json::Value::Bool(true),
        };
        assert!(archive.is_destructive());

        let unarchive = Command::UpdateRepositoryUpdateProperty {
            repo: "svc".into(),
            property: "archived".into(),
            value: serde_json::Value::Bool(false),
        };
        assert!(!unarchive.is_destructive());
    }

    #[test]
    fn display_is_compact() {
        let cmd = Command::UpdateRepositoryAddTeamAccess {
            repo: "svc".into(),
            team_slug: "acme".into(),
            permission: Permission::Write,
        };
        assert_eq!(cmd.to_string(), "UpdateRepositoryAddTeamAccess(svc, acme, push)");
    }
}

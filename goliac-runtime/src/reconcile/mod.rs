//! The reconciler: turn (local model, remote snapshot) into an
//! ordered command stream.
//!
//! Stage order is users → teams → repositories → organization
//! rulesets, with parents created before children and deletions
//! trailing creations within each stage. All reads are pure; the
//! emitted batch is only applied at commit time, so a guardrail
//! refusal leaves the forge untouched.
use std::collections::{BTreeMap, BTreeSet};

use goliac_core::{
    compare, slugify, Autolink, BranchProtection, Permission, Ruleset, Visibility,
};

use crate::{
    errors::ErrorCollection,
    local::LocalModel,
    remote::{RemoteRepo, RemoteState, TeamRole},
};

pub mod apply;
pub mod batch;
pub mod command;

pub use apply::LiveExecutor;
pub use batch::{CommandBatch, CommandExecutor};
pub use command::Command;

const MAX_PARENT_DEPTH: usize = 32;

/// Remote entities that exist but are not tracked by any local
/// declaration (or whose deletion is disallowed). Never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnmanagedResources {
    /// Organization members not declared under `users/`
    pub users: BTreeSet<String>,
    /// Team slugs not declared under `teams/`
    pub teams: BTreeSet<String>,
    /// Repositories not declared anywhere in the tree
    pub repositories: BTreeSet<String>,
    /// Rulesets (org-level by name, repo-level as `repo/name`)
    pub rulesets: BTreeSet<String>,
}

/// One reconciliation of a local model against a remote projection.
pub struct Reconciler<'a> {
    local: &'a LocalModel,
    teams_repo: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
struct DesiredTeam {
    name: String,
    description: String,
    parent_slug: Option<String>,
    members: BTreeMap<String, TeamRole>,
    externally_managed: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct DesiredRepo {
    description: String,
    visibility: Visibility,
    archived: bool,
    default_branch: String,
    bool_properties: BTreeMap<String, bool>,
    grants: BTreeMap<String, Permission>,
    external_users: BTreeMap<String, Permission>,
    rulesets: BTreeMap<String, Ruleset>,
    branch_protections: BTreeMap<String, BranchProtection>,
    environments: BTreeMap<String, BTreeMap<String, String>>,
    variables: BTreeMap<String, String>,
    autolinks: BTreeMap<String, Autolink>,
    fork_from: Option<String>,
}

impl<'a> Reconciler<'a> {
    /// A reconciler for one pass.
    pub fn new(local: &'a LocalModel, teams_repo: &'a str) -> Self {
        Reconciler { local, teams_repo }
    }

    /// Populate `batch` with the minimum command stream converging
    /// the remote onto the local model, and report what stays
    /// unmanaged.
    pub fn reconcile(
        &self,
        remote: &impl RemoteState,
        batch: &mut CommandBatch,
        errors: &mut ErrorCollection,
    ) -> UnmanagedResources {
        let mut unmanaged = UnmanagedResources::default();
        self.reconcile_users(remote, batch, errors, &mut unmanaged);
        self.reconcile_teams(remote, batch, errors, &mut unmanaged);
        self.reconcile_repositories(remote, batch, errors, &mut unmanaged);
        self.reconcile_rulesets(remote, batch, errors, &mut unmanaged);
        unmanaged
    }

    fn reconcile_users(
        &self,
        remote: &impl RemoteState,
        batch: &mut CommandBatch,
        errors: &mut ErrorCollection,
        unmanaged: &mut UnmanagedResources,
    ) {
        let desired: BTreeMap<String, ()> = self
            .local
            .users
            .values()
            .filter(|u| u.is_member())
            .map(|u| (u.login.clone(), ()))
            .collect();
        let actual: BTreeMap<String, ()> =
            remote.users().iter().map(|l| (l.clone(), ())).collect();

        let changes = compare(&desired, &actual, |_, _, _| true);
        for (login, _) in changes.added {
            batch.add(Command::AddUserToOrg { login: login.clone() });
        }
        for (login, _) in changes.removed {
            if self.local.config.destructive_operations.users {
                batch.add(Command::RemoveUserFromOrg { login: login.clone() });
            } else {
                errors.warn(format!(
                    "organization member '{login}' is not declared; destructive user operations are disabled"
                ));
                unmanaged.users.insert(login.clone());
            }
        }
    }

    fn login_of(&self, username: &str) -> Option<String> {
        self.local.users.get(username).map(|u| u.login.clone())
    }

    fn desired_teams(&self) -> BTreeMap<String, DesiredTeam> {
        let mut desired = BTreeMap::new();
        for team in self.local.teams.values() {
            let members: BTreeMap<String, TeamRole> = team
                .all_members()
                .iter()
                .filter_map(|u| self.login_of(u))
                .map(|login| (login, TeamRole::Member))
                .collect();
            let owners: BTreeMap<String, TeamRole> = team
                .owners
                .iter()
                .filter_map(|u| self.login_of(u))
                .map(|login| (login, TeamRole::Member))
                .collect();

            let parent_slug = team
                .parent
                .as_ref()
                .and_then(|p| self.local.teams.get(p))
                .map(|p| p.slug());

            desired.insert(team.slug(), DesiredTeam {
                name: team.name.clone(),
                description: team.description.clone().unwrap_or_default(),
                parent_slug,
                members,
                externally_managed: team.externally_managed,
            });
            desired.insert(team.owners_team_slug(), DesiredTeam {
                name: team.owners_team_name(),
                description: format!("{} owners", team.name),
                parent_slug: None,
                members: owners,
                externally_managed: false,
            });
        }
        desired
    }

    fn reconcile_teams(
        &self,
        remote: &impl RemoteState,
        batch: &mut CommandBatch,
        errors: &mut ErrorCollection,
        unmanaged: &mut UnmanagedResources,
    ) {
        let desired = self.desired_teams();
        let changes = compare(&desired, remote.teams(), |_, want, have| {
            want.parent_slug == have.parent_slug
                && (want.externally_managed || want.members == have.members)
        });

        // Creations, parents ahead of children
        let added: BTreeSet<&String> = changes.added.iter().map(|(slug, _)| *slug).collect();
        let mut created: BTreeSet<String> = BTreeSet::new();
        for (slug, _) in &changes.added {
            let mut chain = vec![(*slug).clone()];
            let mut current = (*slug).clone();
            for _ in 0..MAX_PARENT_DEPTH {
                match desired[&current].parent_slug.clone() {
                    Some(parent) if added.contains(&parent) && !created.contains(&parent) => {
                        chain.push(parent.clone());
                        current = parent;
                    }
                    _ => break,
                }
            }
            for slug in chain.into_iter().rev() {
                if created.insert(slug.clone()) {
                    let team = &desired[&slug];
                    batch.add(Command::CreateTeam {
                        slug,
                        name: team.name.clone(),
                        description: team.description.clone(),
                        parent_slug: team.parent_slug.clone(),
                        members: team.members.keys().cloned().collect(),
                    });
                }
            }
        }

        for (slug, want, have) in &changes.changed {
            if want.parent_slug != have.parent_slug {
                batch.add(Command::UpdateTeamSetParent {
                    team_slug: (*slug).clone(),
                    parent_slug: want.parent_slug.clone(),
                });
            }
            if want.externally_managed {
                continue;
            }
            let members = compare(&want.members, &have.members, |_, a, b| a == b);
            for (login, role) in members.added {
                batch.add(Command::UpdateTeamAddMember {
                    team_slug: (*slug).clone(),
                    login: login.clone(),
                    role: *role,
                });
            }
            for (login, role, _) in members.changed {
                batch.add(Command::UpdateTeamUpdateMember {
                    team_slug: (*slug).clone(),
                    login: login.clone(),
                    role: *role,
                });
            }
            for (login, _) in members.removed {
                batch.add(Command::UpdateTeamRemoveMember {
                    team_slug: (*slug).clone(),
                    login: login.clone(),
                });
            }
        }

        for (slug, _) in changes.removed {
            if self.local.config.destructive_operations.teams {
                batch.add(Command::DeleteTeam { team_slug: slug.clone() });
            } else {
                errors.warn(format!(
                    "team '{slug}' is not declared; destructive team operations are disabled"
                ));
                unmanaged.teams.insert(slug.clone());
            }
        }
    }

    fn desired_repos(
        &self,
        remote: &impl RemoteState,
        errors: &mut ErrorCollection,
    ) -> BTreeMap<String, DesiredRepo> {
        let config = &self.local.config;
        let exclusions = config
            .visibility_rules
            .compiled_exclusions()
            .unwrap_or_default();

        let mut desired = BTreeMap::new();
        for repo in self.local.repositories.values() {
            // visibility filter
            let mut visibility = repo.spec.visibility;
            if visibility == Visibility::Internal && !remote.supports_internal_repos() {
                errors.warn(format!(
                    "repository '{}': 'internal' visibility needs an enterprise organization, downgrading to 'private'",
                    repo.name
                ));
                visibility = Visibility::Private;
            }
            if visibility == Visibility::Public
                && config.visibility_rules.forbid_public_repositories
                && !exclusions.iter().any(|re| re.is_match(&repo.name))
            {
                errors.warn(format!(
                    "repository '{}': public repositories are forbidden, downgrading to 'private'",
                    repo.name
                ));
                visibility = Visibility::Private;
            }

            let mut grants: BTreeMap<String, Permission> = BTreeMap::new();
            if let Some(owner) = &repo.owner {
                if let Some(team) = self.local.teams.get(owner) {
                    grants.insert(team.slug(), Permission::Write);
                }
            }
            for writer in &repo.spec.writers {
                match self.local.teams.get(writer) {
                    Some(team) => {
                        grants.insert(team.slug(), Permission::Write);
                    }
                    None => errors.warn(format!(
                        "repository '{}': unknown writer team '{writer}'",
                        repo.name
                    )),
                }
            }
            for reader in &repo.spec.readers {
                match self.local.teams.get(reader) {
                    Some(team) => {
                        grants.entry(team.slug()).or_insert(Permission::Read);
                    }
                    None => errors.warn(format!(
                        "repository '{}': unknown reader team '{reader}'",
                        repo.name
                    )),
                }
            }
            if repo.name == self.teams_repo {
                // owners approve pull requests over their own subtree
                for team in self.local.teams.values() {
                    grants.insert(team.owners_team_slug(), Permission::Write);
                }
                grants.insert(slugify(&config.admin_team), Permission::Write);
            }

            desired.insert(repo.name.clone(), DesiredRepo {
                description: repo.spec.description.clone().unwrap_or_default(),
                visibility,
                archived: repo.archived,
                default_branch: repo.default_branch().to_string(),
                bool_properties: repo
                    .bool_properties()
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
                grants,
                external_users: repo.external_users(),
                rulesets: repo
                    .spec
                    .rulesets
                    .iter()
                    .map(|r| (r.name.clone(), r.clone()))
                    .collect(),
                branch_protections: repo
                    .spec
                    .branch_protections
                    .iter()
                    .map(|p| (p.pattern.clone(), p.clone()))
                    .collect(),
                environments: repo
                    .spec
                    .environments
                    .iter()
                    .map(|e| (e.name.clone(), e.variables.clone()))
                    .collect(),
                variables: repo.spec.variables.clone(),
                autolinks: repo
                    .spec
                    .autolinks
                    .iter()
                    .map(|a| (a.key_prefix.clone(), a.clone()))
                    .collect(),
                fork_from: repo.spec.fork_from.clone(),
            });
        }
        desired
    }

    fn reconcile_repositories(
        &self,
        remote: &impl RemoteState,
        batch: &mut CommandBatch,
        errors: &mut ErrorCollection,
        unmanaged: &mut UnmanagedResources,
    ) {
        let desired = self.desired_repos(remote, errors);

        // remote grants pivoted per repository
        let mut remote_grants: BTreeMap<&String, BTreeMap<String, Permission>> = BTreeMap::new();
        for (slug, repos) in remote.team_repos() {
            for (repo, permission) in repos {
                remote_grants
                    .entry(repo)
                    .or_default()
                    .insert(slug.clone(), *permission);
            }
        }
        let empty_grants = BTreeMap::new();

        let changes = compare(&desired, remote.repositories(), |name, want, have| {
            let have_grants = remote_grants.get(name).unwrap_or(&empty_grants);
            repo_converged(want, have, have_grants)
        });

        for (name, want) in changes.added {
            if want.archived {
                // nothing to archive when the repo never existed
                continue;
            }
            batch.add(Command::CreateRepository {
                name: name.clone(),
                description: want.description.clone(),
                visibility: want.visibility,
                default_branch: want.default_branch.clone(),
                writers: want
                    .grants
                    .iter()
                    .filter(|(_, p)| **p >= Permission::Write)
                    .map(|(slug, _)| slug.clone())
                    .collect(),
                readers: want
                    .grants
                    .iter()
                    .filter(|(_, p)| **p == Permission::Read)
                    .map(|(slug, _)| slug.clone())
                    .collect(),
                properties: want.bool_properties.clone(),
                fork_from: want.fork_from.clone(),
            });
            for (login, permission) in &want.external_users {
                batch.add(Command::UpdateRepositorySetExternalUser {
                    repo: name.clone(),
                    login: login.clone(),
                    permission: *permission,
                });
            }
            self.emit_nested_adds(name, want, batch);
        }

        for (name, want, have) in changes.changed {
            let have_grants = remote_grants.get(name).unwrap_or(&empty_grants);
            self.reconcile_repository_change(name, want, have, have_grants, batch, errors, unmanaged);
        }

        for (name, have) in changes.removed {
            if name == self.teams_repo {
                errors.warn(format!(
                    "teams repository '{name}' is not declared in its own tree; leaving it alone"
                ));
                unmanaged.repositories.insert(name.clone());
                continue;
            }
            if have.archived {
                unmanaged.repositories.insert(name.clone());
                continue;
            }
            if self.local.config.archive_on_delete {
                batch.add(Command::UpdateRepositoryUpdateProperty {
                    repo: name.clone(),
                    property: "archived".to_string(),
                    value: serde_json::Value::Bool(true),
                });
            } else if self.local.config.destructive_operations.repositories {
                batch.add(Command::DeleteRepository { name: name.clone() });
            } else {
                errors.warn(format!(
                    "repository '{name}' is not declared; destructive repository operations are disabled"
                ));
                unmanaged.repositories.insert(name.clone());
            }
        }
    }

    fn emit_nested_adds(&self, name: &str, want: &DesiredRepo, batch: &mut CommandBatch) {
        for ruleset in want.rulesets.values() {
            batch.add(Command::AddRepositoryRuleset {
                repo: name.to_string(),
                ruleset: ruleset.clone(),
            });
        }
        for protection in want.branch_protections.values() {
            batch.add(Command::AddRepositoryBranchProtection {
                repo: name.to_string(),
                protection: protection.clone(),
            });
        }
        for (environment, variables) in &want.environments {
            batch.add(Command::AddRepositoryEnvironment {
                repo: name.to_string(),
                environment: environment.clone(),
            });
            for (var, value) in variables {
                batch.add(Command::AddRepositoryEnvironmentVariable {
                    repo: name.to_string(),
                    environment: environment.clone(),
                    name: var.clone(),
                    value: value.clone(),
                });
            }
        }
        for (var, value) in &want.variables {
            batch.add(Command::AddRepositoryVariable {
                repo: name.to_string(),
                name: var.clone(),
                value: value.clone(),
            });
        }
        for autolink in want.autolinks.values() {
            batch.add(Command::AddRepositoryAutolink {
                repo: name.to_string(),
                autolink: autolink.clone(),
            });
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn reconcile_repository_change(
        &self,
        name: &String,
        want: &DesiredRepo,
        have: &RemoteRepo,
        have_grants: &BTreeMap<String, Permission>,
        batch: &mut CommandBatch,
        errors: &mut ErrorCollection,
        unmanaged: &mut UnmanagedResources,
    ) {
        if want.archived && have.archived {
            return;
        }
        if want.archived {
            // archiving freezes the repo; nothing else is worth patching
            batch.add(Command::UpdateRepositoryUpdateProperty {
                repo: name.clone(),
                property: "archived".to_string(),
                value: serde_json::Value::Bool(true),
            });
            return;
        }
        if have.archived {
            // unarchive first, the forge refuses edits on archived repos
            batch.add(Command::UpdateRepositoryUpdateProperty {
                repo: name.clone(),
                property: "archived".to_string(),
                value: serde_json::Value::Bool(false),
            });
        }

        if want.visibility != have.visibility {
            batch.add(Command::UpdateRepositoryUpdateProperty {
                repo: name.clone(),
                property: "visibility".to_string(),
                value: serde_json::Value::String(want.visibility.as_str().to_string()),
            });
        }
        if want.default_branch != have.default_branch {
            batch.add(Command::UpdateRepositoryUpdateProperty {
                repo: name.clone(),
                property: "default_branch".to_string(),
                value: serde_json::Value::String(want.default_branch.clone()),
            });
        }
        for (property, value) in &want.bool_properties {
            if have.bool_properties.get(property) != Some(value) {
                batch.add(Command::UpdateRepositoryUpdateProperty {
                    repo: name.clone(),
                    property: property.clone(),
                    value: serde_json::Value::Bool(*value),
                });
            }
        }

        let grants = compare(&want.grants, have_grants, |_, a, b| a == b);
        for (slug, permission) in grants.added {
            batch.add(Command::UpdateRepositoryAddTeamAccess {
                repo: name.clone(),
                team_slug: slug.clone(),
                permission: *permission,
            });
        }
        for (slug, permission, _) in grants.changed {
            batch.add(Command::UpdateRepositoryUpdateTeamAccess {
                repo: name.clone(),
                team_slug: slug.clone(),
                permission: *permission,
            });
        }
        for (slug, _) in grants.removed {
            batch.add(Command::UpdateRepositoryRemoveTeamAccess {
                repo: name.clone(),
                team_slug: slug.clone(),
            });
        }

        let externals = compare(&want.external_users, &have.external_users, |_, a, b| a == b);
        for (login, permission) in externals.added {
            batch.add(Command::UpdateRepositorySetExternalUser {
                repo: name.clone(),
                login: login.clone(),
                permission: *permission,
            });
        }
        for (login, permission, _) in externals.changed {
            batch.add(Command::UpdateRepositorySetExternalUser {
                repo: name.clone(),
                login: login.clone(),
                permission: *permission,
            });
        }
        for (login, _) in externals.removed {
            batch.add(Command::UpdateRepositoryRemoveExternalUser {
                repo: name.clone(),
                login: login.clone(),
            });
        }

        let rulesets = compare(&want.rulesets, &have.rulesets, |_, a, b| *a == b.ruleset);
        for (_, ruleset) in rulesets.added {
            batch.add(Command::AddRepositoryRuleset {
                repo: name.clone(),
                ruleset: ruleset.clone(),
            });
        }
        for (_, ruleset, have_ruleset) in rulesets.changed {
            batch.add(Command::UpdateRepositoryRuleset {
                repo: name.clone(),
                id: have_ruleset.id,
                ruleset: ruleset.clone(),
            });
        }
        for (ruleset_name, have_ruleset) in rulesets.removed {
            if self.local.config.destructive_operations.rulesets {
                batch.add(Command::DeleteRepositoryRuleset {
                    repo: name.clone(),
                    name: ruleset_name.clone(),
                    id: have_ruleset.id,
                });
            } else {
                errors.warn(format!(
                    "ruleset '{ruleset_name}' on repository '{name}' is not declared; destructive ruleset operations are disabled"
                ));
                unmanaged.rulesets.insert(format!("{name}/{ruleset_name}"));
            }
        }

        let protections = compare(&want.branch_protections, &have.branch_protections, |_, a, b| {
            *a == b.protection
        });
        for (_, protection) in protections.added {
            batch.add(Command::AddRepositoryBranchProtection {
                repo: name.clone(),
                protection: protection.clone(),
            });
        }
        for (_, protection, have_protection) in protections.changed {
            batch.add(Command::UpdateRepositoryBranchProtection {
                repo: name.clone(),
                id: have_protection.id.clone(),
                protection: protection.clone(),
            });
        }
        for (pattern, have_protection) in protections.removed {
            if self.local.config.destructive_operations.rulesets {
                batch.add(Command::DeleteRepositoryBranchProtection {
                    repo: name.clone(),
                    pattern: pattern.clone(),
                    id: have_protection.id.clone(),
                });
            } else {
                errors.warn(format!(
                    "branch protection '{pattern}' on repository '{name}' is not declared; destructive ruleset operations are disabled"
                ));
                unmanaged.rulesets.insert(format!("{name}/{pattern}"));
            }
        }

        let environments = compare(&want.environments, &have.environments, |_, a, b| a == b);
        for (environment, variables) in environments.added {
            batch.add(Command::AddRepositoryEnvironment {
                repo: name.clone(),
                environment: environment.clone(),
            });
            for (var, value) in variables {
                batch.add(Command::AddRepositoryEnvironmentVariable {
                    repo: name.clone(),
                    environment: environment.clone(),
                    name: var.clone(),
                    value: value.clone(),
                });
            }
        }
        for (environment, want_vars, have_vars) in environments.changed {
            let vars = compare(want_vars, have_vars, |_, a, b| a == b);
            for (var, value) in vars.added {
                batch.add(Command::AddRepositoryEnvironmentVariable {
                    repo: name.clone(),
                    environment: environment.clone(),
                    name: var.clone(),
                    value: value.clone(),
                });
            }
            for (var, value, _) in vars.changed {
                batch.add(Command::UpdateRepositoryEnvironmentVariable {
                    repo: name.clone(),
                    environment: environment.clone(),
                    name: var.clone(),
                    value: value.clone(),
                });
            }
            for (var, _) in vars.removed {
                batch.add(Command::DeleteRepositoryEnvironmentVariable {
                    repo: name.clone(),
                    environment: environment.clone(),
                    name: var.clone(),
                });
            }
        }
        for (environment, _) in environments.removed {
            batch.add(Command::DeleteRepositoryEnvironment {
                repo: name.clone(),
                environment: environment.clone(),
            });
        }

        let variables = compare(&want.variables, &have.variables, |_, a, b| a == b);
        for (var, value) in variables.added {
            batch.add(Command::AddRepositoryVariable {
                repo: name.clone(),
                name: var.clone(),
                value: value.clone(),
            });
        }
        for (var, value, _) in variables.changed {
            batch.add(Command::UpdateRepositoryVariable {
                repo: name.clone(),
                name: var.clone(),
                value: value.clone(),
            });
        }
        for (var, _) in variables.removed {
            batch.add(Command::DeleteRepositoryVariable {
                repo: name.clone(),
                name: var.clone(),
            });
        }

        // the REST surface has no autolink update; replace on change
        let autolinks = compare(&want.autolinks, &have.autolinks, |_, a, b| *a == b.autolink);
        for (_, autolink) in autolinks.added {
            batch.add(Command::AddRepositoryAutolink {
                repo: name.clone(),
                autolink: autolink.clone(),
            });
        }
        for (key_prefix, autolink, have_autolink) in autolinks.changed {
            batch.add(Command::DeleteRepositoryAutolink {
                repo: name.clone(),
                key_prefix: key_prefix.clone(),
                id: have_autolink.id,
            });
            batch.add(Command::AddRepositoryAutolink {
                repo: name.clone(),
                autolink: autolink.clone(),
            });
        }
        for (key_prefix, have_autolink) in autolinks.removed {
            batch.add(Command::DeleteRepositoryAutolink {
                repo: name.clone(),
                key_prefix: key_prefix.clone(),
                id: have_autolink.id,
            });
        }
    }

    fn reconcile_rulesets(
        &self,
        remote: &impl RemoteState,
        batch: &mut CommandBatch,
        errors: &mut ErrorCollection,
        unmanaged: &mut UnmanagedResources,
    ) {
        let mut desired: BTreeMap<String, (Ruleset, BTreeSet<String>)> = BTreeMap::new();
        for mapping in &self.local.config.rulesets {
            let Some(ruleset) = self.local.rulesets.get(&mapping.ruleset) else {
                continue; // validation already rejected this
            };
            let Ok(pattern) = mapping.compiled() else {
                continue;
            };
            let matched: BTreeSet<String> = self
                .local
                .repositories
                .values()
                .filter(|r| !r.archived && pattern.is_match(&r.name))
                .map(|r| r.name.clone())
                .collect();
            desired
                .entry(mapping.ruleset.clone())
                .and_modify(|(_, repos)| repos.extend(matched.iter().cloned()))
                .or_insert((ruleset.clone(), matched));
        }

        let changes = compare(&desired, remote.rulesets(), |_, (want, repos), have| {
            *want == have.ruleset && *repos == have.repositories
        });
        for (_, (ruleset, repositories)) in changes.added {
            batch.add(Command::AddRuleset {
                ruleset: ruleset.clone(),
                repositories: repositories.clone(),
            });
        }
        for (_, (ruleset, repositories), have) in changes.changed {
            batch.add(Command::UpdateRuleset {
                id: have.id,
                ruleset: ruleset.clone(),
                repositories: repositories.clone(),
            });
        }
        for (name, have) in changes.removed {
            if self.local.config.destructive_operations.rulesets {
                batch.add(Command::DeleteRuleset {
                    name: name.clone(),
                    id: have.id,
                });
            } else {
                errors.warn(format!(
                    "organization ruleset '{name}' is not declared; destructive ruleset operations are disabled"
                ));
                unmanaged.rulesets.insert(name.clone());
            }
        }
    }
}

fn repo_converged(
    want: &DesiredRepo,
    have: &RemoteRepo,
    have_grants: &BTreeMap<String, Permission>,
) -> bool {
    if want.archived && have.archived {
        // frozen on both sides; nested state is out of scope
        return true;
    }
    want.archived == have.archived
        && want.visibility == have.visibility
        && want.default_branch == have.default_branch
        && want.bool_properties == have.bool_properties
        && want.grants == *have_grants
        && want.external_users == have.external_users
        && want.rulesets.len() == have.rulesets.len()
        && want
            .rulesets
            .iter()
            .all(|(k, v)| have.rulesets.get(k).is_some_and(|h| h.ruleset == *v))
        && want.branch_protections.len() == have.branch_protections.len()
        && want
            .branch_protections
            .iter()
            .all(|(k, v)| have.branch_protections.get(k).is_some_and(|h| h.protection == *v))
        && want.environments == have.environments
        && want.variables == have.variables
        && want.autolinks.len() == have.autolinks.len()
        && want
            .autolinks
            .iter()
            .all(|(k, v)| have.autolinks.get(k).is_some_and(|h| h.autolink == *v))
}

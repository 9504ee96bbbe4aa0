//! The remote snapshot: a TTL-bucketed cache of the live organization
//! plus the copy-on-write overlay used by dry-run passes.
//!
//! Loading is explicit: a pass calls [`RemoteCache::load`] before
//! diffing, which refreshes only the slices whose TTL has expired.
//! After that the reconciler reads pure in-memory state; the live
//! executor keeps the snapshot consistent by applying each command's
//! effect right after its remote call succeeds.
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use goliac_core::{Permission, Visibility};

use crate::reconcile::Command;

mod load;
pub mod overlay;
pub mod types;

pub use overlay::CacheOverlay;
pub use types::{
    OrgRuleset, RemoteAutolink, RemoteBranchProtection, RemoteData, RemoteRepo, RemoteRuleset,
    RemoteTeam, TeamRole,
};

/// Read and mutate access to a projected organization.
///
/// Implemented by the real cache and by the dry-run overlay; the
/// reconciler and the executors only ever see this trait, so a pass
/// cannot tell (and must not care) which one it is working against.
pub trait RemoteState {
    /// Organization member logins
    fn users(&self) -> &BTreeSet<String>;
    /// Teams by slug
    fn teams(&self) -> &BTreeMap<String, RemoteTeam>;
    /// Repositories by name
    fn repositories(&self) -> &BTreeMap<String, RemoteRepo>;
    /// Team grants: team slug → repository name → permission
    fn team_repos(&self) -> &BTreeMap<String, BTreeMap<String, Permission>>;
    /// Organization rulesets by name
    fn rulesets(&self) -> &BTreeMap<String, OrgRuleset>;
    /// Installed apps: slug → app id
    fn app_ids(&self) -> &BTreeMap<String, u64>;
    /// Whether the organization supports `internal` repositories
    fn supports_internal_repos(&self) -> bool;
    /// Record the in-memory effect of one applied command.
    fn apply(&mut self, command: &Command);
}

/// Mutable access to the five mutable slices, factored out so the
/// cache and the overlay share one effect implementation.
pub(crate) trait Slices {
    fn users_mut(&mut self) -> &mut BTreeSet<String>;
    fn teams_mut(&mut self) -> &mut BTreeMap<String, RemoteTeam>;
    fn repositories_mut(&mut self) -> &mut BTreeMap<String, RemoteRepo>;
    fn team_repos_mut(&mut self) -> &mut BTreeMap<String, BTreeMap<String, Permission>>;
    fn rulesets_mut(&mut self) -> &mut BTreeMap<String, OrgRuleset>;
}

impl Slices for RemoteData {
    fn users_mut(&mut self) -> &mut BTreeSet<String> {
        &mut self.users
    }

    fn teams_mut(&mut self) -> &mut BTreeMap<String, RemoteTeam> {
        &mut self.teams
    }

    fn repositories_mut(&mut self) -> &mut BTreeMap<String, RemoteRepo> {
        &mut self.repositories
    }

    fn team_repos_mut(&mut self) -> &mut BTreeMap<String, BTreeMap<String, Permission>> {
        &mut self.team_repos
    }

    fn rulesets_mut(&mut self) -> &mut BTreeMap<String, OrgRuleset> {
        &mut self.rulesets
    }
}

/// Apply the in-memory effect of `command` to a set of slices.
pub(crate) fn apply_command<S: Slices>(state: &mut S, command: &Command) {
    match command {
        Command::AddUserToOrg { login } => {
            state.users_mut().insert(login.clone());
        }
        Command::RemoveUserFromOrg { login } => {
            state.users_mut().remove(login);
        }

        Command::CreateTeam {
            slug,
            name,
            description,
            parent_slug,
            members,
        } => {
            state.teams_mut().insert(slug.clone(), RemoteTeam {
                name: name.clone(),
                slug: slug.clone(),
                id: 0,
                parent_slug: parent_slug.clone(),
                description: description.clone(),
                members: members
                    .iter()
                    .map(|login| (login.clone(), TeamRole::Member))
                    .collect(),
            });
            state.team_repos_mut().entry(slug.clone()).or_default();
        }
        Command::UpdateTeamAddMember { team_slug, login, role }
        | Command::UpdateTeamUpdateMember { team_slug, login, role } => {
            if let Some(team) = state.teams_mut().get_mut(team_slug) {
                team.members.insert(login.clone(), *role);
            }
        }
        Command::UpdateTeamRemoveMember { team_slug, login } => {
            if let Some(team) = state.teams_mut().get_mut(team_slug) {
                team.members.remove(login);
            }
        }
        Command::UpdateTeamSetParent { team_slug, parent_slug } => {
            if let Some(team) = state.teams_mut().get_mut(team_slug) {
                team.parent_slug = parent_slug.clone();
            }
        }
        Command::DeleteTeam { team_slug } => {
            state.teams_mut().remove(team_slug);
            state.team_repos_mut().remove(team_slug);
        }

        Command::CreateRepository {
            name,
            description,
            visibility,
            default_branch,
            writers,
            readers,
            properties,
            fork_from,
        } => {
            state.repositories_mut().insert(name.clone(), RemoteRepo {
                name: name.clone(),
                visibility: *visibility,
                default_branch: default_branch.clone(),
                description: description.clone(),
                bool_properties: properties.clone(),
                is_fork: fork_from.is_some(),
                ..RemoteRepo::default()
            });
            for slug in writers {
                state
                    .team_repos_mut()
                    .entry(slug.clone())
                    .or_default()
                    .insert(name.clone(), Permission::Write);
            }
            for slug in readers {
                state
                    .team_repos_mut()
                    .entry(slug.clone())
                    .or_default()
                    .insert(name.clone(), Permission::Read);
            }
        }
        Command::UpdateRepositoryUpdateProperty { repo, property, value } => {
            if let Some(r) = state.repositories_mut().get_mut(repo) {
                match property.as_str() {
                    "visibility" => {
                        if let Some(v) = value.as_str() {
                            r.visibility = Visibility::from_api(v);
                        }
                    }
                    "archived" => {
                        if let Some(b) = value.as_bool() {
                            r.archived = b;
                        }
                    }
                    "default_branch" => {
                        if let Some(v) = value.as_str() {
                            r.default_branch = v.to_string();
                        }
                    }
                    "description" => {
                        if let Some(v) = value.as_str() {
                            r.description = v.to_string();
                        }
                    }
                    _ => {
                        if let Some(b) = value.as_bool() {
                            r.bool_properties.insert(property.clone(), b);
                        }
                    }
                }
            }
        }
        Command::UpdateRepositoryAddTeamAccess { repo, team_slug, permission }
        | Command::UpdateRepositoryUpdateTeamAccess { repo, team_slug, permission } => {
            state
                .team_repos_mut()
                .entry(team_slug.clone())
                .or_default()
                .insert(repo.clone(), *permission);
        }
        Command::UpdateRepositoryRemoveTeamAccess { repo, team_slug } => {
            if let Some(grants) = state.team_repos_mut().get_mut(team_slug) {
                grants.remove(repo);
            }
        }
        Command::UpdateRepositorySetExternalUser { repo, login, permission } => {
            if let Some(r) = state.repositories_mut().get_mut(repo) {
                r.external_users.insert(login.clone(), *permission);
            }
        }
        Command::UpdateRepositoryRemoveExternalUser { repo, login } => {
            if let Some(r) = state.repositories_mut().get_mut(repo) {
                r.external_users.remove(login);
            }
        }
        Command::DeleteRepository { name } => {
            state.repositories_mut().remove(name);
            for grants in state.team_repos_mut().values_mut() {
                grants.remove(name);
            }
        }

        Command::AddRuleset { ruleset, repositories } => {
            state.rulesets_mut().insert(ruleset.name.clone(), OrgRuleset {
                id: None,
                ruleset: ruleset.clone(),
                repositories: repositories.clone(),
            });
        }
        Command::UpdateRuleset { id, ruleset, repositories } => {
            state.rulesets_mut().insert(ruleset.name.clone(), OrgRuleset {
                id: *id,
                ruleset: ruleset.clone(),
                repositories: repositories.clone(),
            });
        }
        Command::DeleteRuleset { name, .. } => {
            state.rulesets_mut().remove(name);
        }

        Command::AddRepositoryRuleset { repo, ruleset } => {
            if let Some(r) = state.repositories_mut().get_mut(repo) {
                r.rulesets.insert(ruleset.name.clone(), RemoteRuleset {
                    id: None,
                    ruleset: ruleset.clone(),
                });
            }
        }
        Command::UpdateRepositoryRuleset { repo, id, ruleset } => {
            if let Some(r) = state.repositories_mut().get_mut(repo) {
                r.rulesets.insert(ruleset.name.clone(), RemoteRuleset {
                    id: *id,
                    ruleset: ruleset.clone(),
                });
            }
        }
        Command::DeleteRepositoryRuleset { repo, name, .. } => {
            if let Some(r) = state.repositories_mut().get_mut(repo) {
                r.rulesets.remove(name);
            }
        }

        Command::AddRepositoryBranchProtection { repo, protection } => {
            if let Some(r) = state.repositories_mut().get_mut(repo) {
                r.branch_protections.insert(protection.pattern.clone(), RemoteBranchProtection {
                    id: None,
                    protection: protection.clone(),
                });
            }
        }
        Command::UpdateRepositoryBranchProtection { repo, id, protection } => {
            if let Some(r) = state.repositories_mut().get_mut(repo) {
                r.branch_protections.insert(protection.pattern.clone(), RemoteBranchProtection {
                    id: id.clone(),
                    protection: protection.clone(),
                });
            }
        }
        Command::DeleteRepositoryBranchProtection { repo, pattern, .. } => {
            if let Some(r) = state.repositories_mut().get_mut(repo) {
                r.branch_protections.remove(pattern);
            }
        }

        Command::AddRepositoryEnvironment { repo, environment } => {
            if let Some(r) = state.repositories_mut().get_mut(repo) {
                r.environments.entry(environment.clone()).or_default();
            }
        }
        Command::DeleteRepositoryEnvironment { repo, environment } => {
            if let Some(r) = state.repositories_mut().get_mut(repo) {
                r.environments.remove(environment);
            }
        }

        Command::AddRepositoryVariable { repo, name, value }
        | Command::UpdateRepositoryVariable { repo, name, value } => {
            if let Some(r) = state.repositories_mut().get_mut(repo) {
                r.variables.insert(name.clone(), value.clone());
            }
        }
        Command::DeleteRepositoryVariable { repo, name } => {
            if let Some(r) = state.repositories_mut().get_mut(repo) {
                r.variables.remove(name);
            }
        }

        Command::AddRepositoryEnvironmentVariable { repo, environment, name, value }
        | Command::UpdateRepositoryEnvironmentVariable { repo, environment, name, value } => {
            if let Some(r) = state.repositories_mut().get_mut(repo) {
                r.environments
                    .entry(environment.clone())
                    .or_default()
                    .insert(name.clone(), value.clone());
            }
        }
        Command::DeleteRepositoryEnvironmentVariable { repo, environment, name } => {
            if let Some(r) = state.repositories_mut().get_mut(repo) {
                if let Some(vars) = r.environments.get_mut(environment) {
                    vars.remove(name);
                }
            }
        }

        Command::AddRepositoryAutolink { repo, autolink } => {
            if let Some(r) = state.repositories_mut().get_mut(repo) {
                r.autolinks.insert(autolink.key_prefix.clone(), RemoteAutolink {
                    id: None,
                    autolink: autolink.clone(),
                });
            }
        }
        Command::DeleteRepositoryAutolink { repo, key_prefix, .. } => {
            if let Some(r) = state.repositories_mut().get_mut(repo) {
                r.autolinks.remove(key_prefix);
            }
        }
    }
}

#[derive(Debug, Default)]
struct SliceAge(Option<Instant>);

impl SliceAge {
    fn expired(&self, ttl: Duration) -> bool {
        match self.0 {
            None => true,
            Some(at) => at.elapsed() >= ttl,
        }
    }

    fn touch(&mut self) {
        self.0 = Some(Instant::now());
    }

    fn reset(&mut self) {
        self.0 = None;
    }
}

#[derive(Debug, Default)]
struct SliceAges {
    users: SliceAge,
    teams: SliceAge,
    repositories: SliceAge,
    team_repos: SliceAge,
    rulesets: SliceAge,
    app_ids: SliceAge,
}

/// Tuning knobs for the cache.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// How long a loaded slice stays fresh
    pub ttl: Duration,
    /// Worker count for the team-grant loader; 1 disables concurrency
    pub concurrency: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions {
            ttl: Duration::from_secs(86400),
            concurrency: 4,
        }
    }
}

impl CacheOptions {
    /// Read the tuning from `GOLIAC_*` environment variables:
    /// `GOLIAC_REMOTE_CACHE_TTL` (seconds) and
    /// `GOLIAC_GITHUB_CONCURRENT_THREADS`. Unset or unparsable values
    /// keep their defaults; a zero thread count is clamped to 1.
    pub fn from_env() -> Self {
        let mut options = CacheOptions::default();
        if let Ok(seconds) = std::env::var("GOLIAC_REMOTE_CACHE_TTL") {
            if let Ok(seconds) = seconds.parse::<u64>() {
                options.ttl = Duration::from_secs(seconds);
            }
        }
        if let Ok(threads) = std::env::var("GOLIAC_GITHUB_CONCURRENT_THREADS") {
            if let Ok(threads) = threads.parse::<usize>() {
                options.concurrency = threads.max(1);
            }
        }
        options
    }
}

/// The TTL-bucketed projection of the live organization.
#[derive(Debug)]
pub struct RemoteCache {
    data: RemoteData,
    ages: SliceAges,
    options: CacheOptions,
    enterprise: bool,
    capabilities_checked: bool,
}

impl RemoteCache {
    /// An empty cache; every slice starts expired.
    pub fn new(options: CacheOptions) -> Self {
        RemoteCache {
            data: RemoteData::default(),
            ages: SliceAges::default(),
            options,
            enterprise: false,
            capabilities_checked: false,
        }
    }

    /// Build a warm cache from known data. Mostly useful in tests and
    /// for status readers that snapshot the projection.
    pub fn with_data(data: RemoteData, enterprise: bool) -> Self {
        let mut cache = RemoteCache::new(CacheOptions::default());
        cache.data = data;
        cache.enterprise = enterprise;
        cache.capabilities_checked = true;
        let now = Instant::now();
        cache.ages = SliceAges {
            users: SliceAge(Some(now)),
            teams: SliceAge(Some(now)),
            repositories: SliceAge(Some(now)),
            team_repos: SliceAge(Some(now)),
            rulesets: SliceAge(Some(now)),
            app_ids: SliceAge(Some(now)),
        };
        cache
    }

    /// The current projection.
    pub fn data(&self) -> &RemoteData {
        &self.data
    }

    /// Expire every slice; the next load refetches everything.
    pub fn flush(&mut self) {
        self.ages = SliceAges::default();
    }

    /// Expire only the user and team slices.
    pub fn flush_users_teams(&mut self) {
        self.ages.users.reset();
        self.ages.teams.reset();
    }
}

impl RemoteState for RemoteCache {
    fn users(&self) -> &BTreeSet<String> {
        &self.data.users
    }

    fn teams(&self) -> &BTreeMap<String, RemoteTeam> {
        &self.data.teams
    }

    fn repositories(&self) -> &BTreeMap<String, RemoteRepo> {
        &self.data.repositories
    }

    fn team_repos(&self) -> &BTreeMap<String, BTreeMap<String, Permission>> {
        &self.data.team_repos
    }

    fn rulesets(&self) -> &BTreeMap<String, OrgRuleset> {
        &self.data.rulesets
    }

    fn app_ids(&self) -> &BTreeMap<String, u64> {
        &self.data.app_ids
    }

    fn supports_internal_repos(&self) -> bool {
        self.enterprise
    }

    fn apply(&mut self, command: &Command) {
        apply_command(&mut self.data, command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_start_expired_and_flush_resets() {
        let ttl = Duration::from_secs(60);
        let mut cache = RemoteCache::new(CacheOptions::default());
        assert!(cache.ages.users.expired(ttl));

        cache.ages.users.touch();
        cache.ages.teams.touch();
        assert!(!cache.ages.users.expired(ttl));

        cache.flush_users_teams();
        assert!(cache.ages.users.expired(ttl));
        assert!(cache.ages.teams.expired(ttl));

        cache.ages.repositories.touch();
        cache.flush();
        assert!(cache.ages.repositories.expired(ttl));
    }

    #[test]
    fn cache_options_read_the_environment() {
        std::env::set_var("GOLIAC_REMOTE_CACHE_TTL", "3600");
        std::env::set_var("GOLIAC_GITHUB_CONCURRENT_THREADS", "0");
        let options = CacheOptions::from_env();
        std::env::remove_var("GOLIAC_REMOTE_CACHE_TTL");
        std::env::remove_var("GOLIAC_GITHUB_CONCURRENT_THREADS");

        assert_eq!(options.ttl, Duration::from_secs(3600));
        // zero workers would stall the grant loader
        assert_eq!(options.concurrency, 1);
    }

    #[test]
    fn create_team_effect_registers_members_and_grants() {
        let mut cache = RemoteCache::new(CacheOptions::default());
        cache.apply(&Command::CreateTeam {
            slug: "acme".into(),
            name: "acme".into(),
            description: String::new(),
            parent_slug: None,
            members: vec!["gh-a".into()],
        });
        assert_eq!(cache.teams()["acme"].members["gh-a"], TeamRole::Member);
        assert!(cache.team_repos().contains_key("acme"));
    }

    #[test]
    fn delete_repository_clears_grants() {
        let mut cache = RemoteCache::new(CacheOptions::default());
        cache.apply(&Command::CreateRepository {
            name: "svc".into(),
            description: String::new(),
            visibility: Visibility::Private,
            default_branch: "main".into(),
            writers: vec!["acme".into()],
            readers: vec![],
            properties: BTreeMap::new(),
            fork_from: None,
        });
        assert_eq!(cache.team_repos()["acme"]["svc"], Permission::Write);

        cache.apply(&Command::DeleteRepository { name: "svc".into() });
        assert!(!cache.repositories().contains_key("svc"));
        assert!(cache.team_repos()["acme"].get("svc").is_none());
    }
}

//! Copy-on-write overlay for dry-run passes.
use std::collections::{BTreeMap, BTreeSet};

use goliac_core::Permission;

use super::{apply_command, OrgRuleset, RemoteData, RemoteRepo, RemoteTeam, RemoteState, Slices};
use crate::reconcile::Command;

/// A pass-local view over a [`RemoteData`] that records mutations
/// without touching the underlying cache.
///
/// Each slice is cloned lazily on its first mutation; untouched
/// slices keep reading through to the base. Dropping the overlay
/// discards everything it recorded.
pub struct CacheOverlay<'a> {
    base: &'a RemoteData,
    enterprise: bool,
    users: Option<BTreeSet<String>>,
    teams: Option<BTreeMap<String, RemoteTeam>>,
    repositories: Option<BTreeMap<String, RemoteRepo>>,
    team_repos: Option<BTreeMap<String, BTreeMap<String, Permission>>>,
    rulesets: Option<BTreeMap<String, OrgRuleset>>,
}

impl<'a> CacheOverlay<'a> {
    /// Wrap a projection; `enterprise` mirrors the wrapped cache's
    /// capability flag.
    pub fn new(base: &'a RemoteData, enterprise: bool) -> Self {
        CacheOverlay {
            base,
            enterprise,
            users: None,
            teams: None,
            repositories: None,
            team_repos: None,
            rulesets: None,
        }
    }

    /// Whether any slice was mutated through this overlay.
    pub fn is_dirty(&self) -> bool {
        self.users.is_some()
            || self.teams.is_some()
            || self.repositories.is_some()
            || self.team_repos.is_some()
            || self.rulesets.is_some()
    }
}

impl Slices for CacheOverlay<'_> {
    fn users_mut(&mut self) -> &mut BTreeSet<String> {
        let base = self.base;
        self.users.get_or_insert_with(|| base.users.clone())
    }

    fn teams_mut(&mut self) -> &mut BTreeMap<String, RemoteTeam> {
        let base = self.base;
        self.teams.get_or_insert_with(|| base.teams.clone())
    }

    fn repositories_mut(&mut self) -> &mut BTreeMap<String, RemoteRepo> {
        let base = self.base;
        self.repositories
            .get_or_insert_with(|| base.repositories.clone())
    }

    fn team_repos_mut(&mut self) -> &mut BTreeMap<String, BTreeMap<String, Permission>> {
        let base = self.base;
        self.team_repos
            .get_or_insert_with(|| base.team_repos.clone())
    }

    fn rulesets_mut(&mut self) -> &mut BTreeMap<String, OrgRuleset> {
        let base = self.base;
        self.rulesets.get_or_insert_with(|| base.rulesets.clone())
    }
}

impl RemoteState for CacheOverlay<'_> {
    fn users(&self) -> &BTreeSet<String> {
        self.users.as_ref().unwrap_or(&self.base.users)
    }

    fn teams(&self) -> &BTreeMap<String, RemoteTeam> {
        self.teams.as_ref().unwrap_or(&self.base.teams)
    }

    fn repositories(&self) -> &BTreeMap<String, RemoteRepo> {
        self.repositories.as_ref().unwrap_or(&self.base.repositories)
    }

    fn team_repos(&self) -> &BTreeMap<String, BTreeMap<String, Permission>> {
        self.team_repos.as_ref().unwrap_or(&self.base.team_repos)
    }

    fn rulesets(&self) -> &BTreeMap<String, OrgRuleset> {
        self.rulesets.as_ref().unwrap_or(&self.base.rulesets)
    }

    fn app_ids(&self) -> &BTreeMap<String, u64> {
        &self.base.app_ids
    }

    fn supports_internal_repos(&self) -> bool {
        self.enterprise
    }

    fn apply(&mut self, command: &Command) {
        apply_command(self, command);
    }
}

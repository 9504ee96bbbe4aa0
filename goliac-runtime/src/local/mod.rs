//! The local model: the declarative state parsed from a teams
//! repository checkout.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use goliac_core::{
    manifest::{Kind, Manifest},
    repository::RepositorySpec,
    team::TeamSpec,
    user::{UserKind, UserSpec},
    GoliacConfig, Repository, Ruleset, Team, User, OWNERS_SUFFIX,
};

use crate::{error::ValidationErrors, Error, Result};

pub mod codeowners;
pub mod git;
pub mod store;

pub use git::GitTeamsStore;
pub use store::{MemoryTeamsStore, TeamsStore};

/// Nesting deeper than this is treated as a parent cycle.
const MAX_PARENT_DEPTH: usize = 32;

/// The parsed and validated declarative model.
#[derive(Debug, Clone, Default)]
pub struct LocalModel {
    /// The global configuration from `goliac.yaml`
    pub config: GoliacConfig,
    /// Users by stable username
    pub users: BTreeMap<String, User>,
    /// Teams by name (the directory name under `teams/`)
    pub teams: BTreeMap<String, Team>,
    /// Repositories by name, owner filled from the declaring team
    pub repositories: BTreeMap<String, Repository>,
    /// Organization rulesets by name
    pub rulesets: BTreeMap<String, Ruleset>,
}

/// A loaded model plus non-fatal findings.
#[derive(Debug)]
pub struct LoadOutcome {
    /// The validated model
    pub model: LocalModel,
    /// Non-fatal findings surfaced to the pass error collection
    pub warnings: Vec<String>,
}

impl LocalModel {
    /// Load and validate a model from a checked-out teams repository.
    ///
    /// Any validation error aborts the pass; the full list is
    /// returned so an author can fix everything in one round.
    pub fn load(store: &impl TeamsStore) -> Result<LoadOutcome> {
        let mut model = LocalModel::default();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        // repo name → declaring location, for duplicate detection
        let mut repo_owners: BTreeMap<String, String> = BTreeMap::new();

        match store.read(Path::new("goliac.yaml")) {
            Ok(data) => match GoliacConfig::parse(&String::from_utf8_lossy(&data)) {
                Ok(config) => model.config = config,
                Err(e) => errors.push(e),
            },
            Err(_) => warnings.push("goliac.yaml not found, using defaults".to_string()),
        }

        for path in store.list_files()? {
            let components: Vec<&str> = path.iter().filter_map(|c| c.to_str()).collect();
            let result = match components.as_slice() {
                ["users", subtree, file] if file.ends_with(".yaml") => {
                    let kind = match *subtree {
                        "org" => UserKind::Internal,
                        "external" => UserKind::External,
                        "protected" => UserKind::Protected,
                        _ => continue,
                    };
                    model.load_user(store, &path, kind)
                }
                ["teams", team, "team.yaml"] => model.load_team(store, &path, team, &mut warnings),
                ["teams", team, file] if file.ends_with(".yaml") => {
                    model.load_repository(store, &path, Some(team), &mut repo_owners)
                }
                ["archived", file] if file.ends_with(".yaml") => {
                    model.load_repository(store, &path, None, &mut repo_owners)
                }
                ["rulesets", file] if file.ends_with(".yaml") => model.load_ruleset(store, &path),
                _ => continue,
            };
            if let Err(e) = result {
                errors.push(e);
            }
        }

        model.validate(&mut errors);
        if !errors.is_empty() {
            return Err(Error::Validation(ValidationErrors(errors)));
        }
        Ok(LoadOutcome { model, warnings })
    }

    fn load_user(
        &mut self,
        store: &impl TeamsStore,
        path: &Path,
        kind: UserKind,
    ) -> goliac_core::Result<()> {
        let data = read_to_string(store, path)?;
        let manifest = Manifest::<UserSpec>::parse(&data, Kind::User)?;
        let user = User {
            username: manifest.name.clone(),
            login: manifest.spec.login,
            kind,
        };
        if self.users.insert(manifest.name.clone(), user).is_some() {
            return Err(goliac_core::Error::Duplicate {
                kind: "user",
                name: manifest.name,
            });
        }
        Ok(())
    }

    fn load_team(
        &mut self,
        store: &impl TeamsStore,
        path: &Path,
        directory: &str,
        warnings: &mut Vec<String>,
    ) -> goliac_core::Result<()> {
        let data = read_to_string(store, path)?;
        let manifest = Manifest::<TeamSpec>::parse(&data, Kind::Team)?;
        if manifest.name != directory {
            warnings.push(format!(
                "team manifest '{}' declares name '{}' but lives under 'teams/{directory}'; the directory wins",
                path.display(),
                manifest.name,
            ));
        }
        // the directory is the identity; CODEOWNERS and repo ownership key on it
        let team = Team::new(directory, manifest.spec);
        if self.teams.insert(directory.to_string(), team).is_some() {
            return Err(goliac_core::Error::Duplicate {
                kind: "team",
                name: directory.to_string(),
            });
        }
        Ok(())
    }

    fn load_repository(
        &mut self,
        store: &impl TeamsStore,
        path: &Path,
        owner: Option<&str>,
        repo_owners: &mut BTreeMap<String, String>,
    ) -> goliac_core::Result<()> {
        let data = read_to_string(store, path)?;
        let manifest = Manifest::<RepositorySpec>::parse(&data, Kind::Repository)?;
        let location = owner.unwrap_or("archived").to_string();
        if let Some(first) = repo_owners.insert(manifest.name.clone(), location.clone()) {
            return Err(goliac_core::Error::MultipleOwners {
                repo: manifest.name,
                first,
                second: location,
            });
        }
        let mut repository = Repository::new(manifest.name.clone(), manifest.spec);
        repository.owner = owner.map(str::to_string);
        repository.archived = owner.is_none();
        self.repositories.insert(manifest.name, repository);
        Ok(())
    }

    fn load_ruleset(&mut self, store: &impl TeamsStore, path: &Path) -> goliac_core::Result<()> {
        let data = read_to_string(store, path)?;
        let manifest = Manifest::<Ruleset>::parse(&data, Kind::Ruleset)?;
        let mut ruleset = manifest.spec;
        ruleset.name = manifest.name.clone();
        ruleset.normalize();
        if self.rulesets.insert(manifest.name.clone(), ruleset).is_some() {
            return Err(goliac_core::Error::Duplicate {
                kind: "ruleset",
                name: manifest.name,
            });
        }
        Ok(())
    }

    fn validate(&self, errors: &mut Vec<goliac_core::Error>) {
        for (name, team) in &self.teams {
            for username in team.owners.iter().chain(&team.members) {
                if !self.users.contains_key(username) {
                    errors.push(goliac_core::Error::UnknownUser {
                        team: name.clone(),
                        user: username.clone(),
                    });
                }
            }
            if let Some(parent) = &team.parent {
                if !self.teams.contains_key(parent) {
                    errors.push(goliac_core::Error::UnknownParent {
                        team: name.clone(),
                        parent: parent.clone(),
                    });
                } else if self.has_parent_cycle(name) {
                    errors.push(goliac_core::Error::ParentCycle(name.clone()));
                }
            }
            // a declared "<x>-owners" team collides with the synthetic twin of "<x>"
            if let Some(base) = name.strip_suffix(OWNERS_SUFFIX) {
                if self.teams.contains_key(base) {
                    errors.push(goliac_core::Error::Duplicate {
                        kind: "team",
                        name: name.clone(),
                    });
                }
            }
        }

        for mapping in &self.config.rulesets {
            if !self.rulesets.contains_key(&mapping.ruleset) {
                errors.push(goliac_core::Error::UnknownRuleset(mapping.ruleset.clone()));
            }
        }
    }

    fn has_parent_cycle(&self, start: &str) -> bool {
        let mut seen = std::collections::BTreeSet::new();
        let mut current = start;
        for _ in 0..MAX_PARENT_DEPTH {
            match self.teams.get(current).and_then(|t| t.parent.as_deref()) {
                Some(parent) => {
                    if parent == start || !seen.insert(parent) {
                        return true;
                    }
                    current = parent;
                }
                None => return false,
            }
        }
        // deeper than any sane hierarchy; treat as malformed
        true
    }

    /// Write the model back as a teams repository tree.
    ///
    /// Loading the written tree yields an equal model; this is also
    /// the primitive behind synthesized changes (external creation,
    /// user-sync deltas).
    pub fn serialize_into(&self, store: &mut impl TeamsStore) -> Result<()> {
        store.write(
            Path::new("goliac.yaml"),
            serde_yaml::to_string(&self.config)?.as_bytes(),
        )?;

        for user in self.users.values() {
            let subtree = match user.kind {
                UserKind::Internal => "org",
                UserKind::External => "external",
                UserKind::Protected => "protected",
            };
            let manifest = Manifest {
                api_version: goliac_core::manifest::API_VERSION.to_string(),
                kind: Kind::User,
                name: user.username.clone(),
                spec: UserSpec {
                    login: user.login.clone(),
                },
            };
            store.write(
                &PathBuf::from(format!("users/{subtree}/{}.yaml", user.username)),
                serde_yaml::to_string(&manifest)?.as_bytes(),
            )?;
        }

        for (name, team) in &self.teams {
            let manifest = Manifest {
                api_version: goliac_core::manifest::API_VERSION.to_string(),
                kind: Kind::Team,
                name: name.clone(),
                spec: TeamSpec {
                    owners: team.owners.clone(),
                    members: team.members.clone(),
                    parent: team.parent.clone(),
                    description: team.description.clone(),
                    externally_managed: team.externally_managed,
                },
            };
            store.write(
                &PathBuf::from(format!("teams/{name}/team.yaml")),
                serde_yaml::to_string(&manifest)?.as_bytes(),
            )?;
        }

        for (name, repository) in &self.repositories {
            let manifest = Manifest {
                api_version: goliac_core::manifest::API_VERSION.to_string(),
                kind: Kind::Repository,
                name: name.clone(),
                spec: repository.spec.clone(),
            };
            let path = match &repository.owner {
                Some(owner) => format!("teams/{owner}/{name}.yaml"),
                None => format!("archived/{name}.yaml"),
            };
            store.write(
                &PathBuf::from(path),
                serde_yaml::to_string(&manifest)?.as_bytes(),
            )?;
        }

        for (name, ruleset) in &self.rulesets {
            let manifest = Manifest {
                api_version: goliac_core::manifest::API_VERSION.to_string(),
                kind: Kind::Ruleset,
                name: name.clone(),
                spec: ruleset.clone(),
            };
            store.write(
                &PathBuf::from(format!("rulesets/{name}.yaml")),
                serde_yaml::to_string(&manifest)?.as_bytes(),
            )?;
        }

        Ok(())
    }
}

fn read_to_string(store: &impl TeamsStore, path: &Path) -> goliac_core::Result<String> {
    let data = store
        .read(path)
        .map_err(|_| goliac_core::Error::ReadDocument(path.display().to_string()))?;
    // invalid UTF-8 surfaces as a parse error on the mangled text
    Ok(String::from_utf8_lossy(&data).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> MemoryTeamsStore {
        let mut store = MemoryTeamsStore::new();
        store.seed("goliac.yaml", "admin_team: admin\n");
        store.seed(
            "users/org/alice.yaml",
            "apiVersion: v1\nkind: User\nname: alice\nspec:\n  login: gh-a\n",
        );
        store.seed(
            "users/org/bob.yaml",
            "apiVersion: v1\nkind: User\nname: bob\nspec:\n  login: gh-b\n",
        );
        store.seed(
            "teams/acme/team.yaml",
            "apiVersion: v1\nkind: Team\nname: acme\nspec:\n  owners: [alice]\n  members: [bob]\n",
        );
        store.seed(
            "teams/acme/svc.yaml",
            "apiVersion: v1\nkind: Repository\nname: svc\nspec:\n  visibility: private\n",
        );
        store.seed(
            "rulesets/default.yaml",
            "apiVersion: v1\nkind: Ruleset\nname: default\nspec:\n  enforcement: active\n",
        );
        store
    }

    #[test]
    fn loads_a_complete_tree() {
        let outcome = LocalModel::load(&seeded_store()).unwrap();
        let model = outcome.model;
        assert_eq!(model.users.len(), 2);
        assert_eq!(model.teams["acme"].owners, vec!["alice"]);
        assert_eq!(model.repositories["svc"].owner.as_deref(), Some("acme"));
        assert!(model.rulesets.contains_key("default"));
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn unknown_member_is_a_validation_error() {
        let mut store = seeded_store();
        store.seed(
            "teams/acme/team.yaml",
            "apiVersion: v1\nkind: Team\nname: acme\nspec:\n  owners: [ghost]\n",
        );
        let err = LocalModel::load(&store).unwrap_err();
        let Error::Validation(errors) = err else {
            panic!("expected validation failure")
        };
        assert!(errors
            .0
            .iter()
            .any(|e| matches!(e, goliac_core::Error::UnknownUser { user, .. } if user == "ghost")));
    }

    #[test]
    fn repo_under_two_teams_is_rejected() {
        let mut store = seeded_store();
        store.seed(
            "teams/ops/team.yaml",
            "apiVersion: v1\nkind: Team\nname: ops\nspec:\n  owners: [bob]\n",
        );
        store.seed(
            "teams/ops/svc.yaml",
            "apiVersion: v1\nkind: Repository\nname: svc\nspec: {}\n",
        );
        let err = LocalModel::load(&store).unwrap_err();
        let Error::Validation(errors) = err else {
            panic!("expected validation failure")
        };
        assert!(errors
            .0
            .iter()
            .any(|e| matches!(e, goliac_core::Error::MultipleOwners { repo, .. } if repo == "svc")));
    }

    #[test]
    fn parent_cycles_are_rejected() {
        let mut store = seeded_store();
        store.seed(
            "teams/a/team.yaml",
            "apiVersion: v1\nkind: Team\nname: a\nspec:\n  owners: [alice]\n  parent: b\n",
        );
        store.seed(
            "teams/b/team.yaml",
            "apiVersion: v1\nkind: Team\nname: b\nspec:\n  owners: [alice]\n  parent: a\n",
        );
        let err = LocalModel::load(&store).unwrap_err();
        let Error::Validation(errors) = err else {
            panic!("expected validation failure")
        };
        assert!(errors.0.iter().any(|e| matches!(e, goliac_core::Error::ParentCycle(_))));
    }

    #[test]
    fn archived_repositories_have_no_owner() {
        let mut store = seeded_store();
        store.seed(
            "archived/legacy.yaml",
            "apiVersion: v1\nkind: Repository\nname: legacy\nspec: {}\n",
        );
        let model = LocalModel::load(&store).unwrap().model;
        let legacy = &model.repositories["legacy"];
        assert!(legacy.archived);
        assert!(legacy.owner.is_none());
    }

    #[test]
    fn serialize_then_reload_round_trips() {
        let model = LocalModel::load(&seeded_store()).unwrap().model;
        let mut copy = MemoryTeamsStore::new();
        model.serialize_into(&mut copy).unwrap();
        let reloaded = LocalModel::load(&copy).unwrap().model;

        assert_eq!(model.users, reloaded.users);
        assert_eq!(model.teams, reloaded.teams);
        assert_eq!(model.repositories, reloaded.repositories);
        assert_eq!(model.rulesets, reloaded.rulesets);
    }
}

//! End-to-end reconciliation scenarios: literal inputs, expected
//! command streams, in order.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use goliac_client::{ForgeAuth, ForgeClient, PassContext};
use goliac_core::{Permission, Visibility};
use goliac_runtime::{
    errors::ErrorCollection,
    local::{LocalModel, MemoryTeamsStore},
    reconcile::{Command, CommandBatch, LiveExecutor, Reconciler},
    remote::{CacheOverlay, RemoteCache, RemoteData, RemoteRepo, RemoteState, RemoteTeam, TeamRole},
    Error,
};
use http::{Request, Response};
use secrecy::SecretString;

const TEAMS_REPO: &str = "goliac-teams";

fn local_from(seeds: &[(&str, &str)]) -> LocalModel {
    let mut store = MemoryTeamsStore::new();
    store.seed("goliac.yaml", "admin_team: admin\n");
    for (path, content) in seeds {
        store.seed(*path, *content);
    }
    LocalModel::load(&store).expect("scenario model must validate").model
}

fn remote_team(slug: &str, members: &[&str]) -> RemoteTeam {
    RemoteTeam {
        name: slug.to_string(),
        slug: slug.to_string(),
        id: 1,
        parent_slug: None,
        description: String::new(),
        members: members
            .iter()
            .map(|login| (login.to_string(), TeamRole::Member))
            .collect(),
    }
}

fn reconcile(
    local: &LocalModel,
    remote: &RemoteCache,
) -> (Vec<Command>, goliac_runtime::UnmanagedResources, ErrorCollection) {
    let mut batch = CommandBatch::new(1000, false);
    let mut errors = ErrorCollection::new();
    let unmanaged = Reconciler::new(local, TEAMS_REPO).reconcile(remote, &mut batch, &mut errors);
    (batch.commands().to_vec(), unmanaged, errors)
}

#[test]
fn empty_local_leaves_remote_users_unmanaged() {
    let local = local_from(&[]);
    let mut data = RemoteData::default();
    data.users.insert("alice".to_string());
    data.users.insert("bob".to_string());
    let remote = RemoteCache::with_data(data, false);

    let (commands, unmanaged, _errors) = reconcile(&local, &remote);
    assert!(commands.is_empty());
    assert_eq!(
        unmanaged.users,
        BTreeSet::from(["alice".to_string(), "bob".to_string()])
    );
}

#[test]
fn declared_user_is_invited() {
    let local = local_from(&[(
        "users/org/alice.yaml",
        "apiVersion: v1\nkind: User\nname: alice\nspec:\n  login: gh-a\n",
    )]);
    let remote = RemoteCache::with_data(RemoteData::default(), false);

    let (commands, _, _) = reconcile(&local, &remote);
    assert_eq!(commands, vec![Command::AddUserToOrg { login: "gh-a".into() }]);
}

#[test]
fn declared_team_creates_user_then_team_then_owners_twin() {
    let local = local_from(&[
        (
            "users/org/alice.yaml",
            "apiVersion: v1\nkind: User\nname: alice\nspec:\n  login: gh-a\n",
        ),
        (
            "teams/acme/team.yaml",
            "apiVersion: v1\nkind: Team\nname: acme\nspec:\n  owners: [alice]\n  members: []\n",
        ),
    ]);
    let remote = RemoteCache::with_data(RemoteData::default(), false);

    let (commands, _, _) = reconcile(&local, &remote);
    assert_eq!(commands.len(), 3);
    assert_eq!(commands[0], Command::AddUserToOrg { login: "gh-a".into() });
    assert!(matches!(
        &commands[1],
        Command::CreateTeam { slug, members, .. } if slug == "acme" && members == &vec!["gh-a".to_string()]
    ));
    assert!(matches!(
        &commands[2],
        Command::CreateTeam { slug, members, .. } if slug == "acme-owners" && members == &vec!["gh-a".to_string()]
    ));
}

#[test]
fn repository_converges_visibility_then_grants_then_revocations() {
    let local = local_from(&[
        (
            "users/org/alice.yaml",
            "apiVersion: v1\nkind: User\nname: alice\nspec:\n  login: gh-a\n",
        ),
        (
            "teams/acme/team.yaml",
            "apiVersion: v1\nkind: Team\nname: acme\nspec:\n  owners: [alice]\n",
        ),
        (
            "teams/ops/team.yaml",
            "apiVersion: v1\nkind: Team\nname: ops\nspec:\n  owners: [alice]\n",
        ),
        (
            "teams/acme/svc.yaml",
            "apiVersion: v1\nkind: Repository\nname: svc\nspec:\n  visibility: private\n  readers: [ops]\n",
        ),
    ]);

    let mut data = RemoteData::default();
    data.users.insert("gh-a".to_string());
    for slug in ["acme", "acme-owners", "ops", "ops-owners", "old"] {
        data.teams.insert(slug.to_string(), remote_team(slug, &["gh-a"]));
    }
    data.repositories.insert("svc".to_string(), RemoteRepo {
        name: "svc".to_string(),
        visibility: Visibility::Public,
        default_branch: "main".to_string(),
        bool_properties: BTreeMap::from([
            ("allow_auto_merge".to_string(), false),
            ("allow_update_branch".to_string(), false),
            ("delete_branch_on_merge".to_string(), false),
        ]),
        ..RemoteRepo::default()
    });
    data.team_repos.insert(
        "old".to_string(),
        BTreeMap::from([("svc".to_string(), Permission::Write)]),
    );
    for slug in ["acme", "acme-owners", "ops", "ops-owners"] {
        data.team_repos.insert(slug.to_string(), BTreeMap::new());
    }
    let remote = RemoteCache::with_data(data, false);

    let (commands, unmanaged, _) = reconcile(&local, &remote);
    assert_eq!(commands, vec![
        Command::UpdateRepositoryUpdateProperty {
            repo: "svc".into(),
            property: "visibility".into(),
            value: serde_json::Value::String("private".into()),
        },
        Command::UpdateRepositoryAddTeamAccess {
            repo: "svc".into(),
            team_slug: "acme".into(),
            permission: Permission::Write,
        },
        Command::UpdateRepositoryAddTeamAccess {
            repo: "svc".into(),
            team_slug: "ops".into(),
            permission: Permission::Read,
        },
        Command::UpdateRepositoryRemoveTeamAccess {
            repo: "svc".into(),
            team_slug: "old".into(),
        },
    ]);
    // "old" had no counterpart locally and team deletion is disabled
    assert!(unmanaged.teams.contains("old"));
    assert!(
        commands.iter().all(|c| !c.is_destructive()),
        "no destructive command may be emitted while every destructive class is disabled"
    );
}

#[test]
fn second_pass_against_applied_state_is_empty() {
    let local = local_from(&[
        (
            "users/org/alice.yaml",
            "apiVersion: v1\nkind: User\nname: alice\nspec:\n  login: gh-a\n",
        ),
        (
            "users/org/bob.yaml",
            "apiVersion: v1\nkind: User\nname: bob\nspec:\n  login: gh-b\n",
        ),
        (
            "teams/zplatform/team.yaml",
            "apiVersion: v1\nkind: Team\nname: zplatform\nspec:\n  owners: [alice]\n",
        ),
        (
            "teams/app/team.yaml",
            "apiVersion: v1\nkind: Team\nname: app\nspec:\n  owners: [alice]\n  members: [bob]\n  parent: zplatform\n",
        ),
        (
            "teams/app/svc.yaml",
            concat!(
                "apiVersion: v1\nkind: Repository\nname: svc\nspec:\n",
                "  visibility: private\n",
                "  variables:\n    LOG_LEVEL: info\n",
                "  environments:\n    - name: production\n      variables:\n        REGION: eu-west-1\n",
                "  autolinks:\n    - keyPrefix: 'TICKET-'\n      urlTemplate: 'https://tracker.example.com/TICKET-<num>'\n",
                "  branchProtections:\n    - pattern: main\n      requiresApprovingReviews: true\n      requiredApprovingReviewCount: 1\n",
                "  rulesets:\n    - name: push-rules\n      enforcement: active\n",
            ),
        ),
        (
            "rulesets/default.yaml",
            "apiVersion: v1\nkind: Ruleset\nname: default\nspec:\n  enforcement: active\n",
        ),
    ]);

    // this scenario's goliac.yaml maps the default ruleset everywhere
    let mut local = local;
    local.config = goliac_core::GoliacConfig::parse(
        "admin_team: admin\nrulesets:\n  - pattern: \".*\"\n    ruleset: default\n",
    )
    .unwrap();

    let cache = RemoteCache::with_data(RemoteData::default(), false);
    let mut overlay = CacheOverlay::new(cache.data(), cache.supports_internal_repos());

    let (commands, _, _) = reconcile(&local, &cache);
    assert!(!commands.is_empty());
    // parents are created before children even when sorting says otherwise
    let created: Vec<&str> = commands
        .iter()
        .filter_map(|c| match c {
            Command::CreateTeam { slug, .. } => Some(slug.as_str()),
            _ => None,
        })
        .collect();
    let app = created.iter().position(|s| *s == "app").unwrap();
    let parent = created.iter().position(|s| *s == "zplatform").unwrap();
    assert!(parent < app);

    for command in &commands {
        overlay.apply(command);
    }

    let mut batch = CommandBatch::new(1000, false);
    let mut errors = ErrorCollection::new();
    let again = Reconciler::new(&local, TEAMS_REPO).reconcile(&overlay, &mut batch, &mut errors);
    assert_eq!(
        batch.commands(),
        &[],
        "second pass must converge, got: {:?}",
        batch.commands()
    );
    assert!(again.users.is_empty());
}

#[test]
fn externally_managed_teams_keep_their_remote_membership() {
    let local = local_from(&[
        (
            "users/org/alice.yaml",
            "apiVersion: v1\nkind: User\nname: alice\nspec:\n  login: gh-a\n",
        ),
        (
            "teams/vendors/team.yaml",
            "apiVersion: v1\nkind: Team\nname: vendors\nspec:\n  owners: [alice]\n  externallyManaged: true\n",
        ),
    ]);

    let mut data = RemoteData::default();
    data.users.insert("gh-a".to_string());
    // the forge says the members are someone else entirely
    data.teams.insert("vendors".to_string(), remote_team("vendors", &["gh-x", "gh-y"]));
    data.teams.insert(
        "vendors-owners".to_string(),
        remote_team("vendors-owners", &["gh-a"]),
    );
    let remote = RemoteCache::with_data(data, false);

    let (commands, _, _) = reconcile(&local, &remote);
    assert!(
        commands.is_empty(),
        "externally managed membership must not be reconciled, got {commands:?}"
    );
}

#[test]
fn member_role_is_reconciled_back_to_member() {
    let local = local_from(&[
        (
            "users/org/alice.yaml",
            "apiVersion: v1\nkind: User\nname: alice\nspec:\n  login: gh-a\n",
        ),
        (
            "teams/acme/team.yaml",
            "apiVersion: v1\nkind: Team\nname: acme\nspec:\n  owners: [alice]\n",
        ),
    ]);

    let mut data = RemoteData::default();
    data.users.insert("gh-a".to_string());
    let mut team = remote_team("acme", &[]);
    team.members.insert("gh-a".to_string(), TeamRole::Maintainer);
    data.teams.insert("acme".to_string(), team);
    data.teams.insert("acme-owners".to_string(), remote_team("acme-owners", &["gh-a"]));
    let remote = RemoteCache::with_data(data, false);

    let (commands, _, _) = reconcile(&local, &remote);
    assert_eq!(commands, vec![Command::UpdateTeamUpdateMember {
        team_slug: "acme".into(),
        login: "gh-a".into(),
        role: TeamRole::Member,
    }]);
}

#[test]
fn parent_change_emits_one_set_parent() {
    let local = local_from(&[
        (
            "users/org/alice.yaml",
            "apiVersion: v1\nkind: User\nname: alice\nspec:\n  login: gh-a\n",
        ),
        (
            "teams/platform/team.yaml",
            "apiVersion: v1\nkind: Team\nname: platform\nspec:\n  owners: [alice]\n",
        ),
        (
            "teams/app/team.yaml",
            "apiVersion: v1\nkind: Team\nname: app\nspec:\n  owners: [alice]\n  parent: platform\n",
        ),
    ]);

    let mut data = RemoteData::default();
    data.users.insert("gh-a".to_string());
    for slug in ["platform", "platform-owners", "app", "app-owners"] {
        data.teams.insert(slug.to_string(), remote_team(slug, &["gh-a"]));
    }
    let remote = RemoteCache::with_data(data, false);

    let (commands, _, _) = reconcile(&local, &remote);
    assert_eq!(commands, vec![Command::UpdateTeamSetParent {
        team_slug: "app".into(),
        parent_slug: Some("platform".into()),
    }]);
}

fn one_repo_remote(visibility: Visibility, archived: bool) -> RemoteData {
    let mut data = RemoteData::default();
    data.users.insert("gh-a".to_string());
    for slug in ["acme", "acme-owners"] {
        data.teams.insert(slug.to_string(), remote_team(slug, &["gh-a"]));
        data.team_repos.insert(
            slug.to_string(),
            if slug == "acme" {
                BTreeMap::from([("svc".to_string(), Permission::Write)])
            } else {
                BTreeMap::new()
            },
        );
    }
    data.repositories.insert("svc".to_string(), RemoteRepo {
        name: "svc".to_string(),
        visibility,
        archived,
        default_branch: "main".to_string(),
        bool_properties: BTreeMap::from([
            ("allow_auto_merge".to_string(), false),
            ("allow_update_branch".to_string(), false),
            ("delete_branch_on_merge".to_string(), false),
        ]),
        ..RemoteRepo::default()
    });
    data
}

#[test]
fn undeclared_repository_is_archived_by_default() {
    // svc exists remotely but nothing declares it; archive_on_delete
    // defaults to true
    let local = local_from(&[(
        "users/org/alice.yaml",
        "apiVersion: v1\nkind: User\nname: alice\nspec:\n  login: gh-a\n",
    )]);
    let mut data = one_repo_remote(Visibility::Private, false);
    data.teams.clear();
    data.team_repos.clear();
    let remote = RemoteCache::with_data(data, false);

    let (commands, _, _) = reconcile(&local, &remote);
    assert_eq!(commands, vec![Command::UpdateRepositoryUpdateProperty {
        repo: "svc".into(),
        property: "archived".into(),
        value: serde_json::Value::Bool(true),
    }]);
}

#[test]
fn undeclared_repository_is_deleted_only_with_the_destructive_switch() {
    let mut local = local_from(&[(
        "users/org/alice.yaml",
        "apiVersion: v1\nkind: User\nname: alice\nspec:\n  login: gh-a\n",
    )]);
    local.config = goliac_core::GoliacConfig::parse(
        "admin_team: admin\narchive_on_delete: false\ndestructive_operations:\n  repositories: true\n",
    )
    .unwrap();
    let mut data = one_repo_remote(Visibility::Private, false);
    data.teams.clear();
    data.team_repos.clear();
    let remote = RemoteCache::with_data(data, false);

    let (commands, unmanaged, _) = reconcile(&local, &remote);
    assert_eq!(commands, vec![Command::DeleteRepository { name: "svc".into() }]);
    assert!(unmanaged.repositories.is_empty());

    // without the switch the repository only goes unmanaged
    local.config = goliac_core::GoliacConfig::parse("admin_team: admin\narchive_on_delete: false\n").unwrap();
    let (commands, unmanaged, errors) = reconcile(&local, &remote);
    assert!(commands.is_empty());
    assert!(unmanaged.repositories.contains("svc"));
    assert!(!errors.warnings().is_empty());
}

#[test]
fn remotely_archived_repository_is_unarchived_before_other_patches() {
    let local = local_from(&[
        (
            "users/org/alice.yaml",
            "apiVersion: v1\nkind: User\nname: alice\nspec:\n  login: gh-a\n",
        ),
        (
            "teams/acme/team.yaml",
            "apiVersion: v1\nkind: Team\nname: acme\nspec:\n  owners: [alice]\n",
        ),
        (
            "teams/acme/svc.yaml",
            "apiVersion: v1\nkind: Repository\nname: svc\nspec:\n  visibility: public\n",
        ),
    ]);
    let remote = RemoteCache::with_data(one_repo_remote(Visibility::Private, true), false);

    let (commands, _, _) = reconcile(&local, &remote);
    assert_eq!(commands[0], Command::UpdateRepositoryUpdateProperty {
        repo: "svc".into(),
        property: "archived".into(),
        value: serde_json::Value::Bool(false),
    });
    assert!(commands.contains(&Command::UpdateRepositoryUpdateProperty {
        repo: "svc".into(),
        property: "visibility".into(),
        value: serde_json::Value::String("public".into()),
    }));
}

#[test]
fn forbidden_public_visibility_is_downgraded_with_a_warning() {
    let mut local = local_from(&[
        (
            "users/org/alice.yaml",
            "apiVersion: v1\nkind: User\nname: alice\nspec:\n  login: gh-a\n",
        ),
        (
            "teams/acme/team.yaml",
            "apiVersion: v1\nkind: Team\nname: acme\nspec:\n  owners: [alice]\n",
        ),
        (
            "teams/acme/svc.yaml",
            "apiVersion: v1\nkind: Repository\nname: svc\nspec:\n  visibility: public\n",
        ),
        (
            "teams/acme/public-docs.yaml",
            "apiVersion: v1\nkind: Repository\nname: public-docs\nspec:\n  visibility: public\n",
        ),
    ]);
    local.config = goliac_core::GoliacConfig::parse(concat!(
        "admin_team: admin\n",
        "visibility_rules:\n",
        "  forbid_public_repositories: true\n",
        "  forbid_public_repositories_exclusions: ['public-.*']\n",
    ))
    .unwrap();
    let remote = RemoteCache::with_data(RemoteData::default(), false);

    let (commands, _, errors) = reconcile(&local, &remote);
    let created: BTreeMap<&str, Visibility> = commands
        .iter()
        .filter_map(|c| match c {
            Command::CreateRepository { name, visibility, .. } => {
                Some((name.as_str(), *visibility))
            }
            _ => None,
        })
        .collect();
    assert_eq!(created["svc"], Visibility::Private);
    assert_eq!(created["public-docs"], Visibility::Public);
    assert!(errors.warnings().iter().any(|w| w.contains("svc")));
}

#[test]
fn internal_visibility_needs_an_enterprise_org() {
    let seeds: [(&str, &str); 3] = [
        (
            "users/org/alice.yaml",
            "apiVersion: v1\nkind: User\nname: alice\nspec:\n  login: gh-a\n",
        ),
        (
            "teams/acme/team.yaml",
            "apiVersion: v1\nkind: Team\nname: acme\nspec:\n  owners: [alice]\n",
        ),
        (
            "teams/acme/svc.yaml",
            "apiVersion: v1\nkind: Repository\nname: svc\nspec:\n  visibility: internal\n",
        ),
    ];
    let local = local_from(&seeds);

    let plain = RemoteCache::with_data(RemoteData::default(), false);
    let (commands, _, errors) = reconcile(&local, &plain);
    assert!(commands.iter().any(|c| matches!(
        c,
        Command::CreateRepository { name, visibility: Visibility::Private, .. } if name == "svc"
    )));
    assert!(!errors.warnings().is_empty());

    let enterprise = RemoteCache::with_data(RemoteData::default(), true);
    let (commands, _, errors) = reconcile(&local, &enterprise);
    assert!(commands.iter().any(|c| matches!(
        c,
        Command::CreateRepository { name, visibility: Visibility::Internal, .. } if name == "svc"
    )));
    assert!(errors.warnings().is_empty());
}

#[test]
fn environment_variables_diff_at_the_variable_level() {
    let local = local_from(&[
        (
            "users/org/alice.yaml",
            "apiVersion: v1\nkind: User\nname: alice\nspec:\n  login: gh-a\n",
        ),
        (
            "teams/acme/team.yaml",
            "apiVersion: v1\nkind: Team\nname: acme\nspec:\n  owners: [alice]\n",
        ),
        (
            "teams/acme/svc.yaml",
            concat!(
                "apiVersion: v1\nkind: Repository\nname: svc\nspec:\n",
                "  environments:\n",
                "    - name: production\n",
                "      variables:\n",
                "        REGION: eu-west-1\n",
                "        TIER: gold\n",
            ),
        ),
    ]);

    let mut data = one_repo_remote(Visibility::Private, false);
    if let Some(repo) = data.repositories.get_mut("svc") {
        repo.environments.insert(
            "production".to_string(),
            BTreeMap::from([
                ("REGION".to_string(), "us-east-1".to_string()),
                ("RETIRED".to_string(), "yes".to_string()),
            ]),
        );
    }
    let remote = RemoteCache::with_data(data, false);

    let (commands, _, _) = reconcile(&local, &remote);
    assert_eq!(commands, vec![
        Command::AddRepositoryEnvironmentVariable {
            repo: "svc".into(),
            environment: "production".into(),
            name: "TIER".into(),
            value: "gold".into(),
        },
        Command::UpdateRepositoryEnvironmentVariable {
            repo: "svc".into(),
            environment: "production".into(),
            name: "REGION".into(),
            value: "eu-west-1".into(),
        },
        Command::DeleteRepositoryEnvironmentVariable {
            repo: "svc".into(),
            environment: "production".into(),
            name: "RETIRED".into(),
        },
    ]);
}

#[test]
fn the_teams_repository_grants_every_owners_team_write() {
    let local = local_from(&[
        (
            "users/org/alice.yaml",
            "apiVersion: v1\nkind: User\nname: alice\nspec:\n  login: gh-a\n",
        ),
        (
            "teams/acme/team.yaml",
            "apiVersion: v1\nkind: Team\nname: acme\nspec:\n  owners: [alice]\n",
        ),
        (
            "teams/platform/team.yaml",
            "apiVersion: v1\nkind: Team\nname: platform\nspec:\n  owners: [alice]\n",
        ),
        (
            "teams/acme/goliac-teams.yaml",
            "apiVersion: v1\nkind: Repository\nname: goliac-teams\nspec: {}\n",
        ),
    ]);
    let remote = RemoteCache::with_data(RemoteData::default(), false);

    let (commands, _, _) = reconcile(&local, &remote);
    let writers: Vec<String> = commands
        .iter()
        .find_map(|c| match c {
            Command::CreateRepository { name, writers, .. } if name == TEAMS_REPO => {
                Some(writers.clone())
            }
            _ => None,
        })
        .expect("the teams repository is created");
    for slug in ["acme", "acme-owners", "admin", "platform-owners"] {
        assert!(writers.contains(&slug.to_string()), "missing writer '{slug}'");
    }
}

#[test]
fn undeclared_team_is_deleted_only_with_the_destructive_switch() {
    let mut local = local_from(&[(
        "users/org/alice.yaml",
        "apiVersion: v1\nkind: User\nname: alice\nspec:\n  login: gh-a\n",
    )]);
    local.config = goliac_core::GoliacConfig::parse(
        "admin_team: admin\ndestructive_operations:\n  teams: true\n",
    )
    .unwrap();

    let mut data = RemoteData::default();
    data.users.insert("gh-a".to_string());
    data.teams.insert("stale".to_string(), remote_team("stale", &["gh-a"]));
    let remote = RemoteCache::with_data(data, false);

    let (commands, unmanaged, _) = reconcile(&local, &remote);
    assert_eq!(commands, vec![Command::DeleteTeam { team_slug: "stale".into() }]);
    assert!(unmanaged.teams.is_empty());
}

#[test]
fn changed_autolinks_are_replaced() {
    let local = local_from(&[
        (
            "users/org/alice.yaml",
            "apiVersion: v1\nkind: User\nname: alice\nspec:\n  login: gh-a\n",
        ),
        (
            "teams/acme/team.yaml",
            "apiVersion: v1\nkind: Team\nname: acme\nspec:\n  owners: [alice]\n",
        ),
        (
            "teams/acme/svc.yaml",
            concat!(
                "apiVersion: v1\nkind: Repository\nname: svc\nspec:\n",
                "  autolinks:\n",
                "    - keyPrefix: 'TICKET-'\n",
                "      urlTemplate: 'https://next.example.com/TICKET-<num>'\n",
            ),
        ),
    ]);

    let mut data = one_repo_remote(Visibility::Private, false);
    if let Some(repo) = data.repositories.get_mut("svc") {
        repo.autolinks.insert(
            "TICKET-".to_string(),
            goliac_runtime::remote::RemoteAutolink {
                id: Some(11),
                autolink: goliac_core::Autolink {
                    key_prefix: "TICKET-".to_string(),
                    url_template: "https://old.example.com/TICKET-<num>".to_string(),
                    is_alphanumeric: true,
                },
            },
        );
    }
    let remote = RemoteCache::with_data(data, false);

    let (commands, _, _) = reconcile(&local, &remote);
    assert_eq!(commands, vec![
        Command::DeleteRepositoryAutolink {
            repo: "svc".into(),
            key_prefix: "TICKET-".into(),
            id: Some(11),
        },
        Command::AddRepositoryAutolink {
            repo: "svc".into(),
            autolink: goliac_core::Autolink {
                key_prefix: "TICKET-".into(),
                url_template: "https://next.example.com/TICKET-<num>".into(),
                is_alphanumeric: true,
            },
        },
    ]);
}

#[test]
fn org_ruleset_updates_keep_the_remote_id_and_deletes_are_gated() {
    let mut local = local_from(&[
        (
            "users/org/alice.yaml",
            "apiVersion: v1\nkind: User\nname: alice\nspec:\n  login: gh-a\n",
        ),
        (
            "teams/acme/team.yaml",
            "apiVersion: v1\nkind: Team\nname: acme\nspec:\n  owners: [alice]\n",
        ),
        (
            "teams/acme/svc.yaml",
            "apiVersion: v1\nkind: Repository\nname: svc\nspec: {}\n",
        ),
        (
            "rulesets/default.yaml",
            "apiVersion: v1\nkind: Ruleset\nname: default\nspec:\n  enforcement: evaluate\n",
        ),
    ]);
    local.config = goliac_core::GoliacConfig::parse(
        "admin_team: admin\nrulesets:\n  - pattern: \".*\"\n    ruleset: default\n",
    )
    .unwrap();

    let mut data = one_repo_remote(Visibility::Private, false);
    let mut remote_default = goliac_core::Ruleset {
        name: "default".to_string(),
        ..goliac_core::Ruleset::default()
    };
    remote_default.normalize();
    data.rulesets.insert("default".to_string(), goliac_runtime::remote::OrgRuleset {
        id: Some(7),
        ruleset: remote_default,
        repositories: BTreeSet::from(["svc".to_string()]),
    });
    data.rulesets.insert("legacy".to_string(), goliac_runtime::remote::OrgRuleset {
        id: Some(8),
        ruleset: goliac_core::Ruleset {
            name: "legacy".to_string(),
            ..goliac_core::Ruleset::default()
        },
        repositories: BTreeSet::new(),
    });
    let remote = RemoteCache::with_data(data, false);

    let (commands, unmanaged, _) = reconcile(&local, &remote);
    // enforcement differs (active on the forge, evaluate locally)
    assert!(commands.iter().any(|c| matches!(
        c,
        Command::UpdateRuleset { id: Some(7), ruleset, .. } if ruleset.name == "default"
    )));
    // "legacy" is undeclared and ruleset deletion is disabled
    assert!(!commands.iter().any(|c| matches!(c, Command::DeleteRuleset { .. })));
    assert!(unmanaged.rulesets.contains("legacy"));
}

/// A client whose transport counts requests and always answers 200.
fn counting_client(calls: Arc<AtomicUsize>) -> ForgeClient {
    let service = tower::service_fn(move |_req: Request<goliac_client::Body>| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            Ok::<_, std::convert::Infallible>(
                Response::builder()
                    .status(200)
                    .body(goliac_client::Body::from(b"{}".to_vec()))
                    .expect("static response"),
            )
        }
    });
    ForgeClient::new(
        service,
        ForgeAuth::Token(SecretString::from("token")),
        "acme-corp",
    )
}

#[tokio::test]
async fn guardrail_refusal_issues_zero_remote_calls() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = counting_client(calls.clone());
    let mut cache = RemoteCache::with_data(RemoteData::default(), false);

    let mut batch = CommandBatch::new(3, false);
    for i in 0..5 {
        batch.add(Command::AddUserToOrg { login: format!("gh-{i}") });
    }

    let ctx = PassContext::new();
    let mut errors = ErrorCollection::new();
    let mut executor = LiveExecutor::new(&client, &mut cache, false);
    let err = batch.commit(&ctx, &mut executor, &mut errors).await.unwrap_err();

    assert!(matches!(err, Error::TooManyChangesets { count: 5, max: 3 }));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "no remote call may be issued");
    assert!(cache.users().is_empty(), "no snapshot effect may be recorded");
}

#[tokio::test]
async fn live_executor_updates_snapshot_only_on_success() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = counting_client(calls.clone());
    let mut cache = RemoteCache::with_data(RemoteData::default(), false);

    let ctx = PassContext::new();
    let mut errors = ErrorCollection::new();
    let mut batch = CommandBatch::new(10, false);
    batch.add(Command::AddUserToOrg { login: "gh-a".into() });
    let mut executor = LiveExecutor::new(&client, &mut cache, false);
    batch.commit(&ctx, &mut executor, &mut errors).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.users().contains("gh-a"));
    assert!(!errors.has_errors());
}

#[tokio::test]
async fn failed_mutation_is_recorded_and_skips_the_snapshot() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let service = tower::service_fn(move |_req: Request<goliac_client::Body>| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            Ok::<_, std::convert::Infallible>(
                Response::builder()
                    .status(500)
                    .body(goliac_client::Body::from(b"boom".to_vec()))
                    .expect("static response"),
            )
        }
    });
    let client = ForgeClient::new(
        service,
        ForgeAuth::Token(SecretString::from("token")),
        "acme-corp",
    );
    let mut cache = RemoteCache::with_data(RemoteData::default(), false);

    let ctx = PassContext::new();
    let mut errors = ErrorCollection::new();
    let mut batch = CommandBatch::new(10, false);
    batch.add(Command::AddUserToOrg { login: "gh-a".into() });
    batch.add(Command::AddUserToOrg { login: "gh-b".into() });
    let mut executor = LiveExecutor::new(&client, &mut cache, false);
    batch.commit(&ctx, &mut executor, &mut errors).await.unwrap();

    // both commands were attempted; neither effect was recorded
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(errors.errors().len(), 2);
    assert!(cache.users().is_empty());
}

#[test]
fn dry_run_overlay_keeps_the_cache_pristine() {
    let mut data = RemoteData::default();
    data.users.insert("gh-a".to_string());
    let cache = RemoteCache::with_data(data, false);

    let mut overlay = CacheOverlay::new(cache.data(), false);
    overlay.apply(&Command::AddUserToOrg { login: "gh-b".into() });

    assert!(overlay.users().contains("gh-b"));
    assert!(!cache.users().contains("gh-b"));
}

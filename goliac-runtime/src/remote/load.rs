//! Loaders filling the cache slices from the forge.
//!
//! Bulk listings (members, teams, repositories) come from paginated
//! GraphQL; rulesets and per-repository detail (environments,
//! variables, autolinks) come from REST, whose plain JSON maps
//! directly onto the declarative types. Team grants fan out over a
//! bounded worker pool.
use std::collections::{BTreeMap, BTreeSet};

use futures::{stream, StreamExt};
use goliac_core::{
    ruleset::{BypassMode, RefConditions},
    BranchProtection, Autolink, Permission, Ruleset, Visibility,
};
use goliac_client::{paginate, ForgeClient, PageInfo, PassContext};
use http::Method;
use serde::Deserialize;

use super::{
    OrgRuleset, RemoteAutolink, RemoteBranchProtection, RemoteCache, RemoteRepo, RemoteRuleset,
    RemoteTeam, TeamRole,
};

type ClientResult<T> = goliac_client::Result<T>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<T> {
    nodes: Vec<T>,
    page_info: PageInfo,
}

impl RemoteCache {
    /// Detect whether the organization can host `internal`
    /// repositories: GHES ≥ 3.11, or a cloud org on an enterprise
    /// plan.
    pub async fn detect_capabilities(
        &mut self,
        ctx: &PassContext,
        client: &ForgeClient,
    ) -> ClientResult<()> {
        #[derive(Deserialize)]
        struct Meta {
            installed_version: Option<String>,
        }
        #[derive(Deserialize, Default)]
        struct Plan {
            #[serde(default)]
            name: String,
        }
        #[derive(Deserialize)]
        struct Org {
            #[serde(default)]
            plan: Option<Plan>,
        }

        let meta: Meta = client
            .rest(ctx, Method::GET, "/meta", &[], None, None)
            .await?;
        self.enterprise = match meta.installed_version {
            // GHES: internal repositories landed in 3.11
            Some(version) => version_at_least(&version, 3, 11),
            None => {
                let path = format!("/orgs/{}", client.organization());
                let org: Org = client.rest(ctx, Method::GET, &path, &[], None, None).await?;
                org.plan.unwrap_or_default().name == "enterprise"
            }
        };
        self.capabilities_checked = true;
        tracing::debug!(enterprise = self.enterprise, "detected forge capabilities");
        Ok(())
    }

    /// Refresh every expired slice.
    ///
    /// With `continue_on_error` the first failure is recorded and the
    /// remaining slices are still attempted; the collected messages
    /// come back as warnings. Otherwise the first failure aborts.
    pub async fn load(
        &mut self,
        ctx: &PassContext,
        client: &ForgeClient,
        continue_on_error: bool,
    ) -> Result<Vec<String>, goliac_client::Error> {
        if !self.capabilities_checked {
            self.detect_capabilities(ctx, client).await?;
        }

        let mut warnings = Vec::new();
        macro_rules! slice {
            ($age:ident, $fut:expr) => {
                if self.ages.$age.expired(self.options.ttl) {
                    match $fut {
                        Ok(()) => self.ages.$age.touch(),
                        Err(e) if continue_on_error => {
                            tracing::warn!(slice = stringify!($age), error = %e, "slice load failed");
                            warnings.push(format!("loading {}: {e}", stringify!($age)));
                        }
                        Err(e) => return Err(e),
                    }
                }
            };
        }

        slice!(app_ids, self.load_app_ids(ctx, client).await);
        slice!(users, self.load_users(ctx, client).await);
        slice!(teams, self.load_teams(ctx, client).await);
        slice!(repositories, self.load_repositories(ctx, client).await);
        slice!(team_repos, self.load_team_repos(ctx, client).await);
        slice!(rulesets, self.load_rulesets(ctx, client).await);

        Ok(warnings)
    }

    async fn load_app_ids(&mut self, ctx: &PassContext, client: &ForgeClient) -> ClientResult<()> {
        #[derive(Deserialize)]
        struct Installation {
            app_id: u64,
            app_slug: String,
        }
        #[derive(Deserialize)]
        struct Installations {
            installations: Vec<Installation>,
        }

        let path = format!("/orgs/{}/installations", client.organization());
        let listing: Installations = client.rest(ctx, Method::GET, &path, &[], None, None).await?;
        self.data.app_ids = listing
            .installations
            .into_iter()
            .map(|i| (i.app_slug, i.app_id))
            .collect();
        Ok(())
    }

    async fn load_users(&mut self, ctx: &PassContext, client: &ForgeClient) -> ClientResult<()> {
        #[derive(Deserialize)]
        struct Node {
            login: String,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Org {
            members_with_role: Connection<Node>,
        }
        #[derive(Deserialize)]
        struct Data {
            organization: Org,
        }

        static QUERY: &str = "
            query($login: String!, $cursor: String) {
                organization(login: $login) {
                    membersWithRole(first: 100, after: $cursor) {
                        nodes { login }
                        pageInfo { hasNextPage endCursor }
                    }
                }
            }
        ";

        let members = paginate(|cursor| async move {
            let data: Data = client
                .graphql(ctx, QUERY, serde_json::json!({
                    "login": client.organization(),
                    "cursor": cursor,
                }))
                .await?;
            let page = data.organization.members_with_role;
            Ok((page.nodes, page.page_info))
        })
        .await?;

        self.data.users = members.into_iter().map(|n| n.login).collect();
        tracing::debug!(count = self.data.users.len(), "loaded organization members");
        Ok(())
    }

    async fn load_teams(&mut self, ctx: &PassContext, client: &ForgeClient) -> ClientResult<()> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ParentTeam {
            slug: String,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct TeamNode {
            name: String,
            slug: String,
            database_id: u64,
            description: Option<String>,
            parent_team: Option<ParentTeam>,
        }
        #[derive(Deserialize)]
        struct Org {
            teams: Connection<TeamNode>,
        }
        #[derive(Deserialize)]
        struct Data {
            organization: Org,
        }

        static QUERY: &str = "
            query($login: String!, $cursor: String) {
                organization(login: $login) {
                    teams(first: 100, after: $cursor) {
                        nodes {
                            name
                            slug
                            databaseId
                            description
                            parentTeam { slug }
                        }
                        pageInfo { hasNextPage endCursor }
                    }
                }
            }
        ";

        let nodes = paginate(|cursor| async move {
            let data: Data = client
                .graphql(ctx, QUERY, serde_json::json!({
                    "login": client.organization(),
                    "cursor": cursor,
                }))
                .await?;
            let page = data.organization.teams;
            Ok((page.nodes, page.page_info))
        })
        .await?;

        let mut teams = BTreeMap::new();
        for node in nodes {
            let members = self.load_team_members(ctx, client, &node.slug).await?;
            teams.insert(node.slug.clone(), RemoteTeam {
                name: node.name,
                slug: node.slug,
                id: node.database_id,
                parent_slug: node.parent_team.map(|p| p.slug),
                description: node.description.unwrap_or_default(),
                members,
            });
        }
        tracing::debug!(count = teams.len(), "loaded teams");
        self.data.teams = teams;
        Ok(())
    }

    async fn load_team_members(
        &self,
        ctx: &PassContext,
        client: &ForgeClient,
        slug: &str,
    ) -> ClientResult<BTreeMap<String, TeamRole>> {
        #[derive(Deserialize)]
        struct MemberNode {
            login: String,
        }
        #[derive(Deserialize)]
        struct Edge {
            role: TeamRole,
            node: MemberNode,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Members {
            page_info: PageInfo,
            edges: Vec<Edge>,
        }
        #[derive(Deserialize)]
        struct TeamNode {
            members: Members,
        }
        #[derive(Deserialize)]
        struct Org {
            team: Option<TeamNode>,
        }
        #[derive(Deserialize)]
        struct Data {
            organization: Org,
        }

        static QUERY: &str = "
            query($login: String!, $slug: String!, $cursor: String) {
                organization(login: $login) {
                    team(slug: $slug) {
                        members(first: 100, after: $cursor, membership: IMMEDIATE) {
                            pageInfo { hasNextPage endCursor }
                            edges {
                                role
                                node { login }
                            }
                        }
                    }
                }
            }
        ";

        let edges = paginate(|cursor| async move {
            let data: Data = client
                .graphql(ctx, QUERY, serde_json::json!({
                    "login": client.organization(),
                    "slug": slug,
                    "cursor": cursor,
                }))
                .await?;
            Ok(match data.organization.team {
                Some(team) => (team.members.edges, team.members.page_info),
                None => (Vec::new(), PageInfo { has_next_page: false, end_cursor: None }),
            })
        })
        .await?;

        Ok(edges.into_iter().map(|e| (e.node.login, e.role)).collect())
    }

    async fn load_repositories(
        &mut self,
        ctx: &PassContext,
        client: &ForgeClient,
    ) -> ClientResult<()> {
        #[derive(Deserialize)]
        struct CollaboratorNode {
            login: String,
        }
        #[derive(Deserialize)]
        struct CollaboratorEdge {
            permission: String,
            node: CollaboratorNode,
        }
        #[derive(Deserialize, Default)]
        struct Collaborators {
            #[serde(default)]
            edges: Option<Vec<CollaboratorEdge>>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct BranchRef {
            name: String,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RepoNode {
            name: String,
            id: String,
            database_id: u64,
            visibility: String,
            is_archived: bool,
            is_fork: bool,
            description: Option<String>,
            default_branch_ref: Option<BranchRef>,
            auto_merge_allowed: bool,
            delete_branch_on_merge: bool,
            allow_update_branch: bool,
            #[serde(default)]
            collaborators: Option<Collaborators>,
        }
        #[derive(Deserialize)]
        struct Org {
            repositories: Connection<RepoNode>,
        }
        #[derive(Deserialize)]
        struct Data {
            organization: Org,
        }

        static QUERY: &str = "
            query($login: String!, $cursor: String) {
                organization(login: $login) {
                    repositories(first: 50, after: $cursor) {
                        nodes {
                            name
                            id
                            databaseId
                            visibility
                            isArchived
                            isFork
                            description
                            defaultBranchRef { name }
                            autoMergeAllowed
                            deleteBranchOnMerge
                            allowUpdateBranch
                            collaborators(affiliation: OUTSIDE, first: 100) {
                                edges {
                                    permission
                                    node { login }
                                }
                            }
                        }
                        pageInfo { hasNextPage endCursor }
                    }
                }
            }
        ";

        let nodes = paginate(|cursor| async move {
            let data: Data = client
                .graphql(ctx, QUERY, serde_json::json!({
                    "login": client.organization(),
                    "cursor": cursor,
                }))
                .await?;
            let page = data.organization.repositories;
            Ok((page.nodes, page.page_info))
        })
        .await?;

        let mut repositories = BTreeMap::new();
        for node in nodes {
            let external_users = node
                .collaborators
                .unwrap_or_default()
                .edges
                .unwrap_or_default()
                .into_iter()
                .map(|e| (e.node.login, Permission::from_api(&e.permission.to_lowercase())))
                .collect();
            let mut repo = RemoteRepo {
                name: node.name.clone(),
                id: node.database_id,
                node_id: node.id,
                visibility: Visibility::from_api(&node.visibility.to_lowercase()),
                archived: node.is_archived,
                is_fork: node.is_fork,
                default_branch: node
                    .default_branch_ref
                    .map(|r| r.name)
                    .unwrap_or_else(|| "main".to_string()),
                description: node.description.unwrap_or_default(),
                bool_properties: BTreeMap::from([
                    ("allow_auto_merge".to_string(), node.auto_merge_allowed),
                    ("allow_update_branch".to_string(), node.allow_update_branch),
                    ("delete_branch_on_merge".to_string(), node.delete_branch_on_merge),
                ]),
                external_users,
                ..RemoteRepo::default()
            };
            // Archived repositories are read-only on the forge; their
            // nested slices cannot change and are not worth the calls.
            if !repo.archived {
                self.load_repository_detail(ctx, client, &mut repo).await?;
            }
            repositories.insert(node.name, repo);
        }
        tracing::debug!(count = repositories.len(), "loaded repositories");
        self.data.repositories = repositories;
        Ok(())
    }

    async fn load_repository_detail(
        &self,
        ctx: &PassContext,
        client: &ForgeClient,
        repo: &mut RemoteRepo,
    ) -> ClientResult<()> {
        let org = client.organization();

        repo.rulesets = {
            let listing: Vec<RestRulesetRef> = client
                .rest_paginated(ctx, &format!("/repos/{org}/{}/rulesets", repo.name), &[])
                .await?;
            let mut rulesets = BTreeMap::new();
            for entry in listing {
                let full: RestRuleset = client
                    .rest(
                        ctx,
                        Method::GET,
                        &format!("/repos/{org}/{}/rulesets/{}", repo.name, entry.id),
                        &[],
                        None,
                        None,
                    )
                    .await?;
                let (ruleset, _) = full.into_ruleset(&self.data.app_ids);
                rulesets.insert(ruleset.name.clone(), RemoteRuleset {
                    id: Some(entry.id),
                    ruleset,
                });
            }
            rulesets
        };

        repo.branch_protections = self
            .load_branch_protections(ctx, client, &repo.name)
            .await?;

        repo.environments = {
            #[derive(Deserialize)]
            struct EnvName {
                name: String,
            }
            #[derive(Deserialize)]
            struct Environments {
                #[serde(default)]
                environments: Vec<EnvName>,
            }
            #[derive(Deserialize)]
            struct Variable {
                name: String,
                value: String,
            }
            #[derive(Deserialize)]
            struct Variables {
                #[serde(default)]
                variables: Vec<Variable>,
            }

            let listing: Environments = client
                .rest(
                    ctx,
                    Method::GET,
                    &format!("/repos/{org}/{}/environments", repo.name),
                    &[],
                    None,
                    None,
                )
                .await?;
            let mut environments = BTreeMap::new();
            for env in listing.environments {
                let vars: Variables = client
                    .rest(
                        ctx,
                        Method::GET,
                        &format!("/repos/{org}/{}/environments/{}/variables", repo.name, env.name),
                        &[],
                        None,
                        None,
                    )
                    .await?;
                environments.insert(
                    env.name,
                    vars.variables.into_iter().map(|v| (v.name, v.value)).collect(),
                );
            }
            environments
        };

        repo.variables = {
            #[derive(Deserialize)]
            struct Variable {
                name: String,
                value: String,
            }
            #[derive(Deserialize)]
            struct Variables {
                #[serde(default)]
                variables: Vec<Variable>,
            }
            let listing: Variables = client
                .rest(
                    ctx,
                    Method::GET,
                    &format!("/repos/{org}/{}/actions/variables", repo.name),
                    &[],
                    None,
                    None,
                )
                .await?;
            listing.variables.into_iter().map(|v| (v.name, v.value)).collect()
        };

        repo.autolinks = {
            #[derive(Deserialize)]
            struct RestAutolink {
                id: u64,
                key_prefix: String,
                url_template: String,
                #[serde(default)]
                is_alphanumeric: bool,
            }
            let listing: Vec<RestAutolink> = client
                .rest_paginated(ctx, &format!("/repos/{org}/{}/autolinks", repo.name), &[])
                .await?;
            listing
                .into_iter()
                .map(|a| {
                    (a.key_prefix.clone(), RemoteAutolink {
                        id: Some(a.id),
                        autolink: Autolink {
                            key_prefix: a.key_prefix,
                            url_template: a.url_template,
                            is_alphanumeric: a.is_alphanumeric,
                        },
                    })
                })
                .collect()
        };

        Ok(())
    }

    async fn load_branch_protections(
        &self,
        ctx: &PassContext,
        client: &ForgeClient,
        repo: &str,
    ) -> ClientResult<BTreeMap<String, RemoteBranchProtection>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RuleNode {
            id: String,
            pattern: String,
            is_admin_enforced: bool,
            dismisses_stale_reviews: bool,
            #[serde(default)]
            required_status_check_contexts: Option<Vec<String>>,
            #[serde(default)]
            required_approving_review_count: Option<u32>,
            requires_approving_reviews: bool,
            requires_status_checks: bool,
            requires_strict_status_checks: bool,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Rules {
            nodes: Vec<RuleNode>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Repo {
            branch_protection_rules: Rules,
        }
        #[derive(Deserialize)]
        struct Data {
            repository: Option<Repo>,
        }

        static QUERY: &str = "
            query($org: String!, $repo: String!) {
                repository(owner: $org, name: $repo) {
                    branchProtectionRules(first: 100) {
                        nodes {
                            id
                            pattern
                            isAdminEnforced
                            dismissesStaleReviews
                            requiredStatusCheckContexts
                            requiredApprovingReviewCount
                            requiresApprovingReviews
                            requiresStatusChecks
                            requiresStrictStatusChecks
                        }
                    }
                }
            }
        ";

        let data: Data = client
            .graphql(ctx, QUERY, serde_json::json!({
                "org": client.organization(),
                "repo": repo,
            }))
            .await?;

        let mut protections = BTreeMap::new();
        for node in data.repository.map(|r| r.branch_protection_rules.nodes).unwrap_or_default() {
            let mut protection = BranchProtection {
                pattern: node.pattern.clone(),
                requires_approving_reviews: node.requires_approving_reviews,
                required_approving_review_count: node.required_approving_review_count.unwrap_or(0),
                dismisses_stale_reviews: node.dismisses_stale_reviews,
                requires_status_checks: node.requires_status_checks,
                requires_strict_status_checks: node.requires_strict_status_checks,
                required_status_check_contexts: node.required_status_check_contexts.unwrap_or_default(),
                is_admin_enforced: node.is_admin_enforced,
            };
            protection.normalize();
            protections.insert(node.pattern, RemoteBranchProtection {
                id: Some(node.id),
                protection,
            });
        }
        Ok(protections)
    }

    async fn load_team_repos(&mut self, ctx: &PassContext, client: &ForgeClient) -> ClientResult<()> {
        #[derive(Deserialize)]
        struct TeamRepo {
            name: String,
            role_name: String,
        }

        let org = client.organization().to_string();
        let slugs: Vec<String> = self.data.teams.keys().cloned().collect();
        let workers = self.options.concurrency.max(1);

        let results: Vec<(String, ClientResult<BTreeMap<String, Permission>>)> =
            stream::iter(slugs.into_iter().map(|slug| {
                let org = org.clone();
                async move {
                    let listing: ClientResult<Vec<TeamRepo>> = client
                        .rest_paginated(ctx, &format!("/orgs/{org}/teams/{slug}/repos"), &[])
                        .await;
                    let grants = listing.map(|repos| {
                        repos
                            .into_iter()
                            .map(|r| (r.name, Permission::from_api(&r.role_name)))
                            .collect()
                    });
                    (slug, grants)
                }
            }))
            .buffer_unordered(workers)
            .collect()
            .await;

        // The pool drains fully; the first error wins afterwards
        let mut team_repos = BTreeMap::new();
        let mut first_error = None;
        for (slug, grants) in results {
            match grants {
                Ok(grants) => {
                    team_repos.insert(slug, grants);
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        tracing::debug!(count = team_repos.len(), "loaded team repository grants");
        self.data.team_repos = team_repos;
        Ok(())
    }

    async fn load_rulesets(&mut self, ctx: &PassContext, client: &ForgeClient) -> ClientResult<()> {
        let org = client.organization();
        let listing: Vec<RestRulesetRef> = client
            .rest_paginated(ctx, &format!("/orgs/{org}/rulesets"), &[])
            .await?;

        let mut rulesets = BTreeMap::new();
        for entry in listing {
            let full: RestRuleset = client
                .rest(
                    ctx,
                    Method::GET,
                    &format!("/orgs/{org}/rulesets/{}", entry.id),
                    &[],
                    None,
                    None,
                )
                .await?;
            let (ruleset, repositories) = full.into_ruleset(&self.data.app_ids);
            rulesets.insert(ruleset.name.clone(), OrgRuleset {
                id: Some(entry.id),
                ruleset,
                repositories,
            });
        }
        tracing::debug!(count = rulesets.len(), "loaded organization rulesets");
        self.data.rulesets = rulesets;
        Ok(())
    }
}

#[derive(Deserialize)]
struct RestRulesetRef {
    id: u64,
}

#[derive(Deserialize)]
struct RestBypassActor {
    #[serde(default)]
    actor_id: Option<u64>,
    actor_type: String,
    bypass_mode: String,
}

#[derive(Deserialize, Default)]
struct RestRefConditions {
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    exclude: Vec<String>,
}

#[derive(Deserialize, Default)]
struct RestConditions {
    #[serde(default)]
    ref_name: RestRefConditions,
    #[serde(default)]
    repository_name: RestRefConditions,
}

#[derive(Deserialize)]
struct RestRule {
    #[serde(rename = "type")]
    rule_type: String,
    #[serde(default)]
    parameters: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RestRuleset {
    name: String,
    enforcement: String,
    #[serde(default)]
    bypass_actors: Vec<RestBypassActor>,
    #[serde(default)]
    conditions: RestConditions,
    #[serde(default)]
    rules: Vec<RestRule>,
}

impl RestRuleset {
    /// Convert the REST shape into the structural payload plus the
    /// resolved repository scope. App bypass actors are mapped back to
    /// their slugs; unknown actor ids are dropped (they cannot be
    /// expressed locally anyway).
    fn into_ruleset(self, app_ids: &BTreeMap<String, u64>) -> (Ruleset, BTreeSet<String>) {
        let id_to_slug: BTreeMap<u64, &String> =
            app_ids.iter().map(|(slug, id)| (*id, slug)).collect();
        let mut bypass_apps = BTreeMap::new();
        for actor in self.bypass_actors {
            if actor.actor_type != "Integration" {
                continue;
            }
            let Some(id) = actor.actor_id else { continue };
            let Some(slug) = id_to_slug.get(&id) else { continue };
            let mode = match actor.bypass_mode.as_str() {
                "pull_request" => BypassMode::PullRequest,
                _ => BypassMode::Always,
            };
            bypass_apps.insert((*slug).clone(), mode);
        }

        let enforcement = match self.enforcement.as_str() {
            "disabled" => goliac_core::Enforcement::Disabled,
            "evaluate" => goliac_core::Enforcement::Evaluate,
            _ => goliac_core::Enforcement::Active,
        };

        let mut ruleset = Ruleset {
            name: self.name,
            enforcement,
            bypass_apps,
            conditions: RefConditions {
                include: self.conditions.ref_name.include,
                exclude: self.conditions.ref_name.exclude,
            },
            rules: self
                .rules
                .into_iter()
                .map(|r| {
                    (r.rule_type, r.parameters.unwrap_or(serde_json::Value::Object(
                        serde_json::Map::new(),
                    )))
                })
                .collect(),
        };
        ruleset.normalize();

        let repositories = self.conditions.repository_name.include.into_iter().collect();
        (ruleset, repositories)
    }
}

fn version_at_least(version: &str, major: u32, minor: u32) -> bool {
    let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    let have_major = parts.next().unwrap_or(0);
    let have_minor = parts.next().unwrap_or(0);
    (have_major, have_minor) >= (major, minor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ghes_version_gate() {
        assert!(version_at_least("3.11.2", 3, 11));
        assert!(version_at_least("3.12.0", 3, 11));
        assert!(version_at_least("4.0.0", 3, 11));
        assert!(!version_at_least("3.10.9", 3, 11));
        assert!(!version_at_least("2.22.0", 3, 11));
        assert!(!version_at_least("garbage", 3, 11));
    }

    #[test]
    fn rest_ruleset_maps_bypass_apps_by_slug() {
        let raw: RestRuleset = serde_json::from_value(serde_json::json!({
            "name": "default",
            "enforcement": "active",
            "bypass_actors": [
                {"actor_id": 77, "actor_type": "Integration", "bypass_mode": "always"},
                {"actor_id": 1, "actor_type": "OrganizationAdmin", "bypass_mode": "always"},
                {"actor_id": 99, "actor_type": "Integration", "bypass_mode": "pull_request"}
            ],
            "conditions": {
                "ref_name": {"include": ["~DEFAULT_BRANCH"], "exclude": []},
                "repository_name": {"include": ["svc", "api"], "exclude": []}
            },
            "rules": [
                {"type": "pull_request", "parameters": {"required_approving_review_count": 1}},
                {"type": "required_signatures"}
            ]
        }))
        .unwrap();

        let app_ids = BTreeMap::from([("goliac-app".to_string(), 77u64)]);
        let (ruleset, repositories) = raw.into_ruleset(&app_ids);

        assert_eq!(ruleset.bypass_apps.len(), 1);
        assert_eq!(ruleset.bypass_apps["goliac-app"], BypassMode::Always);
        assert_eq!(
            ruleset.rules["pull_request"]["required_approving_review_count"],
            serde_json::json!(1)
        );
        assert!(ruleset.rules.contains_key("required_signatures"));
        assert_eq!(
            repositories,
            BTreeSet::from(["svc".to_string(), "api".to_string()])
        );
    }
}

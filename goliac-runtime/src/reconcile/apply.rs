//! The live executor: one forge mutation per command, with the
//! snapshot updated in the same breath.
use std::collections::{BTreeMap, BTreeSet};

use goliac_client::{ForgeClient, PassContext};
use goliac_core::Ruleset;
use http::Method;
use serde::Deserialize;
use serde_json::json;

use super::{batch::CommandExecutor, Command};
use crate::{errors::ErrorCollection, remote::RemoteState};

type ClientResult<T> = goliac_client::Result<T>;

/// Applies commands against the forge and keeps `state` consistent.
///
/// In dry-run mode the remote call is skipped and only the state —
/// a pass-local overlay in that case — is updated, so subsequent
/// reads observe the world as if the command had been applied.
pub struct LiveExecutor<'a, S: RemoteState> {
    client: &'a ForgeClient,
    state: &'a mut S,
    dry_run: bool,
}

impl<'a, S: RemoteState + Send> LiveExecutor<'a, S> {
    /// An executor writing through `client` into `state`.
    pub fn new(client: &'a ForgeClient, state: &'a mut S, dry_run: bool) -> Self {
        LiveExecutor {
            client,
            state,
            dry_run,
        }
    }

    async fn mutate(&mut self, ctx: &PassContext, command: &Command) -> ClientResult<()> {
        let org = self.client.organization().to_string();
        match command {
            Command::AddUserToOrg { login } => {
                self.rest(ctx, Method::PUT, format!("/orgs/{org}/memberships/{login}"), Some(json!({"role": "member"})))
                    .await
            }
            Command::RemoveUserFromOrg { login } => {
                self.rest(ctx, Method::DELETE, format!("/orgs/{org}/memberships/{login}"), None)
                    .await
            }

            Command::CreateTeam {
                slug,
                name,
                description,
                parent_slug,
                members,
            } => {
                self.rest(
                    ctx,
                    Method::POST,
                    format!("/orgs/{org}/teams"),
                    Some(json!({
                        "name": name,
                        "description": description,
                        "privacy": "closed",
                    })),
                )
                .await?;
                for login in members {
                    self.rest(
                        ctx,
                        Method::PUT,
                        format!("/orgs/{org}/teams/{slug}/memberships/{login}"),
                        Some(json!({"role": "member"})),
                    )
                    .await?;
                }
                if let Some(parent) = parent_slug {
                    let parent_id = self.team_database_id(ctx, &org, parent).await?;
                    self.rest(
                        ctx,
                        Method::PATCH,
                        format!("/orgs/{org}/teams/{slug}"),
                        Some(json!({"parent_team_id": parent_id})),
                    )
                    .await?;
                }
                Ok(())
            }
            Command::UpdateTeamAddMember { team_slug, login, role }
            | Command::UpdateTeamUpdateMember { team_slug, login, role } => {
                self.rest(
                    ctx,
                    Method::PUT,
                    format!("/orgs/{org}/teams/{team_slug}/memberships/{login}"),
                    Some(json!({"role": role.as_api_str()})),
                )
                .await
            }
            Command::UpdateTeamRemoveMember { team_slug, login } => {
                self.rest(
                    ctx,
                    Method::DELETE,
                    format!("/orgs/{org}/teams/{team_slug}/memberships/{login}"),
                    None,
                )
                .await
            }
            Command::UpdateTeamSetParent { team_slug, parent_slug } => {
                let parent_id = match parent_slug {
                    Some(parent) => json!(self.team_database_id(ctx, &org, parent).await?),
                    None => serde_json::Value::Null,
                };
                self.rest(
                    ctx,
                    Method::PATCH,
                    format!("/orgs/{org}/teams/{team_slug}"),
                    Some(json!({"parent_team_id": parent_id})),
                )
                .await
            }
            Command::DeleteTeam { team_slug } => {
                self.rest(ctx, Method::DELETE, format!("/orgs/{org}/teams/{team_slug}"), None)
                    .await
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
                match fork_from {
                    Some(source) => {
                        self.rest(
                            ctx,
                            Method::POST,
                            format!("/repos/{source}/forks"),
                            Some(json!({
                                "organization": org,
                                "name": name,
                                "default_branch_only": true,
                            })),
                        )
                        .await?;
                    }
                    None => {
                        let mut body = json!({
                            "name": name,
                            "description": description,
                            "visibility": visibility.as_str(),
                            "auto_init": true,
                        });
                        for (property, value) in properties {
                            body[property.as_str()] = json!(value);
                        }
                        self.rest(ctx, Method::POST, format!("/orgs/{org}/repos"), Some(body))
                            .await?;
                        if default_branch != "main" {
                            self.rest(
                                ctx,
                                Method::POST,
                                format!("/repos/{org}/{name}/branches/main/rename"),
                                Some(json!({"new_name": default_branch})),
                            )
                            .await?;
                        }
                    }
                }
                for slug in writers {
                    self.grant(ctx, &org, slug, name, "push").await?;
                }
                for slug in readers {
                    self.grant(ctx, &org, slug, name, "pull").await?;
                }
                Ok(())
            }
            Command::UpdateRepositoryUpdateProperty { repo, property, value } => {
                let mut body = serde_json::Map::new();
                body.insert(property.clone(), value.clone());
                self.rest(
                    ctx,
                    Method::PATCH,
                    format!("/repos/{org}/{repo}"),
                    Some(serde_json::Value::Object(body)),
                )
                .await
            }
            Command::UpdateRepositoryAddTeamAccess { repo, team_slug, permission }
            | Command::UpdateRepositoryUpdateTeamAccess { repo, team_slug, permission } => {
                self.grant(ctx, &org, team_slug, repo, permission.as_api_str()).await
            }
            Command::UpdateRepositoryRemoveTeamAccess { repo, team_slug } => {
                self.rest(
                    ctx,
                    Method::DELETE,
                    format!("/orgs/{org}/teams/{team_slug}/repos/{org}/{repo}"),
                    None,
                )
                .await
            }
            Command::UpdateRepositorySetExternalUser { repo, login, permission } => {
                self.rest(
                    ctx,
                    Method::PUT,
                    format!("/repos/{org}/{repo}/collaborators/{login}"),
                    Some(json!({"permission": permission.as_api_str()})),
                )
                .await
            }
            Command::UpdateRepositoryRemoveExternalUser { repo, login } => {
                self.rest(
                    ctx,
                    Method::DELETE,
                    format!("/repos/{org}/{repo}/collaborators/{login}"),
                    None,
                )
                .await
            }
            Command::DeleteRepository { name } => {
                self.rest(ctx, Method::DELETE, format!("/repos/{org}/{name}"), None).await
            }

            Command::AddRuleset { ruleset, repositories } => {
                let body = ruleset_payload(ruleset, Some(repositories), self.state.app_ids());
                self.rest(ctx, Method::POST, format!("/orgs/{org}/rulesets"), Some(body)).await
            }
            Command::UpdateRuleset { id, ruleset, repositories } => {
                let id = require_id(*id, &ruleset.name)?;
                let body = ruleset_payload(ruleset, Some(repositories), self.state.app_ids());
                self.rest(ctx, Method::PUT, format!("/orgs/{org}/rulesets/{id}"), Some(body)).await
            }
            Command::DeleteRuleset { name, id } => {
                let id = require_id(*id, name)?;
                self.rest(ctx, Method::DELETE, format!("/orgs/{org}/rulesets/{id}"), None).await
            }

            Command::AddRepositoryRuleset { repo, ruleset } => {
                let body = ruleset_payload(ruleset, None, self.state.app_ids());
                self.rest(ctx, Method::POST, format!("/repos/{org}/{repo}/rulesets"), Some(body))
                    .await
            }
            Command::UpdateRepositoryRuleset { repo, id, ruleset } => {
                let id = require_id(*id, &ruleset.name)?;
                let body = ruleset_payload(ruleset, None, self.state.app_ids());
                self.rest(
                    ctx,
                    Method::PUT,
                    format!("/repos/{org}/{repo}/rulesets/{id}"),
                    Some(body),
                )
                .await
            }
            Command::DeleteRepositoryRuleset { repo, name, id } => {
                let id = require_id(*id, name)?;
                self.rest(
                    ctx,
                    Method::DELETE,
                    format!("/repos/{org}/{repo}/rulesets/{id}"),
                    None,
                )
                .await
            }

            Command::AddRepositoryBranchProtection { repo, protection } => {
                let repository_id = self.repo_node_id(ctx, &org, repo).await?;
                let mut input = protection_input(protection);
                input["repositoryId"] = json!(repository_id);
                static MUTATION: &str = "
                    mutation($input: CreateBranchProtectionRuleInput!) {
                        createBranchProtectionRule(input: $input) {
                            branchProtectionRule { id }
                        }
                    }
                ";
                self.graphql(ctx, MUTATION, json!({ "input": input })).await
            }
            Command::UpdateRepositoryBranchProtection { repo, id, protection } => {
                let id = id.clone().ok_or_else(|| missing_id(&format!("{repo}/{}", protection.pattern)))?;
                let mut input = protection_input(protection);
                input["branchProtectionRuleId"] = json!(id);
                static MUTATION: &str = "
                    mutation($input: UpdateBranchProtectionRuleInput!) {
                        updateBranchProtectionRule(input: $input) {
                            branchProtectionRule { id }
                        }
                    }
                ";
                self.graphql(ctx, MUTATION, json!({ "input": input })).await
            }
            Command::DeleteRepositoryBranchProtection { repo, pattern, id } => {
                let id = id.clone().ok_or_else(|| missing_id(&format!("{repo}/{pattern}")))?;
                static MUTATION: &str = "
                    mutation($input: DeleteBranchProtectionRuleInput!) {
                        deleteBranchProtectionRule(input: $input) {
                            clientMutationId
                        }
                    }
                ";
                self.graphql(ctx, MUTATION, json!({ "input": { "branchProtectionRuleId": id } }))
                    .await
            }

            Command::AddRepositoryEnvironment { repo, environment } => {
                self.rest(
                    ctx,
                    Method::PUT,
                    format!("/repos/{org}/{repo}/environments/{environment}"),
                    None,
                )
                .await
            }
            Command::DeleteRepositoryEnvironment { repo, environment } => {
                self.rest(
                    ctx,
                    Method::DELETE,
                    format!("/repos/{org}/{repo}/environments/{environment}"),
                    None,
                )
                .await
            }

            Command::AddRepositoryVariable { repo, name, value } => {
                self.rest(
                    ctx,
                    Method::POST,
                    format!("/repos/{org}/{repo}/actions/variables"),
                    Some(json!({"name": name, "value": value})),
                )
                .await
            }
            Command::UpdateRepositoryVariable { repo, name, value } => {
                self.rest(
                    ctx,
                    Method::PATCH,
                    format!("/repos/{org}/{repo}/actions/variables/{name}"),
                    Some(json!({"name": name, "value": value})),
                )
                .await
            }
            Command::DeleteRepositoryVariable { repo, name } => {
                self.rest(
                    ctx,
                    Method::DELETE,
                    format!("/repos/{org}/{repo}/actions/variables/{name}"),
                    None,
                )
                .await
            }

            Command::AddRepositoryEnvironmentVariable { repo, environment, name, value } => {
                self.rest(
                    ctx,
                    Method::POST,
                    format!("/repos/{org}/{repo}/environments/{environment}/variables"),
                    Some(json!({"name": name, "value": value})),
                )
                .await
            }
            Command::UpdateRepositoryEnvironmentVariable { repo, environment, name, value } => {
                self.rest(
                    ctx,
                    Method::PATCH,
                    format!("/repos/{org}/{repo}/environments/{environment}/variables/{name}"),
                    Some(json!({"name": name, "value": value})),
                )
                .await
            }
            Command::DeleteRepositoryEnvironmentVariable { repo, environment, name } => {
                self.rest(
                    ctx,
                    Method::DELETE,
                    format!("/repos/{org}/{repo}/environments/{environment}/variables/{name}"),
                    None,
                )
                .await
            }

            Command::AddRepositoryAutolink { repo, autolink } => {
                self.rest(
                    ctx,
                    Method::POST,
                    format!("/repos/{org}/{repo}/autolinks"),
                    Some(json!({
                        "key_prefix": autolink.key_prefix,
                        "url_template": autolink.url_template,
                        "is_alphanumeric": autolink.is_alphanumeric,
                    })),
                )
                .await
            }
            Command::DeleteRepositoryAutolink { repo, key_prefix, id } => {
                let id = require_id(*id, &format!("{repo}/{key_prefix}"))?;
                self.rest(
                    ctx,
                    Method::DELETE,
                    format!("/repos/{org}/{repo}/autolinks/{id}"),
                    None,
                )
                .await
            }
        }
    }

    async fn rest(
        &self,
        ctx: &PassContext,
        method: Method,
        path: String,
        body: Option<serde_json::Value>,
    ) -> ClientResult<()> {
        self.client
            .rest_raw(ctx, method, &path, &[], body.as_ref(), None)
            .await
            .map(|_| ())
    }

    async fn graphql(
        &self,
        ctx: &PassContext,
        mutation: &str,
        variables: serde_json::Value,
    ) -> ClientResult<()> {
        self.client
            .graphql::<serde_json::Value>(ctx, mutation, variables)
            .await
            .map(|_| ())
    }

    async fn grant(
        &self,
        ctx: &PassContext,
        org: &str,
        team_slug: &str,
        repo: &str,
        permission: &str,
    ) -> ClientResult<()> {
        self.rest(
            ctx,
            Method::PUT,
            format!("/orgs/{org}/teams/{team_slug}/repos/{org}/{repo}"),
            Some(json!({"permission": permission})),
        )
        .await
    }

    /// Numeric team id, from the snapshot when known or by one GET
    /// when the team was created earlier in this pass.
    async fn team_database_id(&self, ctx: &PassContext, org: &str, slug: &str) -> ClientResult<u64> {
        if let Some(team) = self.state.teams().get(slug) {
            if team.id != 0 {
                return Ok(team.id);
            }
        }
        #[derive(Deserialize)]
        struct Team {
            id: u64,
        }
        let team: Team = self
            .client
            .rest(ctx, Method::GET, &format!("/orgs/{org}/teams/{slug}"), &[], None, None)
            .await?;
        Ok(team.id)
    }

    /// GraphQL node id of a repository, fetched when the snapshot
    /// entry was minted during this pass.
    async fn repo_node_id(&self, ctx: &PassContext, org: &str, repo: &str) -> ClientResult<String> {
        if let Some(r) = self.state.repositories().get(repo) {
            if !r.node_id.is_empty() {
                return Ok(r.node_id.clone());
            }
        }
        #[derive(Deserialize)]
        struct Repo {
            node_id: String,
        }
        let r: Repo = self
            .client
            .rest(ctx, Method::GET, &format!("/repos/{org}/{repo}"), &[], None, None)
            .await?;
        Ok(r.node_id)
    }
}

impl<S: RemoteState + Send + Sync> CommandExecutor for LiveExecutor<'_, S> {
    async fn apply(&mut self, ctx: &PassContext, command: &Command, errors: &mut ErrorCollection) {
        if !self.dry_run {
            if let Err(e) = self.mutate(ctx, command).await {
                // record and continue; one bad mutation must not block the rest
                errors.error(format!("{command}: {e}"));
                return;
            }
        }
        self.state.apply(command);
    }
}

fn missing_id(entity: &str) -> goliac_client::Error {
    goliac_client::Error::Config(format!("no remote id known for '{entity}'"))
}

fn require_id(id: Option<u64>, entity: &str) -> ClientResult<u64> {
    id.ok_or_else(|| missing_id(entity))
}

fn protection_input(protection: &goliac_core::BranchProtection) -> serde_json::Value {
    json!({
        "pattern": protection.pattern,
        "requiresApprovingReviews": protection.requires_approving_reviews,
        "requiredApprovingReviewCount": protection.required_approving_review_count,
        "dismissesStaleReviews": protection.dismisses_stale_reviews,
        "requiresStatusChecks": protection.requires_status_checks,
        "requiresStrictStatusChecks": protection.requires_strict_status_checks,
        "requiredStatusCheckContexts": protection.required_status_check_contexts,
        "isAdminEnforced": protection.is_admin_enforced,
    })
}

fn ruleset_payload(
    ruleset: &Ruleset,
    repositories: Option<&BTreeSet<String>>,
    app_ids: &BTreeMap<String, u64>,
) -> serde_json::Value {
    let bypass_actors: Vec<serde_json::Value> = ruleset
        .bypass_apps
        .iter()
        .filter_map(|(slug, mode)| {
            app_ids.get(slug).map(|id| {
                json!({
                    "actor_id": id,
                    "actor_type": "Integration",
                    "bypass_mode": mode.as_str(),
                })
            })
        })
        .collect();
    let rules: Vec<serde_json::Value> = ruleset
        .rules
        .iter()
        .map(|(rule_type, parameters)| {
            if parameters.as_object().is_some_and(|o| o.is_empty()) {
                json!({"type": rule_type})
            } else {
                json!({"type": rule_type, "parameters": parameters})
            }
        })
        .collect();
    let mut conditions = json!({
        "ref_name": {
            "include": ruleset.conditions.include,
            "exclude": ruleset.conditions.exclude,
        },
    });
    if let Some(repositories) = repositories {
        conditions["repository_name"] = json!({"include": repositories, "exclude": []});
    }
    json!({
        "name": ruleset.name,
        "target": "branch",
        "enforcement": ruleset.enforcement.as_str(),
        "bypass_actors": bypass_actors,
        "conditions": conditions,
        "rules": rules,
    })
}

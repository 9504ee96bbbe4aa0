//! The engine: one entry point per operation collaborators consume
//! (apply, flush, external create, status reads), with the full pass
//! sequence — checkout → load → user-sync → remote refresh → diff →
//! commit → post-actions — behind [`Goliac::apply`].
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use goliac_client::{ForgeClient, PassContext};
use goliac_core::{
    manifest::{Kind, Manifest, API_VERSION},
    repository::RepositorySpec,
    user::UserKind,
};

use crate::{
    errors::{ErrorCollection, ErrorReporter, NotificationSink, TracingSink},
    error::ValidationErrors,
    local::{codeowners, LocalModel, TeamsStore},
    reconcile::{Command, CommandBatch, CommandExecutor, LiveExecutor, Reconciler, UnmanagedResources},
    remote::{CacheOptions, CacheOverlay, RemoteCache, RemoteState},
    stats::{PassReport, Statistics},
    usersync::UserSyncRegistry,
    Error, Result,
};

/// Engine-level settings, next to the client's own [`goliac_client::Config`].
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Name of the teams repository inside the organization
    pub teams_repo: String,
    /// Clone URL of the teams repository
    pub git_url: String,
    /// Branch carrying the reviewed state
    pub branch: String,
    /// Audit tag moved to the last applied commit
    pub tag: String,
    /// Period of the scheduler's apply ticker
    pub apply_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            teams_repo: "goliac-teams".to_string(),
            git_url: String::new(),
            branch: "main".to_string(),
            tag: "goliac".to_string(),
            apply_interval: Duration::from_secs(600),
        }
    }
}

impl ControllerConfig {
    /// Read the engine settings from `GOLIAC_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let git_url = std::env::var("GOLIAC_SERVER_GIT_REPOSITORY")
            .map_err(|_| Error::Config("GOLIAC_SERVER_GIT_REPOSITORY is not set".to_string()))?;
        let teams_repo = git_url
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .trim_end_matches(".git")
            .to_string();
        let mut config = ControllerConfig {
            teams_repo,
            git_url,
            ..ControllerConfig::default()
        };
        if let Ok(branch) = std::env::var("GOLIAC_SERVER_GIT_BRANCH") {
            config.branch = branch;
        }
        if let Ok(tag) = std::env::var("GOLIAC_SERVER_GIT_TAG") {
            config.tag = tag;
        }
        if let Ok(seconds) = std::env::var("GOLIAC_SERVER_APPLY_INTERVAL") {
            if let Ok(seconds) = seconds.parse::<u64>() {
                config.apply_interval = Duration::from_secs(seconds);
            }
        }
        Ok(config)
    }
}

/// The reconciliation engine.
///
/// One instance owns the remote cache, the teams-repository store and
/// the pass statistics; the scheduler (or an admin call) drives
/// [`Goliac::apply`], one pass at a time.
pub struct Goliac<S: TeamsStore> {
    client: ForgeClient,
    store: S,
    config: ControllerConfig,
    cache: RemoteCache,
    registry: UserSyncRegistry,
    reporter: ErrorReporter,
    stats: Statistics,
    local: Option<LocalModel>,
    unmanaged: UnmanagedResources,
    dirty: Arc<AtomicBool>,
}

impl<S: TeamsStore + Send> Goliac<S> {
    /// Assemble an engine.
    pub fn new(
        client: ForgeClient,
        store: S,
        config: ControllerConfig,
        cache_options: CacheOptions,
    ) -> Self {
        Goliac {
            client,
            store,
            config,
            cache: RemoteCache::new(cache_options),
            registry: UserSyncRegistry::new(),
            reporter: ErrorReporter::new(Arc::new(TracingSink)),
            stats: Statistics::default(),
            local: None,
            unmanaged: UnmanagedResources::default(),
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the notification sink.
    pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.reporter = ErrorReporter::new(sink);
        self
    }

    /// Register a user-sync adapter.
    pub fn with_usersync_plugin(mut self, plugin: Arc<dyn crate::usersync::UserSyncPlugin>) -> Self {
        self.registry.register(plugin);
        self
    }

    /// Run one apply pass.
    ///
    /// `dry_run` exercises the full diff against a pass-local overlay
    /// without issuing a single forge mutation; `force` lifts the
    /// `max_changesets` guardrail for one deliberate oversized apply.
    pub async fn apply(&mut self, dry_run: bool, force: bool) -> Result<UnmanagedResources> {
        let ctx = PassContext::new();
        let start = Instant::now();
        let mut errors = ErrorCollection::new();

        let result = self.run_pass(&ctx, dry_run, force, &mut errors).await;
        if let Err(e) = &result {
            errors.error(format!("apply pass failed: {e}"));
        }
        self.stats.record(PassReport {
            dry_run,
            duration: start.elapsed(),
            rest_calls: ctx.stats.rest_calls(),
            graphql_calls: ctx.stats.graphql_calls(),
            throttled: ctx.stats.throttled(),
            errors: errors.errors().len(),
            warnings: errors.warnings().len(),
        });
        self.reporter.report(&errors);
        result
    }

    async fn run_pass(
        &mut self,
        ctx: &PassContext,
        dry_run: bool,
        force: bool,
        errors: &mut ErrorCollection,
    ) -> Result<UnmanagedResources> {
        let token = self.client.access_token().await?;
        self.store.set_token(token);
        self.store.checkout(&self.config.branch)?;

        let outcome = LocalModel::load(&self.store)?;
        for warning in outcome.warnings {
            errors.warn(warning);
        }
        let mut local = outcome.model;

        if !dry_run {
            self.sync_users(&mut local, errors)?;
        }

        // An external mutation may land while the (long) load runs;
        // flush and reload until the flag stays clean.
        loop {
            if self.dirty.swap(false, Ordering::SeqCst) {
                self.cache.flush();
            }
            let warnings = self.cache.load(ctx, &self.client, true).await?;
            for warning in warnings {
                errors.warn(warning);
            }
            if !self.dirty.load(Ordering::SeqCst) {
                break;
            }
        }

        let mut batch = CommandBatch::new(local.config.max_changesets, force);
        let reconciler = Reconciler::new(&local, &self.config.teams_repo);
        let unmanaged = reconciler.reconcile(&self.cache, &mut batch, errors);
        tracing::debug!(commands = batch.len(), dry_run, "reconciliation computed");

        if dry_run {
            let mut overlay =
                CacheOverlay::new(self.cache.data(), self.cache.supports_internal_repos());
            let mut executor = LiveExecutor::new(&self.client, &mut overlay, true);
            batch.commit(ctx, &mut executor, errors).await?;
        } else {
            let mut executor = LiveExecutor::new(&self.client, &mut self.cache, false);
            batch.commit(ctx, &mut executor, errors).await?;
            self.post_actions(&local, errors)?;
        }

        self.local = Some(local);
        self.unmanaged = unmanaged.clone();
        Ok(unmanaged)
    }

    /// Regenerate CODEOWNERS and advance the audit tag.
    fn post_actions(&mut self, local: &LocalModel, errors: &mut ErrorCollection) -> Result<()> {
        let content = codeowners::generate(local, self.client.organization());
        let path = std::path::Path::new(".github/CODEOWNERS");
        let changed = self
            .store
            .read(path)
            .map(|current| current != content.as_bytes())
            .unwrap_or(true);
        if changed {
            self.store.write(path, content.as_bytes())?;
            if let Err(e) = self
                .store
                .commit_and_push(&self.config.branch, "chore: regenerate CODEOWNERS")
            {
                errors.error(format!("pushing CODEOWNERS: {e}"));
            }
        }

        let head = self.store.head()?;
        self.store.tag(&self.config.tag, &head)?;
        Ok(())
    }

    /// Run the configured user-sync adapter and commit its delta.
    fn sync_users(&mut self, local: &mut LocalModel, errors: &mut ErrorCollection) -> Result<()> {
        let plugin_name = local.config.usersync.plugin.clone();
        if plugin_name == "noop" {
            return Ok(());
        }
        let Some(plugin) = self.registry.get(&plugin_name) else {
            errors.warn(format!("unknown usersync plugin '{plugin_name}'"));
            return Ok(());
        };

        let mut desired = match plugin.sync(&local.users) {
            Ok(desired) => desired,
            Err(e) => {
                errors.error(format!("usersync plugin '{plugin_name}': {e}"));
                return Ok(());
            }
        };
        // protected users survive whatever the source says
        for (username, user) in &local.users {
            if user.kind == UserKind::Protected {
                desired.insert(username.clone(), user.clone());
            }
        }
        if desired == local.users {
            return Ok(());
        }

        for (username, user) in &local.users {
            if !desired.contains_key(username) {
                self.store.remove(&user_path(user.kind, username))?;
            }
        }
        for (username, user) in &desired {
            if local.users.get(username) != Some(user) {
                let manifest = Manifest {
                    api_version: API_VERSION.to_string(),
                    kind: Kind::User,
                    name: username.clone(),
                    spec: goliac_core::user::UserSpec {
                        login: user.login.clone(),
                    },
                };
                self.store.write(
                    &user_path(user.kind, username),
                    serde_yaml::to_string(&manifest)?.as_bytes(),
                )?;
            }
        }
        if let Some(sha) = self
            .store
            .commit_and_push(&self.config.branch, "chore: user-sync update")?
        {
            tracing::info!(commit = %sha, plugin = %plugin_name, "committed user-sync delta");
        }
        local.users = desired;
        Ok(())
    }

    /// Create a repository outside the reviewed flow: synthesize the
    /// YAML under the owning team, push it, create the repository on
    /// the forge, and mark the cache dirty so the next pass
    /// reconverges from fresh state.
    pub async fn external_create_repository(
        &mut self,
        team: &str,
        name: &str,
        spec: RepositorySpec,
    ) -> Result<()> {
        let token = self.client.access_token().await?;
        self.store.set_token(token);
        self.store.checkout(&self.config.branch)?;
        let outcome = LocalModel::load(&self.store)?;

        let Some(owner) = outcome.model.teams.get(team) else {
            return Err(Error::UnknownTeam(team.to_string()));
        };
        if outcome.model.repositories.contains_key(name) {
            return Err(Error::Validation(ValidationErrors(vec![
                goliac_core::Error::Duplicate {
                    kind: "repository",
                    name: name.to_string(),
                },
            ])));
        }

        let manifest = Manifest {
            api_version: API_VERSION.to_string(),
            kind: Kind::Repository,
            name: name.to_string(),
            spec: spec.clone(),
        };
        self.store.write(
            &PathBuf::from(format!("teams/{team}/{name}.yaml")),
            serde_yaml::to_string(&manifest)?.as_bytes(),
        )?;
        self.store
            .commit_and_push(&self.config.branch, &format!("feat: create repository {name}"))?;

        // create on the forge right away so CI can push immediately
        let ctx = PassContext::new();
        let mut errors = ErrorCollection::new();
        let command = Command::CreateRepository {
            name: name.to_string(),
            description: spec.description.clone().unwrap_or_default(),
            visibility: spec.visibility,
            default_branch: spec.default_branch.clone().unwrap_or_else(|| "main".to_string()),
            writers: vec![owner.slug()],
            readers: Vec::new(),
            properties: [
                ("allow_auto_merge".to_string(), spec.allow_auto_merge),
                ("allow_update_branch".to_string(), spec.allow_update_branch),
                ("delete_branch_on_merge".to_string(), spec.delete_branch_on_merge),
            ]
            .into_iter()
            .collect(),
            fork_from: spec.fork_from.clone(),
        };
        let mut executor = LiveExecutor::new(&self.client, &mut self.cache, false);
        executor.apply(&ctx, &command, &mut errors).await;
        self.dirty.store(true, Ordering::SeqCst);

        if let Some(first) = errors.first_error() {
            return Err(Error::Client(goliac_client::Error::Config(first.to_string())));
        }
        Ok(())
    }

    /// Expire the whole remote cache; the next pass reloads it.
    pub fn flush_cache(&mut self) {
        self.cache.flush();
    }

    /// The dirty flag shared with out-of-pass mutation paths.
    pub fn dirty_flag(&self) -> Arc<AtomicBool> {
        self.dirty.clone()
    }

    /// The last loaded local model, if a pass completed.
    pub fn local(&self) -> Option<&LocalModel> {
        self.local.as_ref()
    }

    /// The remote projection.
    pub fn remote(&self) -> &RemoteCache {
        &self.cache
    }

    /// Remote entities the last pass left unmanaged.
    pub fn unmanaged(&self) -> &UnmanagedResources {
        &self.unmanaged
    }

    /// Pass statistics.
    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    /// The most recent error, retained across passes.
    pub fn last_error(&self) -> Option<&str> {
        self.reporter.last_error()
    }
}

fn user_path(kind: UserKind, username: &str) -> PathBuf {
    let subtree = match kind {
        UserKind::Internal => "org",
        UserKind::External => "external",
        UserKind::Protected => "protected",
    };
    PathBuf::from(format!("users/{subtree}/{username}.yaml"))
}

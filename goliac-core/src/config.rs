//! The global `goliac.yaml` configuration.
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Per-class switches for destructive operations.
///
/// Every class defaults to off: the reconciler then records the
/// would-be deletion as unmanaged instead of emitting it.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default)]
#[serde(default)]
pub struct DestructiveOperations {
    /// Allow deleting repositories absent from the local tree
    pub repositories: bool,
    /// Allow deleting teams absent from the local tree
    pub teams: bool,
    /// Allow removing organization members absent from the local tree
    pub users: bool,
    /// Allow deleting rulesets absent from the local tree
    pub rulesets: bool,
}

/// Rules restricting repository visibility.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct VisibilityRules {
    /// Downgrade `public` repositories to `private`
    pub forbid_public_repositories: bool,
    /// Repository-name patterns exempt from the downgrade
    pub forbid_public_repositories_exclusions: Vec<String>,
}

impl VisibilityRules {
    /// Compile the exclusion patterns, anchored on both ends.
    pub fn compiled_exclusions(&self) -> Result<Vec<Regex>> {
        self.forbid_public_repositories_exclusions
            .iter()
            .map(|p| compile_anchored(p))
            .collect()
    }
}

/// One entry of the `rulesets` list: apply the named organization
/// ruleset to every local repository whose name matches the pattern.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RulesetMapping {
    /// Repository-name pattern, anchored on both ends
    pub pattern: String,
    /// Name of a ruleset declared under `rulesets/`
    pub ruleset: String,
}

impl RulesetMapping {
    /// Compile the repository pattern.
    pub fn compiled(&self) -> Result<Regex> {
        compile_anchored(&self.pattern)
    }
}

/// User-sync adapter selection.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct UserSyncConfig {
    /// Registered plugin name
    pub plugin: String,
    /// Plugin-specific path (e.g. an import script)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Default for UserSyncConfig {
    fn default() -> Self {
        UserSyncConfig {
            plugin: "noop".to_string(),
            path: None,
        }
    }
}

/// The parsed `goliac.yaml` at the root of a teams repository.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct GoliacConfig {
    /// Team granted blanket code-owner rights over the whole tree
    pub admin_team: String,
    /// Organization-ruleset to repository-pattern mappings
    pub rulesets: Vec<RulesetMapping>,
    /// Cap on commands per apply pass
    pub max_changesets: usize,
    /// Archive repositories removed from the local tree instead of
    /// leaving them untouched
    pub archive_on_delete: bool,
    /// Per-class destructive-operation switches
    pub destructive_operations: DestructiveOperations,
    /// Visibility restrictions
    pub visibility_rules: VisibilityRules,
    /// User-sync adapter selection
    pub usersync: UserSyncConfig,
    /// Workflow names allowed to force-merge pull requests
    pub force_merge_workflows: Vec<String>,
}

impl Default for GoliacConfig {
    fn default() -> Self {
        GoliacConfig {
            admin_team: "admin".to_string(),
            rulesets: Vec::new(),
            max_changesets: 50,
            archive_on_delete: true,
            destructive_operations: DestructiveOperations::default(),
            visibility_rules: VisibilityRules::default(),
            usersync: UserSyncConfig::default(),
            force_merge_workflows: Vec::new(),
        }
    }
}

impl GoliacConfig {
    /// Parse `goliac.yaml`, checking that every pattern compiles.
    pub fn parse(data: &str) -> Result<Self> {
        let config: GoliacConfig = serde_yaml::from_str(data)?;
        for mapping in &config.rulesets {
            mapping.compiled()?;
        }
        config.visibility_rules.compiled_exclusions()?;
        Ok(config)
    }
}

fn compile_anchored(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^{pattern}$")).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_safe() {
        let config = GoliacConfig::parse("admin_team: goliac-admin\n").unwrap();
        assert_eq!(config.admin_team, "goliac-admin");
        assert_eq!(config.max_changesets, 50);
        assert!(config.archive_on_delete);
        assert!(!config.destructive_operations.repositories);
        assert_eq!(config.usersync.plugin, "noop");
    }

    #[test]
    fn parses_a_full_configuration() {
        let config = GoliacConfig::parse(
            r#"
admin_team: admin
rulesets:
  - pattern: ".*"
    ruleset: default
max_changesets: 10
archive_on_delete: false
destructive_operations:
  repositories: true
visibility_rules:
  forbid_public_repositories: true
  forbid_public_repositories_exclusions:
    - "public-.*"
usersync:
  plugin: noop
force_merge_workflows:
  - usersync
"#,
        )
        .unwrap();
        assert_eq!(config.rulesets.len(), 1);
        assert!(config.destructive_operations.repositories);
        assert!(!config.destructive_operations.teams);
        assert!(config.visibility_rules.forbid_public_repositories);
        assert_eq!(config.max_changesets, 10);
    }

    #[test]
    fn rejects_bad_patterns() {
        let err = GoliacConfig::parse("rulesets:\n  - pattern: '('\n    ruleset: default\n");
        assert!(matches!(err, Err(Error::InvalidPattern { .. })));
    }

    #[test]
    fn exclusions_are_anchored() {
        let rules = VisibilityRules {
            forbid_public_repositories: true,
            forbid_public_repositories_exclusions: vec!["public-.*".to_string()],
        };
        let compiled = rules.compiled_exclusions().unwrap();
        assert!(compiled[0].is_match("public-docs"));
        assert!(!compiled[0].is_match("not-public-docs"));
    }
}

use thiserror::Error;

use crate::manifest::Kind;

/// Possible errors when parsing or validating the declarative model.
///
/// All of these abort an apply pass before any mutation is issued;
/// the reconciler only ever sees a model that passed validation.
#[derive(Error, Debug)]
pub enum Error {
    /// A YAML document failed to deserialize
    #[error("failed to parse YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    /// A listed document could not be read back from the tree
    #[error("failed to read document '{0}'")]
    ReadDocument(String),

    /// A manifest declared an apiVersion this engine does not speak
    #[error("unsupported apiVersion '{0}' (expected 'v1')")]
    UnsupportedApiVersion(String),

    /// A manifest of one kind was found where another was expected
    #[error("manifest kind mismatch: expected {expected:?}, found {found:?}")]
    KindMismatch {
        /// The kind the loader asked for
        expected: Kind,
        /// The kind the document declared
        found: Kind,
    },

    /// Two documents declared the same entity name
    #[error("duplicate {kind} '{name}'")]
    Duplicate {
        /// Entity family ("user", "team", "repository", "ruleset")
        kind: &'static str,
        /// The colliding name
        name: String,
    },

    /// A team referenced a user that no users/ document declares
    #[error("team '{team}' references unknown user '{user}'")]
    UnknownUser {
        /// The referencing team
        team: String,
        /// The missing username
        user: String,
    },

    /// A team named a parent that no team document declares
    #[error("team '{team}' references unknown parent team '{parent}'")]
    UnknownParent {
        /// The referencing team
        team: String,
        /// The missing parent name
        parent: String,
    },

    /// Following parent links from this team revisits a team
    #[error("team parent chain for '{0}' contains a cycle")]
    ParentCycle(String),

    /// The same repository was declared under two owner teams
    #[error("repository '{repo}' is declared under both '{first}' and '{second}'")]
    MultipleOwners {
        /// The repository name
        repo: String,
        /// The first declaring team
        first: String,
        /// The second declaring team
        second: String,
    },

    /// A scope or exclusion pattern does not compile
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern text
        pattern: String,
        /// The regex compilation failure
        #[source]
        source: regex::Error,
    },

    /// `goliac.yaml` mapped a pattern to a ruleset nobody declared
    #[error("ruleset mapping references unknown ruleset '{0}'")]
    UnknownRuleset(String),
}

use std::fmt;

use thiserror::Error;

/// Validation failures collected while loading a teams repository.
///
/// A pass never reaches the forge when this is non-empty.
#[derive(Debug, Default)]
pub struct ValidationErrors(pub Vec<goliac_core::Error>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s): ", self.0.len())?;
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

/// Possible errors when running the reconciliation engine.
#[derive(Error, Debug)]
pub enum Error {
    /// The local model did not validate; nothing was mutated
    #[error("local model invalid: {0}")]
    Validation(ValidationErrors),

    /// Error from the forge client
    #[error("forge client error: {0}")]
    Client(#[from] goliac_client::Error),

    /// Error from the teams repository checkout
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// Filesystem error under the checkout
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A synthesized document failed to serialize
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The changeset guardrail fired; no command was applied
    #[error("refusing to apply {count} changesets (max {max}); rerun with the override to proceed")]
    TooManyChangesets {
        /// Commands the pass wanted to apply
        count: usize,
        /// The configured cap
        max: usize,
    },

    /// A store operation ran before `checkout`
    #[error("teams repository is not checked out")]
    NotCheckedOut,

    /// External create referenced a team that is not declared
    #[error("unknown team '{0}'")]
    UnknownTeam(String),

    /// Required engine configuration was missing or inconsistent
    #[error("configuration error: {0}")]
    Config(String),

    /// The pass was cancelled
    #[error("pass cancelled")]
    Cancelled,
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Error::Validation(errors)
    }
}

//! The YAML envelope shared by every document in a teams repository.
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{Error, Result};

/// The only apiVersion this engine understands.
pub const API_VERSION: &str = "v1";

/// Document kinds a teams repository may contain.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A user declaration under `users/`
    User,
    /// A team declaration (`teams/<team>/team.yaml`)
    Team,
    /// A repository declaration (`teams/<team>/<repo>.yaml` or `archived/`)
    Repository,
    /// An organization ruleset declaration under `rulesets/`
    Ruleset,
}

/// A typed `{apiVersion, kind, name, spec}` document.
///
/// The spec payload differs per [`Kind`]; loaders pick the expected
/// kind and get a typed error when a document is filed in the wrong
/// place.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(bound(deserialize = "S: serde::Deserialize<'de> + Default"))]
pub struct Manifest<S> {
    /// Schema version, always `v1`
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Document kind
    pub kind: Kind,
    /// Entity name, unique within its kind
    pub name: String,
    /// Kind-specific payload; an omitted spec means "all defaults"
    #[serde(default)]
    pub spec: S,
}

impl<S: DeserializeOwned + Default> Manifest<S> {
    /// Parse a document and check its envelope against `expected`.
    pub fn parse(data: &str, expected: Kind) -> Result<Self> {
        let manifest: Manifest<S> = serde_yaml::from_str(data)?;
        if manifest.api_version != API_VERSION {
            return Err(Error::UnsupportedApiVersion(manifest.api_version));
        }
        if manifest.kind != expected {
            return Err(Error::KindMismatch {
                expected,
                found: manifest.kind,
            });
        }
        Ok(manifest)
    }
}

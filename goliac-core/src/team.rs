//! Team declarations and slug derivation.
use serde::{Deserialize, Serialize};

/// Suffix of the synthetic owners team derived from every declared team.
pub const OWNERS_SUFFIX: &str = "-owners";

/// Derive the canonical slug for a team name.
///
/// This mirrors the forge's own slug rules closely enough to be
/// stable: lowercase, runs of non-alphanumeric characters collapse to
/// a single `-`, leading and trailing separators are trimmed. The
/// result is the identity teams are compared and addressed by, so it
/// must never change between runs.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('-');
            }
            pending_sep = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}

/// Spec payload of a `kind: Team` document.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct TeamSpec {
    /// Usernames owning the team (and its repositories' reviews)
    #[serde(default)]
    pub owners: Vec<String>,
    /// Plain member usernames
    #[serde(default)]
    pub members: Vec<String>,
    /// Optional parent team name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Free-form description propagated to the forge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Membership is authoritative on the forge; the reconciler only
    /// mirrors it and never edits members
    #[serde(default, rename = "externallyManaged")]
    pub externally_managed: bool,
}

/// A declared team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    /// Unique team name (the manifest `name`)
    pub name: String,
    /// Owner usernames
    pub owners: Vec<String>,
    /// Member usernames
    pub members: Vec<String>,
    /// Optional parent team name
    pub parent: Option<String>,
    /// Description shown on the forge
    pub description: Option<String>,
    /// Skip member reconciliation for this team
    pub externally_managed: bool,
}

impl Team {
    /// Build a team from its manifest name and spec.
    pub fn new(name: impl Into<String>, spec: TeamSpec) -> Self {
        Team {
            name: name.into(),
            owners: spec.owners,
            members: spec.members,
            parent: spec.parent,
            description: spec.description,
            externally_managed: spec.externally_managed,
        }
    }

    /// The slug this team is addressed by on the forge.
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    /// Name of the synthetic owners team paired with this team.
    pub fn owners_team_name(&self) -> String {
        format!("{}{OWNERS_SUFFIX}", self.name)
    }

    /// Slug of the synthetic owners team.
    pub fn owners_team_slug(&self) -> String {
        format!("{}{OWNERS_SUFFIX}", self.slug())
    }

    /// All usernames on the base team (owners are implicitly members).
    pub fn all_members(&self) -> Vec<String> {
        let mut all = self.owners.clone();
        for m in &self.members {
            if !all.contains(m) {
                all.push(m.clone());
            }
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_stable_and_lowercase() {
        assert_eq!(slugify("Acme"), "acme");
        assert_eq!(slugify("platform team"), "platform-team");
        assert_eq!(slugify("ops//SRE"), "ops-sre");
        assert_eq!(slugify("  padded  "), "padded");
        assert_eq!(slugify("a--b"), "a-b");
    }

    #[test]
    fn owners_team_tracks_base_slug() {
        let team = Team::new("Platform Team", TeamSpec::default());
        assert_eq!(team.slug(), "platform-team");
        assert_eq!(team.owners_team_slug(), "platform-team-owners");
        assert_eq!(team.owners_team_name(), "Platform Team-owners");
    }

    #[test]
    fn all_members_unions_without_duplicates() {
        let team = Team::new("t", TeamSpec {
            owners: vec!["alice".into(), "bob".into()],
            members: vec!["bob".into(), "carol".into()],
            ..TeamSpec::default()
        });
        assert_eq!(team.all_members(), vec!["alice", "bob", "carol"]);
    }
}

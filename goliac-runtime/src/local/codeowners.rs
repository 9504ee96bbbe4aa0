//! Deterministic `CODEOWNERS` regeneration.
use goliac_core::slugify;

use super::LocalModel;

/// Render the `.github/CODEOWNERS` content for a model.
///
/// The admin team owns the whole tree; each team's `-owners` twin
/// (plus the admin team) owns that team's subtree, which lets owners
/// self-approve pull requests over their own files. Output is fully
/// determined by the model, so regenerating twice is byte-identical
/// and the caller can commit only on change.
pub fn generate(model: &LocalModel, organization: &str) -> String {
    let admin = slugify(&model.config.admin_team);
    let mut out = String::from("# Generated by Goliac. DO NOT EDIT.\n");
    out.push_str(&format!("* @{organization}/{admin}\n"));
    for team in model.teams.values() {
        out.push_str(&format!(
            "/teams/{}/* @{organization}/{} @{organization}/{admin}\n",
            team.name,
            team.owners_team_slug(),
        ));
    }
    out
}

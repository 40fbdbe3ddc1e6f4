//! Short ID prefix resolution for CLI commands.
//!
//! Allows users to specify any unique prefix of a proposal UUID instead of
//! the full ID, similar to git short hashes.

use anyhow::{bail, Result};
use uuid::Uuid;

use crate::application::AutonomyApi;
use crate::domain::ports::ProposalFilter;

fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        bail!("ID prefix must not be empty");
    }
    if !prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        bail!("Invalid ID prefix '{prefix}': must contain only hex characters and dashes");
    }
    Ok(())
}

/// Resolve a proposal ID prefix to a full UUID.
pub async fn resolve_proposal_id(api: &AutonomyApi, prefix: &str) -> Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(prefix) {
        return Ok(uuid);
    }
    validate_prefix(prefix)?;

    let needle = prefix.to_ascii_lowercase();
    let matches: Vec<Uuid> = api
        .list(&ProposalFilter::default())
        .await?
        .into_iter()
        .map(|p| p.id)
        .filter(|id| id.to_string().starts_with(&needle))
        .collect();

    match matches.as_slice() {
        [] => bail!("No proposal found matching '{prefix}'"),
        [id] => Ok(*id),
        many => {
            let mut msg = format!(
                "Ambiguous prefix '{prefix}': matches {} proposals:",
                many.len()
            );
            for id in many {
                msg.push_str(&format!("\n  {id}"));
            }
            bail!("{msg}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_prefix() {
        assert!(validate_prefix("").is_err());
        assert!(validate_prefix("zz").is_err());
        assert!(validate_prefix("4f2a-").is_ok());
    }
}

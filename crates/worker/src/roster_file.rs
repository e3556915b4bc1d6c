//! JSON roster files for the command-line draw.
//!
//! ```json
//! {
//!   "name": "Office 1405",
//!   "description": "Budget 500k",
//!   "participants": [
//!     { "name": "Sara", "email": "sara@example.com", "excludes": ["reza@example.com"] },
//!     { "name": "Reza", "email": "reza@example.com" },
//!     { "name": "Mina", "email": "mina@example.com", "phone_number": "+98..." }
//!   ]
//! }
//! ```
//!
//! Exclusions refer to other participants of the same file by email.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use xbuddy_core::types::ParticipantId;
use xbuddy_core::{CoreError, Group, Participant};

#[derive(Debug, thiserror::Error)]
pub enum RosterFileError {
    #[error("Failed to read roster file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed roster file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] CoreError),
}

#[derive(Debug, Deserialize)]
pub struct RosterFile {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub participants: Vec<RosterEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RosterEntry {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Emails of participants this one must not draw.
    #[serde(default)]
    pub excludes: Vec<String>,
}

impl RosterFile {
    pub fn parse(json: &str) -> Result<Self, RosterFileError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build a `Pending` group with every entry enrolled and exclusions
    /// resolved.
    pub fn into_group(self) -> Result<Group, CoreError> {
        let mut group = Group::new(self.name);
        group.description = self.description;

        let mut ids_by_email: HashMap<String, ParticipantId> = HashMap::new();
        let mut pending_exclusions: Vec<(ParticipantId, Vec<String>)> = Vec::new();

        for entry in self.participants {
            let mut participant = Participant::new(entry.name, entry.email);
            participant.phone_number = entry.phone_number;

            let id = participant.id;
            ids_by_email.insert(participant.email.to_lowercase(), id);
            group.enroll(participant)?;

            if !entry.excludes.is_empty() {
                pending_exclusions.push((id, entry.excludes));
            }
        }

        for (id, emails) in pending_exclusions {
            let excluded = emails
                .iter()
                .map(|email| {
                    ids_by_email
                        .get(&email.to_lowercase())
                        .copied()
                        .ok_or_else(|| {
                            CoreError::Validation(format!(
                                "Exclusion refers to unknown participant \"{email}\""
                            ))
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            group.set_exclusions(id, excluded)?;
        }

        Ok(group)
    }
}

/// Read and resolve a roster file.
pub async fn load(path: &Path) -> Result<Group, RosterFileError> {
    let json = tokio::fs::read_to_string(path).await?;
    let group = RosterFile::parse(&json)?.into_group()?;

    tracing::info!(
        path = %path.display(),
        group_id = %group.id,
        participants = group.participants.len(),
        "Roster loaded"
    );
    Ok(group)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const ROSTER: &str = r#"{
        "name": "Office",
        "participants": [
            { "name": "Sara", "email": "sara@example.com", "excludes": ["REZA@example.com"] },
            { "name": "Reza", "email": "reza@example.com" },
            { "name": "Mina", "email": "mina@example.com", "phone_number": "+989120000000" }
        ]
    }"#;

    #[test]
    fn resolves_exclusions_by_email() {
        let group = RosterFile::parse(ROSTER).unwrap().into_group().unwrap();

        assert_eq!(group.participants.len(), 3);
        let sara = &group.participants[0];
        let reza = &group.participants[1];
        assert!(sara.exclusions.contains(&reza.id));
        assert!(reza.exclusions.is_empty());
        assert_eq!(
            group.participants[2].phone_number.as_deref(),
            Some("+989120000000")
        );
    }

    #[test]
    fn unknown_exclusion_rejected() {
        let json = r#"{
            "name": "Office",
            "participants": [
                { "name": "Sara", "email": "sara@example.com", "excludes": ["ghost@example.com"] }
            ]
        }"#;
        let result = RosterFile::parse(json).unwrap().into_group();
        assert_matches!(result, Err(CoreError::Validation(msg)) if msg.contains("ghost@example.com"));
    }

    #[test]
    fn duplicate_email_rejected() {
        let json = r#"{
            "name": "Office",
            "participants": [
                { "name": "Sara", "email": "sara@example.com" },
                { "name": "Sara 2", "email": "sara@example.com" }
            ]
        }"#;
        let result = RosterFile::parse(json).unwrap().into_group();
        assert_matches!(result, Err(CoreError::Conflict(_)));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        assert_matches!(RosterFile::parse("{ not json"), Err(RosterFileError::Parse(_)));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let result = load(Path::new("/definitely/not/here.json")).await;
        assert_matches!(result, Err(RosterFileError::Io(_)));
    }
}

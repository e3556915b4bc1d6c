//! Group participants and their exclusion sets.
//!
//! A [`Participant`] carries the ids of the people they must not be assigned
//! to give a gift to. Ids in the exclusion set that do not belong to the
//! roster are inert.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::types::ParticipantId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum length of a participant display name.
pub const MAX_NAME_LEN: usize = 255;

/// Maximum length of an email address (RFC 5321 path limit).
const MAX_EMAIL_LEN: usize = 254;

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// One member of a gift-exchange group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    /// Where the draw result is sent.
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Participants this one must never be assigned to.
    #[serde(default)]
    pub exclusions: BTreeSet<ParticipantId>,
    /// Set once the draw has run.
    #[serde(default)]
    pub assigned_to: Option<ParticipantId>,
}

impl Participant {
    /// Create a participant with a freshly generated id and no exclusions.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), name, email)
    }

    /// Create a participant with a caller-supplied id.
    pub fn with_id(id: ParticipantId, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            phone_number: None,
            exclusions: BTreeSet::new(),
            assigned_to: None,
        }
    }

    /// Add ids to the exclusion set. Self-references are ignored.
    pub fn excluding(mut self, ids: impl IntoIterator<Item = ParticipantId>) -> Self {
        let own_id = self.id;
        self.exclusions
            .extend(ids.into_iter().filter(|id| *id != own_id));
        self
    }

    /// Whether `receiver` is an acceptable gift receiver for this participant.
    pub fn can_give_to(&self, receiver: ParticipantId) -> bool {
        receiver != self.id && !self.exclusions.contains(&receiver)
    }

    /// Validate the participant's display name and contact address.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_name(&self.name)?;
        validate_email(&self.email)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a participant display name.
///
/// Rules:
/// - Must not be empty or whitespace only.
/// - Must not exceed `MAX_NAME_LEN` characters.
pub fn validate_name(name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation(
            "Participant name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Participant name must not exceed {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

/// Validate that a string looks like a deliverable email address.
///
/// This is a shape check (`local@domain.tld`, no whitespace), not full RFC
/// 5322 parsing; the SMTP channel re-parses the address before sending.
pub fn validate_email(email: &str) -> Result<(), CoreError> {
    let invalid = || CoreError::Validation(format!("Invalid email address: \"{email}\""));

    if email.is_empty() || email.len() > MAX_EMAIL_LEN {
        return Err(invalid());
    }
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    let mut labels = domain.split('.');
    let has_two_labels = labels.clone().count() >= 2;
    if !has_two_labels || labels.any(str::is_empty) {
        return Err(invalid());
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

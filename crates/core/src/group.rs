//! Gift-exchange group lifecycle.
//!
//! A [`Group`] collects participants while `Pending`. Running the draw moves
//! it to `Drawn`, after which the roster and every exclusion set are frozen.
//! There is exactly one draw per group lifetime.

use std::collections::BTreeSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::draw::Assignment;
use crate::error::CoreError;
use crate::participant::Participant;
use crate::types::{GroupId, ParticipantId, Timestamp};

/// Smallest roster a group may be drawn with.
pub const MIN_ROSTER_SIZE: usize = 3;

// ---------------------------------------------------------------------------
// GroupStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Pending,
    Drawn,
    Completed,
}

impl GroupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupStatus::Pending => "pending",
            GroupStatus::Drawn => "drawn",
            GroupStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: GroupStatus,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub drawn_at: Option<Timestamp>,
}

impl Group {
    /// Create an empty `Pending` group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            status: GroupStatus::Pending,
            participants: Vec::new(),
            drawn_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// Add a participant to the roster.
    ///
    /// Fails once the draw has been performed, or when the id or email is
    /// already enrolled.
    pub fn enroll(&mut self, participant: Participant) -> Result<(), CoreError> {
        self.ensure_pending("Cannot add participants after draw has been performed")?;
        participant.validate()?;

        if self.participant(participant.id).is_some() {
            return Err(CoreError::Conflict(format!(
                "Participant {} is already enrolled",
                participant.id
            )));
        }
        if self
            .participants
            .iter()
            .any(|p| p.email.eq_ignore_ascii_case(&participant.email))
        {
            return Err(CoreError::Conflict(format!(
                "A participant with email {} is already enrolled",
                participant.email
            )));
        }

        self.participants.push(participant);
        Ok(())
    }

    /// Replace a participant's exclusion set. Self-references are dropped.
    pub fn set_exclusions(
        &mut self,
        participant_id: ParticipantId,
        exclusions: impl IntoIterator<Item = ParticipantId>,
    ) -> Result<(), CoreError> {
        self.ensure_pending("Exclusions cannot change after draw has been performed")?;

        let participant = self
            .participants
            .iter_mut()
            .find(|p| p.id == participant_id)
            .ok_or(CoreError::NotFound {
                entity: "participant",
                id: participant_id,
            })?;

        participant.exclusions = exclusions
            .into_iter()
            .filter(|id| *id != participant_id)
            .collect::<BTreeSet<_>>();
        Ok(())
    }

    /// Remove a participant from the roster.
    pub fn remove_participant(
        &mut self,
        participant_id: ParticipantId,
    ) -> Result<Participant, CoreError> {
        self.ensure_pending("Cannot remove participants after draw has been performed")?;

        let index = self
            .participants
            .iter()
            .position(|p| p.id == participant_id)
            .ok_or(CoreError::NotFound {
                entity: "participant",
                id: participant_id,
            })?;
        Ok(self.participants.remove(index))
    }

    /// Check that the draw may run now.
    pub fn ensure_drawable(&self) -> Result<(), CoreError> {
        self.ensure_pending("Draw has already been performed")?;

        if self.participants.len() < MIN_ROSTER_SIZE {
            return Err(CoreError::Validation(format!(
                "A draw needs at least {MIN_ROSTER_SIZE} participants, group has {}",
                self.participants.len()
            )));
        }
        Ok(())
    }

    /// Record a finished draw and move the group to `Drawn`.
    pub fn apply_assignment(&mut self, assignment: &Assignment) -> Result<(), CoreError> {
        self.ensure_drawable()?;

        if !assignment.is_valid_for(&self.participants) {
            return Err(CoreError::Validation(
                "Assignment does not match the group roster".to_string(),
            ));
        }

        for participant in &mut self.participants {
            participant.assigned_to = assignment.receiver_for(participant.id);
        }
        self.status = GroupStatus::Drawn;
        self.drawn_at = Some(Utc::now());
        Ok(())
    }

    /// Close a drawn group.
    pub fn complete(&mut self) -> Result<(), CoreError> {
        if self.status != GroupStatus::Drawn {
            return Err(CoreError::Conflict(format!(
                "Only a drawn group can be completed, group is {}",
                self.status
            )));
        }
        self.status = GroupStatus::Completed;
        Ok(())
    }

    /// The participant that `participant_id` gives a gift to.
    ///
    /// `None` before the draw, or for an id outside the roster.
    pub fn receiver_for(&self, participant_id: ParticipantId) -> Option<&Participant> {
        let receiver_id = self.participant(participant_id)?.assigned_to?;
        self.participant(receiver_id)
    }

    fn ensure_pending(&self, message: &str) -> Result<(), CoreError> {
        if self.status == GroupStatus::Pending {
            Ok(())
        } else {
            Err(CoreError::Conflict(message.to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

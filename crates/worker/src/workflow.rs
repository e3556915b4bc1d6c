//! Group draw workflow.
//!
//! [`DrawWorkflow::run_draw`] is the only place where the assignment engine
//! and the notification dispatcher meet:
//!
//! 1. Load the group and check it may be drawn.
//! 2. Run the engine. Any failure here is returned to the caller and the
//!    group stays `Pending`.
//! 3. Apply the assignment and persist the `Drawn` group, provided the
//!    stored copy is still `Pending`. A concurrent draw of the same group
//!    that lost the race gets a `Conflict` and sends nothing.
//! 4. Enqueue one notification per giver and return without waiting.

use std::sync::Arc;

use serde::Serialize;
use xbuddy_core::types::{GroupId, ParticipantId};
use xbuddy_core::{Assignment, AssignmentEngine, CoreError, DrawError, Group, GroupStatus};
use xbuddy_events::templates::{participant_url, AssignmentNotice};
use xbuddy_events::{BatchHandle, DispatcherHandle, NotificationTask};

use crate::store::{GroupStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Draw(#[from] DrawError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Giver side of a pair, as shown to the organizer.
#[derive(Debug, Clone, Serialize)]
pub struct GiverInfo {
    pub id: ParticipantId,
    pub name: String,
    pub email: String,
}

/// Receiver side of a pair, as shown to the organizer.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiverInfo {
    pub id: ParticipantId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignedPair {
    pub giver: GiverInfo,
    pub receiver: ReceiverInfo,
}

/// Result of a successful draw.
#[derive(Debug)]
pub struct DrawSummary {
    pub group_id: GroupId,
    pub group_name: String,
    pub pairs: Vec<AssignedPair>,
    /// Delivery progress of the notifications. Safe to drop.
    pub notifications: BatchHandle,
}

pub struct DrawWorkflow {
    store: Arc<dyn GroupStore>,
    dispatcher: DispatcherHandle,
    engine: AssignmentEngine,
    frontend_url: String,
}

impl DrawWorkflow {
    pub fn new(
        store: Arc<dyn GroupStore>,
        dispatcher: DispatcherHandle,
        engine: AssignmentEngine,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            engine,
            frontend_url: frontend_url.into(),
        }
    }

    /// Perform the draw for a group and queue the notifications.
    pub async fn run_draw(&self, group_id: GroupId) -> Result<DrawSummary, WorkflowError> {
        let mut group = self
            .store
            .load(group_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "group",
                id: group_id,
            })?;

        group.ensure_drawable()?;

        let assignment = self.engine.draw(&group.participants).inspect_err(|e| {
            tracing::warn!(%group_id, error = %e, "Draw failed");
        })?;

        group.apply_assignment(&assignment)?;
        if !self.store.save_if_status(&group, GroupStatus::Pending).await? {
            tracing::warn!(%group_id, "Group changed during draw, result discarded");
            let conflict = CoreError::Conflict("Draw has already been performed".to_string());
            return Err(conflict.into());
        }

        tracing::info!(
            %group_id,
            participants = group.participants.len(),
            "Draw completed"
        );

        let pairs = assigned_pairs(&group, &assignment)?;
        let tasks = self.notification_tasks(&group, &pairs);
        let notifications = self.dispatcher.enqueue(tasks);

        Ok(DrawSummary {
            group_id,
            group_name: group.name,
            pairs,
            notifications,
        })
    }

    /// One "you drew ..." message per giver.
    fn notification_tasks(&self, group: &Group, pairs: &[AssignedPair]) -> Vec<NotificationTask> {
        pairs
            .iter()
            .map(|pair| {
                let url = participant_url(&self.frontend_url, pair.giver.id);
                let message = AssignmentNotice {
                    giver_name: &pair.giver.name,
                    receiver_name: &pair.receiver.name,
                    group_name: &group.name,
                    participant_url: &url,
                }
                .render(&pair.giver.email);

                NotificationTask::new(group.id, pair.giver.id, pair.receiver.id, message)
            })
            .collect()
    }
}

/// Resolve the assignment's ids against the roster.
fn assigned_pairs(
    group: &Group,
    assignment: &Assignment,
) -> Result<Vec<AssignedPair>, CoreError> {
    assignment
        .pairs()
        .iter()
        .map(|pair| {
            let giver = group.participant(pair.giver).ok_or(CoreError::NotFound {
                entity: "participant",
                id: pair.giver,
            })?;
            let receiver = group.participant(pair.receiver).ok_or(CoreError::NotFound {
                entity: "participant",
                id: pair.receiver,
            })?;

            Ok(AssignedPair {
                giver: GiverInfo {
                    id: giver.id,
                    name: giver.name.clone(),
                    email: giver.email.clone(),
                },
                receiver: ReceiverInfo {
                    id: receiver.id,
                    name: receiver.name.clone(),
                },
            })
        })
        .collect()
}

//! Outbound notification units.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use xbuddy_core::types::{GroupId, ParticipantId};

/// Notification tasks are keyed by time-ordered UUIDs.
pub type TaskId = Uuid;

/// A fully rendered message, ready for a [`MessageSender`](crate::MessageSender).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Recipient address.
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// One message telling a giver who they drew.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTask {
    pub id: TaskId,
    pub group_id: GroupId,
    pub giver_id: ParticipantId,
    pub receiver_id: ParticipantId,
    pub message: OutboundMessage,
}

impl NotificationTask {
    pub fn new(
        group_id: GroupId,
        giver_id: ParticipantId,
        receiver_id: ParticipantId,
        message: OutboundMessage,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            group_id,
            giver_id,
            receiver_id,
            message,
        }
    }
}

/// Lifecycle of a [`NotificationTask`] inside the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Queued,
    InFlight,
    Delivered,
    FailedPermanently,
}

impl DeliveryStatus {
    /// Whether the task will not change status again.
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::FailedPermanently)
    }
}

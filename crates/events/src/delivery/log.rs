//! Log-only delivery channel.

use async_trait::async_trait;

use super::{DeliveryError, MessageSender};
use crate::task::OutboundMessage;

/// Writes messages to the log instead of sending them.
///
/// Used when `SMTP_HOST` is not set so a draw can still run end to end.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

#[async_trait]
impl MessageSender for LogSender {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "SMTP not configured, notification logged instead of sent"
        );
        tracing::debug!(body = %message.text_body, "Notification body");
        Ok(())
    }
}

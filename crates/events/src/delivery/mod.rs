//! Delivery channels for outbound notifications.
//!
//! The dispatcher only depends on the [`MessageSender`] capability. The SMTP
//! channel is used in production; the log channel stands in when no mail
//! server is configured.

pub mod email;
pub mod log;

use async_trait::async_trait;

use crate::task::OutboundMessage;

use self::email::EmailError;

/// Error type for a single delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Email(#[from] EmailError),

    /// Failure reported by a non-SMTP channel.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Sender panicked during delivery")]
    Panicked,

    #[error("Delivery abandoned during shutdown")]
    Abandoned,
}

/// Sends one rendered message to its recipient.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError>;
}

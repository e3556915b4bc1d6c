//! X Buddy notification infrastructure.
//!
//! Delivers the result of a draw to every giver, outside the request path:
//!
//! - [`NotificationTask`]: one outbound message for one giver.
//! - [`NotificationDispatcher`]: bounded worker pool draining a FIFO queue
//!   with a per-worker rate limit and per-task failure isolation.
//! - [`delivery`]: the [`MessageSender`] seam and its SMTP and log-only
//!   implementations.
//! - [`templates`]: rendering of the assignment message.

pub mod delivery;
pub mod dispatcher;
pub mod task;
pub mod templates;

pub use delivery::email::{EmailConfig, SmtpSender};
pub use delivery::log::LogSender;
pub use delivery::{DeliveryError, MessageSender};
pub use dispatcher::{
    BatchHandle, BatchReport, DispatcherConfig, DispatcherHandle, NotificationDispatcher,
    RetryPolicy, ShutdownMode,
};
pub use task::{DeliveryStatus, NotificationTask, OutboundMessage, TaskId};

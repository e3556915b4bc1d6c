//! The X Buddy draw workflow.
//!
//! Composes the assignment engine from `xbuddy_core` with the notification
//! dispatcher from `xbuddy_events`: draw synchronously, persist, then hand
//! the result to the dispatcher without waiting for delivery.

pub mod config;
pub mod roster_file;
pub mod store;
pub mod workflow;

pub use config::WorkerConfig;
pub use store::{GroupStore, InMemoryGroupStore, StoreError};
pub use workflow::{AssignedPair, DrawSummary, DrawWorkflow, WorkflowError};

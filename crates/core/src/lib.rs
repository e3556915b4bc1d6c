//! Domain logic for X Buddy gift-exchange groups.
//!
//! Pure types and functions with no I/O:
//!
//! - [`participant`]: participants and their exclusion sets.
//! - [`group`]: the group lifecycle (`pending` → `drawn` → `completed`).
//! - [`draw`]: the constrained random assignment engine.

pub mod draw;
pub mod error;
pub mod group;
pub mod participant;
pub mod types;

pub use draw::{Assignment, AssignmentEngine, DrawError, Pairing, RosterError};
pub use error::CoreError;
pub use group::{Group, GroupStatus};
pub use participant::Participant;

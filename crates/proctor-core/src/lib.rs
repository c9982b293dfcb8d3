//! Core state machine for timed, proctored exam sessions
//!
//! This crate is the heart of the workspace, containing:
//! - Countdown clock (whole seconds, single expiry signal)
//! - Response store with dirty tracking for autosave
//! - Question navigation and per-question status
//! - Violation tracking with one-shot escalation
//! - Session state machine (Loading -> Running -> Finalizing -> Submitted | Failed)
//!   with an exactly-once finalize guard
//!
//! Everything here is synchronous and deterministic. Backend I/O is described
//! by returned [`CoreEvent`]s and performed by the caller, which reports the
//! outcome back to the coordinator.

mod clock;
mod coordinator;
mod error;
mod events;
mod navigation;
mod responses;
mod session;
mod violations;

pub use clock::*;
pub use coordinator::*;
pub use error::*;
pub use events::*;
pub use navigation::*;
pub use responses::*;
pub use session::*;
pub use violations::*;

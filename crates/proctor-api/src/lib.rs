//! Shared types for exam sessions
//!
//! This crate defines the vocabulary shared by the core, its collaborators
//! and the presentation layer:
//! - Questions, answers and response sets
//! - Session status and finalize reasons
//! - Read-only session views and presentation events

mod events;
mod types;

pub use events::*;
pub use types::*;

//! Shared utilities for the exam session workspace
//!
//! This crate provides:
//! - ID types (ExamId, SessionId, StudentId, QuestionId)
//! - Time utilities (monotonic time, mockable wall clock, countdown formatting)
//! - Default paths for config and data directories

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;

//! Exam session runtime
//!
//! Drives a [`proctor_core::SubmissionCoordinator`] from a single tokio task:
//! - Clock, proctoring and autosave timers as cancellable periodic tasks
//! - Backend calls on spawned tasks, completions fed back into the loop
//! - [`ExamHandle`] for the presentation layer (commands, view, events)
//! - A file-backed [`proctor_backend_api::SessionBackend`]

mod driver;
mod file_backend;
mod timers;

pub use driver::*;
pub use file_backend::*;
pub use timers::*;

//! Collaborator interfaces for the exam session core
//!
//! This crate defines the contracts between the session runtime and the
//! outside world. It performs no I/O itself.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;

//! Strongly-typed identifiers for exam sessions
//!
//! All identifiers are opaque strings issued by the backend. The core never
//! parses them; it only compares, hashes and displays them.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of an exam definition (shared by every student sitting it)
    ExamId
);

string_id!(
    /// Identifier of one student's attempt at an exam
    SessionId
);

string_id!(
    /// Identifier of the student sitting the session
    StudentId
);

string_id!(
    /// Identifier of a question within an exam
    QuestionId
);

//! Code generation error type
//!
//! Codegen trusts the post-semantic invariants and never reports type
//! errors; anything unexpected here is a compiler bug surfaced as an
//! internal error with the position it was noticed at.

use crate::error::Location;
use std::fmt;

#[derive(Debug)]
pub enum CodeGenError {
    /// Invariant violation: unexpected node shape, unresolved annotation.
    Internal { location: Location, message: String },
    /// Formatting into the output buffer failed.
    Format(fmt::Error),
}

impl CodeGenError {
    pub fn internal(location: &Location, message: impl Into<String>) -> Self {
        CodeGenError::Internal {
            location: location.clone(),
            message: message.into(),
        }
    }
}

impl fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeGenError::Internal { location, message } => {
                write!(f, "{}: internal compiler error: {}", location, message)
            }
            CodeGenError::Format(e) => write!(f, "assembly emission error: {}", e),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<fmt::Error> for CodeGenError {
    fn from(e: fmt::Error) -> Self {
        CodeGenError::Format(e)
    }
}

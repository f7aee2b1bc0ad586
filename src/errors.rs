//! Public failure surface of the engine.

use std::fmt;

use thiserror::Error;

use holdfast_driver::DriverError;

/// What the engine saw when a deadline expired, carried by the timeout and
/// assertion kinds for diagnostics.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LastSeen {
    /// Attempts made before giving up.
    pub attempts: u32,
    /// Total time spent waiting, in milliseconds.
    pub waited_ms: u64,
    /// The last observation: a pending condition or the last absorbed
    /// recoverable failure.
    pub note: Option<String>,
}

impl fmt::Display for LastSeen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "after {} attempts over {}ms", self.attempts, self.waited_ms)?;
        if let Some(note) = &self.note {
            write!(f, "; last seen: {}", note)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// An operation that required at least one element found none.
    #[error("{operation}: no elements to act on")]
    NotFound { operation: String },

    /// Driver-reported failure that was fatal outright, or recoverable but
    /// surfaced outside the retry machinery.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Deadline expired while waiting for a condition or retrying through
    /// recoverable failures.
    #[error("timed out waiting for {operation} {last}")]
    Timeout { operation: String, last: LastSeen },

    /// Deadline expired under the assertion-style wait. Same evaluation
    /// semantics as [`Error::Timeout`], distinct kind so test harnesses can
    /// report it as a failed expectation rather than slowness.
    #[error("assertion failed: {operation} {last}")]
    Assertion { operation: String, last: LastSeen },

    /// Index outside the collection bounds after a fresh resolve.
    #[error("index {index} out of range for {len} elements")]
    IndexOutOfRange { index: isize, len: usize },

    /// Arguments that can never be honored, regardless of document state.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A single-valued accessor was called on a multi-element collection.
    #[error("{operation} is ambiguous on a collection of {count} elements")]
    AmbiguousOperation { operation: String, count: usize },
}

impl Error {
    pub fn not_found(operation: impl Into<String>) -> Self {
        Self::NotFound {
            operation: operation.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn ambiguous(operation: impl Into<String>, count: usize) -> Self {
        Self::AmbiguousOperation {
            operation: operation.into(),
            count,
        }
    }

    /// Failures the wait machinery may absorb and retry. Everything else
    /// propagates immediately: usage errors, fatal driver errors, and the
    /// terminal deadline kinds.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Driver(e) if e.is_recoverable())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

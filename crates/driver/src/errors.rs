//! Driver-side failure reporting.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure classes a driver backend can report.
///
/// The engine keys its retry decisions on the kind alone; the message is
/// for humans and diagnostics payloads.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverErrorKind {
    /// The reference no longer points at a live node.
    StaleElement,
    /// An element that had to be there was not, typically a timing race
    /// with a document update.
    NoSuchElement,
    /// Transient transport trouble between the driver and its target.
    Io,
    /// The backend cannot compile the selector.
    InvalidSelector,
    /// The backend does not implement the operation.
    Unsupported,
    /// The element cannot accept the operation in its current state.
    InvalidState,
    /// Anything else.
    Internal,
}

impl DriverErrorKind {
    /// Kinds the engine may absorb, refresh on, and retry under a deadline.
    /// Everything else propagates immediately.
    pub fn is_recoverable(self) -> bool {
        matches!(
            self,
            DriverErrorKind::StaleElement | DriverErrorKind::NoSuchElement | DriverErrorKind::Io
        )
    }
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverErrorKind::StaleElement => "stale element reference",
            DriverErrorKind::NoSuchElement => "no such element",
            DriverErrorKind::Io => "driver i/o failure",
            DriverErrorKind::InvalidSelector => "invalid selector",
            DriverErrorKind::Unsupported => "unsupported operation",
            DriverErrorKind::InvalidState => "invalid element state",
            DriverErrorKind::Internal => "internal driver error",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn stale(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::StaleElement, message)
    }

    pub fn no_such_element(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::NoSuchElement, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Io, message)
    }

    pub fn invalid_selector(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::InvalidSelector, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Unsupported, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::InvalidState, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Internal, message)
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

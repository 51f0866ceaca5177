//! Error types for the dispatch engine.
//!
//! Two tiers: [`EngineError`] for failures that propagate to the caller of
//! `fire` (context mismatch, terminal context, payload reassignment, parse
//! failures), and [`ErrorMessage`] for failures recorded on shared state by
//! a behaviour's rescue. A behaviour action failing never surfaces as an
//! `EngineError`; it is contained by the dispatch loop.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Engine-level failures that abort the calling operation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The event fired on a context is bound to a different context.
    #[error("event '{message}' is bound to a different context than the one it was fired on")]
    ContextMismatch {
        /// Message of the offending event.
        message: String,
    },

    /// The context has been completed; its bus has a definite end of life.
    #[error("context has completed; no further events may be fired")]
    Completed,

    /// An event's payload may be assigned exactly once.
    #[error("the payload of an event may only be set once; thereafter it is read-only")]
    PayloadAlreadySet,

    /// Event parameters reject duplicate keys.
    #[error("event already carries a parameter named '{key}'")]
    DuplicateParam {
        /// The rejected key.
        key: String,
    },

    /// A JSON or XML representation could not be read back into an event.
    #[error("unable to parse the provided representation into an event: {reason}")]
    Parse {
        /// Human-readable description of what was wrong.
        reason: String,
        /// The underlying failure, when one exists.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl EngineError {
    /// A parse failure with no underlying cause.
    pub fn parse(reason: impl Into<String>) -> Self {
        EngineError::Parse {
            reason: reason.into(),
            source: None,
        }
    }

    /// A parse failure wrapping the original cause.
    pub fn parse_caused_by(
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        EngineError::Parse {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// An error recorded on shared state, intended for user feedback.
///
/// Created by rescue routines or by explicit error reporting. These are
/// surfaced by a later rendering stage; the engine never raises them.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessage {
    /// Human-readable description of the failure.
    pub text: String,
    /// Rendering of the underlying failure detail, when known.
    pub cause: Option<String>,
    /// When the error was recorded.
    pub at: DateTime<Utc>,
}

impl ErrorMessage {
    /// Creates an error message with no underlying cause.
    pub fn new(text: impl Into<String>) -> Self {
        ErrorMessage {
            text: text.into(),
            cause: None,
            at: Utc::now(),
        }
    }

    /// Creates an error message carrying the detail of its cause.
    pub fn caused_by(text: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        ErrorMessage {
            text: text.into(),
            cause: Some(cause.to_string()),
            at: Utc::now(),
        }
    }
}

impl std::fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{} ({})", self.text, cause),
            None => write!(f, "{}", self.text),
        }
    }
}

//! Error types for the reactive core.
//!
//! Most failures in this crate are not fatal: invalid watch paths fail closed,
//! errors from user watchers are reported rather than propagated, and runaway
//! update loops abort a flush with a diagnostic. [`ReactiveError`] is the
//! common currency for all of them, whether returned or handed to the
//! installed [`ErrorHandler`](crate::diagnostics::ErrorHandler).

use thiserror::Error;

use crate::reactive::WatcherId;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;

/// Errors produced by the reactive core.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A dotted watch path contained characters outside the allowed set.
    #[error("failed watching path \"{path}\": only dot-delimited identifier paths are accepted")]
    InvalidPath { path: String },

    /// A getter or callback supplied by the application failed.
    #[error("{context}: {message}")]
    Evaluation { context: String, message: String },

    /// A watcher kept re-queueing itself within a single flush.
    #[error("possible infinite update loop in watcher {watcher} (\"{expression}\") after {limit} re-entries")]
    RunawayUpdate {
        watcher: WatcherId,
        expression: String,
        limit: u32,
    },

    /// A mutation that the reactive core refuses to perform.
    #[error("illegal mutation: {reason}")]
    IllegalMutation { reason: String },

    /// A value graph contains a cycle and cannot be serialized.
    #[error("value graph is cyclic")]
    CyclicValue,

    /// A value has no serialized representation.
    #[error("value of kind {kind} cannot be serialized")]
    NotSerializable { kind: &'static str },

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl ReactiveError {
    /// Build an evaluation error from any displayable message.
    pub fn evaluation(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Evaluation {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Attach a context label to an evaluation error, keeping other variants as-is.
    pub(crate) fn in_context(self, context: &str) -> Self {
        match self {
            Self::Evaluation { message, .. } => Self::Evaluation {
                context: context.to_string(),
                message,
            },
            other => other,
        }
    }
}

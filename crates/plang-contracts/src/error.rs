//! Error types for the PLang compile and execution pipeline.
//!
//! All fallible operations in the PLang crates return `PlangResult<T>`.
//! Conflicts and intent validation failures are deliberately absent here:
//! they are returned as data alongside successful results.

use thiserror::Error;

/// The unified error type for the PLang core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlangError {
    /// The policy source is malformed. Fatal to the compile attempt.
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A policy exhausted its step budget before reaching an action.
    #[error("policy '{policy}' exceeded step limit of {max_steps}")]
    StepLimitExceeded { policy: String, max_steps: u64 },

    /// Any other interpreter fault while executing one policy.
    #[error("execution error in policy '{policy}': {reason}")]
    Execution { policy: String, reason: String },

    /// An execution context was driven through an illegal lifecycle transition.
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// A compiled module was refused activation by the publishing gate.
    #[error("activation refused: {reason}")]
    Activation { reason: String },

    /// A policy identifier was referenced that the module does not contain.
    #[error("unknown policy '{policy}'")]
    UnknownPolicy { policy: String },
}

/// Convenience alias used throughout the PLang crates.
pub type PlangResult<T> = Result<T, PlangError>;

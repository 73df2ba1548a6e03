//! Fatal error kinds surfaced by configuration, I/O, and engine invariants.
//!
//! None of these are recoverable: the CLI catches the top-level `Result`,
//! prints the message alongside the crate version, and exits non-zero.
//! Numeric results that are representable as a sentinel (`NaN`, `+inf`,
//! `-inf`) never become an [`EngineError`] — they propagate through
//! [`crate::bigfloat`] operations instead.

use std::path::PathBuf;

use thiserror::Error;

/// The closed set of fatal error kinds the engine can raise.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("numeric domain error: {0}")]
    NumericDomain(String),
}

impl EngineError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        EngineError::InvariantViolation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        EngineError::Configuration(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io { path: path.into(), source }
    }

    pub fn numeric_domain(msg: impl Into<String>) -> Self {
        EngineError::NumericDomain(msg.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

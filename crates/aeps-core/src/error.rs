//! Unified error types for the AEPS workspace
//!
//! This module provides a common error type [`ElecError`] that can represent
//! errors from any part of the system. Domain-specific error types can be
//! converted to `ElecError` for uniform error handling at API boundaries.
//!
//! # Example
//!
//! ```ignore
//! use aeps_core::{ElecError, ElecResult};
//!
//! fn bring_up(path: &str) -> ElecResult<()> {
//!     let network = load_network(path)?;
//!     let sim = Simulation::new(network)?;
//!     sim.start()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all AEPS operations.
///
/// Specification errors fail network construction, precondition errors are
/// rejected locally with the caller's state unchanged, and solver faults
/// terminate the worker.
#[derive(Error, Debug)]
pub enum ElecError {
    /// I/O errors (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Network specification errors (unresolved endpoints, bad curves, type
    /// mismatches); construction fails and no network is returned
    #[error("Specification error: {0}")]
    Spec(String),

    /// Precondition errors on the mutator surface (start without callbacks,
    /// out-of-range setpoints, closing a hot breaker)
    #[error("Precondition error: {0}")]
    Precondition(String),

    /// Snapshot save/restore errors (digest mismatch, unknown component)
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Solver faults (depth overflow, curve saturation); fatal to the network
    #[error("Solver fault: {0}")]
    Solver(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using ElecError.
pub type ElecResult<T> = Result<T, ElecError>;

// Conversion from anyhow::Error
impl From<anyhow::Error> for ElecError {
    fn from(err: anyhow::Error) -> Self {
        ElecError::Other(err.to_string())
    }
}

// Conversion from string-like types for convenience
impl From<String> for ElecError {
    fn from(s: String) -> Self {
        ElecError::Other(s)
    }
}

impl From<&str> for ElecError {
    fn from(s: &str) -> Self {
        ElecError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ElecError::Spec("endpoint 'MAIN_BUS' does not resolve".into());
        assert!(err.to_string().contains("Specification error"));
        assert!(err.to_string().contains("MAIN_BUS"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ElecError = io_err.into();
        assert!(matches!(err, ElecError::Io(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> ElecResult<()> {
            Err(ElecError::Precondition("charge out of [0, 1]".into()))
        }

        fn outer() -> ElecResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}

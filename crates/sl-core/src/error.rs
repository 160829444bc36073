//! Error types for SwarmLimits

use thiserror::Error;

/// SwarmLimits error type
///
/// Configuration errors (mismatched binning, bad scale factors, empty swarms,
/// counts above the ceiling) indicate a setup bug and should abort the caller.
/// Numerical degeneracies that a single replica can survive are not errors:
/// the engines log them and return sentinel values instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration or input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Broken numerical computation (NaN or negative likelihood, non-finite Bayes factor)
    #[error("Computation error: {0}")]
    Computation(String),

    /// Dataset and model disagree on the number of bins
    #[error("bin mismatch in {context}: expected {expected} bins, got {got}")]
    BinMismatch {
        /// Where the mismatch was detected
        context: &'static str,
        /// Number of bins the model was built with
        expected: usize,
        /// Number of bins supplied
        got: usize,
    },

    /// Observed count larger than the configured ceiling
    #[error("bin {bin} has a count {count} greater than the ceiling {ceiling}")]
    CountAboveCeiling {
        /// Offending bin
        bin: usize,
        /// Observed count
        count: f64,
        /// Configured ceiling
        ceiling: usize,
    },

    /// Swarm with no points
    #[error("swarm is empty: {0}")]
    EmptySwarm(&'static str),

    /// Swarm point or bin index outside the collection
    #[error("index {index} out of range (length {len})")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of swarm points or bins
        len: usize,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for the CTBNC engine.

use thiserror::Error;

/// Errors raised while building, learning, classifying or sampling.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes.
///
/// Variants follow the failure taxonomy of the engine:
/// - malformed arguments are [`CtbnError::Construction`]
/// - broken graph/index invariants are [`CtbnError::Invariant`]
/// - a CIM failing its validity check is [`CtbnError::InvalidCim`]
/// - MLE producing an invalid CIM is [`CtbnError::Learning`]
/// - bad input data is [`CtbnError::DataConsistency`]
/// - degenerate numerics are [`CtbnError::Numerical`]
///
/// All public APIs return `Result<T, CtbnError>` to avoid panics in library code.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CtbnError {
    /// Malformed arguments (mismatched lengths, reserved characters, bad config).
    #[error("construction error: {0}")]
    Construction(String),

    /// Graph edges out of sync, index out of range, unknown name.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// A CIM failed the validity check.
    #[error("invalid CIM for node '{node}' at parent entry {entry}: {reason}")]
    InvalidCim {
        node: String,
        entry: usize,
        reason: String,
    },

    /// Maximum-likelihood estimation produced an invalid CIM; priors are
    /// usually required to avoid empty time-in-state cells.
    #[error("learning failed for node '{node}' at parent entry {entry}: {reason}")]
    Learning {
        node: String,
        entry: usize,
        reason: String,
    },

    /// Input data contradicts the model (static node changing value,
    /// missing initial values, empty training set).
    #[error("data consistency error: {0}")]
    DataConsistency(String),

    /// Numerical degeneracy (absorbing jump, zero-mass distribution,
    /// collapsed posterior).
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Failure reading an external source.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CtbnError {
    /// Converts a validity failure into the learning error reported by MLE.
    pub(crate) fn into_learning(self) -> Self {
        match self {
            CtbnError::InvalidCim {
                node,
                entry,
                reason,
            } => CtbnError::Learning {
                node,
                entry,
                reason: format!("{reason} (consider non-zero priors)"),
            },
            other => other,
        }
    }
}

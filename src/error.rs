//! Error types for nearby.

use crate::scalar::ElementType;
use thiserror::Error;

/// Coarse classification of [`LshError`].
///
/// Every failure in this crate is local and synchronous; none of them is
/// worth retrying with the same inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed parameters or arguments.
    InvalidArgument,
    /// Shape or element type disagrees with the fitted data.
    DimensionMismatch,
    /// Operation requires a fitted index.
    NotFitted,
    /// `fit` was called on an index that already holds data.
    AlreadyFitted,
}

/// Errors that can occur while configuring, fitting, or querying an index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LshError {
    /// Invalid parameter or argument value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Vector length disagrees with the configured dimension.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// Query element width disagrees with the fitted dataset.
    #[error("element type mismatch: index holds {expected} values, got {found}")]
    ElementTypeMismatch {
        expected: ElementType,
        found: ElementType,
    },

    /// Query or tuning call before `fit`.
    #[error("index has not been fitted")]
    NotFitted,

    /// Second call to `fit`.
    #[error("index has already been fitted")]
    AlreadyFitted,
}

impl LshError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LshError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            LshError::DimensionMismatch { .. } | LshError::ElementTypeMismatch { .. } => {
                ErrorKind::DimensionMismatch
            }
            LshError::NotFitted => ErrorKind::NotFitted,
            LshError::AlreadyFitted => ErrorKind::AlreadyFitted,
        }
    }
}

pub type Result<T> = std::result::Result<T, LshError>;

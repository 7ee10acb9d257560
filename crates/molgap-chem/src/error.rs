//! Error type for descriptor parsing and fingerprinting.
//!
//! # Error Categories
//!
//! | Category | Variants | Recovery Strategy |
//! |----------|----------|-------------------|
//! | Input | MalformedInput | Skip the row or abort the batch (see `MalformedPolicy`) |
//! | Configuration | InvalidParameter | Fix encoder parameters |
//!
//! A malformed descriptor never degrades into an all-zero fingerprint:
//! the failure is returned to the caller, which must decide explicitly.

use thiserror::Error;

/// Errors raised while turning a molecule descriptor into a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChemError {
    /// Descriptor could not be parsed into a valid molecular graph.
    #[error("Malformed molecule descriptor '{descriptor}': {reason}")]
    MalformedInput { descriptor: String, reason: String },

    /// Encoder hyperparameter out of range, or mismatched fingerprint lengths.
    #[error("Invalid fingerprint parameter {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },
}

impl ChemError {
    pub(crate) fn malformed(descriptor: &str, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            descriptor: descriptor.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for chemistry operations.
pub type ChemResult<T> = Result<T, ChemError>;

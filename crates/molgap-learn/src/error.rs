//! Error type for training, feature extraction, selection and inference.
//!
//! # Error Categories
//!
//! | Category | Variants | Recovery Strategy |
//! |----------|----------|-------------------|
//! | Input | Chem, EmptyDataset, DuplicateRowId, MissingLabel, MissingColumn, Csv | Fix input data |
//! | Training | TrainingDivergence | Lower learning rate, restart from checkpoint |
//! | Shape | ShapeMismatch | Rebuild with matching fingerprint width |
//! | Model | NotFitted, Regression, Tensor | Fit before predicting; inspect backend error |
//! | Configuration | ConfigError | Fix configuration |
//! | Infrastructure | Io, Serialization | Check paths and permissions |

use molgap_chem::ChemError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LearnError {
    /// Descriptor parsing or fingerprint parameter failure.
    #[error(transparent)]
    Chem(#[from] ChemError),

    /// Loss became NaN or infinite.
    #[error("Training diverged at epoch {epoch}: {stage} loss is {value}")]
    TrainingDivergence {
        epoch: usize,
        stage: &'static str,
        value: f32,
    },

    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Regressor used before `fit`.
    #[error("Regressor '{kind}' used before fit")]
    NotFitted { kind: &'static str },

    #[error("Empty dataset: {context}")]
    EmptyDataset { context: String },

    #[error("Duplicate row id '{id}' in {source_name}")]
    DuplicateRowId { id: String, source_name: String },

    #[error("No label for row id '{id}'")]
    MissingLabel { id: String },

    #[error("Column '{column}' not found in {source_name}")]
    MissingColumn { column: String, source_name: String },

    /// Regressor backend failure.
    #[error("Regression failed for '{kind}': {message}")]
    Regression { kind: &'static str, message: String },

    /// Tensor backend failure.
    #[error("Tensor operation failed: {message}")]
    Tensor { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error in {source_name}: {message}")]
    Csv { source_name: String, message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

pub type LearnResult<T> = Result<T, LearnError>;

/// Map candle errors to LearnError.
pub(crate) fn map_candle(e: candle_core::Error) -> LearnError {
    LearnError::Tensor {
        message: e.to_string(),
    }
}

pub(crate) fn map_json(e: serde_json::Error) -> LearnError {
    LearnError::Serialization {
        message: e.to_string(),
    }
}

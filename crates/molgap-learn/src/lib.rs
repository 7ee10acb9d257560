//! Transfer-learned molecular property regression.
//!
//! A joint autoencoder + auxiliary predictor is trained on a large labeled
//! auxiliary table. Its encoder half is frozen as a feature extractor, and
//! a small target table is fit with competing regressors on the extracted
//! features; the one with the lowest held-out RMSE is kept for inference.
//!
//! # Architecture
//!
//! - **RepresentationLearner**: candle joint model, AdamW, plateau decay,
//!   early stopping, best-epoch checkpoint
//! - **FeatureExtractor**: frozen `encoder.*` weights
//! - **Regressor**: ridge and random forest (smartcore)
//! - **RegressorSelector**: seeded split, RMSE ranking, capacity tie-break
//! - **InferencePipeline**: descriptor → fingerprint → latent → prediction
//! - **TransferPipeline**: all stages plus on-disk artifacts
//!
//! # Example
//!
//! ```
//! use molgap_learn::MolgapConfig;
//!
//! let config = MolgapConfig::from_toml_str("[fingerprint]\nwidth = 512\n").unwrap();
//! assert_eq!(config.fingerprint.width, 512);
//! assert!(config.validate().is_ok());
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod extractor;
pub mod inference;
pub mod learner;
pub mod model;
pub mod monitor;
pub mod optimizer;
pub mod pipeline;
pub mod regressor;
pub mod selector;

pub use config::{
    DataConfig, FingerprintConfig, LearnerConfig, MolgapConfig, RuntimeConfig, SelectorConfig,
};
pub use dataset::{seeded_split, LabeledSamples, MoleculeRecord, MoleculeTable};
pub use error::{LearnError, LearnResult};
pub use extractor::{FeatureExtractor, LatentRepresentation};
pub use inference::{InferenceOutput, InferencePipeline, Prediction};
pub use learner::{
    EpochResult, LossComponents, RepresentationLearner, TrainingHistory, CHECKPOINT_FILE,
};
pub use monitor::StopReason;
pub use pipeline::{RunArtifacts, RunOutput, RunSummary, TableCounts, TransferPipeline};
pub use regressor::{ForestRegressor, Regressor, RegressorKind, RidgeRegressor};
pub use selector::{CandidateScore, RegressorSelector, Selection, SelectionReport};

pub use molgap_chem::{Fingerprint, FingerprintEncoder, MalformedPolicy, RowId};

//! Root configuration for a molgap run.
//!
//! # Loading Configuration
//!
//! ```rust,ignore
//! use molgap_learn::MolgapConfig;
//!
//! let config = MolgapConfig::from_file("molgap.toml")?.with_env_overrides();
//! config.validate()?;
//! ```
//!
//! # TOML Structure
//!
//! ```toml
//! [fingerprint]
//! radius = 2
//! width = 2000
//! on_malformed = "skip"
//!
//! [learner]
//! batch_size = 256
//! max_epochs = 100
//! learning_rate = 1e-3
//!
//! [selector]
//! ridge_alpha = 1.0
//! forest_trees = 100
//!
//! [data]
//! smiles_column = "smiles"
//!
//! [runtime]
//! output_dir = "runs/latest"
//! resume = false
//! ```
//!
//! Every section and key is optional and falls back to its default.
//! Invalid values are rejected by [`MolgapConfig::validate`], never clamped.

use std::env;
use std::path::{Path, PathBuf};

use molgap_chem::MalformedPolicy;
use serde::{Deserialize, Serialize};

use crate::error::{LearnError, LearnResult};

fn config_error(message: impl Into<String>) -> LearnError {
    LearnError::ConfigError {
        message: message.into(),
    }
}

fn check_fraction(name: &str, value: f64) -> LearnResult<()> {
    if !(value > 0.0 && value < 1.0) {
        return Err(config_error(format!(
            "{name} must be in (0.0, 1.0), got {value}"
        )));
    }
    Ok(())
}

// ============================================================================
// FINGERPRINT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Circular environment radius.
    pub radius: usize,
    /// Number of circular bits appended after the structural keys.
    pub width: usize,
    pub on_malformed: MalformedPolicy,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            radius: 2,
            width: 2000,
            on_malformed: MalformedPolicy::Skip,
        }
    }
}

impl FingerprintConfig {
    pub fn validate(&self) -> LearnResult<()> {
        if self.radius == 0 {
            return Err(config_error("radius must be >= 1"));
        }
        if self.width == 0 {
            return Err(config_error("width must be >= 1"));
        }
        Ok(())
    }
}

// ============================================================================
// LEARNER
// ============================================================================

/// Representation Learner hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// Dropout probability on the encoder output during training.
    pub dropout: f32,
    pub batch_size: usize,
    pub max_epochs: usize,
    pub learning_rate: f64,
    /// Decoupled weight decay coefficient.
    pub weight_decay: f64,
    /// Global gradient norm above which gradients are rescaled.
    pub max_grad_norm: f64,
    /// Fraction of the auxiliary rows held out for monitoring.
    pub validation_fraction: f64,
    /// Non-improving epochs before the learning rate is reduced.
    pub lr_patience: usize,
    /// Non-improving epochs before training stops. Must exceed `lr_patience`.
    pub stop_patience: usize,
    pub lr_factor: f64,
    pub min_lr: f64,
    /// Minimum decrease of the monitored loss that counts as improvement.
    pub min_delta: f64,
    pub reconstruction_weight: f64,
    pub auxiliary_weight: f64,
    pub seed: u64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            dropout: 0.1,
            batch_size: 256,
            max_epochs: 100,
            learning_rate: 1e-3,
            weight_decay: 0.0,
            max_grad_norm: 5.0,
            validation_fraction: 0.1,
            lr_patience: 5,
            stop_patience: 10,
            lr_factor: 0.5,
            min_lr: 1e-6,
            min_delta: 0.0,
            reconstruction_weight: 1.0,
            auxiliary_weight: 1.0,
            seed: 42,
        }
    }
}

impl LearnerConfig {
    pub fn validate(&self) -> LearnResult<()> {
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(config_error(format!(
                "dropout must be in [0.0, 1.0), got {}",
                self.dropout
            )));
        }
        if self.batch_size == 0 {
            return Err(config_error("batch_size must be > 0"));
        }
        if self.max_epochs == 0 {
            return Err(config_error("max_epochs must be > 0"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(config_error(format!(
                "learning_rate must be > 0, got {}",
                self.learning_rate
            )));
        }
        if self.weight_decay < 0.0 || self.weight_decay.is_nan() {
            return Err(config_error("weight_decay must be >= 0"));
        }
        if !(self.max_grad_norm > 0.0) {
            return Err(config_error("max_grad_norm must be > 0"));
        }
        check_fraction("validation_fraction", self.validation_fraction)?;
        if self.lr_patience == 0 {
            return Err(config_error("lr_patience must be > 0"));
        }
        if self.stop_patience <= self.lr_patience {
            return Err(config_error(format!(
                "stop_patience ({}) must exceed lr_patience ({})",
                self.stop_patience, self.lr_patience
            )));
        }
        if !(self.lr_factor > 0.0 && self.lr_factor < 1.0) {
            return Err(config_error(format!(
                "lr_factor must be in (0.0, 1.0), got {}",
                self.lr_factor
            )));
        }
        if !(self.min_lr > 0.0) || self.min_lr > self.learning_rate {
            return Err(config_error(format!(
                "min_lr must be in (0.0, learning_rate], got {}",
                self.min_lr
            )));
        }
        if self.min_delta < 0.0 || self.min_delta.is_nan() {
            return Err(config_error("min_delta must be >= 0"));
        }
        if self.reconstruction_weight < 0.0
            || self.auxiliary_weight < 0.0
            || self.reconstruction_weight + self.auxiliary_weight <= 0.0
        {
            return Err(config_error(
                "loss weights must be >= 0 and not both zero",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SELECTOR
// ============================================================================

/// Regressor Selector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub validation_fraction: f64,
    pub seed: u64,
    pub ridge_alpha: f64,
    pub forest_trees: u16,
    /// Maximum tree depth; 0 means unlimited.
    pub forest_max_depth: u16,
    pub forest_min_samples_leaf: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            validation_fraction: 0.1,
            seed: 42,
            ridge_alpha: 1.0,
            forest_trees: 100,
            forest_max_depth: 0,
            forest_min_samples_leaf: 1,
        }
    }
}

impl SelectorConfig {
    pub fn validate(&self) -> LearnResult<()> {
        check_fraction("validation_fraction", self.validation_fraction)?;
        if !(self.ridge_alpha > 0.0) {
            return Err(config_error(format!(
                "ridge_alpha must be > 0, got {}",
                self.ridge_alpha
            )));
        }
        if self.forest_trees == 0 {
            return Err(config_error("forest_trees must be > 0"));
        }
        if self.forest_min_samples_leaf == 0 {
            return Err(config_error("forest_min_samples_leaf must be > 0"));
        }
        Ok(())
    }
}

// ============================================================================
// DATA / RUNTIME
// ============================================================================

/// Column names used when reading CSV tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Optional; rows are numbered `row-<n>` when the column is absent.
    pub id_column: String,
    pub smiles_column: String,
    pub label_column: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            id_column: "id".to_string(),
            smiles_column: "smiles".to_string(),
            label_column: "label".to_string(),
        }
    }
}

impl DataConfig {
    pub fn validate(&self) -> LearnResult<()> {
        for (name, value) in [
            ("id_column", &self.id_column),
            ("smiles_column", &self.smiles_column),
            ("label_column", &self.label_column),
        ] {
            if value.trim().is_empty() {
                return Err(config_error(format!("{name} cannot be empty")));
            }
        }
        if self.smiles_column == self.label_column {
            return Err(config_error(
                "smiles_column and label_column must differ",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Use CUDA device 0 when available.
    pub use_gpu: bool,
    pub output_dir: PathBuf,
    /// Continue from `output_dir/best.safetensors`. When false an existing
    /// checkpoint there is never overwritten.
    pub resume: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            use_gpu: false,
            output_dir: PathBuf::from("runs/latest"),
            resume: false,
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> LearnResult<()> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(config_error("output_dir cannot be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// ROOT CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MolgapConfig {
    #[serde(default)]
    pub fingerprint: FingerprintConfig,
    #[serde(default)]
    pub learner: LearnerConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl MolgapConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// - `LearnError::ConfigError` if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> LearnResult<Self> {
        let path = path.as_ref();

        let contents = std::fs::read_to_string(path).map_err(|e| {
            config_error(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        toml::from_str(&contents).map_err(|e| {
            config_error(format!(
                "Failed to parse TOML in '{}': {}",
                path.display(),
                e
            ))
        })
    }

    pub fn from_toml_str(toml: &str) -> LearnResult<Self> {
        toml::from_str(toml).map_err(|e| config_error(format!("Failed to parse TOML: {e}")))
    }

    pub fn to_toml_string(&self) -> LearnResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| config_error(format!("Failed to serialize to TOML: {e}")))
    }

    /// Validate every section, returning the first error found.
    pub fn validate(&self) -> LearnResult<()> {
        let sections: [(&str, LearnResult<()>); 5] = [
            ("fingerprint", self.fingerprint.validate()),
            ("learner", self.learner.validate()),
            ("selector", self.selector.validate()),
            ("data", self.data.validate()),
            ("runtime", self.runtime.validate()),
        ];
        for (name, result) in sections {
            match result {
                Err(LearnError::ConfigError { message }) => {
                    return Err(config_error(format!("[{name}] {message}")));
                }
                other => other?,
            }
        }
        Ok(())
    }

    /// Apply environment variable overrides. Prefix: `MOLGAP_`.
    ///
    /// | Variable | Config Path | Type |
    /// |----------|-------------|------|
    /// | `MOLGAP_RADIUS` | `fingerprint.radius` | usize |
    /// | `MOLGAP_WIDTH` | `fingerprint.width` | usize |
    /// | `MOLGAP_MAX_EPOCHS` | `learner.max_epochs` | usize |
    /// | `MOLGAP_BATCH_SIZE` | `learner.batch_size` | usize |
    /// | `MOLGAP_LEARNING_RATE` | `learner.learning_rate` | f64 |
    /// | `MOLGAP_SEED` | `learner.seed`, `selector.seed` | u64 |
    /// | `MOLGAP_USE_GPU` | `runtime.use_gpu` | bool |
    /// | `MOLGAP_OUTPUT_DIR` | `runtime.output_dir` | path |
    /// | `MOLGAP_RESUME` | `runtime.resume` | bool |
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(n) = env_parse::<usize>("MOLGAP_RADIUS") {
            self.fingerprint.radius = n;
        }
        if let Some(n) = env_parse::<usize>("MOLGAP_WIDTH") {
            self.fingerprint.width = n;
        }
        if let Some(n) = env_parse::<usize>("MOLGAP_MAX_EPOCHS") {
            self.learner.max_epochs = n;
        }
        if let Some(n) = env_parse::<usize>("MOLGAP_BATCH_SIZE") {
            self.learner.batch_size = n;
        }
        if let Some(lr) = env_parse::<f64>("MOLGAP_LEARNING_RATE") {
            self.learner.learning_rate = lr;
        }
        if let Some(seed) = env_parse::<u64>("MOLGAP_SEED") {
            self.learner.seed = seed;
            self.selector.seed = seed;
        }
        if let Some(b) = env_parse::<bool>("MOLGAP_USE_GPU") {
            self.runtime.use_gpu = b;
        }
        if let Ok(dir) = env::var("MOLGAP_OUTPUT_DIR") {
            self.runtime.output_dir = PathBuf::from(dir);
        }
        if let Some(b) = env_parse::<bool>("MOLGAP_RESUME") {
            self.runtime.resume = b;
        }
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|val| val.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = MolgapConfig::default();
        assert_eq!(config.fingerprint.radius, 2);
        assert_eq!(config.fingerprint.width, 2000);
        assert_eq!(config.fingerprint.on_malformed, MalformedPolicy::Skip);
        assert_eq!(config.learner.batch_size, 256);
        assert_eq!(config.learner.lr_patience, 5);
        assert_eq!(config.learner.stop_patience, 10);
        assert!((config.selector.validation_fraction - 0.1).abs() < 1e-12);
        assert_eq!(config.data.smiles_column, "smiles");
        assert!(!config.runtime.use_gpu);
        assert!(!config.runtime.resume);
    }

    #[test]
    fn test_default_config_validates() {
        assert!(MolgapConfig::default().validate().is_ok());
    }

    #[test]
    fn test_stop_patience_must_exceed_lr_patience() {
        let mut config = MolgapConfig::default();
        config.learner.lr_patience = 5;
        config.learner.stop_patience = 5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("[learner]"));
        assert!(err.to_string().contains("stop_patience"));
    }

    #[test]
    fn test_zero_width_fails() {
        let mut config = MolgapConfig::default();
        config.fingerprint.width = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("[fingerprint]"));
    }

    #[test]
    fn test_validation_fraction_bounds() {
        let mut config = MolgapConfig::default();
        config.selector.validation_fraction = 1.0;
        assert!(config.validate().is_err());
        config.selector.validation_fraction = 0.0;
        assert!(config.validate().is_err());
        config.selector.validation_fraction = 0.2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dropout_bounds() {
        let mut config = LearnerConfig::default();
        config.dropout = 1.0;
        assert!(config.validate().is_err());
        config.dropout = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = MolgapConfig::from_toml_str(
            r#"
            [fingerprint]
            width = 512
            on_malformed = "abort"

            [learner]
            max_epochs = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.fingerprint.width, 512);
        assert_eq!(config.fingerprint.radius, 2);
        assert_eq!(config.fingerprint.on_malformed, MalformedPolicy::Abort);
        assert_eq!(config.learner.max_epochs, 3);
        assert_eq!(config.learner.batch_size, 256);
        assert_eq!(config.selector, SelectorConfig::default());
    }

    #[test]
    fn test_from_file_round_trip() {
        let mut config = MolgapConfig::default();
        config.selector.forest_trees = 25;
        config.runtime.output_dir = PathBuf::from("out/run1");
        config.runtime.resume = true;

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", config.to_toml_string().unwrap()).unwrap();

        let loaded = MolgapConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_from_file_missing_is_config_error() {
        let err = MolgapConfig::from_file("/nonexistent/molgap.toml").unwrap_err();
        assert!(matches!(err, LearnError::ConfigError { .. }));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = MolgapConfig::from_toml_str("[learner\nmax_epochs = ").unwrap_err();
        assert!(matches!(err, LearnError::ConfigError { .. }));
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("MOLGAP_WIDTH", "1024");
        std::env::set_var("MOLGAP_SEED", "7");
        std::env::set_var("MOLGAP_BATCH_SIZE", "not-a-number");
        let config = MolgapConfig::default().with_env_overrides();
        std::env::remove_var("MOLGAP_WIDTH");
        std::env::remove_var("MOLGAP_SEED");
        std::env::remove_var("MOLGAP_BATCH_SIZE");

        assert_eq!(config.fingerprint.width, 1024);
        assert_eq!(config.learner.seed, 7);
        assert_eq!(config.selector.seed, 7);
        assert_eq!(config.learner.batch_size, 256);
    }
}

//! End-to-end transfer run: auxiliary pretraining, regressor selection on
//! the target table, predictions for the evaluation table.
//!
//! Artifacts written into `runtime.output_dir`:
//!
//! | File | Contents |
//! |------|----------|
//! | `best.safetensors` | best-epoch joint model weights |
//! | `training_history.json` | per-epoch losses and stop reason |
//! | `selection_report.json` | candidate scores, split ids, tie flag |
//! | `predictions.csv` | `id,prediction` for the evaluation table |
//! | `run_summary.json` | this run's [`RunSummary`] |
//!
//! An existing `best.safetensors` is only replaced when `runtime.resume` is
//! set, in which case training continues from it.

use std::path::{Path, PathBuf};

use candle_core::Device;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use molgap_chem::FingerprintEncoder;

use crate::config::MolgapConfig;
use crate::dataset::MoleculeTable;
use crate::error::{map_json, LearnError, LearnResult};
use crate::inference::{InferenceOutput, InferencePipeline};
use crate::learner::{RepresentationLearner, CHECKPOINT_FILE};
use crate::monitor::StopReason;
use crate::regressor::RegressorKind;
use crate::selector::RegressorSelector;

pub const HISTORY_FILE: &str = "training_history.json";
pub const SELECTION_REPORT_FILE: &str = "selection_report.json";
pub const PREDICTIONS_FILE: &str = "predictions.csv";
pub const SUMMARY_FILE: &str = "run_summary.json";

/// Row counts for one input table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub rows: usize,
    pub encoded: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArtifacts {
    pub checkpoint: PathBuf,
    pub training_history: PathBuf,
    pub selection_report: PathBuf,
    pub predictions: PathBuf,
}

impl RunArtifacts {
    fn in_dir(dir: &Path) -> Self {
        Self {
            checkpoint: dir.join(CHECKPOINT_FILE),
            training_history: dir.join(HISTORY_FILE),
            selection_report: dir.join(SELECTION_REPORT_FILE),
            predictions: dir.join(PREDICTIONS_FILE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fingerprint_len: usize,
    pub auxiliary: TableCounts,
    pub target: TableCounts,
    pub evaluation: TableCounts,
    pub best_epoch: usize,
    pub epochs_run: usize,
    pub stop_reason: Option<StopReason>,
    /// Checkpoint the learner continued from.
    #[serde(default)]
    pub resumed_from: Option<PathBuf>,
    pub selected: RegressorKind,
    pub selected_rmse: f64,
    pub tie_broken_by_capacity: bool,
    pub artifacts: RunArtifacts,
}

impl RunSummary {
    pub fn save_json(&self, path: impl AsRef<Path>) -> LearnResult<()> {
        let json = serde_json::to_string_pretty(self).map_err(map_json)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Result of [`TransferPipeline::run`].
pub struct RunOutput {
    pub summary: RunSummary,
    pub predictions: InferenceOutput,
    pub inference: InferencePipeline,
}

pub struct TransferPipeline {
    config: MolgapConfig,
}

impl TransferPipeline {
    /// # Errors
    /// `LearnError::ConfigError` if the configuration does not validate.
    pub fn new(config: MolgapConfig) -> LearnResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MolgapConfig {
        &self.config
    }

    /// Device for training and extraction.
    pub fn device(&self) -> Device {
        if !self.config.runtime.use_gpu {
            return Device::Cpu;
        }
        match Device::new_cuda(0) {
            Ok(device) => device,
            Err(e) => {
                warn!(error = %e, "CUDA device unavailable, falling back to CPU");
                Device::Cpu
            }
        }
    }

    /// Run all stages and write the artifacts.
    ///
    /// `auxiliary` and `target` must carry labels; `evaluation` labels are
    /// ignored.
    ///
    /// # Errors
    /// - `LearnError::ConfigError` if a checkpoint already exists in the
    ///   output directory and `runtime.resume` is not set
    /// - `LearnError::Io` if `runtime.resume` is set and no checkpoint exists
    pub fn run(
        &self,
        auxiliary: &MoleculeTable,
        target: &MoleculeTable,
        evaluation: &MoleculeTable,
    ) -> LearnResult<RunOutput> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let output_dir = self.config.runtime.output_dir.as_path();
        std::fs::create_dir_all(output_dir)?;
        let artifacts = RunArtifacts::in_dir(output_dir);
        let resume = self.config.runtime.resume;
        if !resume && artifacts.checkpoint.exists() {
            return Err(LearnError::ConfigError {
                message: format!(
                    "{} already exists; set runtime.resume or choose another output_dir",
                    artifacts.checkpoint.display()
                ),
            });
        }

        info!(
            %run_id,
            output_dir = %output_dir.display(),
            auxiliary_rows = auxiliary.len(),
            target_rows = target.len(),
            evaluation_rows = evaluation.len(),
            "Starting transfer run"
        );

        let fp = &self.config.fingerprint;
        let encoder = FingerprintEncoder::new(fp.radius, fp.width)?;
        let fingerprint_len = encoder.output_len();
        let device = self.device();

        // Stage 1: representation learning on the auxiliary table.
        let aux_batch = encoder.encode_all(&auxiliary.descriptor_rows(), fp.on_malformed)?;
        let auxiliary_counts = TableCounts {
            rows: auxiliary.len(),
            encoded: aux_batch.encoded.len(),
            rejected: aux_batch.rejected.len(),
        };
        let aux_samples = auxiliary.join(aux_batch.encoded)?;

        let mut learner =
            RepresentationLearner::new(fingerprint_len, self.config.learner.clone(), device)?;
        if resume {
            learner.load_checkpoint(&artifacts.checkpoint)?;
        }
        let history = learner.train(&aux_samples, Some(output_dir))?.clone();
        history.save_json(&artifacts.training_history)?;
        let extractor = learner.into_extractor()?;

        // Stage 2: regressor selection on target features.
        let target_batch = encoder.encode_all(&target.descriptor_rows(), fp.on_malformed)?;
        let target_counts = TableCounts {
            rows: target.len(),
            encoded: target_batch.encoded.len(),
            rejected: target_batch.rejected.len(),
        };
        if target_batch.encoded.is_empty() {
            return Err(LearnError::EmptyDataset {
                context: format!("no target rows of '{}' could be encoded", target.name()),
            });
        }
        let target_samples = target.join(extractor.extract_keyed(target_batch.encoded)?)?;
        let selection = RegressorSelector::new(self.config.selector.clone()).select(&target_samples)?;
        selection.report.save_json(&artifacts.selection_report)?;

        // Stage 3: inference on the evaluation table.
        let inference = InferencePipeline::new(encoder, extractor, selection.model)?;
        let predictions = inference.predict(evaluation.records())?;
        predictions.write_csv(&artifacts.predictions)?;

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            fingerprint_len,
            auxiliary: auxiliary_counts,
            target: target_counts,
            evaluation: TableCounts {
                rows: evaluation.len(),
                encoded: predictions.predictions.len(),
                rejected: predictions.rejected.len(),
            },
            best_epoch: history.best_epoch,
            epochs_run: history.epochs.len(),
            stop_reason: history.stop_reason,
            resumed_from: history.resumed_from.clone(),
            selected: selection.report.selected,
            selected_rmse: selection.report.selected_rmse,
            tie_broken_by_capacity: selection.report.tie_broken_by_capacity,
            artifacts,
        };
        summary.save_json(output_dir.join(SUMMARY_FILE))?;

        info!(
            %run_id,
            selected = %summary.selected,
            rmse = summary.selected_rmse,
            predictions = summary.evaluation.encoded,
            "Transfer run complete"
        );
        Ok(RunOutput {
            summary,
            predictions,
            inference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LearnerConfig;
    use crate::dataset::MoleculeRecord;

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = MolgapConfig::default();
        config.fingerprint.width = 0;
        assert!(matches!(
            TransferPipeline::new(config),
            Err(LearnError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_cpu_device_when_gpu_disabled() {
        let pipeline = TransferPipeline::new(MolgapConfig::default()).unwrap();
        assert!(matches!(pipeline.device(), Device::Cpu));
    }

    #[test]
    fn test_target_without_encodable_rows_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MolgapConfig::default();
        config.fingerprint.width = 16;
        config.learner = LearnerConfig {
            max_epochs: 1,
            batch_size: 4,
            ..Default::default()
        };
        config.runtime.output_dir = dir.path().to_path_buf();
        let pipeline = TransferPipeline::new(config).unwrap();

        let auxiliary = MoleculeTable::from_records(
            "aux",
            ["CCO", "CCC", "CCN", "CCCl"]
                .iter()
                .enumerate()
                .map(|(i, s)| MoleculeRecord::new(format!("a{i}"), *s, Some(i as f64)))
                .collect(),
        )
        .unwrap();
        let target = MoleculeTable::from_records(
            "target",
            vec![MoleculeRecord::new("t0", "C1CC(", Some(1.0))],
        )
        .unwrap();
        let err = pipeline.run(&auxiliary, &target, &target).err().unwrap();
        assert!(matches!(err, LearnError::EmptyDataset { .. }));
    }
}

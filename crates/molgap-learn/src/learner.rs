//! Representation Learner: joint autoencoder + auxiliary predictor training.
//!
//! Implements the training loop with:
//! - Encoder → decoder reconstruction (categorical cross-entropy against the
//!   binary fingerprint) and encoder → predictor regression (MSE)
//! - Joint loss `w_rec · L_rec + w_aux · L_aux`, one backward pass
//! - AdamW step over all variables
//! - Seeded per-epoch shuffling and a held-out validation split
//! - Plateau LR decay, early stopping, best-snapshot restore and checkpoint

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor, D};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use molgap_chem::Fingerprint;

use crate::config::LearnerConfig;
use crate::dataset::{seeded_split, BatchLoader, LabeledSamples};
use crate::error::{map_candle, map_json, LearnError, LearnResult};
use crate::extractor::FeatureExtractor;
use crate::model::{fingerprints_to_tensor, new_varbuilder, seed_linear_layers, JointModel};
use crate::monitor::{PlateauConfig, PlateauMonitor, StopReason};
use crate::optimizer::{AdamW, AdamWConfig};

/// File name of the best-epoch checkpoint inside the checkpoint directory.
pub const CHECKPOINT_FILE: &str = "best.safetensors";

/// Loss terms averaged over the rows they were computed on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LossComponents {
    pub reconstruction: f32,
    pub auxiliary: f32,
    pub total: f32,
}

impl LossComponents {
    fn is_finite(&self) -> bool {
        self.reconstruction.is_finite() && self.auxiliary.is_finite() && self.total.is_finite()
    }

    fn accumulate(&mut self, other: &LossComponents, weight: f32) {
        self.reconstruction += other.reconstruction * weight;
        self.auxiliary += other.auxiliary * weight;
        self.total += other.total * weight;
    }

    fn scaled(mut self, factor: f32) -> Self {
        self.reconstruction *= factor;
        self.auxiliary *= factor;
        self.total *= factor;
        self
    }
}

/// Result of a single training epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochResult {
    /// Epoch number (1-indexed).
    pub epoch: usize,
    pub train: LossComponents,
    pub validation: LossComponents,
    /// Learning rate used during this epoch.
    pub learning_rate: f64,
    pub num_batches: usize,
    /// Whether this epoch's weights became the best snapshot.
    pub is_best: bool,
}

/// Training metrics accumulated across all epochs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochResult>,
    /// Epoch whose weights were restored at the end (1-indexed); 0 when
    /// resumed weights were never beaten.
    pub best_epoch: usize,
    /// Monitored metric (validation auxiliary MSE) at `best_epoch`.
    pub best_validation_auxiliary: f32,
    pub early_stopped: bool,
    pub stop_reason: Option<StopReason>,
    pub total_steps: usize,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub checkpoint: Option<PathBuf>,
    /// Validation losses of the weights training started from.
    pub initial_validation: Option<LossComponents>,
    /// Checkpoint the run resumed from; its weights are the epoch-0 baseline.
    pub resumed_from: Option<PathBuf>,
}

impl TrainingHistory {
    pub fn save_json(&self, path: impl AsRef<Path>) -> LearnResult<()> {
        let json = serde_json::to_string_pretty(self).map_err(map_json)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

type Snapshot = HashMap<String, Tensor>;

pub struct RepresentationLearner {
    varmap: VarMap,
    model: JointModel,
    optimizer: AdamW,
    config: LearnerConfig,
    device: Device,
    dim: usize,
    history: TrainingHistory,
    /// Checkpoint whose weights are currently loaded, if any.
    resumed_from: Option<PathBuf>,
}

impl RepresentationLearner {
    /// Build an untrained learner for fingerprints of width `dim`.
    pub fn new(dim: usize, config: LearnerConfig, device: Device) -> LearnResult<Self> {
        config.validate()?;
        if dim == 0 {
            return Err(LearnError::ConfigError {
                message: "representation width must be > 0".to_string(),
            });
        }

        let varmap = VarMap::new();
        let model = JointModel::new(new_varbuilder(&varmap, &device), dim, config.dropout)?;
        seed_linear_layers(&varmap, config.seed)?;

        let optimizer = AdamW::new(
            varmap.all_vars(),
            AdamWConfig {
                lr: config.learning_rate,
                weight_decay: config.weight_decay,
                max_grad_norm: config.max_grad_norm,
                ..Default::default()
            },
        )?;

        Ok(Self {
            varmap,
            model,
            optimizer,
            config,
            device,
            dim,
            history: TrainingHistory::default(),
            resumed_from: None,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn current_lr(&self) -> f64 {
        self.optimizer.lr()
    }

    /// Train on labeled auxiliary fingerprints.
    ///
    /// A `validation_fraction` share of the rows is held out for LR decay
    /// and early stopping. When `checkpoint_dir` is given, every new best
    /// epoch is also written to `<checkpoint_dir>/best.safetensors`. On
    /// return the weights are those of the best epoch.
    ///
    /// # Errors
    /// - `LearnError::EmptyDataset` with fewer than two rows
    /// - `LearnError::ShapeMismatch` if a fingerprint width differs from `dim`
    ///   or the sample vectors are misaligned
    /// - `LearnError::TrainingDivergence` on any non-finite loss
    pub fn train(
        &mut self,
        samples: &LabeledSamples<Fingerprint>,
        checkpoint_dir: Option<&Path>,
    ) -> LearnResult<&TrainingHistory> {
        samples.check_lengths()?;
        if let Some(fp) = samples.inputs.iter().find(|fp| fp.len() != self.dim) {
            return Err(LearnError::ShapeMismatch {
                context: "auxiliary fingerprint width",
                expected: self.dim,
                actual: fp.len(),
            });
        }
        let (train_idx, val_idx) =
            seeded_split(samples.len(), self.config.validation_fraction, self.config.seed)?;

        let checkpoint = match checkpoint_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Some(dir.join(CHECKPOINT_FILE))
            }
            None => None,
        };

        info!(
            train_rows = train_idx.len(),
            validation_rows = val_idx.len(),
            dim = self.dim,
            max_epochs = self.config.max_epochs,
            "Training representation learner"
        );

        self.history = TrainingHistory {
            train_rows: train_idx.len(),
            validation_rows: val_idx.len(),
            checkpoint: checkpoint.clone(),
            ..Default::default()
        };

        let val_fps: Vec<&Fingerprint> = val_idx.iter().map(|&i| &samples.inputs[i]).collect();
        let val_labels: Vec<f64> = val_idx.iter().map(|&i| samples.labels[i]).collect();

        let mut loader = BatchLoader::new(train_idx, self.config.batch_size, self.config.seed);
        let mut monitor = PlateauMonitor::new(PlateauConfig::from(&self.config));
        let mut best: Option<Snapshot> = None;

        let initial = self.evaluate_refs(&val_fps, &val_labels)?;
        self.history.initial_validation = Some(initial);
        if let Some(path) = self.resumed_from.take() {
            // Loaded weights must be beaten before the checkpoint is replaced.
            if initial.is_finite() {
                monitor = monitor.with_baseline(initial.auxiliary as f64);
                best = Some(self.snapshot()?);
                self.history.best_validation_auxiliary = initial.auxiliary;
            }
            info!(
                path = %path.display(),
                val_auxiliary = initial.auxiliary,
                "Resuming from checkpoint"
            );
            self.history.resumed_from = Some(path);
        }

        for epoch in 1..=self.config.max_epochs {
            let lr = self.optimizer.lr();
            let (train_loss, num_batches) = self.train_epoch(&mut loader, samples, epoch)?;

            let validation = self.evaluate_refs(&val_fps, &val_labels)?;
            if !validation.is_finite() {
                return Err(LearnError::TrainingDivergence {
                    epoch,
                    stage: "validation",
                    value: non_finite_value(&validation),
                });
            }

            let step = monitor.observe(epoch, validation.auxiliary as f64, lr);
            if step.improved {
                best = Some(self.snapshot()?);
                if let Some(path) = &checkpoint {
                    self.save_checkpoint(path)?;
                }
                self.history.best_epoch = epoch;
                self.history.best_validation_auxiliary = validation.auxiliary;
            }

            info!(
                epoch,
                train_loss = train_loss.total,
                val_reconstruction = validation.reconstruction,
                val_auxiliary = validation.auxiliary,
                lr,
                improved = step.improved,
                "Epoch complete"
            );

            self.history.epochs.push(EpochResult {
                epoch,
                train: train_loss,
                validation,
                learning_rate: lr,
                num_batches,
                is_best: step.improved,
            });

            if let Some(new_lr) = step.new_lr {
                info!(epoch, old_lr = lr, new_lr, "Reducing learning rate on plateau");
                self.optimizer.set_lr(new_lr);
            }

            if let Some(reason) = step.stop {
                self.history.stop_reason = Some(reason);
                self.history.early_stopped = reason == StopReason::EarlyStop;
                if self.history.early_stopped {
                    info!(
                        epoch,
                        best_epoch = self.history.best_epoch,
                        "Early stopping"
                    );
                }
                break;
            }
        }

        match best {
            Some(snapshot) => {
                self.restore(&snapshot)?;
                self.optimizer.reset_moments()?;
                info!(
                    best_epoch = self.history.best_epoch,
                    best_validation_auxiliary = self.history.best_validation_auxiliary,
                    "Restored best snapshot"
                );
            }
            None => warn!("No epoch improved the monitored loss; keeping final weights"),
        }

        Ok(&self.history)
    }

    fn train_epoch(
        &mut self,
        loader: &mut BatchLoader,
        samples: &LabeledSamples<Fingerprint>,
        epoch: usize,
    ) -> LearnResult<(LossComponents, usize)> {
        loader.shuffle_epoch();
        let mut sum = LossComponents::default();
        let mut rows = 0usize;
        let mut num_batches = 0usize;

        while let Some(batch) = loader.next_batch() {
            let fps: Vec<&Fingerprint> = batch.iter().map(|&i| &samples.inputs[i]).collect();
            let labels: Vec<f64> = batch.iter().map(|&i| samples.labels[i]).collect();

            let (loss, components) = self.batch_loss(&fps, &labels, true)?;
            if !components.is_finite() {
                return Err(LearnError::TrainingDivergence {
                    epoch,
                    stage: "training",
                    value: non_finite_value(&components),
                });
            }
            let grad_norm = self.optimizer.step(&loss)?;
            self.history.total_steps += 1;

            debug!(
                epoch,
                batch = num_batches,
                loss = components.total,
                grad_norm,
                "Batch step"
            );
            sum.accumulate(&components, fps.len() as f32);
            rows += fps.len();
            num_batches += 1;
        }

        Ok((sum.scaled(1.0 / rows.max(1) as f32), num_batches))
    }

    /// Joint loss tensor for one batch plus its scalar components.
    fn batch_loss(
        &self,
        fps: &[&Fingerprint],
        labels: &[f64],
        train: bool,
    ) -> LearnResult<(Tensor, LossComponents)> {
        let xs = fingerprints_to_tensor(fps, self.dim, &self.device)?;
        let ys = Tensor::from_vec(
            labels.iter().map(|&y| y as f32).collect::<Vec<f32>>(),
            labels.len(),
            &self.device,
        )
        .map_err(map_candle)?;

        let out = self.model.forward(&xs, train)?;

        // -Σ y·log p per row, averaged over the batch.
        let reconstruction = (&xs * &out.log_probs)
            .map_err(map_candle)?
            .sum(D::Minus1)
            .map_err(map_candle)?
            .neg()
            .map_err(map_candle)?
            .mean_all()
            .map_err(map_candle)?;
        let auxiliary = candle_nn::loss::mse(&out.prediction, &ys).map_err(map_candle)?;

        let total = (reconstruction
            .affine(self.config.reconstruction_weight, 0.0)
            .map_err(map_candle)?
            + auxiliary
                .affine(self.config.auxiliary_weight, 0.0)
                .map_err(map_candle)?)
        .map_err(map_candle)?;

        let components = LossComponents {
            reconstruction: reconstruction.to_scalar::<f32>().map_err(map_candle)?,
            auxiliary: auxiliary.to_scalar::<f32>().map_err(map_candle)?,
            total: total.to_scalar::<f32>().map_err(map_candle)?,
        };
        Ok((total, components))
    }

    /// Row-weighted losses with dropout disabled.
    pub fn evaluate(&self, fps: &[Fingerprint], labels: &[f64]) -> LearnResult<LossComponents> {
        let refs: Vec<&Fingerprint> = fps.iter().collect();
        self.evaluate_refs(&refs, labels)
    }

    fn evaluate_refs(&self, fps: &[&Fingerprint], labels: &[f64]) -> LearnResult<LossComponents> {
        if fps.len() != labels.len() {
            return Err(LearnError::ShapeMismatch {
                context: "evaluation labels",
                expected: fps.len(),
                actual: labels.len(),
            });
        }
        if fps.is_empty() {
            return Err(LearnError::EmptyDataset {
                context: "evaluation set".to_string(),
            });
        }
        let mut sum = LossComponents::default();
        for (chunk_fps, chunk_labels) in fps
            .chunks(self.config.batch_size)
            .zip(labels.chunks(self.config.batch_size))
        {
            let (_, components) = self.batch_loss(chunk_fps, chunk_labels, false)?;
            sum.accumulate(&components, chunk_fps.len() as f32);
        }
        Ok(sum.scaled(1.0 / fps.len() as f32))
    }

    /// Decoder probability vectors, one per fingerprint.
    pub fn reconstruct(&self, fps: &[Fingerprint]) -> LearnResult<Vec<Vec<f32>>> {
        let refs: Vec<&Fingerprint> = fps.iter().collect();
        let xs = fingerprints_to_tensor(&refs, self.dim, &self.device)?;
        self.model
            .reconstruct(&xs)?
            .to_vec2::<f32>()
            .map_err(map_candle)
    }

    /// Auxiliary-head predictions with dropout disabled.
    pub fn predict_auxiliary(&self, fps: &[Fingerprint]) -> LearnResult<Vec<f32>> {
        let refs: Vec<&Fingerprint> = fps.iter().collect();
        let xs = fingerprints_to_tensor(&refs, self.dim, &self.device)?;
        self.model
            .forward(&xs, false)?
            .prediction
            .to_vec1::<f32>()
            .map_err(map_candle)
    }

    fn snapshot(&self) -> LearnResult<Snapshot> {
        let data = self.varmap.data().lock().map_err(|_| poisoned())?;
        data.iter()
            .map(|(name, var)| {
                var.as_tensor()
                    .copy()
                    .map(|t| (name.clone(), t))
                    .map_err(map_candle)
            })
            .collect()
    }

    fn restore(&self, snapshot: &Snapshot) -> LearnResult<()> {
        let data = self.varmap.data().lock().map_err(|_| poisoned())?;
        for (name, var) in data.iter() {
            let saved = snapshot.get(name).ok_or_else(|| LearnError::Tensor {
                message: format!("snapshot is missing variable '{name}'"),
            })?;
            var.set(saved).map_err(map_candle)?;
        }
        Ok(())
    }

    /// Save every variable to a safetensors file.
    pub fn save_checkpoint(&self, path: impl AsRef<Path>) -> LearnResult<()> {
        let path = path.as_ref();
        self.varmap.save(path).map_err(map_candle)?;
        debug!(path = %path.display(), "Saved checkpoint");
        Ok(())
    }

    /// Restore weights from a checkpoint written by [`Self::save_checkpoint`].
    pub fn load_checkpoint(&mut self, path: impl AsRef<Path>) -> LearnResult<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LearnError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("checkpoint not found: {}", path.display()),
            )));
        }
        self.varmap.load(path).map_err(map_candle)?;
        self.optimizer.reset_moments()?;
        self.resumed_from = Some(path.to_path_buf());
        info!(path = %path.display(), "Loaded checkpoint");
        Ok(())
    }

    /// Keep only the encoder half as a frozen extractor.
    pub fn into_extractor(self) -> LearnResult<FeatureExtractor> {
        let snapshot = self.snapshot()?;
        let encoder: HashMap<String, Tensor> = snapshot
            .into_iter()
            .filter(|(name, _)| name.starts_with("encoder."))
            .collect();
        FeatureExtractor::from_tensors(encoder, self.device, self.config.batch_size)
    }
}

fn poisoned() -> LearnError {
    LearnError::Tensor {
        message: "variable map lock poisoned".to_string(),
    }
}

fn non_finite_value(loss: &LossComponents) -> f32 {
    [loss.reconstruction, loss.auxiliary, loss.total]
        .into_iter()
        .find(|v| !v.is_finite())
        .unwrap_or(f32::NAN)
}

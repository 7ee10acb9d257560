//! Learning-rate decay and early stopping on a monitored validation loss.
//!
//! ```text
//!            improvement
//!   ┌──────────────────────────┐
//!   ▼                          │
//! [counting] ── lr_patience ──► reduce lr (repeatable, floor min_lr)
//!   │
//!   └──────── stop_patience ──► stop (restore best)
//! ```
//!
//! `max_epochs` bounds the run regardless of progress.
//!
//! Any decrease of the metric records a new best (and a new snapshot).
//! Only a decrease of more than `min_delta` below the value at the last
//! counter reset restarts the patience counters, so the restored best is
//! never worse than a later epoch for any `min_delta`.

use serde::{Deserialize, Serialize};

use crate::config::LearnerConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct PlateauConfig {
    pub lr_patience: usize,
    pub stop_patience: usize,
    pub lr_factor: f64,
    pub min_lr: f64,
    pub min_delta: f64,
    pub max_epochs: usize,
}

impl From<&LearnerConfig> for PlateauConfig {
    fn from(config: &LearnerConfig) -> Self {
        Self {
            lr_patience: config.lr_patience,
            stop_patience: config.stop_patience,
            lr_factor: config.lr_factor,
            min_lr: config.min_lr,
            min_delta: config.min_delta,
            max_epochs: config.max_epochs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EarlyStop,
    MaxEpochs,
}

/// Outcome of observing one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorStep {
    /// The metric is the lowest seen so far.
    pub improved: bool,
    /// The improvement exceeded `min_delta` and reset both counters.
    pub significant: bool,
    /// Set when the learning rate was reduced this epoch.
    pub new_lr: Option<f64>,
    pub stop: Option<StopReason>,
}

#[derive(Debug, Clone)]
pub struct PlateauMonitor {
    config: PlateauConfig,
    best: f64,
    best_epoch: usize,
    /// Metric at the last counter reset.
    anchor: f64,
    since_best: usize,
    since_reduction: usize,
}

impl PlateauMonitor {
    pub fn new(config: PlateauConfig) -> Self {
        Self {
            config,
            best: f64::INFINITY,
            best_epoch: 0,
            anchor: f64::INFINITY,
            since_best: 0,
            since_reduction: 0,
        }
    }

    /// Start from an already-achieved metric, recorded as epoch 0.
    #[must_use]
    pub fn with_baseline(mut self, metric: f64) -> Self {
        self.best = metric;
        self.anchor = metric;
        self.best_epoch = 0;
        self
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    /// 1-indexed epoch of the best metric; 0 before any improvement or
    /// when the baseline is still best.
    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }

    /// Record the monitored metric for `epoch` (1-indexed), lower is better.
    pub fn observe(&mut self, epoch: usize, metric: f64, current_lr: f64) -> MonitorStep {
        let mut step = MonitorStep {
            improved: false,
            significant: false,
            new_lr: None,
            stop: None,
        };

        if metric < self.best {
            self.best = metric;
            self.best_epoch = epoch;
            step.improved = true;
        }

        if metric < self.anchor - self.config.min_delta {
            self.anchor = metric;
            self.since_best = 0;
            self.since_reduction = 0;
            step.significant = true;
        } else {
            self.since_best += 1;
            self.since_reduction += 1;

            if self.since_reduction >= self.config.lr_patience {
                self.since_reduction = 0;
                let reduced = (current_lr * self.config.lr_factor).max(self.config.min_lr);
                if reduced < current_lr {
                    step.new_lr = Some(reduced);
                }
            }
            if self.since_best >= self.config.stop_patience {
                step.stop = Some(StopReason::EarlyStop);
            }
        }

        if step.stop.is_none() && epoch >= self.config.max_epochs {
            step.stop = Some(StopReason::MaxEpochs);
        }
        step
    }
}

//! Regressor Selector: fit candidates on a seeded split, keep the best.
//!
//! Selection policy:
//! 1. Split the labeled rows into fit and held-out subsets with
//!    `validation_fraction` and `seed`.
//! 2. Fit every candidate on the fit subset and score it on the held-out
//!    subset by RMSE (MAE is reported alongside).
//! 3. The candidate with strictly lower RMSE wins. When two RMSEs agree
//!    within [`TIE_TOLERANCE`], the candidate with the lower capacity rank
//!    wins and the report sets `tie_broken_by_capacity`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use molgap_chem::RowId;

use crate::config::SelectorConfig;
use crate::dataset::{seeded_split, LabeledSamples};
use crate::error::{map_json, LearnError, LearnResult};
use crate::extractor::LatentRepresentation;
use crate::regressor::{default_candidates, Regressor, RegressorKind};

/// RMSE differences at or below this are ties.
pub const TIE_TOLERANCE: f64 = 1e-12;

pub fn rmse(predictions: &[f64], truth: &[f64]) -> f64 {
    let n = predictions.len().max(1) as f64;
    let sq: f64 = predictions
        .iter()
        .zip(truth)
        .map(|(p, t)| (p - t).powi(2))
        .sum();
    (sq / n).sqrt()
}

pub fn mae(predictions: &[f64], truth: &[f64]) -> f64 {
    let n = predictions.len().max(1) as f64;
    predictions
        .iter()
        .zip(truth)
        .map(|(p, t)| (p - t).abs())
        .sum::<f64>()
        / n
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub kind: RegressorKind,
    pub capacity_rank: u8,
    pub rmse: f64,
    pub mae: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionReport {
    pub candidates: Vec<CandidateScore>,
    pub selected: RegressorKind,
    pub selected_rmse: f64,
    pub tie_broken_by_capacity: bool,
    pub validation_fraction: f64,
    pub seed: u64,
    pub fit_ids: Vec<RowId>,
    pub held_out_ids: Vec<RowId>,
}

impl SelectionReport {
    pub fn save_json(&self, path: impl AsRef<Path>) -> LearnResult<()> {
        let json = serde_json::to_string_pretty(self).map_err(map_json)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// The production regressor and how it was chosen.
pub struct Selection {
    pub report: SelectionReport,
    pub model: Box<dyn Regressor>,
}

pub struct RegressorSelector {
    config: SelectorConfig,
}

impl RegressorSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    /// Select between ridge and random forest.
    pub fn select(&self, samples: &LabeledSamples<LatentRepresentation>) -> LearnResult<Selection> {
        self.select_from(samples, default_candidates(&self.config))
    }

    pub fn select_from(
        &self,
        samples: &LabeledSamples<LatentRepresentation>,
        candidates: Vec<Box<dyn Regressor>>,
    ) -> LearnResult<Selection> {
        if candidates.is_empty() {
            return Err(LearnError::ConfigError {
                message: "no regressor candidates".to_string(),
            });
        }
        samples.check_lengths()?;
        let (fit_idx, held_idx) =
            seeded_split(samples.len(), self.config.validation_fraction, self.config.seed)?;

        let pick = |idx: &[usize]| -> (Vec<LatentRepresentation>, Vec<f64>) {
            (
                idx.iter().map(|&i| samples.inputs[i].clone()).collect(),
                idx.iter().map(|&i| samples.labels[i]).collect(),
            )
        };
        let (fit_x, fit_y) = pick(&fit_idx);
        let (held_x, held_y) = pick(&held_idx);

        info!(
            fit_rows = fit_idx.len(),
            held_out_rows = held_idx.len(),
            candidates = candidates.len(),
            "Selecting regressor"
        );

        let mut scored: Vec<(Box<dyn Regressor>, CandidateScore)> = Vec::with_capacity(candidates.len());
        for mut candidate in candidates {
            candidate.fit(&fit_x, &fit_y)?;
            let predictions = candidate.predict(&held_x)?;
            let score = CandidateScore {
                kind: candidate.kind(),
                capacity_rank: candidate.capacity_rank(),
                rmse: rmse(&predictions, &held_y),
                mae: mae(&predictions, &held_y),
            };
            info!(
                kind = %score.kind,
                rmse = score.rmse,
                mae = score.mae,
                "Scored candidate"
            );
            scored.push((candidate, score));
        }

        let (winner, tie_broken_by_capacity) = choose(&scored).ok_or_else(|| LearnError::Regression {
            kind: "selector",
            message: "every candidate produced a non-finite held-out RMSE".to_string(),
        })?;

        let scores: Vec<CandidateScore> = scored.iter().map(|(_, s)| s.clone()).collect();
        let (model, chosen) = scored.swap_remove(winner);

        let report = SelectionReport {
            candidates: scores,
            selected: chosen.kind,
            selected_rmse: chosen.rmse,
            tie_broken_by_capacity,
            validation_fraction: self.config.validation_fraction,
            seed: self.config.seed,
            fit_ids: fit_idx.iter().map(|&i| samples.ids[i].clone()).collect(),
            held_out_ids: held_idx.iter().map(|&i| samples.ids[i].clone()).collect(),
        };

        info!(
            selected = %report.selected,
            rmse = report.selected_rmse,
            tie_broken_by_capacity,
            "Selected production regressor"
        );
        Ok(Selection { report, model })
    }
}

/// Index of the winning candidate and whether a capacity tie-break decided it.
fn choose(scored: &[(Box<dyn Regressor>, CandidateScore)]) -> Option<(usize, bool)> {
    let mut best: Option<usize> = None;
    let mut tie_broken = false;
    for (i, (_, score)) in scored.iter().enumerate() {
        if !score.rmse.is_finite() {
            continue;
        }
        let Some(b) = best else {
            best = Some(i);
            continue;
        };
        let current = &scored[b].1;
        if score.rmse < current.rmse - TIE_TOLERANCE {
            best = Some(i);
            tie_broken = false;
        } else if (score.rmse - current.rmse).abs() <= TIE_TOLERANCE {
            tie_broken = true;
            if score.capacity_rank < current.capacity_rank {
                best = Some(i);
            }
        }
    }
    best.map(|b| (b, tie_broken))
}

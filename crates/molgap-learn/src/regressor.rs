//! Candidate regressors over latent representations.
//!
//! | Kind | Backend | Capacity rank |
//! |------|---------|---------------|
//! | `ridge` | smartcore ridge regression (Cholesky), centered | 0 |
//! | `random_forest` | smartcore random forest | 1 |
//!
//! The capacity rank orders candidates from simplest to most flexible and
//! breaks exact score ties in favor of the simpler model.

use std::fmt;

use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::ridge_regression::{
    RidgeRegression, RidgeRegressionParameters, RidgeRegressionSolverName,
};
use tracing::debug;

use crate::config::SelectorConfig;
use crate::error::{LearnError, LearnResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressorKind {
    Ridge,
    RandomForest,
}

impl RegressorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegressorKind::Ridge => "ridge",
            RegressorKind::RandomForest => "random_forest",
        }
    }
}

impl fmt::Display for RegressorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A regression model fit on latent representations.
pub trait Regressor: Send + Sync {
    fn kind(&self) -> RegressorKind;

    /// Lower is simpler.
    fn capacity_rank(&self) -> u8;

    fn fit(&mut self, x: &[Vec<f32>], y: &[f64]) -> LearnResult<()>;

    /// # Errors
    /// `LearnError::NotFitted` before a successful `fit`.
    fn predict(&self, x: &[Vec<f32>]) -> LearnResult<Vec<f64>>;

    fn is_fitted(&self) -> bool;
}

/// Both candidates, simplest first.
pub fn default_candidates(config: &SelectorConfig) -> Vec<Box<dyn Regressor>> {
    vec![
        Box::new(RidgeRegressor::new(config.ridge_alpha)),
        Box::new(ForestRegressor::new(
            config.forest_trees,
            config.forest_max_depth,
            config.forest_min_samples_leaf,
            config.seed,
        )),
    ]
}

/// Check shapes and return the feature width.
fn check_training_set(kind: RegressorKind, x: &[Vec<f32>], y: &[f64]) -> LearnResult<usize> {
    if x.is_empty() {
        return Err(LearnError::EmptyDataset {
            context: format!("{kind} training set"),
        });
    }
    if x.len() != y.len() {
        return Err(LearnError::ShapeMismatch {
            context: "regression labels",
            expected: x.len(),
            actual: y.len(),
        });
    }
    let width = x[0].len();
    check_width(x, width)?;
    Ok(width)
}

fn check_width(x: &[Vec<f32>], width: usize) -> LearnResult<()> {
    match x.iter().find(|row| row.len() != width) {
        Some(row) => Err(LearnError::ShapeMismatch {
            context: "regression features",
            expected: width,
            actual: row.len(),
        }),
        None => Ok(()),
    }
}

fn to_matrix(x: &[Vec<f32>], offsets: Option<&[f64]>) -> DenseMatrix<f64> {
    let rows: Vec<Vec<f64>> = x
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(j, &v)| v as f64 - offsets.map_or(0.0, |o| o[j]))
                .collect()
        })
        .collect();
    DenseMatrix::from_2d_vec(&rows)
}

fn backend_error(kind: RegressorKind, e: impl fmt::Display) -> LearnError {
    LearnError::Regression {
        kind: kind.as_str(),
        message: e.to_string(),
    }
}

struct RidgeState {
    model: RidgeRegression<f64, f64, DenseMatrix<f64>, Vec<f64>>,
    feature_means: Vec<f64>,
    label_mean: f64,
}

/// L2-regularized linear regression with an unpenalized intercept.
///
/// Features and labels are centered before solving; the intercept is the
/// label mean.
pub struct RidgeRegressor {
    alpha: f64,
    state: Option<RidgeState>,
}

impl RidgeRegressor {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, state: None }
    }
}

impl Regressor for RidgeRegressor {
    fn kind(&self) -> RegressorKind {
        RegressorKind::Ridge
    }

    fn capacity_rank(&self) -> u8 {
        0
    }

    fn fit(&mut self, x: &[Vec<f32>], y: &[f64]) -> LearnResult<()> {
        let width = check_training_set(self.kind(), x, y)?;
        let n = x.len() as f64;

        let mut feature_means = vec![0.0f64; width];
        for row in x {
            for (mean, &v) in feature_means.iter_mut().zip(row) {
                *mean += v as f64 / n;
            }
        }
        let label_mean = y.iter().sum::<f64>() / n;
        let centered_y: Vec<f64> = y.iter().map(|v| v - label_mean).collect();

        let matrix = to_matrix(x, Some(&feature_means));
        let params = RidgeRegressionParameters::default()
            .with_alpha(self.alpha)
            .with_solver(RidgeRegressionSolverName::Cholesky)
            .with_normalize(false);
        let model = RidgeRegression::fit(&matrix, &centered_y, params)
            .map_err(|e| backend_error(self.kind(), e))?;

        debug!(rows = x.len(), width, alpha = self.alpha, "Fitted ridge regressor");
        self.state = Some(RidgeState {
            model,
            feature_means,
            label_mean,
        });
        Ok(())
    }

    fn predict(&self, x: &[Vec<f32>]) -> LearnResult<Vec<f64>> {
        let state = self.state.as_ref().ok_or(LearnError::NotFitted {
            kind: self.kind().as_str(),
        })?;
        if x.is_empty() {
            return Ok(Vec::new());
        }
        check_width(x, state.feature_means.len())?;
        let matrix = to_matrix(x, Some(&state.feature_means));
        let centered = state
            .model
            .predict(&matrix)
            .map_err(|e| backend_error(self.kind(), e))?;
        Ok(centered.into_iter().map(|v| v + state.label_mean).collect())
    }

    fn is_fitted(&self) -> bool {
        self.state.is_some()
    }
}

struct ForestState {
    model: RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>,
    width: usize,
}

/// Bagged regression trees.
pub struct ForestRegressor {
    n_trees: u16,
    /// 0 means unlimited.
    max_depth: u16,
    min_samples_leaf: usize,
    seed: u64,
    state: Option<ForestState>,
}

impl ForestRegressor {
    pub fn new(n_trees: u16, max_depth: u16, min_samples_leaf: usize, seed: u64) -> Self {
        Self {
            n_trees,
            max_depth,
            min_samples_leaf,
            seed,
            state: None,
        }
    }
}

impl Regressor for ForestRegressor {
    fn kind(&self) -> RegressorKind {
        RegressorKind::RandomForest
    }

    fn capacity_rank(&self) -> u8 {
        1
    }

    fn fit(&mut self, x: &[Vec<f32>], y: &[f64]) -> LearnResult<()> {
        let width = check_training_set(self.kind(), x, y)?;
        let matrix = to_matrix(x, None);

        let mut params = RandomForestRegressorParameters::default()
            .with_n_trees(self.n_trees.into())
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_seed(self.seed);
        if self.max_depth > 0 {
            params = params.with_max_depth(self.max_depth);
        }

        let labels = y.to_vec();
        let model = RandomForestRegressor::fit(&matrix, &labels, params)
            .map_err(|e| backend_error(self.kind(), e))?;

        debug!(rows = x.len(), width, trees = self.n_trees, "Fitted random forest");
        self.state = Some(ForestState { model, width });
        Ok(())
    }

    fn predict(&self, x: &[Vec<f32>]) -> LearnResult<Vec<f64>> {
        let state = self.state.as_ref().ok_or(LearnError::NotFitted {
            kind: self.kind().as_str(),
        })?;
        if x.is_empty() {
            return Ok(Vec::new());
        }
        check_width(x, state.width)?;
        state
            .model
            .predict(&to_matrix(x, None))
            .map_err(|e| backend_error(self.kind(), e))
    }

    fn is_fitted(&self) -> bool {
        self.state.is_some()
    }
}

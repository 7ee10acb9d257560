//! AdamW optimizer for Candle Var tensors.
//!
//! Implements AdamW with:
//! - Per-parameter moment estimates (m, v)
//! - Gradient clipping by global norm
//! - Decoupled weight decay
//!
//! The learning rate is owned by the caller (see `PlateauMonitor`) and set
//! between epochs with [`AdamW::set_lr`].

use candle_core::{Tensor, Var};

use crate::error::{map_candle, LearnResult};

#[derive(Debug, Clone)]
pub struct AdamWConfig {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub weight_decay: f64,
    /// Maximum global gradient norm.
    pub max_grad_norm: f64,
}

impl Default for AdamWConfig {
    fn default() -> Self {
        Self {
            lr: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay: 0.0,
            max_grad_norm: 5.0,
        }
    }
}

struct TrackedParam {
    var: Var,
    /// First moment estimate.
    m: Tensor,
    /// Second moment estimate.
    v: Tensor,
}

pub struct AdamW {
    config: AdamWConfig,
    params: Vec<TrackedParam>,
    step: usize,
}

impl AdamW {
    pub fn new(vars: Vec<Var>, config: AdamWConfig) -> LearnResult<Self> {
        let mut opt = Self {
            config,
            params: Vec::with_capacity(vars.len()),
            step: 0,
        };
        for var in vars {
            opt.add_param(var)?;
        }
        Ok(opt)
    }

    pub fn add_param(&mut self, var: Var) -> LearnResult<()> {
        let m = var.as_tensor().zeros_like().map_err(map_candle)?;
        let v = var.as_tensor().zeros_like().map_err(map_candle)?;
        self.params.push(TrackedParam { var, m, v });
        Ok(())
    }

    pub fn lr(&self) -> f64 {
        self.config.lr
    }

    pub fn set_lr(&mut self, lr: f64) {
        self.config.lr = lr;
    }

    /// Backpropagate `loss` and apply one update. Returns the pre-clip
    /// global gradient norm.
    pub fn step(&mut self, loss: &Tensor) -> LearnResult<f64> {
        self.step += 1;
        let t = self.step as i32;
        let grads = loss.backward().map_err(map_candle)?;

        let mut total_sq = 0.0f64;
        for param in &self.params {
            if let Some(grad) = grads.get(param.var.as_tensor()) {
                let sq_sum: f32 = grad
                    .sqr()
                    .map_err(map_candle)?
                    .sum_all()
                    .map_err(map_candle)?
                    .to_scalar()
                    .map_err(map_candle)?;
                total_sq += sq_sum as f64;
            }
        }
        let total_norm = total_sq.sqrt();

        let clip_scale = if total_norm > self.config.max_grad_norm {
            self.config.max_grad_norm / (total_norm + self.config.epsilon)
        } else {
            1.0
        };

        let lr = self.config.lr;
        let bc1 = 1.0 - self.config.beta1.powi(t);
        let bc2 = 1.0 - self.config.beta2.powi(t);

        for param in &mut self.params {
            let Some(grad) = grads.get(param.var.as_tensor()) else {
                continue;
            };
            let grad = if clip_scale < 1.0 {
                grad.affine(clip_scale, 0.0).map_err(map_candle)?
            } else {
                grad.clone()
            };

            // m = β1 * m + (1 - β1) * g
            param.m = param
                .m
                .affine(self.config.beta1, 0.0)
                .map_err(map_candle)?
                .add(&grad.affine(1.0 - self.config.beta1, 0.0).map_err(map_candle)?)
                .map_err(map_candle)?
                .detach();

            // v = β2 * v + (1 - β2) * g²
            param.v = param
                .v
                .affine(self.config.beta2, 0.0)
                .map_err(map_candle)?
                .add(
                    &grad
                        .sqr()
                        .map_err(map_candle)?
                        .affine(1.0 - self.config.beta2, 0.0)
                        .map_err(map_candle)?,
                )
                .map_err(map_candle)?
                .detach();

            let m_hat = param.m.affine(1.0 / bc1, 0.0).map_err(map_candle)?;
            let denom = param
                .v
                .affine(1.0 / bc2, 0.0)
                .map_err(map_candle)?
                .sqrt()
                .map_err(map_candle)?
                .affine(1.0, self.config.epsilon)
                .map_err(map_candle)?;
            let update = m_hat.div(&denom).map_err(map_candle)?;

            // θ = θ(1 - lr·wd) - lr·update
            let current = param.var.as_tensor();
            let new_val = current
                .affine(1.0 - lr * self.config.weight_decay, 0.0)
                .map_err(map_candle)?
                .sub(&update.affine(lr, 0.0).map_err(map_candle)?)
                .map_err(map_candle)?
                .detach();
            param.var.set(&new_val).map_err(map_candle)?;
        }

        Ok(total_norm)
    }

    pub fn global_step(&self) -> usize {
        self.step
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    /// Zero all moment estimates, e.g. after restoring a snapshot.
    pub fn reset_moments(&mut self) -> LearnResult<()> {
        for param in &mut self.params {
            param.m = param.m.zeros_like().map_err(map_candle)?;
            param.v = param.v.zeros_like().map_err(map_candle)?;
        }
        Ok(())
    }
}

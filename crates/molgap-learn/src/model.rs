//! Network halves of the Representation Learner.
//!
//! # Variable layout
//!
//! | Name | Shape |
//! |------|-------|
//! | `encoder.linear.weight` / `.bias` | `[d, d]` / `[d]` |
//! | `encoder.norm.weight` / `.bias` | `[d]` |
//! | `decoder.linear.weight` / `.bias` | `[d, d]` / `[d]` |
//! | `predictor.linear.weight` / `.bias` | `[1, d]` / `[1]` |
//!
//! The `encoder.*` subset is everything a Feature Extractor needs.

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{Dropout, LayerNorm, Linear, Module, VarBuilder, VarMap};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

use molgap_chem::Fingerprint;

use crate::error::{map_candle, LearnError, LearnResult};

pub const ENCODER_PREFIX: &str = "encoder";
pub const LAYER_NORM_EPS: f64 = 1e-5;

/// `Linear(d, d) → LayerNorm → ReLU → Dropout`. Output width equals input width.
#[derive(Debug, Clone)]
pub struct Encoder {
    linear: Linear,
    norm: LayerNorm,
    dropout: Dropout,
    dim: usize,
}

impl Encoder {
    pub fn new(vb: VarBuilder, dim: usize, dropout: f32) -> LearnResult<Self> {
        let linear = candle_nn::linear(dim, dim, vb.pp("linear")).map_err(map_candle)?;
        let norm = candle_nn::layer_norm(dim, LAYER_NORM_EPS, vb.pp("norm")).map_err(map_candle)?;
        Ok(Self {
            linear,
            norm,
            dropout: Dropout::new(dropout),
            dim,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Dropout is active only when `train` is set.
    pub fn forward(&self, xs: &Tensor, train: bool) -> LearnResult<Tensor> {
        let width = xs.dim(D::Minus1).map_err(map_candle)?;
        if width != self.dim {
            return Err(LearnError::ShapeMismatch {
                context: "encoder input",
                expected: self.dim,
                actual: width,
            });
        }
        let h = self.linear.forward(xs).map_err(map_candle)?;
        let h = self.norm.forward(&h).map_err(map_candle)?;
        let h = h.relu().map_err(map_candle)?;
        self.dropout.forward(&h, train).map_err(map_candle)
    }
}

/// Encoder plus reconstruction decoder and auxiliary predictor heads.
#[derive(Debug, Clone)]
pub struct JointModel {
    pub encoder: Encoder,
    decoder: Linear,
    predictor: Linear,
}

/// Forward outputs for one batch.
pub struct JointOutput {
    /// Log-probabilities over fingerprint positions, `[b, d]`.
    pub log_probs: Tensor,
    /// Auxiliary predictions, `[b]`.
    pub prediction: Tensor,
}

impl JointModel {
    pub fn new(vb: VarBuilder, dim: usize, dropout: f32) -> LearnResult<Self> {
        let encoder = Encoder::new(vb.pp(ENCODER_PREFIX), dim, dropout)?;
        let decoder = candle_nn::linear(dim, dim, vb.pp("decoder").pp("linear")).map_err(map_candle)?;
        let predictor = candle_nn::linear(dim, 1, vb.pp("predictor").pp("linear")).map_err(map_candle)?;
        Ok(Self {
            encoder,
            decoder,
            predictor,
        })
    }

    pub fn forward(&self, xs: &Tensor, train: bool) -> LearnResult<JointOutput> {
        let latent = self.encoder.forward(xs, train)?;
        let logits = self.decoder.forward(&latent).map_err(map_candle)?;
        let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1).map_err(map_candle)?;
        let prediction = self
            .predictor
            .forward(&latent)
            .map_err(map_candle)?
            .squeeze(1)
            .map_err(map_candle)?;
        Ok(JointOutput {
            log_probs,
            prediction,
        })
    }

    /// Decoder probabilities; each row sums to 1.
    pub fn reconstruct(&self, xs: &Tensor) -> LearnResult<Tensor> {
        let latent = self.encoder.forward(xs, false)?;
        let logits = self.decoder.forward(&latent).map_err(map_candle)?;
        candle_nn::ops::softmax_last_dim(&logits).map_err(map_candle)
    }
}

/// Overwrite every linear layer with seeded uniform values in
/// `±1/sqrt(fan_in)`. Layer norm variables keep their unit/zero init.
pub fn seed_linear_layers(varmap: &VarMap, seed: u64) -> LearnResult<()> {
    let data = varmap.data().lock().map_err(|_| LearnError::Tensor {
        message: "variable map lock poisoned".to_string(),
    })?;
    let mut names: Vec<&String> = data.keys().filter(|n| n.contains(".linear.")).collect();
    names.sort();

    let mut rng = StdRng::seed_from_u64(seed);
    for name in names {
        let var = &data[name];
        let tensor = var.as_tensor();
        let weight_name = name.replace(".bias", ".weight");
        let fan_in = data
            .get(&weight_name)
            .map(|w| w.as_tensor().dim(D::Minus1))
            .transpose()
            .map_err(map_candle)?
            .unwrap_or(1);
        let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
        let dist = Uniform::new_inclusive(-bound, bound);
        let values: Vec<f32> = (0..tensor.elem_count()).map(|_| dist.sample(&mut rng)).collect();
        let init = Tensor::from_vec(values, tensor.shape().clone(), tensor.device()).map_err(map_candle)?;
        var.set(&init).map_err(map_candle)?;
    }
    Ok(())
}

/// Stack fingerprints into an `[n, d]` f32 tensor, checking every width.
pub fn fingerprints_to_tensor(
    fingerprints: &[&Fingerprint],
    dim: usize,
    device: &Device,
) -> LearnResult<Tensor> {
    let mut flat = Vec::with_capacity(fingerprints.len() * dim);
    for fp in fingerprints {
        if fp.len() != dim {
            return Err(LearnError::ShapeMismatch {
                context: "fingerprint width",
                expected: dim,
                actual: fp.len(),
            });
        }
        flat.extend(fp.bits().iter().map(|&b| b as f32));
    }
    Tensor::from_vec(flat, (fingerprints.len(), dim), device).map_err(map_candle)
}

pub(crate) fn new_varbuilder<'a>(varmap: &'a VarMap, device: &'a Device) -> VarBuilder<'a> {
    VarBuilder::from_varmap(varmap, DType::F32, device)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(dim: usize, seed: u64) -> (VarMap, JointModel) {
        let varmap = VarMap::new();
        let device = Device::Cpu;
        let model = JointModel::new(new_varbuilder(&varmap, &device), dim, 0.1).unwrap();
        seed_linear_layers(&varmap, seed).unwrap();
        (varmap, model)
    }

    fn ones_and_zeros(n: usize, dim: usize) -> Tensor {
        let data: Vec<f32> = (0..n * dim).map(|i| (i % 3 == 0) as u8 as f32).collect();
        Tensor::from_vec(data, (n, dim), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_variable_names() {
        let (varmap, _) = model(8, 1);
        let data = varmap.data().lock().unwrap();
        let mut names: Vec<&str> = data.keys().map(|s| s.as_str()).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "decoder.linear.bias",
                "decoder.linear.weight",
                "encoder.linear.bias",
                "encoder.linear.weight",
                "encoder.norm.bias",
                "encoder.norm.weight",
                "predictor.linear.bias",
                "predictor.linear.weight",
            ]
        );
    }

    #[test]
    fn test_encoder_preserves_width() {
        let (_, model) = model(12, 1);
        let out = model.encoder.forward(&ones_and_zeros(5, 12), false).unwrap();
        assert_eq!(out.dims(), &[5, 12]);
    }

    #[test]
    fn test_encoder_rejects_wrong_width() {
        let (_, model) = model(12, 1);
        let err = model.encoder.forward(&ones_and_zeros(2, 10), false).unwrap_err();
        assert!(matches!(
            err,
            LearnError::ShapeMismatch {
                expected: 12,
                actual: 10,
                ..
            }
        ));
    }

    #[test]
    fn test_untrained_decoder_outputs_distribution() {
        let (_, model) = model(16, 3);
        let probs = model.reconstruct(&ones_and_zeros(4, 16)).unwrap();
        for row in probs.to_vec2::<f32>().unwrap() {
            assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "row sums to {sum}");
        }
    }

    #[test]
    fn test_joint_forward_shapes() {
        let (_, model) = model(6, 2);
        let out = model.forward(&ones_and_zeros(3, 6), true).unwrap();
        assert_eq!(out.log_probs.dims(), &[3, 6]);
        assert_eq!(out.prediction.dims(), &[3]);
    }

    #[test]
    fn test_seeded_init_is_reproducible() {
        let (a, _) = model(8, 11);
        let (b, _) = model(8, 11);
        let (c, _) = model(8, 12);
        let weight = |m: &VarMap| -> Vec<f32> {
            let data = m.data().lock().unwrap();
            data["encoder.linear.weight"]
                .as_tensor()
                .flatten_all()
                .unwrap()
                .to_vec1()
                .unwrap()
        };
        assert_eq!(weight(&a), weight(&b));
        assert_ne!(weight(&a), weight(&c));
    }
}

//! Frozen encoder mapping fingerprints to latent representations.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use tracing::{debug, info};

use molgap_chem::{Fingerprint, RowId};

use crate::error::{map_candle, LearnError, LearnResult};
use crate::model::{fingerprints_to_tensor, Encoder, ENCODER_PREFIX};

/// Encoder output for one molecule; same width as its fingerprint.
pub type LatentRepresentation = Vec<f32>;

/// Inference-only encoder. Weights never change after construction.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    encoder: Encoder,
    device: Device,
    batch_size: usize,
}

impl FeatureExtractor {
    /// Build from `encoder.*` tensors.
    pub fn from_tensors(
        tensors: HashMap<String, Tensor>,
        device: Device,
        batch_size: usize,
    ) -> LearnResult<Self> {
        let weight_name = format!("{ENCODER_PREFIX}.linear.weight");
        let dim = tensors
            .get(&weight_name)
            .ok_or_else(|| LearnError::Tensor {
                message: format!("missing variable '{weight_name}'"),
            })?
            .dim(0)
            .map_err(map_candle)?;

        let vb = VarBuilder::from_tensors(tensors, DType::F32, &device);
        // Dropout is never applied at extraction time.
        let encoder = Encoder::new(vb.pp(ENCODER_PREFIX), dim, 0.0)?;
        Ok(Self {
            encoder,
            device,
            batch_size: batch_size.max(1),
        })
    }

    /// Load the encoder half of a safetensors checkpoint.
    pub fn from_checkpoint(
        path: impl AsRef<Path>,
        device: Device,
        batch_size: usize,
    ) -> LearnResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LearnError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("checkpoint not found: {}", path.display()),
            )));
        }
        let prefix = format!("{ENCODER_PREFIX}.");
        let tensors: HashMap<String, Tensor> = candle_core::safetensors::load(path, &device)
            .map_err(map_candle)?
            .into_iter()
            .filter(|(name, _)| name.starts_with(&prefix))
            .collect();
        let extractor = Self::from_tensors(tensors, device, batch_size)?;
        info!(
            path = %path.display(),
            dim = extractor.dim(),
            "Loaded feature extractor"
        );
        Ok(extractor)
    }

    pub fn dim(&self) -> usize {
        self.encoder.dim()
    }

    /// Encode fingerprints in chunks of `batch_size`, preserving order.
    pub fn extract(&self, fingerprints: &[Fingerprint]) -> LearnResult<Vec<LatentRepresentation>> {
        let mut out = Vec::with_capacity(fingerprints.len());
        for chunk in fingerprints.chunks(self.batch_size) {
            let refs: Vec<&Fingerprint> = chunk.iter().collect();
            let xs = fingerprints_to_tensor(&refs, self.dim(), &self.device)?;
            let latent = self.encoder.forward(&xs, false)?;
            out.extend(latent.to_vec2::<f32>().map_err(map_candle)?);
        }
        debug!(rows = out.len(), "Extracted latent representations");
        Ok(out)
    }

    /// Like [`Self::extract`], keeping each row's id attached.
    pub fn extract_keyed(
        &self,
        rows: Vec<(RowId, Fingerprint)>,
    ) -> LearnResult<Vec<(RowId, LatentRepresentation)>> {
        let (ids, fps): (Vec<RowId>, Vec<Fingerprint>) = rows.into_iter().unzip();
        let latents = self.extract(&fps)?;
        Ok(ids.into_iter().zip(latents).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LearnerConfig;
    use crate::learner::RepresentationLearner;

    fn fingerprint(seed: usize, dim: usize) -> Fingerprint {
        Fingerprint::from_bits((0..dim).map(|j| ((seed * 31 + j * 17) % 7 < 3) as u8))
    }

    fn extractor(dim: usize, batch_size: usize) -> FeatureExtractor {
        let config = LearnerConfig {
            batch_size,
            ..Default::default()
        };
        RepresentationLearner::new(dim, config, Device::Cpu)
            .unwrap()
            .into_extractor()
            .unwrap()
    }

    #[test]
    fn test_extract_width_equals_input_width() {
        let ex = extractor(20, 4);
        assert_eq!(ex.dim(), 20);
        let out = ex.extract(&[fingerprint(1, 20)]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 20);
    }

    #[test]
    fn test_extract_preserves_order_across_chunks() {
        let ex = extractor(16, 3);
        let fps: Vec<Fingerprint> = (0..10).map(|i| fingerprint(i, 16)).collect();
        let batched = ex.extract(&fps).unwrap();
        for (i, fp) in fps.iter().enumerate() {
            let single = ex.extract(std::slice::from_ref(fp)).unwrap();
            for (a, b) in single[0].iter().zip(&batched[i]) {
                assert!((a - b).abs() < 1e-5, "row {i} differs");
            }
        }
    }

    #[test]
    fn test_extract_is_deterministic() {
        let ex = extractor(16, 8);
        let fps: Vec<Fingerprint> = (0..5).map(|i| fingerprint(i, 16)).collect();
        assert_eq!(ex.extract(&fps).unwrap(), ex.extract(&fps).unwrap());
    }

    #[test]
    fn test_extract_rejects_wrong_width() {
        let ex = extractor(16, 8);
        let err = ex.extract(&[fingerprint(0, 15)]).unwrap_err();
        assert!(matches!(err, LearnError::ShapeMismatch { expected: 16, actual: 15, .. }));
    }

    #[test]
    fn test_extract_keyed_keeps_ids() {
        let ex = extractor(8, 2);
        let rows = vec![
            (RowId::new("b"), fingerprint(2, 8)),
            (RowId::new("a"), fingerprint(1, 8)),
            (RowId::new("c"), fingerprint(3, 8)),
        ];
        let out = ex.extract_keyed(rows).unwrap();
        let ids: Vec<&str> = out.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_from_checkpoint_matches_learner_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("best.safetensors");
        let learner = RepresentationLearner::new(12, LearnerConfig::default(), Device::Cpu).unwrap();
        learner.save_checkpoint(&path).unwrap();

        let loaded = FeatureExtractor::from_checkpoint(&path, Device::Cpu, 4).unwrap();
        let direct = learner.into_extractor().unwrap();
        let fps: Vec<Fingerprint> = (0..3).map(|i| fingerprint(i, 12)).collect();
        assert_eq!(loaded.extract(&fps).unwrap(), direct.extract(&fps).unwrap());
    }

    #[test]
    fn test_from_checkpoint_missing_file() {
        let err = FeatureExtractor::from_checkpoint("/nonexistent/best.safetensors", Device::Cpu, 4)
            .unwrap_err();
        assert!(matches!(err, LearnError::Io(_)));
    }
}

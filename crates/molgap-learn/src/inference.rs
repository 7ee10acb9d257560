//! Inference Pipeline: descriptor → fingerprint → latent → prediction.
//!
//! Malformed descriptors are rejected per row and reported; they never
//! produce a prediction.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use molgap_chem::{FingerprintEncoder, MalformedPolicy, RejectedRow, RowId};

use crate::dataset::MoleculeRecord;
use crate::error::{LearnError, LearnResult};
use crate::extractor::FeatureExtractor;
use crate::regressor::Regressor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: RowId,
    pub prediction: f64,
}

/// Predictions in input order, plus the rows that could not be encoded.
#[derive(Debug, Clone, Default)]
pub struct InferenceOutput {
    pub predictions: Vec<Prediction>,
    pub rejected: Vec<RejectedRow>,
}

impl InferenceOutput {
    /// Write `id,prediction` rows. The header is written even when there
    /// are no predictions.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> LearnResult<()> {
        let path = path.as_ref();
        let csv_error = |e: csv::Error| LearnError::Csv {
            source_name: path.display().to_string(),
            message: e.to_string(),
        };
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(csv_error)?;
        writer.write_record(["id", "prediction"]).map_err(csv_error)?;
        for p in &self.predictions {
            writer.serialize(p).map_err(csv_error)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Frozen fingerprint encoder, feature extractor and production regressor.
pub struct InferencePipeline {
    encoder: FingerprintEncoder,
    extractor: FeatureExtractor,
    regressor: Box<dyn Regressor>,
}

impl InferencePipeline {
    /// # Errors
    /// - `LearnError::ShapeMismatch` if the encoder width differs from the
    ///   extractor width
    /// - `LearnError::NotFitted` if the regressor has not been fit
    pub fn new(
        encoder: FingerprintEncoder,
        extractor: FeatureExtractor,
        regressor: Box<dyn Regressor>,
    ) -> LearnResult<Self> {
        if encoder.output_len() != extractor.dim() {
            return Err(LearnError::ShapeMismatch {
                context: "inference fingerprint width",
                expected: extractor.dim(),
                actual: encoder.output_len(),
            });
        }
        if !regressor.is_fitted() {
            return Err(LearnError::NotFitted {
                kind: regressor.kind().as_str(),
            });
        }
        Ok(Self {
            encoder,
            extractor,
            regressor,
        })
    }

    pub fn predict(&self, records: &[MoleculeRecord]) -> LearnResult<InferenceOutput> {
        let rows: Vec<(RowId, String)> = records
            .iter()
            .map(|r| (r.id.clone(), r.smiles.clone()))
            .collect();
        self.predict_rows(&rows)
    }

    /// Predict for `(id, descriptor)` pairs.
    pub fn predict_rows<S>(&self, rows: &[(RowId, S)]) -> LearnResult<InferenceOutput>
    where
        S: AsRef<str> + Sync,
    {
        let batch = self.encoder.encode_all(rows, MalformedPolicy::Skip)?;
        for rejected in &batch.rejected {
            warn!(row = %rejected.id, error = %rejected.error, "No prediction for malformed row");
        }

        let (ids, fingerprints): (Vec<RowId>, Vec<_>) = batch.encoded.into_iter().unzip();
        let predictions = if fingerprints.is_empty() {
            Vec::new()
        } else {
            let latents = self.extractor.extract(&fingerprints)?;
            let values = self.regressor.predict(&latents)?;
            ids.into_iter()
                .zip(values)
                .map(|(id, prediction)| Prediction { id, prediction })
                .collect()
        };

        info!(
            predicted = predictions.len(),
            rejected = batch.rejected.len(),
            "Inference complete"
        );
        Ok(InferenceOutput {
            predictions,
            rejected: batch.rejected,
        })
    }
}

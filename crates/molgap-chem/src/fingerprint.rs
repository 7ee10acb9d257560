//! Fingerprint Encoder: descriptor to fixed-length binary vector.
//!
//! # Layout
//!
//! ```text
//! [0 .. 167)            substructure keys (bit 0 reserved, always 0)
//! [167 .. 167 + width)  circular environment bits
//! ```
//!
//! The layout is fixed so that feature indices mean the same thing during
//! training and inference.

use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::circular::circular_bits;
use crate::error::{ChemError, ChemResult};
use crate::keys::{key_bits, SUBSTRUCTURE_KEY_COUNT};
use crate::smiles::parse_smiles;

/// Stable identifier of a dataset row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier synthesized from a 0-based data row index.
    pub fn from_index(index: usize) -> Self {
        Self(format!("row-{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Binary fingerprint, one `0`/`1` byte per bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    /// Wrap raw bits; any non-zero value is stored as `1`.
    pub fn from_bits(bits: impl IntoIterator<Item = u8>) -> Self {
        Self(bits.into_iter().map(|b| u8::from(b != 0)).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bits(&self) -> &[u8] {
        &self.0
    }

    pub fn popcount(&self) -> usize {
        self.0.iter().filter(|&&b| b == 1).count()
    }

    /// Tanimoto similarity; two empty fingerprints are identical.
    ///
    /// # Errors
    /// `ChemError::InvalidParameter` when the lengths differ.
    pub fn tanimoto(&self, other: &Fingerprint) -> ChemResult<f64> {
        if self.len() != other.len() {
            return Err(ChemError::InvalidParameter {
                name: "other",
                message: format!(
                    "fingerprint length {} does not match {}",
                    other.len(),
                    self.len()
                ),
            });
        }
        let both = self
            .0
            .iter()
            .zip(&other.0)
            .filter(|&(&a, &b)| a == 1 && b == 1)
            .count();
        let union = self.popcount() + other.popcount() - both;
        if union == 0 {
            Ok(1.0)
        } else {
            Ok(both as f64 / union as f64)
        }
    }

    /// Bits as `f32` features.
    pub fn to_f32(&self) -> Vec<f32> {
        self.0.iter().map(|&b| b as f32).collect()
    }
}

/// What to do with a descriptor that fails to parse during batch encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Drop the row, log it, and report it in [`BatchEncoding::rejected`].
    #[default]
    Skip,
    /// Fail the whole batch on the first malformed row.
    Abort,
}

/// A row dropped from a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    pub id: RowId,
    pub error: ChemError,
}

/// Result of encoding a batch of rows. Both lists keep input order.
#[derive(Debug, Clone, Default)]
pub struct BatchEncoding {
    pub encoded: Vec<(RowId, Fingerprint)>,
    pub rejected: Vec<RejectedRow>,
}

/// Deterministic descriptor encoder parameterised by circular radius and width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintEncoder {
    radius: usize,
    width: usize,
}

impl FingerprintEncoder {
    pub fn new(radius: usize, width: usize) -> ChemResult<Self> {
        if radius < 1 {
            return Err(ChemError::InvalidParameter {
                name: "radius",
                message: format!("must be >= 1, got {radius}"),
            });
        }
        if width < 1 {
            return Err(ChemError::InvalidParameter {
                name: "width",
                message: format!("must be >= 1, got {width}"),
            });
        }
        Ok(Self { radius, width })
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Length of every fingerprint this encoder produces.
    pub fn output_len(&self) -> usize {
        SUBSTRUCTURE_KEY_COUNT + self.width
    }

    pub fn encode(&self, descriptor: &str) -> ChemResult<Fingerprint> {
        let mol = parse_smiles(descriptor)?;
        let mut bits = key_bits(&mol);
        bits.extend(circular_bits(&mol, self.radius, self.width));
        debug_assert_eq!(bits.len(), self.output_len());
        Ok(Fingerprint(bits))
    }

    /// Encode rows in parallel, preserving input order.
    pub fn encode_all<S>(
        &self,
        rows: &[(RowId, S)],
        policy: MalformedPolicy,
    ) -> ChemResult<BatchEncoding>
    where
        S: AsRef<str> + Sync,
    {
        let results: Vec<ChemResult<Fingerprint>> = rows
            .par_iter()
            .map(|(_, descriptor)| self.encode(descriptor.as_ref()))
            .collect();

        let mut batch = BatchEncoding::default();
        for ((id, _), result) in rows.iter().zip(results) {
            match result {
                Ok(fp) => batch.encoded.push((id.clone(), fp)),
                Err(error) => match policy {
                    MalformedPolicy::Abort => return Err(error),
                    MalformedPolicy::Skip => {
                        warn!(row = %id, error = %error, "Skipping malformed descriptor");
                        batch.rejected.push(RejectedRow {
                            id: id.clone(),
                            error,
                        });
                    }
                },
            }
        }

        debug!(
            encoded = batch.encoded.len(),
            rejected = batch.rejected.len(),
            "Encoded batch"
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_zero_parameters() {
        assert!(matches!(
            FingerprintEncoder::new(0, 16),
            Err(ChemError::InvalidParameter { name: "radius", .. })
        ));
        assert!(matches!(
            FingerprintEncoder::new(2, 0),
            Err(ChemError::InvalidParameter { name: "width", .. })
        ));
    }

    #[test]
    fn test_encode_length_and_reserved_bit() {
        let encoder = FingerprintEncoder::new(2, 2000).unwrap();
        let fp = encoder.encode("c1ccccc1O").unwrap();
        assert_eq!(fp.len(), 2167);
        assert_eq!(fp.bits()[0], 0);
        assert!(fp.popcount() > 0);
    }

    #[test]
    fn test_tanimoto() {
        let encoder = FingerprintEncoder::new(2, 256).unwrap();
        let a = encoder.encode("CCO").unwrap();
        let b = encoder.encode("CCCO").unwrap();
        assert_eq!(a.tanimoto(&a).unwrap(), 1.0);
        let sim = a.tanimoto(&b).unwrap();
        assert!(sim > 0.0 && sim < 1.0);
    }

    #[test]
    fn test_tanimoto_rejects_different_lengths() {
        let short = Fingerprint::from_bits(vec![1, 1, 0]);
        let long = Fingerprint::from_bits(vec![1, 1, 0, 1]);
        let err = short.tanimoto(&long).unwrap_err();
        assert!(matches!(err, ChemError::InvalidParameter { name: "other", .. }));
        assert!(err.to_string().contains("4 does not match 3"));
    }

    #[test]
    fn test_malformed_policy_deserializes_lowercase() {
        let policy: MalformedPolicy = serde_json::from_str("\"abort\"").unwrap();
        assert_eq!(policy, MalformedPolicy::Abort);
        assert_eq!(MalformedPolicy::default(), MalformedPolicy::Skip);
    }

    #[test]
    fn test_row_id_from_index() {
        assert_eq!(RowId::from_index(3).as_str(), "row-3");
        assert_eq!(serde_json::to_string(&RowId::new("m1")).unwrap(), "\"m1\"");
    }
}

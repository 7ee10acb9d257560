//! Row-id keyed molecule tables, seeded splits and mini-batch loading.
//!
//! Every row carries a stable [`RowId`]; stages join features and labels by
//! id, never by position.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use molgap_chem::RowId;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::config::DataConfig;
use crate::error::{LearnError, LearnResult};

/// One dataset row.
#[derive(Debug, Clone, PartialEq)]
pub struct MoleculeRecord {
    pub id: RowId,
    pub smiles: String,
    pub label: Option<f64>,
}

impl MoleculeRecord {
    pub fn new(id: impl Into<String>, smiles: impl Into<String>, label: Option<f64>) -> Self {
        Self {
            id: RowId::new(id),
            smiles: smiles.into(),
            label,
        }
    }
}

/// Samples joined by row id. The three vectors are parallel.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSamples<T> {
    pub ids: Vec<RowId>,
    pub inputs: Vec<T>,
    pub labels: Vec<f64>,
}

impl<T> LabeledSamples<T> {
    /// Build samples from parallel vectors.
    ///
    /// # Errors
    /// `LearnError::ShapeMismatch` unless all three vectors have one entry
    /// per id.
    pub fn new(ids: Vec<RowId>, inputs: Vec<T>, labels: Vec<f64>) -> LearnResult<Self> {
        let samples = Self { ids, inputs, labels };
        samples.check_lengths()?;
        Ok(samples)
    }

    /// Verify the parallel vectors still line up.
    pub fn check_lengths(&self) -> LearnResult<()> {
        if self.inputs.len() != self.ids.len() {
            return Err(LearnError::ShapeMismatch {
                context: "sample inputs per id",
                expected: self.ids.len(),
                actual: self.inputs.len(),
            });
        }
        if self.labels.len() != self.ids.len() {
            return Err(LearnError::ShapeMismatch {
                context: "sample labels per id",
                expected: self.ids.len(),
                actual: self.labels.len(),
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Ordered table of molecules with a unique-id index.
#[derive(Debug, Clone)]
pub struct MoleculeTable {
    name: String,
    records: Vec<MoleculeRecord>,
    index: HashMap<RowId, usize>,
}

impl MoleculeTable {
    /// Build a table; fails on duplicate row ids.
    pub fn from_records(name: impl Into<String>, records: Vec<MoleculeRecord>) -> LearnResult<Self> {
        let name = name.into();
        let mut index = HashMap::with_capacity(records.len());
        for (pos, record) in records.iter().enumerate() {
            if index.insert(record.id.clone(), pos).is_some() {
                return Err(LearnError::DuplicateRowId {
                    id: record.id.to_string(),
                    source_name: name,
                });
            }
        }
        Ok(Self {
            name,
            records,
            index,
        })
    }

    /// Load a CSV table. When `require_labels` is set every row must carry a
    /// numeric label.
    pub fn from_csv_path(
        path: impl AsRef<Path>,
        columns: &DataConfig,
        require_labels: bool,
    ) -> LearnResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let table = Self::from_csv_reader(file, path.display().to_string(), columns, require_labels)?;
        info!(
            table = %table.name,
            rows = table.len(),
            "Loaded molecule table"
        );
        Ok(table)
    }

    pub fn from_csv_reader<R: Read>(
        reader: R,
        name: impl Into<String>,
        columns: &DataConfig,
        require_labels: bool,
    ) -> LearnResult<Self> {
        let name = name.into();
        let csv_error = |e: csv::Error| LearnError::Csv {
            source_name: name.clone(),
            message: e.to_string(),
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = reader.headers().map_err(csv_error)?.clone();

        let find = |column: &str| headers.iter().position(|h| h == column);
        let smiles_col = find(&columns.smiles_column).ok_or_else(|| LearnError::MissingColumn {
            column: columns.smiles_column.clone(),
            source_name: name.clone(),
        })?;
        let id_col = find(&columns.id_column);
        let label_col = find(&columns.label_column);
        if require_labels && label_col.is_none() {
            return Err(LearnError::MissingColumn {
                column: columns.label_column.clone(),
                source_name: name.clone(),
            });
        }

        let mut records = Vec::new();
        let mut row = StringRecord::new();
        let mut n = 0;
        while reader.read_record(&mut row).map_err(csv_error)? {
            let id = match id_col.and_then(|c| row.get(c)) {
                Some(id) if !id.is_empty() => RowId::new(id),
                _ => RowId::from_index(n),
            };
            let smiles = row.get(smiles_col).unwrap_or_default().to_string();
            let label = match label_col.and_then(|c| row.get(c)) {
                Some(cell) if !cell.is_empty() => {
                    Some(cell.parse::<f64>().map_err(|e| LearnError::Csv {
                        source_name: name.clone(),
                        message: format!("row '{id}': label '{cell}' is not a number: {e}"),
                    })?)
                }
                _ => None,
            };
            if require_labels && label.is_none() {
                return Err(LearnError::MissingLabel { id: id.to_string() });
            }
            records.push(MoleculeRecord { id, smiles, label });
            n += 1;
        }

        debug!(table = %name, rows = records.len(), "Parsed CSV rows");
        Self::from_records(name, records)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[MoleculeRecord] {
        &self.records
    }

    pub fn get(&self, id: &RowId) -> Option<&MoleculeRecord> {
        self.index.get(id).map(|&pos| &self.records[pos])
    }

    pub fn label(&self, id: &RowId) -> LearnResult<f64> {
        self.get(id)
            .and_then(|r| r.label)
            .ok_or_else(|| LearnError::MissingLabel { id: id.to_string() })
    }

    /// `(id, smiles)` pairs in table order.
    pub fn descriptor_rows(&self) -> Vec<(RowId, String)> {
        self.records
            .iter()
            .map(|r| (r.id.clone(), r.smiles.clone()))
            .collect()
    }

    /// Attach labels to id-keyed inputs, preserving input order.
    pub fn join<T>(&self, keyed: Vec<(RowId, T)>) -> LearnResult<LabeledSamples<T>> {
        let mut ids = Vec::with_capacity(keyed.len());
        let mut inputs = Vec::with_capacity(keyed.len());
        let mut labels = Vec::with_capacity(keyed.len());
        for (id, input) in keyed {
            labels.push(self.label(&id)?);
            ids.push(id);
            inputs.push(input);
        }
        LabeledSamples::new(ids, inputs, labels)
    }
}

/// Deterministically split `n` indices into `(fit, held_out)`.
///
/// The held-out size is `ceil(n * fraction)`, kept within `1..n` so both
/// parts are non-empty.
pub fn seeded_split(n: usize, fraction: f64, seed: u64) -> LearnResult<(Vec<usize>, Vec<usize>)> {
    if n < 2 {
        return Err(LearnError::EmptyDataset {
            context: format!("need at least 2 rows to split, got {n}"),
        });
    }
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let held_count = ((n as f64 * fraction).ceil() as usize).clamp(1, n - 1);
    let held_out = indices.split_off(n - held_count);
    Ok((indices, held_out))
}

/// Shuffling mini-batch index loader.
pub struct BatchLoader {
    indices: Vec<usize>,
    batch_size: usize,
    position: usize,
    rng: StdRng,
}

impl BatchLoader {
    pub fn new(indices: Vec<usize>, batch_size: usize, seed: u64) -> Self {
        Self {
            indices,
            batch_size: batch_size.max(1),
            position: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }

    /// Shuffle indices for a new epoch.
    pub fn shuffle_epoch(&mut self) {
        self.indices.shuffle(&mut self.rng);
        self.position = 0;
    }

    /// Next batch of indices, or `None` once the epoch is exhausted.
    pub fn next_batch(&mut self) -> Option<&[usize]> {
        if self.position >= self.indices.len() {
            return None;
        }
        let start = self.position;
        let end = (start + self.batch_size).min(self.indices.len());
        self.position = end;
        Some(&self.indices[start..end])
    }
}

//! `molgap fingerprint`: encode descriptors and print one JSON line each.

use std::collections::HashMap;

use clap::Args;
use serde::Serialize;
use tracing::error;

use molgap_chem::{BatchEncoding, FingerprintEncoder, MalformedPolicy, RowId};
use molgap_learn::LearnError;

use crate::error::{exit_code_for_error, CliExitCode};

#[derive(Args, Debug)]
pub struct FingerprintArgs {
    /// SMILES descriptors to encode
    #[arg(required = true)]
    pub smiles: Vec<String>,

    /// Circular environment radius
    #[arg(long, default_value = "2")]
    pub radius: usize,

    /// Number of circular bits
    #[arg(long, default_value = "2000")]
    pub width: usize,

    /// Include indices of set bits
    #[arg(long)]
    pub bits: bool,
}

#[derive(Debug, Serialize)]
struct FingerprintLine<'a> {
    smiles: &'a str,
    length: usize,
    popcount: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    on_bits: Option<Vec<usize>>,
}

/// One line per encoded row, matched back to its descriptor by id.
fn summary_lines<'a>(
    rows: &'a [(RowId, &'a str)],
    batch: &BatchEncoding,
    with_bits: bool,
) -> Vec<FingerprintLine<'a>> {
    let descriptors: HashMap<&RowId, &str> = rows.iter().map(|(id, s)| (id, *s)).collect();
    batch
        .encoded
        .iter()
        .map(|(id, fp)| FingerprintLine {
            smiles: descriptors.get(id).copied().unwrap_or_default(),
            length: fp.len(),
            popcount: fp.popcount(),
            on_bits: with_bits.then(|| {
                fp.bits()
                    .iter()
                    .enumerate()
                    .filter(|&(_, &b)| b != 0)
                    .map(|(i, _)| i)
                    .collect()
            }),
        })
        .collect()
}

pub fn handle_fingerprint(args: FingerprintArgs) -> i32 {
    let encoder = match FingerprintEncoder::new(args.radius, args.width) {
        Ok(encoder) => encoder,
        Err(e) => {
            error!(error = %e, "Invalid fingerprint parameters");
            return exit_code_for_error(&LearnError::from(e)).into();
        }
    };

    let rows: Vec<(RowId, &str)> = args
        .smiles
        .iter()
        .enumerate()
        .map(|(i, s)| (RowId::from_index(i), s.as_str()))
        .collect();
    let batch = match encoder.encode_all(&rows, MalformedPolicy::Skip) {
        Ok(batch) => batch,
        Err(e) => {
            error!(error = %e, "Fingerprinting failed");
            return exit_code_for_error(&LearnError::from(e)).into();
        }
    };

    for line in summary_lines(&rows, &batch, args.bits) {
        match serde_json::to_string(&line) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!(error = %e, "Failed to serialize fingerprint");
                return CliExitCode::Failure.into();
            }
        }
    }

    if batch.rejected.is_empty() {
        CliExitCode::Success.into()
    } else {
        error!(rejected = batch.rejected.len(), "Some descriptors could not be encoded");
        CliExitCode::Failure.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(smiles: &[&str], width: usize) -> FingerprintArgs {
        FingerprintArgs {
            smiles: smiles.iter().map(|s| s.to_string()).collect(),
            radius: 2,
            width,
            bits: true,
        }
    }

    #[test]
    fn test_valid_descriptors_exit_0() {
        assert_eq!(handle_fingerprint(args(&["CCO", "c1ccccc1"], 64)), 0);
    }

    #[test]
    fn test_malformed_descriptor_exits_1() {
        assert_eq!(handle_fingerprint(args(&["CCO", "C1CC("], 64)), 1);
    }

    #[test]
    fn test_lines_follow_their_descriptor_past_rejected_rows() {
        let encoder = FingerprintEncoder::new(2, 64).unwrap();
        let rows: Vec<(RowId, &str)> = ["CCO", "C1CC(", "c1ccccc1", "CCN"]
            .into_iter()
            .enumerate()
            .map(|(i, s)| (RowId::from_index(i), s))
            .collect();
        let batch = encoder.encode_all(&rows, MalformedPolicy::Skip).unwrap();

        let lines = summary_lines(&rows, &batch, false);
        let smiles: Vec<&str> = lines.iter().map(|l| l.smiles).collect();
        assert_eq!(smiles, vec!["CCO", "c1ccccc1", "CCN"]);
        assert!(lines.iter().all(|l| l.length == 167 + 64 && l.on_bits.is_none()));
    }

    #[test]
    fn test_zero_width_exits_2() {
        assert_eq!(handle_fingerprint(args(&["CCO"], 0)), 2);
    }
}

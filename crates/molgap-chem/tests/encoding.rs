//! Batch encoding behavior across the public API.

use molgap_chem::{ChemError, FingerprintEncoder, MalformedPolicy, RowId, SUBSTRUCTURE_KEY_COUNT};

fn rows(items: &[(&str, &str)]) -> Vec<(RowId, String)> {
    items
        .iter()
        .map(|(id, smiles)| (RowId::new(*id), smiles.to_string()))
        .collect()
}

#[test]
fn test_encode_is_deterministic() {
    let encoder = FingerprintEncoder::new(2, 2000).unwrap();
    for smiles in ["CCO", "c1ccc2ccccc2c1", "OC(=O)[C@@H](N)Cc1ccccc1", "[Na+].[Cl-]"] {
        let first = encoder.encode(smiles).unwrap();
        let second = encoder.encode(smiles).unwrap();
        assert_eq!(first, second, "fingerprint of {smiles} changed between calls");
    }
}

#[test]
fn test_length_follows_width() {
    for width in [1, 64, 2000] {
        let encoder = FingerprintEncoder::new(3, width).unwrap();
        let fp = encoder.encode("CC(C)Cc1ccc(cc1)C(C)C(=O)O").unwrap();
        assert_eq!(fp.len(), SUBSTRUCTURE_KEY_COUNT + width);
        assert_eq!(encoder.output_len(), fp.len());
    }
}

#[test]
fn test_radius_changes_circular_bits_only() {
    let small = FingerprintEncoder::new(1, 512).unwrap();
    let large = FingerprintEncoder::new(3, 512).unwrap();
    let a = small.encode("CCCCCCO").unwrap();
    let b = large.encode("CCCCCCO").unwrap();
    assert_eq!(a.bits()[..SUBSTRUCTURE_KEY_COUNT], b.bits()[..SUBSTRUCTURE_KEY_COUNT]);
    assert!(b.popcount() > a.popcount());
}

#[test]
fn test_malformed_descriptor_is_an_error_not_zeros() {
    let encoder = FingerprintEncoder::new(2, 128).unwrap();
    let err = encoder.encode("C1CC(").unwrap_err();
    assert!(matches!(err, ChemError::MalformedInput { ref descriptor, .. } if descriptor == "C1CC("));
}

#[test]
fn test_encode_all_preserves_order_and_skips() {
    let encoder = FingerprintEncoder::new(2, 256).unwrap();
    let input = rows(&[
        ("a", "CCO"),
        ("b", "not-a-molecule"),
        ("c", "c1ccccc1"),
        ("d", "CC(=O)O"),
    ]);
    let batch = encoder.encode_all(&input, MalformedPolicy::Skip).unwrap();

    let ids: Vec<&str> = batch.encoded.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c", "d"]);
    assert_eq!(batch.rejected.len(), 1);
    assert_eq!(batch.rejected[0].id.as_str(), "b");

    for (id, fp) in &batch.encoded {
        let smiles = &input.iter().find(|(row, _)| row == id).unwrap().1;
        assert_eq!(fp, &encoder.encode(smiles).unwrap());
    }
}

#[test]
fn test_encode_all_abort_fails_on_first_malformed() {
    let encoder = FingerprintEncoder::new(2, 256).unwrap();
    let input = rows(&[("a", "CCO"), ("b", "C(("), ("c", "C1CC")]);
    let err = encoder.encode_all(&input, MalformedPolicy::Abort).unwrap_err();
    assert!(matches!(err, ChemError::MalformedInput { ref descriptor, .. } if descriptor == "C(("));
}

#[test]
fn test_encode_all_large_batch_matches_sequential() {
    let encoder = FingerprintEncoder::new(2, 1024).unwrap();
    let input: Vec<(RowId, String)> = (1..200)
        .map(|n| (RowId::from_index(n), format!("{}O", "C".repeat(n % 12 + 1))))
        .collect();
    let batch = encoder.encode_all(&input, MalformedPolicy::Abort).unwrap();
    assert_eq!(batch.encoded.len(), input.len());
    for ((id, fp), (row, smiles)) in batch.encoded.iter().zip(&input) {
        assert_eq!(id, row);
        assert_eq!(fp, &encoder.encode(smiles).unwrap());
    }
}

#[test]
fn test_hydrogen_overflow_is_rejected_not_truncated() {
    let encoder = FingerprintEncoder::new(2, 128).unwrap();
    for smiles in ["[CH300]", "[CH255][H]"] {
        assert!(matches!(
            encoder.encode(smiles),
            Err(ChemError::MalformedInput { .. })
        ));
    }
    assert_ne!(encoder.encode("[CH44]").ok(), encoder.encode("[CH300]").ok());
}

#[test]
fn test_hydrogen_overflow_under_both_policies() {
    let encoder = FingerprintEncoder::new(2, 128).unwrap();
    let input = rows(&[("a", "CCO"), ("b", "[CH255][H]"), ("c", "[CH300]"), ("d", "CCN")]);

    let batch = encoder.encode_all(&input, MalformedPolicy::Skip).unwrap();
    let kept: Vec<&str> = batch.encoded.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(kept, vec!["a", "d"]);
    let rejected: Vec<&str> = batch.rejected.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(rejected, vec!["b", "c"]);

    let err = encoder.encode_all(&input, MalformedPolicy::Abort).unwrap_err();
    assert!(matches!(err, ChemError::MalformedInput { ref descriptor, .. } if descriptor == "[CH255][H]"));
}

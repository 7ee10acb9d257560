//! Circular (Morgan-style) substructure hashing.
//!
//! Every heavy atom starts from a hash of its local invariants. Each
//! iteration folds in the sorted identifiers of its bonded neighbors, so
//! after `r` iterations an identifier describes the environment within
//! radius `r`. All identifiers from iterations `0..=radius` are folded
//! into `width` bits by modulo.

use xxhash_rust::xxh64::xxh64;

use crate::molecule::Molecule;

const SEED: u64 = 0x6d6f_6c67_6170;

fn atom_invariant(mol: &Molecule, idx: usize) -> u64 {
    let atom = mol.atom(idx);
    let mut buf = Vec::with_capacity(16);
    buf.push(atom.element);
    buf.extend_from_slice(&(mol.heavy_degree(idx) as u32).to_le_bytes());
    buf.push(mol.total_hydrogens(idx));
    buf.push(atom.charge as u8);
    buf.extend_from_slice(&atom.isotope.unwrap_or(0).to_le_bytes());
    buf.push(mol.in_ring(idx) as u8);
    buf.push(atom.aromatic as u8);
    xxh64(&buf, SEED)
}

/// Environment identifiers for every heavy atom at every radius.
pub fn environment_ids(mol: &Molecule, radius: usize) -> Vec<u64> {
    let heavy: Vec<usize> = (0..mol.atoms().len())
        .filter(|&idx| mol.atom(idx).is_heavy())
        .collect();

    let mut current = vec![0u64; mol.atoms().len()];
    for &idx in &heavy {
        current[idx] = atom_invariant(mol, idx);
    }

    let mut ids: Vec<u64> = heavy.iter().map(|&idx| current[idx]).collect();

    for iteration in 1..=radius {
        let mut next = current.clone();
        for &idx in &heavy {
            let mut env: Vec<(u8, u64)> = mol
                .heavy_neighbors(idx)
                .map(|(nbr, bond)| (bond.order.code(), current[nbr]))
                .collect();
            env.sort_unstable();

            let mut buf = Vec::with_capacity(16 + env.len() * 9);
            buf.extend_from_slice(&(iteration as u32).to_le_bytes());
            buf.extend_from_slice(&current[idx].to_le_bytes());
            for (code, id) in env {
                buf.push(code);
                buf.extend_from_slice(&id.to_le_bytes());
            }
            next[idx] = xxh64(&buf, SEED);
        }
        current = next;
        ids.extend(heavy.iter().map(|&idx| current[idx]));
    }

    ids
}

/// Fold environment identifiers into a `width`-bit vector.
pub fn circular_bits(mol: &Molecule, radius: usize, width: usize) -> Vec<u8> {
    let mut bits = vec![0u8; width];
    if width == 0 {
        return bits;
    }
    for id in environment_ids(mol, radius) {
        bits[(id % width as u64) as usize] = 1;
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse_smiles;

    #[test]
    fn test_ids_per_radius() {
        let mol = parse_smiles("CCO").unwrap();
        assert_eq!(environment_ids(&mol, 0).len(), 3);
        assert_eq!(environment_ids(&mol, 2).len(), 9);
    }

    #[test]
    fn test_symmetric_atoms_share_ids() {
        let mol = parse_smiles("c1ccccc1").unwrap();
        let ids = environment_ids(&mol, 2);
        assert_eq!(ids.len(), 18);
        let distinct: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn test_explicit_hydrogens_do_not_change_ids() {
        let implicit = parse_smiles("C").unwrap();
        let explicit = parse_smiles("[H]C([H])([H])[H]").unwrap();
        assert_eq!(environment_ids(&implicit, 2), environment_ids(&explicit, 2));
    }

    #[test]
    fn test_bits_differ_between_isomers() {
        let ethanol = parse_smiles("CCO").unwrap();
        let ether = parse_smiles("COC").unwrap();
        assert_ne!(circular_bits(&ethanol, 2, 2048), circular_bits(&ether, 2, 2048));
    }

    #[test]
    fn test_bits_are_binary_and_sized() {
        let mol = parse_smiles("CC(=O)Nc1ccc(O)cc1").unwrap();
        let bits = circular_bits(&mol, 3, 64);
        assert_eq!(bits.len(), 64);
        assert!(bits.iter().all(|&b| b <= 1));
        assert!(bits.iter().any(|&b| b == 1));
    }
}

//! Fixed catalogue of structural keys.
//!
//! The catalogue holds 166 patterns. Key `i` of the catalogue sets bit
//! `i + 1` of the key block; bit 0 is reserved and always clear, giving a
//! block of [`SUBSTRUCTURE_KEY_COUNT`] bits. The order of the catalogue
//! defines feature indices and must never change between training and
//! inference.

use std::sync::OnceLock;

use crate::element::{self, CARBON, HYDROGEN, NITROGEN, OXYGEN, SULFUR};
use crate::molecule::{BondOrder, Molecule};

/// Width of the key block, including the reserved bit 0.
pub const SUBSTRUCTURE_KEY_COUNT: usize = 167;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementQuery {
    Any,
    Is(u8),
    /// Neither carbon nor hydrogen.
    Hetero,
    Halogen,
}

impl ElementQuery {
    fn matches(&self, z: u8) -> bool {
        match self {
            ElementQuery::Any => true,
            ElementQuery::Is(e) => *e == z,
            ElementQuery::Hetero => z != CARBON && z != HYDROGEN && z != element::WILDCARD,
            ElementQuery::Halogen => element::is_halogen(z),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeQuery {
    Any,
    Positive,
    Negative,
}

/// Constraints on a single atom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomQuery {
    pub element: ElementQuery,
    pub aromatic: Option<bool>,
    pub in_ring: Option<bool>,
    pub min_hydrogens: u8,
    pub max_hydrogens: Option<u8>,
    pub min_degree: usize,
    pub charge: ChargeQuery,
}

impl AtomQuery {
    pub fn element(element: ElementQuery) -> Self {
        Self {
            element,
            aromatic: None,
            in_ring: None,
            min_hydrogens: 0,
            max_hydrogens: None,
            min_degree: 0,
            charge: ChargeQuery::Any,
        }
    }

    pub fn is(z: u8) -> Self {
        Self::element(ElementQuery::Is(z))
    }

    pub fn aromatic(mut self, aromatic: bool) -> Self {
        self.aromatic = Some(aromatic);
        self
    }

    pub fn ring(mut self, in_ring: bool) -> Self {
        self.in_ring = Some(in_ring);
        self
    }

    pub fn hydrogens(mut self, min: u8, max: Option<u8>) -> Self {
        self.min_hydrogens = min;
        self.max_hydrogens = max;
        self
    }

    pub fn degree_at_least(mut self, degree: usize) -> Self {
        self.min_degree = degree;
        self
    }

    pub fn charged(mut self, charge: ChargeQuery) -> Self {
        self.charge = charge;
        self
    }

    fn matches(&self, mol: &Molecule, idx: usize) -> bool {
        let atom = mol.atom(idx);
        if !atom.is_heavy() || !self.element.matches(atom.element) {
            return false;
        }
        if self.aromatic.is_some_and(|a| a != atom.aromatic) {
            return false;
        }
        if self.in_ring.is_some_and(|r| r != mol.in_ring(idx)) {
            return false;
        }
        let h = mol.total_hydrogens(idx);
        if h < self.min_hydrogens || self.max_hydrogens.is_some_and(|max| h > max) {
            return false;
        }
        if mol.heavy_degree(idx) < self.min_degree {
            return false;
        }
        match self.charge {
            ChargeQuery::Any => true,
            ChargeQuery::Positive => atom.charge > 0,
            ChargeQuery::Negative => atom.charge < 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondQuery {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondQuery {
    fn matches(self, order: BondOrder) -> bool {
        matches!(
            (self, order),
            (BondQuery::Single, BondOrder::Single)
                | (BondQuery::Double, BondOrder::Double)
                | (BondQuery::Triple, BondOrder::Triple)
                | (BondQuery::Aromatic, BondOrder::Aromatic)
        )
    }
}

/// A center atom with distinct neighbors matching each arm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarPattern {
    pub center: AtomQuery,
    pub arms: Vec<(BondQuery, AtomQuery)>,
}

impl StarPattern {
    /// Number of atoms that can serve as the pattern center.
    pub fn count_matches(&self, mol: &Molecule) -> usize {
        (0..mol.atoms().len())
            .filter(|&idx| self.center.matches(mol, idx) && self.arms_match(mol, idx))
            .count()
    }

    fn arms_match(&self, mol: &Molecule, center: usize) -> bool {
        let neighbors: Vec<(usize, BondOrder)> = mol
            .heavy_neighbors(center)
            .map(|(nbr, bond)| (nbr, bond.order))
            .collect();
        let mut used = vec![false; neighbors.len()];
        self.assign(mol, &neighbors, &mut used, 0)
    }

    /// Backtracking injective assignment of arms to neighbors.
    fn assign(
        &self,
        mol: &Molecule,
        neighbors: &[(usize, BondOrder)],
        used: &mut [bool],
        arm: usize,
    ) -> bool {
        let Some((bond_query, atom_query)) = self.arms.get(arm) else {
            return true;
        };
        for (slot, &(nbr, order)) in neighbors.iter().enumerate() {
            if used[slot] || !bond_query.matches(order) || !atom_query.matches(mol, nbr) {
                continue;
            }
            used[slot] = true;
            if self.assign(mol, neighbors, used, arm + 1) {
                return true;
            }
            used[slot] = false;
        }
        false
    }
}

/// One structural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubstructureKey {
    Element { z: u8, at_least: usize },
    Halogens { at_least: usize },
    HeavyAtoms { at_least: usize },
    /// Smallest ring of the given size through some bond.
    Ring { size: usize, aromatic: bool },
    RingCount { at_least: usize },
    AromaticAtoms { at_least: usize },
    /// An atom shared between rings (three or more ring bonds).
    FusedRing,
    Charge { positive: bool },
    MultipleFragments,
    Isotope,
    Chirality,
    DirectionalBond,
    Star { pattern: StarPattern, at_least: usize },
}

impl SubstructureKey {
    pub fn is_present(&self, mol: &Molecule) -> bool {
        let heavy = || mol.atoms().iter().filter(|a| a.is_heavy());
        match self {
            SubstructureKey::Element { z, at_least } => {
                heavy().filter(|a| a.element == *z).count() >= *at_least
            }
            SubstructureKey::Halogens { at_least } => {
                heavy().filter(|a| element::is_halogen(a.element)).count() >= *at_least
            }
            SubstructureKey::HeavyAtoms { at_least } => mol.heavy_atom_count() >= *at_least,
            SubstructureKey::Ring { size, aromatic } => (0..mol.bonds().len())
                .filter_map(|b| mol.bond_ring(b))
                .any(|ring| ring.size == *size && (!*aromatic || ring.aromatic)),
            SubstructureKey::RingCount { at_least } => mol.ring_count() >= *at_least,
            SubstructureKey::AromaticAtoms { at_least } => {
                heavy().filter(|a| a.aromatic).count() >= *at_least
            }
            SubstructureKey::FusedRing => {
                (0..mol.atoms().len()).any(|idx| mol.ring_bond_count(idx) >= 3)
            }
            SubstructureKey::Charge { positive } => heavy().any(|a| {
                if *positive {
                    a.charge > 0
                } else {
                    a.charge < 0
                }
            }),
            SubstructureKey::MultipleFragments => mol.fragment_count() > 1,
            SubstructureKey::Isotope => mol.atoms().iter().any(|a| a.isotope.is_some()),
            SubstructureKey::Chirality => mol.atoms().iter().any(|a| a.chiral),
            SubstructureKey::DirectionalBond => mol.bonds().iter().any(|b| b.directional),
            SubstructureKey::Star { pattern, at_least } => pattern.count_matches(mol) >= *at_least,
        }
    }
}

/// The shared key catalogue.
pub fn catalogue() -> &'static [SubstructureKey] {
    static CATALOGUE: OnceLock<Vec<SubstructureKey>> = OnceLock::new();
    CATALOGUE.get_or_init(build_catalogue)
}

/// Evaluate every key; returns the full key block including reserved bit 0.
pub fn key_bits(mol: &Molecule) -> Vec<u8> {
    let mut bits = vec![0u8; SUBSTRUCTURE_KEY_COUNT];
    for (idx, key) in catalogue().iter().enumerate() {
        if key.is_present(mol) {
            bits[idx + 1] = 1;
        }
    }
    bits
}

fn star(center: AtomQuery, arms: Vec<(BondQuery, AtomQuery)>) -> SubstructureKey {
    SubstructureKey::Star {
        pattern: StarPattern { center, arms },
        at_least: 1,
    }
}

fn pair(a: u8, bond: BondQuery, b: u8) -> SubstructureKey {
    star(AtomQuery::is(a), vec![(bond, AtomQuery::is(b))])
}

fn build_catalogue() -> Vec<SubstructureKey> {
    use BondQuery::{Aromatic as Ar, Double as D, Single as S, Triple as T};
    use SubstructureKey as K;

    let c = || AtomQuery::is(CARBON);
    let n = || AtomQuery::is(NITROGEN);
    let o = || AtomQuery::is(OXYGEN);
    let s = || AtomQuery::is(SULFUR);
    let p = || AtomQuery::is(element::PHOSPHORUS);
    let hal = || AtomQuery::element(ElementQuery::Halogen);

    let mut keys = Vec::with_capacity(SUBSTRUCTURE_KEY_COUNT - 1);

    // Element presence.
    for z in [
        3, 4, 5, 7, 8, 9, 11, 12, 13, 14, 15, 16, 17, 19, 20, 26, 29, 30, 32, 33, 34, 35, 50, 53,
        80,
    ] {
        keys.push(K::Element { z, at_least: 1 });
    }

    // Element counts.
    for at_least in [2, 4, 6, 8, 10, 12, 16, 20] {
        keys.push(K::Element { z: CARBON, at_least });
    }
    for at_least in [2, 3, 4] {
        keys.push(K::Element { z: NITROGEN, at_least });
    }
    for at_least in [2, 3, 4, 5] {
        keys.push(K::Element { z: OXYGEN, at_least });
    }
    keys.push(K::Element { z: SULFUR, at_least: 2 });
    for at_least in [1, 2, 3] {
        keys.push(K::Halogens { at_least });
    }

    // Rings.
    for size in 3..=8 {
        keys.push(K::Ring { size, aromatic: false });
    }
    keys.push(K::Ring { size: 5, aromatic: true });
    keys.push(K::Ring { size: 6, aromatic: true });
    for at_least in [1, 2, 3, 4] {
        keys.push(K::RingCount { at_least });
    }
    for at_least in [1, 6, 10] {
        keys.push(K::AromaticAtoms { at_least });
    }
    keys.push(K::FusedRing);
    keys.push(star(n().ring(true), vec![]));
    keys.push(star(o().ring(true), vec![]));
    keys.push(star(s().ring(true), vec![]));
    keys.push(star(AtomQuery::element(ElementQuery::Hetero).aromatic(true), vec![]));

    // Bond pairs.
    for (a, bond, b) in [
        (CARBON, S, CARBON),
        (CARBON, D, CARBON),
        (CARBON, T, CARBON),
        (CARBON, Ar, CARBON),
        (CARBON, S, NITROGEN),
        (CARBON, D, NITROGEN),
        (CARBON, T, NITROGEN),
        (CARBON, Ar, NITROGEN),
        (CARBON, S, OXYGEN),
        (CARBON, D, OXYGEN),
        (CARBON, Ar, OXYGEN),
        (CARBON, S, SULFUR),
        (CARBON, D, SULFUR),
        (CARBON, Ar, SULFUR),
        (CARBON, S, element::FLUORINE),
        (CARBON, S, element::CHLORINE),
        (CARBON, S, element::BROMINE),
        (CARBON, S, element::IODINE),
        (CARBON, S, element::PHOSPHORUS),
        (CARBON, S, element::SILICON),
        (NITROGEN, S, NITROGEN),
        (NITROGEN, D, NITROGEN),
        (NITROGEN, Ar, NITROGEN),
        (NITROGEN, S, OXYGEN),
        (NITROGEN, D, OXYGEN),
        (OXYGEN, S, OXYGEN),
        (SULFUR, S, SULFUR),
        (SULFUR, S, OXYGEN),
        (SULFUR, D, OXYGEN),
        (element::PHOSPHORUS, S, OXYGEN),
        (element::PHOSPHORUS, D, OXYGEN),
        (NITROGEN, S, SULFUR),
        (element::BORON, S, OXYGEN),
        (element::SILICON, S, OXYGEN),
        (CARBON, S, element::BORON),
    ] {
        keys.push(pair(a, bond, b));
    }

    // Hydrogen-bearing groups.
    keys.push(star(o().hydrogens(1, None), vec![]));
    keys.push(star(n().hydrogens(2, None), vec![]));
    keys.push(star(n().hydrogens(1, Some(1)), vec![]));
    for at_least in [1, 2, 3] {
        keys.push(K::Star {
            pattern: StarPattern {
                center: c().hydrogens(3, None),
                arms: vec![],
            },
            at_least,
        });
    }
    keys.push(star(c().hydrogens(2, Some(2)).ring(false), vec![]));
    keys.push(star(s().hydrogens(1, None), vec![]));

    // Charge, topology and size.
    keys.push(K::Charge { positive: true });
    keys.push(K::Charge { positive: false });
    keys.push(star(AtomQuery::element(ElementQuery::Any).degree_at_least(3), vec![]));
    keys.push(star(AtomQuery::element(ElementQuery::Any).degree_at_least(4), vec![]));
    for at_least in [5, 10, 15, 20, 30, 40] {
        keys.push(K::HeavyAtoms { at_least });
    }
    keys.push(K::MultipleFragments);
    keys.push(K::Isotope);
    keys.push(K::Chirality);
    keys.push(K::DirectionalBond);

    // Functional groups.
    let groups: Vec<(AtomQuery, Vec<(BondQuery, AtomQuery)>)> = vec![
        // carboxylic acid
        (c(), vec![(D, o()), (S, o().hydrogens(1, None))]),
        // carboxylate
        (c(), vec![(D, o()), (S, o().charged(ChargeQuery::Negative))]),
        // ester
        (c(), vec![(D, o()), (S, o().degree_at_least(2)), (S, c())]),
        // amide
        (c(), vec![(D, o()), (S, n())]),
        // urea
        (c(), vec![(D, o()), (S, n()), (S, n())]),
        // carbamate
        (c(), vec![(D, o()), (S, n()), (S, o())]),
        // carbonate
        (c(), vec![(D, o()), (S, o()), (S, o())]),
        // ketone
        (c(), vec![(D, o()), (S, c()), (S, c())]),
        // aldehyde
        (c().hydrogens(1, None), vec![(D, o())]),
        // acyl halide
        (c(), vec![(D, o()), (S, hal())]),
        // dialkyl ether
        (o().aromatic(false), vec![(S, c()), (S, c())]),
        // aliphatic alcohol
        (o().hydrogens(1, None), vec![(S, c().aromatic(false))]),
        // phenol
        (o().hydrogens(1, None), vec![(S, c().aromatic(true))]),
        // primary amine
        (n().aromatic(false).hydrogens(2, None), vec![(S, c())]),
        // secondary amine
        (n().aromatic(false).hydrogens(1, Some(1)), vec![(S, c()), (S, c())]),
        // tertiary amine
        (n().aromatic(false).hydrogens(0, Some(0)), vec![(S, c()), (S, c()), (S, c())]),
        // aryl amine
        (n().aromatic(false), vec![(S, c().aromatic(true))]),
        // oxime
        (n(), vec![(D, c()), (S, o())]),
        // nitro
        (n(), vec![(D, o()), (S, o())]),
        // isocyanate
        (c(), vec![(D, n()), (D, o())]),
        // sulfonamide
        (s(), vec![(D, o()), (D, o()), (S, n())]),
        // sulfone
        (s(), vec![(D, o()), (D, o()), (S, c()), (S, c())]),
        // sulfonic acid or ester
        (s(), vec![(D, o()), (D, o()), (S, o())]),
        // sulfoxide
        (s(), vec![(D, o()), (S, c()), (S, c())]),
        // thioether
        (s().aromatic(false).hydrogens(0, Some(0)), vec![(S, c()), (S, c())]),
        // thioamide
        (c(), vec![(D, s()), (S, n())]),
        // phosphate
        (p(), vec![(D, o()), (S, o()), (S, o()), (S, o())]),
        // phosphonate
        (p(), vec![(D, o()), (S, o()), (S, c())]),
        // aryl halide
        (hal(), vec![(S, c().aromatic(true))]),
        // alkyl halide
        (hal(), vec![(S, c().aromatic(false))]),
        // trifluoromethyl
        (
            c(),
            vec![
                (S, AtomQuery::is(element::FLUORINE)),
                (S, AtomQuery::is(element::FLUORINE)),
                (S, AtomQuery::is(element::FLUORINE)),
            ],
        ),
        // geminal dihalide
        (c(), vec![(S, hal()), (S, hal())]),
        // terminal alkene
        (c().hydrogens(2, None), vec![(D, c())]),
        // terminal alkyne
        (c().hydrogens(1, None), vec![(T, c())]),
        // allene
        (c(), vec![(D, c()), (D, c())]),
        // aryl carbonyl
        (c(), vec![(D, o()), (S, c().aromatic(true))]),
        // pyridine-type nitrogen
        (n().aromatic(true).hydrogens(0, Some(0)), vec![(Ar, c()), (Ar, c())]),
        // pyrrole-type nitrogen
        (n().aromatic(true).hydrogens(1, None), vec![]),
        // furan-type oxygen
        (o().aromatic(true), vec![]),
        // thiophene-type sulfur
        (s().aromatic(true), vec![]),
        // aromatic N-N
        (n().aromatic(true), vec![(Ar, n().aromatic(true))]),
        // quaternary carbon
        (c(), vec![(S, c()), (S, c()), (S, c()), (S, c())]),
        // tertiary CH branch
        (c().hydrogens(1, Some(1)), vec![(S, c()), (S, c()), (S, c())]),
        // hydroxylamine
        (o().hydrogens(1, None), vec![(S, n())]),
        // amidine
        (c(), vec![(D, n()), (S, n())]),
    ];
    for (center, arms) in groups {
        keys.push(star(center, arms));
    }

    debug_assert_eq!(keys.len(), SUBSTRUCTURE_KEY_COUNT - 1);
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse_smiles;

    fn bits(smiles: &str) -> Vec<u8> {
        key_bits(&parse_smiles(smiles).unwrap())
    }

    fn key_index(wanted: &SubstructureKey) -> usize {
        catalogue().iter().position(|k| k == wanted).unwrap() + 1
    }

    #[test]
    fn test_catalogue_fills_key_block() {
        assert_eq!(catalogue().len(), SUBSTRUCTURE_KEY_COUNT - 1);
        assert_eq!(bits("C").len(), SUBSTRUCTURE_KEY_COUNT);
    }

    #[test]
    fn test_reserved_bit_always_clear() {
        for smiles in ["C", "c1ccccc1O", "[Na+].[Cl-]", "CC(=O)Nc1ccc(O)cc1"] {
            assert_eq!(bits(smiles)[0], 0);
        }
    }

    #[test]
    fn test_ring_keys() {
        let benzene = bits("c1ccccc1");
        assert_eq!(benzene[key_index(&SubstructureKey::Ring { size: 6, aromatic: true })], 1);
        assert_eq!(benzene[key_index(&SubstructureKey::Ring { size: 5, aromatic: false })], 0);
        let cyclopropane = bits("C1CC1");
        assert_eq!(cyclopropane[key_index(&SubstructureKey::Ring { size: 3, aromatic: false })], 1);
        assert_eq!(cyclopropane[key_index(&SubstructureKey::Ring { size: 6, aromatic: true })], 0);
    }

    #[test]
    fn test_functional_group_star_patterns() {
        let acid = StarPattern {
            center: AtomQuery::is(CARBON),
            arms: vec![
                (BondQuery::Double, AtomQuery::is(OXYGEN)),
                (BondQuery::Single, AtomQuery::is(OXYGEN).hydrogens(1, None)),
            ],
        };
        assert_eq!(acid.count_matches(&parse_smiles("CC(=O)O").unwrap()), 1);
        assert_eq!(acid.count_matches(&parse_smiles("CC(=O)OC").unwrap()), 0);
        assert_eq!(acid.count_matches(&parse_smiles("OC(=O)CC(=O)O").unwrap()), 2);
    }

    #[test]
    fn test_star_arms_need_distinct_neighbors() {
        // Two arms cannot both bind the single oxygen of methanol.
        let two_oxygens = StarPattern {
            center: AtomQuery::is(CARBON),
            arms: vec![
                (BondQuery::Single, AtomQuery::is(OXYGEN)),
                (BondQuery::Single, AtomQuery::is(OXYGEN)),
            ],
        };
        assert_eq!(two_oxygens.count_matches(&parse_smiles("CO").unwrap()), 0);
        assert_eq!(two_oxygens.count_matches(&parse_smiles("OCO").unwrap()), 1);
    }

    #[test]
    fn test_methyl_count_thresholds() {
        let methyls = |at_least| SubstructureKey::Star {
            pattern: StarPattern {
                center: AtomQuery::is(CARBON).hydrogens(3, None),
                arms: vec![],
            },
            at_least,
        };
        let isobutane = bits("CC(C)C");
        assert_eq!(isobutane[key_index(&methyls(3))], 1);
        let ethanol = bits("CCO");
        assert_eq!(ethanol[key_index(&methyls(1))], 1);
        assert_eq!(ethanol[key_index(&methyls(2))], 0);
    }

    #[test]
    fn test_flags() {
        assert_eq!(bits("[Na+].[Cl-]")[key_index(&SubstructureKey::MultipleFragments)], 1);
        assert_eq!(bits("F/C=C/F")[key_index(&SubstructureKey::DirectionalBond)], 1);
        assert_eq!(bits("[13CH4]")[key_index(&SubstructureKey::Isotope)], 1);
        assert_eq!(bits("C[C@H](N)O")[key_index(&SubstructureKey::Chirality)], 1);
        assert_eq!(bits("CCO")[key_index(&SubstructureKey::Chirality)], 0);
    }
}

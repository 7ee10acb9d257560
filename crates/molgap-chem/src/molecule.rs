//! Molecular graph produced by the SMILES parser.
//!
//! `Molecule::build` finishes the graph once parsing is done: it assigns
//! implicit hydrogens, perceives ring bonds, and rejects graphs that cannot
//! describe a real molecule (aromatic atoms outside rings, organic-subset
//! atoms above their highest allowed valence).

use std::collections::VecDeque;

use crate::element::{self, HYDROGEN, WILDCARD};

/// Bond multiplicity as written in the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Quadruple,
    Aromatic,
}

impl BondOrder {
    /// Valence units consumed on each endpoint. Aromatic bonds count as one;
    /// the extra aromatic unit is added once per atom.
    pub fn valence(self) -> u8 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Quadruple => 4,
        }
    }

    /// Stable code used when hashing atom environments.
    pub fn code(self) -> u8 {
        match self {
            BondOrder::Single => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Quadruple => 4,
            BondOrder::Aromatic => 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    /// Atomic number; 0 for the `*` wildcard.
    pub element: u8,
    pub aromatic: bool,
    pub isotope: Option<u16>,
    pub charge: i8,
    /// Hydrogen count written inside brackets. `None` for organic-subset atoms.
    pub bracket_hydrogens: Option<u8>,
    pub chiral: bool,
    pub class: Option<u32>,
    /// True when the atom was written in brackets.
    pub bracketed: bool,
}

impl Atom {
    pub fn organic(element: u8, aromatic: bool) -> Self {
        Self {
            element,
            aromatic,
            isotope: None,
            charge: 0,
            bracket_hydrogens: None,
            chiral: false,
            class: None,
            bracketed: false,
        }
    }

    pub fn is_heavy(&self) -> bool {
        self.element != HYDROGEN
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bond {
    pub a: usize,
    pub b: usize,
    pub order: BondOrder,
    /// Written with `/` or `\`.
    pub directional: bool,
}

impl Bond {
    pub fn other(&self, atom: usize) -> usize {
        if self.a == atom {
            self.b
        } else {
            self.a
        }
    }
}

/// Smallest ring passing through a ring bond.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingInfo {
    pub size: usize,
    pub aromatic: bool,
}

/// Immutable molecular graph with perceived hydrogens and rings.
#[derive(Debug, Clone)]
pub struct Molecule {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    /// `(neighbor, bond index)` per atom.
    adjacency: Vec<Vec<(usize, usize)>>,
    /// Total hydrogens per atom (implicit + bracket + explicit H neighbors).
    hydrogens: Vec<u8>,
    /// Smallest ring through each bond, `None` for chain bonds.
    bond_rings: Vec<Option<RingInfo>>,
    fragments: usize,
}

impl Molecule {
    /// Finish a parsed graph. Returns a human-readable reason on failure.
    pub(crate) fn build(atoms: Vec<Atom>, bonds: Vec<Bond>) -> Result<Self, String> {
        let mut adjacency = vec![Vec::new(); atoms.len()];
        for (idx, bond) in bonds.iter().enumerate() {
            adjacency[bond.a].push((bond.b, idx));
            adjacency[bond.b].push((bond.a, idx));
        }

        let mut molecule = Self {
            hydrogens: vec![0; atoms.len()],
            bond_rings: vec![None; bonds.len()],
            fragments: 0,
            atoms,
            bonds,
            adjacency,
        };

        molecule.fragments = molecule.count_fragments();
        molecule.perceive_rings();
        molecule.assign_hydrogens()?;

        for (idx, atom) in molecule.atoms.iter().enumerate() {
            if atom.aromatic && !molecule.in_ring(idx) {
                return Err(format!(
                    "aromatic atom {}{} is not in a ring",
                    element::symbol(atom.element).to_lowercase(),
                    idx
                ));
            }
        }

        Ok(molecule)
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn atom(&self, idx: usize) -> &Atom {
        &self.atoms[idx]
    }

    /// `(neighbor, bond index)` pairs of an atom.
    pub fn neighbors(&self, idx: usize) -> &[(usize, usize)] {
        &self.adjacency[idx]
    }

    /// Neighbors excluding explicit hydrogen atoms.
    pub fn heavy_neighbors(&self, idx: usize) -> impl Iterator<Item = (usize, &Bond)> + '_ {
        self.adjacency[idx]
            .iter()
            .filter(move |(nbr, _)| self.atoms[*nbr].is_heavy())
            .map(move |&(nbr, bond)| (nbr, &self.bonds[bond]))
    }

    pub fn heavy_degree(&self, idx: usize) -> usize {
        self.heavy_neighbors(idx).count()
    }

    pub fn total_hydrogens(&self, idx: usize) -> u8 {
        self.hydrogens[idx]
    }

    pub fn heavy_atom_count(&self) -> usize {
        self.atoms.iter().filter(|a| a.is_heavy()).count()
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    pub fn bond_ring(&self, bond: usize) -> Option<RingInfo> {
        self.bond_rings[bond]
    }

    pub fn in_ring(&self, idx: usize) -> bool {
        self.adjacency[idx]
            .iter()
            .any(|&(_, bond)| self.bond_rings[bond].is_some())
    }

    pub fn ring_bond_count(&self, idx: usize) -> usize {
        self.adjacency[idx]
            .iter()
            .filter(|&&(_, bond)| self.bond_rings[bond].is_some())
            .count()
    }

    /// Number of independent rings (cyclomatic number).
    pub fn ring_count(&self) -> usize {
        (self.bonds.len() + self.fragments).saturating_sub(self.atoms.len())
    }

    fn count_fragments(&self) -> usize {
        let mut seen = vec![false; self.atoms.len()];
        let mut fragments = 0;
        for start in 0..self.atoms.len() {
            if seen[start] {
                continue;
            }
            fragments += 1;
            let mut queue = VecDeque::from([start]);
            seen[start] = true;
            while let Some(atom) = queue.pop_front() {
                for &(nbr, _) in &self.adjacency[atom] {
                    if !seen[nbr] {
                        seen[nbr] = true;
                        queue.push_back(nbr);
                    }
                }
            }
        }
        fragments
    }

    /// A bond is a ring bond when its endpoints stay connected without it;
    /// the BFS distance gives the smallest ring through that bond.
    fn perceive_rings(&mut self) {
        for bond_idx in 0..self.bonds.len() {
            let (a, b) = (self.bonds[bond_idx].a, self.bonds[bond_idx].b);
            if let Some(path) = self.shortest_path_avoiding(a, b, bond_idx) {
                let aromatic = self.bonds[bond_idx].order == BondOrder::Aromatic
                    && path.iter().all(|&e| self.bonds[e].order == BondOrder::Aromatic);
                self.bond_rings[bond_idx] = Some(RingInfo {
                    size: path.len() + 1,
                    aromatic,
                });
            }
        }
    }

    /// Bond indices of the shortest path from `from` to `to` not using `skip`.
    fn shortest_path_avoiding(&self, from: usize, to: usize, skip: usize) -> Option<Vec<usize>> {
        let mut via: Vec<Option<(usize, usize)>> = vec![None; self.atoms.len()];
        let mut seen = vec![false; self.atoms.len()];
        let mut queue = VecDeque::from([from]);
        seen[from] = true;

        while let Some(atom) = queue.pop_front() {
            if atom == to {
                let mut path = Vec::new();
                let mut cursor = to;
                while let Some((prev, bond)) = via[cursor] {
                    path.push(bond);
                    cursor = prev;
                }
                return Some(path);
            }
            for &(nbr, bond) in &self.adjacency[atom] {
                if bond == skip || seen[nbr] {
                    continue;
                }
                seen[nbr] = true;
                via[nbr] = Some((atom, bond));
                queue.push_back(nbr);
            }
        }
        None
    }

    fn assign_hydrogens(&mut self) -> Result<(), String> {
        for idx in 0..self.atoms.len() {
            let atom = &self.atoms[idx];
            let explicit_h = self.adjacency[idx]
                .iter()
                .filter(|(nbr, _)| self.atoms[*nbr].element == HYDROGEN)
                .count();

            let own = if let Some(h) = atom.bracket_hydrogens {
                usize::from(h)
            } else if atom.bracketed || atom.element == WILDCARD {
                0
            } else {
                let mut used: usize = self.adjacency[idx]
                    .iter()
                    .map(|&(_, bond)| usize::from(self.bonds[bond].order.valence()))
                    .sum();
                if atom.aromatic {
                    used += 1;
                }
                let allowed = element::default_valences(atom.element);
                match allowed.iter().map(|&v| usize::from(v)).find(|&v| v >= used) {
                    Some(valence) => valence - used,
                    None => {
                        let max = allowed.last().copied().unwrap_or(0);
                        return Err(format!(
                            "atom {} ({}) has valence {} above maximum {}",
                            idx,
                            element::symbol(atom.element),
                            used,
                            max
                        ));
                    }
                }
            };
            self.hydrogens[idx] = u8::try_from(own + explicit_h).map_err(|_| {
                format!(
                    "atom {} ({}) carries {} hydrogens, more than {}",
                    idx,
                    element::symbol(atom.element),
                    own + explicit_h,
                    u8::MAX
                )
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::smiles::parse_smiles;

    #[test]
    fn test_implicit_hydrogens_for_ethanol() {
        let mol = parse_smiles("CCO").unwrap();
        assert_eq!(mol.total_hydrogens(0), 3);
        assert_eq!(mol.total_hydrogens(1), 2);
        assert_eq!(mol.total_hydrogens(2), 1);
    }

    #[test]
    fn test_aromatic_hydrogens() {
        let benzene = parse_smiles("c1ccccc1").unwrap();
        for idx in 0..6 {
            assert_eq!(benzene.total_hydrogens(idx), 1);
        }
        let pyridine = parse_smiles("c1ccncc1").unwrap();
        assert_eq!(pyridine.total_hydrogens(3), 0);
    }

    #[test]
    fn test_ring_perception_on_fused_system() {
        let naphthalene = parse_smiles("c1ccc2ccccc2c1").unwrap();
        assert_eq!(naphthalene.ring_count(), 2);
        assert!(naphthalene.bonds().iter().enumerate().all(|(i, _)| {
            naphthalene.bond_ring(i).map(|r| r.size == 6 && r.aromatic) == Some(true)
        }));
        // Fusion atoms carry three ring bonds.
        assert_eq!(naphthalene.ring_bond_count(3), 3);
    }

    #[test]
    fn test_chain_bonds_are_not_ring_bonds() {
        let mol = parse_smiles("C1CC1CC").unwrap();
        assert_eq!(mol.bond_ring(0).map(|r| r.size), Some(3));
        assert!(mol.bond_ring(3).is_none());
        assert!(!mol.in_ring(4));
    }

    #[test]
    fn test_fragments_counted() {
        let salt = parse_smiles("[Na+].[Cl-]").unwrap();
        assert_eq!(salt.fragment_count(), 2);
        assert_eq!(salt.ring_count(), 0);
    }

    #[test]
    fn test_explicit_hydrogen_atoms_count_toward_neighbors() {
        let methane = parse_smiles("[H]C([H])([H])[H]").unwrap();
        assert_eq!(methane.heavy_atom_count(), 1);
        assert_eq!(methane.total_hydrogens(1), 4);
        assert_eq!(methane.heavy_degree(1), 0);
    }

    #[test]
    fn test_valence_violation_rejected() {
        let err = parse_smiles("C(C)(C)(C)(C)C").unwrap_err();
        assert!(err.to_string().contains("valence"));
    }

    #[test]
    fn test_acyclic_aromatic_atom_rejected() {
        assert!(parse_smiles("cc").is_err());
    }
}

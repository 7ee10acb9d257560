//! SMILES parser.
//!
//! Supports the organic subset, bracket atoms (isotope, chirality, hydrogen
//! count, charge, atom class), all bond symbols, branches, two-digit `%nn`
//! ring closures and dot-separated fragments. Anything after the first
//! whitespace is treated as a title and ignored.

use std::collections::HashMap;

use crate::element::{self, WILDCARD};
use crate::error::{ChemError, ChemResult};
use crate::molecule::{Atom, Bond, BondOrder, Molecule};

/// Bond written between two atoms, before defaults are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BondSpec {
    order: BondOrder,
    directional: bool,
}

struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    branches: Vec<usize>,
    previous: Option<usize>,
    pending: Option<BondSpec>,
    open_rings: HashMap<u16, (usize, Option<BondSpec>)>,
}

/// Parse a SMILES string into a validated molecular graph.
pub fn parse_smiles(input: &str) -> ChemResult<Molecule> {
    let smiles = input.split_whitespace().next().unwrap_or("");
    if smiles.is_empty() {
        return Err(ChemError::malformed(input, "empty descriptor"));
    }

    let mut parser = Parser {
        input,
        bytes: smiles.as_bytes(),
        pos: 0,
        atoms: Vec::new(),
        bonds: Vec::new(),
        branches: Vec::new(),
        previous: None,
        pending: None,
        open_rings: HashMap::new(),
    };
    parser.run()?;

    Molecule::build(parser.atoms, parser.bonds).map_err(|reason| ChemError::malformed(input, reason))
}

impl<'a> Parser<'a> {
    fn fail<T>(&self, reason: impl Into<String>) -> ChemResult<T> {
        Err(ChemError::malformed(self.input, reason))
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn run(&mut self) -> ChemResult<()> {
        while let Some(c) = self.peek() {
            match c {
                b'(' => {
                    let Some(prev) = self.previous else {
                        return self.fail(format!("branch at position {} has no preceding atom", self.pos));
                    };
                    if self.pending.is_some() {
                        return self.fail(format!("bond before branch at position {}", self.pos));
                    }
                    self.branches.push(prev);
                    self.pos += 1;
                }
                b')' => {
                    if self.pending.is_some() {
                        return self.fail(format!("dangling bond before ')' at position {}", self.pos));
                    }
                    match self.branches.pop() {
                        Some(anchor) => self.previous = Some(anchor),
                        None => return self.fail(format!("unbalanced ')' at position {}", self.pos)),
                    }
                    self.pos += 1;
                }
                b'-' | b'=' | b'#' | b'$' | b':' | b'/' | b'\\' => {
                    if self.previous.is_none() {
                        return self.fail(format!("bond at position {} has no preceding atom", self.pos));
                    }
                    if self.pending.is_some() {
                        return self.fail(format!("consecutive bonds at position {}", self.pos));
                    }
                    self.pending = Some(bond_spec(c));
                    self.pos += 1;
                }
                b'.' => {
                    if self.previous.is_none() || self.pending.is_some() {
                        return self.fail(format!("misplaced '.' at position {}", self.pos));
                    }
                    self.previous = None;
                    self.pos += 1;
                }
                b'0'..=b'9' => {
                    let number = (c - b'0') as u16;
                    self.pos += 1;
                    self.ring_closure(number)?;
                }
                b'%' => {
                    let (Some(d1), Some(d2)) = (self.peek_at(1), self.peek_at(2)) else {
                        return self.fail("incomplete '%' ring closure");
                    };
                    if !d1.is_ascii_digit() || !d2.is_ascii_digit() {
                        return self.fail(format!("invalid '%' ring closure at position {}", self.pos));
                    }
                    let number = ((d1 - b'0') * 10 + (d2 - b'0')) as u16;
                    self.pos += 3;
                    self.ring_closure(number)?;
                }
                b'[' => {
                    let atom = self.bracket_atom()?;
                    self.add_atom(atom)?;
                }
                b'*' => {
                    self.pos += 1;
                    self.add_atom(Atom::organic(WILDCARD, false))?;
                }
                _ => {
                    let atom = self.organic_atom()?;
                    self.add_atom(atom)?;
                }
            }
        }

        if self.pending.is_some() {
            return self.fail("descriptor ends with a bond");
        }
        if !self.branches.is_empty() {
            return self.fail("unbalanced '(': branch never closed");
        }
        if let Some(number) = self.open_rings.keys().min() {
            return self.fail(format!("unclosed ring bond {}", number));
        }
        if self.atoms.is_empty() {
            return self.fail("descriptor contains no atoms");
        }
        if self.previous.is_none() {
            return self.fail("descriptor ends with '.'");
        }
        Ok(())
    }

    fn add_atom(&mut self, atom: Atom) -> ChemResult<()> {
        let idx = self.atoms.len();
        self.atoms.push(atom);
        if let Some(prev) = self.previous {
            let spec = self.pending.take();
            self.connect(prev, idx, spec)?;
        }
        self.previous = Some(idx);
        Ok(())
    }

    fn connect(&mut self, a: usize, b: usize, spec: Option<BondSpec>) -> ChemResult<()> {
        if a == b {
            return self.fail(format!("atom {} bonded to itself", a));
        }
        let duplicate = self
            .bonds
            .iter()
            .any(|bond| (bond.a == a && bond.b == b) || (bond.a == b && bond.b == a));
        if duplicate {
            return self.fail(format!("duplicate bond between atoms {} and {}", a, b));
        }
        let spec = spec.unwrap_or_else(|| {
            let order = if self.atoms[a].aromatic && self.atoms[b].aromatic {
                BondOrder::Aromatic
            } else {
                BondOrder::Single
            };
            BondSpec {
                order,
                directional: false,
            }
        });
        self.bonds.push(Bond {
            a,
            b,
            order: spec.order,
            directional: spec.directional,
        });
        Ok(())
    }

    fn ring_closure(&mut self, number: u16) -> ChemResult<()> {
        let Some(current) = self.previous else {
            return self.fail(format!("ring bond {} has no preceding atom", number));
        };
        let spec = self.pending.take();
        match self.open_rings.remove(&number) {
            None => {
                self.open_rings.insert(number, (current, spec));
                Ok(())
            }
            Some((opened_at, opened_spec)) => {
                let spec = match (opened_spec, spec) {
                    (Some(x), Some(y)) if x.order != y.order => {
                        return self.fail(format!("conflicting bond orders on ring bond {}", number));
                    }
                    (Some(x), _) => Some(x),
                    (None, y) => y,
                };
                self.connect(opened_at, current, spec)
            }
        }
    }

    fn organic_atom(&mut self) -> ChemResult<Atom> {
        let c = self.bytes[self.pos];
        let next = self.peek_at(1);
        let (element, aromatic, width) = match (c, next) {
            (b'C', Some(b'l')) => (element::CHLORINE, false, 2),
            (b'B', Some(b'r')) => (element::BROMINE, false, 2),
            (b'B', _) => (element::BORON, false, 1),
            (b'C', _) => (element::CARBON, false, 1),
            (b'N', _) => (element::NITROGEN, false, 1),
            (b'O', _) => (element::OXYGEN, false, 1),
            (b'P', _) => (element::PHOSPHORUS, false, 1),
            (b'S', _) => (element::SULFUR, false, 1),
            (b'F', _) => (element::FLUORINE, false, 1),
            (b'I', _) => (element::IODINE, false, 1),
            (b'b', _) => (element::BORON, true, 1),
            (b'c', _) => (element::CARBON, true, 1),
            (b'n', _) => (element::NITROGEN, true, 1),
            (b'o', _) => (element::OXYGEN, true, 1),
            (b'p', _) => (element::PHOSPHORUS, true, 1),
            (b's', _) => (element::SULFUR, true, 1),
            _ => {
                return self.fail(format!(
                    "unexpected character '{}' at position {}",
                    c as char, self.pos
                ))
            }
        };
        self.pos += width;
        Ok(Atom::organic(element, aromatic))
    }

    fn bracket_atom(&mut self) -> ChemResult<Atom> {
        let start = self.pos;
        self.pos += 1;

        let isotope = match self.read_number() {
            Some(n) => match u16::try_from(n) {
                Ok(mass) => Some(mass),
                Err(_) => return self.fail(format!("isotope {} out of range in bracket atom at {}", n, start)),
            },
            None => None,
        };

        let (element, aromatic) = self.bracket_symbol()?;

        let mut chiral = false;
        while self.peek() == Some(b'@') {
            chiral = true;
            self.pos += 1;
        }
        if chiral {
            // Extended classes such as @TH1, @SP2, @OH15.
            for class in ["TH", "AL", "SP", "TB", "OH"] {
                if self.bytes[self.pos..].starts_with(class.as_bytes()) {
                    self.pos += 2;
                    self.read_number();
                    break;
                }
            }
        }

        let mut hydrogens = 0u8;
        if self.peek() == Some(b'H') {
            self.pos += 1;
            let count = self.read_number().unwrap_or(1);
            hydrogens = match u8::try_from(count) {
                Ok(h) => h,
                Err(_) => {
                    return self.fail(format!("hydrogen count {} out of range in bracket atom at {}", count, start))
                }
            };
        }

        let mut charge: i32 = 0;
        while let Some(sign @ (b'+' | b'-')) = self.peek() {
            let unit = if sign == b'+' { 1 } else { -1 };
            self.pos += 1;
            match self.read_number() {
                Some(magnitude) => charge += unit * magnitude as i32,
                None => charge += unit,
            }
        }
        if !(-15..=15).contains(&charge) {
            return self.fail(format!("charge {} out of range in bracket atom at {}", charge, start));
        }

        let class = if self.peek() == Some(b':') {
            self.pos += 1;
            match self.read_number() {
                Some(n) => Some(n),
                None => return self.fail(format!("atom class without number at position {}", self.pos)),
            }
        } else {
            None
        };

        if self.peek() != Some(b']') {
            return self.fail(format!("unterminated bracket atom starting at position {}", start));
        }
        self.pos += 1;

        Ok(Atom {
            element,
            aromatic,
            isotope,
            charge: charge as i8,
            bracket_hydrogens: Some(hydrogens),
            chiral,
            class,
            bracketed: true,
        })
    }

    fn bracket_symbol(&mut self) -> ChemResult<(u8, bool)> {
        let Some(first) = self.peek() else {
            return self.fail("bracket atom missing element symbol");
        };

        if first == b'*' {
            self.pos += 1;
            return Ok((WILDCARD, false));
        }

        if first.is_ascii_lowercase() {
            for symbol in ["se", "as", "te", "b", "c", "n", "o", "p", "s"] {
                if self.bytes[self.pos..].starts_with(symbol.as_bytes()) {
                    let mut upper = symbol.to_string();
                    upper[..1].make_ascii_uppercase();
                    if let Some(z) = element::atomic_number(&upper) {
                        self.pos += symbol.len();
                        return Ok((z, true));
                    }
                }
            }
            return self.fail(format!("unknown aromatic symbol at position {}", self.pos));
        }

        if !first.is_ascii_uppercase() {
            return self.fail(format!("expected element symbol at position {}", self.pos));
        }

        if let Some(second) = self.peek_at(1).filter(u8::is_ascii_lowercase) {
            let two = [first, second];
            if let Some(z) = std::str::from_utf8(&two).ok().and_then(element::atomic_number) {
                self.pos += 2;
                return Ok((z, false));
            }
        }

        let one = [first];
        match std::str::from_utf8(&one).ok().and_then(element::atomic_number) {
            Some(z) => {
                self.pos += 1;
                Ok((z, false))
            }
            None => self.fail(format!("unknown element '{}' at position {}", first as char, self.pos)),
        }
    }

    fn read_number(&mut self) -> Option<u32> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) && self.pos - start < 6 {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|digits| digits.parse().ok())
    }
}

fn bond_spec(symbol: u8) -> BondSpec {
    let (order, directional) = match symbol {
        b'=' => (BondOrder::Double, false),
        b'#' => (BondOrder::Triple, false),
        b'$' => (BondOrder::Quadruple, false),
        b':' => (BondOrder::Aromatic, false),
        b'/' | b'\\' => (BondOrder::Single, true),
        _ => (BondOrder::Single, false),
    };
    BondSpec { order, directional }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_chain() {
        let mol = parse_smiles("CCO").unwrap();
        assert_eq!(mol.atoms().len(), 3);
        assert_eq!(mol.bonds().len(), 2);
        assert_eq!(mol.atom(2).element, element::OXYGEN);
    }

    #[test]
    fn test_parse_two_letter_halogens() {
        let mol = parse_smiles("ClCBr").unwrap();
        assert_eq!(mol.atom(0).element, element::CHLORINE);
        assert_eq!(mol.atom(2).element, element::BROMINE);
    }

    #[test]
    fn test_parse_branches_and_double_bonds() {
        // Acetic acid
        let mol = parse_smiles("CC(=O)O").unwrap();
        assert_eq!(mol.atoms().len(), 4);
        let carbonyl = mol
            .bonds()
            .iter()
            .find(|b| b.order == BondOrder::Double)
            .unwrap();
        assert_eq!((carbonyl.a, carbonyl.b), (1, 2));
        assert_eq!(mol.bonds()[2].a, 1, "O after branch attaches to branch anchor");
    }

    #[test]
    fn test_parse_bracket_atom_fields() {
        let mol = parse_smiles("[13CH3:7][N@@H+]C").unwrap();
        let carbon = mol.atom(0);
        assert_eq!(carbon.isotope, Some(13));
        assert_eq!(carbon.bracket_hydrogens, Some(3));
        assert_eq!(carbon.class, Some(7));
        let nitrogen = mol.atom(1);
        assert!(nitrogen.chiral);
        assert_eq!(nitrogen.charge, 1);
        assert_eq!(nitrogen.bracket_hydrogens, Some(1));
    }

    #[test]
    fn test_parse_charges() {
        let mol = parse_smiles("[Fe+++].[O--].[Cu+2].[O-2]").unwrap();
        assert_eq!(mol.atom(0).charge, 3);
        assert_eq!(mol.atom(1).charge, -2);
        assert_eq!(mol.atom(2).charge, 2);
        assert_eq!(mol.atom(3).charge, -2);
    }

    #[test]
    fn test_parse_aromatic_bracket_atoms() {
        let mol = parse_smiles("c1cc[nH]c1").unwrap();
        assert!(mol.atom(3).aromatic);
        assert_eq!(mol.total_hydrogens(3), 1);
        let selenophene = parse_smiles("c1cc[se]c1").unwrap();
        assert_eq!(selenophene.atom(3).element, 34);
    }

    #[test]
    fn test_parse_percent_ring_closure() {
        let mol = parse_smiles("C%12CC%12").unwrap();
        assert_eq!(mol.ring_count(), 1);
    }

    #[test]
    fn test_ring_bond_order_on_closure() {
        let mol = parse_smiles("C=1CCCCC1").unwrap();
        let closure = mol.bonds().last().unwrap();
        assert_eq!(closure.order, BondOrder::Double);
    }

    #[test]
    fn test_directional_bonds() {
        let mol = parse_smiles("F/C=C/F").unwrap();
        assert!(mol.bonds()[0].directional);
        assert!(!mol.bonds()[1].directional);
    }

    #[test]
    fn test_title_after_whitespace_ignored() {
        let mol = parse_smiles("CCO ethanol").unwrap();
        assert_eq!(mol.atoms().len(), 3);
    }

    #[test]
    fn test_malformed_descriptors_rejected() {
        let cases = [
            "",
            "C1CC",
            "C(C",
            "CC)",
            "C=",
            "C==C",
            "(C)",
            "=C",
            "CXC",
            "[Xx]",
            "[CH4",
            "C11",
            "C.",
            "C%1",
            "C=1CC#1",
        ];
        for case in cases {
            let result = parse_smiles(case);
            assert!(
                matches!(result, Err(ChemError::MalformedInput { .. })),
                "expected failure for {:?}, got {:?}",
                case,
                result.map(|m| m.atoms().len())
            );
        }
    }

    #[test]
    fn test_out_of_range_bracket_counts_rejected() {
        for case in ["[CH300]", "[CH255][H]", "[70000C]", "[C]([H])([H])[CH256]"] {
            assert!(
                matches!(parse_smiles(case), Err(ChemError::MalformedInput { .. })),
                "expected failure for {case:?}"
            );
        }
        let mol = parse_smiles("[CH255]").unwrap();
        assert_eq!(mol.total_hydrogens(0), 255);
        assert_eq!(parse_smiles("[65535C]").unwrap().atom(0).isotope, Some(65535));
    }

    #[test]
    fn test_wildcard_atom() {
        let mol = parse_smiles("*CC").unwrap();
        assert_eq!(mol.atom(0).element, WILDCARD);
        assert_eq!(mol.total_hydrogens(0), 0);
    }
}

//! Periodic table lookups used by the SMILES parser.

/// Element symbols indexed by `atomic_number - 1`.
const SYMBOLS: [&str; 118] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl",
    "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As",
    "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In",
    "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd", "Tb",
    "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg", "Tl",
    "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk",
    "Cf", "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds", "Rg", "Cn", "Nh",
    "Fl", "Mc", "Lv", "Ts", "Og",
];

pub const HYDROGEN: u8 = 1;
pub const BORON: u8 = 5;
pub const CARBON: u8 = 6;
pub const NITROGEN: u8 = 7;
pub const OXYGEN: u8 = 8;
pub const FLUORINE: u8 = 9;
pub const SILICON: u8 = 14;
pub const PHOSPHORUS: u8 = 15;
pub const SULFUR: u8 = 16;
pub const CHLORINE: u8 = 17;
pub const BROMINE: u8 = 35;
pub const IODINE: u8 = 53;

/// Atomic number used for the `*` wildcard atom.
pub const WILDCARD: u8 = 0;

pub const HALOGENS: [u8; 4] = [FLUORINE, CHLORINE, BROMINE, IODINE];

/// Atomic number for an element symbol (case-sensitive), if known.
pub fn atomic_number(symbol: &str) -> Option<u8> {
    SYMBOLS
        .iter()
        .position(|s| *s == symbol)
        .map(|idx| (idx + 1) as u8)
}

/// Symbol for an atomic number; `*` for the wildcard.
pub fn symbol(atomic_number: u8) -> &'static str {
    match atomic_number {
        WILDCARD => "*",
        z => SYMBOLS.get(z as usize - 1).copied().unwrap_or("?"),
    }
}

/// Allowed valences for organic-subset atoms, in ascending order.
///
/// Atoms outside the organic subset get no implicit hydrogens.
pub fn default_valences(atomic_number: u8) -> &'static [u8] {
    match atomic_number {
        BORON => &[3],
        CARBON => &[4],
        NITROGEN => &[3, 5],
        OXYGEN => &[2],
        PHOSPHORUS => &[3, 5],
        SULFUR => &[2, 4, 6],
        FLUORINE | CHLORINE | BROMINE | IODINE => &[1],
        _ => &[],
    }
}

/// Whether the element may appear in lowercase (aromatic) form.
pub fn can_be_aromatic(atomic_number: u8) -> bool {
    matches!(atomic_number, 5 | 6 | 7 | 8 | 15 | 16 | 33 | 34 | 52)
}

pub fn is_halogen(atomic_number: u8) -> bool {
    HALOGENS.contains(&atomic_number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_lookup_round_trips_common_elements() {
        for sym in ["C", "N", "O", "Cl", "Br", "Se", "Hg"] {
            let z = atomic_number(sym).unwrap();
            assert_eq!(symbol(z), sym);
        }
        assert_eq!(atomic_number("C"), Some(CARBON));
        assert_eq!(atomic_number("Xx"), None);
        assert_eq!(atomic_number("cl"), None);
    }

    #[test]
    fn test_default_valences() {
        assert_eq!(default_valences(CARBON), &[4]);
        assert_eq!(default_valences(SULFUR), &[2, 4, 6]);
        assert!(default_valences(26).is_empty());
    }
}

//! Molecule descriptors to binary fingerprints.
//!
//! Parses SMILES into a validated molecular graph and encodes it as a
//! fixed-length binary vector: a block of structural keys followed by
//! hashed circular atom environments.
//!
//! # Example
//!
//! ```
//! use molgap_chem::FingerprintEncoder;
//!
//! let encoder = FingerprintEncoder::new(2, 2000).unwrap();
//! let fp = encoder.encode("CC(=O)O").unwrap();
//! assert_eq!(fp.len(), 2167);
//! ```

pub mod circular;
pub mod element;
pub mod error;
pub mod fingerprint;
pub mod keys;
pub mod molecule;
pub mod smiles;

pub use error::{ChemError, ChemResult};
pub use fingerprint::{
    BatchEncoding, Fingerprint, FingerprintEncoder, MalformedPolicy, RejectedRow, RowId,
};
pub use keys::SUBSTRUCTURE_KEY_COUNT;
pub use molecule::{Atom, Bond, BondOrder, Molecule};
pub use smiles::parse_smiles;

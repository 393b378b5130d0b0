//! CSF record recognition: line classification, multi-line record assembly,
//! field tokenization, and the inverse text formatter.

pub mod classify;
pub mod format;
pub mod tokenize;

pub use classify::{LineClassifier, LineKind, RecordAssembler};
pub use tokenize::{FieldTokenizer, OrbitalFields, TokenizedRecord, WINDOW_WIDTH};

/// One logical CSF record as raw text: the occupation line plus its two
/// continuation lines, tagged with the 1-based line number of the occupation
/// line for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCsfRecord {
    /// 0-based ordinal of this record within the file body.
    pub index: u64,
    /// 1-based line number of the occupation line.
    pub line: u64,
    /// Line 1: per-orbital electron occupations.
    pub occupation: String,
    /// Line 2: intermediate J values aligned under their orbitals.
    pub coupling: String,
    /// Line 3: coupling J values plus the trailing total J / parity.
    pub final_j: String,
}

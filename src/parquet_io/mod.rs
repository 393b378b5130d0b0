//! Adapters around the `parquet` crate: the row-group writer, the lazy row
//! reader, and the footer-only metadata inspector.
//!
//! Everything CSF-specific that must survive the trip through Parquet (the
//! verbatim preamble and the peel subshell order) rides in the footer's
//! key-value metadata, so one output file per job carries everything needed
//! to reconstruct the original text.

pub mod inspect;
pub mod reader;
pub mod writer;

pub use inspect::{inspect, ParquetInfo};
pub use reader::{CsfRow, CsfRowReader};
pub use writer::ParquetSink;

use parquet::format::KeyValue;

use crate::error::RcsfsError;

/// Footer metadata key holding the preamble lines as a JSON array.
const HEADER_LINES_KEY: &str = "rcsfs.header_lines";
/// Footer metadata key holding the peel subshell order as a JSON array.
const PEEL_SUBSHELLS_KEY: &str = "rcsfs.peel_subshells";

/// The CSF-specific file header carried in the Parquet footer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileHeader {
    /// Preamble lines of the source file, verbatim.
    pub header_lines: Vec<String>,
    /// Orbital order the columns were laid out against.
    pub peel_subshells: Vec<String>,
}

impl FileHeader {
    pub fn to_key_value(&self) -> Result<Vec<KeyValue>, RcsfsError> {
        Ok(vec![
            KeyValue::new(
                HEADER_LINES_KEY.to_string(),
                serde_json::to_string(&self.header_lines)?,
            ),
            KeyValue::new(
                PEEL_SUBSHELLS_KEY.to_string(),
                serde_json::to_string(&self.peel_subshells)?,
            ),
        ])
    }

    /// Decode from a footer's key-value list. Files written by other tools
    /// simply yield an empty header.
    pub fn from_key_value(entries: Option<&Vec<KeyValue>>) -> Result<Self, RcsfsError> {
        let mut header = FileHeader::default();
        let Some(entries) = entries else {
            return Ok(header);
        };
        for entry in entries {
            let Some(value) = entry.value.as_deref() else {
                continue;
            };
            match entry.key.as_str() {
                HEADER_LINES_KEY => header.header_lines = serde_json::from_str(value)?,
                PEEL_SUBSHELLS_KEY => header.peel_subshells = serde_json::from_str(value)?,
                _ => {}
            }
        }
        Ok(header)
    }
}

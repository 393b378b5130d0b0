//! Footer-only metadata inspection: everything a caller can learn about a
//! columnar file without decoding a single row. O(1) in row count.

use std::fs::File;
use std::path::Path;

use parquet::arrow::parquet_to_arrow_schema;
use parquet::file::reader::{FileReader, SerializedFileReader};
use serde::Serialize;

use crate::error::RcsfsError;
use crate::parquet_io::FileHeader;
use crate::schema::{ColumnDef, CsfSchema};

/// The inspection result for one columnar file.
#[derive(Serialize, Debug, Clone)]
pub struct ParquetInfo {
    pub row_count: u64,
    pub row_groups: usize,
    pub column_defs: Vec<ColumnDef>,
    /// Codec of the first column chunk; `"none"` for an empty file.
    pub compression: String,
    pub file_size_bytes: u64,
    pub header_lines: Vec<String>,
    pub peel_subshells: Vec<String>,
}

/// Read the footer of `path` and summarize it. Fails with a read error if
/// the file is not valid Parquet (bad magic, truncated footer); no partial
/// metadata is ever returned.
pub fn inspect(path: &Path) -> Result<ParquetInfo, RcsfsError> {
    let file_size_bytes = std::fs::metadata(path)?.len();
    let file = File::open(path)?;
    let reader = SerializedFileReader::new(file)
        .map_err(|e| RcsfsError::Read(format!("{}: {e}", path.display())))?;
    let metadata = reader.metadata();
    let file_meta = metadata.file_metadata();

    let arrow_schema = parquet_to_arrow_schema(
        file_meta.schema_descr(),
        file_meta.key_value_metadata(),
    )
    .map_err(|e| RcsfsError::Read(e.to_string()))?;
    let schema = CsfSchema::from_arrow(&arrow_schema)?;
    let header = FileHeader::from_key_value(file_meta.key_value_metadata())?;

    let row_groups = metadata.num_row_groups();
    let row_count: u64 = (0..row_groups)
        .map(|i| metadata.row_group(i).num_rows() as u64)
        .sum();
    let compression = if row_groups > 0 && metadata.row_group(0).num_columns() > 0 {
        format!("{:?}", metadata.row_group(0).column(0).compression()).to_lowercase()
    } else {
        "none".to_string()
    };

    Ok(ParquetInfo {
        row_count,
        row_groups,
        column_defs: schema.columns().to_vec(),
        compression,
        file_size_bytes,
        header_lines: header.header_lines,
        peel_subshells: header.peel_subshells,
    })
}

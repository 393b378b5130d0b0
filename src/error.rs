//! This module defines the single, unified error type for the entire rcsfs
//! library. It uses the `thiserror` crate to provide ergonomic, context-aware
//! error handling.

use thiserror::Error;

use crate::schema::PrimitiveKind;

#[derive(Error, Debug)]
pub enum RcsfsError {
    // =========================================================================
    // === Per-record errors (recoverable under a lenient parse policy)
    // =========================================================================
    /// A physical line matched no known CSF pattern and is not a harmless
    /// blank or separator.
    #[error("line {line}: malformed record: {reason}")]
    MalformedRecord { line: u64, reason: String },

    /// A field inside a classified data record could not be converted to its
    /// expected type.
    #[error("line {line}, column {column}: cannot parse {token:?} as {expected}")]
    FieldParse {
        line: u64,
        column: usize,
        token: String,
        expected: PrimitiveKind,
    },

    // =========================================================================
    // === Structural errors (always fatal to the job)
    // =========================================================================
    /// A record observed after the schema was frozen carries a field that
    /// cannot be widened into the fixed column type.
    #[error("schema conflict in column {column:?}: {reason}")]
    SchemaConflict { column: String, reason: String },

    /// The underlying Parquet write failed; the job is aborted and no partial
    /// output file is left behind.
    #[error("parquet write failed: {0}")]
    Write(String),

    /// The read path hit a corrupt or truncated file, or a schema that does
    /// not match caller expectations.
    #[error("parquet read failed: {0}")]
    Read(String),

    /// The job was cancelled at a flush boundary.
    #[error("conversion cancelled after {rows_flushed} flushed rows")]
    Cancelled { rows_flushed: u64 },

    /// Invalid or contradictory configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    // =========================================================================
    // === External error wrappers
    // =========================================================================
    /// An error originating from the source/sink I/O subsystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error originating from the Arrow library.
    #[error("Arrow operation failed: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// An error surfaced by the Parquet library outside our own read/write
    /// classification above.
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// An error from Serde JSON, typically during footer metadata
    /// serialization.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

impl RcsfsError {
    /// Per-record errors may be recovered by the orchestrator according to
    /// the configured parse-error policy; everything else aborts the job.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RcsfsError::MalformedRecord { .. } | RcsfsError::FieldParse { .. }
        )
    }

    /// Line number attached to the error, when one exists.
    pub fn line(&self) -> Option<u64> {
        match self {
            RcsfsError::MalformedRecord { line, .. } => Some(*line),
            RcsfsError::FieldParse { line, .. } => Some(*line),
            _ => None,
        }
    }
}

#[cfg(feature = "python")]
impl From<RcsfsError> for pyo3::PyErr {
    fn from(err: RcsfsError) -> pyo3::PyErr {
        match err {
            RcsfsError::Io(e) => pyo3::exceptions::PyIOError::new_err(e.to_string()),
            other => pyo3::exceptions::PyValueError::new_err(other.to_string()),
        }
    }
}

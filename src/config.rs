//! The single source of truth for conversion configuration.
//!
//! A [`ConvertConfig`] is created once at the application boundary (from a
//! Python call site or a config file) and passed read-only into the
//! orchestrator for the duration of one job. No configuration state is shared
//! between jobs.

use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use serde::{Deserialize, Serialize};

use crate::error::RcsfsError;

/// The lossless compression codec applied to every column chunk.
///
/// Encoding itself is delegated to the `parquet` crate; this enum only
/// selects among its codecs.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompressionCodec {
    /// No compression. Mostly useful for debugging and byte-level diffing.
    None,
    /// Fast, moderate-ratio block compression.
    Snappy,
    /// **Default:** best ratio on the highly repetitive CSF columns at an
    /// acceptable encode cost.
    #[default]
    Zstd,
    /// Widest compatibility with older Parquet readers.
    Gzip,
}

impl CompressionCodec {
    pub fn to_parquet(self) -> Compression {
        match self {
            Self::None => Compression::UNCOMPRESSED,
            Self::Snappy => Compression::SNAPPY,
            Self::Zstd => Compression::ZSTD(ZstdLevel::default()),
            Self::Gzip => Compression::GZIP(GzipLevel::default()),
        }
    }

    /// Parse the string form used at the FFI boundary.
    pub fn parse(s: &str) -> Result<Self, RcsfsError> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "snappy" => Ok(Self::Snappy),
            "zstd" => Ok(Self::Zstd),
            "gzip" => Ok(Self::Gzip),
            other => Err(RcsfsError::Config(format!(
                "unknown compression codec {other:?}, expected none|snappy|zstd|gzip"
            ))),
        }
    }
}

/// What the orchestrator does when a record fails to classify or tokenize.
///
/// Structural errors (I/O, schema conflicts, storage failures) always abort
/// regardless of this policy.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorPolicy {
    /// **Default:** the first bad record fails the whole job.
    #[default]
    Abort,
    /// Drop bad records silently; only their count appears in the report.
    SkipRow,
    /// Drop bad records but keep every error, with its line number, in the
    /// conversion report.
    Collect,
}

impl ParseErrorPolicy {
    pub fn parse(s: &str) -> Result<Self, RcsfsError> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip_row" => Ok(Self::SkipRow),
            "collect" => Ok(Self::Collect),
            other => Err(RcsfsError::Config(format!(
                "unknown parse error policy {other:?}, expected abort|skip_row|collect"
            ))),
        }
    }
}

/// The unified configuration for one conversion job.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub struct ConvertConfig {
    /// Codec applied to every column chunk.
    #[serde(default)]
    pub compression: CompressionCodec,

    /// Row-count threshold at which the column buffers are flushed as one
    /// row group.
    #[serde(default = "default_row_group_rows")]
    pub row_group_rows: usize,

    /// Number of preamble lines before the first CSF record. The preamble is
    /// scanned for the peel subshell declaration and preserved verbatim in
    /// the output file's footer metadata.
    #[serde(default = "default_header_lines")]
    pub header_lines: usize,

    /// Physical lines longer than this are truncated (and counted in the
    /// report) before classification.
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,

    /// How many records the schema inference observes before freezing, when
    /// the preamble does not declare its peel subshells.
    #[serde(default = "default_infer_records")]
    pub infer_records: usize,

    /// Recovery policy for malformed or unparseable records.
    #[serde(default)]
    pub on_parse_error: ParseErrorPolicy,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            compression: CompressionCodec::default(),
            row_group_rows: default_row_group_rows(),
            header_lines: default_header_lines(),
            max_line_len: default_max_line_len(),
            infer_records: default_infer_records(),
            on_parse_error: ParseErrorPolicy::default(),
        }
    }
}

impl ConvertConfig {
    /// Reject configurations that cannot drive a job at all.
    pub fn validate(&self) -> Result<(), RcsfsError> {
        if self.row_group_rows == 0 {
            return Err(RcsfsError::Config(
                "row_group_rows must be at least 1".to_string(),
            ));
        }
        if self.infer_records == 0 {
            return Err(RcsfsError::Config(
                "infer_records must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_row_group_rows() -> usize {
    30_000
}

fn default_header_lines() -> usize {
    5
}

fn default_max_line_len() -> usize {
    256
}

fn default_infer_records() -> usize {
    8
}

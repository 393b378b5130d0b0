//! The Parquet writer adapter.
//!
//! Encoding is delegated entirely to `parquet::arrow::ArrowWriter`; this
//! module owns codec selection, row-group boundaries (one flushed
//! `RecordBatch` becomes one row group), footer metadata, and the
//! all-or-nothing file contract: output is staged under a `.tmp` sibling and
//! renamed into place only after a successful close, so a failed or
//! cancelled job never leaves a partially valid file behind.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;
use log::debug;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;

use crate::config::CompressionCodec;
use crate::error::RcsfsError;
use crate::parquet_io::FileHeader;

pub struct ParquetSink {
    writer: Option<ArrowWriter<File>>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    row_groups: usize,
    rows: u64,
}

impl ParquetSink {
    /// Create the staging file and the underlying Arrow writer.
    pub fn open(
        dest: &Path,
        schema: SchemaRef,
        codec: CompressionCodec,
        max_row_group_rows: usize,
        header: &FileHeader,
    ) -> Result<Self, RcsfsError> {
        let tmp_path = staging_path(dest);
        let file = File::create(&tmp_path)?;
        let props = WriterProperties::builder()
            .set_compression(codec.to_parquet())
            .set_max_row_group_size(max_row_group_rows)
            .set_key_value_metadata(Some(header.to_key_value()?))
            .build();
        let writer = ArrowWriter::try_new(file, schema, Some(props))
            .map_err(|e| RcsfsError::Write(e.to_string()))?;
        Ok(Self {
            writer: Some(writer),
            tmp_path,
            final_path: dest.to_path_buf(),
            row_groups: 0,
            rows: 0,
        })
    }

    /// Serialize one flushed buffer set as one row group.
    pub fn write_row_group(&mut self, batch: &RecordBatch) -> Result<(), RcsfsError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| RcsfsError::Write("sink already closed".to_string()))?;
        writer
            .write(batch)
            .map_err(|e| RcsfsError::Write(e.to_string()))?;
        // Force the row-group boundary to coincide with the flush boundary.
        writer
            .flush()
            .map_err(|e| RcsfsError::Write(e.to_string()))?;
        self.row_groups += 1;
        self.rows += batch.num_rows() as u64;
        debug!(
            "row group {} written ({} rows, {} total)",
            self.row_groups,
            batch.num_rows(),
            self.rows
        );
        Ok(())
    }

    pub fn row_groups(&self) -> usize {
        self.row_groups
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Finalize the footer and atomically move the file into place.
    pub fn close(mut self) -> Result<(), RcsfsError> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| RcsfsError::Write("sink already closed".to_string()))?;
        writer
            .close()
            .map_err(|e| RcsfsError::Write(e.to_string()))?;
        fs::rename(&self.tmp_path, &self.final_path)?;
        debug!("finalized {}", self.final_path.display());
        Ok(())
    }

    /// Discard the staging file without producing output.
    pub fn abort(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        if self.writer.take().is_some() {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

impl Drop for ParquetSink {
    fn drop(&mut self) {
        // A sink dropped without close() is an aborted job.
        self.discard();
    }
}

fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    dest.with_file_name(name)
}

//! The Parquet reader adapter: a lazy, forward-only sequence of typed rows
//! reassembled from column chunks in schema order.
//!
//! The iterator pulls one record batch per step from the underlying
//! `ParquetRecordBatchReader` and drains it row by row, so memory stays
//! bounded by the batch size regardless of file size. Restart semantics are
//! simply "open the file again".

use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;

use arrow::array::{Array, Float64Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};

use crate::error::RcsfsError;
use crate::parquet_io::FileHeader;
use crate::record::format::format_record;
use crate::record::tokenize::{OrbitalFields, TokenizedRecord};
use crate::schema::{CsfSchema, FieldValue, PrimitiveKind};

const READ_BATCH_SIZE: usize = 16 * 1024;

/// One typed row, values in stored column order.
#[derive(Debug, Clone, PartialEq)]
pub struct CsfRow {
    pub values: Vec<FieldValue>,
}

/// Lazy row reader over a Parquet file produced by this engine (or any file
/// with a supported primitive schema).
pub struct CsfRowReader {
    inner: ParquetRecordBatchReader,
    schema: CsfSchema,
    header: FileHeader,
    pending: VecDeque<CsfRow>,
}

impl CsfRowReader {
    pub fn open(path: &Path) -> Result<Self, RcsfsError> {
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| RcsfsError::Read(format!("{}: {e}", path.display())))?;
        let header = FileHeader::from_key_value(
            builder.metadata().file_metadata().key_value_metadata(),
        )?;
        let schema = CsfSchema::from_arrow(builder.schema())?;
        let inner = builder
            .with_batch_size(READ_BATCH_SIZE)
            .build()
            .map_err(|e| RcsfsError::Read(e.to_string()))?;
        Ok(Self {
            inner,
            schema,
            header,
            pending: VecDeque::new(),
        })
    }

    pub fn schema(&self) -> &CsfSchema {
        &self.schema
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Reconstruct CSF-like text records: the three physical lines per row,
    /// in row order, up to `limit`. Requires the file to carry the engine's
    /// per-orbital column layout.
    pub fn read_csf_lines(
        mut self,
        limit: Option<usize>,
    ) -> Result<Vec<(String, String, String)>, RcsfsError> {
        let peel = self.header.peel_subshells.clone();
        expect_csf_layout(&self.schema, &peel)?;
        let mut out = Vec::new();
        while limit.map_or(true, |n| out.len() < n) {
            let Some(row) = self.next_row()? else {
                break;
            };
            let record = row_to_tokenized(&row, &peel)?;
            out.push(format_record(&record));
        }
        Ok(out)
    }

    fn next_row(&mut self) -> Result<Option<CsfRow>, RcsfsError> {
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Ok(Some(row));
            }
            match self.inner.next() {
                None => return Ok(None),
                Some(Err(e)) => return Err(RcsfsError::Read(e.to_string())),
                Some(Ok(batch)) => {
                    self.pending = batch_to_rows(&batch, &self.schema)?;
                }
            }
        }
    }
}

impl Iterator for CsfRowReader {
    type Item = Result<CsfRow, RcsfsError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

fn batch_to_rows(
    batch: &RecordBatch,
    schema: &CsfSchema,
) -> Result<VecDeque<CsfRow>, RcsfsError> {
    let mut rows: Vec<Vec<FieldValue>> =
        (0..batch.num_rows()).map(|_| Vec::with_capacity(schema.len())).collect();

    for (def, column) in schema.columns().iter().zip(batch.columns()) {
        match def.kind {
            PrimitiveKind::Int64 => {
                let array = downcast::<Int64Array>(column, &def.name)?;
                for (i, row) in rows.iter_mut().enumerate() {
                    row.push(if array.is_null(i) {
                        FieldValue::Null
                    } else {
                        FieldValue::Int(array.value(i))
                    });
                }
            }
            PrimitiveKind::Float64 => {
                let array = downcast::<Float64Array>(column, &def.name)?;
                for (i, row) in rows.iter_mut().enumerate() {
                    row.push(if array.is_null(i) {
                        FieldValue::Null
                    } else {
                        FieldValue::Float(array.value(i))
                    });
                }
            }
            PrimitiveKind::Utf8 => {
                let array = downcast::<StringArray>(column, &def.name)?;
                for (i, row) in rows.iter_mut().enumerate() {
                    row.push(if array.is_null(i) {
                        FieldValue::Null
                    } else {
                        FieldValue::Str(array.value(i).to_string())
                    });
                }
            }
        }
    }

    Ok(rows.into_iter().map(|values| CsfRow { values }).collect())
}

fn downcast<'a, T: 'static>(
    column: &'a arrow::array::ArrayRef,
    name: &str,
) -> Result<&'a T, RcsfsError> {
    column.as_any().downcast_ref::<T>().ok_or_else(|| {
        RcsfsError::Read(format!(
            "column {name:?} does not match its declared type"
        ))
    })
}

/// Check that the stored schema is the engine's per-orbital layout for the
/// peel list carried in the footer.
fn expect_csf_layout(schema: &CsfSchema, peel: &[String]) -> Result<(), RcsfsError> {
    let expected = CsfSchema::declared(peel);
    let names_match = schema.len() == expected.len()
        && schema
            .columns()
            .iter()
            .zip(expected.columns())
            .all(|(a, b)| a.name == b.name);
    if !names_match {
        return Err(RcsfsError::Read(
            "file does not carry the CSF per-orbital column layout".to_string(),
        ));
    }
    Ok(())
}

/// Rebuild a tokenized record from a stored row (declared layout only).
fn row_to_tokenized(row: &CsfRow, peel: &[String]) -> Result<TokenizedRecord, RcsfsError> {
    let values = &row.values;
    let int = |v: &FieldValue| match v {
        FieldValue::Int(i) => Ok(*i),
        other => Err(RcsfsError::Read(format!("expected integer, got {other:?}"))),
    };
    let float = |v: &FieldValue| match v {
        FieldValue::Float(f) => Ok(*f),
        FieldValue::Int(i) => Ok(*i as f64),
        other => Err(RcsfsError::Read(format!("expected float, got {other:?}"))),
    };
    let opt_float = |v: &FieldValue| match v {
        FieldValue::Null => Ok(None),
        other => float(other).map(Some),
    };

    let index = int(&values[0])?;
    let mut orbitals = Vec::with_capacity(peel.len());
    for (k, label) in peel.iter().enumerate() {
        let base = 1 + 3 * k;
        orbitals.push((
            label.clone(),
            OrbitalFields {
                occ: int(&values[base])?,
                j_sub: opt_float(&values[base + 1])?,
                j_coup: opt_float(&values[base + 2])?,
            },
        ));
    }
    let j_total = float(&values[values.len() - 2])?;
    let parity = match &values[values.len() - 1] {
        FieldValue::Str(s) => s.clone(),
        other => {
            return Err(RcsfsError::Read(format!(
                "expected parity string, got {other:?}"
            )))
        }
    };
    Ok(TokenizedRecord {
        index,
        line: 0,
        orbitals,
        j_total,
        parity,
    })
}

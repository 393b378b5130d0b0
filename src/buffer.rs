//! In-memory columnar accumulators: one growable Arrow builder per schema
//! column, appended row by row and flushed as a `RecordBatch` per row group.
//!
//! The alignment invariant: every buffer holds the same number of values
//! between flushes. `append_row` validates the entire row against the frozen
//! schema before touching any builder, so a rejected row never leaves
//! partial-row state behind.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Builder, Int64Builder, StringBuilder};
use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;

use crate::error::RcsfsError;
use crate::schema::{CsfSchema, FieldValue, PrimitiveKind};

enum ColumnBuffer {
    Int64(Int64Builder),
    Float64(Float64Builder),
    Utf8(StringBuilder),
}

impl ColumnBuffer {
    fn for_kind(kind: PrimitiveKind) -> Self {
        match kind {
            PrimitiveKind::Int64 => Self::Int64(Int64Builder::new()),
            PrimitiveKind::Float64 => Self::Float64(Float64Builder::new()),
            PrimitiveKind::Utf8 => Self::Utf8(StringBuilder::new()),
        }
    }

    /// Append one pre-validated value. Integers are widened on the fly when
    /// the column is floating-point.
    fn append(&mut self, value: &FieldValue) {
        match (self, value) {
            (Self::Int64(b), FieldValue::Int(v)) => b.append_value(*v),
            (Self::Int64(b), FieldValue::Null) => b.append_null(),
            (Self::Float64(b), FieldValue::Float(v)) => b.append_value(*v),
            (Self::Float64(b), FieldValue::Int(v)) => b.append_value(*v as f64),
            (Self::Float64(b), FieldValue::Null) => b.append_null(),
            (Self::Utf8(b), FieldValue::Str(v)) => b.append_value(v),
            (Self::Utf8(b), FieldValue::Null) => b.append_null(),
            // check_row already rejected everything else.
            _ => unreachable!("append after successful schema validation"),
        }
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            Self::Int64(b) => Arc::new(b.finish()),
            Self::Float64(b) => Arc::new(b.finish()),
            Self::Utf8(b) => Arc::new(b.finish()),
        }
    }
}

/// The per-job set of column buffers, created only after the schema freezes.
pub struct ColumnBufferSet {
    arrow_schema: SchemaRef,
    schema: CsfSchema,
    buffers: Vec<ColumnBuffer>,
    rows: usize,
}

impl ColumnBufferSet {
    pub fn new(schema: CsfSchema) -> Self {
        let buffers = schema
            .columns()
            .iter()
            .map(|c| ColumnBuffer::for_kind(c.kind))
            .collect();
        Self {
            arrow_schema: schema.to_arrow(),
            schema,
            buffers,
            rows: 0,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn arrow_schema(&self) -> SchemaRef {
        Arc::clone(&self.arrow_schema)
    }

    /// Distribute one record's fields into the per-column buffers in schema
    /// order. Validation happens first; on error no column is touched.
    pub fn append_row(&mut self, values: &[FieldValue]) -> Result<(), RcsfsError> {
        self.schema.check_row(values)?;
        for (buffer, value) in self.buffers.iter_mut().zip(values) {
            buffer.append(value);
        }
        self.rows += 1;
        Ok(())
    }

    /// Hand the buffered rows over as one `RecordBatch` (the row group about
    /// to be written) and reset the buffers, preserving the schema.
    pub fn flush(&mut self) -> Result<RecordBatch, RcsfsError> {
        let arrays: Vec<ArrayRef> = self.buffers.iter_mut().map(ColumnBuffer::finish).collect();
        self.rows = 0;
        RecordBatch::try_new(Arc::clone(&self.arrow_schema), arrays).map_err(RcsfsError::from)
    }
}

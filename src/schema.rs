//! Canonical column types and the observe-then-freeze schema builder.
//!
//! A conversion job owns exactly one [`CsfSchema`]. It is produced either
//! from the peel subshell list declared in the file preamble (the common
//! case) or by observing the first few tokenized records, and is immutable
//! from that point on. Column buffers are only ever created against a frozen
//! schema.

use std::fmt;
use std::sync::Arc;

use arrow_schema::{DataType as ArrowDataType, Field, Schema, SchemaRef};
use serde::{Deserialize, Serialize};

use crate::error::RcsfsError;

/// The primitive column types a CSF conversion can produce.
///
/// This enum is the internal, type-safe counterpart of the Arrow types we
/// emit, and the unit of the widening rules: `Int64` may widen to `Float64`,
/// nothing widens to or from `Utf8`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Int64,
    Float64,
    Utf8,
}

impl PrimitiveKind {
    pub fn to_arrow_type(self) -> ArrowDataType {
        match self {
            Self::Int64 => ArrowDataType::Int64,
            Self::Float64 => ArrowDataType::Float64,
            Self::Utf8 => ArrowDataType::Utf8,
        }
    }

    pub fn from_arrow_type(arrow_type: &ArrowDataType) -> Result<Self, RcsfsError> {
        match arrow_type {
            ArrowDataType::Int64 => Ok(Self::Int64),
            ArrowDataType::Float64 => Ok(Self::Float64),
            ArrowDataType::Utf8 => Ok(Self::Utf8),
            dt => Err(RcsfsError::Read(format!(
                "unsupported Arrow type {dt:?} in stored schema"
            ))),
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// One dynamically-typed field value produced by the tokenizer.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Str(String),
    Null,
}

impl FieldValue {
    /// The kind this value would demand from a column, `None` for nulls.
    pub fn kind(&self) -> Option<PrimitiveKind> {
        match self {
            FieldValue::Int(_) => Some(PrimitiveKind::Int64),
            FieldValue::Float(_) => Some(PrimitiveKind::Float64),
            FieldValue::Str(_) => Some(PrimitiveKind::Utf8),
            FieldValue::Null => None,
        }
    }

    /// Whether this value can land in a column of `kind` without loss.
    /// Integers fit float columns; everything else must match exactly.
    pub fn fits(&self, kind: PrimitiveKind) -> bool {
        match (self.kind(), kind) {
            (None, _) => true,
            (Some(PrimitiveKind::Int64), PrimitiveKind::Float64) => true,
            (Some(k), want) => k == want,
        }
    }
}

/// One (name, type, nullability) schema entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub kind: PrimitiveKind,
    pub nullable: bool,
}

/// The frozen, ordered column layout of one conversion job.
#[derive(Debug, Clone, PartialEq)]
pub struct CsfSchema {
    columns: Vec<ColumnDef>,
}

impl CsfSchema {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self { columns }
    }

    /// Build the column layout for a file whose preamble declares its peel
    /// subshells. Per orbital: an electron count, an intermediate J and a
    /// coupling J; then the record-level total J and parity.
    pub fn declared(peel_subshells: &[String]) -> Self {
        let mut columns = Vec::with_capacity(3 + 3 * peel_subshells.len());
        columns.push(ColumnDef {
            name: "csf_index".to_string(),
            kind: PrimitiveKind::Int64,
            nullable: false,
        });
        for label in peel_subshells {
            columns.push(ColumnDef {
                name: format!("{label}_occ"),
                kind: PrimitiveKind::Int64,
                nullable: false,
            });
            columns.push(ColumnDef {
                name: format!("{label}_jsub"),
                kind: PrimitiveKind::Float64,
                nullable: true,
            });
            columns.push(ColumnDef {
                name: format!("{label}_jcoup"),
                kind: PrimitiveKind::Float64,
                nullable: true,
            });
        }
        columns.push(ColumnDef {
            name: "j_total".to_string(),
            kind: PrimitiveKind::Float64,
            nullable: false,
        });
        columns.push(ColumnDef {
            name: "parity".to_string(),
            kind: PrimitiveKind::Utf8,
            nullable: false,
        });
        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn to_arrow(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|c| Field::new(&c.name, c.kind.to_arrow_type(), c.nullable))
            .collect();
        Arc::new(Schema::new(fields))
    }

    /// Reconstruct the frozen layout from an Arrow schema read back out of a
    /// Parquet footer.
    pub fn from_arrow(schema: &Schema) -> Result<Self, RcsfsError> {
        let columns = schema
            .fields()
            .iter()
            .map(|f| {
                Ok(ColumnDef {
                    name: f.name().clone(),
                    kind: PrimitiveKind::from_arrow_type(f.data_type())?,
                    nullable: f.is_nullable(),
                })
            })
            .collect::<Result<Vec<_>, RcsfsError>>()?;
        Ok(Self { columns })
    }

    /// Validate a full row against the frozen layout. Returns an error on
    /// the first field that cannot be widened in, leaving the caller free to
    /// guarantee no partial-row state (nothing is appended on failure).
    pub fn check_row(&self, values: &[FieldValue]) -> Result<(), RcsfsError> {
        if values.len() != self.columns.len() {
            return Err(RcsfsError::SchemaConflict {
                column: String::new(),
                reason: format!(
                    "row has {} fields, schema has {} columns",
                    values.len(),
                    self.columns.len()
                ),
            });
        }
        for (value, def) in values.iter().zip(&self.columns) {
            if matches!(value, FieldValue::Null) {
                if !def.nullable {
                    return Err(RcsfsError::SchemaConflict {
                        column: def.name.clone(),
                        reason: "null value in non-nullable column".to_string(),
                    });
                }
                continue;
            }
            if !value.fits(def.kind) {
                return Err(RcsfsError::SchemaConflict {
                    column: def.name.clone(),
                    reason: format!(
                        "value {value:?} cannot be widened into {} column",
                        def.kind
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Accumulates observed field shapes across the first records of a job and
/// freezes them into a [`CsfSchema`].
///
/// Only the inference path uses this type; files with a declared peel list go
/// straight through [`CsfSchema::declared`].
#[derive(Debug)]
pub struct SchemaBuilder {
    names: Vec<String>,
    kinds: Vec<Option<PrimitiveKind>>,
    nullable: Vec<bool>,
    observed: usize,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            kinds: Vec::new(),
            nullable: Vec::new(),
            observed: 0,
        }
    }

    /// Number of records observed so far.
    pub fn observed(&self) -> usize {
        self.observed
    }

    /// Feed one tokenized record into the inference. The first record fixes
    /// column count, names and order; later records may only widen types
    /// (integral -> float) or mark columns nullable.
    pub fn observe(&mut self, fields: &[(String, FieldValue)]) -> Result<(), RcsfsError> {
        if self.observed == 0 {
            for (name, value) in fields {
                self.names.push(name.clone());
                self.kinds.push(value.kind());
                self.nullable.push(matches!(value, FieldValue::Null));
            }
            self.observed = 1;
            return Ok(());
        }
        if fields.len() != self.names.len() {
            return Err(RcsfsError::SchemaConflict {
                column: String::new(),
                reason: format!(
                    "record has {} fields, previous records had {}",
                    fields.len(),
                    self.names.len()
                ),
            });
        }
        for (i, (name, value)) in fields.iter().enumerate() {
            if *name != self.names[i] {
                return Err(RcsfsError::SchemaConflict {
                    column: name.clone(),
                    reason: format!("field order changed, expected {:?}", self.names[i]),
                });
            }
            match (self.kinds[i], value.kind()) {
                (_, None) => self.nullable[i] = true,
                (None, Some(k)) => self.kinds[i] = Some(k),
                (Some(PrimitiveKind::Int64), Some(PrimitiveKind::Float64)) => {
                    // Tie-break rule: one float observation makes the whole
                    // column floating-point.
                    self.kinds[i] = Some(PrimitiveKind::Float64);
                }
                (Some(PrimitiveKind::Float64), Some(PrimitiveKind::Int64)) => {}
                (Some(have), Some(seen)) if have == seen => {}
                (Some(have), Some(seen)) => {
                    return Err(RcsfsError::SchemaConflict {
                        column: name.clone(),
                        reason: format!("observed both {have} and {seen} values"),
                    });
                }
            }
        }
        self.observed += 1;
        Ok(())
    }

    /// Freeze the accumulated shape. Columns that only ever held nulls
    /// default to nullable Float64.
    pub fn freeze(self) -> Result<CsfSchema, RcsfsError> {
        if self.observed == 0 {
            return Err(RcsfsError::SchemaConflict {
                column: String::new(),
                reason: "cannot freeze a schema with no observed records".to_string(),
            });
        }
        let columns = self
            .names
            .into_iter()
            .zip(self.kinds)
            .zip(self.nullable)
            .map(|((name, kind), nullable)| ColumnDef {
                name,
                kind: kind.unwrap_or(PrimitiveKind::Float64),
                nullable,
            })
            .collect();
        Ok(CsfSchema::new(columns))
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(values: Vec<(&str, FieldValue)>) -> Vec<(String, FieldValue)> {
        values.into_iter().map(|(n, v)| (n.to_string(), v)).collect()
    }

    #[test]
    fn declared_schema_layout() {
        let peel = vec!["5s".to_string(), "4d-".to_string()];
        let schema = CsfSchema::declared(&peel);

        assert_eq!(schema.len(), 9);
        assert_eq!(schema.columns()[0].name, "csf_index");
        assert_eq!(schema.columns()[1].name, "5s_occ");
        assert_eq!(schema.columns()[1].kind, PrimitiveKind::Int64);
        assert!(!schema.columns()[1].nullable);
        assert_eq!(schema.columns()[2].name, "5s_jsub");
        assert!(schema.columns()[2].nullable);
        assert_eq!(schema.columns()[7].name, "j_total");
        assert_eq!(schema.columns()[8].kind, PrimitiveKind::Utf8);
    }

    #[test]
    fn arrow_roundtrip_preserves_layout() {
        let schema = CsfSchema::declared(&["5s".to_string()]);
        let arrow = schema.to_arrow();
        let back = CsfSchema::from_arrow(&arrow).unwrap();
        assert_eq!(schema, back);
    }

    #[test]
    fn inference_widens_int_to_float() {
        let mut builder = SchemaBuilder::new();
        builder
            .observe(&fields(vec![("a", FieldValue::Int(1))]))
            .unwrap();
        builder
            .observe(&fields(vec![("a", FieldValue::Float(1.5))]))
            .unwrap();
        let schema = builder.freeze().unwrap();
        assert_eq!(schema.columns()[0].kind, PrimitiveKind::Float64);
    }

    #[test]
    fn inference_keeps_float_on_later_ints() {
        let mut builder = SchemaBuilder::new();
        builder
            .observe(&fields(vec![("a", FieldValue::Float(0.5))]))
            .unwrap();
        builder
            .observe(&fields(vec![("a", FieldValue::Int(3))]))
            .unwrap();
        let schema = builder.freeze().unwrap();
        assert_eq!(schema.columns()[0].kind, PrimitiveKind::Float64);
    }

    #[test]
    fn inference_marks_nullable_and_defaults_all_null_columns() {
        let mut builder = SchemaBuilder::new();
        builder
            .observe(&fields(vec![
                ("a", FieldValue::Null),
                ("b", FieldValue::Int(2)),
            ]))
            .unwrap();
        builder
            .observe(&fields(vec![
                ("a", FieldValue::Null),
                ("b", FieldValue::Null),
            ]))
            .unwrap();
        let schema = builder.freeze().unwrap();
        assert_eq!(schema.columns()[0].kind, PrimitiveKind::Float64);
        assert!(schema.columns()[0].nullable);
        assert_eq!(schema.columns()[1].kind, PrimitiveKind::Int64);
        assert!(schema.columns()[1].nullable);
    }

    #[test]
    fn inference_rejects_mixed_text_and_numbers() {
        let mut builder = SchemaBuilder::new();
        builder
            .observe(&fields(vec![("a", FieldValue::Int(1))]))
            .unwrap();
        let err = builder
            .observe(&fields(vec![("a", FieldValue::Str("x".to_string()))]))
            .unwrap_err();
        assert!(matches!(err, RcsfsError::SchemaConflict { .. }));
    }

    #[test]
    fn inference_rejects_field_count_drift() {
        let mut builder = SchemaBuilder::new();
        builder
            .observe(&fields(vec![("a", FieldValue::Int(1))]))
            .unwrap();
        let err = builder
            .observe(&fields(vec![
                ("a", FieldValue::Int(1)),
                ("b", FieldValue::Int(2)),
            ]))
            .unwrap_err();
        assert!(matches!(err, RcsfsError::SchemaConflict { .. }));
    }

    #[test]
    fn check_row_accepts_int_into_float_column() {
        let schema = CsfSchema::new(vec![ColumnDef {
            name: "j".to_string(),
            kind: PrimitiveKind::Float64,
            nullable: false,
        }]);
        assert!(schema.check_row(&[FieldValue::Int(2)]).is_ok());
    }

    #[test]
    fn check_row_rejects_float_into_int_column() {
        let schema = CsfSchema::new(vec![ColumnDef {
            name: "occ".to_string(),
            kind: PrimitiveKind::Int64,
            nullable: false,
        }]);
        let err = schema.check_row(&[FieldValue::Float(1.5)]).unwrap_err();
        assert!(matches!(err, RcsfsError::SchemaConflict { .. }));
    }

    #[test]
    fn check_row_rejects_null_in_required_column() {
        let schema = CsfSchema::new(vec![ColumnDef {
            name: "occ".to_string(),
            kind: PrimitiveKind::Int64,
            nullable: false,
        }]);
        assert!(schema.check_row(&[FieldValue::Null]).is_err());
    }
}

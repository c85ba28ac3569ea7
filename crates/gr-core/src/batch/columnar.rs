use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanBuilder, Float32Builder, Float64Builder, Int32Builder, Int64Builder,
    StringBuilder,
};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::{RecordBatch as ArrowBatch, RecordBatchOptions};
use orion_error::StructError;

use super::{RecordBatch, WireBatch};
use crate::error::{CoreReason, CoreResult};
use crate::schema::{ParameterSpec, SchemaDefinition};
use crate::value::{Value, ValueEncoding};

impl RecordBatch {
    /// Arrow schema for the visible columns, all nullable.
    pub fn arrow_schema(&self) -> Schema {
        let fields: Vec<Field> = self
            .schema
            .parameters()
            .map(|p| Field::new(p.name.as_str(), p.encoding.arrow_type(), true))
            .collect();
        Schema::new(fields)
    }

    /// Convert to an Arrow record batch. Absent columns and fill values
    /// become nulls; every column has `self.len()` rows.
    pub fn to_arrow(&mut self) -> CoreResult<ArrowBatch> {
        let rows = self.len();
        let specs: Vec<ParameterSpec> = self.schema.parameters().cloned().collect();
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(specs.len());
        for spec in &specs {
            let values = self.resolve_column(&spec.name, &mut Vec::new());
            arrays.push(build_array(spec, values.as_deref(), rows)?);
        }
        assemble(self.arrow_schema(), arrays, rows)
    }
}

impl WireBatch {
    /// Convert to Arrow with the column types `schema` declares. Columns
    /// keep schema order; only columns carried by the wire batch appear.
    pub fn to_arrow(&self, schema: &SchemaDefinition) -> CoreResult<ArrowBatch> {
        for name in self.columns.keys() {
            if !schema.contains(name) {
                return StructError::from(CoreReason::UnknownColumn)
                    .with_detail(format!("wire column {name:?} is not in schema {:?}", schema.id()))
                    .err();
            }
        }
        let rows = self.row_count();
        let mut fields = Vec::with_capacity(self.columns.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.columns.len());
        for spec in schema.all_parameters() {
            let Some(values) = self.columns.get(&spec.name) else {
                continue;
            };
            fields.push(Field::new(spec.name.as_str(), spec.encoding.arrow_type(), true));
            arrays.push(build_array(spec, values.as_deref(), rows)?);
        }
        assemble(Schema::new(fields), arrays, rows)
    }
}

fn assemble(schema: Schema, arrays: Vec<ArrayRef>, rows: usize) -> CoreResult<ArrowBatch> {
    let options = RecordBatchOptions::new().with_row_count(Some(rows));
    ArrowBatch::try_new_with_options(Arc::new(schema), arrays, &options).map_err(|e| {
        StructError::from(CoreReason::ValueEncoding)
            .with_detail(format!("arrow conversion failed: {e}"))
    })
}

/// Cell at `i`, `None` for missing, fill or out-of-range positions.
fn cell<'a>(spec: &ParameterSpec, values: Option<&'a [Value]>, i: usize) -> Option<&'a Value> {
    values
        .and_then(|vs| vs.get(i))
        .filter(|v| !spec.is_fill(v))
}

fn mismatch<T>(spec: &ParameterSpec, v: &Value) -> CoreResult<T> {
    StructError::from(CoreReason::ValueEncoding)
        .with_detail(format!(
            "column {:?}: value {v} does not match encoding {}",
            spec.name, spec.encoding
        ))
        .err()
}

fn build_array(spec: &ParameterSpec, values: Option<&[Value]>, rows: usize) -> CoreResult<ArrayRef> {
    Ok(match spec.encoding {
        ValueEncoding::Float32 => {
            let mut b = Float32Builder::with_capacity(rows);
            for i in 0..rows {
                match cell(spec, values, i) {
                    None => b.append_null(),
                    Some(v) => match v.as_f64() {
                        Some(f) => b.append_value(f as f32),
                        None => return mismatch(spec, v),
                    },
                }
            }
            Arc::new(b.finish())
        }
        ValueEncoding::Float64 => {
            let mut b = Float64Builder::with_capacity(rows);
            for i in 0..rows {
                match cell(spec, values, i) {
                    None => b.append_null(),
                    Some(v) => match v.as_f64() {
                        Some(f) => b.append_value(f),
                        None => return mismatch(spec, v),
                    },
                }
            }
            Arc::new(b.finish())
        }
        ValueEncoding::Int32 => {
            let mut b = Int32Builder::with_capacity(rows);
            for i in 0..rows {
                match cell(spec, values, i) {
                    None => b.append_null(),
                    Some(Value::Int(n)) => match i32::try_from(*n) {
                        Ok(n) => b.append_value(n),
                        Err(_) => return mismatch(spec, &Value::Int(*n)),
                    },
                    Some(v) => return mismatch(spec, v),
                }
            }
            Arc::new(b.finish())
        }
        ValueEncoding::Int64 => {
            let mut b = Int64Builder::with_capacity(rows);
            for i in 0..rows {
                match cell(spec, values, i) {
                    None => b.append_null(),
                    Some(Value::Int(n)) => b.append_value(*n),
                    Some(v) => return mismatch(spec, v),
                }
            }
            Arc::new(b.finish())
        }
        ValueEncoding::Bool => {
            let mut b = BooleanBuilder::with_capacity(rows);
            for i in 0..rows {
                match cell(spec, values, i) {
                    None => b.append_null(),
                    Some(Value::Bool(x)) => b.append_value(*x),
                    Some(v) => return mismatch(spec, v),
                }
            }
            Arc::new(b.finish())
        }
        ValueEncoding::Utf8 => {
            let mut b = StringBuilder::with_capacity(rows, rows * 8);
            for i in 0..rows {
                match cell(spec, values, i) {
                    None => b.append_null(),
                    Some(Value::Str(s)) => b.append_value(s),
                    Some(v) => return mismatch(spec, v),
                }
            }
            Arc::new(b.finish())
        }
    })
}

//! Schema-bound record batches ("granules").
//!
//! A [`RecordBatch`] holds named columns for one schema (or restricted view)
//! and materializes derived and lookup columns on demand. Columns are stored
//! with fill values in place of missing samples; a column with no present
//! sample is not stored at all and reads as absent.

mod columnar;
mod derive;
mod wire;


use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::sync::Arc;

use orion_error::StructError;

use crate::error::{CoreReason, CoreResult};
use crate::function::FunctionRegistry;
use crate::lookup::LookupValueResolver;
use crate::schema::{ParameterKind, SchemaDefinition};
use crate::value::{ColumnInput, Value};

pub use wire::{Provenance, WireBatch};

// ---------------------------------------------------------------------------
// BatchContext
// ---------------------------------------------------------------------------

/// Collaborators and stream settings a batch evaluates against.
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub functions: Arc<FunctionRegistry>,
    pub lookups: Option<LookupValueResolver>,
    /// Stream configuration, e.g. `reference_designator` for lookup scoping.
    pub stream_config: BTreeMap<String, String>,
}

impl Default for BatchContext {
    fn default() -> Self {
        Self {
            functions: Arc::new(FunctionRegistry::with_builtins()),
            lookups: None,
            stream_config: BTreeMap::new(),
        }
    }
}

impl BatchContext {
    pub fn new(functions: Arc<FunctionRegistry>) -> Self {
        Self {
            functions,
            lookups: None,
            stream_config: BTreeMap::new(),
        }
    }

    pub fn with_lookups(mut self, lookups: LookupValueResolver) -> Self {
        self.lookups = Some(lookups);
        self
    }

    pub fn with_stream_config(mut self, stream_config: BTreeMap<String, String>) -> Self {
        self.stream_config = stream_config;
        self
    }
}

// ---------------------------------------------------------------------------
// RecordBatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecordBatch {
    schema: Arc<SchemaDefinition>,
    ctx: BatchContext,
    columns: BTreeMap<String, Vec<Value>>,
    /// Lookup coefficients fetched from the store, broadcast on read.
    lookup_scalars: BTreeMap<String, Value>,
    /// Columns in `columns` that were computed, dropped whenever an input
    /// may have changed.
    derived: BTreeSet<String>,
    /// Derivations that failed since the last input change.
    failed: BTreeSet<String>,
}

impl RecordBatch {
    pub fn new(schema: Arc<SchemaDefinition>, ctx: BatchContext) -> Self {
        Self {
            schema,
            ctx,
            columns: BTreeMap::new(),
            lookup_scalars: BTreeMap::new(),
            derived: BTreeSet::new(),
            failed: BTreeSet::new(),
        }
    }

    pub fn schema(&self) -> &Arc<SchemaDefinition> {
        &self.schema
    }

    pub fn context(&self) -> &BatchContext {
        &self.ctx
    }

    /// Replace the column `name`. Missing samples become the fill value; an
    /// input with no present non-fill sample leaves the column absent.
    pub fn set(&mut self, name: &str, values: impl Into<ColumnInput>) -> CoreResult<()> {
        let spec = self.available_parameter(name)?;
        let input: ColumnInput = values.into();
        let encoding = spec.encoding;
        let fill = spec.fill_value.clone();

        self.invalidate_derived();
        self.derived.remove(name);
        self.lookup_scalars.remove(name);
        if !input.has_present() {
            self.columns.remove(name);
            return Ok(());
        }
        let mut stored = Vec::with_capacity(input.0.len());
        for v in input.0 {
            stored.push(match v {
                Some(v) => encoding.coerce(&v).map_err(|e| {
                    StructError::from(CoreReason::ValueEncoding)
                        .with_detail(format!("column {name:?}: {e}"))
                })?,
                None => fill.clone(),
            });
        }
        if stored.iter().all(|v| *v == fill) {
            self.columns.remove(name);
            return Ok(());
        }
        self.columns.insert(name.to_string(), stored);
        Ok(())
    }

    /// Store already-encoded data for any schema column (restriction
    /// ignored). Used by the reader and wire decoding.
    pub fn put_raw(&mut self, name: &str, values: Vec<Value>) -> CoreResult<()> {
        let spec = self.schema.parameter(name).ok_or_else(|| {
            StructError::from(CoreReason::UnknownColumn).with_detail(format!(
                "column {name:?} is not in schema {:?}",
                self.schema.id()
            ))
        })?;
        let encoding = spec.encoding;
        let coerced = values
            .iter()
            .map(|v| encoding.coerce(v))
            .collect::<CoreResult<Vec<_>>>()?;
        self.invalidate_derived();
        self.derived.remove(name);
        self.lookup_scalars.remove(name);
        self.columns.insert(name.to_string(), coerced);
        Ok(())
    }

    /// Values of `name`, evaluating a derived column if needed. `None` when
    /// the column is absent or every element is the fill value.
    pub fn get(&mut self, name: &str) -> CoreResult<Option<Vec<Value>>> {
        let spec = self.available_parameter(name)?;
        let fill = spec.fill_value.clone();
        let values = self.resolve_column(name, &mut Vec::new());
        Ok(values.filter(|vs| vs.iter().any(|v| *v != fill)))
    }

    /// Whether `name` currently holds data (set, read, fetched or computed).
    pub fn is_set(&self, name: &str) -> bool {
        self.columns.contains_key(name) || self.lookup_scalars.contains_key(name)
    }

    /// Row count: the temporal column's length, otherwise the longest
    /// column.
    pub fn len(&self) -> usize {
        match self.columns.get(self.schema.temporal()) {
            Some(t) => t.len(),
            None => self.columns.values().map(Vec::len).max().unwrap_or(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve every unset lookup column that has a document key. Columns
    /// that cannot be resolved stay absent. Returns the number resolved.
    pub fn fetch_lookup_values(&mut self) -> usize {
        let Some(resolver) = self.ctx.lookups.clone() else {
            log::debug!("no lookup store bound; lookup columns stay absent");
            return 0;
        };
        let pending: Vec<_> = self
            .schema
            .all_parameters()
            .iter()
            .filter(|p| p.kind == ParameterKind::Lookup && !self.is_set(&p.name))
            .filter_map(|p| {
                let binding = p.lookup.as_ref()?;
                let key = binding.document_key.clone()?;
                Some((p.name.clone(), key, binding.name.clone(), p.encoding))
            })
            .collect();

        let mut resolved = 0;
        for (column, key, value_name, encoding) in pending {
            match resolver.resolve(&self.ctx.stream_config, &key, &value_name) {
                Ok(Some(v)) => match encoding.coerce(&v) {
                    Ok(v) => {
                        self.lookup_scalars.insert(column, v);
                        resolved += 1;
                    }
                    Err(e) => log::warn!("lookup {key}/{value_name} for {column:?}: {e}"),
                },
                Ok(None) => log::debug!("lookup {key}/{value_name} for {column:?} not found"),
                Err(e) => log::warn!("lookup {key}/{value_name} for {column:?} failed: {e}"),
            }
        }
        if resolved > 0 {
            self.invalidate_derived();
        }
        resolved
    }

    /// Lookup columns with no store binding: the caller has to `set` them
    /// before dependent derived columns can be computed.
    pub fn lookup_values(&self) -> Vec<String> {
        self.schema
            .parameters()
            .filter(|p| p.kind == ParameterKind::Lookup)
            .filter(|p| p.lookup.as_ref().is_none_or(|b| b.document_key.is_none()))
            .map(|p| p.name.clone())
            .collect()
    }

    /// Rows `range` of `columns` (plus the temporal column) as a new batch
    /// restricted to those columns. Derived columns are evaluated on `self`
    /// first.
    pub fn slice(&mut self, range: Range<usize>, columns: &[String]) -> CoreResult<RecordBatch> {
        let temporal = self.schema.temporal().to_string();
        let mut fields: Vec<String> = columns.to_vec();
        if !fields.contains(&temporal) {
            fields.push(temporal);
        }
        let view = self.schema.restrict(self.schema.id(), &fields)?;
        let mut out = RecordBatch::new(Arc::new(view), self.ctx.clone());
        for name in &fields {
            let Some(values) = self.resolve_column(name, &mut Vec::new()) else {
                out.failed.insert(name.clone());
                continue;
            };
            let end = range.end.min(values.len());
            let start = range.start.min(end);
            out.columns.insert(name.clone(), values[start..end].to_vec());
        }
        Ok(out)
    }

    fn available_parameter(&self, name: &str) -> CoreResult<&crate::schema::ParameterSpec> {
        match self.schema.parameter(name) {
            Some(spec) if self.schema.is_available(name) => Ok(spec),
            _ => StructError::from(CoreReason::UnknownColumn)
                .with_detail(format!(
                    "column {name:?} is not available in schema {:?}",
                    self.schema.id()
                ))
                .err(),
        }
    }

    fn invalidate_derived(&mut self) {
        for name in std::mem::take(&mut self.derived) {
            self.columns.remove(&name);
        }
        self.failed.clear();
    }
}

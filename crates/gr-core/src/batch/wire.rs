use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use orion_error::StructError;
use serde::{Deserialize, Serialize};

use super::{BatchContext, RecordBatch};
use crate::error::{CoreReason, CoreResult};
use crate::schema::SchemaRegistry;
use crate::value::Value;

/// Producer information stamped onto outgoing batches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Provenance {
    pub producer_id: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Provenance {
    pub fn new(producer_id: impl Into<String>) -> Self {
        Self {
            producer_id: Some(producer_id.into()),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The transport form of a batch. `null` columns are explicitly absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireBatch {
    pub schema_ref: String,
    pub columns: BTreeMap<String, Option<Vec<Value>>>,
    #[serde(default)]
    pub producer_id: Option<String>,
    #[serde(default)]
    pub provenance_metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl WireBatch {
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns.get(name).and_then(|c| c.as_deref())
    }

    /// Length of the longest present column.
    pub fn row_count(&self) -> usize {
        self.columns
            .values()
            .filter_map(|c| c.as_ref().map(Vec::len))
            .max()
            .unwrap_or(0)
    }
}

impl RecordBatch {
    /// Wire form of every visible column, derived columns evaluated. The
    /// creation timestamp is taken now.
    pub fn to_wire(&mut self, provenance: &Provenance) -> WireBatch {
        let mut columns = BTreeMap::new();
        for name in self.schema.column_names() {
            let values = self.resolve_column(&name, &mut Vec::new());
            columns.insert(name, values);
        }
        WireBatch {
            schema_ref: self.schema.id().to_string(),
            columns,
            producer_id: provenance.producer_id.clone(),
            provenance_metadata: provenance.metadata.clone(),
            created_at: Utc::now(),
        }
    }

    /// Rebuild a batch bound to the schema `wire.schema_ref` names.
    pub fn from_wire(
        wire: WireBatch,
        registry: &dyn SchemaRegistry,
        ctx: BatchContext,
    ) -> CoreResult<RecordBatch> {
        let schema = registry.resolve(&wire.schema_ref)?;
        let mut batch = RecordBatch::new(Arc::clone(&schema), ctx);
        for (name, values) in wire.columns {
            if !schema.is_available(&name) {
                return StructError::from(CoreReason::UnknownColumn)
                    .with_detail(format!(
                        "wire column {name:?} is not in schema {:?}",
                        schema.id()
                    ))
                    .err();
            }
            if let Some(values) = values {
                batch.put_raw(&name, values)?;
            }
        }
        Ok(batch)
    }
}

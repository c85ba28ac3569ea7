use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use orion_error::StructError;

use super::{SchemaDefinition, parse_schema_document};
use crate::error::{CoreReason, CoreResult};

/// Read-only schema lookup by id (full schemas and views alike).
pub trait SchemaRegistry: Send + Sync {
    fn resolve(&self, id: &str) -> CoreResult<Arc<SchemaDefinition>>;
    fn ids(&self) -> Vec<String>;
}

/// Schemas and views held in memory.
#[derive(Debug, Default)]
pub struct MemorySchemaRegistry {
    schemas: HashMap<String, Arc<SchemaDefinition>>,
}

impl MemorySchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema or view. Ids must be unique across both.
    pub fn insert(&mut self, schema: SchemaDefinition) -> CoreResult<()> {
        let id = schema.id().to_string();
        if self.schemas.contains_key(&id) {
            return StructError::from(CoreReason::Configuration)
                .with_detail(format!("schema id {id:?} registered twice"))
                .err();
        }
        self.schemas.insert(id, Arc::new(schema));
        Ok(())
    }

    /// Parse a schema document and register the schema and its views.
    /// Returns the registered ids.
    pub fn load_str(&mut self, toml_str: &str) -> CoreResult<Vec<String>> {
        let doc = parse_schema_document(toml_str)?;
        let mut ids = Vec::with_capacity(1 + doc.views.len());
        for def in std::iter::once(doc.schema).chain(doc.views) {
            ids.push(def.id().to_string());
            self.insert(def)?;
        }
        Ok(ids)
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> CoreResult<Vec<String>> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StructError::from(CoreReason::Configuration)
                .with_detail(format!("failed to read {}: {e}", path.display()))
        })?;
        self.load_str(&content).map_err(|e| {
            StructError::from(CoreReason::Configuration)
                .with_detail(format!("{}: {e}", path.display()))
        })
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl SchemaRegistry for MemorySchemaRegistry {
    fn resolve(&self, id: &str) -> CoreResult<Arc<SchemaDefinition>> {
        self.schemas.get(id).cloned().ok_or_else(|| {
            StructError::from(CoreReason::Configuration)
                .with_detail(format!("unknown schema {id:?}"))
        })
    }

    fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.schemas.keys().cloned().collect();
        ids.sort();
        ids
    }
}

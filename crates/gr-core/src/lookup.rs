use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use orion_error::StructError;

use crate::error::{CoreReason, CoreResult};
use crate::value::Value;

/// Stream-configuration key whose value scopes lookup documents.
pub const SCOPE_KEY: &str = "reference_designator";

/// External key-value store of coefficients: `document_key -> {name -> value}`.
pub trait LookupStore: Send + Sync {
    fn get(&self, document_key: &str, name: &str) -> CoreResult<Option<Value>>;
}

// ---------------------------------------------------------------------------
// MemoryLookupStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct MemoryLookupStore {
    documents: HashMap<String, BTreeMap<String, Value>>,
}

impl MemoryLookupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, document_key: impl Into<String>, name: impl Into<String>, value: Value) {
        self.documents
            .entry(document_key.into())
            .or_default()
            .insert(name.into(), value);
    }

    /// Load documents from a TOML (`[CE01_CTD_CAL] p_range = 679.3`) or JSON
    /// (`{"CTD_CAL": {"p_range": 679.3}}`) file, chosen by extension.
    pub fn load_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StructError::from(CoreReason::Configuration)
                .with_detail(format!("failed to read {}: {e}", path.display()))
        })?;
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let documents: HashMap<String, BTreeMap<String, Value>> = if is_json {
            serde_json::from_str(&content).map_err(|e| {
                StructError::from(CoreReason::Configuration)
                    .with_detail(format!("{}: {e}", path.display()))
            })?
        } else {
            toml::from_str(&content).map_err(|e| {
                StructError::from(CoreReason::Configuration)
                    .with_detail(format!("{}: {e}", path.display()))
            })?
        };
        Ok(Self { documents })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl LookupStore for MemoryLookupStore {
    fn get(&self, document_key: &str, name: &str) -> CoreResult<Option<Value>> {
        Ok(self
            .documents
            .get(document_key)
            .and_then(|doc| doc.get(name))
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// LookupValueResolver
// ---------------------------------------------------------------------------

/// Resolves lookup coefficients, preferring a document scoped by the
/// stream's reference designator (`"{designator}_{key}"`) over the
/// unscoped document. Nothing is cached.
#[derive(Clone)]
pub struct LookupValueResolver {
    store: Arc<dyn LookupStore>,
}

impl LookupValueResolver {
    pub fn new(store: Arc<dyn LookupStore>) -> Self {
        Self { store }
    }

    pub fn resolve(
        &self,
        stream_config: &BTreeMap<String, String>,
        document_key: &str,
        name: &str,
    ) -> CoreResult<Option<Value>> {
        if let Some(scope) = stream_config.get(SCOPE_KEY).filter(|s| !s.is_empty()) {
            let scoped = format!("{scope}_{document_key}");
            if let Some(v) = self.store.get(&scoped, name)? {
                return Ok(Some(v));
            }
        }
        self.store.get(document_key, name)
    }
}

impl std::fmt::Debug for LookupValueResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupValueResolver").finish_non_exhaustive()
    }
}

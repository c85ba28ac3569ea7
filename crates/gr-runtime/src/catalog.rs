use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use orion_error::op_context;
use orion_error::prelude::*;
use orion_error::ErrorOwe;

use gr_config::{DeliveryFormat, NTP_EPOCH_OFFSET, ServiceConfig, resolve_glob, resolve_path};
use gr_core::batch::BatchContext;
use gr_core::function::FunctionRegistry;
use gr_core::lookup::{LookupStore, LookupValueResolver, MemoryLookupStore};
use gr_core::schema::{MemorySchemaRegistry, SchemaDefinition, SchemaRegistry};
use gr_core::store::{ColumnStore, DEFAULT_CLOSE_TIMEOUT, MemoryColumnStore};
use gr_core::window::TimeWindowReader;

use crate::error::{RuntimeReason, RuntimeResult};

/// Everything a retrieval or replay needs: schemas, datasets, lookup
/// documents, functions and the store's time base.
pub struct Catalog {
    schemas: Arc<dyn SchemaRegistry>,
    store: Arc<dyn ColumnStore>,
    lookups: Option<Arc<dyn LookupStore>>,
    functions: Arc<FunctionRegistry>,
    epoch_offset: f64,
    close_timeout: Duration,
    publish_limit: usize,
}

impl Catalog {
    pub fn new(schemas: Arc<dyn SchemaRegistry>, store: Arc<dyn ColumnStore>) -> Self {
        Self {
            schemas,
            store,
            lookups: None,
            functions: Arc::new(FunctionRegistry::with_builtins()),
            epoch_offset: NTP_EPOCH_OFFSET,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            publish_limit: gr_config::DEFAULT_PUBLISH_LIMIT,
        }
    }

    pub fn with_lookups(mut self, lookups: Arc<dyn LookupStore>) -> Self {
        self.lookups = Some(lookups);
        self
    }

    pub fn with_functions(mut self, functions: Arc<FunctionRegistry>) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_epoch_offset(mut self, epoch_offset: f64) -> Self {
        self.epoch_offset = epoch_offset;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn with_publish_limit(mut self, publish_limit: usize) -> Self {
        self.publish_limit = publish_limit.max(1);
        self
    }

    /// Load schema documents, datasets and lookups named by `config`.
    /// Relative globs resolve against `base_dir`.
    #[tracing::instrument(name = "catalog.bootstrap", skip_all, fields(base_dir = %base_dir.display()))]
    pub fn bootstrap(config: &ServiceConfig, base_dir: &Path) -> RuntimeResult<Self> {
        let mut op = op_context!("catalog-bootstrap").with_auto_log();
        op.record("base_dir", base_dir.display().to_string().as_str());

        let schema_paths = resolve_glob(&config.catalog.schemas, base_dir).owe_conf()?;
        if schema_paths.is_empty() {
            return StructError::from(RuntimeReason::Bootstrap)
                .with_detail(format!(
                    "no schema documents match {:?}",
                    config.catalog.schemas
                ))
                .err();
        }
        let mut schemas = MemorySchemaRegistry::new();
        for path in &schema_paths {
            let ids = schemas.load_file(path).err_conv()?;
            gr_debug!(conf, path = %path.display(), ids = ?ids, "loaded schema document");
        }

        let dataset_paths = resolve_glob(&config.catalog.datasets, base_dir).owe_conf()?;
        if dataset_paths.is_empty() {
            gr_warn!(conf, pattern = %config.catalog.datasets, "no dataset files found");
        }
        let mut store = MemoryColumnStore::new();
        for path in &dataset_paths {
            let id = store.load_file(path, &schemas).err_conv()?;
            gr_debug!(conf, path = %path.display(), dataset = %id, "loaded dataset");
        }

        let lookups = match &config.catalog.lookups {
            Some(file) => {
                let path = resolve_path(file, base_dir);
                let docs = MemoryLookupStore::load_file(&path).err_conv()?;
                gr_debug!(conf, path = %path.display(), documents = docs.len(), "loaded lookups");
                Some(docs)
            }
            None => None,
        };

        gr_info!(
            conf,
            schemas = schemas.len(),
            datasets = store.len(),
            lookup_documents = lookups.as_ref().map_or(0, MemoryLookupStore::len),
            "catalog ready"
        );

        let mut catalog = Catalog::new(Arc::new(schemas), Arc::new(store))
            .with_epoch_offset(config.catalog.epoch_offset)
            .with_close_timeout(config.replay.close_timeout.as_duration())
            .with_publish_limit(config.replay.publish_limit);
        if let Some(docs) = lookups {
            catalog = catalog.with_lookups(Arc::new(docs));
        }
        op.mark_suc();
        Ok(catalog)
    }

    pub fn schemas(&self) -> &Arc<dyn SchemaRegistry> {
        &self.schemas
    }

    pub fn store(&self) -> &Arc<dyn ColumnStore> {
        &self.store
    }

    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    pub fn epoch_offset(&self) -> f64 {
        self.epoch_offset
    }

    pub fn close_timeout(&self) -> Duration {
        self.close_timeout
    }

    /// Default rows per replay batch.
    pub fn publish_limit(&self) -> usize {
        self.publish_limit
    }

    pub fn reader(&self) -> TimeWindowReader {
        TimeWindowReader::new(self.epoch_offset)
    }

    /// Evaluation context for batches of a stream configured by
    /// `stream_config`.
    pub fn batch_context(&self, stream_config: &BTreeMap<String, String>) -> BatchContext {
        let mut ctx = BatchContext::new(Arc::clone(&self.functions))
            .with_stream_config(stream_config.clone());
        if let Some(store) = &self.lookups {
            ctx = ctx.with_lookups(LookupValueResolver::new(Arc::clone(store)));
        }
        ctx
    }

    /// Schema batches are delivered in: the requested delivery schema or
    /// view, else the dataset's own schema.
    pub fn delivery_schema(
        &self,
        dataset_schema: &str,
        delivery: &DeliveryFormat,
    ) -> RuntimeResult<Arc<SchemaDefinition>> {
        let id = delivery.schema.as_deref().unwrap_or(dataset_schema);
        self.schemas.resolve(id).err_conv()
    }
}

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use orion_error::StructError;
use serde::Deserialize;

use super::{ColumnStore, DatasetHandle};
use crate::error::{CoreReason, CoreResult};
use crate::schema::SchemaRegistry;
use crate::value::Value;
use crate::window::CoverageWindow;

/// A dataset held in memory. Columns are stored as given, so their lengths
/// may differ from the declared timestep count.
#[derive(Debug, Clone)]
pub struct MemoryDataset {
    id: String,
    schema_id: String,
    temporal: String,
    num_timesteps: usize,
    columns: BTreeMap<String, Vec<Value>>,
}

impl MemoryDataset {
    /// The declared timestep count defaults to the temporal column length.
    pub fn new(
        id: impl Into<String>,
        schema_id: impl Into<String>,
        temporal: impl Into<String>,
        columns: BTreeMap<String, Vec<Value>>,
    ) -> Self {
        let temporal = temporal.into();
        let num_timesteps = columns.get(&temporal).map_or(0, Vec::len);
        Self {
            id: id.into(),
            schema_id: schema_id.into(),
            temporal,
            num_timesteps,
            columns,
        }
    }

    pub fn with_num_timesteps(mut self, n: usize) -> Self {
        self.num_timesteps = n;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DatasetFile {
    dataset_id: String,
    schema: String,
    #[serde(default)]
    num_timesteps: Option<usize>,
    columns: BTreeMap<String, Vec<Option<Value>>>,
}

// ---------------------------------------------------------------------------
// MemoryColumnStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryColumnStore {
    datasets: HashMap<String, Arc<MemoryDataset>>,
    open_handles: Arc<AtomicUsize>,
}

impl MemoryColumnStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dataset: MemoryDataset) -> CoreResult<()> {
        if self.datasets.contains_key(&dataset.id) {
            return StructError::from(CoreReason::Configuration)
                .with_detail(format!("dataset {:?} already loaded", dataset.id))
                .err();
        }
        self.datasets.insert(dataset.id.clone(), Arc::new(dataset));
        Ok(())
    }

    /// Load a JSON dataset file. `null` samples become the column's fill
    /// value; values are coerced to the declared encodings.
    pub fn load_file(
        &mut self,
        path: impl AsRef<Path>,
        schemas: &dyn SchemaRegistry,
    ) -> CoreResult<String> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StructError::from(CoreReason::Configuration)
                .with_detail(format!("failed to read {}: {e}", path.display()))
        })?;
        let file: DatasetFile = serde_json::from_str(&content).map_err(|e| {
            StructError::from(CoreReason::Configuration)
                .with_detail(format!("{}: {e}", path.display()))
        })?;
        let schema = schemas.resolve(&file.schema)?;

        let mut columns = BTreeMap::new();
        for (name, raw) in file.columns {
            let Some(spec) = schema.parameter(&name) else {
                return StructError::from(CoreReason::Configuration)
                    .with_detail(format!(
                        "{}: column {name:?} is not in schema {:?}",
                        path.display(),
                        schema.id()
                    ))
                    .err();
            };
            let values = raw
                .into_iter()
                .map(|v| match v {
                    Some(v) => spec.encoding.coerce(&v),
                    None => Ok(spec.fill_value.clone()),
                })
                .collect::<CoreResult<Vec<_>>>()?;
            columns.insert(name, values);
        }

        let mut dataset =
            MemoryDataset::new(&file.dataset_id, schema.id(), schema.temporal(), columns);
        if let Some(n) = file.num_timesteps {
            dataset = dataset.with_num_timesteps(n);
        }
        let id = file.dataset_id;
        self.insert(dataset)?;
        log::debug!("loaded dataset {id:?} from {}", path.display());
        Ok(id)
    }

    /// Handles opened and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

impl ColumnStore for MemoryColumnStore {
    fn open(&self, dataset_id: &str) -> CoreResult<Box<dyn DatasetHandle>> {
        let data = self.datasets.get(dataset_id).ok_or_else(|| {
            StructError::from(CoreReason::Store)
                .with_detail(format!("unknown dataset {dataset_id:?}"))
        })?;
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryHandle {
            data: Arc::clone(data),
            open_handles: Arc::clone(&self.open_handles),
            closed: false,
        }))
    }

    fn dataset_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.datasets.keys().cloned().collect();
        ids.sort();
        ids
    }
}

// ---------------------------------------------------------------------------
// MemoryHandle
// ---------------------------------------------------------------------------

struct MemoryHandle {
    data: Arc<MemoryDataset>,
    open_handles: Arc<AtomicUsize>,
    closed: bool,
}

impl MemoryHandle {
    fn ensure_open(&self) -> CoreResult<()> {
        if self.closed {
            return StructError::from(CoreReason::Store)
                .with_detail(format!("dataset {:?} handle is closed", self.data.id))
                .err();
        }
        Ok(())
    }

    /// Temporal values within the declared timestep count.
    fn times(&self) -> CoreResult<Vec<f64>> {
        let Some(raw) = self.data.columns.get(&self.data.temporal) else {
            return Ok(Vec::new());
        };
        raw.iter()
            .take(self.data.num_timesteps)
            .map(|v| {
                v.as_f64().ok_or_else(|| {
                    StructError::from(CoreReason::Store).with_detail(format!(
                        "dataset {:?}: non-numeric time value {v}",
                        self.data.id
                    ))
                })
            })
            .collect()
    }
}

impl DatasetHandle for MemoryHandle {
    fn dataset_id(&self) -> &str {
        &self.data.id
    }

    fn schema_id(&self) -> &str {
        &self.data.schema_id
    }

    fn num_timesteps(&self) -> usize {
        self.data.num_timesteps
    }

    fn extent(&self, column: &str) -> Option<usize> {
        self.data.columns.get(column).map(Vec::len)
    }

    fn time_to_index(&self, store_time: f64) -> CoreResult<usize> {
        self.ensure_open()?;
        let times = self.times()?;
        Ok(times.partition_point(|t| *t < store_time))
    }

    fn time_bounds(&self) -> CoreResult<Option<(f64, f64)>> {
        self.ensure_open()?;
        let times = self.times()?;
        Ok(times.first().copied().zip(times.last().copied()))
    }

    fn read(&self, column: &str, window: &CoverageWindow) -> CoreResult<Vec<Value>> {
        self.ensure_open()?;
        let Some(values) = self.data.columns.get(column) else {
            return Ok(Vec::new());
        };
        Ok(window
            .indices()
            .into_iter()
            .filter_map(|i| values.get(i).cloned())
            .collect())
    }

    fn close(&mut self, _timeout: Duration) -> CoreResult<()> {
        if !self.closed {
            self.closed = true;
            self.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DatasetLease;
    use crate::testutil::ctd_registry;

    fn store() -> MemoryColumnStore {
        let mut columns = BTreeMap::new();
        columns.insert("time".to_string(), vec![Value::Float(10.0), Value::Float(20.0), Value::Float(30.0)]);
        columns.insert("temp_counts".to_string(), vec![Value::Int(1), Value::Int(2)]);
        let mut store = MemoryColumnStore::new();
        store
            .insert(MemoryDataset::new("ds", "ctd", "time", columns))
            .unwrap();
        store
    }

    #[test]
    fn time_to_index_is_lower_bound() {
        let store = store();
        let h = store.open("ds").unwrap();
        assert_eq!(h.time_to_index(5.0).unwrap(), 0);
        assert_eq!(h.time_to_index(20.0).unwrap(), 1);
        assert_eq!(h.time_to_index(25.0).unwrap(), 2);
        assert_eq!(h.time_to_index(99.0).unwrap(), 3);
        assert_eq!(h.time_bounds().unwrap(), Some((10.0, 30.0)));
    }

    #[test]
    fn read_stops_at_extent() {
        let store = store();
        let h = store.open("ds").unwrap();
        assert_eq!(h.num_timesteps(), 3);
        assert_eq!(h.extent("temp_counts"), Some(2));
        assert_eq!(h.extent("pres_counts"), None);
        let all = CoverageWindow::full(3);
        assert_eq!(h.read("temp_counts", &all).unwrap().len(), 2);
        let picked = CoverageWindow::Indices(vec![0, 2]);
        assert_eq!(
            h.read("time", &picked).unwrap(),
            vec![Value::Float(10.0), Value::Float(30.0)]
        );
    }

    #[test]
    fn unknown_dataset_is_store_error() {
        let err = store().open("nope").err().unwrap();
        assert_eq!(err.reason(), &CoreReason::Store);
    }

    #[test]
    fn lease_closes_on_drop_and_release() {
        let store = store();
        {
            let lease = DatasetLease::open(&store, "ds", Duration::from_secs(1)).unwrap();
            assert_eq!(lease.num_timesteps(), 3);
            assert_eq!(store.open_handles(), 1);
        }
        assert_eq!(store.open_handles(), 0);

        let lease = DatasetLease::open(&store, "ds", Duration::from_secs(1)).unwrap();
        lease.release().unwrap();
        assert_eq!(store.open_handles(), 0);
    }

    #[test]
    fn read_after_close_fails() {
        let store = store();
        let mut h = store.open("ds").unwrap();
        h.close(Duration::from_secs(1)).unwrap();
        h.close(Duration::from_secs(1)).unwrap();
        assert!(h.read("time", &CoverageWindow::full(3)).is_err());
        assert_eq!(store.open_handles(), 0);
    }

    #[test]
    fn load_json_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ds.json");
        std::fs::write(
            &path,
            r#"{
                "dataset_id": "ctd-001",
                "schema": "ctd",
                "num_timesteps": 4,
                "columns": {
                    "time": [1.0, 2.0, 3.0, 4.0],
                    "temp_counts": [100, null, 300]
                }
            }"#,
        )
        .unwrap();

        let mut store = MemoryColumnStore::new();
        let id = store.load_file(&path, &ctd_registry()).unwrap();
        assert_eq!(id, "ctd-001");
        assert_eq!(store.dataset_ids(), vec!["ctd-001"]);

        let h = store.open("ctd-001").unwrap();
        assert_eq!(h.schema_id(), "ctd");
        assert_eq!(h.extent("temp_counts"), Some(3));
        assert_eq!(
            h.read("temp_counts", &CoverageWindow::full(4)).unwrap(),
            vec![Value::Int(100), Value::Int(-1), Value::Int(300)]
        );
    }

    #[test]
    fn load_rejects_unknown_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            r#"{"dataset_id": "x", "schema": "ctd", "columns": {"salinity": [1.0]}}"#,
        )
        .unwrap();
        let err = MemoryColumnStore::new()
            .load_file(&path, &ctd_registry())
            .unwrap_err();
        assert_eq!(err.reason(), &CoreReason::Configuration);
    }
}

use std::path::Path;
use std::sync::Arc;

use gr_config::{DeliveryFormat, IndexRangeConfig, ReplayConfig, ServiceConfig};
use gr_core::error::CoreReason;
use gr_core::sink::PublishSink;
use gr_core::store::ColumnStore;
use gr_core::value::Value;
use gr_runtime::{Catalog, ReplayController, Retriever, RuntimeReason};

const SERVICE: &str = r#"
[catalog]
schemas = "schemas/*.toml"
datasets = "data/*.json"
lookups = "lookups.toml"
epoch_offset = 1000.0

[replay]
close_timeout = "2s"
publish_limit = 4
"#;

const SCHEMA: &str = r#"
id = "ctd"
temporal = "time"

[[functions]]
id = "ctd_temp"
expression = "(T / 10000) - 10"

[[functions]]
id = "ctd_pres"
expression = "(P * p_range / (0.85 * 65536)) - (0.05 * p_range)"

[[parameters]]
name = "time"
kind = "quantity"
encoding = "float64"
fill_value = -9999.0

[[parameters]]
name = "temp_counts"
kind = "quantity"
encoding = "int64"
fill_value = -1

[[parameters]]
name = "pres_counts"
kind = "quantity"
encoding = "int64"
fill_value = -1

[[parameters]]
name = "temp"
kind = "function"
encoding = "float64"
fill_value = -999.0
function = "ctd_temp"
arguments = { T = "temp_counts" }

[[parameters]]
name = "pressure"
kind = "function"
encoding = "float64"
fill_value = -999.0
function = "ctd_pres"
arguments = { P = "pres_counts", p_range = "p_range" }

[[parameters]]
name = "p_range"
kind = "lookup"
encoding = "float64"
document_key = "CTD_CAL"

[[views]]
id = "ctd_basic"
fields = ["time", "temp"]
"#;

const LOOKUPS: &str = r#"
[CTD_CAL]
p_range = 100.0

[RS01_CTD_CAL]
p_range = 679.34040721
"#;

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Ten rows at store times 1000..1009 (caller times 0..9), a dataset whose
/// temperature column is two rows short, and one with too many rows.
fn catalog_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "granule.toml", SERVICE);
    write(dir.path(), "schemas/ctd.toml", SCHEMA);
    write(dir.path(), "lookups.toml", LOOKUPS);

    let times: Vec<String> = (0..10).map(|i| format!("{}.0", 1000 + i)).collect();
    let counts: Vec<String> = (0..10).map(|i| (200_000 + i * 10_000).to_string()).collect();
    let pres: Vec<String> = (0..10).map(|_| "0".to_string()).collect();
    write(
        dir.path(),
        "data/ctd.json",
        &format!(
            r#"{{"dataset_id":"ctd-001","schema":"ctd","columns":{{"time":[{}],"temp_counts":[null,{}],"pres_counts":[{}]}}}}"#,
            times.join(","),
            counts[1..].join(","),
            pres.join(",")
        ),
    );
    write(
        dir.path(),
        "data/short.json",
        &format!(
            r#"{{"dataset_id":"ctd-short","schema":"ctd","num_timesteps":10,"columns":{{"time":[{}],"temp_counts":[{}]}}}}"#,
            times.join(","),
            counts[..8].join(",")
        ),
    );
    write(
        dir.path(),
        "data/corrupt.json",
        &format!(
            r#"{{"dataset_id":"ctd-corrupt","schema":"ctd","num_timesteps":6,"columns":{{"time":[{}]}}}}"#,
            times.join(",")
        ),
    );
    write(
        dir.path(),
        "data/empty.json",
        r#"{"dataset_id":"ctd-empty","schema":"ctd","columns":{"time":[]}}"#,
    );
    dir
}

fn bootstrap(dir: &Path) -> Arc<Catalog> {
    let config = ServiceConfig::load(dir.join("granule.toml")).unwrap();
    Arc::new(Catalog::bootstrap(&config, dir).unwrap())
}

fn floats(values: &[Value]) -> Vec<f64> {
    values.iter().map(|v| v.as_f64().unwrap()).collect()
}

fn job(dataset_id: &str) -> ReplayConfig {
    ReplayConfig {
        dataset_id: Some(dataset_id.to_string()),
        ..ReplayConfig::default()
    }
}

#[test]
fn bootstrap_applies_service_settings() {
    let dir = catalog_dir();
    let catalog = bootstrap(dir.path());
    assert_eq!(catalog.epoch_offset(), 1000.0);
    assert_eq!(catalog.publish_limit(), 4);
    assert_eq!(catalog.close_timeout().as_secs(), 2);
    assert_eq!(catalog.store().dataset_ids().len(), 4);
}

#[test]
fn bootstrap_without_schemas_fails() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "granule.toml", SERVICE);
    let config = ServiceConfig::load(dir.path().join("granule.toml")).unwrap();
    let err = Catalog::bootstrap(&config, dir.path()).err().unwrap();
    assert_eq!(err.reason(), &RuntimeReason::Bootstrap);
}

#[test]
fn retrieve_time_window_in_caller_epoch() {
    let dir = catalog_dir();
    let retriever = Retriever::new(bootstrap(dir.path()));
    let mut cfg = job("ctd-001");
    cfg.query.start_time = Some(2.0);
    cfg.query.end_time = Some(6.0);
    let mut batch = retriever.execute_retrieve(&cfg).unwrap();
    assert_eq!(batch.len(), 4);
    let time = batch.get("time").unwrap().unwrap();
    assert_eq!(floats(&time), vec![1002.0, 1003.0, 1004.0, 1005.0]);
    let temp = batch.get("temp").unwrap().unwrap();
    assert!((temp[0].as_f64().unwrap() - 12.0).abs() < 1e-9);
}

#[test]
fn fill_samples_derive_to_fill() {
    let dir = catalog_dir();
    let retriever = Retriever::new(bootstrap(dir.path()));
    let mut cfg = job("ctd-001");
    cfg.query.explicit_index_range = Some(IndexRangeConfig {
        start: Some(0),
        stop: Some(3),
        stride: None,
    });
    let mut batch = retriever.execute_retrieve(&cfg).unwrap();
    let temp = floats(&batch.get("temp").unwrap().unwrap());
    assert_eq!(temp[0], -999.0);
    assert!((temp[1] - 11.0).abs() < 1e-9);
    assert!((temp[2] - 12.0).abs() < 1e-9);
}

#[test]
fn lookups_are_scoped_by_reference_designator() {
    let dir = catalog_dir();
    let retriever = Retriever::new(bootstrap(dir.path()));
    let mut cfg = job("ctd-001");
    cfg.query.parameters = vec!["pressure".to_string()];

    let mut unscoped = retriever.execute_retrieve(&cfg).unwrap();
    let p = floats(&unscoped.get("pressure").unwrap().unwrap());
    assert!((p[0] - (-5.0)).abs() < 1e-9);

    cfg.stream_config
        .insert("reference_designator".to_string(), "RS01".to_string());
    let mut scoped = retriever.execute_retrieve(&cfg).unwrap();
    let p = floats(&scoped.get("pressure").unwrap().unwrap());
    assert!((p[0] - (-0.05 * 679.34040721)).abs() < 1e-9);
}

#[test]
fn last_values_in_a_view() {
    let dir = catalog_dir();
    let retriever = Retriever::new(bootstrap(dir.path()));
    let delivery = DeliveryFormat {
        schema: Some("ctd_basic".to_string()),
    };
    let mut batch = retriever.last_values("ctd-001", 3, &delivery).unwrap();
    assert_eq!(batch.schema().id(), "ctd_basic");
    let time = batch.get("time").unwrap().unwrap();
    assert_eq!(floats(&time), vec![1007.0, 1008.0, 1009.0]);

    let mut all = retriever.last_values("ctd-001", 50, &delivery).unwrap();
    assert_eq!(all.len(), 10);
    assert!(all.get("pressure").is_err());
}

#[test]
fn retrieve_range_accepts_datetimes() {
    let dir = catalog_dir();
    let retriever = Retriever::new(bootstrap(dir.path()));
    let start = chrono::DateTime::from_timestamp(7, 0).unwrap();
    let end = chrono::DateTime::from_timestamp(9, 0).unwrap();
    let mut batch = retriever.retrieve_range("ctd-001", start, end).unwrap();
    assert_eq!(floats(&batch.get("time").unwrap().unwrap()), vec![1007.0, 1008.0]);

    let mut batch = retriever.retrieve_range("ctd-001", 0.0, 1.5).unwrap();
    assert_eq!(batch.len(), 2);
}

#[test]
fn dataset_info_reports_layout() {
    let dir = catalog_dir();
    let retriever = Retriever::new(bootstrap(dir.path()));
    let info = retriever.dataset_info("ctd-short").unwrap();
    assert_eq!(info.num_timesteps, 10);
    assert_eq!(info.extents.get("time"), Some(&10));
    assert_eq!(info.extents.get("temp_counts"), Some(&8));
    assert!(!info.extents.contains_key("pres_counts"));
    assert_eq!(info.time_bounds, Some((0.0, 9.0)));
}

#[test]
fn short_column_is_padded_at_the_tail() {
    let dir = catalog_dir();
    let retriever = Retriever::new(bootstrap(dir.path()));
    let mut batch = retriever.execute_retrieve(&job("ctd-short")).unwrap();
    let counts = batch.get("temp_counts").unwrap().unwrap();
    assert_eq!(counts.len(), 10);
    assert_eq!(counts[7], Value::Int(270_000));
    assert_eq!(&counts[8..], &[Value::Int(-1), Value::Int(-1)]);
}

#[test]
fn oversize_column_is_a_corruption_error() {
    let dir = catalog_dir();
    let catalog = bootstrap(dir.path());
    let retriever = Retriever::new(Arc::clone(&catalog));
    let err = retriever.execute_retrieve(&job("ctd-corrupt")).unwrap_err();
    assert_eq!(err.reason(), &RuntimeReason::Core(CoreReason::Corruption));
}

#[test]
fn unknown_delivery_schema_is_a_configuration_error() {
    let dir = catalog_dir();
    let retriever = Retriever::new(bootstrap(dir.path()));
    let mut cfg = job("ctd-001");
    cfg.delivery_format.schema = Some("ctd_nope".to_string());
    let err = retriever.execute_retrieve(&cfg).unwrap_err();
    assert_eq!(err.reason(), &RuntimeReason::Core(CoreReason::Configuration));
}

#[test]
fn zero_exact_stride_is_a_configuration_error() {
    let dir = catalog_dir();
    let retriever = Retriever::new(bootstrap(dir.path()));
    let mut cfg = job("ctd-001");
    cfg.query.stride_time = Some(0.0);
    cfg.query.exact_stride = true;
    let err = retriever.execute_retrieve(&cfg).unwrap_err();
    assert_eq!(err.reason(), &RuntimeReason::Core(CoreReason::Configuration));
}

#[test]
fn empty_dataset_gives_empty_batch() {
    let dir = catalog_dir();
    let retriever = Retriever::new(bootstrap(dir.path()));
    let batch = retriever.execute_retrieve(&job("ctd-empty")).unwrap();
    assert!(batch.is_empty());
}

#[test]
fn unknown_dataset_is_a_retrieval_error() {
    let dir = catalog_dir();
    let retriever = Retriever::new(bootstrap(dir.path()));
    let err = retriever.execute_retrieve(&job("nope")).unwrap_err();
    assert_eq!(err.reason(), &RuntimeReason::Retrieve);
}

#[tokio::test]
async fn replay_to_jsonl_file() {
    let dir = catalog_dir();
    let catalog = bootstrap(dir.path());
    let uris = vec!["file://out/ctd.jsonl".parse().unwrap()];
    let sink =
        gr_runtime::sink_build::build_publish_sink(&uris, dir.path(), Arc::clone(catalog.schemas()))
            .await
            .unwrap();

    let mut cfg = job("ctd-001");
    cfg.query.publish_limit = catalog.publish_limit();
    cfg.query.parameters = vec!["temp".to_string()];
    let ctl = ReplayController::new(cfg, catalog, Arc::clone(&sink)).unwrap();
    ctl.start().unwrap();
    let summary = ctl.join().await.unwrap();
    sink.close().await.unwrap();
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.rows, 10);

    let text = std::fs::read_to_string(dir.path().join("out/ctd.jsonl")).unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[2]["columns"]["time"].as_array().unwrap().len(), 2);
    assert_eq!(lines[0]["columns"]["temp"][0], -999.0);
}

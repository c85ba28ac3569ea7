use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use gr_config::ReplayConfig;
use gr_core::batch::WireBatch;
use gr_core::error::CoreReason;
use gr_core::schema::MemorySchemaRegistry;
use gr_core::sink::ChannelSink;
use gr_core::store::{MemoryColumnStore, MemoryDataset};
use gr_core::value::Value;
use tokio::sync::mpsc;

use super::*;

const SCHEMA: &str = r#"
id = "ctd"
temporal = "time"

[[functions]]
id = "ctd_temp"
expression = "(T / 10000) - 10"

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
name = "temp"
kind = "function"
encoding = "float64"
fill_value = -999.0
function = "ctd_temp"
arguments = { T = "temp_counts" }
"#;

fn dataset(id: &str, rows: usize) -> MemoryDataset {
    let mut columns = BTreeMap::new();
    columns.insert(
        "time".to_string(),
        (0..rows).map(|i| Value::Float(100.0 + i as f64)).collect(),
    );
    columns.insert(
        "temp_counts".to_string(),
        (0..rows).map(|i| Value::Int(200_000 + i as i64)).collect(),
    );
    MemoryDataset::new(id, "ctd", "time", columns)
}

fn catalog() -> Arc<Catalog> {
    let mut schemas = MemorySchemaRegistry::new();
    schemas.load_str(SCHEMA).unwrap();
    let mut store = MemoryColumnStore::new();
    store.insert(dataset("ctd-23", 23)).unwrap();
    store.insert(dataset("ctd-25", 25)).unwrap();
    store
        .insert(dataset("ctd-bad", 6).with_num_timesteps(4))
        .unwrap();
    Arc::new(Catalog::new(Arc::new(schemas), Arc::new(store)).with_epoch_offset(0.0))
}

fn job(dataset_id: &str, publish_limit: usize) -> ReplayConfig {
    let mut cfg = ReplayConfig {
        dataset_id: Some(dataset_id.to_string()),
        ..ReplayConfig::default()
    };
    cfg.query.publish_limit = publish_limit;
    cfg
}

fn controller(cfg: ReplayConfig, capacity: usize) -> (ReplayController, mpsc::Receiver<WireBatch>) {
    let (sink, rx) = ChannelSink::new(capacity);
    let ctl = ReplayController::new(cfg, catalog(), Arc::new(sink)).unwrap();
    (ctl, rx)
}

fn times(batch: &WireBatch) -> Vec<f64> {
    batch
        .column("time")
        .unwrap()
        .iter()
        .map(|v| v.as_f64().unwrap())
        .collect()
}

#[tokio::test]
async fn delivers_every_row_in_time_order() {
    let (ctl, mut rx) = controller(job("ctd-23", 5), 16);
    ctl.start().unwrap();
    let summary = ctl.join().await.unwrap();
    assert_eq!(
        summary,
        ReplaySummary {
            batches: 5,
            rows: 23,
            stopped: false
        }
    );

    let mut sizes = Vec::new();
    let mut all = Vec::new();
    while let Ok(batch) = rx.try_recv() {
        sizes.push(batch.row_count());
        all.extend(times(&batch));
    }
    assert_eq!(sizes, vec![5, 5, 5, 5, 3]);
    assert!(all.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(all.len(), 23);
    assert!(!ctl.status().publishing);
}

#[tokio::test]
async fn parameters_restrict_published_columns() {
    let mut cfg = job("ctd-23", 10);
    cfg.query.parameters = vec!["temp".to_string(), "salinity".to_string()];
    let (ctl, mut rx) = controller(cfg, 16);
    ctl.start().unwrap();
    ctl.join().await.unwrap();

    let first = rx.try_recv().unwrap();
    let names: Vec<&str> = first.columns.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["temp", "time"]);
    let temp = first.column("temp").unwrap();
    assert!((temp[0].as_f64().unwrap() - 10.0).abs() < 1e-9);
}

#[tokio::test]
async fn batches_carry_provenance() {
    let (ctl, mut rx) = controller(job("ctd-23", 10), 16);
    let ctl = ctl.with_producer_id("unit-test");
    ctl.start().unwrap();
    ctl.join().await.unwrap();

    let _ = rx.try_recv().unwrap();
    let second = rx.try_recv().unwrap();
    assert_eq!(second.schema_ref, "ctd");
    assert_eq!(second.producer_id.as_deref(), Some("unit-test"));
    assert_eq!(second.provenance_metadata["dataset_id"], "ctd-23");
    assert_eq!(second.provenance_metadata["batch_index"], 1);
    assert_eq!(second.provenance_metadata["row_offset"], 10);
}

#[tokio::test]
async fn second_start_fails_while_active() {
    let (ctl, _rx) = controller(job("ctd-23", 5), 16);
    ctl.pause();
    ctl.start().unwrap();
    let err = ctl.start().unwrap_err();
    assert_eq!(err.reason(), &RuntimeReason::AlreadyPublishing);

    ctl.stop();
    let summary = ctl.join().await.unwrap();
    assert!(summary.stopped);
    assert_eq!(summary.batches, 0);
    // A stopped replay keeps the guard set.
    assert!(ctl.status().publishing);
    assert!(ctl.start().is_err());
}

#[tokio::test]
async fn pause_holds_batches_until_resume() {
    let (ctl, mut rx) = controller(job("ctd-23", 5), 16);
    ctl.pause();
    ctl.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
    assert!(ctl.status().publishing);
    assert!(!ctl.status().playing);

    ctl.resume();
    let summary = ctl.join().await.unwrap();
    assert_eq!(summary.batches, 5);
    assert!(rx.try_recv().is_ok());
}

/// Receive until nothing arrives for 200ms.
async fn drain(rx: &mut mpsc::Receiver<WireBatch>) -> Vec<WireBatch> {
    let mut got = Vec::new();
    while let Ok(Some(batch)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
        got.push(batch);
    }
    got
}

#[tokio::test]
async fn pause_mid_stream_loses_nothing() {
    let (ctl, mut rx) = controller(job("ctd-23", 5), 1);
    ctl.start().unwrap();
    let first = rx.recv().await.unwrap();
    ctl.pause();

    // at most the batches already past the play check get through
    let in_flight = drain(&mut rx).await;
    assert!(in_flight.len() <= 2);
    assert!(ctl.status().publishing);
    assert!(!ctl.status().playing);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());

    ctl.resume();
    let (summary, rest) = tokio::join!(ctl.join(), drain(&mut rx));
    assert_eq!(summary.unwrap().batches, 5);

    let mut all = times(&first);
    for batch in in_flight.iter().chain(rest.iter()) {
        all.extend(times(batch));
    }
    let expected: Vec<f64> = (0..23).map(|i| 100.0 + i as f64).collect();
    assert_eq!(all, expected);
}

#[tokio::test]
async fn stop_prevents_later_batches() {
    let (ctl, mut rx) = controller(job("ctd-25", 5), 1);
    ctl.start().unwrap();
    let first = rx.recv().await.unwrap();
    assert_eq!(first.row_count(), 5);
    ctl.stop();

    let drain = async {
        let mut n = 1;
        while let Ok(Some(_)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            n += 1;
        }
        n
    };
    let (summary, received) = tokio::join!(ctl.join(), drain);
    let summary = summary.unwrap();
    assert!(summary.stopped);
    assert!(summary.batches < 5);
    assert_eq!(received, summary.batches);
}

#[tokio::test]
async fn missing_dataset_id_is_a_configuration_error() {
    let (sink, _rx) = ChannelSink::new(1);
    let err = ReplayController::new(ReplayConfig::default(), catalog(), Arc::new(sink))
        .err()
        .unwrap();
    assert_eq!(
        err.reason(),
        &RuntimeReason::Core(CoreReason::Configuration)
    );
}

#[tokio::test]
async fn sink_failure_aborts_and_clears_guard() {
    let (ctl, rx) = controller(job("ctd-23", 5), 4);
    drop(rx);
    ctl.start().unwrap();
    let err = ctl.join().await.unwrap_err();
    assert_eq!(err.reason(), &RuntimeReason::Core(CoreReason::Sink));
    assert!(!ctl.status().publishing);
    // The guard is clear, so a new run can begin.
    ctl.start().unwrap();
    assert!(ctl.join().await.is_err());
}

#[tokio::test]
async fn corruption_aborts_before_any_batch() {
    let (ctl, mut rx) = controller(job("ctd-bad", 2), 4);
    ctl.start().unwrap();
    let err = ctl.join().await.unwrap_err();
    assert_eq!(err.reason(), &RuntimeReason::Core(CoreReason::Corruption));
    assert!(rx.try_recv().is_err());
    assert!(!ctl.status().publishing);
}

#[tokio::test]
async fn empty_window_publishes_nothing() {
    let mut cfg = job("ctd-23", 5);
    cfg.query.start_time = Some(105.0);
    cfg.query.end_time = Some(105.0);
    let (ctl, mut rx) = controller(cfg, 4);
    ctl.start().unwrap();
    let summary = ctl.join().await.unwrap();
    assert_eq!(summary.batches, 0);
    assert!(!summary.stopped);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn join_without_start_fails() {
    let (ctl, _rx) = controller(job("ctd-23", 5), 4);
    let err = ctl.join().await.unwrap_err();
    assert_eq!(err.reason(), &RuntimeReason::Shutdown);
}

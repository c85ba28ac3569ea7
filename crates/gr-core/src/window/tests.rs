use std::collections::BTreeMap;

use super::*;
use crate::batch::BatchContext;
use crate::error::CoreReason;
use crate::store::{ColumnStore, MemoryColumnStore, MemoryDataset};
use crate::testutil::ctd_schema;
use crate::value::Value;

const OFFSET: f64 = 1000.0;

/// Ten rows at caller times 0..10, stored at `OFFSET + t`.
fn dataset(counts_len: usize, num_timesteps: Option<usize>) -> MemoryColumnStore {
    let mut columns = BTreeMap::new();
    columns.insert(
        "time".to_string(),
        (0..10).map(|t| Value::Float(OFFSET + t as f64)).collect(),
    );
    columns.insert(
        "temp_counts".to_string(),
        (0..counts_len as i64).map(|i| Value::Int(i * 10_000)).collect(),
    );
    columns.insert(
        "pres_counts".to_string(),
        (0..10).map(|i| Value::Int(i + 100)).collect(),
    );
    let mut ds = MemoryDataset::new("ctd-1", "ctd", "time", columns);
    if let Some(n) = num_timesteps {
        ds = ds.with_num_timesteps(n);
    }
    let mut store = MemoryColumnStore::new();
    store.insert(ds).unwrap();
    store
}

fn read(store: &MemoryColumnStore, query: &WindowQuery) -> crate::error::CoreResult<crate::batch::RecordBatch> {
    let handle = store.open("ctd-1").unwrap();
    TimeWindowReader::new(OFFSET).read(handle.as_ref(), ctd_schema(), BatchContext::default(), query)
}

fn times(batch: &mut crate::batch::RecordBatch) -> Vec<f64> {
    batch
        .get("time")
        .unwrap()
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_f64)
        .map(|t| t - OFFSET)
        .collect()
}

// -- index ranges ------------------------------------------------------------

#[test]
fn index_range_negative_positions() {
    assert_eq!(
        IndexRange::last(3).resolve(10),
        CoverageWindow::Range { start: 7, stop: 10, stride: 1 }
    );
    assert_eq!(
        IndexRange::last(20).resolve(10),
        CoverageWindow::Range { start: 0, stop: 10, stride: 1 }
    );
    let w = IndexRange::new(Some(2), Some(-2), 2).resolve(10);
    assert_eq!(w.indices(), vec![2, 4, 6]);
    assert_eq!(w.len(), 3);
}

#[test]
fn inverted_index_range_is_empty() {
    let w = IndexRange::new(Some(5), Some(2), 1).resolve(10);
    assert!(w.is_empty());
    assert!(w.indices().is_empty());
}

#[test]
fn strided_len_rounds_up() {
    let w = CoverageWindow::Range { start: 0, stop: 10, stride: 3 };
    assert_eq!(w.len(), 4);
    assert_eq!(w.indices(), vec![0, 3, 6, 9]);
}

// -- window computation ------------------------------------------------------

#[test]
fn unbounded_query_covers_full_extent() {
    let store = dataset(10, None);
    let h = store.open("ctd-1").unwrap();
    let reader = TimeWindowReader::new(OFFSET);
    assert_eq!(
        reader.compute_window(h.as_ref(), &WindowQuery::all()).unwrap(),
        CoverageWindow::full(10)
    );
    let fuzzy = WindowQuery::all().with_stride(2.0, false);
    assert_eq!(
        reader.compute_window(h.as_ref(), &fuzzy).unwrap(),
        CoverageWindow::Range { start: 0, stop: 10, stride: 2 }
    );
}

#[test]
fn time_bounds_shift_by_epoch_offset() {
    let store = dataset(10, None);
    let mut batch = read(&store, &WindowQuery::between(Some(2.0), Some(5.0))).unwrap();
    assert_eq!(times(&mut batch), vec![2.0, 3.0, 4.0]);

    let mut open_end = read(&store, &WindowQuery::between(Some(7.5), None)).unwrap();
    assert_eq!(times(&mut open_end), vec![8.0, 9.0]);
}

#[test]
fn explicit_index_range_wins_over_times() {
    let store = dataset(10, None);
    let query = WindowQuery::between(Some(0.0), Some(9.0)).with_index_range(IndexRange::last(2));
    let mut batch = read(&store, &query).unwrap();
    assert_eq!(times(&mut batch), vec![8.0, 9.0]);
}

#[test]
fn equal_bounds_give_zero_rows() {
    let store = dataset(10, None);
    let mut batch = read(&store, &WindowQuery::between(Some(4.0), Some(4.0))).unwrap();
    assert_eq!(batch.len(), 0);
    assert_eq!(batch.get("time").unwrap(), None);
}

#[test]
fn exact_stride_enumerates_times() {
    let store = dataset(10, None);
    let query = WindowQuery::between(Some(0.0), Some(10.0)).with_stride(2.5, true);
    let h = store.open("ctd-1").unwrap();
    let window = TimeWindowReader::new(OFFSET)
        .compute_window(h.as_ref(), &query)
        .unwrap();
    // 0, 2.5, 5, 7.5 -> lower bounds 0, 3, 5, 8
    assert_eq!(window, CoverageWindow::Indices(vec![0, 3, 5, 8]));
}

#[test]
fn exact_stride_drops_duplicate_indices() {
    let store = dataset(10, None);
    let query = WindowQuery::between(Some(0.0), Some(2.0)).with_stride(0.25, true);
    let mut batch = read(&store, &query).unwrap();
    assert_eq!(times(&mut batch), vec![0.0, 1.0, 2.0]);
}

#[test]
fn exact_stride_must_be_positive() {
    let store = dataset(10, None);
    let h = store.open("ctd-1").unwrap();
    let reader = TimeWindowReader::new(OFFSET);
    for stride in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        let query = WindowQuery::between(Some(0.0), Some(10.0)).with_stride(stride, true);
        let err = reader.compute_window(h.as_ref(), &query).unwrap_err();
        assert_eq!(err.reason(), &CoreReason::Configuration);
    }
    let query = WindowQuery::between(Some(0.0), Some(10.0)).with_stride(0.0, true);
    assert_eq!(
        read(&store, &query).unwrap_err().reason(),
        &CoreReason::Configuration
    );
}

#[test]
fn exact_stride_stays_within_stored_times() {
    let store = dataset(10, None);
    let h = store.open("ctd-1").unwrap();
    let query = WindowQuery::between(Some(-1.0e9), Some(1.0e9)).with_stride(0.001, true);
    let window = TimeWindowReader::new(OFFSET)
        .compute_window(h.as_ref(), &query)
        .unwrap();
    assert_eq!(window.indices(), (0..10).collect::<Vec<_>>());
}

// -- reading ---------------------------------------------------------------

#[test]
fn short_extent_padded_at_tail() {
    let store = dataset(7, None);
    let mut batch = read(&store, &WindowQuery::all()).unwrap();
    let counts = batch.get("temp_counts").unwrap().unwrap();
    assert_eq!(counts.len(), 10);
    assert!(counts[..7].iter().all(|v| *v != Value::Int(-1)));
    assert!(counts[7..].iter().all(|v| *v == Value::Int(-1)));

    // derived values follow the padding
    let temp = batch.get("temp").unwrap().unwrap();
    assert_eq!(temp[6], Value::Float(-4.0));
    assert_eq!(temp[7], Value::Float(-999.0));
}

#[test]
fn oversize_extent_is_corruption() {
    let store = dataset(12, None);
    let err = read(&store, &WindowQuery::all()).unwrap_err();
    assert_eq!(err.reason(), &CoreReason::Corruption);
}

#[test]
fn declared_count_below_stored_time_is_corruption() {
    let store = dataset(8, Some(8));
    let err = read(&store, &WindowQuery::all()).unwrap_err();
    assert_eq!(err.reason(), &CoreReason::Corruption);
}

#[test]
fn parameters_limit_stored_reads() {
    let store = dataset(10, None);
    let query = WindowQuery::all().with_parameters(vec!["temp".to_string()]);
    let mut batch = read(&store, &query).unwrap();
    assert!(batch.is_set("time"));
    assert!(batch.is_set("temp_counts"));
    assert!(!batch.is_set("pres_counts"));
    assert_eq!(batch.get("temp").unwrap().unwrap().len(), 10);
}

#[test]
fn empty_dataset_reads_empty_batch() {
    let mut columns = BTreeMap::new();
    columns.insert("time".to_string(), Vec::new());
    let mut store = MemoryColumnStore::new();
    store
        .insert(MemoryDataset::new("ctd-1", "ctd", "time", columns))
        .unwrap();
    let batch = read(&store, &WindowQuery::all()).unwrap();
    assert!(batch.is_empty());
}

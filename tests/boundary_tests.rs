// Boundary Condition Tests for smolidx
// Usage errors, schema limits, capacity limits and degenerate inputs

use smolidx::scan::{Direction, ScanKey, ScanMode, ScanOp};
use smolidx::store::{MemPageStore, PageStore};
use smolidx::types::{Column, KeyType, Schema, Value};
use smolidx::{Error, Index, IndexBuilder, Options};
use std::sync::Arc;

fn store(page_size: usize) -> Arc<dyn PageStore> {
    Arc::new(MemPageStore::new(page_size))
}

fn small_index() -> Index {
    let rows: Vec<Vec<Value>> = (0..100).map(|i| vec![Value::Int(i)]).collect();
    Index::build(store(8192), Schema::single("k", KeyType::Int4), Options::default(), &rows).unwrap()
}

/// Row-returning scans are a usage error
#[test]
fn test_row_returning_scan_rejected() {
    let index = small_index();
    let err = index.begin_scan(ScanMode::RowReturning).unwrap_err();
    assert!(matches!(err, Error::Usage(_)));

    let state = index.parallel_scan_state();
    let err = index.begin_parallel_scan(state, ScanMode::RowReturning).unwrap_err();
    assert!(matches!(err, Error::Usage(_)));
}

/// IS NULL is rejected, IS NOT NULL is ignored, a NULL argument matches nothing
#[test]
fn test_null_predicates() {
    let index = small_index();
    let err = index.scan(&[ScanKey::new(1, ScanOp::IsNull, Value::Null)]).unwrap_err();
    assert!(matches!(err, Error::Usage(_)));

    let n = index.scan(&[ScanKey::new(1, ScanOp::IsNotNull, Value::Null)]).unwrap().count();
    assert_eq!(n, 100);

    let n = index.scan(&[ScanKey::new(1, ScanOp::Ge, Value::Null)]).unwrap().count();
    assert_eq!(n, 0);
}

/// Predicates on unknown columns or of the wrong type are invalid arguments
#[test]
fn test_bad_scan_keys() {
    let index = small_index();
    assert!(matches!(index.scan(&[ScanKey::eq(2, 1)]).unwrap_err(), Error::InvalidArgument(_)));
    assert!(matches!(index.scan(&[ScanKey::eq(0, 1)]).unwrap_err(), Error::InvalidArgument(_)));
    assert!(matches!(index.scan(&[ScanKey::eq(1, "x")]).unwrap_err(), Error::InvalidArgument(_)));
}

/// Contradictory bounds return nothing without touching a leaf
#[test]
fn test_contradictory_bounds() {
    let index = small_index();
    let mut scan = index.begin_scan(ScanMode::IndexOnly).unwrap();
    scan.rescan(&[ScanKey::new(1, ScanOp::Gt, 50), ScanKey::new(1, ScanOp::Lt, 40)]).unwrap();
    assert!(scan.next_tuple(Direction::Forward).unwrap().is_none());
    assert_eq!(scan.profile().leaf_pages, 0);
}

/// Bounds beyond the stored range
#[test]
fn test_out_of_range_bounds() {
    let index = small_index();
    assert_eq!(index.scan(&[ScanKey::new(1, ScanOp::Lt, 0)]).unwrap().count(), 0);
    assert_eq!(index.scan(&[ScanKey::new(1, ScanOp::Gt, 99)]).unwrap().count(), 0);
    assert_eq!(index.scan(&[ScanKey::new(1, ScanOp::Le, 0)]).unwrap().count(), 1);
    assert_eq!(index.scan(&[ScanKey::new(1, ScanOp::Ge, i64::MIN)]).unwrap().count(), 100);
    assert_eq!(index.scan(&[ScanKey::new(1, ScanOp::Le, i64::MAX)]).unwrap().count(), 100);
}

/// Unsupported schemas fail the build
#[test]
fn test_schema_limits() {
    let rows: Vec<Vec<Value>> = vec![vec![Value::Int(1), Value::Int(2), Value::Int(3)]];
    let three_keys = Schema::new(vec![
        Column::new("a", KeyType::Int4),
        Column::new("b", KeyType::Int4),
        Column::new("c", KeyType::Int4),
    ]);
    let err = Index::build(store(8192), three_keys, Options::default(), &rows).unwrap_err();
    assert!(matches!(err, Error::UnsupportedSchema(_)));

    let includes = (0..17).map(|i| Column::new(format!("i{}", i), KeyType::Int4)).collect();
    let wide = Schema::single("k", KeyType::Int4).with_includes(includes);
    let err = Index::build(store(8192), wide, Options::default(), &rows).unwrap_err();
    assert!(matches!(err, Error::UnsupportedSchema(_)));

    let text_pair = Schema::new(vec![Column::new("a", KeyType::Int4), Column::new("b", KeyType::Text)]);
    let err = Index::build(store(8192), text_pair, Options::default(), &rows).unwrap_err();
    assert!(matches!(err, Error::UnsupportedSchema(_)));
}

/// NULLs and oversized text are rejected while scanning the table
#[test]
fn test_bad_values() {
    let rows = vec![vec![Value::Int(1)], vec![Value::Null]];
    let err = Index::build(store(8192), Schema::single("k", KeyType::Int8), Options::default(), &rows)
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedSchema(_)));

    let rows = vec![vec![Value::Text("x".repeat(33))]];
    let err = Index::build(store(8192), Schema::single("k", KeyType::Text), Options::default(), &rows)
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedSchema(_)));

    let rows = vec![vec![Value::Int(70_000)]];
    let err = Index::build(store(8192), Schema::single("k", KeyType::Int2), Options::default(), &rows)
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedSchema(_)));
}

/// A row wider than a page cannot be packed
#[test]
fn test_row_too_wide_for_page() {
    let includes = (0..16).map(|i| Column::new(format!("t{}", i), KeyType::Text)).collect();
    let schema = Schema::single("k", KeyType::Int8).with_includes(includes);
    let row: Vec<Value> = std::iter::once(Value::Int(1))
        .chain((0..16).map(|_| Value::Text("y".repeat(20))))
        .collect();
    let rows = vec![row];
    let err = Index::build(store(256), schema, Options::default().page_size(256), &rows).unwrap_err();
    assert!(matches!(err, Error::Capacity(_)), "{}", err);
}

/// Invalid options are reported before any page is written
#[test]
fn test_invalid_options() {
    let rows: Vec<Vec<Value>> = vec![vec![Value::Int(1)]];
    let s = store(8192);
    let bad = Options::default().prefetch_depth(0);
    let err = IndexBuilder::new(s.clone(), Schema::single("k", KeyType::Int4), bad).build(&rows).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(s.num_pages(), 0);

    let err = Index::open(store(8192), Options::default().rle_uniqueness_threshold(1.5)).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

/// One row, and many copies of one key
#[test]
fn test_degenerate_inputs() {
    let rows = vec![vec![Value::Int(42)]];
    let index = Index::build(store(8192), Schema::single("k", KeyType::Int8), Options::default(), &rows)
        .unwrap();
    assert_eq!(index.meta().height, 1);
    assert_eq!(index.scan(&[ScanKey::eq(1, 42)]).unwrap().count(), 1);
    assert_eq!(index.scan_backward(&[]).unwrap().count(), 1);

    let rows: Vec<Vec<Value>> = (0..50_000).map(|_| vec![Value::Int(7)]).collect();
    let index = Index::build(store(512), Schema::single("k", KeyType::Int8), Options::default().page_size(512), &rows)
        .unwrap();
    assert_eq!(index.scan(&[ScanKey::eq(1, 7)]).unwrap().count(), 50_000);
    assert_eq!(index.scan(&[ScanKey::new(1, ScanOp::Gt, 7)]).unwrap().count(), 0);
    assert_eq!(index.scan(&[ScanKey::new(1, ScanOp::Lt, 7)]).unwrap().count(), 0);
    assert!(index.inspect().unwrap().formats.rle_pages() > 0);
}

/// Inserting into a built index is refused
#[test]
fn test_insert_is_read_only() {
    let index = small_index();
    let err = index.insert(&[Value::Int(5)]).unwrap_err();
    assert!(matches!(err, Error::ReadOnly(_)));
    assert_eq!(err.to_string(), "Read-only: index is read-only");
}

/// Cost estimates favour leading-key predicates
#[test]
fn test_cost_estimates() {
    let index = small_index();
    let eq = index.estimate_cost(&[ScanKey::eq(1, 5)]);
    let range = index.estimate_cost(&[ScanKey::new(1, ScanOp::Gt, 5)]);
    let none = index.estimate_cost(&[]);
    assert!(eq.total_cost < range.total_cost);
    assert!(range.total_cost < none.total_cost);
    assert_eq!(eq.pages, 2.0);
}

// Scan Engine Tests for smolidx
// Rescans, direction changes, pruning soundness, second-key filters and collations

use rand::Rng;
use smolidx::scan::{Direction, ScanKey, ScanMode, ScanOp};
use smolidx::store::{MemPageStore, PageStore};
use smolidx::types::{Collation, Column, KeyType, Schema, Value};
use smolidx::{Index, Options};
use std::sync::Arc;

fn build(schema: Schema, rows: &Vec<Vec<Value>>, options: Options) -> Index {
    let store: Arc<dyn PageStore> = Arc::new(MemPageStore::new(options.page_size));
    Index::build(store, schema, options, rows).unwrap()
}

fn int_rows(keys: impl IntoIterator<Item = i64>) -> Vec<Vec<Value>> {
    keys.into_iter().map(|k| vec![Value::Int(k)]).collect()
}

fn first_ints(index: &Index, keys: &[ScanKey]) -> Vec<i64> {
    index.scan(keys).unwrap().map(|t| t.unwrap().values[0].as_int().unwrap()).collect()
}

/// The same bounds on one scan handle give the same rows every time
#[test]
fn test_rescan_idempotent() {
    env_logger::try_init().ok();
    let rows = int_rows((0..5000).map(|i| (i * 7919) % 1000));
    let index = build(Schema::single("k", KeyType::Int4), &rows, Options::default().page_size(512));

    let mut scan = index.begin_scan(ScanMode::IndexOnly).unwrap();
    let keys = [ScanKey::new(1, ScanOp::Ge, 250), ScanKey::new(1, ScanOp::Lt, 260)];
    let mut runs = Vec::new();
    for _ in 0..3 {
        scan.rescan(&keys).unwrap();
        let mut got = Vec::new();
        while let Some(t) = scan.next_tuple(Direction::Forward).unwrap() {
            got.push(t.values[0].as_int().unwrap());
        }
        runs.push(got);
    }
    assert_eq!(runs[0].len(), 50);
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[1], runs[2]);

    // a rescan in the middle of a scan starts over
    scan.rescan(&keys).unwrap();
    scan.next_tuple(Direction::Forward).unwrap();
    scan.rescan(&[ScanKey::eq(1, 999)]).unwrap();
    let mut tail = Vec::new();
    while let Some(t) = scan.next_tuple(Direction::Forward).unwrap() {
        tail.push(t.values[0].as_int().unwrap());
    }
    assert_eq!(tail, vec![999; 5]);
}

/// Pruning never removes a matching row
#[test]
fn test_zone_map_and_bloom_soundness() {
    env_logger::try_init().ok();
    let mut rng = rand::rng();
    let keys: Vec<i64> = (0..20_000).map(|_| rng.random_range(0..50_000)).collect();
    let rows = int_rows(keys.iter().copied());

    let pruned = build(Schema::single("k", KeyType::Int8), &rows, Options::default().page_size(512));
    let unpruned = build(
        Schema::single("k", KeyType::Int8),
        &rows,
        Options::default().page_size(512).zone_maps(false).bloom_filters(false),
    );

    for _ in 0..300 {
        let k = rng.random_range(0..50_000);
        let eq = [ScanKey::eq(1, k)];
        let expected = keys.iter().filter(|&&x| x == k).count();
        assert_eq!(first_ints(&pruned, &eq).len(), expected, "key {}", k);
        assert_eq!(first_ints(&unpruned, &eq).len(), expected, "key {}", k);

        let lo = rng.random_range(0..50_000);
        let range = [ScanKey::new(1, ScanOp::Gt, lo), ScanKey::new(1, ScanOp::Lt, lo + 40)];
        assert_eq!(first_ints(&pruned, &range), first_ints(&unpruned, &range));
    }
}

/// Missing keys are usually rejected by the bloom filters before any leaf is read
#[test]
fn test_bloom_skips_missing_keys() {
    env_logger::try_init().ok();
    let rows = int_rows((0..20_000).map(|i| i * 4));
    let index = build(Schema::single("k", KeyType::Int8), &rows, Options::default().page_size(512));

    let mut skips = 0;
    let mut leaves = 0;
    for k in (1..2000).map(|i| i * 4 + 2) {
        let mut scan = index.begin_scan(ScanMode::IndexOnly).unwrap();
        scan.rescan(&[ScanKey::eq(1, k)]).unwrap();
        assert!(scan.next_tuple(Direction::Forward).unwrap().is_none());
        let profile = scan.profile();
        skips += profile.bloom_skips + profile.subtrees_pruned;
        leaves += profile.leaf_pages;
    }
    assert!(skips > 0);
    assert_eq!(skips + leaves, 1999);
}

/// Backward scans return rows in descending order with bounds applied
#[test]
fn test_backward_scan() {
    env_logger::try_init().ok();
    let rows = int_rows((0..3000).map(|i| i / 2));
    let index = build(Schema::single("k", KeyType::Int4), &rows, Options::default().page_size(512));

    let got: Vec<i64> = index
        .scan_backward(&[ScanKey::new(1, ScanOp::Gt, 1000), ScanKey::new(1, ScanOp::Le, 1003)])
        .unwrap()
        .map(|t| t.unwrap().values[0].as_int().unwrap())
        .collect();
    assert_eq!(got, vec![1003, 1003, 1002, 1002, 1001, 1001]);

    let all: Vec<i64> =
        index.scan_backward(&[]).unwrap().map(|t| t.unwrap().values[0].as_int().unwrap()).collect();
    assert_eq!(all.len(), 3000);
    assert!(all.windows(2).all(|w| w[0] >= w[1]));
}

/// Changing direction mid-scan restarts from the other end
#[test]
fn test_direction_change_restarts() {
    env_logger::try_init().ok();
    let rows = int_rows(0..1000);
    let index = build(Schema::single("k", KeyType::Int4), &rows, Options::default().page_size(512));

    let mut scan = index.begin_scan(ScanMode::IndexOnly).unwrap();
    scan.rescan(&[ScanKey::new(1, ScanOp::Lt, 10)]).unwrap();
    for expected in 0..3 {
        let t = scan.next_tuple(Direction::Forward).unwrap().unwrap();
        assert_eq!(t.values[0], Value::Int(expected));
    }
    let t = scan.next_tuple(Direction::Backward).unwrap().unwrap();
    assert_eq!(t.values[0], Value::Int(9));
    let t = scan.next_tuple(Direction::Forward).unwrap().unwrap();
    assert_eq!(t.values[0], Value::Int(0));
}

/// Position scans and per-row checks agree on every upper bound
#[test]
fn test_position_scan_agrees() {
    env_logger::try_init().ok();
    let rows = int_rows((0..6000).map(|i| i / 5));
    let schema = Schema::single("k", KeyType::Int8);
    let with = build(schema.clone(), &rows, Options::default().page_size(512));
    let without = build(schema, &rows, Options::default().page_size(512).use_position_scan(false));

    for upper in [0i64, 1, 57, 58, 500, 1199, 1200, 5000] {
        for op in [ScanOp::Lt, ScanOp::Le] {
            let keys = [ScanKey::new(1, op, upper)];
            assert_eq!(first_ints(&with, &keys), first_ints(&without, &keys), "{:?} {}", op, upper);
        }
    }
}

/// Predicates on the second key column are re-checked per row
#[test]
fn test_two_column_filters() {
    env_logger::try_init().ok();
    let schema = Schema::new(vec![Column::new("a", KeyType::Int8), Column::new("b", KeyType::Int2)]);
    let rows: Vec<Vec<Value>> = (0..4000).map(|i| vec![Value::Int(i % 40), Value::Int(i % 7)]).collect();
    let index = build(schema, &rows, Options::default().page_size(512));

    let got: Vec<(i64, i64)> = index
        .scan(&[
            ScanKey::new(1, ScanOp::Ge, 10),
            ScanKey::new(1, ScanOp::Le, 12),
            ScanKey::new(2, ScanOp::Gt, 4),
        ])
        .unwrap()
        .map(|t| {
            let t = t.unwrap();
            (t.values[0].as_int().unwrap(), t.values[1].as_int().unwrap())
        })
        .collect();

    let mut expected: Vec<(i64, i64)> = (0..4000i64)
        .map(|i| (i % 40, i % 7))
        .filter(|&(a, b)| (10..=12).contains(&a) && b > 4)
        .collect();
    expected.sort();
    assert_eq!(got, expected);
}

/// Case-insensitive text keys match regardless of case
#[test]
fn test_case_insensitive_collation() {
    env_logger::try_init().ok();
    let schema = Schema::new(vec![
        Column::new("name", KeyType::Text).with_collation(Collation::CaseInsensitive)
    ]);
    let rows: Vec<Vec<Value>> =
        ["Bob", "alice", "ALICE", "carol", "bob"].iter().map(|s| vec![Value::from(*s)]).collect();
    let index = build(schema, &rows, Options::default());

    let got: Vec<String> = index
        .scan(&[ScanKey::eq(1, "Alice")])
        .unwrap()
        .map(|t| t.unwrap().values[0].as_text().unwrap().to_lowercase())
        .collect();
    assert_eq!(got, vec!["alice", "alice"]);
    assert_eq!(index.scan(&[ScanKey::new(1, ScanOp::Ge, "b")]).unwrap().count(), 3);
}

/// Case-insensitive duplicates are packed plain and still match as one key
#[test]
fn test_case_insensitive_keys_skip_rle() {
    env_logger::try_init().ok();
    let schema = Schema::new(vec![
        Column::new("name", KeyType::Text).with_collation(Collation::CaseInsensitive)
    ]);
    let names = ["alice", "ALICE", "Alice", "bob", "BOB"];
    let rows: Vec<Vec<Value>> = (0..3000).map(|i| vec![Value::from(names[i % 5])]).collect();
    let index = build(schema, &rows, Options::default().page_size(512));

    let formats = index.inspect().unwrap().formats;
    assert_eq!(formats.rle_pages(), 0);
    assert!(formats.plain > 1);

    assert_eq!(index.scan(&[ScanKey::eq(1, "aLiCe")]).unwrap().count(), 1800);
    assert_eq!(index.scan(&[ScanKey::new(1, ScanOp::Le, "ALICE")]).unwrap().count(), 1800);
    assert_eq!(index.scan(&[ScanKey::new(1, ScanOp::Lt, "BOB")]).unwrap().count(), 1800);
    assert_eq!(index.scan(&[ScanKey::new(1, ScanOp::Ge, "b")]).unwrap().count(), 1200);
}

/// Binary text keys use RLE and the precomputed scan end
#[test]
fn test_binary_text_position_scan_agrees() {
    env_logger::try_init().ok();
    let rows: Vec<Vec<Value>> = (0..4000).map(|i| vec![Value::Text(format!("k{:03}", i / 10))]).collect();
    let schema = Schema::single("k", KeyType::Text);
    let with = build(schema.clone(), &rows, Options::default().page_size(512));
    let without = build(schema, &rows, Options::default().page_size(512).use_position_scan(false));
    assert!(with.inspect().unwrap().formats.rle_pages() > 0);

    for upper in ["k000", "k123", "k2", "k399", "z"] {
        for op in [ScanOp::Lt, ScanOp::Le] {
            let keys = [ScanKey::new(1, op, upper)];
            let a: Vec<_> = with.scan(&keys).unwrap().map(|t| t.unwrap().values).collect();
            let b: Vec<_> = without.scan(&keys).unwrap().map(|t| t.unwrap().values).collect();
            assert_eq!(a, b, "{:?} {}", op, upper);
        }
    }
    assert_eq!(with.scan(&[ScanKey::new(1, ScanOp::Le, "k123")]).unwrap().count(), 1240);
}

/// Negative zero is stored as zero and found by an equality scan
#[test]
fn test_float_negative_zero_matches_zero() {
    env_logger::try_init().ok();
    let rows: Vec<Vec<Value>> =
        [-1.5, -0.0, 0.0, -0.0, 2.5].iter().map(|&f| vec![Value::Float(f)]).collect();
    let index = build(Schema::single("x", KeyType::Float8), &rows, Options::default());

    let zeros: Vec<Value> =
        index.scan(&[ScanKey::eq(1, 0.0)]).unwrap().map(|t| t.unwrap().values[0].clone()).collect();
    assert_eq!(zeros.len(), 3);
    assert!(zeros.iter().all(|v| matches!(v, Value::Float(f) if f.is_sign_positive())));

    assert_eq!(index.scan(&[ScanKey::eq(1, -0.0)]).unwrap().count(), 3);
    assert_eq!(index.scan(&[ScanKey::new(1, ScanOp::Lt, 0.0)]).unwrap().count(), 1);
    assert_eq!(index.scan(&[ScanKey::new(1, ScanOp::Gt, -0.0)]).unwrap().count(), 1);
}

/// Unbounded scans prefetch ahead from the first leaf
#[test]
fn test_unbounded_scan_prefetches() {
    env_logger::try_init().ok();
    let options = Options::default().page_size(512).prefetch_depth(4);
    let store = Arc::new(MemPageStore::new(options.page_size));
    let rows = int_rows(0..5000);
    let index = Index::build(store.clone(), Schema::single("k", KeyType::Int8), options, &rows).unwrap();

    let before = store.stats().prefetches;
    assert_eq!(index.scan(&[]).unwrap().count(), 5000);
    assert!(store.stats().prefetches > before);

    // a single-row equality scan stays on one leaf and never looks ahead
    let before = store.stats().prefetches;
    assert_eq!(index.scan(&[ScanKey::eq(1, 2500)]).unwrap().count(), 1);
    assert_eq!(store.stats().prefetches, before);
}

/// Run-length encoded leaves serve repeated rows from the run cache
#[test]
fn test_profile_counts_run_cache() {
    env_logger::try_init().ok();
    let rows = int_rows((0..10_000).map(|i| i / 1000));
    let options = Options::default().profile(true);
    let index = build(Schema::single("k", KeyType::Int4), &rows, options);

    let mut scan = index.begin_scan(ScanMode::IndexOnly).unwrap();
    scan.rescan(&[ScanKey::new(1, ScanOp::Ge, 4), ScanKey::new(1, ScanOp::Le, 5)]).unwrap();
    let mut n = 0;
    while scan.next_tuple(Direction::Forward).unwrap().is_some() {
        n += 1;
    }
    assert_eq!(n, 2000);
    let profile = scan.profile();
    assert_eq!(profile.rows, 2000);
    assert!(profile.run_cache_hits > profile.run_cache_misses);
}

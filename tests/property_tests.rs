// Property Tests for smolidx
// Scan results are checked against predicates evaluated directly on the input

use proptest::prelude::*;
use smolidx::scan::{ScanKey, ScanOp};
use smolidx::store::{MemPageStore, PageStore};
use smolidx::types::{Column, KeyType, Schema, Value};
use smolidx::{Index, Options};
use std::sync::Arc;

fn build_ints(keys: &[i64], options: Options) -> Index {
    let store: Arc<dyn PageStore> = Arc::new(MemPageStore::new(options.page_size));
    let rows: Vec<Vec<Value>> = keys.iter().map(|&k| vec![Value::Int(k)]).collect();
    Index::build(store, Schema::single("k", KeyType::Int8), options, &rows).unwrap()
}

fn scan_ints(index: &Index, keys: &[ScanKey]) -> Vec<i64> {
    index.scan(keys).unwrap().map(|t| t.unwrap().values[0].as_int().unwrap()).collect()
}

fn holds(op: ScanOp, key: i64, arg: i64) -> bool {
    match op {
        ScanOp::Lt => key < arg,
        ScanOp::Le => key <= arg,
        ScanOp::Eq => key == arg,
        ScanOp::Ge => key >= arg,
        ScanOp::Gt => key > arg,
        ScanOp::IsNull => false,
        ScanOp::IsNotNull => true,
    }
}

fn op_strategy() -> impl Strategy<Value = ScanOp> {
    prop_oneof![
        Just(ScanOp::Lt),
        Just(ScanOp::Le),
        Just(ScanOp::Eq),
        Just(ScanOp::Ge),
        Just(ScanOp::Gt),
        Just(ScanOp::IsNotNull),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Any combination of predicates returns exactly the matching input keys, in order
    #[test]
    fn prop_bound_correctness(
        keys in prop::collection::vec(-300i64..300, 0..2500),
        preds in prop::collection::vec((op_strategy(), -320i64..320), 0..3),
    ) {
        let index = build_ints(&keys, Options::default().page_size(512));
        let scan_keys: Vec<ScanKey> = preds.iter().map(|&(op, arg)| ScanKey::new(1, op, arg)).collect();

        let mut expected: Vec<i64> = keys
            .iter()
            .copied()
            .filter(|&k| preds.iter().all(|&(op, arg)| holds(op, k, arg)))
            .collect();
        expected.sort();
        prop_assert_eq!(scan_ints(&index, &scan_keys), expected.clone());

        let backward: Vec<i64> = index
            .scan_backward(&scan_keys)
            .unwrap()
            .map(|t| t.unwrap().values[0].as_int().unwrap())
            .collect();
        expected.reverse();
        prop_assert_eq!(backward, expected);
    }

    /// RLE forced on and forced off give identical results
    #[test]
    fn prop_encoding_transparency(
        keys in prop::collection::vec(0i64..50, 1..3000),
        lo in 0i64..50,
        span in 0i64..20,
    ) {
        let plain = build_ints(&keys, Options::default().page_size(512).rle_uniqueness_threshold(0.0));
        let rle = build_ints(&keys, Options::default().page_size(512).rle_uniqueness_threshold(1.0));
        prop_assert_eq!(plain.inspect().unwrap().formats.rle_pages(), 0);

        let preds = [ScanKey::new(1, ScanOp::Ge, lo), ScanKey::new(1, ScanOp::Le, lo + span)];
        prop_assert_eq!(scan_ints(&plain, &preds), scan_ints(&rle, &preds));
        prop_assert_eq!(scan_ints(&plain, &[ScanKey::eq(1, lo)]), scan_ints(&rle, &[ScanKey::eq(1, lo)]));
    }

    /// INCLUDE values stay attached to their key through sorting and RLE
    #[test]
    fn prop_include_round_trip(rows in prop::collection::vec((0i64..40, 0i64..4), 1..1500)) {
        let options = Options::default().page_size(512);
        let store: Arc<dyn PageStore> = Arc::new(MemPageStore::new(options.page_size));
        let schema = Schema::single("k", KeyType::Int4)
            .with_includes(vec![Column::new("v", KeyType::Int8)]);
        let table: Vec<Vec<Value>> = rows.iter().map(|&(k, v)| vec![Value::Int(k), Value::Int(v)]).collect();
        let index = Index::build(store, schema, options, &table).unwrap();

        let got: Vec<(i64, i64)> = index
            .scan(&[])
            .unwrap()
            .map(|t| {
                let t = t.unwrap();
                (t.values[0].as_int().unwrap(), t.values[1].as_int().unwrap())
            })
            .collect();
        let mut expected = rows.clone();
        expected.sort_by_key(|&(k, _)| k);
        prop_assert_eq!(got, expected);
    }
}

/// Every supported key type round-trips in sorted order
#[test]
fn test_round_trip_all_key_types() {
    env_logger::try_init().ok();
    let cases: Vec<(KeyType, Vec<Value>)> = vec![
        (KeyType::Int2, vec![Value::Int(-5), Value::Int(300), Value::Int(i16::MIN as i64), Value::Int(7)]),
        (KeyType::Int4, vec![Value::Int(i32::MAX as i64), Value::Int(0), Value::Int(-1)]),
        (KeyType::Int8, vec![Value::Int(i64::MIN), Value::Int(i64::MAX), Value::Int(42)]),
        (KeyType::Date, vec![Value::Int(19000), Value::Int(-3), Value::Int(0)]),
        (KeyType::Timestamp, vec![Value::Int(1_700_000_000_000_000), Value::Int(5)]),
        (KeyType::Float8, vec![Value::Float(2.5), Value::Float(-0.75), Value::Float(1e10), Value::Float(0.0)]),
        (
            KeyType::Uuid,
            vec![Value::Bytes(vec![0xff; 16]), Value::Bytes(vec![0; 16]), Value::Bytes((0..16).collect())],
        ),
        (KeyType::Text, vec![Value::from("zebra"), Value::from(""), Value::from("a longer text value here")]),
    ];

    for (ty, values) in cases {
        let options = Options::default();
        let store: Arc<dyn PageStore> = Arc::new(MemPageStore::new(options.page_size));
        let rows: Vec<Vec<Value>> = values.iter().map(|v| vec![v.clone()]).collect();
        let index = Index::build(store, Schema::single("k", ty), options, &rows).unwrap();

        let got: Vec<Value> = index.scan(&[]).unwrap().map(|t| t.unwrap().values[0].clone()).collect();
        let mut expected = values.clone();
        expected.sort_by(|a, b| match (a, b) {
            (Value::Int(x), Value::Int(y)) => x.cmp(y),
            (Value::Float(x), Value::Float(y)) => x.total_cmp(y),
            (Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
            (Value::Text(x), Value::Text(y)) => x.cmp(y),
            _ => unreachable!(),
        });
        assert_eq!(got, expected, "{:?}", ty);
    }
}

/// Randomized duplicates through the external sort path for text keys
#[test]
fn test_text_keys_random() {
    use rand::Rng;
    env_logger::try_init().ok();

    let mut rng = rand::rng();
    let words: Vec<String> = (0..5000).map(|_| format!("w{:04}", rng.random_range(0..700))).collect();
    let options = Options::default().page_size(1024);
    let store: Arc<dyn PageStore> = Arc::new(MemPageStore::new(options.page_size));
    let rows: Vec<Vec<Value>> = words.iter().map(|w| vec![Value::from(w.as_str())]).collect();
    let index = Index::build(store, Schema::single("w", KeyType::Text), options, &rows).unwrap();

    let got: Vec<String> = index
        .scan(&[ScanKey::new(1, ScanOp::Gt, "w0100"), ScanKey::new(1, ScanOp::Le, "w0300")])
        .unwrap()
        .map(|t| t.unwrap().values[0].as_text().unwrap().to_string())
        .collect();
    let mut expected: Vec<String> =
        words.into_iter().filter(|w| w.as_str() > "w0100" && w.as_str() <= "w0300").collect();
    expected.sort();
    assert_eq!(got, expected);
}

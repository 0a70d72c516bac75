//! Basic usage example for smolidx
//!
//! This example demonstrates the fundamental operations:
//! - Building an index over an in-memory table
//! - Equality and range scans
//! - Scanning backward
//! - Reading the scan profile

use anyhow::Context;
use smolidx::scan::{ScanKey, ScanOp};
use smolidx::store::{MemPageStore, PageStore};
use smolidx::types::{Column, KeyType, Schema, Value};
use smolidx::{Index, Options};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    env_logger::try_init().ok();

    // orders(customer_id, amount): many orders per customer
    let table: Vec<Vec<Value>> = (0..100_000i64)
        .map(|i| vec![Value::Int((i * 7) % 2500), Value::Int(i % 97)])
        .collect();
    let schema = Schema::single("customer_id", KeyType::Int4)
        .with_includes(vec![Column::new("amount", KeyType::Int4)]);

    let options = Options::default().profile(true);
    let store: Arc<dyn PageStore> = Arc::new(MemPageStore::new(options.page_size));
    let index = Index::build(store.clone(), schema, options, &table).context("building index")?;
    println!(
        "Built index: {} rows, height {}, {} pages",
        index.meta().row_count,
        index.meta().height,
        store.num_pages()
    );

    // Point lookup
    let mut total = 0;
    for tuple in index.scan(&[ScanKey::eq(1, 1234)])? {
        total += tuple?.values[1].as_int().unwrap_or(0);
    }
    println!("customer 1234 spent {}", total);

    // Range scan
    let mut iter = index.scan(&[ScanKey::new(1, ScanOp::Ge, 100), ScanKey::new(1, ScanOp::Lt, 110)])?;
    let n = iter.by_ref().count();
    println!("customers 100..110 have {} orders", n);
    println!("profile: {:?}", iter.profile());

    // Highest keys first
    let top: Vec<i64> = index
        .scan_backward(&[])?
        .take(5)
        .map(|t| t.map(|t| t.values[0].as_int().unwrap_or_default()))
        .collect::<smolidx::Result<_>>()?;
    println!("largest customer ids: {:?}", top);

    // The index is read-only once built
    if let Err(e) = index.insert(&[Value::Int(1), Value::Int(1)]) {
        println!("insert rejected: {}", e);
    }

    Ok(())
}

//! Build an index into a file and print its page report
//!
//! Usage: cargo run --example inspect [PATH]
//!
//! When PATH names an existing index file it is opened instead of built.

use anyhow::{bail, Context};
use smolidx::store::{FilePageStore, PageStore};
use smolidx::types::{KeyType, Schema, Value};
use smolidx::{Index, Options};
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    env_logger::try_init().ok();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("smolidx-inspect.smol"));
    let options = Options::default();

    let index = if path.exists() {
        let store = FilePageStore::open(&path, options.page_size)
            .with_context(|| format!("opening {}", path.display()))?;
        Index::open(Arc::new(store), options)?
    } else {
        let store: Arc<dyn PageStore> = Arc::new(FilePageStore::create(&path, options.page_size)?);
        // a mix of unique and repeated keys
        let table: Vec<Vec<Value>> = (0..50_000i64)
            .map(|i| vec![Value::Int(if i < 25_000 { i } else { i / 500 })])
            .collect();
        let index = Index::build(store, Schema::single("k", KeyType::Int8), options, &table)?;
        println!("built {}", path.display());
        index
    };

    let report = index.inspect()?;
    if report.rows != index.meta().row_count {
        bail!("report counts {} rows, metapage says {}", report.rows, index.meta().row_count);
    }
    println!("{}", report.to_json()?);
    Ok(())
}

//! Bulk build.
//!
//! A build runs in four phases:
//!
//! 1. **Collect**: scan the table, encode every row at its widest width and
//!    feed it to the sort path chosen for the schema.
//! 2. **Sort**: radix sort for integer keys, external merge sort for a text
//!    key or a parallel build, a stable permutation sort otherwise.
//! 3. **Pack**: stream the sorted rows, narrowed to their final widths, into
//!    a chain of leaves ([`packer`]).
//! 4. **Levels**: build internal levels with aggregated zone maps and bloom
//!    filters until a single root remains ([`internal`]).
//!
//! Text columns are collected at 32 bytes and narrowed to the smallest
//! 8/16/32 bucket that holds the longest value seen.

mod internal;
mod packer;
mod parallel;
pub mod stats;

pub use internal::TreeShape;
pub use parallel::{BuildCoordinator, SharedBuildState};

use crate::config::Options;
use crate::error::{Error, Result};
use crate::page::{write_meta, FormatCounts, LeafLayout, MetaPage};
use crate::page::meta::IncludeMeta;
use crate::sort::{
    apply_permutation, merge_runs, radix_sort_i64, radix_sort_pairs, sort_permutation,
    ExternalSorter, MemRows, MergedRows, RowComparator, RowSource,
};
use crate::store::{BlockNumber, PageStore, INVALID_BLOCK, META_BLOCK};
use crate::types::encoding::read_int;
use crate::types::{encode_value, text_bucket, KeyComparator, KeyType, Schema, Value, MAX_TEXT_LEN};
use internal::{build_levels, LevelOptions};
use packer::{LeafPacker, PackOptions};
use parallel::{run_parallel, PartitionOutput};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of table rows for a build.
///
/// `scan` is called once per partition; partitions must be disjoint and
/// together cover the table. Each call hands every row of its partition to
/// `f` in table order.
pub trait TableScan: Sync {
    /// Feed the rows of `partition` (of `nparts`) to `f`.
    fn scan(
        &self,
        partition: usize,
        nparts: usize,
        f: &mut dyn FnMut(&[Value]) -> Result<()>,
    ) -> Result<()>;
}

impl TableScan for [Vec<Value>] {
    fn scan(
        &self,
        partition: usize,
        nparts: usize,
        f: &mut dyn FnMut(&[Value]) -> Result<()>,
    ) -> Result<()> {
        let per = self.len().div_ceil(nparts.max(1));
        let start = (partition * per).min(self.len());
        let end = (start + per).min(self.len());
        for row in &self[start..end] {
            f(row)?;
        }
        Ok(())
    }
}

impl TableScan for Vec<Vec<Value>> {
    fn scan(
        &self,
        partition: usize,
        nparts: usize,
        f: &mut dyn FnMut(&[Value]) -> Result<()>,
    ) -> Result<()> {
        self.as_slice().scan(partition, nparts, f)
    }
}

/// Summary of a finished build.
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// Rows indexed.
    pub rows: u64,
    /// Leaf pages written.
    pub leaf_pages: usize,
    /// Internal pages written.
    pub internal_pages: usize,
    /// Levels from root to leaf inclusive, 0 for an empty index.
    pub height: u16,
    /// Root block, `INVALID_BLOCK` for an empty index.
    pub root: BlockNumber,
    /// Wall-clock build time.
    pub elapsed: Duration,
    /// Leaf pages per encoding.
    pub formats: FormatCounts,
    /// Threads that scanned the table, leader included.
    pub participants: usize,
}

#[derive(Debug, Clone)]
struct ColumnPlan {
    name: String,
    ty: KeyType,
    wide: usize,
}

/// Encodes table rows at collection width and tracks text lengths.
#[derive(Debug, Clone)]
pub struct RowEncoder {
    cols: Vec<ColumnPlan>,
    nkeys: usize,
}

impl RowEncoder {
    /// Plan the columns of `schema`.
    pub fn new(schema: &Schema) -> Self {
        let cols = schema
            .keys
            .iter()
            .chain(schema.includes.iter())
            .map(|c| ColumnPlan {
                name: c.name.clone(),
                ty: c.ty,
                wide: c.ty.fixed_width().unwrap_or(MAX_TEXT_LEN),
            })
            .collect();
        Self { cols, nkeys: schema.nkeys() }
    }

    /// Bytes per row at collection width.
    pub fn wide_width(&self) -> usize {
        self.cols.iter().map(|c| c.wide).sum()
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.cols.len()
    }

    /// Append `row` to `out`, widening `maxlens` with the byte length of
    /// every text value.
    pub fn encode(&self, row: &[Value], out: &mut Vec<u8>, maxlens: &mut [usize]) -> Result<()> {
        if row.len() != self.cols.len() {
            return Err(Error::invalid_argument(format!(
                "row has {} values, index has {} columns",
                row.len(),
                self.cols.len()
            )));
        }
        for (i, (col, value)) in self.cols.iter().zip(row).enumerate() {
            encode_value(col.ty, col.wide, value, out).map_err(|e| annotate(&col.name, e))?;
            if let Value::Text(s) = value {
                maxlens[i] = maxlens[i].max(s.len());
            }
        }
        Ok(())
    }

    /// Final stored width of every column.
    pub fn final_widths(&self, maxlens: &[usize]) -> Result<Vec<usize>> {
        self.cols
            .iter()
            .zip(maxlens)
            .map(|(col, &len)| match col.ty.fixed_width() {
                Some(w) => Ok(w),
                None => text_bucket(len).map_err(|e| annotate(&col.name, e)),
            })
            .collect()
    }

    /// Leaf layout for the final widths.
    pub fn layout(&self, widths: &[usize]) -> LeafLayout {
        let key2 = if self.nkeys == 2 { widths[1] } else { 0 };
        LeafLayout::new(widths[0], key2, widths[self.nkeys..].to_vec())
    }

    fn narrowing(&self, widths: &[usize]) -> Narrowing {
        Narrowing { wide: self.cols.iter().map(|c| c.wide).collect(), narrow: widths.to_vec() }
    }
}

fn annotate(column: &str, err: Error) -> Error {
    match err {
        Error::UnsupportedSchema(msg) => {
            Error::UnsupportedSchema(format!("column {}: {}", column, msg))
        }
        Error::InvalidArgument(msg) => Error::InvalidArgument(format!("column {}: {}", column, msg)),
        other => other,
    }
}

/// Copies the leading `narrow[i]` bytes of every `wide[i]`-byte column.
#[derive(Debug, Clone)]
struct Narrowing {
    wide: Vec<usize>,
    narrow: Vec<usize>,
}

impl Narrowing {
    fn is_identity(&self) -> bool {
        self.wide == self.narrow
    }

    fn wide_width(&self) -> usize {
        self.wide.iter().sum()
    }

    fn narrow_into(&self, row: &[u8], out: &mut Vec<u8>) {
        let mut off = 0;
        for (w, n) in self.wide.iter().zip(&self.narrow) {
            out.extend_from_slice(&row[off..off + n]);
            off += w;
        }
    }

    fn narrow_all(&self, rows: &[u8]) -> Vec<u8> {
        let wide = self.wide_width();
        let narrow: usize = self.narrow.iter().sum();
        let mut out = Vec::with_capacity(rows.len() / wide.max(1) * narrow);
        for row in rows.chunks_exact(wide) {
            self.narrow_into(row, &mut out);
        }
        out
    }
}

/// Narrows the rows of another source as they are pulled.
struct NarrowedRows<S> {
    inner: S,
    narrowing: Narrowing,
    buf: Vec<u8>,
}

impl<S: RowSource> RowSource for NarrowedRows<S> {
    fn fill(&mut self, out: &mut Vec<u8>, max_rows: usize) -> Result<usize> {
        self.buf.clear();
        let n = self.inner.fill(&mut self.buf, max_rows)?;
        for row in self.buf.chunks_exact(self.narrowing.wide_width()) {
            self.narrowing.narrow_into(row, out);
        }
        Ok(n)
    }
}

/// How the collected rows get sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortPath {
    /// One integer key.
    Radix,
    /// Two integer keys.
    RadixPairs,
    /// One text key.
    External,
    /// One key, several participants.
    Parallel,
    /// Everything else.
    Permutation,
}

impl SortPath {
    fn choose(schema: &Schema, options: &Options) -> Self {
        let plain_keys = schema.includes.is_empty();
        let k1 = schema.keys[0].ty;
        match schema.nkeys() {
            1 if plain_keys && options.parallel_workers > 0 => SortPath::Parallel,
            1 if plain_keys && k1.is_integer() => SortPath::Radix,
            1 if plain_keys && k1.is_text() => SortPath::External,
            2 if plain_keys && k1.is_integer() && schema.keys[1].ty.is_integer() => {
                SortPath::RadixPairs
            }
            _ => SortPath::Permutation,
        }
    }
}

/// Collected, possibly sorted rows awaiting final widths.
enum Collected {
    Ints(Vec<i64>),
    Pairs(Vec<(i64, i64)>),
    Merged(MergedRows),
    Rows(Vec<u8>),
}

struct Collection {
    data: Collected,
    rows: u64,
    maxlens: Vec<usize>,
    participants: usize,
}

/// Builds an index into an empty page store.
///
/// # Example
/// ```
/// use smolidx::build::IndexBuilder;
/// use smolidx::store::{MemPageStore, PageStore};
/// use smolidx::types::{KeyType, Schema, Value};
/// use smolidx::Options;
/// use std::sync::Arc;
///
/// let store: Arc<dyn PageStore> = Arc::new(MemPageStore::new(8192));
/// let rows: Vec<Vec<Value>> = [5, 1, 1, 3].iter().map(|&k| vec![Value::Int(k)]).collect();
/// let result = IndexBuilder::new(store, Schema::single("k", KeyType::Int4), Options::default())
///     .build(&rows)
///     .unwrap();
/// assert_eq!(result.rows, 4);
/// assert_eq!(result.height, 1);
/// ```
pub struct IndexBuilder {
    store: Arc<dyn PageStore>,
    schema: Schema,
    options: Options,
}

impl IndexBuilder {
    /// Create a builder.
    pub fn new(store: Arc<dyn PageStore>, schema: Schema, options: Options) -> Self {
        Self { store, schema, options }
    }

    /// Scan `table`, sort its rows and write the index.
    pub fn build(&self, table: &dyn TableScan) -> Result<BuildResult> {
        let start = Instant::now();
        self.options.validate()?;
        self.schema.validate()?;
        let store = self.store.as_ref();
        if store.page_size() != self.options.page_size {
            return Err(Error::invalid_argument(format!(
                "page store uses {} byte pages, options ask for {}",
                store.page_size(),
                self.options.page_size
            )));
        }
        if store.num_pages() != 0 {
            return Err(Error::invalid_argument("page store is not empty"));
        }

        let encoder = RowEncoder::new(&self.schema);
        let first = &self.schema.keys[0];
        let meta_blk = store.allocate()?;
        if meta_blk != META_BLOCK {
            return Err(Error::internal(format!("metapage allocated at block {}", meta_blk)));
        }
        let wide_key = first.ty.fixed_width().unwrap_or(MAX_TEXT_LEN) as u16;
        write_meta(store, &MetaPage::empty(self.options.page_size as u32, first.ty, wide_key))?;

        let path = SortPath::choose(&self.schema, &self.options);
        log::info!(
            "building index on ({}) with {:?} sort",
            self.schema.keys.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", "),
            path
        );
        let collection = self.collect(&encoder, path, table)?;
        let widths = encoder.final_widths(&collection.maxlens)?;
        let layout = Arc::new(encoder.layout(&widths));
        let mut meta = self.meta_for(&widths, &layout);

        if collection.rows == 0 {
            write_meta(store, &meta)?;
            store.sync()?;
            log::info!("built empty index in {:?}", start.elapsed());
            return Ok(BuildResult {
                rows: 0,
                leaf_pages: 0,
                internal_pages: 0,
                height: 0,
                root: INVALID_BLOCK,
                elapsed: start.elapsed(),
                formats: FormatCounts::default(),
                participants: collection.participants,
            });
        }

        let participants = collection.participants;
        let mut source = self.sorted_source(collection.data, encoder.narrowing(&widths), &widths)?;

        let key_cmp = KeyComparator::new(first.ty, first.collation);
        let mut packer = LeafPacker::new(
            store,
            layout.clone(),
            key_cmp,
            PackOptions {
                rle_uniqueness_threshold: self.options.rle_uniqueness_threshold,
                key_rle_version: meta.key_rle_version,
                max_rows_per_leaf: self.options.max_rows_per_leaf,
                bloom_nhash: self.options.build_bloom_filters.then_some(self.options.bloom_nhash),
                progress_log_every: self.options.progress_log_every,
            },
        );
        packer.pack(source.as_mut())?;
        let packed = packer.finish()?;
        let leaf_pages = packed.leaves.len();

        meta.row_count = packed.rows;
        let shape = build_levels(
            store,
            packed.leaves,
            layout.key_len,
            &mut meta,
            LevelOptions {
                zone_maps: self.options.build_zone_maps,
                bloom: self.options.build_bloom_filters,
                max_fanout: self.options.max_internal_fanout,
            },
        )?;
        write_meta(store, &meta)?;
        store.sync()?;

        let result = BuildResult {
            rows: packed.rows,
            leaf_pages,
            internal_pages: shape.internal_pages,
            height: shape.height,
            root: shape.root,
            elapsed: start.elapsed(),
            formats: packed.formats,
            participants,
        };
        log::info!(
            "built index: {} rows, {} leaves ({} RLE), {} internal pages, height {} in {:?}",
            result.rows,
            result.leaf_pages,
            result.formats.rle_pages(),
            result.internal_pages,
            result.height,
            result.elapsed
        );
        Ok(result)
    }

    fn meta_for(&self, widths: &[usize], layout: &LeafLayout) -> MetaPage {
        let nkeys = self.schema.nkeys();
        let first = &self.schema.keys[0];
        let mut meta =
            MetaPage::empty(self.options.page_size as u32, first.ty, layout.key_len as u16);
        meta.nkeyatts = nkeys as u8;
        meta.key_type2 = self.schema.keys.get(1).map(|c| c.ty);
        meta.key_len2 = layout.key2_len as u16;
        meta.collation = first.collation;
        meta.includes = self
            .schema
            .includes
            .iter()
            .zip(&widths[nkeys..])
            .map(|(c, &w)| IncludeMeta { ty: c.ty, len: w as u16 })
            .collect();
        meta.zone_maps = self.options.build_zone_maps;
        meta.bloom_enabled = self.options.build_bloom_filters;
        meta.bloom_nhash = self.options.bloom_nhash;
        meta.key_rle_version = self.options.key_rle_version.resolve(first.ty.is_text());
        meta
    }

    /// Comparator over rows whose key columns are `k1` and `k2` bytes wide.
    fn row_comparator(&self, k1: usize, k2: usize) -> RowComparator {
        let key = |i: usize| {
            let c = &self.schema.keys[i];
            KeyComparator::new(c.ty, c.collation)
        };
        let second = (self.schema.nkeys() == 2).then(|| (key(1), k2));
        RowComparator::new(key(0), k1, second)
    }

    fn collect(
        &self,
        encoder: &RowEncoder,
        path: SortPath,
        table: &dyn TableScan,
    ) -> Result<Collection> {
        if path == SortPath::Parallel {
            return self.collect_parallel(encoder, table);
        }

        let mut maxlens = vec![0usize; encoder.ncols()];
        let mut rows = 0u64;
        let mut scratch = Vec::with_capacity(encoder.wide_width());
        let every = self.options.progress_log_every;
        let progress = |rows: u64| {
            if every > 0 && rows % every == 0 {
                log::info!("scanned {} rows", rows);
            }
        };

        let data = match path {
            SortPath::Radix => {
                let w = encoder.cols[0].wide;
                let mut keys = Vec::new();
                table.scan(0, 1, &mut |row| {
                    scratch.clear();
                    encoder.encode(row, &mut scratch, &mut maxlens)?;
                    keys.push(read_int(&scratch[..w]));
                    rows += 1;
                    progress(rows);
                    Ok(())
                })?;
                radix_sort_i64(&mut keys);
                Collected::Ints(keys)
            }
            SortPath::RadixPairs => {
                let (w1, w2) = (encoder.cols[0].wide, encoder.cols[1].wide);
                let mut pairs = Vec::new();
                table.scan(0, 1, &mut |row| {
                    scratch.clear();
                    encoder.encode(row, &mut scratch, &mut maxlens)?;
                    pairs.push((read_int(&scratch[..w1]), read_int(&scratch[w1..w1 + w2])));
                    rows += 1;
                    progress(rows);
                    Ok(())
                })?;
                radix_sort_pairs(&mut pairs);
                Collected::Pairs(pairs)
            }
            SortPath::External => {
                let width = encoder.wide_width();
                let cmp = self.row_comparator(encoder.cols[0].wide, 0);
                let mut sorter = ExternalSorter::new(width, cmp, self.options.sort_memory);
                table.scan(0, 1, &mut |row| {
                    scratch.clear();
                    encoder.encode(row, &mut scratch, &mut maxlens)?;
                    sorter.push(&scratch)?;
                    rows += 1;
                    progress(rows);
                    Ok(())
                })?;
                Collected::Merged(sorter.finish()?)
            }
            SortPath::Permutation | SortPath::Parallel => {
                let mut data = Vec::new();
                table.scan(0, 1, &mut |row| {
                    encoder.encode(row, &mut data, &mut maxlens)?;
                    rows += 1;
                    progress(rows);
                    Ok(())
                })?;
                Collected::Rows(data)
            }
        };
        Ok(Collection { data, rows, maxlens, participants: 1 })
    }

    fn collect_parallel(&self, encoder: &RowEncoder, table: &dyn TableScan) -> Result<Collection> {
        let workers = self.options.parallel_workers;
        let width = encoder.wide_width();
        let cmp = self.row_comparator(encoder.cols[0].wide, 0);
        let memory = (self.options.sort_memory / (workers + 1)).max(width);

        let (outputs, state, launched) = run_parallel(workers, |partition, nparts| {
            let mut sorter = ExternalSorter::new(width, cmp, memory);
            let mut maxlens = vec![0usize; encoder.ncols()];
            let mut scratch = Vec::with_capacity(width);
            table.scan(partition, nparts, &mut |row| {
                scratch.clear();
                encoder.encode(row, &mut scratch, &mut maxlens)?;
                sorter.push(&scratch)
            })?;
            log::debug!("build partition {} of {} sorted {} rows", partition, nparts, sorter.rows());
            Ok(PartitionOutput {
                rows: sorter.rows(),
                maxlen: maxlens[0],
                runs: sorter.into_runs()?,
            })
        })?;

        let merged = merge_runs(outputs.into_iter().map(|o| o.runs).collect())?;
        Ok(Collection {
            data: Collected::Merged(merged),
            rows: state.reltuples,
            maxlens: vec![state.maxlen],
            participants: launched + 1,
        })
    }

    fn sorted_source(
        &self,
        data: Collected,
        narrowing: Narrowing,
        widths: &[usize],
    ) -> Result<Box<dyn RowSource>> {
        let k1 = widths[0];
        Ok(match data {
            Collected::Ints(keys) => {
                let mut out = Vec::with_capacity(keys.len() * k1);
                for k in keys {
                    out.extend_from_slice(&k.to_le_bytes()[..k1]);
                }
                Box::new(MemRows::new(out, k1))
            }
            Collected::Pairs(pairs) => {
                let k2 = widths[1];
                let mut out = Vec::with_capacity(pairs.len() * (k1 + k2));
                for (a, b) in pairs {
                    out.extend_from_slice(&a.to_le_bytes()[..k1]);
                    out.extend_from_slice(&b.to_le_bytes()[..k2]);
                }
                Box::new(MemRows::new(out, k1 + k2))
            }
            Collected::Merged(merged) if narrowing.is_identity() => Box::new(merged),
            Collected::Merged(merged) => {
                Box::new(NarrowedRows { inner: merged, narrowing, buf: Vec::new() })
            }
            Collected::Rows(wide) => {
                let rows = narrowing.narrow_all(&wide);
                drop(wide);
                let width: usize = widths.iter().sum();
                let k2 = if self.schema.nkeys() == 2 { widths[1] } else { 0 };
                let perm = sort_permutation(&rows, width, &self.row_comparator(k1, k2));
                Box::new(MemRows::new(apply_permutation(&rows, width, &perm), width))
            }
        })
    }
}

//! Index-only scans.
//!
//! A scan is opened in [`ScanMode::IndexOnly`], given a set of
//! [`ScanKey`]s through `rescan`, and then pulled one [`IndexTuple`] at a
//! time in either [`Direction`]. Predicates on the leading key are folded
//! into a single lower and upper bound that drive the tree descent; those on
//! the second key column of a two-column index are re-checked per row.
//!
//! The cursor itself lives in [`cursor`]; descent and end-position search
//! in [`descend`]; the parallel leaf-claiming protocol in [`parallel`].

pub mod cursor;
pub mod descend;
pub mod parallel;
pub mod prefetch;
pub mod run_cache;
pub mod tuple_buffer;

pub use cursor::{IndexScan, ScanIter, ScanProfile};
pub use parallel::ParallelScanState;

use crate::config::Options;
use crate::error::{Error, Result};
use crate::page::{InternalPage, LeafLayout, LeafView, MetaPage, Page};
use crate::store::{BlockNumber, PageStore};
use crate::types::{BoundValue, KeyComparator, Value};
use std::cmp::Ordering;
use std::sync::Arc;

/// Comparison applied by a scan key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `=`
    Eq,
    /// `>=`
    Ge,
    /// `>`
    Gt,
    /// `IS NULL`: rejected, the index stores no NULLs.
    IsNull,
    /// `IS NOT NULL`: always true.
    IsNotNull,
}

/// One search predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanKey {
    /// 1-based key column number.
    pub attno: usize,
    /// Comparison.
    pub op: ScanOp,
    /// Right-hand side.
    pub arg: Value,
}

impl ScanKey {
    /// Create a predicate `column(attno) op arg`.
    pub fn new(attno: usize, op: ScanOp, arg: impl Into<Value>) -> Self {
        Self { attno, op, arg: arg.into() }
    }

    /// `column(attno) = arg`
    pub fn eq(attno: usize, arg: impl Into<Value>) -> Self {
        Self::new(attno, ScanOp::Eq, arg)
    }
}

/// What a scan returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Tuples are built from index contents alone.
    IndexOnly,
    /// Tuples would reference table rows; unsupported.
    RowReturning,
}

/// Scan direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending key order.
    Forward,
    /// Descending key order.
    Backward,
}

/// Synthetic row identity attached to every returned tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLocator {
    /// Block number.
    pub block: u32,
    /// Offset within the block.
    pub offset: u16,
}

/// The one locator every tuple carries; the index owns no table rows.
pub const SYNTHETIC_LOCATOR: RowLocator = RowLocator { block: 0, offset: 1 };

/// A returned row: key columns, then INCLUDE columns.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexTuple {
    /// Column values.
    pub values: Vec<Value>,
    /// Always [`SYNTHETIC_LOCATOR`].
    pub locator: RowLocator,
}

/// One end of a key range.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    /// Boundary value.
    pub value: BoundValue,
    /// The boundary itself is excluded.
    pub strict: bool,
}

/// Predicates folded into bounds on the leading key plus per-row filters
/// on the second key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanBounds {
    /// Tightest lower bound.
    pub lower: Option<Bound>,
    /// Tightest upper bound.
    pub upper: Option<Bound>,
    /// An equality predicate set both bounds.
    pub equality: bool,
    /// The predicates cannot match any row.
    pub no_rows: bool,
    /// Predicates on the second key column.
    pub key2_filters: Vec<(ScanOp, BoundValue)>,
}

impl ScanBounds {
    /// Fold `keys` for an index with `nkeys` key columns.
    pub fn fold(
        keys: &[ScanKey],
        nkeys: usize,
        key_cmp: &KeyComparator,
        key2_cmp: Option<&KeyComparator>,
    ) -> Result<Self> {
        let mut bounds = ScanBounds::default();
        for key in keys {
            if key.attno == 0 || key.attno > nkeys {
                return Err(Error::invalid_argument(format!(
                    "scan key on column {} of an index with {} key columns",
                    key.attno, nkeys
                )));
            }
            match key.op {
                ScanOp::IsNull => return Err(Error::usage("IS NULL searches are not supported")),
                ScanOp::IsNotNull => continue,
                _ => {}
            }

            let cmp = if key.attno == 1 {
                key_cmp
            } else {
                key2_cmp.ok_or_else(|| Error::internal("second key comparator missing"))?
            };
            let value = match cmp.bound(&key.arg)? {
                Some(v) => v,
                None => {
                    bounds.no_rows = true;
                    continue;
                }
            };

            if key.attno == 2 {
                bounds.key2_filters.push((key.op, value));
                continue;
            }
            match key.op {
                ScanOp::Gt => bounds.tighten_lower(key_cmp, value, true),
                ScanOp::Ge => bounds.tighten_lower(key_cmp, value, false),
                ScanOp::Lt => bounds.tighten_upper(key_cmp, value, true),
                ScanOp::Le => bounds.tighten_upper(key_cmp, value, false),
                ScanOp::Eq => {
                    bounds.equality = true;
                    bounds.tighten_lower(key_cmp, value.clone(), false);
                    bounds.tighten_upper(key_cmp, value, false);
                }
                ScanOp::IsNull | ScanOp::IsNotNull => {}
            }
        }

        if let (Some(lo), Some(hi)) = (&bounds.lower, &bounds.upper) {
            match key_cmp.compare_bounds(&lo.value, &hi.value) {
                Ordering::Greater => bounds.no_rows = true,
                Ordering::Equal if lo.strict || hi.strict => bounds.no_rows = true,
                _ => {}
            }
        }
        Ok(bounds)
    }

    fn tighten_lower(&mut self, cmp: &KeyComparator, value: BoundValue, strict: bool) {
        let tighter = match &self.lower {
            None => true,
            Some(cur) => match cmp.compare_bounds(&value, &cur.value) {
                Ordering::Greater => true,
                Ordering::Equal => strict && !cur.strict,
                Ordering::Less => false,
            },
        };
        if tighter {
            self.lower = Some(Bound { value, strict });
        }
    }

    fn tighten_upper(&mut self, cmp: &KeyComparator, value: BoundValue, strict: bool) {
        let tighter = match &self.upper {
            None => true,
            Some(cur) => match cmp.compare_bounds(&value, &cur.value) {
                Ordering::Less => true,
                Ordering::Equal => strict && !cur.strict,
                Ordering::Greater => false,
            },
        };
        if tighter {
            self.upper = Some(Bound { value, strict });
        }
    }

    /// True when `key` lies beyond the upper bound.
    pub fn above_upper(&self, cmp: &KeyComparator, key: &[u8]) -> bool {
        match &self.upper {
            Some(b) => match cmp.compare_to_bound(key, &b.value) {
                Ordering::Greater => true,
                Ordering::Equal => b.strict,
                Ordering::Less => false,
            },
            None => false,
        }
    }

    /// True when `key` lies before the lower bound.
    pub fn below_lower(&self, cmp: &KeyComparator, key: &[u8]) -> bool {
        match &self.lower {
            Some(b) => match cmp.compare_to_bound(key, &b.value) {
                Ordering::Less => true,
                Ordering::Equal => b.strict,
                Ordering::Greater => false,
            },
            None => false,
        }
    }

    /// True when the second key column satisfies every filter.
    pub fn key2_matches(&self, cmp: &KeyComparator, key2: &[u8]) -> bool {
        self.key2_filters.iter().all(|(op, v)| {
            let ord = cmp.compare_to_bound(key2, v);
            match op {
                ScanOp::Lt => ord == Ordering::Less,
                ScanOp::Le => ord != Ordering::Greater,
                ScanOp::Eq => ord == Ordering::Equal,
                ScanOp::Ge => ord != Ordering::Less,
                ScanOp::Gt => ord == Ordering::Greater,
                ScanOp::IsNull | ScanOp::IsNotNull => true,
            }
        })
    }
}

/// Everything a scan needs from an opened index.
pub(crate) struct ScanContext {
    pub store: Arc<dyn PageStore>,
    pub meta: MetaPage,
    pub layout: Arc<LeafLayout>,
    pub key_cmp: KeyComparator,
    pub key2_cmp: Option<KeyComparator>,
    pub options: Options,
}

impl ScanContext {
    pub fn new(store: Arc<dyn PageStore>, meta: MetaPage, options: Options) -> Self {
        let layout = Arc::new(LeafLayout::from_meta(&meta));
        let key_cmp = KeyComparator::new(meta.key_type1, meta.collation);
        let key2_cmp = meta.key_type2.map(|t| KeyComparator::new(t, Default::default()));
        Self { store, meta, layout, key_cmp, key2_cmp, options }
    }

    /// Zone maps are both recorded and wanted.
    pub fn zone_maps(&self) -> bool {
        self.meta.zone_maps && self.options.scan_zone_maps
    }

    /// Bloom filters are both recorded and wanted.
    pub fn bloom_filters(&self) -> bool {
        self.meta.bloom_enabled && self.options.scan_bloom_filters
    }

    pub fn read_internal(&self, blk: BlockNumber) -> Result<InternalPage> {
        let page = Page::read(self.store.as_ref(), blk)?;
        if !page.is_internal() {
            return Err(Error::corruption(format!("block {} is not an internal page", blk)));
        }
        InternalPage::parse(page.payload(), self.layout.key_len)
    }

    pub fn read_leaf(&self, blk: BlockNumber) -> Result<(Page, LeafView)> {
        let page = Page::read(self.store.as_ref(), blk)?;
        if !page.is_leaf() {
            return Err(Error::corruption(format!("block {} is not a leaf page", blk)));
        }
        let view = LeafView::parse(page.payload(), self.layout.clone())?;
        Ok((page, view))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Collation, KeyType};

    fn int() -> KeyComparator {
        KeyComparator::new(KeyType::Int4, Collation::Binary)
    }

    #[test]
    fn test_fold_tightest_bounds() {
        let keys = vec![
            ScanKey::new(1, ScanOp::Gt, 3),
            ScanKey::new(1, ScanOp::Ge, 5),
            ScanKey::new(1, ScanOp::Lt, 20),
            ScanKey::new(1, ScanOp::Le, 20),
            ScanKey::new(1, ScanOp::IsNotNull, Value::Null),
        ];
        let b = ScanBounds::fold(&keys, 1, &int(), None).unwrap();
        assert_eq!(b.lower, Some(Bound { value: BoundValue::Int(5), strict: false }));
        assert_eq!(b.upper, Some(Bound { value: BoundValue::Int(20), strict: true }));
        assert!(!b.equality);
        assert!(!b.no_rows);
    }

    #[test]
    fn test_fold_equality_and_contradictions() {
        let b = ScanBounds::fold(&[ScanKey::eq(1, 7)], 1, &int(), None).unwrap();
        assert!(b.equality);
        assert_eq!(b.lower, b.upper);

        let b = ScanBounds::fold(&[ScanKey::eq(1, 7), ScanKey::new(1, ScanOp::Gt, 7)], 1, &int(), None)
            .unwrap();
        assert!(b.no_rows);

        let b = ScanBounds::fold(
            &[ScanKey::new(1, ScanOp::Ge, 9), ScanKey::new(1, ScanOp::Le, 2)],
            1,
            &int(),
            None,
        )
        .unwrap();
        assert!(b.no_rows);

        let b = ScanBounds::fold(&[ScanKey::eq(1, Value::Null)], 1, &int(), None).unwrap();
        assert!(b.no_rows);
    }

    #[test]
    fn test_fold_errors() {
        let err = ScanBounds::fold(&[ScanKey::new(1, ScanOp::IsNull, Value::Null)], 1, &int(), None)
            .unwrap_err();
        assert!(matches!(err, Error::Usage(_)));

        let err = ScanBounds::fold(&[ScanKey::eq(2, 1)], 1, &int(), None).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_key2_filters() {
        let k2 = KeyComparator::new(KeyType::Int8, Collation::Binary);
        let keys = vec![ScanKey::new(2, ScanOp::Ge, 5), ScanKey::new(2, ScanOp::Lt, 10)];
        let b = ScanBounds::fold(&keys, 2, &int(), Some(&k2)).unwrap();
        assert!(b.lower.is_none());
        assert_eq!(b.key2_filters.len(), 2);
        assert!(b.key2_matches(&k2, &5i64.to_le_bytes()));
        assert!(!b.key2_matches(&k2, &10i64.to_le_bytes()));
        assert!(!b.key2_matches(&k2, &4i64.to_le_bytes()));
    }

    #[test]
    fn test_bound_checks() {
        let b = ScanBounds::fold(
            &[ScanKey::new(1, ScanOp::Gt, 2), ScanKey::new(1, ScanOp::Le, 4)],
            1,
            &int(),
            None,
        )
        .unwrap();
        let cmp = int();
        assert!(b.below_lower(&cmp, &2i32.to_le_bytes()));
        assert!(!b.below_lower(&cmp, &3i32.to_le_bytes()));
        assert!(!b.above_upper(&cmp, &4i32.to_le_bytes()));
        assert!(b.above_upper(&cmp, &5i32.to_le_bytes()));
    }
}

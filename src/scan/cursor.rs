//! Scan cursor.
//!
//! An [`IndexScan`] moves through three states:
//!
//! - `Uninitialized`: bounds are known but no leaf is pinned. The next call
//!   seeks: descends to the first leaf (forward), claims leaves from the
//!   shared cursor (parallel), or finds the rightmost leaf (backward).
//! - `Iterating`: a leaf is pinned and rows are produced from it into the
//!   tuple buffer. When the leaf runs out the cursor reads its sibling link,
//!   releases the leaf and pins the sibling.
//! - `Exhausted`: no row can match any more. Buffered tuples are still
//!   returned; after that every call yields `None` until the next rescan.
//!
//! A rescan or a change of direction drops back to `Uninitialized`.

use super::descend::{find_end_position, find_first_leaf, rightmost_leaf};
use super::parallel::{claim_batch, ParallelScanState};
use super::prefetch::{PrefetchPolicy, ScanKind};
use super::run_cache::RunCache;
use super::tuple_buffer::TupleBuffer;
use super::{
    Direction, IndexTuple, ScanBounds, ScanContext, ScanKey, ScanMode, SYNTHETIC_LOCATOR,
};
use crate::error::{Error, Result};
use crate::page::{LeafView, Page};
use crate::store::{BlockNumber, INVALID_BLOCK};
use crate::types::{decode_value, Value};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;

/// Per-scan counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanProfile {
    /// Calls to `next_tuple`.
    pub calls: u64,
    /// Tuples returned.
    pub rows: u64,
    /// Leaves pinned.
    pub leaf_pages: u64,
    /// Key comparisons made by binary searches.
    pub search_steps: u64,
    /// Descents cut short because no subtree could match.
    pub subtrees_pruned: u64,
    /// Bloom filters consulted.
    pub bloom_checks: u64,
    /// Bloom filters that excluded the key.
    pub bloom_skips: u64,
    /// Rows served from the run cache.
    pub run_cache_hits: u64,
    /// Rows whose run had to be decoded.
    pub run_cache_misses: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Uninitialized,
    Iterating,
    Exhausted,
}

struct CurrentLeaf {
    page: Page,
    view: LeafView,
    /// Forward: next row to examine. Backward: one past it.
    offset: usize,
    /// Forward: row at which to stop.
    stop: usize,
}

/// An open index-only scan.
pub struct IndexScan {
    ctx: Arc<ScanContext>,
    parallel: Option<Arc<ParallelScanState>>,
    bounds: ScanBounds,
    state: ScanState,
    direction: Direction,
    leaf: Option<CurrentLeaf>,
    end: Option<(BlockNumber, usize)>,
    claimed: VecDeque<BlockNumber>,
    run_cache: RunCache,
    prefetch: PrefetchPolicy,
    buffer: TupleBuffer,
    current: Option<IndexTuple>,
    profile: ScanProfile,
}

impl std::fmt::Debug for IndexScan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexScan")
            .field("state", &self.state)
            .field("direction", &self.direction)
            .field("bounds", &self.bounds)
            .field("parallel", &self.parallel.is_some())
            .field("profile", &self.profile)
            .finish()
    }
}

impl IndexScan {
    pub(crate) fn new(
        ctx: Arc<ScanContext>,
        mode: ScanMode,
        parallel: Option<Arc<ParallelScanState>>,
    ) -> Result<Self> {
        if mode != ScanMode::IndexOnly {
            return Err(Error::usage("only index-only scans are supported"));
        }
        let depth = ctx.options.prefetch_depth;
        Ok(Self {
            ctx,
            parallel,
            bounds: ScanBounds::default(),
            state: ScanState::Uninitialized,
            direction: Direction::Forward,
            leaf: None,
            end: None,
            claimed: VecDeque::new(),
            run_cache: RunCache::default(),
            prefetch: PrefetchPolicy::new(ScanKind::Unbounded, depth),
            buffer: TupleBuffer::default(),
            current: None,
            profile: ScanProfile::default(),
        })
    }

    /// Restart the scan with new predicates.
    ///
    /// Predicates are validated here: a search for NULL is a usage error,
    /// a column number outside the key is an invalid argument.
    pub fn rescan(&mut self, keys: &[ScanKey]) -> Result<()> {
        let ctx = &self.ctx;
        self.bounds = ScanBounds::fold(
            keys,
            ctx.meta.nkeyatts as usize,
            &ctx.key_cmp,
            ctx.key2_cmp.as_ref(),
        )?;
        self.reset();
        self.run_cache = RunCache::default();
        self.profile = ScanProfile::default();
        Ok(())
    }

    /// Next tuple in `direction`, or `None` when the scan is over.
    ///
    /// The returned tuple is valid until the next call.
    pub fn next_tuple(&mut self, direction: Direction) -> Result<Option<&IndexTuple>> {
        self.current = self.next_owned(direction)?;
        Ok(self.current.as_ref())
    }

    /// Counters gathered since the last rescan.
    pub fn profile(&self) -> ScanProfile {
        let mut profile = self.profile;
        profile.run_cache_hits = self.run_cache.hits();
        profile.run_cache_misses = self.run_cache.misses();
        profile
    }

    pub(crate) fn next_owned(&mut self, direction: Direction) -> Result<Option<IndexTuple>> {
        self.profile.calls += 1;
        if direction != self.direction {
            if self.state != ScanState::Uninitialized {
                log::debug!("scan direction changed to {:?}, restarting", direction);
                self.reset();
            }
            self.direction = direction;
        }
        if self.state == ScanState::Uninitialized {
            self.seek()?;
        }

        loop {
            if let Some(tuple) = self.buffer.pop() {
                self.profile.rows += 1;
                return Ok(Some(tuple));
            }
            if self.state == ScanState::Exhausted {
                return Ok(None);
            }
            self.fill()?;
        }
    }

    fn reset(&mut self) {
        self.state = ScanState::Uninitialized;
        self.leaf = None;
        self.end = None;
        self.claimed.clear();
        self.buffer.clear();
        self.run_cache.invalidate();
    }

    fn exhaust(&mut self) {
        self.leaf = None;
        self.claimed.clear();
        self.state = ScanState::Exhausted;
        if self.ctx.options.profile {
            let p = self.profile();
            log::info!(
                "scan done: calls={} rows={} leaves={} steps={} pruned={} bloom={}/{} run_cache={}/{}",
                p.calls,
                p.rows,
                p.leaf_pages,
                p.search_steps,
                p.subtrees_pruned,
                p.bloom_skips,
                p.bloom_checks,
                p.run_cache_hits,
                p.run_cache_hits + p.run_cache_misses
            );
        }
    }

    fn scan_kind(&self) -> ScanKind {
        if self.bounds.equality {
            ScanKind::Equality
        } else if self.bounds.upper.is_some() {
            ScanKind::UpperBounded
        } else {
            ScanKind::Unbounded
        }
    }

    /// The end position is resolved up front only for plain forward scans
    /// with an upper bound on keys whose bytes decide equality.
    fn use_position_scan(&self) -> bool {
        self.ctx.options.use_position_scan
            && self.direction == Direction::Forward
            && self.parallel.is_none()
            && self.bounds.upper.is_some()
            && self.bounds.key2_filters.is_empty()
            && self.ctx.key_cmp.is_bytewise()
    }

    fn seek(&mut self) -> Result<()> {
        let kind = self.scan_kind();
        self.prefetch.reset(kind);
        if self.bounds.no_rows || self.ctx.meta.is_empty() {
            self.exhaust();
            return Ok(());
        }

        let ctx = self.ctx.clone();
        let start = match self.direction {
            Direction::Forward if self.parallel.is_some() => self.next_claimed()?,
            Direction::Forward => {
                let first = find_first_leaf(&ctx, &self.bounds, &mut self.profile)?;
                if first.is_some() && self.use_position_scan() {
                    if let Some(upper) = &self.bounds.upper {
                        self.end = find_end_position(&ctx, upper, &mut self.profile)?;
                        log::debug!("scan ends at {:?}", self.end);
                    }
                }
                first
            }
            Direction::Backward => {
                if self.parallel.is_some() {
                    return Err(Error::usage("parallel scans run forward only"));
                }
                Some(rightmost_leaf(&ctx)?)
            }
        };

        match start {
            Some(blk) => {
                self.state = ScanState::Iterating;
                self.load_leaf(blk)
            }
            None => {
                self.exhaust();
                Ok(())
            }
        }
    }

    fn next_claimed(&mut self) -> Result<Option<BlockNumber>> {
        if let Some(blk) = self.claimed.pop_front() {
            return Ok(Some(blk));
        }
        let shared = match &self.parallel {
            Some(shared) => shared.clone(),
            None => return Err(Error::internal("claim on a serial scan")),
        };
        let batch = claim_batch(
            &self.ctx,
            &shared,
            &self.bounds,
            &mut self.profile,
            self.ctx.options.parallel_claim_batch,
        )?;
        self.claimed.extend(batch);
        Ok(self.claimed.pop_front())
    }

    fn load_leaf(&mut self, blk: BlockNumber) -> Result<()> {
        let (page, view) = self.ctx.read_leaf(blk)?;
        self.profile.leaf_pages += 1;

        let forward = self.direction == Direction::Forward;
        let next = page.rightlink();
        self.prefetch.on_leaf(self.ctx.store.as_ref(), next, forward && next != INVALID_BLOCK);

        let nrows = view.row_count();
        let (offset, stop) = if forward {
            // re-seek on every leaf: a pruned descent may land short of the bound
            let offset = match &self.bounds.lower {
                Some(lower) => view.seek(
                    &self.ctx.key_cmp,
                    &lower.value,
                    lower.strict,
                    &mut self.profile.search_steps,
                ),
                None => 0,
            };
            let stop = match self.end {
                Some((end_blk, end_off)) if end_blk == blk => end_off.min(nrows),
                _ => nrows,
            };
            (offset, stop)
        } else {
            (nrows, 0)
        };
        log::debug!("pinned leaf {} ({} rows, {:?})", blk, nrows, view.format());
        self.leaf = Some(CurrentLeaf { page, view, offset, stop });
        Ok(())
    }

    /// Move to the next leaf in scan order, or exhaust the scan.
    fn advance_leaf(&mut self) -> Result<()> {
        let (blk, link) = match &self.leaf {
            Some(cur) => {
                let link = match self.direction {
                    Direction::Forward => cur.page.rightlink(),
                    Direction::Backward => cur.page.leftlink(),
                };
                (cur.page.block(), link)
            }
            None => {
                self.exhaust();
                return Ok(());
            }
        };
        self.leaf = None;

        if matches!(self.end, Some((end_blk, _)) if end_blk == blk) {
            self.exhaust();
            return Ok(());
        }

        let next = if self.parallel.is_some() {
            self.next_claimed()?
        } else {
            (link != INVALID_BLOCK).then_some(link)
        };
        match next {
            Some(next) => self.load_leaf(next),
            None => {
                self.exhaust();
                Ok(())
            }
        }
    }

    /// Stop a scan that ran past its upper bound.
    fn past_upper(&mut self) {
        if let Some(shared) = &self.parallel {
            shared.finish();
        }
        self.exhaust();
    }

    fn fill(&mut self) -> Result<()> {
        while !self.buffer.is_full() && self.state == ScanState::Iterating {
            match self.direction {
                Direction::Forward => self.step_forward()?,
                Direction::Backward => self.step_backward()?,
            }
        }
        Ok(())
    }

    fn step_forward(&mut self) -> Result<()> {
        let check_upper = self.end.is_none();
        let next = match &mut self.leaf {
            Some(cur) if cur.offset < cur.stop => {
                cur.offset += 1;
                Some((cur.page.block(), cur.offset - 1))
            }
            _ => None,
        };
        let (blk, row) = match next {
            Some(pos) => pos,
            None => return self.advance_leaf(),
        };

        let cur = self.leaf.as_ref().ok_or_else(|| Error::internal("no pinned leaf"))?;
        let key = cur.view.key_at(row)?;
        if check_upper && self.bounds.above_upper(&self.ctx.key_cmp, key) {
            log::debug!("leaf {} row {} is past the upper bound", blk, row);
            self.past_upper();
            return Ok(());
        }
        self.emit(blk, row)
    }

    fn step_backward(&mut self) -> Result<()> {
        let next = match &mut self.leaf {
            Some(cur) if cur.offset > 0 => {
                cur.offset -= 1;
                Some((cur.page.block(), cur.offset))
            }
            _ => None,
        };
        let (blk, row) = match next {
            Some(pos) => pos,
            None => return self.advance_leaf(),
        };

        let cur = self.leaf.as_ref().ok_or_else(|| Error::internal("no pinned leaf"))?;
        let key = cur.view.key_at(row)?;
        if self.bounds.below_lower(&self.ctx.key_cmp, key) {
            self.exhaust();
            return Ok(());
        }
        if self.bounds.above_upper(&self.ctx.key_cmp, key) {
            return Ok(());
        }
        self.emit(blk, row)
    }

    /// Queue row `row` of the pinned leaf if it passes the second-key filters.
    fn emit(&mut self, blk: BlockNumber, row: usize) -> Result<()> {
        let cur = self.leaf.as_ref().ok_or_else(|| Error::internal("no pinned leaf"))?;
        if !self.bounds.key2_filters.is_empty() {
            let key2_cmp =
                self.ctx.key2_cmp.as_ref().ok_or_else(|| Error::internal("second key comparator missing"))?;
            if !self.bounds.key2_matches(key2_cmp, cur.view.key2_at(row)?) {
                return Ok(());
            }
        }

        let values = if cur.view.format().is_rle() {
            match self.run_cache.lookup(blk, row) {
                Some(values) => values.to_vec(),
                None => {
                    let (start, end) = cur.view.run_bounds(row)?;
                    let values = decode_row(&self.ctx, &cur.view, row)?;
                    self.run_cache.store(blk, start, end, values).to_vec()
                }
            }
        } else {
            decode_row(&self.ctx, &cur.view, row)?
        };
        self.buffer.push(IndexTuple { values, locator: SYNTHETIC_LOCATOR });
        Ok(())
    }
}

/// Key columns then INCLUDE columns of row `i`.
fn decode_row(ctx: &ScanContext, view: &LeafView, i: usize) -> Result<Vec<Value>> {
    let meta = &ctx.meta;
    let mut values = Vec::with_capacity(meta.nkeyatts as usize + meta.includes.len());
    values.push(decode_value(meta.key_type1, view.key_at(i)?)?);
    if let Some(ty) = meta.key_type2 {
        values.push(decode_value(ty, view.key2_at(i)?)?);
    }
    for (col, inc) in meta.includes.iter().enumerate() {
        values.push(decode_value(inc.ty, view.include_at(i, col)?)?);
    }
    Ok(values)
}

/// Iterator over the tuples of one scan.
///
/// ```no_run
/// # fn demo(index: &smolidx::Index) -> smolidx::Result<()> {
/// use smolidx::scan::{ScanKey, ScanOp};
///
/// for tuple in index.scan(&[ScanKey::new(1, ScanOp::Ge, 10)])? {
///     println!("{:?}", tuple?.values);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ScanIter {
    scan: IndexScan,
    direction: Direction,
    failed: bool,
}

impl ScanIter {
    pub(crate) fn new(scan: IndexScan, direction: Direction) -> Self {
        Self { scan, direction, failed: false }
    }

    /// Counters of the underlying scan.
    pub fn profile(&self) -> ScanProfile {
        self.scan.profile()
    }
}

impl Iterator for ScanIter {
    type Item = Result<IndexTuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.scan.next_owned(self.direction) {
            Ok(tuple) => tuple.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

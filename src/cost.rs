//! Planner cost hook.
//!
//! The estimate is a heuristic: it never looks at the key distribution,
//! only at the index size and at which predicates the scan carries. Scans
//! without a predicate on the leading key are made deliberately expensive
//! so that a planner prefers any other access path.

use crate::config::Options;
use crate::scan::{ScanKey, ScanOp};

/// Added to the total cost of a scan with no leading-key predicate.
pub const NO_LEADING_KEY_PENALTY: f64 = 1e6;

/// Selectivity assumed when no predicate touches the leading key.
pub const DEFAULT_SELECTIVITY: f64 = 0.5;

/// Correlation between index order and table order reported to planners.
pub const INDEX_CORRELATION: f64 = 0.5;

/// Cost figures for one prospective scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    /// Cost before the first tuple is returned.
    pub startup_cost: f64,
    /// Cost of the whole scan.
    pub total_cost: f64,
    /// Fraction of the index expected to match.
    pub selectivity: f64,
    /// Index order versus table order.
    pub correlation: f64,
    /// Pages the scan may touch.
    pub pages: f64,
}

/// Estimate the cost of scanning an index of `pages` pages and `tuples`
/// rows with the predicates `keys`.
///
/// Both sizes are clamped to at least one. A leading-key predicate that
/// contains an equality is costed with `selec_eq`, any other leading-key
/// predicate with `selec_range`.
pub fn estimate_cost(pages: u64, tuples: u64, keys: &[ScanKey], options: &Options) -> CostEstimate {
    let pages = pages.max(1) as f64;
    let tuples = tuples.max(1) as f64;

    let leading: Vec<&ScanKey> = keys.iter().filter(|k| k.attno == 1).collect();
    let selectivity = if leading.is_empty() {
        DEFAULT_SELECTIVITY
    } else if leading.iter().any(|k| k.op == ScanOp::Eq) {
        options.selec_eq
    } else {
        options.selec_range
    };

    let mut total_cost = pages * options.cost_page + tuples * selectivity * options.cost_tup;
    if leading.is_empty() {
        total_cost += NO_LEADING_KEY_PENALTY;
    }

    CostEstimate {
        startup_cost: 0.0,
        total_cost,
        selectivity,
        correlation: INDEX_CORRELATION,
        pages,
    }
}

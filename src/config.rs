//! Configuration options for building and scanning an index.
//!
//! Every tunable is carried explicitly in [`Options`]; build and scan entry
//! points take a copy at construction time and never consult global state.

/// Configuration options for building and scanning an index.
#[derive(Debug, Clone)]
pub struct Options {
    /// Size of every page in bytes.
    /// Default: 8192
    pub page_size: usize,

    /// Record min/max/row-count/distinct-count per subtree while building.
    /// Default: true
    pub build_zone_maps: bool,

    /// Record a per-subtree bloom filter while building.
    /// Default: true
    pub build_bloom_filters: bool,

    /// Number of hash functions used by the per-subtree bloom filter.
    /// Default: 2
    pub bloom_nhash: u8,

    /// Use zone maps to prune subtrees while scanning.
    /// Default: true
    pub scan_zone_maps: bool,

    /// Use bloom filters to prune subtrees and leaves for equality scans.
    /// Default: true
    pub scan_bloom_filters: bool,

    /// Fraction of distinct runs (`nruns / nitems`) at or above which a
    /// key-only page is written plain instead of run-length encoded.
    /// Default: 0.98
    pub rle_uniqueness_threshold: f64,

    /// Key-RLE page tag to write.
    /// Default: KeyRleVersion::Auto
    pub key_rle_version: KeyRleVersion,

    /// Maximum number of leaves to prefetch ahead of a forward scan.
    /// Default: 1
    pub prefetch_depth: usize,

    /// Number of consecutive leaves a parallel scan participant claims at once.
    /// Default: 1
    pub parallel_claim_batch: usize,

    /// Resolve the end position of bounded forward scans up front.
    /// Default: true
    pub use_position_scan: bool,

    /// Number of worker threads for the parallel build (0 builds serially).
    /// Default: 0
    pub parallel_workers: usize,

    /// Bytes of rows held in memory by the external sort before a run spills.
    /// Default: 64MB
    pub sort_memory: usize,

    /// Planner cost per index page.
    /// Default: 0.02
    pub cost_page: f64,

    /// Planner cost per returned tuple.
    /// Default: 0.002
    pub cost_tup: f64,

    /// Selectivity assumed for an equality-like leading-key clause.
    /// Default: 0.01
    pub selec_eq: f64,

    /// Selectivity assumed for a range leading-key clause.
    /// Default: 0.10
    pub selec_range: f64,

    /// Log build progress every this many rows (0 disables).
    /// Default: 250000
    pub progress_log_every: u64,

    /// Log per-scan profiling counters when a scan ends.
    /// Default: false
    pub profile: bool,

    /// Cap on children per internal page (0 = limited by page space only).
    /// Default: 0
    pub max_internal_fanout: usize,

    /// Cap on rows per leaf page (0 = limited by page space only).
    /// Default: 0
    pub max_rows_per_leaf: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            build_zone_maps: true,
            build_bloom_filters: true,
            bloom_nhash: 2,
            scan_zone_maps: true,
            scan_bloom_filters: true,
            rle_uniqueness_threshold: 0.98,
            key_rle_version: KeyRleVersion::Auto,
            prefetch_depth: 1,
            parallel_claim_batch: 1,
            use_position_scan: true,
            parallel_workers: 0,
            sort_memory: 64 * 1024 * 1024, // 64MB
            cost_page: 0.02,
            cost_tup: 0.002,
            selec_eq: 0.01,
            selec_range: 0.10,
            progress_log_every: 250_000,
            profile: false,
            max_internal_fanout: 0,
            max_rows_per_leaf: 0,
        }
    }
}

/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 8192;

/// Smallest page size accepted by [`Options::validate`].
pub const MIN_PAGE_SIZE: usize = 256;

/// Largest page size accepted by [`Options::validate`]; offsets are 16-bit.
pub const MAX_PAGE_SIZE: usize = 32768;

/// Which Key-RLE page tag the leaf packer writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyRleVersion {
    /// Tag `0x8001`: no continuation byte.
    V1 = 1,

    /// Tag `0x8002`: carries a byte telling whether the first run continues
    /// the previous leaf's last run.
    V2 = 2,

    /// V2 for fixed-width keys, V1 for text keys.
    Auto = 3,
}

impl KeyRleVersion {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(KeyRleVersion::V1),
            2 => Some(KeyRleVersion::V2),
            3 => Some(KeyRleVersion::Auto),
            _ => None,
        }
    }

    /// Resolve `Auto` for a key column.
    pub fn resolve(self, text_key: bool) -> KeyRleVersion {
        match self {
            KeyRleVersion::Auto if text_key => KeyRleVersion::V1,
            KeyRleVersion::Auto => KeyRleVersion::V2,
            other => other,
        }
    }
}

impl Default for KeyRleVersion {
    fn default() -> Self {
        KeyRleVersion::Auto
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page size.
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Enables or disables zone maps, at build and scan time.
    pub fn zone_maps(mut self, value: bool) -> Self {
        self.build_zone_maps = value;
        self.scan_zone_maps = value;
        self
    }

    /// Enables or disables bloom filters, at build and scan time.
    pub fn bloom_filters(mut self, value: bool) -> Self {
        self.build_bloom_filters = value;
        self.scan_bloom_filters = value;
        self
    }

    /// Sets the number of bloom hash functions.
    pub fn bloom_nhash(mut self, n: u8) -> Self {
        self.bloom_nhash = n;
        self
    }

    /// Sets the RLE uniqueness threshold.
    pub fn rle_uniqueness_threshold(mut self, threshold: f64) -> Self {
        self.rle_uniqueness_threshold = threshold;
        self
    }

    /// Forces a Key-RLE page version.
    pub fn key_rle_version(mut self, version: KeyRleVersion) -> Self {
        self.key_rle_version = version;
        self
    }

    /// Sets the prefetch depth.
    pub fn prefetch_depth(mut self, depth: usize) -> Self {
        self.prefetch_depth = depth;
        self
    }

    /// Sets the parallel scan claim batch.
    pub fn parallel_claim_batch(mut self, batch: usize) -> Self {
        self.parallel_claim_batch = batch;
        self
    }

    /// Enables or disables position-based scans.
    pub fn use_position_scan(mut self, value: bool) -> Self {
        self.use_position_scan = value;
        self
    }

    /// Sets the number of parallel build workers.
    pub fn parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers;
        self
    }

    /// Sets the external sort memory budget.
    pub fn sort_memory(mut self, bytes: usize) -> Self {
        self.sort_memory = bytes;
        self
    }

    /// Enables or disables scan profiling logs.
    pub fn profile(mut self, value: bool) -> Self {
        self.profile = value;
        self
    }

    /// Caps the number of children per internal page.
    pub fn max_internal_fanout(mut self, fanout: usize) -> Self {
        self.max_internal_fanout = fanout;
        self
    }

    /// Caps the number of rows per leaf page.
    pub fn max_rows_per_leaf(mut self, rows: usize) -> Self {
        self.max_rows_per_leaf = rows;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.page_size < MIN_PAGE_SIZE || self.page_size > MAX_PAGE_SIZE {
            return Err(crate::Error::invalid_argument(format!(
                "page_size must be between {} and {}",
                MIN_PAGE_SIZE, MAX_PAGE_SIZE
            )));
        }
        if self.bloom_nhash == 0 || self.bloom_nhash > 8 {
            return Err(crate::Error::invalid_argument("bloom_nhash must be between 1 and 8"));
        }
        if !(0.0..=1.0).contains(&self.rle_uniqueness_threshold) {
            return Err(crate::Error::invalid_argument(
                "rle_uniqueness_threshold must be between 0 and 1",
            ));
        }
        if self.prefetch_depth == 0 || self.prefetch_depth > 16 {
            return Err(crate::Error::invalid_argument("prefetch_depth must be between 1 and 16"));
        }
        if self.parallel_claim_batch == 0 || self.parallel_claim_batch > 16 {
            return Err(crate::Error::invalid_argument(
                "parallel_claim_batch must be between 1 and 16",
            ));
        }
        if self.sort_memory == 0 {
            return Err(crate::Error::invalid_argument("sort_memory must be > 0"));
        }
        if self.max_internal_fanout == 1 {
            return Err(crate::Error::invalid_argument("max_internal_fanout must be 0 or >= 2"));
        }
        for (name, v) in [
            ("cost_page", self.cost_page),
            ("cost_tup", self.cost_tup),
            ("selec_eq", self.selec_eq),
            ("selec_range", self.selec_range),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(crate::Error::invalid_argument(format!(
                    "{} must be between 0 and 1",
                    name
                )));
            }
        }
        Ok(())
    }
}

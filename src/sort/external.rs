//! External merge sort over fixed-width rows.
//!
//! Rows are buffered until `memory` bytes are held, then sorted and spilled
//! to a temporary file as a sorted run. Runs are written as bincode-encoded
//! chunks so they can be streamed back one chunk at a time. A k-way heap
//! merge produces the final order; ties go to the run created first, which
//! keeps the whole sort stable.

use super::{sort_rows, RowComparator, RowSource};
use crate::error::Result;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use tempfile::TempDir;

/// Rows per spilled chunk.
const CHUNK_ROWS: usize = 4096;

/// One sorted run.
#[derive(Debug)]
enum SortedRun {
    Memory(Vec<u8>),
    Spilled { path: PathBuf, rows: u64 },
}

/// Sorted runs produced by one sorter, ready to be merged.
#[derive(Debug)]
pub struct SortedRuns {
    runs: Vec<SortedRun>,
    width: usize,
    cmp: RowComparator,
    dir: Option<TempDir>,
    rows: u64,
}

impl SortedRuns {
    /// Rows across all runs.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Number of runs.
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }
}

/// Accumulates rows and produces sorted runs.
///
/// # Example
/// ```
/// use smolidx::sort::{ExternalSorter, RowComparator, RowSource};
/// use smolidx::types::{Collation, KeyComparator, KeyType};
///
/// let cmp = RowComparator::new(KeyComparator::new(KeyType::Int8, Collation::Binary), 8, None);
/// let mut sorter = ExternalSorter::new(8, cmp, 16);
/// for k in [3i64, 1, 2] {
///     sorter.push(&k.to_le_bytes()).unwrap();
/// }
/// let mut merged = sorter.finish().unwrap();
/// let mut out = Vec::new();
/// assert_eq!(merged.fill(&mut out, 10).unwrap(), 3);
/// assert_eq!(&out[..8], &1i64.to_le_bytes());
/// ```
#[derive(Debug)]
pub struct ExternalSorter {
    width: usize,
    cmp: RowComparator,
    memory: usize,
    buffer: Vec<u8>,
    runs: Vec<SortedRun>,
    dir: Option<TempDir>,
    rows: u64,
}

impl ExternalSorter {
    /// Create a sorter for rows of `width` bytes holding up to `memory`
    /// bytes before spilling.
    pub fn new(width: usize, cmp: RowComparator, memory: usize) -> Self {
        Self {
            width,
            cmp,
            memory: memory.max(width),
            buffer: Vec::new(),
            runs: Vec::new(),
            dir: None,
            rows: 0,
        }
    }

    /// Add one row.
    pub fn push(&mut self, row: &[u8]) -> Result<()> {
        debug_assert_eq!(row.len(), self.width);
        self.buffer.extend_from_slice(row);
        self.rows += 1;
        if self.buffer.len() >= self.memory {
            self.spill()?;
        }
        Ok(())
    }

    /// Rows pushed so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    fn spill(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let sorted = sort_rows(&self.buffer, self.width, &self.cmp);
        self.buffer.clear();

        if self.dir.is_none() {
            self.dir = Some(tempfile::Builder::new().prefix("smolidx-sort").tempdir()?);
        }
        let dir = match &self.dir {
            Some(dir) => dir.path().to_path_buf(),
            None => return Err(crate::Error::internal("spill directory missing")),
        };
        let path = dir.join(format!("run-{:06}.spill", self.runs.len()));
        let mut writer = BufWriter::new(File::create(&path)?);
        for chunk in sorted.chunks(CHUNK_ROWS * self.width) {
            bincode::serialize_into(&mut writer, chunk)?;
        }
        writer.flush()?;

        let rows = (sorted.len() / self.width) as u64;
        log::debug!("spilled sorted run {} of {} rows to {:?}", self.runs.len(), rows, path);
        self.runs.push(SortedRun::Spilled { path, rows });
        Ok(())
    }

    /// Sort the buffered tail and return every run without merging.
    pub fn into_runs(mut self) -> Result<SortedRuns> {
        if !self.buffer.is_empty() {
            let sorted = sort_rows(&self.buffer, self.width, &self.cmp);
            self.runs.push(SortedRun::Memory(sorted));
        }
        Ok(SortedRuns {
            runs: self.runs,
            width: self.width,
            cmp: self.cmp,
            dir: self.dir,
            rows: self.rows,
        })
    }

    /// Finish sorting and return the merged stream.
    pub fn finish(self) -> Result<MergedRows> {
        merge_runs(vec![self.into_runs()?])
    }
}

/// Reader over one run.
enum RunReader {
    Memory { data: Vec<u8>, pos: usize },
    Spilled { reader: BufReader<File>, chunk: Vec<u8>, pos: usize, remaining: u64 },
}

impl RunReader {
    fn open(run: SortedRun) -> Result<Self> {
        Ok(match run {
            SortedRun::Memory(data) => RunReader::Memory { data, pos: 0 },
            SortedRun::Spilled { path, rows } => RunReader::Spilled {
                reader: BufReader::new(File::open(path)?),
                chunk: Vec::new(),
                pos: 0,
                remaining: rows,
            },
        })
    }

    fn next_row(&mut self, width: usize) -> Result<Option<Vec<u8>>> {
        match self {
            RunReader::Memory { data, pos } => {
                if *pos + width > data.len() {
                    return Ok(None);
                }
                let row = data[*pos..*pos + width].to_vec();
                *pos += width;
                Ok(Some(row))
            }
            RunReader::Spilled { reader, chunk, pos, remaining } => {
                if *pos + width > chunk.len() {
                    if *remaining == 0 {
                        return Ok(None);
                    }
                    *chunk = bincode::deserialize_from(&mut *reader)?;
                    *pos = 0;
                    if chunk.len() < width {
                        return Err(crate::Error::corruption("spilled sort chunk is truncated"));
                    }
                }
                let row = chunk[*pos..*pos + width].to_vec();
                *pos += width;
                *remaining = remaining.saturating_sub(1);
                Ok(Some(row))
            }
        }
    }
}

/// Entry in the merge heap
struct HeapEntry {
    row: Vec<u8>,
    run: usize,
    order: RowComparator,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap; equal rows come out in run order
        self.order
            .compare(&other.row, &self.row)
            .then_with(|| other.run.cmp(&self.run))
    }
}

/// Merged, sorted stream over a set of runs.
pub struct MergedRows {
    readers: Vec<RunReader>,
    heap: BinaryHeap<HeapEntry>,
    width: usize,
    cmp: Option<RowComparator>,
    _dirs: Vec<TempDir>,
}

impl std::fmt::Debug for MergedRows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergedRows")
            .field("runs", &self.readers.len())
            .field("pending", &self.heap.len())
            .field("width", &self.width)
            .finish()
    }
}

/// Merge the runs of several sorters. Runs keep their order: all runs of
/// the first sorter, then the second, and so on.
pub fn merge_runs(parts: Vec<SortedRuns>) -> Result<MergedRows> {
    let width = parts.first().map_or(0, |p| p.width);
    let cmp = parts.first().map(|p| p.cmp);
    let mut readers = Vec::new();
    let mut dirs = Vec::new();
    for part in parts {
        for run in part.runs {
            readers.push(RunReader::open(run)?);
        }
        if let Some(dir) = part.dir {
            dirs.push(dir);
        }
    }

    let mut heap = BinaryHeap::with_capacity(readers.len());
    if let Some(cmp) = cmp {
        for (run, reader) in readers.iter_mut().enumerate() {
            if let Some(row) = reader.next_row(width)? {
                heap.push(HeapEntry { row, run, order: cmp });
            }
        }
    }
    log::debug!("merging {} sorted runs", readers.len());

    Ok(MergedRows { readers, heap, width, cmp, _dirs: dirs })
}

impl MergedRows {
    /// Next row in sorted order.
    pub fn next_row(&mut self) -> Result<Option<Vec<u8>>> {
        let entry = match self.heap.pop() {
            Some(entry) => entry,
            None => return Ok(None),
        };
        if let Some(cmp) = self.cmp {
            if let Some(row) = self.readers[entry.run].next_row(self.width)? {
                self.heap.push(HeapEntry { row, run: entry.run, order: cmp });
            }
        }
        Ok(Some(entry.row))
    }
}

impl RowSource for MergedRows {
    fn fill(&mut self, out: &mut Vec<u8>, max_rows: usize) -> Result<usize> {
        let mut n = 0;
        while n < max_rows {
            match self.next_row()? {
                Some(row) => out.extend_from_slice(&row),
                None => break,
            }
            n += 1;
        }
        Ok(n)
    }
}

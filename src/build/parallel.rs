//! Parallel build coordination.
//!
//! The table is split into `workers + 1` partitions. The leader spawns one
//! scoped worker thread per extra partition and scans partition 0 itself.
//! Every participant sorts its share into private runs and reports to a
//! shared [`BuildCoordinator`]; the leader sleeps on a condition variable
//! until all participants are done and then merges the runs in partition
//! order.
//!
//! A partition whose worker cannot be spawned is scanned by the leader, so
//! a host that launches no workers at all gets a serial build.

use crate::error::{Error, Result};
use crate::sort::SortedRuns;
use parking_lot::{Condvar, Mutex};

/// Mutable state shared by all participants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SharedBuildState {
    /// Participants that have finished their partition.
    pub done: usize,
    /// Rows scanned across all partitions.
    pub reltuples: u64,
    /// Longest text value observed.
    pub maxlen: usize,
}

/// Completion barrier for build participants.
#[derive(Debug)]
pub struct BuildCoordinator {
    participants: usize,
    state: Mutex<SharedBuildState>,
    all_done: Condvar,
}

impl BuildCoordinator {
    /// Coordinator expecting `participants` reports.
    pub fn new(participants: usize) -> Self {
        Self { participants, state: Mutex::new(SharedBuildState::default()), all_done: Condvar::new() }
    }

    /// Number of participants, leader included.
    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Record one finished participant and wake the leader.
    pub fn report(&self, rows: u64, maxlen: usize) {
        let mut state = self.state.lock();
        state.done += 1;
        state.reltuples += rows;
        state.maxlen = state.maxlen.max(maxlen);
        self.all_done.notify_all();
    }

    /// Block until every participant has reported.
    pub fn wait_all(&self) -> SharedBuildState {
        let mut state = self.state.lock();
        while state.done < self.participants {
            self.all_done.wait(&mut state);
        }
        *state
    }
}

/// Sorted output of one partition.
#[derive(Debug)]
pub struct PartitionOutput {
    /// Sorted runs, not yet merged.
    pub runs: SortedRuns,
    /// Rows scanned.
    pub rows: u64,
    /// Longest text value observed.
    pub maxlen: usize,
}

/// Reports completion on drop so the leader never waits on a failed or
/// panicked participant.
struct DoneGuard<'a> {
    coord: &'a BuildCoordinator,
    rows: u64,
    maxlen: usize,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.coord.report(self.rows, self.maxlen);
    }
}

fn run_partition<F>(
    coord: &BuildCoordinator,
    slot: &Mutex<Option<Result<PartitionOutput>>>,
    job: &F,
    partition: usize,
) where
    F: Fn(usize, usize) -> Result<PartitionOutput> + Sync,
{
    let mut guard = DoneGuard { coord, rows: 0, maxlen: 0 };
    let out = job(partition, coord.participants());
    if let Ok(out) = &out {
        guard.rows = out.rows;
        guard.maxlen = out.maxlen;
    }
    *slot.lock() = Some(out);
}

/// Run `job(partition, nparts)` for every partition across `workers` extra
/// threads. Returns the outputs in partition order, the final shared state
/// and the number of worker threads actually launched.
pub fn run_parallel<F>(
    workers: usize,
    job: F,
) -> Result<(Vec<PartitionOutput>, SharedBuildState, usize)>
where
    F: Fn(usize, usize) -> Result<PartitionOutput> + Sync,
{
    let nparts = workers + 1;
    let coord = BuildCoordinator::new(nparts);
    let slots: Vec<Mutex<Option<Result<PartitionOutput>>>> =
        (0..nparts).map(|_| Mutex::new(None)).collect();

    let scoped = crossbeam::scope(|s| {
        let (coord, slots, job) = (&coord, &slots, &job);
        let mut leader_parts = vec![0];
        let mut launched = 0;

        for p in 1..nparts {
            let spawned = s
                .builder()
                .name(format!("smolidx-build-{}", p))
                .spawn(move |_| run_partition(coord, &slots[p], job, p));
            match spawned {
                Ok(_) => launched += 1,
                Err(e) => {
                    log::warn!("could not launch build worker {}: {}; leader takes its partition", p, e);
                    leader_parts.push(p);
                }
            }
        }
        if launched == 0 && workers > 0 {
            log::warn!("no build workers launched, building serially");
        }

        for p in leader_parts {
            run_partition(coord, &slots[p], job, p);
        }
        let state = coord.wait_all();
        (state, launched)
    });
    let (state, launched) = scoped.map_err(|_| Error::internal("build worker panicked"))?;

    let mut outputs = Vec::with_capacity(nparts);
    for (p, slot) in slots.into_iter().enumerate() {
        let out = slot
            .into_inner()
            .ok_or_else(|| Error::internal(format!("build partition {} produced no output", p)))?;
        outputs.push(out?);
    }
    log::debug!(
        "parallel scan finished: {} participants, {} rows, max text length {}",
        state.done,
        state.reltuples,
        state.maxlen
    );
    Ok((outputs, state, launched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::{merge_runs, ExternalSorter, RowComparator};
    use crate::types::{Collation, KeyComparator, KeyType};
    use std::sync::Arc;
    use std::thread;

    fn cmp() -> RowComparator {
        RowComparator::new(KeyComparator::new(KeyType::Int8, Collation::Binary), 8, None)
    }

    #[test]
    fn test_coordinator_waits_for_all() {
        let coord = Arc::new(BuildCoordinator::new(3));
        let mut handles = vec![];
        for i in 0..3u64 {
            let coord = Arc::clone(&coord);
            handles.push(thread::spawn(move || coord.report(i * 10, i as usize)));
        }
        let state = coord.wait_all();
        assert_eq!(state.done, 3);
        assert_eq!(state.reltuples, 30);
        assert_eq!(state.maxlen, 2);
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_run_parallel_merges_in_order() {
        let data: Vec<i64> = (0..1000).rev().collect();
        let (outputs, state, _) = run_parallel(3, |p, nparts| {
            let per = data.len().div_ceil(nparts);
            let mut sorter = ExternalSorter::new(8, cmp(), 256);
            let chunk = &data[(p * per).min(data.len())..((p + 1) * per).min(data.len())];
            for k in chunk {
                sorter.push(&k.to_le_bytes())?;
            }
            Ok(PartitionOutput { rows: chunk.len() as u64, runs: sorter.into_runs()?, maxlen: 0 })
        })
        .unwrap();

        assert_eq!(state.done, 4);
        assert_eq!(state.reltuples, 1000);
        let mut merged = merge_runs(outputs.into_iter().map(|o| o.runs).collect()).unwrap();
        let mut prev = i64::MIN;
        let mut n = 0;
        while let Some(row) = merged.next_row().unwrap() {
            let k = i64::from_le_bytes(row[..].try_into().unwrap());
            assert!(k >= prev);
            prev = k;
            n += 1;
        }
        assert_eq!(n, 1000);
    }

    #[test]
    fn test_partition_error_propagates() {
        let result = run_parallel(2, |p, _| {
            if p == 1 {
                return Err(Error::unsupported("NULL values are not supported"));
            }
            let sorter = ExternalSorter::new(8, cmp(), 64);
            Ok(PartitionOutput { rows: 0, runs: sorter.into_runs()?, maxlen: 0 })
        });
        assert!(matches!(result, Err(Error::UnsupportedSchema(_))));
    }
}

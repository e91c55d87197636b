use memtable::{KvStore, RangeIterator, StoreError};
use workload::{Operation, QueryDescriptor, Workload};

use crate::clock::{Clock, MonotonicClock};
use crate::config::HarnessConfig;
use crate::sampler::ThroughputSampler;
use crate::stats::{CostBucket, StatsTracker};
use crate::ReplayError;

/// Replays a workload against a store, one blocking call at a time, timing
/// each call individually.
pub struct Dispatcher<'a, S: KvStore + ?Sized, C: Clock = MonotonicClock> {
    store: &'a S,
    config: &'a HarnessConfig,
    clock: C,
}

impl<'a, S: KvStore + ?Sized> Dispatcher<'a, S> {
    pub fn new(store: &'a S, config: &'a HarnessConfig) -> Self {
        Self {
            store,
            config,
            clock: MonotonicClock::new(),
        }
    }
}

impl<'a, S: KvStore + ?Sized, C: Clock> Dispatcher<'a, S, C> {
    pub fn with_clock<T: Clock>(self, clock: T) -> Dispatcher<'a, S, T> {
        Dispatcher {
            store: self.store,
            config: self.config,
            clock,
        }
    }

    /// Replays `workload` in sequence order and flushes the store.
    ///
    /// A failed mutation aborts the replay; whatever was recorded in `tracker`
    /// up to that point stays valid. `workload_exec_time` is derived on every
    /// exit path.
    pub fn replay(
        &self,
        workload: &Workload,
        tracker: &mut StatsTracker,
        mut sampler: Option<&mut ThroughputSampler>,
    ) -> Result<(), ReplayError> {
        let result = self.replay_queries(workload, tracker, sampler.as_deref_mut());
        tracker.derive();
        result?;

        self.store.flush().map_err(ReplayError::FlushFailed)?;
        Ok(())
    }

    fn replay_queries(
        &self,
        workload: &Workload,
        tracker: &mut StatsTracker,
        mut sampler: Option<&mut ThroughputSampler>,
    ) -> Result<(), ReplayError> {
        let mut iter: Option<Box<dyn RangeIterator + '_>> = None;
        let mut progress = Progress::new(workload.total_num(), self.config.show_progress);
        let mut counter = 0u64;
        let mut skipped_inserts = 0u64;

        if let Some(sampler) = sampler.as_deref_mut() {
            sampler.clear();
        }

        for qd in workload {
            counter += 1;
            debug_assert_eq!(counter, qd.seq);
            log::trace!("{}", qd.op);

            match &qd.op {
                Operation::Insert { key, value } => {
                    if tracker.inserts_completed >= workload.actual_insert_num() {
                        skipped_inserts += 1;
                    } else {
                        let (result, elapsed) = self.timed(|| self.store.put(key, value));
                        result.map_err(|source| store_failed(qd, source))?;
                        tracker.record(CostBucket::Insert, elapsed);
                    }
                }
                Operation::Update { key, value } => {
                    let (result, elapsed) = self.timed(|| self.store.put(key, value));
                    result.map_err(|source| store_failed(qd, source))?;
                    tracker.record(CostBucket::Update, elapsed);
                }
                Operation::Delete { key } => {
                    let (result, elapsed) = self.timed(|| self.store.delete(key));
                    result.map_err(|source| store_failed(qd, source))?;
                    tracker.record(CostBucket::PointDelete, elapsed);
                }
                Operation::RangeDelete { start, end } => {
                    let (result, elapsed) = self.timed(|| self.store.delete_range(start, end));
                    result.map_err(|source| store_failed(qd, source))?;
                    tracker.record(CostBucket::RangeDelete, elapsed);
                }
                Operation::Lookup { key } => {
                    let (result, elapsed) = self.timed(|| self.store.get(key));
                    let bucket = match result {
                        Ok(Some(_)) => CostBucket::PointLookup,
                        Ok(None) => CostBucket::ZeroPointLookup,
                        Err(e) => {
                            log::debug!("Lookup #{} of {} failed: {}", qd.seq, key, e);
                            CostBucket::ZeroPointLookup
                        }
                    };
                    tracker.record(bucket, elapsed);
                }
                Operation::RangeLookup { start, end } => {
                    let it = iter.get_or_insert_with(|| self.store.range_iter());
                    if let Err(e) = it.refresh() {
                        log::warn!("Iterator refresh before #{} failed: {}", qd.seq, e);
                    }
                    let (visited, elapsed) = self.timed(|| self.scan(it.as_mut(), start, end));
                    if let Err(e) = it.status() {
                        log::warn!("Range lookup #{} ended with error: {}", qd.seq, e);
                    }
                    log::trace!("Range lookup #{} visited {} keys", qd.seq, visited);
                    tracker.record(CostBucket::RangeLookup, elapsed);
                }
            }

            progress.update(counter);
            if let Some(sampler) = sampler.as_deref_mut() {
                sampler.observe(counter, tracker.exec_time());
            }
        }

        if let Some(sampler) = sampler {
            sampler.finish(counter, tracker.exec_time());
        }
        if skipped_inserts > 0 {
            log::info!(
                "Skipped {} inserts beyond the cap of {}",
                skipped_inserts,
                workload.actual_insert_num()
            );
        }
        Ok(())
    }

    fn scan<I: RangeIterator + ?Sized>(&self, it: &mut I, start: &str, end: &str) -> u64 {
        let policy = &self.config.range_scan;
        let mut visited = 0u64;
        it.seek(start);
        while it.valid() {
            if policy.stops_at(it.key(), end) {
                break;
            }
            if policy.max_keys.is_some_and(|max| visited >= max) {
                break;
            }
            visited += 1;
            it.next();
        }
        visited
    }

    /// Runs `op` between two clock reads. A failed read is logged and the
    /// operation is charged zero time.
    fn timed<T>(&self, op: impl FnOnce() -> T) -> (T, u64) {
        let start = self.read_clock("start");
        let result = op();
        let end = self.read_clock("end");
        let elapsed = match (start, end) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            _ => 0,
        };
        (result, elapsed)
    }

    fn read_clock(&self, which: &str) -> Option<u64> {
        match self.clock.now_ns() {
            Ok(now) => Some(now),
            Err(e) => {
                log::warn!("{} clock failed to get time: {}", which, e);
                None
            }
        }
    }
}

fn store_failed(qd: &QueryDescriptor, source: StoreError) -> ReplayError {
    log::error!("Query #{} ({}) failed: {}", qd.seq, qd.op, source);
    ReplayError::StoreOperationFailed {
        seq: qd.seq,
        kind: qd.op.kind(),
        source,
    }
}

/// Replays `workload` with the monotonic clock.
pub fn replay<S: KvStore + ?Sized>(
    store: &S,
    config: &HarnessConfig,
    workload: &Workload,
    tracker: &mut StatsTracker,
    sampler: Option<&mut ThroughputSampler>,
) -> Result<(), ReplayError> {
    Dispatcher::new(store, config).replay(workload, tracker, sampler)
}

// Logs every tenth of the workload.
struct Progress {
    step: u64,
    total: u64,
    enabled: bool,
}

impl Progress {
    fn new(total: u64, enabled: bool) -> Self {
        Self {
            step: (total / 10).max(1),
            total,
            enabled,
        }
    }

    fn update(&mut self, done: u64) {
        if self.enabled && (done % self.step == 0 || done == self.total) {
            log::info!("Replay progress {}% ({}/{})", done * 100 / self.total, done, self.total);
        }
    }
}

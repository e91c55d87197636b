use std::ops::{Add, AddAssign};

const NS_PER_MS: f64 = 1_000_000.0;

/// Completion bucket an executed operation is charged to. Lookups are split
/// by whether the key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CostBucket {
    Insert,
    Update,
    PointDelete,
    RangeDelete,
    PointLookup,
    ZeroPointLookup,
    RangeLookup,
}

impl CostBucket {
    pub const ALL: [CostBucket; 7] = [
        CostBucket::Insert,
        CostBucket::Update,
        CostBucket::PointDelete,
        CostBucket::RangeDelete,
        CostBucket::PointLookup,
        CostBucket::ZeroPointLookup,
        CostBucket::RangeLookup,
    ];

    /// Short label used in summaries: I, U, D, R, Q, Z, S.
    pub fn label(self) -> char {
        match self {
            CostBucket::Insert => 'I',
            CostBucket::Update => 'U',
            CostBucket::PointDelete => 'D',
            CostBucket::RangeDelete => 'R',
            CostBucket::PointLookup => 'Q',
            CostBucket::ZeroPointLookup => 'Z',
            CostBucket::RangeLookup => 'S',
        }
    }
}

/// Per-bucket completion counts and cumulative latency (ns) of one or more replays.
///
/// `workload_exec_time` is never accumulated directly; [`StatsTracker::derive`]
/// recomputes it from the seven cost accumulators.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatsTracker {
    pub total_completed: u64,
    pub inserts_completed: u64,
    pub updates_completed: u64,
    pub point_deletes_completed: u64,
    pub range_deletes_completed: u64,
    pub point_lookups_completed: u64,
    pub zero_point_lookups_completed: u64,
    pub range_lookups_completed: u64,

    pub inserts_cost: u64,
    pub updates_cost: u64,
    pub point_deletes_cost: u64,
    pub range_deletes_cost: u64,
    pub point_lookups_cost: u64,
    pub zero_point_lookups_cost: u64,
    pub range_lookups_cost: u64,

    pub workload_exec_time: u64,
}

impl StatsTracker {
    pub fn record(&mut self, bucket: CostBucket, elapsed_ns: u64) {
        let (completed, cost) = self.bucket_mut(bucket);
        *completed += 1;
        *cost += elapsed_ns;
        self.total_completed += 1;
    }

    pub fn completed(&self, bucket: CostBucket) -> u64 {
        match bucket {
            CostBucket::Insert => self.inserts_completed,
            CostBucket::Update => self.updates_completed,
            CostBucket::PointDelete => self.point_deletes_completed,
            CostBucket::RangeDelete => self.range_deletes_completed,
            CostBucket::PointLookup => self.point_lookups_completed,
            CostBucket::ZeroPointLookup => self.zero_point_lookups_completed,
            CostBucket::RangeLookup => self.range_lookups_completed,
        }
    }

    pub fn cost(&self, bucket: CostBucket) -> u64 {
        match bucket {
            CostBucket::Insert => self.inserts_cost,
            CostBucket::Update => self.updates_cost,
            CostBucket::PointDelete => self.point_deletes_cost,
            CostBucket::RangeDelete => self.range_deletes_cost,
            CostBucket::PointLookup => self.point_lookups_cost,
            CostBucket::ZeroPointLookup => self.zero_point_lookups_cost,
            CostBucket::RangeLookup => self.range_lookups_cost,
        }
    }

    fn bucket_mut(&mut self, bucket: CostBucket) -> (&mut u64, &mut u64) {
        match bucket {
            CostBucket::Insert => (&mut self.inserts_completed, &mut self.inserts_cost),
            CostBucket::Update => (&mut self.updates_completed, &mut self.updates_cost),
            CostBucket::PointDelete => (
                &mut self.point_deletes_completed,
                &mut self.point_deletes_cost,
            ),
            CostBucket::RangeDelete => (
                &mut self.range_deletes_completed,
                &mut self.range_deletes_cost,
            ),
            CostBucket::PointLookup => (
                &mut self.point_lookups_completed,
                &mut self.point_lookups_cost,
            ),
            CostBucket::ZeroPointLookup => (
                &mut self.zero_point_lookups_completed,
                &mut self.zero_point_lookups_cost,
            ),
            CostBucket::RangeLookup => (
                &mut self.range_lookups_completed,
                &mut self.range_lookups_cost,
            ),
        }
    }

    /// Sum of the seven cost accumulators.
    pub fn exec_time(&self) -> u64 {
        CostBucket::ALL.iter().map(|bucket| self.cost(*bucket)).sum()
    }

    /// Recomputes `workload_exec_time` from the accumulators and returns it.
    pub fn derive(&mut self) -> u64 {
        self.workload_exec_time = self.exec_time();
        self.workload_exec_time
    }

    /// Adds every counter and accumulator of `single` into `self`.
    pub fn merge(&mut self, single: &StatsTracker) {
        self.total_completed += single.total_completed;
        self.inserts_completed += single.inserts_completed;
        self.updates_completed += single.updates_completed;
        self.point_deletes_completed += single.point_deletes_completed;
        self.range_deletes_completed += single.range_deletes_completed;
        self.point_lookups_completed += single.point_lookups_completed;
        self.zero_point_lookups_completed += single.zero_point_lookups_completed;
        self.range_lookups_completed += single.range_lookups_completed;

        self.inserts_cost += single.inserts_cost;
        self.updates_cost += single.updates_cost;
        self.point_deletes_cost += single.point_deletes_cost;
        self.range_deletes_cost += single.range_deletes_cost;
        self.point_lookups_cost += single.point_lookups_cost;
        self.zero_point_lookups_cost += single.zero_point_lookups_cost;
        self.range_lookups_cost += single.range_lookups_cost;

        self.derive();
    }

    pub fn lookups_completed(&self) -> u64 {
        self.point_lookups_completed + self.zero_point_lookups_completed
    }

    /// Mean latency in ms/op, `None` if nothing completed.
    pub fn avg_latency_ms(&self, bucket: CostBucket) -> Option<f64> {
        latency_ms(self.cost(bucket), self.completed(bucket))
    }

    /// Throughput in ops/ms, `None` if no time was recorded.
    pub fn throughput_ops_per_ms(&self, bucket: CostBucket) -> Option<f64> {
        throughput(self.completed(bucket), self.cost(bucket))
    }

    pub fn overall_latency_ms(&self) -> Option<f64> {
        latency_ms(self.exec_time(), self.total_completed)
    }

    pub fn overall_throughput_ops_per_ms(&self) -> Option<f64> {
        throughput(self.total_completed, self.exec_time())
    }

    /// Mean latency over found and zero-result point lookups.
    pub fn point_query_latency_ms(&self) -> Option<f64> {
        latency_ms(
            self.point_lookups_cost + self.zero_point_lookups_cost,
            self.lookups_completed(),
        )
    }
}

fn latency_ms(cost_ns: u64, completed: u64) -> Option<f64> {
    (completed > 0).then(|| cost_ns as f64 / completed as f64 / NS_PER_MS)
}

fn throughput(completed: u64, cost_ns: u64) -> Option<f64> {
    (cost_ns > 0).then(|| completed as f64 * NS_PER_MS / cost_ns as f64)
}

impl AddAssign<&StatsTracker> for StatsTracker {
    fn add_assign(&mut self, rhs: &StatsTracker) {
        self.merge(rhs);
    }
}

impl Add for StatsTracker {
    type Output = StatsTracker;

    fn add(mut self, rhs: StatsTracker) -> StatsTracker {
        self.merge(&rhs);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(seed: u64) -> StatsTracker {
        let mut tracker = StatsTracker::default();
        for (idx, bucket) in CostBucket::ALL.into_iter().enumerate() {
            for n in 0..(seed + idx as u64) % 4 {
                tracker.record(bucket, seed * 100 + n * 7 + idx as u64);
            }
        }
        tracker.derive();
        tracker
    }

    #[test]
    fn test_record_updates_bucket_and_total() {
        let mut tracker = StatsTracker::default();
        tracker.record(CostBucket::Insert, 10);
        tracker.record(CostBucket::Insert, 15);
        tracker.record(CostBucket::ZeroPointLookup, 3);

        assert_eq!(tracker.inserts_completed, 2);
        assert_eq!(tracker.inserts_cost, 25);
        assert_eq!(tracker.zero_point_lookups_completed, 1);
        assert_eq!(tracker.total_completed, 3);
        // not tracked until derived
        assert_eq!(tracker.workload_exec_time, 0);
        assert_eq!(tracker.derive(), 28);
        assert_eq!(tracker.workload_exec_time, 28);
    }

    #[test]
    fn test_derive_sums_all_seven_costs() {
        let mut tracker = StatsTracker::default();
        for (idx, bucket) in CostBucket::ALL.into_iter().enumerate() {
            tracker.record(bucket, 1 << idx);
        }
        assert_eq!(tracker.derive(), 127);
        assert_eq!(tracker.total_completed, 7);
    }

    #[test]
    fn test_merge_is_fieldwise() {
        let a = tracker(1);
        let b = tracker(2);
        let mut merged = a;
        merged.merge(&b);

        for bucket in CostBucket::ALL {
            assert_eq!(merged.completed(bucket), a.completed(bucket) + b.completed(bucket));
            assert_eq!(merged.cost(bucket), a.cost(bucket) + b.cost(bucket));
        }
        assert_eq!(merged.total_completed, a.total_completed + b.total_completed);
        assert_eq!(
            merged.workload_exec_time,
            a.workload_exec_time + b.workload_exec_time
        );
    }

    #[test]
    fn test_merge_is_commutative_and_associative() {
        let (a, b, c) = (tracker(1), tracker(2), tracker(3));

        assert_eq!(a + b, b + a);
        assert_eq!((a + b) + c, a + (b + c));
        assert_eq!((a + b) + c, (a + c) + b);

        let mut cumulative = StatsTracker::default();
        for single in [c, a, b] {
            cumulative += &single;
        }
        assert_eq!(cumulative, a + b + c);
    }

    #[test]
    fn test_merge_rederives_exec_time() {
        let mut single = StatsTracker::default();
        single.record(CostBucket::RangeLookup, 40);

        let mut cumulative = StatsTracker::default();
        cumulative.merge(&single);
        assert_eq!(cumulative.workload_exec_time, 40);
    }

    #[test]
    fn test_averages() {
        let mut tracker = StatsTracker::default();
        tracker.record(CostBucket::PointLookup, 2_000_000);
        tracker.record(CostBucket::ZeroPointLookup, 1_000_000);
        tracker.record(CostBucket::PointLookup, 4_000_000);

        assert_eq!(tracker.avg_latency_ms(CostBucket::PointLookup), Some(3.0));
        let point_query = tracker.point_query_latency_ms().unwrap();
        assert!((point_query - 7.0 / 3.0).abs() < 1e-9);
        assert_eq!(tracker.throughput_ops_per_ms(CostBucket::ZeroPointLookup), Some(1.0));
        assert_eq!(tracker.avg_latency_ms(CostBucket::Insert), None);
        assert_eq!(tracker.throughput_ops_per_ms(CostBucket::Update), None);
        assert_eq!(tracker.overall_throughput_ops_per_ms(), Some(3.0 / 7.0));
        assert_eq!(tracker.lookups_completed(), 3);
    }
}

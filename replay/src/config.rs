use std::time::Duration;

/// When a range lookup stops walking the iterator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RangeTermination {
    /// Stop only on a key equal to the end key. Without such a key the scan
    /// runs to the end of the keyspace.
    #[default]
    ExactMatch,
    /// Stop at the first key `>= end`.
    UpperBound,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RangeScanPolicy {
    pub termination: RangeTermination,
    /// Upper bound on keys visited by a single range lookup.
    pub max_keys: Option<u64>,
}

impl RangeScanPolicy {
    pub fn stops_at(&self, key: &str, end: &str) -> bool {
        match self.termination {
            RangeTermination::ExactMatch => key == end,
            RangeTermination::UpperBound => key >= end,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            max_attempts: 600,
        }
    }
}

/// What to do when energy counters cannot be opened or read.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum EnergyMode {
    /// Abort the experiment.
    #[default]
    Required,
    /// Log and carry on without energy data.
    BestEffort,
    /// Never touch the counters.
    Disabled,
}

/// Experiment-wide settings, built once and passed by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    pub experiment_runs: u16,
    /// Sample cumulative throughput every this many operations; 0 disables sampling.
    pub throughput_interval: u64,
    pub range_scan: RangeScanPolicy,
    pub settle: SettlePolicy,
    /// Pause between the load phase and the exec phase.
    pub cooldown: Duration,
    pub energy: EnergyMode,
    pub show_progress: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            experiment_runs: 1,
            throughput_interval: 0,
            range_scan: RangeScanPolicy::default(),
            settle: SettlePolicy::default(),
            cooldown: Duration::from_secs(60),
            energy: EnergyMode::default(),
            show_progress: false,
        }
    }
}

impl HarnessConfig {
    pub fn experiment_runs(mut self, runs: u16) -> Self {
        self.experiment_runs = runs.max(1);
        self
    }

    pub fn throughput_interval(mut self, interval: u64) -> Self {
        self.throughput_interval = interval;
        self
    }

    pub fn range_scan(mut self, range_scan: RangeScanPolicy) -> Self {
        self.range_scan = range_scan;
        self
    }

    pub fn settle(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn energy(mut self, energy: EnergyMode) -> Self {
        self.energy = energy;
        self
    }

    pub fn show_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Run count, never below one.
    pub fn runs(&self) -> u16 {
        self.experiment_runs.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_clamped_to_one() {
        let config = HarnessConfig::default().experiment_runs(0);
        assert_eq!(config.runs(), 1);

        let config = HarnessConfig {
            experiment_runs: 0,
            ..Default::default()
        };
        assert_eq!(config.runs(), 1);
    }

    #[test]
    fn test_builder_sets_fields() {
        let config = HarnessConfig::default()
            .experiment_runs(3)
            .throughput_interval(10)
            .cooldown(Duration::ZERO)
            .energy(EnergyMode::Disabled)
            .show_progress(true);

        assert_eq!(config.runs(), 3);
        assert_eq!(config.throughput_interval, 10);
        assert_eq!(config.cooldown, Duration::ZERO);
        assert_eq!(config.energy, EnergyMode::Disabled);
        assert!(config.show_progress);
        assert_eq!(config.settle, SettlePolicy::default());
    }

    #[test]
    fn test_range_termination() {
        let exact = RangeScanPolicy::default();
        assert!(exact.stops_at("k3", "k3"));
        assert!(!exact.stops_at("k4", "k3"));

        let bounded = RangeScanPolicy {
            termination: RangeTermination::UpperBound,
            max_keys: None,
        };
        assert!(bounded.stops_at("k3", "k3"));
        assert!(bounded.stops_at("k4", "k3"));
        assert!(!bounded.stops_at("k2", "k3"));
    }
}

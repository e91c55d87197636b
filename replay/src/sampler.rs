use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::ReplayError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    /// Operations processed when the sample was taken.
    pub ops: u64,
    /// Cumulative throughput in ops/ns, 0.0 while no time has been recorded.
    pub ops_per_ns: f64,
}

/// Periodic snapshots of cumulative throughput during one replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputSampler {
    interval: u64,
    samples: Vec<ThroughputSample>,
}

impl ThroughputSampler {
    /// `None` for a zero interval, which means "do not sample".
    pub fn new(interval: u64) -> Option<Self> {
        (interval > 0).then(|| Self {
            interval,
            samples: Vec::new(),
        })
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Called after every operation; samples on multiples of the interval.
    pub fn observe(&mut self, ops: u64, exec_time_ns: u64) {
        if ops > 0 && ops % self.interval == 0 {
            self.push(ops, exec_time_ns);
        }
    }

    /// Appends the end-of-replay sample, aligned or not.
    pub fn finish(&mut self, ops: u64, exec_time_ns: u64) {
        self.push(ops, exec_time_ns);
    }

    fn push(&mut self, ops: u64, exec_time_ns: u64) {
        let ops_per_ns = if ops != 0 && exec_time_ns != 0 {
            ops as f64 / exec_time_ns as f64
        } else {
            0.0
        };
        self.samples.push(ThroughputSample { ops, ops_per_ns });
    }

    pub fn samples(&self) -> &[ThroughputSample] {
        &self.samples
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.ops_per_ns).collect()
    }
}

/// Throughput samples summed index-wise over several runs.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ThroughputSeries {
    values: Vec<f64>,
    runs: u32,
}

impl ThroughputSeries {
    /// The first run sets the series length; later runs add over the common prefix.
    pub fn accumulate(&mut self, sampler: &ThroughputSampler) {
        if self.runs == 0 {
            self.values = sampler.values();
        } else {
            for (total, sample) in self.values.iter_mut().zip(sampler.samples()) {
                *total += sample.ops_per_ns;
            }
        }
        self.runs += 1;
    }

    pub fn runs(&self) -> u32 {
        self.runs
    }

    pub fn average(&self) -> Vec<f64> {
        if self.runs == 0 {
            return Vec::new();
        }
        self.values.iter().map(|v| v / self.runs as f64).collect()
    }
}

/// Writes `ops,tput-<name>...` followed by one row per sample index.
pub fn write_throughput_csv(
    path: &Path,
    columns: &[(&str, &[f64])],
    interval: u64,
) -> Result<(), ReplayError> {
    let Some((_, first)) = columns.first() else {
        return Err(ReplayError::InvalidThroughput(
            "no throughput columns".to_string(),
        ));
    };
    if let Some((name, column)) = columns.iter().find(|(_, c)| c.len() != first.len()) {
        return Err(ReplayError::InvalidThroughput(format!(
            "column {} has {} rows, expected {}",
            name,
            column.len(),
            first.len()
        )));
    }

    let mut writer = BufWriter::new(File::create(path)?);
    write!(writer, "ops")?;
    for (name, _) in columns {
        write!(writer, ",tput-{}", name)?;
    }
    writeln!(writer)?;

    for row in 0..first.len() {
        write!(writer, "{}", row as u64 * interval)?;
        for (_, column) in columns {
            write!(writer, ",{}", column[row])?;
        }
        writeln!(writer)?;
    }
    writer.flush()?;

    log::info!("Wrote {} throughput rows to {}", first.len(), path.display());
    Ok(())
}

//! Hardware energy measurement over the RAPL power domains.
//!
//! An [`EnergyMeter`] brackets one phase of execution: `start` opens a counter
//! per [`Channel`] and records a baseline, `stop` records the end values and
//! releases the counters, and `energy_usage` converts the deltas to joules.
//! Counters come from an [`EnergySource`], so the meter can run against
//! `perf_event_open` on Linux or a fake in tests.

pub mod error;
pub mod meter;
pub mod source;

use std::fmt;

pub use error::EnergyError;
pub use meter::EnergyMeter;
#[cfg(target_os = "linux")]
pub use source::PerfEventSource;
pub use source::{EnergySource, UnsupportedSource};

/// Joules per raw counter increment, shared by all three domains.
pub const RAPL_SCALE: f64 = 2.3283064365386962890625e-10;

/// perf type of the `power` PMU when sysfs cannot tell us.
pub const DEFAULT_POWER_TYPE: u32 = 0x17;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Core,
    Pkg,
    Ram,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Core, Channel::Pkg, Channel::Ram];

    /// perf event selector of the domain.
    pub fn event_code(self) -> u64 {
        match self {
            Channel::Core => 0x01,
            Channel::Pkg => 0x02,
            Channel::Ram => 0x03,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Core => "core",
            Channel::Pkg => "pkg",
            Channel::Ram => "ram",
        };
        f.write_str(name)
    }
}

/// Energy consumed per domain, in joules.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct EnergyUsage {
    pub pkg: f64,
    pub core: f64,
    pub ram: f64,
}

impl EnergyUsage {
    pub fn get(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Core => self.core,
            Channel::Pkg => self.pkg,
            Channel::Ram => self.ram,
        }
    }
}

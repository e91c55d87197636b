use std::time::{Duration, Instant};

use energy::{EnergyError, EnergyMeter, EnergySource, EnergyUsage};
use memtable::{KvStore, StoreError};
use workload::Workload;

use crate::config::{EnergyMode, HarnessConfig};
use crate::dispatcher;
use crate::error::ExperimentError;
use crate::sampler::{ThroughputSampler, ThroughputSeries};
use crate::settle::settle;
use crate::stats::StatsTracker;
use crate::ReplayError;

/// Statistics and energy of one measured phase.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PhaseReport {
    pub stats: StatsTracker,
    /// `None` when metering was disabled or failed in best-effort mode.
    pub energy: Option<EnergyUsage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run: u16,
    /// False for the run that aborted the experiment. Its phases hold what was
    /// recorded before the failure.
    pub completed: bool,
    pub load: PhaseReport,
    pub exec: PhaseReport,
}

impl RunReport {
    fn new(run: u16) -> Self {
        Self {
            run,
            completed: false,
            load: PhaseReport::default(),
            exec: PhaseReport::default(),
        }
    }
}

/// Outcome of all runs. `load` and `exec` are the merged trackers of every run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExperimentReport {
    pub runs: Vec<RunReport>,
    pub load: StatsTracker,
    pub exec: StatsTracker,
    /// Exec-phase throughput samples (ops/ns) averaged over completed runs;
    /// empty when sampling is off.
    pub throughput: Vec<f64>,
    /// Wall time of the whole experiment, settle and cool-down included.
    pub elapsed: Duration,
}

impl ExperimentReport {
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    fn push(&mut self, run: RunReport) {
        self.load.merge(&run.load.stats);
        self.exec.merge(&run.exec.stats);
        self.runs.push(run);
    }
}

/// Runs the load/exec experiment `config.runs()` times, each on a fresh store
/// from `open_store`.
///
/// Every run replays `ingestion` (load phase), waits for the store to settle,
/// cools down, then replays `query` (exec phase). Both phases are bracketed by
/// their own energy meter. The first failure stops the experiment; the error
/// carries the report of every run so far, the failed one included.
pub async fn run_experiments<S, F, E>(
    config: &HarnessConfig,
    ingestion: &Workload,
    query: &Workload,
    mut open_store: F,
    energy_source: E,
) -> Result<ExperimentReport, ExperimentError>
where
    S: KvStore,
    F: FnMut(u16) -> Result<S, StoreError>,
    E: EnergySource + Clone,
{
    let started = Instant::now();
    let phases = Phases {
        config,
        ingestion,
        query,
        energy_source: &energy_source,
    };
    let mut report = ExperimentReport::default();
    let mut series = ThroughputSeries::default();

    for run in 1..=config.runs() {
        log::info!("Starting run {}/{}", run, config.runs());
        let mut record = RunReport::new(run);
        let mut sampler = ThroughputSampler::new(config.throughput_interval);

        let outcome = match open_store(run) {
            Ok(store) => phases.execute(&store, &mut record, sampler.as_mut()).await,
            Err(e) => Err(e.into()),
        };
        record.load.stats.derive();
        record.exec.stats.derive();
        record.completed = outcome.is_ok();
        report.push(record);

        if let Err(source) = outcome {
            log::error!("Run {} aborted: {}", run, source);
            report.throughput = series.average();
            report.elapsed = started.elapsed();
            return Err(ExperimentError {
                run,
                report: Box::new(report),
                source,
            });
        }
        if let Some(sampler) = &sampler {
            series.accumulate(sampler);
        }
    }

    report.throughput = series.average();
    report.elapsed = started.elapsed();
    log::info!(
        "Experiment of {} runs took {:?}",
        report.run_count(),
        report.elapsed
    );
    Ok(report)
}

struct Phases<'a, E> {
    config: &'a HarnessConfig,
    ingestion: &'a Workload,
    query: &'a Workload,
    energy_source: &'a E,
}

impl<E: EnergySource + Clone> Phases<'_, E> {
    /// One load phase, settle, cool-down and exec phase, recorded into `run`
    /// as they go.
    async fn execute<S: KvStore>(
        &self,
        store: &S,
        run: &mut RunReport,
        mut sampler: Option<&mut ThroughputSampler>,
    ) -> Result<(), ReplayError> {
        let config = self.config;

        run.load.energy = measured(config.energy, self.energy_source, "load", || {
            dispatcher::replay(store, config, self.ingestion, &mut run.load.stats, None)
        })?;
        log::info!(
            "Run {} load phase: {} ops in {} ns",
            run.run,
            run.load.stats.total_completed,
            run.load.stats.workload_exec_time
        );

        let polls = settle(store, &config.settle).await?;
        log::debug!("Run {} settled after {} polls", run.run, polls);
        if !config.cooldown.is_zero() {
            log::info!("Cooling down for {:?}", config.cooldown);
            tokio::time::sleep(config.cooldown).await;
        }

        run.exec.energy = measured(config.energy, self.energy_source, "exec", || {
            dispatcher::replay(
                store,
                config,
                self.query,
                &mut run.exec.stats,
                sampler.as_deref_mut(),
            )
        })?;

        let exec = &run.exec.stats;
        log::info!(
            "Run {} point query latency: {} ms/op",
            run.run,
            display_ms(exec.point_query_latency_ms())
        );
        log::info!(
            "Run {} average operation latency: {} ms/op",
            run.run,
            display_ms(exec.overall_latency_ms())
        );
        Ok(())
    }
}

/// Runs `work` between the start and stop of an energy meter, honouring `mode`
/// for counter failures. Errors from `work` itself are always returned.
fn measured<E, F>(
    mode: EnergyMode,
    source: &E,
    phase: &str,
    work: F,
) -> Result<Option<EnergyUsage>, ReplayError>
where
    E: EnergySource + Clone,
    F: FnOnce() -> Result<(), ReplayError>,
{
    if mode == EnergyMode::Disabled {
        work()?;
        return Ok(None);
    }

    let mut meter = EnergyMeter::new(source.clone());
    if let Err(e) = meter.start() {
        tolerate(mode, phase, e)?;
        work()?;
        return Ok(None);
    }

    work()?;

    match meter.stop().and_then(|_| meter.energy_usage()) {
        Ok(usage) => {
            log::info!(
                "{} phase energy: pkg {:.3} J, core {:.3} J, ram {:.3} J",
                phase,
                usage.pkg,
                usage.core,
                usage.ram
            );
            Ok(Some(usage))
        }
        Err(e) => {
            tolerate(mode, phase, e)?;
            Ok(None)
        }
    }
}

fn tolerate(mode: EnergyMode, phase: &str, e: EnergyError) -> Result<(), ReplayError> {
    match mode {
        EnergyMode::BestEffort => {
            log::warn!("Measuring {} phase without energy data: {}", phase, e);
            Ok(())
        }
        _ => Err(e.into()),
    }
}

fn display_ms(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |ms| format!("{:.6}", ms))
}

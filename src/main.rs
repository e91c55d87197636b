use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use memtable::MemTable;
use replay::{
    CostBucket, EnergyMode, ExperimentReport, HarnessConfig, RangeScanPolicy, RangeTermination,
    SettlePolicy,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Workload replayed during the load phase
    #[arg(short = 'I', long, default_value = "./workload.txt")]
    ingestion: PathBuf,

    /// Workload replayed and measured during the exec phase
    #[arg(short = 'Q', long, default_value = "./workload.txt")]
    query: PathBuf,

    /// Number of experiment runs
    #[arg(short = 'R', long, default_value_t = 1)]
    runs: u16,

    /// Sample throughput every this many operations, 0 to disable
    #[arg(short = 'T', long, default_value_t = 0)]
    throughput_interval: u64,

    #[arg(long, default_value = "./throughputs.txt")]
    throughput_path: PathBuf,

    /// Execute at most this many inserts of each workload
    #[arg(long)]
    insert_cap: Option<u64>,

    /// Seconds to wait between the load and exec phases
    #[arg(long, default_value_t = 60)]
    cooldown_secs: u64,

    #[arg(long, value_enum, default_value_t = EnergyArg::Required)]
    energy: EnergyArg,

    #[arg(long, value_enum, default_value_t = RangeArg::Exact)]
    range_stop: RangeArg,

    /// Upper bound on keys visited by one range lookup
    #[arg(long)]
    max_scan: Option<u64>,

    #[arg(long, default_value_t = 100)]
    settle_interval_ms: u64,

    #[arg(long, default_value_t = 600)]
    settle_attempts: u32,

    /// Log replay progress in 10% steps
    #[arg(short, long)]
    progress: bool,

    /// -v for debug, -vv for per-operation trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum EnergyArg {
    Required,
    BestEffort,
    Disabled,
}

#[derive(Clone, Copy, ValueEnum)]
enum RangeArg {
    Exact,
    Upper,
}

impl Cli {
    fn config(&self) -> HarnessConfig {
        let energy = match self.energy {
            EnergyArg::Required => EnergyMode::Required,
            EnergyArg::BestEffort => EnergyMode::BestEffort,
            EnergyArg::Disabled => EnergyMode::Disabled,
        };
        let termination = match self.range_stop {
            RangeArg::Exact => RangeTermination::ExactMatch,
            RangeArg::Upper => RangeTermination::UpperBound,
        };

        HarnessConfig::default()
            .experiment_runs(self.runs)
            .throughput_interval(self.throughput_interval)
            .cooldown(Duration::from_secs(self.cooldown_secs))
            .energy(energy)
            .range_scan(RangeScanPolicy {
                termination,
                max_keys: self.max_scan,
            })
            .settle(SettlePolicy {
                interval: Duration::from_millis(self.settle_interval_ms),
                max_attempts: self.settle_attempts,
            })
            .show_progress(self.progress)
    }

    fn default_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

fn log_summary(report: &ExperimentReport) {
    let runs = report.run_count().max(1) as f64;
    let exec = &report.exec;
    tracing::info!(
        "Exec phase over {} runs, experiment took {:?}",
        report.run_count(),
        report.elapsed
    );
    for bucket in CostBucket::ALL {
        tracing::info!(
            "{}: {:.1} ops/run, {} ms/op",
            bucket.label(),
            exec.completed(bucket) as f64 / runs,
            fmt_ms(exec.avg_latency_ms(bucket))
        );
    }
    tracing::info!(
        "total: {:.1} ops/run, {:.3} ms/run, {} ops/ms",
        exec.total_completed as f64 / runs,
        exec.workload_exec_time as f64 / runs / 1_000_000.0,
        fmt_ms(exec.overall_throughput_ops_per_ms())
    );

    for run in &report.runs {
        for (phase, energy) in [("load", &run.load.energy), ("exec", &run.exec.energy)] {
            if let Some(usage) = energy {
                tracing::info!(
                    "run {} {}: pkg {:.3} J, core {:.3} J, ram {:.3} J",
                    run.run,
                    phase,
                    usage.pkg,
                    usage.core,
                    usage.ram
                );
            }
        }
    }
}

fn fmt_ms(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.6}", v))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.default_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.config();
    let mut ingestion = workload::load(&cli.ingestion)?;
    let mut query = workload::load(&cli.query)?;
    if let Some(cap) = cli.insert_cap {
        ingestion = ingestion.with_insert_cap(cap);
        query = query.with_insert_cap(cap);
    }
    tracing::info!(
        "Loaded {} ingestion and {} query operations",
        ingestion.total_num(),
        query.total_num()
    );

    #[cfg(target_os = "linux")]
    let source = energy::PerfEventSource::discover();
    #[cfg(not(target_os = "linux"))]
    let source = energy::UnsupportedSource;

    let result = replay::run_experiments(
        &config,
        &ingestion,
        &query,
        |run| {
            tracing::debug!("Opening store for run {}", run);
            Ok(MemTable::new())
        },
        source,
    )
    .await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Run {} failed, summary covers the runs recorded so far", e.run);
            log_summary(&e.report);
            return Err(e.into());
        }
    };
    log_summary(&report);

    if config.throughput_interval > 0 {
        replay::write_throughput_csv(
            &cli.throughput_path,
            &[("exec", report.throughput.as_slice())],
            config.throughput_interval,
        )?;
    }

    Ok(())
}

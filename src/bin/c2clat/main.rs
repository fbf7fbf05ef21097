use std::{
    fs::File,
    io::{self, BufWriter},
};

use anyhow::{bail, Context};
use c2clat::{output::CsvSink, output::SweepReport, sync::BarrierKind, Sweep, SweepConfig};
use clap::Parser;
use log::info;

/// Measure cache-coherence latency between every ordered pair of logical cores.
///
/// Prints one `<first>,<second>,<mean_ns>` line per pair.
#[derive(Debug, Parser)]
struct CliArgs {
    /// JSON file with a sweep config. The flags below override its fields.
    #[clap(long = "config")]
    config: Option<String>,
    /// Sweep cores `0..cores`. Defaults to all cores available to this process.
    #[clap(long = "cores")]
    cores: Option<usize>,
    /// Trials per core pair.
    #[clap(long = "trials")]
    trials: Option<usize>,
    /// Flag handoffs per trial.
    #[clap(long = "iterations")]
    iterations: Option<usize>,
    /// Barrier implementation used to start the two workers together.
    #[clap(long = "barrier")]
    barrier: Option<BarrierKind>,
    /// Do not pin workers to their cores.
    #[clap(long = "no-pin", action)]
    no_pin: bool,
    /// Write the CSV lines to this file instead of stdout.
    #[clap(long = "output")]
    output: Option<String>,
    /// Also write a JSON report with the config and the full matrix to this file.
    #[clap(long = "report")]
    report: Option<String>,
    /// Run at nice level -20. Needs root.
    #[clap(long = "elevated-priority", action)]
    elevated_priority: bool,
    /// Show a progress bar on stderr.
    #[clap(long = "progress", action)]
    progress: bool,
}

impl CliArgs {
    fn sweep_config(&self) -> anyhow::Result<SweepConfig> {
        let mut config = match &self.config {
            Some(path) => SweepConfig::from_jsonfile(path)?,
            None => SweepConfig::default(),
        };
        if let Some(cores) = self.cores {
            config.core_count = cores;
        }
        if let Some(trials) = self.trials {
            config.trials_per_pair = trials;
        }
        if let Some(iterations) = self.iterations {
            config.iterations_per_trial = iterations;
        }
        if let Some(barrier) = self.barrier {
            config.barrier = barrier;
        }
        if self.no_pin {
            config.pin = false;
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let progress = c2clat::util::init_logging_with_progress()?;

    let args = CliArgs::parse();
    info!("Args: {:?}", args);

    if args.elevated_priority {
        let ret = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, -20) };
        if ret < 0 {
            bail!("setpriority failed. Are we root?");
        }
    }

    let config = args.sweep_config()?;
    info!("Sweep config: {:?}", config);

    let sweep = Sweep::new(config, args.progress.then(|| progress.clone()))?;
    let matrix = match &args.output {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("failed to create {}", path))?;
            let mut sink = CsvSink::new(BufWriter::new(file));
            let matrix = sweep.run(&mut sink).context("core-to-core sweep failed")?;
            sink.into_inner()?;
            matrix
        }
        None => {
            let mut sink = CsvSink::new(io::stdout().lock());
            sweep.run(&mut sink).context("core-to-core sweep failed")?
        }
    };

    if let Some(path) = &args.report {
        SweepReport::new(sweep.config(), &matrix).write_jsonfile(path)?;
        info!("Wrote sweep report to {}", path);
    }
    Ok(())
}

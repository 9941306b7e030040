use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::{info, warn};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use edgesim::config::{Api, ExperimentConfig, Mode, PlatformKind};
use edgesim::config_loader::{apply_cli_overrides, load_config, CliOverrides};
use edgesim::orchestrator::Experiment;
use edgesim::platform::{EmulationPlatform, LocalPlatform, NetnsPlatform};
use edgesim::utils::{parse_duration, TeeWriter};

/// Run an edge caching experiment on an emulated WAN
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to an experiment configuration YAML file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Workload the clients run
    #[arg(long, value_enum)]
    api: Option<Api>,

    /// Caching strategy of the edges
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Pause between client batches (e.g. 5, 5s, 500ms)
    #[arg(long, value_parser = parse_duration)]
    scale_interval: Option<Duration>,

    /// Clients started per batch
    #[arg(long)]
    scale_size: Option<usize>,

    /// Number of batches
    #[arg(long)]
    scale_times: Option<usize>,

    /// Directory for all logs of the run
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Record per-process resource usage and interface counters
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    stats: Option<bool>,

    /// Seed for the client distances
    #[arg(long)]
    seed: Option<u64>,

    /// Emulation platform
    #[arg(long, value_enum)]
    platform: Option<PlatformKind>,

    /// Print the network plan as JSON and exit
    #[arg(long)]
    plan_only: bool,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            api: self.api,
            mode: self.mode,
            scale_interval: self.scale_interval,
            scale_size: self.scale_size,
            scale_times: self.scale_times,
            log_dir: self.log_dir.clone(),
            stats: self.stats,
            seed: self.seed,
            platform: self.platform,
        }
    }
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse command-line arguments
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ExperimentConfig::default(),
    };
    apply_cli_overrides(&mut config, &args.overrides())?;

    let experiment = Experiment::new(config)?;
    if args.plan_only {
        let plan = experiment.plan()?;
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let log_dir = &experiment.config().general.log_dir;
    fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("Failed to create log directory '{}'", log_dir.display()))?;

    // Log to stderr and <log_dir>/orchestrator.log, default filter level "info"
    let tee = TeeWriter::create(&log_dir.join("orchestrator.log")).wrap_err("Failed to create orchestrator.log")?;
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(tee)))
        .init();

    info!("Starting edgesim");
    info!("Log directory: {:?}", log_dir);

    let token = experiment.cancellation_token();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, stopping the experiment");
        token.cancel();
    })
    .wrap_err("Failed to install the interrupt handler")?;

    let general = &experiment.config().general;
    let platform: Box<dyn EmulationPlatform> = match general.platform {
        PlatformKind::Netns => Box::new(NetnsPlatform::new(general.namespace_prefix.clone())),
        PlatformKind::Local => Box::new(LocalPlatform::new()),
    };

    let summary = experiment.run(platform.as_ref())?;
    info!(
        "Experiment finished: {} clients ({} failed){}",
        summary.active_clients,
        summary.failed_clients,
        if summary.cancelled { ", interrupted" } else { "" }
    );
    for phase in &summary.shutdown {
        if phase.timed_out > 0 {
            warn!("{} {} processes did not exit in time", phase.timed_out, phase.role);
        }
    }

    Ok(())
}

//! `pib` - run the PIB control loop against simulated hardware.
//!
//! ```text
//! pib --config config/pib.toml --raise schedule-profiles --iterations 600
//! ```
//!
//! The winch controller, profiling unit, scheduler and telemetry radio are the recording
//! mocks from `strato_pib::hardware::mock`. Motions complete after `--motion-iterations`
//! loop passes.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use strato_pib::config::{PibConfig, DEFAULT_CONFIG_PATH};
use strato_pib::hardware::capabilities::{Severity, SystemClock};
use strato_pib::hardware::mock::{
    MockDeviceLink, MockGpio, MockProfiler, MockScheduler, MockTelemetry,
};
use strato_pib::params::FileStore;
use strato_pib::{logging, Action, Collaborators, Pib};

#[derive(Parser, Debug)]
#[command(name = "pib", about = "StratoPIB control loop on simulated hardware")]
struct Args {
    /// Application configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Stop after this many loop iterations (runs until Ctrl-C otherwise)
    #[arg(short, long)]
    iterations: Option<u64>,

    /// Raise an action before the first iteration (repeatable)
    #[arg(short, long = "raise", value_parser = parse_action)]
    raise: Vec<Action>,

    /// Loop passes a simulated motion takes to complete
    #[arg(long, default_value_t = 50)]
    motion_iterations: u64,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

fn parse_action(s: &str) -> Result<Action, String> {
    s.parse()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = PibConfig::load_from(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(level) = args.log_level {
        config.application.log_level = level;
        config.validate()?;
    }
    logging::init(&config.application);

    info!(name = %config.application.name, "Starting PIB control loop");

    let store = FileStore::initialize(&config.store.params_file);

    let mcb = MockDeviceLink::new();
    let telemetry = MockTelemetry::with_capacity(config.telemetry.buffer_capacity);
    let mut pib = Pib::new(Collaborators {
        mcb: Box::new(mcb.clone()),
        profiler: Box::new(MockProfiler::new()),
        scheduler: Box::new(MockScheduler::new()),
        telemetry: Box::new(telemetry.clone()),
        gpio: Box::new(MockGpio::new()),
        clock: Box::new(SystemClock::new()),
        store: Box::new(store),
    });
    pib.setup().context("driving initial pin levels")?;

    for action in &args.raise {
        pib.raise(*action);
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(config.application.loop_period_ms));
    let mut motion_age = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping control loop");
                break;
            }
        }

        pib.run_iteration();

        if pib.motion().is_motion_ongoing() {
            motion_age += 1;
            if motion_age >= args.motion_iterations {
                pib.send_motion_packet(Severity::Fine, "Simulated motion finished");
                pib.motion_complete();
                motion_age = 0;
            }
        }

        if args.iterations.is_some_and(|limit| pib.iterations() >= limit) {
            break;
        }
    }

    info!(
        iterations = pib.iterations(),
        motions = mcb.commands().len(),
        packets = telemetry.sent().len(),
        "Control loop stopped"
    );
    Ok(())
}

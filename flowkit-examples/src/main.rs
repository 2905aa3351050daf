//! flowkit demo binary.
//!
//! Runs one scenario per subcommand against the configuration loaded from `configuration/`,
//! logging what each component does. Pass `--metrics` to print the Prometheus metrics recorded
//! during the run.

use std::error::Error;

use clap::{Parser, Subcommand};
use flowkit::metrics::register_metrics;
use flowkit_config::{LoadConfigError, load_config};
use flowkit_config::shared::ToolkitConfig;
use flowkit_telemetry::metrics::init_metrics_handle;
use flowkit_telemetry::tracing::init_tracing;
use tracing::{info, warn};

mod demos;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Print Prometheus metrics recorded during the run.
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fan a generated stream out over bounded workers and merge the results.
    Pipeline {
        /// Number of values to generate.
        #[arg(long, default_value_t = 100)]
        items: u64,
    },
    /// Broadcast one stream to several consumers.
    Tee {
        /// Number of consumers.
        #[arg(long, default_value_t = 3)]
        consumers: usize,
        /// Number of values to broadcast.
        #[arg(long, default_value_t = 10)]
        items: u32,
    },
    /// Call a rate limiter in a tight loop.
    RateLimit {
        /// How long to keep calling, in seconds.
        #[arg(long, default_value_t = 3)]
        seconds: u64,
    },
    /// Issue overlapping lookups for the same key.
    SingleFlight {
        /// Number of concurrent callers.
        #[arg(long, default_value_t = 10)]
        callers: usize,
    },
    /// Run a group of tasks where one of them fails.
    ErrorGroup {
        /// Number of tasks in the group.
        #[arg(long, default_value_t = 4)]
        tasks: usize,
    },
    /// Walk several parties through a two-phase rendezvous.
    Barrier {
        /// Number of parties.
        #[arg(long, default_value_t = 4)]
        parties: usize,
    },
    /// Race slow work against a timer.
    Timeout {
        /// Deadline in milliseconds.
        #[arg(long, default_value_t = 200)]
        timeout_ms: u64,
        /// Duration of the work in milliseconds.
        #[arg(long, default_value_t = 1_000)]
        work_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    let args = Args::parse();
    let config = load_toolkit_config()?;

    let metrics_handle = if args.metrics {
        let handle = init_metrics_handle()?;
        register_metrics();
        Some(handle)
    } else {
        None
    };

    info!(command = ?args.command, "starting demo");

    match args.command {
        Command::Pipeline { items } => demos::pipeline(&config, items).await?,
        Command::Tee { consumers, items } => demos::tee(consumers, items).await?,
        Command::RateLimit { seconds } => demos::rate_limit(&config, seconds).await?,
        Command::SingleFlight { callers } => demos::single_flight(callers).await?,
        Command::ErrorGroup { tasks } => demos::error_group(&config, tasks).await?,
        Command::Barrier { parties } => demos::barrier(parties).await?,
        Command::Timeout {
            timeout_ms,
            work_ms,
        } => demos::timeout(timeout_ms, work_ms).await?,
    }

    if let Some(handle) = metrics_handle {
        println!("{}", handle.render());
    }

    Ok(())
}

/// Loads the toolkit configuration, falling back to defaults when no configuration exists.
///
/// A configuration that exists but is invalid is an error.
fn load_toolkit_config() -> Result<ToolkitConfig, LoadConfigError> {
    match load_config::<ToolkitConfig>() {
        Ok(config) => Ok(config),
        Err(err @ (LoadConfigError::MissingDirectory(_) | LoadConfigError::MissingLayer { .. })) => {
            warn!(error = %err, "no configuration found, using defaults");
            Ok(ToolkitConfig::default())
        }
        Err(err) => Err(err),
    }
}

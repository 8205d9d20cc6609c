//! Indoor cycling along GeoJSON routes, driven by a smart trainer's FTMS
//! telemetry or by a fixed demo speed.

mod commands;
mod config;
mod session;

use std::{path::PathBuf, process};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::*;
use config::RideConfig;

#[derive(Parser)]
#[command(name = "ride")]
#[command(about = "Ride GeoJSON routes on an indoor trainer", long_about = None)]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Directory holding the trip history (overrides the config)
    #[arg(long, global = true)]
    history_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show a route's length, estimated time and last ride
    Route(RouteArgs),
    /// Ride a route at a fixed speed
    Demo(DemoArgs),
    /// Ride a route with speed from trainer telemetry
    Ride(RideArgs),
    /// Decode one Indoor Bike Data record
    Decode(DecodeArgs),
    /// List saved trips or export one as CSV
    History(HistoryArgs),
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "ride=debug,simulator=debug,ride_ingest_ftms=debug,ride_io=debug,warn"
    } else {
        "ride=info,simulator=info,ride_ingest_ftms=info,ride_io=info,warn"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut cfg = RideConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.history_dir {
        cfg.history_dir = dir;
    }

    match &cli.command {
        Command::Route(args) => route(args, &cfg),
        Command::Demo(args) => demo(args, &cfg).await,
        Command::Ride(args) => ride(args, &cfg).await,
        Command::Decode(args) => decode(args),
        Command::History(args) => history(args, &cfg),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Args;
use time::format_description::well_known::Rfc3339;

use analysis::{format_duration, route_summary};
use iox::{export_trip_csv, FileStore, TripHistory};
use model::{Feature, SavedTrip};
use ride_ingest_ftms::{parse_hex_record, unit_of, FtmsUdpConfig, FtmsUdpSource, ReplayConfig, ReplaySource};
use simulator::RouteSimulator;

use crate::config::RideConfig;
use crate::session::{self, RideSession, Snapshot};

#[derive(Debug, Args)]
pub struct RouteArgs {
    /// GeoJSON file holding one LineString Feature
    pub path: PathBuf,

    /// Ride the route from its last point to its first
    #[arg(long)]
    pub reverse: bool,

    /// Average speed in km/h for the time estimate
    #[arg(long)]
    pub speed: Option<f64>,
}

#[derive(Debug, Args)]
pub struct DemoArgs {
    #[command(flatten)]
    pub route: RouteArgs,

    /// Simulated seconds per wall-clock second
    #[arg(long, default_value = "1.0")]
    pub time_scale: f64,

    /// Tick interval in milliseconds
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Print one JSON object per tick
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct RideArgs {
    /// GeoJSON file holding one LineString Feature
    pub path: PathBuf,

    #[arg(long)]
    pub reverse: bool,

    /// UDP address the notification bridge sends to
    #[arg(long, conflicts_with = "replay")]
    pub bind: Option<String>,

    /// Replay recorded notifications (one hex record per line)
    #[arg(long)]
    pub replay: Option<PathBuf>,

    /// Pace of the replay in milliseconds
    #[arg(long, default_value = "250")]
    pub replay_interval_ms: u64,

    /// Restart the replay when it runs out
    #[arg(long)]
    pub looped: bool,

    #[arg(long)]
    pub tick_ms: Option<u64>,

    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Indoor Bike Data record in hex, e.g. "00 02 e8 03 4b"
    pub hex: String,

    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Only show the trip for this route id
    pub route_id: Option<String>,

    /// Write the trip's points as CSV (needs a route id)
    #[arg(long)]
    pub export: Option<PathBuf>,
}

fn open_history(cfg: &RideConfig) -> TripHistory<FileStore> {
    TripHistory::with_limit(FileStore::new(&cfg.history_dir), cfg.history_limit)
}

fn duration(seconds: f64) -> String {
    format_duration(seconds).unwrap_or_else(|_| "-".into())
}

fn clock(ms: i64) -> String {
    time::OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| ms.to_string())
}

fn load(args: &RouteArgs) -> Result<Feature> {
    iox::load_route(&args.path, args.reverse)
}

pub fn route(args: &RouteArgs, cfg: &RideConfig) -> Result<()> {
    let feature = load(args)?;
    let coords = feature
        .line_string()
        .with_context(|| format!("{} is not a LineString feature", args.path.display()))?;
    let speed = args.speed.unwrap_or(cfg.average_speed_kmh);
    let summary = route_summary(&coords, speed);
    let id = simulator::route_id(&coords);

    println!("route {id}: {} points, {:.2} km", coords.len(), summary.length_km);
    println!(
        "estimated time at {speed} km/h: {}",
        duration(summary.estimated_minutes * 60.0)
    );
    match open_history(cfg).find(&id) {
        Some(prev) => println!("last ride: {} ({})", duration(prev.total_time), clock(prev.start_time)),
        None => println!("not ridden yet"),
    }
    Ok(())
}

fn print_snapshot(snap: &Snapshot, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(snap) {
            println!("{line}");
        }
        return;
    }
    let mut line = format!(
        "{:>5} {:>10.6} {:>11.6} {:>5.1}° {:>5.1} km/h {:>8.0} m left  eta {}",
        snap.tick,
        snap.position.lat,
        snap.position.lon,
        snap.position.bearing,
        snap.speed_kmh,
        snap.remaining_m,
        duration(snap.estimated_s),
    );
    if let Some(hr) = snap.metrics.heart_rate_bpm() {
        line.push_str(&format!("  {hr:.0} bpm"));
    }
    if snap.calories_kcal > 0.0 {
        line.push_str(&format!("  {:.1} kcal", snap.calories_kcal));
    }
    println!("{line}");
}

/// Tick until the route is done or the rider hits ctrl-c; only finished
/// rides are kept.
async fn ride_out(sess: &RideSession, tick: Duration, time_scale: f64, json: bool, cfg: &RideConfig) -> Result<()> {
    let history = open_history(cfg);
    let finished = tokio::select! {
        trip = session::drive(sess, &history, tick, time_scale, |snap| print_snapshot(snap, json)) => trip,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("ride interrupted, trip not saved");
            None
        }
    };

    if let Some(trip) = finished {
        println!("finished in {} ({} points)", duration(trip.total_time), trip.points.len());
    }
    println!("{}", serde_json::to_string_pretty(&sess.summary())?);
    Ok(())
}

fn session_for(feature: &Feature, speed_kmh: f64, cfg: &RideConfig) -> Result<RideSession> {
    let sim = RouteSimulator::new(feature, speed_kmh)?;
    let id = simulator::route_id(sim.route());
    tracing::info!(route_id = %id, segments = sim.route().len().saturating_sub(1), "route loaded");
    let previous = open_history(cfg).find(&id);
    if previous.is_some() {
        tracing::info!(route_id = %id, "racing previous ride");
    }
    Ok(RideSession::new(sim, previous, cfg.user.clone()))
}

pub async fn demo(args: &DemoArgs, cfg: &RideConfig) -> Result<()> {
    if args.time_scale.is_nan() || args.time_scale <= 0.0 {
        bail!("--time-scale must be positive");
    }
    let feature = load(&args.route)?;
    let speed = args.route.speed.unwrap_or(cfg.average_speed_kmh);
    let sess = session_for(&feature, speed, cfg)?;
    let tick = args.tick_ms.map(Duration::from_millis).unwrap_or_else(|| cfg.tick_interval());
    tracing::info!(speed_kmh = speed, time_scale = args.time_scale, "demo ride");
    ride_out(&sess, tick, args.time_scale, args.json, cfg).await
}

pub async fn ride(args: &RideArgs, cfg: &RideConfig) -> Result<()> {
    let feature = iox::load_route(&args.path, args.reverse)?;
    // the rider stands still until the trainer reports a speed
    let sess = Arc::new(session_for(&feature, 0.0, cfg)?);
    let tick = args.tick_ms.map(Duration::from_millis).unwrap_or_else(|| cfg.tick_interval());

    let source = match &args.replay {
        Some(path) => {
            let replay_cfg = ReplayConfig {
                interval: Duration::from_millis(args.replay_interval_ms.max(1)),
                looped: args.looped,
            };
            let src = ReplaySource::open(path, replay_cfg)?;
            tracing::info!(path = %path.display(), records = src.len(), "replaying telemetry");
            session::run_source(src, sess.clone())
        }
        None => {
            let udp_cfg = FtmsUdpConfig {
                bind_addr: args.bind.clone().unwrap_or_else(|| cfg.bind_addr.clone()),
            };
            let src = FtmsUdpSource::bind(&udp_cfg).await?;
            tracing::info!(addr = %src.local_addr()?, "waiting for trainer notifications");
            session::run_source(src, sess.clone())
        }
    };

    let result = ride_out(&sess, tick, 1.0, args.json, cfg).await;
    source.abort();
    result
}

pub fn decode(args: &DecodeArgs) -> Result<()> {
    let record = parse_hex_record(&args.hex)?;
    let sample = ride_ingest_ftms::decode(&record);
    if args.json {
        println!("{}", serde_json::to_string(&sample)?);
        return Ok(());
    }
    if sample.is_empty() {
        println!("no fields present");
    }
    for (metric, v) in sample.iter() {
        println!("{:<28} {v} {}", metric.name(), unit_of(metric));
    }
    Ok(())
}

pub fn history(args: &HistoryArgs, cfg: &RideConfig) -> Result<()> {
    let history = open_history(cfg);

    if let Some(dest) = &args.export {
        let Some(id) = &args.route_id else {
            bail!("--export needs a route id");
        };
        let trip = history.find(id).with_context(|| format!("no trip for route {id}"))?;
        export_trip_csv(&trip, dest)?;
        println!("wrote {} points to {}", trip.points.len(), dest.display());
        return Ok(());
    }

    let trips: Vec<SavedTrip> = history
        .load_all()
        .into_iter()
        .filter(|t| args.route_id.as_ref().map_or(true, |id| &t.route_id == id))
        .collect();
    if trips.is_empty() {
        println!("no saved trips in {}", cfg.history_dir.display());
    }
    for t in &trips {
        println!(
            "{:>12}  {}  {:>12}  {} points",
            t.route_id,
            clock(t.start_time),
            duration(t.total_time),
            t.points.len()
        );
    }
    Ok(())
}

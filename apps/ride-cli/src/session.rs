use std::{mem, sync::Arc, thread, time::Duration};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use uuid::Uuid;

use analysis::RideStats;
use iox::{KeyValueStore, TripHistory};
use model::*;
use ride_ingest_core::{channel, TelemetryRx, TelemetrySample, TelemetrySource};
use simulator::{RouteSimulator, Step};

pub struct RideSession {
    pub inner: Mutex<Inner>,
}

pub struct Inner {
    pub id: Uuid,
    pub route_id: String,
    pub simulator: RouteSimulator,
    pub previous: Option<SavedTrip>,
    pub recording: Vec<SavedTripPoint>,
    pub started_ms: Option<i64>,
    // merged view of every sample received so far
    pub latest: TelemetrySample,
    pub stats: RideStats,
    pub user: Option<UserData>,
    pub running: bool,
    ticks: usize,
}

/// What one tick produced, as shown to the rider.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub tick: usize,
    pub position: Position,
    pub speed_kmh: f64,
    pub elapsed_s: f64,
    pub traveled_m: f64,
    pub remaining_m: f64,
    pub estimated_s: f64,
    pub metrics: TelemetrySample,
    pub calories_kcal: f64,
    pub ghost: Option<SavedTripPoint>,
}

#[derive(Debug)]
pub enum TickOutcome {
    Moved(Snapshot),
    Completed(SavedTrip),
    /// The ride already finished; nothing left to do.
    Idle,
}

impl RideSession {
    pub fn new(
        simulator: RouteSimulator,
        previous: Option<SavedTrip>,
        user: Option<UserData>,
    ) -> Self {
        let route_id = simulator::route_id(simulator.route());
        let id = Uuid::new_v4();
        tracing::info!(session = %id, route_id = %route_id, "session started");
        Self {
            inner: Mutex::new(Inner {
                id,
                route_id,
                simulator,
                previous,
                recording: Vec::new(),
                started_ms: None,
                latest: TelemetrySample::new(),
                stats: RideStats::default(),
                user,
                running: true,
                ticks: 0,
            }),
        }
    }

    pub fn summary(&self) -> Value {
        let inner = self.inner.lock();
        json!({
            "session": inner.id,
            "route_id": inner.route_id,
            "traveled_m": inner.simulator.traveled_distance(),
            "stats": inner.stats.summary(),
        })
    }
}

impl Inner {
    pub fn feed_sample(&mut self, s: &TelemetrySample) {
        for (metric, v) in s.iter() {
            self.latest.insert(metric, v);
        }
        self.stats.add_sample(s);
        if let Some(kmh) = s.speed_kmh() {
            self.simulator.set_speed_kmh(kmh);
        }
    }

    /// Advance the ride by `dt_s` simulated seconds.
    pub fn tick(&mut self, dt_s: f64, now_ms: i64) -> TickOutcome {
        if !self.running {
            return TickOutcome::Idle;
        }
        let started = *self.started_ms.get_or_insert(now_ms);

        match self.simulator.advance(dt_s) {
            Step::Moved(position) => {
                self.recording.push(SavedTripPoint {
                    lat: position.lat,
                    lon: position.lon,
                    bearing: position.bearing,
                    timestamp: now_ms,
                });
                if let (Some(user), Some(hr)) = (&self.user, self.latest.heart_rate_bpm()) {
                    self.stats.add_calories(user, hr, dt_s / 60.0);
                }
                let snapshot = self.snapshot(position);
                self.ticks += 1;
                TickOutcome::Moved(snapshot)
            }
            Step::Completed => {
                self.running = false;
                let trip = SavedTrip {
                    route_id: self.route_id.clone(),
                    session_id: Some(self.id),
                    points: mem::take(&mut self.recording),
                    start_time: started,
                    end_time: now_ms,
                    total_time: (now_ms - started) as f64 / 1000.0,
                };
                tracing::info!(
                    route = %trip.route_id,
                    points = trip.points.len(),
                    total_s = trip.total_time,
                    "ride completed"
                );
                TickOutcome::Completed(trip)
            }
        }
    }

    fn snapshot(&self, position: Position) -> Snapshot {
        let sim = &self.simulator;
        // the ghost holds its final point once the previous ride ran out
        let ghost = self
            .previous
            .as_ref()
            .and_then(|p| p.points.get(self.ticks).or_else(|| p.points.last()))
            .cloned();
        Snapshot {
            tick: self.ticks,
            position,
            speed_kmh: sim.speed_kmh(),
            elapsed_s: sim.elapsed_time(),
            traveled_m: sim.traveled_distance(),
            remaining_m: sim.remaining_distance(),
            estimated_s: sim.estimated_time(),
            metrics: self.latest.clone(),
            calories_kcal: self.stats.calories_kcal,
            ghost,
        }
    }
}

pub fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Spawn `src` and pump its samples into the session. Aborting the returned
/// handle drops the sender, which ends the pump.
pub fn run_source<S: TelemetrySource + 'static>(src: S, sess: Arc<RideSession>) -> JoinHandle<()> {
    let (tx, rx): (_, TelemetryRx) = channel();
    let handle = tokio::spawn(async move {
        if let Err(e) = src.run(tx).await {
            tracing::error!(error = %e, "telemetry source stopped");
        }
    });
    // pump samples into session (blocking thread)
    thread::spawn(move || {
        while let Ok(sample) = rx.recv() {
            sess.inner.lock().feed_sample(&sample);
        }
        tracing::debug!("telemetry channel closed");
    });
    handle
}

/// Tick the session every `tick` until the route completes, then record the
/// trip in `history`. Each tick moves the rider by `tick * time_scale` of
/// simulated time.
pub async fn drive<S, F>(
    sess: &RideSession,
    history: &TripHistory<S>,
    tick: Duration,
    time_scale: f64,
    mut on_tick: F,
) -> Option<SavedTrip>
where
    S: KeyValueStore,
    F: FnMut(&Snapshot),
{
    let dt = tick.as_secs_f64() * time_scale;
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let outcome = sess.inner.lock().tick(dt, now_ms());
        match outcome {
            TickOutcome::Moved(snapshot) => on_tick(&snapshot),
            TickOutcome::Completed(trip) => {
                // a failed save never fails the ride
                if let Err(e) = history.record(trip.clone()) {
                    tracing::warn!(error = %e, "trip not saved");
                }
                return Some(trip);
            }
            TickOutcome::Idle => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iox::MemoryStore;
    use ride_ingest_core::Metric;
    use ride_ingest_ftms::{ReplayConfig, ReplaySource};

    // roughly 111 m due north
    fn short_route() -> Vec<Coordinate> {
        vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.001)]
    }

    fn session(speed_kmh: f64, previous: Option<SavedTrip>) -> RideSession {
        RideSession::new(RouteSimulator::from_coordinates(short_route(), speed_kmh), previous, None)
    }

    fn point(lat: f64, ts: i64) -> SavedTripPoint {
        SavedTripPoint { lat, lon: 0.0, bearing: 0.0, timestamp: ts }
    }

    #[test]
    fn samples_with_speed_drive_the_simulator() {
        let sess = session(0.0, None);
        let mut inner = sess.inner.lock();

        let mut s = TelemetrySample::new();
        s.insert(Metric::InstantaneousSpeed, 30.0);
        s.insert(Metric::HeartRate, 120.0);
        inner.feed_sample(&s);
        assert!((inner.simulator.speed_kmh() - 30.0).abs() < 1e-9);

        let mut hr_only = TelemetrySample::new();
        hr_only.insert(Metric::HeartRate, 125.0);
        inner.feed_sample(&hr_only);
        assert!((inner.simulator.speed_kmh() - 30.0).abs() < 1e-9);
        assert_eq!(inner.latest.heart_rate_bpm(), Some(125.0));
        assert_eq!(inner.latest.speed_kmh(), Some(30.0));
        assert_eq!(inner.stats.heart_rate_bpm.count(), 2);
    }

    #[test]
    fn ticks_record_points_until_the_trip_completes() {
        let sess = session(36.0, None);
        let mut inner = sess.inner.lock();

        let mut moved = 0;
        let trip = loop {
            match inner.tick(1.0, 1_000 + moved as i64 * 1_000) {
                TickOutcome::Moved(snap) => {
                    assert_eq!(snap.tick, moved);
                    assert!(snap.ghost.is_none());
                    moved += 1;
                    assert!(moved < 100, "ride never completed");
                }
                TickOutcome::Completed(trip) => break trip,
                TickOutcome::Idle => panic!("idle before completion"),
            }
        };

        assert!(moved > 5);
        assert_eq!(trip.points.len(), moved);
        assert_eq!(trip.start_time, 1_000);
        assert_eq!(trip.end_time, 1_000 + moved as i64 * 1_000);
        assert_eq!(trip.total_time, moved as f64);
        assert_eq!(trip.session_id, Some(inner.id));
        assert_eq!(trip.route_id, simulator::route_id(&short_route()));
        assert!(inner.recording.is_empty());
        assert!(matches!(inner.tick(1.0, 0), TickOutcome::Idle));
    }

    #[test]
    fn ghost_follows_previous_trip_then_holds_last_point() {
        let previous = SavedTrip {
            route_id: simulator::route_id(&short_route()),
            session_id: None,
            points: vec![point(0.0001, 1), point(0.0002, 2)],
            start_time: 1,
            end_time: 2,
            total_time: 0.001,
        };
        let sess = session(3.6, Some(previous));
        let mut inner = sess.inner.lock();

        let ghosts: Vec<f64> = (0..3)
            .map(|i| match inner.tick(1.0, i) {
                TickOutcome::Moved(snap) => snap.ghost.map(|g| g.lat).unwrap_or(f64::NAN),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(ghosts, vec![0.0001, 0.0002, 0.0002]);
    }

    #[test]
    fn calories_accrue_with_heart_rate_and_user() {
        let user = UserData { sex: Sex::Male, age: 30, height: 180.0, weight: 75.0 };
        let sess = RideSession::new(
            RouteSimulator::from_coordinates(short_route(), 3.6),
            None,
            Some(user),
        );
        let mut inner = sess.inner.lock();
        inner.tick(60.0, 0);
        assert_eq!(inner.stats.calories_kcal, 0.0);

        let mut s = TelemetrySample::new();
        s.insert(Metric::HeartRate, 140.0);
        inner.feed_sample(&s);
        match inner.tick(1.0, 1) {
            TickOutcome::Moved(snap) => assert!(snap.calories_kcal > 0.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn drive_runs_to_completion_and_records_the_trip() {
        let history = TripHistory::new(MemoryStore::new());
        let sess = session(36.0, None);
        let mut seen = 0;
        let trip = drive(&sess, &history, Duration::from_millis(1), 1000.0, |_| seen += 1).await;
        let trip = trip.expect("completed trip");
        assert_eq!(trip.points.len(), seen);
        assert!(!sess.inner.lock().running);
        let saved = history.find(&trip.route_id).expect("saved trip");
        assert_eq!(saved.points.len(), seen);
        assert_eq!(saved.session_id, trip.session_id);

        assert!(drive(&sess, &history, Duration::from_millis(1), 1.0, |_| {}).await.is_none());
        assert_eq!(history.load_all().len(), 1);
    }

    #[tokio::test]
    async fn source_samples_reach_the_session() {
        let sess = Arc::new(session(0.0, None));
        let cfg = ReplayConfig { interval: Duration::from_millis(1), looped: false };
        // speed 30 km/h, heart rate 80 bpm
        let src = ReplaySource::from_text("00 02 b8 0b 50\n", cfg).unwrap();
        let handle = run_source(src, sess.clone());

        let mut speed = 0.0;
        for _ in 0..200 {
            speed = sess.inner.lock().simulator.speed_kmh();
            if speed > 0.0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert!((speed - 30.0).abs() < 1e-9);
        assert_eq!(sess.inner.lock().latest.heart_rate_bpm(), Some(80.0));
    }
}

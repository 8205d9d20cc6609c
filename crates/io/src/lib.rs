use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::{collections::HashMap, fs, path::{Path, PathBuf}};
use model::*;

/// Key the trip history lives under.
pub const TRIPS_KEY: &str = "cyclingAppTrips";
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

pub fn load_route(path: &Path, reverse: bool) -> Result<Feature> {
    let text = fs::read_to_string(path).with_context(|| format!("read route {}", path.display()))?;
    let feature: Feature = serde_json::from_str(&text)
        .with_context(|| format!("parse route {}", path.display()))?;
    Ok(if reverse { feature.reversed() } else { feature })
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// String-keyed persistence port used by the trip history.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// One `<key>.json` file per key inside `dir`.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.map.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.map.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Most recent trips, one per route, oldest first.
pub struct TripHistory<S> {
    store: S,
    limit: usize,
}

impl<S: KeyValueStore> TripHistory<S> {
    pub fn new(store: S) -> Self {
        Self::with_limit(store, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_limit(store: S, limit: usize) -> Self {
        Self { store, limit }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Missing, unreadable or corrupt history reads as empty.
    pub fn load_all(&self) -> Vec<SavedTrip> {
        let raw = match self.store.get(TRIPS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read trip history");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(trips) => trips,
            Err(e) => {
                tracing::warn!(error = %e, "trip history is corrupt, ignoring it");
                Vec::new()
            }
        }
    }

    pub fn find(&self, route_id: &str) -> Option<SavedTrip> {
        self.load_all().into_iter().find(|t| t.route_id == route_id)
    }

    /// Replace any trip on the same route with `trip`, keeping the newest `limit`.
    pub fn record(&self, trip: SavedTrip) -> Result<(), StoreError> {
        let mut trips = self.load_all();
        trips.retain(|t| t.route_id != trip.route_id);
        trips.push(trip);
        let pruned = trips.len().saturating_sub(self.limit);
        if pruned > 0 {
            trips.drain(..pruned);
        }
        self.store.set(TRIPS_KEY, &serde_json::to_string(&trips)?)?;
        tracing::info!(trips = trips.len(), pruned, "trip history saved");
        Ok(())
    }
}

pub fn export_trip_csv(trip: &SavedTrip, path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path)?;
    let t0 = trip.points.first().map(|p| p.timestamp).unwrap_or(trip.start_time);
    for p in &trip.points {
        w.serialize(TripCsvRow {
            route_id: &trip.route_id,
            t_s: (p.timestamp - t0) as f64 / 1000.0,
            timestamp: p.timestamp,
            lat: p.lat,
            lon: p.lon,
            bearing: p.bearing,
        })?;
    }
    w.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct TripCsvRow<'a> {
    route_id: &'a str,
    t_s: f64,
    timestamp: i64,
    lat: f64,
    lon: f64,
    bearing: f64,
}

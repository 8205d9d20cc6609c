//! Virtual rider that moves along a route polyline at a settable speed.

pub mod geo;

use model::{Coordinate, Feature, Position};
use std::time::Instant;

pub use geo::{bearing, haversine_distance, route_length, EARTH_RADIUS_M};

pub const DEFAULT_SPEED_KMH: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulatorError {
    #[error("route must be a GeoJSON Feature with a LineString geometry")]
    InvalidGeometry,
}

/// Outcome of one [`RouteSimulator::advance`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    Moved(Position),
    /// The last vertex has been reached. Terminal: every later call returns it too.
    Completed,
}

impl Step {
    pub fn position(self) -> Option<Position> {
        match self {
            Step::Moved(p) => Some(p),
            Step::Completed => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteSimulator {
    route: Vec<Coordinate>,
    index: usize,
    progress: f64,
    speed_mps: f64,
    started_at: Option<Instant>,
}

impl RouteSimulator {
    pub fn new(feature: &Feature, speed_kmh: f64) -> Result<Self, SimulatorError> {
        let route = feature.line_string().ok_or(SimulatorError::InvalidGeometry)?;
        Ok(Self::from_coordinates(route, speed_kmh))
    }

    pub fn from_coordinates(route: Vec<Coordinate>, speed_kmh: f64) -> Self {
        let mut sim = Self {
            route,
            index: 0,
            progress: 0.0,
            speed_mps: 0.0,
            started_at: None,
        };
        sim.set_speed_kmh(speed_kmh);
        sim
    }

    pub fn route(&self) -> &[Coordinate] {
        &self.route
    }

    pub fn segment_index(&self) -> usize {
        self.index
    }

    pub fn segment_progress(&self) -> f64 {
        self.progress
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Not validated. Zero parks the rider; negative speed drifts backwards
    /// along the current segment without bound.
    pub fn set_speed_kmh(&mut self, speed_kmh: f64) {
        if speed_kmh < 0.0 {
            tracing::warn!(speed_kmh, "negative speed, rider will drift backwards");
        }
        self.speed_mps = speed_kmh * 1000.0 / 3600.0;
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_mps * 3600.0 / 1000.0
    }

    pub fn speed_mps(&self) -> f64 {
        self.speed_mps
    }

    pub fn is_completed(&self) -> bool {
        self.route.len() < 2 || self.index >= self.route.len() - 1
    }

    pub fn advance(&mut self, dt_s: f64) -> Step {
        self.advance_at(dt_s, Instant::now())
    }

    /// Move the rider by `speed * dt_s`. When a segment is finished the full
    /// step is applied again on the next one, so one large step may pass
    /// several short segments or run off the end of the route.
    pub fn advance_at(&mut self, dt_s: f64, now: Instant) -> Step {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }

        // every pass either returns or moves to the next vertex
        while !self.is_completed() {
            let start = self.route[self.index];
            let end = self.route[self.index + 1];
            let seg = haversine_distance(start, end);

            if seg > 0.0 {
                self.progress += self.speed_mps * dt_s / seg;
            } else {
                self.progress = 1.0;
            }

            if self.progress >= 1.0 {
                self.progress = 0.0;
                self.index += 1;
                continue;
            }

            return Step::Moved(Position {
                lat: start.lat + (end.lat - start.lat) * self.progress,
                lon: start.lon + (end.lon - start.lon) * self.progress,
                bearing: bearing(start, end),
            });
        }

        tracing::trace!(segments = self.route.len().saturating_sub(1), "route completed");
        Step::Completed
    }

    /// Where the rider is now, without moving. `None` for an empty route.
    pub fn position(&self) -> Option<Position> {
        let first = *self.route.first()?;
        if self.route.len() < 2 {
            return Some(Position { lat: first.lat, lon: first.lon, bearing: 0.0 });
        }
        if self.is_completed() {
            let n = self.route.len();
            let (a, b) = (self.route[n - 2], self.route[n - 1]);
            return Some(Position { lat: b.lat, lon: b.lon, bearing: bearing(a, b) });
        }
        let (a, b) = (self.route[self.index], self.route[self.index + 1]);
        Some(Position {
            lat: a.lat + (b.lat - a.lat) * self.progress,
            lon: a.lon + (b.lon - a.lon) * self.progress,
            bearing: bearing(a, b),
        })
    }

    /// Wall-clock seconds since the first step; 0 before it.
    pub fn elapsed_time(&self) -> f64 {
        self.elapsed_time_at(Instant::now())
    }

    pub fn elapsed_time_at(&self, now: Instant) -> f64 {
        self.started_at
            .map(|t| now.saturating_duration_since(t).as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn total_distance(&self) -> f64 {
        route_length(&self.route)
    }

    pub fn traveled_distance(&self) -> f64 {
        if self.index == 0 && self.progress == 0.0 {
            return 0.0;
        }
        let done = route_length(&self.route[..=self.index.min(self.route.len() - 1)]);
        if self.is_completed() {
            return done;
        }
        done + self.segment_length(self.index) * self.progress
    }

    pub fn remaining_distance(&self) -> f64 {
        if self.is_completed() {
            return 0.0;
        }
        self.segment_length(self.index) * (1.0 - self.progress)
            + route_length(&self.route[self.index + 1..])
    }

    /// Seconds to the end at the current speed: 0 once completed, +inf when parked.
    pub fn estimated_time(&self) -> f64 {
        if self.is_completed() {
            return 0.0;
        }
        if self.speed_mps == 0.0 {
            return f64::INFINITY;
        }
        self.remaining_distance() / self.speed_mps
    }

    fn segment_length(&self, i: usize) -> f64 {
        haversine_distance(self.route[i], self.route[i + 1])
    }
}

impl TryFrom<&Feature> for RouteSimulator {
    type Error = SimulatorError;

    fn try_from(feature: &Feature) -> Result<Self, Self::Error> {
        Self::new(feature, DEFAULT_SPEED_KMH)
    }
}

/// Stable identifier for a route: a 32-bit rolling hash (`h * 31 + byte`) of
/// the coordinate array's compact JSON text, as a signed decimal.
pub fn route_id(coords: &[Coordinate]) -> String {
    let mut text = String::with_capacity(coords.len() * 24 + 2);
    text.push('[');
    for (i, c) in coords.iter().enumerate() {
        if i > 0 {
            text.push(',');
        }
        text.push('[');
        text.push_str(&json_number(c.lon));
        text.push(',');
        text.push_str(&json_number(c.lat));
        text.push(']');
    }
    text.push(']');

    let hash = text
        .bytes()
        .fold(0i32, |h, b| h.wrapping_mul(31).wrapping_add(b as i32));
    hash.to_string()
}

fn json_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

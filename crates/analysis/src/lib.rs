use model::*;
use ride_ingest_core::{Metric, TelemetrySample};
use serde::Serialize;
use serde_json::{json, Value};

/// Energy expenditure in kcal/min while riding, from heart rate.
///
/// Keytel et al. (2005) heart-rate regression for the active part plus the
/// Harris-Benedict basal rate spread over the day, clamped to 1.5..=30.
pub fn calories_per_minute(user: &UserData, heart_rate: f64) -> f64 {
    let (age, weight, height) = (user.age as f64, user.weight, user.height);
    let (active, bmr) = match user.sex {
        Sex::Male => (
            (-55.0969 + 0.6309 * heart_rate + 0.1988 * weight + 0.2017 * age) / 4.184,
            88.362 + 13.397 * weight + 4.799 * height - 5.677 * age,
        ),
        Sex::Female => (
            (-20.4022 + 0.4472 * heart_rate + 0.1263 * weight + 0.074 * age) / 4.184,
            447.593 + 9.247 * weight + 3.098 * height - 4.330 * age,
        ),
    };
    (active + bmr / 1440.0).clamp(1.5, 30.0)
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("duration must be a non-negative number, got {0}")]
pub struct InvalidDuration(pub f64);

/// `"05s"`, `"2m 30s"`, `"1h 00m 00s"`. Fractions are floored; +inf is `"Infinity"`.
pub fn format_duration(seconds: f64) -> Result<String, InvalidDuration> {
    if seconds.is_nan() || seconds < 0.0 {
        return Err(InvalidDuration(seconds));
    }
    if seconds.is_infinite() {
        return Ok("Infinity".into());
    }
    let total = seconds.floor() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    Ok(if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s:02}s")
    })
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RouteSummary {
    pub length_km: f64,
    pub estimated_minutes: f64,
}

/// Length and expected duration of a route at an average riding speed.
pub fn route_summary(route: &[Coordinate], average_speed_kmh: f64) -> RouteSummary {
    let length_m = simulator::route_length(route);
    let estimated_minutes = if average_speed_kmh > 0.0 {
        length_m / (average_speed_kmh * 1000.0) * 60.0
    } else {
        f64::INFINITY
    };
    RouteSummary { length_km: length_m / 1000.0, estimated_minutes }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SeriesStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    sum: f64,
    count: u64,
}

impl SeriesStats {
    pub fn push(&mut self, v: f64) {
        self.min = Some(self.min.map_or(v, |m| m.min(v)));
        self.max = Some(self.max.map_or(v, |m| m.max(v)));
        self.sum += v;
        self.count += 1;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    fn to_json(self) -> Value {
        json!({ "min": self.min, "mean": self.mean(), "max": self.max })
    }
}

/// Running statistics over a ride's telemetry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RideStats {
    pub speed_kmh: SeriesStats,
    pub heart_rate_bpm: SeriesStats,
    pub cadence_rpm: SeriesStats,
    pub power_w: SeriesStats,
    pub calories_kcal: f64,
}

impl RideStats {
    pub fn add_sample(&mut self, sample: &TelemetrySample) {
        for (metric, v) in sample.iter() {
            match metric {
                Metric::InstantaneousSpeed => self.speed_kmh.push(v),
                Metric::HeartRate => self.heart_rate_bpm.push(v),
                Metric::InstantaneousCadence => self.cadence_rpm.push(v),
                Metric::InstantaneousPower => self.power_w.push(v),
                _ => {}
            }
        }
    }

    /// Accrue energy for `minutes` spent at `heart_rate`.
    pub fn add_calories(&mut self, user: &UserData, heart_rate: f64, minutes: f64) {
        if minutes > 0.0 {
            self.calories_kcal += calories_per_minute(user, heart_rate) * minutes;
        }
    }

    pub fn summary(&self) -> Value {
        json!({
            "speed_kmh": self.speed_kmh.to_json(),
            "heart_rate_bpm": self.heart_rate_bpm.to_json(),
            "cadence_rpm": self.cadence_rpm.to_json(),
            "power_w": self.power_w.to_json(),
            "calories_kcal": self.calories_kcal,
        })
    }
}

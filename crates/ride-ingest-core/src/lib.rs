//! Core telemetry model and traits used by the ride ingest sources

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Physical quantities a bike trainer can report, in canonical wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    InstantaneousSpeed,
    AverageSpeed,
    InstantaneousCadence,
    AverageCadence,
    TotalDistance,
    ResistanceLevel,
    InstantaneousPower,
    AveragePower,
    TotalEnergy,
    EnergyPerHour,
    EnergyPerMinute,
    HeartRate,
    MetabolicEquivalent,
    ElapsedTime,
    RemainingTime,
}

impl Metric {
    pub const ALL: [Metric; 15] = [
        Metric::InstantaneousSpeed,
        Metric::AverageSpeed,
        Metric::InstantaneousCadence,
        Metric::AverageCadence,
        Metric::TotalDistance,
        Metric::ResistanceLevel,
        Metric::InstantaneousPower,
        Metric::AveragePower,
        Metric::TotalEnergy,
        Metric::EnergyPerHour,
        Metric::EnergyPerMinute,
        Metric::HeartRate,
        Metric::MetabolicEquivalent,
        Metric::ElapsedTime,
        Metric::RemainingTime,
    ];

    pub fn full_name(self) -> &'static str {
        match self {
            Metric::InstantaneousSpeed => "InstantaneousSpeed",
            Metric::AverageSpeed => "AverageSpeed",
            Metric::InstantaneousCadence => "InstantaneousCadence",
            Metric::AverageCadence => "AverageCadence",
            Metric::TotalDistance => "TotalDistance",
            Metric::ResistanceLevel => "ResistanceLevel",
            Metric::InstantaneousPower => "InstantaneousPower",
            Metric::AveragePower => "AveragePower",
            Metric::TotalEnergy => "TotalEnergy",
            Metric::EnergyPerHour => "EnergyPerHour",
            Metric::EnergyPerMinute => "EnergyPerMinute",
            Metric::HeartRate => "HeartRate",
            Metric::MetabolicEquivalent => "MetabolicEquivalent",
            Metric::ElapsedTime => "ElapsedTime",
            Metric::RemainingTime => "RemainingTime",
        }
    }

    pub fn short_name(self) -> Option<&'static str> {
        match self {
            Metric::InstantaneousSpeed => Some("speed"),
            Metric::InstantaneousCadence => Some("cadence"),
            Metric::TotalDistance => Some("distance"),
            Metric::InstantaneousPower => Some("power"),
            Metric::HeartRate => Some("heartRate"),
            _ => None,
        }
    }

    /// Output key: the short alias if there is one, else the full name.
    pub fn name(self) -> &'static str {
        self.short_name().unwrap_or_else(|| self.full_name())
    }

    pub fn from_name(name: &str) -> Option<Metric> {
        Metric::ALL.into_iter().find(|m| m.name() == name || m.full_name() == name)
    }
}

/// One decoded telemetry record. Only fields present on the wire are stored;
/// a missing metric means "unknown", never zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySample {
    values: BTreeMap<Metric, f64>,
}

impl TelemetrySample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, metric: Metric, value: f64) {
        self.values.insert(metric, value);
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.values.get(&metric).copied()
    }

    pub fn get_named(&self, name: &str) -> Option<f64> {
        Metric::from_name(name).and_then(|m| self.get(m))
    }

    pub fn speed_kmh(&self) -> Option<f64> { self.get(Metric::InstantaneousSpeed) }
    pub fn cadence_rpm(&self) -> Option<f64> { self.get(Metric::InstantaneousCadence) }
    pub fn distance_m(&self) -> Option<f64> { self.get(Metric::TotalDistance) }
    pub fn power_w(&self) -> Option<f64> { self.get(Metric::InstantaneousPower) }
    pub fn heart_rate_bpm(&self) -> Option<f64> { self.get(Metric::HeartRate) }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        self.values.iter().map(|(m, v)| (*m, *v))
    }
}

impl Serialize for TelemetrySample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (metric, value) in &self.values {
            map.serialize_entry(metric.name(), value)?;
        }
        map.end()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{0}")]
    Msg(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type TelemetryTx = crossbeam_channel::Sender<TelemetrySample>;
pub type TelemetryRx = crossbeam_channel::Receiver<TelemetrySample>;

/// Trait for any live source connector
#[async_trait::async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn run(&self, tx: TelemetryTx) -> Result<(), IngestError>;
}

pub fn channel() -> (TelemetryTx, TelemetryRx) {
    crossbeam_channel::unbounded()
}

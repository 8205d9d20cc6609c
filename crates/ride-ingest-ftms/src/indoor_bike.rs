//! Indoor Bike Data characteristic (FTMS 4.9).
//!
//! A record is a little-endian flags word followed by the optional fields the
//! flags announce, packed in a fixed order. The table below is walked once per
//! record; nothing is allocated besides the output sample.

use byteorder::{LittleEndian, ReadBytesExt};
use ride_ingest_core::{Metric, TelemetrySample};
use std::io::{self, Cursor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    U8,
    U16,
    I16,
    U24,
}

impl Kind {
    pub const fn size(self) -> usize {
        match self {
            Kind::U8 => 1,
            Kind::U16 | Kind::I16 => 2,
            Kind::U24 => 3,
        }
    }

    fn read(self, c: &mut Cursor<&[u8]>) -> io::Result<i64> {
        Ok(match self {
            Kind::U8 => c.read_u8()? as i64,
            Kind::U16 => c.read_u16::<LittleEndian>()? as i64,
            Kind::I16 => c.read_i16::<LittleEndian>()? as i64,
            Kind::U24 => c.read_u24::<LittleEndian>()? as i64,
        })
    }
}

/// Bit test applied to the flags word decoded so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Always,
    BitSet(u8),
    BitClear(u8),
}

impl Presence {
    pub const fn test(self, flags: u16) -> bool {
        match self {
            Presence::Always => true,
            Presence::BitSet(bit) => (flags >> bit) & 1 == 1,
            Presence::BitClear(bit) => (flags >> bit) & 1 == 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// `None` marks the leading flags word.
    pub metric: Option<Metric>,
    pub kind: Kind,
    pub resolution: f64,
    pub unit: &'static str,
    pub presence: Presence,
}

const fn field(metric: Metric, kind: Kind, resolution: f64, unit: &'static str, presence: Presence) -> FieldSpec {
    FieldSpec { metric: Some(metric), kind, resolution, unit, presence }
}

pub const FIELDS: [FieldSpec; 16] = [
    FieldSpec { metric: None, kind: Kind::U16, resolution: 1.0, unit: "bit", presence: Presence::Always },
    // bit 0 is "more data": speed is present when it is CLEAR
    field(Metric::InstantaneousSpeed, Kind::U16, 0.01, "kph", Presence::BitClear(0)),
    field(Metric::AverageSpeed, Kind::U16, 0.01, "kph", Presence::BitSet(1)),
    field(Metric::InstantaneousCadence, Kind::U16, 0.5, "rpm", Presence::BitSet(2)),
    field(Metric::AverageCadence, Kind::U16, 0.5, "rpm", Presence::BitSet(3)),
    field(Metric::TotalDistance, Kind::U24, 1.0, "m", Presence::BitSet(4)),
    field(Metric::ResistanceLevel, Kind::U16, 1.0, "unitless", Presence::BitSet(5)),
    field(Metric::InstantaneousPower, Kind::U16, 1.0, "W", Presence::BitSet(6)),
    field(Metric::AveragePower, Kind::U16, 1.0, "W", Presence::BitSet(7)),
    field(Metric::TotalEnergy, Kind::I16, 1.0, "kcal", Presence::BitSet(8)),
    field(Metric::EnergyPerHour, Kind::I16, 1.0, "kcal", Presence::BitSet(8)),
    field(Metric::EnergyPerMinute, Kind::U8, 1.0, "kcal", Presence::BitSet(8)),
    field(Metric::HeartRate, Kind::U8, 1.0, "bpm", Presence::BitSet(9)),
    field(Metric::MetabolicEquivalent, Kind::U8, 1.0, "me", Presence::BitSet(10)),
    field(Metric::ElapsedTime, Kind::U16, 1.0, "s", Presence::BitSet(11)),
    field(Metric::RemainingTime, Kind::U16, 1.0, "s", Presence::BitSet(12)),
];

pub fn unit_of(metric: Metric) -> &'static str {
    FIELDS
        .iter()
        .find(|f| f.metric == Some(metric))
        .map(|f| f.unit)
        .unwrap_or("")
}

/// Decode one Indoor Bike Data record.
///
/// Never fails: decoding stops at the first announced field that would run
/// past the end of `record` and whatever was read up to that point is
/// returned. Fields the flags do not announce occupy no bytes.
pub fn decode(record: &[u8]) -> TelemetrySample {
    let mut sample = TelemetrySample::new();
    let mut flags: u16 = 0;
    let mut c = Cursor::new(record);

    for f in FIELDS.iter() {
        if !f.presence.test(flags) {
            continue;
        }
        let at = c.position() as usize;
        if at + f.kind.size() > record.len() {
            if at > 0 {
                tracing::debug!(len = record.len(), at, field = ?f.metric, "short indoor bike record");
            }
            break;
        }
        let raw = match f.kind.read(&mut c) {
            Ok(v) => v,
            Err(_) => break,
        };
        match f.metric {
            None => flags = raw as u16,
            Some(metric) => sample.insert(metric, raw as f64 * f.resolution),
        }
    }

    sample
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_and_heart_rate() {
        // flags 0x0200: bit 0 clear (speed present), bit 9 set (heart rate)
        let rec = [0x00, 0x02, 0xE8, 0x03, 75];
        let s = decode(&rec);
        assert_eq!(s.len(), 2);
        assert_eq!(s.get_named("speed"), Some(10.0));
        assert_eq!(s.get_named("heartRate"), Some(75.0));
    }

    #[test]
    fn flags_only_record_is_empty() {
        assert!(decode(&[0x00, 0x02]).is_empty());
        assert!(decode(&[]).is_empty());
        assert!(decode(&[0x44]).is_empty());
    }

    #[test]
    fn bit_zero_set_means_no_speed() {
        // bit 0 set, bit 2 cadence: raw 180 * 0.5
        let s = decode(&[0x05, 0x00, 0xB4, 0x00]);
        assert_eq!(s.speed_kmh(), None);
        assert_eq!(s.cadence_rpm(), Some(90.0));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn distance_is_24_bit_little_endian() {
        let s = decode(&[0x10, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03]);
        assert_eq!(s.speed_kmh(), Some(0.0));
        assert_eq!(s.distance_m(), Some((0x03 * 65536 + 0x02 * 256 + 0x01) as f64));
    }

    #[test]
    fn expanded_energy_brings_three_fields() {
        let s = decode(&[0x01, 0x01, 0xFE, 0xFF, 0x2C, 0x01, 0x05]);
        assert_eq!(s.get(Metric::TotalEnergy), Some(-2.0));
        assert_eq!(s.get(Metric::EnergyPerHour), Some(300.0));
        assert_eq!(s.get(Metric::EnergyPerMinute), Some(5.0));
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn typical_trainer_record() {
        // speed, cadence, power, heart rate, elapsed time
        let rec = [0x44, 0x0A, 0xF6, 0x09, 0xAA, 0x00, 0xD2, 0x00, 0x8E, 0x58, 0x02];
        let s = decode(&rec);
        assert!((s.speed_kmh().unwrap() - 25.5).abs() < 1e-9);
        assert_eq!(s.cadence_rpm(), Some(85.0));
        assert_eq!(s.power_w(), Some(210.0));
        assert_eq!(s.heart_rate_bpm(), Some(142.0));
        assert_eq!(s.get_named("ElapsedTime"), Some(600.0));
        assert_eq!(s.len(), 5);
    }

    #[test]
    fn truncated_trailing_field_is_dropped() {
        // power announced but only one byte follows
        let s = decode(&[0x40, 0x00, 0xE8, 0x03, 0x64]);
        assert_eq!(s.speed_kmh(), Some(10.0));
        assert_eq!(s.power_w(), None);
    }

    #[test]
    fn absent_fields_take_no_room() {
        // speed absent, heart rate present: the single trailing byte is heart rate
        let s = decode(&[0x01, 0x02, 75]);
        assert_eq!(s.len(), 1);
        assert_eq!(s.heart_rate_bpm(), Some(75.0));
    }

    #[test]
    fn flags_field_is_not_reported() {
        let s = decode(&[0x01, 0x00]);
        assert!(s.is_empty());
        assert_eq!(s.get_named("Flags"), None);
    }

    #[test]
    fn units_follow_the_table() {
        assert_eq!(unit_of(Metric::InstantaneousSpeed), "kph");
        assert_eq!(unit_of(Metric::HeartRate), "bpm");
        assert_eq!(unit_of(Metric::TotalDistance), "m");
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A route vertex in decimal degrees. Serialized GeoJSON-style as `[lon, lat]`.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinate {
    pub lon: f64,
    pub lat: f64,
}

impl Coordinate {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from([lon, lat]: [f64; 2]) -> Self {
        Self { lon, lat }
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(c: Coordinate) -> Self {
        [c.lon, c.lat]
    }
}

/// GeoJSON Feature as delivered by route files. Only `type`, `geometry.type`
/// and `geometry.coordinates` are interpreted; properties are carried as-is.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: Value,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub coordinates: Value,
}

impl Feature {
    pub fn from_line(coordinates: &[Coordinate]) -> Self {
        let coords = coordinates
            .iter()
            .map(|c| Value::from(vec![c.lon, c.lat]))
            .collect::<Vec<_>>();
        Self {
            kind: "Feature".into(),
            geometry: Some(Geometry {
                kind: "LineString".into(),
                coordinates: Value::Array(coords),
            }),
            properties: Value::Object(Default::default()),
        }
    }

    /// Coordinates of a `Feature` carrying a `LineString`, or `None` for any
    /// other shape. Positions need at least two numbers; altitude is dropped.
    pub fn line_string(&self) -> Option<Vec<Coordinate>> {
        if self.kind != "Feature" {
            return None;
        }
        let geometry = self.geometry.as_ref()?;
        if geometry.kind != "LineString" {
            return None;
        }
        let positions = geometry.coordinates.as_array()?;
        let mut out = Vec::with_capacity(positions.len());
        for p in positions {
            let p = p.as_array()?;
            if p.len() < 2 {
                return None;
            }
            out.push(Coordinate::new(p[0].as_f64()?, p[1].as_f64()?));
        }
        Some(out)
    }

    /// Same feature with its vertex order flipped, for riding a route backwards.
    pub fn reversed(mut self) -> Self {
        if let Some(Value::Array(coords)) = self.geometry.as_mut().map(|g| &mut g.coordinates) {
            coords.reverse();
        }
        self
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub bearing: f64, // degrees, 0 = north, clockwise
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedTripPoint {
    pub lat: f64,
    pub lon: f64,
    pub bearing: f64,
    pub timestamp: i64, // unix ms
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedTrip {
    pub route_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub points: Vec<SavedTripPoint>,
    pub start_time: i64,
    pub end_time: i64,
    pub total_time: f64, // seconds
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct UserData {
    pub sex: Sex,
    pub age: u32,
    pub height: f64, // cm
    pub weight: f64, // kg
}

//! Great-circle primitives on (lon, lat) pairs in decimal degrees.

use model::Coordinate;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters.
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial compass bearing from `a` to `b` in [0, 360). Identical points give 0.
pub fn bearing(a: Coordinate, b: Coordinate) -> f64 {
    if a == b {
        return 0.0;
    }
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lon = (b.lon - a.lon).to_radians();
    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
    let deg = (y.atan2(x).to_degrees() + 360.0) % 360.0;
    if deg >= 360.0 { 0.0 } else { deg }
}

/// Total polyline length in meters; 0 for fewer than two points.
pub fn route_length(coords: &[Coordinate]) -> f64 {
    coords
        .windows(2)
        .map(|w| haversine_distance(w[0], w[1]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(lon: f64, lat: f64) -> Coordinate {
        Coordinate::new(lon, lat)
    }

    #[test]
    fn identical_points() {
        let p = c(10.75, 59.91);
        assert_eq!(haversine_distance(p, p), 0.0);
        assert_eq!(bearing(p, p), 0.0);
        assert_eq!(bearing(c(0.0, 0.0), c(0.0, 0.0)), 0.0);
    }

    #[test]
    fn one_degree_at_the_equator() {
        let d = haversine_distance(c(0.0, 0.0), c(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 1_000.0, "{d}");
        let d = haversine_distance(c(0.0, 0.0), c(0.0, 0.5));
        assert!(d > 55_000.0 && d < 56_000.0, "{d}");
    }

    #[test]
    fn short_segment() {
        let d = haversine_distance(c(0.0, 0.0), c(0.001, 0.0));
        assert!(d > 100.0 && d < 120.0, "{d}");
    }

    #[test]
    fn antimeridian_is_short_way_round() {
        let d = haversine_distance(c(179.0, 0.0), c(-179.0, 0.0));
        assert!(d > 200_000.0 && d < 250_000.0, "{d}");
    }

    #[test]
    fn compass_points() {
        let o = c(0.0, 0.0);
        assert!((bearing(o, c(1.0, 0.0)) - 90.0).abs() < 0.1);
        assert!(bearing(o, c(0.0, 1.0)).abs() < 0.1);
        assert!((bearing(o, c(-1.0, 0.0)) - 270.0).abs() < 0.1);
        assert!((bearing(o, c(0.0, -1.0)) - 180.0).abs() < 0.1);
    }

    #[test]
    fn route_length_sums_segments() {
        assert_eq!(route_length(&[]), 0.0);
        assert_eq!(route_length(&[c(0.0, 0.0)]), 0.0);
        let grid = [c(0.0, 0.0), c(0.1, 0.0), c(0.1, 0.1), c(0.2, 0.1)];
        let len = route_length(&grid);
        assert!(len > 30_000.0 && len < 36_000.0, "{len}");
    }
}

use serde::{Deserialize, Serialize};

const EARTH_RADIUS_M: f64 = 6_371_000.0;
const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Box that fully contains the circle of `radius_m` around `center`.
    pub fn around(center: Position, radius_m: f64) -> Self {
        let d_lat = radius_m / METERS_PER_DEGREE_LAT;
        let cos_lat = center.latitude.to_radians().cos().abs().max(1e-6);
        let d_lon = (radius_m / (METERS_PER_DEGREE_LAT * cos_lat)).min(180.0);
        Self {
            min_lat: (center.latitude - d_lat).max(-90.0),
            min_lon: center.longitude - d_lon,
            max_lat: (center.latitude + d_lat).min(90.0),
            max_lon: center.longitude + d_lon,
        }
    }

    pub fn contains(&self, p: Position) -> bool {
        p.latitude >= self.min_lat
            && p.latitude <= self.max_lat
            && p.longitude >= self.min_lon
            && p.longitude <= self.max_lon
    }
}

/// Great-circle distance in meters.
pub fn haversine_m(a: Position, b: Position) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let a = Position { latitude: 55.0, longitude: 37.0 };
        let b = Position { latitude: 56.0, longitude: 37.0 };
        let d = haversine_m(a, b);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
        assert_eq!(haversine_m(a, a), 0.0);
    }

    #[test]
    fn bounding_box_contains_points_within_radius() {
        let center = Position { latitude: 55.75, longitude: 37.61 };
        let bbox = BoundingBox::around(center, 1000.0);
        assert!(bbox.contains(center));
        assert!(bbox.contains(Position { latitude: 55.755, longitude: 37.615 }));
        assert!(!bbox.contains(Position { latitude: 55.80, longitude: 37.61 }));
    }
}

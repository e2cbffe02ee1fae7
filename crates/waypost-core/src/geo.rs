//! Spherical geometry on WGS84 coordinates.
//!
//! Pure functions only. Distances are great-circle (haversine) distances in
//! meters, directions are initial bearings in degrees clockwise from north.

use serde::{Deserialize, Serialize};

/// Mean earth radius used for all distance math, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lng", alias = "lon")]
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let sin_dlat = (delta_lat / 2.0).sin();
        let sin_dlon = (delta_lon / 2.0).sin();
        let a = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }

    /// Initial bearing towards `other`, in `[0, 360)` degrees.
    pub fn direction_to(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let y = delta_lon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();
        wrap(y.atan2(x).to_degrees(), 0.0, 360.0)
    }

    /// The coordinate reached by travelling `distance` meters along `bearing`.
    pub fn coordinate_at(&self, distance: f64, bearing: f64) -> Coordinate {
        let delta = distance / EARTH_RADIUS_M;
        let theta = bearing.to_radians();
        let lat1 = self.latitude.to_radians();
        let lon1 = self.longitude.to_radians();

        let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
        let lon2 = lon1
            + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

        Coordinate::new(lat2.to_degrees(), wrap(lon2.to_degrees(), -180.0, 180.0))
    }
}

/// Wrap `value` into the half-open range `[min, max)`.
pub fn wrap(value: f64, min: f64, max: f64) -> f64 {
    let d = max - min;
    ((value - min) % d + d) % d + min
}

/// Smallest absolute angle between two directions, in `[0, 180]` degrees.
pub fn angle_difference(a: f64, b: f64) -> f64 {
    let phi = (b - a).abs() % 360.0;
    if phi > 180.0 {
        360.0 - phi
    } else {
        phi
    }
}

/// Angle swept when turning clockwise from `from` to `to`, in `[0, 360)`.
pub fn clockwise_difference(from: f64, to: f64) -> f64 {
    wrap(to - from, 0.0, 360.0)
}

/// A direction (course or heading) is usable when it is not negative.
///
/// Location providers report `-1` for "unknown".
pub fn is_qualified_direction(direction: f64) -> bool {
    direction > -1.0
}

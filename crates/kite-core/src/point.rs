/// Geographic point type used for fault traces, profiles and mesh nodes.
/// All coordinate math uses f64 for precision.
use serde::{Deserialize, Serialize};

use crate::error::{GeoError, Result};
use crate::geodetic;

/// Maximum elevation on Earth in km, expressed as a (negative) depth.
pub const EARTH_ELEVATION: f64 = -8.848;

/// A point on (or below) the Earth's surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Longitude in degrees, -180 to +180.
    pub lon: f64,
    /// Latitude in degrees, -90 to +90.
    pub lat: f64,
    /// Depth in km, positive down.
    pub depth: f64,
}

impl GeoPoint {
    /// Build a point without validation. Use on trusted, already-checked data.
    pub fn new(lon: f64, lat: f64, depth: f64) -> Self {
        Self { lon, lat, depth }
    }

    /// Build a point, rejecting non-finite or out-of-domain coordinates.
    pub fn checked(lon: f64, lat: f64, depth: f64) -> Result<Self> {
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(GeoError::ValueRange { what: "longitude", value: lon, expected: "[-180, 180]" });
        }
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(GeoError::ValueRange { what: "latitude", value: lat, expected: "[-90, 90]" });
        }
        if !depth.is_finite() || depth < EARTH_ELEVATION {
            return Err(GeoError::ValueRange { what: "depth", value: depth, expected: ">= -8.848 km" });
        }
        Ok(Self { lon, lat, depth })
    }

    /// Great-circle distance to `other` in km, ignoring depth.
    pub fn horizontal_distance(&self, other: &GeoPoint) -> f64 {
        geodetic::haversine_km(self.lon, self.lat, other.lon, other.lat)
    }

    /// 3-D distance to `other` in km.
    pub fn distance(&self, other: &GeoPoint) -> f64 {
        let h = self.horizontal_distance(other);
        let v = other.depth - self.depth;
        (h * h + v * v).sqrt()
    }

    /// Initial bearing towards `other`, degrees clockwise from north in [0, 360).
    pub fn azimuth(&self, other: &GeoPoint) -> f64 {
        geodetic::bearing_deg(self.lon, self.lat, other.lon, other.lat)
    }

    /// The point `hdist` km away along `azimuth`, `vdist` km deeper.
    pub fn point_at(&self, hdist: f64, vdist: f64, azimuth: f64) -> GeoPoint {
        let (lon, lat) = geodetic::forward(self.lon, self.lat, azimuth, hdist);
        GeoPoint::new(lon, lat, self.depth + vdist)
    }

    /// Same horizontal position within `tol` degrees and same depth within `tol` km.
    pub fn close_to(&self, other: &GeoPoint, tol: f64) -> bool {
        (self.lon - other.lon).abs() <= tol
            && (self.lat - other.lat).abs() <= tol
            && (self.depth - other.depth).abs() <= tol
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn checked_rejects_out_of_domain() {
        assert!(GeoPoint::checked(0.0, 0.0, 0.0).is_ok());
        assert!(GeoPoint::checked(180.0, -90.0, EARTH_ELEVATION).is_ok());
        assert!(matches!(
            GeoPoint::checked(180.5, 0.0, 0.0),
            Err(GeoError::ValueRange { what: "longitude", .. })
        ));
        assert!(matches!(
            GeoPoint::checked(0.0, 91.0, 0.0),
            Err(GeoError::ValueRange { what: "latitude", .. })
        ));
        assert!(matches!(
            GeoPoint::checked(0.0, 0.0, -9.0),
            Err(GeoError::ValueRange { what: "depth", .. })
        ));
        assert!(GeoPoint::checked(f64::NAN, 0.0, 0.0).is_err());
    }

    #[test]
    fn point_at_then_distance_roundtrip() {
        let p = GeoPoint::new(10.0, 45.0, 2.0);
        let q = p.point_at(50.0, 3.0, 120.0);
        assert_abs_diff_eq!(p.horizontal_distance(&q), 50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(q.depth, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.distance(&q), (50.0_f64 * 50.0 + 9.0).sqrt(), epsilon = 1e-9);
        assert_abs_diff_eq!(p.azimuth(&q), 120.0, epsilon = 1e-6);
    }
}

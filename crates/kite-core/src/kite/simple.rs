//! Planar dipping faults described by a surface trace, a depth range and a
//! dip angle, turned into profiles for the kite builder.

use crate::error::{GeoError, Result};
use crate::point::GeoPoint;
use crate::profile::{average_azimuth, Profile};

/// One straight two-point profile per trace vertex, running down-dip at a
/// right angle to the mean trace direction.
pub fn simple_fault_profiles(trace: &[GeoPoint], upper_depth: f64, lower_depth: f64, dip: f64) -> Result<Vec<Profile>> {
    if trace.len() < 2 {
        return Err(GeoError::geometry(format!("a fault trace needs at least two points, got {}", trace.len())));
    }
    if !(dip > 0.0 && dip <= 90.0) {
        return Err(GeoError::ValueRange { what: "dip", value: dip, expected: "(0, 90] degrees" });
    }
    if !(upper_depth >= 0.0) {
        return Err(GeoError::ValueRange { what: "upper seismogenic depth", value: upper_depth, expected: ">= 0 km" });
    }
    if !(lower_depth > upper_depth) {
        return Err(GeoError::ValueRange {
            what: "lower seismogenic depth",
            value: lower_depth,
            expected: "greater than the upper seismogenic depth",
        });
    }

    let azimuth = (average_azimuth(trace) + 90.0).rem_euclid(360.0);
    let tan_dip = dip.to_radians().tan();
    trace
        .iter()
        .map(|v| {
            let top = offset(v, upper_depth, tan_dip, azimuth);
            let bottom = offset(v, lower_depth, tan_dip, azimuth);
            Profile::new(vec![top, bottom])
        })
        .collect()
}

fn offset(vertex: &GeoPoint, depth: f64, tan_dip: f64, azimuth: f64) -> GeoPoint {
    let p = vertex.point_at(depth / tan_dip, 0.0, azimuth);
    GeoPoint::new(p.lon, p.lat, depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn trace() -> Vec<GeoPoint> {
        vec![GeoPoint::new(0.0, 0.0, 0.0), GeoPoint::new(0.5, 0.0, 0.0)]
    }

    #[test]
    fn profiles_run_down_dip_to_the_right() {
        let profiles = simple_fault_profiles(&trace(), 2.0, 12.0, 45.0).unwrap();
        assert_eq!(profiles.len(), 2);
        for p in &profiles {
            let (top, bottom) = (p.points()[0], p.points()[1]);
            assert_abs_diff_eq!(top.depth, 2.0);
            assert_abs_diff_eq!(bottom.depth, 12.0);
            // Trace heads east, so the fault dips south.
            assert_abs_diff_eq!(top.azimuth(&bottom), 180.0, epsilon = 1e-6);
            assert_abs_diff_eq!(top.horizontal_distance(&bottom), 10.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn vertical_fault_stays_under_the_trace() {
        let profiles = simple_fault_profiles(&trace(), 0.0, 10.0, 90.0).unwrap();
        let (top, bottom) = (profiles[0].points()[0], profiles[0].points()[1]);
        assert!(top.horizontal_distance(&bottom) < 1e-9);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(matches!(
            simple_fault_profiles(&trace(), 0.0, 10.0, 0.0),
            Err(GeoError::ValueRange { what: "dip", .. })
        ));
        assert!(simple_fault_profiles(&trace(), 0.0, 10.0, 91.0).is_err());
        assert!(simple_fault_profiles(&trace(), 10.0, 10.0, 45.0).is_err());
        assert!(simple_fault_profiles(&trace(), -1.0, 10.0, 45.0).is_err());
        assert!(matches!(simple_fault_profiles(&trace()[..1], 0.0, 10.0, 45.0), Err(GeoError::Geometry(_))));
    }
}

//! Fault profiles (top-to-bottom cross-sections) and their resampling.

use serde::{Deserialize, Serialize};

use crate::error::{GeoError, Result};
use crate::point::GeoPoint;
use crate::projection::OrthographicProjection;

/// The last segment is stretched by this fraction of the sampling distance so
/// that the final original point is not lost to round-off.
pub const TOLERANCE_FACTOR: f64 = 0.4;

/// Horizontal length (km) below which a segment counts as vertical.
const VERTICAL_SEGMENT_KM: f64 = 1e-5;

/// Allowed relative deviation of resampled spacing from the target.
const SPACING_TOLERANCE: f64 = 0.1;

/// An ordered polyline describing one cross-section of a fault, top first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<GeoPoint>", into = "Vec<GeoPoint>")]
pub struct Profile {
    points: Vec<GeoPoint>,
}

impl TryFrom<Vec<GeoPoint>> for Profile {
    type Error = GeoError;

    fn try_from(points: Vec<GeoPoint>) -> Result<Self> {
        Self::new(points)
    }
}

impl From<Profile> for Vec<GeoPoint> {
    fn from(p: Profile) -> Self {
        p.points
    }
}

impl Profile {
    /// Validate and wrap a polyline: at least two in-range points and no
    /// repeated consecutive point.
    pub fn new(points: Vec<GeoPoint>) -> Result<Self> {
        if points.len() < 2 {
            return Err(GeoError::geometry(format!("a profile needs at least two points, got {}", points.len())));
        }
        for p in &points {
            GeoPoint::checked(p.lon, p.lat, p.depth)?;
        }
        if let Some(i) = points.windows(2).position(|w| w[0] == w[1]) {
            return Err(GeoError::geometry(format!("repeated point at index {}", i + 1)));
        }
        Ok(Self { points })
    }

    /// Wrap points produced internally (resampling, date-line shifting).
    pub(crate) fn from_trusted(points: Vec<GeoPoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Along-profile 3-D length in km.
    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| w[0].distance(&w[1])).sum()
    }

    pub fn average_azimuth(&self) -> f64 {
        average_azimuth(&self.points)
    }

    /// Resample at a fixed 3-D spacing of `sampling_km`.
    ///
    /// The polyline is walked in a local orthographic frame (x, y in km,
    /// depth as z) and a point is emitted every `sampling_km` of arc length.
    /// Every resulting gap must lie within 10% of `sampling_km`.
    pub fn resample(&self, sampling_km: f64) -> Result<Profile> {
        if !sampling_km.is_finite() || sampling_km <= 0.0 {
            return Err(GeoError::ValueRange { what: "profile sampling", value: sampling_km, expected: "> 0 km" });
        }
        let lons: Vec<f64> = self.points.iter().map(|p| p.lon).collect();
        let lats: Vec<f64> = self.points.iter().map(|p| p.lat).collect();
        let proj = OrthographicProjection::from_lons_lats(&lons, &lats)?;
        // Points shifted across the date line must stay shifted.
        let shifted = lons.iter().any(|&l| l > 180.0);

        let mut xyz = Vec::with_capacity(self.points.len());
        for p in &self.points {
            let (x, y) = proj.project(p.lon, p.lat)?;
            xyz.push([x, y, p.depth]);
        }
        extend_last_segment(&mut xyz, TOLERANCE_FACTOR * sampling_km);

        let walked = walk(&xyz, sampling_km);
        if walked.len() < 2 {
            return Err(GeoError::geometry(format!(
                "profile of length {:.3} km is too short for sampling {sampling_km} km",
                self.length()
            )));
        }

        let points: Vec<GeoPoint> = walked
            .into_iter()
            .map(|[x, y, z]| {
                let (mut lon, lat) = proj.unproject(x, y);
                if shifted && lon < 0.0 {
                    lon += 360.0;
                }
                GeoPoint::new(lon, lat, z)
            })
            .collect();

        for (i, w) in points.windows(2).enumerate() {
            let d = w[0].distance(&w[1]);
            if (d - sampling_km).abs() > SPACING_TOLERANCE * sampling_km {
                return Err(GeoError::geometry(format!(
                    "resampled spacing {d:.3} km between points {i} and {} deviates more than 10% from {sampling_km} km",
                    i + 1
                )));
            }
        }
        Ok(Profile::from_trusted(points))
    }
}

/// Stretch the final segment by `ext` km; a vertical segment only in depth.
fn extend_last_segment(xyz: &mut [[f64; 3]], ext: f64) {
    let n = xyz.len();
    if n < 2 {
        return;
    }
    let a = xyz[n - 2];
    let b = &mut xyz[n - 1];
    let (dx, dy, dz) = (b[0] - a[0], b[1] - a[1], b[2] - a[2]);
    let hlen = (dx * dx + dy * dy).sqrt();
    if hlen < VERTICAL_SEGMENT_KM {
        b[2] += if dz < 0.0 { -ext } else { ext };
    } else {
        let len = (hlen * hlen + dz * dz).sqrt();
        b[0] += dx / len * ext;
        b[1] += dy / len * ext;
        b[2] += dz / len * ext;
    }
}

/// Emit the first vertex and then a point every `step` along the polyline.
fn walk(xyz: &[[f64; 3]], step: f64) -> Vec<[f64; 3]> {
    let mut out = vec![xyz[0]];
    let mut acc = 0.0;
    for w in xyz.windows(2) {
        let (a, b) = (w[0], w[1]);
        let d = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
        let seg = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
        if seg == 0.0 {
            continue;
        }
        let mut t = 0.0;
        while acc + (seg - t) >= step {
            t += step - acc;
            acc = 0.0;
            let f = t / seg;
            out.push([a[0] + d[0] * f, a[1] + d[1] * f, a[2] + d[2] * f]);
        }
        acc += seg - t;
    }
    out
}

/// Horizontal-length weighted circular mean of the segment azimuths of a
/// polyline, in [0, 360).
pub fn average_azimuth(points: &[GeoPoint]) -> f64 {
    if points.len() == 2 {
        return points[0].azimuth(&points[1]);
    }
    let (sx, sy) = points.windows(2).fold((0.0, 0.0), |(sx, sy), w| {
        let az = w[0].azimuth(&w[1]).to_radians();
        let d = w[0].horizontal_distance(&w[1]);
        (sx + d * az.sin(), sy + d * az.cos())
    });
    let az = sx.atan2(sy).to_degrees();
    if az < 0.0 { az + 360.0 } else { az }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn profile(pts: &[(f64, f64, f64)]) -> Profile {
        Profile::new(pts.iter().map(|&(lon, lat, d)| GeoPoint::new(lon, lat, d)).collect()).unwrap()
    }

    #[test]
    fn construction_validates() {
        assert!(Profile::new(vec![GeoPoint::new(0.0, 0.0, 0.0)]).is_err());
        let p = GeoPoint::new(0.0, 0.0, 0.0);
        assert!(matches!(Profile::new(vec![p, p]), Err(GeoError::Geometry(_))));
        assert!(matches!(
            Profile::new(vec![p, GeoPoint::new(0.0, 95.0, 1.0)]),
            Err(GeoError::ValueRange { what: "latitude", .. })
        ));
    }

    #[test]
    fn vertical_profile_resamples_on_exact_depths() {
        let p = profile(&[(0.0, 0.0, 0.0), (0.0, 0.001, 15.0)]);
        let r = p.resample(2.5).unwrap();
        assert_eq!(r.len(), 7);
        for (i, q) in r.points().iter().enumerate() {
            assert_abs_diff_eq!(q.depth, 2.5 * i as f64, epsilon = 1e-3);
        }
        assert_abs_diff_eq!(r.points()[0].lon, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn pure_vertical_segment_extends_in_depth() {
        let p = profile(&[(10.0, 10.0, 0.0), (10.0, 10.0, 9.0)]);
        // 9 km at 2 km spacing leaves a 1 km tail, shorter than the
        // 1.2 km the extension can bridge, so the last point is at 8 km.
        let r = p.resample(2.0).unwrap();
        assert_eq!(r.len(), 5);
        assert_abs_diff_eq!(r.points()[4].depth, 8.0, epsilon = 1e-9);
        // With a 1.3 km tail the extension reaches one more point.
        let p = profile(&[(10.0, 10.0, 0.0), (10.0, 10.0, 9.3)]);
        let r = p.resample(2.0).unwrap();
        assert_eq!(r.len(), 6);
        assert_abs_diff_eq!(r.points()[5].depth, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn resampled_spacing_and_idempotence() {
        let p = profile(&[(10.0, 45.0, 1.0), (10.05, 45.0, 6.0), (10.12, 45.0, 20.0)]);
        let r1 = p.resample(1.5).unwrap();
        for w in r1.points().windows(2) {
            let d = w[0].distance(&w[1]);
            assert!((d - 1.5).abs() <= 0.15, "spacing {d}");
        }
        let r2 = r1.resample(1.5).unwrap();
        assert!((r1.len() as i64 - r2.len() as i64).abs() <= 1);
        assert!(r1.points()[0].close_to(&r2.points()[0], 1e-6));
        // Chords across the kink are slightly shorter than the arc they cut.
        let k = r1.len().min(r2.len()) - 1;
        assert!(r1.points()[k].distance(&r2.points()[k]) < 0.05);
    }

    #[test]
    fn too_short_profile_fails() {
        let p = profile(&[(0.0, 0.0, 0.0), (0.0, 0.0, 1.0)]);
        assert!(matches!(p.resample(5.0), Err(GeoError::Geometry(_))));
        assert!(p.resample(0.0).is_err());
    }

    #[test]
    fn sharp_kink_breaks_spacing_tolerance() {
        // Down 3 km and straight back up: chords across the fold are short.
        let p = profile(&[(0.0, 0.0, 0.0), (0.0, 0.0, 3.0), (0.001, 0.0, 0.1)]);
        assert!(matches!(p.resample(2.0), Err(GeoError::Geometry(_))));
    }

    #[test]
    fn average_azimuth_weights_by_length() {
        let pts = [GeoPoint::new(0.0, 0.0, 0.0), GeoPoint::new(0.0, 1.0, 0.0), GeoPoint::new(1.0, 1.0, 0.0)];
        assert_abs_diff_eq!(average_azimuth(&pts), 45.0, epsilon = 0.05);
        assert_abs_diff_eq!(average_azimuth(&pts[..2]), 0.0, epsilon = 1e-9);
        let west = [GeoPoint::new(1.0, 0.0, 0.0), GeoPoint::new(0.0, 0.0, 0.0), GeoPoint::new(-1.0, 0.0, 0.0)];
        assert_abs_diff_eq!(average_azimuth(&west), 270.0, epsilon = 1e-9);
    }

    #[test]
    fn serde_goes_through_validation() {
        let json = r#"[{"lon":0.0,"lat":0.0,"depth":0.0},{"lon":0.0,"lat":0.0,"depth":0.0}]"#;
        assert!(serde_json::from_str::<Profile>(json).is_err());
    }
}

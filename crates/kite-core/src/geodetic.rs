//! Geodetic primitives on a spherical Earth, optimised for large site grids.
//!
//! Every public function takes slices and broadcasts length-1 arguments
//! against the others, so a scalar is simply a one-element slice. Each
//! formula lives in exactly one scalar kernel (`haversine_km`, `bearing_deg`,
//! `forward`, ...) shared with the [`GeoPoint`] methods.
//!
//! Formulas follow the aviation formulary (great-circle distance, initial
//! course, and the "completely general" forward problem).

use std::f64::consts::{FRAC_PI_2, PI};

use crate::error::{GeoError, Result};
use crate::point::GeoPoint;
use crate::sphere::EARTH_RADIUS;

// ── Scalar kernels ───────────────────────────────────────────────────────────

/// Haversine great-circle distance in km.
pub(crate) fn haversine_km(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lon1, lat1, lon2, lat2) = (lon1.to_radians(), lat1.to_radians(), lon2.to_radians(), lat2.to_radians());
    let a = ((lat1 - lat2) / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * ((lon1 - lon2) / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS * a.sqrt().clamp(-1.0, 1.0).asin()
}

/// Initial bearing from point 1 to point 2, degrees clockwise from north, [0, 360).
pub(crate) fn bearing_deg(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lon1, lat1, lon2, lat2) = (lon1.to_radians(), lat1.to_radians(), lon2.to_radians(), lat2.to_radians());
    let cos_lat2 = lat2.cos();
    let true_course = ((lon1 - lon2).sin() * cos_lat2)
        .atan2(lat1.cos() * lat2.sin() - lat1.sin() * cos_lat2 * (lon1 - lon2).cos())
        .to_degrees();
    let az = (360.0 - true_course).rem_euclid(360.0);
    if az >= 360.0 { 0.0 } else { az }
}

/// Forward geodetic problem: the point `dist` km from (lon, lat) along `azimuth`.
/// Output longitude is in [-180, 180).
pub(crate) fn forward(lon: f64, lat: f64, azimuth: f64, dist: f64) -> (f64, f64) {
    forward_angular(lon.to_radians(), lat.to_radians(), (360.0 - azimuth).to_radians(), dist / EARTH_RADIUS)
}

fn forward_angular(rlon: f64, rlat: f64, tc: f64, angle: f64) -> (f64, f64) {
    let (sin_d, cos_d) = angle.sin_cos();
    let (sin_lat, cos_lat) = rlat.sin_cos();
    let sin_lats = (sin_lat * cos_d + cos_lat * sin_d * tc.cos()).clamp(-1.0, 1.0);
    let lat = sin_lats.asin();
    let dlon = (tc.sin() * sin_d * cos_lat).atan2(cos_d - sin_lat * sin_lats);
    let lon = (rlon - dlon + PI).rem_euclid(2.0 * PI) - PI;
    (lon.to_degrees(), lat.to_degrees())
}

/// Signed distance to the great circle through (alon, alat) heading `az`.
/// Positive on the right of the heading, negative on the left.
pub(crate) fn arc_distance_km(alon: f64, alat: f64, az: f64, plon: f64, plat: f64) -> f64 {
    let az_to_target = bearing_deg(alon, alat, plon, plat);
    let dist = haversine_km(alon, alat, plon, plat);
    let t_angle = (az_to_target - az + 360.0).rem_euclid(360.0);
    // Napier's rules on the right spherical triangle formed by the reference
    // point, the target and the target's foot on the arc.
    let arg = (t_angle.to_radians().sin() * (dist / EARTH_RADIUS).sin()).clamp(-1.0, 1.0);
    (FRAC_PI_2 - arg.acos()) * EARTH_RADIUS
}

/// Signed distance to the half great circle starting at (alon, alat) heading `az`.
pub(crate) fn semi_arc_distance_km(alon: f64, alat: f64, az: f64, plon: f64, plat: f64) -> f64 {
    let az_to_target = bearing_deg(alon, alat, plon, plat);
    let delta = (az - az_to_target).to_radians();
    if delta.cos() > 0.0 {
        arc_distance_km(alon, alat, az, plon, plat)
    } else {
        let d = haversine_km(alon, alat, plon, plat);
        if delta.sin() > 0.0 { -d } else { d }
    }
}

/// Signed distance to the finite segment s0 → s1; negative on its left.
pub(crate) fn segment_distance_km(s0: (f64, f64), s1: (f64, f64), plon: f64, plat: f64) -> f64 {
    let seg_az = bearing_deg(s0.0, s0.1, s1.0, s1.1);
    let az1 = bearing_deg(s0.0, s0.1, plon, plat);
    let az2 = bearing_deg(s1.0, s1.1, plon, plat);
    let inside = (seg_az - az1).to_radians().cos() >= 0.0 && (seg_az - az2).to_radians().cos() <= 0.0;
    let d = if inside {
        arc_distance_km(s0.0, s0.1, seg_az, plon, plat).abs()
    } else {
        haversine_km(s0.0, s0.1, plon, plat).min(haversine_km(s1.0, s1.1, plon, plat))
    };
    if (az1 - seg_az).to_radians().sin() < 0.0 { -d } else { d }
}

// ── Broadcasting ─────────────────────────────────────────────────────────────

/// Common length of arguments where length-1 slices broadcast.
fn broadcast_len(context: &'static str, lens: &[usize]) -> Result<usize> {
    let mut n: Option<usize> = None;
    for &len in lens {
        if len == 1 {
            continue;
        }
        match n {
            None => n = Some(len),
            Some(m) if m == len => {}
            Some(m) => return Err(GeoError::ShapeMismatch { context, left: m, right: len }),
        }
    }
    Ok(n.unwrap_or(1))
}

#[inline]
fn at(s: &[f64], i: usize) -> f64 {
    if s.len() == 1 { s[0] } else { s[i] }
}

fn pair_len(context: &'static str, a: &[f64], b: &[f64]) -> Result<usize> {
    if a.len() != b.len() {
        return Err(GeoError::ShapeMismatch { context, left: a.len(), right: b.len() });
    }
    Ok(a.len())
}

// ── Public array interface ──────────────────────────────────────────────────

/// Great-circle distance in km between two collections of points.
pub fn geodetic_distance(lons1: &[f64], lats1: &[f64], lons2: &[f64], lats2: &[f64]) -> Result<Vec<f64>> {
    let n = broadcast_len("geodetic_distance", &[lons1.len(), lats1.len(), lons2.len(), lats2.len()])?;
    Ok((0..n)
        .map(|i| haversine_km(at(lons1, i), at(lats1, i), at(lons2, i), at(lats2, i)))
        .collect())
}

/// Azimuth (degrees clockwise from north, [0, 360)) from points 1 to points 2.
pub fn azimuth(lons1: &[f64], lats1: &[f64], lons2: &[f64], lats2: &[f64]) -> Result<Vec<f64>> {
    let n = broadcast_len("azimuth", &[lons1.len(), lats1.len(), lons2.len(), lats2.len()])?;
    Ok((0..n)
        .map(|i| bearing_deg(at(lons1, i), at(lats1, i), at(lons2, i), at(lats2, i)))
        .collect())
}

/// 3-D distance in km combining the geodetic distance and the depth difference.
pub fn distance(
    lons1: &[f64],
    lats1: &[f64],
    depths1: &[f64],
    lons2: &[f64],
    lats2: &[f64],
    depths2: &[f64],
) -> Result<Vec<f64>> {
    let n = broadcast_len(
        "distance",
        &[lons1.len(), lats1.len(), depths1.len(), lons2.len(), lats2.len(), depths2.len()],
    )?;
    Ok((0..n)
        .map(|i| {
            let h = haversine_km(at(lons1, i), at(lats1, i), at(lons2, i), at(lats2, i));
            let v = at(depths2, i) - at(depths1, i);
            (h * h + v * v).sqrt()
        })
        .collect())
}

/// Forward geodetic transformation: points `distances` km away along `azimuths`.
pub fn point_at(lons: &[f64], lats: &[f64], azimuths: &[f64], distances: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
    let n = broadcast_len("point_at", &[lons.len(), lats.len(), azimuths.len(), distances.len()])?;
    Ok((0..n)
        .map(|i| forward(at(lons, i), at(lats, i), at(azimuths, i), at(distances, i)))
        .unzip())
}

/// `npoints` equally spaced points along the great circle leaving `origin`
/// with `azimuth`, spanning `hdist` km horizontally and `vdist` km in depth.
/// The first point is exactly `origin`.
pub fn npoints_towards(origin: &GeoPoint, azimuth: f64, hdist: f64, vdist: f64, npoints: usize) -> Result<Vec<GeoPoint>> {
    if npoints < 2 {
        return Err(GeoError::ValueRange { what: "npoints", value: npoints as f64, expected: ">= 2" });
    }
    let rlon = origin.lon.to_radians();
    let rlat = origin.lat.to_radians();
    let tc = (360.0 - azimuth).to_radians();
    let step_h = (hdist / EARTH_RADIUS) / (npoints - 1) as f64;
    let step_v = vdist / (npoints - 1) as f64;

    let mut out = Vec::with_capacity(npoints);
    out.push(*origin);
    for i in 1..npoints {
        let (lon, lat) = forward_angular(rlon, rlat, tc, step_h * i as f64);
        out.push(GeoPoint::new(lon, lat, origin.depth + step_v * i as f64));
    }
    Ok(out)
}

/// `npoints` equally spaced points from `p1` to `p2`, both ends exact.
pub fn npoints_between(p1: &GeoPoint, p2: &GeoPoint, npoints: usize) -> Result<Vec<GeoPoint>> {
    let hdist = p1.horizontal_distance(p2);
    let vdist = p2.depth - p1.depth;
    let mut out = npoints_towards(p1, p1.azimuth(p2), hdist, vdist, npoints)?;
    if let Some(last) = out.last_mut() {
        *last = *p2;
    }
    Ok(out)
}

/// Points from `p1` towards `p2` spaced by `length` km.
///
/// The number of intervals is the rounded ratio of the total 3-D distance
/// (itself rounded to 7 decimals so repeated calls on equal distances agree)
/// to `length`; the last point may therefore fall short of or beyond `p2`.
pub fn intervals_between(p1: &GeoPoint, p2: &GeoPoint, length: f64) -> Result<Vec<GeoPoint>> {
    if !(length > 0.0) {
        return Err(GeoError::ValueRange { what: "interval length", value: length, expected: "> 0" });
    }
    let hdist = p1.horizontal_distance(p2);
    let vdist = p2.depth - p1.depth;
    let total = ((hdist * hdist + vdist * vdist).sqrt() * 1e7).round() / 1e7;
    let n_intervals = (total / length).round() as usize;
    if n_intervals == 0 {
        return Ok(vec![*p1]);
    }
    let factor = (length * n_intervals as f64) / total;
    npoints_towards(p1, p1.azimuth(p2), hdist * factor, vdist * factor, n_intervals + 1)
}

/// Signed distance (km) from each point to the great circle through
/// (`alon`, `alat`) with `az`. Points on the right of the heading are
/// positive, points on the left negative.
pub fn distance_to_arc(alon: f64, alat: f64, az: f64, plons: &[f64], plats: &[f64]) -> Result<Vec<f64>> {
    let n = pair_len("distance_to_arc", plons, plats)?;
    Ok((0..n).map(|i| arc_distance_km(alon, alat, az, plons[i], plats[i])).collect())
}

/// Signed distance (km) from each point to the half great circle that starts
/// at (`alon`, `alat`) with `az`. Points behind the origin get the distance
/// to the origin, negative on the left.
pub fn distance_to_semi_arc(alon: f64, alat: f64, az: f64, plons: &[f64], plats: &[f64]) -> Result<Vec<f64>> {
    let n = pair_len("distance_to_semi_arc", plons, plats)?;
    Ok((0..n).map(|i| semi_arc_distance_km(alon, alat, az, plons[i], plats[i])).collect())
}

/// Shortest signed distance (km) from each point to the segment defined by
/// two vertices. Points on the left of the directed segment are negative.
pub fn min_distance_to_segment(seglons: [f64; 2], seglats: [f64; 2], lons: &[f64], lats: &[f64]) -> Result<Vec<f64>> {
    let n = pair_len("min_distance_to_segment", lons, lats)?;
    let s0 = (seglons[0], seglats[0]);
    let s1 = (seglons[1], seglats[1]);
    Ok((0..n).map(|i| segment_distance_km(s0, s1, lons[i], lats[i])).collect())
}

/// For every site, the minimum horizontal distance (km) to any of the points.
pub fn min_geodetic_distance(mlons: &[f64], mlats: &[f64], slons: &[f64], slats: &[f64]) -> Result<Vec<f64>> {
    pair_len("min_geodetic_distance (mesh)", mlons, mlats)?;
    let n = pair_len("min_geodetic_distance (sites)", slons, slats)?;
    Ok((0..n)
        .map(|j| {
            mlons
                .iter()
                .zip(mlats)
                .map(|(&lo, &la)| haversine_km(lo, la, slons[j], slats[j]))
                .fold(f64::INFINITY, f64::min)
        })
        .collect())
}

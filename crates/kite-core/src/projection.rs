//! Spherical bounding boxes, International Date Line helpers and the local
//! orthographic projection used for planar work (profile walking, polygon
//! distances).

use std::f64::consts::FRAC_1_SQRT_2;

use geo::{EuclideanDistance, Line, LineString, Point, Polygon};

use crate::error::{GeoError, Result};
use crate::geodetic::{bearing_deg, forward, haversine_km};
use crate::sphere::EARTH_RADIUS;

// ── Longitudes and the date line ─────────────────────────────────────────────

/// Signed longitudinal extent from `lon1` to `lon2` in (-180, 180].
/// Negative when the shortest way from `lon1` to `lon2` heads west.
pub fn longitudinal_extent(lon1: f64, lon2: f64) -> f64 {
    (lon2 - lon1 + 180.0).rem_euclid(360.0) - 180.0
}

/// True when the span of `lons` crosses the International Date Line: the
/// extremes have opposite signs and are more than 180° apart.
pub fn cross_idl(lons: &[f64]) -> bool {
    let (lo, hi) = lons
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &l| (lo.min(l), hi.max(l)));
    lo * hi < 0.0 && (hi - lo).abs() > 180.0
}

/// Shift negative longitudes by +360° so an IDL-crossing set becomes continuous.
pub fn fix_lons_idl(lons: &mut [f64]) {
    for lon in lons.iter_mut() {
        if *lon < 0.0 {
            *lon += 360.0;
        }
    }
}

/// Bring a longitude shifted by [`fix_lons_idl`] back to [-180, 180].
#[inline]
pub fn normalize_lon(lon: f64) -> f64 {
    if lon > 180.0 { lon - 360.0 } else { lon }
}

// ── Bounding box ─────────────────────────────────────────────────────────────

/// Smallest lon/lat box enclosing a point set on the sphere.
/// `west` may be numerically greater than `east` when the box spans the IDL.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphericalBoundingBox {
    pub west: f64,
    pub east: f64,
    pub north: f64,
    pub south: f64,
}

impl SphericalBoundingBox {
    pub fn from_lons_lats(lons: &[f64], lats: &[f64]) -> Result<Self> {
        if lons.is_empty() || lons.len() != lats.len() {
            return Err(GeoError::ShapeMismatch { context: "bounding box lons/lats", left: lons.len(), right: lats.len() });
        }
        let north = lats.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let south = lats.iter().copied().fold(f64::INFINITY, f64::min);
        let mut west = lons.iter().copied().fold(f64::INFINITY, f64::min);
        let mut east = lons.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        if longitudinal_extent(west, east) < 0.0 {
            // The set wraps around the date line: the western edge is the
            // smallest positive longitude, the eastern the largest negative.
            west = lons.iter().copied().filter(|&l| l > 0.0).fold(f64::INFINITY, f64::min);
            east = lons.iter().copied().filter(|&l| l < 0.0).fold(f64::NEG_INFINITY, f64::max);
            let inside = lons
                .iter()
                .all(|&l| longitudinal_extent(west, l) >= 0.0 && longitudinal_extent(l, east) >= 0.0);
            if !inside {
                return Err(GeoError::geometry("points have a longitudinal extent wider than 180 degrees"));
            }
        }
        Ok(Self { west, east, north, south })
    }

    /// Great-circle midpoint of the box's north-west and south-east corners.
    pub fn middle_point(&self) -> (f64, f64) {
        middle_point(self.west, self.north, self.east, self.south)
    }
}

/// Point half way along the great circle between two points.
pub fn middle_point(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> (f64, f64) {
    if lon1 == lon2 && lat1 == lat2 {
        return (lon1, lat1);
    }
    let dist = haversine_km(lon1, lat1, lon2, lat2);
    let az = bearing_deg(lon1, lat1, lon2, lat2);
    forward(lon1, lat1, az, dist / 2.0)
}

// ── Orthographic projection ─────────────────────────────────────────────────

/// Orthographic projection onto the plane tangent to the sphere at a centre
/// point; x grows east, y north, both in km.
///
/// Only points within 45° of arc from the centre are accepted, which keeps
/// distortion of distances below 30%.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthographicProjection {
    lam0: f64,
    cos_phi0: f64,
    sin_phi0: f64,
}

impl OrthographicProjection {
    pub fn new(center_lon: f64, center_lat: f64) -> Self {
        let phi0 = center_lat.to_radians();
        Self { lam0: center_lon.to_radians(), cos_phi0: phi0.cos(), sin_phi0: phi0.sin() }
    }

    pub fn from_bbox(bb: &SphericalBoundingBox) -> Self {
        let (lon, lat) = bb.middle_point();
        Self::new(lon, lat)
    }

    /// Projection centred on the bounding box of the given points.
    pub fn from_lons_lats(lons: &[f64], lats: &[f64]) -> Result<Self> {
        Ok(Self::from_bbox(&SphericalBoundingBox::from_lons_lats(lons, lats)?))
    }

    pub fn center(&self) -> (f64, f64) {
        (self.lam0.to_degrees(), self.sin_phi0.atan2(self.cos_phi0).to_degrees())
    }

    /// Project one point to (x, y) km.
    pub fn project(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        let phi = lat.to_radians();
        let lam = lon.to_radians() - self.lam0;
        let cos_phi = phi.cos();
        let x = cos_phi * lam.sin();
        let y = self.cos_phi0 * phi.sin() - self.sin_phi0 * cos_phi * lam.cos();
        if (x * x + y * y).sqrt() > FRAC_1_SQRT_2 {
            let (clon, clat) = self.center();
            return Err(GeoError::geometry(format!(
                "point ({lon}, {lat}) is too far from the projection centre ({clon:.4}, {clat:.4})"
            )));
        }
        Ok((x * EARTH_RADIUS, y * EARTH_RADIUS))
    }

    /// Project parallel coordinate slices.
    pub fn project_all(&self, lons: &[f64], lats: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
        if lons.len() != lats.len() {
            return Err(GeoError::ShapeMismatch { context: "projection lons/lats", left: lons.len(), right: lats.len() });
        }
        let mut xs = Vec::with_capacity(lons.len());
        let mut ys = Vec::with_capacity(lons.len());
        for (&lon, &lat) in lons.iter().zip(lats) {
            let (x, y) = self.project(lon, lat)?;
            xs.push(x);
            ys.push(y);
        }
        Ok((xs, ys))
    }

    /// Inverse projection: (x, y) km back to (lon, lat) with lon in [-180, 180].
    pub fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        let (xx, yy) = (x / EARTH_RADIUS, y / EARTH_RADIUS);
        let cos_c = (1.0 - (xx * xx + yy * yy)).max(0.0).sqrt();
        let phi = (cos_c * self.sin_phi0 + yy * self.cos_phi0).clamp(-1.0, 1.0).asin();
        let lam = xx.atan2(self.cos_phi0 * cos_c - yy * self.sin_phi0);
        let mut lon = (self.lam0 + lam).to_degrees();
        if lon > 180.0 {
            lon -= 360.0;
        } else if lon < -180.0 {
            lon += 360.0;
        }
        (lon, phi.to_degrees())
    }
}

// ── Planar polygons ──────────────────────────────────────────────────────────

/// A projected footprint: a polygon, or the segment or point a degenerate
/// ring collapses to.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanarShape {
    Point(Point<f64>),
    Segment(Line<f64>),
    Polygon(Polygon<f64>),
}

impl PlanarShape {
    /// Shape of a ring of (x, y) vertices, closing vertex optional. `None`
    /// for an empty ring.
    pub fn from_ring(ring: &[(f64, f64)]) -> Option<Self> {
        match ring {
            [] => None,
            [a] => Some(Self::Point(Point::from(*a))),
            [a, b] => Some(Self::Segment(Line::new(*a, *b))),
            _ => Some(Self::Polygon(Polygon::new(LineString::from(ring.to_vec()), vec![]))),
        }
    }

    /// 0 inside or on the boundary, otherwise the distance to the nearest edge.
    pub fn distance(&self, x: f64, y: f64) -> f64 {
        let p = Point::new(x, y);
        match self {
            Self::Point(q) => p.euclidean_distance(q),
            Self::Segment(l) => p.euclidean_distance(l),
            Self::Polygon(poly) => p.euclidean_distance(poly),
        }
    }
}

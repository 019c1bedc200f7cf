//! Cartesian geometry on a spherical Earth of radius `EARTH_RADIUS` km.
//! A vector of length 1 is 1 km; depth shrinks the radius.

use std::ops::{Add, Mul, Sub};

use crate::point::GeoPoint;

/// Earth radius in km.
pub const EARTH_RADIUS: f64 = 6371.0;

/// A position or displacement in Earth-centred Cartesian coordinates (km).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Position vector of a geographic point; depth is measured from the surface.
    pub fn from_geo(lon_deg: f64, lat_deg: f64, depth_km: f64) -> Self {
        let lat = lat_deg.to_radians();
        let lon = lon_deg.to_radians();
        let r = EARTH_RADIUS - depth_km;
        Self {
            x: r * lat.cos() * lon.cos(),
            y: r * lat.cos() * lon.sin(),
            z: r * lat.sin(),
        }
    }

    pub fn from_point(p: &GeoPoint) -> Self {
        Self::from_geo(p.lon, p.lat, p.depth)
    }

    /// Inverse of [`Vec3::from_geo`]: (lon, lat, depth).
    pub fn to_geo(self) -> (f64, f64, f64) {
        let r = self.length();
        let lat = (self.z / r).clamp(-1.0, 1.0).asin().to_degrees();
        let lon = self.y.atan2(self.x).to_degrees();
        (lon, lat, EARTH_RADIUS - r)
    }

    pub fn to_point(self) -> GeoPoint {
        let (lon, lat, depth) = self.to_geo();
        GeoPoint::new(lon, lat, depth)
    }

    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, o: Self) -> Self {
        Self {
            x: self.y * o.z - self.z * o.y,
            y: self.z * o.x - self.x * o.z,
            z: self.x * o.y - self.y * o.x,
        }
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == 0.0 {
            return self;
        }
        Self { x: self.x / len, y: self.y / len, z: self.z / len }
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, k: f64) -> Vec3 {
        Vec3::new(self.x * k, self.y * k, self.z * k)
    }
}

/// Area of the triangle with corners `a`, `b`, `c` via Heron's formula.
pub fn triangle_area(a: Vec3, b: Vec3, c: Vec3) -> f64 {
    let e1 = (b - a).length();
    let e2 = (c - b).length();
    let e3 = (a - c).length();
    let s = (e1 + e2 + e3) / 2.0;
    // Round-off can push a degenerate triangle slightly negative.
    (s * (s - e1) * (s - e2) * (s - e3)).max(0.0).sqrt()
}

/// Dominant direction of a 3-D point cloud (unit vector) and its centroid.
///
/// Power iteration on the covariance matrix; returns `None` for fewer than
/// two distinct points.
pub fn principal_axis(points: &[Vec3]) -> Option<(Vec3, Vec3)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let c = points.iter().fold(Vec3::ZERO, |acc, &p| acc + p) * (1.0 / n);

    let mut m = [[0.0_f64; 3]; 3];
    for p in points {
        let d = [p.x - c.x, p.y - c.y, p.z - c.z];
        for i in 0..3 {
            for j in 0..3 {
                m[i][j] += d[i] * d[j];
            }
        }
    }

    // Start from the chord between the extreme points so the iteration
    // never begins orthogonal to the answer.
    let mut v = (points[points.len() - 1] - points[0]).normalize();
    if v.length() == 0.0 {
        v = Vec3::new(1.0, 1.0, 1.0).normalize();
    }
    for _ in 0..64 {
        let w = Vec3::new(
            m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
            m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
            m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
        );
        if w.length() < 1e-18 {
            return None;
        }
        let next = w.normalize();
        let converged = (next - v).length() < 1e-12;
        v = next;
        if converged {
            break;
        }
    }
    Some((c, v))
}

/// Distance from `p` to the infinite line through `origin` along unit `dir`.
pub fn distance_to_line(p: Vec3, origin: Vec3, dir: Vec3) -> f64 {
    let d = p - origin;
    (d - dir * d.dot(dir)).length()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn geo_roundtrip() {
        let triples = [(0.0, 0.0, 0.0), (45.0, 30.0, 10.0), (-120.0, -60.0, 35.5), (179.0, 89.0, -2.0)];
        for (lon, lat, depth) in triples {
            let (lon2, lat2, depth2) = Vec3::from_geo(lon, lat, depth).to_geo();
            assert_abs_diff_eq!(lon, lon2, epsilon = 1e-9);
            assert_abs_diff_eq!(lat, lat2, epsilon = 1e-9);
            assert_abs_diff_eq!(depth, depth2, epsilon = 1e-8);
        }
    }

    #[test]
    fn depth_shrinks_radius() {
        let v = Vec3::from_geo(0.0, 0.0, 10.0);
        assert_abs_diff_eq!(v.length(), EARTH_RADIUS - 10.0, epsilon = 1e-9);
    }

    #[test]
    fn heron_right_triangle() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 0.0, 0.0);
        let c = Vec3::new(0.0, 4.0, 0.0);
        assert_abs_diff_eq!(triangle_area(a, b, c), 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(triangle_area(a, b, b), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn cross_is_right_handed() {
        let (x, y) = (Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(x.cross(y), Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(y.cross(x), Vec3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn principal_axis_of_collinear_points() {
        let pts: Vec<Vec3> = (0..5).map(|i| Vec3::new(1.0, 2.0, i as f64 * 2.0)).collect();
        let (c, dir) = principal_axis(&pts).unwrap();
        assert_abs_diff_eq!(c.z, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(dir.z.abs(), 1.0, epsilon = 1e-9);
        let off = Vec3::new(1.5, 2.0, 3.0);
        assert_abs_diff_eq!(distance_to_line(off, c, dir), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn principal_axis_needs_two_points() {
        assert!(principal_axis(&[Vec3::new(1.0, 0.0, 0.0)]).is_none());
        let same = [Vec3::new(1.0, 0.0, 0.0); 3];
        assert!(principal_axis(&same).is_none());
    }
}

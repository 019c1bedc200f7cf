//! Geometric properties of a built surface and site-to-surface distances.
//!
//! Queries never fail on a built surface. An empty site collection yields an
//! empty vector.

use log::warn;

use super::KiteSurface;
use crate::error::Result;
use crate::geodetic::{arc_distance_km, min_geodetic_distance, segment_distance_km, semi_arc_distance_km};
use crate::mesh::SphericalMesh;
use crate::point::GeoPoint;
use crate::projection::{OrthographicProjection, PlanarShape, SphericalBoundingBox};
use crate::sites::{map_sites, SiteCollection};

/// Dip (degrees) at or above which the surface is treated as vertical.
pub const VERTICAL_DIP_DEG: f64 = 89.5;

/// Half-width (km) of the strip standing in for a vertical surface's outline.
const VERTICAL_STRIP_KM: f64 = 0.1;

/// Sites farther than this (km) from every mesh point keep their coarse
/// Joyner-Boore distance. With mesh spacings up to 10 km the error is below
/// a few hundred metres.
const RJB_REFINE_KM: f64 = 40.0;

/// Horizontal length (km) below which a dip segment counts as vertical.
const VERTICAL_SEGMENT_KM: f64 = 1e-5;

/// Moore neighbourhood as (row, col) steps, clockwise from up-dip.
const NEIGHBOURS: [(isize, isize); 8] = [(-1, 0), (-1, 1), (0, 1), (1, 1), (1, 0), (1, -1), (0, -1), (-1, -1)];

/// Index in [`NEIGHBOURS`] of the step to the west.
const WEST: usize = 6;

impl KiteSurface {
    /// Finite points of the first row holding at least two of them.
    fn top_edge(&self) -> Vec<GeoPoint> {
        let (rows, _) = self.mesh.shape();
        (0..rows)
            .map(|r| self.mesh.row(r).iter().flatten().copied().collect::<Vec<_>>())
            .find(|pts| pts.len() >= 2)
            .unwrap_or_default()
    }

    // ── Shape ────────────────────────────────────────────────────────────────

    /// Mean strike of the top edge, degrees in [0, 360).
    pub fn get_strike(&self) -> f64 {
        self.strike.get_or_compute(|| {
            let top = self.top_edge();
            if top.len() < 2 {
                return f64::NAN;
            }
            let (sx, sy) = top.windows(2).fold((0.0, 0.0), |(sx, sy), w| {
                let az = w[0].azimuth(&w[1]).to_radians();
                (sx + az.sin(), sy + az.cos())
            });
            sx.atan2(sy).to_degrees().rem_euclid(360.0)
        })
    }

    /// Length-weighted mean dip in degrees.
    pub fn get_dip(&self) -> f64 {
        self.dip.get_or_compute(|| {
            let (rows, cols) = self.mesh.shape();
            let (mut sum, mut weight) = (0.0, 0.0);
            for c in 0..cols {
                for r in 0..rows.saturating_sub(1) {
                    let (Some(a), Some(b)) = (self.mesh.get(r, c), self.mesh.get(r + 1, c)) else {
                        continue;
                    };
                    let dh = a.horizontal_distance(&b);
                    let dv = (b.depth - a.depth).abs();
                    let len = (dh * dh + dv * dv).sqrt();
                    let angle = if dh < VERTICAL_SEGMENT_KM { 90.0 } else { dv.atan2(dh).to_degrees() };
                    sum += angle * len;
                    weight += len;
                }
            }
            if weight > 0.0 { sum / weight } else { f64::NAN }
        })
    }

    /// Mean down-dip length of the columns in km.
    pub fn get_width(&self) -> f64 {
        self.width.get_or_compute(|| {
            let (rows, cols) = self.mesh.shape();
            let lengths: Vec<f64> = (0..cols)
                .filter_map(|c| {
                    let segments: Vec<f64> = (0..rows.saturating_sub(1))
                        .filter_map(|r| Some(self.mesh.get(r, c)?.distance(&self.mesh.get(r + 1, c)?)))
                        .collect();
                    (!segments.is_empty()).then(|| segments.iter().sum())
                })
                .collect();
            if lengths.is_empty() {
                f64::NAN
            } else {
                lengths.iter().sum::<f64>() / lengths.len() as f64
            }
        })
    }

    /// Surface area in km², summed over the complete cells.
    pub fn get_area(&self) -> f64 {
        self.mesh.get_cell_dimensions().iter().flatten().flatten().map(|cell| cell.area).sum()
    }

    /// Depth in km of the shallowest point of the top edge.
    pub fn get_top_edge_depth(&self) -> f64 {
        self.mesh.row(0).iter().flatten().map(|p| p.depth).fold(f64::INFINITY, f64::min)
    }

    /// Mesh cell nearest (by index) to the middle of the grid.
    pub fn get_center(&self) -> GeoPoint {
        let (rows, cols) = self.mesh.shape();
        let (r0, c0) = (rows / 2, cols / 2);
        if let Some(p) = self.mesh.get(r0, c0) {
            return p;
        }
        let mut best: Option<(usize, GeoPoint)> = None;
        for r in 0..rows {
            for c in 0..cols {
                let Some(p) = self.mesh.get(r, c) else { continue };
                let d = r.abs_diff(r0).pow(2) + c.abs_diff(c0).pow(2);
                if best.map_or(true, |(bd, _)| d < bd) {
                    best = Some((d, p));
                }
            }
        }
        best.map_or(GeoPoint::new(f64::NAN, f64::NAN, f64::NAN), |(_, p)| p)
    }

    /// Cartesian centroid of the mesh points.
    pub fn get_middle_point(&self) -> GeoPoint {
        self.mesh.get_middle_point().unwrap_or_else(|_| self.get_center())
    }

    pub fn get_bounding_box(&self) -> Result<SphericalBoundingBox> {
        SphericalBoundingBox::from_lons_lats(&self.mesh_lons(), &self.mesh_lats())
    }

    fn mesh_lons(&self) -> Vec<f64> {
        self.mesh.iter_finite().map(|p| p.lon).collect()
    }

    fn mesh_lats(&self) -> Vec<f64> {
        self.mesh.iter_finite().map(|p| p.lat).collect()
    }

    /// Outline of the surface projection as an open ring of (lons, lats).
    pub fn get_external_boundary(&self) -> (Vec<f64>, Vec<f64>) {
        let ring = if self.get_dip() >= VERTICAL_DIP_DEG {
            self.vertical_strip()
        } else {
            self.perimeter()
        };
        ring.into_iter().map(|p| (p.lon, p.lat)).unzip()
    }

    /// Thin strip either side of the top edge.
    fn vertical_strip(&self) -> Vec<GeoPoint> {
        let top = self.top_edge();
        let strike = self.get_strike();
        let right = top.iter().map(|p| p.point_at(VERTICAL_STRIP_KM, 0.0, strike + 90.0));
        let left: Vec<GeoPoint> = top.iter().map(|p| p.point_at(VERTICAL_STRIP_KM, 0.0, strike - 90.0)).collect();
        right.chain(left.into_iter().rev()).collect()
    }

    /// Outer contour of the present cells, clockwise from the top-left one.
    fn perimeter(&self) -> Vec<GeoPoint> {
        outline(&self.mesh).into_iter().filter_map(|(r, c)| self.mesh.get(r, c)).collect()
    }

    /// Pieces whose union is the surface projection: the present corners of
    /// every cell, or the strip around a vertical surface.
    fn footprints(&self) -> Vec<Vec<GeoPoint>> {
        if self.get_dip() >= VERTICAL_DIP_DEG {
            return vec![self.vertical_strip()];
        }
        let (rows, cols) = self.mesh.shape();
        let m = &self.mesh;
        (0..rows.saturating_sub(1))
            .flat_map(|r| (0..cols.saturating_sub(1)).map(move |c| (r, c)))
            .map(|(r, c)| {
                [m.get(r, c), m.get(r, c + 1), m.get(r + 1, c + 1), m.get(r + 1, c)]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
            })
            .filter(|piece| !piece.is_empty())
            .collect()
    }

    // ── Distances ────────────────────────────────────────────────────────────

    /// Closest distance (km) from each site to the surface (Rrup).
    pub fn get_min_distance(&self, sites: &SiteCollection) -> Vec<f64> {
        self.mesh.get_min_distance(sites)
    }

    /// The mesh point closest to each site.
    pub fn get_closest_points(&self, sites: &SiteCollection) -> Vec<GeoPoint> {
        let points = self.mesh.cartesian_points();
        let fallback = self.get_center();
        map_sites(sites.len(), |i| {
            SphericalMesh::nearest(&points, &sites.get(i)).map_or(fallback, |(p, _)| p)
        })
    }

    /// Joyner-Boore distance (km): distance to the surface projection, 0 for
    /// sites above the surface.
    pub fn get_joyner_boore_distance(&self, sites: &SiteCollection) -> Vec<f64> {
        let coarse = match min_geodetic_distance(&self.mesh_lons(), &self.mesh_lats(), sites.lons(), sites.lats()) {
            Ok(d) => d,
            Err(e) => {
                warn!("no Joyner-Boore distances: {e}");
                return vec![f64::NAN; sites.len()];
            }
        };
        if coarse.iter().all(|&d| d >= RJB_REFINE_KM) {
            return coarse;
        }

        let (proj, shapes) = match self.projected_footprints() {
            Ok(v) => v,
            Err(e) => {
                warn!("keeping coarse Joyner-Boore distances: {e}");
                return coarse;
            }
        };
        map_sites(sites.len(), |i| {
            if coarse[i] >= RJB_REFINE_KM {
                return coarse[i];
            }
            match proj.project(sites.lons()[i], sites.lats()[i]) {
                Ok((x, y)) => shapes.iter().map(|s| s.distance(x, y)).fold(f64::INFINITY, f64::min),
                Err(_) => coarse[i],
            }
        })
    }

    /// Footprints on a projection centred on the surface.
    fn projected_footprints(&self) -> Result<(OrthographicProjection, Vec<PlanarShape>)> {
        let pieces = self.footprints();
        let lons: Vec<f64> = pieces.iter().flatten().map(|p| p.lon).collect();
        let lats: Vec<f64> = pieces.iter().flatten().map(|p| p.lat).collect();
        let proj = OrthographicProjection::from_lons_lats(&lons, &lats)?;
        let mut shapes = Vec::with_capacity(pieces.len());
        for piece in &pieces {
            let ring = piece.iter().map(|p| proj.project(p.lon, p.lat)).collect::<Result<Vec<_>>>()?;
            shapes.extend(PlanarShape::from_ring(&ring));
        }
        Ok((proj, shapes))
    }

    /// Signed distance (km) to the top edge extended along strike (Rx):
    /// positive on the hanging-wall side, right of the strike.
    pub fn get_rx_distance(&self, sites: &SiteCollection) -> Vec<f64> {
        let top = self.top_edge();
        let nseg = top.len().saturating_sub(1);
        map_sites(sites.len(), |i| {
            let (lon, lat) = (sites.lons()[i], sites.lats()[i]);
            let mut best = f64::NAN;
            for s in 0..nseg {
                let (p1, p2) = (top[s], top[s + 1]);
                let d = if nseg == 1 {
                    arc_distance_km(p1.lon, p1.lat, p1.azimuth(&p2), lon, lat)
                } else if s == 0 {
                    // The first segment extends backwards from its end.
                    -semi_arc_distance_km(p2.lon, p2.lat, p2.azimuth(&p1), lon, lat)
                } else if s == nseg - 1 {
                    semi_arc_distance_km(p1.lon, p1.lat, p1.azimuth(&p2), lon, lat)
                } else {
                    segment_distance_km((p1.lon, p1.lat), (p2.lon, p2.lat), lon, lat)
                };
                if best.is_nan() || d.abs() < best.abs() {
                    best = d;
                }
            }
            best
        })
    }

    /// Distance (km) along strike from the ends of the top edge (Ry0); 0 for
    /// sites between the lines through both ends perpendicular to strike.
    pub fn get_ry0_distance(&self, sites: &SiteCollection) -> Vec<f64> {
        let top = self.top_edge();
        let (Some(first), Some(last)) = (top.first().copied(), top.last().copied()) else {
            return vec![f64::NAN; sites.len()];
        };
        let az = (self.get_strike() + 90.0).rem_euclid(360.0);
        map_sites(sites.len(), |i| {
            let (lon, lat) = (sites.lons()[i], sites.lats()[i]);
            let d1 = arc_distance_km(first.lon, first.lat, az, lon, lat);
            let d2 = arc_distance_km(last.lon, last.lat, az, lon, lat);
            if d1.signum() == d2.signum() { d1.abs().min(d2.abs()) } else { 0.0 }
        })
    }
}

/// Moore-neighbour trace of the outer contour of the present cells, as
/// (row, col) indices clockwise from the first present cell in row-major
/// order. Parts not 8-connected to that cell are left out. A one-cell-wide
/// arm is walked out and back, so the ring touches itself there but never
/// crosses.
fn outline(mesh: &SphericalMesh) -> Vec<(usize, usize)> {
    let (rows, cols) = mesh.shape();
    let Some(start) = (0..rows * cols).map(|i| (i / cols, i % cols)).find(|&(r, c)| mesh.get(r, c).is_some()) else {
        return Vec::new();
    };
    let present = |(r, c): (isize, isize)| r >= 0 && c >= 0 && mesh.get(r as usize, c as usize).is_some();
    let start = (start.0 as isize, start.1 as isize);

    // Nothing lies west of or above the start, so it is entered from the west.
    let Some(first) = moore_step(start, WEST, present) else {
        return vec![(start.0 as usize, start.1 as usize)];
    };
    let mut ring = vec![start, first.0];
    let mut state = first;
    for _ in 0..4 * rows * cols {
        let Some(next) = moore_step(state.0, state.1, present) else { break };
        if state.0 == start && next == first {
            break;
        }
        ring.push(next.0);
        state = next;
    }
    if ring.last() == Some(&start) {
        ring.pop();
    }
    ring.into_iter().map(|(r, c)| (r as usize, c as usize)).collect()
}

/// From cell `at`, entered with the empty neighbour `back` behind it, the
/// next present neighbour clockwise and the new `back` relative to it.
fn moore_step(
    at: (isize, isize),
    back: usize,
    present: impl Fn((isize, isize)) -> bool,
) -> Option<((isize, isize), usize)> {
    let step = |d: usize| (at.0 + NEIGHBOURS[d].0, at.1 + NEIGHBOURS[d].1);
    for i in 1..=8 {
        let next = step((back + i) % 8);
        if present(next) {
            let behind = step((back + i - 1) % 8);
            let rel = (behind.0 - next.0, behind.1 - next.1);
            let back = NEIGHBOURS.iter().position(|&n| n == rel)?;
            return Some((next, back));
        }
    }
    None
}

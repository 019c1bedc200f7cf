use serde::{Deserialize, Serialize};

use crate::error::{GeoError, Result};
use crate::point::GeoPoint;
use crate::sites::{map_sites, SiteCollection};
use crate::sphere::{triangle_area, Vec3};

/// Largest row or column count an f32 header stores exactly.
const MAX_ENCODED_DIM: f32 = 16_777_216.0;

/// `rows × cols`, failing instead of overflowing.
fn cell_count(rows: usize, cols: usize) -> Result<usize> {
    rows.checked_mul(cols).ok_or(GeoError::ValueRange {
        what: "mesh cell count",
        value: rows as f64 * cols as f64,
        expected: "rows × cols addressable in memory",
    })
}

/// Geometry of one cell, split along its bottom-left to top-right diagonal
/// into two triangles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellDimensions {
    /// Area-weighted centroid of the two triangles.
    pub centroid: GeoPoint,
    /// Size along the rows (km), top and bottom edges weighted by area.
    pub length: f64,
    /// Size along the columns (km), left and right edges weighted by area.
    pub width: f64,
    /// km²
    pub area: f64,
}

/// A rows × cols grid of optional points, stored row-major.
/// Row 0 is the shallowest edge of a fault surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SphericalMesh {
    cells: Vec<Option<GeoPoint>>,
    rows: usize,
    cols: usize,
}

impl SphericalMesh {
    /// Build from row vectors; every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<Option<GeoPoint>>>) -> Result<Self> {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, Vec::len);
        let mut cells = Vec::with_capacity(nrows * ncols);
        for row in rows {
            if row.len() != ncols {
                return Err(GeoError::ShapeMismatch { context: "mesh rows", left: ncols, right: row.len() });
            }
            cells.extend(row);
        }
        Ok(Self { cells, rows: nrows, cols: ncols })
    }

    /// Build from row-major coordinate arrays. A NaN in any component marks
    /// the cell as empty.
    pub fn from_arrays(lons: &[f64], lats: &[f64], depths: &[f64], rows: usize, cols: usize) -> Result<Self> {
        let n = cell_count(rows, cols)?;
        for (context, len) in [("mesh lons", lons.len()), ("mesh lats", lats.len()), ("mesh depths", depths.len())] {
            if len != n {
                return Err(GeoError::ShapeMismatch { context, left: n, right: len });
            }
        }
        let cells = (0..n)
            .map(|i| {
                let (lon, lat, depth) = (lons[i], lats[i], depths[i]);
                if lon.is_nan() || lat.is_nan() || depth.is_nan() {
                    None
                } else {
                    Some(GeoPoint::new(lon, lat, depth))
                }
            })
            .collect();
        Ok(Self { cells, rows, cols })
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<GeoPoint> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells[row * self.cols + col]
    }

    pub fn row(&self, row: usize) -> &[Option<GeoPoint>] {
        &self.cells[row * self.cols..(row + 1) * self.cols]
    }

    pub fn column(&self, col: usize) -> Vec<Option<GeoPoint>> {
        (0..self.rows).map(|r| self.get(r, col)).collect()
    }

    pub fn iter_finite(&self) -> impl Iterator<Item = GeoPoint> + '_ {
        self.cells.iter().flatten().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    /// Copy of rows `row_start..row_end`; `slice(0, 1)` is the top edge.
    pub fn slice(&self, row_start: usize, row_end: usize) -> SphericalMesh {
        let end = row_end.min(self.rows);
        let start = row_start.min(end);
        Self {
            cells: self.cells[start * self.cols..end * self.cols].to_vec(),
            rows: end - start,
            cols: self.cols,
        }
    }

    /// Mirror the mesh left to right.
    pub fn flip_columns(mut self) -> Self {
        if self.cols > 0 {
            for row in self.cells.chunks_mut(self.cols) {
                row.reverse();
            }
        }
        self
    }

    /// Drop rows and columns that contain no point at all.
    pub fn strip_empty(self) -> Self {
        let keep_rows: Vec<usize> = (0..self.rows).filter(|&r| self.row(r).iter().any(Option::is_some)).collect();
        let keep_cols: Vec<usize> = (0..self.cols)
            .filter(|&c| (0..self.rows).any(|r| self.get(r, c).is_some()))
            .collect();
        if keep_rows.len() == self.rows && keep_cols.len() == self.cols {
            return self;
        }
        let cells = keep_rows
            .iter()
            .flat_map(|&r| keep_cols.iter().map(move |&c| (r, c)))
            .map(|(r, c)| self.get(r, c))
            .collect();
        Self { cells, rows: keep_rows.len(), cols: keep_cols.len() }
    }

    /// Apply `f` to every point, keeping empty cells empty.
    pub(crate) fn map_points(mut self, f: impl Fn(GeoPoint) -> GeoPoint) -> Self {
        for cell in self.cells.iter_mut().flatten() {
            *cell = f(*cell);
        }
        self
    }

    /// Row-major longitudes, NaN for empty cells.
    pub fn lons(&self) -> Vec<f64> {
        self.cells.iter().map(|c| c.map_or(f64::NAN, |p| p.lon)).collect()
    }

    pub fn lats(&self) -> Vec<f64> {
        self.cells.iter().map(|c| c.map_or(f64::NAN, |p| p.lat)).collect()
    }

    pub fn depths(&self) -> Vec<f64> {
        self.cells.iter().map(|c| c.map_or(f64::NAN, |p| p.depth)).collect()
    }

    /// Centroid of all points in Earth-centred Cartesian space, back on the
    /// sphere with the matching depth.
    pub fn get_middle_point(&self) -> Result<GeoPoint> {
        let (sum, n) = self
            .iter_finite()
            .fold((Vec3::ZERO, 0usize), |(acc, n), p| (acc + Vec3::from_point(&p), n + 1));
        if n == 0 {
            return Err(GeoError::geometry("mesh has no points"));
        }
        Ok((sum * (1.0 / n as f64)).to_point())
    }

    /// Nearest mesh point to `site` and the 3-D distance to it.
    pub(crate) fn nearest(points: &[(Vec3, GeoPoint)], site: &GeoPoint) -> Option<(GeoPoint, f64)> {
        let target = Vec3::from_point(site);
        points
            .iter()
            .map(|(v, p)| (*p, (*v - target).length()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    pub(crate) fn cartesian_points(&self) -> Vec<(Vec3, GeoPoint)> {
        self.iter_finite().map(|p| (Vec3::from_point(&p), p)).collect()
    }

    /// Per site, the minimum 3-D distance (km) to any mesh point.
    /// NaN for every site when the mesh has no points.
    pub fn get_min_distance(&self, sites: &SiteCollection) -> Vec<f64> {
        let points = self.cartesian_points();
        map_sites(sites.len(), |i| Self::nearest(&points, &sites.get(i)).map_or(f64::NAN, |(_, d)| d))
    }

    /// Per site, the mesh point closest in 3-D.
    pub fn get_closest_points(&self, sites: &SiteCollection) -> Result<Vec<GeoPoint>> {
        let points = self.cartesian_points();
        if points.is_empty() {
            return Err(GeoError::geometry("mesh has no points"));
        }
        Ok(map_sites(sites.len(), |i| {
            Self::nearest(&points, &sites.get(i)).map_or(points[0].1, |(p, _)| p)
        }))
    }

    // ── Cell geometry ────────────────────────────────────────────────────────

    /// Corners (tl, tr, bl, br) of cell (`row`, `col`) in Cartesian km, if all
    /// four are present.
    fn cell_corners(&self, row: usize, col: usize) -> Option<[Vec3; 4]> {
        let corners = [
            self.get(row, col)?,
            self.get(row, col + 1)?,
            self.get(row + 1, col)?,
            self.get(row + 1, col + 1)?,
        ];
        Some(corners.map(|p| Vec3::from_point(&p)))
    }

    /// Centroid, length, width and area of every cell, `(rows - 1)` lists of
    /// `(cols - 1)` entries. Cells with a missing corner are `None`.
    pub fn get_cell_dimensions(&self) -> Vec<Vec<Option<CellDimensions>>> {
        (0..self.rows.saturating_sub(1))
            .map(|r| {
                (0..self.cols.saturating_sub(1))
                    .map(|c| self.cell_corners(r, c).map(cell_dimensions))
                    .collect()
            })
            .collect()
    }

    /// Area-weighted mean inclination in [0, 90] and azimuth in [0, 360) of
    /// the triangulated surface, in degrees. The azimuth follows the rows and
    /// flips by 180° when needed to keep the inclination below 90°.
    pub fn get_mean_inclination_and_azimuth(&self) -> Result<(f64, f64)> {
        if self.rows < 2 || self.cols < 2 {
            return Err(GeoError::geometry(format!(
                "inclination needs at least two rows and two columns, got ({}, {})",
                self.rows, self.cols
            )));
        }
        for c in 0..self.cols {
            for r in 0..self.rows - 1 {
                if let (Some(a), Some(b)) = (self.get(r, c), self.get(r + 1, c)) {
                    if b.depth < a.depth {
                        return Err(GeoError::geometry(format!("row {} is shallower than row {r} in column {c}", r + 1)));
                    }
                }
            }
        }

        let (mut incl_x, mut incl_y) = (0.0, 0.0);
        let (mut az_x, mut az_y) = (0.0, 0.0);
        for r in 0..self.rows - 1 {
            for c in 0..self.cols - 1 {
                let Some([tl, tr, bl, br]) = self.cell_corners(r, c) else { continue };
                // Each triangle: along-row edge, up-dip edge, reference corner.
                for (along, updip, at) in [(tr - tl, tl - bl, tl), (br - bl, tr - br, br)] {
                    let cross = along.cross(updip);
                    let area = cross.length() / 2.0;
                    if area == 0.0 {
                        continue;
                    }
                    let normal = cross.normalize();
                    let up = at.normalize();
                    let cos_incl = up.dot(normal).clamp(-1.0, 1.0);
                    incl_x += area * cos_incl;
                    incl_y += area * (1.0 - cos_incl * cos_incl).sqrt();

                    let east = (at + Vec3::new(0.0, 0.0, 1.0)).cross(at).normalize();
                    let north = at.cross(east).normalize();
                    let dir = along.normalize();
                    let cos_az = dir.dot(north).clamp(-1.0, 1.0);
                    let sign = if dir.dot(east) < 0.0 { -1.0 } else { 1.0 };
                    az_x += area * cos_az;
                    az_y += area * (1.0 - cos_az * cos_az).sqrt() * sign;
                }
            }
        }
        if incl_x == 0.0 && incl_y == 0.0 {
            return Err(GeoError::geometry("mesh has no complete cell"));
        }

        let inclination = incl_y.atan2(incl_x).to_degrees();
        let azimuth = az_y.atan2(az_x).to_degrees().rem_euclid(360.0);
        if inclination > 90.0 {
            Ok((180.0 - inclination, (azimuth + 180.0).rem_euclid(360.0)))
        } else {
            Ok((inclination, azimuth))
        }
    }

    // ── Flat encoding ────────────────────────────────────────────────────────

    /// `[rows, cols, lon, lat, depth, …]` row-major in f32, empty cells as NaN.
    pub fn encode(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(2 + 3 * self.cells.len());
        out.push(self.rows as f32);
        out.push(self.cols as f32);
        for cell in &self.cells {
            match cell {
                Some(p) => out.extend([p.lon as f32, p.lat as f32, p.depth as f32]),
                None => out.extend([f32::NAN; 3]),
            }
        }
        out
    }

    /// Inverse of [`SphericalMesh::encode`]; values widen to f64.
    pub fn decode(data: &[f32]) -> Result<Self> {
        if data.len() < 2 {
            return Err(GeoError::ShapeMismatch { context: "encoded mesh header", left: 2, right: data.len() });
        }
        for dim in [data[0], data[1]] {
            if !(dim >= 0.0 && dim <= MAX_ENCODED_DIM && dim.fract() == 0.0) {
                return Err(GeoError::ValueRange {
                    what: "encoded mesh shape",
                    value: dim as f64,
                    expected: "an integer in [0, 2^24]",
                });
            }
        }
        let (rows, cols) = (data[0] as usize, data[1] as usize);
        let body = &data[2..];
        let expected = cell_count(rows, cols)?.checked_mul(3).ok_or(GeoError::ValueRange {
            what: "encoded mesh shape",
            value: rows as f64 * cols as f64,
            expected: "rows × cols addressable in memory",
        })?;
        if body.len() != expected {
            return Err(GeoError::ShapeMismatch { context: "encoded mesh body", left: expected, right: body.len() });
        }
        let cells = body
            .chunks_exact(3)
            .map(|v| {
                if v.iter().any(|x| x.is_nan()) {
                    None
                } else {
                    Some(GeoPoint::new(v[0] as f64, v[1] as f64, v[2] as f64))
                }
            })
            .collect();
        Ok(Self { cells, rows, cols })
    }
}

fn cell_dimensions([tl, tr, bl, br]: [Vec3; 4]) -> CellDimensions {
    let tl_area = triangle_area(tl, tr, bl);
    let br_area = triangle_area(tr, br, bl);
    let area = tl_area + br_area;
    let (top, bottom) = ((tr - tl).length(), (br - bl).length());
    let (left, right) = ((tl - bl).length(), (tr - br).length());
    let tl_center = (tl + tr + bl) * (1.0 / 3.0);
    let br_center = (tr + bl + br) * (1.0 / 3.0);
    if area > 0.0 {
        CellDimensions {
            centroid: ((tl_center * tl_area + br_center * br_area) * (1.0 / area)).to_point(),
            length: (top * tl_area + bottom * br_area) / area,
            width: (left * tl_area + right * br_area) / area,
            area,
        }
    } else {
        CellDimensions {
            centroid: ((tl_center + br_center) * 0.5).to_point(),
            length: (top + bottom) / 2.0,
            width: (left + right) / 2.0,
            area,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn p(lon: f64, lat: f64, depth: f64) -> Option<GeoPoint> {
        Some(GeoPoint::new(lon, lat, depth))
    }

    fn sample() -> SphericalMesh {
        SphericalMesh::from_rows(vec![
            vec![None, None, None],
            vec![p(0.0, 0.0, 0.0), p(0.1, 0.0, 0.0), None],
            vec![p(0.0, 0.0, 5.0), p(0.1, 0.0, 5.0), None],
        ])
        .unwrap()
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = SphericalMesh::from_rows(vec![vec![None, None], vec![None]]);
        assert!(matches!(err, Err(GeoError::ShapeMismatch { left: 2, right: 1, .. })));
        assert!(SphericalMesh::from_arrays(&[0.0; 4], &[0.0; 4], &[0.0; 3], 2, 2).is_err());
    }

    #[test]
    fn from_arrays_maps_nan_to_empty() {
        let m = SphericalMesh::from_arrays(&[0.0, f64::NAN], &[1.0, 1.0], &[2.0, 2.0], 1, 2).unwrap();
        assert_eq!(m.get(0, 0), p(0.0, 1.0, 2.0));
        assert_eq!(m.get(0, 1), None);
        assert!(m.lons()[1].is_nan());
    }

    #[test]
    fn strip_and_flip() {
        let m = sample().strip_empty();
        assert_eq!(m.shape(), (2, 2));
        assert_eq!(m.get(0, 1), p(0.1, 0.0, 0.0));
        let f = m.flip_columns();
        assert_eq!(f.get(0, 0), p(0.1, 0.0, 0.0));
        assert_eq!(f.column(1), vec![p(0.0, 0.0, 0.0), p(0.0, 0.0, 5.0)]);
    }

    #[test]
    fn slice_top_edge() {
        let m = sample().strip_empty();
        let top = m.slice(0, 1);
        assert_eq!(top.shape(), (1, 2));
        assert!(top.iter_finite().all(|q| q.depth == 0.0));
        assert_eq!(m.slice(1, 10).shape(), (1, 2));
    }

    #[test]
    fn middle_point_is_depth_aware_centroid() {
        let m = sample();
        let mid = m.get_middle_point().unwrap();
        assert_abs_diff_eq!(mid.lon, 0.05, epsilon = 1e-6);
        assert_abs_diff_eq!(mid.lat, 0.0, epsilon = 1e-9);
        // Chord sag across 0.1° adds a few metres.
        assert_abs_diff_eq!(mid.depth, 2.5, epsilon = 1e-2);
        let empty = SphericalMesh::from_rows(vec![vec![None]]).unwrap();
        assert!(empty.get_middle_point().is_err());
    }

    #[test]
    fn min_distance_and_closest_points() {
        let m = sample();
        let sites = SiteCollection::new(vec![0.0, 0.1], vec![0.0, 0.0], vec![0.0, 6.0]).unwrap();
        let d = m.get_min_distance(&sites);
        assert_abs_diff_eq!(d[0], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(d[1], 1.0, epsilon = 1e-6);
        let closest = m.get_closest_points(&sites).unwrap();
        assert_eq!(Some(closest[1]), p(0.1, 0.0, 5.0));
        assert!(m.get_min_distance(&SiteCollection::default()).is_empty());
    }

    #[test]
    fn encoding_layout_and_stability() {
        let m = sample();
        let e = m.encode();
        assert_eq!(e.len(), 2 + 3 * 9);
        assert_eq!(&e[..2], &[3.0, 3.0]);
        assert!(e[2].is_nan());
        let back = SphericalMesh::decode(&e).unwrap();
        assert_eq!(back.shape(), (3, 3));
        let again = back.encode();
        assert_eq!(e.len(), again.len());
        assert!(e.iter().zip(&again).all(|(a, b)| a.to_bits() == b.to_bits()));
        assert!(SphericalMesh::decode(&[2.0, 2.0, 1.0]).is_err());
        assert!(SphericalMesh::decode(&[-1.0, 2.0]).is_err());
    }

    #[test]
    fn oversized_headers_are_rejected() {
        assert!(matches!(
            SphericalMesh::decode(&[1e30, 1e30, 0.0, 0.0, 0.0]),
            Err(GeoError::ValueRange { what: "encoded mesh shape", .. })
        ));
        assert!(SphericalMesh::decode(&[f32::INFINITY, 1.0]).is_err());
        assert!(SphericalMesh::decode(&[f32::NAN, 1.0]).is_err());
        // Both dimensions fit a header, but not a buffer.
        assert!(SphericalMesh::decode(&[16_777_216.0, 16_777_216.0, 0.0]).is_err());
        assert!(matches!(
            SphericalMesh::from_arrays(&[], &[], &[], usize::MAX, 2),
            Err(GeoError::ValueRange { what: "mesh cell count", .. })
        ));
    }

    /// A 10 km deep vertical cell under 0.1° of the equator.
    fn vertical_cell() -> SphericalMesh {
        SphericalMesh::from_rows(vec![
            vec![p(0.0, 0.0, 0.0), p(0.1, 0.0, 0.0)],
            vec![p(0.0, 0.0, 10.0), p(0.1, 0.0, 10.0)],
        ])
        .unwrap()
    }

    #[test]
    fn cell_dimensions_of_a_vertical_cell() {
        let dims = vertical_cell().get_cell_dimensions();
        assert_eq!((dims.len(), dims[0].len()), (1, 1));
        let cell = dims[0][0].unwrap();
        // Chords of 0.1° at the surface and 10 km down, weighted by area.
        assert_abs_diff_eq!(cell.length, 11.111, epsilon = 0.01);
        assert_abs_diff_eq!(cell.width, 10.0, epsilon = 1e-6);
        assert_abs_diff_eq!(cell.area, 111.11, epsilon = 0.05);
        assert_abs_diff_eq!(cell.centroid.lon, 0.05, epsilon = 1e-3);
        assert_abs_diff_eq!(cell.centroid.depth, 5.0, epsilon = 0.02);
    }

    #[test]
    fn incomplete_cells_have_no_dimensions() {
        let dims = sample().get_cell_dimensions();
        assert_eq!((dims.len(), dims[0].len()), (2, 2));
        assert!(dims[0].iter().all(Option::is_none));
        assert!(dims[1][0].is_some());
        assert!(dims[1][1].is_none());
    }

    #[test]
    fn mean_inclination_and_azimuth() {
        let (incl, az) = vertical_cell().get_mean_inclination_and_azimuth().unwrap();
        assert_abs_diff_eq!(incl, 90.0, epsilon = 1e-6);
        assert_abs_diff_eq!(az, 90.0, epsilon = 1e-6);

        // 10 km down and 10 km south of an eastward top edge.
        let south = 10.0 / 111.194_926_6;
        let dipping = SphericalMesh::from_rows(vec![
            vec![p(0.0, 0.0, 0.0), p(0.1, 0.0, 0.0)],
            vec![p(0.0, -south, 10.0), p(0.1, -south, 10.0)],
        ])
        .unwrap();
        let (incl, az) = dipping.get_mean_inclination_and_azimuth().unwrap();
        assert_abs_diff_eq!(incl, 45.0, epsilon = 0.2);
        assert_abs_diff_eq!(az, 90.0, epsilon = 0.01);

        // Reversed columns: the edge runs west and the surface still dips south.
        let (incl, az) = dipping.flip_columns().get_mean_inclination_and_azimuth().unwrap();
        assert_abs_diff_eq!(incl, 45.0, epsilon = 0.2);
        assert_abs_diff_eq!(az, 90.0, epsilon = 0.01);
    }

    #[test]
    fn inclination_needs_a_downward_mesh() {
        let upside_down = SphericalMesh::from_rows(vec![
            vec![p(0.0, 0.0, 10.0), p(0.1, 0.0, 10.0)],
            vec![p(0.0, 0.0, 0.0), p(0.1, 0.0, 0.0)],
        ])
        .unwrap();
        assert!(upside_down.get_mean_inclination_and_azimuth().is_err());
        assert!(vertical_cell().slice(0, 1).get_mean_inclination_and_azimuth().is_err());
    }
}

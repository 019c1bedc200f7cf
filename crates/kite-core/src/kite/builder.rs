//! Kite surface meshing: profiles in, oriented `SphericalMesh` out.
//!
//! Pipeline, each stage a function below:
//!   1. resample every profile at the dip-direction spacing, optionally
//!      aligning them vertically;
//!   2. pick the reference (longest) profile;
//!   3. stitch from the reference towards the last profile, then towards the
//!      first, placing points at the strike-direction spacing;
//!   4. merge both halves and drop isolated cells;
//!   5. strip empty rows/columns, undo the date-line shift.
//!
//! Orientation (right-hand rule) and the final invariant checks live in
//! [`finalize`], which is shared with surfaces built from a ready mesh.

use log::{debug, warn};

use crate::config::MeshParams;
use crate::error::{GeoError, Result};
use crate::mesh::SphericalMesh;
use crate::point::GeoPoint;
use crate::profile::Profile;
use crate::projection::{cross_idl, fix_lons_idl, normalize_lon};
use crate::sphere::{distance_to_line, principal_axis, Vec3};

/// Half-width of the shift search when aligning long profiles.
pub const ALIGN_WINDOW: usize = 5;

/// Dip azimuths closer than this to `strike - 90` mean the surface dips left.
const RIGHT_HAND_TOLERANCE_DEG: f64 = 40.0;

/// One profile laid out on the global row grid; `None` above and below it.
type Column = Vec<Option<GeoPoint>>;

// ── Entry points ─────────────────────────────────────────────────────────────

/// Run the meshing pipeline up to a cleaned, unoriented mesh.
pub fn build_mesh(profiles: &[Profile], params: &MeshParams) -> Result<SphericalMesh> {
    params.validate()?;
    if profiles.len() < 2 {
        return Err(GeoError::geometry(format!("at least two profiles are needed, got {}", profiles.len())));
    }

    let lons: Vec<f64> = profiles.iter().flat_map(|p| p.points().iter().map(|q| q.lon)).collect();
    let idl = params.idl || cross_idl(&lons);
    if idl && !params.idl {
        debug!("profiles cross the date line, shifting longitudes");
    }

    let shifted: Vec<Profile>;
    let profiles = if idl {
        shifted = profiles.iter().map(shift_idl).collect();
        &shifted[..]
    } else {
        profiles
    };

    let resampled = profiles
        .iter()
        .enumerate()
        .map(|(i, p)| p.resample(params.profile_sampling_km).map_err(|e| e.in_profile(i)))
        .collect::<Result<Vec<_>>>()?;
    debug!(
        "resampled profile sizes: {:?}",
        resampled.iter().map(Profile::len).collect::<Vec<_>>()
    );

    let offsets = if params.align {
        alignment_offsets(&resampled)
    } else {
        vec![0; resampled.len()]
    };
    let columns = layout(&resampled, &offsets);

    let reference = pick_reference(&resampled, params.profile_sampling_km);
    debug!("reference profile: {reference}");

    let esd = params.edge_sampling_km;
    let forward: Vec<&Column> = columns[reference..].iter().collect();
    let backward: Vec<&Column> = columns[..=reference].iter().rev().collect();
    let fwd = stitch(&forward, esd);
    let bwd = stitch(&backward, esd);
    debug!("stitched {} forward and {} backward columns", fwd.len(), bwd.len());

    // Backward columns run right to left and both halves hold the reference.
    let merged: Vec<Column> = bwd.into_iter().skip(1).rev().chain(fwd).collect();
    let merged = fix_mesh(merged);

    let nrows = merged.first().map_or(0, Vec::len);
    let rows: Vec<Column> = (0..nrows).map(|r| merged.iter().map(|col| col[r]).collect()).collect();
    let mut mesh = SphericalMesh::from_rows(rows)?.strip_empty();
    if idl {
        mesh = mesh.map_points(|p| GeoPoint::new(normalize_lon(p.lon), p.lat, p.depth));
    }
    Ok(mesh)
}

/// Clean a mesh, orient it by the right-hand rule and check its invariants.
pub fn finalize(mesh: SphericalMesh) -> Result<SphericalMesh> {
    let mesh = mesh.strip_empty();
    let (rows, cols) = mesh.shape();
    if rows < 2 || cols < 2 {
        return Err(GeoError::geometry(format!("degenerate mesh of shape ({rows}, {cols})")));
    }
    let gaps = mesh.row(0).iter().filter(|c| c.is_none()).count();
    if gaps > 0 {
        warn!("top edge has {gaps} empty cells out of {cols}");
    }
    let mesh = enforce_right_hand_rule(mesh)?;
    check_depth_order(&mesh)?;
    Ok(mesh)
}

fn shift_idl(p: &Profile) -> Profile {
    let mut lons: Vec<f64> = p.points().iter().map(|q| q.lon).collect();
    fix_lons_idl(&mut lons);
    Profile::from_trusted(p.points().iter().zip(lons).map(|(q, lon)| GeoPoint::new(lon, q.lat, q.depth)).collect())
}

// ── Alignment ────────────────────────────────────────────────────────────────

/// Row offset of every profile on the global grid, minimum 0.
fn alignment_offsets(profiles: &[Profile]) -> Vec<usize> {
    let mut cumulative = vec![0i64; profiles.len()];
    for i in 1..profiles.len() {
        cumulative[i] = cumulative[i - 1] + best_shift(&profiles[i - 1], &profiles[i]);
    }
    let min = cumulative.iter().copied().min().unwrap_or(0);
    let offsets: Vec<usize> = cumulative.iter().map(|&c| (c - min) as usize).collect();
    if offsets.iter().all(|&o| o == 0) {
        warn!("profile alignment requested but every profile kept its position");
    } else {
        debug!("alignment offsets: {offsets:?}");
    }
    offsets
}

/// Shift `s` placing row `j` of `b` next to row `j + s` of `a` that minimises
/// the mean absolute depth difference over the overlap. Smaller shifts win ties.
fn best_shift(a: &Profile, b: &Profile) -> i64 {
    let (na, nb) = (a.len() as i64, b.len() as i64);
    let window = ALIGN_WINDOW as i64;
    let (lo, hi) = if na <= 2 * window + 1 && nb <= 2 * window + 1 {
        (-(nb - 1), na - 1)
    } else {
        (-window, window)
    };
    let limit = lo.abs().max(hi);

    let candidates = std::iter::once(0).chain((1..=limit).flat_map(|m| [-m, m]));
    let mut best = (0i64, f64::INFINITY);
    for s in candidates.filter(|s| (lo..=hi).contains(s)) {
        if let Some(score) = depth_misfit(a, b, s) {
            if score < best.1 {
                best = (s, score);
            }
        }
    }
    best.0
}

fn depth_misfit(a: &Profile, b: &Profile, shift: i64) -> Option<f64> {
    let (pa, pb) = (a.points(), b.points());
    let (sum, n) = (0..pb.len() as i64)
        .filter_map(|j| {
            let i = j + shift;
            (i >= 0 && i < pa.len() as i64).then(|| (pa[i as usize].depth - pb[j as usize].depth).abs())
        })
        .fold((0.0, 0usize), |(s, n), d| (s + d, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn layout(profiles: &[Profile], offsets: &[usize]) -> Vec<Column> {
    let nrows = profiles.iter().zip(offsets).map(|(p, &o)| o + p.len()).max().unwrap_or(0);
    profiles
        .iter()
        .zip(offsets)
        .map(|(p, &o)| {
            let mut col = vec![None; nrows];
            for (j, q) in p.points().iter().enumerate() {
                col[o + j] = Some(*q);
            }
            col
        })
        .collect()
}

// ── Reference ────────────────────────────────────────────────────────────────

/// Index of the longest profile; the first one when all lengths agree within
/// a tenth of the sampling distance.
fn pick_reference(profiles: &[Profile], sampling_km: f64) -> usize {
    let lengths: Vec<f64> = profiles.iter().map(Profile::length).collect();
    let (mut imax, mut lmax, mut lmin) = (0, f64::NEG_INFINITY, f64::INFINITY);
    for (i, &l) in lengths.iter().enumerate() {
        if l > lmax {
            imax = i;
            lmax = l;
        }
        lmin = lmin.min(l);
    }
    if lmax - lmin < 0.1 * sampling_km { 0 } else { imax }
}

// ── Stitching ────────────────────────────────────────────────────────────────

/// Walk a sequence of profile columns, starting at `seq[0]`, and return the
/// mesh columns in walking order. `seq[0]` is returned as column 0.
fn stitch(seq: &[&Column], esd: f64) -> Vec<Column> {
    let Some(first) = seq.first() else {
        return Vec::new();
    };
    let nrows = first.len();
    let mut columns: Vec<Column> = vec![(*first).clone()];
    let mut last_col: Vec<Option<usize>> = first.iter().map(|c| c.map(|_| 0)).collect();
    let mut residual = vec![0.0; nrows];
    let threshold = esd / 4.0;

    for pair in seq.windows(2) {
        let (left, right) = (pair[0], pair[1]);
        let common: Vec<bool> = (0..nrows).map(|k| left[k].is_some() && right[k].is_some()).collect();
        let reached = last_col.iter().flatten().copied().max().unwrap_or(0);

        for k in 0..nrows {
            if !common[k] {
                last_col[k] = None;
                residual[k] = 0.0;
            }
        }
        let active: Vec<(usize, f64)> = (0..nrows)
            .filter(|&k| last_col[k].is_some())
            .map(|k| (k, residual[k]))
            .collect();
        for k in 0..nrows {
            if common[k] && last_col[k].is_none() {
                last_col[k] = Some(reached);
                residual[k] = active
                    .iter()
                    .min_by_key(|(j, _)| j.abs_diff(k))
                    .map_or(0.0, |&(_, r)| r);
            }
        }

        for k in 0..nrows {
            let (Some(pl), Some(pr), Some(mut last)) = (left[k], right[k], last_col[k]) else {
                continue;
            };
            let tdist = pl.distance(&pr);
            if tdist <= 0.0 {
                continue;
            }
            let hdist = pl.horizontal_distance(&pr);
            let vdist = pr.depth - pl.depth;
            let az = pl.azimuth(&pr);
            let res = residual[k];
            let npts = ((tdist + res) / esd + 1e-7).floor() as usize;

            for j in 0..npts {
                let dst = (j + 1) as f64 * esd - res;
                let f = dst / tdist;
                let p = pl.point_at(hdist * f, vdist * f, az);
                last = place(&mut columns, k, last, p, threshold);
            }
            last_col[k] = Some(last);
            residual[k] = tdist + res - npts as f64 * esd;
        }
    }
    columns
}

/// Put `p` in row `k` of the column following `last`, or of the best later
/// column it lines up with, or of a new column. Returns the column used.
fn place(columns: &mut Vec<Column>, k: usize, last: usize, p: GeoPoint, threshold: f64) -> usize {
    let nrows = columns[0].len();
    let candidate = last + 1;
    if candidate == columns.len() {
        columns.push(vec![None; nrows]);
    }
    let target = Vec3::from_point(&p);

    let chosen = match misfit(&columns[candidate], k, target) {
        Some(d) if d < threshold => Some(candidate),
        _ => (candidate + 1..columns.len())
            .filter_map(|c| misfit(&columns[c], k, target).map(|d| (c, d)))
            .filter(|&(_, d)| d < threshold)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(c, _)| c),
    };
    let col = chosen.unwrap_or_else(|| {
        columns.push(vec![None; nrows]);
        columns.len() - 1
    });
    columns[col][k] = Some(p);
    col
}

/// Distance from `target` to the best-fit line of `column`, `None` when row
/// `k` is taken. Columns with fewer than two points fit anything.
fn misfit(column: &Column, k: usize, target: Vec3) -> Option<f64> {
    if column[k].is_some() {
        return None;
    }
    let pts: Vec<Vec3> = column.iter().flatten().map(Vec3::from_point).collect();
    match principal_axis(&pts) {
        Some((c, dir)) => Some(distance_to_line(target, c, dir)),
        None => Some(0.0),
    }
}

// ── Merge ────────────────────────────────────────────────────────────────────

/// Keep a cell only if it has a point beside it in its row and above or
/// below it in its column.
fn fix_mesh(columns: Vec<Column>) -> Vec<Column> {
    let ncols = columns.len();
    let nrows = columns.first().map_or(0, Vec::len);
    let at = |c: usize, r: usize| columns[c][r].is_some();
    let mut out = columns.clone();
    for c in 0..ncols {
        for r in 0..nrows {
            if !at(c, r) {
                continue;
            }
            let in_row = (c > 0 && at(c - 1, r)) || (c + 1 < ncols && at(c + 1, r));
            let in_col = (r > 0 && at(c, r - 1)) || (r + 1 < nrows && at(c, r + 1));
            if !(in_row && in_col) {
                out[c][r] = None;
            }
        }
    }
    out
}

// ── Orientation and invariants ──────────────────────────────────────────────

fn angular_difference(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

/// Flip the columns when the first complete cell shows the surface dipping
/// to the left of its strike.
pub(crate) fn enforce_right_hand_rule(mesh: SphericalMesh) -> Result<SphericalMesh> {
    let (rows, cols) = mesh.shape();
    for r in 0..rows.saturating_sub(1) {
        for c in 0..cols.saturating_sub(1) {
            let (Some(a), Some(b), Some(d), Some(_)) =
                (mesh.get(r, c), mesh.get(r, c + 1), mesh.get(r + 1, c), mesh.get(r + 1, c + 1))
            else {
                continue;
            };
            let strike = a.azimuth(&b);
            let dip = a.azimuth(&d);
            if angular_difference(dip, strike - 90.0) < RIGHT_HAND_TOLERANCE_DEG {
                debug!("flipping mesh columns: strike {strike:.2}, dip direction {dip:.2}");
                return Ok(mesh.flip_columns());
            }
            return Ok(mesh);
        }
    }
    Err(GeoError::geometry("mesh has no complete cell to derive strike and dip from"))
}

fn check_depth_order(mesh: &SphericalMesh) -> Result<()> {
    let (rows, cols) = mesh.shape();
    for c in 0..cols {
        if let (Some(top), Some(bottom)) = (mesh.get(0, c), mesh.get(rows - 1, c)) {
            if top.depth > bottom.depth {
                return Err(GeoError::geometry(format!(
                    "column {c}: top depth {:.3} km is below bottom depth {:.3} km",
                    top.depth, bottom.depth
                )));
            }
        }
    }
    Ok(())
}

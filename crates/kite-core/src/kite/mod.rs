//! Kite fault surfaces: meshes stitched from an ordered set of profiles.
//!
//! A [`KiteSurface`] is immutable once built. Strike, dip and width are
//! computed lazily and cached in atomics, so a surface can be shared across
//! threads and queried concurrently without locking.

pub mod builder;
mod query;
pub mod simple;

use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use crate::config::MeshParams;
use crate::error::Result;
use crate::mesh::SphericalMesh;
use crate::point::GeoPoint;
use crate::profile::Profile;

// ── Memoisation ──────────────────────────────────────────────────────────────

/// Bit pattern marking an empty cache slot (a NaN no computation produces).
const EMPTY: u64 = u64::MAX;

/// A lazily computed `f64`. Racing callers may both compute; they store the
/// same value.
#[derive(Debug)]
pub(crate) struct CachedF64(AtomicU64);

impl CachedF64 {
    pub(crate) fn new() -> Self {
        Self(AtomicU64::new(EMPTY))
    }

    pub(crate) fn get_or_compute(&self, f: impl FnOnce() -> f64) -> f64 {
        let bits = self.0.load(Ordering::Acquire);
        if bits != EMPTY {
            return f64::from_bits(bits);
        }
        let value = f();
        self.0.store(value.to_bits(), Ordering::Release);
        value
    }
}

impl Clone for CachedF64 {
    fn clone(&self) -> Self {
        Self(AtomicU64::new(self.0.load(Ordering::Acquire)))
    }
}

// ── Surface ──────────────────────────────────────────────────────────────────

/// A fault surface represented by an oriented mesh whose first row is the
/// top edge and whose columns follow the right-hand rule.
#[derive(Debug, Clone)]
pub struct KiteSurface {
    mesh: SphericalMesh,
    profiles: Option<Vec<Profile>>,
    sec_id: String,
    strike: CachedF64,
    dip: CachedF64,
    width: CachedF64,
}

impl KiteSurface {
    fn new(mesh: SphericalMesh, profiles: Option<Vec<Profile>>) -> Self {
        Self {
            mesh,
            profiles,
            sec_id: String::new(),
            strike: CachedF64::new(),
            dip: CachedF64::new(),
            width: CachedF64::new(),
        }
    }

    /// Wrap an existing mesh, cleaning and orienting it.
    pub fn from_mesh(mesh: SphericalMesh) -> Result<Self> {
        Ok(Self::new(builder::finalize(mesh)?, None))
    }

    /// Build a surface from profiles ordered along strike.
    pub fn from_profiles(profiles: &[Profile], params: &MeshParams) -> Result<Self> {
        let mesh = builder::finalize(builder::build_mesh(profiles, params)?)?;
        debug!("kite surface built with mesh shape {:?}", mesh.shape());
        Ok(Self::new(mesh, Some(profiles.to_vec())))
    }

    /// Build a planar dipping surface below a fault trace.
    pub fn from_simple_fault(
        trace: &[GeoPoint],
        upper_depth: f64,
        lower_depth: f64,
        dip: f64,
        params: &MeshParams,
    ) -> Result<Self> {
        let profiles = simple::simple_fault_profiles(trace, upper_depth, lower_depth, dip)?;
        Self::from_profiles(&profiles, params)
    }

    /// Tag the surface with the identifier of the fault section it models.
    pub fn with_sec_id(mut self, sec_id: impl Into<String>) -> Self {
        self.sec_id = sec_id.into();
        self
    }

    pub fn sec_id(&self) -> &str {
        &self.sec_id
    }

    pub fn mesh(&self) -> &SphericalMesh {
        &self.mesh
    }

    /// The profiles the surface was built from, if any.
    pub fn profiles(&self) -> Option<&[Profile]> {
        self.profiles.as_deref()
    }

    /// Flat f32 encoding of the mesh, see [`SphericalMesh::encode`].
    pub fn encode(&self) -> Vec<f32> {
        self.mesh.encode()
    }

    pub fn decode(data: &[f32]) -> Result<Self> {
        Self::from_mesh(SphericalMesh::decode(data)?)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn profile(pts: &[(f64, f64, f64)]) -> Profile {
        Profile::new(pts.iter().map(|&(lon, lat, d)| GeoPoint::new(lon, lat, d)).collect()).unwrap()
    }

    /// Two vertical profiles 0.5° apart on the equator.
    pub fn vertical_surface() -> KiteSurface {
        let profiles = [
            profile(&[(0.0, 0.0, 0.0), (0.0, 0.001, 15.0)]),
            profile(&[(0.5, 0.0, 0.0), (0.5, 0.001, 15.0)]),
        ];
        KiteSurface::from_profiles(&profiles, &MeshParams::new(2.5, 5.0)).unwrap()
    }

    /// Three profiles dipping north, bending at the middle one.
    pub fn dipping_surface() -> KiteSurface {
        let profiles = [
            profile(&[(0.0, 0.0, 0.0), (0.0, 0.15, 15.0)]),
            profile(&[(0.3, 0.0, 0.0), (0.3, 0.15, 15.0)]),
            profile(&[(0.5, 0.0, 0.0), (0.5, 0.15, 15.0)]),
        ];
        KiteSurface::from_profiles(&profiles, &MeshParams::new(2.0, 5.0)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn cache_computes_once() {
        let c = CachedF64::new();
        assert_eq!(c.get_or_compute(|| 3.5), 3.5);
        assert_eq!(c.get_or_compute(|| panic!("recomputed")), 3.5);
        assert_eq!(c.clone().get_or_compute(|| 0.0), 3.5);
    }

    #[test]
    fn vertical_surface_shape() {
        let s = vertical_surface();
        assert_eq!(s.mesh().shape(), (7, 12));
        assert_eq!(s.profiles().map(<[Profile]>::len), Some(2));
    }

    #[test]
    fn dipping_surface_shape() {
        assert_eq!(dipping_surface().mesh().shape(), (12, 12));
    }

    #[test]
    fn top_row_is_shallowest() {
        for s in [vertical_surface(), dipping_surface()] {
            let (rows, cols) = s.mesh().shape();
            for c in 0..cols {
                if let (Some(t), Some(b)) = (s.mesh().get(0, c), s.mesh().get(rows - 1, c)) {
                    assert!(t.depth <= b.depth);
                }
            }
        }
    }

    #[test]
    fn encode_decode_preserves_mesh() {
        let s = dipping_surface().with_sec_id("sec-1");
        assert_eq!(s.sec_id(), "sec-1");
        let e = s.encode();
        let back = KiteSurface::decode(&e).unwrap();
        assert_eq!(back.mesh().shape(), s.mesh().shape());
        assert!(back.profiles().is_none());
        // Orientation is stable, so re-encoding is bit-identical.
        let again = back.encode();
        assert!(e.iter().zip(&again).all(|(a, b)| a.to_bits() == b.to_bits()));
    }

    #[test]
    fn from_mesh_rejects_degenerate_meshes() {
        let m = SphericalMesh::from_rows(vec![vec![Some(GeoPoint::new(0.0, 0.0, 0.0)), None]]).unwrap();
        assert!(KiteSurface::from_mesh(m).is_err());
    }

    #[test]
    fn simple_fault_builds_a_surface() {
        let trace = [GeoPoint::new(0.0, 0.0, 0.0), GeoPoint::new(0.2, 0.0, 0.0)];
        let s = KiteSurface::from_simple_fault(&trace, 0.0, 10.0, 60.0, &MeshParams::new(1.0, 1.0)).unwrap();
        let (rows, cols) = s.mesh().shape();
        assert!(rows >= 11 && cols >= 22, "{rows} x {cols}");
    }
}

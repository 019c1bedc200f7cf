//! Query points supplied by a hazard calculator.

use serde::{Deserialize, Serialize};

use crate::error::{GeoError, Result};
use crate::point::GeoPoint;

#[cfg(feature = "threading")]
use rayon::prelude::*;

/// Parallel arrays of site coordinates. Depth is positive down, usually 0.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawSites")]
pub struct SiteCollection {
    lons: Vec<f64>,
    lats: Vec<f64>,
    depths: Vec<f64>,
}

#[derive(Deserialize)]
struct RawSites {
    lons: Vec<f64>,
    lats: Vec<f64>,
    #[serde(default)]
    depths: Option<Vec<f64>>,
}

impl TryFrom<RawSites> for SiteCollection {
    type Error = GeoError;

    fn try_from(raw: RawSites) -> Result<Self> {
        match raw.depths {
            Some(depths) => Self::new(raw.lons, raw.lats, depths),
            None => Self::on_surface(raw.lons, raw.lats),
        }
    }
}

impl SiteCollection {
    pub fn new(lons: Vec<f64>, lats: Vec<f64>, depths: Vec<f64>) -> Result<Self> {
        if lons.len() != lats.len() {
            return Err(GeoError::ShapeMismatch { context: "site lons/lats", left: lons.len(), right: lats.len() });
        }
        if lons.len() != depths.len() {
            return Err(GeoError::ShapeMismatch { context: "site lons/depths", left: lons.len(), right: depths.len() });
        }
        Ok(Self { lons, lats, depths })
    }

    /// Sites at zero depth.
    pub fn on_surface(lons: Vec<f64>, lats: Vec<f64>) -> Result<Self> {
        let depths = vec![0.0; lons.len()];
        Self::new(lons, lats, depths)
    }

    pub fn from_points(points: &[GeoPoint]) -> Self {
        Self {
            lons: points.iter().map(|p| p.lon).collect(),
            lats: points.iter().map(|p| p.lat).collect(),
            depths: points.iter().map(|p| p.depth).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.lons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lons.is_empty()
    }

    pub fn get(&self, i: usize) -> GeoPoint {
        GeoPoint::new(self.lons[i], self.lats[i], self.depths[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = GeoPoint> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    pub fn lons(&self) -> &[f64] {
        &self.lons
    }

    pub fn lats(&self) -> &[f64] {
        &self.lats
    }

    pub fn depths(&self) -> &[f64] {
        &self.depths
    }
}

/// Evaluate `f` for every site index, in parallel when `threading` is on.
/// Output order always matches site order.
pub(crate) fn map_sites<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    #[cfg(feature = "threading")]
    {
        (0..n).into_par_iter().map(f).collect()
    }
    #[cfg(not(feature = "threading"))]
    {
        (0..n).map(f).collect()
    }
}

use serde::{Deserialize, Serialize};

use crate::error::{GeoError, Result};

/// Parameters controlling how a kite surface is meshed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshParams {
    /// Spacing in km along each profile (dip direction), default 2.0.
    pub profile_sampling_km: f64,
    /// Spacing in km between profiles (strike direction), default 2.0.
    pub edge_sampling_km: f64,
    /// Shift profiles vertically so their depths line up before stitching.
    pub align: bool,
    /// The surface straddles the International Date Line.
    pub idl: bool,
}

impl Default for MeshParams {
    fn default() -> Self {
        Self {
            profile_sampling_km: 2.0,
            edge_sampling_km: 2.0,
            align: false,
            idl: false,
        }
    }
}

impl MeshParams {
    pub fn new(profile_sampling_km: f64, edge_sampling_km: f64) -> Self {
        Self { profile_sampling_km, edge_sampling_km, ..Self::default() }
    }

    pub fn with_align(mut self, align: bool) -> Self {
        self.align = align;
        self
    }

    pub fn with_idl(mut self, idl: bool) -> Self {
        self.idl = idl;
        self
    }

    /// Both spacings must be finite and strictly positive.
    pub fn validate(&self) -> Result<()> {
        if !self.profile_sampling_km.is_finite() || self.profile_sampling_km <= 0.0 {
            return Err(GeoError::ValueRange {
                what: "profile sampling",
                value: self.profile_sampling_km,
                expected: "> 0 km",
            });
        }
        if !self.edge_sampling_km.is_finite() || self.edge_sampling_km <= 0.0 {
            return Err(GeoError::ValueRange {
                what: "edge sampling",
                value: self.edge_sampling_km,
                expected: "> 0 km",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let p: MeshParams = serde_json::from_str(r#"{"edge_sampling_km": 5.0, "align": true}"#).unwrap();
        assert_eq!(p.profile_sampling_km, 2.0);
        assert_eq!(p.edge_sampling_km, 5.0);
        assert!(p.align);
        assert!(!p.idl);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_spacing() {
        assert!(MeshParams::new(0.0, 1.0).validate().is_err());
        assert!(MeshParams::new(1.0, -2.0).validate().is_err());
        assert!(matches!(
            MeshParams::new(f64::NAN, 1.0).validate(),
            Err(GeoError::ValueRange { what: "profile sampling", .. })
        ));
    }
}

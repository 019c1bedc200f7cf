//! Error taxonomy shared by every module of the crate.

/// Everything that can go wrong while validating inputs or building a surface.
///
/// None of these are transient: the same inputs always produce the same error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoError {
    /// A coordinate or parameter lies outside its domain.
    #[error("{what} out of range: {value} (expected {expected})")]
    ValueRange {
        what: &'static str,
        value: f64,
        expected: &'static str,
    },

    /// Array arguments that cannot be broadcast together, or a ragged grid.
    #[error("shape mismatch in {context}: {left} vs {right}")]
    ShapeMismatch {
        context: &'static str,
        left: usize,
        right: usize,
    },

    /// The surface cannot be built from the given geometry.
    #[error("geometry error: {0}")]
    Geometry(String),
}

impl GeoError {
    pub(crate) fn geometry(msg: impl Into<String>) -> Self {
        GeoError::Geometry(msg.into())
    }

    /// Prefix a geometry message with the index of the offending profile.
    pub(crate) fn in_profile(self, index: usize) -> Self {
        match self {
            GeoError::Geometry(msg) => GeoError::Geometry(format!("profile {index}: {msg}")),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, GeoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_index_is_prefixed_on_geometry_errors_only() {
        let e = GeoError::geometry("too short").in_profile(3);
        assert_eq!(e.to_string(), "geometry error: profile 3: too short");

        let e = GeoError::ShapeMismatch { context: "lons/lats", left: 2, right: 3 }.in_profile(1);
        assert!(matches!(e, GeoError::ShapeMismatch { left: 2, right: 3, .. }));
    }
}

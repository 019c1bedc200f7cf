//! Geodesy on a spherical Earth and the kite fault-surface engine.
//!
//! Coordinates are (longitude, latitude) in degrees and depth in km,
//! positive down. All distances are in km.

pub mod config;
pub mod error;
pub mod geodetic;
pub mod kite;
pub mod mesh;
pub mod point;
pub mod profile;
pub mod projection;
pub mod sites;
pub mod sphere;

pub use config::MeshParams;
pub use error::{GeoError, Result};
pub use kite::KiteSurface;
pub use mesh::SphericalMesh;
pub use point::GeoPoint;
pub use profile::Profile;
pub use sites::SiteCollection;

//! Scattered-data interpolation over `(mass, log_age, feh)`.
//!
//! - Delaunay triangulation + point location (`delaunay`)
//! - per-column linear interpolants sharing one triangulation (`interpolant`)
//! - checksummed on-disk triangulation cache (`cache`)

pub mod cache;
pub mod delaunay;
pub mod interpolant;

pub use delaunay::{Corners, Triangulation};
pub use interpolant::Interpolant;

//! Stellar models on top of the interpolated grids.
//!
//! - `isochrone`: lazily loaded grids and per-column interpolants
//! - `star`: observed constraints, prior, likelihood, and fitting entry point
//! - `extinction`: per-band `A_band / A_V`

pub mod extinction;
pub mod isochrone;
pub mod star;

pub use extinction::*;
pub use isochrone::*;
pub use star::*;

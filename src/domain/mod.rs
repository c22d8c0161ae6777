//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - photometric systems and grid variants (`PhotSystem`, `GridVariant`)
//! - band alias resolution (`resolve_band`)
//! - observed constraints, parameter layout, prior bounds
//! - sampler configuration (`SamplerKind`, `SamplerConfig`)

pub mod bands;
pub mod types;

pub use bands::*;
pub use types::*;

//! Mathematical utilities: 3-D geometric predicates and sample statistics.

pub mod geometry;
pub mod stats;

pub use geometry::*;
pub use stats::*;

//! Input/output helpers.
//!
//! - atomic temp-file + rename writes (`atomic`)
//! - all-`f64` Parquet tables with schema metadata (`columnar`)
//! - observed-property CSV ingest (`props`)
//! - posterior sample persistence (`samples`)

pub mod atomic;
pub mod columnar;
pub mod props;
pub mod samples;

pub use props::*;
pub use samples::*;

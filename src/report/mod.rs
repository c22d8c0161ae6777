//! Reporting: posterior summaries and plain-text tables.

pub mod format;

pub use format::*;

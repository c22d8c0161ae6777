//! External data sources: grid archive download and extraction.

pub mod archive;

pub use archive::*;

//! Crate-wide error type.
//!
//! Every fallible operation returns `Result<_, AppError>`. The binary maps each
//! variant to a process exit code via [`AppError::exit_code`].

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Bad settings, CLI input, or a saved fit that does not match the grid.
    #[error("{0}")]
    Config(String),

    /// A model track file could not be parsed.
    #[error("Malformed data file '{}': {message}", path.display())]
    DataFormat { path: PathBuf, message: String },

    /// Unknown band alias, property name, or grid column.
    #[error("{0}")]
    Lookup(String),

    /// Archive download or extraction failed.
    #[error("Archive error: {0}")]
    Archive(String),

    /// Cache file could not be encoded/decoded.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Interpolant could not be built from the point cloud.
    #[error("Interpolation error: {0}")]
    Interpolation(String),

    /// Sampling backend failed irrecoverably.
    #[error("Sampler error: {0}")]
    Sampler(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

impl AppError {
    pub fn data_format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DataFormat {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) | AppError::Lookup(_) => 2,
            AppError::DataFormat { .. } => 3,
            AppError::Archive(_) => 5,
            AppError::Cache(_)
            | AppError::Interpolation(_)
            | AppError::Sampler(_)
            | AppError::Io(_)
            | AppError::Arrow(_)
            | AppError::Parquet(_) => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_format_message_names_file() {
        let err = AppError::data_format("/tmp/feh_m05.sdss", "bad AGE marker");
        let msg = err.to_string();
        assert!(msg.contains("/tmp/feh_m05.sdss"));
        assert!(msg.contains("bad AGE marker"));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn lookup_maps_to_usage_exit_code() {
        assert_eq!(AppError::Lookup("x".into()).exit_code(), 2);
        assert_eq!(AppError::Archive("x".into()).exit_code(), 5);
    }
}

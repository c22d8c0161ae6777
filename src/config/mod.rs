//! Process configuration: where grids and caches live.
//!
//! `Settings` is built once at startup (environment + CLI overrides) and then
//! passed by reference to every component. Nothing mutates it afterwards.

use std::path::{Path, PathBuf};

use crate::domain::{GridVariant, PhotSystem};
use crate::error::AppError;

/// Root of the shared model-grid directory.
pub const ENV_ROOT: &str = "ISOCHRONES";
/// Set to any non-empty value to forbid archive downloads.
pub const ENV_OFFLINE: &str = "STELLAR_GRIDS_OFFLINE";

pub const GRID_NAME: &str = "dartmouth";
pub const MASTER_TARBALL: &str = "dartmouth.tgz";
pub const DEFAULT_ARCHIVE_URL: &str = "https://zenodo.org/record/161241/files/dartmouth.tgz";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding tarballs, extracted tracks, and caches for the grid.
    pub data_dir: PathBuf,
    /// Whether a missing master tarball may be fetched from the archive.
    pub allow_download: bool,
    pub archive_url: String,
}

impl Settings {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            allow_download: false,
            archive_url: DEFAULT_ARCHIVE_URL.to_string(),
        }
    }

    /// Build settings from the environment (`.env` is honoured).
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let root = match std::env::var(ENV_ROOT) {
            Ok(v) if !v.trim().is_empty() => PathBuf::from(v),
            _ => {
                let home = std::env::var("HOME").map_err(|_| {
                    AppError::Config(format!(
                        "Neither {ENV_ROOT} nor HOME is set; cannot locate the grid directory."
                    ))
                })?;
                PathBuf::from(home).join(".isochrones")
            }
        };

        let offline = std::env::var(ENV_OFFLINE)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false);

        Ok(Self {
            data_dir: root.join(GRID_NAME),
            allow_download: !offline,
            archive_url: DEFAULT_ARCHIVE_URL.to_string(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn master_tarball(&self) -> PathBuf {
        self.data_dir.join(MASTER_TARBALL)
    }

    pub fn system_tarball(&self, system: PhotSystem) -> PathBuf {
        self.data_dir.join(format!("{}.tgz", system.name()))
    }

    /// Directory the per-system tarballs are extracted into.
    pub fn tracks_root(&self) -> PathBuf {
        self.data_dir.join("isochrones")
    }

    pub fn track_dir(&self, system: PhotSystem) -> PathBuf {
        self.tracks_root().join(system.name())
    }

    /// Aggregated grid table cache.
    pub fn grid_cache_path(&self, system: PhotSystem, variant: &GridVariant) -> PathBuf {
        self.data_dir
            .join(format!("{}{}.parquet", system.name(), variant.suffix()))
    }

    /// Triangulation cache for one (system, variant).
    pub fn tri_cache_path(&self, system: PhotSystem, variant: &GridVariant) -> PathBuf {
        self.data_dir.join(format!(
            "{GRID_NAME}_{}{}.tri",
            system.name(),
            variant.suffix()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_paths_follow_naming_convention() {
        let s = Settings::new("/data/dartmouth");
        let v = GridVariant::default();
        assert_eq!(
            s.grid_cache_path(PhotSystem::SdssUgriz, &v),
            PathBuf::from("/data/dartmouth/SDSSugriz.parquet")
        );
        assert_eq!(
            s.tri_cache_path(PhotSystem::Wise, &GridVariant::new("afem2", "")),
            PathBuf::from("/data/dartmouth/dartmouth_WISE_afem2.tri")
        );
        assert_eq!(
            s.track_dir(PhotSystem::HstWfpc2),
            PathBuf::from("/data/dartmouth/isochrones/HST_WFPC2")
        );
        assert!(!s.allow_download);
    }
}

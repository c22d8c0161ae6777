//! Per-system grid aggregation.
//!
//! For one photometric system and grid variant:
//!
//! 1. make sure the track files are extracted (on-demand, idempotent)
//! 2. parse every file (parallel)
//! 3. concat, convert age to log10(yr), apply the system transform
//! 4. sort by (feh, age, mass, EEP), drop duplicate keys, index by (feh, age)
//! 5. persist to / reuse a Parquet cache
//!
//! System-specific fixes (like disambiguating HST filter names) are plain
//! `GridTable -> GridTable` functions registered per system.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use rayon::prelude::*;

use crate::config::Settings;
use crate::data::{ArchiveClient, Extractor, SystemTar};
use crate::domain::{GridBounds, GridVariant, PhotSystem};
use crate::error::AppError;
use crate::grid::cache::{is_fresh, modified, read_grid_cache, write_grid_cache};
use crate::grid::loader::load_track;
use crate::grid::table::{GridIndex, GridTable};
use crate::grid::{COL_AGE, COL_FEH, COL_MASS, SORT_KEYS};

/// Per-system table transform applied after concatenation.
pub type PostProcess = fn(GridTable) -> GridTable;

/// Aggregated, sorted, and indexed grid for one system + variant.
#[derive(Debug, Clone)]
pub struct ModelGrid {
    pub system: PhotSystem,
    pub variant: GridVariant,
    pub table: GridTable,
    pub index: GridIndex,
}

impl ModelGrid {
    pub fn new(system: PhotSystem, variant: GridVariant, table: GridTable) -> Result<Self, AppError> {
        let index = GridIndex::build(&table, COL_FEH, COL_AGE)?;
        Ok(Self {
            system,
            variant,
            table,
            index,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.table.n_rows()
    }

    /// Interpolation coordinates `(mass, log_age, feh)` per row.
    pub fn points(&self) -> Result<Vec<[f64; 3]>, AppError> {
        let mass = self.table.column(COL_MASS)?;
        let age = self.table.column(COL_AGE)?;
        let feh = self.table.column(COL_FEH)?;
        Ok((0..self.n_rows()).map(|i| [mass[i], age[i], feh[i]]).collect())
    }

    pub fn bounds(&self) -> Result<GridBounds, AppError> {
        Ok(GridBounds {
            mass: self.table.min_max(COL_MASS)?,
            log_age: self.table.min_max(COL_AGE)?,
            feh: self.table.min_max(COL_FEH)?,
        })
    }

    /// Rows of the tabulated isochrone closest to `(log_age, feh)`.
    pub fn isochrone(&self, log_age: f64, feh: f64) -> Option<GridTable> {
        let entry = self.index.nearest(feh, log_age)?;
        Some(self.table.slice_rows(entry.rows.clone()))
    }
}

/// Prefix WFPC2 filter columns (`F555W` -> `WFPC2_F555W`) so they cannot
/// collide with same-named filters of other HST cameras.
pub fn prefix_wfpc2_columns(mut table: GridTable) -> GridTable {
    table.rename_columns(|c| c.starts_with('F').then(|| format!("WFPC2_{c}")));
    table
}

pub struct GridAggregator {
    settings: Settings,
    variant: GridVariant,
    transforms: HashMap<PhotSystem, PostProcess>,
    extractor: Arc<dyn Extractor>,
}

impl GridAggregator {
    /// Aggregator with no system transforms.
    pub fn new(settings: Settings, variant: GridVariant) -> Self {
        Self {
            settings,
            variant,
            transforms: HashMap::new(),
            extractor: Arc::new(SystemTar),
        }
    }

    /// Aggregator with the stock Dartmouth transforms registered.
    pub fn dartmouth(settings: Settings, variant: GridVariant) -> Self {
        Self::new(settings, variant).with_transform(PhotSystem::HstWfpc2, prefix_wfpc2_columns)
    }

    pub fn with_transform(mut self, system: PhotSystem, f: PostProcess) -> Self {
        self.transforms.insert(system, f);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn variant(&self) -> &GridVariant {
        &self.variant
    }

    pub fn cache_path(&self, system: PhotSystem) -> PathBuf {
        self.settings.grid_cache_path(system, &self.variant)
    }

    /// Load the grid for `system`, from cache when fresh.
    pub fn load(&self, system: PhotSystem) -> Result<ModelGrid, AppError> {
        let cache = self.cache_path(system);
        if is_fresh(&cache, self.source_mtime(system)) {
            match read_grid_cache(&cache, system, &self.variant) {
                Ok(table) => {
                    tracing::debug!(system = %system, path = %cache.display(), "Grid cache hit");
                    return ModelGrid::new(system, self.variant.clone(), table);
                }
                Err(err) => {
                    tracing::warn!(system = %system, error = %err, "Unreadable grid cache; rebuilding");
                }
            }
        }

        let grid = self.rebuild(system)?;
        if let Err(err) = write_grid_cache(&cache, &grid.table, system, &self.variant) {
            tracing::warn!(system = %system, error = %err, "Failed to write grid cache");
        }
        Ok(grid)
    }

    /// Rebuild from the track files, ignoring any cache.
    pub fn rebuild(&self, system: PhotSystem) -> Result<ModelGrid, AppError> {
        self.ensure_tracks(system)?;
        let files = self.find_files(system)?;
        tracing::info!(system = %system, files = files.len(), "Aggregating grid");
        self.build_from_files(system, &files)
    }

    /// Parse, merge, and normalize the given files.
    pub fn build_from_files(&self, system: PhotSystem, files: &[PathBuf]) -> Result<ModelGrid, AppError> {
        let tracks = files
            .par_iter()
            .map(|p| load_track(p))
            .collect::<Result<Vec<_>, AppError>>()?;

        let mut tables = Vec::with_capacity(tracks.len());
        for track in tracks {
            let path = track.path.clone();
            match track.into_table_with_feh() {
                Some(t) => tables.push(t),
                None => tracing::warn!(path = %path.display(), "No [Fe/H] in file name; skipping"),
            }
        }
        if tables.is_empty() {
            return Err(AppError::Lookup(format!(
                "No usable track files for {system} ({}).",
                self.variant.file_tag()
            )));
        }

        let mut table = GridTable::concat(tables)?;
        table.map_column(COL_AGE, |gyr| (gyr * 1e9).log10())?;
        if let Some(f) = self.transforms.get(&system) {
            table = f(table);
        }
        table.sort_by_columns(&SORT_KEYS)?;
        let dropped = table.dedup_by_columns(&SORT_KEYS)?;
        if dropped > 0 {
            tracing::debug!(system = %system, dropped, "Dropped duplicate grid rows");
        }

        ModelGrid::new(system, self.variant.clone(), table)
    }

    /// Track files for `system` matching this variant, sorted by path.
    pub fn find_files(&self, system: PhotSystem) -> Result<Vec<PathBuf>, AppError> {
        let dir = self.settings.track_dir(system);
        let needle = format!("{}.{}", self.variant.file_tag(), system.name());

        let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.contains(&needle))
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(AppError::Lookup(format!(
                "No track files matching '*{needle}*' in '{}'.",
                dir.display()
            )));
        }
        Ok(files)
    }

    /// Extract track files for `system` if they are not on disk yet.
    pub fn ensure_tracks(&self, system: PhotSystem) -> Result<(), AppError> {
        let dir = self.settings.track_dir(system);
        if dir.is_dir() {
            return Ok(());
        }

        let system_tgz = self.settings.system_tarball(system);
        if !system_tgz.is_file() {
            let master = self.settings.master_tarball();
            if !master.is_file() {
                if !self.settings.allow_download {
                    return Err(AppError::Archive(format!(
                        "'{}' is missing and downloads are disabled.",
                        master.display()
                    )));
                }
                ArchiveClient::new()?.download(&self.settings.archive_url, &master)?;
            }
            self.extractor.extract(&master, self.settings.data_dir())?;
            if !system_tgz.is_file() {
                return Err(AppError::Archive(format!(
                    "'{}' was not found in '{}'.",
                    system_tgz.display(),
                    master.display()
                )));
            }
        }

        self.extractor.extract(&system_tgz, &self.settings.tracks_root())?;
        if !dir.is_dir() {
            return Err(AppError::Archive(format!(
                "Extracting '{}' did not produce '{}'.",
                system_tgz.display(),
                dir.display()
            )));
        }
        Ok(())
    }

    /// Modification time of whatever the cache was derived from.
    fn source_mtime(&self, system: PhotSystem) -> Option<SystemTime> {
        let tgz = self.settings.system_tarball(system);
        modified(&tgz).or_else(|| modified(&self.settings.track_dir(system)))
    }
}

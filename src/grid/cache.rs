//! Parquet cache of aggregated grid tables.
//!
//! A cache is fresh when it is at least as new as its source (tarball or
//! extracted track directory).

use std::collections::HashMap;
use std::path::Path;
use std::time::SystemTime;

use crate::domain::{GridVariant, PhotSystem};
use crate::error::AppError;
use crate::grid::table::GridTable;
use crate::io::columnar::{ColumnSet, read_columns, write_columns};

const META_SYSTEM: &str = "stellar_grids.system";
const META_AFE: &str = "stellar_grids.afe";
const META_Y: &str = "stellar_grids.y";

pub fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// `true` if `cache` exists and is not older than `source_mtime`.
pub fn is_fresh(cache: &Path, source_mtime: Option<SystemTime>) -> bool {
    match (modified(cache), source_mtime) {
        (Some(c), Some(s)) => c >= s,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

pub fn write_grid_cache(
    path: &Path,
    table: &GridTable,
    system: PhotSystem,
    variant: &GridVariant,
) -> Result<(), AppError> {
    let set = ColumnSet {
        names: table.columns().to_vec(),
        columns: (0..table.n_cols()).map(|i| table.column_at(i).to_vec()).collect(),
        metadata: HashMap::from([
            (META_SYSTEM.to_string(), system.name().to_string()),
            (META_AFE.to_string(), variant.afe.clone()),
            (META_Y.to_string(), variant.y.clone()),
        ]),
    };
    write_columns(path, &set)
}

/// Read a grid cache, checking it belongs to `(system, variant)`.
pub fn read_grid_cache(
    path: &Path,
    system: PhotSystem,
    variant: &GridVariant,
) -> Result<GridTable, AppError> {
    let set = read_columns(path)?;

    let get = |k: &str| set.metadata.get(k).map(String::as_str).unwrap_or("");
    if get(META_SYSTEM) != system.name() || get(META_AFE) != variant.afe || get(META_Y) != variant.y {
        return Err(AppError::Cache(format!(
            "Grid cache '{}' was built for {}/{}{}, expected {}/{}{}.",
            path.display(),
            get(META_SYSTEM),
            get(META_AFE),
            get(META_Y),
            system.name(),
            variant.afe,
            variant.y
        )));
    }

    GridTable::from_columns(set.names, set.columns)
}

//! Model-grid façade: grids, triangulations, and per-column interpolants.
//!
//! Everything is loaded lazily on first use and memoized for the lifetime of
//! the `Isochrone`. One triangulation per system serves every column of that
//! system.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::Settings;
use crate::domain::{GridBounds, GridVariant, PhotSystem, resolve_band};
use crate::error::AppError;
use crate::grid::cache::modified;
use crate::grid::{COL_LOG_L, COL_LOG_TEFF, COL_LOGG, COL_MASS, GridAggregator, GridTable, ModelGrid};
use crate::interp::cache::load_or_build;
use crate::interp::{Interpolant, Triangulation};

/// log10 of the solar surface gravity in cgs.
pub const LOGG_SUN: f64 = 4.438;

/// Loaded grid + triangulation for one system.
#[derive(Debug)]
pub struct SystemModel {
    pub grid: ModelGrid,
    pub tri: Arc<Triangulation>,
}

pub struct Isochrone {
    aggregator: GridAggregator,
    physical: PhotSystem,
    systems: Mutex<HashMap<PhotSystem, Arc<SystemModel>>>,
    interps: Mutex<HashMap<(PhotSystem, String), Arc<Interpolant>>>,
}

impl Isochrone {
    pub fn new(settings: Settings, variant: GridVariant) -> Self {
        Self::from_aggregator(GridAggregator::dartmouth(settings, variant))
    }

    pub fn from_aggregator(aggregator: GridAggregator) -> Self {
        Self {
            aggregator,
            physical: PhotSystem::SdssUgriz,
            systems: Mutex::new(HashMap::new()),
            interps: Mutex::new(HashMap::new()),
        }
    }

    /// System whose grid supplies the physical columns (Teff, logg, ...).
    /// Every system tabulates them; picking one already in use avoids
    /// loading an extra grid.
    pub fn with_physical_system(mut self, system: PhotSystem) -> Self {
        self.physical = system;
        self
    }

    pub fn physical_system(&self) -> PhotSystem {
        self.physical
    }

    pub fn variant(&self) -> &GridVariant {
        self.aggregator.variant()
    }

    pub fn settings(&self) -> &Settings {
        self.aggregator.settings()
    }

    /// Grid and triangulation for `system`, loading them on first use.
    pub fn system(&self, system: PhotSystem) -> Result<Arc<SystemModel>, AppError> {
        let mut systems = lock(&self.systems)?;
        if let Some(found) = systems.get(&system) {
            return Ok(found.clone());
        }

        let grid = self.aggregator.load(system)?;
        let points = grid.points()?;
        let tri_path = self.settings().tri_cache_path(system, self.variant());
        let grid_mtime = modified(&self.aggregator.cache_path(system));
        let tri = Arc::new(load_or_build(&tri_path, &points, grid_mtime)?);

        let loaded = Arc::new(SystemModel { grid, tri });
        systems.insert(system, loaded.clone());
        Ok(loaded)
    }

    /// Interpolant for one column of one system's grid.
    pub fn interpolant(&self, system: PhotSystem, column: &str) -> Result<Arc<Interpolant>, AppError> {
        let key = (system, column.to_string());
        if let Some(found) = lock(&self.interps)?.get(&key) {
            return Ok(found.clone());
        }

        let loaded = self.system(system)?;
        let values = loaded.grid.table.column(column)?;
        let interp = Arc::new(Interpolant::new(
            format!("{system}:{column}"),
            loaded.tri.clone(),
            values,
        )?);
        tracing::debug!(system = %system, column, "Built interpolant");

        Ok(lock(&self.interps)?.entry(key).or_insert(interp).clone())
    }

    /// Interpolant for a physical column of the physical system.
    pub fn physical(&self, column: &str) -> Result<Arc<Interpolant>, AppError> {
        self.interpolant(self.physical, column)
    }

    /// Absolute magnitude in `band` (any accepted alias).
    pub fn mag(&self, band: &str, mass: f64, log_age: f64, feh: f64) -> Result<f64, AppError> {
        let b = resolve_band(band)?;
        Ok(self.interpolant(b.system, &b.band)?.eval(mass, log_age, feh))
    }

    /// Tabulated initial mass; `NaN` outside the grid.
    pub fn mass(&self, mass: f64, log_age: f64, feh: f64) -> Result<f64, AppError> {
        Ok(self.physical(COL_MASS)?.eval(mass, log_age, feh))
    }

    pub fn log_teff(&self, mass: f64, log_age: f64, feh: f64) -> Result<f64, AppError> {
        Ok(self.physical(COL_LOG_TEFF)?.eval(mass, log_age, feh))
    }

    pub fn teff(&self, mass: f64, log_age: f64, feh: f64) -> Result<f64, AppError> {
        Ok(10f64.powf(self.log_teff(mass, log_age, feh)?))
    }

    pub fn logg(&self, mass: f64, log_age: f64, feh: f64) -> Result<f64, AppError> {
        Ok(self.physical(COL_LOGG)?.eval(mass, log_age, feh))
    }

    pub fn log_l(&self, mass: f64, log_age: f64, feh: f64) -> Result<f64, AppError> {
        Ok(self.physical(COL_LOG_L)?.eval(mass, log_age, feh))
    }

    /// Radius in solar units from mass and surface gravity.
    pub fn radius(&self, mass: f64, log_age: f64, feh: f64) -> Result<f64, AppError> {
        Ok(radius_from_logg(mass, self.logg(mass, log_age, feh)?))
    }

    pub fn bounds(&self, system: PhotSystem) -> Result<GridBounds, AppError> {
        self.system(system)?.grid.bounds()
    }

    /// Tabulated isochrone nearest to `(log_age, feh)`.
    pub fn isochrone(&self, system: PhotSystem, log_age: f64, feh: f64) -> Result<GridTable, AppError> {
        self.system(system)?
            .grid
            .isochrone(log_age, feh)
            .ok_or_else(|| AppError::Lookup(format!("The {system} grid is empty.")))
    }
}

/// `R/Rsun = sqrt(M · 10^(logg_sun − logg))`.
pub fn radius_from_logg(mass: f64, logg: f64) -> f64 {
    (mass * 10f64.powf(LOGG_SUN - logg)).sqrt()
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, AppError> {
    m.lock()
        .map_err(|_| AppError::Interpolation("Interpolant cache lock poisoned.".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::fixtures;
    use crate::models::fixtures::{AGES, test_isochrone};

    #[test]
    fn vertex_queries_return_tabulated_values() {
        let dir = tempfile::tempdir().unwrap();
        let iso = test_isochrone(dir.path());

        let (m, age_gyr, feh) = (0.8, AGES[1], -0.5);
        let log_age = (age_gyr * 1e9).log10();
        let logg = iso.logg(m, log_age, feh).unwrap();
        assert!((logg - fixtures::logg(m, age_gyr, feh)).abs() < 1e-6);

        let teff = iso.teff(m, log_age, feh).unwrap();
        let expected = 10f64.powf(fixtures::log_teff(m, age_gyr, feh));
        assert!((teff - expected).abs() / expected < 1e-6);

        // sdss_g is the 5th SDSS column.
        let g = iso.mag("g", m, log_age, feh).unwrap();
        assert!((g - fixtures::mag(4, m, age_gyr, feh)).abs() < 1e-6);
        assert!((iso.mass(m, log_age, feh).unwrap() - m).abs() < 1e-6);
    }

    #[test]
    fn outside_the_grid_is_nan() {
        let dir = tempfile::tempdir().unwrap();
        let iso = test_isochrone(dir.path());
        assert!(iso.logg(5.0, 9.3, 0.0).unwrap().is_nan());
        assert!(iso.mag("V", 0.8, 9.3, 1.0).unwrap().is_nan());
        assert!(iso.radius(0.8, 12.0, 0.0).unwrap().is_nan());
    }

    #[test]
    fn interpolants_are_memoized_and_share_a_triangulation() {
        let dir = tempfile::tempdir().unwrap();
        let iso = test_isochrone(dir.path());
        let a = iso.interpolant(PhotSystem::SdssUgriz, "sdss_g").unwrap();
        let b = iso.interpolant(PhotSystem::SdssUgriz, "sdss_g").unwrap();
        let c = iso.interpolant(PhotSystem::SdssUgriz, "sdss_r").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(a.triangulation(), c.triangulation()));
        assert!(iso.interpolant(PhotSystem::SdssUgriz, "nope").is_err());
        assert!(iso.settings().tri_cache_path(PhotSystem::SdssUgriz, iso.variant()).is_file());
    }

    #[test]
    fn bounds_and_nearest_isochrone() {
        let dir = tempfile::tempdir().unwrap();
        let iso = test_isochrone(dir.path());
        let b = iso.bounds(PhotSystem::SdssUgriz).unwrap();
        assert_eq!(b.feh, (-0.5, 0.0));
        assert!((b.log_age.0 - 9.0).abs() < 1e-12);

        let table = iso.isochrone(PhotSystem::SdssUgriz, 9.02, -0.4).unwrap();
        assert!(table.n_rows() > 0);
        assert!(table.column("feh").unwrap().iter().all(|&f| f == -0.5));
    }

    #[test]
    fn radius_follows_surface_gravity() {
        assert!((radius_from_logg(1.0, LOGG_SUN) - 1.0).abs() < 1e-12);
        assert!((radius_from_logg(1.0, LOGG_SUN - 2.0) - 10.0).abs() < 1e-9);
    }
}

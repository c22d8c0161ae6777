//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - passed between the grid, interpolation, and fitting layers
//! - written into cache/sample file metadata
//! - reloaded later for summaries or comparisons

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Photometric systems shipped with the Dartmouth grids.
///
/// Each system carries a fixed, ordered list of canonical band (column) names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PhotSystem {
    #[serde(rename = "SDSSugriz")]
    SdssUgriz,
    #[serde(rename = "UBVRIJHKsKp")]
    Ubvrijhkskp,
    #[serde(rename = "WISE")]
    Wise,
    #[serde(rename = "LSST")]
    Lsst,
    #[serde(rename = "UKIDSS")]
    Ukidss,
    #[serde(rename = "HST_WFPC2")]
    HstWfpc2,
}

impl PhotSystem {
    pub const ALL: [PhotSystem; 6] = [
        PhotSystem::SdssUgriz,
        PhotSystem::Ubvrijhkskp,
        PhotSystem::Wise,
        PhotSystem::Lsst,
        PhotSystem::Ukidss,
        PhotSystem::HstWfpc2,
    ];

    /// Name used in archive/file names and in band resolution.
    pub fn name(self) -> &'static str {
        match self {
            PhotSystem::SdssUgriz => "SDSSugriz",
            PhotSystem::Ubvrijhkskp => "UBVRIJHKsKp",
            PhotSystem::Wise => "WISE",
            PhotSystem::Lsst => "LSST",
            PhotSystem::Ukidss => "UKIDSS",
            PhotSystem::HstWfpc2 => "HST_WFPC2",
        }
    }

    /// Canonical band columns, as they appear in the aggregated grid table.
    pub fn bands(self) -> &'static [&'static str] {
        match self {
            PhotSystem::SdssUgriz => &["sdss_z", "sdss_i", "sdss_r", "sdss_u", "sdss_g"],
            PhotSystem::Ubvrijhkskp => &["B", "I", "H", "J", "Ks", "R", "U", "V", "D51", "Kp"],
            PhotSystem::Wise => &["W4", "W3", "W2", "W1"],
            PhotSystem::Lsst => &["LSST_r", "LSST_u", "LSST_y", "LSST_z", "LSST_g", "LSST_i"],
            PhotSystem::Ukidss => &["Y", "H", "K", "J", "Z"],
            PhotSystem::HstWfpc2 => &["WFPC2_F555W", "WFPC2_F606W", "WFPC2_F814W"],
        }
    }

    pub fn from_name(name: &str) -> Option<PhotSystem> {
        PhotSystem::ALL.into_iter().find(|s| s.name() == name)
    }

    pub fn has_band(self, band: &str) -> bool {
        self.bands().contains(&band)
    }
}

impl std::fmt::Display for PhotSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Grid variant selector: alpha-element enhancement and helium tags.
///
/// These are lexical tags taken from the Dartmouth file names
/// (e.g. `afep0`, `afem2`; `y` is usually empty).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridVariant {
    pub afe: String,
    pub y: String,
}

impl Default for GridVariant {
    fn default() -> Self {
        Self {
            afe: DEFAULT_AFE.to_string(),
            y: String::new(),
        }
    }
}

pub const DEFAULT_AFE: &str = "afep0";

impl GridVariant {
    pub fn new(afe: impl Into<String>, y: impl Into<String>) -> Self {
        Self {
            afe: afe.into(),
            y: y.into(),
        }
    }

    /// File-name suffix: empty for the default variant, else `_afe` / `_y`.
    pub fn suffix(&self) -> String {
        let mut out = String::new();
        if self.afe != DEFAULT_AFE {
            out.push('_');
            out.push_str(&self.afe);
        }
        if !self.y.is_empty() {
            out.push('_');
            out.push_str(&self.y);
        }
        out
    }

    /// Tag that selects track files for this variant (`{afe}{y}`).
    pub fn file_tag(&self) -> String {
        format!("{}{}", self.afe, self.y)
    }
}

/// One observed property with a Gaussian uncertainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedConstraint {
    pub name: String,
    pub value: f64,
    pub uncertainty: f64,
}

impl ObservedConstraint {
    pub fn new(name: impl Into<String>, value: f64, uncertainty: f64) -> Self {
        Self {
            name: name.into(),
            value,
            uncertainty,
        }
    }
}

/// Parameter vector layout: `[mass, log_age, feh, distance, av]`.
pub const PARAM_NAMES: [&str; 5] = ["mass", "log_age", "feh", "distance", "av"];
pub const P_MASS: usize = 0;
pub const P_LOG_AGE: usize = 1;
pub const P_FEH: usize = 2;
pub const P_DISTANCE: usize = 3;
pub const P_AV: usize = 4;
pub const N_PARAMS: usize = PARAM_NAMES.len();

/// Coordinate ranges covered by a model grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridBounds {
    pub mass: (f64, f64),
    pub log_age: (f64, f64),
    pub feh: (f64, f64),
}

/// Hard limits of the flat prior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorBounds {
    pub mass: (f64, f64),
    pub log_age: (f64, f64),
    pub feh: (f64, f64),
    /// Distance in parsec; the lower edge is exclusive.
    pub distance: (f64, f64),
    pub av: (f64, f64),
}

pub const DEFAULT_MAX_DISTANCE_PC: f64 = 3000.0;
pub const DEFAULT_MAX_AV: f64 = 1.0;

impl PriorBounds {
    pub fn from_grid(grid: &GridBounds) -> Self {
        Self {
            // Mass must stay physical even if a grid ever tabulated zero.
            mass: (grid.mass.0.max(f64::MIN_POSITIVE), grid.mass.1),
            log_age: grid.log_age,
            feh: grid.feh,
            distance: (0.0, DEFAULT_MAX_DISTANCE_PC),
            av: (0.0, DEFAULT_MAX_AV),
        }
    }

    /// Box as `(lo, hi)` pairs in parameter order.
    pub fn as_box(&self) -> [(f64, f64); N_PARAMS] {
        [self.mass, self.log_age, self.feh, self.distance, self.av]
    }

    pub fn contains(&self, params: &[f64]) -> bool {
        if params.len() != N_PARAMS || params.iter().any(|v| !v.is_finite()) {
            return false;
        }
        let within = |v: f64, (lo, hi): (f64, f64)| v >= lo && v <= hi;
        within(params[P_MASS], self.mass)
            && params[P_MASS] > 0.0
            && within(params[P_LOG_AGE], self.log_age)
            && within(params[P_FEH], self.feh)
            && params[P_DISTANCE] > self.distance.0
            && params[P_DISTANCE] <= self.distance.1
            && within(params[P_AV], self.av)
    }
}

/// Which sampling backend drives the fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SamplerKind {
    /// Affine-invariant ensemble MCMC.
    Ensemble,
    /// Nested sampling (requires the `nested` feature; falls back otherwise).
    Nested,
}

impl SamplerKind {
    pub fn display_name(self) -> &'static str {
        match self {
            SamplerKind::Ensemble => "ensemble",
            SamplerKind::Nested => "nested",
        }
    }
}

/// Sampler run configuration shared by both backends.
///
/// Each backend reads the fields relevant to it and ignores the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub seed: u64,

    /// Ensemble: number of walkers.
    pub nwalkers: usize,
    /// Ensemble: burn-in steps (discarded).
    pub nburn: usize,
    /// Ensemble: production steps (kept).
    pub niter: usize,
    /// Ensemble: prior draws per walker when searching for valid starts.
    pub ninitial: usize,

    /// Nested: live points.
    pub n_live: usize,
    /// Nested: hard iteration cap.
    pub max_iter: usize,
    /// Nested: stop when the remaining evidence is below this (in log units).
    pub dlogz: f64,
    /// Nested: random-walk steps per replacement.
    pub walk_steps: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            nwalkers: 200,
            nburn: 100,
            niter: 200,
            ninitial: 100,
            n_live: 400,
            max_iter: 20_000,
            dlogz: 0.5,
            walk_steps: 25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_suffix_is_empty_for_default() {
        assert_eq!(GridVariant::default().suffix(), "");
        assert_eq!(GridVariant::new("afem2", "").suffix(), "_afem2");
        assert_eq!(GridVariant::new("afep0", "y33").suffix(), "_y33");
        assert_eq!(GridVariant::default().file_tag(), "afep0");
    }

    #[test]
    fn prior_bounds_reject_non_physical_params() {
        let grid = GridBounds {
            mass: (0.1, 2.0),
            log_age: (8.0, 10.1),
            feh: (-2.0, 0.5),
        };
        let prior = PriorBounds::from_grid(&grid);
        assert!(prior.contains(&[1.0, 9.5, 0.0, 100.0, 0.1]));
        assert!(!prior.contains(&[-1.0, 9.5, 0.0, 100.0, 0.1]));
        assert!(!prior.contains(&[1.0, 9.5, 1.5, 100.0, 0.1]));
        assert!(!prior.contains(&[1.0, 9.5, 0.0, 0.0, 0.1]));
        assert!(!prior.contains(&[1.0, 9.5, 0.0, 100.0, f64::NAN]));
        assert!(!prior.contains(&[1.0, 9.5, 0.0]));
    }

    #[test]
    fn phot_system_names_round_trip() {
        for sys in PhotSystem::ALL {
            assert_eq!(PhotSystem::from_name(sys.name()), Some(sys));
        }
        assert_eq!(PhotSystem::from_name("nope"), None);
    }
}

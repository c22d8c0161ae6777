//! Command-line parsing for `starfit`.
//!
//! Parsing and dispatch stay separate from the modeling code: this module only
//! declares arguments and turns them into domain values.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Settings;
use crate::domain::{DEFAULT_AFE, DEFAULT_MAX_AV, DEFAULT_MAX_DISTANCE_PC, GridVariant, SamplerConfig, SamplerKind};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "starfit", version, about = "Fit stellar parameters against the Dartmouth model grids")]
pub struct Cli {
    /// Grid directory (defaults to $ISOCHRONES/dartmouth).
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Never download the grid archive.
    #[arg(long, global = true)]
    pub offline: bool,

    /// Alpha-enhancement tag of the grid variant.
    #[arg(long, global = true, default_value = DEFAULT_AFE)]
    pub afe: String,

    /// Helium tag of the grid variant (empty for the standard grids).
    #[arg(long, global = true, default_value = "")]
    pub y: String,

    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn variant(&self) -> GridVariant {
        GridVariant::new(self.afe.clone(), self.y.clone())
    }

    /// Apply the global overrides to environment-derived settings.
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(dir) = &self.data_dir {
            settings.data_dir = dir.clone();
        }
        if self.offline {
            settings.allow_download = false;
        }
        settings
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit mass, age, [Fe/H], distance, and A_V to observed properties.
    Fit(FitArgs),
    /// Show which grid column a band alias resolves to.
    Band(BandArgs),
    /// Build (or rebuild) the caches for a photometric system and describe them.
    Grid(GridArgs),
    /// Summarize a saved posterior sample.
    Summary(SummaryArgs),
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// CSV of observed properties (`name,value,uncertainty`).
    #[arg(long, value_name = "CSV")]
    pub props: Option<PathBuf>,

    /// Extra property as `name=value,uncertainty` (repeatable).
    #[arg(short = 'p', long = "prop", value_name = "NAME=VALUE,UNC")]
    pub prop: Vec<String>,

    #[arg(long, value_enum, default_value_t = SamplerKind::Nested)]
    pub sampler: SamplerKind,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Ensemble walkers.
    #[arg(long, default_value_t = 200)]
    pub nwalkers: usize,

    /// Ensemble burn-in steps.
    #[arg(long, default_value_t = 100)]
    pub nburn: usize,

    /// Ensemble production steps.
    #[arg(long, default_value_t = 200)]
    pub niter: usize,

    /// Prior draws per walker when looking for valid starting points.
    #[arg(long, default_value_t = 100)]
    pub ninitial: usize,

    /// Nested-sampling live points.
    #[arg(long, default_value_t = 400)]
    pub n_live: usize,

    /// Nested-sampling iteration cap.
    #[arg(long, default_value_t = 20_000)]
    pub max_iter: usize,

    /// Nested-sampling stopping threshold on the remaining log-evidence.
    #[arg(long, default_value_t = 0.5)]
    pub dlogz: f64,

    /// Random-walk steps per nested replacement.
    #[arg(long, default_value_t = 25)]
    pub walk_steps: usize,

    /// Upper edge of the distance prior (pc).
    #[arg(long, default_value_t = DEFAULT_MAX_DISTANCE_PC)]
    pub max_distance: f64,

    /// Upper edge of the extinction prior (mag).
    #[arg(long, default_value_t = DEFAULT_MAX_AV)]
    pub max_av: f64,

    /// Write the posterior sample to this Parquet file.
    #[arg(short, long, value_name = "PARQUET")]
    pub output: Option<PathBuf>,
}

impl FitArgs {
    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            seed: self.seed,
            nwalkers: self.nwalkers,
            nburn: self.nburn,
            niter: self.niter,
            ninitial: self.ninitial,
            n_live: self.n_live,
            max_iter: self.max_iter,
            dlogz: self.dlogz,
            walk_steps: self.walk_steps,
        }
    }
}

#[derive(Debug, Args)]
pub struct BandArgs {
    /// Band names or aliases (e.g. `g`, `K`, `Kepler`, `F555W`).
    #[arg(required = true)]
    pub names: Vec<String>,
}

#[derive(Debug, Args)]
pub struct GridArgs {
    /// Photometric system name (e.g. `SDSSugriz`, `UBVRIJHKsKp`).
    pub system: String,

    /// Ignore the cached table and triangulation.
    #[arg(long)]
    pub rebuild: bool,
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    /// Posterior sample written by `starfit fit --output`.
    pub path: PathBuf,
}

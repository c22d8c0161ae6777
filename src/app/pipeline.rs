//! The `fit` workflow, independent of how results are presented:
//! constraints (file + inline) -> star model -> sampler -> optional save.

use std::path::Path;

use crate::config::Settings;
use crate::domain::{GridVariant, ObservedConstraint, SamplerConfig, SamplerKind};
use crate::error::AppError;
use crate::io::{RowError, load_props, parse_inline_constraint};
use crate::models::{Isochrone, StarModel};

/// Everything a front-end needs after `starfit fit`.
#[derive(Debug)]
pub struct FitRun {
    pub star: StarModel,
    pub row_errors: Vec<RowError>,
}

/// Request for one fit.
#[derive(Debug, Clone)]
pub struct FitRequest<'a> {
    pub props: Option<&'a Path>,
    pub inline: &'a [String],
    pub sampler: SamplerKind,
    pub config: SamplerConfig,
    pub max_distance: f64,
    pub max_av: f64,
    pub output: Option<&'a Path>,
}

/// File rows first, then inline ones; a later entry with the same name
/// replaces the earlier one.
pub fn gather_constraints(
    props: Option<&Path>,
    inline: &[String],
) -> Result<(Vec<ObservedConstraint>, Vec<RowError>), AppError> {
    let mut constraints = Vec::new();
    let mut row_errors = Vec::new();
    if let Some(path) = props {
        let ingested = load_props(path)?;
        tracing::info!(
            path = %path.display(),
            rows = ingested.rows_read,
            kept = ingested.constraints.len(),
            "Read observed properties"
        );
        constraints = ingested.constraints;
        row_errors = ingested.row_errors;
    }
    for arg in inline {
        let c = parse_inline_constraint(arg)?;
        match constraints.iter_mut().find(|o| o.name == c.name) {
            Some(existing) => *existing = c,
            None => constraints.push(c),
        }
    }
    if constraints.is_empty() {
        return Err(AppError::Config(
            "No observed properties given; use --props and/or --prop.".into(),
        ));
    }
    Ok((constraints, row_errors))
}

pub fn run_fit(settings: &Settings, variant: &GridVariant, req: &FitRequest<'_>) -> Result<FitRun, AppError> {
    let (constraints, row_errors) = gather_constraints(req.props, req.inline)?;

    let isochrone = Isochrone::new(settings.clone(), variant.clone());
    let mut star = StarModel::new(isochrone, constraints)?
        .with_max_distance(req.max_distance)?
        .with_max_av(req.max_av)?;

    if let Ok(guess) = star.maximum_likelihood_guess() {
        tracing::info!(?guess, "Best tabulated starting point");
    }
    star.fit(req.sampler, &req.config)?;

    if let Some(path) = req.output {
        star.save(path)?;
    }
    Ok(FitRun { star, row_errors })
}

//! Top-level application orchestration.
//!
//! `src/main.rs` only maps errors to exit codes; this is the real main: parse
//! arguments, set up logging and settings, dispatch, print.

use clap::Parser;

use crate::cli::{BandArgs, Cli, Command, FitArgs, GridArgs, SummaryArgs};
use crate::config::Settings;
use crate::domain::{GridVariant, PhotSystem, resolve_band};
use crate::error::AppError;
use crate::grid::GridAggregator;
use crate::io::load_samples;
use crate::models::{Isochrone, extinction_ratio};

pub mod pipeline;

/// Entry point for the `starfit` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    crate::logging::init(cli.verbose)?;

    let settings = cli.apply(Settings::from_env()?);
    let variant = cli.variant();
    tracing::debug!(data_dir = %settings.data_dir.display(), allow_download = settings.allow_download, "Settings");

    match &cli.command {
        Command::Fit(args) => handle_fit(&settings, &variant, args),
        Command::Band(args) => handle_band(args),
        Command::Grid(args) => handle_grid(&settings, &variant, args),
        Command::Summary(args) => handle_summary(args),
    }
}

fn handle_fit(settings: &Settings, variant: &GridVariant, args: &FitArgs) -> Result<(), AppError> {
    let req = pipeline::FitRequest {
        props: args.props.as_deref(),
        inline: &args.prop,
        sampler: args.sampler,
        config: args.sampler_config(),
        max_distance: args.max_distance,
        max_av: args.max_av,
        output: args.output.as_deref(),
    };
    let run = pipeline::run_fit(settings, variant, &req)?;
    let star = &run.star;

    for e in &run.row_errors {
        eprintln!("skipped line {}: {}", e.line, e.message);
    }

    let sample = star
        .sample()
        .ok_or_else(|| AppError::Sampler("The fit produced no sample.".into()))?;
    let record = star.fit_record(&sample.sampler);
    println!("{}", crate::report::format_fit_summary(&record, sample, star.best_fit())?);

    let predicted = star.best_fit().map(|b| star.predicted(b)).transpose()?;
    println!("{}", crate::report::format_constraints(star.constraints(), predicted.as_deref()));

    if let Some(path) = &args.output {
        println!("Saved posterior sample to {}", path.display());
    }
    Ok(())
}

fn handle_band(args: &BandArgs) -> Result<(), AppError> {
    for name in &args.names {
        let band = resolve_band(name)?;
        let ratio = extinction_ratio(&band)?;
        println!("{name:<12} {:<12} {:<14} A/Av={ratio:.3}", band.system.name(), band.band);
    }
    Ok(())
}

fn handle_grid(settings: &Settings, variant: &GridVariant, args: &GridArgs) -> Result<(), AppError> {
    let system = PhotSystem::from_name(&args.system).ok_or_else(|| {
        let known: Vec<&str> = PhotSystem::ALL.iter().map(|s| s.name()).collect();
        AppError::Lookup(format!(
            "Unknown photometric system `{}` (known: {}).",
            args.system,
            known.join(", ")
        ))
    })?;

    if args.rebuild {
        for path in [
            settings.grid_cache_path(system, variant),
            settings.tri_cache_path(system, variant),
        ] {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::info!(path = %path.display(), "Removed cache"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    let aggregator = GridAggregator::dartmouth(settings.clone(), variant.clone());
    let iso = Isochrone::from_aggregator(aggregator);
    let model = iso.system(system)?;
    let bounds = model.grid.bounds()?;
    print!("{}", crate::report::format_grid_summary(&model, &bounds));
    Ok(())
}

fn handle_summary(args: &SummaryArgs) -> Result<(), AppError> {
    let (sample, record) = load_samples(&args.path)?;
    let best = sample.best_row().map(<[f64]>::to_vec);
    println!("{}", crate::report::format_fit_summary(&record, &sample, best.as_deref())?);
    println!("{}", crate::report::format_constraints(&record.constraints, None));
    Ok(())
}

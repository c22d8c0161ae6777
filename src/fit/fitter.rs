//! Backend selection and the fit entry point.

use crate::domain::{SamplerConfig, SamplerKind};
use crate::error::AppError;
use crate::fit::ensemble::EnsembleSampler;
use crate::fit::sampler::{Posterior, PosteriorSample, Sampler};

/// Backend for `kind`.
///
/// Without the `nested` feature, `Nested` falls back to the ensemble backend
/// with a warning.
pub fn resolve_sampler(kind: SamplerKind) -> Box<dyn Sampler> {
    match kind {
        SamplerKind::Ensemble => Box::new(EnsembleSampler::default()),
        SamplerKind::Nested => nested_backend(),
    }
}

#[cfg(feature = "nested")]
fn nested_backend() -> Box<dyn Sampler> {
    Box::new(crate::fit::nested::NestedSampler)
}

#[cfg(not(feature = "nested"))]
fn nested_backend() -> Box<dyn Sampler> {
    tracing::warn!("Nested sampling is not available in this build; falling back to the ensemble sampler");
    Box::new(EnsembleSampler::default())
}

/// Sample `target` with the backend for `kind`.
pub fn run_fit(
    target: &dyn Posterior,
    kind: SamplerKind,
    config: &SamplerConfig,
) -> Result<PosteriorSample, AppError> {
    let sampler = resolve_sampler(kind);
    tracing::info!(
        sampler = sampler.name(),
        ndim = target.ndim(),
        seed = config.seed,
        "Starting fit"
    );
    let sample = sampler.run(target, config)?;
    sample.check_shape()?;
    if sample.is_empty() {
        return Err(AppError::Sampler(format!("{} sampler returned no samples.", sampler.name())));
    }
    Ok(sample)
}

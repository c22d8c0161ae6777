//! Affine-invariant ensemble MCMC (Goodman & Weare 2010 stretch move).
//!
//! The ensemble is split in two halves; each half is updated in parallel
//! against the other (frozen) half, which keeps the move valid while letting
//! rayon evaluate walkers concurrently. Every walker/step draws from its own
//! seeded RNG stream, so results do not depend on thread scheduling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::domain::SamplerConfig;
use crate::error::AppError;
use crate::fit::sampler::{Posterior, PosteriorSample, Sampler};
use crate::fit::stream_seed;

#[derive(Debug, Clone, Copy)]
pub struct EnsembleSampler {
    /// Stretch scale `a` (> 1).
    pub a: f64,
}

impl Default for EnsembleSampler {
    fn default() -> Self {
        Self { a: 2.0 }
    }
}

impl EnsembleSampler {
    /// Uniform prior-box draws until `nwalkers` have a finite log-posterior.
    fn initial_walkers(
        &self,
        target: &dyn Posterior,
        config: &SamplerConfig,
    ) -> Result<(Vec<Vec<f64>>, Vec<f64>), AppError> {
        let bounds = target.bounds();
        if bounds.iter().any(|(lo, hi)| !lo.is_finite() || !hi.is_finite() || hi <= lo) {
            return Err(AppError::Sampler(format!("Prior box is not finite: {bounds:?}.")));
        }

        let nw = config.nwalkers;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut walkers = Vec::with_capacity(nw);
        let mut lps = Vec::with_capacity(nw);
        let mut drawn = 0usize;
        let max_draws = config.ninitial.max(1) * nw;

        while walkers.len() < nw && drawn < max_draws {
            let batch: Vec<Vec<f64>> = (0..nw.min(max_draws - drawn))
                .map(|_| bounds.iter().map(|&(lo, hi)| rng.gen_range(lo..hi)).collect())
                .collect();
            drawn += batch.len();

            let scored: Vec<f64> = batch.par_iter().map(|p| target.log_posterior(p)).collect();
            for (p, lp) in batch.into_iter().zip(scored) {
                if lp.is_finite() && walkers.len() < nw {
                    walkers.push(p);
                    lps.push(lp);
                }
            }
        }

        if walkers.len() < nw {
            return Err(AppError::Sampler(format!(
                "Only {} of {nw} walkers found a finite posterior in {drawn} prior draws.",
                walkers.len()
            )));
        }
        tracing::debug!(drawn, walkers = nw, "Initialized ensemble");
        Ok((walkers, lps))
    }
}

impl Sampler for EnsembleSampler {
    fn name(&self) -> &'static str {
        "ensemble"
    }

    fn run(&self, target: &dyn Posterior, config: &SamplerConfig) -> Result<PosteriorSample, AppError> {
        let ndim = target.ndim();
        let nw = config.nwalkers;
        if nw < 2 * ndim || nw % 2 != 0 {
            return Err(AppError::Config(format!(
                "nwalkers must be even and at least {} (got {nw}).",
                2 * ndim
            )));
        }
        if config.niter == 0 {
            return Err(AppError::Config("niter must be positive.".into()));
        }
        if self.a <= 1.0 {
            return Err(AppError::Config(format!("Stretch scale must exceed 1 (got {}).", self.a)));
        }

        let (mut walkers, mut lps) = self.initial_walkers(target, config)?;
        let half = nw / 2;
        let total_steps = config.nburn + config.niter;

        let mut rows = Vec::with_capacity(config.niter * nw);
        let mut log_prob = Vec::with_capacity(config.niter * nw);
        let mut accepted = 0usize;
        let mut proposed = 0usize;

        for step in 0..total_steps {
            for h in 0..2 {
                let (active, other) = if h == 0 { (0..half, half..nw) } else { (half..nw, 0..half) };
                let frozen = &walkers[other.clone()];

                let moves: Vec<Option<(Vec<f64>, f64)>> = active
                    .clone()
                    .into_par_iter()
                    .map(|k| {
                        let mut rng = StdRng::seed_from_u64(stream_seed(config.seed, step as u64, k as u64));
                        let partner = &frozen[rng.gen_range(0..frozen.len())];
                        let u: f64 = rng.r#gen();
                        let z = ((self.a - 1.0) * u + 1.0).powi(2) / self.a;

                        let proposal: Vec<f64> = walkers[k]
                            .iter()
                            .zip(partner)
                            .map(|(x, c)| c + z * (x - c))
                            .collect();
                        let lp = target.log_posterior(&proposal);
                        let log_accept = (ndim as f64 - 1.0) * z.ln() + lp - lps[k];
                        let r: f64 = rng.r#gen();
                        (lp.is_finite() && r.ln() < log_accept).then_some((proposal, lp))
                    })
                    .collect();

                for (k, mv) in active.zip(moves) {
                    proposed += 1;
                    if let Some((p, lp)) = mv {
                        walkers[k] = p;
                        lps[k] = lp;
                        accepted += 1;
                    }
                }
            }

            if step >= config.nburn {
                rows.extend(walkers.iter().cloned());
                log_prob.extend_from_slice(&lps);
            }
        }

        let acceptance = accepted as f64 / proposed.max(1) as f64;
        tracing::info!(
            walkers = nw,
            steps = total_steps,
            samples = rows.len(),
            acceptance,
            "Ensemble sampling finished"
        );

        Ok(PosteriorSample {
            param_names: target.param_names(),
            rows,
            log_prob,
            weights: None,
            sampler: self.name().to_string(),
            acceptance_fraction: Some(acceptance),
            log_evidence: None,
        })
    }
}

//! Nested sampling (Skilling 2004) with constrained random-walk replacement.
//!
//! Live points are drawn uniformly from the prior box (restricted to points
//! with a finite likelihood; the accepted fraction is folded into the
//! evidence). Each iteration retires the worst live point with prior-volume
//! weight `X_{i-1} - X_i`, `X_i = exp(-i / n_live)`, and replaces it by a
//! Metropolis walk from a random survivor that must stay above the retired
//! likelihood.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::domain::SamplerConfig;
use crate::error::AppError;
use crate::fit::sampler::{Posterior, PosteriorSample, Sampler};
use crate::math::{log_add_exp, log_sum_exp};

/// Random-walk scale adapts towards this acceptance rate.
const TARGET_ACCEPT: f64 = 0.5;
const MAX_DRAWS_PER_LIVE: usize = 1000;

#[derive(Debug, Clone, Copy, Default)]
pub struct NestedSampler;

struct Live {
    x: Vec<f64>,
    log_l: f64,
}

impl NestedSampler {
    fn initial_live(
        &self,
        target: &dyn Posterior,
        bounds: &[(f64, f64)],
        n_live: usize,
        rng: &mut StdRng,
    ) -> Result<(Vec<Live>, f64), AppError> {
        let mut live = Vec::with_capacity(n_live);
        let mut drawn = 0usize;
        while live.len() < n_live && drawn < n_live * MAX_DRAWS_PER_LIVE {
            drawn += 1;
            let x: Vec<f64> = bounds.iter().map(|&(lo, hi)| rng.gen_range(lo..hi)).collect();
            if target.log_prior(&x) == f64::NEG_INFINITY {
                continue;
            }
            let log_l = target.log_likelihood(&x);
            if log_l.is_finite() {
                live.push(Live { x, log_l });
            }
        }
        if live.len() < n_live {
            return Err(AppError::Sampler(format!(
                "Only {} of {n_live} live points have a finite likelihood after {drawn} prior draws.",
                live.len()
            )));
        }
        // Fraction of the prior box with finite likelihood.
        let log_support = (n_live as f64 / drawn as f64).ln();
        Ok((live, log_support))
    }

    /// Per-dimension standard deviation of the live set.
    fn spread(live: &[Live], ndim: usize) -> Vec<f64> {
        let n = live.len() as f64;
        (0..ndim)
            .map(|d| {
                let mu = live.iter().map(|p| p.x[d]).sum::<f64>() / n;
                let var = live.iter().map(|p| (p.x[d] - mu).powi(2)).sum::<f64>() / n;
                var.sqrt().max(1e-12)
            })
            .collect()
    }
}

impl Sampler for NestedSampler {
    fn name(&self) -> &'static str {
        "nested"
    }

    fn run(&self, target: &dyn Posterior, config: &SamplerConfig) -> Result<PosteriorSample, AppError> {
        let ndim = target.ndim();
        let n_live = config.n_live;
        if n_live < 2 {
            return Err(AppError::Config(format!("n_live must be at least 2 (got {n_live}).")));
        }
        let bounds = target.bounds();
        if bounds.iter().any(|(lo, hi)| !lo.is_finite() || !hi.is_finite() || hi <= lo) {
            return Err(AppError::Sampler(format!("Prior box is not finite: {bounds:?}.")));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let (mut live, log_support) = self.initial_live(target, &bounds, n_live, &mut rng)?;

        let n = n_live as f64;
        // ln(1 - e^{-1/N}): shrinkage of each retired shell.
        let log_shell = (-(-1.0 / n).exp()).ln_1p();
        let mut log_z = f64::NEG_INFINITY;
        let mut dead: Vec<(Vec<f64>, f64, f64)> = Vec::new();
        let mut scale = 1.0f64;
        let mut iterations = 0usize;

        for i in 0..config.max_iter {
            iterations = i + 1;
            let worst = live
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.log_l.total_cmp(&b.1.log_l))
                .map(|(k, _)| k)
                .unwrap_or(0);
            let log_l_star = live[worst].log_l;
            let log_x_prev = -(i as f64) / n;
            let log_wt = log_x_prev + log_shell + log_l_star;
            log_z = log_add_exp(log_z, log_wt);
            dead.push((live[worst].x.clone(), log_l_star, log_wt));

            let max_live = live.iter().map(|p| p.log_l).fold(f64::NEG_INFINITY, f64::max);
            let log_remaining = max_live - (i as f64 + 1.0) / n;
            if log_add_exp(log_z, log_remaining) - log_z < config.dlogz {
                break;
            }

            // Walk from a random survivor.
            let sigma = Self::spread(&live, ndim);
            let mut start = rng.gen_range(0..n_live - 1);
            if start >= worst {
                start += 1;
            }
            let mut x = live[start].x.clone();
            let mut log_l = live[start].log_l;
            let mut accepted = 0usize;
            for _ in 0..config.walk_steps.max(1) {
                let proposal: Vec<f64> = x
                    .iter()
                    .zip(&sigma)
                    .map(|(xi, s)| {
                        let step: f64 = rng.sample(StandardNormal);
                        xi + scale * s * step
                    })
                    .collect();
                if target.log_prior(&proposal) == f64::NEG_INFINITY {
                    continue;
                }
                let l = target.log_likelihood(&proposal);
                if l > log_l_star {
                    x = proposal;
                    log_l = l;
                    accepted += 1;
                }
            }
            let rate = accepted as f64 / config.walk_steps.max(1) as f64;
            scale *= if rate > TARGET_ACCEPT { 1.1 } else { 1.0 / 1.1 };
            scale = scale.clamp(1e-3, 10.0);

            live[worst] = Live { x, log_l };
        }

        // Remaining live points share the final prior volume.
        let log_x_final = -(iterations as f64) / n;
        for p in &live {
            let log_wt = log_x_final - n.ln() + p.log_l;
            log_z = log_add_exp(log_z, log_wt);
            dead.push((p.x.clone(), p.log_l, log_wt));
        }

        let log_wts: Vec<f64> = dead.iter().map(|d| d.2).collect();
        let norm = log_sum_exp(&log_wts);
        let weights: Vec<f64> = log_wts.iter().map(|w| (w - norm).exp()).collect();
        let log_evidence = log_z + log_support;

        tracing::info!(
            iterations,
            n_live,
            samples = dead.len(),
            log_evidence,
            "Nested sampling finished"
        );

        let (rows, log_prob): (Vec<Vec<f64>>, Vec<f64>) = dead.into_iter().map(|(x, l, _)| (x, l)).unzip();
        Ok(PosteriorSample {
            param_names: target.param_names(),
            rows,
            log_prob,
            weights: Some(weights),
            sampler: self.name().to_string(),
            acceptance_fraction: None,
            log_evidence: Some(log_evidence),
        })
    }
}

//! Sampler strategy and its inputs/outputs.
//!
//! A backend only sees a [`Posterior`]: a log-prior, a log-likelihood, and the
//! box that supports the (flat) prior. It returns a [`PosteriorSample`].

use serde::{Deserialize, Serialize};

use crate::domain::SamplerConfig;
use crate::error::AppError;
use crate::math::weighted_quantile;

/// Target distribution for a sampler.
pub trait Posterior: Sync {
    fn ndim(&self) -> usize;

    fn param_names(&self) -> Vec<String>;

    fn log_prior(&self, params: &[f64]) -> f64;

    fn log_likelihood(&self, params: &[f64]) -> f64;

    /// `(lo, hi)` per dimension; the prior is zero outside.
    fn bounds(&self) -> Vec<(f64, f64)>;

    fn log_posterior(&self, params: &[f64]) -> f64 {
        let lp = self.log_prior(params);
        if lp == f64::NEG_INFINITY {
            return lp;
        }
        lp + self.log_likelihood(params)
    }
}

pub trait Sampler {
    fn name(&self) -> &'static str;

    fn run(&self, target: &dyn Posterior, config: &SamplerConfig) -> Result<PosteriorSample, AppError>;
}

/// Draws from a posterior, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorSample {
    pub param_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    /// Log-posterior per row (log-likelihood for nested samples).
    pub log_prob: Vec<f64>,
    /// Normalized importance weights; `None` means equally weighted.
    pub weights: Option<Vec<f64>>,
    /// Which backend produced the sample.
    pub sampler: String,
    pub acceptance_fraction: Option<f64>,
    pub log_evidence: Option<f64>,
}

impl PosteriorSample {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.param_names.iter().position(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Result<Vec<f64>, AppError> {
        let i = self.param_index(name).ok_or_else(|| {
            AppError::Lookup(format!(
                "Unknown parameter `{name}` (have: {}).",
                self.param_names.join(", ")
            ))
        })?;
        Ok(self.rows.iter().map(|r| r[i]).collect())
    }

    /// Quantiles of one parameter; weighted when the sample carries weights.
    pub fn quantiles(&self, name: &str, qs: &[f64]) -> Result<Vec<f64>, AppError> {
        let col = self.column(name)?;
        let w = self.weights.as_deref();
        Ok(qs.iter().map(|&q| weighted_quantile(&col, w, q)).collect())
    }

    /// Row with the highest `log_prob`.
    pub fn best_row(&self) -> Option<&[f64]> {
        self.log_prob
            .iter()
            .enumerate()
            .filter(|(_, lp)| lp.is_finite())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| self.rows[i].as_slice())
    }

    pub fn check_shape(&self) -> Result<(), AppError> {
        let n = self.rows.len();
        let ndim = self.param_names.len();
        if self.log_prob.len() != n || self.weights.as_ref().is_some_and(|w| w.len() != n) {
            return Err(AppError::Sampler(format!(
                "Sample has {n} rows but {} log_prob values.",
                self.log_prob.len()
            )));
        }
        if let Some(bad) = self.rows.iter().position(|r| r.len() != ndim) {
            return Err(AppError::Sampler(format!(
                "Row {bad} has {} values, expected {ndim}.",
                self.rows[bad].len()
            )));
        }
        Ok(())
    }
}

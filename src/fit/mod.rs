//! Posterior sampling.
//!
//! Responsibilities:
//!
//! - the `Posterior` / `Sampler` seams and the `PosteriorSample` result
//! - the affine-invariant ensemble backend (parallel walker updates)
//! - the nested-sampling backend (feature `nested`)
//! - backend selection with fallback

pub mod ensemble;
pub mod fitter;
#[cfg(feature = "nested")]
pub mod nested;
pub mod sampler;

pub use ensemble::*;
pub use fitter::*;
#[cfg(feature = "nested")]
pub use nested::*;
pub use sampler::*;

/// Independent RNG seed for stream `(a, b)` of a run (SplitMix64 mixing).
pub fn stream_seed(seed: u64, a: u64, b: u64) -> u64 {
    fn mix(mut z: u64) -> u64 {
        z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }
    mix(mix(mix(seed) ^ a) ^ b)
}

#[cfg(test)]
pub(crate) mod tests_support {
    //! Independent Gaussian in a `[-10, 10]^d` box.

    use super::Posterior;

    pub struct Gaussian {
        pub mean: Vec<f64>,
        pub sd: Vec<f64>,
        pub reject_all: bool,
    }

    impl Gaussian {
        pub fn new(mean: Vec<f64>, sd: Vec<f64>) -> Self {
            Self {
                mean,
                sd,
                reject_all: false,
            }
        }
    }

    impl Posterior for Gaussian {
        fn ndim(&self) -> usize {
            self.mean.len()
        }

        fn param_names(&self) -> Vec<String> {
            (0..self.ndim()).map(|d| format!("x{d}")).collect()
        }

        fn log_prior(&self, p: &[f64]) -> f64 {
            if self.reject_all || p.iter().any(|x| !(-10.0..=10.0).contains(x)) {
                f64::NEG_INFINITY
            } else {
                0.0
            }
        }

        fn log_likelihood(&self, p: &[f64]) -> f64 {
            -0.5 * p
                .iter()
                .zip(self.mean.iter().zip(&self.sd))
                .map(|(x, (m, s))| ((x - m) / s).powi(2))
                .sum::<f64>()
        }

        fn bounds(&self) -> Vec<(f64, f64)> {
            vec![(-10.0, 10.0); self.ndim()]
        }
    }
}

//! Sample statistics used by the samplers and the posterior summary.

/// `ln Σ exp(x_i)` without overflow. Returns `-inf` for an empty slice.
pub fn log_sum_exp(xs: &[f64]) -> f64 {
    let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + xs.iter().map(|x| (x - max).exp()).sum::<f64>().ln()
}

/// `ln(e^a + e^b)`.
pub fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// Weighted quantile with linear interpolation of the cumulative weight.
///
/// `weights` of `None` means equal weights. Non-finite values are skipped.
/// Returns `NaN` when nothing usable is left.
pub fn weighted_quantile(values: &[f64], weights: Option<&[f64]>, q: f64) -> f64 {
    let mut pairs: Vec<(f64, f64)> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| (v, weights.map_or(1.0, |w| w[i])))
        .filter(|(v, w)| v.is_finite() && w.is_finite() && *w > 0.0)
        .collect();
    if pairs.is_empty() {
        return f64::NAN;
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let total: f64 = pairs.iter().map(|p| p.1).sum();
    let q = q.clamp(0.0, 1.0);
    // Midpoint rule: the i-th sample sits at (cum_i - w_i / 2) / total.
    let mut cum = 0.0;
    let mut prev: Option<(f64, f64)> = None;
    for &(v, w) in &pairs {
        let pos = (cum + 0.5 * w) / total;
        cum += w;
        if pos >= q {
            return match prev {
                Some((pv, ppos)) if pos > ppos => pv + (v - pv) * (q - ppos) / (pos - ppos),
                _ => v,
            };
        }
        prev = Some((v, pos));
    }
    pairs[pairs.len() - 1].0
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

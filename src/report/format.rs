//! Plain-text formatting of fits, constraints, and grids.
//!
//! All formatting lives here so the numerical code stays free of layout
//! concerns. Functions return `String`s; the caller decides where they go.

use crate::domain::{GridBounds, ObservedConstraint};
use crate::error::AppError;
use crate::fit::PosteriorSample;
use crate::io::FitRecord;
use crate::models::SystemModel;

/// Quantiles reported per parameter.
pub const SUMMARY_QUANTILES: [f64; 3] = [0.16, 0.5, 0.84];

/// One row of the posterior table.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSummary {
    pub name: String,
    pub q16: f64,
    pub q50: f64,
    pub q84: f64,
    pub best: Option<f64>,
}

pub fn summarize(sample: &PosteriorSample, best: Option<&[f64]>) -> Result<Vec<ParamSummary>, AppError> {
    sample
        .param_names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let q = sample.quantiles(name, &SUMMARY_QUANTILES)?;
            Ok(ParamSummary {
                name: name.clone(),
                q16: q[0],
                q50: q[1],
                q84: q[2],
                best: best.and_then(|b| b.get(i).copied()),
            })
        })
        .collect()
}

/// Kish effective sample size; the row count for unweighted samples.
pub fn effective_sample_size(sample: &PosteriorSample) -> f64 {
    match &sample.weights {
        Some(w) => {
            let s: f64 = w.iter().sum();
            let s2: f64 = w.iter().map(|x| x * x).sum();
            if s2 > 0.0 { s * s / s2 } else { 0.0 }
        }
        None => sample.len() as f64,
    }
}

/// Header, diagnostics, and the posterior table.
pub fn format_fit_summary(
    record: &FitRecord,
    sample: &PosteriorSample,
    best: Option<&[f64]>,
) -> Result<String, AppError> {
    let mut out = String::new();

    out.push_str(&format!(
        "=== starfit - {} {}{} ===\n",
        record.grid, record.afe, record.y
    ));
    out.push_str(&format!(
        "Fitted: {} (v{})\n",
        record.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        record.version
    ));
    if !record.bands.is_empty() {
        out.push_str(&format!("Bands: {}\n", record.bands.join(", ")));
    }

    out.push_str("\nSampler diagnostics:\n");
    out.push_str(&format!("- backend: {}\n", sample.sampler));
    out.push_str(&format!(
        "- samples: {} (effective {:.1})\n",
        sample.len(),
        effective_sample_size(sample)
    ));
    if let Some(a) = sample.acceptance_fraction {
        out.push_str(&format!("- acceptance: {a:.3}\n"));
    }
    if let Some(z) = sample.log_evidence {
        out.push_str(&format!("- log evidence: {z:.3}\n"));
    }

    out.push_str("\nPosterior:\n");
    out.push_str(&format_param_table(&summarize(sample, best)?));
    Ok(out)
}

pub fn format_param_table(rows: &[ParamSummary]) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!(
            "{:<10} {:>12} {:>12} {:>12} {:>12}",
            "param", "q16", "median", "q84", "best"
        ),
    );
    push_line(
        &mut out,
        format!("{:-<10} {:-<12} {:-<12} {:-<12} {:-<12}", "", "", "", "", ""),
    );
    for r in rows {
        push_line(
            &mut out,
            format!(
                "{:<10} {:>12} {:>12} {:>12} {:>12}",
                truncate(&r.name, 10),
                fmt_num(r.q16),
                fmt_num(r.q50),
                fmt_num(r.q84),
                r.best.map(fmt_num).unwrap_or_default(),
            ),
        );
    }
    out
}

/// Observed values next to the model (when a best fit is known).
pub fn format_constraints(constraints: &[ObservedConstraint], predicted: Option<&[f64]>) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!(
            "{:<10} {:>12} {:>10} {:>12} {:>8}",
            "property", "observed", "sigma", "model", "pull"
        ),
    );
    push_line(
        &mut out,
        format!("{:-<10} {:-<12} {:-<10} {:-<12} {:-<8}", "", "", "", "", ""),
    );
    for (i, c) in constraints.iter().enumerate() {
        let model = predicted.and_then(|p| p.get(i).copied());
        let pull = model.map(|m| (m - c.value) / c.uncertainty);
        push_line(
            &mut out,
            format!(
                "{:<10} {:>12} {:>10} {:>12} {:>8}",
                truncate(&c.name, 10),
                fmt_num(c.value),
                fmt_num(c.uncertainty),
                model.map(fmt_num).unwrap_or_default(),
                pull.map(|p| format!("{p:+.2}")).unwrap_or_default(),
            ),
        );
    }
    out
}

pub fn format_grid_summary(model: &SystemModel, bounds: &GridBounds) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "System: {} ({})\n",
        model.grid.system,
        model.grid.variant.suffix()
    ));
    out.push_str(&format!(
        "Rows: {} | columns: {}\n",
        model.grid.n_rows(),
        model.grid.table.n_cols()
    ));
    out.push_str(&format!(
        "Mass: [{:.3}, {:.3}] | log age: [{:.3}, {:.3}] | [Fe/H]: [{:.2}, {:.2}]\n",
        bounds.mass.0, bounds.mass.1, bounds.log_age.0, bounds.log_age.1, bounds.feh.0, bounds.feh.1
    ));
    out.push_str(&format!(
        "Triangulation: {} vertices, {} tetrahedra\n",
        model.tri.n_vertices(),
        model.tri.n_tets()
    ));
    out
}

fn push_line(out: &mut String, line: String) {
    out.push_str(line.trim_end());
    out.push('\n');
}

/// Fixed notation in a sensible range, scientific otherwise.
fn fmt_num(v: f64) -> String {
    let a = v.abs();
    if v == 0.0 || (1e-3..1e6).contains(&a) {
        format!("{v:.4}")
    } else if v.is_finite() {
        format!("{v:.3e}")
    } else {
        format!("{v}")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

//! Posterior sample persistence (Parquet + schema metadata).
//!
//! Layout: one `Float64` column per parameter, then `log_prob`, then `weight`
//! when the sample is importance-weighted. Everything needed to interpret the
//! file (grid identity, bands, constraints, prior box, sampler) lives in the
//! schema metadata.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ObservedConstraint, PriorBounds};
use crate::error::AppError;
use crate::fit::PosteriorSample;
use crate::io::columnar::{ColumnSet, read_columns, write_columns};

pub const COL_LOG_PROB: &str = "log_prob";
pub const COL_WEIGHT: &str = "weight";

const KEY_VERSION: &str = "stellar_grids.version";
const KEY_GRID: &str = "grid";
const KEY_AFE: &str = "afe";
const KEY_Y: &str = "y";
const KEY_BANDS: &str = "bands";
const KEY_CONSTRAINTS: &str = "constraints";
const KEY_PRIOR: &str = "prior";
const KEY_SAMPLER: &str = "sampler";
const KEY_CREATED_AT: &str = "created_at";
const KEY_ACCEPTANCE: &str = "acceptance_fraction";
const KEY_LOG_EVIDENCE: &str = "log_evidence";

/// Provenance stored alongside a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRecord {
    pub version: String,
    pub grid: String,
    pub afe: String,
    pub y: String,
    pub bands: Vec<String>,
    pub constraints: Vec<ObservedConstraint>,
    /// Prior box the sample was drawn under; absent in files that predate it.
    pub prior: Option<PriorBounds>,
    pub sampler: String,
    pub created_at: DateTime<Utc>,
}

pub fn save_samples(path: &Path, sample: &PosteriorSample, record: &FitRecord) -> Result<(), AppError> {
    sample.check_shape()?;

    let mut names = sample.param_names.clone();
    let mut columns: Vec<Vec<f64>> = (0..names.len())
        .map(|i| sample.rows.iter().map(|r| r[i]).collect())
        .collect();
    names.push(COL_LOG_PROB.to_string());
    columns.push(sample.log_prob.clone());
    if let Some(w) = &sample.weights {
        names.push(COL_WEIGHT.to_string());
        columns.push(w.clone());
    }

    let mut metadata = HashMap::from([
        (KEY_VERSION.to_string(), record.version.clone()),
        (KEY_GRID.to_string(), record.grid.clone()),
        (KEY_AFE.to_string(), record.afe.clone()),
        (KEY_Y.to_string(), record.y.clone()),
        (KEY_BANDS.to_string(), to_json(&record.bands)?),
        (KEY_CONSTRAINTS.to_string(), to_json(&record.constraints)?),
        (KEY_SAMPLER.to_string(), record.sampler.clone()),
        (
            KEY_CREATED_AT.to_string(),
            record.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
    ]);
    if let Some(prior) = &record.prior {
        metadata.insert(KEY_PRIOR.to_string(), to_json(prior)?);
    }
    if let Some(a) = sample.acceptance_fraction {
        metadata.insert(KEY_ACCEPTANCE.to_string(), a.to_string());
    }
    if let Some(z) = sample.log_evidence {
        metadata.insert(KEY_LOG_EVIDENCE.to_string(), z.to_string());
    }

    write_columns(
        path,
        &ColumnSet {
            names,
            columns,
            metadata,
        },
    )?;
    tracing::info!(path = %path.display(), rows = sample.len(), "Saved posterior sample");
    Ok(())
}

/// Read a sample and its record. The file is closed on return.
pub fn load_samples(path: &Path) -> Result<(PosteriorSample, FitRecord), AppError> {
    let set = read_columns(path)?;
    let meta = |k: &str| -> Result<String, AppError> {
        set.metadata.get(k).cloned().ok_or_else(|| {
            AppError::Config(format!("'{}' has no `{k}` metadata; not a sample file?", path.display()))
        })
    };
    let parse_err = |k: &str, e: &dyn std::fmt::Display| {
        AppError::Config(format!("Bad `{k}` metadata in '{}': {e}", path.display()))
    };

    let record = FitRecord {
        version: meta(KEY_VERSION)?,
        grid: meta(KEY_GRID)?,
        afe: meta(KEY_AFE)?,
        y: meta(KEY_Y)?,
        bands: serde_json::from_str(&meta(KEY_BANDS)?).map_err(|e| parse_err(KEY_BANDS, &e))?,
        constraints: serde_json::from_str(&meta(KEY_CONSTRAINTS)?)
            .map_err(|e| parse_err(KEY_CONSTRAINTS, &e))?,
        prior: set
            .metadata
            .get(KEY_PRIOR)
            .map(|v| serde_json::from_str(v).map_err(|e| parse_err(KEY_PRIOR, &e)))
            .transpose()?,
        sampler: meta(KEY_SAMPLER)?,
        created_at: DateTime::parse_from_rfc3339(&meta(KEY_CREATED_AT)?)
            .map_err(|e| parse_err(KEY_CREATED_AT, &e))?
            .with_timezone(&Utc),
    };
    let optional = |k: &str| -> Result<Option<f64>, AppError> {
        set.metadata
            .get(k)
            .map(|v| v.parse::<f64>().map_err(|e| parse_err(k, &e)))
            .transpose()
    };
    let acceptance_fraction = optional(KEY_ACCEPTANCE)?;
    let log_evidence = optional(KEY_LOG_EVIDENCE)?;

    let find = |name: &str| set.names.iter().position(|n| n == name);
    let lp_idx = find(COL_LOG_PROB).ok_or_else(|| {
        AppError::Config(format!("'{}' has no `{COL_LOG_PROB}` column.", path.display()))
    })?;
    let w_idx = find(COL_WEIGHT);

    let param_idx: Vec<usize> = (0..set.names.len())
        .filter(|&i| i != lp_idx && Some(i) != w_idx)
        .collect();
    let n = set.columns[lp_idx].len();
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|r| param_idx.iter().map(|&i| set.columns[i][r]).collect())
        .collect();

    let sample = PosteriorSample {
        param_names: param_idx.iter().map(|&i| set.names[i].clone()).collect(),
        rows,
        log_prob: set.columns[lp_idx].clone(),
        weights: w_idx.map(|i| set.columns[i].clone()),
        sampler: record.sampler.clone(),
        acceptance_fraction,
        log_evidence,
    };
    sample.check_shape()?;
    Ok((sample, record))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string(value).map_err(|e| AppError::Config(format!("Failed to encode metadata: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FitRecord {
        FitRecord {
            version: "0.1.0".into(),
            grid: "dartmouth".into(),
            afe: "afep0".into(),
            y: String::new(),
            bands: vec!["g".into(), "K".into()],
            constraints: vec![
                ObservedConstraint::new("g", 12.1, 0.02),
                ObservedConstraint::new("Teff", 5700.0, 80.0),
            ],
            prior: Some(PriorBounds {
                mass: (0.1, 3.5),
                log_age: (8.0, 10.1),
                feh: (-2.0, 0.5),
                distance: (0.0, 1200.0),
                av: (0.0, 0.25),
            }),
            sampler: "nested".into(),
            created_at: DateTime::parse_from_rfc3339("2026-10-19T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    fn sample() -> PosteriorSample {
        PosteriorSample {
            param_names: vec!["mass".into(), "log_age".into(), "feh".into()],
            rows: vec![vec![1.0, 9.5, -0.1], vec![0.9, 9.6, 0.05], vec![1.1, 9.4, f64::NAN]],
            log_prob: vec![-1.5, -2.0, -3.25],
            weights: Some(vec![0.5, 0.3, 0.2]),
            sampler: "nested".into(),
            acceptance_fraction: None,
            log_evidence: Some(-12.75),
        }
    }

    #[cfg(target_os = "linux")]
    fn open_handles_to(path: &Path) -> usize {
        let target = std::fs::canonicalize(path).unwrap();
        std::fs::read_dir("/proc/self/fd")
            .unwrap()
            .filter_map(Result::ok)
            .filter_map(|e| std::fs::read_link(e.path()).ok())
            .filter(|l| *l == target)
            .count()
    }

    #[test]
    fn sample_and_record_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fit.parquet");
        let s = sample();
        let r = record();
        save_samples(&path, &s, &r).unwrap();

        let (back, rec) = load_samples(&path).unwrap();
        assert_eq!(rec, r);
        assert_eq!(rec.bands, r.bands);
        assert_eq!(back.param_names, s.param_names);
        assert_eq!(back.log_prob, s.log_prob);
        assert_eq!(back.weights, s.weights);
        assert_eq!(back.log_evidence, Some(-12.75));
        assert_eq!(back.rows[..2], s.rows[..2]);
        assert!(back.rows[2][2].is_nan());

        #[cfg(target_os = "linux")]
        assert_eq!(open_handles_to(&path), 0);
    }

    #[test]
    fn unweighted_samples_have_no_weight_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fit.parquet");
        let mut s = sample();
        s.weights = None;
        s.acceptance_fraction = Some(0.4);
        save_samples(&path, &s, &record()).unwrap();

        let (back, rec) = load_samples(&path).unwrap();
        assert_eq!(rec.prior.unwrap().distance, (0.0, 1200.0));
        assert_eq!(back.weights, None);
        assert_eq!(back.acceptance_fraction, Some(0.4));
        assert_eq!(back.param_names.len(), 3);
    }

    #[test]
    fn records_without_a_prior_still_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fit.parquet");
        let r = FitRecord {
            prior: None,
            ..record()
        };
        save_samples(&path, &sample(), &r).unwrap();
        let (_, rec) = load_samples(&path).unwrap();
        assert_eq!(rec.prior, None);
        assert_eq!(rec, r);
    }

    #[test]
    fn malformed_prior_metadata_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fit.parquet");
        save_samples(&path, &sample(), &record()).unwrap();
        let mut set = read_columns(&path).unwrap();
        set.metadata.insert(KEY_PRIOR.to_string(), "{\"mass\": 1}".into());
        write_columns(&path, &set).unwrap();
        assert!(matches!(load_samples(&path), Err(AppError::Config(_))));
    }

    #[test]
    fn plain_parquet_is_not_a_sample_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.parquet");
        write_columns(
            &path,
            &ColumnSet {
                names: vec!["a".into()],
                columns: vec![vec![1.0]],
                metadata: HashMap::new(),
            },
        )
        .unwrap();
        assert!(matches!(load_samples(&path), Err(AppError::Config(_))));
    }
}

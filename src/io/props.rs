//! Observed-property ingest.
//!
//! Input is a CSV with columns `name,value,uncertainty` (header names are
//! case-insensitive; `unc`, `err`, `error`, and `sigma` are accepted for the
//! uncertainty). Bad rows are skipped and reported; a file with no usable row
//! is an error.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::domain::ObservedConstraint;
use crate::error::AppError;

const UNCERTAINTY_ALIASES: [&str; 5] = ["uncertainty", "unc", "err", "error", "sigma"];

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub name: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct IngestedProps {
    pub constraints: Vec<ObservedConstraint>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

pub fn load_props(path: &Path) -> Result<IngestedProps, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::Config(format!("Failed to open '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::Config(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    let columns = Columns::resolve(&header_map)?;

    let mut constraints = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    name: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, &columns) {
            Ok(c) => constraints.push(c),
            Err((name, message)) => row_errors.push(RowError { line, name, message }),
        }
    }

    for e in &row_errors {
        tracing::warn!(line = e.line, name = ?e.name, "Skipping property row: {}", e.message);
    }
    if constraints.is_empty() {
        return Err(AppError::Config(format!(
            "No valid property rows in '{}'.",
            path.display()
        )));
    }

    Ok(IngestedProps {
        constraints,
        row_errors,
        rows_read,
    })
}

/// Parse a `name=value,uncertainty` command-line constraint.
pub fn parse_inline_constraint(arg: &str) -> Result<ObservedConstraint, AppError> {
    let bad = |why: &str| AppError::Config(format!("Invalid property '{arg}': {why} (expected name=value,uncertainty)."));
    let (name, rest) = arg.split_once('=').ok_or_else(|| bad("missing '='"))?;
    let (value, unc) = rest.split_once(',').ok_or_else(|| bad("missing ','"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(bad("empty name"));
    }
    let value = parse_f64(value.trim()).map_err(|m| bad(&m))?;
    let unc = parse_f64(unc.trim()).map_err(|m| bad(&m))?;
    validate(name, value, unc).map_err(|m| bad(&m))
}

struct Columns {
    name: usize,
    value: usize,
    uncertainty: usize,
}

impl Columns {
    fn resolve(header_map: &HashMap<String, usize>) -> Result<Self, AppError> {
        let required = |col: &str| {
            header_map
                .get(col)
                .copied()
                .ok_or_else(|| AppError::Config(format!("Missing required column: `{col}`")))
        };
        let uncertainty = UNCERTAINTY_ALIASES
            .iter()
            .find_map(|a| header_map.get(*a).copied())
            .ok_or_else(|| AppError::Config("Missing required column: `uncertainty`".into()))?;
        Ok(Self {
            name: required("name")?,
            value: required("value")?,
            uncertainty,
        })
    }
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase()
}

fn parse_row(record: &StringRecord, cols: &Columns) -> Result<ObservedConstraint, (Option<String>, String)> {
    let field = |i: usize| record.get(i).map(str::trim).filter(|s| !s.is_empty());
    let name = field(cols.name).ok_or((None, "Missing required value: `name`".to_string()))?;
    let with_name = |m: String| (Some(name.to_string()), m);

    let value = field(cols.value)
        .ok_or_else(|| with_name("Missing required value: `value`".into()))
        .and_then(|s| parse_f64(s).map_err(with_name))?;
    let unc = field(cols.uncertainty)
        .ok_or_else(|| with_name("Missing required value: `uncertainty`".into()))
        .and_then(|s| parse_f64(s).map_err(with_name))?;

    validate(name, value, unc).map_err(with_name)
}

fn parse_f64(s: &str) -> Result<f64, String> {
    let v = s.parse::<f64>().map_err(|_| format!("`{s}` is not a number"))?;
    if v.is_finite() { Ok(v) } else { Err(format!("`{s}` is not finite")) }
}

fn validate(name: &str, value: f64, unc: f64) -> Result<ObservedConstraint, String> {
    if unc <= 0.0 {
        return Err(format!("uncertainty must be positive, got {unc}"));
    }
    Ok(ObservedConstraint::new(name, value, unc))
}

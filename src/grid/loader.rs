//! Dartmouth track/isochrone file parsing.
//!
//! File layout (whitespace-delimited):
//!
//! ```text
//! #NUMBER OF AGES= 71 MIX LEN PARAM= 1.938      <- fixed-size header block
//! ...
//! #AGE= 1.000 EEPS= 263                         <- age marker (Gyr)
//! #EEP   M/Mo    LogTeff  LogG   LogL/Lo  sdss_u ...   <- column names
//!    2 0.110103 3.5140 5.3430 -2.9070 ...       <- data rows
//!
//! #AGE= 1.250 EEPS= 262
//! ...
//! ```
//!
//! Age is never a data column: each `#AGE=` marker applies to every data row
//! until the next marker. Metallicity comes from the file name.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::grid::table::GridTable;
use crate::grid::{COL_AGE, COL_FEH};

/// Lines at the top of every file that never contain data.
pub const HEADER_LINES: usize = 8;

const AGE_MARKER: &str = "#AGE=";

/// One parsed file.
#[derive(Debug, Clone)]
pub struct ModelTrack {
    pub path: PathBuf,
    /// Metallicity from the file name; `None` when the name has no `feh` tag.
    pub feh: Option<f64>,
    /// Data columns plus the derived `age` column (linear Gyr).
    pub table: GridTable,
    /// Number of `#AGE=` blocks that contributed rows.
    pub n_ages: usize,
}

impl ModelTrack {
    /// Table with the `feh` column appended, or `None` if feh is unknown.
    pub fn into_table_with_feh(self) -> Option<GridTable> {
        let feh = self.feh?;
        let mut table = self.table;
        let n = table.n_rows();
        table.set_column(COL_FEH, vec![feh; n]).ok()?;
        Some(table)
    }
}

/// Read and parse one track file.
pub fn load_track(path: &Path) -> Result<ModelTrack, AppError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| AppError::data_format(path, format!("cannot read file: {e}")))?;
    let (table, n_ages) = parse_track(path, &contents)?;
    let feh = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(feh_from_filename);

    Ok(ModelTrack {
        path: path.to_path_buf(),
        feh,
        table,
        n_ages,
    })
}

/// Parse file contents. `path` is only used in error messages.
pub fn parse_track(path: &Path, contents: &str) -> Result<(GridTable, usize), AppError> {
    let mut names: Option<Vec<String>> = None;
    let mut last_comment: Option<&str> = None;
    let mut table: Option<GridTable> = None;
    let mut current_age: Option<f64> = None;
    let mut n_ages = 0usize;
    let mut age_has_rows = false;

    for (idx, raw) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim_start();

        if line.starts_with('#') {
            if let Some(parsed) = parse_age_marker(line) {
                let age = parsed.map_err(|msg| {
                    AppError::data_format(path, format!("line {line_no}: {msg}"))
                })?;
                current_age = Some(age);
                age_has_rows = false;
            } else {
                last_comment = Some(line);
            }
            continue;
        }

        if idx < HEADER_LINES || !line.bytes().any(|b| b.is_ascii_digit()) {
            continue;
        }

        // First data row: column names come from the comment right before it.
        if names.is_none() {
            let header = last_comment.ok_or_else(|| {
                AppError::data_format(path, format!("line {line_no}: data row without a column-name line"))
            })?;
            let cols = column_names(header);
            if cols.is_empty() {
                return Err(AppError::data_format(path, "empty column-name line"));
            }
            let mut all = cols.clone();
            all.push(COL_AGE.to_string());
            table = Some(GridTable::new(all));
            names = Some(cols);
        }

        let Some(age) = current_age else {
            return Err(AppError::data_format(
                path,
                format!("line {line_no}: data row before any {AGE_MARKER} marker"),
            ));
        };

        let expected = names.as_ref().map_or(0, Vec::len);
        let mut row = Vec::with_capacity(expected + 1);
        for tok in line.split_whitespace() {
            let v = tok.parse::<f64>().map_err(|_| {
                AppError::data_format(path, format!("line {line_no}: invalid number '{tok}'"))
            })?;
            row.push(v);
        }
        if row.len() != expected {
            return Err(AppError::data_format(
                path,
                format!("line {line_no}: expected {expected} fields, found {}", row.len()),
            ));
        }
        row.push(age);

        if let Some(t) = table.as_mut() {
            t.push_row(&row)?;
        }
        if !age_has_rows {
            n_ages += 1;
            age_has_rows = true;
        }
    }

    match table {
        Some(t) if !t.is_empty() => Ok((t, n_ages)),
        _ => Err(AppError::data_format(path, "no data rows found")),
    }
}

/// Parse an `#AGE=` marker line.
///
/// Returns `None` when the line is not a marker, `Some(Err)` when it is a
/// malformed one.
fn parse_age_marker(line: &str) -> Option<Result<f64, String>> {
    let rest = line.strip_prefix(AGE_MARKER)?;
    let token = rest.split_whitespace().next().unwrap_or("");

    let valid = match token.split_once('.') {
        Some((int, frac)) => {
            !int.is_empty()
                && !frac.is_empty()
                && int.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    };
    if !valid {
        return Some(Err(format!("malformed age marker '{}'", line.trim_end())));
    }
    Some(
        token
            .parse::<f64>()
            .map_err(|e| format!("malformed age marker '{}': {e}", line.trim_end())),
    )
}

/// Column names from a `#`-prefixed header line.
///
/// Characters other than ASCII alphanumerics and `_` are dropped, so
/// `M/Mo` -> `MMo` and `LogL/Lo` -> `LogLLo`.
fn column_names(line: &str) -> Vec<String> {
    line.trim_start_matches('#')
        .split_whitespace()
        .map(|tok| {
            tok.chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Metallicity encoded in a file name as `feh{m|p}{digits}afe`.
///
/// `fehm05afep0` -> -0.5, `fehp02afep0` -> 0.2.
pub fn feh_from_filename(name: &str) -> Option<f64> {
    let mut search = name;
    while let Some(pos) = search.find("feh") {
        let rest = &search[pos + 3..];
        if let Some(v) = parse_feh_tag(rest) {
            return Some(v);
        }
        search = rest;
    }
    None
}

fn parse_feh_tag(rest: &str) -> Option<f64> {
    let mut chars = rest.chars();
    let sign = match chars.next()? {
        'p' => 1.0,
        'm' => -1.0,
        _ => return None,
    };
    let tail = &rest[1..];
    let n_digits = tail.bytes().take_while(u8::is_ascii_digit).count();
    if n_digits == 0 || !tail[n_digits..].starts_with("afe") {
        return None;
    }
    let digits: f64 = tail[..n_digits].parse().ok()?;
    Some(sign * digits / 10.0)
}

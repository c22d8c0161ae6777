//! Columnar `f64` table used for tracks and aggregated grids.
//!
//! Every model grid column is numeric, so a plain column-major layout keeps
//! sorting, slicing, and the Parquet round-trip simple.

use std::cmp::Ordering;
use std::ops::Range;

use crate::error::AppError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridTable {
    columns: Vec<String>,
    data: Vec<Vec<f64>>,
}

impl GridTable {
    /// Empty table with the given column names.
    pub fn new(columns: Vec<String>) -> Self {
        let data = vec![Vec::new(); columns.len()];
        Self { columns, data }
    }

    pub fn from_columns(columns: Vec<String>, data: Vec<Vec<f64>>) -> Result<Self, AppError> {
        if columns.len() != data.len() {
            return Err(AppError::Lookup(format!(
                "Table has {} column names but {} columns of data.",
                columns.len(),
                data.len()
            )));
        }
        if let Some(first) = data.first() {
            if let Some((i, _)) = data.iter().enumerate().find(|(_, c)| c.len() != first.len()) {
                return Err(AppError::Lookup(format!(
                    "Column `{}` has {} rows, expected {}.",
                    columns[i],
                    data[i].len(),
                    first.len()
                )));
            }
        }
        Ok(Self { columns, data })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn n_rows(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column(&self, name: &str) -> Result<&[f64], AppError> {
        self.column_index(name)
            .map(|i| self.data[i].as_slice())
            .ok_or_else(|| AppError::Lookup(format!("Grid has no column `{name}`.")))
    }

    pub fn column_at(&self, idx: usize) -> &[f64] {
        &self.data[idx]
    }

    pub fn push_row(&mut self, row: &[f64]) -> Result<(), AppError> {
        if row.len() != self.columns.len() {
            return Err(AppError::Lookup(format!(
                "Row has {} values, table has {} columns.",
                row.len(),
                self.columns.len()
            )));
        }
        for (col, &v) in self.data.iter_mut().zip(row) {
            col.push(v);
        }
        Ok(())
    }

    /// Append a new column or replace an existing one with the same name.
    pub fn set_column(&mut self, name: &str, values: Vec<f64>) -> Result<(), AppError> {
        if !self.columns.is_empty() && values.len() != self.n_rows() {
            return Err(AppError::Lookup(format!(
                "Column `{name}` has {} rows, table has {}.",
                values.len(),
                self.n_rows()
            )));
        }
        match self.column_index(name) {
            Some(i) => self.data[i] = values,
            None => {
                self.columns.push(name.to_string());
                self.data.push(values);
            }
        }
        Ok(())
    }

    /// Apply `f` to every value in a column.
    pub fn map_column(&mut self, name: &str, f: impl Fn(f64) -> f64) -> Result<(), AppError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| AppError::Lookup(format!("Grid has no column `{name}`.")))?;
        for v in &mut self.data[idx] {
            *v = f(*v);
        }
        Ok(())
    }

    /// Rename columns for which `f` returns a new name.
    pub fn rename_columns(&mut self, f: impl Fn(&str) -> Option<String>) {
        for c in &mut self.columns {
            if let Some(new_name) = f(c) {
                *c = new_name;
            }
        }
    }

    pub fn row(&self, idx: usize) -> Vec<f64> {
        self.data.iter().map(|c| c[idx]).collect()
    }

    pub fn slice_rows(&self, rows: Range<usize>) -> GridTable {
        GridTable {
            columns: self.columns.clone(),
            data: self.data.iter().map(|c| c[rows.clone()].to_vec()).collect(),
        }
    }

    pub fn min_max(&self, name: &str) -> Result<(f64, f64), AppError> {
        let col = self.column(name)?;
        let (lo, hi) = col
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if lo > hi {
            return Err(AppError::Lookup(format!("Column `{name}` has no finite values.")));
        }
        Ok((lo, hi))
    }

    /// Concatenate tables row-wise.
    ///
    /// Column order follows the first table; later tables are matched by name
    /// and must carry exactly the same column set.
    pub fn concat(tables: Vec<GridTable>) -> Result<GridTable, AppError> {
        let mut iter = tables.into_iter();
        let Some(mut out) = iter.next() else {
            return Ok(GridTable::default());
        };

        for (k, t) in iter.enumerate() {
            if t.n_cols() != out.n_cols() {
                return Err(AppError::Lookup(format!(
                    "Cannot concat tables with different columns (table {} has {}, expected {}).",
                    k + 1,
                    t.n_cols(),
                    out.n_cols()
                )));
            }
            for (i, name) in out.columns.iter().enumerate() {
                let src = t.column(name).map_err(|_| {
                    AppError::Lookup(format!(
                        "Column `{name}` missing from table {} during concat.",
                        k + 1
                    ))
                })?;
                out.data[i].extend_from_slice(src);
            }
        }
        Ok(out)
    }

    /// Stable lexicographic sort by the given key columns.
    pub fn sort_by_columns(&mut self, keys: &[&str]) -> Result<(), AppError> {
        let key_idx = self.key_indices(keys)?;
        let mut order: Vec<usize> = (0..self.n_rows()).collect();
        order.sort_by(|&a, &b| {
            for &k in &key_idx {
                let ord = self.data[k][a].total_cmp(&self.data[k][b]);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        for col in &mut self.data {
            *col = order.iter().map(|&i| col[i]).collect();
        }
        Ok(())
    }

    /// Drop rows whose key equals the previous row's key.
    ///
    /// Expects the table to be sorted by the same keys. Returns the number of
    /// rows removed.
    pub fn dedup_by_columns(&mut self, keys: &[&str]) -> Result<usize, AppError> {
        let key_idx = self.key_indices(keys)?;
        let n = self.n_rows();
        let mut keep = Vec::with_capacity(n);
        for i in 0..n {
            let dup = i > 0 && key_idx.iter().all(|&k| self.data[k][i] == self.data[k][i - 1]);
            if !dup {
                keep.push(i);
            }
        }
        let removed = n - keep.len();
        if removed > 0 {
            for col in &mut self.data {
                *col = keep.iter().map(|&i| col[i]).collect();
            }
        }
        Ok(removed)
    }

    fn key_indices(&self, keys: &[&str]) -> Result<Vec<usize>, AppError> {
        keys.iter()
            .map(|k| {
                self.column_index(k)
                    .ok_or_else(|| AppError::Lookup(format!("Grid has no column `{k}`.")))
            })
            .collect()
    }
}

/// One (feh, log-age) isochrone inside a sorted grid.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub feh: f64,
    pub age: f64,
    pub rows: Range<usize>,
}

/// Row index over the (feh, age) prefix of a sorted grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridIndex {
    entries: Vec<IndexEntry>,
}

impl GridIndex {
    /// Build from a table sorted by (feh, age, ...).
    pub fn build(table: &GridTable, feh_col: &str, age_col: &str) -> Result<Self, AppError> {
        let feh = table.column(feh_col)?;
        let age = table.column(age_col)?;
        let mut entries: Vec<IndexEntry> = Vec::new();

        for i in 0..table.n_rows() {
            match entries.last_mut() {
                Some(e) if e.feh == feh[i] && e.age == age[i] => e.rows.end = i + 1,
                Some(e) if (feh[i], age[i]) < (e.feh, e.age) => {
                    return Err(AppError::Lookup(format!(
                        "Grid is not sorted by ({feh_col}, {age_col}) at row {i}."
                    )));
                }
                _ => entries.push(IndexEntry {
                    feh: feh[i],
                    age: age[i],
                    rows: i..i + 1,
                }),
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact lookup (tolerance 1e-9 on both keys).
    pub fn rows(&self, feh: f64, age: f64) -> Option<Range<usize>> {
        const TOL: f64 = 1e-9;
        let start = self.entries.partition_point(|e| e.feh < feh - TOL);
        self.entries[start..]
            .iter()
            .take_while(|e| e.feh <= feh + TOL)
            .find(|e| (e.age - age).abs() <= TOL)
            .map(|e| e.rows.clone())
    }

    /// Closest tabulated isochrone: nearest feh first, then nearest age.
    pub fn nearest(&self, feh: f64, age: f64) -> Option<&IndexEntry> {
        let best_feh = self
            .entries
            .iter()
            .map(|e| e.feh)
            .min_by(|a, b| (a - feh).abs().total_cmp(&(b - feh).abs()))?;
        self.entries
            .iter()
            .filter(|e| e.feh == best_feh)
            .min_by(|a, b| (a.age - age).abs().total_cmp(&(b.age - age).abs()))
    }
}

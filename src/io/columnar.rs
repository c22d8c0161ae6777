//! Parquet read/write for all-`Float64` column sets.
//!
//! Both on-disk table formats (aggregated grids and posterior samples) are a
//! list of named `f64` columns plus string metadata stored in the Arrow
//! schema, so they share this module.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::error::AppError;
use crate::io::atomic::write_atomic;

/// Named `f64` columns plus schema metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnSet {
    pub names: Vec<String>,
    pub columns: Vec<Vec<f64>>,
    pub metadata: HashMap<String, String>,
}

/// Write columns to a Parquet file (atomic replace).
pub fn write_columns(path: &Path, set: &ColumnSet) -> Result<(), AppError> {
    if set.names.is_empty() || set.names.len() != set.columns.len() {
        return Err(AppError::Cache(format!(
            "Cannot write '{}': {} names for {} columns.",
            path.display(),
            set.names.len(),
            set.columns.len()
        )));
    }

    let fields: Vec<Field> = set
        .names
        .iter()
        .map(|n| Field::new(n, DataType::Float64, false))
        .collect();
    let schema = Arc::new(Schema::new_with_metadata(fields, set.metadata.clone()));
    let arrays: Vec<ArrayRef> = set
        .columns
        .iter()
        .map(|c| Arc::new(Float64Array::from(c.clone())) as ArrayRef)
        .collect();
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    write_atomic(path, |file| {
        let mut writer = ArrowWriter::try_new(file, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    })
}

/// Read every column of a Parquet file into memory.
///
/// The file handle is closed before this returns.
pub fn read_columns(path: &Path) -> Result<ColumnSet, AppError> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;

    let names: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];

    for batch in reader {
        let batch = batch?;
        for (i, col) in batch.columns().iter().enumerate() {
            let values = col
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| {
                    AppError::Cache(format!(
                        "Column `{}` in '{}' is {:?}, expected Float64.",
                        names[i],
                        path.display(),
                        col.data_type()
                    ))
                })?;
            columns[i].extend(values.values().iter().copied());
        }
    }

    Ok(ColumnSet {
        names,
        columns,
        metadata: schema.metadata().clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_and_metadata_survive_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.parquet");
        let set = ColumnSet {
            names: vec!["a".into(), "b".into()],
            columns: vec![vec![1.0, f64::NAN, -3.5], vec![0.1, 0.2, 0.3]],
            metadata: HashMap::from([("k".to_string(), "v".to_string())]),
        };
        write_columns(&path, &set).unwrap();

        let back = read_columns(&path).unwrap();
        assert_eq!(back.names, set.names);
        assert_eq!(back.columns[1], set.columns[1]);
        assert!(back.columns[0][1].is_nan());
        assert_eq!(back.columns[0][2], -3.5);
        assert_eq!(back.metadata.get("k").map(String::as_str), Some("v"));
    }
}

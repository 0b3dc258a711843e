use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::Path;
use tracing::debug;

use crate::error::{ErrorContext, ErrorKind, Result};

/// Load a CSV file into a DataFrame.
pub fn load_csv(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    debug!("loading CSV from {}", path.display());
    let file = File::open(path).wrap(
        ErrorKind::Data,
        &format!("failed to open CSV at {}", path.display()),
    )?;
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(100))
        .into_reader_with_file_handle(file)
        .finish()
        .wrap(ErrorKind::Data, "failed to parse CSV")?;
    debug!(shape = ?df.shape(), "CSV loaded");
    Ok(df)
}

/// Write a DataFrame as CSV, creating parent directories as needed.
pub fn write_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).wrap(ErrorKind::Data, "failed to create output directory")?;
    }
    let mut file = File::create(path).wrap(
        ErrorKind::Data,
        &format!("failed to create CSV at {}", path.display()),
    )?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .wrap(ErrorKind::Data, "failed to write CSV")?;
    debug!("CSV written to {}", path.display());
    Ok(())
}

/// Cast every column to f64 and lay the frame out as a row-major matrix.
/// Nulls become 0.0.
pub fn feature_matrix(df: &DataFrame) -> Result<Array2<f64>> {
    let numeric = df
        .clone()
        .lazy()
        .select([col("*").cast(DataType::Float64)])
        .collect()
        .wrap(ErrorKind::Data, "failed to cast columns to f64")?;

    let mut matrix = Array2::zeros((numeric.height(), numeric.width()));
    for (j, column) in numeric.get_columns().iter().enumerate() {
        let values = column
            .as_materialized_series()
            .f64()
            .wrap(ErrorKind::Data, "failed to read column as f64")?;
        for (i, value) in values.into_iter().enumerate() {
            matrix[[i, j]] = value.unwrap_or(0.0);
        }
    }
    Ok(matrix)
}

/// Read a label series as integer class ids.
pub fn label_vector(series: &Series) -> Result<Array1<i64>> {
    let cast = series
        .cast(&DataType::Int64)
        .wrap(ErrorKind::Data, "failed to cast label column to integers")?;
    let values = cast
        .i64()
        .wrap(ErrorKind::Data, "failed to read label column")?;
    Ok(values.into_iter().map(|v| v.unwrap_or(0)).collect())
}

/// Split a frame into its feature matrix and label vector.
pub fn split_features_label(df: &DataFrame, label: &str) -> Result<(Array2<f64>, Array1<i64>)> {
    let features = df.drop(label).wrap(
        ErrorKind::Data,
        &format!("label column {label} missing from frame"),
    )?;
    let labels = df
        .column(label)
        .wrap(ErrorKind::Data, &format!("label column {label} missing from frame"))?
        .as_materialized_series();
    Ok((feature_matrix(&features)?, label_vector(labels)?))
}

/// Rebuild a DataFrame from a feature matrix, its column names, and labels.
pub fn frame_from_matrix(
    x: &Array2<f64>,
    names: &[String],
    y: &Array1<i64>,
    label: &str,
) -> Result<DataFrame> {
    let mut columns: Vec<Column> = Vec::with_capacity(names.len() + 1);
    for (j, name) in names.iter().enumerate() {
        columns.push(Series::new(name.as_str().into(), x.column(j).to_vec()).into_column());
    }
    columns.push(Series::new(label.into(), y.to_vec()).into_column());
    DataFrame::new(columns).wrap(ErrorKind::Data, "failed to assemble frame from matrix")
}

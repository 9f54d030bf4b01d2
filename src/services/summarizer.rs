use polars::prelude::*;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

use crate::error::AppError;

/// Descriptive statistics for one numeric column. Mirrors the
/// count/mean/std/min/quartiles/max shape of a pandas-style `describe`:
/// sample std (ddof = 1) and linearly interpolated quantiles.
#[derive(Debug, Clone, Serialize)]
pub struct NumericStats {
    pub count: u64,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    #[serde(rename = "25%")]
    pub q25: Option<f64>,
    #[serde(rename = "50%")]
    pub q50: Option<f64>,
    #[serde(rename = "75%")]
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

/// Read-only snapshot of one uploaded table, computed once per request.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub rows: usize,
    pub columns: Vec<String>,
    pub column_non_null_count: BTreeMap<String, usize>,
    pub numeric_stats: BTreeMap<String, NumericStats>,
    pub categorical_unique_values: BTreeMap<String, usize>,
}

pub fn summarize(df: &DataFrame) -> Result<TableSummary, AppError> {
    let columns: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(String::from)
        .collect();

    let mut column_non_null_count = BTreeMap::new();
    let mut numeric_stats = BTreeMap::new();
    let mut categorical_unique_values = BTreeMap::new();

    for series in df.get_columns() {
        let name = series.name().to_string();
        column_non_null_count.insert(name.clone(), series.len() - series.null_count());

        if series.dtype().is_numeric() {
            numeric_stats.insert(name, describe_numeric(series)?);
        } else if series.dtype() == &DataType::String {
            categorical_unique_values.insert(name, distinct_non_null(series)?);
        }
    }

    Ok(TableSummary {
        rows: df.height(),
        columns,
        column_non_null_count,
        numeric_stats,
        categorical_unique_values,
    })
}

fn describe_numeric(series: &Series) -> Result<NumericStats, AppError> {
    let floats = series
        .cast(&DataType::Float64)
        .map_err(|e| AppError::DataFrameError(format!("Failed to cast '{}' to f64: {}", series.name(), e)))?;
    let ca = floats
        .f64()
        .map_err(|e| AppError::DataFrameError(format!("Failed to read '{}' as f64: {}", series.name(), e)))?;

    let quantile = |q: f64| -> Result<Option<f64>, AppError> {
        ca.quantile(q, QuantileInterpolOptions::Linear)
            .map_err(|e| AppError::DataFrameError(format!("Failed quantile on '{}': {}", series.name(), e)))
    };

    Ok(NumericStats {
        count: (series.len() - series.null_count()) as u64,
        mean: ca.mean(),
        std: ca.std(1),
        min: ca.min(),
        q25: quantile(0.25)?,
        q50: quantile(0.50)?,
        q75: quantile(0.75)?,
        max: ca.max(),
    })
}

// n_unique counts null as its own group; the summary only reports
// distinct non-null values.
fn distinct_non_null(series: &Series) -> Result<usize, AppError> {
    let unique = series
        .n_unique()
        .map_err(|e| AppError::DataFrameError(format!("Failed n_unique on '{}': {}", series.name(), e)))?;

    if series.null_count() > 0 {
        Ok(unique.saturating_sub(1))
    } else {
        Ok(unique)
    }
}

/// First `n` rows as JSON objects keyed by column name, for the response
/// preview. Nulls and non-finite floats serialize as JSON null.
pub fn preview_rows(df: &DataFrame, n: usize) -> Result<Vec<Map<String, Value>>, AppError> {
    let mut rows = Vec::with_capacity(n.min(df.height()));

    for row_idx in 0..df.height().min(n) {
        let mut record = Map::new();
        for series in df.get_columns() {
            let value = series
                .get(row_idx)
                .map_err(|e| AppError::DataFrameError(format!("Failed to read row {}: {}", row_idx, e)))?;
            record.insert(series.name().to_string(), any_value_to_json(value));
        }
        rows.push(record);
    }

    Ok(rows)
}

fn any_value_to_json(value: AnyValue) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(b),
        AnyValue::String(s) => Value::String(s.to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        AnyValue::Int8(v) => Value::Number(v.into()),
        AnyValue::Int16(v) => Value::Number(v.into()),
        AnyValue::Int32(v) => Value::Number(v.into()),
        AnyValue::Int64(v) => Value::Number(v.into()),
        AnyValue::UInt8(v) => Value::Number(v.into()),
        AnyValue::UInt16(v) => Value::Number(v.into()),
        AnyValue::UInt32(v) => Value::Number(v.into()),
        AnyValue::UInt64(v) => Value::Number(v.into()),
        AnyValue::Float32(v) => Number::from_f64(v as f64).map_or(Value::Null, Value::Number),
        AnyValue::Float64(v) => Number::from_f64(v).map_or(Value::Null, Value::Number),
        other => Value::String(other.to_string()),
    }
}

//! Column names and input validation for demand tables.
//!
//! Every operation in this crate reads its inputs through the helpers here so
//! that a missing column or a null value is reported by name before the table
//! is modified.

use crate::CouplingError;
use polars::prelude::*;
use serde::Serialize;

/// Default name of the product identifier column.
pub const PRODUCT_ID: &str = "P_ID";
/// Default name of the location identifier column.
pub const LOCATION_ID: &str = "L_ID";
/// Default name of the log demand rate column.
pub const LOG_LAMBDA: &str = "LOG_LAMBDA";
/// Default name of the couple (group) identifier column.
pub const COUPLE_ID: &str = "C_ID";

/// The names of the columns the simulation reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnNames {
    /// Product identifier (`P_ID`).
    pub product: String,
    /// Location identifier (`L_ID`).
    pub location: String,
    /// Log demand rate (`LOG_LAMBDA`).
    pub log_lambda: String,
    /// Couple identifier written by the assigner (`C_ID`).
    pub couple: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            product: PRODUCT_ID.to_string(),
            location: LOCATION_ID.to_string(),
            log_lambda: LOG_LAMBDA.to_string(),
            couple: COUPLE_ID.to_string(),
        }
    }
}

/// Fails with `ColumnNotFound` for the first name absent from `df`.
pub(crate) fn require_columns(df: &DataFrame, names: &[&str]) -> Result<(), CouplingError> {
    for name in names {
        if df.get_column_index(name).is_none() {
            return Err(CouplingError::ColumnNotFound(name.to_string()));
        }
    }
    Ok(())
}

/// Checks everything the full pipeline needs without touching the table.
pub(crate) fn validate_input(df: &DataFrame, columns: &ColumnNames) -> Result<(), CouplingError> {
    require_columns(
        df,
        &[
            columns.product.as_str(),
            columns.location.as_str(),
            columns.log_lambda.as_str(),
        ],
    )?;
    string_keys(df, &columns.product)?;
    string_keys(df, &columns.location)?;
    float_values(df, &columns.log_lambda)?;
    Ok(())
}

/// Reads an identifier column as string keys.
///
/// Integer and string identifiers are both accepted; the cast makes `7` and
/// `"7"` the same key.
pub(crate) fn string_keys(df: &DataFrame, column: &str) -> Result<Vec<String>, CouplingError> {
    let casted = df.column(column)?.cast(&DataType::String)?;
    let ca = casted.as_materialized_series().str()?;
    ca.into_iter()
        .map(|v| {
            v.map(str::to_string)
                .ok_or_else(|| CouplingError::NullValues(column.to_string()))
        })
        .collect()
}

pub(crate) fn float_values(df: &DataFrame, column: &str) -> Result<Vec<f64>, CouplingError> {
    let casted = df.column(column)?.cast(&DataType::Float64)?;
    let ca = casted.as_materialized_series().f64()?;
    ca.into_iter()
        .map(|v| v.ok_or_else(|| CouplingError::NullValues(column.to_string())))
        .collect()
}

pub(crate) fn int_values(df: &DataFrame, column: &str) -> Result<Vec<i64>, CouplingError> {
    let casted = df.column(column)?.cast(&DataType::Int64)?;
    let ca = casted.as_materialized_series().i64()?;
    ca.into_iter()
        .map(|v| v.ok_or_else(|| CouplingError::NullValues(column.to_string())))
        .collect()
}

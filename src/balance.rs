//! Demand balancing within coupled partitions.
//!
//! A partition is the set of rows sharing one (couple id, location id) pair.
//! Inside a coupled partition each row's log demand rate is pulled toward the
//! partition peak by `gain` times its deficit:
//!
//! ```text
//! new = old + |peak - old| * gain
//! ```
//!
//! The peak row is left alone, `gain > 1` overshoots the peak, and
//! uncoupled partitions pass through untouched. Applying the balance twice
//! with a positive gain pulls values further, so it must run once per table.

use crate::coupling::UNCOUPLED;
use crate::schema::{self, ColumnNames};
use crate::CouplingError;
use getset::Getters;
use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Gain used when none is configured.
pub const DEFAULT_GAIN: f64 = 0.5;

/// Key of an independently balanced partition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    pub couple: i64,
    pub location: String,
}

/// Balances the log demand rates of one coupled partition.
///
/// Returns a vector of the same length. NaN values never become the peak
/// and stay NaN. Rows at the peak and every row under a zero gain are
/// returned as they were, including infinite rates.
pub fn balance(values: &[f64], gain: f64) -> Vec<f64> {
    let peak = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    values.iter().map(|&v| pull_toward(v, peak, gain)).collect()
}

fn pull_toward(value: f64, peak: f64, gain: f64) -> f64 {
    if gain == 0.0 || value >= peak || value.is_nan() {
        return value;
    }
    if value == f64::NEG_INFINITY && peak.is_finite() {
        // Infinite deficit: take the limit of value + deficit * gain.
        return match gain.partial_cmp(&1.0) {
            Some(std::cmp::Ordering::Less) => f64::NEG_INFINITY,
            Some(std::cmp::Ordering::Equal) => peak,
            _ => f64::INFINITY,
        };
    }
    value + (peak - value).abs() * gain
}

/// Balances one partition, passing uncoupled partitions through unchanged.
pub fn balance_partition(couple: i64, values: &[f64], gain: f64) -> Vec<f64> {
    if couple == UNCOUPLED {
        values.to_vec()
    } else {
        balance(values, gain)
    }
}

pub(crate) fn validate_gain(gain: f64) -> Result<(), CouplingError> {
    if !gain.is_finite() || gain < 0.0 {
        return Err(CouplingError::InvalidParameter(format!(
            "gain must be a finite, non-negative number, got {}",
            gain
        )));
    }
    Ok(())
}

/// Row indices of each partition, keyed by (couple, location).
pub fn partition_rows(couples: &[i64], locations: &[String]) -> BTreeMap<PartitionKey, Vec<usize>> {
    let mut partitions: BTreeMap<PartitionKey, Vec<usize>> = BTreeMap::new();
    for (row, (&couple, location)) in couples.iter().zip(locations).enumerate() {
        partitions
            .entry(PartitionKey {
                couple,
                location: location.clone(),
            })
            .or_default()
            .push(row);
    }
    partitions
}

/// Summary of one balancing pass.
#[derive(Debug, Clone, Default, Getters, Serialize)]
#[getset(get = "pub")]
pub struct BalanceReport {
    /// The gain the pass ran with.
    gain: f64,
    /// Coupled partitions that were balanced.
    partitions_balanced: usize,
    /// Uncoupled partitions left as they were.
    partitions_passed_through: usize,
    /// Rows whose log demand rate increased.
    rows_adjusted: usize,
    /// Mean increase over the rows of coupled partitions.
    mean_uplift: f64,
    /// Largest single increase.
    max_uplift: f64,
}

/// Balances `LOG_LAMBDA` for every (`C_ID`, `L_ID`) partition of `df`.
pub fn balance_demand(df: &mut DataFrame, gain: f64) -> Result<BalanceReport, CouplingError> {
    balance_demand_with(df, &ColumnNames::default(), gain)
}

/// Balances the log demand column using the given column names.
///
/// Row order is preserved; only the log demand column is rewritten.
pub fn balance_demand_with(
    df: &mut DataFrame,
    columns: &ColumnNames,
    gain: f64,
) -> Result<BalanceReport, CouplingError> {
    validate_gain(gain)?;
    schema::require_columns(
        df,
        &[
            columns.couple.as_str(),
            columns.location.as_str(),
            columns.log_lambda.as_str(),
        ],
    )?;
    let couples = schema::int_values(df, &columns.couple)?;
    let locations = schema::string_keys(df, &columns.location)?;
    let original = schema::float_values(df, &columns.log_lambda)?;

    let mut balanced = original.clone();
    let mut report = BalanceReport {
        gain,
        ..Default::default()
    };
    let mut coupled_rows = 0usize;
    let mut uplift_sum = 0.0;

    for (key, rows) in partition_rows(&couples, &locations) {
        if key.couple == UNCOUPLED {
            report.partitions_passed_through += 1;
            continue;
        }
        let snapshot: Vec<f64> = rows.iter().map(|&r| original[r]).collect();
        let updated = balance(&snapshot, gain);
        report.partitions_balanced += 1;
        for (&row, (&before, &after)) in rows.iter().zip(snapshot.iter().zip(&updated)) {
            balanced[row] = after;
            let uplift = after - before;
            if uplift > 0.0 {
                report.rows_adjusted += 1;
            }
            if uplift.is_finite() {
                uplift_sum += uplift;
                coupled_rows += 1;
                report.max_uplift = report.max_uplift.max(uplift);
            }
        }
        debug!(
            couple = key.couple,
            location = %key.location,
            rows = rows.len(),
            "balanced partition"
        );
    }

    if coupled_rows > 0 {
        report.mean_uplift = uplift_sum / coupled_rows as f64;
    }

    df.with_column(Series::new(columns.log_lambda.as_str().into(), balanced))?;
    Ok(report)
}

//! Summary statistics of dose tables and run-versus-event comparisons.

use serde::Serialize;

use crate::engine::EngineError;
use crate::types::{DoseColumn, DoseRateTable};

/// Descriptive statistics of one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColumnStats {
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub total: f64,
}

impl ColumnStats {
    /// `None` for an empty column.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let total: f64 = values.iter().sum();
        let mean = total / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Some(Self {
            mean,
            median,
            std_dev: variance.sqrt(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            total,
        })
    }
}

/// One row of a comparison, by row position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub location: usize,
    pub current: f64,
    pub reference: f64,
    /// `current / reference`; not finite where the reference is zero.
    pub ratio: f64,
}

/// A run compared against a reference run (typically a GLE preset).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub column: DoseColumn,
    pub current_mean: f64,
    pub current_max: f64,
    pub reference_mean: f64,
    pub reference_max: f64,
    pub ratio_mean: f64,
    pub ratio_max: f64,
    pub rows: Vec<ComparisonRow>,
}

/// Compare one dose column of two tables row by row.
pub fn compare_tables(
    current: &DoseRateTable,
    reference: &DoseRateTable,
    column: DoseColumn,
) -> Result<Comparison, EngineError> {
    if current.len() != reference.len() {
        return Err(EngineError::Configuration(format!(
            "cannot compare tables of {} and {} rows",
            current.len(),
            reference.len()
        )));
    }
    let a = current.dose_column(column);
    let b = reference.dose_column(column);
    let (sa, sb) = match (ColumnStats::from_values(&a), ColumnStats::from_values(&b)) {
        (Some(sa), Some(sb)) => (sa, sb),
        _ => {
            return Err(EngineError::Configuration(
                "cannot compare empty tables".into(),
            ))
        }
    };

    let rows = a
        .iter()
        .zip(&b)
        .enumerate()
        .map(|(location, (&current, &reference))| ComparisonRow {
            location,
            current,
            reference,
            ratio: current / reference,
        })
        .collect();

    Ok(Comparison {
        column,
        current_mean: sa.mean,
        current_max: sa.max,
        reference_mean: sb.mean,
        reference_max: sb.max,
        ratio_mean: sa.mean / sb.mean,
        ratio_max: sa.max / sb.max,
        rows,
    })
}

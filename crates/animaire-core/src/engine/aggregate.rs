//! Summation of per-distribution dose tables into one combined table.

use crate::types::{DoseColumn, DoseRateTable};

use super::EngineError;

/// Tolerance for matching row coordinates between tables.
const ALIGNMENT_TOLERANCE: f64 = 1e-9;

/// Combine per-distribution dose tables by row position.
///
/// The result starts as a copy of the first table; every later table adds
/// its five dose columns element-wise, in slice order. All other columns
/// keep the first table's values. Tables must agree on row count and on
/// the (latitude, longitude, altitude) of every row.
pub fn combine_dose_tables(tables: &[DoseRateTable]) -> Result<DoseRateTable, EngineError> {
    let (first, rest) = tables.split_first().ok_or_else(|| {
        EngineError::Configuration("no dose tables to combine".into())
    })?;

    let mut combined = first.clone();
    for (offset, table) in rest.iter().enumerate() {
        let index = offset + 1;
        check_alignment(&combined, table, index)?;

        for (acc, row) in combined.rows.iter_mut().zip(&table.rows) {
            for column in DoseColumn::ALL {
                *acc.dose_mut(column) += row.dose(column);
            }
            if acc.extra != row.extra {
                log::warn!(
                    "non-summed columns at ({}, {}, {} km) differ in table {}; keeping the first table's values",
                    acc.latitude,
                    acc.longitude,
                    acc.altitude_km,
                    index
                );
            }
        }
    }
    Ok(combined)
}

fn check_alignment(
    first: &DoseRateTable,
    other: &DoseRateTable,
    index: usize,
) -> Result<(), EngineError> {
    if first.len() != other.len() {
        return Err(EngineError::MisalignedTables {
            index,
            message: format!("{} rows, expected {}", other.len(), first.len()),
        });
    }
    for (row_idx, (a, b)) in first.rows.iter().zip(&other.rows).enumerate() {
        let same = (a.latitude - b.latitude).abs() <= ALIGNMENT_TOLERANCE
            && (a.longitude - b.longitude).abs() <= ALIGNMENT_TOLERANCE
            && (a.altitude_km - b.altitude_km).abs() <= ALIGNMENT_TOLERANCE;
        if !same {
            return Err(EngineError::MisalignedTables {
                index,
                message: format!(
                    "row {} is ({}, {}, {} km), expected ({}, {}, {} km)",
                    row_idx,
                    b.latitude,
                    b.longitude,
                    b.altitude_km,
                    a.latitude,
                    a.longitude,
                    a.altitude_km
                ),
            });
        }
    }
    Ok(())
}

//! Property-based tests for dose-table aggregation.
//!
//! Covers: row count preservation, exact per-column sums in table order,
//! the single-table identity, and rejection of misaligned tables.

use animaire_core::engine::{combine_dose_tables, EngineError};
use animaire_core::types::{DoseColumn, DoseRateRow, DoseRateTable, GeoPoint};
use proptest::prelude::*;

fn table_from(values: &[[f64; 5]], nm_rate: f64) -> DoseRateTable {
    DoseRateTable::new(
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut row = DoseRateRow::zeroed(GeoPoint::new(i as f64 - 45.0, 10.0), 10.7);
                for (column, value) in DoseColumn::ALL.iter().zip(v) {
                    *row.dose_mut(*column) = *value;
                }
                row.extra.insert("NM count rate".into(), nm_rate);
                row
            })
            .collect(),
    )
}

fn tables_strategy() -> impl Strategy<Value = Vec<Vec<[f64; 5]>>> {
    (1usize..20).prop_flat_map(|rows| {
        prop::collection::vec(
            prop::collection::vec(prop::array::uniform5(0.0f64..1e3), rows),
            1..6,
        )
    })
}

// ── Summation ────────────────────────────────────────────────────────

proptest! {
    /// Every summed column equals the in-order sum across tables.
    #[test]
    fn combined_columns_are_exact_sums(raw in tables_strategy()) {
        let tables: Vec<DoseRateTable> = raw
            .iter()
            .enumerate()
            .map(|(i, t)| table_from(t, i as f64))
            .collect();
        let combined = combine_dose_tables(&tables).unwrap();

        prop_assert_eq!(combined.len(), tables[0].len());
        for (row_idx, row) in combined.rows.iter().enumerate() {
            for column in DoseColumn::ALL {
                let mut expected = tables[0].rows[row_idx].dose(column);
                for t in &tables[1..] {
                    expected += t.rows[row_idx].dose(column);
                }
                prop_assert_eq!(row.dose(column).to_bits(), expected.to_bits());
            }
            // Non-summed columns come from the first table.
            prop_assert_eq!(row.extra["NM count rate"], 0.0);
            prop_assert_eq!(row.latitude, tables[0].rows[row_idx].latitude);
        }
    }

    /// A single table is returned unchanged.
    #[test]
    fn single_table_is_identity(raw in prop::collection::vec(prop::array::uniform5(-1e3f64..1e3), 1..30)) {
        let table = table_from(&raw, 4.2);
        let combined = combine_dose_tables(std::slice::from_ref(&table)).unwrap();
        prop_assert_eq!(combined, table);
    }

    /// Tables of different length are never summed.
    #[test]
    fn different_row_counts_are_rejected(a in 1usize..10, extra in 1usize..5) {
        let first = table_from(&vec![[1.0; 5]; a], 0.0);
        let second = table_from(&vec![[1.0; 5]; a + extra], 0.0);
        let result = combine_dose_tables(&[first, second]);
        prop_assert!(
            matches!(result, Err(EngineError::MisalignedTables { index: 1, .. })),
            "expected misaligned tables error"
        );
    }
}

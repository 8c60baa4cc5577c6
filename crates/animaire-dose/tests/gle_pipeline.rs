//! Integration tests: a GLE preset run end to end with the reference
//! collaborators.

use std::sync::Arc;

use animaire_compute::{RayonBackend, SequentialBackend};
use animaire_core::engine::{Collaborators, ResolverOptions};
use animaire_core::grid::{europe_grid, FL350_KM, FL400_KM};
use animaire_core::presets::find_gle_preset;
use animaire_core::types::{AltitudeSet, DoseColumn, KpIndex};
use animaire_core::{RunConfig, RunCoordinator};
use animaire_directions::{PitchAngleTableBuilder, StormerResolver};
use animaire_dose::{YieldFunctionDoseEngine, NM_COUNT_RATE_COLUMN};

fn gle69_config() -> RunConfig {
    let preset = find_gle_preset("GLE 69").unwrap().unwrap();
    RunConfig::new(
        vec![preset.distribution().unwrap()],
        AltitudeSet::new(vec![FL350_KM, FL400_KM]).unwrap(),
        KpIndex::new(3).unwrap(),
        preset.date_and_time,
    )
    .with_grid(europe_grid())
    .with_reference(preset.reference)
    .with_nm_rates(true)
}

fn collaborators() -> Collaborators {
    Collaborators::new(
        Arc::new(StormerResolver::new()),
        Arc::new(PitchAngleTableBuilder::new()),
        Arc::new(YieldFunctionDoseEngine::builtin().unwrap()),
    )
}

// ─────────────────────────────────────────────────────────────────────
// Shape and content
// ─────────────────────────────────────────────────────────────────────

#[test]
fn gle69_over_europe_fills_every_row() {
    let mut coordinator = RunCoordinator::new(gle69_config(), collaborators()).unwrap();
    let table = coordinator
        .resolve_and_run(true, &ResolverOptions::default(), true)
        .unwrap();

    assert_eq!(table.len(), 49 * 2);
    for row in &table.rows {
        for column in DoseColumn::ALL {
            let v = row.dose(column);
            assert!(v.is_finite() && v >= 0.0, "{} = {}", column.name(), v);
        }
        assert!(row.extra.contains_key(NM_COUNT_RATE_COLUMN));
    }
    assert!(table.rows.iter().any(|r| r.edose > 0.0));
}

#[test]
fn higher_flight_level_receives_more_dose() {
    let mut coordinator = RunCoordinator::new(gle69_config(), collaborators()).unwrap();
    let table = coordinator
        .resolve_and_run(true, &ResolverOptions::default(), false)
        .unwrap();
    for pair in table.rows.chunks(2) {
        assert_eq!(pair[0].altitude_km, FL350_KM);
        assert_eq!(pair[1].altitude_km, FL400_KM);
        assert!(pair[1].edose >= pair[0].edose);
    }
}

// ─────────────────────────────────────────────────────────────────────
// Determinism across backends
// ─────────────────────────────────────────────────────────────────────

#[test]
fn two_species_match_across_backends() {
    let preset = find_gle_preset("GLE 72").unwrap().unwrap();
    let mut config = gle69_config();
    config.distributions.push(preset.distribution().unwrap());

    let mut sequential = RunCoordinator::new(
        config.clone(),
        collaborators().with_backend(Arc::new(SequentialBackend::new())),
    )
    .unwrap();
    let mut parallel = RunCoordinator::new(
        config,
        collaborators().with_backend(Arc::new(RayonBackend::with_threads(4).unwrap())),
    )
    .unwrap();

    let a = sequential
        .resolve_and_run(true, &ResolverOptions::default(), false)
        .unwrap();
    let b = parallel
        .resolve_and_run(true, &ResolverOptions::default(), false)
        .unwrap();
    assert_eq!(a, b);
}

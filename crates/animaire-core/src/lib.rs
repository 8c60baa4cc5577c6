//! # AniMAIRE Core
//!
//! Orchestration of anisotropic cosmic-ray dose-rate simulations. A run
//! traces a grid of geographic points back to their asymptotic directions,
//! computes dose rates at a set of altitudes for each incoming particle
//! distribution, and sums the per-distribution tables into one result.
//!
//! ## Architecture
//!
//! The physics lives behind three collaborator traits in [`engine`]:
//! [`engine::DirectionResolver`], [`engine::DirectionTableBuilder`] and
//! [`engine::DoseEngine`]. The [`engine::RunCoordinator`] holds the
//! configuration of one run, calls the collaborators in the required order
//! and combines their output.
//!
//! ## Modules
//!
//! - [`types`]: Grid, altitudes, direction tables and dose tables.
//! - [`spectra`]: Particle distributions, spectral models, safe formulas.
//! - [`engine`]: Collaborator traits, run coordinator, aggregation.
//! - [`grid`]: Grid, region and flight-level presets.
//! - [`presets`]: Historical GLE events.
//! - [`report`]: Summary statistics and event comparisons.

pub mod engine;
pub mod grid;
pub mod presets;
pub mod report;
pub mod spectra;
pub mod types;

pub use engine::{EngineError, RunConfig, RunCoordinator};

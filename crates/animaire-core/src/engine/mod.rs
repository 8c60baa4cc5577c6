//! Run orchestration and the collaborator seams it drives.
//!
//! A run has two stages. First a [`DirectionResolver`] traces the grid
//! points and arrival angles back to their asymptotic directions, and a
//! [`DirectionTableBuilder`] annotates those directions with pitch angles.
//! Then a [`DoseEngine`] is run once per particle distribution and the
//! per-distribution tables are summed by [`aggregate::combine_dose_tables`].
//!
//! The physics behind each seam lives outside this crate; see
//! `animaire-directions` and `animaire-dose` for reference implementations.

pub mod aggregate;
pub mod coordinator;

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::spectra::ParticleDistribution;
use crate::types::{
    AltitudeSet, AsymptoticDirectionTable, DoseRateTable, GeoPoint, KpIndex, RawDirectionTable,
    SampleGrid, ZenithAzimuth,
};

pub use aggregate::combine_dose_tables;
pub use coordinator::{Collaborators, RunConfig, RunCoordinator};

/// Error type returned by collaborator implementations.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while configuring or running a simulation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Conflicting options: {0}")]
    ConflictingOptions(String),

    #[error("State error: {0}")]
    State(String),

    #[error("{0}")]
    Resolver(#[source] CollaboratorError),

    #[error("{0}")]
    TableBuilder(#[source] CollaboratorError),

    #[error("{source}")]
    DoseEngine {
        /// Position of the failing distribution in configuration order.
        index: usize,
        label: String,
        #[source]
        source: CollaboratorError,
    },

    #[error("Dose table {index} is misaligned with the first table: {message}")]
    MisalignedTables { index: usize, message: String },

    #[error("Compute backend error: {0}")]
    Compute(#[from] animaire_compute::ComputeError),
}

impl EngineError {
    /// The message without its category prefix.
    pub fn detail(&self) -> String {
        match self {
            EngineError::Configuration(m)
            | EngineError::ConflictingOptions(m)
            | EngineError::State(m) => m.clone(),
            other => other.to_string(),
        }
    }

    /// True for failures raised by a collaborator and passed through as-is.
    pub fn is_propagated(&self) -> bool {
        matches!(
            self,
            EngineError::Resolver(_) | EngineError::TableBuilder(_) | EngineError::DoseEngine { .. }
        )
    }
}

/// Extra options forwarded verbatim to the direction resolver.
///
/// `angles` is the explicit zenith/azimuth set; it is mutually exclusive
/// with the default nine-direction set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolverOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angles: Option<Vec<ZenithAzimuth>>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// Everything a resolver receives for one run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ResolveRequest<'a> {
    pub grid: &'a SampleGrid,
    pub kp: KpIndex,
    pub date_and_time: NaiveDateTime,
    pub cache_enabled: bool,
    /// Angle set to trace; `None` leaves the choice to the resolver.
    pub angles: Option<&'a [ZenithAzimuth]>,
    pub extra: &'a BTreeMap<String, String>,
}

/// Traces grid points back through the magnetosphere.
///
/// Must return one row per (grid point, angle) pair. With `cache_enabled`
/// identical requests must give identical tables.
pub trait DirectionResolver: Send + Sync {
    fn resolve(&self, request: &ResolveRequest<'_>) -> Result<RawDirectionTable, CollaboratorError>;

    /// Human-readable name of the resolver.
    fn name(&self) -> &str;
}

/// Turns raw resolver output into the per-run direction table.
///
/// Must preserve row count and order.
pub trait DirectionTableBuilder: Send + Sync {
    fn build(
        &self,
        raw: &RawDirectionTable,
        reference: GeoPoint,
        date_and_time: NaiveDateTime,
        cache_enabled: bool,
    ) -> Result<AsymptoticDirectionTable, CollaboratorError>;
}

/// Inputs of one per-distribution dose computation.
#[derive(Clone, Copy)]
pub struct DoseRequest<'a> {
    pub distribution: &'a ParticleDistribution,
    pub directions: &'a AsymptoticDirectionTable,
    pub grid: &'a SampleGrid,
    pub altitudes: &'a AltitudeSet,
    pub generate_nm_rates: bool,
    pub record_full_output: bool,
}

/// Computes dose rates for one particle distribution.
///
/// Must return exactly one row per (grid point, altitude) with the five
/// dose columns filled, in the same row order for every distribution.
pub trait DoseEngine: Send + Sync {
    fn compute(&self, request: &DoseRequest<'_>) -> Result<DoseRateTable, CollaboratorError>;

    /// Human-readable name of the engine.
    fn name(&self) -> &str;
}

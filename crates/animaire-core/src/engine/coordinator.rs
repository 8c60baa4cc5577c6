//! The run coordinator: one configured simulation run and its two stages.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use chrono::NaiveDateTime;
use serde::Serialize;

use animaire_compute::{ComputeBackend, SequentialBackend};

use super::{
    combine_dose_tables, CollaboratorError, DirectionResolver, DirectionTableBuilder, DoseEngine,
    DoseRequest, EngineError, ResolveRequest, ResolverOptions,
};
use crate::grid::default_global_grid;
use crate::spectra::ParticleDistribution;
use crate::types::{
    AltitudeSet, AsymptoticDirectionTable, DoseRateTable, GeoPoint, GeomagneticContext, KpIndex,
    SampleGrid, DEFAULT_ZENITH_AZIMUTHS,
};

/// File name of the raw resolver output snapshot.
pub const RAW_DIRECTIONS_SNAPSHOT: &str = "raw_asymptotic_directions.json";

/// File name of the processed direction table snapshot.
pub const DIRECTIONS_SNAPSHOT: &str = "asymptotic_directions.json";

/// Default reference direction of the pitch-angle distribution.
pub const DEFAULT_REFERENCE: GeoPoint = GeoPoint {
    latitude: 0.0,
    longitude: 45.0,
};

/// Configuration of exactly one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Particle populations, summed in this order.
    pub distributions: Vec<ParticleDistribution>,
    pub altitudes: AltitudeSet,
    pub kp: KpIndex,
    pub date_and_time: NaiveDateTime,
    /// Reference direction of the pitch-angle distributions.
    pub reference: GeoPoint,
    pub grid: SampleGrid,
    /// Allow the resolver to reuse earlier results for identical requests.
    pub cache_enabled: bool,
    /// Ask the dose engine for neutron-monitor count rates.
    pub generate_nm_rates: bool,
    /// Where to write direction-table snapshots, if anywhere.
    pub snapshot_dir: Option<PathBuf>,
}

impl RunConfig {
    /// A run over the default global grid with the default reference
    /// direction, caching on and neutron-monitor rates off.
    pub fn new(
        distributions: Vec<ParticleDistribution>,
        altitudes: AltitudeSet,
        kp: KpIndex,
        date_and_time: NaiveDateTime,
    ) -> Self {
        Self {
            distributions,
            altitudes,
            kp,
            date_and_time,
            reference: DEFAULT_REFERENCE,
            grid: default_global_grid(),
            cache_enabled: true,
            generate_nm_rates: false,
            snapshot_dir: None,
        }
    }

    pub fn with_grid(mut self, grid: SampleGrid) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_reference(mut self, reference: GeoPoint) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_nm_rates(mut self, enabled: bool) -> Self {
        self.generate_nm_rates = enabled;
        self
    }

    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    /// The geomagnetic conditions shared by every point of the run.
    pub fn context(&self) -> GeomagneticContext {
        GeomagneticContext {
            kp: self.kp,
            date_and_time: self.date_and_time,
            reference: self.reference,
        }
    }
}

/// The external pieces a run drives.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn DirectionResolver>,
    pub table_builder: Arc<dyn DirectionTableBuilder>,
    pub dose_engine: Arc<dyn DoseEngine>,
    /// Executes the per-distribution dose computations.
    pub backend: Arc<dyn ComputeBackend>,
}

impl Collaborators {
    /// Collaborators with the sequential backend.
    pub fn new(
        resolver: Arc<dyn DirectionResolver>,
        table_builder: Arc<dyn DirectionTableBuilder>,
        dose_engine: Arc<dyn DoseEngine>,
    ) -> Self {
        Self {
            resolver,
            table_builder,
            dose_engine,
            backend: Arc::new(SequentialBackend::new()),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn ComputeBackend>) -> Self {
        self.backend = backend;
        self
    }
}

/// Drives one run: resolve directions once, then compute and combine the
/// dose of every distribution.
///
/// Not meant for concurrent use; `resolve_directions` takes `&mut self`.
pub struct RunCoordinator {
    config: RunConfig,
    collaborators: Collaborators,
    directions: Option<AsymptoticDirectionTable>,
}

impl RunCoordinator {
    /// Validate the configuration. No collaborator is called.
    pub fn new(config: RunConfig, collaborators: Collaborators) -> Result<Self, EngineError> {
        if config.distributions.is_empty() {
            return Err(EngineError::Configuration(
                "at least one particle distribution is required".into(),
            ));
        }
        config.reference.validate().map_err(|e| {
            EngineError::Configuration(format!("reference direction: {}", e.detail()))
        })?;

        log::info!(
            "configured run: {} distribution(s), {} grid point(s), {} altitude(s), Kp={}, {}",
            config.distributions.len(),
            config.grid.len(),
            config.altitudes.len(),
            config.kp.value(),
            config.date_and_time
        );
        Ok(Self {
            config,
            collaborators,
            directions: None,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The direction table of this run, once resolved.
    pub fn directions(&self) -> Option<&AsymptoticDirectionTable> {
        self.directions.as_ref()
    }

    /// Stage one: trace the grid through the magnetosphere and annotate
    /// the result with pitch angles.
    ///
    /// With `use_default_angle_set` the resolver receives exactly
    /// [`DEFAULT_ZENITH_AZIMUTHS`]; combining it with an explicit angle set
    /// in `options` is rejected before the resolver is called.
    pub fn resolve_directions(
        &mut self,
        use_default_angle_set: bool,
        options: &ResolverOptions,
    ) -> Result<&AsymptoticDirectionTable, EngineError> {
        if use_default_angle_set && options.angles.is_some() {
            return Err(EngineError::ConflictingOptions(
                "the default angle set was requested while an explicit zenith/azimuth set was also supplied"
                    .into(),
            ));
        }
        let angles = if use_default_angle_set {
            Some(&DEFAULT_ZENITH_AZIMUTHS[..])
        } else {
            options.angles.as_deref()
        };
        if angles.is_some_and(|a| a.is_empty()) {
            return Err(EngineError::Configuration(
                "explicit zenith/azimuth set is empty".into(),
            ));
        }

        let request = ResolveRequest {
            grid: &self.config.grid,
            kp: self.config.kp,
            date_and_time: self.config.date_and_time,
            cache_enabled: self.config.cache_enabled,
            angles,
            extra: &options.extra,
        };
        log::info!(
            "resolving asymptotic directions with {} ({} angle(s))",
            self.collaborators.resolver.name(),
            angles.map_or_else(|| "resolver default".to_string(), |a| a.len().to_string())
        );
        let raw = self
            .collaborators
            .resolver
            .resolve(&request)
            .map_err(EngineError::Resolver)?;
        log::debug!("resolver returned {} rows", raw.rows.len());
        self.snapshot(RAW_DIRECTIONS_SNAPSHOT, &raw);

        let table = self
            .collaborators
            .table_builder
            .build(&raw, self.config.reference, self.config.date_and_time, false)
            .map_err(EngineError::TableBuilder)?;
        if table.rows.len() != raw.rows.len() {
            return Err(EngineError::TableBuilder(
                format!(
                    "direction table has {} rows, resolver returned {}",
                    table.rows.len(),
                    raw.rows.len()
                )
                .into(),
            ));
        }
        self.snapshot(DIRECTIONS_SNAPSHOT, &table);

        Ok(&*self.directions.insert(table))
    }

    /// Stage two: one dose computation per distribution, summed in
    /// configuration order.
    ///
    /// Fails with [`EngineError::State`] before any dose computation if
    /// directions have not been resolved.
    pub fn run_all_species(&self, record_full_output: bool) -> Result<DoseRateTable, EngineError> {
        let directions = self.directions.as_ref().ok_or_else(|| {
            EngineError::State("run_all_species called before resolve_directions".into())
        })?;

        let distributions = &self.config.distributions;
        let expected_rows = self.config.grid.len() * self.config.altitudes.len();
        let engine = &self.collaborators.dose_engine;
        let slots: Vec<OnceLock<Result<DoseRateTable, CollaboratorError>>> =
            distributions.iter().map(|_| OnceLock::new()).collect();

        let info = self.collaborators.backend.device_info();
        log::info!(
            "computing dose for {} distribution(s) with {} on {}",
            distributions.len(),
            engine.name(),
            info.name
        );

        let job = |i: usize| {
            let distribution = &distributions[i];
            log::debug!("species {} ('{}') started", i, distribution.label());
            let request = DoseRequest {
                distribution,
                directions,
                grid: &self.config.grid,
                altitudes: &self.config.altitudes,
                generate_nm_rates: self.config.generate_nm_rates,
                record_full_output,
            };
            let result = engine.compute(&request);
            log::debug!(
                "species {} ('{}') finished: {}",
                i,
                distribution.label(),
                if result.is_ok() { "ok" } else { "failed" }
            );
            let _ = slots[i].set(result);
        };
        self.collaborators.backend.run_indexed(distributions.len(), &job)?;

        let mut tables = Vec::with_capacity(distributions.len());
        for (index, slot) in slots.into_iter().enumerate() {
            let label = distributions[index].label().to_string();
            match slot.into_inner() {
                Some(Ok(table)) if table.len() == expected_rows => tables.push(table),
                Some(Ok(table)) => {
                    return Err(EngineError::DoseEngine {
                        index,
                        label,
                        source: format!(
                            "dose table has {} rows, expected {} (grid points x altitudes)",
                            table.len(),
                            expected_rows
                        )
                        .into(),
                    })
                }
                Some(Err(source)) => {
                    return Err(EngineError::DoseEngine {
                        index,
                        label,
                        source,
                    })
                }
                None => {
                    return Err(EngineError::State(format!(
                        "compute backend skipped species {}",
                        index
                    )))
                }
            }
        }

        let combined = combine_dose_tables(&tables)?;
        log::info!("combined dose table: {} rows", combined.len());
        Ok(combined)
    }

    /// Both stages in sequence.
    pub fn resolve_and_run(
        &mut self,
        use_default_angle_set: bool,
        options: &ResolverOptions,
        record_full_output: bool,
    ) -> Result<DoseRateTable, EngineError> {
        self.resolve_directions(use_default_angle_set, options)?;
        self.run_all_species(record_full_output)
    }

    fn snapshot<T: Serialize>(&self, file_name: &str, value: &T) {
        if let Some(dir) = &self.config.snapshot_dir {
            if let Err(e) = write_snapshot(dir, file_name, value) {
                log::warn!("could not write snapshot {}: {}", file_name, e);
            }
        }
    }
}

fn write_snapshot<T: Serialize>(dir: &Path, file_name: &str, value: &T) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(value)?;
    let path = dir.join(file_name);
    std::fs::write(&path, json)?;
    log::debug!("snapshot written to {}", path.display());
    Ok(())
}

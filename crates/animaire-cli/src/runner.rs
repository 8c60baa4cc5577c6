//! Simulation runner: ties together grid, distributions, resolver and dose
//! engine, and writes the results.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use animaire_compute::ComputeBackend;
use animaire_core::engine::{
    Collaborators, DirectionResolver, ResolverOptions, RunConfig, RunCoordinator,
};
use animaire_core::grid::{custom_grid, default_global_grid, europe_grid, format_altitude_label, PresetRegion};
use animaire_core::presets::GlePreset;
use animaire_core::report::{ColumnStats, Comparison};
use animaire_core::spectra::{ModelPreview, ParticleDistribution};
use animaire_core::types::{
    parse_date_time, AltitudeSet, DoseColumn, DoseRateTable, GeoPoint, KpIndex, SampleGrid,
    ZenithAzimuth, DATETIME_FORMAT,
};
use animaire_directions::{CachedResolver, PitchAngleTableBuilder, StormerResolver, TabulatedResolver};
use animaire_dose::{IntegrationSettings, YieldFunctionDoseEngine, YieldSet};

use crate::config::{GridConfig, JobConfig, ResolverKind};

/// Build the sample grid described by the `[grid]` table.
pub fn build_grid(grid: &GridConfig) -> Result<SampleGrid> {
    let grid = match grid {
        GridConfig::Bounds {
            lat_range,
            lon_range,
            points,
        } => custom_grid(lat_range[0], lat_range[1], lon_range[0], lon_range[1], *points)?,
        GridConfig::Region { region, points } => {
            let region = PresetRegion::from_name(region).with_context(|| {
                format!(
                    "Unknown region '{}'. Valid regions: {}",
                    region,
                    PresetRegion::ALL.map(|r| r.name()).join(", ")
                )
            })?;
            region.grid(*points)?
        }
        GridConfig::Locations { locations } => {
            let pairs: Vec<(f64, f64)> = locations.iter().map(|p| (p[0], p[1])).collect();
            SampleGrid::from_pairs(&pairs)?
        }
        GridConfig::Preset { preset } => match preset.to_ascii_lowercase().as_str() {
            "global" => default_global_grid(),
            "europe" => europe_grid(),
            other => anyhow::bail!("Unknown grid preset '{}'. Valid presets: global, europe", other),
        },
    };
    Ok(grid)
}

/// Build the particle distributions in configuration order.
pub fn build_distributions(job: &JobConfig) -> Result<Vec<ParticleDistribution>> {
    job.distributions
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let label = d
                .label
                .clone()
                .unwrap_or_else(|| format!("{} #{}", d.model.kind(), i + 1));
            d.model
                .distribution(label)
                .with_context(|| format!("Distribution {}", i + 1))
        })
        .collect()
}

/// Altitudes from `altitudes_km` followed by any named flight levels.
pub fn build_altitudes(job: &JobConfig) -> Result<AltitudeSet> {
    let mut altitudes = job.simulation.altitudes_km.clone();
    altitudes.extend(job.simulation.flight_levels.iter().map(|f| f.km()));
    Ok(AltitudeSet::new(altitudes)?)
}

/// The run configuration for `distributions` under the job's settings.
pub fn build_run_config(
    job: &JobConfig,
    distributions: Vec<ParticleDistribution>,
    out_dir: Option<&Path>,
) -> Result<RunConfig> {
    let date_and_time = parse_date_time(&job.simulation.date_time)?;
    let mut config = RunConfig::new(
        distributions,
        build_altitudes(job)?,
        KpIndex::new(job.simulation.kp)?,
        date_and_time,
    )
    .with_grid(build_grid(&job.grid)?)
    .with_cache(job.simulation.cache)
    .with_nm_rates(job.simulation.nm_rates);
    if let Some([lat, lon]) = job.simulation.reference {
        config = config.with_reference(GeoPoint::new(lat, lon));
    }
    if let (true, Some(dir)) = (job.output.snapshots, out_dir) {
        config = config.with_snapshot_dir(dir);
    }
    Ok(config)
}

/// Resolver options from the `[resolver]` table.
pub fn resolver_options(job: &JobConfig) -> ResolverOptions {
    ResolverOptions {
        angles: job
            .resolver
            .angles
            .as_ref()
            .map(|a| a.iter().map(|p| ZenithAzimuth::new(p[0], p[1])).collect()),
        extra: job.resolver.extra.clone(),
    }
}

fn build_resolver(job: &JobConfig) -> Result<Arc<dyn DirectionResolver>> {
    let cfg = &job.resolver;
    match cfg.kind {
        ResolverKind::Stormer => {
            let mut resolver = StormerResolver::new();
            if let Some([lat, lon]) = cfg.pole {
                let pole = GeoPoint::new(lat, lon);
                pole.validate().context("Invalid dipole pole")?;
                resolver = resolver.with_pole(pole);
            }
            Ok(wrap_cached(resolver, job))
        }
        ResolverKind::Tabulated => {
            let path = cfg
                .file
                .as_ref()
                .context("The tabulated resolver requires 'resolver.file'")?;
            let resolver = TabulatedResolver::from_path(path)
                .with_context(|| format!("Loading directions from {}", path.display()))?;
            println!("  Directions: {} rows from {}", resolver.rows().len(), path.display());
            Ok(wrap_cached(resolver, job))
        }
    }
}

fn wrap_cached<R: DirectionResolver + 'static>(resolver: R, job: &JobConfig) -> Arc<dyn DirectionResolver> {
    match &job.resolver.cache {
        Some(cache) => Arc::new(CachedResolver::new(resolver, cache.clone())),
        None => Arc::new(resolver),
    }
}

fn build_dose_engine(job: &JobConfig) -> Result<YieldFunctionDoseEngine> {
    let yields = match &job.dose.yields {
        Some(path) => YieldSet::from_path(path)
            .with_context(|| format!("Loading yields from {}", path.display()))?,
        None => YieldSet::builtin()?,
    };
    println!("  Yields: {}", yields.name());
    let settings = IntegrationSettings {
        min_rigidity_gv: job.dose.min_rigidity_gv,
        max_rigidity_gv: job.dose.max_rigidity_gv,
        samples: job.dose.rigidity_samples,
    };
    Ok(YieldFunctionDoseEngine::with_settings(yields, settings)?)
}

/// Build the collaborators named by the job.
pub fn build_collaborators(job: &JobConfig) -> Result<Collaborators> {
    let collaborators = Collaborators::new(
        build_resolver(job)?,
        Arc::new(PitchAngleTableBuilder::new()),
        Arc::new(build_dose_engine(job)?),
    );
    Ok(collaborators.with_backend(create_backend(&job.simulation.backend, job.simulation.threads)?))
}

/// Run every configured distribution and return the combined table.
pub fn run_simulation(job: &JobConfig, out_dir: Option<&Path>) -> Result<DoseRateTable> {
    let distributions = build_distributions(job)?;
    for d in &job.distributions {
        println!("  Distribution: {}", d.model);
    }
    run_distributions(job, distributions, out_dir)
}

/// Run the job's grid and altitudes with another set of distributions.
pub fn run_distributions(
    job: &JobConfig,
    distributions: Vec<ParticleDistribution>,
    out_dir: Option<&Path>,
) -> Result<DoseRateTable> {
    let config = build_run_config(job, distributions, out_dir)?;
    run_config(job, config)
}

fn run_config(job: &JobConfig, config: RunConfig) -> Result<DoseRateTable> {
    println!(
        "  Grid: {} points; altitudes: {}",
        config.grid.len(),
        config
            .altitudes
            .as_slice()
            .iter()
            .map(|&a| format_altitude_label(a))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let collaborators = build_collaborators(job)?;
    let mut coordinator = RunCoordinator::new(config, collaborators)?;

    let directions = coordinator
        .resolve_directions(job.simulation.use_default_angles, &resolver_options(job))
        .context("Resolving asymptotic directions")?;
    println!("  Resolved {} asymptotic directions", directions.rows.len());

    let table = coordinator
        .run_all_species(job.dose.record_full_output)
        .context("Computing dose rates")?;
    println!("  Computed {} dose-rate rows", table.len());
    Ok(table)
}

/// Run a GLE preset over the job's grid and altitudes, with the preset's
/// timestamp and reference direction.
pub fn run_preset(job: &JobConfig, preset: &GlePreset) -> Result<DoseRateTable> {
    let mut config =
        build_run_config(job, vec![preset.distribution()?], None)?.with_reference(preset.reference);
    config.date_and_time = preset.date_and_time;
    run_config(job, config)
}

/// Print summary statistics of each dose column.
pub fn print_summary(table: &DoseRateTable) {
    println!("Summary:");
    for column in DoseColumn::ALL {
        if let Some(s) = ColumnStats::from_values(&table.dose_column(column)) {
            println!(
                "  {:<6} mean={:.4e} median={:.4e} std={:.4e} min={:.4e} max={:.4e} total={:.4e}",
                column.name(),
                s.mean,
                s.median,
                s.std_dev,
                s.min,
                s.max,
                s.total
            );
        }
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Write the dose table to a CSV file with a metadata header.
pub fn write_dose_csv(table: &DoseRateTable, path: &Path, job: &JobConfig) -> Result<()> {
    create_parent(path)?;
    let mut file = std::fs::File::create(path)?;

    writeln!(file, "# AniMAIRE dose rates")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# date_time: {}", job.simulation.date_time)?;
    writeln!(file, "# kp: {}", job.simulation.kp)?;
    for d in &job.distributions {
        writeln!(
            file,
            "# distribution '{}': {}",
            d.label.as_deref().unwrap_or(d.model.kind()),
            d.model
        )?;
    }
    writeln!(file, "#")?;

    let columns = table.column_names();
    writeln!(file, "{}", columns.join(","))?;
    for row in &table.rows {
        let values: Vec<String> = columns
            .iter()
            .map(|c| row.value(c).map_or_else(String::new, |v| format!("{:.6e}", v)))
            .collect();
        writeln!(file, "{}", values.join(","))?;
    }

    println!("Dose rates written to: {}", path.display());
    Ok(())
}

/// Write the dose table to a JSON file.
pub fn write_dose_json(table: &DoseRateTable, path: &Path) -> Result<()> {
    create_parent(path)?;
    let json = serde_json::to_string_pretty(&table.rows)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!("Dose rates (JSON) written to: {}", path.display());
    Ok(())
}

/// Write spectrum and pitch-angle preview samples of one distribution.
pub fn write_preview_csv(label: &str, preview: &ModelPreview, path: &Path) -> Result<()> {
    create_parent(path)?;
    let mut file = std::fs::File::create(path)?;

    writeln!(file, "# AniMAIRE spectrum preview: {}", label)?;
    writeln!(file, "# pitch-angle weights evaluated at 1 GV")?;
    writeln!(file, "#")?;
    writeln!(file, "rigidity_gv,flux,pitch_angle_deg,pitch_angle_weight")?;
    for i in 0..preview.rigidity_gv.len() {
        writeln!(
            file,
            "{:.6e},{:.6e},{:.4},{:.6e}",
            preview.rigidity_gv[i],
            preview.flux[i],
            preview.pitch_angle_deg[i],
            preview.pitch_angle_weight[i]
        )?;
    }

    println!("Preview written to: {}", path.display());
    Ok(())
}

/// Write the per-location comparison of a run against a GLE preset.
pub fn write_comparison_csv(comparison: &Comparison, preset: &GlePreset, path: &Path) -> Result<()> {
    create_parent(path)?;
    let mut file = std::fs::File::create(path)?;

    writeln!(file, "Location,Current_Dose,{}_Dose,Ratio", preset.name)?;
    for row in &comparison.rows {
        writeln!(
            file,
            "{},{:.6e},{:.6e},{:.6e}",
            row.location, row.current, row.reference, row.ratio
        )?;
    }

    println!("Comparison written to: {}", path.display());
    Ok(())
}

/// Comparison statistics as printed and saved.
pub fn comparison_statistics(comparison: &Comparison, preset: &GlePreset) -> String {
    format!(
        "Statistics:\n\
         Current Simulation - Mean: {:.2}, Max: {:.2}\n\
         {} - Mean: {:.2}, Max: {:.2}\n\
         Ratio (Current/GLE) - Mean: {:.2}, Max: {:.2}\n",
        comparison.current_mean,
        comparison.current_max,
        preset.name,
        comparison.reference_mean,
        comparison.reference_max,
        comparison.ratio_mean,
        comparison.ratio_max
    )
}

/// Write the text report of a comparison: statistics, parameters of both
/// runs and the preset's references.
pub fn write_comparison_report(
    comparison: &Comparison,
    preset: &GlePreset,
    job: &JobConfig,
    path: &Path,
) -> Result<()> {
    create_parent(path)?;
    let mut file = std::fs::File::create(path)?;

    writeln!(file, "Comparison Report: Current Simulation vs {}", preset.name)?;
    writeln!(
        file,
        "Generated: {}",
        chrono::Local::now().format(DATETIME_FORMAT)
    )?;
    writeln!(file, "Quantity: {}", comparison.column.name())?;
    writeln!(file)?;
    writeln!(file, "{}", comparison_statistics(comparison, preset))?;

    writeln!(file, "Model Parameters:")?;
    writeln!(file, "Current Simulation:")?;
    for d in &job.distributions {
        writeln!(file, "Model: {}", d.model)?;
    }
    writeln!(file, "Date/Time: {}", job.simulation.date_time)?;

    writeln!(file)?;
    writeln!(file, "{} Parameters:", preset.name)?;
    writeln!(file, "date_time: {}", preset.date_and_time.format(DATETIME_FORMAT))?;
    writeln!(file, "model: {}", preset.model)?;
    writeln!(
        file,
        "reference: {}, {}",
        preset.reference.latitude, preset.reference.longitude
    )?;
    writeln!(file, "description: {}", preset.description)?;

    writeln!(file)?;
    writeln!(file, "References:")?;
    for reference in preset.references {
        writeln!(file, "• {}", reference)?;
    }

    println!("Comparison report written to: {}", path.display());
    Ok(())
}

/// Create a compute backend based on the user's preference string.
///
/// - `"sequential"`: one distribution at a time on the calling thread.
/// - `"parallel"` (default): a rayon pool, `threads` wide when given.
fn create_backend(preference: &str, threads: Option<usize>) -> Result<Arc<dyn ComputeBackend>> {
    match preference {
        "sequential" => {
            println!("Backend: sequential");
            Ok(Arc::new(animaire_compute::SequentialBackend::new()))
        }
        "parallel" => {
            #[cfg(feature = "parallel")]
            {
                let backend = match threads {
                    Some(n) => animaire_compute::RayonBackend::with_threads(n)?,
                    None => animaire_compute::RayonBackend::new()?,
                };
                println!("Backend: {}", backend.device_info().name);
                Ok(Arc::new(backend))
            }
            #[cfg(not(feature = "parallel"))]
            {
                let _ = threads;
                log::warn!("Binary built without the 'parallel' feature; running sequentially");
                Ok(Arc::new(animaire_compute::SequentialBackend::new()))
            }
        }
        other => anyhow::bail!(
            "Unknown backend '{}'. Valid backends: parallel, sequential",
            other
        ),
    }
}

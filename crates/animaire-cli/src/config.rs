//! TOML configuration deserialisation for dose-rate jobs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use animaire_core::grid::{AltitudePreset, FL350_KM};
use animaire_core::spectra::SpectralModel;
use animaire_directions::CacheConfig;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub grid: GridConfig,
    /// One `[[distribution]]` table per particle population.
    #[serde(rename = "distribution", default)]
    pub distributions: Vec<DistributionConfig>,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub dose: DoseConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Run-wide parameters from TOML.
#[derive(Debug, Deserialize)]
pub struct SimulationConfig {
    /// `YYYY-MM-DD HH:MM:SS`.
    pub date_time: String,
    #[serde(default = "default_kp")]
    pub kp: u8,
    #[serde(default = "default_altitudes")]
    pub altitudes_km: Vec<f64>,
    /// Named flight levels appended to `altitudes_km`.
    #[serde(default)]
    pub flight_levels: Vec<AltitudePreset>,
    /// Reference direction `[latitude, longitude]` of the pitch-angle
    /// distribution.
    #[serde(default)]
    pub reference: Option<[f64; 2]>,
    #[serde(default = "default_true")]
    pub cache: bool,
    #[serde(default)]
    pub nm_rates: bool,
    /// Trace the fixed nine-direction set instead of `resolver.angles`.
    #[serde(default)]
    pub use_default_angles: bool,
    /// Compute backend: "parallel" or "sequential". Default: "parallel".
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub threads: Option<usize>,
}

fn default_kp() -> u8 {
    3
}
fn default_altitudes() -> Vec<f64> {
    vec![FL350_KM]
}
fn default_backend() -> String {
    "parallel".into()
}

/// Grid specification: a named preset, a region, explicit bounds or an
/// explicit list of locations.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum GridConfig {
    Bounds {
        lat_range: [f64; 2],
        lon_range: [f64; 2],
        points: usize,
    },
    Region {
        region: String,
        #[serde(default = "default_region_points")]
        points: usize,
    },
    Locations {
        locations: Vec<[f64; 2]>,
    },
    /// "global" (37 × 72) or "europe" (7 × 7).
    Preset {
        preset: String,
    },
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig::Preset {
            preset: "global".into(),
        }
    }
}

fn default_region_points() -> usize {
    100
}

/// A single particle population: a label and a spectral model.
#[derive(Debug, Clone, Deserialize)]
pub struct DistributionConfig {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(flatten)]
    pub model: SpectralModel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    #[default]
    Stormer,
    Tabulated,
}

/// Direction resolver configuration.
#[derive(Debug, Default, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub kind: ResolverKind,
    /// Direction table for the tabulated resolver.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Dipole pole `[latitude, longitude]` for the Størmer resolver.
    #[serde(default)]
    pub pole: Option<[f64; 2]>,
    /// Explicit `[zenith, azimuth]` pairs (degrees).
    #[serde(default)]
    pub angles: Option<Vec<[f64; 2]>>,
    /// Options passed verbatim to the resolver.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
    /// Memoise resolver output; disabled when absent.
    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

/// Dose engine configuration.
#[derive(Debug, Deserialize)]
pub struct DoseConfig {
    /// Yield table CSV; the built-in uncalibrated set when absent.
    #[serde(default)]
    pub yields: Option<PathBuf>,
    #[serde(default)]
    pub record_full_output: bool,
    #[serde(default = "default_min_rigidity")]
    pub min_rigidity_gv: f64,
    #[serde(default = "default_max_rigidity")]
    pub max_rigidity_gv: f64,
    #[serde(default = "default_rigidity_samples")]
    pub rigidity_samples: usize,
}

impl Default for DoseConfig {
    fn default() -> Self {
        Self {
            yields: None,
            record_full_output: false,
            min_rigidity_gv: default_min_rigidity(),
            max_rigidity_gv: default_max_rigidity(),
            rigidity_samples: default_rigidity_samples(),
        }
    }
}

fn default_min_rigidity() -> f64 {
    0.1
}
fn default_max_rigidity() -> f64 {
    1000.0
}
fn default_rigidity_samples() -> usize {
    256
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to save dose rates as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_csv: bool,
    /// Whether to also save dose rates as JSON (default: false).
    #[serde(default)]
    pub save_json: bool,
    /// Whether to keep JSON snapshots of the direction tables (default: false).
    #[serde(default)]
    pub snapshots: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_csv: true,
            save_json: false,
            snapshots: false,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

/// Parse a TOML job configuration.
pub fn parse_config(content: &str) -> anyhow::Result<JobConfig> {
    let config: JobConfig = toml::from_str(content)?;
    Ok(config)
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = r#"
[simulation]
date_time = "2005-01-20 06:49:00"
kp = 5
altitudes_km = [10.7]
flight_levels = ["fl400"]
reference = [80.0, 90.0]
nm_rates = true

[grid]
region = "Europe"
points = 49

[[distribution]]
label = "GLE 69 protons"
model = "DOUBLE_POWER_LAW"
j0 = 1.366e4
gamma = 4.5
delta_gamma = 0.1
sigma1 = 0.3
sigma2 = 0.5
b = 0.2
alpha_prime = 0.785

[[distribution]]
model = "DLR"
oulu_count_rate = 105

[resolver]
angles = [[0.0, 0.0], [16.0, 90.0]]
extra = { pole_latitude = "80.0" }

[resolver.cache]
eviction = "fifo"
max_entries = 8

[output]
directory = "results"
save_json = true
"#;

    #[test]
    fn test_parse_full_job() {
        let job = parse_config(JOB).unwrap();
        assert_eq!(job.simulation.kp, 5);
        assert_eq!(job.simulation.flight_levels, vec![AltitudePreset::Fl400]);
        assert_eq!(job.simulation.reference, Some([80.0, 90.0]));
        assert!(job.simulation.cache);
        assert_eq!(
            job.grid,
            GridConfig::Region {
                region: "Europe".into(),
                points: 49
            }
        );
        assert_eq!(job.distributions.len(), 2);
        assert_eq!(job.distributions[0].label.as_deref(), Some("GLE 69 protons"));
        assert_eq!(job.distributions[0].model.kind(), "DOUBLE_POWER_LAW");
        assert_eq!(job.distributions[1].model.kind(), "DLR");
        assert_eq!(job.resolver.kind, ResolverKind::Stormer);
        assert_eq!(job.resolver.angles.as_ref().map(Vec::len), Some(2));
        assert_eq!(job.resolver.extra["pole_latitude"], "80.0");
        let cache = job.resolver.cache.unwrap();
        assert_eq!(cache.max_entries, 8);
        assert_eq!(job.output.directory, "results");
        assert!(job.output.save_csv && job.output.save_json);
    }

    #[test]
    fn test_defaults() {
        let job = parse_config("[simulation]\ndate_time = \"2012-05-17 01:50:00\"\n").unwrap();
        assert_eq!(job.simulation.kp, 3);
        assert_eq!(job.simulation.altitudes_km, vec![FL350_KM]);
        assert_eq!(job.simulation.backend, "parallel");
        assert!(!job.simulation.use_default_angles);
        assert_eq!(job.grid, GridConfig::default());
        assert!(job.distributions.is_empty());
        assert!(job.resolver.cache.is_none());
        assert_eq!(job.dose.rigidity_samples, 256);
        assert_eq!(job.output.directory, "./output");
    }

    #[test]
    fn test_grid_variants() {
        let bounds: JobConfig = toml::from_str(
            "[simulation]\ndate_time = \"2012-05-17 01:50:00\"\n[grid]\nlat_range = [0, 10]\nlon_range = [0, 10]\npoints = 9\n",
        )
        .unwrap();
        assert!(matches!(bounds.grid, GridConfig::Bounds { points: 9, .. }));

        let list: JobConfig = toml::from_str(
            "[simulation]\ndate_time = \"2012-05-17 01:50:00\"\n[grid]\nlocations = [[45.0, 10.0], [50.0, 0.0]]\n",
        )
        .unwrap();
        assert_eq!(
            list.grid,
            GridConfig::Locations {
                locations: vec![[45.0, 10.0], [50.0, 0.0]]
            }
        );
    }

    #[test]
    fn test_missing_date_time_is_rejected() {
        assert!(parse_config("[simulation]\nkp = 3\n").is_err());
    }
}

//! Sample grid and altitude presets.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::spectra::lin_space;
use crate::types::{GeoPoint, SampleGrid};

/// Flight level 350 (35,000 ft) in km.
pub const FL350_KM: f64 = 10.7;

/// Flight level 400 (40,000 ft) in km.
pub const FL400_KM: f64 = 12.2;

const FEET_PER_KM: f64 = 3280.84;

/// The global grid: latitudes -90..90 and longitudes 0..355 in 5° steps,
/// latitude-major (37 × 72 = 2664 points).
pub fn default_global_grid() -> SampleGrid {
    let lats = lin_space(-90.0, 90.0, 37);
    let lons = lin_space(0.0, 355.0, 72);
    SampleGrid::from_valid_points(outer_product(&lats, &lons))
}

/// A 7 × 7 grid over Europe.
pub fn europe_grid() -> SampleGrid {
    let b = PresetRegion::Europe.bounds();
    let lats = lin_space(b.lat_min, b.lat_max, 7);
    let lons = lin_space(b.lon_min, b.lon_max, 7);
    SampleGrid::from_valid_points(outer_product(&lats, &lons))
}

/// A square grid over the given bounds with ⌊√n⌋ points per side.
pub fn custom_grid(
    lat_min: f64,
    lat_max: f64,
    lon_min: f64,
    lon_max: f64,
    n_points: usize,
) -> Result<SampleGrid, EngineError> {
    let per_side = (n_points as f64).sqrt().floor() as usize;
    if per_side == 0 {
        return Err(EngineError::Configuration(
            "custom grid needs at least one point".into(),
        ));
    }
    let lats = lin_space(lat_min, lat_max, per_side);
    let lons = lin_space(lon_min, lon_max, per_side);
    SampleGrid::new(outer_product(&lats, &lons))
}

fn outer_product(lats: &[f64], lons: &[f64]) -> Vec<GeoPoint> {
    lats.iter()
        .flat_map(|&lat| lons.iter().map(move |&lon| GeoPoint::new(lat, lon)))
        .collect()
}

/// Latitude/longitude bounds of a region (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionBounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

/// Named regions offered for custom grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresetRegion {
    Europe,
    #[serde(rename = "North America")]
    NorthAmerica,
    Asia,
    Global,
}

impl PresetRegion {
    pub const ALL: [PresetRegion; 4] = [
        PresetRegion::Europe,
        PresetRegion::NorthAmerica,
        PresetRegion::Asia,
        PresetRegion::Global,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PresetRegion::Europe => "Europe",
            PresetRegion::NorthAmerica => "North America",
            PresetRegion::Asia => "Asia",
            PresetRegion::Global => "Global",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn bounds(&self) -> RegionBounds {
        let (lat_min, lat_max, lon_min, lon_max) = match self {
            PresetRegion::Europe => (35.0, 70.0, -10.0, 30.0),
            PresetRegion::NorthAmerica => (25.0, 70.0, -130.0, -60.0),
            PresetRegion::Asia => (10.0, 60.0, 60.0, 140.0),
            PresetRegion::Global => (-90.0, 90.0, -180.0, 180.0),
        };
        RegionBounds {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        }
    }

    /// Square grid over this region with ⌊√n⌋ points per side.
    pub fn grid(&self, n_points: usize) -> Result<SampleGrid, EngineError> {
        let b = self.bounds();
        custom_grid(b.lat_min, b.lat_max, b.lon_min, b.lon_max, n_points)
    }
}

impl fmt::Display for PresetRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named altitude presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AltitudePreset {
    Fl350,
    Fl400,
}

impl AltitudePreset {
    pub fn km(&self) -> f64 {
        match self {
            AltitudePreset::Fl350 => FL350_KM,
            AltitudePreset::Fl400 => FL400_KM,
        }
    }
}

/// Altitude in feet.
pub fn km_to_feet(km: f64) -> f64 {
    km * FEET_PER_KM
}

/// `"10.7 km (FL351 / 35,104 ft)"`.
pub fn format_altitude_label(km: f64) -> String {
    let feet = km_to_feet(km);
    let flight_level = (feet / 100.0) as i64;
    format!(
        "{:.1} km (FL{:03} / {} ft)",
        km,
        flight_level,
        thousands(feet as i64)
    )
}

fn thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0 {
        out.insert(0, '-');
    }
    out
}

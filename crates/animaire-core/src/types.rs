//! Core types shared across the AniMAIRE workspace.
//!
//! This module defines the data carried through one simulation run: the
//! sample grid and altitudes, the geomagnetic context, the asymptotic
//! direction tables, and the dose-rate result tables.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::engine::EngineError;

/// Timestamp format used in job files and reports.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp.
pub fn parse_date_time(text: &str) -> Result<NaiveDateTime, EngineError> {
    NaiveDateTime::parse_from_str(text.trim(), DATETIME_FORMAT).map_err(|e| {
        EngineError::Configuration(format!(
            "invalid date/time '{}' (expected YYYY-MM-DD HH:MM:SS): {}",
            text, e
        ))
    })
}

/// A geographic location (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Latitude in [-90, 90] and a finite longitude in either the
    /// [-180, 180) or the [0, 360) convention.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(EngineError::Configuration(format!(
                "latitude {} is outside [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..360.0).contains(&self.longitude) {
            return Err(EngineError::Configuration(format!(
                "longitude {} is outside [-180, 360)",
                self.longitude
            )));
        }
        Ok(())
    }

    /// Unit vector in Earth-centred coordinates (x towards 0°E on the equator,
    /// z towards the north pole).
    pub fn unit_vector(&self) -> [f64; 3] {
        let lat = self.latitude.to_radians();
        let lon = self.longitude.to_radians();
        [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
    }

    /// Inverse of [`GeoPoint::unit_vector`]; longitude is returned in [0, 360).
    pub fn from_vector(v: [f64; 3]) -> Self {
        let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        let z = (v[2] / norm).clamp(-1.0, 1.0);
        let latitude = z.asin().to_degrees();
        let longitude = v[1].atan2(v[0]).to_degrees().rem_euclid(360.0);
        Self { latitude, longitude }
    }

    /// Great-circle angle between two directions, in degrees within [0, 180].
    ///
    /// Uses the atan2 form of the central angle, which stays accurate for
    /// both nearly coincident and nearly antipodal points.
    pub fn angular_separation_deg(&self, other: &GeoPoint) -> f64 {
        let a = self.unit_vector();
        let b = other.unit_vector();
        let cross = [
            a[1] * b[2] - a[2] * b[1],
            a[2] * b[0] - a[0] * b[2],
            a[0] * b[1] - a[1] * b[0],
        ];
        let sin = (cross[0] * cross[0] + cross[1] * cross[1] + cross[2] * cross[2]).sqrt();
        let cos = a[0] * b[0] + a[1] * b[1] + a[2] * b[2];
        sin.atan2(cos).to_degrees()
    }

    /// Same location with the longitude mapped to [0, 360).
    pub fn normalised(&self) -> Self {
        Self {
            latitude: self.latitude,
            longitude: self.longitude.rem_euclid(360.0),
        }
    }
}

/// Ordered, non-empty set of (latitude, longitude) sample points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleGrid {
    points: Vec<GeoPoint>,
}

impl SampleGrid {
    pub fn new(points: Vec<GeoPoint>) -> Result<Self, EngineError> {
        if points.is_empty() {
            return Err(EngineError::Configuration(
                "sample grid must contain at least one point".into(),
            ));
        }
        for (i, p) in points.iter().enumerate() {
            p.validate().map_err(|e| {
                EngineError::Configuration(format!("grid point {}: {}", i, e.detail()))
            })?;
        }
        Ok(Self { points })
    }

    /// Build from points already known to be valid.
    pub(crate) fn from_valid_points(points: Vec<GeoPoint>) -> Self {
        debug_assert!(!points.is_empty());
        Self { points }
    }

    /// Build from `(latitude, longitude)` pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self, EngineError> {
        Self::new(pairs.iter().map(|&(lat, lon)| GeoPoint::new(lat, lon)).collect())
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Ordered, non-empty set of altitudes (km above sea level).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AltitudeSet {
    altitudes_km: Vec<f64>,
}

impl AltitudeSet {
    pub fn new(altitudes_km: Vec<f64>) -> Result<Self, EngineError> {
        if altitudes_km.is_empty() {
            return Err(EngineError::Configuration(
                "at least one altitude is required".into(),
            ));
        }
        if let Some(bad) = altitudes_km.iter().find(|a| !a.is_finite() || **a < 0.0) {
            return Err(EngineError::Configuration(format!(
                "altitude {} km is not a non-negative number",
                bad
            )));
        }
        Ok(Self { altitudes_km })
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.altitudes_km
    }

    pub fn len(&self) -> usize {
        self.altitudes_km.len()
    }

    pub fn is_empty(&self) -> bool {
        self.altitudes_km.is_empty()
    }
}

/// Planetary geomagnetic activity index, 0 to 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct KpIndex(u8);

impl KpIndex {
    pub const MAX: u8 = 9;

    pub fn new(value: u8) -> Result<Self, EngineError> {
        if value > Self::MAX {
            return Err(EngineError::Configuration(format!(
                "Kp index {} is outside 0-{}",
                value,
                Self::MAX
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for KpIndex {
    type Error = EngineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<KpIndex> for u8 {
    fn from(kp: KpIndex) -> u8 {
        kp.0
    }
}

/// Geomagnetic conditions shared by every grid point and altitude of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeomagneticContext {
    pub kp: KpIndex,
    pub date_and_time: NaiveDateTime,
    /// Reference direction of the pitch-angle distribution.
    pub reference: GeoPoint,
}

/// A local arrival direction: zenith angle from vertical and azimuth
/// clockwise from geographic north (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZenithAzimuth {
    pub zenith_deg: f64,
    pub azimuth_deg: f64,
}

impl ZenithAzimuth {
    pub const fn new(zenith_deg: f64, azimuth_deg: f64) -> Self {
        Self { zenith_deg, azimuth_deg }
    }

    pub const VERTICAL: ZenithAzimuth = ZenithAzimuth::new(0.0, 0.0);
}

/// The fixed nine-direction set: vertical, then four azimuths at 16° and
/// at 32° zenith.
pub const DEFAULT_ZENITH_AZIMUTHS: [ZenithAzimuth; 9] = [
    ZenithAzimuth::new(0.0, 0.0),
    ZenithAzimuth::new(16.0, 0.0),
    ZenithAzimuth::new(16.0, 90.0),
    ZenithAzimuth::new(16.0, 180.0),
    ZenithAzimuth::new(16.0, 270.0),
    ZenithAzimuth::new(32.0, 0.0),
    ZenithAzimuth::new(32.0, 90.0),
    ZenithAzimuth::new(32.0, 180.0),
    ZenithAzimuth::new(32.0, 270.0),
];

/// One resolver output row: a (grid point, arrival angle) pair with its
/// asymptotic direction and cutoff rigidity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDirectionRow {
    pub latitude: f64,
    pub longitude: f64,
    pub zenith_deg: f64,
    pub azimuth_deg: f64,
    pub asymptotic_latitude: f64,
    pub asymptotic_longitude: f64,
    pub cutoff_rigidity_gv: f64,
}

impl RawDirectionRow {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    pub fn asymptotic_direction(&self) -> GeoPoint {
        GeoPoint::new(self.asymptotic_latitude, self.asymptotic_longitude)
    }
}

/// Raw resolver output for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDirectionTable {
    pub rows: Vec<RawDirectionRow>,
}

/// A resolved direction annotated with its pitch angle relative to the
/// run's reference direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AsymptoticDirectionRow {
    #[serde(flatten)]
    pub raw: RawDirectionRow,
    pub pitch_angle_deg: f64,
}

/// Processed direction table, produced once per run and read by every
/// per-species dose computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsymptoticDirectionTable {
    pub reference: GeoPoint,
    pub date_and_time: NaiveDateTime,
    pub rows: Vec<AsymptoticDirectionRow>,
}

impl AsymptoticDirectionTable {
    /// Rows belonging to one grid location, in table order.
    pub fn rows_at<'a>(
        &'a self,
        location: &'a GeoPoint,
    ) -> impl Iterator<Item = &'a AsymptoticDirectionRow> + 'a {
        self.rows.iter().filter(move |r| {
            (r.raw.latitude - location.latitude).abs() < 1e-9
                && (r.raw.longitude - location.longitude).abs() < 1e-9
        })
    }
}

/// The dose columns that are summed across particle distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DoseColumn {
    /// Absorbed dose rate.
    Adose,
    /// Effective dose rate.
    Edose,
    /// Ambient dose equivalent rate.
    Dosee,
    /// Single-event-upset rate.
    Seu,
    /// Single-event-latchup rate.
    Sel,
}

impl DoseColumn {
    pub const ALL: [DoseColumn; 5] = [
        DoseColumn::Adose,
        DoseColumn::Edose,
        DoseColumn::Dosee,
        DoseColumn::Seu,
        DoseColumn::Sel,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DoseColumn::Adose => "adose",
            DoseColumn::Edose => "edose",
            DoseColumn::Dosee => "dosee",
            DoseColumn::Seu => "SEU",
            DoseColumn::Sel => "SEL",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// One dose-rate result row for a (grid point, altitude) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseRateRow {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "altitude (km)")]
    pub altitude_km: f64,
    pub adose: f64,
    pub edose: f64,
    pub dosee: f64,
    #[serde(rename = "SEU")]
    pub seu: f64,
    #[serde(rename = "SEL")]
    pub sel: f64,
    /// Optional columns that are not summed across species
    /// (neutron-monitor count rates, diagnostics).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, f64>,
}

impl DoseRateRow {
    /// A row with all dose columns at zero.
    pub fn zeroed(location: GeoPoint, altitude_km: f64) -> Self {
        Self {
            latitude: location.latitude,
            longitude: location.longitude,
            altitude_km,
            adose: 0.0,
            edose: 0.0,
            dosee: 0.0,
            seu: 0.0,
            sel: 0.0,
            extra: BTreeMap::new(),
        }
    }

    pub fn dose(&self, column: DoseColumn) -> f64 {
        match column {
            DoseColumn::Adose => self.adose,
            DoseColumn::Edose => self.edose,
            DoseColumn::Dosee => self.dosee,
            DoseColumn::Seu => self.seu,
            DoseColumn::Sel => self.sel,
        }
    }

    pub fn dose_mut(&mut self, column: DoseColumn) -> &mut f64 {
        match column {
            DoseColumn::Adose => &mut self.adose,
            DoseColumn::Edose => &mut self.edose,
            DoseColumn::Dosee => &mut self.dosee,
            DoseColumn::Seu => &mut self.seu,
            DoseColumn::Sel => &mut self.sel,
        }
    }

    /// Look up any column by its table name.
    pub fn value(&self, name: &str) -> Option<f64> {
        match name {
            LATITUDE_COLUMN => Some(self.latitude),
            LONGITUDE_COLUMN => Some(self.longitude),
            ALTITUDE_COLUMN => Some(self.altitude_km),
            _ => DoseColumn::from_name(name)
                .map(|c| self.dose(c))
                .or_else(|| self.extra.get(name).copied()),
        }
    }
}

pub const LATITUDE_COLUMN: &str = "latitude";
pub const LONGITUDE_COLUMN: &str = "longitude";
pub const ALTITUDE_COLUMN: &str = "altitude (km)";

/// Dose-rate table: one row per (grid point, altitude).
///
/// The combined table of a run has the same shape as the per-distribution
/// tables it was summed from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoseRateTable {
    pub rows: Vec<DoseRateRow>,
}

impl DoseRateTable {
    pub fn new(rows: Vec<DoseRateRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names in display order: location, altitude, the five dose
    /// columns, then any extra columns present in the first row.
    pub fn column_names(&self) -> Vec<String> {
        let mut names = vec![
            LATITUDE_COLUMN.to_string(),
            LONGITUDE_COLUMN.to_string(),
            ALTITUDE_COLUMN.to_string(),
        ];
        names.extend(DoseColumn::ALL.iter().map(|c| c.name().to_string()));
        if let Some(first) = self.rows.first() {
            names.extend(first.extra.keys().cloned());
        }
        names
    }

    /// All values of one column, or `None` if any row lacks it.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        self.rows.iter().map(|r| r.value(name)).collect()
    }

    pub fn dose_column(&self, column: DoseColumn) -> Vec<f64> {
        self.rows.iter().map(|r| r.dose(column)).collect()
    }

    /// Distinct altitudes in first-seen order.
    pub fn altitudes(&self) -> Vec<f64> {
        let mut out: Vec<f64> = Vec::new();
        for row in &self.rows {
            if !out.iter().any(|a| (a - row.altitude_km).abs() < 1e-12) {
                out.push(row.altitude_km);
            }
        }
        out
    }

    /// Rows at the available altitude closest to `altitude_km`.
    pub fn nearest_altitude_slice(&self, altitude_km: f64) -> Vec<&DoseRateRow> {
        let nearest = self
            .altitudes()
            .into_iter()
            .min_by(|a, b| {
                (a - altitude_km)
                    .abs()
                    .total_cmp(&(b - altitude_km).abs())
            });
        match nearest {
            Some(alt) => self
                .rows
                .iter()
                .filter(|r| (r.altitude_km - alt).abs() < 1e-12)
                .collect(),
            None => Vec::new(),
        }
    }
}

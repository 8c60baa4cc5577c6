//! Tabulated yield functions.
//!
//! A yield function maps the rigidity of a primary particle arriving at
//! the top of the atmosphere to the dose (or count rate) it produces at a
//! given altitude. Each quantity is tabulated on a small (altitude,
//! rigidity) grid. Between rigidity knots the table is interpolated with a
//! natural cubic spline in ln R; between altitudes it is interpolated
//! linearly. Both axes are clamped to the tabulated range.
//!
//! Yield files are comma-separated with a header line:
//! ```text
//! quantity,altitude_km,rigidity_gv,yield
//! edose,10.7,1.0,2.1e-4
//! ...
//! ```
//! `quantity` is one of `adose`, `edose`, `dosee`, `SEU`, `SEL` or `NM`
//! (sea-level neutron-monitor yield, optional).

use std::collections::BTreeMap;
use std::path::Path;

use animaire_core::spectra::log_space;
use animaire_core::types::DoseColumn;

use crate::error::DoseError;
use crate::spline::CubicSpline;

const HEADER: [&str; 4] = ["quantity", "altitude_km", "rigidity_gv", "yield"];

/// Altitudes closer than this are one tabulated level (km).
const ALTITUDE_TOLERANCE_KM: f64 = 1e-9;

/// Quantity a yield table produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum YieldQuantity {
    Dose(DoseColumn),
    NeutronMonitor,
}

impl YieldQuantity {
    pub const NEUTRON_MONITOR_NAME: &'static str = "NM";

    pub fn name(&self) -> &'static str {
        match self {
            YieldQuantity::Dose(column) => column.name(),
            YieldQuantity::NeutronMonitor => Self::NEUTRON_MONITOR_NAME,
        }
    }

    /// Case-insensitive lookup.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case(Self::NEUTRON_MONITOR_NAME) {
            return Some(YieldQuantity::NeutronMonitor);
        }
        DoseColumn::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
            .map(YieldQuantity::Dose)
    }
}

fn column_index(column: DoseColumn) -> usize {
    match column {
        DoseColumn::Adose => 0,
        DoseColumn::Edose => 1,
        DoseColumn::Dosee => 2,
        DoseColumn::Seu => 3,
        DoseColumn::Sel => 4,
    }
}

/// One quantity tabulated over altitude and rigidity.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldTable {
    altitudes_km: Vec<f64>,
    /// One spline in ln R per altitude.
    splines: Vec<CubicSpline>,
}

impl YieldTable {
    /// Build from `(altitude_km, rigidity_gv, yield)` samples in any order.
    ///
    /// Every altitude needs at least two distinct rigidities.
    pub fn from_samples(samples: &[(f64, f64, f64)]) -> Result<Self, DoseError> {
        if samples.is_empty() {
            return Err(DoseError::InvalidTable("no yield samples".into()));
        }
        for &(alt, rigidity, value) in samples {
            if !alt.is_finite() || alt < 0.0 {
                return Err(DoseError::InvalidTable(format!("invalid altitude {} km", alt)));
            }
            if !rigidity.is_finite() || rigidity <= 0.0 {
                return Err(DoseError::InvalidTable(format!(
                    "invalid rigidity {} GV",
                    rigidity
                )));
            }
            if !value.is_finite() || value < 0.0 {
                return Err(DoseError::InvalidTable(format!(
                    "yield {} at {} km, {} GV is not a non-negative number",
                    value, alt, rigidity
                )));
            }
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

        let mut altitudes_km = Vec::new();
        let mut splines = Vec::new();
        let mut start = 0;
        while start < sorted.len() {
            let alt = sorted[start].0;
            let end = sorted[start..]
                .iter()
                .position(|s| (s.0 - alt).abs() > ALTITUDE_TOLERANCE_KM)
                .map_or(sorted.len(), |offset| start + offset);
            let level = &sorted[start..end];
            let xs = level.iter().map(|s| s.1.ln()).collect();
            let ys = level.iter().map(|s| s.2).collect();
            let spline = CubicSpline::new(xs, ys).map_err(|e| {
                DoseError::InvalidTable(format!("altitude {} km: {}", alt, e))
            })?;
            altitudes_km.push(alt);
            splines.push(spline);
            start = end;
        }

        Ok(Self {
            altitudes_km,
            splines,
        })
    }

    /// Tabulated altitude range `(lowest, highest)` in km.
    pub fn altitude_range(&self) -> (f64, f64) {
        (self.altitudes_km[0], self.altitudes_km[self.altitudes_km.len() - 1])
    }

    pub fn altitudes_km(&self) -> &[f64] {
        &self.altitudes_km
    }

    fn level(&self, index: usize, ln_rigidity: f64) -> f64 {
        self.splines[index].evaluate_clamped(ln_rigidity).max(0.0)
    }

    /// Yield for a primary of `rigidity_gv` observed at `altitude_km`.
    pub fn evaluate(&self, rigidity_gv: f64, altitude_km: f64) -> f64 {
        if !(rigidity_gv > 0.0) {
            return 0.0;
        }
        let ln_r = rigidity_gv.ln();
        let (lo, hi) = self.altitude_range();
        let h = altitude_km.clamp(lo, hi);

        let upper = self
            .altitudes_km
            .iter()
            .position(|&a| a >= h)
            .unwrap_or(self.altitudes_km.len() - 1);
        if upper == 0 || (self.altitudes_km[upper] - h).abs() <= ALTITUDE_TOLERANCE_KM {
            return self.level(upper, ln_r);
        }
        let lower = upper - 1;
        let (a0, a1) = (self.altitudes_km[lower], self.altitudes_km[upper]);
        let t = (h - a0) / (a1 - a0);
        (1.0 - t) * self.level(lower, ln_r) + t * self.level(upper, ln_r)
    }
}

fn builtin_shape(rigidity: f64, alt: f64) -> f64 {
    let threshold = 0.5 + 0.25 * (20.0 - alt.min(20.0));
    ((alt - 10.7) / 6.0).exp()
        * rigidity.powf(0.6)
        * (1.0 - (-(rigidity / threshold).powf(1.5)).exp())
}

/// Yield tables for the five dose quantities and, optionally, a sea-level
/// neutron monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldSet {
    name: String,
    dose: [YieldTable; 5],
    neutron_monitor: Option<YieldTable>,
}

impl YieldSet {
    /// `dose` is indexed in [`DoseColumn::ALL`] order.
    pub fn new(
        name: impl Into<String>,
        dose: [YieldTable; 5],
        neutron_monitor: Option<YieldTable>,
    ) -> Self {
        Self {
            name: name.into(),
            dose,
            neutron_monitor,
        }
    }

    /// Coarse, uncalibrated yields for smoke runs.
    ///
    /// All quantities share one shape,
    /// `s_q · exp((h − 10.7)/6) · R^0.6 · (1 − exp(−(R/R_h)^1.5))`,
    /// where the atmospheric threshold `R_h` grows towards sea level.
    pub fn builtin() -> Result<Self, DoseError> {
        const ALTITUDES_KM: [f64; 6] = [0.0, 5.0, 10.7, 12.2, 15.0, 20.0];
        const SCALES: [f64; 5] = [2.0e-4, 3.0e-4, 3.3e-4, 5.0e-9, 2.0e-11];
        let rigidities = log_space(0.1, 1000.0, 13);

        let table = |scale: f64, altitudes: &[f64]| {
            let samples: Vec<(f64, f64, f64)> = altitudes
                .iter()
                .flat_map(|&h| {
                    rigidities
                        .iter()
                        .map(move |&r| (h, r, scale * builtin_shape(r, h)))
                })
                .collect();
            YieldTable::from_samples(&samples)
        };

        let dose = [
            table(SCALES[0], &ALTITUDES_KM[..])?,
            table(SCALES[1], &ALTITUDES_KM[..])?,
            table(SCALES[2], &ALTITUDES_KM[..])?,
            table(SCALES[3], &ALTITUDES_KM[..])?,
            table(SCALES[4], &ALTITUDES_KM[..])?,
        ];
        let neutron_monitor = table(1.0, &[0.0][..])?;
        Ok(Self::new("built-in (uncalibrated)", dose, Some(neutron_monitor)))
    }

    /// Parse a yield file.
    pub fn from_csv_str(name: impl Into<String>, content: &str) -> Result<Self, DoseError> {
        let mut samples: BTreeMap<YieldQuantity, Vec<(f64, f64, f64)>> = BTreeMap::new();
        let mut header_seen = false;

        for (idx, line) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split(',').map(str::trim).collect();
            if !header_seen {
                if parts != HEADER {
                    return Err(DoseError::Format {
                        line: line_no,
                        message: format!("Expected header '{}', got '{}'", HEADER.join(","), line),
                    });
                }
                header_seen = true;
                continue;
            }
            if parts.len() != HEADER.len() {
                return Err(DoseError::Format {
                    line: line_no,
                    message: format!("Expected {} fields, got {}", HEADER.len(), parts.len()),
                });
            }

            let quantity = YieldQuantity::from_name(parts[0]).ok_or_else(|| DoseError::Format {
                line: line_no,
                message: format!("Unknown quantity: {}", parts[0]),
            })?;
            let mut values = [0.0; 3];
            for (i, (slot, text)) in values.iter_mut().zip(&parts[1..]).enumerate() {
                *slot = text.parse().map_err(|_| DoseError::Format {
                    line: line_no,
                    message: format!("Invalid {}: {}", HEADER[i + 1], text),
                })?;
            }
            samples
                .entry(quantity)
                .or_default()
                .push((values[0], values[1], values[2]));
        }

        let mut build = |quantity: YieldQuantity| -> Result<Option<YieldTable>, DoseError> {
            match samples.remove(&quantity) {
                Some(s) => YieldTable::from_samples(&s)
                    .map(Some)
                    .map_err(|e| DoseError::InvalidTable(format!("{}: {}", quantity.name(), e))),
                None => Ok(None),
            }
        };
        let mut dose_table = |column: DoseColumn| -> Result<YieldTable, DoseError> {
            build(YieldQuantity::Dose(column))?
                .ok_or_else(|| DoseError::MissingQuantity(column.name().to_string()))
        };
        let dose = [
            dose_table(DoseColumn::Adose)?,
            dose_table(DoseColumn::Edose)?,
            dose_table(DoseColumn::Dosee)?,
            dose_table(DoseColumn::Seu)?,
            dose_table(DoseColumn::Sel)?,
        ];
        let neutron_monitor = build(YieldQuantity::NeutronMonitor)?;
        Ok(Self::new(name, dose, neutron_monitor))
    }

    pub fn from_path(path: &Path) -> Result<Self, DoseError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_csv_str(path.display().to_string(), &content)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self, column: DoseColumn) -> &YieldTable {
        &self.dose[column_index(column)]
    }

    pub fn neutron_monitor(&self) -> Option<&YieldTable> {
        self.neutron_monitor.as_ref()
    }
}

//! Yield-function dose engine.
//!
//! For every grid point and altitude the dose of quantity `q` is
//!
//! ```text
//! D_q = ⟨ ∫_{max(Rc, Rmin)}^{Rmax} J(R) · PAD(α, R) · Y_q(R, h) dR ⟩
//! ```
//!
//! where the average runs over the asymptotic directions resolved for that
//! point, `Rc` and `α` are the cutoff rigidity and pitch angle of each
//! direction, and the integral is a trapezoid rule on a fixed log-spaced
//! rigidity grid. The interval containing the cutoff is integrated from the
//! cutoff itself with a linearly interpolated integrand.

use animaire_core::engine::{CollaboratorError, DoseEngine, DoseRequest};
use animaire_core::spectra::log_space;
use animaire_core::types::{AsymptoticDirectionRow, DoseColumn, DoseRateRow, DoseRateTable};

use crate::error::DoseError;
use crate::yields::YieldSet;

pub const NM_COUNT_RATE_COLUMN: &str = "NM count rate";
pub const MEAN_CUTOFF_COLUMN: &str = "mean cutoff rigidity (GV)";
pub const MEAN_PITCH_ANGLE_COLUMN: &str = "mean pitch angle (deg)";

/// Rigidity integration range and resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationSettings {
    pub min_rigidity_gv: f64,
    pub max_rigidity_gv: f64,
    /// Number of log-spaced rigidity nodes.
    pub samples: usize,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            min_rigidity_gv: 0.1,
            max_rigidity_gv: 1000.0,
            samples: 256,
        }
    }
}

impl IntegrationSettings {
    pub fn validate(&self) -> Result<(), DoseError> {
        if !(self.min_rigidity_gv > 0.0) || !(self.max_rigidity_gv > self.min_rigidity_gv) {
            return Err(DoseError::InvalidSettings(format!(
                "rigidity range [{}, {}] GV must satisfy 0 < min < max",
                self.min_rigidity_gv, self.max_rigidity_gv
            )));
        }
        if self.samples < 2 || !self.max_rigidity_gv.is_finite() {
            return Err(DoseError::InvalidSettings(format!(
                "need at least 2 rigidity samples over a finite range, got {}",
                self.samples
            )));
        }
        Ok(())
    }
}

/// Trapezoid integral of `f` over `grid`, restricted to `x >= lower`.
///
/// `f(i)` is the integrand at `grid[i]`.
pub fn integrate_above(grid: &[f64], f: impl Fn(usize) -> f64, lower: f64) -> f64 {
    let mut total = 0.0;
    for i in 0..grid.len().saturating_sub(1) {
        let (x0, x1) = (grid[i], grid[i + 1]);
        if x1 <= lower {
            continue;
        }
        let (f0, f1) = (f(i), f(i + 1));
        if x0 >= lower {
            total += 0.5 * (f0 + f1) * (x1 - x0);
        } else {
            let t = (lower - x0) / (x1 - x0);
            let f_lower = f0 + t * (f1 - f0);
            total += 0.5 * (f_lower + f1) * (x1 - lower);
        }
    }
    total
}

/// Per-direction integrand without the yield factor.
struct DirectionIntegrand {
    lower_gv: f64,
    values: Vec<f64>,
}

/// Reference [`DoseEngine`] folding spectra with tabulated yields.
#[derive(Debug, Clone)]
pub struct YieldFunctionDoseEngine {
    yields: YieldSet,
    settings: IntegrationSettings,
    rigidity_grid: Vec<f64>,
}

impl YieldFunctionDoseEngine {
    pub fn new(yields: YieldSet) -> Self {
        let settings = IntegrationSettings::default();
        Self {
            rigidity_grid: log_space(settings.min_rigidity_gv, settings.max_rigidity_gv, settings.samples),
            yields,
            settings,
        }
    }

    pub fn with_settings(yields: YieldSet, settings: IntegrationSettings) -> Result<Self, DoseError> {
        settings.validate()?;
        Ok(Self {
            rigidity_grid: log_space(settings.min_rigidity_gv, settings.max_rigidity_gv, settings.samples),
            yields,
            settings,
        })
    }

    /// Engine over the built-in, uncalibrated yields.
    pub fn builtin() -> Result<Self, DoseError> {
        Ok(Self::new(YieldSet::builtin()?))
    }

    pub fn yields(&self) -> &YieldSet {
        &self.yields
    }

    pub fn settings(&self) -> &IntegrationSettings {
        &self.settings
    }

    /// Dose table for one distribution; rows are point-major, altitude-minor.
    pub fn compute_table(&self, request: &DoseRequest<'_>) -> Result<DoseRateTable, DoseError> {
        let grid_r = &self.rigidity_grid;
        let altitudes = request.altitudes.as_slice();
        let distribution = request.distribution;

        // yields[altitude][column][rigidity node]
        let dose_yields: Vec<Vec<Vec<f64>>> = altitudes
            .iter()
            .map(|&h| {
                DoseColumn::ALL
                    .iter()
                    .map(|&c| {
                        let table = self.yields.table(c);
                        grid_r.iter().map(|&r| table.evaluate(r, h)).collect()
                    })
                    .collect()
            })
            .collect();
        let nm_yield: Option<Vec<f64>> = if request.generate_nm_rates {
            let table = self
                .yields
                .neutron_monitor()
                .ok_or_else(|| DoseError::MissingQuantity("NM".into()))?;
            Some(grid_r.iter().map(|&r| table.evaluate(r, 0.0)).collect())
        } else {
            None
        };

        let mut rows = Vec::with_capacity(request.grid.len() * altitudes.len());
        for point in request.grid.points() {
            let directions: Vec<&AsymptoticDirectionRow> =
                request.directions.rows_at(point).collect();
            if directions.is_empty() {
                return Err(DoseError::MissingDirections {
                    latitude: point.latitude,
                    longitude: point.longitude,
                });
            }
            let integrands: Vec<DirectionIntegrand> = directions
                .iter()
                .map(|d| {
                    let pitch = d.pitch_angle_deg.to_radians();
                    DirectionIntegrand {
                        lower_gv: d.raw.cutoff_rigidity_gv.max(self.settings.min_rigidity_gv),
                        values: grid_r
                            .iter()
                            .map(|&r| distribution.flux(r) * distribution.pitch_angle_weight(pitch, r))
                            .collect(),
                    }
                })
                .collect();
            let n = integrands.len() as f64;
            let mean_over_directions = |yields: &[f64]| {
                integrands
                    .iter()
                    .map(|d| integrate_above(grid_r, |i| d.values[i] * yields[i], d.lower_gv))
                    .sum::<f64>()
                    / n
            };

            for (alt_idx, &altitude) in altitudes.iter().enumerate() {
                let mut row = DoseRateRow::zeroed(*point, altitude);
                for (col_idx, &column) in DoseColumn::ALL.iter().enumerate() {
                    let value = mean_over_directions(dose_yields[alt_idx][col_idx].as_slice());
                    if !value.is_finite() {
                        return Err(DoseError::NonFinite {
                            label: distribution.label().to_string(),
                            column: column.name().to_string(),
                        });
                    }
                    *row.dose_mut(column) = value;
                }
                if let Some(nm) = &nm_yield {
                    row.extra
                        .insert(NM_COUNT_RATE_COLUMN.to_string(), mean_over_directions(nm.as_slice()));
                }
                if request.record_full_output {
                    let mean_cutoff =
                        directions.iter().map(|d| d.raw.cutoff_rigidity_gv).sum::<f64>() / n;
                    let mean_pitch = directions.iter().map(|d| d.pitch_angle_deg).sum::<f64>() / n;
                    row.extra.insert(MEAN_CUTOFF_COLUMN.to_string(), mean_cutoff);
                    row.extra.insert(MEAN_PITCH_ANGLE_COLUMN.to_string(), mean_pitch);
                }
                rows.push(row);
            }
        }

        log::debug!(
            "'{}': {} dose rows from {} yields",
            distribution.label(),
            rows.len(),
            self.yields.name()
        );
        Ok(DoseRateTable::new(rows))
    }
}

impl DoseEngine for YieldFunctionDoseEngine {
    fn compute(&self, request: &DoseRequest<'_>) -> Result<DoseRateTable, CollaboratorError> {
        Ok(self.compute_table(request)?)
    }

    fn name(&self) -> &str {
        "yield function"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use animaire_core::spectra::{ParticleDistribution, PitchAngleDistribution, RigiditySpectrum};
    use animaire_core::types::{
        AltitudeSet, AsymptoticDirectionTable, GeoPoint, RawDirectionRow, SampleGrid,
    };
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDateTime;

    struct Flat;

    impl RigiditySpectrum for Flat {
        fn flux(&self, _rigidity_gv: f64) -> f64 {
            1.0
        }
    }

    impl PitchAngleDistribution for Flat {
        fn weight(&self, _pitch_angle_rad: f64, _rigidity_gv: f64) -> f64 {
            1.0
        }
    }

    /// Only particles arriving within 90° of the reference contribute.
    struct Forward;

    impl PitchAngleDistribution for Forward {
        fn weight(&self, pitch_angle_rad: f64, _rigidity_gv: f64) -> f64 {
            if pitch_angle_rad < std::f64::consts::FRAC_PI_2 {
                1.0
            } else {
                0.0
            }
        }
    }

    fn unit_yields() -> YieldSet {
        let mut csv = String::from("quantity,altitude_km,rigidity_gv,yield\n");
        for q in ["adose", "edose", "dosee", "SEU", "SEL"] {
            csv.push_str(&format!("{q},10,1,1\n{q},10,10,1\n{q},12,1,2\n{q},12,10,2\n"));
        }
        csv.push_str("NM,0,1,5\nNM,0,10,5\n");
        YieldSet::from_csv_str("unit", &csv).unwrap()
    }

    fn engine() -> YieldFunctionDoseEngine {
        let settings = IntegrationSettings {
            min_rigidity_gv: 1.0,
            max_rigidity_gv: 10.0,
            samples: 10,
        };
        YieldFunctionDoseEngine::with_settings(unit_yields(), settings).unwrap()
    }

    fn direction(lat: f64, cutoff: f64, pitch: f64) -> AsymptoticDirectionRow {
        AsymptoticDirectionRow {
            raw: RawDirectionRow {
                latitude: lat,
                longitude: 0.0,
                zenith_deg: 0.0,
                azimuth_deg: 0.0,
                asymptotic_latitude: 0.0,
                asymptotic_longitude: 0.0,
                cutoff_rigidity_gv: cutoff,
            },
            pitch_angle_deg: pitch,
        }
    }

    fn directions() -> AsymptoticDirectionTable {
        AsymptoticDirectionTable {
            reference: GeoPoint::new(90.0, 0.0),
            date_and_time: NaiveDateTime::default(),
            rows: vec![
                direction(0.0, 2.0, 10.0),
                direction(0.0, 4.0, 120.0),
                direction(10.0, 0.5, 30.0),
            ],
        }
    }

    fn run(
        pad: Arc<dyn PitchAngleDistribution>,
        nm: bool,
        full: bool,
    ) -> Result<DoseRateTable, DoseError> {
        let distribution = ParticleDistribution::new("flat", Arc::new(Flat), pad);
        let grid = SampleGrid::from_pairs(&[(0.0, 0.0), (10.0, 0.0)]).unwrap();
        let altitudes = AltitudeSet::new(vec![10.0, 12.0]).unwrap();
        let directions = directions();
        engine().compute_table(&DoseRequest {
            distribution: &distribution,
            directions: &directions,
            grid: &grid,
            altitudes: &altitudes,
            generate_nm_rates: nm,
            record_full_output: full,
        })
    }

    #[test]
    fn test_integrate_above_cuts_at_lower_limit() {
        let grid = [1.0, 2.0, 4.0];
        assert_abs_diff_eq!(integrate_above(&grid, |_| 1.0, 0.0), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(integrate_above(&grid, |_| 1.0, 1.5), 2.5, epsilon = 1e-12);
        assert_eq!(integrate_above(&grid, |_| 1.0, 4.0), 0.0);
        // Linear integrand is integrated exactly.
        assert_abs_diff_eq!(integrate_above(&grid, |i| grid[i], 1.0), 7.5, epsilon = 1e-12);
    }

    #[test]
    fn test_rows_are_point_major() {
        let table = run(Arc::new(Flat), false, false).unwrap();
        assert_eq!(table.len(), 4);
        let order: Vec<(f64, f64)> = table.rows.iter().map(|r| (r.latitude, r.altitude_km)).collect();
        assert_eq!(order, vec![(0.0, 10.0), (0.0, 12.0), (10.0, 10.0), (10.0, 12.0)]);
        assert!(table.rows[0].extra.is_empty());
    }

    #[test]
    fn test_dose_averages_directions_above_cutoff() {
        let table = run(Arc::new(Flat), false, false).unwrap();
        // Cutoffs 2 and 4 GV with unit integrand up to 10 GV: (8 + 6) / 2.
        assert_abs_diff_eq!(table.rows[0].edose, 7.0, epsilon = 1e-9);
        assert_abs_diff_eq!(table.rows[1].edose, 14.0, epsilon = 1e-9);
        // Cutoff below the integration floor starts at 1 GV.
        assert_abs_diff_eq!(table.rows[2].sel, 9.0, epsilon = 1e-9);
        for column in DoseColumn::ALL {
            assert_abs_diff_eq!(table.rows[3].dose(column), 18.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_pitch_angle_distribution_weights_directions() {
        let table = run(Arc::new(Forward), false, false).unwrap();
        // The 120° direction no longer contributes: (8 + 0) / 2.
        assert_abs_diff_eq!(table.rows[0].adose, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_optional_columns() {
        let table = run(Arc::new(Flat), true, true).unwrap();
        let row = &table.rows[1];
        assert_abs_diff_eq!(row.extra[NM_COUNT_RATE_COLUMN], 35.0, epsilon = 1e-9);
        assert_abs_diff_eq!(row.extra[MEAN_CUTOFF_COLUMN], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(row.extra[MEAN_PITCH_ANGLE_COLUMN], 65.0, epsilon = 1e-12);
        // Neutron monitors sit at sea level: same rate at every altitude.
        assert_eq!(row.extra[NM_COUNT_RATE_COLUMN], table.rows[0].extra[NM_COUNT_RATE_COLUMN]);
    }

    #[test]
    fn test_missing_directions_and_nm_yields() {
        let distribution = ParticleDistribution::new("flat", Arc::new(Flat), Arc::new(Flat));
        let grid = SampleGrid::from_pairs(&[(45.0, 45.0)]).unwrap();
        let altitudes = AltitudeSet::new(vec![10.0]).unwrap();
        let directions = directions();
        let request = DoseRequest {
            distribution: &distribution,
            directions: &directions,
            grid: &grid,
            altitudes: &altitudes,
            generate_nm_rates: false,
            record_full_output: false,
        };
        assert!(matches!(
            engine().compute_table(&request),
            Err(DoseError::MissingDirections { .. })
        ));

        let csv = "quantity,altitude_km,rigidity_gv,yield\n".to_string()
            + &["adose", "edose", "dosee", "SEU", "SEL"]
                .iter()
                .map(|q| format!("{q},10,1,1\n{q},10,10,1\n"))
                .collect::<String>();
        let no_nm = YieldFunctionDoseEngine::new(YieldSet::from_csv_str("no nm", &csv).unwrap());
        let grid = SampleGrid::from_pairs(&[(0.0, 0.0)]).unwrap();
        let request = DoseRequest {
            grid: &grid,
            generate_nm_rates: true,
            ..request
        };
        assert!(matches!(
            no_nm.compute_table(&request),
            Err(DoseError::MissingQuantity(_))
        ));
    }

    #[test]
    fn test_invalid_settings() {
        let bad = IntegrationSettings {
            min_rigidity_gv: 10.0,
            max_rigidity_gv: 1.0,
            samples: 10,
        };
        assert!(YieldFunctionDoseEngine::with_settings(unit_yields(), bad).is_err());
        let coarse = IntegrationSettings {
            samples: 1,
            ..IntegrationSettings::default()
        };
        assert!(coarse.validate().is_err());
    }

    #[test]
    fn test_builtin_engine_produces_positive_doses() {
        let model = animaire_core::spectra::SpectralModel::PowerLaw {
            j0: 1.0e4,
            gamma: 5.0,
            delta_gamma: 0.1,
            sigma: 0.5,
        };
        let distribution = model.distribution("protons").unwrap();
        let grid = SampleGrid::from_pairs(&[(0.0, 0.0)]).unwrap();
        let altitudes = AltitudeSet::new(vec![10.7]).unwrap();
        let directions = directions();
        let table = YieldFunctionDoseEngine::builtin()
            .unwrap()
            .compute_table(&DoseRequest {
                distribution: &distribution,
                directions: &directions,
                grid: &grid,
                altitudes: &altitudes,
                generate_nm_rates: true,
                record_full_output: false,
            })
            .unwrap();
        assert!(table.rows[0].edose > 0.0);
        assert!(table.rows[0].extra[NM_COUNT_RATE_COLUMN] > 0.0);
    }
}

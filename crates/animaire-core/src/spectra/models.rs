//! The supported spectral models and their rigidity/pitch-angle functions.
//!
//! | Model | Spectrum | Pitch-angle distribution |
//! |-------|----------|--------------------------|
//! | `POWER_LAW` | J0·R^-γ·exp(-Δγ·ln²R) | Gaussian in α |
//! | `DOUBLE_POWER_LAW` | power law + b·J0·R^(-γ-1)·exp(-Δγ·ln²R) | Two Gaussians, peak-normalised |
//! | `POWER_LAW_BEECK` | power law | exp(-a·(1-cos α)^b) |
//! | `DLR` | (p/100)·100·R^-2.7·exp(-0.1·ln²R) | Isotropic |
//! | `CUSTOM` | Sandboxed user formula in `R` | Isotropic |

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::expr::CompiledExpression;
use super::{lin_space, log_space, ParticleDistribution, PitchAngleDistribution, RigiditySpectrum};
use crate::engine::EngineError;

/// Rigidity range used for previews and for checking user formulas (GV).
pub const PREVIEW_RIGIDITY_RANGE_GV: (f64, f64) = (0.1, 100.0);

/// Number of samples in spectrum and pitch-angle previews.
pub const PREVIEW_SAMPLES: usize = 1000;

/// Samples used to find the peak of a double-Gaussian distribution.
const NORMALISATION_SAMPLES: usize = 1000;

/// Default formula offered for custom spectra.
pub const DEFAULT_CUSTOM_FORMULA: &str = "J0 * (R/R0)^(-gamma) * exp(-deltaGamma * log(R/R0)^2)";

/// Which neutron-monitor quantity drives the DLR approximation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DlrParameter {
    /// Oulu neutron-monitor count rate (percent of the reference).
    Oulu(f64),
    /// Heliospheric modulation parameter W.
    W(f64),
}

impl DlrParameter {
    pub fn value(&self) -> f64 {
        match self {
            DlrParameter::Oulu(v) | DlrParameter::W(v) => *v,
        }
    }
}

/// A particle distribution model with its typed parameters.
///
/// Serialised with a `model` tag, e.g.
///
/// ```toml
/// model = "POWER_LAW"
/// j0 = 2.034e4
/// gamma = 5.2
/// delta_gamma = 0.2
/// sigma = 0.4
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpectralModel {
    PowerLaw {
        j0: f64,
        gamma: f64,
        delta_gamma: f64,
        /// Gaussian pitch-angle width (rad).
        sigma: f64,
    },
    DoublePowerLaw {
        j0: f64,
        gamma: f64,
        delta_gamma: f64,
        #[serde(alias = "sigma1")]
        sigma_1: f64,
        #[serde(alias = "sigma2")]
        sigma_2: f64,
        /// Relative weight of the second component.
        b: f64,
        /// Centre of the second pitch-angle peak (rad).
        alpha_prime: f64,
    },
    PowerLawBeeck {
        j0: f64,
        gamma: f64,
        delta_gamma: f64,
        #[serde(alias = "beeck_a")]
        a: f64,
        #[serde(alias = "beeck_b")]
        b: f64,
    },
    Dlr {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        oulu_count_rate: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        w_parameter: Option<f64>,
    },
    Custom {
        formula: String,
        #[serde(default)]
        variables: BTreeMap<String, f64>,
    },
}

impl SpectralModel {
    /// Tag used in job files.
    pub fn kind(&self) -> &'static str {
        match self {
            SpectralModel::PowerLaw { .. } => "POWER_LAW",
            SpectralModel::DoublePowerLaw { .. } => "DOUBLE_POWER_LAW",
            SpectralModel::PowerLawBeeck { .. } => "POWER_LAW_BEECK",
            SpectralModel::Dlr { .. } => "DLR",
            SpectralModel::Custom { .. } => "CUSTOM",
        }
    }

    /// The DLR driving parameter, if exactly one is given.
    pub fn dlr_parameter(&self) -> Option<DlrParameter> {
        match self {
            SpectralModel::Dlr {
                oulu_count_rate: Some(v),
                w_parameter: None,
            } => Some(DlrParameter::Oulu(*v)),
            SpectralModel::Dlr {
                oulu_count_rate: None,
                w_parameter: Some(v),
            } => Some(DlrParameter::W(*v)),
            _ => None,
        }
    }

    /// Check parameter ranges without building anything.
    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            SpectralModel::PowerLaw {
                j0,
                gamma,
                delta_gamma,
                sigma,
            } => {
                check_power_law(*j0, *gamma, *delta_gamma)?;
                check_positive("sigma", *sigma)
            }
            SpectralModel::DoublePowerLaw {
                j0,
                gamma,
                delta_gamma,
                sigma_1,
                sigma_2,
                b,
                alpha_prime,
            } => {
                check_power_law(*j0, *gamma, *delta_gamma)?;
                check_positive("sigma_1", *sigma_1)?;
                check_positive("sigma_2", *sigma_2)?;
                check_non_negative("b", *b)?;
                check_finite("alpha_prime", *alpha_prime)
            }
            SpectralModel::PowerLawBeeck {
                j0,
                gamma,
                delta_gamma,
                a,
                b,
            } => {
                check_power_law(*j0, *gamma, *delta_gamma)?;
                check_non_negative("a", *a)?;
                check_positive("b", *b)
            }
            SpectralModel::Dlr { .. } => {
                let param = self.dlr_parameter().ok_or_else(|| {
                    EngineError::Configuration(
                        "DLR model needs exactly one of oulu_count_rate or w_parameter".into(),
                    )
                })?;
                check_non_negative("DLR parameter", param.value())
            }
            SpectralModel::Custom { formula, variables } => {
                let expr = compile_custom(formula, variables)?;
                let (lo, hi) = PREVIEW_RIGIDITY_RANGE_GV;
                if let Some(r) = log_space(lo, hi, 50)
                    .into_iter()
                    .find(|&r| !expr.evaluate(r).is_finite())
                {
                    return Err(EngineError::Configuration(format!(
                        "custom spectrum is not finite at R = {:.3} GV",
                        r
                    )));
                }
                Ok(())
            }
        }
    }

    /// Build the particle distribution described by this model.
    pub fn distribution(&self, label: impl Into<String>) -> Result<ParticleDistribution, EngineError> {
        self.validate()?;
        let (spectrum, pitch_angle): (Arc<dyn RigiditySpectrum>, Arc<dyn PitchAngleDistribution>) =
            match self {
                SpectralModel::PowerLaw {
                    j0,
                    gamma,
                    delta_gamma,
                    sigma,
                } => (
                    Arc::new(ModifiedPowerLaw::new(*j0, *gamma, *delta_gamma)),
                    Arc::new(GaussianPitchAngle { sigma: *sigma }),
                ),
                SpectralModel::DoublePowerLaw {
                    j0,
                    gamma,
                    delta_gamma,
                    sigma_1,
                    sigma_2,
                    b,
                    alpha_prime,
                } => (
                    Arc::new(DoublePowerLaw {
                        base: ModifiedPowerLaw::new(*j0, *gamma, *delta_gamma),
                        b: *b,
                    }),
                    Arc::new(DoubleGaussianPitchAngle::new(*sigma_1, *sigma_2, *b, *alpha_prime)),
                ),
                SpectralModel::PowerLawBeeck {
                    j0,
                    gamma,
                    delta_gamma,
                    a,
                    b,
                } => (
                    Arc::new(ModifiedPowerLaw::new(*j0, *gamma, *delta_gamma)),
                    Arc::new(BeeckPitchAngle { a: *a, b: *b }),
                ),
                SpectralModel::Dlr { .. } => {
                    let param = self.dlr_parameter().ok_or_else(|| {
                        EngineError::Configuration("DLR parameter missing".into())
                    })?;
                    (
                        Arc::new(DlrApproximation { parameter: param }),
                        Arc::new(IsotropicPitchAngle),
                    )
                }
                SpectralModel::Custom { formula, variables } => (
                    Arc::new(ExpressionSpectrum {
                        expr: compile_custom(formula, variables)?,
                    }),
                    Arc::new(IsotropicPitchAngle),
                ),
            };
        Ok(ParticleDistribution::new(label, spectrum, pitch_angle))
    }

    /// One-line parameter summary for reports.
    pub fn describe(&self) -> String {
        match self {
            SpectralModel::PowerLaw {
                j0,
                gamma,
                delta_gamma,
                sigma,
            } => format!(
                "POWER_LAW J0={:.4e} gamma={} delta_gamma={} sigma={}",
                j0, gamma, delta_gamma, sigma
            ),
            SpectralModel::DoublePowerLaw {
                j0,
                gamma,
                delta_gamma,
                sigma_1,
                sigma_2,
                b,
                alpha_prime,
            } => format!(
                "DOUBLE_POWER_LAW J0={:.4e} gamma={} delta_gamma={} sigma_1={} sigma_2={} b={} alpha_prime={}",
                j0, gamma, delta_gamma, sigma_1, sigma_2, b, alpha_prime
            ),
            SpectralModel::PowerLawBeeck {
                j0,
                gamma,
                delta_gamma,
                a,
                b,
            } => format!(
                "POWER_LAW_BEECK J0={:.4e} gamma={} delta_gamma={} a={} b={}",
                j0, gamma, delta_gamma, a, b
            ),
            SpectralModel::Dlr { .. } => match self.dlr_parameter() {
                Some(DlrParameter::Oulu(v)) => format!("DLR Oulu count rate={}", v),
                Some(DlrParameter::W(v)) => format!("DLR W={}", v),
                None => "DLR (unset)".to_string(),
            },
            SpectralModel::Custom { formula, variables } => {
                let vars: Vec<String> = variables.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                format!("CUSTOM {} [{}]", formula, vars.join(", "))
            }
        }
    }
}

impl fmt::Display for SpectralModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Spectrum and pitch-angle samples for a preview plot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelPreview {
    pub rigidity_gv: Vec<f64>,
    pub flux: Vec<f64>,
    pub pitch_angle_deg: Vec<f64>,
    pub pitch_angle_weight: Vec<f64>,
}

impl ModelPreview {
    /// Sample `distribution` over the preview ranges. Pitch-angle weights
    /// are evaluated at 1 GV.
    pub fn sample(distribution: &ParticleDistribution) -> Self {
        let (lo, hi) = PREVIEW_RIGIDITY_RANGE_GV;
        let rigidity_gv = log_space(lo, hi, PREVIEW_SAMPLES);
        let angles = lin_space(0.0, PI, PREVIEW_SAMPLES);
        Self {
            flux: distribution.sample_spectrum(&rigidity_gv),
            pitch_angle_weight: distribution.sample_pitch_angles(&angles, 1.0),
            pitch_angle_deg: angles.iter().map(|a| a.to_degrees()).collect(),
            rigidity_gv,
        }
    }
}

fn compile_custom(
    formula: &str,
    variables: &BTreeMap<String, f64>,
) -> Result<CompiledExpression, EngineError> {
    CompiledExpression::compile(formula, variables)
        .map_err(|e| EngineError::Configuration(format!("custom formula: {}", e)))
}

fn check_finite(name: &str, value: f64) -> Result<(), EngineError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EngineError::Configuration(format!("{} must be finite", name)))
    }
}

fn check_positive(name: &str, value: f64) -> Result<(), EngineError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EngineError::Configuration(format!(
            "{} must be positive, got {}",
            name, value
        )))
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<(), EngineError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(EngineError::Configuration(format!(
            "{} must be non-negative, got {}",
            name, value
        )))
    }
}

fn check_power_law(j0: f64, gamma: f64, delta_gamma: f64) -> Result<(), EngineError> {
    check_non_negative("j0", j0)?;
    check_finite("gamma", gamma)?;
    check_non_negative("delta_gamma", delta_gamma)
}

// ── Rigidity spectra ──

/// J0·R^-γ·exp(-Δγ·ln²R); zero for non-positive rigidity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModifiedPowerLaw {
    pub j0: f64,
    pub gamma: f64,
    pub delta_gamma: f64,
}

impl ModifiedPowerLaw {
    pub fn new(j0: f64, gamma: f64, delta_gamma: f64) -> Self {
        Self {
            j0,
            gamma,
            delta_gamma,
        }
    }
}

impl RigiditySpectrum for ModifiedPowerLaw {
    fn flux(&self, r: f64) -> f64 {
        if r <= 0.0 {
            return 0.0;
        }
        let ln_r = r.ln();
        self.j0 * r.powf(-self.gamma) * (-self.delta_gamma * ln_r * ln_r).exp()
    }
}

/// Modified power law plus a steeper component with weight `b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoublePowerLaw {
    pub base: ModifiedPowerLaw,
    pub b: f64,
}

impl RigiditySpectrum for DoublePowerLaw {
    fn flux(&self, r: f64) -> f64 {
        if r <= 0.0 {
            return 0.0;
        }
        self.base.flux(r) * (1.0 + self.b / r)
    }
}

/// Galactic cosmic-ray approximation scaled by a neutron-monitor parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DlrApproximation {
    pub parameter: DlrParameter,
}

impl RigiditySpectrum for DlrApproximation {
    fn flux(&self, r: f64) -> f64 {
        if r <= 0.0 {
            return 0.0;
        }
        let ln_r = r.ln();
        self.parameter.value() / 100.0 * 100.0 * r.powf(-2.7) * (-0.1 * ln_r * ln_r).exp()
    }
}

/// A spectrum given by a compiled user expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionSpectrum {
    pub expr: CompiledExpression,
}

impl RigiditySpectrum for ExpressionSpectrum {
    fn flux(&self, r: f64) -> f64 {
        self.expr.evaluate(r)
    }
}

// ── Pitch-angle distributions ──

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsotropicPitchAngle;

impl PitchAngleDistribution for IsotropicPitchAngle {
    fn weight(&self, _pitch_angle_rad: f64, _rigidity_gv: f64) -> f64 {
        1.0
    }
}

/// exp(-α²/(2σ²)).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianPitchAngle {
    pub sigma: f64,
}

impl PitchAngleDistribution for GaussianPitchAngle {
    fn weight(&self, alpha: f64, _rigidity_gv: f64) -> f64 {
        (-alpha * alpha / (2.0 * self.sigma * self.sigma)).exp()
    }
}

/// Sum of a Gaussian at 0 and a weighted Gaussian at α', divided by the
/// peak value over [0, π].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoubleGaussianPitchAngle {
    sigma_1: f64,
    sigma_2: f64,
    b: f64,
    alpha_prime: f64,
    peak: f64,
}

impl DoubleGaussianPitchAngle {
    pub fn new(sigma_1: f64, sigma_2: f64, b: f64, alpha_prime: f64) -> Self {
        let mut pad = Self {
            sigma_1,
            sigma_2,
            b,
            alpha_prime,
            peak: 1.0,
        };
        let peak = lin_space(0.0, PI, NORMALISATION_SAMPLES)
            .into_iter()
            .map(|a| pad.unnormalised(a))
            .fold(0.0_f64, f64::max);
        if peak > 0.0 {
            pad.peak = peak;
        }
        pad
    }

    fn unnormalised(&self, alpha: f64) -> f64 {
        let d = alpha - self.alpha_prime;
        (-alpha * alpha / (2.0 * self.sigma_1 * self.sigma_1)).exp()
            + self.b * (-d * d / (2.0 * self.sigma_2 * self.sigma_2)).exp()
    }
}

impl PitchAngleDistribution for DoubleGaussianPitchAngle {
    fn weight(&self, alpha: f64, _rigidity_gv: f64) -> f64 {
        self.unnormalised(alpha) / self.peak
    }
}

/// exp(-a·(1 - cos α)^b).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeeckPitchAngle {
    pub a: f64,
    pub b: f64,
}

impl PitchAngleDistribution for BeeckPitchAngle {
    fn weight(&self, alpha: f64, _rigidity_gv: f64) -> f64 {
        (-self.a * (1.0 - alpha.cos()).max(0.0).powf(self.b)).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn power_law() -> SpectralModel {
        SpectralModel::PowerLaw {
            j0: 2.034e4,
            gamma: 5.2,
            delta_gamma: 0.2,
            sigma: 0.4,
        }
    }

    #[test]
    fn test_power_law_matches_closed_form() {
        let d = power_law().distribution("proton").unwrap();
        let r: f64 = 3.0;
        let expected = 2.034e4 * r.powf(-5.2) * (-0.2 * r.ln().powi(2)).exp();
        assert_relative_eq!(d.flux(r), expected, max_relative = 1e-12);
        assert_relative_eq!(d.flux(1.0), 2.034e4, max_relative = 1e-12);
        assert_eq!(d.flux(0.0), 0.0);
        assert_relative_eq!(d.pitch_angle_weight(0.4, 1.0), (-0.5f64).exp(), max_relative = 1e-12);
    }

    #[test]
    fn test_double_power_law_adds_steeper_component() {
        let model = SpectralModel::DoublePowerLaw {
            j0: 1.366e4,
            gamma: 4.5,
            delta_gamma: 0.1,
            sigma_1: 0.3,
            sigma_2: 0.5,
            b: 0.2,
            alpha_prime: 0.785,
        };
        let d = model.distribution("proton").unwrap();
        let r: f64 = 2.0;
        let base = 1.366e4 * r.powf(-4.5) * (-0.1 * r.ln().powi(2)).exp();
        let second = 0.2 * 1.366e4 * r.powf(-5.5) * (-0.1 * r.ln().powi(2)).exp();
        assert_relative_eq!(d.flux(r), base + second, max_relative = 1e-12);
    }

    #[test]
    fn test_double_gaussian_peak_is_one() {
        let pad = DoubleGaussianPitchAngle::new(0.3, 0.5, 0.2, 0.785);
        let max = lin_space(0.0, PI, NORMALISATION_SAMPLES)
            .into_iter()
            .map(|a| pad.weight(a, 1.0))
            .fold(0.0_f64, f64::max);
        assert_relative_eq!(max, 1.0, max_relative = 1e-12);
        assert!(pad.weight(PI, 1.0) < 0.1);
    }

    #[test]
    fn test_beeck_pad_shape() {
        let pad = BeeckPitchAngle { a: 1.2, b: 2.5 };
        assert_relative_eq!(pad.weight(0.0, 1.0), 1.0);
        assert_relative_eq!(pad.weight(PI, 1.0), (-1.2 * 2f64.powf(2.5)).exp(), max_relative = 1e-12);
    }

    #[test]
    fn test_dlr_needs_exactly_one_parameter() {
        let both = SpectralModel::Dlr {
            oulu_count_rate: Some(100.0),
            w_parameter: Some(50.0),
        };
        assert!(both.validate().is_err());
        let none = SpectralModel::Dlr {
            oulu_count_rate: None,
            w_parameter: None,
        };
        assert!(none.validate().is_err());

        let oulu = SpectralModel::Dlr {
            oulu_count_rate: Some(100.0),
            w_parameter: None,
        };
        assert_eq!(oulu.dlr_parameter(), Some(DlrParameter::Oulu(100.0)));
        let d = oulu.distribution("gcr").unwrap();
        assert_relative_eq!(d.flux(1.0), 100.0, max_relative = 1e-12);
        assert_eq!(d.pitch_angle_weight(2.0, 5.0), 1.0);
    }

    #[test]
    fn test_custom_model_uses_sandboxed_formula() {
        let variables: BTreeMap<String, f64> = [
            ("J0".to_string(), 1000.0),
            ("R0".to_string(), 1.0),
            ("gamma".to_string(), 5.0),
            ("deltaGamma".to_string(), 0.2),
        ]
        .into_iter()
        .collect();
        let model = SpectralModel::Custom {
            formula: DEFAULT_CUSTOM_FORMULA.to_string(),
            variables,
        };
        let d = model.distribution("custom").unwrap();
        assert_relative_eq!(d.flux(1.0), 1000.0, max_relative = 1e-12);

        let bad = SpectralModel::Custom {
            formula: "system(R)".into(),
            variables: BTreeMap::new(),
        };
        assert!(matches!(bad.validate(), Err(EngineError::Configuration(_))));

        let singular = SpectralModel::Custom {
            formula: "1 / (R - R)".into(),
            variables: BTreeMap::new(),
        };
        assert!(singular.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let model = SpectralModel::PowerLaw {
            j0: 1.0,
            gamma: 5.0,
            delta_gamma: 0.1,
            sigma: 0.0,
        };
        assert!(model.validate().is_err());
        let model = SpectralModel::PowerLaw {
            j0: -1.0,
            gamma: 5.0,
            delta_gamma: 0.1,
            sigma: 0.3,
        };
        assert!(model.distribution("x").is_err());
    }

    #[test]
    fn test_toml_tag_and_aliases() {
        let model: SpectralModel = toml::from_str(
            r#"
            model = "POWER_LAW_BEECK"
            j0 = 8.532e3
            gamma = 5.0
            delta_gamma = 0.15
            beeck_a = 1.2
            beeck_b = 2.5
            "#,
        )
        .unwrap();
        assert_eq!(model.kind(), "POWER_LAW_BEECK");
        assert!(matches!(model, SpectralModel::PowerLawBeeck { a, .. } if a == 1.2));
    }

    #[test]
    fn test_preview_covers_documented_ranges() {
        let d = power_law().distribution("p").unwrap();
        let preview = ModelPreview::sample(&d);
        assert_eq!(preview.rigidity_gv.len(), PREVIEW_SAMPLES);
        assert_relative_eq!(preview.rigidity_gv[0], 0.1, max_relative = 1e-12);
        assert_relative_eq!(*preview.pitch_angle_deg.last().unwrap(), 180.0, max_relative = 1e-12);
        assert_relative_eq!(preview.pitch_angle_weight[0], 1.0);
    }
}

//! Incoming particle distributions.
//!
//! A [`ParticleDistribution`] pairs a rigidity spectrum with a pitch-angle
//! distribution. Both halves are traits with a single numeric evaluation
//! method, so the dose engine never needs to know which spectral model
//! produced them. The fixed set of supported models is the
//! [`SpectralModel`](models::SpectralModel) enum.

pub mod expr;
pub mod models;

use std::fmt;
use std::sync::Arc;

pub use expr::{parse_variable_lines, CompiledExpression, ExprError};
pub use models::{DlrParameter, ModelPreview, SpectralModel};

/// Differential particle flux as a function of rigidity.
pub trait RigiditySpectrum: Send + Sync {
    /// Flux at `rigidity_gv` (particles cm⁻² s⁻¹ sr⁻¹ GV⁻¹).
    fn flux(&self, rigidity_gv: f64) -> f64;
}

/// Relative intensity as a function of pitch angle.
pub trait PitchAngleDistribution: Send + Sync {
    /// Weight at `pitch_angle_rad` for particles of `rigidity_gv`.
    fn weight(&self, pitch_angle_rad: f64, rigidity_gv: f64) -> f64;
}

/// One incoming particle population.
#[derive(Clone)]
pub struct ParticleDistribution {
    label: String,
    spectrum: Arc<dyn RigiditySpectrum>,
    pitch_angle: Arc<dyn PitchAngleDistribution>,
}

impl ParticleDistribution {
    pub fn new(
        label: impl Into<String>,
        spectrum: Arc<dyn RigiditySpectrum>,
        pitch_angle: Arc<dyn PitchAngleDistribution>,
    ) -> Self {
        Self {
            label: label.into(),
            spectrum,
            pitch_angle,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn flux(&self, rigidity_gv: f64) -> f64 {
        self.spectrum.flux(rigidity_gv)
    }

    pub fn pitch_angle_weight(&self, pitch_angle_rad: f64, rigidity_gv: f64) -> f64 {
        self.pitch_angle.weight(pitch_angle_rad, rigidity_gv)
    }

    /// Flux at each rigidity.
    pub fn sample_spectrum(&self, rigidities_gv: &[f64]) -> Vec<f64> {
        rigidities_gv.iter().map(|&r| self.flux(r)).collect()
    }

    /// Pitch-angle weight at each angle, evaluated at `rigidity_gv`.
    pub fn sample_pitch_angles(&self, angles_rad: &[f64], rigidity_gv: f64) -> Vec<f64> {
        angles_rad
            .iter()
            .map(|&a| self.pitch_angle_weight(a, rigidity_gv))
            .collect()
    }
}

impl fmt::Debug for ParticleDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticleDistribution")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// `n` logarithmically spaced values from `start` to `end` inclusive.
pub fn log_space(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let (ls, le) = (start.ln(), end.ln());
            (0..n)
                .map(|i| (ls + (le - ls) * i as f64 / (n - 1) as f64).exp())
                .collect()
        }
    }
}

/// `n` evenly spaced values from `start` to `end` inclusive.
pub fn lin_space(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => (0..n)
            .map(|i| start + (end - start) * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

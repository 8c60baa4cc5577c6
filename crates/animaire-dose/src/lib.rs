//! # AniMAIRE Dose
//!
//! Reference per-distribution dose engine. Spectra and pitch-angle
//! distributions are folded with tabulated yield functions over the
//! rigidity range above each direction's cutoff.
//!
//! ## Modules
//!
//! - [`spline`]: natural cubic spline interpolation.
//! - [`yields`]: yield tables per quantity, built-in set and CSV loader.
//! - [`engine`]: [`YieldFunctionDoseEngine`], the [`animaire_core::engine::DoseEngine`]
//!   implementation.

pub mod engine;
pub mod error;
pub mod spline;
pub mod yields;

pub use engine::{
    IntegrationSettings, YieldFunctionDoseEngine, MEAN_CUTOFF_COLUMN, MEAN_PITCH_ANGLE_COLUMN,
    NM_COUNT_RATE_COLUMN,
};
pub use error::DoseError;
pub use yields::{YieldQuantity, YieldSet, YieldTable};

//! # AniMAIRE Compute
//!
//! Execution backend abstraction for the AniMAIRE pipeline. The per-species
//! dose computations of a run are independent and share only read-only
//! inputs, so the run coordinator hands them to a [`ComputeBackend`]
//! (backend::ComputeBackend) instead of looping itself.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Ordering |
//! |---------|-------------|----------|
//! | Sequential | always | index order, caller thread |
//! | Rayon | `parallel` (default) | any order, results slotted by index |

pub mod backend;
pub mod cpu;

pub use backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo};

pub use cpu::SequentialBackend;

#[cfg(feature = "parallel")]
pub use cpu::RayonBackend;

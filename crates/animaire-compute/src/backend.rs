//! Compute backend trait and device abstraction.
//!
//! The [`ComputeBackend`] trait abstracts over how a batch of independent
//! jobs is executed, so that the run coordinator in `animaire-core` stays
//! agnostic of threading.

use thiserror::Error;

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub threads: usize,
}

/// The type of compute backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Sequential,
    Parallel,
}

/// Abstraction over execution of independent, index-addressed jobs.
///
/// Implementations must call `job(i)` exactly once for every `i` in
/// `0..count` before returning. They are free to choose the execution order;
/// callers that need deterministic results store each output in a slot keyed
/// by its index and reduce in index order afterwards.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the backend.
    fn device_info(&self) -> DeviceInfo;

    /// Execute `job` once for every index in `0..count`.
    fn run_indexed(
        &self,
        count: usize,
        job: &(dyn Fn(usize) + Send + Sync),
    ) -> Result<(), ComputeError>;
}

//! CPU compute backends: strictly sequential, and Rayon work-stealing.

use crate::backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo};

/// Runs every job on the calling thread, in index order.
///
/// Job `i + 1` never starts before job `i` has returned.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialBackend;

impl SequentialBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ComputeBackend for SequentialBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "CPU (sequential)".into(),
            backend_type: BackendType::Sequential,
            threads: 1,
        }
    }

    fn run_indexed(
        &self,
        count: usize,
        job: &(dyn Fn(usize) + Send + Sync),
    ) -> Result<(), ComputeError> {
        for i in 0..count {
            job(i);
        }
        Ok(())
    }
}

/// Backend that spreads jobs across threads via Rayon.
#[cfg(feature = "parallel")]
pub struct RayonBackend {
    pool: rayon::ThreadPool,
    num_threads: usize,
}

#[cfg(feature = "parallel")]
impl RayonBackend {
    /// Create a backend using all available threads.
    pub fn new() -> Result<Self, ComputeError> {
        Self::with_threads(rayon::current_num_threads())
    }

    /// Create a backend with a dedicated pool of `num_threads` threads.
    pub fn with_threads(num_threads: usize) -> Result<Self, ComputeError> {
        let num_threads = num_threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("animaire-species-{i}"))
            .build()
            .map_err(|e| ComputeError::ThreadPool(e.to_string()))?;
        Ok(Self { pool, num_threads })
    }
}

#[cfg(feature = "parallel")]
impl ComputeBackend for RayonBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            backend_type: BackendType::Parallel,
            threads: self.num_threads,
        }
    }

    fn run_indexed(
        &self,
        count: usize,
        job: &(dyn Fn(usize) + Send + Sync),
    ) -> Result<(), ComputeError> {
        use rayon::prelude::*;

        log::debug!("dispatching {} jobs on {} threads", count, self.num_threads);
        self.pool.install(|| (0..count).into_par_iter().for_each(|i| job(i)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_sequential_runs_in_index_order() {
        let seen = Mutex::new(Vec::new());
        SequentialBackend::new()
            .run_indexed(5, &|i| seen.lock().unwrap().push(i))
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_zero_jobs_is_a_no_op() {
        let calls = Mutex::new(0usize);
        SequentialBackend::new()
            .run_indexed(0, &|_| *calls.lock().unwrap() += 1)
            .unwrap();
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_rayon_visits_every_index_once() {
        let backend = RayonBackend::with_threads(3).unwrap();
        assert_eq!(backend.device_info().threads, 3);

        let hits: Vec<Mutex<usize>> = (0..64).map(|_| Mutex::new(0)).collect();
        backend
            .run_indexed(hits.len(), &|i| *hits[i].lock().unwrap() += 1)
            .unwrap();
        assert!(hits.iter().all(|h| *h.lock().unwrap() == 1));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_rayon_zero_threads_clamped_to_one() {
        let backend = RayonBackend::with_threads(0).unwrap();
        assert_eq!(backend.device_info().threads, 1);
        assert_eq!(backend.device_info().backend_type, BackendType::Parallel);
    }
}

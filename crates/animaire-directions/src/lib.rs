//! # AniMAIRE Directions
//!
//! Reference implementations of the direction seams of
//! [`animaire_core::engine`]:
//!
//! - [`StormerResolver`]: cutoff rigidities and arrival directions for a
//!   tilted centred dipole.
//! - [`TabulatedResolver`]: lookups in pre-computed direction tables.
//! - [`CachedResolver`]: memoisation in memory and on disk around any resolver.
//! - [`PitchAngleTableBuilder`]: pitch angles relative to the reference
//!   direction of a run.

pub mod builder;
pub mod cache;
pub mod error;
pub mod stormer;
pub mod tabulated;

pub use builder::PitchAngleTableBuilder;
pub use cache::{CacheConfig, CacheStats, CachedResolver, EvictionPolicy};
pub use error::DirectionError;
pub use stormer::StormerResolver;
pub use tabulated::TabulatedResolver;

//! Errors raised by direction resolvers and the resolver cache.

use thiserror::Error;

/// Errors from resolving asymptotic directions.
#[derive(Debug, Error)]
pub enum DirectionError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Format { line: usize, message: String },

    #[error(
        "No tabulated direction for ({latitude}, {longitude}) at zenith {zenith_deg}°, azimuth {azimuth_deg}°"
    )]
    MissingRow {
        latitude: f64,
        longitude: f64,
        zenith_deg: f64,
        azimuth_deg: f64,
    },

    #[error("Invalid resolver option '{key}': {message}")]
    InvalidOption { key: String, message: String },

    #[error("Cache entry error: {0}")]
    Cache(#[from] serde_json::Error),
}

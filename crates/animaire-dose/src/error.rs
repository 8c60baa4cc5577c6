use thiserror::Error;

/// Errors from yield tables and the dose engine.
#[derive(Debug, Error)]
pub enum DoseError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Format { line: usize, message: String },

    #[error("Invalid yield table: {0}")]
    InvalidTable(String),

    #[error("Yield set has no table for '{0}'")]
    MissingQuantity(String),

    #[error("No asymptotic directions for grid point ({latitude}, {longitude})")]
    MissingDirections { latitude: f64, longitude: f64 },

    #[error("Distribution '{label}' gave a non-finite {column} dose")]
    NonFinite { label: String, column: String },

    #[error("Invalid dose engine settings: {0}")]
    InvalidSettings(String),
}

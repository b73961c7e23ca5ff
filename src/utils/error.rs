//! Error Handling Module
//!
//! Defines custom error types for the cifar_ssl library.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for cifar_ssl operations
#[derive(Error, Debug)]
pub enum SslError {
    /// Configuration error (bad dataset name, bad growth sequence, ...).
    /// Raised before any data is loaded or any training starts.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error loading or parsing a dataset file
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error downloading or extracting a dataset archive
    #[error("Download error: {0}")]
    Download(String),

    /// Metric normalization with a zero divisor
    #[error("Invalid divisor: metric accumulator cannot be divided by zero")]
    InvalidDivisor,

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

/// Convenience Result type for cifar_ssl operations
pub type Result<T> = std::result::Result<T, SslError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SslError::Dataset("truncated batch file".to_string());
        assert_eq!(format!("{}", err), "Dataset error: truncated batch file");
    }

    #[test]
    fn test_invalid_divisor_display() {
        let err = SslError::InvalidDivisor;
        assert!(format!("{}", err).contains("zero"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: SslError = io.into();
        assert!(matches!(err, SslError::Io(_)));
    }
}

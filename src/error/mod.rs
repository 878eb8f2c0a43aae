//! Error types for the rendering pipeline.

use thiserror::Error;

/// Result type alias for the library.
pub type Result<T> = std::result::Result<T, RenderError>;

/// Main error type for the rendering pipeline.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Declared dimensions or bit depth disagree with the sample data.
    #[error("Invalid buffer: {0}")]
    InvalidBuffer(String),

    /// Window width is not a positive finite number.
    #[error("Invalid window width: {0}")]
    InvalidWindow(f64),

    /// Raster encoder preconditions violated.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The frame could not be decoded by the DICOM collaborator.
    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RenderError::InvalidWindow(-5.0);
        assert_eq!(err.to_string(), "Invalid window width: -5");

        let err = RenderError::InvalidBuffer("expected 4 bytes, got 3".into());
        assert!(err.to_string().contains("expected 4 bytes"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: RenderError = io.into();
        assert!(matches!(err, RenderError::Io(_)));
    }
}

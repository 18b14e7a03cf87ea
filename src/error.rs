//! Error types for background removal operations

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Error taxonomy shared by every stage of the pipeline
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// The image source descriptor is malformed (bad URL, empty string, bad base64)
    #[error("Invalid image reference: {0}")]
    InvalidReference(String),

    /// A local image path does not exist
    #[error("Image source not found: {0}")]
    SourceNotFound(String),

    /// A remote image could not be fetched (transport error, timeout, non-success status)
    #[error("Image source unavailable: {0}")]
    SourceUnavailable(String),

    /// The bytes do not decode as a supported image
    #[error("Invalid image data: {0}")]
    InvalidImageData(String),

    /// The segmentation model failed for this request
    #[error("Inference error: {0}")]
    InferenceFailure(String),

    /// Any other unexpected fault while orchestrating a request
    #[error("Processing error: {0}")]
    ProcessingFailure(String),

    /// Artifact lookup miss
    #[error("Artifact not found: {0}")]
    NotFound(String),

    /// Upload rejected before processing because it is not an image
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// Input/output errors (permission denied, disk full, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),
}

impl BgRemovalError {
    /// Create a new invalid reference error
    pub fn invalid_reference<S: Into<String>>(msg: S) -> Self {
        Self::InvalidReference(msg.into())
    }

    /// Create a new source-not-found error
    pub fn source_not_found<S: Into<String>>(msg: S) -> Self {
        Self::SourceNotFound(msg.into())
    }

    /// Create a new invalid image data error
    pub fn invalid_image_data<S: Into<String>>(msg: S) -> Self {
        Self::InvalidImageData(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::InferenceFailure(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::ProcessingFailure(msg.into())
    }

    /// Create a new artifact-not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create remote fetch error with URL context
    pub fn source_unavailable(url: &str, error: impl std::fmt::Display) -> Self {
        Self::SourceUnavailable(format!("Failed to fetch '{}': {}", url, error))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Whether the failure was caused by the caller's input rather than the service
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidReference(_)
                | Self::SourceNotFound(_)
                | Self::InvalidImageData(_)
                | Self::NotFound(_)
                | Self::UnsupportedContentType(_)
        )
    }
}

//! Error types for garment label detection

use thiserror::Error;

/// Result type alias for label detection operations
pub type Result<T> = std::result::Result<T, SegLabelError>;

/// Error types raised while turning an upload into a detected label
#[derive(Error, Debug)]
pub enum SegLabelError {
    /// The request did not carry a usable `file` upload
    #[error("{0}")]
    MissingInput(String),

    /// Upload present but its bytes are not a decodable image
    #[error("Could not process image: {0}")]
    Decode(String),

    /// Malformed request body (multipart framing, field read failures)
    #[error("Invalid multipart body: {0}")]
    BadRequest(String),

    /// Segmentation model invocation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Model loading or metadata errors
    #[error("Model error: {0}")]
    Model(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors (model file not found, bind failures, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SegLabelError {
    /// Create a new missing input error
    pub fn missing_input<S: Into<String>>(msg: S) -> Self {
        Self::MissingInput(msg.into())
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new bad request error
    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the caller can fix this by changing the request
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingInput(_) | Self::Decode(_) | Self::BadRequest(_)
        )
    }

    /// Fold any failure raised behind the model boundary into `Inference`
    ///
    /// The segmentation adapter only reports one failure kind to its callers;
    /// errors that already are `Inference` pass through untouched.
    #[must_use]
    pub fn into_inference(self) -> Self {
        match self {
            Self::Inference(_) => self,
            other => Self::Inference(other.to_string()),
        }
    }

    /// Create model error with troubleshooting context
    pub fn model_error_with_context<P: AsRef<std::path::Path>>(
        operation: &str,
        model_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let path_display = model_path.as_ref().display();
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::Model(format!(
            "Failed to {} model '{}': {}.{}",
            operation, path_display, error, suggestion_text
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
}

//! Error types for the pump engine.

use thiserror::Error;

/// Main error type for pump operations.
#[derive(Error, Debug)]
pub enum PumpError {
    /// Configuration error (invalid YAML, bad option value, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// One or more required options are missing or invalid.
    /// Detected before any I/O; the run never starts.
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A source fetch failed. Tolerated only under `ignore_errors`.
    #[error("Fetch failed at offset {offset}: {message}")]
    Fetch { offset: u64, message: String },

    /// A sink write failed. Tolerated only under `ignore_errors`;
    /// a tolerated write contributes zero to the write total.
    #[error("Write failed at offset {offset}: {message}")]
    Write { offset: u64, message: String },

    /// A document transform failed. Always fatal: it signals a defect
    /// in caller-supplied logic, not a transient condition.
    #[error("Transform error: {0}")]
    Transform(String),

    /// Checkpoint persistence failed. Never fatal to the run; the pump
    /// logs and absorbs it at the call site.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The run was cancelled via its cancellation token.
    #[error("Run cancelled")]
    Cancelled,
}

impl PumpError {
    /// Create a Fetch error at the given offset.
    pub fn fetch(offset: u64, message: impl Into<String>) -> Self {
        PumpError::Fetch {
            offset,
            message: message.into(),
        }
    }

    /// Create a Write error at the given offset.
    pub fn write(offset: u64, message: impl Into<String>) -> Self {
        PumpError::Write {
            offset,
            message: message.into(),
        }
    }

    /// Create a Transform error.
    pub fn transform(message: impl Into<String>) -> Self {
        PumpError::Transform(message.into())
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for pump operations.
pub type Result<T> = std::result::Result<T, PumpError>;

//! Evidence pipeline error types with reason codes.

use thiserror::Error;

/// Reason codes for compliance errors, providing machine-readable context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    /// Caller supplied an invalid request (e.g. an empty export selection).
    ValidationFailed = 100,
    /// Requested evidence does not exist.
    NotFound = 110,
    /// Resource enumeration or attribute fetch failed after retries.
    FetchFailed = 200,
    /// Blob or index write failed.
    StorageFailed = 300,
    /// Stored bytes do not match the recorded content hash.
    IntegrityFailed = 310,
    /// Link signature or expiry check failed.
    SignatureInvalid = 400,
    /// Serialization or deserialization failed.
    SerializationFailed = 500,
    /// File I/O failed.
    IoFailed = 510,
    /// Configuration or rule table is missing or malformed.
    ConfigInvalid = 600,
}

/// Errors that can occur while capturing, storing or exporting evidence.
#[derive(Error, Debug)]
pub enum ComplianceError {
    /// The request was rejected before touching storage.
    #[error("Validation error (reason {reason}): {message}")]
    Validation { reason: u32, message: String },

    /// No stored evidence matched the request.
    #[error("Not found (reason {reason}): {message}")]
    NotFound { reason: u32, message: String },

    /// Transient inventory failure that exhausted its retries.
    #[error("Fetch error (reason {reason}): {message}")]
    Fetch { reason: u32, message: String },

    /// Blob or index write failure.
    #[error("Storage error (reason {reason}): {message}")]
    Storage { reason: u32, message: String },

    /// Content hash mismatch on stored evidence.
    #[error("Integrity error (reason {reason}): {message}")]
    Integrity { reason: u32, message: String },

    /// Retrieval link signature failure.
    #[error("Signature error (reason {reason}): {message}")]
    Signature { reason: u32, message: String },

    /// Serialization or deserialization failed.
    #[error("Serialization error (reason {reason}): {message}")]
    Serialization { reason: u32, message: String },

    /// File I/O error.
    #[error("I/O error (reason {reason}): {message}")]
    Io { reason: u32, message: String },

    /// Configuration error.
    #[error("Configuration error (reason {reason}): {message}")]
    Config { reason: u32, message: String },
}

impl ComplianceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            reason: ReasonCode::ValidationFailed as u32,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            reason: ReasonCode::NotFound as u32,
            message: message.into(),
        }
    }

    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            reason: ReasonCode::FetchFailed as u32,
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            reason: ReasonCode::StorageFailed as u32,
            message: message.into(),
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            reason: ReasonCode::IntegrityFailed as u32,
            message: message.into(),
        }
    }

    pub fn signature(message: impl Into<String>) -> Self {
        Self::Signature {
            reason: ReasonCode::SignatureInvalid as u32,
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            reason: ReasonCode::SerializationFailed as u32,
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            reason: ReasonCode::IoFailed as u32,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            reason: ReasonCode::ConfigInvalid as u32,
            message: message.into(),
        }
    }

    /// The numeric reason code carried by this error.
    pub fn reason(&self) -> u32 {
        match self {
            Self::Validation { reason, .. }
            | Self::NotFound { reason, .. }
            | Self::Fetch { reason, .. }
            | Self::Storage { reason, .. }
            | Self::Integrity { reason, .. }
            | Self::Signature { reason, .. }
            | Self::Serialization { reason, .. }
            | Self::Io { reason, .. }
            | Self::Config { reason, .. } => *reason,
        }
    }

    /// The message without the kind and reason prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message, .. }
            | Self::NotFound { message, .. }
            | Self::Fetch { message, .. }
            | Self::Storage { message, .. }
            | Self::Integrity { message, .. }
            | Self::Signature { message, .. }
            | Self::Serialization { message, .. }
            | Self::Io { message, .. }
            | Self::Config { message, .. } => message,
        }
    }
}

impl From<std::io::Error> for ComplianceError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_json::Error> for ComplianceError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Result type for compliance operations.
pub type ComplianceResult<T> = std::result::Result<T, ComplianceError>;

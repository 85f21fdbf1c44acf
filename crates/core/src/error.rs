//! Unified error types for the analytics engine.
//!
//! Error codes:
//! - VALID_001-004: Validation errors
//! - DB_001-002: Storage errors
//! - INGEST_001: Ingestion buffer errors

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Validation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorCode {
    /// VALID_001: Malformed event or missing required field
    InvalidFormat,
    /// VALID_002: Batch exceeds MAX_BATCH_EVENTS
    BatchTooLarge,
    /// VALID_003: Batch contains no events
    EmptyBatch,
    /// VALID_004: Unparsable or inverted date range
    InvalidDateRange,
}

impl ValidationErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "VALID_001",
            Self::BatchTooLarge => "VALID_002",
            Self::EmptyBatch => "VALID_003",
            Self::InvalidDateRange => "VALID_004",
        }
    }
}

/// Storage error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorCode {
    /// DB_001: Failed to store events
    StoreFailed,
    /// DB_002: Failed to read events
    QueryFailed,
}

impl DbErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StoreFailed => "DB_001",
            Self::QueryFailed => "DB_002",
        }
    }
}

/// Ingestion error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestErrorCode {
    /// INGEST_001: Buffer is at its hard ceiling
    BufferFull,
}

impl IngestErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BufferFull => "INGEST_001",
        }
    }
}

/// Unified error type for the analytics engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Validation error with code.
    #[error("[{code}] {message}")]
    ValidationWithCode {
        code: &'static str,
        message: String,
    },

    /// Storage error with code.
    #[error("[{code}] {message}")]
    Database {
        code: &'static str,
        message: String,
    },

    /// Ingestion error with code.
    #[error("[{code}] {message}")]
    Ingest {
        code: &'static str,
        message: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error with code.
    pub fn validation_code(code: ValidationErrorCode, msg: impl Into<String>) -> Self {
        Self::ValidationWithCode {
            code: code.code(),
            message: msg.into(),
        }
    }

    /// Create a storage error.
    pub fn database(code: DbErrorCode, msg: impl Into<String>) -> Self {
        Self::Database {
            code: code.code(),
            message: msg.into(),
        }
    }

    /// Create an ingestion error.
    pub fn ingest(code: IngestErrorCode, msg: impl Into<String>) -> Self {
        Self::Ingest {
            code: code.code(),
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::ValidationWithCode { code, .. } => Some(code),
            Self::Database { code, .. } => Some(code),
            Self::Ingest { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether the caller sent something we will never accept.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ValidationWithCode { .. } | Self::Serialization(_)
        )
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::validation_code(ValidationErrorCode::InvalidFormat, errors.to_string())
    }
}

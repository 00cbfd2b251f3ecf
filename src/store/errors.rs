//! Store error types
//!
//! Error codes:
//! - CAPSTORE_IO_ERROR (ERROR severity)
//! - CAPSTORE_WRITE_FAILED (ERROR severity)
//! - CAPSTORE_READ_FAILED (ERROR severity)
//! - CAPSTORE_CAPACITY_EXCEEDED (ERROR severity)
//! - CAPSTORE_CONFIG_MISMATCH (ERROR severity)
//! - CAPSTORE_CORRUPTION (FATAL severity)
//!
//! Every failure path in the store maps to exactly one of these codes;
//! there is no uncategorized escape hatch.

use std::fmt;
use std::io;

/// Severity levels for store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, store remains usable
    Error,
    /// Store contents cannot be trusted
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Store-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// Generic file I/O failure (open, seek, lock)
    IoError,
    /// Record write or fsync failed
    WriteFailed,
    /// Record read failed
    ReadFailed,
    /// Record cannot fit within the file size cap
    CapacityExceeded,
    /// Backing file was created with incompatible parameters
    ConfigMismatch,
    /// Framing or checksum failure
    Corruption,
}

impl StoreErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StoreErrorCode::IoError => "CAPSTORE_IO_ERROR",
            StoreErrorCode::WriteFailed => "CAPSTORE_WRITE_FAILED",
            StoreErrorCode::ReadFailed => "CAPSTORE_READ_FAILED",
            StoreErrorCode::CapacityExceeded => "CAPSTORE_CAPACITY_EXCEEDED",
            StoreErrorCode::ConfigMismatch => "CAPSTORE_CONFIG_MISMATCH",
            StoreErrorCode::Corruption => "CAPSTORE_CORRUPTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            StoreErrorCode::IoError => Severity::Error,
            StoreErrorCode::WriteFailed => Severity::Error,
            StoreErrorCode::ReadFailed => Severity::Error,
            StoreErrorCode::CapacityExceeded => Severity::Error,
            StoreErrorCode::ConfigMismatch => Severity::Error,
            StoreErrorCode::Corruption => Severity::Fatal,
        }
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Store error type carrying code, message and context
#[derive(Debug)]
pub struct StoreError {
    /// Error code
    code: StoreErrorCode,
    /// Human-readable message
    message: String,
    /// Optional details about the error context
    details: Option<String>,
    /// Underlying IO error if applicable
    source: Option<io::Error>,
}

impl StoreError {
    /// Create a generic I/O error
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StoreErrorCode::IoError,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a write failure error
    pub fn write_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StoreErrorCode::WriteFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a read failure error
    pub fn read_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StoreErrorCode::ReadFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a capacity error for a record that cannot fit under the cap
    pub fn capacity_exceeded(needed: u64, max_size: u64) -> Self {
        Self {
            code: StoreErrorCode::CapacityExceeded,
            message: "no free slot or appendable space large enough".to_string(),
            details: Some(format!("needed_bytes: {}, max_size: {}", needed, max_size)),
            source: None,
        }
    }

    /// Create a config mismatch error (e.g. reopening with a different cap)
    pub fn config_mismatch(message: impl Into<String>) -> Self {
        Self {
            code: StoreErrorCode::ConfigMismatch,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a corruption error (FATAL)
    pub fn corruption(message: impl Into<String>) -> Self {
        Self {
            code: StoreErrorCode::Corruption,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a corruption error with byte offset context
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: StoreErrorCode::Corruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    /// Create an error for a poisoned store mutex
    ///
    /// A peer thread panicked while holding the lock. The on-disk state is
    /// still framed consistently, so this is ERROR severity, not FATAL.
    pub fn lock_poisoned() -> Self {
        Self {
            code: StoreErrorCode::IoError,
            message: "store mutex poisoned by a panicked thread".to_string(),
            details: None,
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> StoreErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this is a capacity error
    pub fn is_capacity_exceeded(&self) -> bool {
        self.code == StoreErrorCode::CapacityExceeded
    }

    /// Returns whether this error means the file contents cannot be trusted
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

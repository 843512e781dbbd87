//! Error handling for the EEG pipeline
//!
//! Every stage returns [`EegResult`]. The variants map one-to-one onto the
//! failure kinds a caller sees in a run summary.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type EegResult<T> = Result<T, EegError>;

/// Error type for all pipeline operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EegError {
    /// The source could not be read or interpreted as a recording
    #[error("Invalid recording format ({source_name}): {reason}")]
    InvalidFormat {
        /// Source identifier (usually a path)
        source_name: String,
        /// Description of the format issue
        reason: String,
    },

    /// The recording parsed but is structurally invalid
    #[error("Recording validation failed: {reason}")]
    Validation {
        /// Description of the failed check
        reason: String,
    },

    /// Filter or processing parameter out of range
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// A feature family or the whole bundle failed validation
    #[error("Feature validation failed for '{family}': {reason}")]
    FeatureValidation {
        /// Family name, or "bundle" for cross-family checks
        family: String,
        /// Description of the failed check
        reason: String,
    },

    /// An export step failed or report rendering exhausted its retries
    #[error("Export failed during {step}: {reason}")]
    Export {
        /// Export step that failed
        step: &'static str,
        /// Description of the failure
        reason: String,
    },

    /// The orchestrator was reused for a second run
    #[error("Processor reused while run is {status}")]
    Reentrancy {
        /// Status of the run that blocked reuse
        status: String,
    },

    /// A stage was invoked out of order or with a foreign handle
    #[error("Invalid pipeline state: {reason}")]
    InvalidState {
        /// Description of the misuse
        reason: String,
    },

    /// Configuration could not be parsed or is inconsistent
    #[error("Configuration error: {reason}")]
    Configuration {
        /// Description of the problem
        reason: String,
    },

    /// Decomposition or other numeric routine could not proceed
    #[error("Processing error: {reason}")]
    Processing {
        /// Description of the numeric failure
        reason: String,
    },

    /// Underlying I/O failure outside the loader/exporter taxonomy
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable kind tag for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidFormat,
    Validation,
    InvalidParameter,
    FeatureValidation,
    Export,
    Reentrancy,
    InvalidState,
    Configuration,
    Processing,
    Io,
}

impl EegError {
    /// Kind tag of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            EegError::InvalidFormat { .. } => ErrorKind::InvalidFormat,
            EegError::Validation { .. } => ErrorKind::Validation,
            EegError::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            EegError::FeatureValidation { .. } => ErrorKind::FeatureValidation,
            EegError::Export { .. } => ErrorKind::Export,
            EegError::Reentrancy { .. } => ErrorKind::Reentrancy,
            EegError::InvalidState { .. } => ErrorKind::InvalidState,
            EegError::Configuration { .. } => ErrorKind::Configuration,
            EegError::Processing { .. } => ErrorKind::Processing,
            EegError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn invalid_format(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        EegError::InvalidFormat {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        EegError::Validation { reason: reason.into() }
    }

    pub fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        EegError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub fn feature_validation(family: impl Into<String>, reason: impl Into<String>) -> Self {
        EegError::FeatureValidation {
            family: family.into(),
            reason: reason.into(),
        }
    }

    pub fn export(step: &'static str, reason: impl Into<String>) -> Self {
        EegError::Export {
            step,
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        EegError::Configuration { reason: reason.into() }
    }

    pub fn processing(reason: impl Into<String>) -> Self {
        EegError::Processing { reason: reason.into() }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidFormat => "invalid_format",
            ErrorKind::Validation => "validation",
            ErrorKind::InvalidParameter => "invalid_parameter",
            ErrorKind::FeatureValidation => "feature_validation",
            ErrorKind::Export => "export",
            ErrorKind::Reentrancy => "reentrancy",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Processing => "processing",
            ErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

/// Convenience macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)+) => {
        $crate::error::EegError::Validation {
            reason: format!($($arg)+),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = EegError::invalid_format("missing.edf", "source not found");
        let display = format!("{}", error);
        assert!(display.contains("missing.edf"));
        assert!(display.contains("source not found"));
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(EegError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(
            EegError::feature_validation("connectivity", "NaN").kind(),
            ErrorKind::FeatureValidation
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(EegError::from(io).kind(), ErrorKind::Io);
    }

    #[test]
    fn test_validation_macro() {
        let error = validation_error!("sampling rate {} must be positive", -1.0);
        assert!(matches!(error, EegError::Validation { .. }));
        assert!(error.to_string().contains("-1"));
    }
}

//! Structured error types for capexec
//!
//! Every failure the engine can observe is one of these values. The executor
//! never lets them escape as panics; they end up in `ExecutionResult::error`
//! (or, for registry lookups, in a returned `Result`).

use std::time::Duration;
use thiserror::Error;

/// Error reported by a capability's own `execute`.
///
/// Capability authors build these from whatever went wrong on their side;
/// retry classification matches against the message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CapabilityError {
    pub message: String,
}

impl CapabilityError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl From<std::io::Error> for CapabilityError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<serde_json::Error> for CapabilityError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Primary error type for capability resolution and execution
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    // =========================================================================
    // Rejections (the capability never ran)
    // =========================================================================
    /// The caller gave up while waiting for an execution slot
    #[error("cancelled while waiting for an execution slot")]
    SlotAcquisitionCancelled,

    /// A field the input schema marks as required is absent
    #[error("missing required field: {field}")]
    Validation { field: String },

    /// The capability is gated and the context carries no approval
    #[error("capability {name} requires approval before execution")]
    ApprovalRequired { name: String },

    // =========================================================================
    // Registry
    // =========================================================================
    /// Neither a factory nor an instance is registered under the name
    #[error("capability not found: {name}")]
    CapabilityNotFound { name: String },

    /// A registered factory refused to build an instance
    #[error("failed to construct capability {name}: {source}")]
    FactoryFailed {
        name: String,
        #[source]
        source: CapabilityError,
    },

    // =========================================================================
    // Execution
    // =========================================================================
    /// The capability reported an error (possibly after retries)
    #[error(transparent)]
    Execution(#[from] CapabilityError),

    /// A single attempt ran past its deadline
    #[error("capability {name} timed out after {duration:?}")]
    Timeout { name: String, duration: Duration },

    /// The capability panicked; the panic was caught
    #[error("capability panicked: {message}")]
    Panicked { message: String },

    // =========================================================================
    // Caller cancellation
    // =========================================================================
    /// The caller cancelled while an attempt was running
    #[error("execution cancelled")]
    Cancelled,

    /// The caller cancelled while the engine was waiting to retry
    #[error("cancelled during retry backoff")]
    CancelledDuringBackoff,
}

impl ExecError {
    /// Check if the error came from the caller's own cancellation
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::SlotAcquisitionCancelled | Self::Cancelled | Self::CancelledDuringBackoff
        )
    }

    /// Check if the error is reported before any attempt is made
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::SlotAcquisitionCancelled
                | Self::Validation { .. }
                | Self::ApprovalRequired { .. }
                | Self::CapabilityNotFound { .. }
                | Self::FactoryFailed { .. }
        )
    }
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Result type alias using ExecError
pub type Result<T> = std::result::Result<T, ExecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_is_transparent() {
        let err = ExecError::from(CapabilityError::new("503 service unavailable"));
        assert_eq!(err.to_string(), "503 service unavailable");
        assert!(!err.is_rejection());
        assert!(!err.is_cancellation());
    }

    #[test]
    fn test_rejection_classes() {
        assert!(ExecError::SlotAcquisitionCancelled.is_rejection());
        assert!(ExecError::Validation {
            field: "path".to_string()
        }
        .is_rejection());
        assert!(ExecError::ApprovalRequired {
            name: "bash".to_string()
        }
        .is_rejection());
        assert!(!ExecError::CancelledDuringBackoff.is_rejection());
        assert!(ExecError::CancelledDuringBackoff.is_cancellation());
    }

    #[test]
    fn test_messages() {
        let err = ExecError::Validation {
            field: "path".to_string(),
        };
        assert_eq!(err.to_string(), "missing required field: path");

        let err = ExecError::CapabilityNotFound {
            name: "clock".to_string(),
        };
        assert_eq!(err.to_string(), "capability not found: clock");
    }
}

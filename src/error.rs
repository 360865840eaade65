//! Error types for simprobe.
//!
//! All errors are strongly typed using thiserror and grouped by how a
//! caller is expected to react to them:
//! - **Control**: the remote simulation could not be reached or refused a
//!   request it should have accepted
//! - **Data**: a signal value was absent or malformed when it was required
//! - **Precondition**: an operation was issued in the wrong session state
//! - **Validation**: configuration or design metadata is malformed
//! - **Store**: a snapshot sequence could not be written or read

use thiserror::Error;

/// Errors raised while driving the remote simulation.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Unable to connect to {endpoint} after {attempts} attempts")]
    ConnectExhausted {
        endpoint: String,
        attempts: u32,
    },

    #[error("Protocol violation: unable to {action}")]
    ProtocolViolation {
        action: String,
    },

    #[error("Timed out after {duration_ms}ms waiting for {condition}")]
    Timeout {
        condition: String,
        duration_ms: u64,
    },

    #[error("Wait for {condition} was cancelled")]
    Cancelled {
        condition: String,
    },
}

/// Errors raised when signal data is missing or inconsistent.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Signal '{name}' has no numeric value (handle '{handle}')")]
    MissingValue {
        name: String,
        handle: String,
    },

    #[error("Signal name '{name}' is not a valid handle")]
    InvalidSignalName {
        name: String,
    },

    #[error("Port '{name}' has no declared direction")]
    UnknownPort {
        name: String,
    },

    #[error("Snapshot {index} does not match the sequence shape: {reason}")]
    ShapeMismatch {
        index: usize,
        reason: String,
    },
}

/// Errors raised when an operation is issued in the wrong state.
#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("Simulation must be paused, but session is {state}")]
    NotPaused {
        state: String,
    },

    #[error("Cannot {action}: simulation has finished")]
    SessionFinished {
        action: String,
    },

    #[error("Cannot {action}: session is not connected")]
    NotConnected {
        action: String,
    },

    #[error("Runs have different lengths ({left} vs {right})")]
    RunLengthMismatch {
        left: usize,
        right: usize,
    },

    #[error("Runs expose different signal keys at snapshot {index}")]
    RunKeyMismatch {
        index: usize,
    },
}

/// Validation errors for configuration and design metadata.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField {
        field: String,
    },

    #[error("Field '{field}' must be at least {min} (got {actual})")]
    OutOfRange {
        field: String,
        min: u64,
        actual: u64,
    },

    #[error("Signal '{name}' is declared more than once")]
    DuplicateSignal {
        name: String,
    },

    #[error("Invalid metadata: {message}")]
    InvalidMetadata {
        message: String,
    },
}

/// Errors raised by the snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
    },
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Coarse classification of a [`ProbeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The remote endpoint never answered.
    Unavailable,
    /// A request that must succeed on a live remote failed.
    ProtocolViolation,
    /// A required value was absent or malformed.
    DataInconsistency,
    /// The operation was issued in the wrong state.
    PreconditionViolation,
    /// A bounded wait expired.
    Timeout,
    /// A wait was cancelled by the caller.
    Cancelled,
    /// Configuration or metadata is malformed.
    Validation,
    /// Persisting or loading snapshots failed.
    Storage,
}

/// Top-level error type for simprobe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Precondition error: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ProbeError {
    /// Creates a protocol violation for the given action.
    #[must_use]
    pub fn protocol(action: impl Into<String>) -> Self {
        Self::Control(ControlError::ProtocolViolation {
            action: action.into(),
        })
    }

    /// Returns the taxonomy kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Control(e) => match e {
                ControlError::ConnectExhausted { .. } => ErrorKind::Unavailable,
                ControlError::ProtocolViolation { .. } => ErrorKind::ProtocolViolation,
                ControlError::Timeout { .. } => ErrorKind::Timeout,
                ControlError::Cancelled { .. } => ErrorKind::Cancelled,
            },
            Self::Data(_) => ErrorKind::DataInconsistency,
            Self::Precondition(_) => ErrorKind::PreconditionViolation,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Store(_) => ErrorKind::Storage,
        }
    }

    /// Returns true if this is a control error.
    #[must_use]
    pub const fn is_control(&self) -> bool {
        matches!(self, Self::Control(_))
    }

    /// Returns true if this is a data error.
    #[must_use]
    pub const fn is_data(&self) -> bool {
        matches!(self, Self::Data(_))
    }

    /// Returns true if this is a precondition error.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this error is retryable.
    ///
    /// Only an exhausted connect and an expired wait may succeed when tried
    /// again; everything else reflects a remote that misbehaved or a caller bug.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Control(ControlError::ConnectExhausted { .. } | ControlError::Timeout { .. })
        )
    }
}

/// Result type alias for simprobe operations.
pub type ProbeResult<T> = Result<T, ProbeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_exhausted_message() {
        let err = ControlError::ConnectExhausted {
            endpoint: "localhost:8888".to_string(),
            attempts: 5,
        };
        let msg = format!("{err}");
        assert!(msg.contains("localhost:8888"));
        assert!(msg.contains("5 attempts"));
    }

    #[test]
    fn test_missing_value_names_signal() {
        let err = DataError::MissingValue {
            name: "b".to_string(),
            handle: "TOP.mod.b".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("'b'"));
        assert!(msg.contains("TOP.mod.b"));
    }

    #[test]
    fn test_timeout_message() {
        let err = ControlError::Timeout {
            condition: "pause".to_string(),
            duration_ms: 250,
        };
        assert!(format!("{err}").contains("250ms"));
    }

    #[test]
    fn test_kinds() {
        let err: ProbeError = ControlError::ConnectExhausted {
            endpoint: "x".to_string(),
            attempts: 1,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(err.is_control());

        let err = ProbeError::protocol("continue");
        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
        assert!(format!("{err}").contains("unable to continue"));

        let err: ProbeError = DataError::InvalidSignalName {
            name: "a b".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::DataInconsistency);
        assert!(err.is_data());

        let err: ProbeError = PreconditionError::NotPaused {
            state: "Running".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::PreconditionViolation);
        assert!(err.is_precondition());
    }

    #[test]
    fn test_retryable() {
        let err: ProbeError = ControlError::ConnectExhausted {
            endpoint: "x".to_string(),
            attempts: 5,
        }
        .into();
        assert!(err.is_retryable());

        let err: ProbeError = ControlError::Timeout {
            condition: "pause".to_string(),
            duration_ms: 10,
        }
        .into();
        assert!(err.is_retryable());

        let err: ProbeError = ControlError::Cancelled {
            condition: "pause".to_string(),
        }
        .into();
        assert!(!err.is_retryable());

        assert!(!ProbeError::protocol("continue").is_retryable());
    }

    #[test]
    fn test_store_error_from_json() {
        let json_err = serde_json::from_str::<u64>("nope").unwrap_err();
        let err: ProbeError = StoreError::from(json_err).into();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}

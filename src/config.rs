//! Session and recorder configuration.
//!
//! Both configurations deserialize from JSON with every field optional, so a
//! config file only needs to name the values it overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProbeResult, StoreError, ValidationError};
use crate::wait::{CancelToken, WaitPolicy};

/// Configuration for one control session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// `host:port` of the simulation runtime.
    pub endpoint: String,
    /// Top-level instance name the design is elaborated under.
    pub hierarchy_prefix: Option<String>,
    /// Number of liveness probes before `connect` gives up.
    pub connect_attempts: u32,
    /// Delay after the first failed probe; doubles after each failure.
    pub connect_base_delay_ms: u64,
    /// Interval between status polls while waiting.
    pub poll_interval_ms: u64,
    /// Upper bound on a single wait. `None` waits indefinitely.
    pub wait_timeout_ms: Option<u64>,
    /// Socket connect/read/write timeout for each request.
    pub request_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: "localhost:8888".to_string(),
            hierarchy_prefix: None,
            connect_attempts: 5,
            connect_base_delay_ms: 500,
            poll_interval_ms: 1000,
            wait_timeout_ms: None,
            request_timeout_ms: 5000,
        }
    }
}

impl SessionConfig {
    /// Creates a config for the given endpoint with default timings.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Sets the hierarchy prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.hierarchy_prefix = Some(prefix.into());
        self
    }

    /// Validates the configuration, returning it unchanged on success.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the endpoint is empty, if fewer than one
    /// connect attempt is configured, or if a timing value is zero.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.endpoint.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "endpoint".to_string(),
            });
        }
        if self.hierarchy_prefix.as_deref().is_some_and(|p| p.trim_end_matches('.').is_empty()) {
            return Err(ValidationError::EmptyField {
                field: "hierarchy_prefix".to_string(),
            });
        }
        let bounds = [
            ("connect_attempts", u64::from(self.connect_attempts)),
            ("poll_interval_ms", self.poll_interval_ms),
            ("request_timeout_ms", self.request_timeout_ms),
        ];
        for (field, actual) in bounds {
            if actual < 1 {
                return Err(ValidationError::OutOfRange {
                    field: field.to_string(),
                    min: 1,
                    actual,
                });
            }
        }
        Ok(self)
    }

    /// Loads and validates a config from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns a store error if the file cannot be read or parsed, and a
    /// validation error if the parsed config is invalid.
    pub fn from_json_file(path: &Path) -> ProbeResult<Self> {
        let text = std::fs::read_to_string(path).map_err(StoreError::from)?;
        let config: Self = serde_json::from_str(&text).map_err(StoreError::from)?;
        Ok(config.validate()?)
    }

    /// Base delay for connect backoff.
    #[must_use]
    pub const fn connect_base_delay(&self) -> Duration {
        Duration::from_millis(self.connect_base_delay_ms)
    }

    /// Per-request socket timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Builds the wait policy used by the blocking session waits.
    #[must_use]
    pub fn wait_policy(&self, cancel: Option<CancelToken>) -> WaitPolicy {
        WaitPolicy {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            timeout: self.wait_timeout_ms.map(Duration::from_millis),
            cancel,
        }
    }
}

/// What each recorded snapshot captures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Inputs, registers and outputs as separate maps.
    #[default]
    Partitioned,
    /// One flat map over every register and port.
    All,
}

/// Configuration for a recording run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Clock pauses skipped before recording starts.
    pub num_wait_reset: u32,
    /// Snapshot flavor.
    pub capture: CaptureMode,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            num_wait_reset: 1,
            capture: CaptureMode::Partitioned,
        }
    }
}

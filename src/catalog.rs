//! Signal catalog built from design metadata.
//!
//! The catalog is fixed for a recording: two runs of the same design read the
//! same catalog, which is what makes their snapshots comparable position by
//! position.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ProbeResult, StoreError, ValidationError};

/// Direction of a top-level port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
    #[serde(alias = "in_out")]
    InOut,
}

impl PortDirection {
    /// True for ports the test bench drives.
    #[must_use]
    pub const fn is_input(self) -> bool {
        matches!(self, Self::Input | Self::InOut)
    }

    /// True for ports the design drives.
    #[must_use]
    pub const fn is_output(self) -> bool {
        matches!(self, Self::Output | Self::InOut)
    }
}

/// A top-level port and its declared direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub direction: PortDirection,
}

impl Port {
    #[must_use]
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Input,
        }
    }

    #[must_use]
    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Output,
        }
    }
}

/// Ordered register and port names for one design.
///
/// Names are local to the top-level instance; the resolver adds the
/// hierarchy prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalCatalog {
    #[serde(default)]
    registers: Vec<String>,
    #[serde(default)]
    ports: Vec<Port>,
}

impl SignalCatalog {
    /// Builds and validates a catalog.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if a name is empty or appears twice across
    /// registers and ports.
    pub fn new(registers: Vec<String>, ports: Vec<Port>) -> Result<Self, ValidationError> {
        let catalog = Self { registers, ports };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Parses design metadata of the form
    /// `{"registers": [...], "ports": [{"name": .., "direction": "input"}]}`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed or inconsistent metadata.
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let catalog: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidMetadata {
            message: e.to_string(),
        })?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Reads design metadata from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns a store error if the file cannot be read, or a validation
    /// error if its content is not a valid catalog.
    pub fn from_json_file(path: &Path) -> ProbeResult<Self> {
        let text = std::fs::read_to_string(path).map_err(StoreError::from)?;
        Ok(Self::from_json_str(&text)?)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        let names = self.registers.iter().chain(self.ports.iter().map(|p| &p.name));
        for name in names {
            if name.trim().is_empty() {
                return Err(ValidationError::EmptyField {
                    field: "signal name".to_string(),
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(ValidationError::DuplicateSignal { name: name.clone() });
            }
        }
        Ok(())
    }

    /// Register names, in declaration order.
    #[must_use]
    pub fn registers(&self) -> &[String] {
        &self.registers
    }

    /// Ports, in declaration order.
    #[must_use]
    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    /// Every observable value: registers first, then ports.
    #[must_use]
    pub fn values(&self) -> Vec<String> {
        self.registers
            .iter()
            .cloned()
            .chain(self.ports.iter().map(|p| p.name.clone()))
            .collect()
    }

    /// Input port names.
    #[must_use]
    pub fn inputs(&self) -> Vec<String> {
        self.ports_where(PortDirection::is_input)
    }

    /// Output port names.
    #[must_use]
    pub fn outputs(&self) -> Vec<String> {
        self.ports_where(PortDirection::is_output)
    }

    /// Declared direction of a port, if it exists.
    #[must_use]
    pub fn direction(&self, name: &str) -> Option<PortDirection> {
        self.ports.iter().find(|p| p.name == name).map(|p| p.direction)
    }

    fn ports_where(&self, pred: impl Fn(PortDirection) -> bool) -> Vec<String> {
        self.ports
            .iter()
            .filter(|p| pred(p.direction))
            .map(|p| p.name.clone())
            .collect()
    }
}

//! Qualified signal handles.
//!
//! The runtime addresses signals by their full hierarchical name, and the
//! simulated design usually sits below a tool-imposed wrapper (for example
//! `TOP` under Verilator). A [`QualifiedHandle`] joins that prefix and a
//! local signal name with `.`.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Separator between hierarchy levels.
pub const SEPARATOR: char = '.';

fn handle_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Same grammar the runtime accepts on its `/value/` route.
    PATTERN.get_or_init(|| Regex::new(r"^[\w.$]+$").expect("static handle pattern"))
}

/// A hierarchy-prefixed signal name understood by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualifiedHandle(String);

impl QualifiedHandle {
    /// Qualifies `local` under `prefix`.
    ///
    /// Without a prefix the name is used unchanged. A name that already
    /// starts with the prefix is not prefixed twice, and a trailing
    /// separator on the prefix is tolerated.
    ///
    /// # Errors
    ///
    /// Returns `DataError::InvalidSignalName` if the resulting handle contains
    /// characters the runtime cannot route.
    ///
    /// # Examples
    ///
    /// ```
    /// use simprobe::QualifiedHandle;
    ///
    /// let handle = QualifiedHandle::qualify(Some("TOP"), "mod.a").unwrap();
    /// assert_eq!(handle.as_str(), "TOP.mod.a");
    ///
    /// let same = QualifiedHandle::qualify(Some("TOP."), "TOP.mod.a").unwrap();
    /// assert_eq!(same, handle);
    /// ```
    pub fn qualify(prefix: Option<&str>, local: &str) -> Result<Self, DataError> {
        let joined = match prefix.map(|p| p.trim_end_matches(SEPARATOR)) {
            Some(top) if !top.is_empty() => {
                let already = local
                    .strip_prefix(top)
                    .is_some_and(|rest| rest.starts_with(SEPARATOR));
                if already {
                    local.to_string()
                } else {
                    format!("{top}{SEPARATOR}{local}")
                }
            }
            _ => local.to_string(),
        };
        Self::parse(joined).map_err(|_| DataError::InvalidSignalName {
            name: local.to_string(),
        })
    }

    /// Wraps an already-qualified handle after validating it.
    ///
    /// # Errors
    ///
    /// Returns `DataError::InvalidSignalName` for empty names or names with
    /// characters outside `[A-Za-z0-9_.$]`.
    pub fn parse(handle: impl Into<String>) -> Result<Self, DataError> {
        let handle = handle.into();
        if !handle_pattern().is_match(&handle) || handle.starts_with(SEPARATOR) || handle.ends_with(SEPARATOR) {
            return Err(DataError::InvalidSignalName { name: handle });
        }
        Ok(Self(handle))
    }

    /// The handle text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Runtime path that reads this handle's value.
    #[must_use]
    pub fn value_path(&self) -> String {
        format!("/value/{}", self.0)
    }
}

impl fmt::Display for QualifiedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QualifiedHandle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

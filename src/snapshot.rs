//! Snapshots and recorded runs.
//!
//! A [`SnapshotSequence`] is append-only and ordered by simulation time.
//! Every snapshot in a sequence has the same shape and key set as the first,
//! so sequences from two runs of one design line up position by position.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DataError, PreconditionError};

/// Signal name to value, ordered by name.
pub type ValueMap = BTreeMap<String, u64>;

/// Values captured at one pause.
///
/// Serialized either as `{"in": {..}, "reg": {..}, "out": {..}}` or, for the
/// flat flavor, as a single name-to-value object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Snapshot {
    /// Values split by signal role.
    Partitioned {
        #[serde(rename = "in")]
        inputs: ValueMap,
        #[serde(rename = "reg")]
        registers: ValueMap,
        #[serde(rename = "out")]
        outputs: ValueMap,
    },
    /// Every captured value in one map.
    All(ValueMap),
}

impl Snapshot {
    /// Looks a signal up in any partition.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<u64> {
        match self {
            Self::Partitioned {
                inputs,
                registers,
                outputs,
            } => inputs
                .get(name)
                .or_else(|| registers.get(name))
                .or_else(|| outputs.get(name))
                .copied(),
            Self::All(values) => values.get(name).copied(),
        }
    }

    /// Input partition, if partitioned.
    #[must_use]
    pub const fn inputs(&self) -> Option<&ValueMap> {
        match self {
            Self::Partitioned { inputs, .. } => Some(inputs),
            Self::All(_) => None,
        }
    }

    /// Register partition, if partitioned.
    #[must_use]
    pub const fn registers(&self) -> Option<&ValueMap> {
        match self {
            Self::Partitioned { registers, .. } => Some(registers),
            Self::All(_) => None,
        }
    }

    /// Output partition, if partitioned.
    #[must_use]
    pub const fn outputs(&self) -> Option<&ValueMap> {
        match self {
            Self::Partitioned { outputs, .. } => Some(outputs),
            Self::All(_) => None,
        }
    }

    /// Keys tagged with their partition, for shape comparison.
    #[must_use]
    pub fn key_set(&self) -> BTreeSet<(&'static str, &str)> {
        match self {
            Self::Partitioned {
                inputs,
                registers,
                outputs,
            } => inputs
                .keys()
                .map(|k| ("in", k.as_str()))
                .chain(registers.keys().map(|k| ("reg", k.as_str())))
                .chain(outputs.keys().map(|k| ("out", k.as_str())))
                .collect(),
            Self::All(values) => values.keys().map(|k| ("all", k.as_str())).collect(),
        }
    }
}

/// Ordered, append-only list of snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotSequence {
    snapshots: Vec<Snapshot>,
}

impl SnapshotSequence {
    #[must_use]
    pub const fn new() -> Self {
        Self { snapshots: Vec::new() }
    }

    /// Appends a snapshot taken after every snapshot already in the sequence.
    ///
    /// # Errors
    ///
    /// Returns `DataError::ShapeMismatch` if the snapshot's flavor or key set
    /// differs from the first snapshot's.
    pub fn push(&mut self, snapshot: Snapshot) -> Result<(), DataError> {
        if let Some(first) = self.snapshots.first() {
            if first.key_set() != snapshot.key_set() {
                return Err(DataError::ShapeMismatch {
                    index: self.snapshots.len(),
                    reason: "key set differs from the first snapshot".to_string(),
                });
            }
        }
        self.snapshots.push(snapshot);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Snapshot> {
        self.snapshots.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.snapshots.iter()
    }

    /// Values of one signal across the sequence, in order.
    ///
    /// Returns `None` if any snapshot lacks the signal.
    #[must_use]
    pub fn trace(&self, name: &str) -> Option<Vec<u64>> {
        self.snapshots.iter().map(|s| s.get(name)).collect()
    }

    /// Re-checks the shape invariant, e.g. after loading from disk.
    ///
    /// # Errors
    ///
    /// Returns `DataError::ShapeMismatch` for the first inconsistent snapshot.
    pub fn validate(&self) -> Result<(), DataError> {
        let Some(first) = self.snapshots.first() else {
            return Ok(());
        };
        let keys = first.key_set();
        for (index, snapshot) in self.snapshots.iter().enumerate().skip(1) {
            if snapshot.key_set() != keys {
                return Err(DataError::ShapeMismatch {
                    index,
                    reason: "key set differs from the first snapshot".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a SnapshotSequence {
    type Item = &'a Snapshot;
    type IntoIter = std::slice::Iter<'a, Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.iter()
    }
}

/// A recorded execution, the unit an external fault localizer compares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    /// Caller-chosen label, e.g. `"reference"` or `"candidate"`.
    pub label: String,
    pub recorded_at: DateTime<Utc>,
    pub snapshots: SnapshotSequence,
}

impl Run {
    /// Wraps a sequence recorded now.
    #[must_use]
    pub fn new(label: impl Into<String>, snapshots: SnapshotSequence) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            recorded_at: Utc::now(),
            snapshots,
        }
    }

    /// Checks that two runs can be compared position by position.
    ///
    /// Runs of unequal length are reported, not truncated: a run that hung
    /// or ended early is itself a finding the caller has to decide on.
    ///
    /// # Errors
    ///
    /// Returns `PreconditionError::RunLengthMismatch` or
    /// `PreconditionError::RunKeyMismatch`.
    pub fn ensure_comparable(&self, other: &Self) -> Result<(), PreconditionError> {
        let (left, right) = (self.snapshots.len(), other.snapshots.len());
        if left != right {
            return Err(PreconditionError::RunLengthMismatch { left, right });
        }
        for (index, (a, b)) in self.snapshots.iter().zip(other.snapshots.iter()).enumerate() {
            if a.key_set() != b.key_set() {
                return Err(PreconditionError::RunKeyMismatch { index });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, u64)]) -> ValueMap {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    fn step(a: u64, b: u64) -> Snapshot {
        Snapshot::Partitioned {
            inputs: values(&[("a", a)]),
            registers: values(&[("b", b)]),
            outputs: values(&[("out", b)]),
        }
    }

    #[test]
    fn test_partitioned_json_shape() {
        let json = serde_json::to_value(step(1, 1)).unwrap();
        assert_eq!(json, serde_json::json!({"in": {"a": 1}, "reg": {"b": 1}, "out": {"out": 1}}));
    }

    #[test]
    fn test_flat_json_shape() {
        let snapshot = Snapshot::All(values(&[("a", 3), ("b", 4)]));
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json, serde_json::json!({"a": 3, "b": 4}));
        let back: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_lookup_across_partitions() {
        let snapshot = step(2, 5);
        assert_eq!(snapshot.get("a"), Some(2));
        assert_eq!(snapshot.get("b"), Some(5));
        assert_eq!(snapshot.get("zz"), None);
        assert_eq!(snapshot.inputs().map(ValueMap::len), Some(1));
        assert!(Snapshot::All(ValueMap::new()).registers().is_none());
    }

    #[test]
    fn test_push_rejects_shape_change() {
        let mut seq = SnapshotSequence::new();
        seq.push(step(1, 1)).unwrap();
        let err = seq.push(Snapshot::All(values(&[("a", 2)]))).unwrap_err();
        assert!(matches!(err, DataError::ShapeMismatch { index: 1, .. }));
        assert_eq!(seq.len(), 1);
    }

    #[test]
    fn test_trace_keeps_order() {
        let mut seq = SnapshotSequence::new();
        for (a, b) in [(1, 1), (2, 3), (3, 6)] {
            seq.push(step(a, b)).unwrap();
        }
        assert_eq!(seq.trace("out"), Some(vec![1, 3, 6]));
        assert_eq!(seq.trace("missing"), None);
        assert!(seq.validate().is_ok());
    }

    #[test]
    fn test_validate_detects_loaded_inconsistency() {
        let seq: SnapshotSequence =
            serde_json::from_str(r#"[{"a": 1}, {"b": 2}]"#).unwrap();
        assert!(matches!(seq.validate(), Err(DataError::ShapeMismatch { index: 1, .. })));
    }

    #[test]
    fn test_runs_comparable() {
        let mut a = SnapshotSequence::new();
        let mut b = SnapshotSequence::new();
        a.push(step(1, 1)).unwrap();
        b.push(step(1, 9)).unwrap();
        let reference = Run::new("reference", a.clone());
        let candidate = Run::new("candidate", b);
        assert!(reference.ensure_comparable(&candidate).is_ok());
        assert_ne!(reference.id, candidate.id);

        a.push(step(2, 3)).unwrap();
        let longer = Run::new("longer", a);
        assert!(matches!(
            reference.ensure_comparable(&longer),
            Err(PreconditionError::RunLengthMismatch { left: 1, right: 2 })
        ));

        let mut flat = SnapshotSequence::new();
        flat.push(Snapshot::All(values(&[("a", 1)]))).unwrap();
        assert!(matches!(
            reference.ensure_comparable(&Run::new("flat", flat)),
            Err(PreconditionError::RunKeyMismatch { index: 0 })
        ));
    }
}

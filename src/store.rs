//! Durable snapshot storage.
//!
//! Sequences are stored as a JSON array, one object per recorded pause in
//! simulation-time order:
//!
//! ```text
//! [
//!   {"in": {"mod.a": 1}, "reg": {"mod.b": 1}, "out": {"mod.out": 1}},
//!   {"in": {"mod.a": 2}, "reg": {"mod.b": 3}, "out": {"mod.out": 3}}
//! ]
//! ```
//!
//! Integers are written as JSON integers, so values survive a round trip
//! without loss. Files are written to a temporary sibling, synced, then
//! renamed into place, so readers never observe a half-written file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ProbeResult, StoreError};
use crate::snapshot::{Run, SnapshotSequence};

/// Reads and writes snapshot sequences and runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotStore {
    pretty: bool,
}

impl SnapshotStore {
    /// A store writing compact JSON.
    #[must_use]
    pub const fn new() -> Self {
        Self { pretty: false }
    }

    /// A store writing indented JSON.
    #[must_use]
    pub const fn pretty() -> Self {
        Self { pretty: true }
    }

    fn write_json<T: Serialize>(&self, value: &T, sink: &mut impl Write) -> Result<(), StoreError> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut *sink, value)?;
        } else {
            serde_json::to_writer(&mut *sink, value)?;
        }
        sink.flush()?;
        Ok(())
    }

    fn write_file<T: Serialize>(&self, value: &T, path: &Path) -> Result<(), StoreError> {
        let temp_path = temp_sibling(path);
        let result = self.write_then_rename(value, &temp_path, path);
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result
    }

    fn write_then_rename<T: Serialize>(&self, value: &T, temp_path: &Path, path: &Path) -> Result<(), StoreError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp_path)?;
        let mut writer = BufWriter::new(file);
        self.write_json(value, &mut writer)?;
        writer.get_ref().sync_all()?;
        fs::rename(temp_path, path)?;
        Ok(())
    }

    /// Serializes `sequence` to `sink`, preserving order.
    ///
    /// # Errors
    ///
    /// Returns a store error if serialization or the write fails.
    pub fn dump(&self, sequence: &SnapshotSequence, sink: &mut impl Write) -> ProbeResult<()> {
        Ok(self.write_json(sequence, sink)?)
    }

    /// Writes `sequence` to `path` atomically.
    ///
    /// # Errors
    ///
    /// Returns a store error if the file cannot be written.
    pub fn dump_to_path(&self, sequence: &SnapshotSequence, path: &Path) -> ProbeResult<()> {
        self.write_file(sequence, path)?;
        debug!("wrote {} snapshots to {}", sequence.len(), path.display());
        Ok(())
    }

    /// Reads a sequence and re-checks its shape.
    ///
    /// # Errors
    ///
    /// Returns a store error for unreadable or malformed input, and a data
    /// error if the snapshots do not share one shape.
    pub fn load(&self, source: impl Read) -> ProbeResult<SnapshotSequence> {
        let sequence: SnapshotSequence = read_json(source)?;
        sequence.validate()?;
        Ok(sequence)
    }

    /// Reads a sequence from `path`.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn load_path(&self, path: &Path) -> ProbeResult<SnapshotSequence> {
        let file = File::open(path).map_err(StoreError::from)?;
        self.load(BufReader::new(file))
    }

    /// Writes a labeled run (metadata plus snapshots) to `path` atomically.
    ///
    /// # Errors
    ///
    /// Returns a store error if the file cannot be written.
    pub fn dump_run(&self, run: &Run, path: &Path) -> ProbeResult<()> {
        Ok(self.write_file(run, path)?)
    }

    /// Reads a labeled run from `path`.
    ///
    /// # Errors
    ///
    /// Returns a store error for unreadable or malformed input, and a data
    /// error if the snapshots do not share one shape.
    pub fn load_run(&self, path: &Path) -> ProbeResult<Run> {
        let file = File::open(path).map_err(StoreError::from)?;
        let run: Run = read_json(BufReader::new(file))?;
        run.snapshots.validate()?;
        Ok(run)
    }
}

fn read_json<T: DeserializeOwned>(source: impl Read) -> Result<T, StoreError> {
    Ok(serde_json::from_reader(source)?)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "snapshots".into(), |n| n.to_string_lossy().into_owned());
    path.with_file_name(format!(".{name}.tmp.{}", Uuid::new_v4()))
}

//! # simprobe - debug control and state recording for running simulations
//!
//! simprobe drives a hardware simulation through its HTTP debug runtime:
//! pausing, resuming, stepping clock edges and reading signal values. On top
//! of that control surface it records the design's state at every clock
//! pause, so two runs of the same test bench can be compared cycle by cycle.
//!
//! ## Core Concepts
//!
//! - **Transport**: request/response access to the runtime; failures are
//!   "no data", never panics
//! - **ControlSession**: the connection state machine and every control action
//! - **ValueResolver**: turns local signal names into values
//! - **StateRecorder**: one [`Snapshot`] per clock pause until the run ends
//! - **SnapshotStore**: durable JSON for sequences and labeled runs
//!
//! ## Usage
//!
//! ```rust,no_run
//! use simprobe::{
//!     ControlSession, HttpTransport, RecorderConfig, SessionConfig, SignalCatalog, SnapshotStore,
//!     StateRecorder,
//! };
//! use std::path::Path;
//!
//! # fn main() -> simprobe::ProbeResult<()> {
//! let config = SessionConfig::new("localhost:8888").with_prefix("TOP");
//! let mut session = ControlSession::new(HttpTransport::from_config(&config), config)?;
//! session.connect()?;
//!
//! let catalog = SignalCatalog::from_json_file(Path::new("design.json"))?;
//! let recorder = StateRecorder::new(&catalog, RecorderConfig::default());
//! let sequence = recorder.record_state(&mut session)?;
//! SnapshotStore::pretty().dump_to_path(&sequence, Path::new("states.json"))?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Control plane
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod wait;

// Signals and recording
pub mod catalog;
pub mod handle;
pub mod recorder;
pub mod resolver;
pub mod snapshot;
pub mod store;

#[cfg(test)]
mod testutil;

// Re-export primary types at crate root for convenience
pub use catalog::{Port, PortDirection, SignalCatalog};
pub use config::{CaptureMode, RecorderConfig, SessionConfig};
pub use error::{
    ControlError, DataError, ErrorKind, PreconditionError, ProbeError, ProbeResult, StoreError,
    ValidationError,
};
pub use handle::QualifiedHandle;
pub use protocol::{BreakpointSite, ControllerRegistration, HierarchyView};
pub use recorder::StateRecorder;
pub use resolver::{parse_value, ValueResolver};
pub use session::{ControlSession, PollOutcome, SessionState, SimulationStatus};
pub use snapshot::{Run, Snapshot, SnapshotSequence, ValueMap};
pub use store::SnapshotStore;
pub use transport::{ClockedModel, HttpTransport, InMemoryRuntime, Transport};
pub use wait::{CancelToken, WaitPolicy};

//! Clock-synchronized state recording.
//!
//! The recorder has no idea how many cycles a test bench runs. It keeps
//! capturing and resuming until the remote stops answering, and treats that
//! silence as the end of the run.

use log::{debug, info, warn};

use crate::catalog::SignalCatalog;
use crate::config::{CaptureMode, RecorderConfig};
use crate::error::{PreconditionError, ProbeResult};
use crate::resolver::ValueResolver;
use crate::session::{ControlSession, PollOutcome};
use crate::snapshot::{Run, Snapshot, SnapshotSequence, ValueMap};
use crate::transport::Transport;

/// Records one snapshot per clock pause.
pub struct StateRecorder<'c> {
    catalog: &'c SignalCatalog,
    config: RecorderConfig,
}

impl<'c> StateRecorder<'c> {
    #[must_use]
    pub const fn new(catalog: &'c SignalCatalog, config: RecorderConfig) -> Self {
        Self { catalog, config }
    }

    /// Captures the configured values at the current pause.
    ///
    /// # Errors
    ///
    /// Fails if any catalog signal has no value; nothing partial is returned.
    pub fn capture<T: Transport>(&self, session: &ControlSession<T>) -> ProbeResult<Snapshot> {
        let resolver = ValueResolver::new(session);
        match self.config.capture {
            CaptureMode::All => Ok(Snapshot::All(resolver.get_all_values(self.catalog.values().as_slice(), true)?)),
            CaptureMode::Partitioned => {
                // One read for the whole snapshot; a missing value is reported
                // in register, input, output order.
                let inputs = self.catalog.inputs();
                let outputs = self.catalog.outputs();
                let names: Vec<&String> = self.catalog.registers().iter().chain(&inputs).chain(&outputs).collect();
                let all = resolver.get_all_values(names.as_slice(), true)?;
                let pick = |names: &[String]| -> ValueMap {
                    names
                        .iter()
                        .filter_map(|name| all.get(name).map(|value| (name.clone(), *value)))
                        .collect()
                };
                Ok(Snapshot::Partitioned {
                    inputs: pick(&inputs),
                    registers: pick(self.catalog.registers()),
                    outputs: pick(&outputs),
                })
            }
        }
    }

    /// Drives a paused session to completion, recording every clock pause
    /// after the first `num_wait_reset` ones.
    ///
    /// Returns once the simulation process has exited. If the simulation
    /// exits during warm-up the sequence is empty.
    ///
    /// # Errors
    ///
    /// - `PreconditionError::NotPaused` if the session is not paused on entry
    /// - a protocol violation if a resume or clock-mode request fails
    /// - a data error if a capture is incomplete
    /// - a timeout or cancellation from the session's wait policy
    pub fn record_state<T: Transport>(&self, session: &mut ControlSession<T>) -> ProbeResult<SnapshotSequence> {
        if !session.is_paused() {
            return Err(PreconditionError::NotPaused {
                state: session.state().to_string(),
            }
            .into());
        }
        session.set_pause_on_clock(true)?;
        let policy = session.wait_policy();
        let mut sequence = SnapshotSequence::new();

        for skipped in 0..self.config.num_wait_reset {
            session.continue_()?;
            if session.wait_for_pause_or_exit(&policy)? == PollOutcome::Finished {
                warn!("simulation exited during warm-up after {skipped} pauses");
                return Ok(sequence);
            }
        }

        loop {
            let snapshot = self.capture(session)?;
            sequence.push(snapshot)?;
            debug!("captured snapshot {}", sequence.len());

            session.continue_()?;
            if session.wait_for_pause_or_exit(&policy)? == PollOutcome::Finished {
                break;
            }
        }

        session.wait_until_finished_with(&policy)?;
        info!("recorded {} snapshots", sequence.len());
        Ok(sequence)
    }

    /// Records a run and labels it.
    ///
    /// # Errors
    ///
    /// See [`record_state`](Self::record_state).
    pub fn record_run<T: Transport>(&self, session: &mut ControlSession<T>, label: &str) -> ProbeResult<Run> {
        let sequence = self.record_state(session)?;
        Ok(Run::new(label, sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DataError, ErrorKind, ProbeError};
    use crate::session::SessionState;
    use crate::testutil::{accumulator_catalog, connected, runtime};

    #[test]
    fn test_records_running_sums() {
        let catalog = accumulator_catalog();
        let recorder = StateRecorder::new(&catalog, RecorderConfig::default());
        let mut session = connected(runtime(&[1, 2, 3, 4]));

        let sequence = recorder.record_state(&mut session).unwrap();

        assert_eq!(sequence.len(), 4);
        assert_eq!(sequence.trace("mod.a"), Some(vec![1, 2, 3, 4]));
        assert_eq!(sequence.trace("mod.out"), Some(vec![1, 3, 6, 10]));
        assert_eq!(session.state(), SessionState::Finished);
    }

    #[test]
    fn test_flat_capture() {
        let catalog = accumulator_catalog();
        let config = RecorderConfig {
            capture: CaptureMode::All,
            ..RecorderConfig::default()
        };
        let recorder = StateRecorder::new(&catalog, config);
        let mut session = connected(runtime(&[2, 2]));

        let sequence = recorder.record_state(&mut session).unwrap();
        assert_eq!(sequence.len(), 2);
        let first = sequence.get(0).unwrap();
        assert!(matches!(first, Snapshot::All(values) if values.len() == 3));
        assert_eq!(sequence.trace("mod.b"), Some(vec![2, 4]));
    }

    #[test]
    fn test_more_warm_up_skips_more_pauses() {
        let catalog = accumulator_catalog();
        let config = RecorderConfig {
            num_wait_reset: 2,
            ..RecorderConfig::default()
        };
        let recorder = StateRecorder::new(&catalog, config);
        let mut session = connected(runtime(&[1, 2, 3, 4]));

        let sequence = recorder.record_state(&mut session).unwrap();
        assert_eq!(sequence.trace("mod.a"), Some(vec![2, 3, 4]));
    }

    #[test]
    fn test_exit_during_warm_up_yields_empty() {
        let catalog = accumulator_catalog();
        let config = RecorderConfig {
            num_wait_reset: 3,
            ..RecorderConfig::default()
        };
        let recorder = StateRecorder::new(&catalog, config);
        let mut session = connected(runtime(&[1]));

        let sequence = recorder.record_state(&mut session).unwrap();
        assert!(sequence.is_empty());
        assert_eq!(session.state(), SessionState::Finished);
    }

    #[test]
    fn test_requires_paused_session() {
        let catalog = accumulator_catalog();
        let recorder = StateRecorder::new(&catalog, RecorderConfig::default());
        let mut session = connected(runtime(&[1, 2]).with_latency(100));
        session.set_pause_on_clock(true).unwrap();
        session.continue_().unwrap();

        let err = recorder.record_state(&mut session).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionViolation);
    }

    #[test]
    fn test_missing_register_aborts_recording() {
        let catalog = crate::catalog::SignalCatalog::new(
            vec!["mod.b".to_string(), "mod.ghost".to_string()],
            Vec::new(),
        )
        .unwrap();
        let recorder = StateRecorder::new(&catalog, RecorderConfig::default());
        let mut session = connected(runtime(&[1, 2]));

        let err = recorder.record_state(&mut session).unwrap_err();
        assert!(matches!(
            err,
            ProbeError::Data(DataError::MissingValue { ref name, .. }) if name == "mod.ghost"
        ));
    }

    #[test]
    fn test_capture_is_one_bulk_read() {
        let catalog = accumulator_catalog();
        let recorder = StateRecorder::new(&catalog, RecorderConfig::default());
        let mut session = connected(runtime(&[1, 2, 3]));

        let sequence = recorder.record_state(&mut session).unwrap();
        let bulk_reads = session
            .transport()
            .requests()
            .iter()
            .filter(|r| r.as_str() == "GET /values")
            .count();
        assert_eq!(bulk_reads, sequence.len());
        assert!(!session.transport().requests().iter().any(|r| r.starts_with("GET /value/")));

        match sequence.get(0).unwrap() {
            Snapshot::Partitioned { inputs, registers, outputs } => {
                assert_eq!(inputs.keys().collect::<Vec<_>>(), vec!["mod.a"]);
                assert_eq!(registers.keys().collect::<Vec<_>>(), vec!["mod.b"]);
                assert_eq!(outputs.keys().collect::<Vec<_>>(), vec!["mod.out"]);
            }
            Snapshot::All(_) => panic!("expected a partitioned snapshot"),
        }
    }

    #[test]
    fn test_record_run_labels_sequence() {
        let catalog = accumulator_catalog();
        let recorder = StateRecorder::new(&catalog, RecorderConfig::default());
        let mut session = connected(runtime(&[1, 1]));
        let run = recorder.record_run(&mut session, "reference").unwrap();
        assert_eq!(run.label, "reference");
        assert_eq!(run.snapshots.len(), 2);
    }
}

//! End-to-end recording against the in-process runtime.
//!
//! The bench is a running-sum accumulator: inputs 1, 2, 3, 4 must produce
//! outputs 1, 3, 6, 10 with one warm-up pause skipped.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{catalog, config, connect, runtime, Accumulator};
use simprobe::{
    CancelToken, ControlSession, ErrorKind, PreconditionError, ProbeError, RecorderConfig, SessionConfig, SessionState,
    SnapshotStore, StateRecorder,
};
use tempfile::tempdir;

#[test]
fn test_accumulator_bench() {
    let catalog = catalog();
    let mut session = connect(runtime(Accumulator::new(&[1, 2, 3, 4])), config());
    assert_eq!(session.state(), SessionState::Paused);

    let sequence = StateRecorder::new(&catalog, RecorderConfig::default())
        .record_state(&mut session)
        .unwrap();

    assert_eq!(sequence.trace("mod.a"), Some(vec![1, 2, 3, 4]));
    assert_eq!(sequence.trace("mod.b"), Some(vec![1, 3, 6, 10]));
    assert_eq!(sequence.trace("mod.out"), Some(vec![1, 3, 6, 10]));
    assert_eq!(session.state(), SessionState::Finished);
    assert!(session.transport().is_finished());

    // Nothing answers once the run is over.
    assert!(!session.is_alive());
    assert!(matches!(
        session.continue_(),
        Err(ProbeError::Precondition(PreconditionError::SessionFinished { .. }))
    ));
}

#[test]
fn test_recording_survives_disk() {
    let catalog = catalog();
    let mut session = connect(runtime(Accumulator::new(&[5, 5, 5])), config());
    let sequence = StateRecorder::new(&catalog, RecorderConfig::default())
        .record_state(&mut session)
        .unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("states.json");
    let store = SnapshotStore::pretty();
    store.dump_to_path(&sequence, &path).unwrap();

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json[2]["reg"]["mod.b"], 15);
    assert_eq!(json[0]["in"]["mod.a"], 5);

    assert_eq!(store.load_path(&path).unwrap(), sequence);
}

#[test]
fn test_reference_and_faulty_runs_line_up() {
    let catalog = catalog();
    let recorder = StateRecorder::new(&catalog, RecorderConfig::default());
    let inputs = [3, 1, 4, 1, 5];

    let mut good = connect(runtime(Accumulator::new(&inputs)), config());
    let reference = recorder.record_run(&mut good, "reference").unwrap();
    let mut bad = connect(runtime(Accumulator::skewed(&inputs, 2)), config());
    let candidate = recorder.record_run(&mut bad, "candidate").unwrap();

    reference.ensure_comparable(&candidate).unwrap();
    let first_divergence = reference
        .snapshots
        .iter()
        .zip(candidate.snapshots.iter())
        .position(|(a, b)| a != b);
    assert_eq!(first_divergence, Some(0));
    assert_eq!(reference.snapshots.trace("mod.b"), candidate.snapshots.trace("mod.b"));

    let dir = tempdir().unwrap();
    let store = SnapshotStore::new();
    let path = dir.path().join("candidate.run.json");
    store.dump_run(&candidate, &path).unwrap();
    let loaded = store.load_run(&path).unwrap();
    assert_eq!(loaded.label, "candidate");
    assert_eq!(loaded.id, candidate.id);
    assert_eq!(loaded, candidate);
}

#[test]
fn test_runs_of_different_length_are_reported() {
    let catalog = catalog();
    let recorder = StateRecorder::new(&catalog, RecorderConfig::default());
    let mut short = connect(runtime(Accumulator::new(&[1, 2])), config());
    let mut long = connect(runtime(Accumulator::new(&[1, 2, 3])), config());
    let a = recorder.record_run(&mut short, "short").unwrap();
    let b = recorder.record_run(&mut long, "long").unwrap();

    let err = ProbeError::from(a.ensure_comparable(&b).unwrap_err());
    assert_eq!(err.kind(), ErrorKind::PreconditionViolation);
}

#[test]
fn test_connect_retries_until_listening() {
    let rt = runtime(Accumulator::new(&[1]));
    rt.refuse_next(2);
    let mut session = ControlSession::new(rt, SessionConfig { connect_attempts: 3, ..config() }).unwrap();
    session.connect().unwrap();
    assert_eq!(session.state(), SessionState::Paused);

    let rt = runtime(Accumulator::new(&[1]));
    rt.refuse_next(10);
    let mut session = ControlSession::new(rt, SessionConfig { connect_attempts: 3, ..config() }).unwrap();
    let err = session.connect().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert!(err.is_retryable());
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(session.transport().requests().len(), 3);
}

#[test]
fn test_bounded_wait_times_out() {
    let rt = runtime(Accumulator::new(&[1, 2])).with_latency(usize::MAX);
    let mut session = connect(rt, SessionConfig { wait_timeout_ms: Some(50), ..config() });
    session.continue_().unwrap();

    let started = Instant::now();
    let err = session.wait_until_paused().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_cancel_interrupts_unbounded_wait() {
    let rt = Arc::new(runtime(Accumulator::new(&[1, 2])).with_latency(usize::MAX));
    let token = CancelToken::new();
    let cfg = SessionConfig {
        wait_timeout_ms: None,
        poll_interval_ms: 20,
        ..config()
    };
    let mut session = ControlSession::new(Arc::clone(&rt), cfg).unwrap().with_cancel(token.clone());
    session.connect().unwrap();
    session.continue_().unwrap();

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        token.cancel();
    });
    let err = session.wait_until_paused().unwrap_err();
    canceller.join().unwrap();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(!err.is_retryable());
    assert!(!rt.is_finished());
}

//! Cancellable polling waits.
//!
//! Every blocking point in a session (pause waits, exit waits and connect
//! backoff) sleeps through a [`CancelToken`], so another thread can abort a
//! stuck simulation without killing the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::error::{ControlError, ProbeResult};

/// A cloneable handle that aborts waits when cancelled.
///
/// Sleeping threads wake immediately: cancelling drops the only sender, which
/// disconnects every receiver blocked in `recv_timeout`.
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    signal: Receiver<()>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = bounded::<()>(0);
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            trigger: Arc::new(Mutex::new(Some(tx))),
            signal: rx,
        }
    }

    /// Cancels every wait sharing this token. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Ok(mut trigger) = self.trigger.lock() {
            trigger.take();
        }
    }

    /// Returns true once `cancel` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Sleeps for `duration` unless cancelled first.
    ///
    /// Returns `false` if the sleep was cut short by cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        match self.signal.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => true,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

/// How a blocking wait polls, and when it gives up.
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    /// Delay between consecutive probes.
    pub poll_interval: Duration,
    /// Total time allowed before failing with a timeout. `None` is unbounded.
    pub timeout: Option<Duration>,
    /// Optional token that aborts the wait.
    pub cancel: Option<CancelToken>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: None,
            cancel: None,
        }
    }
}

impl WaitPolicy {
    /// An unbounded policy polling at `poll_interval`.
    #[must_use]
    pub fn every(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..Self::default()
        }
    }

    /// Bounds the wait to `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Sleeps for `duration`, honoring cancellation.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Cancelled` if the token fires before or during
    /// the sleep.
    pub fn pause(&self, condition: &str, duration: Duration) -> ProbeResult<()> {
        let completed = match &self.cancel {
            Some(token) => token.sleep(duration),
            None => {
                std::thread::sleep(duration);
                true
            }
        };
        if completed {
            Ok(())
        } else {
            Err(cancelled(condition))
        }
    }

    /// Calls `probe` until it yields a value.
    ///
    /// The first probe runs immediately; later probes are spaced by
    /// `poll_interval`. A probe error aborts the wait and is returned as is.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Timeout` when the deadline passes,
    /// `ControlError::Cancelled` when the token fires, or the probe's error.
    pub fn poll_until<T, F>(&self, condition: &str, mut probe: F) -> ProbeResult<T>
    where
        F: FnMut() -> ProbeResult<Option<T>>,
    {
        let started = Instant::now();
        loop {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(cancelled(condition));
            }
            if let Some(value) = probe()? {
                return Ok(value);
            }

            let mut nap = self.poll_interval;
            if let Some(timeout) = self.timeout {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    return Err(ControlError::Timeout {
                        condition: condition.to_string(),
                        duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    }
                    .into());
                }
                nap = nap.min(timeout - elapsed);
            }
            self.pause(condition, nap)?;
        }
    }
}

fn cancelled(condition: &str) -> crate::error::ProbeError {
    ControlError::Cancelled {
        condition: condition.to_string(),
    }
    .into()
}

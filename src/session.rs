//! Control session: the client-side state machine for one remote simulation.
//!
//! ```text
//! Disconnected ──connect──► Connecting ──► Running ◄──continue/pause──► Paused
//!                                              │                          │
//!                                              └──── remote exits ────────┴──► Finished
//! ```
//!
//! Transport failures mean different things depending on the operation:
//! - during `connect` they are expected and retried with exponential backoff
//! - for commands (`continue`, breakpoints, clock mode) they are protocol
//!   violations, because the remote is known to be alive
//! - for status probes they are negative answers, never errors
//!
//! Liveness (`/status`) and pause state (`/status/simulation`) are observed
//! separately; the session only becomes `Finished` when a liveness probe
//! goes unanswered during a wait.

use std::fmt;

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::SessionConfig;
use crate::error::{ControlError, PreconditionError, ProbeError, ProbeResult};
use crate::handle::QualifiedHandle;
use crate::protocol::{BreakpointSite, ControllerRegistration, HierarchyView, IdBreakpoint, LocationBreakpoint};
use crate::transport::{body_text, Transport};
use crate::wait::{CancelToken, WaitPolicy};

const JSON: &[(&str, &str)] = &[("Content-Type", "application/json")];
const TEXT: &[(&str, &str)] = &[("Content-Type", "text/plain")];

/// Client-side view of the remote simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No successful contact yet.
    Disconnected,
    /// Probing the endpoint.
    Connecting,
    /// Executing between pauses.
    Running,
    /// Halted at a clock edge or breakpoint.
    Paused,
    /// The remote process has exited. Terminal.
    Finished,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Finished => "Finished",
        };
        f.write_str(s)
    }
}

/// Liveness and pause state observed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SimulationStatus {
    pub alive: bool,
    pub paused: bool,
}

/// How a wait for the next pause ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The simulation halted again.
    Paused,
    /// The simulation exited instead.
    Finished,
}

/// A control session over one transport.
///
/// All operations are sequential: the session is the only writer of the
/// remote's control state, so methods that change it take `&mut self`.
pub struct ControlSession<T> {
    transport: T,
    config: SessionConfig,
    state: SessionState,
    cancel: Option<CancelToken>,
}

impl<T: Transport> ControlSession<T> {
    /// Creates a disconnected session.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `config` is invalid.
    pub fn new(transport: T, config: SessionConfig) -> ProbeResult<Self> {
        Ok(Self {
            transport,
            config: config.validate()?,
            state: SessionState::Disconnected,
            cancel: None,
        })
    }

    /// Attaches a token that aborts every wait and backoff of this session.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Hierarchy prefix the design is instantiated under.
    #[must_use]
    pub fn hierarchy_prefix(&self) -> Option<&str> {
        self.config.hierarchy_prefix.as_deref()
    }

    /// Wait policy derived from the config and the session's cancel token.
    #[must_use]
    pub fn wait_policy(&self) -> WaitPolicy {
        self.config.wait_policy(self.cancel.clone())
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!("session {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn ensure_live(&self, action: &str) -> Result<(), PreconditionError> {
        match self.state {
            SessionState::Running | SessionState::Paused => Ok(()),
            SessionState::Finished => Err(PreconditionError::SessionFinished {
                action: action.to_string(),
            }),
            SessionState::Disconnected | SessionState::Connecting => Err(PreconditionError::NotConnected {
                action: action.to_string(),
            }),
        }
    }

    /// Sends a command that must succeed on a live remote.
    fn command(&mut self, path: &str, headers: &[(&str, &str)], body: Option<&[u8]>, action: &str) -> ProbeResult<()> {
        self.ensure_live(action)?;
        debug!("POST {path}");
        match self.transport.post(path, headers, body) {
            Some(_) => Ok(()),
            None => Err(ProbeError::protocol(action)),
        }
    }

    /// Sends a DELETE that must succeed on a live remote.
    fn remove(&mut self, path: &str, action: &str) -> ProbeResult<()> {
        self.ensure_live(action)?;
        debug!("DELETE {path}");
        match self.transport.delete(path) {
            Some(_) => Ok(()),
            None => Err(ProbeError::protocol(action)),
        }
    }

    /// Raw GET used by the value resolver. `None` once finished.
    pub(crate) fn fetch(&self, path: &str) -> Option<Vec<u8>> {
        if self.state == SessionState::Finished {
            return None;
        }
        self.transport.get(path, &[])
    }

    /// Raw GET with a JSON body. `None` once finished.
    pub(crate) fn fetch_with_body(&self, path: &str, body: &[u8]) -> Option<Vec<u8>> {
        if self.state == SessionState::Finished {
            return None;
        }
        self.transport.get_with_body(path, JSON, body)
    }

    fn fetch_json<D: serde::de::DeserializeOwned>(&self, path: &str) -> Option<D> {
        let body = self.fetch(path)?;
        decode(path, &body)
    }

    fn qualify(&self, name: &str) -> ProbeResult<QualifiedHandle> {
        Ok(QualifiedHandle::qualify(self.hierarchy_prefix(), name)?)
    }

    fn probe_paused(&self) -> Option<bool> {
        let body = self.transport.get("/status/simulation", &[])?;
        let text = body_text(&body)?;
        if text != "Paused" && text != "Running" {
            warn!("unexpected simulation status '{text}'");
        }
        Some(text == "Paused")
    }

    /// Probes the endpoint until it answers.
    ///
    /// Up to `connect_attempts` liveness probes are issued. After each failed
    /// probe except the last the session sleeps, starting at
    /// `connect_base_delay_ms` and doubling every time.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::ConnectExhausted` if no probe is answered,
    /// `ControlError::Cancelled` if the session's token fires during backoff,
    /// and `PreconditionError::SessionFinished` on a finished session.
    pub fn connect(&mut self) -> ProbeResult<()> {
        if self.state == SessionState::Finished {
            return Err(PreconditionError::SessionFinished {
                action: "connect".to_string(),
            }
            .into());
        }
        self.transition(SessionState::Connecting);

        let attempts = self.config.connect_attempts;
        let policy = self.wait_policy();
        let mut delay = self.config.connect_base_delay();
        for attempt in 1..=attempts {
            if self.transport.get("/status", &[]).is_some() {
                info!("connected to {} (attempt {attempt})", self.transport.endpoint());
                let paused = self.probe_paused().unwrap_or(false);
                self.transition(if paused { SessionState::Paused } else { SessionState::Running });
                return Ok(());
            }
            warn!(
                "connect attempt {attempt}/{attempts} to {} failed",
                self.transport.endpoint()
            );
            if attempt < attempts {
                if let Err(err) = policy.pause("connect", delay) {
                    self.transition(SessionState::Disconnected);
                    return Err(err);
                }
                delay = delay.saturating_mul(2);
            }
        }

        self.transition(SessionState::Disconnected);
        Err(ControlError::ConnectExhausted {
            endpoint: self.transport.endpoint(),
            attempts,
        }
        .into())
    }

    /// Announces this controller to the runtime (`POST /connect`).
    ///
    /// The runtime accepts [`ControllerRegistration::client_only`] as is.
    /// Any other address must also name a callback port and a debug
    /// database, which the runtime then loads.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation if the runtime refuses, which it does
    /// for an incomplete registration.
    pub fn register_controller(&mut self, registration: &ControllerRegistration) -> ProbeResult<()> {
        if !registration.is_complete() {
            warn!("registering {} without port and database; the runtime will refuse", registration.ip);
        }
        let body = encode(registration)?;
        self.command("/connect", JSON, Some(&body), "register controller")
    }

    /// Resumes execution until the next pause.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation if the runtime does not acknowledge.
    pub fn continue_(&mut self) -> ProbeResult<()> {
        self.command("/continue", &[], None, "continue")?;
        self.transition(SessionState::Running);
        Ok(())
    }

    /// Resumes execution until the next statement.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation if the runtime does not acknowledge.
    pub fn step_over(&mut self) -> ProbeResult<()> {
        self.command("/step_over", &[], None, "step over")?;
        self.transition(SessionState::Running);
        Ok(())
    }

    /// Asks the simulator to finish. Use [`wait_until_finished`](Self::wait_until_finished)
    /// to observe the exit.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation if the runtime does not acknowledge.
    pub fn stop(&mut self) -> ProbeResult<()> {
        self.command("/stop", &[], None, "stop")?;
        self.transition(SessionState::Running);
        Ok(())
    }

    /// Enables or disables pausing at every clock edge.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation if the runtime does not acknowledge.
    pub fn set_pause_on_clock(&mut self, enabled: bool) -> ProbeResult<()> {
        let path = if enabled { "/clock/on" } else { "/clock/off" };
        self.command(path, &[], None, "pause on clock edge")
    }

    /// Registers a source breakpoint.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation if the runtime rejects the breakpoint.
    pub fn insert_breakpoint(&mut self, filename: &str, line_num: u32) -> ProbeResult<()> {
        let body = encode(&LocationBreakpoint {
            filename: filename.to_string(),
            line_num,
        })?;
        self.command("/breakpoint", JSON, Some(&body), "insert breakpoint")
    }

    /// Arms a breakpoint site by its debug-database id, optionally guarded
    /// by a condition expression.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation if the runtime does not know the id.
    pub fn insert_breakpoint_id(&mut self, id: u32, condition: Option<&str>) -> ProbeResult<()> {
        let body = encode(&IdBreakpoint {
            id,
            expr: condition.map(str::to_string),
        })?;
        self.command("/breakpoint", JSON, Some(&body), "insert breakpoint")
    }

    /// Disarms one breakpoint by id.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation if the runtime does not acknowledge.
    pub fn remove_breakpoint(&mut self, id: u32) -> ProbeResult<()> {
        self.remove(&format!("/breakpoint/{id}"), "remove breakpoint")
    }

    /// Disarms every breakpoint in one source file.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation if the runtime does not acknowledge.
    pub fn remove_file_breakpoints(&mut self, filename: &str) -> ProbeResult<()> {
        self.remove(&format!("/breakpoint/file/{filename}"), "remove file breakpoints")
    }

    /// Removes every breakpoint.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation if the runtime does not acknowledge.
    pub fn clear_breakpoints(&mut self) -> ProbeResult<()> {
        self.remove("/breakpoint", "clear breakpoints")
    }

    /// Breakpoint sites the debug database knows at `filename:line_num`.
    ///
    /// `None` if the location is malformed or the runtime does not answer.
    #[must_use]
    pub fn breakpoints_at(&self, filename: &str, line_num: u32) -> Option<Vec<BreakpointSite>> {
        self.fetch_json(&format!("/breakpoint/{filename}:{line_num}"))
    }

    /// Source files of the loaded debug database.
    #[must_use]
    pub fn source_files(&self) -> Option<Vec<String>> {
        self.fetch_json("/files")
    }

    /// Variables in scope at a source location, as the runtime reports them.
    #[must_use]
    pub fn context(&self, filename: &str, line_num: u32) -> Option<serde_json::Value> {
        self.fetch_json(&format!("/context/{filename}:{line_num}"))
    }

    /// Children of `scope` in the design hierarchy. `None` lists the roots.
    ///
    /// Needs a debug database; `None` without one.
    #[must_use]
    pub fn hierarchy(&self, scope: Option<&str>) -> Option<HierarchyView> {
        if self.state == SessionState::Finished {
            return None;
        }
        let path = format!("/hierarchy/{}", scope.unwrap_or("$"));
        let body = self.transport.post(&path, &[], None)?;
        decode(&path, &body)
    }

    /// Signals driving `name`, from the debug database.
    #[must_use]
    pub fn connections_to(&self, name: &str) -> Option<serde_json::Value> {
        let handle = QualifiedHandle::qualify(self.hierarchy_prefix(), name).ok()?;
        self.fetch_json(&format!("/connection/to/{handle}"))
    }

    /// Signals driven by `name`, from the debug database.
    #[must_use]
    pub fn connections_from(&self, name: &str) -> Option<serde_json::Value> {
        let handle = QualifiedHandle::qualify(self.hierarchy_prefix(), name).ok()?;
        self.fetch_json(&format!("/connection/from/{handle}"))
    }

    /// Starts a value monitor on a signal.
    ///
    /// # Errors
    ///
    /// Returns `DataError::InvalidSignalName` for an unroutable name and a
    /// protocol violation if the runtime cannot read the signal.
    pub fn add_monitor(&mut self, name: &str) -> ProbeResult<()> {
        let handle = self.qualify(name)?;
        self.command(&format!("/monitor/{handle}"), &[], None, "add monitor")
    }

    /// Stops the value monitor on a signal.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation if no monitor is active on the signal.
    pub fn remove_monitor(&mut self, name: &str) -> ProbeResult<()> {
        let handle = self.qualify(name)?;
        self.remove(&format!("/monitor/{handle}"), "remove monitor")
    }

    /// Stops every value monitor.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation if the runtime does not acknowledge.
    pub fn clear_monitors(&mut self) -> ProbeResult<()> {
        self.remove("/monitor", "clear monitors")
    }

    /// Tells the runtime which top-level name the design lives under.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation if the runtime does not acknowledge.
    pub fn set_top_name(&mut self, name: &str) -> ProbeResult<()> {
        self.command("/top_name", TEXT, Some(name.as_bytes()), "set top name")
    }

    /// Current simulation time, or `None` if unavailable.
    #[must_use]
    pub fn simulation_time(&self) -> Option<u64> {
        let body = self.fetch("/time")?;
        body_text(&body)?.parse().ok()
    }

    /// Single status probe. Any transport failure reads as "not paused".
    pub fn is_paused(&mut self) -> bool {
        if self.state == SessionState::Finished {
            return false;
        }
        let Some(paused) = self.probe_paused() else {
            return false;
        };
        if matches!(self.state, SessionState::Running | SessionState::Paused) {
            self.transition(if paused { SessionState::Paused } else { SessionState::Running });
        }
        paused
    }

    /// Single liveness probe.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state != SessionState::Finished && self.transport.get("/status", &[]).is_some()
    }

    /// Observes pause state and liveness. A paused simulation is alive.
    pub fn observe(&mut self) -> SimulationStatus {
        let paused = self.is_paused();
        let alive = paused || self.is_alive();
        SimulationStatus { alive, paused }
    }

    /// Blocks until the simulation reports paused, using the session policy.
    ///
    /// # Errors
    ///
    /// Returns a timeout or cancellation error from the wait policy.
    pub fn wait_until_paused(&mut self) -> ProbeResult<()> {
        let policy = self.wait_policy();
        self.wait_until_paused_with(&policy)
    }

    /// Blocks until the simulation reports paused.
    ///
    /// # Errors
    ///
    /// Returns a timeout or cancellation error from `policy`.
    pub fn wait_until_paused_with(&mut self, policy: &WaitPolicy) -> ProbeResult<()> {
        self.ensure_live("wait for pause")?;
        policy.poll_until("pause", || Ok(self.is_paused().then_some(())))
    }

    /// Blocks until the remote stops answering, using the session policy.
    ///
    /// # Errors
    ///
    /// Returns a timeout or cancellation error from the wait policy.
    pub fn wait_until_finished(&mut self) -> ProbeResult<()> {
        let policy = self.wait_policy();
        self.wait_until_finished_with(&policy)
    }

    /// Blocks until a liveness probe goes unanswered, then marks the
    /// session `Finished`. Unavailability is not retried here: it is the
    /// termination signal.
    ///
    /// # Errors
    ///
    /// Returns a timeout or cancellation error from `policy`.
    pub fn wait_until_finished_with(&mut self, policy: &WaitPolicy) -> ProbeResult<()> {
        if self.state == SessionState::Finished {
            return Ok(());
        }
        policy.poll_until("simulation exit", || Ok((!self.is_alive()).then_some(())))?;
        info!("simulation at {} finished", self.transport.endpoint());
        self.transition(SessionState::Finished);
        Ok(())
    }

    /// Blocks until the simulation either pauses again or exits.
    ///
    /// # Errors
    ///
    /// Returns a timeout or cancellation error from `policy`.
    pub fn wait_for_pause_or_exit(&mut self, policy: &WaitPolicy) -> ProbeResult<PollOutcome> {
        self.ensure_live("wait for pause")?;
        let outcome = policy.poll_until("pause or exit", || {
            let status = self.observe();
            Ok(if status.paused {
                Some(PollOutcome::Paused)
            } else if status.alive {
                None
            } else {
                Some(PollOutcome::Finished)
            })
        })?;
        if outcome == PollOutcome::Finished {
            info!("simulation at {} finished", self.transport.endpoint());
            self.transition(SessionState::Finished);
        }
        Ok(outcome)
    }
}

fn encode<S: Serialize>(request: &S) -> ProbeResult<Vec<u8>> {
    serde_json::to_vec(request).map_err(|e| ProbeError::protocol(e.to_string()))
}

fn decode<D: serde::de::DeserializeOwned>(path: &str, body: &[u8]) -> Option<D> {
    match serde_json::from_slice(body) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!("malformed reply to {path}: {err}");
            None
        }
    }
}

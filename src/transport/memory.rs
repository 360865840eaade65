//! In-process simulation runtime.
//!
//! [`InMemoryRuntime`] answers the same routes as the native runtime, backed
//! by a [`ClockedModel`]. It is intended for tests and for embedding a
//! software model behind the control protocol.
//!
//! Behavior mirrors the native runtime:
//! - the simulation starts paused, before the first clock edge
//! - `/continue` with pause-on-clock runs to the next edge, otherwise to the end
//! - once the model finishes, every route stops answering
//! - routes that need a debug database (`/files`, `/hierarchy`, `/context`,
//!   `/connection`) only answer after a full `/connect` registration

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use super::{Headers, Transport};
use crate::protocol::{
    BreakpointSite, ControllerRegistration, HierarchyView, IdBreakpoint, LocationBreakpoint, ValueEntry,
};

/// A design model advanced one clock edge at a time.
pub trait ClockedModel: Send {
    /// Reads a signal by its path below the top-level instance.
    fn value(&self, path: &str) -> Option<u64>;

    /// Advances to the next clock edge.
    ///
    /// Returns `false` once the test bench has finished; the model is not
    /// ticked again afterwards.
    fn tick(&mut self) -> bool;

    /// Every signal path below the top-level instance, for hierarchy queries.
    fn signals(&self) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Pause,
    Exit,
}

#[derive(Debug)]
struct Pending {
    remaining: usize,
    transition: Transition,
}

struct RuntimeState<M> {
    model: M,
    top: String,
    paused: bool,
    finished: bool,
    pause_on_clock: bool,
    pending: Option<Pending>,
    time: u64,
    /// Breakpoint sites by id, as a debug database would number them.
    sites: BTreeMap<u32, (String, u32)>,
    /// Armed breakpoint ids with their optional condition.
    armed: BTreeMap<u32, Option<String>>,
    monitors: BTreeSet<String>,
    source_files: Vec<String>,
    controller: Option<ControllerRegistration>,
    offline: bool,
    refuse_remaining: usize,
    requests: Vec<String>,
}

impl<M: ClockedModel> RuntimeState<M> {
    /// Applies a pending transition once its latency has elapsed.
    fn settle(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        if pending.remaining > 0 {
            pending.remaining -= 1;
            return;
        }
        match pending.transition {
            Transition::Pause => self.paused = true,
            Transition::Exit => self.finished = true,
        }
        self.pending = None;
    }

    fn resume(&mut self, latency: usize, until_next_edge: bool) {
        self.paused = false;
        let transition = if until_next_edge {
            if self.model.tick() {
                self.time += 1;
                Transition::Pause
            } else {
                Transition::Exit
            }
        } else {
            while self.model.tick() {
                self.time += 1;
            }
            Transition::Exit
        };
        self.pending = Some(Pending {
            remaining: latency,
            transition,
        });
    }

    fn value(&self, handle: &str) -> Option<u64> {
        if self.top.is_empty() {
            return self.model.value(handle);
        }
        let local = handle.strip_prefix(self.top.as_str())?.strip_prefix('.')?;
        self.model.value(local)
    }

    fn has_database(&self) -> bool {
        self.controller.as_ref().is_some_and(|c| !c.is_client_only())
    }

    fn site_at(&self, filename: &str, line: u32) -> Vec<u32> {
        self.sites
            .iter()
            .filter(|(_, (f, l))| f == filename && *l == line)
            .map(|(id, _)| *id)
            .collect()
    }

    fn arm_location(&mut self, filename: String, line: u32) {
        let id = match self.site_at(&filename, line).first() {
            Some(id) => *id,
            None => {
                let id = self.sites.keys().next_back().map_or(1, |last| last + 1);
                self.sites.insert(id, (filename, line));
                id
            }
        };
        self.armed.insert(id, None);
    }

    fn post_breakpoint(&mut self, body: &[u8]) -> Option<()> {
        if let Ok(bp) = serde_json::from_slice::<LocationBreakpoint>(body) {
            self.arm_location(bp.filename, bp.line_num);
            return Some(());
        }
        let bp: IdBreakpoint = serde_json::from_slice(body).ok()?;
        if !self.sites.contains_key(&bp.id) {
            return None;
        }
        self.armed.insert(bp.id, bp.expr);
        Some(())
    }

    fn breakpoint_sites(&self, location: &str) -> Option<Vec<u8>> {
        let (filename, line) = split_location(location)?;
        let sites: Vec<BreakpointSite> = self
            .site_at(filename, line)
            .into_iter()
            .map(|id| BreakpointSite { id, col: 0 })
            .collect();
        serde_json::to_vec(&sites).ok()
    }

    fn values(&self, body: &[u8]) -> Option<Vec<u8>> {
        let names: Vec<String> = serde_json::from_slice(body).ok()?;
        let entries: Vec<ValueEntry> = names
            .into_iter()
            .map(|name| {
                let value = self.value(&name).map_or_else(|| "ERROR".to_string(), |v| v.to_string());
                ValueEntry { name, value }
            })
            .collect();
        serde_json::to_vec(&entries).ok()
    }

    fn hierarchy(&self, scope: &str) -> Option<Vec<u8>> {
        let handles: Vec<String> = self
            .model
            .signals()
            .into_iter()
            .map(|s| if self.top.is_empty() { s } else { format!("{}.{s}", self.top) })
            .collect();
        let mut children = BTreeSet::new();
        for handle in &handles {
            if scope == "$" {
                if let Some(first) = handle.split('.').next() {
                    children.insert(first.to_string());
                }
            } else if let Some(rest) = handle.strip_prefix(scope).and_then(|r| r.strip_prefix('.')) {
                if let Some(child) = rest.split('.').next() {
                    children.insert(format!("{scope}.{child}"));
                }
            }
        }
        let view = HierarchyView {
            name: children.into_iter().collect(),
            value: None,
        };
        serde_json::to_vec(&view).ok()
    }
}

fn split_location(location: &str) -> Option<(&str, u32)> {
    let (filename, line) = location.rsplit_once(':')?;
    Some((filename, line.parse().ok()?))
}

/// Transport backed by an in-process [`ClockedModel`].
pub struct InMemoryRuntime<M> {
    state: Mutex<RuntimeState<M>>,
    latency: usize,
}

impl<M: ClockedModel> InMemoryRuntime<M> {
    /// Creates a paused runtime whose design is instantiated under `top`.
    ///
    /// Pass an empty `top` to address signals without a prefix.
    pub fn new(top: impl Into<String>, model: M) -> Self {
        Self {
            state: Mutex::new(RuntimeState {
                model,
                top: top.into(),
                paused: true,
                finished: false,
                pause_on_clock: false,
                pending: None,
                time: 0,
                sites: BTreeMap::new(),
                armed: BTreeMap::new(),
                monitors: BTreeSet::new(),
                source_files: Vec::new(),
                controller: None,
                offline: false,
                refuse_remaining: 0,
                requests: Vec::new(),
            }),
            latency: 0,
        }
    }

    /// Number of status probes that still report "running" after a resume.
    #[must_use]
    pub fn with_latency(mut self, polls: usize) -> Self {
        self.latency = polls;
        self
    }

    /// Source files listed by `/files` once a debug database is registered.
    #[must_use]
    pub fn with_source_files(self, files: &[&str]) -> Self {
        self.with_state(|s| s.source_files = files.iter().map(ToString::to_string).collect());
        self
    }

    /// Refuses the next `count` requests as if the port were not open yet.
    pub fn refuse_next(&self, count: usize) {
        self.with_state(|s| s.refuse_remaining = count);
    }

    /// Takes the runtime on or offline without changing simulation state.
    pub fn set_offline(&self, offline: bool) {
        self.with_state(|s| s.offline = offline);
    }

    /// True once the model has finished and the runtime stopped answering.
    pub fn is_finished(&self) -> bool {
        self.with_state(|s| s.finished)
    }

    /// Whether pause-on-clock is currently enabled.
    pub fn pause_on_clock(&self) -> bool {
        self.with_state(|s| s.pause_on_clock)
    }

    /// Armed breakpoints as `(file, line)`, in id order.
    pub fn breakpoints(&self) -> Vec<(String, u32)> {
        self.with_state(|s| s.armed.keys().filter_map(|id| s.sites.get(id).cloned()).collect())
    }

    /// Condition attached to an armed breakpoint.
    pub fn breakpoint_condition(&self, id: u32) -> Option<String> {
        self.with_state(|s| s.armed.get(&id).cloned().flatten())
    }

    /// Handles with an active value monitor.
    pub fn monitors(&self) -> Vec<String> {
        self.with_state(|s| s.monitors.iter().cloned().collect())
    }

    /// Address announced via `/connect`.
    pub fn controller(&self) -> Option<String> {
        self.with_state(|s| s.controller.as_ref().map(|c| c.ip.clone()))
    }

    /// Full registration received via `/connect`.
    pub fn registration(&self) -> Option<ControllerRegistration> {
        self.with_state(|s| s.controller.clone())
    }

    /// Every request received, as `"METHOD /path"`.
    pub fn requests(&self) -> Vec<String> {
        self.with_state(|s| s.requests.clone())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut RuntimeState<M>) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn handle(&self, method: &str, path: &str, body: Option<&[u8]>) -> Option<Vec<u8>> {
        let latency = self.latency;
        self.with_state(|s| {
            s.requests.push(format!("{method} {path}"));
            if s.offline {
                return None;
            }
            if s.refuse_remaining > 0 {
                s.refuse_remaining -= 1;
                return None;
            }
            if path == "/status" || path == "/status/simulation" {
                s.settle();
            }
            if s.finished {
                return None;
            }

            let okay = || Some(b"Okay".to_vec());
            match (method, path) {
                ("GET", "/status") => {
                    let text: &[u8] = if s.has_database() { b"Connected" } else { b"Disconnected" };
                    Some(text.to_vec())
                }
                ("GET", "/status/simulation") => {
                    let text: &[u8] = if s.paused { b"Paused" } else { b"Running" };
                    Some(text.to_vec())
                }
                ("GET", "/time") => Some(s.time.to_string().into_bytes()),
                ("GET", "/values") => s.values(body?),
                ("GET", "/files") => {
                    if !s.has_database() {
                        return None;
                    }
                    serde_json::to_vec(&s.source_files).ok()
                }
                ("GET", p) => {
                    if let Some(handle) = p.strip_prefix("/value/") {
                        s.value(handle).map(|v| v.to_string().into_bytes())
                    } else if let Some(location) = p.strip_prefix("/breakpoint/") {
                        s.breakpoint_sites(location)
                    } else if let Some(location) = p.strip_prefix("/context/") {
                        split_location(location)?;
                        Some(b"[]".to_vec())
                    } else if p.starts_with("/connection/to/") || p.starts_with("/connection/from/") {
                        s.has_database().then(|| b"[]".to_vec())
                    } else {
                        None
                    }
                }
                ("POST", "/continue") => {
                    let until_next_edge = s.pause_on_clock;
                    s.resume(latency, until_next_edge);
                    okay()
                }
                ("POST", "/step_over") => {
                    s.resume(latency, true);
                    okay()
                }
                ("POST", "/stop") => {
                    s.paused = false;
                    s.pending = Some(Pending {
                        remaining: latency,
                        transition: Transition::Exit,
                    });
                    okay()
                }
                ("POST", "/clock/on") => {
                    s.pause_on_clock = true;
                    okay()
                }
                ("POST", "/clock/off") => {
                    s.pause_on_clock = false;
                    okay()
                }
                ("POST", "/breakpoint") => {
                    s.post_breakpoint(body?)?;
                    okay()
                }
                ("POST", "/connect") => {
                    let registration: ControllerRegistration = serde_json::from_slice(body?).ok()?;
                    if !registration.is_complete() {
                        return None;
                    }
                    s.controller = Some(registration);
                    okay()
                }
                ("POST", "/top_name") => {
                    s.top = String::from_utf8(body?.to_vec()).ok()?;
                    okay()
                }
                ("POST", p) => {
                    if let Some(handle) = p.strip_prefix("/monitor/") {
                        s.value(handle)?;
                        s.monitors.insert(handle.to_string());
                        okay()
                    } else if let Some(scope) = p.strip_prefix("/hierarchy/") {
                        if !s.has_database() {
                            return None;
                        }
                        s.hierarchy(scope)
                    } else {
                        None
                    }
                }
                ("DELETE", "/breakpoint") => {
                    s.armed.clear();
                    okay()
                }
                ("DELETE", "/monitor") => {
                    s.monitors.clear();
                    okay()
                }
                ("DELETE", p) => {
                    if let Some(filename) = p.strip_prefix("/breakpoint/file/") {
                        let ids: Vec<u32> = s
                            .sites
                            .iter()
                            .filter(|(_, (f, _))| f == filename)
                            .map(|(id, _)| *id)
                            .collect();
                        for id in ids {
                            s.armed.remove(&id);
                        }
                        okay()
                    } else if let Some(id) = p.strip_prefix("/breakpoint/") {
                        let id: u32 = id.parse().ok()?;
                        s.armed.remove(&id);
                        okay()
                    } else if let Some(handle) = p.strip_prefix("/monitor/") {
                        s.monitors.remove(handle).then(|| b"Okay".to_vec())
                    } else {
                        None
                    }
                }
                _ => None,
            }
        })
    }
}

impl<M: ClockedModel> Transport for InMemoryRuntime<M> {
    fn get(&self, path: &str, _headers: Headers<'_>) -> Option<Vec<u8>> {
        self.handle("GET", path, None)
    }

    fn get_with_body(&self, path: &str, _headers: Headers<'_>, body: &[u8]) -> Option<Vec<u8>> {
        self.handle("GET", path, Some(body))
    }

    fn post(&self, path: &str, _headers: Headers<'_>, body: Option<&[u8]>) -> Option<Vec<u8>> {
        self.handle("POST", path, body)
    }

    fn delete(&self, path: &str) -> Option<Vec<u8>> {
        self.handle("DELETE", path, None)
    }

    fn endpoint(&self) -> String {
        "memory".to_string()
    }
}

//! Shared fixtures for unit tests.

use crate::catalog::{Port, SignalCatalog};
use crate::config::SessionConfig;
use crate::session::ControlSession;
use crate::transport::{ClockedModel, InMemoryRuntime};

/// `b += a` on every rising edge, with `a` driven from a fixed script.
pub struct Accumulator {
    inputs: Vec<u64>,
    cycle: usize,
    a: u64,
    b: u64,
}

impl Accumulator {
    pub fn new(inputs: &[u64]) -> Self {
        Self {
            inputs: inputs.to_vec(),
            cycle: 0,
            a: 0,
            b: 0,
        }
    }
}

impl ClockedModel for Accumulator {
    fn value(&self, path: &str) -> Option<u64> {
        match path {
            "mod.a" => Some(self.a),
            "mod.b" | "mod.out" => Some(self.b),
            _ => None,
        }
    }

    fn tick(&mut self) -> bool {
        let Some(&a) = self.inputs.get(self.cycle) else {
            return false;
        };
        self.a = a;
        self.b += a;
        self.cycle += 1;
        true
    }

    fn signals(&self) -> Vec<String> {
        ["mod.a", "mod.b", "mod.out"].iter().map(ToString::to_string).collect()
    }
}

pub fn accumulator_catalog() -> SignalCatalog {
    SignalCatalog::new(
        vec!["mod.b".to_string()],
        vec![Port::input("mod.a"), Port::output("mod.out")],
    )
    .unwrap()
}

pub fn fast_config() -> SessionConfig {
    SessionConfig {
        hierarchy_prefix: Some("TOP".to_string()),
        connect_base_delay_ms: 1,
        poll_interval_ms: 1,
        wait_timeout_ms: Some(2_000),
        ..SessionConfig::default()
    }
}

pub type Runtime = InMemoryRuntime<Accumulator>;

pub fn runtime(inputs: &[u64]) -> Runtime {
    InMemoryRuntime::new("TOP", Accumulator::new(inputs))
}

pub fn connected(runtime: Runtime) -> ControlSession<Runtime> {
    let mut session = ControlSession::new(runtime, fast_config()).unwrap();
    session.connect().unwrap();
    session
}

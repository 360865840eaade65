//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use simprobe::{ClockedModel, ControlSession, InMemoryRuntime, Port, SessionConfig, SignalCatalog, Transport};

/// `b += a` on every clock edge, `a` driven from a script. `out` mirrors `b`
/// unless `skew` is set, in which case it lags by the skew amount.
pub struct Accumulator {
    inputs: Vec<u64>,
    cycle: usize,
    a: u64,
    b: u64,
    skew: u64,
}

impl Accumulator {
    pub fn new(inputs: &[u64]) -> Self {
        Self {
            inputs: inputs.to_vec(),
            cycle: 0,
            a: 0,
            b: 0,
            skew: 0,
        }
    }

    /// A faulty variant whose output is off by `skew`.
    pub fn skewed(inputs: &[u64], skew: u64) -> Self {
        Self {
            skew,
            ..Self::new(inputs)
        }
    }
}

impl ClockedModel for Accumulator {
    fn value(&self, path: &str) -> Option<u64> {
        match path {
            "mod.a" => Some(self.a),
            "mod.b" => Some(self.b),
            "mod.out" => Some(self.b.saturating_sub(self.skew)),
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
}

pub const CATALOG_JSON: &str = r#"{
    "registers": ["mod.b"],
    "ports": [
        {"name": "mod.a", "direction": "input"},
        {"name": "mod.out", "direction": "output"}
    ]
}"#;

pub fn catalog() -> SignalCatalog {
    let catalog = SignalCatalog::from_json_str(CATALOG_JSON).unwrap();
    assert_eq!(catalog.ports()[0], Port::input("mod.a"));
    catalog
}

pub fn config() -> SessionConfig {
    SessionConfig {
        connect_base_delay_ms: 1,
        poll_interval_ms: 1,
        wait_timeout_ms: Some(5_000),
        ..SessionConfig::new("memory").with_prefix("TOP")
    }
}

pub fn runtime(model: Accumulator) -> InMemoryRuntime<Accumulator> {
    InMemoryRuntime::new("TOP", model)
}

pub fn connect<T: Transport>(transport: T, config: SessionConfig) -> ControlSession<T> {
    let mut session = ControlSession::new(transport, config).unwrap();
    session.connect().unwrap();
    session
}

//! Request and response bodies of the runtime's JSON routes.
//!
//! Shared by the control session, which encodes requests and decodes
//! replies, and by the in-process runtime, which does the opposite.

use serde::{Deserialize, Serialize};

/// Address the runtime accepts as "client only": no callback server and no
/// debug database.
pub const CLIENT_ONLY_IP: &str = "255.255.255.255";

/// Body of `POST /connect`.
///
/// A full registration names the controller's callback `port` and the debug
/// `database` the runtime should load. `src_path`/`dst_path` rewrite the
/// database path when the controller and the simulator see different file
/// systems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerRegistration {
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_path: Option<String>,
}

impl ControllerRegistration {
    /// Registers a controller that only issues requests.
    #[must_use]
    pub fn client_only() -> Self {
        Self {
            ip: CLIENT_ONLY_IP.to_string(),
            port: None,
            database: None,
            src_path: None,
            dst_path: None,
        }
    }

    /// Registers a controller listening at `ip:port` with a debug database.
    #[must_use]
    pub fn new(ip: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            port: Some(port),
            database: Some(database.into()),
            src_path: None,
            dst_path: None,
        }
    }

    /// Rewrites the `src` prefix of the database path to `dst` on the runtime side.
    #[must_use]
    pub fn with_path_mapping(mut self, src: impl Into<String>, dst: impl Into<String>) -> Self {
        self.src_path = Some(src.into());
        self.dst_path = Some(dst.into());
        self
    }

    /// True if the runtime accepts this registration without a database.
    #[must_use]
    pub fn is_client_only(&self) -> bool {
        self.ip == CLIENT_ONLY_IP
    }

    /// True if the runtime has everything it needs for a full registration.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.is_client_only() || (self.port.is_some() && self.database.is_some())
    }
}

/// Body of `POST /breakpoint` addressing a source location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationBreakpoint {
    pub filename: String,
    pub line_num: u32,
}

/// Body of `POST /breakpoint` arming a breakpoint by database id, with an
/// optional condition expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdBreakpoint {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
}

/// One breakpoint site returned by `GET /breakpoint/{file}:{line}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointSite {
    pub id: u32,
    pub col: u32,
}

/// One entry of a `GET /values` reply. Unreadable signals carry `"ERROR"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueEntry {
    pub name: String,
    pub value: String,
}

/// Reply of `POST /hierarchy/{scope}`.
///
/// `value` is only present while the simulation is paused on a clock edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyView {
    pub name: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

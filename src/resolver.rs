//! Signal value resolution.
//!
//! Single lookups are lenient and return `None` for anything that is not a
//! non-negative integer. Aggregate lookups are all-or-nothing: one missing
//! value fails the whole call and no partial map escapes.

use std::collections::HashMap;

use log::debug;

use crate::catalog::SignalCatalog;
use crate::error::{DataError, ProbeResult};
use crate::handle::QualifiedHandle;
use crate::protocol::ValueEntry;
use crate::session::ControlSession;
use crate::snapshot::ValueMap;
use crate::transport::{body_text, Transport};

/// Parses a runtime value response.
///
/// Accepts a decimal non-negative integer, surrounding whitespace allowed.
/// Empty text, `null`, unknown bits (`x`/`z`) and negative numbers are "no value".
///
/// The native runtime reads values as a 32-bit `vpiIntVal` and prints them
/// signed, so a register with its top bit set arrives as e.g. `-1`. Such a
/// value is treated as absent: a lenient read returns `None` and an
/// aggregate read (and with it `record_state`) fails with
/// `DataError::MissingValue`.
#[must_use]
pub fn parse_value(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("null") {
        return None;
    }
    text.parse::<u64>().ok()
}

/// Resolves local signal names against a session.
pub struct ValueResolver<'s, T> {
    session: &'s ControlSession<T>,
}

impl<'s, T: Transport> ValueResolver<'s, T> {
    #[must_use]
    pub const fn new(session: &'s ControlSession<T>) -> Self {
        Self { session }
    }

    /// Qualifies a local name with the session's hierarchy prefix.
    ///
    /// # Errors
    ///
    /// Returns `DataError::InvalidSignalName` if the name cannot be routed.
    pub fn handle(&self, local: &str) -> Result<QualifiedHandle, DataError> {
        QualifiedHandle::qualify(self.session.hierarchy_prefix(), local)
    }

    /// Reads one value. Absent, malformed or unroutable names yield `None`.
    #[must_use]
    pub fn get_value(&self, local: &str) -> Option<u64> {
        let handle = match self.handle(local) {
            Ok(handle) => handle,
            Err(err) => {
                debug!("{err}");
                return None;
            }
        };
        let body = self.session.fetch(&handle.value_path())?;
        let value = body_text(&body).and_then(parse_value);
        if value.is_none() {
            debug!("no numeric value for {handle}");
        }
        value
    }

    /// Reads many handles with one `GET /values`.
    ///
    /// Returns `None` if the runtime does not answer the bulk route, so the
    /// caller can fall back to single reads. Unroutable names are left out
    /// of the request and read as absent.
    fn fetch_bulk<S: AsRef<str>>(&self, names: &[S]) -> Option<HashMap<String, Option<u64>>> {
        let handles: Vec<String> = names
            .iter()
            .filter_map(|name| self.handle(name.as_ref()).ok())
            .map(|handle| handle.to_string())
            .collect();
        if handles.is_empty() {
            return None;
        }
        let body = serde_json::to_vec(&handles).ok()?;
        let reply = self.session.fetch_with_body("/values", &body)?;
        let entries: Vec<ValueEntry> = match serde_json::from_slice(&reply) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("malformed /values reply: {err}");
                return None;
            }
        };
        Some(
            entries
                .into_iter()
                .map(|entry| {
                    let value = parse_value(&entry.value);
                    (entry.name, value)
                })
                .collect(),
        )
    }

    /// Reads every name in order.
    ///
    /// All values are fetched in one bulk request when the runtime supports
    /// it, otherwise one request per name.
    ///
    /// With `fault_on_missing` any absent value fails the call, naming the
    /// signal. Without it absent values are left out of the map.
    ///
    /// # Errors
    ///
    /// Returns `DataError::MissingValue` or `DataError::InvalidSignalName`
    /// when `fault_on_missing` is set.
    pub fn get_all_values<S: AsRef<str>>(&self, names: &[S], fault_on_missing: bool) -> ProbeResult<ValueMap> {
        let bulk = self.fetch_bulk(names);
        let mut values = ValueMap::new();
        for name in names {
            let name = name.as_ref();
            let value = match &bulk {
                Some(found) => self
                    .handle(name)
                    .ok()
                    .and_then(|handle| found.get(handle.as_str()).copied().flatten()),
                None => self.get_value(name),
            };
            match value {
                Some(value) => {
                    values.insert(name.to_string(), value);
                }
                None if fault_on_missing => {
                    let handle = self.handle(name)?;
                    return Err(DataError::MissingValue {
                        name: name.to_string(),
                        handle: handle.to_string(),
                    }
                    .into());
                }
                None => {}
            }
        }
        Ok(values)
    }

    /// Reads every register in the catalog.
    ///
    /// # Errors
    ///
    /// Fails if any register has no value.
    pub fn get_register_values(&self, catalog: &SignalCatalog) -> ProbeResult<ValueMap> {
        self.get_all_values(catalog.registers(), true)
    }

    /// Reads every port, split into `(inputs, outputs)` by declared direction.
    ///
    /// # Errors
    ///
    /// Fails if any port has no value.
    pub fn get_io_values(&self, catalog: &SignalCatalog) -> ProbeResult<(ValueMap, ValueMap)> {
        let inputs = self.get_all_values(catalog.inputs().as_slice(), true)?;
        let outputs = self.get_all_values(catalog.outputs().as_slice(), true)?;
        Ok((inputs, outputs))
    }

    /// Like [`get_io_values`](Self::get_io_values) for a subset of ports.
    ///
    /// # Errors
    ///
    /// Returns `DataError::UnknownPort` for a name the catalog does not
    /// declare as a port, or a missing-value error.
    pub fn get_io_subset<S: AsRef<str>>(
        &self,
        catalog: &SignalCatalog,
        names: &[S],
    ) -> ProbeResult<(ValueMap, ValueMap)> {
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for name in names {
            let name = name.as_ref();
            let direction = catalog.direction(name).ok_or_else(|| DataError::UnknownPort {
                name: name.to_string(),
            })?;
            if direction.is_input() {
                inputs.push(name);
            }
            if direction.is_output() {
                outputs.push(name);
            }
        }
        Ok((self.get_all_values(inputs.as_slice(), true)?, self.get_all_values(outputs.as_slice(), true)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, ProbeError};
    use crate::testutil::{accumulator_catalog, connected, fast_config, runtime, Runtime};
    use crate::transport::Headers;

    /// Runtime without the bulk route, like an older simulator build.
    struct SingleReads(Runtime);

    impl Transport for SingleReads {
        fn get(&self, path: &str, headers: Headers<'_>) -> Option<Vec<u8>> {
            self.0.get(path, headers)
        }

        fn get_with_body(&self, _path: &str, _headers: Headers<'_>, _body: &[u8]) -> Option<Vec<u8>> {
            None
        }

        fn post(&self, path: &str, headers: Headers<'_>, body: Option<&[u8]>) -> Option<Vec<u8>> {
            self.0.post(path, headers, body)
        }

        fn delete(&self, path: &str) -> Option<Vec<u8>> {
            self.0.delete(path)
        }

        fn endpoint(&self) -> String {
            self.0.endpoint()
        }
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("42"), Some(42));
        assert_eq!(parse_value(" 7\n"), Some(7));
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value("null"), None);
        assert_eq!(parse_value("-1"), None);
        // A 32-bit register with its top bit set, as the runtime prints it.
        assert_eq!(parse_value("-2147483648"), None);
        assert_eq!(parse_value("x"), None);
        assert_eq!(parse_value("ERROR"), None);
    }

    #[test]
    fn test_get_value_uses_prefix() {
        let mut session = connected(runtime(&[42]));
        session.set_pause_on_clock(true).unwrap();
        session.continue_().unwrap();
        session.wait_until_paused().unwrap();

        let resolver = ValueResolver::new(&session);
        assert_eq!(resolver.handle("mod.a").unwrap().as_str(), "TOP.mod.a");
        assert_eq!(resolver.get_value("mod.a"), Some(42));
        assert_eq!(resolver.get_value("mod.missing"), None);
        assert_eq!(resolver.get_value("not a name"), None);
    }

    #[test]
    fn test_get_value_absent_when_offline() {
        let session = connected(runtime(&[1]));
        session.transport().set_offline(true);
        assert_eq!(ValueResolver::new(&session).get_value("mod.a"), None);
    }

    #[test]
    fn test_get_all_values_is_all_or_nothing() {
        let session = connected(runtime(&[1]));
        let resolver = ValueResolver::new(&session);

        let names = ["mod.a", "mod.ghost", "mod.b"];
        let err = resolver.get_all_values(&names, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataInconsistency);
        match err {
            ProbeError::Data(DataError::MissingValue { name, handle }) => {
                assert_eq!(name, "mod.ghost");
                assert_eq!(handle, "TOP.mod.ghost");
            }
            other => panic!("unexpected error: {other}"),
        }

        let partial = resolver.get_all_values(&names, false).unwrap();
        assert_eq!(partial.len(), 2);
        assert!(!partial.contains_key("mod.ghost"));
    }

    #[test]
    fn test_get_all_values_uses_one_bulk_request() {
        let session = connected(runtime(&[1]));
        let resolver = ValueResolver::new(&session);
        let before = session.transport().requests().len();

        let values = resolver.get_all_values(&["mod.a", "mod.b", "mod.out"], true).unwrap();
        assert_eq!(values.len(), 3);
        let requests = session.transport().requests();
        assert_eq!(&requests[before..], ["GET /values".to_string()]);
    }

    #[test]
    fn test_get_all_values_falls_back_to_single_reads() {
        let mut session = ControlSession::new(SingleReads(runtime(&[1])), fast_config()).unwrap();
        session.connect().unwrap();
        let resolver = ValueResolver::new(&session);

        let values = resolver.get_all_values(&["mod.a", "mod.b"], true).unwrap();
        assert_eq!(values.get("mod.b"), Some(&0));
        let singles = session
            .transport()
            .0
            .requests()
            .iter()
            .filter(|r| r.starts_with("GET /value/"))
            .count();
        assert_eq!(singles, 2);
    }

    #[test]
    fn test_get_io_values_partitions_by_direction() {
        let session = connected(runtime(&[1]));
        let resolver = ValueResolver::new(&session);
        let catalog = accumulator_catalog();

        let (inputs, outputs) = resolver.get_io_values(&catalog).unwrap();
        assert_eq!(inputs.keys().collect::<Vec<_>>(), vec!["mod.a"]);
        assert_eq!(outputs.keys().collect::<Vec<_>>(), vec!["mod.out"]);

        let registers = resolver.get_register_values(&catalog).unwrap();
        assert_eq!(registers.get("mod.b"), Some(&0));
    }

    #[test]
    fn test_get_io_subset_rejects_unknown_port() {
        let session = connected(runtime(&[1]));
        let resolver = ValueResolver::new(&session);
        let catalog = accumulator_catalog();

        let err = resolver.get_io_subset(&catalog, &["mod.b"]).unwrap_err();
        assert!(matches!(err, ProbeError::Data(DataError::UnknownPort { .. })));

        let (inputs, outputs) = resolver.get_io_subset(&catalog, &["mod.out"]).unwrap();
        assert!(inputs.is_empty());
        assert_eq!(outputs.len(), 1);
    }
}

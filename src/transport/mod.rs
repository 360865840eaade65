//! Request/response transport to the simulation runtime.
//!
//! A transport reduces every failure (refused connection, timeout, malformed
//! response, non-200 status) to `None`. It never retries; retry policy
//! belongs to the [`ControlSession`](crate::session::ControlSession).
//!
//! - [`HttpTransport`]: blocking HTTP/1.1 against a live runtime
//! - [`InMemoryRuntime`]: in-process runtime for tests and embedding

mod http;
pub mod memory;

pub use http::HttpTransport;
pub use memory::{ClockedModel, InMemoryRuntime};

/// Extra request headers as `(name, value)` pairs.
pub type Headers<'a> = &'a [(&'a str, &'a str)];

/// Transport contract used by the control session.
///
/// Implementations are driven by exactly one session at a time; the
/// protocol is strictly one request in flight.
pub trait Transport: Send + Sync {
    /// Issues a GET. Returns the body on status 200, otherwise `None`.
    fn get(&self, path: &str, headers: Headers<'_>) -> Option<Vec<u8>>;

    /// Issues a GET carrying a request body, as `/values` expects.
    fn get_with_body(&self, path: &str, headers: Headers<'_>, body: &[u8]) -> Option<Vec<u8>>;

    /// Issues a POST. Returns the body on status 200, otherwise `None`.
    fn post(&self, path: &str, headers: Headers<'_>, body: Option<&[u8]>) -> Option<Vec<u8>>;

    /// Issues a DELETE. Returns the body on status 200, otherwise `None`.
    fn delete(&self, path: &str) -> Option<Vec<u8>>;

    /// Human-readable endpoint description for diagnostics.
    fn endpoint(&self) -> String;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn get(&self, path: &str, headers: Headers<'_>) -> Option<Vec<u8>> {
        (**self).get(path, headers)
    }

    fn get_with_body(&self, path: &str, headers: Headers<'_>, body: &[u8]) -> Option<Vec<u8>> {
        (**self).get_with_body(path, headers, body)
    }

    fn post(&self, path: &str, headers: Headers<'_>, body: Option<&[u8]>) -> Option<Vec<u8>> {
        (**self).post(path, headers, body)
    }

    fn delete(&self, path: &str) -> Option<Vec<u8>> {
        (**self).delete(path)
    }

    fn endpoint(&self) -> String {
        (**self).endpoint()
    }
}

/// Decodes a response body as trimmed text.
///
/// Non-UTF-8 bodies count as malformed and yield `None`.
#[must_use]
pub fn body_text(body: &[u8]) -> Option<&str> {
    std::str::from_utf8(body).ok().map(str::trim)
}

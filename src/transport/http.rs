//! Blocking HTTP/1.1 transport.
//!
//! Each request opens a fresh connection with `Connection: close`, matching
//! the runtime's one-request-at-a-time control surface.

use std::io::{BufRead, BufReader, Error as IoError, ErrorKind, Read, Result as IoResult, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, trace};

use super::{Headers, Transport};
use crate::config::SessionConfig;

/// Maximum accepted response body.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024; // 16 MiB

/// Maximum accepted status/header line.
const MAX_LINE_BYTES: usize = 8 * 1024;

/// HTTP transport bound to a single `host:port` endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: String,
    timeout: Duration,
}

/// A parsed response.
#[derive(Debug, PartialEq, Eq)]
struct HttpResponse {
    status: u16,
    body: Vec<u8>,
}

impl HttpTransport {
    /// Creates a transport for `endpoint` (`host:port`).
    #[must_use]
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }

    /// Creates a transport from a session config.
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.endpoint.clone(), config.request_timeout())
    }

    fn request(&self, method: &str, path: &str, headers: Headers<'_>, body: Option<&[u8]>) -> Option<Vec<u8>> {
        match self.exchange(method, path, headers, body) {
            Ok(resp) if resp.status == 200 => {
                trace!("{method} {path} -> 200 ({} bytes)", resp.body.len());
                Some(resp.body)
            }
            Ok(resp) => {
                debug!("{method} {path} -> status {}", resp.status);
                None
            }
            Err(err) => {
                debug!("{method} {path} failed: {err}");
                None
            }
        }
    }

    fn connect(&self) -> IoResult<TcpStream> {
        let addrs: Vec<SocketAddr> = self.endpoint.to_socket_addrs()?.collect();
        let mut last_err = IoError::new(
            ErrorKind::AddrNotAvailable,
            format!("no address for {}", self.endpoint),
        );
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => last_err = err,
            }
        }
        Err(last_err)
    }

    fn exchange(
        &self,
        method: &str,
        path: &str,
        headers: Headers<'_>,
        body: Option<&[u8]>,
    ) -> IoResult<HttpResponse> {
        let mut stream = self.connect()?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        let request = encode_request(method, &self.endpoint, path, headers, body);
        stream.write_all(&request)?;
        stream.flush()?;

        parse_response(&mut BufReader::new(stream))
    }
}

impl Transport for HttpTransport {
    fn get(&self, path: &str, headers: Headers<'_>) -> Option<Vec<u8>> {
        self.request("GET", path, headers, None)
    }

    fn get_with_body(&self, path: &str, headers: Headers<'_>, body: &[u8]) -> Option<Vec<u8>> {
        self.request("GET", path, headers, Some(body))
    }

    fn post(&self, path: &str, headers: Headers<'_>, body: Option<&[u8]>) -> Option<Vec<u8>> {
        self.request("POST", path, headers, body)
    }

    fn delete(&self, path: &str) -> Option<Vec<u8>> {
        self.request("DELETE", path, &[], None)
    }

    fn endpoint(&self) -> String {
        format!("http://{}", self.endpoint)
    }
}

fn encode_request(method: &str, host: &str, path: &str, headers: Headers<'_>, body: Option<&[u8]>) -> Vec<u8> {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let body = body.unwrap_or_default();

    let mut head = format!("{method} {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n");
    for (name, value) in headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    if !body.is_empty() || method == "POST" {
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    head.push_str("\r\n");

    let mut out = head.into_bytes();
    out.extend_from_slice(body);
    out
}

fn read_line(reader: &mut impl BufRead) -> IoResult<String> {
    let mut line = Vec::new();
    reader.by_ref().take(MAX_LINE_BYTES as u64).read_until(b'\n', &mut line)?;
    if line.last() != Some(&b'\n') {
        return Err(IoError::new(ErrorKind::UnexpectedEof, "truncated line"));
    }
    String::from_utf8(line)
        .map(|s| s.trim_end_matches(['\r', '\n']).to_string())
        .map_err(|_| IoError::new(ErrorKind::InvalidData, "non-UTF-8 header"))
}

fn invalid(message: impl Into<String>) -> IoError {
    IoError::new(ErrorKind::InvalidData, message.into())
}

fn parse_response(reader: &mut impl BufRead) -> IoResult<HttpResponse> {
    let status_line = read_line(reader)?;
    let mut parts = status_line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(invalid(format!("bad status line: {status_line}")));
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| invalid(format!("bad status line: {status_line}")))?;

    let mut content_length = None;
    let mut chunked = false;
    loop {
        let line = read_line(reader)?;
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(invalid(format!("bad header: {line}")));
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            let len = value
                .parse::<usize>()
                .map_err(|_| invalid(format!("bad content-length: {value}")))?;
            content_length = Some(len);
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            chunked = value.to_ascii_lowercase().contains("chunked");
        }
    }

    let body = if chunked {
        read_chunked(reader)?
    } else if let Some(len) = content_length {
        if len > MAX_BODY_BYTES {
            return Err(invalid(format!("body of {len} bytes exceeds limit")));
        }
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body)?;
        body
    } else {
        let mut body = Vec::new();
        reader.take(MAX_BODY_BYTES as u64 + 1).read_to_end(&mut body)?;
        if body.len() > MAX_BODY_BYTES {
            return Err(invalid("body exceeds limit"));
        }
        body
    };

    Ok(HttpResponse { status, body })
}

fn read_chunked(reader: &mut impl BufRead) -> IoResult<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let line = read_line(reader)?;
        let size_str = line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_str, 16).map_err(|_| invalid(format!("bad chunk size: {line}")))?;
        if size == 0 {
            // Trailers end with an empty line.
            while !read_line(reader)?.is_empty() {}
            return Ok(body);
        }
        let start = body.len();
        let end = start
            .checked_add(size)
            .filter(|end| *end <= MAX_BODY_BYTES)
            .ok_or_else(|| invalid(format!("chunk of {size} bytes exceeds limit")))?;
        body.resize(end, 0);
        reader.read_exact(&mut body[start..])?;
        if !read_line(reader)?.is_empty() {
            return Err(invalid("missing chunk terminator"));
        }
    }
}

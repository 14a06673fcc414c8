//! Plain-data request type and the transport seam.
//!
//! # Design
//! A `RequestDescriptor` describes one POST exchange as owned plain data
//! (target, headers, body bytes); the engine never touches a socket
//! itself. Actual I/O goes through the [`Transport`] trait, which the
//! host implements over whatever networking library it already uses.
//! `send` returns a boxed future so the trait stays object-safe and a
//! `Connection` can hold `Arc<dyn Transport>`.

use std::future::Future;
use std::pin::Pin;

use crate::error::TransportError;

/// HTTP method of a [`RequestDescriptor`]. The engine only ever issues
/// POST; the enum exists so the wire layer is explicit about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
        }
    }
}

/// One outbound POST exchange described as plain data.
///
/// Built by the `Connection` builder methods, consumed by a
/// [`Transport`]. Immutable once built, except that a descriptor parked
/// for retry gets its form body refreshed with the current default
/// parameters before being re-dispatched.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub target: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RequestDescriptor {
    /// Value of the first header whose name matches case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace a header value, or append the header if absent.
    pub(crate) fn set_header(&mut self, name: &str, value: String) {
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }
}

/// Boxed future returned by [`Transport::send`].
pub type SendFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<u8>, TransportError>> + Send + 'a>>;

/// The wire. Implementations execute one request and deliver exactly one
/// completion: the raw response bytes on success, a [`TransportError`]
/// for network-level failure. Timeout behavior belongs to the
/// implementation, not the engine.
pub trait Transport: Send + Sync {
    fn send(&self, request: RequestDescriptor) -> SendFuture<'_>;
}

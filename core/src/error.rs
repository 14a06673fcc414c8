//! Error types for the connection engine.
//!
//! # Design
//! Transport-layer failures and response-layer failures take different
//! paths through the engine, so they get different types. A
//! `TransportError` feeds the connectivity-lost/retry machinery and is
//! never delivered to a response handler; an `ErrorKind` is what the
//! observer sees when a response cannot be used.

use std::fmt;

/// A failure reported by the [`Transport`](crate::http::Transport) while
/// sending a request: connection refused, DNS failure, broken pipe, and
/// the like. Application-level problems (bad JSON, rejected responses)
/// are not transport errors.
#[derive(Debug, Clone)]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport failure: {}", self.message)
    }
}

impl std::error::Error for TransportError {}

/// Classification delivered to
/// [`ConnectionObserver::error_encountered`](crate::observer::ConnectionObserver::error_encountered).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Reserved catch-all. Part of the taxonomy but not emitted by any
    /// current code path.
    Unexpected,

    /// The response bytes did not decode into the requested shape
    /// (string map or array of string maps).
    InvalidJson,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Unexpected => write!(f, "unexpected error"),
            ErrorKind::InvalidJson => write!(f, "response is not valid JSON for the requested shape"),
        }
    }
}

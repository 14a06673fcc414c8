//! Resilient POST client core: connection lifecycle, retry, and body
//! building for a fixed server root.
//!
//! # Overview
//! A [`Connection`] issues POST requests against a configured root
//! endpoint, tracks connectivity health, and automatically retries
//! failed requests at a fixed delay until the network comes back.
//! Responses are decoded into string maps (or arrays of them); uploads
//! are encoded as base64 form fields or `multipart/form-data`.
//!
//! # Design
//! - The wire is behind the [`Transport`] trait; the core never opens a
//!   socket itself and stays fully testable with a scripted transport.
//! - One pending slot per connection: a failed request is parked and
//!   replayed, a second failure overwrites it, nothing queues.
//! - Connectivity notifications are debounced — observers hear about
//!   transitions, never repeated identical outcomes.
//! - Request descriptors are owned plain data, so a parked request can
//!   have its form body refreshed with the current default parameters
//!   before being replayed.

pub mod body;
pub mod connection;
pub mod error;
pub mod http;
pub mod observer;
pub mod response;

pub use connection::{
    clear_shared, set_shared, shared, Connection, PendingProcess, ResponseHandler,
    DEFAULT_IMAGE_PREFIX, DEFAULT_RETRY_DELAY, IMAGE_COUNT_PARAM,
};
pub use error::{ErrorKind, TransportError};
pub use http::{HttpMethod, RequestDescriptor, SendFuture, Transport};
pub use observer::ConnectionObserver;
pub use response::{decode_string_map, decode_string_map_array};

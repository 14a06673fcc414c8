//! Response decoding: narrow raw bytes to the exact requested shape.
//!
//! # Design
//! The two entry points mirror the two response shapes the server
//! produces: a flat string map, or an ordered list of string maps.
//! `serde_json` refuses to coerce scalars, so a numeric value, extra
//! nesting, or a container mismatch all fail the decode as a whole —
//! there is no partial success. Every failure is the same
//! [`ErrorKind::InvalidJson`]; callers never retry a decode failure.

use std::collections::HashMap;

use crate::error::ErrorKind;

/// Decode `bytes` as a JSON object whose values are all strings.
pub fn decode_string_map(bytes: &[u8]) -> Result<HashMap<String, String>, ErrorKind> {
    serde_json::from_slice(bytes).map_err(|_| ErrorKind::InvalidJson)
}

/// Decode `bytes` as a JSON array of objects whose values are all
/// strings. Element order is preserved.
pub fn decode_string_map_array(bytes: &[u8]) -> Result<Vec<HashMap<String, String>>, ErrorKind> {
    serde_json::from_slice(bytes).map_err(|_| ErrorKind::InvalidJson)
}

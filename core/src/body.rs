//! URL and body encoding: parameter merging, form bodies, base64 image
//! payloads, multipart assembly.
//!
//! # Design
//! Everything here is a pure function from maps/bytes to bytes, so the
//! whole wire format is testable without a `Connection`. Form encoding
//! deliberately does NOT percent-escape values: the server contract this
//! engine targets was built around raw `key=value` pairs, and escaping
//! them would change what the server receives. Values containing `&` or
//! `=` will corrupt the body; that fragility is part of the documented
//! format, not an oversight to patch here.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use uuid::Uuid;

/// Content type of an ordinary form body.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Base64 output is wrapped to this many characters per line, CRLF
/// separated, matching the line-limited encoding the upload endpoints
/// were built against.
const BASE64_LINE_LENGTH: usize = 76;

/// Merge two parameter maps with override semantics: every key in
/// `overrides` wins, keys only in `base` are preserved.
pub fn merge_params(
    base: &HashMap<String, String>,
    overrides: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Encode a parameter map as `key=value` pairs joined with `&`.
///
/// Pair order follows map iteration order and is unspecified; callers
/// must not rely on it. Values are not percent-escaped (see module
/// docs).
pub fn encode_form(params: &HashMap<String, String>) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Decode a form body back into a parameter map: split on `&`, then on
/// the first `=`. Segments without `=` are dropped. This is the inverse
/// of [`encode_form`] for values free of `&` and `=`.
pub fn decode_form(body: &str) -> HashMap<String, String> {
    body.split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Base64-encode `data` with lines wrapped at 76 characters, CRLF
/// separated.
pub fn encode_base64_wrapped(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_LENGTH * 2);
    for (i, chunk) in encoded.as_bytes().chunks(BASE64_LINE_LENGTH).enumerate() {
        if i > 0 {
            wrapped.push_str("\r\n");
        }
        // chunks of ASCII input are valid UTF-8
        wrapped.push_str(std::str::from_utf8(chunk).unwrap_or_default());
    }
    wrapped
}

/// Generate a fresh multipart boundary token. A new token is drawn for
/// every request.
pub fn multipart_boundary() -> String {
    format!("Boundary-{}", Uuid::new_v4())
}

/// Assemble a `multipart/form-data` body.
///
/// Layout: one part per parameter (unspecified order), then one part per
/// image in ascending 1-based index order (name `{prefix}{i}`, filename
/// `file{i}.jpg`, content type `image/jpg`), then the closing
/// `--{boundary}--` marker.
pub fn encode_multipart(
    boundary: &str,
    params: &HashMap<String, String>,
    images: &[Vec<u8>],
    name_prefix: &str,
) -> Vec<u8> {
    let mut body = Vec::new();

    for (key, value) in params {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{key}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    for (i, image) in images.iter().enumerate() {
        let index = i + 1;
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name_prefix}{index}\"; filename=\"file{index}.jpg\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/jpg\r\n\r\n");
        body.extend_from_slice(image);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{boundary}--").as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn merge_override_wins_and_base_is_preserved() {
        let base = map(&[("token", "old"), ("device", "phone")]);
        let overrides = map(&[("token", "new"), ("extra", "1")]);
        let merged = merge_params(&base, &overrides);

        assert_eq!(merged.get("token").unwrap(), "new");
        assert_eq!(merged.get("device").unwrap(), "phone");
        assert_eq!(merged.get("extra").unwrap(), "1");
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn merge_with_empty_override_is_identity() {
        let base = map(&[("a", "1")]);
        let merged = merge_params(&base, &HashMap::new());
        assert_eq!(merged, base);
    }

    #[test]
    fn encode_form_joins_pairs() {
        let encoded = encode_form(&map(&[("a", "1"), ("b", "2")]));
        // Pair order is unspecified; compare content, not order.
        let mut pairs: Vec<&str> = encoded.split('&').collect();
        pairs.sort_unstable();
        assert_eq!(pairs, vec!["a=1", "b=2"]);
    }

    #[test]
    fn encode_form_empty_map_is_empty_string() {
        assert_eq!(encode_form(&HashMap::new()), "");
    }

    #[test]
    fn encode_form_does_not_escape_values() {
        let encoded = encode_form(&map(&[("q", "a b+c")]));
        assert_eq!(encoded, "q=a b+c");
    }

    #[test]
    fn decode_form_inverts_encode() {
        let params = map(&[("a", "1"), ("b", "2"), ("c", "three")]);
        assert_eq!(decode_form(&encode_form(&params)), params);
    }

    #[test]
    fn decode_form_splits_on_first_equals() {
        let decoded = decode_form("k=v=w");
        assert_eq!(decoded.get("k").unwrap(), "v=w");
    }

    #[test]
    fn decode_form_drops_segments_without_equals() {
        let decoded = decode_form("a=1&junk&b=2");
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded.get("a").unwrap(), "1");
        assert_eq!(decoded.get("b").unwrap(), "2");
    }

    #[test]
    fn encode_decode_encode_is_idempotent() {
        let params = map(&[("token", "abc123"), ("device", "phone"), ("v", "2")]);
        let once = encode_form(&params);
        let twice = encode_form(&decode_form(&once));
        assert_eq!(decode_form(&once), decode_form(&twice));
        assert_eq!(once.len(), twice.len());
    }

    #[test]
    fn base64_short_input_has_no_line_break() {
        let encoded = encode_base64_wrapped(b"Hello World");
        assert_eq!(encoded, "SGVsbG8gV29ybGQ=");
    }

    #[test]
    fn base64_long_input_wraps_at_76() {
        let encoded = encode_base64_wrapped(&[0xAB; 100]);
        let lines: Vec<&str> = encoded.split("\r\n").collect();
        assert!(lines.len() > 1);
        assert!(lines[..lines.len() - 1].iter().all(|l| l.len() == 76));
        assert!(lines.last().unwrap().len() <= 76);
        // Stripping the breaks must give back plain base64.
        let joined: String = lines.concat();
        assert_eq!(STANDARD.decode(joined).unwrap(), vec![0xAB; 100]);
    }

    #[test]
    fn boundary_tokens_are_unique_and_prefixed() {
        let a = multipart_boundary();
        let b = multipart_boundary();
        assert!(a.starts_with("Boundary-"));
        assert!(b.starts_with("Boundary-"));
        assert_ne!(a, b);
    }

    #[test]
    fn multipart_two_images_and_one_param() {
        let params = map(&[("x", "y"), ("image_count", "2")]);
        let images = vec![vec![1u8, 2, 3], vec![4u8, 5]];
        let body = encode_multipart("B", &params, &images, "image");
        let text = String::from_utf8_lossy(&body);

        assert!(text.contains("Content-Disposition: form-data; name=\"x\"\r\n\r\ny\r\n"));
        assert!(text.contains("name=\"image_count\"\r\n\r\n2\r\n"));
        assert!(text
            .contains("Content-Disposition: form-data; name=\"image1\"; filename=\"file1.jpg\""));
        assert!(text
            .contains("Content-Disposition: form-data; name=\"image2\"; filename=\"file2.jpg\""));
        assert_eq!(text.matches("Content-Type: image/jpg").count(), 2);
        assert!(text.ends_with("--B--"));

        // Image ordering: image1's part must precede image2's.
        let first = text.find("name=\"image1\"").unwrap();
        let second = text.find("name=\"image2\"").unwrap();
        assert!(first < second);

        // Raw bytes survive untouched.
        assert!(body.windows(3).any(|w| w == [1, 2, 3]));
        assert!(body.windows(2).any(|w| w == [4, 5]));
    }

    #[test]
    fn multipart_no_images_still_terminates() {
        let body = encode_multipart("B", &map(&[("a", "1")]), &[], "image");
        let text = String::from_utf8_lossy(&body);
        assert!(text.starts_with("--B\r\n"));
        assert!(text.ends_with("--B--"));
        assert!(!text.contains("filename"));
    }

    #[test]
    fn multipart_custom_prefix() {
        let body = encode_multipart("B", &HashMap::new(), &[vec![0u8]], "photo");
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("name=\"photo1\""));
        assert!(text.contains("filename=\"file1.jpg\""));
    }
}

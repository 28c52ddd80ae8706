//! quick-xml helpers for the in-memory parse path.
//!
//! All functions handle namespace-prefixed attributes and UTF-8 conversion
//! without failing; a malformed attribute reads as absent.

use quick_xml::events::{BytesStart, BytesText};

use crate::scan::decode_entities;

/// Extract a string attribute value by key.
///
/// Returns `None` if the attribute is missing or not valid UTF-8.
pub fn attr_string(e: &BytesStart, key: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == key {
            return std::str::from_utf8(&attr.value).ok().map(ToString::to_string);
        }
    }
    None
}

/// Extract a string attribute by local name (ignoring namespace prefix, e.g. `r:id`).
pub fn attr_string_local(e: &BytesStart, key: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == key {
            return std::str::from_utf8(&attr.value).ok().map(ToString::to_string);
        }
    }
    None
}

/// Extract a `u32` attribute value by key.
pub fn attr_u32(e: &BytesStart, key: &[u8]) -> Option<u32> {
    attr_string(e, key).and_then(|s| s.trim().parse().ok())
}

/// Decoded text of a text event.
///
/// quick-xml rejects unknown entities; those fall back to the lenient decoder
/// used by the streaming path, which keeps them verbatim.
pub fn text_string(text: &BytesText) -> String {
    match text.unescape() {
        Ok(s) => s.into_owned(),
        Err(_) => decode_entities(&String::from_utf8_lossy(text.as_ref())).into_owned(),
    }
}

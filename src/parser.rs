//! Line parser for the fixed log grammar
//!
//! Accepted shape: `[<timestamp>] <LEVEL> <message>[ <json-payload>]`.
//! Anything else is skipped silently; the parser never fails a job.

use regex_lite::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static ENVELOPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([^\]]+)\]\s+(\S+)\s+(.*)$").unwrap());

static DOTTED_QUAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}").unwrap());

/// One parsed log line. Ephemeral: records are folded into [`crate::stats::Statistics`]
/// and dropped; only aggregate counts survive a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: String,
    pub level: String,
    pub message: String,
    pub payload: Option<Map<String, Value>>,
}

/// Parse a single raw line into a [`LogRecord`].
///
/// Returns `None` for lines that do not match the envelope grammar. A trailing
/// JSON payload that fails to parse (or is not an object) is treated as absent
/// and left in the message text verbatim.
pub fn parse_line(line: &str) -> Option<LogRecord> {
    let caps = ENVELOPE.captures(line)?;

    let timestamp = caps.get(1)?.as_str().to_string();
    let level = caps.get(2)?.as_str().to_string();
    let rest = caps.get(3)?.as_str();

    let (message, payload) = split_payload(rest);

    Some(LogRecord {
        timestamp,
        level,
        message,
        payload,
    })
}

/// Split a trailing JSON object off the message text, if one is present and valid.
fn split_payload(rest: &str) -> (String, Option<Map<String, Value>>) {
    if let Some(idx) = rest.find('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&rest[idx..]) {
            return (rest[..idx].trim_end().to_string(), Some(map));
        }
    }
    (rest.trim_end().to_string(), None)
}

/// Syntactic IPv4 check: exactly four dot-separated segments, each an
/// integer in 0..=255. Leading zeros are tolerated ("010" reads as 10).
pub fn is_ipv4(s: &str) -> bool {
    let mut segments = 0;
    for part in s.split('.') {
        segments += 1;
        if segments > 4 || part.is_empty() || part.len() > 3 {
            return false;
        }
        if !part.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        match part.parse::<u16>() {
            Ok(v) if v <= 255 => {}
            _ => return false,
        }
    }
    segments == 4
}

/// Scan free text for dotted-quad IPv4 addresses.
pub fn find_ipv4_in_text(text: &str) -> Vec<&str> {
    DOTTED_QUAD
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|candidate| is_ipv4(candidate))
        .collect()
}

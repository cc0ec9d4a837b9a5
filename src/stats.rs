//! Statistics accumulator: folds parsed records into aggregate counts

use crate::parser::{find_ipv4_in_text, is_ipv4, LogRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Aggregate output of one file scan.
///
/// Owned exclusively by a single scan invocation while mutable; becomes the
/// immutable result artifact once the job reaches a terminal state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_entries: u64,
    pub error_count: u64,
    pub keyword_matches: HashMap<String, u64>,
    pub ip_addresses: HashMap<String, u64>,
    pub processing_time_ms: u64,
}

impl Statistics {
    /// Fresh accumulator with every monitored keyword pre-seeded at zero,
    /// whether or not it ever matches.
    pub fn new(keywords: &[String]) -> Self {
        Self {
            keyword_matches: keywords.iter().map(|k| (k.clone(), 0)).collect(),
            ..Default::default()
        }
    }

    /// Fold one record into the aggregate.
    ///
    /// Keywords are matched case-insensitively against the level and message
    /// text, each keyword independently: one record can bump several keyword
    /// counters. IPv4 addresses are collected from the structured payload and
    /// from the raw message text; an address that appears in both is counted
    /// twice.
    pub fn fold(&mut self, record: &LogRecord, keywords: &[String]) {
        self.total_entries += 1;

        if record.level.eq_ignore_ascii_case("error") {
            self.error_count += 1;
        }

        let level_lower = record.level.to_lowercase();
        let message_lower = record.message.to_lowercase();
        for keyword in keywords {
            if level_lower.contains(keyword.as_str()) || message_lower.contains(keyword.as_str()) {
                *self.keyword_matches.entry(keyword.clone()).or_insert(0) += 1;
            }
        }

        if let Some(payload) = &record.payload {
            for (_, value) in payload {
                self.collect_payload_ips(value);
            }
        }
        for ip in find_ipv4_in_text(&record.message) {
            *self.ip_addresses.entry(ip.to_string()).or_insert(0) += 1;
        }
    }

    /// Recursive walk over a JSON value, counting every string leaf that is a
    /// syntactically valid dotted-quad address.
    fn collect_payload_ips(&mut self, value: &Value) {
        match value {
            Value::String(s) if is_ipv4(s) => {
                *self.ip_addresses.entry(s.clone()).or_insert(0) += 1;
            }
            Value::Array(items) => {
                for item in items {
                    self.collect_payload_ips(item);
                }
            }
            Value::Object(map) => {
                for (_, nested) in map {
                    self.collect_payload_ips(nested);
                }
            }
            _ => {}
        }
    }
}

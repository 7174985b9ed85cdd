// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The JSON wire format carried on every queue.

use serde::{Deserialize, Serialize};

use gantry_core::CorrelationId;

/// One message as stored and delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub command: String,
    pub payload: serde_json::Value,
    /// ISO-8601 UTC publish time.
    pub timestamp: String,
    pub correlation_id: CorrelationId,
    #[serde(default)]
    pub retry_count: u32,
}

impl Envelope {
    /// Convenience accessor for a string payload field.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }

    /// The `case_id` payload field, present on most workflow events.
    pub fn case_id(&self) -> Option<&str> {
        self.payload_str("case_id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_format_round_trips() {
        let envelope = Envelope {
            command: "execute_command".into(),
            payload: json!({"case_id": "c1", "gpu_id": 0}),
            timestamp: "2026-01-10T12:00:00.000Z".into(),
            correlation_id: "c1".into(),
            retry_count: 2,
        };
        let text = serde_json::to_string(&envelope).unwrap();
        let parsed: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn retry_count_defaults_to_zero() {
        let text = r#"{
            "command": "new_case_found",
            "payload": {"case_id": "c1"},
            "timestamp": "2026-01-10T12:00:00.000Z",
            "correlation_id": "abc"
        }"#;
        let parsed: Envelope = serde_json::from_str(text).unwrap();
        assert_eq!(parsed.retry_count, 0);
        assert_eq!(parsed.case_id(), Some("c1"));
    }
}

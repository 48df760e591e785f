//! Audit log entries.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One immutable audit entry.
///
/// File sinks store one entry per line as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Arrival sequence number, assigned when the entry is accepted.
    pub seq: u64,
    /// Milliseconds since the Unix epoch at creation.
    pub timestamp_ms: u64,
    /// Component that produced the entry.
    pub source: String,
    /// Human-readable description.
    pub message: String,
    /// Error description (with its cause chain), if the entry reports a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LogEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            seq: 0,
            timestamp_ms,
            source: source.into(),
            message: message.into(),
            error: None,
        }
    }

    /// Attaches an error description.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Returns true if the entry reports a failure.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Describes an error together with every cause in its `source()` chain.
pub fn describe_error(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        cause = inner.source();
    }
    out
}

use serde::{Deserialize, Serialize};

/// A single data point accepted by the monitoring sink.
///
/// Produced by the transformer for one inbound message and consumed by the
/// forwarder. The value is always text; the sink interprets it according to
/// the item type configured for `key` on `host`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMetric {
    /// Monitored host the metric belongs to.
    pub host: String,

    /// Item key on that host.
    pub key: String,

    /// Stringified value.
    pub value: String,

    /// Unix epoch seconds when the value was normalized.
    #[serde(rename = "clock")]
    pub timestamp_secs: i64,
}

impl NormalizedMetric {
    /// Create a metric with an explicit timestamp.
    pub fn at(
        host: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        timestamp_secs: i64,
    ) -> Self {
        Self {
            host: host.into(),
            key: key.into(),
            value: value.into(),
            timestamp_secs,
        }
    }
}

/// Current wall-clock time truncated to whole Unix seconds.
pub fn current_timestamp_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

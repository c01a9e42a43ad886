//! Payload normalization.

use thiserror::Error;
use zbxbridge_common::{NormalizedMetric, current_timestamp_secs};

use crate::routing::RoutingEntry;

/// A payload that cannot be turned into a metric value.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Payload on '{topic}' is not valid UTF-8: {source}")]
    InvalidUtf8 {
        topic: String,
        #[source]
        source: std::str::Utf8Error,
    },
}

/// Turns routed payloads into metrics for the sink.
#[derive(Debug, Clone)]
pub struct MetricTransformer {
    default_host: String,
}

impl MetricTransformer {
    /// Create a transformer falling back to `default_host`.
    pub fn new(default_host: impl Into<String>) -> Self {
        Self {
            default_host: default_host.into(),
        }
    }

    /// The process-wide default host.
    pub fn default_host(&self) -> &str {
        &self.default_host
    }

    /// Normalize a payload, stamping it with the current time.
    pub fn transform(
        &self,
        entry: &RoutingEntry,
        payload: &[u8],
    ) -> Result<NormalizedMetric, TransformError> {
        self.transform_at(entry, payload, current_timestamp_secs())
    }

    /// Normalize a payload with an explicit timestamp.
    pub fn transform_at(
        &self,
        entry: &RoutingEntry,
        payload: &[u8],
        timestamp_secs: i64,
    ) -> Result<NormalizedMetric, TransformError> {
        let text = std::str::from_utf8(payload).map_err(|source| TransformError::InvalidUtf8 {
            topic: entry.topic.clone(),
            source,
        })?;

        Ok(NormalizedMetric::at(
            entry.resolve_host(&self.default_host),
            entry.metric_key.as_str(),
            normalize_value(text),
            timestamp_secs,
        ))
    }
}

/// Map switch states to numbers, pass everything else through.
pub fn normalize_value(text: &str) -> &str {
    match text {
        "ON" => "1",
        "OFF" => "0",
        other => other,
    }
}

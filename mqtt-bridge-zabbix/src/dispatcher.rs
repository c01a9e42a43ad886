//! Per-message routing, transformation and forwarding.

use std::sync::Arc;

use crate::broker::InboundMessage;
use crate::forwarder::MetricSink;
use crate::routing::RoutingTable;
use crate::transform::MetricTransformer;

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Sent to the sink.
    Forwarded,
    /// No routing entry for the topic.
    Unrouted,
    /// Payload could not be normalized.
    TransformFailed,
    /// The sink did not accept the metric.
    SendFailed,
}

/// Counters of dispatch outcomes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub forwarded: u64,
    pub unrouted: u64,
    pub transform_failed: u64,
    pub send_failed: u64,
}

impl DispatchStats {
    /// Total number of dispatched messages.
    pub fn total(&self) -> u64 {
        self.forwarded + self.unrouted + self.transform_failed + self.send_failed
    }

    fn record(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Forwarded => self.forwarded += 1,
            DispatchOutcome::Unrouted => self.unrouted += 1,
            DispatchOutcome::TransformFailed => self.transform_failed += 1,
            DispatchOutcome::SendFailed => self.send_failed += 1,
        }
    }
}

/// Glue between inbound messages and the metrics sink.
///
/// Every failure is terminal to the message being dispatched and is only
/// visible through logs and [`DispatchStats`].
pub struct Dispatcher<S: MetricSink> {
    table: Arc<RoutingTable>,
    transformer: MetricTransformer,
    sink: S,
    stats: DispatchStats,
}

impl<S: MetricSink> Dispatcher<S> {
    pub fn new(table: Arc<RoutingTable>, transformer: MetricTransformer, sink: S) -> Self {
        Self {
            table,
            transformer,
            sink,
            stats: DispatchStats::default(),
        }
    }

    /// Route, normalize and forward one message.
    pub async fn dispatch(&mut self, msg: &InboundMessage) -> DispatchOutcome {
        let outcome = self.forward(msg).await;
        self.stats.record(outcome);
        outcome
    }

    async fn forward(&mut self, msg: &InboundMessage) -> DispatchOutcome {
        let Some(entry) = self.table.lookup(&msg.topic) else {
            tracing::debug!(topic = %msg.topic, "Unknown topic, discarding");
            return DispatchOutcome::Unrouted;
        };

        let metric = match self.transformer.transform(entry, &msg.payload) {
            Ok(metric) => metric,
            Err(e) => {
                tracing::warn!(topic = %msg.topic, error = %e, "Dropping message");
                return DispatchOutcome::TransformFailed;
            }
        };

        if let Err(e) = self.sink.send(&metric).await {
            tracing::warn!(
                topic = %msg.topic,
                host = %metric.host,
                key = %metric.key,
                error = %e,
                "Failed to send metric"
            );
            return DispatchOutcome::SendFailed;
        }

        tracing::info!(
            topic = %msg.topic,
            value = %metric.value,
            host = %metric.host,
            key = %metric.key,
            "Sent metric to Zabbix"
        );
        DispatchOutcome::Forwarded
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarder::SendError;
    use zbxbridge_common::NormalizedMetric;

    #[derive(Default)]
    struct Recorder {
        sent: Vec<NormalizedMetric>,
        fail: bool,
    }

    impl MetricSink for Recorder {
        async fn send(&mut self, metric: &NormalizedMetric) -> Result<(), SendError> {
            if self.fail {
                return Err(SendError::Rejected("test".to_string()));
            }
            self.sent.push(metric.clone());
            Ok(())
        }
    }

    fn dispatcher(fail: bool) -> Dispatcher<Recorder> {
        let table = RoutingTable::from_pairs([("home/power", "power::host1")]).unwrap();
        Dispatcher::new(
            Arc::new(table),
            MetricTransformer::new("monitor01"),
            Recorder {
                sent: Vec::new(),
                fail,
            },
        )
    }

    #[tokio::test]
    async fn test_outcomes_are_counted() {
        let mut dispatcher = dispatcher(false);

        let routed = InboundMessage::new("home/power", "ON", 0);
        let unrouted = InboundMessage::new("home/other", "ON", 0);
        let garbage = InboundMessage::new("home/power", vec![0xffu8, 0xfe], 0);

        assert_eq!(dispatcher.dispatch(&routed).await, DispatchOutcome::Forwarded);
        assert_eq!(dispatcher.dispatch(&unrouted).await, DispatchOutcome::Unrouted);
        assert_eq!(
            dispatcher.dispatch(&garbage).await,
            DispatchOutcome::TransformFailed
        );

        let stats = dispatcher.stats();
        assert_eq!(stats.forwarded, 1);
        assert_eq!(stats.unrouted, 1);
        assert_eq!(stats.transform_failed, 1);
        assert_eq!(stats.total(), 3);
        assert_eq!(dispatcher.sink().sent.len(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_counted() {
        let mut dispatcher = dispatcher(true);
        let msg = InboundMessage::new("home/power", "OFF", 1);

        assert_eq!(dispatcher.dispatch(&msg).await, DispatchOutcome::SendFailed);
        assert_eq!(dispatcher.stats().send_failed, 1);
        assert!(dispatcher.sink().sent.is_empty());
    }
}

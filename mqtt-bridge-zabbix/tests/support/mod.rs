//! Scripted broker and recording sink shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use mqtt_bridge_zabbix::broker::{Broker, BrokerError, BrokerEvent, InboundMessage};
use mqtt_bridge_zabbix::dispatcher::Dispatcher;
use mqtt_bridge_zabbix::forwarder::{MetricSink, SendError};
use mqtt_bridge_zabbix::lifecycle::{Delays, LifecycleManager, SessionSettings};
use mqtt_bridge_zabbix::routing::RoutingTable;
use mqtt_bridge_zabbix::transform::MetricTransformer;
use zbxbridge_common::NormalizedMetric;
use zbxbridge_framework::{PresenceTopic, ShutdownTrigger};

pub const PRESENCE: &str = "clients/gw01.example.net/mqtt-zabbix/state";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
    pub qos: u8,
}

/// Broker replaying a fixed list of events.
///
/// Once the script is exhausted it fires the shutdown trigger (if given) and
/// waits; after `disconnect` it reports the close.
#[derive(Default)]
pub struct ScriptedBroker {
    script: VecDeque<BrokerEvent>,
    on_exhausted: Option<ShutdownTrigger>,
    pub published: Vec<Published>,
    pub subscriptions: Vec<(String, u8)>,
    pub disconnects: usize,
}

impl ScriptedBroker {
    pub fn new(events: impl IntoIterator<Item = BrokerEvent>) -> Self {
        Self {
            script: events.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn shutdown_when_exhausted(mut self, trigger: ShutdownTrigger) -> Self {
        self.on_exhausted = Some(trigger);
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    pub fn presence_payloads(&self) -> Vec<&str> {
        self.published
            .iter()
            .filter(|p| p.topic == PRESENCE)
            .map(|p| p.payload.as_str())
            .collect()
    }
}

impl Broker for ScriptedBroker {
    async fn next_event(&mut self) -> BrokerEvent {
        if self.disconnects > 0 {
            return BrokerEvent::Closed;
        }
        if let Some(event) = self.script.pop_front() {
            return event;
        }
        if let Some(trigger) = self.on_exhausted.take() {
            trigger.trigger();
        }
        std::future::pending().await
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &str,
        retain: bool,
        qos: u8,
    ) -> Result<(), BrokerError> {
        self.published.push(Published {
            topic: topic.to_string(),
            payload: payload.to_string(),
            retain,
            qos,
        });
        Ok(())
    }

    fn subscribe(&mut self, pattern: &str, qos: u8) -> Result<(), BrokerError> {
        self.subscriptions.push((pattern.to_string(), qos));
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.disconnects += 1;
        Ok(())
    }
}

/// Sink recording every metric, optionally failing the first few sends.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub sent: Vec<NormalizedMetric>,
    pub attempts: usize,
    pub fail_first: usize,
}

impl RecordingSink {
    pub fn failing_first(n: usize) -> Self {
        Self {
            fail_first: n,
            ..Self::default()
        }
    }
}

impl MetricSink for RecordingSink {
    async fn send(&mut self, metric: &NormalizedMetric) -> Result<(), SendError> {
        self.attempts += 1;
        if self.attempts <= self.fail_first {
            return Err(SendError::Unreachable {
                addr: "zabbix.invalid:10051".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        self.sent.push(metric.clone());
        Ok(())
    }
}

pub fn message(topic: &str, payload: &str) -> BrokerEvent {
    BrokerEvent::Message(InboundMessage::new(topic, payload, 2))
}

pub fn dispatcher<S: MetricSink>(
    pairs: &[(&str, &str)],
    default_host: &str,
    sink: S,
) -> Dispatcher<S> {
    let table = RoutingTable::from_pairs(pairs.iter().copied()).expect("valid routing table");
    Dispatcher::new(Arc::new(table), MetricTransformer::new(default_host), sink)
}

pub fn delays(ms: u64) -> Delays {
    Delays {
        unavailable: Duration::from_millis(ms),
        dropped: Duration::from_millis(ms),
        connect_failure: Duration::from_millis(ms),
        shutdown_timeout: Duration::from_millis(500),
    }
}

pub fn settings(delays: Delays) -> SessionSettings {
    SessionSettings {
        presence: PresenceTopic::new("gw01.example.net", "mqtt-zabbix"),
        topic: "/raw/#".to_string(),
        qos: 2,
        delays,
    }
}

pub fn manager(
    broker: ScriptedBroker,
    sink: RecordingSink,
    delays: Delays,
) -> LifecycleManager<ScriptedBroker, RecordingSink> {
    let dispatcher = dispatcher(
        &[("sensors/kitchen/power", "power.kitchen::host1")],
        "monitor01",
        sink,
    );
    LifecycleManager::new(broker, dispatcher, settings(delays))
}

//! Broker session lifecycle.
//!
//! A single loop owns the broker session and drives an explicit state machine:
//!
//! ```text
//!                 start
//! Disconnected ----------> Connecting <---------------------------+
//!                           |  ^   |                               |
//!          server unavailable  |   | connected                     | session dropped
//!          / connect failure   |   v                               | (wait, retry)
//!          (wait, retry) ------+  Connected -----------------------+
//!                           |          |
//!           fatal refusal   |          | shutdown requested
//!                           v          v
//!                      Terminated   Disconnecting --> Disconnected
//! ```
//!
//! Events are handled one at a time, in delivery order. Retry waits are plain
//! sleeps on the loop; only a shutdown request can cut them short.

use std::ops::ControlFlow;
use std::time::Duration;

use thiserror::Error;
use zbxbridge_framework::{OFFLINE, ONLINE, PresenceTopic, Shutdown};

use crate::broker::{Broker, BrokerEvent, ConnectRefusal};
use crate::config::ReconnectConfig;
use crate::dispatcher::Dispatcher;
use crate::forwarder::MetricSink;

/// Presence markers are published with QoS 0, always retained.
const PRESENCE_QOS: u8 = 0;

/// Session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Terminated,
}

/// The single session state instance owned by the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    phase: Phase,
    retry_delay: Duration,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: Phase::Disconnected,
            retry_delay: Duration::ZERO,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Delay applied by the most recent retry wait, zero once connected.
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }
}

/// Fatal outcome of the session loop.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Connection refused: {0}")]
    Refused(ConnectRefusal),
}

/// Fixed delays of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delays {
    /// After a "server unavailable" refusal.
    pub unavailable: Duration,
    /// After an established session drops.
    pub dropped: Duration,
    /// After a connect attempt fails before the handshake.
    pub connect_failure: Duration,
    /// Bound on waiting for the broker to confirm a clean disconnect.
    pub shutdown_timeout: Duration,
}

impl From<&ReconnectConfig> for Delays {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            unavailable: config.unavailable_delay(),
            dropped: config.dropped_delay(),
            connect_failure: config.connect_failure_delay(),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

/// Static session parameters.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Presence topic for the online/offline markers.
    pub presence: PresenceTopic,
    /// Inbound subscription pattern.
    pub topic: String,
    /// Subscription QoS.
    pub qos: u8,
    pub delays: Delays,
}

/// Owns the broker session and feeds the dispatcher while connected.
pub struct LifecycleManager<B: Broker, S: MetricSink> {
    broker: B,
    dispatcher: Dispatcher<S>,
    settings: SessionSettings,
    state: SessionState,
}

impl<B: Broker, S: MetricSink> LifecycleManager<B, S> {
    pub fn new(broker: B, dispatcher: Dispatcher<S>, settings: SessionSettings) -> Self {
        Self {
            broker,
            dispatcher,
            settings,
            state: SessionState::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn dispatcher(&self) -> &Dispatcher<S> {
        &self.dispatcher
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Run until shutdown (`Ok`) or a fatal refusal (`Err`).
    pub async fn run(&mut self, mut shutdown: Shutdown) -> Result<(), LifecycleError> {
        self.start();

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.triggered() => None,
                event = self.broker.next_event() => Some(event),
            };

            let Some(event) = event else {
                self.shutdown().await;
                return Ok(());
            };

            if let ControlFlow::Break(fatal) = self.on_event(event, &mut shutdown).await {
                return Err(fatal);
            }
        }
    }

    /// Begin connecting. The broker connects on the next event poll.
    pub fn start(&mut self) {
        if self.state.phase == Phase::Disconnected {
            self.transition(Phase::Connecting);
            tracing::info!(topic = %self.settings.topic, "Connecting to broker");
        }
    }

    /// Apply one network event to the state machine.
    pub async fn on_event(
        &mut self,
        event: BrokerEvent,
        shutdown: &mut Shutdown,
    ) -> ControlFlow<LifecycleError> {
        match (self.state.phase, event) {
            (Phase::Connecting, BrokerEvent::Connected) => self.on_connected(),

            (Phase::Connecting, BrokerEvent::Refused(refusal)) if refusal.is_transient() => {
                tracing::info!(
                    reason = refusal.reason(),
                    retry_in = ?self.settings.delays.unavailable,
                    "Connection refused, retrying"
                );
                self.wait(self.settings.delays.unavailable, shutdown).await;
            }

            (_, BrokerEvent::Refused(refusal)) => {
                tracing::error!(
                    reason = refusal.reason(),
                    code = refusal.code(),
                    "Connection refused"
                );
                self.transition(Phase::Terminated);
                return ControlFlow::Break(LifecycleError::Refused(refusal));
            }

            (Phase::Connecting, BrokerEvent::Dropped(reason)) => {
                tracing::info!(
                    error = %reason,
                    retry_in = ?self.settings.delays.connect_failure,
                    "Connection failed, retrying"
                );
                self.wait(self.settings.delays.connect_failure, shutdown)
                    .await;
            }

            (Phase::Connected, BrokerEvent::Dropped(reason)) => {
                self.on_session_lost(&reason, shutdown).await;
            }

            (Phase::Connected, BrokerEvent::Closed) => {
                self.on_session_lost("session closed", shutdown).await;
            }

            (Phase::Connected, BrokerEvent::Message(msg)) => {
                tracing::debug!(
                    topic = %msg.topic,
                    qos = msg.qos,
                    bytes = msg.payload.len(),
                    "Received message"
                );
                self.dispatcher.dispatch(&msg).await;
            }

            (phase, BrokerEvent::Message(msg)) => {
                tracing::debug!(topic = %msg.topic, ?phase, "Ignoring message outside a session");
            }

            (phase, event) => {
                tracing::trace!(?phase, ?event, "Ignoring event");
            }
        }

        ControlFlow::Continue(())
    }

    fn on_connected(&mut self) {
        self.transition(Phase::Connected);
        self.state.retry_delay = Duration::ZERO;
        tracing::info!(presence = %self.settings.presence, "Connected to broker");

        if let Err(e) =
            self.broker
                .publish(self.settings.presence.as_str(), ONLINE, true, PRESENCE_QOS)
        {
            tracing::warn!(error = %e, "Failed to publish online marker");
        }

        if let Err(e) = self.broker.subscribe(&self.settings.topic, self.settings.qos) {
            tracing::warn!(error = %e, topic = %self.settings.topic, "Failed to subscribe");
        } else {
            tracing::debug!(topic = %self.settings.topic, qos = self.settings.qos, "Subscribed");
        }
    }

    async fn on_session_lost(&mut self, reason: &str, shutdown: &mut Shutdown) {
        tracing::warn!(
            error = %reason,
            retry_in = ?self.settings.delays.dropped,
            "Unexpected disconnection, reconnecting"
        );
        self.transition(Phase::Connecting);
        self.wait(self.settings.delays.dropped, shutdown).await;
    }

    /// Leave the session. Publishes the offline marker first when connected.
    async fn shutdown(&mut self) {
        if self.state.phase == Phase::Connected {
            self.transition(Phase::Disconnecting);
            tracing::info!("Disconnecting from broker");

            if let Err(e) =
                self.broker
                    .publish(self.settings.presence.as_str(), OFFLINE, true, PRESENCE_QOS)
            {
                tracing::warn!(error = %e, "Failed to publish offline marker");
            }

            match self.broker.disconnect() {
                Ok(()) => {
                    let drain = tokio::time::timeout(
                        self.settings.delays.shutdown_timeout,
                        self.drain(),
                    );
                    if drain.await.is_err() {
                        tracing::warn!("Timed out waiting for a clean disconnect");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to disconnect"),
            }
        } else {
            tracing::info!(phase = ?self.state.phase, "Shutdown requested without a session");
        }

        self.transition(Phase::Disconnected);

        let stats = self.dispatcher.stats();
        tracing::info!(
            forwarded = stats.forwarded,
            unrouted = stats.unrouted,
            transform_failed = stats.transform_failed,
            send_failed = stats.send_failed,
            "Session closed"
        );
    }

    /// Poll until the broker confirms the close. Inbound messages are dropped.
    async fn drain(&mut self) {
        loop {
            match self.broker.next_event().await {
                BrokerEvent::Closed => return,
                BrokerEvent::Dropped(reason) => {
                    tracing::debug!(error = %reason, "Session ended while disconnecting");
                    return;
                }
                BrokerEvent::Message(msg) => {
                    tracing::debug!(topic = %msg.topic, "Dropping message received while disconnecting");
                }
                _ => {}
            }
        }
    }

    /// Fixed-delay retry wait, cut short by a shutdown request.
    async fn wait(&mut self, delay: Duration, shutdown: &mut Shutdown) {
        self.state.retry_delay = delay;
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.triggered() => {
                tracing::debug!("Retry wait interrupted by shutdown");
            }
        }
    }

    fn transition(&mut self, next: Phase) {
        tracing::debug!(from = ?self.state.phase, to = ?next, "Session phase");
        self.state.phase = next;
    }
}

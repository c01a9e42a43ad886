//! Broker capability and its MQTT implementation.
//!
//! The lifecycle manager only sees [`Broker`]: a stream of [`BrokerEvent`]s
//! plus publish/subscribe/disconnect requests. [`MqttBroker`] implements it
//! over `rumqttc`, whose event loop (re)connects on the next poll after a
//! failure, so connecting is driven by calling [`Broker::next_event`].

use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, LastWill, MqttOptions,
    Outgoing, Packet, QoS,
};
use thiserror::Error;
use zbxbridge_framework::{OFFLINE, PresenceTopic};

use crate::config::MqttConfig;

/// Pending requests buffered between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 16;

/// Decode error text of a CONNACK with an unknown return code.
const INVALID_RETURN_CODE: &str = "Invalid Connect return code:";

/// One message delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>, qos: u8) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
        }
    }
}

/// Reason the broker refused a connection (CONNACK return code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectRefusal {
    /// 1: unacceptable protocol version
    ProtocolVersion,
    /// 2: identifier rejected
    IdentifierRejected,
    /// 3: server unavailable
    ServerUnavailable,
    /// 4: bad user name or password
    BadCredentials,
    /// 5: not authorised
    NotAuthorized,
    /// Any other non-zero code
    Unrecognized(u8),
}

impl ConnectRefusal {
    /// Map a CONNACK return code; `None` for success.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => None,
            1 => Some(Self::ProtocolVersion),
            2 => Some(Self::IdentifierRejected),
            3 => Some(Self::ServerUnavailable),
            4 => Some(Self::BadCredentials),
            5 => Some(Self::NotAuthorized),
            other => Some(Self::Unrecognized(other)),
        }
    }

    /// The CONNACK return code.
    pub fn code(&self) -> u8 {
        match self {
            Self::ProtocolVersion => 1,
            Self::IdentifierRejected => 2,
            Self::ServerUnavailable => 3,
            Self::BadCredentials => 4,
            Self::NotAuthorized => 5,
            Self::Unrecognized(code) => *code,
        }
    }

    /// Only "server unavailable" is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ServerUnavailable)
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::ProtocolVersion => "unacceptable protocol version",
            Self::IdentifierRejected => "identifier rejected",
            Self::ServerUnavailable => "server unavailable",
            Self::BadCredentials => "bad user name or password",
            Self::NotAuthorized => "not authorised",
            Self::Unrecognized(_) => "unrecognized refusal",
        }
    }
}

impl std::fmt::Display for ConnectRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.reason(), self.code())
    }
}

/// Network events relevant to the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// Handshake succeeded.
    Connected,
    /// Handshake answered with a refusal.
    Refused(ConnectRefusal),
    /// Inbound publish on a subscribed topic.
    Message(InboundMessage),
    /// Transport failure or broker-initiated close.
    Dropped(String),
    /// Our own disconnect went out.
    Closed,
    /// Anything else (acks, pings).
    Other,
}

/// A broker request could not be queued.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker request failed: {0}")]
    Request(String),
}

/// Publish/subscribe capability consumed by the lifecycle manager.
///
/// Only used generically on the single-threaded runtime, so the returned
/// futures need no `Send` bound.
#[allow(async_fn_in_trait)]
pub trait Broker {
    /// Wait for the next network event, connecting first if needed.
    async fn next_event(&mut self) -> BrokerEvent;

    fn publish(&mut self, topic: &str, payload: &str, retain: bool, qos: u8)
    -> Result<(), BrokerError>;

    fn subscribe(&mut self, pattern: &str, qos: u8) -> Result<(), BrokerError>;

    fn disconnect(&mut self) -> Result<(), BrokerError>;
}

/// `rumqttc` backed broker session.
pub struct MqttBroker {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl MqttBroker {
    /// Prepare a session. The last will (offline marker, retained) is
    /// registered here, before the first connect attempt.
    pub fn new(config: &MqttConfig, client_id: String, presence: &PresenceTopic) -> Self {
        let (client, eventloop) =
            AsyncClient::new(options(config, client_id, presence), REQUEST_CAPACITY);
        Self { client, eventloop }
    }
}

/// Connection options: keep-alive, credentials and the offline last will.
pub fn options(config: &MqttConfig, client_id: String, presence: &PresenceTopic) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, config.host.as_str(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keepalive_secs));
    options.set_last_will(LastWill::new(
        presence.as_str(),
        OFFLINE,
        QoS::AtMostOnce,
        true,
    ));

    if let Some(username) = &config.username {
        let password = config.password.clone().unwrap_or_default();
        options.set_credentials(username.as_str(), password);
    }

    options
}

impl Broker for MqttBroker {
    async fn next_event(&mut self) -> BrokerEvent {
        match self.eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => match refusal(ack.code) {
                None => BrokerEvent::Connected,
                Some(refused) => BrokerEvent::Refused(refused),
            },
            Ok(Event::Incoming(Packet::Publish(publish))) => BrokerEvent::Message(InboundMessage {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
                qos: publish.qos as u8,
            }),
            Ok(Event::Incoming(Packet::Disconnect)) => {
                BrokerEvent::Dropped("broker closed the session".to_string())
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => BrokerEvent::Closed,
            Ok(event) => {
                tracing::trace!(?event, "MQTT event");
                BrokerEvent::Other
            }
            Err(ConnectionError::ConnectionRefused(code)) => match refusal(code) {
                Some(refused) => BrokerEvent::Refused(refused),
                None => BrokerEvent::Other,
            },
            Err(e) => match unrecognized_refusal(&e) {
                Some(refused) => BrokerEvent::Refused(refused),
                None => BrokerEvent::Dropped(e.to_string()),
            },
        }
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &str,
        retain: bool,
        qos: u8,
    ) -> Result<(), BrokerError> {
        self.client
            .try_publish(topic, qos_level(qos), retain, payload.as_bytes().to_vec())
            .map_err(|e| BrokerError::Request(e.to_string()))
    }

    fn subscribe(&mut self, pattern: &str, qos: u8) -> Result<(), BrokerError> {
        self.client
            .try_subscribe(pattern, qos_level(qos))
            .map_err(|e| BrokerError::Request(e.to_string()))
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.client
            .try_disconnect()
            .map_err(|e| BrokerError::Request(e.to_string()))
    }
}

fn refusal(code: ConnectReturnCode) -> Option<ConnectRefusal> {
    let code = match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    };
    ConnectRefusal::from_code(code)
}

/// A CONNACK carrying a return code outside the MQTT 3.1.1 catalogue.
///
/// The client rejects such a packet while decoding it and reports an
/// `InvalidData` I/O error naming the code.
fn unrecognized_refusal(err: &ConnectionError) -> Option<ConnectRefusal> {
    let ConnectionError::Io(io) = err else {
        return None;
    };
    if io.kind() != std::io::ErrorKind::InvalidData {
        return None;
    }

    let text = io.to_string();
    let (_, code) = text.split_once(INVALID_RETURN_CODE)?;
    let code: u8 = code.trim().parse().ok()?;
    ConnectRefusal::from_code(code)
}

/// Map a validated 0..=2 level to the client's QoS.
pub fn qos_level(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

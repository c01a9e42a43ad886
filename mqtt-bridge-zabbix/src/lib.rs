//! MQTT to Zabbix bridge.
//!
//! Subscribes to an MQTT topic pattern, maps each routed topic to a Zabbix
//! item key and host, and forwards the payload to a Zabbix server.
//!
//! # Data flow
//!
//! ```text
//! broker -> LifecycleManager -> Dispatcher -> RoutingTable -> MetricTransformer -> ZabbixSender
//! ```
//!
//! # Presence
//!
//! While connected the bridge keeps a retained `"1"` on
//! `clients/<host>/<app-name>/state`; a clean shutdown publishes `"0"`, and the
//! broker publishes `"0"` through the last will if the session vanishes.

pub mod broker;
pub mod config;
pub mod dispatcher;
pub mod forwarder;
pub mod lifecycle;
pub mod routing;
pub mod transform;

use std::sync::Arc;

use anyhow::Context;
use zbxbridge_framework::{PresenceTopic, Shutdown};

use crate::broker::MqttBroker;
use crate::config::ZabbixBridgeConfig;
use crate::dispatcher::Dispatcher;
use crate::forwarder::ZabbixSender;
use crate::lifecycle::{Delays, LifecycleManager, SessionSettings};
use crate::routing::RoutingTable;
use crate::transform::MetricTransformer;

/// Run the bridge until shutdown or a fatal connection refusal.
pub async fn run(config: ZabbixBridgeConfig, shutdown: Shutdown) -> anyhow::Result<()> {
    let table = RoutingTable::load(&config.routing.keyfile).with_context(|| {
        format!(
            "Failed to load routing table from {}",
            config.routing.keyfile.display()
        )
    })?;

    let app_name = &config.presence.app_name;
    let presence = match &config.presence.hostname {
        Some(hostname) => PresenceTopic::new(hostname, app_name),
        None => PresenceTopic::for_local_host(app_name),
    };
    let client_id = config.mqtt.client_id(app_name);

    tracing::info!(
        host = %config.mqtt.host,
        port = config.mqtt.port,
        client_id = %client_id,
        zabbix = %format!("{}:{}", config.zabbix.server, config.zabbix.port),
        default_host = %config.routing.default_host,
        "Bridge configured"
    );

    let broker = MqttBroker::new(&config.mqtt, client_id, &presence);
    let dispatcher = Dispatcher::new(
        Arc::new(table),
        MetricTransformer::new(config.routing.default_host.clone()),
        ZabbixSender::from_config(&config.zabbix),
    );
    let settings = SessionSettings {
        presence,
        topic: config.mqtt.topic.clone(),
        qos: config.mqtt.qos,
        delays: Delays::from(&config.reconnect),
    };

    LifecycleManager::new(broker, dispatcher, settings)
        .run(shutdown)
        .await?;

    Ok(())
}

//! MQTT to Zabbix bridge.
//!
//! Subscribes to MQTT topics and forwards routed messages to a Zabbix server.
//! Exits with a failure status if the routing table cannot be loaded or the
//! broker refuses the connection for a non-transient reason.

use anyhow::Result;
use mqtt_bridge_zabbix::config::{APP_NAME, ZabbixBridgeConfig};
use zbxbridge_framework::run_bridge;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    run_bridge::<ZabbixBridgeConfig, _, _>(APP_NAME, "mqtt-zabbix.json5", mqtt_bridge_zabbix::run)
        .await
}

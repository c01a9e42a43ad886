//! Configuration for the MQTT to Zabbix bridge.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use zbxbridge_framework::{BridgeConfig, BridgeError, LoggingConfig};

/// Default application name, used in the presence topic and client id.
pub const APP_NAME: &str = "mqtt-zabbix";

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZabbixBridgeConfig {
    /// MQTT broker settings
    pub mqtt: MqttConfig,

    /// Zabbix server settings
    pub zabbix: ZabbixConfig,

    /// Topic to item key mapping
    pub routing: RoutingConfig,

    /// Presence marker settings
    #[serde(default)]
    pub presence: PresenceConfig,

    /// Retry delays
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// MQTT broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host name or address
    pub host: String,

    /// Broker port (default: 1883)
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Topic pattern to subscribe to (default: "/raw/#")
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Subscription QoS, 0..=2 (default: 2)
    #[serde(default = "default_qos")]
    pub qos: u8,

    /// Keep-alive interval in seconds (default: 60)
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,

    /// Client identifier (default: "<app_name>_<pid>")
    #[serde(default)]
    pub client_id: Option<String>,

    /// Optional broker user name
    #[serde(default)]
    pub username: Option<String>,

    /// Optional broker password
    #[serde(default)]
    pub password: Option<String>,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_topic() -> String {
    "/raw/#".to_string()
}

fn default_qos() -> u8 {
    2
}

fn default_keepalive() -> u64 {
    60
}

/// Zabbix server (trapper) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZabbixConfig {
    /// Zabbix server host name or address
    pub server: String,

    /// Trapper port (default: 10051)
    #[serde(default = "default_zabbix_port")]
    pub port: u16,

    /// Timeout for one send (connect + write + reply) in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_zabbix_port() -> u16 {
    10051
}

fn default_timeout_ms() -> u64 {
    5000
}

/// Routing table source and host fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// CSV file of `topic,key::host` records
    pub keyfile: PathBuf,

    /// Host used for entries that do not name one
    pub default_host: String,
}

/// Presence marker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Application name in the presence topic
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Host name in the presence topic (default: local host name)
    #[serde(default)]
    pub hostname: Option<String>,
}

fn default_app_name() -> String {
    APP_NAME.to_string()
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            hostname: None,
        }
    }
}

/// Fixed retry delays of the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay after the broker refuses with "server unavailable"
    #[serde(default = "default_unavailable_delay")]
    pub unavailable_delay_secs: u64,

    /// Delay after an established session drops
    #[serde(default = "default_dropped_delay")]
    pub dropped_delay_secs: u64,

    /// Delay after a connect attempt fails before any handshake
    #[serde(default = "default_connect_failure_delay")]
    pub connect_failure_delay_secs: u64,

    /// Upper bound on draining a clean disconnect
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_unavailable_delay() -> u64 {
    30
}

fn default_dropped_delay() -> u64 {
    5
}

fn default_connect_failure_delay() -> u64 {
    10
}

fn default_shutdown_timeout() -> u64 {
    5
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            unavailable_delay_secs: default_unavailable_delay(),
            dropped_delay_secs: default_dropped_delay(),
            connect_failure_delay_secs: default_connect_failure_delay(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl ReconnectConfig {
    pub fn unavailable_delay(&self) -> Duration {
        Duration::from_secs(self.unavailable_delay_secs)
    }

    pub fn dropped_delay(&self) -> Duration {
        Duration::from_secs(self.dropped_delay_secs)
    }

    pub fn connect_failure_delay(&self) -> Duration {
        Duration::from_secs(self.connect_failure_delay_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl MqttConfig {
    /// Client identifier to present to the broker.
    pub fn client_id(&self, app_name: &str) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("{}_{}", app_name, std::process::id()))
    }
}

impl BridgeConfig for ZabbixBridgeConfig {
    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> Result<(), BridgeError> {
        if self.mqtt.host.is_empty() {
            return Err(BridgeError::validation("mqtt.host cannot be empty"));
        }
        if self.mqtt.port == 0 {
            return Err(BridgeError::validation("mqtt.port cannot be 0"));
        }
        if self.mqtt.topic.is_empty() {
            return Err(BridgeError::validation("mqtt.topic cannot be empty"));
        }
        if self.mqtt.qos > 2 {
            return Err(BridgeError::validation(format!(
                "mqtt.qos must be 0, 1 or 2 (got {})",
                self.mqtt.qos
            )));
        }
        if self.zabbix.server.is_empty() {
            return Err(BridgeError::validation("zabbix.server cannot be empty"));
        }
        if self.zabbix.port == 0 {
            return Err(BridgeError::validation("zabbix.port cannot be 0"));
        }
        if self.routing.keyfile.as_os_str().is_empty() {
            return Err(BridgeError::validation("routing.keyfile cannot be empty"));
        }
        if self.routing.default_host.is_empty() {
            return Err(BridgeError::validation(
                "routing.default_host cannot be empty",
            ));
        }
        if self.presence.app_name.is_empty() {
            return Err(BridgeError::validation("presence.app_name cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
    {
        mqtt: { host: "broker.local" },
        zabbix: { server: "zabbix.local" },
        routing: { keyfile: "/etc/mqtt-zabbix/keys.csv", default_host: "monitor01" },
    }
    "#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = ZabbixBridgeConfig::parse(MINIMAL).unwrap();

        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.topic, "/raw/#");
        assert_eq!(config.mqtt.qos, 2);
        assert_eq!(config.mqtt.keepalive_secs, 60);
        assert_eq!(config.zabbix.port, 10051);
        assert_eq!(config.presence.app_name, APP_NAME);
        assert_eq!(config.reconnect.unavailable_delay(), Duration::from_secs(30));
        assert_eq!(config.reconnect.dropped_delay(), Duration::from_secs(5));
        assert_eq!(
            config.reconnect.connect_failure_delay(),
            Duration::from_secs(10)
        );
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_full_config() {
        let json5 = r#"
        {
            mqtt: {
                host: "broker.local",
                port: 8883,
                topic: "sensors/#",
                qos: 1,
                client_id: "bridge-a",
                username: "bridge",
                password: "secret",
            },
            zabbix: { server: "zabbix.local", port: 10052, timeout_ms: 1500 },
            routing: { keyfile: "keys.csv", default_host: "monitor01" },
            presence: { app_name: "bridge", hostname: "gw01.example.net" },
            reconnect: { unavailable_delay_secs: 1, dropped_delay_secs: 2 },
            logging: { level: "debug", format: "json" },
        }
        "#;

        let config = ZabbixBridgeConfig::parse(json5).unwrap();

        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.qos, 1);
        assert_eq!(config.mqtt.client_id("ignored"), "bridge-a");
        assert_eq!(config.mqtt.username.as_deref(), Some("bridge"));
        assert_eq!(config.zabbix.timeout_ms, 1500);
        assert_eq!(config.presence.hostname.as_deref(), Some("gw01.example.net"));
        assert_eq!(config.reconnect.unavailable_delay_secs, 1);
        assert_eq!(config.reconnect.connect_failure_delay_secs, 10);
    }

    #[test]
    fn test_default_client_id_uses_pid() {
        let config = ZabbixBridgeConfig::parse(MINIMAL).unwrap();
        let id = config.mqtt.client_id(APP_NAME);

        assert_eq!(id, format!("mqtt-zabbix_{}", std::process::id()));
    }

    #[test]
    fn test_invalid_qos() {
        let json5 = MINIMAL.replace("host: \"broker.local\"", "host: \"broker.local\", qos: 3");
        let result = ZabbixBridgeConfig::parse(&json5);

        assert!(matches!(result, Err(BridgeError::ConfigValidation(_))));
    }

    #[test]
    fn test_empty_default_host_rejected() {
        let json5 = MINIMAL.replace("\"monitor01\"", "\"\"");
        let result = ZabbixBridgeConfig::parse(&json5);

        assert!(matches!(result, Err(BridgeError::ConfigValidation(_))));
    }

    #[test]
    fn test_missing_section() {
        let result = ZabbixBridgeConfig::parse("{ mqtt: { host: 'x' } }");
        assert!(matches!(result, Err(BridgeError::ConfigParse(_))));
    }

    #[test]
    fn test_sample_config_parses() {
        let config =
            ZabbixBridgeConfig::parse(include_str!("../configs/mqtt-zabbix.json5")).unwrap();

        assert_eq!(config.routing.keyfile, PathBuf::from("configs/keys.csv"));
        assert_eq!(config.reconnect, ReconnectConfig::default());
    }
}

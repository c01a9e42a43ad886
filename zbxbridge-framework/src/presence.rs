//! Presence markers for bridge liveness.
//!
//! A bridge announces itself with a retained message on a well-known topic so
//! that observers can tell whether it is running, even after a crash (the
//! broker publishes the offline marker on the bridge's behalf through the
//! last will).
//!
//! # Topic
//!
//! - `clients/<host-fqdn>/<app-name>/state`, where the host defaults to
//!   [`local_fqdn`]
//!
//! # Payloads
//!
//! - [`ONLINE`] (`"1"`) published on every successful connect
//! - [`OFFLINE`] (`"0"`) published on clean shutdown and registered as last will

/// Payload announcing the bridge is online.
pub const ONLINE: &str = "1";

/// Payload announcing the bridge is offline.
pub const OFFLINE: &str = "0";

/// The presence topic of one bridge instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceTopic {
    topic: String,
}

impl PresenceTopic {
    /// Build the presence topic for a host and application name.
    pub fn new(hostname: &str, app_name: &str) -> Self {
        Self {
            topic: format!("clients/{}/{}/state", hostname, app_name),
        }
    }

    /// Build the presence topic using the local fully qualified host name.
    pub fn for_local_host(app_name: &str) -> Self {
        Self::new(&local_fqdn(), app_name)
    }

    /// The full topic string.
    pub fn as_str(&self) -> &str {
        &self.topic
    }
}

impl std::fmt::Display for PresenceTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.topic)
    }
}

/// `AI_CANONNAME` flag of `getaddrinfo`, the same value on every supported platform.
const AI_CANONNAME: i32 = 0x0002;

/// Local host name, or `"localhost"` if it cannot be determined.
pub fn local_hostname() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to determine host name, using 'localhost'");
            "localhost".to_string()
        }
    }
}

/// Fully qualified name of the local host.
///
/// Falls back to the plain host name when the resolver has no dotted
/// canonical name for it.
pub fn local_fqdn() -> String {
    resolve_fqdn(&local_hostname())
}

/// Qualify `host` through the resolver's canonical name.
///
/// Names that already contain a dot are returned unchanged.
pub fn resolve_fqdn(host: &str) -> String {
    if host.contains('.') {
        return host.to_string();
    }

    let hints = dns_lookup::AddrInfoHints {
        flags: AI_CANONNAME,
        ..dns_lookup::AddrInfoHints::default()
    };

    match dns_lookup::getaddrinfo(Some(host), None, Some(hints)) {
        Ok(addrs) => addrs
            .filter_map(Result::ok)
            .filter_map(|addr| addr.canonname)
            .find(|name| name.contains('.'))
            .unwrap_or_else(|| host.to_string()),
        Err(e) => {
            tracing::debug!(host, error = ?e, "Canonical name lookup failed, using host name");
            host.to_string()
        }
    }
}

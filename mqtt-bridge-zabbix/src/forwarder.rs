//! Metric forwarding to a Zabbix server.
//!
//! Metrics are sent with the Zabbix sender (trapper) protocol, one TCP
//! connection per metric:
//!
//! ```text
//! "ZBXD" | 0x01 | data length (u32 LE) | reserved (u32 LE) | JSON body
//! ```
//!
//! Request body:
//!
//! ```json
//! {"request":"sender data","data":[{"host":"h","key":"k","value":"1","clock":1700000000}],"clock":1700000000}
//! ```
//!
//! The server replies with the same framing and a body such as
//! `{"response":"success","info":"processed: 1; failed: 0; total: 1; seconds spent: 0.000055"}`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use zbxbridge_common::{NormalizedMetric, current_timestamp_secs};

use crate::config::ZabbixConfig;

/// Protocol signature opening every frame.
pub const SIGNATURE: &[u8; 4] = b"ZBXD";

/// Header flag for an uncompressed frame.
pub const FLAG_STANDARD: u8 = 0x01;

/// Signature, flag, data length and reserved field.
pub const HEADER_LEN: usize = 13;

/// Largest reply body accepted from the server.
const MAX_REPLY_LEN: usize = 1024 * 1024;

/// Failure to deliver one metric.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Zabbix server {addr} unreachable: {reason}")]
    Unreachable { addr: String, reason: String },

    #[error("Zabbix server rejected metric: {0}")]
    Rejected(String),

    #[error("Malformed metric exchange: {0}")]
    Malformed(String),
}

/// Destination for normalized metrics.
///
/// One call is exactly one delivery attempt. Implementations never retry.
/// Awaited inline by the single-threaded dispatcher, so no `Send` bound.
#[allow(async_fn_in_trait)]
pub trait MetricSink {
    async fn send(&mut self, metric: &NormalizedMetric) -> Result<(), SendError>;
}

/// Zabbix trapper client.
#[derive(Debug, Clone)]
pub struct ZabbixSender {
    addr: String,
    timeout: Duration,
}

impl ZabbixSender {
    /// Create a sender for `host:port`.
    pub fn new(server: &str, port: u16, timeout: Duration) -> Self {
        Self {
            addr: format!("{}:{}", server, port),
            timeout,
        }
    }

    /// Create a sender from the `zabbix` config section.
    pub fn from_config(config: &ZabbixConfig) -> Self {
        Self::new(
            &config.server,
            config.port,
            Duration::from_millis(config.timeout_ms),
        )
    }

    /// Server address this sender targets.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn exchange(&self, frame: &[u8]) -> Result<Vec<u8>, SendError> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| self.unreachable(e))?;

        stream.write_all(frame).await.map_err(|e| self.unreachable(e))?;

        let mut header = [0u8; HEADER_LEN];
        stream
            .read_exact(&mut header)
            .await
            .map_err(|e| self.unreachable(e))?;
        let len = decode_header(&header)?;

        let mut body = vec![0u8; len];
        stream
            .read_exact(&mut body)
            .await
            .map_err(|e| self.unreachable(e))?;

        Ok(body)
    }

    fn unreachable(&self, err: impl std::fmt::Display) -> SendError {
        SendError::Unreachable {
            addr: self.addr.clone(),
            reason: err.to_string(),
        }
    }
}

impl MetricSink for ZabbixSender {
    async fn send(&mut self, metric: &NormalizedMetric) -> Result<(), SendError> {
        // Built before connecting: a malformed metric never reaches the wire.
        let frame = encode_request(metric, current_timestamp_secs())?;

        let body = tokio::time::timeout(self.timeout, self.exchange(&frame))
            .await
            .map_err(|_| self.unreachable(format!("timed out after {:?}", self.timeout)))??;

        let reply = decode_reply(&body)?;
        tracing::trace!(info = ?reply.info, "Zabbix reply");
        reply.check()
    }
}

#[derive(Serialize)]
struct SenderRequest<'a> {
    request: &'static str,
    data: [&'a NormalizedMetric; 1],
    clock: i64,
}

/// Reply body of the trapper.
#[derive(Debug, Clone, Deserialize)]
pub struct SenderReply {
    pub response: String,
    #[serde(default)]
    pub info: Option<String>,
}

impl SenderReply {
    /// Interpret the reply for a single-metric request.
    pub fn check(&self) -> Result<(), SendError> {
        let info = self.info.clone().unwrap_or_default();

        if self.response != "success" {
            return Err(SendError::Rejected(format!("{}: {}", self.response, info)));
        }

        match failed_count(&info) {
            Some(0) | None => Ok(()),
            Some(_) => Err(SendError::Rejected(info)),
        }
    }
}

/// Frame a single metric as a sender request.
pub fn encode_request(metric: &NormalizedMetric, clock: i64) -> Result<Vec<u8>, SendError> {
    if metric.host.is_empty() {
        return Err(SendError::Malformed("empty host".to_string()));
    }
    if metric.key.is_empty() {
        return Err(SendError::Malformed("empty key".to_string()));
    }

    let request = SenderRequest {
        request: "sender data",
        data: [metric],
        clock,
    };
    let body = serde_json::to_vec(&request).map_err(|e| SendError::Malformed(e.to_string()))?;

    Ok(frame(&body))
}

/// Prefix a body with the protocol header.
pub fn frame(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(SIGNATURE);
    out.push(FLAG_STANDARD);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(body);
    out
}

/// Validate a header and return the body length it announces.
pub fn decode_header(header: &[u8; HEADER_LEN]) -> Result<usize, SendError> {
    if &header[..4] != SIGNATURE {
        return Err(SendError::Malformed("missing ZBXD signature".to_string()));
    }
    if header[4] != FLAG_STANDARD {
        return Err(SendError::Malformed(format!(
            "unsupported header flags {:#04x}",
            header[4]
        )));
    }

    let len = u32::from_le_bytes([header[5], header[6], header[7], header[8]]) as usize;
    if len > MAX_REPLY_LEN {
        return Err(SendError::Malformed(format!("reply of {} bytes too large", len)));
    }

    Ok(len)
}

/// Parse a reply body.
pub fn decode_reply(body: &[u8]) -> Result<SenderReply, SendError> {
    serde_json::from_slice(body).map_err(|e| SendError::Malformed(format!("bad reply: {}", e)))
}

/// Extract `failed: N` from the reply info string.
fn failed_count(info: &str) -> Option<u64> {
    let rest = &info[info.find("failed:")? + "failed:".len()..];
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

//! Zabbix sender against a local fake trapper.

use std::time::Duration;

use mqtt_bridge_zabbix::forwarder::{
    HEADER_LEN, MetricSink, SendError, ZabbixSender, decode_header, frame,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use zbxbridge_common::NormalizedMetric;

/// Accept one connection, capture the request body and answer with `reply`.
async fn fake_trapper(reply: &'static str) -> (ZabbixSender, JoinHandle<serde_json::Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let mut header = [0u8; HEADER_LEN];
        stream.read_exact(&mut header).await.unwrap();
        let len = decode_header(&header).unwrap();
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.unwrap();

        stream.write_all(&frame(reply.as_bytes())).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    });

    let sender = ZabbixSender::new("127.0.0.1", port, Duration::from_secs(2));
    (sender, handle)
}

#[tokio::test]
async fn test_send_accepted() {
    let (mut sender, server) = fake_trapper(
        r#"{"response":"success","info":"processed: 1; failed: 0; total: 1; seconds spent: 0.000055"}"#,
    )
    .await;

    let metric = NormalizedMetric::at("host1", "power.kitchen", "1", 1_700_000_000);
    sender.send(&metric).await.unwrap();

    let request = server.await.unwrap();
    assert_eq!(request["request"], "sender data");
    assert_eq!(request["data"].as_array().unwrap().len(), 1);
    assert_eq!(request["data"][0]["host"], "host1");
    assert_eq!(request["data"][0]["key"], "power.kitchen");
    assert_eq!(request["data"][0]["value"], "1");
    assert_eq!(request["data"][0]["clock"], 1_700_000_000i64);
    assert!(request["clock"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_send_item_rejected() {
    let (mut sender, server) = fake_trapper(
        r#"{"response":"success","info":"processed: 0; failed: 1; total: 1; seconds spent: 0.000041"}"#,
    )
    .await;

    let metric = NormalizedMetric::at("unknown-host", "power.kitchen", "1", 1_700_000_000);
    let result = sender.send(&metric).await;

    assert!(matches!(result, Err(SendError::Rejected(info)) if info.contains("failed: 1")));
    server.await.unwrap();
}

#[tokio::test]
async fn test_send_garbage_reply() {
    let (mut sender, server) = fake_trapper("not json").await;

    let metric = NormalizedMetric::at("host1", "power.kitchen", "0", 1_700_000_000);
    let result = sender.send(&metric).await;

    assert!(matches!(result, Err(SendError::Malformed(_))));
    server.await.unwrap();
}

#[tokio::test]
async fn test_send_times_out_on_silent_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // Accept and hold the connection without ever answering.
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(stream);
    });

    let mut sender = ZabbixSender::new("127.0.0.1", port, Duration::from_millis(100));
    let metric = NormalizedMetric::at("host1", "power.kitchen", "1", 1_700_000_000);

    let result = tokio::time::timeout(Duration::from_secs(2), sender.send(&metric))
        .await
        .expect("send bounded by its own timeout");

    assert!(
        matches!(result, Err(SendError::Unreachable { ref reason, .. }) if reason.contains("timed out"))
    );
    server.abort();
}

#[tokio::test]
async fn test_each_send_is_a_single_attempt() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // Close every connection immediately and count them.
    let server = tokio::spawn(async move {
        let mut accepted = 0usize;
        while let Ok(Ok((stream, _))) =
            tokio::time::timeout(Duration::from_millis(300), listener.accept()).await
        {
            accepted += 1;
            drop(stream);
        }
        accepted
    });

    let mut sender = ZabbixSender::new("127.0.0.1", port, Duration::from_secs(1));
    let metric = NormalizedMetric::at("host1", "power.kitchen", "1", 1_700_000_000);
    assert!(matches!(
        sender.send(&metric).await,
        Err(SendError::Unreachable { .. })
    ));

    assert_eq!(server.await.unwrap(), 1);
}

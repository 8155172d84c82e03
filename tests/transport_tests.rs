//! Transport behaviour under concurrency, stalls, cancellation and faults.

mod common;

use arest_link::port::{MockPortOpener, MockRead, MockSerialPort};
use arest_link::transport::{ResponseFrame, SerialTransport, Transport, WatchdogState};
use arest_link::{Arest, ArestClient, ArestError, ArestResult, CancelToken, Config, ConfigError};
use async_trait::async_trait;
use common::{return_value, variable, TestHarness};
use serde_json::json;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Reads `name` on a background task with a token that never fires.
fn spawn_read(harness: &Arc<TestHarness>, name: &'static str) -> JoinHandle<ArestResult<()>> {
    let harness = Arc::clone(harness);
    tokio::spawn(async move {
        let cancel = CancelToken::new();
        harness.client.read_value(&cancel, name).await.map(drop)
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_never_interleave() {
    let harness = Arc::new(TestHarness::new().await);
    for i in 0..16 {
        let name = format!("v{i}");
        harness
            .port()
            .reply(&format!("/{name}"), variable(&name, &i.to_string()));
    }

    let mut handles = Vec::new();
    for i in 0..16 {
        let harness = Arc::clone(&harness);
        handles.push(tokio::spawn(async move {
            let cancel = CancelToken::new();
            let name = format!("v{i}");
            let value = harness.client.read_value(&cancel, &name).await.unwrap();
            assert_eq!(value, json!(i));
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let port = harness.port();
    assert_eq!(port.written_lines().len(), 16);
    assert_eq!(port.overlapping_writes(), 0);
    assert_eq!(harness.transport().metrics().requests, 16);
}

#[tokio::test]
async fn test_stall_resets_port_and_next_request_uses_new_one() {
    let harness = TestHarness::with_ports(2).await;
    let client = &harness.client;
    let reply = variable("temperature", "22");
    harness.ports[1].reply("/temperature", reply);
    let cancel = CancelToken::new();

    let started = Instant::now();
    let err = client.read_value(&cancel, "temperature").await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, ArestError::Timeout(t) if t == Duration::from_millis(250)));
    assert!(elapsed >= Duration::from_millis(250), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "returned after {elapsed:?}");
    assert_eq!(harness.opener.opened(), 2);
    assert_eq!(harness.transport().watchdog_state(), WatchdogState::Idle);

    let value = client.read_value(&cancel, "temperature").await.unwrap();
    assert_eq!(value, json!(22));
    assert_eq!(harness.ports[0].written_lines(), vec!["/temperature"]);
    assert_eq!(harness.ports[1].written_lines(), vec!["/temperature"]);

    let metrics = harness.transport().metrics();
    assert_eq!(metrics.stalls, 1);
    assert_eq!(metrics.reconnects, 1);
}

#[tokio::test]
async fn test_waiting_request_runs_after_stall_recovery() {
    let harness = Arc::new(TestHarness::with_ports(2).await);
    harness.ports[1].reply("/fast", variable("fast", "1"));

    let stalled = spawn_read(&harness, "slow");
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(harness.transport().watchdog_state(), WatchdogState::Armed);

    // Queued behind the stalled request, so it lands on the reopened port.
    let cancel = CancelToken::new();
    let answer = harness.client.read_value(&cancel, "fast").await;

    assert!(matches!(stalled.await.unwrap(), Err(ArestError::Timeout(_))));
    assert_eq!(answer.unwrap(), json!(1));
    assert_eq!(harness.ports[0].written_lines(), vec!["/slow"]);
    assert_eq!(harness.ports[1].written_lines(), vec!["/fast"]);
}

#[tokio::test]
async fn test_reconnect_gives_up_then_recovers_on_next_request() {
    let harness = TestHarness::new().await;
    let client = &harness.client;
    let cancel = CancelToken::new();
    harness.opener.fail_next_opens(3);

    let err = client.read_value(&cancel, "x").await.unwrap_err();
    assert!(matches!(err, ArestError::Timeout(_)));
    assert_eq!(harness.opener.attempts(), 4);
    assert_eq!(harness.opener.opened(), 1);
    assert_eq!(harness.transport().watchdog_state(), WatchdogState::Idle);

    // The transport is disconnected; the next request reopens first.
    harness.port().reply("/x", variable("x", "7"));
    assert_eq!(client.read_value(&cancel, "x").await.unwrap(), json!(7));
    assert_eq!(harness.opener.opened(), 2);
}

#[tokio::test]
async fn test_disconnected_transport_reports_open_error() {
    let harness = TestHarness::new().await;
    let client = &harness.client;
    let cancel = CancelToken::new();
    harness.opener.fail_next_opens(6);

    let err = client.read_value(&cancel, "x").await.unwrap_err();
    assert!(matches!(err, ArestError::Timeout(_)));

    let err = client.read_value(&cancel, "x").await.unwrap_err();
    match err {
        ArestError::Open { address, .. } => assert_eq!(address, common::ADDRESS),
        other => panic!("expected open error, got {other:?}"),
    }
    // Nothing was written while the port was closed.
    assert_eq!(harness.port().written_lines(), vec!["/x"]);

    harness.port().reply("/x", variable("x", "1"));
    assert_eq!(client.read_value(&cancel, "x").await.unwrap(), json!(1));
}

#[tokio::test]
async fn test_cancel_in_flight_returns_promptly_without_reset() {
    let harness = TestHarness::new().await;
    let client = &harness.client;

    let cancel = CancelToken::with_timeout(Duration::from_millis(40));
    let started = Instant::now();
    let err = client.read_value(&cancel, "slow").await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_millis(250));
    assert_eq!(harness.opener.opened(), 1);
    assert_eq!(harness.transport().metrics().stalls, 0);
    assert_eq!(harness.transport().watchdog_state(), WatchdogState::Idle);

    // The gate was released and the same port still works.
    harness.port().reply("/ok", variable("ok", "true"));
    let cancel = CancelToken::new();
    let value = client.read_value(&cancel, "ok").await.unwrap();
    assert_eq!(value, json!(true));
}

#[tokio::test]
async fn test_cancel_while_waiting_for_gate() {
    let harness = Arc::new(TestHarness::new().await);

    let stalled = spawn_read(&harness, "slow");
    tokio::time::sleep(Duration::from_millis(20)).await;

    let cancel = CancelToken::with_timeout(Duration::from_millis(20));
    let client = &harness.client;
    let err = client.read_value(&cancel, "queued").await.unwrap_err();
    assert!(err.is_cancelled());
    let written = harness.port().written_lines();
    assert!(!written.contains(&"/queued".to_string()));

    assert!(matches!(stalled.await.unwrap(), Err(ArestError::Timeout(_))));
}

#[tokio::test]
async fn test_zero_length_read_ends_frame() {
    let harness = TestHarness::new().await;
    let (client, port) = (&harness.client, harness.port());
    let cancel = CancelToken::new();

    // Unterminated payload followed by EOF still forms a frame.
    port.reply_with(
        "/",
        vec![MockRead::data("{\"variables\": {\"a\": 1}}"), MockRead::Eof],
    );
    let values = client.read_values(&cancel).await.unwrap();
    assert_eq!(values["a"], json!(1));

    // EOF with nothing before it is an empty frame.
    port.reply_with("/x", vec![MockRead::Eof]);
    let err = client.read_value(&cancel, "x").await.unwrap_err();
    assert!(matches!(err, ArestError::MalformedResponse { .. }));
}

#[tokio::test]
async fn test_split_terminator_across_reads() {
    let harness = TestHarness::new().await;
    harness.port().reply_with(
        "/digital/9",
        vec![
            MockRead::data("{\"return_value\""),
            MockRead::data(": 1}\r"),
            MockRead::data("\n"),
        ],
    );

    let cancel = CancelToken::new();
    let level = harness.client.digital_read(&cancel, 9).await.unwrap();
    assert!(level.is_high());
}

#[tokio::test]
async fn test_read_error_mid_frame_keeps_port() {
    let harness = TestHarness::new().await;
    let (client, port) = (&harness.client, harness.port());
    let cancel = CancelToken::new();
    port.reply_with(
        "/digital/3",
        vec![
            MockRead::data("{\"return_"),
            MockRead::Fail(io::ErrorKind::BrokenPipe),
        ],
    );

    let err = client.digital_read(&cancel, 3).await.unwrap_err();
    assert!(matches!(err, ArestError::Read(_)));
    assert!(err.is_transport());

    port.reply("/digital/3", return_value(0));
    assert!(client.digital_read(&cancel, 3).await.unwrap().is_low());
    assert_eq!(harness.opener.opened(), 1);
}

#[tokio::test]
async fn test_stale_bytes_are_discarded_before_write() {
    let harness = TestHarness::new().await;
    let port = harness.port();
    port.enqueue_read(b"{\"return_value\": 0}\r\n");
    port.reply("/digital/5", return_value(1));

    let cancel = CancelToken::new();
    let level = harness.client.digital_read(&cancel, 5).await.unwrap();
    assert!(level.is_high());
    assert!(port.clear_count() >= 1);
}

#[tokio::test]
async fn test_explicit_reconnect_opens_next_port() {
    let harness = TestHarness::with_ports(2).await;
    harness.ports[1].reply("/", "{\"variables\": {}}\r\n");
    let cancel = CancelToken::new();

    harness.transport().reconnect(&cancel).await.unwrap();
    let values = harness.client.read_values(&cancel).await.unwrap();

    assert!(values.is_empty());
    let addresses = harness.opener.addresses();
    assert_eq!(addresses, vec![common::ADDRESS, common::ADDRESS]);
}

/// A canned backend, standing in for a non-serial transport.
struct CannedTransport {
    body: &'static str,
}

#[async_trait]
impl Transport for CannedTransport {
    async fn request(&self, cancel: &CancelToken, _command: &str) -> ArestResult<ResponseFrame> {
        cancel.check()?;
        Ok(ResponseFrame::from(self.body))
    }
}

#[tokio::test]
async fn test_client_over_custom_transport() {
    let client = ArestClient::new(CannedTransport {
        body: "{\"return_value\": 42}",
    });
    let result = client
        .call_function(&CancelToken::new(), "answer", "")
        .await
        .unwrap();
    assert_eq!(result, 42);
}

fn configured(address: Option<&str>) -> Config {
    let mut config = Config::default();
    config.serial.address = address.map(str::to_string);
    config
        .serial
        .port_aliases
        .insert("uno".to_string(), "/dev/ttyACM5".to_string());
    config.serial.settle_ms = 0;
    config.serial.poll_interval_ms = 5;
    config
}

#[tokio::test]
async fn test_from_config_resolves_alias() {
    let port = MockSerialPort::new("MOCK0");
    port.reply("/", "{\"variables\": {\"a\": 1}}\r\n");
    let opener = MockPortOpener::new(port.clone());

    let config = configured(Some("uno"));
    let transport = SerialTransport::from_config_with(&config, Arc::new(opener.clone()))
        .await
        .unwrap();
    assert_eq!(transport.address(), "/dev/ttyACM5");
    assert_eq!(opener.addresses(), vec!["/dev/ttyACM5"]);

    let values = ArestClient::new(transport)
        .read_values(&CancelToken::new())
        .await
        .unwrap();
    assert_eq!(values["a"], json!(1));
}

#[tokio::test]
async fn test_from_config_without_address() {
    let opener = MockPortOpener::new(MockSerialPort::new("MOCK0"));

    let err = SerialTransport::from_config_with(&configured(None), Arc::new(opener.clone()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ArestError::Config(ConfigError::MissingRequired(key)) if key == "serial.address"
    ));
    assert_eq!(opener.attempts(), 0);
}

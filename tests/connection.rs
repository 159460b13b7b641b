//! Connection handle behavior against the mock gateway.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use push_client::connection::{Connection, Context, ConnectionState, Request, Response};
use push_client::error::SubmissionError;
use push_client::mock::{self, GatewayOptions, MockConnector};
use push_client::monitor::Monitor;
use push_client::protocol::frame::Frame;
use push_client::protocol::ErrorCode;
use push_client::Error;

mod common;

use common::ScriptedConnector;

fn connection(connector: &MockConnector) -> Connection {
    Connection::new(
        mock::endpoint(),
        Arc::new(connector.clone()),
        &common::fast_config(),
        Monitor::new(),
    )
}

fn request(id: &str, responses: mpsc::UnboundedSender<(Response, Option<Context>)>) -> Request {
    Request::post("/3/device/0123456789abcdef", r#"{"aps":{"alert":"Hi"}}"#)
        .with_header("apns-id", id)
        .with_delegate(Arc::new(move |response: Response, context: Option<Context>| {
            let _ = responses.send((response, context));
        }))
}

#[tokio::test]
async fn repeated_connect_opens_one_transport() {
    let connector = MockConnector::new(GatewayOptions::default());
    let connection = connection(&connector);

    for _ in 0..5 {
        connection.connect().unwrap();
    }
    connection.wait_connected(Duration::from_secs(5)).await.unwrap();
    connection.connect().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(connector.attempts(), 1);
    assert_eq!(connection.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn correlation_id_and_context_round_trip() {
    let connector = MockConnector::new(GatewayOptions::default());
    let connection = connection(&connector);
    let (tx, mut rx) = mpsc::unbounded_channel();

    connection.connect().unwrap();
    let context: Context = Arc::new(7u32);
    connection
        .post(request("00000000-0000-0000-0000-0000000000ff", tx).with_context(context))
        .unwrap();

    let (response, context) = rx.recv().await.unwrap();
    assert_eq!(response.id(), Some("00000000-0000-0000-0000-0000000000ff"));
    assert_eq!(response.unformatted_id(None).as_deref(), Some("ff"));
    assert!(response.is_success());
    let context = context.unwrap();
    assert_eq!(context.downcast_ref::<u32>(), Some(&7));
    assert!(common::eventually(Duration::from_secs(1), || connection.in_flight() == 0).await);
}

#[tokio::test]
async fn request_carries_pseudo_headers_and_caller_headers() {
    let connector = MockConnector::new(GatewayOptions::default());
    let connection = connection(&connector);
    let (tx, mut rx) = mpsc::unbounded_channel();

    connection.connect().unwrap();
    connection
        .post(request("wire-check", tx).with_header("apns-priority", 5))
        .unwrap();
    rx.recv().await.unwrap();

    let headers = connector.gateway().requests()[0].headers.clone();
    let names: Vec<&str> = headers.iter().map(|(name, _)| name).collect();
    assert_eq!(
        names,
        vec![
            ":method",
            ":path",
            ":scheme",
            ":authority",
            "content-length",
            "apns-id",
            "apns-priority"
        ]
    );
    assert_eq!(headers.get(":method"), Some("POST"));
    assert_eq!(headers.get(":scheme"), Some("https"));
    assert_eq!(headers.get(":authority"), Some(mock::MOCK_HOST));
    assert_eq!(headers.get("content-length"), Some("22"));
    assert_eq!(headers.get("apns-priority"), Some("5"));
}

#[tokio::test]
async fn error_responses_expose_reason() {
    let connector = MockConnector::new(GatewayOptions::default());
    connector.gateway().stub_response(400, Some("BadDeviceToken"));
    let connection = connection(&connector);
    let (tx, mut rx) = mpsc::unbounded_channel();

    connection.connect().unwrap();
    connection.post(request("bad", tx)).unwrap();

    let (response, _) = rx.recv().await.unwrap();
    assert_eq!(response.status(), Some(400));
    assert!(!response.is_success());
    assert_eq!(response.failure_reason().as_deref(), Some("BadDeviceToken"));
    assert_eq!(response.to_string(), "400 (Bad request): BadDeviceToken");
}

#[tokio::test]
async fn disconnect_drops_queued_requests() {
    let connector = MockConnector::new(GatewayOptions::default());
    let connection = connection(&connector);
    let (tx, mut rx) = mpsc::unbounded_channel();

    for n in 0..3 {
        connection.post(request(&format!("queued-{n}"), tx.clone())).unwrap();
    }
    drop(tx);
    assert_eq!(connection.in_flight(), 3);

    connection.disconnect().await.unwrap();
    assert!(!connection.is_connected());
    assert_eq!(connection.in_flight(), 0);
    assert!(rx.recv().await.is_none(), "no delegate may run");
    assert_eq!(connector.attempts(), 0);
    assert_eq!(connector.gateway().request_count(), 0);
}

#[tokio::test]
async fn disconnect_sends_goaway() {
    let connector = MockConnector::new(GatewayOptions::default());
    let connection = connection(&connector);

    connection.connect().unwrap();
    connection.wait_connected(Duration::from_secs(5)).await.unwrap();
    connection.disconnect().await.unwrap();

    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert!(
        common::eventually(Duration::from_secs(1), || {
            connector.gateway().goaways() == 1
        })
        .await
    );
}

#[tokio::test]
async fn post_without_delegate_is_rejected() {
    let connector = MockConnector::new(GatewayOptions::default());
    let connection = connection(&connector);

    let err = connection
        .post(Request::post("/3/device/abc", "{}"))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Submission(SubmissionError::MissingDelegate)
    ));
    assert_eq!(connection.in_flight(), 0);
}

#[tokio::test]
async fn ping_reports_liveness() {
    let connector = MockConnector::new(GatewayOptions::default());
    let connection = connection(&connector);
    assert!(matches!(connection.ping().await, Err(Error::NotConnected)));

    connection.connect().unwrap();
    connection.wait_connected(Duration::from_secs(5)).await.unwrap();
    connection.ping().await.unwrap();
    assert!(connection.is_alive(Duration::from_secs(1)).await);
}

#[tokio::test(start_paused = true)]
async fn unanswered_ping_is_not_alive() {
    let connector = MockConnector::new(GatewayOptions {
        answer_pings: false,
        ..GatewayOptions::default()
    });
    let connection = connection(&connector);

    connection.connect().unwrap();
    connection.wait_connected(Duration::from_secs(5)).await.unwrap();
    assert!(!connection.is_alive(Duration::from_millis(200)).await);
    assert!(matches!(
        connection.ping().await,
        Err(Error::TimedOut { .. })
    ));
}

#[tokio::test]
async fn shutdown_stops_the_worker() {
    let connector = MockConnector::new(GatewayOptions::default());
    let connection = connection(&connector);

    connection.connect().unwrap();
    connection.wait_connected(Duration::from_secs(5)).await.unwrap();
    connection.shutdown().await.unwrap();

    assert!(!connection.is_connected());
    assert!(common::eventually(Duration::from_secs(1), || {
        matches!(connection.connect(), Err(Error::WorkerStopped))
    })
    .await);
}

#[tokio::test(start_paused = true)]
async fn peer_that_stops_reading_trips_the_heartbeat() {
    // The peer reads the preface once, then never again.
    let connector = ScriptedConnector::new(512, |mut io: tokio::io::DuplexStream| async move {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let settings = common::encode(&[common::server_settings()]);
        if io.write_all(&settings).await.is_err() {
            return;
        }
        let mut chunk = [0u8; 64];
        let _ = io.read(&mut chunk).await;
        std::future::pending::<()>().await;
    });
    let config = push_client::config::ConnectionConfig {
        heartbeat_interval_ms: 1_000,
        heartbeat_timeout_ms: 500,
        reconnect: false,
        ..common::fast_config()
    };
    let connection = Connection::new(mock::endpoint(), Arc::new(connector.clone()), &config, Monitor::new());
    let (tx, _rx) = mpsc::unbounded_channel();

    connection.connect().unwrap();
    connection.wait_connected(Duration::from_secs(5)).await.unwrap();
    let body = vec![b'x'; 16 * 1024];
    connection
        .post(
            Request::post("/3/device/0123456789abcdef", body)
                .with_header("apns-id", "stalled")
                .with_delegate(Arc::new(move |response: Response, context: Option<Context>| {
                    let _ = tx.send((response, context));
                })),
        )
        .unwrap();

    assert!(
        common::eventually(Duration::from_secs(10), || !connection.is_connected()).await,
        "heartbeat must fire while the write is stuck"
    );
    assert_eq!(connection.in_flight(), 0);
    tokio::time::timeout(Duration::from_secs(5), connection.disconnect())
        .await
        .expect("disconnect is processed")
        .unwrap();
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn protocol_error_during_handshake_is_not_retried() {
    let connector = ScriptedConnector::new(4096, |io: tokio::io::DuplexStream| {
        common::write_then_hold(
            io,
            vec![Frame::Ping {
                ack: false,
                payload: [7; 8],
            }],
        )
    });
    let client = connector.client(&common::fast_config());
    client.connect().unwrap();

    let result = client
        .group(Duration::from_secs(60), |group| {
            group.send_notification(&common::notification("never-sent"), None, |_, _| {})
        })
        .await;

    match result {
        Err(Error::GroupWait(cause)) => {
            assert!(matches!(*cause, Error::Protocol(_)), "unexpected cause: {cause}")
        }
        other => panic!("expected protocol failure, got {other:?}"),
    }
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.attempts(), 1);
    assert_eq!(
        client.pool().connections()[0].state(),
        ConnectionState::Disconnected
    );
}

#[tokio::test]
async fn reset_stream_completes_the_request() {
    let connector = ScriptedConnector::new(1 << 16, |mut io: tokio::io::DuplexStream| async move {
        use tokio::io::AsyncWriteExt;
        if io.write_all(&common::encode(&[common::server_settings()])).await.is_err() {
            return;
        }
        let mut buf = Vec::new();
        while let Some(stream_id) = common::next_request_stream(&mut io, &mut buf).await {
            let reset = common::encode(&[Frame::RstStream {
                stream_id,
                code: ErrorCode::RefusedStream,
            }]);
            if io.write_all(&reset).await.is_err() {
                return;
            }
        }
    });
    let connection = Connection::new(
        mock::endpoint(),
        Arc::new(connector.clone()),
        &common::fast_config(),
        Monitor::new(),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();

    connection.connect().unwrap();
    connection.post(request("refused", tx)).unwrap();

    let (response, _) = rx.recv().await.unwrap();
    assert_eq!(response.reset(), Some(ErrorCode::RefusedStream));
    assert_eq!(response.id(), Some("refused"));
    assert_eq!(response.status(), None);
    assert!(common::eventually(Duration::from_secs(1), || connection.in_flight() == 0).await);
    assert!(connection.is_connected());
}

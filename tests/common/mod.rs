//! Shared utilities for integration testing: helpers around the crate's
//! mock gateway plus a connector that runs a hand-written peer.

#![allow(dead_code)]

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::Instant;

use push_client::client::Notification;
use push_client::config::ConnectionConfig;
use push_client::mock::{self, MockConnector};
use push_client::net::{BoxedIo, Connector, Endpoint};
use push_client::protocol::frame::{decode_frame, Frame, PREFACE};
use push_client::protocol::settings::Setting;
use push_client::Client;

/// Runs `script` as the peer of every connection it opens.
#[derive(Clone)]
pub struct ScriptedConnector<F> {
    script: F,
    capacity: usize,
    attempts: Arc<AtomicUsize>,
}

impl<F, Fut> ScriptedConnector<F>
where
    F: Fn(DuplexStream) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    pub fn new(capacity: usize, script: F) -> Self {
        Self {
            script,
            capacity,
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn client(&self, config: &ConnectionConfig) -> Client {
        let pool = push_client::ConnectionPool::new(
            mock::endpoint(),
            Arc::new(self.clone()),
            config,
            1,
        );
        Client::new(pool, Some(mock::DEFAULT_TOPIC.into()))
    }
}

impl<F, Fut> Connector for ScriptedConnector<F>
where
    F: Fn(DuplexStream) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn connect(&self, _endpoint: &Endpoint) -> BoxFuture<'static, io::Result<BoxedIo>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let (client, server) = tokio::io::duplex(self.capacity);
        tokio::spawn((self.script)(server));
        Box::pin(async move { Ok(Box::new(client) as BoxedIo) })
    }
}

pub fn encode(frames: &[Frame]) -> Vec<u8> {
    let mut buf = Vec::new();
    for frame in frames {
        frame.encode(&mut buf);
    }
    buf
}

pub fn server_settings() -> Frame {
    Frame::Settings {
        ack: false,
        params: vec![Setting::MaxConcurrentStreams(10)],
    }
}

/// Read from `io` until a complete HEADERS frame arrives and return its
/// stream id, or `None` once the client goes away.
pub async fn next_request_stream(io: &mut DuplexStream, buf: &mut Vec<u8>) -> Option<u32> {
    let mut chunk = [0u8; 4096];
    loop {
        if buf.starts_with(PREFACE) {
            buf.drain(..PREFACE.len());
        }
        while let Ok(Some((frame, used))) = decode_frame(buf, 1 << 20) {
            buf.drain(..used);
            if let Frame::Headers { stream_id, .. } = frame {
                return Some(stream_id);
            }
        }
        match io.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

/// Write `frames` and keep the peer's end open without reading further.
pub async fn write_then_hold(mut io: DuplexStream, frames: Vec<Frame>) {
    if io.write_all(&encode(&frames)).await.is_ok() {
        std::future::pending::<()>().await;
    }
}

/// Connection settings with short heartbeats suitable for tests.
pub fn fast_config() -> ConnectionConfig {
    ConnectionConfig {
        heartbeat_interval_ms: 60_000,
        heartbeat_timeout_ms: 1_000,
        ..ConnectionConfig::default()
    }
}

pub fn client(connector: &MockConnector, config: &ConnectionConfig) -> Client {
    mock::client(connector, config)
}

pub fn notification(id: &str) -> Notification {
    let payload = json!({"alert": "Hello", "badge": 1});
    Notification::new("0123456789abcdef")
        .with_id(id)
        .with_payload(payload.as_object().cloned().unwrap())
}

/// Poll `condition` every 10ms until it holds or `limit` passes.
pub async fn eventually<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

//! Connector handing out in-memory transports served by a [`MockGateway`].

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::BoxFuture;
use tokio::time::Instant;

use crate::mock::gateway::{GatewayOptions, MockGateway};
use crate::net::{BoxedIo, Connector, Endpoint};

const DUPLEX_CAPACITY: usize = 1 << 20;

/// Opens a fresh gateway connection per connect attempt, optionally
/// refusing the first few attempts.
#[derive(Debug, Clone)]
pub struct MockConnector {
    gateway: Arc<MockGateway>,
    refuse_first: usize,
    attempts: Arc<AtomicUsize>,
    attempt_times: Arc<Mutex<Vec<Instant>>>,
}

impl MockConnector {
    pub fn new(options: GatewayOptions) -> Self {
        Self::with_gateway(Arc::new(MockGateway::new(options)))
    }

    pub fn with_gateway(gateway: Arc<MockGateway>) -> Self {
        Self {
            gateway,
            refuse_first: 0,
            attempts: Arc::new(AtomicUsize::new(0)),
            attempt_times: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Refuse the first `attempts` connect attempts.
    pub fn refusing_first(mut self, attempts: usize) -> Self {
        self.refuse_first = attempts;
        self
    }

    pub fn gateway(&self) -> &Arc<MockGateway> {
        &self.gateway
    }

    /// Connect attempts made so far, refused ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// When each attempt was made.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempt_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Connector for MockConnector {
    fn connect(&self, endpoint: &Endpoint) -> BoxFuture<'static, io::Result<BoxedIo>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.attempt_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Instant::now());

        if attempt <= self.refuse_first {
            tracing::debug!(endpoint = %endpoint, attempt, "Mock connector refusing attempt");
            return Box::pin(async move {
                Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("refused attempt {attempt}"),
                ))
            });
        }

        let (client, server) = tokio::io::duplex(DUPLEX_CAPACITY);
        tokio::spawn(Arc::clone(&self.gateway).serve(server));
        Box::pin(async move { Ok(Box::new(client) as BoxedIo) })
    }
}

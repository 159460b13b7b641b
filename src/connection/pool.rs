//! Round-robin pool of interchangeable connections.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::monitor::Monitor;
use crate::net::{Connector, Endpoint};

/// N connections to the same endpoint sharing one [`Monitor`].
///
/// A fatal fault on any member wakes every group waiting on the pool.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    connections: Arc<Vec<Connection>>,
    counter: Arc<AtomicUsize>,
    monitor: Monitor,
}

impl ConnectionPool {
    /// Spawn `size` disconnected connections. A size of zero is treated
    /// as one.
    pub fn new(
        endpoint: Endpoint,
        connector: Arc<dyn Connector>,
        config: &ConnectionConfig,
        size: usize,
    ) -> Self {
        let monitor = Monitor::new();
        let connections = (0..size.max(1))
            .map(|_| {
                Connection::new(
                    endpoint.clone(),
                    Arc::clone(&connector),
                    config,
                    monitor.clone(),
                )
            })
            .collect();
        Self {
            connections: Arc::new(connections),
            counter: Arc::new(AtomicUsize::new(0)),
            monitor,
        }
    }

    /// The next connection in rotation, preferring connected members.
    pub fn next(&self) -> &Connection {
        let start = self.counter.fetch_add(1, Ordering::Relaxed);
        let len = self.connections.len();

        for i in 0..len {
            let connection = &self.connections[(start + i) % len];
            if connection.is_connected() {
                return connection;
            }
        }
        // Nobody is connected yet; requests queue on whichever is next.
        &self.connections[start % len]
    }

    pub fn connect_all(&self) -> Result<()> {
        for connection in self.connections.iter() {
            connection.connect()?;
        }
        Ok(())
    }

    pub async fn disconnect_all(&self) -> Result<()> {
        for connection in self.connections.iter() {
            connection.disconnect().await?;
        }
        Ok(())
    }

    /// Whether every member is connected.
    pub fn is_connected(&self) -> bool {
        self.connections.iter().all(Connection::is_connected)
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::PlainConnector;

    fn pool(size: usize) -> ConnectionPool {
        ConnectionPool::new(
            Endpoint::new("127.0.0.1", 1, false),
            Arc::new(PlainConnector),
            &ConnectionConfig::default(),
            size,
        )
    }

    #[tokio::test]
    async fn rotates_when_nothing_is_connected() {
        let pool = pool(3);
        let first = pool.next().id();
        let second = pool.next().id();
        let third = pool.next().id();
        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_eq!(pool.next().id(), first);
    }

    #[tokio::test]
    async fn zero_size_still_has_a_connection() {
        let pool = pool(0);
        assert_eq!(pool.len(), 1);
        assert!(!pool.is_connected());
    }
}

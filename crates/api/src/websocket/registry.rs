//! Connection registry
//!
//! The single source of truth for who is online. One live connection per
//! party: a newer connection for the same identity replaces the old one,
//! and a stale close can never evict its replacement.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use deskwire_shared::PartyIdentity;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::Connection;
use super::events::ServerEvent;

/// Outcome of a best-effort push to a party
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The party has no live connection. Not an error: the store already
    /// holds the message for later reads.
    NotConnected,
}

/// Shared registry of live connections, keyed by party identity
#[derive(Clone)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<PartyIdentity, Arc<Connection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a connection as the one live handle for its identity.
    ///
    /// Any existing connection for the same identity is told it was
    /// replaced, closed, and returned. The write lock spans the check and
    /// the insert, so concurrent opens leave exactly one winner.
    pub async fn register(&self, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        let mut connections = self.connections.write().await;
        let evicted = connections.insert(conn.identity.clone(), Arc::clone(&conn));
        tracing::info!(
            identity = %conn.identity,
            connection_id = %conn.id,
            replaced = evicted.is_some(),
            total_connections = connections.len(),
            "Connection registered"
        );
        drop(connections);

        if let Some(old) = &evicted {
            // Best-effort notice; the close itself is what matters
            old.send(ServerEvent::replaced());
            old.close();
        }

        evicted
    }

    /// Remove the mapping, but only while `connection_id` still owns it.
    /// A close arriving after a replacement must leave the replacement alone.
    pub async fn unregister(&self, identity: &PartyIdentity, connection_id: Uuid) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(identity) {
            Some(current) if current.id == connection_id => {
                connections.remove(identity);
                tracing::info!(
                    identity = %identity,
                    connection_id = %connection_id,
                    total_connections = connections.len(),
                    "Connection unregistered"
                );
                true
            }
            _ => false,
        }
    }

    /// Best-effort push to a party. A connection that cannot take the event
    /// is treated as dead: closed and evicted like any other disconnect.
    pub async fn send_to(&self, identity: &PartyIdentity, event: ServerEvent) -> Delivery {
        let conn = {
            let connections = self.connections.read().await;
            connections.get(identity).cloned()
        };

        let Some(conn) = conn else {
            return Delivery::NotConnected;
        };

        if conn.send(event) {
            return Delivery::Delivered;
        }

        tracing::warn!(
            identity = %identity,
            connection_id = %conn.id,
            "Unresponsive connection evicted on send"
        );
        conn.close();
        self.unregister(identity, conn.id).await;
        Delivery::NotConnected
    }

    /// Look up the live connection for an identity
    pub async fn connection(&self, identity: &PartyIdentity) -> Option<Arc<Connection>> {
        self.connections.read().await.get(identity).cloned()
    }

    /// Live connection count, straight from the map
    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Close and remove every connection idle longer than `max_idle`.
    /// Returns the evicted handles.
    pub async fn sweep_idle(&self, max_idle: Duration) -> Vec<Arc<Connection>> {
        let mut connections = self.connections.write().await;
        let idle: Vec<PartyIdentity> = connections
            .iter()
            .filter(|(_, conn)| conn.idle_for() > max_idle)
            .map(|(identity, _)| identity.clone())
            .collect();

        let mut evicted = Vec::with_capacity(idle.len());
        for identity in idle {
            if let Some(conn) = connections.remove(&identity) {
                conn.close();
                evicted.push(conn);
            }
        }

        if !evicted.is_empty() {
            tracing::info!(
                evicted = evicted.len(),
                total_connections = connections.len(),
                "Idle connections swept"
            );
        }

        evicted
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_connection(identity: PartyIdentity) -> (Arc<Connection>, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(Connection::new(identity, tx)), rx)
    }

    #[tokio::test]
    async fn test_register_and_count() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = test_connection(PartyIdentity::customer("CUS1"));

        assert!(registry.register(conn).await.is_none());
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_register_replaces_existing_connection() {
        let registry = ConnectionRegistry::new();
        let identity = PartyIdentity::customer("CUS1");

        let (first, mut first_rx) = test_connection(identity.clone());
        let (second, _second_rx) = test_connection(identity.clone());
        let first_id = first.id;

        registry.register(first).await;
        let evicted = registry.register(Arc::clone(&second)).await.unwrap();

        assert_eq!(evicted.id, first_id);
        assert!(evicted.is_closed());
        assert_eq!(registry.count().await, 1);

        // The loser was told before being cut off
        let notice = first_rx.recv().await.unwrap();
        match notice {
            ServerEvent::System { message, .. } => assert_eq!(message, "connected elsewhere"),
            other => panic!("Expected system notice, got {other:?}"),
        }

        // The survivor is the second connection
        let current = registry.connection(&identity).await.unwrap();
        assert_eq!(current.id, second.id);
    }

    #[tokio::test]
    async fn test_stale_unregister_leaves_replacement_alone() {
        let registry = ConnectionRegistry::new();
        let identity = PartyIdentity::customer("CUS1");

        let (first, _rx1) = test_connection(identity.clone());
        let (second, _rx2) = test_connection(identity.clone());
        let first_id = first.id;

        registry.register(first).await;
        registry.register(Arc::clone(&second)).await;

        // The first session's cleanup runs after its replacement registered
        assert!(!registry.unregister(&identity, first_id).await);
        assert_eq!(registry.count().await, 1);

        assert!(registry.unregister(&identity, second.id).await);
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_send_to_connected_party() {
        let registry = ConnectionRegistry::new();
        let identity = PartyIdentity::agent("7");
        let (conn, mut rx) = test_connection(identity.clone());
        registry.register(conn).await;

        let delivery = registry.send_to(&identity, ServerEvent::pong()).await;
        assert_eq!(delivery, Delivery::Delivered);
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerEvent::Heartbeat { .. }
        ));
    }

    #[tokio::test]
    async fn test_send_to_absent_party() {
        let registry = ConnectionRegistry::new();
        let delivery = registry
            .send_to(&PartyIdentity::agent("7"), ServerEvent::pong())
            .await;
        assert_eq!(delivery, Delivery::NotConnected);
    }

    #[tokio::test]
    async fn test_send_to_dead_connection_evicts_it() {
        let registry = ConnectionRegistry::new();
        let identity = PartyIdentity::customer("CUS1");
        let (conn, rx) = test_connection(identity.clone());
        registry.register(conn).await;
        drop(rx); // Forwarder gone: the channel rejects every send

        let delivery = registry.send_to(&identity, ServerEvent::pong()).await;
        assert_eq!(delivery, Delivery::NotConnected);
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_idle_evicts_only_stale_connections() {
        let registry = ConnectionRegistry::new();
        let (stale, _rx1) = test_connection(PartyIdentity::customer("CUS1"));
        registry.register(stale).await;

        tokio::time::sleep(Duration::from_millis(20)).await;

        let (fresh, _rx2) = test_connection(PartyIdentity::agent("7"));
        registry.register(Arc::clone(&fresh)).await;
        fresh.mark_activity();

        let evicted = registry.sweep_idle(Duration::from_millis(10)).await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].identity, PartyIdentity::customer("CUS1"));
        assert!(evicted[0].is_closed());
        assert_eq!(registry.count().await, 1);
    }
}

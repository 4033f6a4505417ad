//! Connection Registry
//!
//! Tracks which live connections belong to which user. Connections are
//! in-process WebSocket writers addressed by a per-connection channel; the
//! registry is the single source of delivery targets for fan-out.
//!
//! A failed send is treated as a "gone" signal and deregisters the
//! connection immediately (self-healing); the TTL is only a backstop and no
//! background sweep is required for correctness.

use chrono::{Duration, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::Connection;
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// Serialized event frame handed to a connection's writer task.
pub type OutboundFrame = String;

/// One registered connection: metadata plus its outbound channel.
struct RegisteredConnection {
    meta: Connection,
    sender: mpsc::UnboundedSender<OutboundFrame>,
}

/// In-process registry of live connections.
pub struct ConnectionRegistry {
    /// Connections by connection id
    connections: DashMap<Uuid, RegisteredConnection>,
    /// User id to connection ids (one user can have several devices)
    user_connections: DashMap<i64, Vec<Uuid>>,
    /// TTL backstop applied at register/refresh time
    ttl: Duration,
}

impl ConnectionRegistry {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            connections: DashMap::new(),
            user_connections: DashMap::new(),
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// Register a connection. Idempotent upsert: re-registering the same
    /// connection id refreshes its TTL and replaces the outbound channel.
    pub fn register(
        &self,
        user_id: i64,
        connection_id: Uuid,
        sender: mpsc::UnboundedSender<OutboundFrame>,
    ) {
        let now = Utc::now();
        let connected_at = self
            .connections
            .get(&connection_id)
            .map(|c| c.meta.connected_at)
            .unwrap_or(now);

        self.connections.insert(
            connection_id,
            RegisteredConnection {
                meta: Connection {
                    connection_id,
                    user_id,
                    connected_at,
                    expires_at: now + self.ttl,
                },
                sender,
            },
        );

        let mut conns = self.user_connections.entry(user_id).or_default();
        if !conns.contains(&connection_id) {
            conns.push(connection_id);
        }
        drop(conns);

        metrics::set_live_connections(self.connections.len());
        tracing::info!(
            user_id = user_id,
            connection_id = %connection_id,
            "Connection registered"
        );
    }

    /// Refresh a connection's TTL on inbound activity.
    pub fn refresh(&self, connection_id: Uuid) {
        if let Some(mut conn) = self.connections.get_mut(&connection_id) {
            conn.meta.expires_at = Utc::now() + self.ttl;
        }
    }

    /// Remove one connection.
    pub fn unregister(&self, connection_id: Uuid) {
        if let Some((_, removed)) = self.connections.remove(&connection_id) {
            if let Some(mut conns) = self.user_connections.get_mut(&removed.meta.user_id) {
                conns.retain(|c| *c != connection_id);
            }
            metrics::set_live_connections(self.connections.len());
            tracing::info!(
                user_id = removed.meta.user_id,
                connection_id = %connection_id,
                "Connection unregistered"
            );
        }
    }

    /// Best-effort current set of a user's live connections.
    ///
    /// Connections past their TTL are pruned lazily here instead of by a
    /// background sweep.
    pub fn connections_for(&self, user_id: i64) -> Vec<Connection> {
        let ids: Vec<Uuid> = self
            .user_connections
            .get(&user_id)
            .map(|conns| conns.clone())
            .unwrap_or_default();

        let now = Utc::now();
        let mut live = Vec::with_capacity(ids.len());
        for id in ids {
            let expired = match self.connections.get(&id) {
                Some(conn) if conn.meta.is_expired(now) => true,
                Some(conn) => {
                    live.push(conn.meta.clone());
                    false
                }
                None => false,
            };
            if expired {
                self.unregister(id);
            }
        }
        live
    }

    /// Whether the user has at least one live connection.
    pub fn is_user_online(&self, user_id: i64) -> bool {
        !self.connections_for(user_id).is_empty()
    }

    /// Deliver a frame to one connection.
    ///
    /// A rejected send means the writer task is gone; the connection is
    /// deregistered immediately and the error surfaces so callers can count
    /// the delivery as stale.
    pub fn send(&self, connection_id: Uuid, frame: &OutboundFrame) -> Result<(), AppError> {
        let sent = match self.connections.get(&connection_id) {
            Some(conn) => conn.sender.send(frame.clone()).is_ok(),
            None => {
                return Err(AppError::StaleConnection(format!(
                    "connection {} is not registered",
                    connection_id
                )))
            }
        };

        if !sent {
            self.unregister(connection_id);
            return Err(AppError::StaleConnection(format!(
                "connection {} rejected delivery",
                connection_id
            )));
        }
        Ok(())
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (
        mpsc::UnboundedSender<OutboundFrame>,
        mpsc::UnboundedReceiver<OutboundFrame>,
    ) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = ConnectionRegistry::new(60);
        let id = Uuid::new_v4();
        let (tx, _rx) = channel();

        registry.register(1, id, tx.clone());
        registry.register(1, id, tx);

        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.connections_for(1).len(), 1);
    }

    #[tokio::test]
    async fn test_multiple_connections_per_user() {
        let registry = ConnectionRegistry::new(60);
        let (tx, _rx) = channel();
        let (tx2, _rx2) = channel();

        registry.register(1, Uuid::new_v4(), tx);
        registry.register(1, Uuid::new_v4(), tx2);

        assert_eq!(registry.connections_for(1).len(), 2);
        assert!(registry.is_user_online(1));
        assert!(!registry.is_user_online(2));
    }

    #[tokio::test]
    async fn test_unregister_removes_connection() {
        let registry = ConnectionRegistry::new(60);
        let id = Uuid::new_v4();
        let (tx, _rx) = channel();

        registry.register(1, id, tx);
        registry.unregister(id);

        assert_eq!(registry.connection_count(), 0);
        assert!(registry.connections_for(1).is_empty());
    }

    #[tokio::test]
    async fn test_send_delivers_frame() {
        let registry = ConnectionRegistry::new(60);
        let id = Uuid::new_v4();
        let (tx, mut rx) = channel();

        registry.register(7, id, tx);
        registry.send(id, &"hello".to_string()).unwrap();

        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_failed_send_self_heals() {
        let registry = ConnectionRegistry::new(60);
        let id = Uuid::new_v4();
        let (tx, rx) = channel();
        drop(rx); // writer task is gone

        registry.register(7, id, tx);
        let err = registry.send(id, &"hello".to_string()).unwrap_err();

        assert!(matches!(err, AppError::StaleConnection(_)));
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_connections_are_pruned_lazily() {
        let registry = ConnectionRegistry::new(0); // expire immediately
        let id = Uuid::new_v4();
        let (tx, _rx) = channel();

        registry.register(7, id, tx);
        assert!(registry.connections_for(7).is_empty());
        assert_eq!(registry.connection_count(), 0);
    }
}

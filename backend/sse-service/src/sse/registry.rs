//! SSE Connection Registry
//!
//! Tracks every live client stream by identity and enforces one stream per
//! identity. Supports:
//! - Registration with last-writer-wins replacement
//! - Idempotent removal that disposes the stream
//! - Snapshots by identity, by user, and of all clients
//! - Closing every stream on shutdown

use super::connection::Connection;
use crate::metrics;
use crate::models::ClientIdentity;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared map of live connections
///
/// Cloning is cheap and every clone refers to the same map. Streams are
/// always disposed after the map lock is released.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    /// Map of client identity -> live connection
    connections: Arc<RwLock<HashMap<ClientIdentity, Arc<Connection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection
    ///
    /// If the identity already has a live connection, that connection is
    /// taken out of the map in the same critical section and then closed.
    ///
    /// # Returns
    ///
    /// `true` if an older connection was superseded
    pub async fn add(&self, connection: Arc<Connection>) -> bool {
        let identity = connection.identity().clone();
        let previous = {
            let mut connections = self.connections.write().await;
            connections.insert(identity.clone(), connection)
        };

        match previous {
            Some(previous) => {
                tracing::info!(
                    user_id = %identity.user_id,
                    device_id = ?identity.device_id,
                    "superseding existing stream"
                );
                previous.close().await;
                true
            }
            None => {
                metrics::connection_opened();
                false
            }
        }
    }

    /// Remove whatever connection is registered for `identity`
    ///
    /// Idempotent: removing an unknown identity is a no-op.
    pub async fn remove(&self, identity: &ClientIdentity) {
        let removed = {
            let mut connections = self.connections.write().await;
            connections.remove(identity)
        };

        if let Some(connection) = removed {
            metrics::connection_removed();
            connection.close().await;
        }
    }

    /// Remove `connection` only if it is still the registered one
    ///
    /// A superseded connection tearing itself down must not evict the
    /// connection that replaced it.
    pub async fn remove_connection(&self, connection: &Arc<Connection>) -> bool {
        let removed = {
            let mut connections = self.connections.write().await;
            match connections.get(connection.identity()) {
                Some(current) if Arc::ptr_eq(current, connection) => {
                    connections.remove(connection.identity())
                }
                _ => None,
            }
        };

        let was_registered = removed.is_some();
        if was_registered {
            metrics::connection_removed();
        }
        connection.close().await;
        was_registered
    }

    pub async fn get(&self, identity: &ClientIdentity) -> Option<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections.get(identity).cloned()
    }

    pub async fn exists(&self, identity: &ClientIdentity) -> bool {
        let connections = self.connections.read().await;
        connections.contains_key(identity)
    }

    /// Snapshot of every registered identity
    pub async fn list(&self) -> Vec<ClientIdentity> {
        let connections = self.connections.read().await;
        connections.keys().cloned().collect()
    }

    /// Snapshot of the identities belonging to one user
    pub async fn list_by_user(&self, user_id: &str) -> Vec<ClientIdentity> {
        let connections = self.connections.read().await;
        connections
            .keys()
            .filter(|identity| identity.belongs_to(user_id))
            .cloned()
            .collect()
    }

    /// Number of live streams for a user
    pub async fn user_connection_count(&self, user_id: &str) -> usize {
        let connections = self.connections.read().await;
        connections
            .keys()
            .filter(|identity| identity.belongs_to(user_id))
            .count()
    }

    /// Distinct users with at least one live stream
    pub async fn connected_user_ids(&self) -> Vec<String> {
        let connections = self.connections.read().await;
        let mut user_ids: Vec<String> = connections
            .keys()
            .map(|identity| identity.user_id.clone())
            .collect();
        user_ids.sort();
        user_ids.dedup();
        user_ids
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Close and forget every connection (graceful shutdown)
    pub async fn close_all(&self) {
        let drained: Vec<Arc<Connection>> = {
            let mut connections = self.connections.write().await;
            connections.drain().map(|(_, connection)| connection).collect()
        };

        for connection in drained {
            metrics::connection_removed();
            connection.close().await;
        }
    }
}

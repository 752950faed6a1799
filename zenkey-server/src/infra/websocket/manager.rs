use std::{fmt, sync::Arc};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;
use zenkey_core::ServerEvent;

use super::connection::{Connection, Delivery};

/// The set of open realtime connections.
#[derive(Clone)]
pub struct ConnectionManager {
    /// Active WebSocket connections mapped by connection ID
    connections: Arc<DashMap<Uuid, Arc<Connection>>>,
    /// Copy of every broadcast event, for in-process observers
    feed: Arc<broadcast::Sender<ServerEvent>>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connection_count", &self.connections.len())
            .field("feed_receivers", &self.feed.receiver_count())
            .finish()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);

        Self {
            connections: Arc::new(DashMap::new()),
            feed: Arc::new(tx),
        }
    }

    /// Register a new connection
    pub fn add_connection(&self, connection: Arc<Connection>) {
        self.connections.insert(connection.id, connection);
    }

    /// Remove a connection. Nothing else happens on disconnect.
    pub fn remove_connection(&self, conn_id: Uuid) {
        self.connections.remove(&conn_id);
    }

    pub fn get_connection(&self, conn_id: &Uuid) -> Option<Arc<Connection>> {
        self.connections.get(conn_id).map(|c| c.clone())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Delivers `event` to every open connection. Failures are never
    /// surfaced; connections whose writer is gone are dropped.
    pub fn broadcast(&self, event: ServerEvent) {
        let mut closed = Vec::new();

        for entry in self.connections.iter() {
            match entry.value().send_event(event.clone()) {
                Delivery::Queued => {}
                Delivery::Lagging => {
                    warn!(conn_id = %entry.key(), "outbound queue full; dropping event");
                }
                Delivery::Closed => closed.push(*entry.key()),
            }
        }

        for conn_id in closed {
            debug!(%conn_id, "dropping closed connection");
            self.connections.remove(&conn_id);
        }

        let _ = self.feed.send(event);
    }

    /// Delivers `event` to one connection. Returns false when the connection
    /// is unknown or could not take the event.
    pub fn send_to(&self, conn_id: Uuid, event: ServerEvent) -> bool {
        let Some(connection) = self.get_connection(&conn_id) else {
            return false;
        };
        match connection.send_event(event) {
            Delivery::Queued => true,
            Delivery::Lagging => false,
            Delivery::Closed => {
                self.connections.remove(&conn_id);
                false
            }
        }
    }

    /// Subscribe to every broadcast event
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.feed.subscribe()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

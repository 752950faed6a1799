use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;
use zenkey_core::ServerEvent;

/// Outgoing queue depth per client. A client that falls this far behind is
/// treated as dead.
pub const OUTBOUND_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Outbound queue full; the event was dropped for this client.
    Lagging,
    /// The socket writer is gone.
    Closed,
}

pub struct Connection {
    /// Unique connection ID
    pub id: Uuid,
    /// Identity of the operator whose session token opened the socket
    pub identity: Option<String>,
    pub connected_at: DateTime<Utc>,
    /// Channel to the socket writer task
    sender: mpsc::Sender<ServerEvent>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("connected_at", &self.connected_at)
            .field("channel_closed", &self.sender.is_closed())
            .finish()
    }
}

impl Connection {
    pub fn new(
        identity: Option<String>,
        sender: mpsc::Sender<ServerEvent>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            identity,
            connected_at: Utc::now(),
            sender,
        }
    }

    /// Opaque "may start a scan" flag.
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// Queues `event` without waiting. Events from one sender stay in order.
    pub fn send_event(&self, event: ServerEvent) -> Delivery {
        match self.sender.try_send(event) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Lagging,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Queues `event`, waiting for room in the outbound buffer.
    pub async fn send_message(&self, event: ServerEvent) -> anyhow::Result<()> {
        self.sender.send(event).await.map_err(|_| {
            anyhow::anyhow!("Failed to send message: channel closed")
        })
    }
}

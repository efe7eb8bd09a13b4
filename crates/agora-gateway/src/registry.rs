use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use agora_types::events::ServerFrame;

use crate::error::DeliveryError;

/// Sending half of one live connection. The connection's writer task owns the
/// receiving half and drains it in order, so frames pushed through one handle
/// reach the socket in the order they were pushed.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: Uuid,
    user_id: Uuid,
    tx: mpsc::UnboundedSender<ServerFrame>,
}

impl ConnectionHandle {
    pub fn new(user_id: Uuid) -> (Self, mpsc::UnboundedReceiver<ServerFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            conn_id: Uuid::new_v4(),
            user_id,
            tx,
        };
        (handle, rx)
    }

    pub fn id(&self) -> Uuid {
        self.conn_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Enqueue a frame without waiting on the socket.
    pub fn push(&self, frame: ServerFrame) -> Result<(), DeliveryError> {
        self.tx.send(frame).map_err(|_| DeliveryError::Closed {
            user_id: self.user_id,
            conn_id: self.conn_id,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Tracks at most one live connection per user.
#[derive(Clone, Default)]
pub struct Registry {
    connections: Arc<RwLock<HashMap<Uuid, ConnectionHandle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `user_id` to `handle` from now on. Returns the superseded handle,
    /// if any; it is not closed here.
    pub async fn register(&self, user_id: Uuid, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let previous = self.connections.write().await.insert(user_id, handle);
        if let Some(prev) = &previous {
            debug!("Connection {} for {} superseded", prev.id(), user_id);
        }
        previous
    }

    /// Remove whatever connection `user_id` has. No-op if none.
    pub async fn remove(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.connections.write().await.remove(&user_id)
    }

    /// Remove the entry only if it still belongs to `conn_id`, so a connection
    /// that has been superseded never unregisters its successor.
    pub async fn remove_if_current(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(&user_id) {
            Some(handle) if handle.id() == conn_id => {
                connections.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    pub async fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.connections.read().await.get(&user_id).cloned()
    }
}

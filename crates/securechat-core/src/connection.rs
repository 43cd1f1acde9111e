//! Connection handle: the only view the core has of a client socket.
//!
//! A handle wraps the sending half of a bounded queue. The relay drains the
//! receiving half into the WebSocket. Sends never wait: a full queue means
//! the client is not keeping up and is treated the same as a closed one.

use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::error::TransportError;
use crate::protocol::ServerEvent;

/// Unique per-socket identifier.
pub type ConnId = Uuid;

/// What the socket writer should do next.
#[derive(Debug, Clone)]
pub enum Outbound {
    Event(Arc<ServerEvent>),
    Close,
}

#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnId,
    tx: mpsc::Sender<Outbound>,
}

impl Connection {
    /// Create a handle and the queue the writer task consumes.
    pub fn channel(depth: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn send(&self, event: Arc<ServerEvent>) -> Result<(), TransportError> {
        self.tx.try_send(Outbound::Event(event)).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::Backlogged,
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    /// Ask the writer to close the socket once queued events are flushed.
    pub fn close(&self) {
        let _ = self.tx.try_send(Outbound::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_queue_is_backlogged() {
        let (conn, mut rx) = Connection::channel(1);
        let ev = Arc::new(ServerEvent::Pong);
        conn.send(ev.clone()).unwrap();
        assert_eq!(conn.send(ev.clone()), Err(TransportError::Backlogged));

        assert!(matches!(rx.recv().await, Some(Outbound::Event(_))));
        conn.send(ev).unwrap();
    }

    #[tokio::test]
    async fn dropped_receiver_is_closed() {
        let (conn, rx) = Connection::channel(4);
        drop(rx);
        assert!(conn.is_closed());
        assert_eq!(conn.send(Arc::new(ServerEvent::Pong)), Err(TransportError::Closed));
    }
}

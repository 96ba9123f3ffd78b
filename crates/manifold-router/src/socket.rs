//! Duplex socket handed to websocket handlers.
//!
//! A [`Socket`] is one end of a paired channel: whatever one end sends the
//! other receives. The transport adapter owns one end and bridges it to
//! the wire; the single handler that claims the connection owns the other.

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// Messages exchanged over a duplex socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketMessage {
    /// A text frame.
    Text(String),
    /// A binary frame.
    Binary(Bytes),
    /// Close request; after sending this no further frames are delivered.
    Close,
}

impl SocketMessage {
    /// Creates a text frame.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Creates a binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::Binary(data.into())
    }
}

/// Socket-side errors.
#[derive(Debug, Error)]
pub enum SocketError {
    /// The peer end has been dropped or closed.
    #[error("socket peer closed")]
    Closed,
}

/// One end of a duplex connection.
pub struct Socket {
    tx: mpsc::Sender<SocketMessage>,
    rx: Mutex<mpsc::Receiver<SocketMessage>>,
}

impl Socket {
    /// Creates a connected pair of sockets with the given channel depth.
    #[must_use]
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel(capacity);
        let (tx_b, rx_b) = mpsc::channel(capacity);
        (
            Self {
                tx: tx_a,
                rx: Mutex::new(rx_b),
            },
            Self {
                tx: tx_b,
                rx: Mutex::new(rx_a),
            },
        )
    }

    /// Sends a message to the peer.
    pub async fn send(&self, message: SocketMessage) -> Result<(), SocketError> {
        self.tx.send(message).await.map_err(|_| SocketError::Closed)
    }

    /// Receives the next message; `None` when the peer is gone.
    pub async fn recv(&self) -> Option<SocketMessage> {
        self.rx.lock().await.recv().await
    }

    /// Receives with a deadline.
    ///
    /// Returns `None` on timeout (a neutral "no data" result, not an
    /// error) and also when the peer is gone; callers that need to tell
    /// the two apart follow up with [`is_closed`](Self::is_closed).
    pub async fn recv_timeout(&self, timeout: Duration) -> Option<SocketMessage> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(message) => message,
            Err(_) => None,
        }
    }

    /// Whether the peer end has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("closed", &self.is_closed())
            .finish()
    }
}

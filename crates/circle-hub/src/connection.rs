//! Per-connection state shared between the registry, the router and the loops.
//!
//! A connection is split into two halves:
//! - [`ConnectionHandle`]: cheap to clone, held by the registry and the router.
//!   Producers enqueue through it.
//! - [`OutboundQueue`]: the single consumer, owned by the outbound loop.
//!
//! The transport itself never appears here; the loops own the read and write
//! halves of the socket.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::{ConnectionId, UserId};

/// Default outbound queue capacity per connection.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// A transport-agnostic WebSocket frame.
///
/// Ping/pong are handled by the transport and never reach the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame
    Text(String),
    /// Binary frame
    Binary(Vec<u8>),
    /// Close frame
    Close,
}

/// A payload waiting to be written to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Body written verbatim as a text frame
    pub body: String,
}

impl OutboundMessage {
    /// Create a new outbound message.
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

/// Result of a failed enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The queue is at capacity
    Full,
    /// The connection is shutting down or its consumer is gone
    Closed,
}

/// Producer side of a live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user_id: UserId,
    sender: mpsc::Sender<OutboundMessage>,
    shutdown: CancellationToken,
}

/// Consumer side of a connection's outbound queue.
///
/// Not `Clone`: exactly one outbound loop drains it.
#[derive(Debug)]
pub struct OutboundQueue {
    receiver: mpsc::Receiver<OutboundMessage>,
}

impl OutboundQueue {
    /// Wait for the next queued message.
    ///
    /// Returns `None` once every handle has been dropped and the queue is empty.
    pub async fn recv(&mut self) -> Option<OutboundMessage> {
        self.receiver.recv().await
    }

    /// Take a queued message without waiting.
    pub fn try_recv(&mut self) -> Option<OutboundMessage> {
        self.receiver.try_recv().ok()
    }
}

/// Open a new connection for `user_id` with a bounded outbound queue.
pub fn open(user_id: UserId, capacity: usize) -> (ConnectionHandle, OutboundQueue) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let handle = ConnectionHandle {
        id: ConnectionId::new(),
        user_id,
        sender,
        shutdown: CancellationToken::new(),
    };
    (handle, OutboundQueue { receiver })
}

impl ConnectionHandle {
    /// Identifier of this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// User this connection belongs to.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Enqueue a message without waiting for space.
    pub fn try_enqueue(&self, message: OutboundMessage) -> Result<(), EnqueueError> {
        if self.shutdown.is_cancelled() {
            return Err(EnqueueError::Closed);
        }
        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Ask both loops of this connection to stop.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Whether the connection is shutting down or its consumer is gone.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.sender.is_closed()
    }

    /// Remaining free slots in the outbound queue.
    pub fn available_capacity(&self) -> usize {
        self.sender.capacity()
    }

    /// Token cancelled when the connection shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

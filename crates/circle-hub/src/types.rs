//! Common types for the connection hub.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable user identifier assigned at authentication time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Identifier of one live connection.
///
/// A user reconnecting gets a new `ConnectionId`, which lets teardown of the
/// old connection tell its registry entry apart from the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection state in the hub lifecycle.
///
/// States advance strictly in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// HTTP request received, handshake not yet complete
    Connecting,
    /// WebSocket handshake complete
    Upgraded,
    /// Installed in the presence registry
    Registered,
    /// Inbound and outbound loops running
    Active,
    /// One loop has finished, tearing down
    Closing,
    /// Removed from the registry, transport released
    Closed,
}

impl ConnectionState {
    /// The state that follows this one, if any.
    pub fn next(self) -> Option<ConnectionState> {
        match self {
            ConnectionState::Connecting => Some(ConnectionState::Upgraded),
            ConnectionState::Upgraded => Some(ConnectionState::Registered),
            ConnectionState::Registered => Some(ConnectionState::Active),
            ConnectionState::Active => Some(ConnectionState::Closing),
            ConnectionState::Closing => Some(ConnectionState::Closed),
            ConnectionState::Closed => None,
        }
    }

    /// Whether the connection has fully shut down.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Upgraded => write!(f, "upgraded"),
            ConnectionState::Registered => write!(f, "registered"),
            ConnectionState::Active => write!(f, "active"),
            ConnectionState::Closing => write!(f, "closing"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Why a connection's loops stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a close frame or the stream ended
    PeerClosed,
    /// Reading from or writing to the transport failed
    TransportError(String),
    /// Shutdown was requested (peer loop finished or connection replaced)
    Shutdown,
    /// A loop task panicked or was aborted
    TaskFailed(String),
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed"),
            CloseReason::TransportError(e) => write!(f, "transport error: {}", e),
            CloseReason::Shutdown => write!(f, "shutdown"),
            CloseReason::TaskFailed(e) => write!(f, "task failed: {}", e),
        }
    }
}

//! Presence registry implementation.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, instrument};

use crate::connection::ConnectionHandle;
use crate::types::{ConnectionId, UserId};

/// Registry of connected users.
///
/// Backed by a `DashMap`: operations on the same user serialize on that key's
/// shard lock, so a lookup never observes a half-written entry.
///
/// ## Usage
///
/// ```ignore
/// let registry = Arc::new(PresenceRegistry::new());
///
/// // When a connection is established:
/// let (handle, queue) = connection::open(user_id, 256);
/// let (registration, _replaced) = Registration::install(Arc::clone(&registry), handle);
///
/// // When routing a message:
/// if let Some(handle) = registry.lookup(recipient) {
///     handle.try_enqueue(OutboundMessage::new("hi"))?;
/// }
///
/// // When the connection closes:
/// drop(registration);
/// ```
pub struct PresenceRegistry {
    connections: DashMap<UserId, ConnectionHandle>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        info!("Creating presence registry");
        Self {
            connections: DashMap::new(),
        }
    }

    /// Install `handle` as its user's connection.
    ///
    /// Returns the handle it replaced, if the user was already connected.
    #[instrument(skip(self, handle), fields(user_id = %handle.user_id(), connection_id = %handle.id()))]
    pub fn register(&self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let replaced = self.connections.insert(handle.user_id(), handle);
        if replaced.is_some() {
            debug!("Replaced existing connection registration");
        } else {
            debug!("Registered new connection");
        }
        replaced
    }

    /// Remove whatever connection is registered for `user_id`.
    ///
    /// Idempotent: removing an absent user is a no-op returning `None`.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn unregister(&self, user_id: UserId) -> Option<ConnectionHandle> {
        let removed = self.connections.remove(&user_id).map(|(_, handle)| handle);
        if removed.is_some() {
            debug!("Unregistered connection");
        } else {
            debug!("Connection was not registered");
        }
        removed
    }

    /// Remove the entry for `user_id` only if it is `connection_id`.
    ///
    /// Returns `true` if an entry was removed. A newer connection that
    /// replaced `connection_id` is left in place.
    #[instrument(skip(self), fields(user_id = %user_id, connection_id = %connection_id))]
    pub fn unregister_connection(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let removed = self
            .connections
            .remove_if(&user_id, |_, handle| handle.id() == connection_id)
            .is_some();
        if removed {
            debug!("Unregistered connection");
        } else {
            debug!("Connection already replaced or removed");
        }
        removed
    }

    /// Get the live connection for `user_id`.
    pub fn lookup(&self, user_id: UserId) -> Option<ConnectionHandle> {
        self.connections
            .get(&user_id)
            .map(|entry| entry.value().clone())
    }

    /// Check if a user is currently connected.
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.connections.contains_key(&user_id)
    }

    /// Get the number of connected users.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// List all connected users.
    pub fn online_users(&self) -> Vec<UserId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PresenceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceRegistry")
            .field("connection_count", &self.connections.len())
            .finish()
    }
}

/// Registry entry owned by a running connection.
///
/// Dropping it removes the entry, once, and only if it has not been replaced.
/// Teardown therefore happens on every exit path, including unwinding.
#[must_use = "dropping the registration unregisters the connection"]
pub struct Registration {
    registry: Arc<PresenceRegistry>,
    user_id: UserId,
    connection_id: ConnectionId,
}

impl Registration {
    /// Register `handle` and return the guard plus any handle it replaced.
    pub fn install(
        registry: Arc<PresenceRegistry>,
        handle: ConnectionHandle,
    ) -> (Self, Option<ConnectionHandle>) {
        let user_id = handle.user_id();
        let connection_id = handle.id();
        let replaced = registry.register(handle);
        (
            Self {
                registry,
                user_id,
                connection_id,
            },
            replaced,
        )
    }

    /// User this registration belongs to.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Connection this registration belongs to.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry
            .unregister_connection(self.user_id, self.connection_id);
    }
}

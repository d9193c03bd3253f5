//! Presence registry for real-time message routing.
//!
//! Tracks which users are connected and holds the producer handle of each
//! user's single live connection.
//!
//! ## Architecture
//!
//! ```text
//! inbound loop (user 1) -> MessageRouter -> PresenceRegistry -> outbound queue (user 2)
//!                                                 |
//!                                                 v
//!                                   DashMap<UserId, ConnectionHandle>
//! ```
//!
//! A second connection by the same user replaces the first. Teardown removes an
//! entry only if it still belongs to the connection being torn down.

mod presence_registry;

pub use presence_registry::{PresenceRegistry, Registration};

//! # circle-hub
//!
//! Real-time connection hub for Circle.
//!
//! This crate owns everything between an upgraded WebSocket and the user it
//! belongs to: the presence registry, the per-connection read/write loops and
//! the message router. It has no HTTP dependency; `circle-server` performs the
//! upgrade and authentication, then hands both halves of the socket to
//! [`Hub::serve`].
//!
//! ## Architecture
//!
//! ```text
//!  socket A ──> inbound loop A ──> MessageRouter ──> PresenceRegistry
//!                                       │                  │
//!                                       │   lookup(B) ─────┘
//!                                       v
//!                              outbound queue B (mpsc, bounded)
//!                                       │
//!                                       v
//!                               outbound loop B ──> socket B
//! ```
//!
//! - **Registry**: `DashMap<UserId, ConnectionHandle>`, one entry per user
//! - **Connection**: bounded outbound queue plus a shutdown token
//! - **Loops**: two tokio tasks per connection; the outbound loop is the only
//!   writer of its socket
//! - **Router**: recipient address -> user id -> registry -> `try_send`
//!
//! Delivery is best-effort: a full recipient queue drops the message with
//! [`RouteError::RecipientBufferFull`] rather than stalling the sender.

pub mod connection;
pub mod envelope;
pub mod inbound;
pub mod lifecycle;
pub mod outbound;
pub mod registry;
pub mod routing;

mod error;
mod types;

pub use connection::{ConnectionHandle, EnqueueError, Frame, OutboundMessage, OutboundQueue};
pub use envelope::{Envelope, EnvelopeError};
pub use error::{HubError, RouteError};
pub use lifecycle::{ConnectionSummary, Hub, HubConfig};
pub use registry::PresenceRegistry;
pub use routing::MessageRouter;
pub use types::*;

/// Resolves recipient addresses to user identifiers.
///
/// Implemented by the server's user store. The hub never creates users; it
/// only asks whether an address belongs to one.
pub trait IdentityLookup: Send + Sync + 'static {
    /// Resolve an email-shaped recipient address.
    ///
    /// Returns `Ok(None)` when no user owns the address.
    fn resolve_recipient(
        &self,
        address: &str,
    ) -> impl std::future::Future<Output = Result<Option<UserId>, HubError>> + Send;
}

//! Message routing between connected users.
//!
//! Routing an envelope takes three steps:
//! 1. Resolve the recipient address to a [`UserId`] via [`IdentityLookup`]
//! 2. Find the recipient's live connection in the [`PresenceRegistry`]
//! 3. `try_send` the body onto that connection's outbound queue
//!
//! The enqueue never waits. A saturated recipient queue drops the message with
//! [`RouteError::RecipientBufferFull`], so one slow reader cannot stall the
//! inbound loops of the users writing to it.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::connection::{EnqueueError, OutboundMessage};
use crate::envelope::Envelope;
use crate::error::RouteError;
use crate::registry::PresenceRegistry;
use crate::types::UserId;
use crate::IdentityLookup;

/// Routes envelopes to the outbound queue of their recipient.
pub struct MessageRouter<L> {
    registry: Arc<PresenceRegistry>,
    directory: Arc<L>,
}

impl<L: IdentityLookup> MessageRouter<L> {
    /// Create a router over `registry`, resolving addresses with `directory`.
    pub fn new(registry: Arc<PresenceRegistry>, directory: Arc<L>) -> Self {
        Self {
            registry,
            directory,
        }
    }

    /// Deliver `envelope` to its recipient's outbound queue.
    ///
    /// Returns the recipient's id once the body is queued.
    #[instrument(skip(self, envelope), fields(to = %envelope.to, len = envelope.msg.len()))]
    pub async fn route(&self, envelope: &Envelope) -> Result<UserId, RouteError> {
        let recipient = self
            .directory
            .resolve_recipient(&envelope.to)
            .await?
            .ok_or_else(|| RouteError::RecipientUnknown(envelope.to.clone()))?;

        let handle = match self.registry.lookup(recipient) {
            Some(handle) => handle,
            None => {
                debug!(recipient = %recipient, "Recipient not connected");
                return Err(RouteError::RecipientOffline(recipient));
            }
        };

        match handle.try_enqueue(OutboundMessage::new(envelope.msg.clone())) {
            Ok(()) => {
                debug!(recipient = %recipient, "Message queued for delivery");
                Ok(recipient)
            }
            Err(EnqueueError::Full) => {
                warn!(recipient = %recipient, "Outbound queue full, dropping message");
                Err(RouteError::RecipientBufferFull(recipient))
            }
            Err(EnqueueError::Closed) => {
                debug!(recipient = %recipient, "Recipient connection is closing");
                // Clear the stale entry unless a newer connection already replaced it.
                self.registry.unregister_connection(recipient, handle.id());
                Err(RouteError::RecipientOffline(recipient))
            }
        }
    }

    /// The registry this router delivers through.
    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection;
    use crate::error::HubError;
    use std::collections::HashMap;

    struct StaticDirectory {
        users: HashMap<String, UserId>,
        fail: bool,
    }

    impl StaticDirectory {
        fn new(users: &[(&str, i64)]) -> Self {
            Self {
                users: users
                    .iter()
                    .map(|(email, id)| (email.to_string(), UserId(*id)))
                    .collect(),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                users: HashMap::new(),
                fail: true,
            }
        }
    }

    impl IdentityLookup for StaticDirectory {
        fn resolve_recipient(
            &self,
            address: &str,
        ) -> impl std::future::Future<Output = Result<Option<UserId>, HubError>> + Send {
            let result = if self.fail {
                Err(HubError::lookup("directory unavailable"))
            } else {
                Ok(self.users.get(address).copied())
            };
            async move { result }
        }
    }

    fn router(directory: StaticDirectory) -> MessageRouter<StaticDirectory> {
        MessageRouter::new(Arc::new(PresenceRegistry::new()), Arc::new(directory))
    }

    #[tokio::test]
    async fn test_route_to_online_recipient() {
        let router = router(StaticDirectory::new(&[("b@x.com", 2)]));
        let (handle, mut queue) = connection::open(UserId(2), 8);
        router.registry().register(handle);

        let recipient = router.route(&Envelope::new("b@x.com", "hi")).await.unwrap();

        assert_eq!(recipient, UserId(2));
        assert_eq!(queue.recv().await.unwrap().body, "hi");
    }

    #[tokio::test]
    async fn test_route_preserves_order() {
        let router = router(StaticDirectory::new(&[("b@x.com", 2)]));
        let (handle, mut queue) = connection::open(UserId(2), 8);
        router.registry().register(handle);

        for body in ["1", "2", "3"] {
            router.route(&Envelope::new("b@x.com", body)).await.unwrap();
        }

        for expected in ["1", "2", "3"] {
            assert_eq!(queue.recv().await.unwrap().body, expected);
        }
    }

    #[tokio::test]
    async fn test_route_unknown_recipient() {
        let router = router(StaticDirectory::new(&[]));

        let err = router.route(&Envelope::new("nobody@x.com", "hi")).await.unwrap_err();
        assert!(matches!(err, RouteError::RecipientUnknown(addr) if addr == "nobody@x.com"));
    }

    #[tokio::test]
    async fn test_route_offline_recipient() {
        let router = router(StaticDirectory::new(&[("b@x.com", 2)]));

        let err = router.route(&Envelope::new("b@x.com", "hi")).await.unwrap_err();
        assert!(matches!(err, RouteError::RecipientOffline(UserId(2))));
    }

    #[tokio::test]
    async fn test_route_full_buffer_drops() {
        let router = router(StaticDirectory::new(&[("b@x.com", 2)]));
        let (handle, mut queue) = connection::open(UserId(2), 1);
        router.registry().register(handle);

        router.route(&Envelope::new("b@x.com", "first")).await.unwrap();
        let err = router.route(&Envelope::new("b@x.com", "second")).await.unwrap_err();

        assert!(matches!(err, RouteError::RecipientBufferFull(UserId(2))));
        assert_eq!(queue.recv().await.unwrap().body, "first");
        assert!(queue.try_recv().is_none());
        // A full queue is backpressure, not disconnection.
        assert!(router.registry().is_online(UserId(2)));
    }

    #[tokio::test]
    async fn test_route_closed_connection_is_removed() {
        let router = router(StaticDirectory::new(&[("b@x.com", 2)]));
        let (handle, _queue) = connection::open(UserId(2), 4);
        router.registry().register(handle.clone());
        handle.close();

        let err = router.route(&Envelope::new("b@x.com", "hi")).await.unwrap_err();

        assert!(matches!(err, RouteError::RecipientOffline(UserId(2))));
        assert!(!router.registry().is_online(UserId(2)));
    }

    #[tokio::test]
    async fn test_route_lookup_failure() {
        let router = router(StaticDirectory::failing());

        let err = router.route(&Envelope::new("b@x.com", "hi")).await.unwrap_err();
        assert!(matches!(err, RouteError::Lookup(HubError::Lookup(_))));
    }
}

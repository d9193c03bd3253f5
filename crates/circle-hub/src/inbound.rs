//! Inbound loop: read frames, decode envelopes, hand them to the router.

use std::fmt::Display;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::Frame;
use crate::envelope::Envelope;
use crate::routing::MessageRouter;
use crate::types::{CloseReason, UserId};
use crate::IdentityLookup;

/// Counters collected by one inbound loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundStats {
    /// Data frames read from the transport
    pub frames_received: u64,
    /// Frames discarded because they failed to decode or validate
    pub malformed: u64,
    /// Envelopes queued on a recipient connection
    pub delivered: u64,
    /// Envelopes the router could not deliver
    pub undelivered: u64,
}

/// Outcome of an inbound loop.
#[derive(Debug, Clone)]
pub struct InboundExit {
    /// Why the loop stopped
    pub reason: CloseReason,
    /// What it processed before stopping
    pub stats: InboundStats,
}

/// Read frames until the transport closes, fails, or `shutdown` fires.
///
/// Malformed frames and routing failures are logged and skipped; only the
/// transport or the shutdown token can end the loop.
pub async fn run_inbound<St, E, L>(
    user_id: UserId,
    inbound: St,
    router: Arc<MessageRouter<L>>,
    shutdown: CancellationToken,
) -> InboundExit
where
    St: Stream<Item = Result<Frame, E>>,
    E: Display,
    L: IdentityLookup,
{
    let mut inbound = std::pin::pin!(inbound);
    let mut stats = InboundStats::default();

    let reason = loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break CloseReason::Shutdown,
            next = inbound.next() => next,
        };

        let payload = match next {
            Some(Ok(Frame::Text(text))) => text.into_bytes(),
            Some(Ok(Frame::Binary(data))) => data,
            Some(Ok(Frame::Close)) => {
                info!(user_id = %user_id, "Close frame received");
                break CloseReason::PeerClosed;
            }
            Some(Err(e)) => {
                warn!(user_id = %user_id, error = %e, "Transport read failed");
                break CloseReason::TransportError(e.to_string());
            }
            None => {
                debug!(user_id = %user_id, "Inbound stream ended");
                break CloseReason::PeerClosed;
            }
        };
        stats.frames_received += 1;

        let envelope = match Envelope::decode(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Discarding invalid frame");
                stats.malformed += 1;
                continue;
            }
        };

        debug!(user_id = %user_id, to = %envelope.to, "Routing message");
        match router.route(&envelope).await {
            Ok(_) => stats.delivered += 1,
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    to = %envelope.to,
                    kind = e.kind(),
                    error = %e,
                    "Failed to route message"
                );
                stats.undelivered += 1;
            }
        }
    };

    InboundExit { reason, stats }
}

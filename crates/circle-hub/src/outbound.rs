//! Outbound loop: the single writer of a connection's transport.

use std::fmt::Display;

use futures::{Sink, SinkExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::{Frame, OutboundQueue};
use crate::types::{CloseReason, UserId};

/// Outcome of an outbound loop.
#[derive(Debug, Clone)]
pub struct OutboundExit {
    /// Why the loop stopped
    pub reason: CloseReason,
    /// Frames successfully written
    pub frames_written: u64,
}

/// Drain `queue` into `outbound` until a write fails or `shutdown` fires.
///
/// Messages are written in the order they were queued. The sink is closed
/// before returning.
pub async fn run_outbound<Si>(
    user_id: UserId,
    mut queue: OutboundQueue,
    outbound: Si,
    shutdown: CancellationToken,
) -> OutboundExit
where
    Si: Sink<Frame>,
    Si::Error: Display,
{
    let mut outbound = std::pin::pin!(outbound);
    let mut frames_written = 0u64;

    let reason = loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break CloseReason::Shutdown,
            message = queue.recv() => message,
        };

        let Some(message) = message else {
            debug!(user_id = %user_id, "Outbound queue closed");
            break CloseReason::Shutdown;
        };

        // A stalled peer must not keep the writer alive past shutdown.
        let written = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break CloseReason::Shutdown,
            written = outbound.send(Frame::Text(message.body)) => written,
        };

        if let Err(e) = written {
            warn!(user_id = %user_id, error = %e, "Transport write failed");
            break CloseReason::TransportError(e.to_string());
        }
        frames_written += 1;
    };

    if let Err(e) = outbound.close().await {
        debug!(user_id = %user_id, error = %e, "Closing transport failed");
    }

    OutboundExit {
        reason,
        frames_written,
    }
}

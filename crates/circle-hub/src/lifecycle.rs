//! Connection lifecycle management.
//!
//! [`Hub::serve`] drives one connection through
//! `Upgraded -> Registered -> Active -> Closing -> Closed`:
//!
//! 1. Open the connection and install it in the registry (replacing and
//!    closing any older connection of the same user)
//! 2. Spawn the inbound and outbound loops as separate tasks
//! 3. Wait for the first loop to finish, then cancel the other
//! 4. Drop the registration, which removes the registry entry exactly once
//!
//! The `Connecting -> Upgraded` step belongs to the HTTP layer: `serve` is only
//! called after the WebSocket handshake has succeeded.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, Stream};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::connection::{self, Frame, DEFAULT_OUTBOUND_CAPACITY};
use crate::inbound::{run_inbound, InboundExit, InboundStats};
use crate::outbound::{run_outbound, OutboundExit};
use crate::registry::{PresenceRegistry, Registration};
use crate::routing::MessageRouter;
use crate::types::{CloseReason, ConnectionId, ConnectionState, UserId};
use crate::IdentityLookup;

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of each connection's outbound queue (default: 256)
    pub outbound_capacity: usize,
    /// How long teardown waits for the second loop before aborting it (default: 5s)
    pub close_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// What happened over a connection's lifetime.
#[derive(Debug, Clone)]
pub struct ConnectionSummary {
    /// User the connection belonged to
    pub user_id: UserId,
    /// Connection identifier
    pub connection_id: ConnectionId,
    /// Why the connection closed (from the loop that finished first)
    pub reason: CloseReason,
    /// Inbound counters
    pub inbound: InboundStats,
    /// Frames written by the outbound loop
    pub frames_written: u64,
    /// Final lifecycle state (always `Closed`)
    pub state: ConnectionState,
}

/// Tracks a connection's lifecycle state and logs each transition.
struct Lifecycle {
    user_id: UserId,
    connection_id: ConnectionId,
    state: ConnectionState,
}

impl Lifecycle {
    fn new(user_id: UserId, connection_id: ConnectionId) -> Self {
        Self {
            user_id,
            connection_id,
            state: ConnectionState::Upgraded,
        }
    }

    fn advance(&mut self, to: ConnectionState) {
        debug_assert_eq!(self.state.next(), Some(to), "invalid lifecycle transition");
        debug!(
            user_id = %self.user_id,
            connection_id = %self.connection_id,
            from = %self.state,
            to = %to,
            "Connection state change"
        );
        self.state = to;
    }
}

/// The real-time connection hub.
///
/// Owns the presence registry and the router. Cheap to share behind an `Arc`.
pub struct Hub<L> {
    registry: Arc<PresenceRegistry>,
    router: Arc<MessageRouter<L>>,
    config: HubConfig,
}

impl<L: IdentityLookup> Hub<L> {
    /// Create a hub resolving recipients with `directory`.
    pub fn new(directory: Arc<L>, config: HubConfig) -> Self {
        let registry = Arc::new(PresenceRegistry::new());
        let router = Arc::new(MessageRouter::new(Arc::clone(&registry), directory));
        info!(
            outbound_capacity = config.outbound_capacity,
            close_timeout_ms = config.close_timeout.as_millis() as u64,
            "Connection hub created"
        );
        Self {
            registry,
            router,
            config,
        }
    }

    /// The presence registry.
    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.registry
    }

    /// The message router.
    pub fn router(&self) -> &Arc<MessageRouter<L>> {
        &self.router
    }

    /// The hub configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Serve one upgraded connection for `user_id` until it closes.
    ///
    /// `inbound` and `outbound` are the read and write halves of the socket.
    /// Returns once both loops have stopped and the registry entry is gone.
    pub async fn serve<St, E, Si>(
        &self,
        user_id: UserId,
        inbound: St,
        outbound: Si,
    ) -> ConnectionSummary
    where
        St: Stream<Item = Result<Frame, E>> + Send + 'static,
        E: Display + Send + 'static,
        Si: Sink<Frame> + Send + 'static,
        Si::Error: Display + Send,
    {
        let (handle, queue) = connection::open(user_id, self.config.outbound_capacity);
        let connection_id = handle.id();
        let shutdown = handle.shutdown_token();
        let mut lifecycle = Lifecycle::new(user_id, connection_id);

        // Dropping `serve` early (e.g. server shutdown) still stops both loops.
        let _stop_loops = shutdown.clone().drop_guard();

        let (registration, replaced) = Registration::install(Arc::clone(&self.registry), handle);
        if let Some(old) = replaced {
            info!(
                user_id = %user_id,
                replaced_connection_id = %old.id(),
                "Closing superseded connection"
            );
            old.close();
        }
        lifecycle.advance(ConnectionState::Registered);
        info!(user_id = %user_id, connection_id = %connection_id, "User connected");

        let span = info_span!(
            "circle.connection",
            user_id = %user_id,
            connection_id = %connection_id
        );

        let mut outbound_task: JoinHandle<OutboundExit> = tokio::spawn(
            run_outbound(user_id, queue, outbound, shutdown.clone()).instrument(span.clone()),
        );
        let mut inbound_task: JoinHandle<InboundExit> = tokio::spawn(
            run_inbound(user_id, inbound, Arc::clone(&self.router), shutdown.clone())
                .instrument(span),
        );
        lifecycle.advance(ConnectionState::Active);

        let first = tokio::select! {
            result = &mut inbound_task => LoopResult::Inbound(result),
            result = &mut outbound_task => LoopResult::Outbound(result),
        };

        lifecycle.advance(ConnectionState::Closing);
        shutdown.cancel();

        let inbound_first = matches!(first, LoopResult::Inbound(_));
        let (inbound_result, outbound_result) = match first {
            LoopResult::Inbound(result) => {
                let other = self.await_peer_loop(outbound_task, user_id, "outbound").await;
                (result, other)
            }
            LoopResult::Outbound(result) => {
                let other = self.await_peer_loop(inbound_task, user_id, "inbound").await;
                (other, result)
            }
        };

        let (inbound_exit, inbound_reason) = match inbound_result {
            Ok(exit) => (exit.stats, exit.reason),
            Err(e) => (InboundStats::default(), task_failure(user_id, "inbound", &e)),
        };
        let (frames_written, outbound_reason) = match outbound_result {
            Ok(exit) => (exit.frames_written, exit.reason),
            Err(e) => (0, task_failure(user_id, "outbound", &e)),
        };

        // The loop that stopped first explains the close; the other one only saw shutdown.
        let reason = if inbound_first {
            inbound_reason
        } else {
            outbound_reason
        };

        drop(registration);
        lifecycle.advance(ConnectionState::Closed);

        info!(
            user_id = %user_id,
            connection_id = %connection_id,
            reason = %reason,
            received = inbound_exit.frames_received,
            malformed = inbound_exit.malformed,
            delivered = inbound_exit.delivered,
            undelivered = inbound_exit.undelivered,
            written = frames_written,
            "User disconnected"
        );

        ConnectionSummary {
            user_id,
            connection_id,
            reason,
            inbound: inbound_exit,
            frames_written,
            state: lifecycle.state,
        }
    }

    /// Wait for the loop that did not finish first, aborting it after `close_timeout`.
    async fn await_peer_loop<T>(
        &self,
        mut task: JoinHandle<T>,
        user_id: UserId,
        name: &'static str,
    ) -> Result<T, JoinError> {
        match tokio::time::timeout(self.config.close_timeout, &mut task).await {
            Ok(result) => result,
            Err(_) => {
                warn!(user_id = %user_id, task = name, "Loop did not stop in time, aborting");
                task.abort();
                task.await
            }
        }
    }
}

enum LoopResult {
    Inbound(Result<InboundExit, JoinError>),
    Outbound(Result<OutboundExit, JoinError>),
}

fn task_failure(user_id: UserId, name: &'static str, error: &JoinError) -> CloseReason {
    if error.is_panic() {
        warn!(user_id = %user_id, task = name, "Connection loop panicked");
    } else {
        debug!(user_id = %user_id, task = name, "Connection loop aborted");
    }
    CloseReason::TaskFailed(error.to_string())
}

//! Test utilities for driving the hub without a network.
//!
//! Provides an in-memory directory and channel-backed transports that stand in
//! for the two halves of a WebSocket.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use circle_hub::{ConnectionSummary, Frame, Hub, HubConfig, HubError, IdentityLookup, UserId};
use futures::channel::mpsc;
use futures::{Sink, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize tracing for tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("circle_hub=debug")
        .with_test_writer()
        .try_init();
}

/// Directory with a fixed set of users that counts lookups.
pub struct MockDirectory {
    users: HashMap<String, UserId>,
    lookups: AtomicUsize,
}

impl MockDirectory {
    pub fn new(users: &[(&str, i64)]) -> Self {
        Self {
            users: users
                .iter()
                .map(|(email, id)| (email.to_string(), UserId(*id)))
                .collect(),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Number of times a recipient was resolved.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl IdentityLookup for MockDirectory {
    fn resolve_recipient(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Option<UserId>, HubError>> + Send {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let found = self.users.get(address).copied();
        async move { Ok(found) }
    }
}

/// Test-side ends of a connection being served by the hub.
pub struct TestClient {
    pub user_id: UserId,
    inbound: mpsc::UnboundedSender<Result<Frame, String>>,
    outbound: mpsc::UnboundedReceiver<Frame>,
    task: JoinHandle<ConnectionSummary>,
}

impl TestClient {
    /// Send a text frame as this user.
    pub fn send_text(&self, text: &str) {
        self.inbound
            .unbounded_send(Ok(Frame::Text(text.to_string())))
            .expect("connection inbound closed");
    }

    /// Send an envelope addressed to `to`.
    pub fn send_message(&self, to: &str, msg: &str) {
        let json = serde_json::json!({ "to": to, "msg": msg });
        self.send_text(&json.to_string());
    }

    /// Inject a read error on the transport.
    pub fn fail_read(&self, error: &str) {
        let _ = self.inbound.unbounded_send(Err(error.to_string()));
    }

    /// Next frame written to this user's transport.
    pub async fn recv(&mut self) -> Option<Frame> {
        timeout(DEFAULT_TIMEOUT, self.outbound.next())
            .await
            .expect("timed out waiting for frame")
    }

    /// Next frame within `wait`, or `None` if nothing arrives.
    pub async fn try_recv_within(&mut self, wait: Duration) -> Option<Frame> {
        timeout(wait, self.outbound.next()).await.ok().flatten()
    }

    /// Send a close frame and wait for the hub to finish the connection.
    pub async fn close(self) -> ConnectionSummary {
        let _ = self.inbound.unbounded_send(Ok(Frame::Close));
        self.finish().await
    }

    /// Wait for the hub to finish the connection on its own.
    pub async fn finish(self) -> ConnectionSummary {
        timeout(DEFAULT_TIMEOUT, self.task)
            .await
            .expect("timed out waiting for connection to close")
            .expect("serve task panicked")
    }
}

/// Create a hub over `directory` with default config.
pub fn hub(directory: MockDirectory) -> Arc<Hub<MockDirectory>> {
    hub_with_config(directory, HubConfig::default())
}

/// Create a hub over `directory` with `config`.
pub fn hub_with_config(directory: MockDirectory, config: HubConfig) -> Arc<Hub<MockDirectory>> {
    init_tracing();
    Arc::new(Hub::new(Arc::new(directory), config))
}

/// Connect `user_id` with channel transports and wait until it is registered.
pub async fn connect(hub: &Arc<Hub<MockDirectory>>, user_id: i64) -> TestClient {
    let (out_tx, out_rx) = mpsc::unbounded::<Frame>();
    connect_with_sink(hub, user_id, out_tx, out_rx).await
}

/// Connect `user_id` writing through `sink`; frames are still surfaced on `outbound`.
pub async fn connect_with_sink<Si>(
    hub: &Arc<Hub<MockDirectory>>,
    user_id: i64,
    sink: Si,
    outbound: mpsc::UnboundedReceiver<Frame>,
) -> TestClient
where
    Si: Sink<Frame> + Send + 'static,
    Si::Error: std::fmt::Display + Send,
{
    let user_id = UserId(user_id);
    let previous = hub.registry().lookup(user_id).map(|handle| handle.id());
    let (in_tx, in_rx) = mpsc::unbounded::<Result<Frame, String>>();

    let task = {
        let hub = Arc::clone(hub);
        tokio::spawn(async move { hub.serve(user_id, in_rx, sink).await })
    };

    let registered = async {
        loop {
            let current = hub.registry().lookup(user_id).map(|handle| handle.id());
            if current.is_some() && current != previous {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    timeout(DEFAULT_TIMEOUT, registered)
        .await
        .expect("timed out waiting for registration");

    TestClient {
        user_id,
        inbound: in_tx,
        outbound,
        task,
    }
}

/// A sink that fails every write.
pub fn failing_sink() -> impl Sink<Frame, Error = String> + Send + 'static {
    futures::sink::unfold((), |(), _frame: Frame| async {
        Err::<(), String>("broken pipe".to_string())
    })
}

/// Poll `check` until it holds or the default timeout elapses.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let wait = async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    timeout(DEFAULT_TIMEOUT, wait)
        .await
        .expect("condition never became true");
}

//! Test utilities for running a real server on an ephemeral port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use circle_server::db::{Database, MigrationRunner};
use circle_server::server::{self, AppState};
use circle_server::ServerConfig;
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A server running in the background for one test.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Start a server with an in-memory database on 127.0.0.1:0.
    pub async fn start() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("circle_server=debug,circle_hub=debug")
            .with_test_writer()
            .try_init();

        let config = ServerConfig {
            jwt_key: "e2e-signing-key".to_string(),
            ..ServerConfig::default()
        };

        let db = Database::in_memory("e2e").await.expect("Failed to create database");
        MigrationRunner::default()
            .run(&db)
            .await
            .expect("Failed to run migrations");
        let state = Arc::new(AppState::new(Arc::new(db), config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let serve_state = Arc::clone(&state);
        tokio::spawn(async move {
            server::serve(listener, serve_state, async {
                let _ = rx.await;
            })
            .await
            .unwrap();
        });

        Self {
            addr,
            state,
            shutdown: Some(tx),
        }
    }

    /// Create a user and return its id and an access token.
    pub async fn user(&self, email: &str) -> (i64, String) {
        let user = self
            .state
            .users
            .create(email, "password123")
            .await
            .expect("Failed to create user");
        let token = self.state.tokens.issue(user.id, &user.email).unwrap();
        (user.id, token)
    }

    /// Connect with the token in the `Authorization` header.
    pub async fn connect_with_header(&self, token: &str) -> Client {
        let mut request = format!("ws://{}/ws", self.addr).into_client_request().unwrap();
        request
            .headers_mut()
            .insert("authorization", format!("Bearer {}", token).parse().unwrap());
        let (ws, _) = tokio_tungstenite::connect_async(request)
            .await
            .expect("WebSocket connect failed");
        ws
    }

    /// Connect with the token in the query string.
    pub async fn connect_with_query(&self, token: &str) -> Client {
        let url = format!("ws://{}/ws?token={}", self.addr, token);
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .expect("WebSocket connect failed");
        ws
    }

    /// Wait until `user_id`'s online status equals `online`.
    pub async fn wait_online(&self, user_id: i64, online: bool) {
        let registry = self.state.hub.registry();
        let wait = async {
            while registry.is_online(circle_hub::UserId(user_id)) != online {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        timeout(DEFAULT_TIMEOUT, wait)
            .await
            .expect("timed out waiting for presence change");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Next text message, skipping control frames.
pub async fn next_text(ws: &mut Client) -> Option<String> {
    loop {
        match timeout(DEFAULT_TIMEOUT, ws.next()).await.ok()?? {
            Ok(Message::Text(text)) => return Some(text),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            _ => return None,
        }
    }
}

/// Whether any text message arrives within `wait`.
pub async fn receives_within(ws: &mut Client, wait: Duration) -> bool {
    matches!(timeout(wait, ws.next()).await, Ok(Some(Ok(Message::Text(_)))))
}

//! Circle Server: HTTP and WebSocket front end for the connection hub.
//!
//! - `POST /signup`, `POST /signin`: accounts and access tokens
//! - `GET /ws`: authenticated WebSocket relaying `{"to", "msg"}` envelopes
//! - `GET /health`: liveness plus the number of connected users

pub mod auth;
pub mod config;
pub mod db;
pub mod server;
pub mod telemetry;

pub use config::{ConfigError, LogFormat, ServerConfig};

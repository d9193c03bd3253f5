pub mod auth;
pub mod websocket;

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }

    /// Pair this body with a status code.
    pub fn with_status(self, status: StatusCode) -> (StatusCode, Json<ErrorResponse>) {
        (status, Json(self))
    }
}

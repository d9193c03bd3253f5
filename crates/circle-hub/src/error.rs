//! Error types for the connection hub.

use thiserror::Error;

use crate::types::UserId;

/// Hub errors raised by collaborators.
#[derive(Debug, Error)]
pub enum HubError {
    /// The identity lookup backend failed
    #[error("Identity lookup failed: {0}")]
    Lookup(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HubError {
    /// Create a new lookup error.
    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::Lookup(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Reasons a routed envelope was not delivered.
///
/// None of these affect the sending connection; the message is dropped.
#[derive(Debug, Error)]
pub enum RouteError {
    /// No user owns the recipient address
    #[error("Recipient unknown: {0}")]
    RecipientUnknown(String),

    /// Recipient exists but has no live connection
    #[error("Recipient {0} is offline")]
    RecipientOffline(UserId),

    /// Recipient's outbound queue is saturated
    #[error("Recipient {0} outbound buffer is full")]
    RecipientBufferFull(UserId),

    /// Identity lookup failed
    #[error(transparent)]
    Lookup(#[from] HubError),
}

impl RouteError {
    /// Short machine-readable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RouteError::RecipientUnknown(_) => "recipient_unknown",
            RouteError::RecipientOffline(_) => "recipient_offline",
            RouteError::RecipientBufferFull(_) => "recipient_buffer_full",
            RouteError::Lookup(_) => "lookup_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_error_display() {
        assert_eq!(
            RouteError::RecipientUnknown("b@x.com".into()).to_string(),
            "Recipient unknown: b@x.com"
        );
        assert_eq!(
            RouteError::RecipientOffline(UserId(2)).to_string(),
            "Recipient 2 is offline"
        );
        assert_eq!(
            RouteError::from(HubError::lookup("db down")).to_string(),
            "Identity lookup failed: db down"
        );
    }

    #[test]
    fn test_route_error_kind() {
        assert_eq!(RouteError::RecipientBufferFull(UserId(1)).kind(), "recipient_buffer_full");
        assert_eq!(RouteError::Lookup(HubError::internal("x")).kind(), "lookup_failed");
    }
}

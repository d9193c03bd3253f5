//! Wire envelope decoding and validation.
//!
//! Every inbound frame is a UTF-8 JSON object:
//!
//! ```json
//! {"to": "friend@example.com", "msg": "hello"}
//! ```
//!
//! Frames that fail to decode or validate are discarded by the inbound loop;
//! they never close the connection.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons an inbound frame was rejected.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Frame is not a JSON object of the expected shape
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// `to` is missing or empty
    #[error("Envelope has no recipient")]
    MissingRecipient,

    /// `to` is not an email address
    #[error("Recipient is not a valid email address: {0}")]
    InvalidRecipient(String),

    /// `msg` is missing or empty
    #[error("Envelope body is empty")]
    EmptyBody,
}

/// A routed message: recipient address and opaque body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Recipient address (email-shaped)
    #[serde(default)]
    pub to: String,
    /// Message body, forwarded verbatim
    #[serde(default)]
    pub msg: String,
}

impl Envelope {
    /// Build an envelope without validating it.
    pub fn new(to: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            msg: msg.into(),
        }
    }

    /// Decode and validate a raw frame payload.
    pub fn decode(payload: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: Envelope = serde_json::from_slice(payload)?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Check required fields and the recipient's shape.
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if self.to.is_empty() {
            return Err(EnvelopeError::MissingRecipient);
        }
        if !is_email(&self.to) {
            return Err(EnvelopeError::InvalidRecipient(self.to.clone()));
        }
        if self.msg.is_empty() {
            return Err(EnvelopeError::EmptyBody);
        }
        Ok(())
    }
}

/// Whether `address` looks like `local@domain.tld`.
pub fn is_email(address: &str) -> bool {
    email_regex().is_match(address)
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
            .expect("email regex is valid")
    })
}

//! Broadcast payload and its JSON wire form.
//!
//! Every message travels as a single WebSocket text frame holding
//! `{"content":"<string>"}`. The same encoding is used for live broadcasts
//! and for the replay sent to a freshly joined subscriber.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single broadcast item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Text pushed by the producer.
    pub content: String,
}

/// Errors produced by the wire codec.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The payload is not a valid JSON message object.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl Message {
    /// Create a message from any string-like content.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Encode to the JSON text carried in a WebSocket text frame.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::Malformed`] if serialization fails.
    pub fn encode(&self) -> Result<String, MessageError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a message from its JSON text form.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::Malformed`] when the text is not a JSON object
    /// with a string `content` field.
    pub fn decode(text: &str) -> Result<Self, MessageError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl From<&str> for Message {
    fn from(content: &str) -> Self {
        Self::new(content)
    }
}

impl From<String> for Message {
    fn from(content: String) -> Self {
        Self { content }
    }
}

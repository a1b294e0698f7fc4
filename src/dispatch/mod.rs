/// Dispatch templates: client handles for sending messages to named destinations
///
/// Routers hold an explicitly injected `Arc<dyn DispatchTemplate>`; the
/// in-memory and NATS JetStream implementations live in the submodules.

pub mod memory;
pub mod nats;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryDispatcher;
pub use nats::{NatsConfig, NatsDispatcher};

/// Message headers, in insertion order.
pub type Headers = IndexMap<String, Value>;

/// A message sent to a destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID for tracking
    pub message_id: Uuid,

    pub body: Value,

    #[serde(default)]
    pub headers: Headers,

    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(body: Value) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            body,
            headers: Headers::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.get(name)
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No endpoint could be resolved for '{0}'")]
    UnknownDestination(String),

    #[error("Invalid header name '{0}'")]
    InvalidHeader(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Dispatch template has been stopped")]
    Stopped,

    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Reusable client handle for sending messages to destinations.
///
/// Implementations must be safe to share between concurrent runs; a
/// transport that is not thread-safe serializes access internally.
pub trait DispatchTemplate: Send + Sync {
    /// Deliver a fully built message to `destination`.
    fn send(&self, destination: &str, message: Message) -> Result<(), DispatchError>;

    fn send_body(&self, destination: &str, body: Value) -> Result<(), DispatchError> {
        self.send(destination, Message::new(body))
    }

    fn send_body_and_headers(
        &self,
        destination: &str,
        body: Value,
        headers: Headers,
    ) -> Result<(), DispatchError> {
        self.send(destination, Message::new(body).with_headers(headers))
    }

    /// Build the message with a callback, then send it.
    fn send_with(
        &self,
        destination: &str,
        prepare: &dyn Fn(&mut Message),
    ) -> Result<(), DispatchError> {
        let mut message = Message::new(Value::Null);
        prepare(&mut message);
        self.send(destination, message)
    }

    /// Release transport resources. Must be idempotent.
    fn stop(&self) -> Result<(), DispatchError> {
        Ok(())
    }
}

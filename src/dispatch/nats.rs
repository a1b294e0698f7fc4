/// NATS JetStream dispatch template
///
/// Publishes routed messages to JetStream subjects. Destinations are given as
/// `nats:<name>` (or a bare `<name>`) and map to `<subject_prefix>.<name>`.
///
/// Routing callbacks are synchronous, so the dispatcher owns a small Tokio
/// runtime and blocks on each publish. It must not be called from inside an
/// async task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_nats::{jetstream, HeaderMap};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Runtime;

use super::{DispatchError, DispatchTemplate, Message};

const NATS_SCHEME: &str = "nats:";
const MESSAGE_ID_HEADER: &str = "Nomroute-Message-Id";

#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub url: String,
    pub stream_name: String,
    pub subject_prefix: String,
    pub max_age: Duration,
    pub max_bytes: i64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("NATS_URL")
                .unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            stream_name: std::env::var("NATS_STREAM")
                .unwrap_or_else(|_| "ROUTED_BEANS".to_string()),
            subject_prefix: std::env::var("NATS_SUBJECT_PREFIX")
                .unwrap_or_else(|_| "routed".to_string()),
            max_age: Duration::from_secs(24 * 60 * 60), // 24 hours
            max_bytes: 1024 * 1024 * 1024, // 1GB
        }
    }
}

pub struct NatsDispatcher {
    runtime: Runtime,
    client: async_nats::Client,
    jetstream: jetstream::Context,
    subject_prefix: String,

    /// Serializes publishes so acks are awaited in send order
    publish_lock: Mutex<()>,
    stopped: AtomicBool,
}

impl NatsDispatcher {
    /// Connect to NATS and make sure the routing stream exists.
    pub fn connect(config: NatsConfig) -> Result<Self, DispatchError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("nomroute-nats")
            .enable_all()
            .build()
            .map_err(|e| {
                DispatchError::Transport(format!("Failed to start NATS runtime: {}", e))
            })?;

        let (client, jetstream) = runtime.block_on(async {
            let client = async_nats::connect(&config.url)
                .await
                .map_err(|e| DispatchError::Transport(e.to_string()))?;
            tracing::info!("Connected to NATS at {}", config.url);

            let jetstream = jetstream::new(client.clone());

            jetstream
                .get_or_create_stream(jetstream::stream::Config {
                    name: config.stream_name.clone(),
                    subjects: vec![format!("{}.>", config.subject_prefix)],
                    max_age: config.max_age,
                    max_bytes: config.max_bytes,
                    storage: jetstream::stream::StorageType::File,
                    num_replicas: 1,
                    ..Default::default()
                })
                .await
                .map_err(|e| DispatchError::Transport(e.to_string()))?;

            tracing::info!("JetStream stream '{}' ready", config.stream_name);
            Ok::<_, DispatchError>((client, jetstream))
        })?;

        Ok(Self {
            runtime,
            client,
            jetstream,
            subject_prefix: config.subject_prefix,
            publish_lock: Mutex::new(()),
            stopped: AtomicBool::new(false),
        })
    }

    /// Subject a destination URI publishes to.
    pub fn subject_for(&self, destination: &str) -> Result<String, DispatchError> {
        subject_for(&self.subject_prefix, destination)
    }

    /// Check if the NATS connection is active
    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }
}

impl DispatchTemplate for NatsDispatcher {
    fn send(&self, destination: &str, message: Message) -> Result<(), DispatchError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(DispatchError::Stopped);
        }

        let subject = self.subject_for(destination)?;
        let payload = serde_json::to_vec(&message.body)?;

        let headers = build_headers(&message)?;

        let _guard = self.publish_lock.lock();
        self.runtime.block_on(async {
            // Publish with JetStream (durable, acknowledged)
            let ack = self
                .jetstream
                .publish_with_headers(subject.clone(), headers, payload.into())
                .await
                .map_err(|e| DispatchError::Transport(e.to_string()))?;

            // Wait for acknowledgment
            ack.await.map_err(|e| DispatchError::Transport(e.to_string()))?;
            Ok::<_, DispatchError>(())
        })?;

        tracing::debug!(
            "Published message {} to JetStream subject {}",
            message.message_id,
            subject
        );

        Ok(())
    }

    fn stop(&self) -> Result<(), DispatchError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let _guard = self.publish_lock.lock();
        self.runtime
            .block_on(self.client.flush())
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        tracing::info!("NATS dispatcher stopped");
        Ok(())
    }
}

/// Convert message headers for the NATS header block.
///
/// Strings are sent as-is unless they contain control characters, in which
/// case they are JSON-encoded like every other value, so CR/LF never reach
/// the wire.
///
/// # Errors
/// `InvalidHeader` for a name that is not a header token
fn build_headers(message: &Message) -> Result<HeaderMap, DispatchError> {
    let mut headers = HeaderMap::new();
    headers.insert(MESSAGE_ID_HEADER, message.message_id.to_string().as_str());

    for (name, value) in &message.headers {
        if !is_header_token(name) {
            return Err(DispatchError::InvalidHeader(name.escape_debug().to_string()));
        }

        let value = match value {
            Value::String(s) if !s.contains(char::is_control) => s.clone(),
            other => other.to_string(),
        };
        headers.insert(name.as_str(), value.as_str());
    }

    Ok(headers)
}

/// Printable ASCII without `:`, as NATS and HTTP header names require.
fn is_header_token(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_graphic() && b != b':')
}

fn subject_for(prefix: &str, destination: &str) -> Result<String, DispatchError> {
    let name = destination.strip_prefix(NATS_SCHEME).unwrap_or(destination);

    let valid = !name.is_empty()
        && name.split('.').all(|token| {
            !token.is_empty()
                && !token.contains(char::is_whitespace)
                && token != ">"
                && token != "*"
        });

    if !valid {
        return Err(DispatchError::UnknownDestination(destination.to_string()));
    }

    Ok(format!("{}.{}", prefix, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Headers;
    use serde_json::json;

    #[test]
    fn test_subject_for_strips_scheme() {
        assert_eq!(subject_for("routed", "nats:orders").unwrap(), "routed.orders");
        assert_eq!(
            subject_for("routed", "orders.priority").unwrap(),
            "routed.orders.priority"
        );
    }

    #[test]
    fn test_build_headers_encodes_control_characters() {
        let mut headers = Headers::new();
        headers.insert("note".to_string(), json!("a\r\nX-Evil: 1"));
        headers.insert("filename".to_string(), json!("coords.json"));
        headers.insert("coordinate".to_string(), json!({"x": 1}));
        let message = Message::new(json!({})).with_headers(headers);

        let built = build_headers(&message).unwrap();

        assert_eq!(built.get("note").unwrap().as_str(), r#""a\r\nX-Evil: 1""#);
        assert_eq!(built.get("filename").unwrap().as_str(), "coords.json");
        assert_eq!(built.get("coordinate").unwrap().as_str(), r#"{"x":1}"#);
        assert!(built.get("X-Evil").is_none());
        assert_eq!(
            built.get(MESSAGE_ID_HEADER).unwrap().as_str(),
            message.message_id.to_string()
        );
    }

    #[test]
    fn test_build_headers_rejects_invalid_names() {
        for name in ["bad name", "a:b", "line\r\nX-Evil", ""] {
            let mut headers = Headers::new();
            headers.insert(name.to_string(), json!("v"));
            let message = Message::new(json!({})).with_headers(headers);

            assert!(matches!(
                build_headers(&message),
                Err(DispatchError::InvalidHeader(_))
            ));
        }
    }

    #[test]
    fn test_subject_for_rejects_invalid_destinations() {
        assert!(subject_for("routed", "nats:").is_err());
        assert!(subject_for("routed", "orders..x").is_err());
        assert!(subject_for("routed", "has space").is_err());
        assert!(subject_for("routed", "orders.>").is_err());
    }
}

/// In-memory dispatch template
///
/// Records every message per destination. In strict mode only registered
/// endpoints resolve, which makes it usable as a mock endpoint registry in
/// tests and as a dry-run transport for the CLI.

use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::{DispatchError, DispatchTemplate, Message};

#[derive(Debug, Default)]
pub struct MemoryDispatcher {
    endpoints: Mutex<IndexMap<String, Vec<Message>>>,
    strict: bool,
    stopped: AtomicBool,
}

impl MemoryDispatcher {
    /// Accepts messages for any destination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts messages only for the given destinations.
    pub fn with_endpoints<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let endpoints = endpoints
            .into_iter()
            .map(|uri| (uri.into(), Vec::new()))
            .collect();

        Self {
            endpoints: Mutex::new(endpoints),
            strict: true,
            stopped: AtomicBool::new(false),
        }
    }

    /// Messages received by a destination, in delivery order.
    pub fn received(&self, destination: &str) -> Vec<Message> {
        self.endpoints
            .lock()
            .get(destination)
            .cloned()
            .unwrap_or_default()
    }

    pub fn message_count(&self, destination: &str) -> usize {
        self.endpoints
            .lock()
            .get(destination)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn total_messages(&self) -> usize {
        self.endpoints.lock().values().map(Vec::len).sum()
    }

    /// Every delivered message with its destination, grouped by destination.
    pub fn drain_all(&self) -> Vec<(String, Message)> {
        let mut endpoints = self.endpoints.lock();
        endpoints
            .iter_mut()
            .flat_map(|(uri, messages)| {
                std::mem::take(messages)
                    .into_iter()
                    .map(move |message| (uri.clone(), message))
            })
            .collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl DispatchTemplate for MemoryDispatcher {
    fn send(&self, destination: &str, message: Message) -> Result<(), DispatchError> {
        if self.is_stopped() {
            return Err(DispatchError::Stopped);
        }

        let mut endpoints = self.endpoints.lock();
        match endpoints.get_mut(destination) {
            Some(messages) => messages.push(message),
            None if self.strict => {
                return Err(DispatchError::UnknownDestination(destination.to_string()));
            }
            None => {
                endpoints.insert(destination.to_string(), vec![message]);
            }
        }

        Ok(())
    }

    fn stop(&self) -> Result<(), DispatchError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_records_messages_per_destination() {
        let dispatcher = MemoryDispatcher::new();
        dispatcher.send_body("mock:a", json!(1)).unwrap();
        dispatcher.send_body("mock:a", json!(2)).unwrap();
        dispatcher.send_body("mock:b", json!(3)).unwrap();

        let bodies: Vec<_> = dispatcher.received("mock:a").into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, vec![json!(1), json!(2)]);
        assert_eq!(dispatcher.message_count("mock:b"), 1);
        assert_eq!(dispatcher.total_messages(), 3);
    }

    #[test]
    fn test_strict_mode_rejects_unknown_destination() {
        let dispatcher = MemoryDispatcher::with_endpoints(["mock:known"]);

        assert!(dispatcher.send_body("mock:known", json!(1)).is_ok());
        assert!(matches!(
            dispatcher.send_body("mock:unknown", json!(1)),
            Err(DispatchError::UnknownDestination(uri)) if uri == "mock:unknown"
        ));
    }

    #[test]
    fn test_stopped_dispatcher_rejects_sends() {
        let dispatcher = MemoryDispatcher::new();
        dispatcher.stop().unwrap();
        dispatcher.stop().unwrap();

        assert!(dispatcher.is_stopped());
        assert!(matches!(dispatcher.send_body("mock:a", json!(1)), Err(DispatchError::Stopped)));
    }

    #[test]
    fn test_drain_all() {
        let dispatcher = MemoryDispatcher::new();
        dispatcher.send_body("mock:a", json!(1)).unwrap();
        dispatcher.send_body("mock:b", json!(2)).unwrap();

        let drained = dispatcher.drain_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(dispatcher.total_messages(), 0);
    }
}

//! Run context and bean repository.
//!
//! A [`RunContext`] is the state of one execution of the transform engine
//! over one input. It owns the [`BeanRepository`] holding every named bean
//! extracted so far, plus global context fields supplied by the caller.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::CartridgeError;
use crate::runtime::lifecycle::{BeanLifecycle, LifecycleEvent, LifecycleObserver, SubscriptionId};

/// Run-scoped store of named beans with lifecycle observers.
#[derive(Default)]
pub struct BeanRepository {
    /// Beans in the order they were first added.
    beans: IndexMap<String, Value>,

    observers: Vec<(SubscriptionId, LifecycleObserver)>,

    next_subscription: u64,
}

impl BeanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a bean by id.
    ///
    /// # Returns
    /// `Some(bean)` if a bean with that id has been added, `None` otherwise
    pub fn get_bean(&self, bean_id: &str) -> Option<&Value> {
        self.beans.get(bean_id)
    }

    pub fn has_bean(&self, bean_id: &str) -> bool {
        self.beans.contains_key(bean_id)
    }

    /// All beans captured so far in this run, keyed by bean id.
    pub fn get_all_as_map(&self) -> &IndexMap<String, Value> {
        &self.beans
    }

    pub fn bean_count(&self) -> usize {
        self.beans.len()
    }

    /// Register a lifecycle observer.
    ///
    /// # Returns
    /// Subscription handle to pass to [`remove_observer`](Self::remove_observer)
    pub fn add_observer(&mut self, observer: LifecycleObserver) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, observer));
        id
    }

    /// Remove a previously registered observer.
    ///
    /// # Returns
    /// `true` if the subscription existed
    pub fn remove_observer(&mut self, subscription: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(id, _)| *id != subscription);
        self.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn insert(&mut self, bean_id: String, bean: Value) -> Option<Value> {
        self.beans.insert(bean_id, bean)
    }
}

impl fmt::Debug for BeanRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanRepository")
            .field("beans", &self.beans)
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// State of a single transform run.
#[derive(Debug)]
pub struct RunContext {
    run_id: Uuid,
    started_at: DateTime<Utc>,

    /// Global context fields available to templates and conditions
    global_context: HashMap<String, String>,

    repository: BeanRepository,
}

impl RunContext {
    /// Create a run with initial global context fields.
    ///
    /// # Example
    /// ```
    /// use std::collections::HashMap;
    /// use nomroute::runtime::RunContext;
    ///
    /// let mut fields = HashMap::new();
    /// fields.insert("filename".to_string(), "coords.json".to_string());
    ///
    /// let run = RunContext::new(fields);
    /// assert_eq!(run.get_context_field("filename"), Some(&"coords.json".to_string()));
    /// ```
    pub fn new(global_context: HashMap<String, String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            global_context,
            repository: BeanRepository::new(),
        }
    }

    pub fn empty() -> Self {
        Self::new(HashMap::new())
    }

    /// Unique id of this run.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn repository(&self) -> &BeanRepository {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut BeanRepository {
        &mut self.repository
    }

    /// Shortcut for `repository().get_bean(bean_id)`.
    pub fn get_bean(&self, bean_id: &str) -> Option<&Value> {
        self.repository.get_bean(bean_id)
    }

    pub fn get_context_field(&self, key: &str) -> Option<&String> {
        self.global_context.get(key)
    }

    pub fn set_context_field(&mut self, key: String, value: String) {
        self.global_context.insert(key, value);
    }

    pub fn get_context_dict(&self) -> &HashMap<String, String> {
        &self.global_context
    }

    /// Add (or replace) a bean and notify observers that it has started.
    ///
    /// # Errors
    /// Returns the first error raised by an observer
    pub fn add_bean(
        &mut self,
        bean_id: impl Into<String>,
        bean: Value,
    ) -> Result<(), CartridgeError> {
        let bean_id = bean_id.into();
        self.repository.insert(bean_id.clone(), bean);
        self.notify(&bean_id, BeanLifecycle::Started)
    }

    /// Notify observers that a bean is fully populated.
    ///
    /// # Errors
    /// `Transform` if the bean was never added; otherwise the first error
    /// raised by an observer
    pub fn end_bean(&self, bean_id: &str) -> Result<(), CartridgeError> {
        self.notify(bean_id, BeanLifecycle::Ended)
    }

    /// Replace a bean's value without emitting any event.
    ///
    /// Used by the engine to collapse a repeated bean into its full list once
    /// every element has been announced.
    pub(crate) fn replace_bean_silently(&mut self, bean_id: &str, bean: Value) {
        self.repository.insert(bean_id.to_string(), bean);
    }

    fn notify(&self, bean_id: &str, lifecycle: BeanLifecycle) -> Result<(), CartridgeError> {
        let bean = self.repository.get_bean(bean_id).ok_or_else(|| {
            CartridgeError::Transform(format!("Bean '{}' is not in the run context", bean_id))
        })?;

        let event = LifecycleEvent {
            bean_id,
            lifecycle,
            bean,
            run: self,
        };

        for (_, observer) in &self.repository.observers {
            observer(&event)?;
        }

        Ok(())
    }

    /// Template model for this run.
    ///
    /// Global context fields first, then every bean by id (beans shadow
    /// context fields of the same name), then a `run` object carrying `id`
    /// and `startedAt`.
    pub fn merged_model(&self) -> Value {
        let mut model = Map::new();

        for (key, value) in &self.global_context {
            model.insert(key.clone(), Value::String(value.clone()));
        }

        for (bean_id, bean) in self.repository.get_all_as_map() {
            model.insert(bean_id.clone(), bean.clone());
        }

        // `run` is reserved, so it replaces any bean or field of that name
        let mut run = Map::new();
        run.insert("id".to_string(), Value::String(self.run_id.to_string()));
        run.insert("startedAt".to_string(), Value::String(self.started_at.to_rfc3339()));
        model.insert("run".to_string(), Value::Object(run));

        Value::Object(model)
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn recording_observer(seen: Arc<Mutex<Vec<(String, BeanLifecycle)>>>) -> LifecycleObserver {
        Arc::new(move |event: &LifecycleEvent<'_>| {
            seen.lock().push((event.bean_id.to_string(), event.lifecycle));
            Ok(())
        })
    }

    #[test]
    fn test_create_empty_run() {
        let run = RunContext::empty();
        assert_eq!(run.repository().bean_count(), 0);
        assert_eq!(run.get_context_dict().len(), 0);
    }

    #[test]
    fn test_runs_have_distinct_ids() {
        let a = RunContext::empty();
        let b = RunContext::empty();
        assert_ne!(a.run_id(), b.run_id());
    }

    #[test]
    fn test_add_and_get_bean() {
        let mut run = RunContext::empty();
        run.add_bean("order", json!({"id": 7})).unwrap();

        assert!(run.repository().has_bean("order"));
        assert_eq!(run.get_bean("order"), Some(&json!({"id": 7})));
        assert_eq!(run.get_bean("missing"), None);
    }

    #[test]
    fn test_events_delivered_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut run = RunContext::empty();
        run.repository_mut().add_observer(recording_observer(seen.clone()));

        run.add_bean("header", json!("h")).unwrap();
        run.end_bean("header").unwrap();
        run.add_bean("line", json!("l")).unwrap();
        run.end_bean("line").unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                ("header".to_string(), BeanLifecycle::Started),
                ("header".to_string(), BeanLifecycle::Ended),
                ("line".to_string(), BeanLifecycle::Started),
                ("line".to_string(), BeanLifecycle::Ended),
            ]
        );
    }

    #[test]
    fn test_removed_observer_is_not_called() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut run = RunContext::empty();
        let subscription = run.repository_mut().add_observer(recording_observer(seen.clone()));

        assert!(run.repository_mut().remove_observer(subscription));
        assert!(!run.repository_mut().remove_observer(subscription));

        run.add_bean("order", json!(1)).unwrap();
        assert!(seen.lock().is_empty());
        assert_eq!(run.repository().observer_count(), 0);
    }

    #[test]
    fn test_observer_error_propagates() {
        let mut run = RunContext::empty();
        run.repository_mut().add_observer(Arc::new(|_event: &LifecycleEvent<'_>| {
            Err(CartridgeError::Transform("boom".to_string()))
        }));

        let result = run.add_bean("order", json!(1));
        assert!(matches!(result, Err(CartridgeError::Transform(_))));
    }

    #[test]
    fn test_end_unknown_bean_fails() {
        let run = RunContext::empty();
        assert!(run.end_bean("ghost").is_err());
    }

    #[test]
    fn test_merged_model_contains_beans_context_and_run() {
        let mut fields = HashMap::new();
        fields.insert("filename".to_string(), "orders.json".to_string());

        let mut run = RunContext::new(fields);
        run.add_bean("order", json!({"id": 42})).unwrap();

        let model = run.merged_model();
        assert_eq!(model["filename"], json!("orders.json"));
        assert_eq!(model["order"]["id"], json!(42));
        assert_eq!(model["run"]["id"], json!(run.run_id().to_string()));
    }
}

//! Bean router observer.
//!
//! One observer is allocated per run and per lifecycle-driven router. It
//! watches the run's lifecycle events and routes the configured bean each time
//! that bean ends, provided the router's condition holds.

use std::sync::Arc;

use crate::error::RoutingError;
use crate::routing::router::BeanRouter;
use crate::runtime::lifecycle::{BeanLifecycle, LifecycleEvent};

#[derive(Debug)]
pub struct BeanRouterObserver {
    router: Arc<BeanRouter>,
}

impl BeanRouterObserver {
    pub fn new(router: Arc<BeanRouter>) -> Self {
        Self { router }
    }

    pub fn bean_id(&self) -> &str {
        self.router.bean_id()
    }

    /// Handle one lifecycle event.
    ///
    /// Events for other beans and `Started` events are ignored. A condition
    /// that fails to evaluate counts as not matched and is only logged.
    ///
    /// # Errors
    /// Routing errors from the send, which abort the run
    pub fn on_lifecycle_event(&self, event: &LifecycleEvent<'_>) -> Result<(), RoutingError> {
        if event.lifecycle != BeanLifecycle::Ended || event.bean_id != self.bean_id() {
            return Ok(());
        }

        if !self.router.conditions_match(event.run) {
            tracing::debug!(
                "Condition not met, bean '{}' not routed to '{}'",
                event.bean_id,
                self.router.to_endpoint()
            );
            return Ok(());
        }

        self.router.send_bean(event.bean, event.run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::MemoryDispatcher;
    use crate::error::ConditionError;
    use crate::routing::config::RoutingConfig;
    use crate::runtime::context::RunContext;
    use serde_json::json;

    fn observer_for(config: RoutingConfig) -> (BeanRouterObserver, Arc<MemoryDispatcher>) {
        let dispatcher = Arc::new(MemoryDispatcher::new());
        let router = BeanRouter::new(config, dispatcher.clone()).unwrap();
        (BeanRouterObserver::new(Arc::new(router)), dispatcher)
    }

    fn event<'a>(
        bean_id: &'a str,
        lifecycle: BeanLifecycle,
        bean: &'a serde_json::Value,
        run: &'a RunContext,
    ) -> LifecycleEvent<'a> {
        LifecycleEvent {
            bean_id,
            lifecycle,
            bean,
            run,
        }
    }

    #[test]
    fn test_routes_matching_ended_event() {
        let (observer, dispatcher) = observer_for(RoutingConfig::new("order", "mock:orders"));
        let run = RunContext::empty();
        let bean = json!({"total": 5});

        observer
            .on_lifecycle_event(&event("order", BeanLifecycle::Ended, &bean, &run))
            .unwrap();

        assert_eq!(dispatcher.received("mock:orders")[0].body, bean);
    }

    #[test]
    fn test_ignores_started_and_unrelated_events() {
        let (observer, dispatcher) = observer_for(RoutingConfig::new("order", "mock:orders"));
        let run = RunContext::empty();
        let bean = json!({});

        observer
            .on_lifecycle_event(&event("order", BeanLifecycle::Started, &bean, &run))
            .unwrap();
        observer
            .on_lifecycle_event(&event("customer", BeanLifecycle::Ended, &bean, &run))
            .unwrap();

        assert_eq!(dispatcher.total_messages(), 0);
    }

    #[test]
    fn test_failing_condition_is_swallowed() {
        let dispatcher = Arc::new(MemoryDispatcher::new());
        let failing = |_run: &RunContext| -> Result<bool, ConditionError> {
            Err(ConditionError("boom".to_string()))
        };
        let router = BeanRouter::new(RoutingConfig::new("order", "mock:orders"), dispatcher.clone())
            .unwrap()
            .with_condition_evaluator(Arc::new(failing));
        let observer = BeanRouterObserver::new(Arc::new(router));

        let run = RunContext::empty();
        let bean = json!({});
        assert!(observer
            .on_lifecycle_event(&event("order", BeanLifecycle::Ended, &bean, &run))
            .is_ok());
        assert_eq!(dispatcher.total_messages(), 0);
    }

    #[test]
    fn test_false_condition_skips_dispatch() {
        let config = RoutingConfig::new("order", "mock:orders").with_condition("order.total > 100");
        let (observer, dispatcher) = observer_for(config);
        let mut run = RunContext::empty();
        run.add_bean("order", json!({"total": 5})).unwrap();
        let bean = json!({"total": 5});

        observer
            .on_lifecycle_event(&event("order", BeanLifecycle::Ended, &bean, &run))
            .unwrap();

        assert_eq!(dispatcher.total_messages(), 0);
    }
}

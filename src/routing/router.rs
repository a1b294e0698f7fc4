//! Bean router.
//!
//! Owns the routing target, the correlation policy and the dispatch template,
//! and performs the actual send. A router is either lifecycle-driven (it
//! subscribes a [`BeanRouterObserver`] to every run) or selector-bound (the
//! engine calls [`BeanRouter::visit_after`] directly).

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::dispatch::{DispatchTemplate, Headers, Message};
use crate::error::{CartridgeError, ConditionError, RoutingError};
use crate::routing::condition::{ConditionEvaluator, ExpressionCondition};
use crate::routing::config::RoutingConfig;
use crate::routing::correlation::Correlation;
use crate::routing::observer::BeanRouterObserver;
use crate::runtime::context::RunContext;
use crate::runtime::lifecycle::{LifecycleEvent, LifecycleObserver, SubscriptionId};

pub struct BeanRouter {
    config: RoutingConfig,
    correlation: Option<Correlation>,
    condition: Option<Arc<dyn ConditionEvaluator>>,
    dispatch: Arc<dyn DispatchTemplate>,
}

impl BeanRouter {
    /// Validate the configuration and build a router.
    ///
    /// The correlation pairing is checked, the correlation template parsed and
    /// the condition expression compiled here, so a router that exists is
    /// always usable.
    ///
    /// # Errors
    /// `CartridgeError::Configuration` for any invalid setting
    pub fn new(
        config: RoutingConfig,
        dispatch: Arc<dyn DispatchTemplate>,
    ) -> Result<Self, CartridgeError> {
        let correlation = config.correlation()?;

        let condition = match &config.condition {
            Some(expression) => {
                let compiled =
                    ExpressionCondition::compile(expression).map_err(|ConditionError(msg)| {
                        CartridgeError::Configuration(format!(
                            "Bean router for beanId '{}': {}",
                            config.bean_id, msg
                        ))
                    })?;
                Some(Arc::new(compiled) as Arc<dyn ConditionEvaluator>)
            }
            None => None,
        };

        tracing::info!(
            "Configured bean router: beanId '{}' -> '{}' ({})",
            config.bean_id,
            config.to_endpoint,
            if config.is_observer_driven() { "lifecycle" } else { "selector" }
        );

        Ok(Self {
            config,
            correlation,
            condition,
            dispatch,
        })
    }

    /// Replace the routing condition with a custom evaluator.
    pub fn with_condition_evaluator(mut self, condition: Arc<dyn ConditionEvaluator>) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn bean_id(&self) -> &str {
        &self.config.bean_id
    }

    pub fn to_endpoint(&self) -> &str {
        &self.config.to_endpoint
    }

    /// Selector this router is bound to; `None` for lifecycle-driven routers.
    pub fn selector(&self) -> Option<&str> {
        self.config.bound_selector()
    }

    pub fn correlation(&self) -> Option<&Correlation> {
        self.correlation.as_ref()
    }

    pub fn condition(&self) -> Option<&Arc<dyn ConditionEvaluator>> {
        self.condition.as_ref()
    }

    /// Subscribe a fresh observer to the run, if this router is lifecycle-driven.
    ///
    /// # Returns
    /// The subscription to release in [`execution_cleanup`](Self::execution_cleanup)
    pub fn execution_initialize(self: &Arc<Self>, run: &mut RunContext) -> Option<SubscriptionId> {
        if !self.config.is_observer_driven() {
            return None;
        }

        let observer = BeanRouterObserver::new(Arc::clone(self));
        let callback: LifecycleObserver = Arc::new(move |event: &LifecycleEvent<'_>| {
            observer.on_lifecycle_event(event).map_err(CartridgeError::from)
        });

        let subscription = run.repository_mut().add_observer(callback);
        tracing::debug!(
            "Subscribed router for bean '{}' to run {}",
            self.bean_id(),
            run.run_id()
        );
        Some(subscription)
    }

    /// Remove the run's observer.
    pub fn execution_cleanup(&self, run: &mut RunContext, subscription: SubscriptionId) {
        if !run.repository_mut().remove_observer(subscription) {
            tracing::warn!(
                "Router for bean '{}' was not subscribed to run {}",
                self.bean_id(),
                run.run_id()
            );
        }
    }

    /// Route the configured bean after its selector finished an element.
    ///
    /// # Errors
    /// `RoutingError::BeanNotFound` when the run holds no such bean, otherwise
    /// any error from [`send_bean`](Self::send_bean)
    pub fn visit_after(&self, run: &RunContext) -> Result<(), RoutingError> {
        let bean = run.get_bean(self.bean_id()).ok_or_else(|| RoutingError::BeanNotFound {
            bean_id: self.config.bean_id.clone(),
            endpoint: self.config.to_endpoint.clone(),
        })?;

        if self.conditions_match(run) {
            self.send_bean(bean, run)?;
        }
        Ok(())
    }

    /// Evaluate the routing condition; unset passes, errors fail.
    pub(crate) fn conditions_match(&self, run: &RunContext) -> bool {
        let Some(condition) = &self.condition else {
            return true;
        };

        match condition.evaluate(run) {
            Ok(matched) => matched,
            Err(err) => {
                tracing::warn!(
                    "Not routing bean '{}' to '{}': {}",
                    self.bean_id(),
                    self.to_endpoint(),
                    err
                );
                false
            }
        }
    }

    /// Send a bean to the target endpoint.
    ///
    /// With a correlation policy the message carries exactly one header, the
    /// rendered correlation id. Otherwise every bean of the run is copied into
    /// the headers.
    ///
    /// # Errors
    /// `RoutingError::Correlation` if the correlation id cannot be rendered,
    /// `RoutingError::Dispatch` if the send fails
    pub fn send_bean(&self, bean: &Value, run: &RunContext) -> Result<(), RoutingError> {
        let endpoint = self.to_endpoint();

        let sent = match &self.correlation {
            Some(correlation) => {
                let correlation_id =
                    correlation.compute(run).map_err(|source| RoutingError::Correlation {
                        bean_id: self.config.bean_id.clone(),
                        endpoint: self.config.to_endpoint.clone(),
                        source,
                    })?;

                tracing::debug!(
                    "Routing bean '{}' to '{}' with {}={}",
                    self.bean_id(),
                    endpoint,
                    correlation.header_name,
                    correlation_id
                );

                self.dispatch.send_with(endpoint, &|message: &mut Message| {
                    message.body = bean.clone();
                    message.headers.insert(
                        correlation.header_name.clone(),
                        Value::String(correlation_id.clone()),
                    );
                })
            }
            None => {
                tracing::debug!("Routing bean '{}' to '{}'", self.bean_id(), endpoint);

                let headers: Headers = run.repository().get_all_as_map().clone();
                self.dispatch.send_body_and_headers(endpoint, bean.clone(), headers)
            }
        };

        sent.map_err(|source| RoutingError::Dispatch {
            bean_id: self.config.bean_id.clone(),
            endpoint: self.config.to_endpoint.clone(),
            source,
        })
    }

    /// Release the dispatch template.
    ///
    /// # Errors
    /// `CartridgeError::Teardown` wrapping the dispatch failure
    pub fn teardown(&self) -> Result<(), CartridgeError> {
        self.dispatch.stop().map_err(CartridgeError::Teardown)?;
        tracing::info!("Bean router for beanId '{}' torn down", self.bean_id());
        Ok(())
    }
}

impl fmt::Debug for BeanRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanRouter")
            .field("config", &self.config)
            .field("correlation", &self.correlation)
            .field("has_condition", &self.condition.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchError, MemoryDispatcher};
    use serde_json::json;

    struct FailingDispatcher;

    impl DispatchTemplate for FailingDispatcher {
        fn send(&self, _destination: &str, _message: Message) -> Result<(), DispatchError> {
            Err(DispatchError::Transport("connection refused".to_string()))
        }

        fn stop(&self) -> Result<(), DispatchError> {
            Err(DispatchError::Transport("flush failed".to_string()))
        }
    }

    fn run_with_order() -> RunContext {
        let mut run = RunContext::empty();
        run.add_bean("header", json!({"number": 7})).unwrap();
        run.add_bean("order", json!({"total": 12})).unwrap();
        run
    }

    #[test]
    fn test_send_bean_copies_bean_map_into_headers() {
        let dispatcher = Arc::new(MemoryDispatcher::new());
        let config = RoutingConfig::new("order", "mock:orders");
        let router = BeanRouter::new(config, dispatcher.clone()).unwrap();
        let run = run_with_order();

        router.send_bean(&json!({"total": 12}), &run).unwrap();

        let received = dispatcher.received("mock:orders");
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].body, json!({"total": 12}));
        assert_eq!(&received[0].headers, run.repository().get_all_as_map());
    }

    #[test]
    fn test_send_bean_with_correlation_sets_single_header() {
        let dispatcher = Arc::new(MemoryDispatcher::new());
        let config = RoutingConfig::new("order", "mock:orders")
            .with_correlation_id_name("orderNumber")
            .with_correlation_id_pattern("order-${header.number}");
        let router = BeanRouter::new(config, dispatcher.clone()).unwrap();

        router.send_bean(&json!({"total": 12}), &run_with_order()).unwrap();

        let received = dispatcher.received("mock:orders");
        assert_eq!(received[0].headers.len(), 1);
        assert_eq!(received[0].header("orderNumber"), Some(&json!("order-7")));
    }

    #[test]
    fn test_unrenderable_correlation_is_routing_error() {
        let config = RoutingConfig::new("order", "mock:orders")
            .with_correlation_id_name("orderNumber")
            .with_correlation_id_pattern("${missing.value}");
        let router = BeanRouter::new(config, Arc::new(MemoryDispatcher::new())).unwrap();

        let err = router.send_bean(&json!({}), &RunContext::empty()).unwrap_err();
        assert!(matches!(err, RoutingError::Correlation { .. }));
    }

    #[test]
    fn test_dispatch_failure_names_bean_and_endpoint() {
        let router = BeanRouter::new(
            RoutingConfig::new("order", "mock:orders"),
            Arc::new(FailingDispatcher),
        )
        .unwrap();

        let err = router.send_bean(&json!({}), &RunContext::empty()).unwrap_err();
        assert_eq!(err.to_string(), "Exception routing beanId 'order' to endpoint 'mock:orders'.");
        assert!(matches!(err, RoutingError::Dispatch { .. }));
    }

    #[test]
    fn test_visit_after_without_bean_is_bean_not_found() {
        let config = RoutingConfig::new("order", "mock:orders").with_selector("orders/order");
        let router = BeanRouter::new(config, Arc::new(MemoryDispatcher::new())).unwrap();

        let err = router.visit_after(&RunContext::empty()).unwrap_err();
        assert!(matches!(
            err,
            RoutingError::BeanNotFound { ref bean_id, .. } if bean_id == "order"
        ));
    }

    #[test]
    fn test_invalid_condition_fails_setup() {
        let config = RoutingConfig::new("order", "mock:orders").with_condition("order.total >");
        let err = BeanRouter::new(config, Arc::new(MemoryDispatcher::new())).unwrap_err();
        assert!(matches!(err, CartridgeError::Configuration(_)));
    }

    #[test]
    fn test_unpaired_correlation_fails_setup() {
        let config = RoutingConfig::new("order", "mock:orders").with_correlation_id_name("id");
        assert!(matches!(
            BeanRouter::new(config, Arc::new(MemoryDispatcher::new())),
            Err(CartridgeError::Configuration(_))
        ));
    }

    #[test]
    fn test_selector_bound_router_does_not_subscribe() {
        let config = RoutingConfig::new("order", "mock:orders").with_selector("orders/order");
        let router = Arc::new(BeanRouter::new(config, Arc::new(MemoryDispatcher::new())).unwrap());
        let mut run = RunContext::empty();

        assert!(router.execution_initialize(&mut run).is_none());
        assert_eq!(run.repository().observer_count(), 0);
    }

    #[test]
    fn test_subscription_is_released_on_cleanup() {
        let router = Arc::new(
            BeanRouter::new(
                RoutingConfig::new("order", "mock:orders"),
                Arc::new(MemoryDispatcher::new()),
            )
            .unwrap(),
        );
        let mut run = RunContext::empty();

        let subscription = router.execution_initialize(&mut run).unwrap();
        assert_eq!(run.repository().observer_count(), 1);

        router.execution_cleanup(&mut run, subscription);
        assert_eq!(run.repository().observer_count(), 0);
    }

    #[test]
    fn test_teardown_wraps_dispatch_error() {
        let router = BeanRouter::new(
            RoutingConfig::new("order", "mock:orders"),
            Arc::new(FailingDispatcher),
        )
        .unwrap();
        assert!(matches!(router.teardown(), Err(CartridgeError::Teardown(_))));
    }
}

//! Bean router configuration.

use serde::{Deserialize, Serialize};

use crate::error::CartridgeError;
use crate::routing::correlation::{Correlation, CorrelationTemplate};

/// Sentinel for "not configured" bean ids and selectors.
pub const NONE: &str = "none";

/// Configuration of one bean router.
///
/// Immutable once the router is built. `correlation_id_name` and
/// `correlation_id_pattern` must be set together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfig {
    /// Id of the bean to route
    pub bean_id: String,

    /// Destination URI the bean is sent to
    #[serde(alias = "targetDestination")]
    pub to_endpoint: String,

    /// Bean selector for direct invocation. Unset or `"none"` means the
    /// router reacts to lifecycle events instead.
    #[serde(default)]
    pub selector: Option<String>,

    #[serde(default)]
    pub correlation_id_name: Option<String>,

    #[serde(default)]
    pub correlation_id_pattern: Option<String>,

    /// Routing condition expression
    #[serde(default)]
    pub condition: Option<String>,
}

impl RoutingConfig {
    pub fn new(bean_id: impl Into<String>, to_endpoint: impl Into<String>) -> Self {
        Self {
            bean_id: bean_id.into(),
            to_endpoint: to_endpoint.into(),
            selector: None,
            correlation_id_name: None,
            correlation_id_pattern: None,
            condition: None,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_correlation_id_name(mut self, name: impl Into<String>) -> Self {
        self.correlation_id_name = Some(name.into());
        self
    }

    pub fn with_correlation_id_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.correlation_id_pattern = Some(pattern.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Selector the router is bound to, if any.
    pub fn bound_selector(&self) -> Option<&str> {
        self.selector.as_deref().filter(|selector| *selector != NONE)
    }

    /// `true` when the router subscribes to bean lifecycle events.
    pub fn is_observer_driven(&self) -> bool {
        self.bean_id != NONE && self.bound_selector().is_none()
    }

    /// Check required fields and the correlation pairing.
    ///
    /// # Errors
    /// `CartridgeError::Configuration` describing the first problem found
    pub fn validate(&self) -> Result<(), CartridgeError> {
        if self.bean_id.trim().is_empty() {
            return Err(CartridgeError::Configuration(
                "Bean router requires a 'beanId'".to_string(),
            ));
        }
        if self.to_endpoint.trim().is_empty() {
            return Err(CartridgeError::Configuration(format!(
                "Bean router for beanId '{}' requires a 'toEndpoint'",
                self.bean_id
            )));
        }

        match (&self.correlation_id_name, &self.correlation_id_pattern) {
            (Some(_), None) => Err(CartridgeError::Configuration(
                "Bean router configured with a 'correlationIdName', \
                 but 'correlationIdPattern' is not configured."
                    .to_string(),
            )),
            (None, Some(_)) => Err(CartridgeError::Configuration(
                "Bean router configured with a 'correlationIdPattern', \
                 but 'correlationIdName' is not configured."
                    .to_string(),
            )),
            (Some(name), Some(_)) if name.trim().is_empty() => Err(CartridgeError::Configuration(
                "Bean router 'correlationIdName' must not be empty".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Validated correlation policy, if configured.
    pub fn correlation(&self) -> Result<Option<Correlation>, CartridgeError> {
        self.validate()?;

        match (&self.correlation_id_name, &self.correlation_id_pattern) {
            (Some(name), Some(pattern)) => {
                let template = CorrelationTemplate::parse(pattern).map_err(|e| {
                    CartridgeError::Configuration(format!(
                        "Invalid 'correlationIdPattern' for beanId '{}': {}",
                        self.bean_id, e
                    ))
                })?;
                Ok(Some(Correlation {
                    header_name: name.clone(),
                    template,
                }))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_is_valid() {
        let config = RoutingConfig::new("order", "mock:orders");
        assert!(config.validate().is_ok());
        assert_eq!(config.correlation().unwrap(), None);
    }

    #[test]
    fn test_name_without_pattern_is_rejected() {
        let config =
            RoutingConfig::new("order", "mock:orders").with_correlation_id_name("correlationId");

        let err = config.validate().unwrap_err();
        assert!(matches!(err, CartridgeError::Configuration(_)));
        assert!(err.to_string().contains("'correlationIdPattern' is not configured"));
    }

    #[test]
    fn test_pattern_without_name_is_rejected() {
        let config =
            RoutingConfig::new("order", "mock:orders").with_correlation_id_pattern("${run.id}");

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'correlationIdName' is not configured"));
    }

    #[test]
    fn test_empty_fields_are_rejected() {
        assert!(RoutingConfig::new("", "mock:orders").validate().is_err());
        assert!(RoutingConfig::new("order", " ").validate().is_err());
        assert!(RoutingConfig::new("order", "mock:orders")
            .with_correlation_id_name("")
            .with_correlation_id_pattern("x")
            .validate()
            .is_err());
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let config = RoutingConfig::new("order", "mock:orders")
            .with_correlation_id_name("correlationId")
            .with_correlation_id_pattern("${run.id");

        assert!(matches!(config.correlation(), Err(CartridgeError::Configuration(_))));
    }

    #[test]
    fn test_observer_driven() {
        assert!(RoutingConfig::new("order", "mock:a").is_observer_driven());
        assert!(RoutingConfig::new("order", "mock:a").with_selector(NONE).is_observer_driven());
        assert!(!RoutingConfig::new("order", "mock:a")
            .with_selector("orders/order")
            .is_observer_driven());
        assert!(!RoutingConfig::new(NONE, "mock:a").is_observer_driven());
    }

    #[test]
    fn test_deserialize_camel_case() {
        let yaml = r#"
beanId: coordinate
targetDestination: "mock:to"
correlationIdName: correlationId
correlationIdPattern: "${run.id}"
condition: "coordinate.x < 100"
"#;
        let config: RoutingConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.to_endpoint, "mock:to");
        assert_eq!(config.correlation_id_name.as_deref(), Some("correlationId"));
        assert_eq!(config.condition.as_deref(), Some("coordinate.x < 100"));
        assert!(config.correlation().unwrap().is_some());
    }
}

//! Error types for the routing cartridge.
//!
//! `CartridgeError` is what callers of the processor, data format and
//! endpoint see. Routing failures carry the bean id and the destination so a
//! failed run can be traced back to the router configuration that caused it.

use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::routing::correlation::TemplateError;

/// Crate-level error.
#[derive(Debug, Error)]
pub enum CartridgeError {
    /// Invalid router or engine configuration, raised at setup time.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// The transform engine could not be started or stopped.
    #[error("Failed to {action} transform engine: {message}")]
    Lifecycle {
        action: LifecycleAction,
        message: String,
    },

    #[error("Transform engine is not running")]
    NotStarted,

    /// A required bean could not be extracted from the source.
    #[error("Transform error: {0}")]
    Transform(String),

    /// The dispatch template failed while being released.
    #[error("Failed to stop dispatch template: {0}")]
    Teardown(#[source] DispatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Which half of the engine lifecycle failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Start,
    Stop,
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleAction::Start => write!(f, "start"),
            LifecycleAction::Stop => write!(f, "stop"),
        }
    }
}

/// Failure to route a bean to its destination.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error(
        "Exception routing beanId '{bean_id}' to endpoint '{endpoint}'. \
         The bean was not found in the run context."
    )]
    BeanNotFound { bean_id: String, endpoint: String },

    #[error("Exception routing beanId '{bean_id}' to endpoint '{endpoint}'.")]
    Dispatch {
        bean_id: String,
        endpoint: String,
        #[source]
        source: DispatchError,
    },

    #[error("Exception routing beanId '{bean_id}' to endpoint '{endpoint}'.")]
    Correlation {
        bean_id: String,
        endpoint: String,
        #[source]
        source: TemplateError,
    },
}

impl RoutingError {
    pub fn bean_id(&self) -> &str {
        match self {
            RoutingError::BeanNotFound { bean_id, .. }
            | RoutingError::Dispatch { bean_id, .. }
            | RoutingError::Correlation { bean_id, .. } => bean_id,
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            RoutingError::BeanNotFound { endpoint, .. }
            | RoutingError::Dispatch { endpoint, .. }
            | RoutingError::Correlation { endpoint, .. } => endpoint,
        }
    }
}

/// Raised by a condition evaluator. Never propagated out of the observer.
#[derive(Debug, Error)]
#[error("Condition evaluation failed: {0}")]
pub struct ConditionError(pub String);

pub type Result<T> = std::result::Result<T, CartridgeError>;

//! Bean routing: republishes beans extracted during a run to dispatch
//! destinations, optionally gated by a condition and tagged with a
//! correlation id.

pub mod condition;
pub mod config;
pub mod correlation;
pub mod observer;
pub mod router;

pub use condition::{ConditionEvaluator, ExpressionCondition};
pub use config::{RoutingConfig, NONE};
pub use correlation::{Correlation, CorrelationTemplate, TemplateError};
pub use observer::BeanRouterObserver;
pub use router::BeanRouter;

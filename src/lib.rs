//! # Nomroute: Bean Routing for Transform Pipelines
//!
//! Nomroute runs a bean extraction engine as a step in a message pipeline and
//! republishes the extracted beans onto message destinations while the run
//! is still in progress.
//!
//! ## Features
//!
//! - **Transform processor**: runs the engine over an exchange body and sets
//!   the run result as the new body
//! - **Bean routing**: lifecycle-driven or selector-bound routers that send
//!   finished beans to a destination
//! - **Conditions**: rhai expressions over the run's beans gate each send
//! - **Correlation ids**: `${...}` templates rendered per send into a header
//! - **Data format**: marshal/unmarshal through the engine
//! - **Result converters**: type-directed conversion of run results
//! - **NATS JetStream dispatch**: publish routed beans to JetStream subjects
//!
//! ## Example: Routing coordinates
//!
//! ```yaml
//! beans:
//!   - beanId: coordinate
//!     path: coords/coord
//!     repeated: true
//! routers:
//!   - beanId: coordinate
//!     toEndpoint: "nats:coordinates.small"
//!     condition: "coordinate.x < 100"
//!     correlationIdName: correlationId
//!     correlationIdPattern: "${run.id}"
//!   - beanId: coordinate
//!     toEndpoint: "nats:coordinates.large"
//!     condition: "coordinate.x >= 100"
//!     correlationIdName: correlationId
//!     correlationIdPattern: "${run.id}"
//! ```

// Core modules
pub mod error;
pub mod extraction;

// Runtime: run context, lifecycle events, engine and configuration
pub mod runtime;

// Bean routing
pub mod routing;

// Dispatch templates (in-memory and NATS JetStream)
pub mod dispatch;

// Pipeline surface
pub mod converters;
pub mod dataformat;
pub mod endpoint;
pub mod exchange;
pub mod processor;
pub mod service;

// Re-export key types
pub use error::{CartridgeError, ConditionError, LifecycleAction, RoutingError};
pub use extraction::{FieldPath, PathExtractor};

// Re-export runtime types
pub use runtime::{
    BeanRepository, CartridgeConfig, Exports, RunContext, RunResult, TransformEngine,
};

// Re-export routing types
pub use routing::{BeanRouter, BeanRouterObserver, RoutingConfig};

// Re-export dispatch types
pub use dispatch::{DispatchTemplate, MemoryDispatcher, Message, NatsConfig, NatsDispatcher};

pub use converters::ConverterRegistry;
pub use dataformat::TransformDataFormat;
pub use endpoint::TransformEndpoint;
pub use exchange::{Body, Exchange};
pub use processor::TransformProcessor;
pub use service::{EngineFactory, EngineService};

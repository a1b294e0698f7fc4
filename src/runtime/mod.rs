//! Runtime for bean extraction runs.
//!
//! This module provides the run context and bean repository, bean lifecycle
//! events, the transform engine and the YAML configuration that builds it.

pub mod config_loader;
pub mod context;
pub mod engine;
pub mod lifecycle;

// Re-export key types
pub use config_loader::{BeanConfig, CartridgeConfig};
pub use context::{BeanRepository, RunContext};
pub use engine::{BeanExtractor, ExportKind, Exports, ResultMap, RunResult, TransformEngine};
pub use lifecycle::{BeanLifecycle, LifecycleEvent, LifecycleObserver, SubscriptionId};

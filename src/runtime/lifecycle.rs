//! Bean lifecycle notifications.
//!
//! A run announces every bean it adds (`Started`) and every bean it finishes
//! populating (`Ended`). Subscribers register a callback on the run's
//! [`BeanRepository`](crate::runtime::BeanRepository) and receive events
//! synchronously, in the order the engine produces them.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CartridgeError;
use crate::runtime::context::RunContext;

/// Phase of a bean within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeanLifecycle {
    /// The bean was added to the repository.
    Started,
    /// The bean is fully populated.
    Ended,
}

/// A single lifecycle notification.
///
/// Events borrow from the run that emitted them and are never stored.
#[derive(Clone, Copy)]
pub struct LifecycleEvent<'a> {
    pub bean_id: &'a str,
    pub lifecycle: BeanLifecycle,
    pub bean: &'a Value,
    pub run: &'a RunContext,
}

impl fmt::Debug for LifecycleEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleEvent")
            .field("bean_id", &self.bean_id)
            .field("lifecycle", &self.lifecycle)
            .field("bean", &self.bean)
            .field("run_id", &self.run.run_id())
            .finish()
    }
}

/// Callback invoked for each lifecycle event of a run.
///
/// An error returned here aborts the run that emitted the event.
pub type LifecycleObserver =
    Arc<dyn Fn(&LifecycleEvent<'_>) -> Result<(), CartridgeError> + Send + Sync>;

/// Handle for removing a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

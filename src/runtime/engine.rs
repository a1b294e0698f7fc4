//! Transform engine.
//!
//! Runs registered bean extractors over a source document in registration
//! (document) order, announcing each bean through the run's lifecycle
//! events, and builds the run's exported result.
//!
//! # Example Flow
//! 1. Register extractors (one per bean id)
//! 2. Register bean routers
//! 3. `filter_source` subscribes lifecycle-driven routers, extracts beans,
//!    visits selector-bound routers, then unsubscribes
//! 4. The exported beans become the run's [`RunResult`]

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CartridgeError;
use crate::extraction::FieldPath;
use crate::routing::BeanRouter;
use crate::runtime::context::RunContext;

/// Extracts one named bean from a source document.
pub trait BeanExtractor: Send + Sync {
    /// Extract the bean from the source.
    ///
    /// # Returns
    /// * `Ok(Some(value))` - Bean extracted (a list for repeated beans)
    /// * `Ok(None)` - Bean not present in this source
    /// * `Err(msg)` - Extraction failed
    fn extract(&self, run: &RunContext, source: &Value) -> Result<Option<Value>, String>;

    /// Bean id the extracted value is stored under.
    fn bean_id(&self) -> &str;

    /// Selector that selector-bound routers match against.
    fn selector(&self) -> &str;

    /// Repeated extractors announce one bean per list element.
    fn is_repeated(&self) -> bool {
        false
    }

    /// A required bean that cannot be extracted fails the run.
    fn is_required(&self) -> bool {
        false
    }
}

/// Named results of a run, in extraction order.
pub type ResultMap = IndexMap<String, Value>;

/// Output of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunResult {
    /// Exported beans by id
    Java(ResultMap),
    /// Exported beans serialized as a JSON object
    Text(String),
}

impl RunResult {
    /// Flatten the result into its exported values.
    pub fn extract_results(&self) -> Vec<Value> {
        match self {
            RunResult::Java(map) => map.values().cloned().collect(),
            RunResult::Text(text) => vec![Value::String(text.clone())],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    #[default]
    Java,
    Text,
}

/// Which beans a run exports and in what form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exports {
    pub kind: ExportKind,

    /// Beans to export; every bean when unset.
    #[serde(default)]
    pub bean_ids: Option<Vec<String>>,
}

impl Exports {
    pub fn java() -> Self {
        Self::default()
    }

    pub fn text() -> Self {
        Self {
            kind: ExportKind::Text,
            bean_ids: None,
        }
    }

    pub fn with_bean_ids(mut self, bean_ids: Vec<String>) -> Self {
        self.bean_ids = Some(bean_ids);
        self
    }

    /// Build the run result from the final repository state.
    pub fn create_result(&self, run: &RunContext) -> Result<RunResult, CartridgeError> {
        let beans = run.repository().get_all_as_map();
        let map: ResultMap = match &self.bean_ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| beans.get(id).map(|bean| (id.clone(), bean.clone())))
                .collect(),
            None => beans.clone(),
        };

        match self.kind {
            ExportKind::Java => Ok(RunResult::Java(map)),
            ExportKind::Text => Ok(RunResult::Text(serde_json::to_string(&map)?)),
        }
    }
}

/// The transform engine instance.
#[derive(Default)]
pub struct TransformEngine {
    extractors: Vec<Box<dyn BeanExtractor>>,
    routers: Vec<Arc<BeanRouter>>,
    exports: Exports,

    /// Member name used when wrapping a marshal input as a source document
    source_name: Option<String>,
}

impl TransformEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exports(mut self, exports: Exports) -> Self {
        self.exports = exports;
        self
    }

    pub fn with_source_name(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = Some(source_name.into());
        self
    }

    /// Register a bean extractor. Extractors run in registration order.
    pub fn register_extractor(&mut self, extractor: Box<dyn BeanExtractor>) -> &mut Self {
        self.extractors.push(extractor);
        self
    }

    /// Register a bean router.
    pub fn register_router(&mut self, router: Arc<BeanRouter>) -> &mut Self {
        self.routers.push(router);
        self
    }

    pub fn exports(&self) -> &Exports {
        &self.exports
    }

    pub fn routers(&self) -> &[Arc<BeanRouter>] {
        &self.routers
    }

    pub fn extractor_count(&self) -> usize {
        self.extractors.len()
    }

    /// Create an empty run.
    pub fn create_run(&self) -> RunContext {
        RunContext::empty()
    }

    /// Create a run seeded with global context fields.
    pub fn create_run_with(&self, global_context: HashMap<String, String>) -> RunContext {
        RunContext::new(global_context)
    }

    /// Wrap an in-memory value as a source document.
    ///
    /// With a source name configured the value becomes `{source_name: value}`,
    /// otherwise it is used as-is.
    pub fn wrap_source(&self, value: Value) -> Value {
        match &self.source_name {
            Some(name) => {
                let mut map = serde_json::Map::new();
                map.insert(name.clone(), value);
                Value::Object(map)
            }
            None => value,
        }
    }

    /// Run the engine over a source document.
    ///
    /// Lifecycle-driven routers are subscribed for the duration of the run
    /// and always unsubscribed before returning, including on failure.
    ///
    /// # Errors
    /// Routing errors raised while beans are announced, and `Transform` for
    /// required beans that could not be extracted
    pub fn filter_source(
        &self,
        run: &mut RunContext,
        source: &Value,
    ) -> Result<RunResult, CartridgeError> {
        let subscriptions: Vec<_> = self
            .routers
            .iter()
            .filter_map(|router| {
                router
                    .execution_initialize(run)
                    .map(|subscription| (router, subscription))
            })
            .collect();

        let outcome = self.extract_beans(run, source);

        for (router, subscription) in subscriptions {
            router.execution_cleanup(run, subscription);
        }

        outcome?;
        self.exports.create_result(run)
    }

    fn extract_beans(&self, run: &mut RunContext, source: &Value) -> Result<(), CartridgeError> {
        for extractor in &self.extractors {
            let bean_id = extractor.bean_id();

            let value = match extractor.extract(run, source) {
                Ok(Some(value)) => value,
                Ok(None) if extractor.is_required() => {
                    return Err(CartridgeError::Transform(format!(
                        "Required bean '{}' not found at '{}'",
                        bean_id,
                        extractor.selector()
                    )));
                }
                Ok(None) => continue,
                Err(err) if extractor.is_required() => {
                    return Err(CartridgeError::Transform(format!(
                        "Failed to extract required bean '{}': {}",
                        bean_id, err
                    )));
                }
                Err(err) => {
                    tracing::warn!("Skipping optional bean '{}': {}", bean_id, err);
                    continue;
                }
            };

            match value {
                Value::Array(items) if extractor.is_repeated() => {
                    for item in &items {
                        self.announce(run, extractor.as_ref(), item.clone())?;
                    }
                    run.replace_bean_silently(bean_id, Value::Array(items));
                }
                value => self.announce(run, extractor.as_ref(), value)?,
            }
        }

        Ok(())
    }

    fn announce(
        &self,
        run: &mut RunContext,
        extractor: &dyn BeanExtractor,
        bean: Value,
    ) -> Result<(), CartridgeError> {
        let bean_id = extractor.bean_id();
        run.add_bean(bean_id, bean)?;

        let path = FieldPath::from_selector(extractor.selector());
        for router in self.routers.iter().filter(|router| {
            router
                .selector()
                .is_some_and(|selector| path.same_node(&FieldPath::from_selector(selector)))
        }) {
            router.visit_after(run)?;
        }

        run.end_bean(bean_id)
    }

    /// Release every router's dispatch resources.
    ///
    /// All routers are torn down even if one fails; the first failure is
    /// returned.
    pub fn close(&self) -> Result<(), CartridgeError> {
        let mut first_error = None;

        for router in &self.routers {
            if let Err(err) = router.teardown() {
                tracing::warn!(
                    "Router for bean '{}' failed to tear down: {}",
                    router.bean_id(),
                    err
                );
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

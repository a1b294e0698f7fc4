//! Cartridge configuration loader.
//!
//! Loads the bean and router configuration from YAML and builds a ready
//! [`TransformEngine`] from it.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dispatch::DispatchTemplate;
use crate::error::CartridgeError;
use crate::extraction::{FieldPath, PathExtractor};
use crate::routing::{BeanRouter, RoutingConfig};
use crate::runtime::engine::{ExportKind, Exports, TransformEngine};

/// Names bound by the run itself in templates (`run`) and conditions
/// (`run_id`).
const RESERVED_BEAN_IDS: [&str; 2] = ["run", "run_id"];

/// One bean the engine extracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeanConfig {
    pub bean_id: String,

    /// Location of the bean in the source document
    pub path: String,

    /// Announce one bean per list element
    #[serde(default)]
    pub repeated: bool,

    #[serde(default)]
    pub required: bool,
}

/// Complete cartridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartridgeConfig {
    #[serde(default)]
    pub exports: ExportKind,

    /// Beans to export; every bean when unset
    #[serde(default)]
    pub export_beans: Option<Vec<String>>,

    /// Member name marshal inputs are wrapped under
    #[serde(default)]
    pub source_name: Option<String>,

    #[serde(default)]
    pub beans: Vec<BeanConfig>,

    #[serde(default)]
    pub routers: Vec<RoutingConfig>,
}

impl CartridgeConfig {
    /// Load cartridge configuration from a YAML file.
    ///
    /// # Errors
    /// Returns error if the file can't be read, isn't valid YAML, or fails
    /// validation
    ///
    /// # Example
    /// ```ignore
    /// use nomroute::runtime::CartridgeConfig;
    ///
    /// let config = CartridgeConfig::load_from_file("config/coordinates.yaml")?;
    /// println!("Routers: {}", config.routers.len());
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CartridgeError> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path).map_err(|e| {
            CartridgeError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml_str(&contents)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CartridgeError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check bean declarations and every router's settings.
    ///
    /// # Errors
    /// `CartridgeError::Configuration` for empty or duplicate bean ids,
    /// empty paths and invalid routers
    pub fn validate(&self) -> Result<(), CartridgeError> {
        let mut seen = HashSet::new();

        for bean in &self.beans {
            if bean.bean_id.trim().is_empty() {
                return Err(CartridgeError::Configuration(
                    "Bean declaration requires a 'beanId'".to_string(),
                ));
            }
            if bean.path.trim().is_empty() {
                return Err(CartridgeError::Configuration(format!(
                    "Bean '{}' requires a 'path'",
                    bean.bean_id
                )));
            }
            if RESERVED_BEAN_IDS.contains(&bean.bean_id.as_str()) {
                return Err(CartridgeError::Configuration(format!(
                    "Bean id '{}' is reserved for run metadata",
                    bean.bean_id
                )));
            }
            if !seen.insert(bean.bean_id.as_str()) {
                return Err(CartridgeError::Configuration(format!(
                    "Bean '{}' is declared more than once",
                    bean.bean_id
                )));
            }
        }

        for router in &self.routers {
            router.validate()?;

            if let Some(selector) = router.bound_selector() {
                let selector_path = FieldPath::from_selector(selector);
                let bound = self
                    .beans
                    .iter()
                    .any(|bean| FieldPath::from_selector(&bean.path).same_node(&selector_path));
                if !bound {
                    return Err(CartridgeError::Configuration(format!(
                        "Router to '{}' selects '{}', which matches no declared bean path",
                        router.to_endpoint, selector
                    )));
                }
            }

            if !seen.contains(router.bean_id.as_str()) {
                tracing::warn!(
                    "Router to '{}' references undeclared bean '{}'",
                    router.to_endpoint,
                    router.bean_id
                );
            }
        }

        Ok(())
    }

    pub fn exports(&self) -> Exports {
        Exports {
            kind: self.exports,
            bean_ids: self.export_beans.clone(),
        }
    }

    /// Build the engine, its extractors and its routers.
    ///
    /// Every router shares the given dispatch template. A configuration with
    /// routers but no dispatch template is rejected.
    pub fn build_engine(
        &self,
        dispatch: Option<Arc<dyn DispatchTemplate>>,
    ) -> Result<TransformEngine, CartridgeError> {
        let mut engine = TransformEngine::new().with_exports(self.exports());
        if let Some(name) = &self.source_name {
            engine = engine.with_source_name(name.clone());
        }

        for bean in &self.beans {
            engine.register_extractor(Box::new(
                PathExtractor::new(bean.bean_id.clone(), &bean.path)
                    .repeated(bean.repeated)
                    .required(bean.required),
            ));
        }

        if !self.routers.is_empty() {
            let dispatch = dispatch.ok_or_else(|| {
                CartridgeError::Configuration(
                    "Bean routers are configured but no dispatch template was provided".to_string(),
                )
            })?;

            for config in &self.routers {
                let router = BeanRouter::new(config.clone(), Arc::clone(&dispatch))?;
                engine.register_router(Arc::new(router));
            }
        }

        tracing::info!(
            "Built transform engine with {} beans and {} routers",
            self.beans.len(),
            self.routers.len()
        );

        Ok(engine)
    }
}

//! Data format adapter: marshal and unmarshal through the transform engine.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::dispatch::DispatchTemplate;
use crate::error::CartridgeError;
use crate::runtime::context::RunContext;
use crate::runtime::engine::RunResult;
use crate::service::{ConfigEngineFactory, EngineFactory, EngineService};

#[derive(Debug)]
pub struct TransformDataFormat {
    service: EngineService,
}

impl TransformDataFormat {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            service: EngineService::new(factory),
        }
    }

    pub fn from_config(
        config_path: impl Into<PathBuf>,
        dispatch: Option<Arc<dyn DispatchTemplate>>,
    ) -> Self {
        let mut factory = ConfigEngineFactory::new(config_path);
        if let Some(dispatch) = dispatch {
            factory = factory.with_dispatch(dispatch);
        }
        Self::new(Arc::new(factory))
    }

    pub fn start(&self) -> Result<(), CartridgeError> {
        self.service.start()
    }

    pub fn stop(&self) -> Result<(), CartridgeError> {
        self.service.stop()
    }

    /// Run the engine over an in-memory value and write the result as JSON
    /// text.
    pub fn marshal<W: Write>(&self, input: &Value, sink: &mut W) -> Result<(), CartridgeError> {
        let engine = self.service.engine()?;
        let mut run = engine.create_run();
        self.marshal_in(&mut run, input, sink)
    }

    /// [`marshal`](Self::marshal) within a caller-supplied run.
    pub fn marshal_in<W: Write>(
        &self,
        run: &mut RunContext,
        input: &Value,
        sink: &mut W,
    ) -> Result<(), CartridgeError> {
        let engine = self.service.engine()?;
        let source = engine.wrap_source(input.clone());

        let text = match engine.filter_source(run, &source)? {
            RunResult::Text(text) => text,
            RunResult::Java(map) => serde_json::to_string(&map)?,
        };

        sink.write_all(text.as_bytes())?;
        sink.flush()?;
        Ok(())
    }

    /// Run the engine over a JSON stream.
    ///
    /// # Returns
    /// The exported value when exactly one exists, otherwise the list of
    /// exported values
    pub fn unmarshal<R: Read>(&self, mut input: R) -> Result<Value, CartridgeError> {
        let engine = self.service.engine()?;

        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;
        let source: Value = serde_json::from_slice(&bytes)?;

        let mut run = engine.create_run();
        let mut results = engine.filter_source(&mut run, &source)?.extract_results();

        if results.len() == 1 {
            Ok(results.remove(0))
        } else {
            Ok(Value::Array(results))
        }
    }
}

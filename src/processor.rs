//! Transform processor: a pipeline step that runs the transform engine over
//! the exchange body and replaces the body with the run's result.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::dispatch::DispatchTemplate;
use crate::error::CartridgeError;
use crate::exchange::{Exchange, RUN_ID_PROPERTY};
use crate::service::{ConfigEngineFactory, EngineFactory, EngineService, ServiceState};

#[derive(Debug)]
pub struct TransformProcessor {
    service: EngineService,
}

impl TransformProcessor {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            service: EngineService::new(factory),
        }
    }

    /// Processor whose engine is loaded from a cartridge configuration file.
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

    pub fn state(&self) -> ServiceState {
        self.service.state()
    }

    /// Run the engine over the exchange body.
    ///
    /// String headers become global context fields of the run. On success
    /// the body is replaced with the run result and the run id is recorded
    /// in the [`RUN_ID_PROPERTY`] property.
    ///
    /// # Errors
    /// `NotStarted` before `start`, body conversion errors, and any routing
    /// or transform error raised during the run
    pub fn process(&self, exchange: &mut Exchange) -> Result<(), CartridgeError> {
        let engine = self.service.engine()?;
        let source = exchange.source()?;

        let global_context: HashMap<String, String> = exchange
            .string_headers()
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect();

        let mut run = engine.create_run_with(global_context);
        let result = engine.filter_source(&mut run, &source)?;

        tracing::debug!(
            "Run {} produced {} beans",
            run.run_id(),
            run.repository().bean_count()
        );

        exchange.set_property(RUN_ID_PROPERTY, Value::String(run.run_id().to_string()));
        exchange.body = result.into();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::Body;
    use crate::extraction::PathExtractor;
    use crate::runtime::engine::TransformEngine;
    use serde_json::json;

    fn processor() -> TransformProcessor {
        TransformProcessor::new(Arc::new(|| -> Result<TransformEngine, CartridgeError> {
            let mut engine = TransformEngine::new();
            engine
                .register_extractor(Box::new(PathExtractor::new("x", "coord/x")))
                .register_extractor(Box::new(PathExtractor::new("y", "coord/y")));
            Ok(engine)
        }))
    }

    #[test]
    fn test_process_before_start_fails() {
        let processor = processor();
        let mut exchange = Exchange::new(json!({}));

        assert!(matches!(
            processor.process(&mut exchange),
            Err(CartridgeError::NotStarted)
        ));
    }

    #[test]
    fn test_process_sets_result_body() {
        let processor = processor();
        processor.start().unwrap();

        let input = r#"{"coord": {"x": 1234, "y": 98765.76}}"#;
        let mut exchange = Exchange::new(Body::Text(input.to_string()));
        processor.process(&mut exchange).unwrap();

        let Body::Result(map) = &exchange.body else {
            panic!("expected result body, got {:?}", exchange.body);
        };
        assert_eq!(map["x"], json!(1234));
        assert_eq!(map["y"], json!(98765.76));
        assert!(exchange.property(RUN_ID_PROPERTY).is_some());
    }

    #[test]
    fn test_process_after_stop_fails() {
        let processor = processor();
        processor.start().unwrap();
        processor.stop().unwrap();

        let mut exchange = Exchange::new(json!({}));
        assert!(processor.process(&mut exchange).is_err());
        assert_eq!(processor.state(), ServiceState::Stopped);
    }
}

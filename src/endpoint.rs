//! Transform endpoint: addresses a configured processor by URI.
//!
//! URIs take the form `nomroute:<config path>`; `nomroute://<config path>`
//! is accepted as well.

use std::sync::Arc;

use crate::dispatch::DispatchTemplate;
use crate::error::{CartridgeError, LifecycleAction};
use crate::exchange::Exchange;
use crate::processor::TransformProcessor;

pub const SCHEME: &str = "nomroute";

#[derive(Debug)]
pub struct TransformEndpoint {
    uri: String,
    processor: TransformProcessor,
}

impl TransformEndpoint {
    pub fn new(uri: impl Into<String>, processor: TransformProcessor) -> Self {
        Self {
            uri: uri.into(),
            processor,
        }
    }

    /// Build an endpoint from its URI.
    ///
    /// # Errors
    /// `CartridgeError::Configuration` for another scheme or an empty path
    pub fn from_uri(
        uri: &str,
        dispatch: Option<Arc<dyn DispatchTemplate>>,
    ) -> Result<Self, CartridgeError> {
        let config_path = config_path(uri)?;
        Ok(Self::new(uri, TransformProcessor::from_config(config_path, dispatch)))
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn processor(&self) -> &TransformProcessor {
        &self.processor
    }

    pub fn start(&self) -> Result<(), CartridgeError> {
        self.processor.start().map_err(|e| lifecycle_error(LifecycleAction::Start, e))
    }

    pub fn stop(&self) -> Result<(), CartridgeError> {
        self.processor.stop().map_err(|e| lifecycle_error(LifecycleAction::Stop, e))
    }

    pub fn process(&self, exchange: &mut Exchange) -> Result<(), CartridgeError> {
        self.processor.process(exchange)
    }
}

// Lifecycle failures pass through; anything else becomes one.
fn lifecycle_error(action: LifecycleAction, err: CartridgeError) -> CartridgeError {
    match err {
        CartridgeError::Lifecycle { .. } => err,
        other => CartridgeError::Lifecycle {
            action,
            message: other.to_string(),
        },
    }
}

fn config_path(uri: &str) -> Result<&str, CartridgeError> {
    let rest = uri
        .strip_prefix(SCHEME)
        .and_then(|rest| rest.strip_prefix(':'))
        .ok_or_else(|| {
            CartridgeError::Configuration(format!(
                "Endpoint URI '{}' does not use the '{}' scheme",
                uri, SCHEME
            ))
        })?;

    let path = rest.strip_prefix("//").unwrap_or(rest);
    if path.trim().is_empty() {
        return Err(CartridgeError::Configuration(format!(
            "Endpoint URI '{}' names no configuration",
            uri
        )));
    }

    Ok(path)
}

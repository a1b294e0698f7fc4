//! Engine lifecycle.
//!
//! Binds a transform engine instance to the start/stop of the component
//! hosting it.
//!
//! ```text
//! Unstarted --start--> Running --stop--> Stopped
//! ```
//!
//! `stop` is idempotent and a no-op before `start`. Engines are not
//! restartable: `start` after `stop` is an error and a new service must be
//! built instead.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::dispatch::DispatchTemplate;
use crate::error::{CartridgeError, LifecycleAction};
use crate::runtime::config_loader::CartridgeConfig;
use crate::runtime::engine::TransformEngine;

/// Creates transform engine instances.
pub trait EngineFactory: Send + Sync {
    fn create_engine(&self) -> Result<TransformEngine, CartridgeError>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> Result<TransformEngine, CartridgeError> + Send + Sync,
{
    fn create_engine(&self) -> Result<TransformEngine, CartridgeError> {
        self()
    }
}

/// Default factory: loads a cartridge configuration file.
pub struct ConfigEngineFactory {
    config_path: PathBuf,
    dispatch: Option<Arc<dyn DispatchTemplate>>,
}

impl ConfigEngineFactory {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            dispatch: None,
        }
    }

    /// Dispatch template shared by the configured routers.
    pub fn with_dispatch(mut self, dispatch: Arc<dyn DispatchTemplate>) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }
}

impl EngineFactory for ConfigEngineFactory {
    fn create_engine(&self) -> Result<TransformEngine, CartridgeError> {
        CartridgeConfig::load_from_file(&self.config_path)?.build_engine(self.dispatch.clone())
    }
}

impl fmt::Debug for ConfigEngineFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigEngineFactory")
            .field("config_path", &self.config_path)
            .field("has_dispatch", &self.dispatch.is_some())
            .finish()
    }
}

/// Observable state of an [`EngineService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Unstarted,
    Running,
    Stopped,
}

enum State {
    Unstarted,
    Running(Arc<TransformEngine>),
    Stopped,
}

/// Owns the engine instance for its whole running state.
pub struct EngineService {
    factory: Arc<dyn EngineFactory>,
    state: RwLock<State>,
}

impl EngineService {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            state: RwLock::new(State::Unstarted),
        }
    }

    pub fn state(&self) -> ServiceState {
        match &*self.state.read() {
            State::Unstarted => ServiceState::Unstarted,
            State::Running(_) => ServiceState::Running,
            State::Stopped => ServiceState::Stopped,
        }
    }

    /// Create the engine.
    ///
    /// Starting a running service does nothing.
    ///
    /// # Errors
    /// `CartridgeError::Lifecycle` if the factory fails or the service was
    /// already stopped
    pub fn start(&self) -> Result<(), CartridgeError> {
        let mut state = self.state.write();

        match *state {
            State::Running(_) => {
                tracing::debug!("Transform engine already running");
                Ok(())
            }
            State::Stopped => Err(CartridgeError::Lifecycle {
                action: LifecycleAction::Start,
                message: "engine was stopped and cannot be restarted".to_string(),
            }),
            State::Unstarted => {
                let engine = self.factory.create_engine().map_err(|e| CartridgeError::Lifecycle {
                    action: LifecycleAction::Start,
                    message: e.to_string(),
                })?;

                tracing::info!(
                    "Transform engine started ({} beans, {} routers)",
                    engine.extractor_count(),
                    engine.routers().len()
                );
                *state = State::Running(Arc::new(engine));
                Ok(())
            }
        }
    }

    /// Release the engine.
    ///
    /// The service is stopped afterwards even if closing the engine fails.
    ///
    /// # Errors
    /// `CartridgeError::Lifecycle` wrapping the close failure
    pub fn stop(&self) -> Result<(), CartridgeError> {
        let mut state = self.state.write();

        let engine = match std::mem::replace(&mut *state, State::Stopped) {
            State::Running(engine) => engine,
            State::Unstarted => {
                *state = State::Unstarted;
                return Ok(());
            }
            State::Stopped => return Ok(()),
        };
        drop(state);

        engine.close().map_err(|e| CartridgeError::Lifecycle {
            action: LifecycleAction::Stop,
            message: e.to_string(),
        })?;

        tracing::info!("Transform engine stopped");
        Ok(())
    }

    /// The running engine.
    ///
    /// # Errors
    /// `CartridgeError::NotStarted` unless the service is running
    pub fn engine(&self) -> Result<Arc<TransformEngine>, CartridgeError> {
        match &*self.state.read() {
            State::Running(engine) => Ok(Arc::clone(engine)),
            _ => Err(CartridgeError::NotStarted),
        }
    }
}

impl fmt::Debug for EngineService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineService")
            .field("state", &self.state())
            .finish()
    }
}

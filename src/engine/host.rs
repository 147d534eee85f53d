//! Owned slot for the application's engine instance.

use super::ScriptEngine;
use crate::config::EngineConfig;
use crate::error::BridgeError;
use crate::runtime::{QuickJsRuntime, ScriptRuntime};

type EngineFactory<R> = Box<dyn FnMut() -> Result<ScriptEngine<R>, BridgeError>>;

/// Lazily created engine instance.
///
/// The first [`get_instance`](Self::get_instance) builds the engine. If that
/// fails the slot stays empty and the next call tries again from scratch.
///
/// ```no_run
/// use jsbind::{EngineConfig, EngineHost};
///
/// let mut host = EngineHost::new(EngineConfig::default());
/// let engine = host.get_instance()?;
/// engine.execute_script("log('ready')")?;
/// host.destroy_instance();
/// # Ok::<(), jsbind::BridgeError>(())
/// ```
pub struct EngineHost<R: ScriptRuntime = QuickJsRuntime> {
    engine: Option<ScriptEngine<R>>,
    factory: EngineFactory<R>,
}

impl EngineHost<QuickJsRuntime> {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_factory(move || ScriptEngine::new(config.clone()))
    }
}

impl Default for EngineHost<QuickJsRuntime> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl<R: ScriptRuntime> EngineHost<R> {
    pub fn with_factory(
        factory: impl FnMut() -> Result<ScriptEngine<R>, BridgeError> + 'static,
    ) -> Self {
        EngineHost {
            engine: None,
            factory: Box::new(factory),
        }
    }

    /// The engine, created on first use.
    pub fn get_instance(&mut self) -> Result<&mut ScriptEngine<R>, BridgeError> {
        if self.engine.is_none() {
            let engine = (self.factory)().inspect_err(|err| {
                tracing::error!("Script engine initialization failed: {}", err);
            })?;
            self.engine = Some(engine);
        }
        self.engine.as_mut().ok_or(BridgeError::NotInitialized)
    }

    /// The engine if it has been created
    pub fn instance(&self) -> Option<&ScriptEngine<R>> {
        self.engine.as_ref()
    }

    pub fn has_instance(&self) -> bool {
        self.engine.is_some()
    }

    /// Clean up and drop the engine, leaving the slot empty.
    pub fn destroy_instance(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.cleanup();
        }
    }
}

//! The engine bridge: one object owning the script runtime, the global
//! object, the wrapper registries and the lifecycle hooks.

mod exec;
mod gc;
mod host;
mod node_event;

pub use host::EngineHost;
pub use node_event::{NodeEventListener, NodeEventType};

use crate::class::{ClassFinalizer, ClassId, ClassRegistry, NativeConstructor};
use crate::config::EngineConfig;
use crate::error::BridgeError;
use crate::object::ObjectRegistry;
use crate::runtime::{QuickJsRuntime, ScriptRuntime};
use crate::value::{ObjectHandle, Value};
use std::time::Instant;

/// Zero-argument callback run around [`ScriptEngine::cleanup`].
pub type CleanupHook = Box<dyn FnOnce()>;

/// Module initializer run once by [`ScriptEngine::start`] with the global
/// object. Initializers are plain functions so duplicates can be detected.
pub type RegisterCallback<R> = fn(&mut ScriptEngine<R>, ObjectHandle) -> Result<(), BridgeError>;

/// Bridge between native code and an embedded script runtime.
///
/// Created valid by [`ScriptEngine::new`]; [`cleanup`](Self::cleanup) (or
/// dropping the engine) tears everything down.
pub struct ScriptEngine<R: ScriptRuntime = QuickJsRuntime> {
    objects: ObjectRegistry,
    classes: ClassRegistry,
    global: Option<ObjectHandle>,
    config: EngineConfig,
    is_valid: bool,
    in_cleanup: bool,
    start_time: Option<Instant>,
    node_event_listener: Option<NodeEventListener>,
    before_cleanup_hooks: Vec<CleanupHook>,
    after_cleanup_hooks: Vec<CleanupHook>,
    register_callbacks: Vec<RegisterCallback<R>>,
    runtime: Option<R>,
}

impl ScriptEngine<QuickJsRuntime> {
    /// Create a QuickJS runtime configured from `config` and wrap it.
    pub fn new(config: EngineConfig) -> Result<Self, BridgeError> {
        let runtime = QuickJsRuntime::new(&config)?;
        Self::with_runtime(runtime, config)
    }
}

impl<R: ScriptRuntime> ScriptEngine<R> {
    /// Wrap an already configured runtime.
    pub fn with_runtime(mut runtime: R, config: EngineConfig) -> Result<Self, BridgeError> {
        let global = match runtime.global_object() {
            Ok(global) => global,
            Err(err) => {
                runtime.shutdown();
                return Err(BridgeError::RuntimeInit(err.to_string()));
            }
        };
        tracing::debug!("New global object {} created", global);

        Ok(ScriptEngine {
            objects: ObjectRegistry::new(),
            classes: ClassRegistry::new(),
            global: Some(global),
            config,
            is_valid: true,
            in_cleanup: false,
            start_time: None,
            node_event_listener: None,
            before_cleanup_hooks: Vec::new(),
            after_cleanup_hooks: Vec::new(),
            register_callbacks: Vec::new(),
            runtime: Some(runtime),
        })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Record the start time and run every registered module initializer in
    /// order. The list is emptied whether or not they all succeed.
    pub fn start(&mut self) -> Result<(), BridgeError> {
        let global = match (self.is_valid, self.global) {
            (true, Some(global)) => global,
            _ => return Err(BridgeError::NotInitialized),
        };
        self.start_time = Some(Instant::now());

        let callbacks = std::mem::take(&mut self.register_callbacks);
        tracing::debug!("Running {} module initializers", callbacks.len());
        for (index, callback) in callbacks.into_iter().enumerate() {
            if let Err(source) = callback(self, global) {
                tracing::error!("Module initializer #{} failed: {}", index, source);
                return Err(BridgeError::ModuleInit {
                    index,
                    source: Box::new(source),
                });
            }
        }
        Ok(())
    }

    /// Tear the engine down. Does nothing unless the engine is valid.
    pub fn cleanup(&mut self) {
        if !self.is_valid {
            return;
        }
        tracing::debug!("Script engine cleanup begin");
        self.in_cleanup = true;

        for hook in std::mem::take(&mut self.before_cleanup_hooks) {
            hook();
        }

        if let (Some(runtime), Some(global)) = (self.runtime.as_mut(), self.global.take()) {
            runtime.release(global);
        }
        self.classes.cleanup();
        self.cleanup_objects();

        if let Some(mut runtime) = self.runtime.take() {
            runtime.shutdown();
        }
        self.is_valid = false;
        self.start_time = None;
        self.node_event_listener = None;
        self.register_callbacks.clear();

        for hook in std::mem::take(&mut self.after_cleanup_hooks) {
            hook();
        }
        self.in_cleanup = false;
        tracing::debug!("Script engine cleanup end");
    }

    pub fn add_before_cleanup_hook(&mut self, hook: impl FnOnce() + 'static) {
        self.before_cleanup_hooks.push(Box::new(hook));
    }

    pub fn add_after_cleanup_hook(&mut self, hook: impl FnOnce() + 'static) {
        self.after_cleanup_hooks.push(Box::new(hook));
    }

    /// Queue a module initializer for [`start`](Self::start).
    pub fn add_register_callback(
        &mut self,
        callback: RegisterCallback<R>,
    ) -> Result<(), BridgeError> {
        if self
            .register_callbacks
            .iter()
            .any(|existing| std::ptr::fn_addr_eq(*existing, callback))
        {
            return Err(BridgeError::DuplicateRegistration);
        }
        self.register_callbacks.push(callback);
        Ok(())
    }

    pub fn register_callback_count(&self) -> usize {
        self.register_callbacks.len()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn is_in_cleanup(&self) -> bool {
        self.in_cleanup
    }

    pub fn global_object(&self) -> Option<ObjectHandle> {
        self.global
    }

    /// When [`start`](Self::start) last ran
    pub fn start_time(&self) -> Option<Instant> {
        self.start_time
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn runtime(&self) -> Option<&R> {
        self.runtime.as_ref()
    }

    pub fn runtime_mut(&mut self) -> Option<&mut R> {
        self.runtime.as_mut()
    }

    fn runtime_or_err(&mut self) -> Result<&mut R, BridgeError> {
        self.runtime.as_mut().ok_or(BridgeError::NotInitialized)
    }

    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    // ========================================================================
    // Script object access
    // ========================================================================

    pub fn get_property(&mut self, target: ObjectHandle, key: &str) -> Result<Value, BridgeError> {
        self.runtime_or_err()?.get_property(target, key)
    }

    pub fn set_property(
        &mut self,
        target: ObjectHandle,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<(), BridgeError> {
        let value = value.into();
        self.runtime_or_err()?.set_property(target, key, &value)
    }

    /// Release an object handle handed out by evaluation or property access.
    /// Handles owned by a wrapper or the global object are left alone.
    pub fn release_value(&mut self, value: &Value) {
        let Some(handle) = value.as_object() else {
            return;
        };
        if self.global == Some(handle) || self.objects.find_by_handle(handle).is_some() {
            tracing::trace!("Not releasing {}: owned by the bridge", handle);
            return;
        }
        if let Some(runtime) = self.runtime.as_mut() {
            runtime.release(handle);
        }
    }

    // ========================================================================
    // Classes
    // ========================================================================

    pub fn create_class(
        &mut self,
        name: impl Into<String>,
        parent: Option<ClassId>,
        constructor: Option<NativeConstructor>,
    ) -> Result<ClassId, BridgeError> {
        self.classes.create(name, parent, constructor)
    }

    pub fn define_class_finalize(
        &mut self,
        id: ClassId,
        finalizer: ClassFinalizer,
    ) -> Result<(), BridgeError> {
        self.classes.define_finalize(id, finalizer)
    }

    /// Make the class constructor visible on the global object, installing
    /// uninstalled ancestors first.
    pub fn install_class(&mut self, id: ClassId) -> Result<(), BridgeError> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.classes.parent(current) {
            chain.push(parent);
            current = parent;
        }
        for class in chain.into_iter().rev() {
            if self.classes.is_installed(class) {
                continue;
            }
            let spec = self
                .classes
                .spec(class)
                .cloned()
                .ok_or(BridgeError::UnknownClass(class))?;
            self.runtime_or_err()?.install_class(&spec)?;
            self.classes.mark_installed(class);
        }
        Ok(())
    }
}

impl<R: ScriptRuntime> Drop for ScriptEngine<R> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

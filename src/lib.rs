//! Bridge between a native game engine and an embedded JavaScript engine
//!
//! The bridge owns a QuickJS runtime, exposes native objects to scripts and
//! keeps both object graphs consistent when either side collects: native code
//! holds script objects through rooted or weak wrappers, and script objects
//! keep each other alive through ownership edges mirrored into the script
//! heap.
//!
//! # Example
//!
//! ```
//! use jsbind::{EngineConfig, ScriptEngine, Value};
//!
//! let mut engine = ScriptEngine::new(EngineConfig::default()).unwrap();
//! engine.start().unwrap();
//! let result = engine.execute_script("1 + 2 * 3").unwrap();
//! assert_eq!(result, Some(Value::Number(7.0)));
//! ```

pub mod class;
pub mod config;
pub mod engine;
pub mod error;
pub mod object;
pub mod runtime;
pub mod value;

pub use class::{ClassFinalizer, ClassId, ClassRegistry, ClassSpec, NativeConstructor};
pub use config::EngineConfig;
pub use engine::{
    CleanupHook, EngineHost, NodeEventListener, NodeEventType, RegisterCallback, ScriptEngine,
};
pub use error::{BridgeError, NO_FILENAME, ScriptException};
pub use object::{NativePtr, ObjectRegistry, RegistryStats, ScriptObject, WrapperId};
pub use runtime::{
    GcHooks, GcPhase, NoopGcHooks, PrivateFinalizer, QuickJsRuntime, ScriptRuntime,
    WeakReferences,
};
pub use value::{ObjectHandle, Value};

//! Capability interface of the embedded script engine.
//!
//! The bridge drives the engine only through [`ScriptRuntime`]. The engine
//! reports collection activity back through [`GcHooks`], handing the hooks a
//! [`WeakReferences`] view so they can decide which native-side entries
//! survive a collection.
//!
//! [`QuickJsRuntime`] is the production implementation. Tests drive the
//! bridge with a scripted double.

mod quickjs;

pub use quickjs::QuickJsRuntime;

use crate::class::ClassSpec;
use crate::error::{BridgeError, ScriptException};
use crate::value::{ObjectHandle, Value};
use std::any::Any;

/// Called with the private payload of an object once the object is collected.
pub type PrivateFinalizer = Box<dyn FnOnce(Box<dyn Any>)>;

/// Phase of a collection cycle reported to [`GcHooks::notify_collection_phase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPhase {
    Begin,
    End,
}

/// Weak view of the handles a runtime holds for native code.
///
/// Only valid for the duration of a
/// [`GcHooks::notify_weak_references_need_update`] call.
pub trait WeakReferences {
    /// Refresh the weak reference behind `handle` after a collection.
    /// Returns `true` when the script object has been collected.
    fn update_after_gc(&mut self, handle: ObjectHandle) -> bool;

    /// Drop the strong root of `handle`, leaving only the weak reference.
    fn teardown_rooting(&mut self, handle: ObjectHandle);

    /// Forget `handle` entirely.
    fn release(&mut self, handle: ObjectHandle);
}

/// Collection callbacks implemented by the bridge.
pub trait GcHooks {
    fn notify_collection_phase(&mut self, phase: GcPhase);

    fn notify_weak_references_need_update(&mut self, weak: &mut dyn WeakReferences);
}

/// Hooks that ignore every notification.
pub struct NoopGcHooks;

impl GcHooks for NoopGcHooks {
    fn notify_collection_phase(&mut self, _phase: GcPhase) {}

    fn notify_weak_references_need_update(&mut self, _weak: &mut dyn WeakReferences) {}
}

/// Everything the bridge needs from an embedded engine.
///
/// Object handles returned by a runtime are rooted: they keep their script
/// object alive until [`unroot`](Self::unroot) or [`release`](Self::release).
pub trait ScriptRuntime {
    /// Compile and run `source` in the global scope.
    ///
    /// A thrown exception is left pending and reported as
    /// [`BridgeError::ExceptionPending`]. Collections triggered while the
    /// script runs are reported to `hooks` before this returns.
    fn evaluate(
        &mut self,
        source: &str,
        file_name: &str,
        hooks: &mut dyn GcHooks,
    ) -> Result<Value, BridgeError>;

    fn has_pending_exception(&self) -> bool;

    /// Take the pending exception, clearing it, and diagnose it.
    fn take_pending_exception(&mut self) -> Option<ScriptException>;

    /// Run a full collection cycle: phase `Begin`, the weak-reference update,
    /// phase `End`.
    fn collect_garbage(&mut self, hooks: &mut dyn GcHooks);

    fn global_object(&mut self) -> Result<ObjectHandle, BridgeError>;

    fn create_object(&mut self) -> Result<ObjectHandle, BridgeError>;

    fn get_property(&mut self, target: ObjectHandle, key: &str) -> Result<Value, BridgeError>;

    fn set_property(
        &mut self,
        target: ObjectHandle,
        key: &str,
        value: &Value,
    ) -> Result<(), BridgeError>;

    fn root(&mut self, handle: ObjectHandle) -> Result<(), BridgeError>;

    fn unroot(&mut self, handle: ObjectHandle) -> Result<(), BridgeError>;

    /// Forget a handle. Unknown handles are ignored.
    fn release(&mut self, handle: ObjectHandle);

    /// Make `owner` keep `child` alive inside the script heap.
    fn attach_child(&mut self, owner: ObjectHandle, child: ObjectHandle)
    -> Result<(), BridgeError>;

    fn detach_child(&mut self, owner: ObjectHandle, child: ObjectHandle)
    -> Result<(), BridgeError>;

    /// Attach a native payload to a script object. `finalize` receives the
    /// payload once the object is collected or the runtime shuts down.
    fn set_private_data(
        &mut self,
        handle: ObjectHandle,
        payload: Box<dyn Any>,
        finalize: Option<PrivateFinalizer>,
    ) -> Result<(), BridgeError>;

    /// Make a class constructor visible on the global object.
    fn install_class(&mut self, spec: &ClassSpec) -> Result<(), BridgeError>;

    /// Release every handle and tear the engine down. Further calls fail with
    /// [`BridgeError::NotInitialized`] or are ignored.
    fn shutdown(&mut self);
}

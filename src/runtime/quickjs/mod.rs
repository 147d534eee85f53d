//! QuickJS backend built on `rquickjs`.
//!
//! The QuickJS collector does not call out to embedders, so collection
//! reporting is driven from here: [`ScriptRuntime::collect_garbage`] reports a
//! full cycle, and collections requested by the `forceGC` global are reported
//! once the evaluation that requested them returns.

mod builtins;
mod convert;
mod handles;

use crate::class::ClassSpec;
use crate::config::EngineConfig;
use crate::error::{BridgeError, ScriptException};
use crate::runtime::{GcHooks, GcPhase, PrivateFinalizer, ScriptRuntime, WeakReferences};
use crate::value::{ObjectHandle, Value};
use handles::HandleTable;
use rquickjs::{Context, Ctx, Runtime, qjs};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::ffi::CString;
use std::rc::Rc;

/// Production [`ScriptRuntime`].
///
/// Field order is drop order: handles go before the context, the context
/// before the runtime. QuickJS aborts if a reference outlives its runtime.
pub struct QuickJsRuntime {
    handles: Rc<RefCell<HandleTable>>,
    gc_requests: Rc<Cell<u32>>,
    global: Option<ObjectHandle>,
    strict: bool,
    context: Option<Context>,
    runtime: Option<Runtime>,
}

impl QuickJsRuntime {
    pub fn new(config: &EngineConfig) -> Result<Self, BridgeError> {
        let runtime = Runtime::new().map_err(|err| BridgeError::RuntimeInit(err.to_string()))?;
        if config.memory_limit > 0 {
            runtime.set_memory_limit(config.memory_limit);
        }
        runtime.set_gc_threshold(config.gc_threshold);
        runtime.set_max_stack_size(config.max_stack_size);
        runtime.set_host_promise_rejection_tracker(Some(Box::new(
            builtins::report_unhandled_rejection,
        )));

        let context =
            Context::full(&runtime).map_err(|err| BridgeError::RuntimeInit(err.to_string()))?;
        let mut this = QuickJsRuntime {
            handles: Rc::new(RefCell::new(HandleTable::default())),
            gc_requests: Rc::new(Cell::new(0)),
            global: None,
            strict: config.strict,
            context: Some(context),
            runtime: Some(runtime),
        };
        // On failure `this` is dropped, which shuts down in the right order.
        this.install()
            .map_err(|err| BridgeError::RuntimeInit(err.to_string()))?;
        Ok(this)
    }

    fn install(&mut self) -> Result<(), BridgeError> {
        let gc_requests = self.gc_requests.clone();
        let global = self.with_context(|ctx, handles| {
            handles.borrow_mut().prepare(&ctx)?;
            builtins::install_globals(&ctx, gc_requests)?;
            builtins::install_private_data_class(&ctx)?;
            let global = handles.borrow_mut().insert(&ctx, ctx.globals())?;
            Ok(global)
        })?;
        self.global = Some(global);
        tracing::debug!("QuickJS context ready, global object {}", global);
        Ok(())
    }

    fn with_context<T>(
        &self,
        f: impl for<'js> FnOnce(Ctx<'js>, &RefCell<HandleTable>) -> Result<T, BridgeError>,
    ) -> Result<T, BridgeError> {
        let context = self.context.as_ref().ok_or(BridgeError::NotInitialized)?;
        let handles = &*self.handles;
        context.with(|ctx| f(ctx, handles))
    }

    /// Live handle count, including the global object.
    pub fn handle_count(&self) -> usize {
        self.handles.borrow().len()
    }

    fn eval_flags(&self) -> i32 {
        let mut flags = qjs::JS_EVAL_TYPE_GLOBAL;
        if self.strict {
            flags |= qjs::JS_EVAL_FLAG_STRICT;
        }
        flags as i32
    }

    fn report_cycle(&self, hooks: &mut dyn GcHooks) {
        let Some(context) = self.context.as_ref() else {
            return;
        };
        hooks.notify_collection_phase(GcPhase::Begin);
        let mut view = WeakView {
            context,
            handles: &self.handles,
        };
        hooks.notify_weak_references_need_update(&mut view);
        hooks.notify_collection_phase(GcPhase::End);
    }

    fn drain_collection_requests(&self, hooks: &mut dyn GcHooks) {
        let requested = self.gc_requests.replace(0);
        if requested > 0 {
            tracing::trace!("Script requested {} collections", requested);
            self.report_cycle(hooks);
        }
    }
}

impl ScriptRuntime for QuickJsRuntime {
    fn evaluate(
        &mut self,
        source: &str,
        file_name: &str,
        hooks: &mut dyn GcHooks,
    ) -> Result<Value, BridgeError> {
        let code = CString::new(source)
            .map_err(|_| BridgeError::invalid_source("source contains a NUL byte"))?;
        let file = CString::new(file_name)
            .map_err(|_| BridgeError::invalid_source("file name contains a NUL byte"))?;
        let flags = self.eval_flags();

        let outcome = self.with_context(|ctx, handles| {
            // SAFETY: `code` and `file` are NUL-terminated and outlive the
            // call; the returned value is owned and handed to `Value`.
            let value = unsafe {
                let raw = qjs::JS_Eval(
                    ctx.as_raw().as_ptr(),
                    code.as_ptr(),
                    source.len() as _,
                    file.as_ptr(),
                    flags,
                );
                rquickjs::Value::from_raw(ctx.clone(), raw)
            };
            if value.is_exception() {
                return Err(BridgeError::ExceptionPending);
            }
            convert::from_js(&ctx, handles, value)
        });

        self.drain_collection_requests(hooks);
        outcome
    }

    fn has_pending_exception(&self) -> bool {
        self.with_context(|ctx, _| {
            // SAFETY: plain query on a live context.
            Ok(unsafe { qjs::JS_HasException(ctx.as_raw().as_ptr()) })
        })
        .unwrap_or(false)
    }

    fn take_pending_exception(&mut self) -> Option<ScriptException> {
        self.with_context(|ctx, _| {
            // SAFETY: plain query on a live context.
            if !unsafe { qjs::JS_HasException(ctx.as_raw().as_ptr()) } {
                return Ok(None);
            }
            let thrown = ctx.catch();
            Ok(Some(convert::diagnose(&ctx, &thrown)))
        })
        .ok()
        .flatten()
    }

    fn collect_garbage(&mut self, hooks: &mut dyn GcHooks) {
        let Some(runtime) = self.runtime.as_ref() else {
            return;
        };
        runtime.run_gc();
        self.gc_requests.set(0);
        self.report_cycle(hooks);
    }

    fn global_object(&mut self) -> Result<ObjectHandle, BridgeError> {
        self.global.ok_or(BridgeError::NotInitialized)
    }

    fn create_object(&mut self) -> Result<ObjectHandle, BridgeError> {
        self.with_context(|ctx, handles| {
            let object = rquickjs::Object::new(ctx.clone())?;
            handles.borrow_mut().insert(&ctx, object)
        })
    }

    fn get_property(&mut self, target: ObjectHandle, key: &str) -> Result<Value, BridgeError> {
        self.with_context(|ctx, handles| {
            let object = handles.borrow().resolve_live(&ctx, target)?;
            let value: rquickjs::Value = object.get(key)?;
            convert::from_js(&ctx, handles, value)
        })
    }

    fn set_property(
        &mut self,
        target: ObjectHandle,
        key: &str,
        value: &Value,
    ) -> Result<(), BridgeError> {
        self.with_context(|ctx, handles| {
            let object = handles.borrow().resolve_live(&ctx, target)?;
            let value = convert::to_js(&ctx, handles, value)?;
            object.set(key, value)?;
            Ok(())
        })
    }

    fn root(&mut self, handle: ObjectHandle) -> Result<(), BridgeError> {
        self.with_context(|ctx, handles| handles.borrow_mut().root(&ctx, handle))
    }

    fn unroot(&mut self, handle: ObjectHandle) -> Result<(), BridgeError> {
        self.with_context(|_ctx, handles| {
            let mut table = handles.borrow_mut();
            if !table.contains(handle) {
                return Err(BridgeError::UnknownHandle(handle));
            }
            let strong = table.take_root(handle);
            drop(table);
            drop(strong);
            Ok(())
        })
    }

    fn release(&mut self, handle: ObjectHandle) {
        if self.global == Some(handle) {
            self.global = None;
        }
        let released = self.with_context(|_ctx, handles| {
            let slot = handles.borrow_mut().remove(handle);
            drop(slot);
            Ok(())
        });
        if released.is_err() {
            tracing::trace!("Release of {} after shutdown ignored", handle);
        }
    }

    fn attach_child(
        &mut self,
        owner: ObjectHandle,
        child: ObjectHandle,
    ) -> Result<(), BridgeError> {
        self.with_context(|ctx, handles| {
            let table = handles.borrow();
            let owner_object = table.resolve_live(&ctx, owner)?;
            let child_object = table.resolve_live(&ctx, child)?;
            drop(table);
            builtins::attach_child(&ctx, &owner_object, child, child_object)
        })
    }

    fn detach_child(
        &mut self,
        owner: ObjectHandle,
        child: ObjectHandle,
    ) -> Result<(), BridgeError> {
        self.with_context(|ctx, handles| {
            let owner_object = handles.borrow().resolve(&ctx, owner)?;
            match owner_object {
                Some(owner_object) => builtins::detach_child(&owner_object, child),
                // A collected owner no longer keeps anything alive.
                None => Ok(()),
            }
        })
    }

    fn set_private_data(
        &mut self,
        handle: ObjectHandle,
        payload: Box<dyn Any>,
        finalize: Option<PrivateFinalizer>,
    ) -> Result<(), BridgeError> {
        self.with_context(|ctx, handles| {
            let object = handles.borrow().resolve_live(&ctx, handle)?;
            builtins::attach_private_data(&ctx, &object, payload, finalize)
        })
    }

    fn install_class(&mut self, spec: &ClassSpec) -> Result<(), BridgeError> {
        let shared = self.handles.clone();
        self.with_context(|ctx, _| builtins::install_class(&ctx, spec, shared))
    }

    fn shutdown(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        let slots = self.handles.borrow_mut().drain();
        let released = slots.len();
        context.with(|_ctx| drop(slots));
        self.global = None;
        self.gc_requests.set(0);
        drop(context);
        self.runtime = None;
        tracing::debug!("QuickJS runtime destroyed, {} handles released", released);
    }
}

impl Drop for QuickJsRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// [`WeakReferences`] over the handle table, valid during one weak pass.
struct WeakView<'a> {
    context: &'a Context,
    handles: &'a RefCell<HandleTable>,
}

impl WeakReferences for WeakView<'_> {
    fn update_after_gc(&mut self, handle: ObjectHandle) -> bool {
        let handles = self.handles;
        self.context.with(|ctx| match handles.borrow().resolve(&ctx, handle) {
            Ok(object) => object.is_none(),
            Err(BridgeError::UnknownHandle(_)) => true,
            Err(err) => {
                tracing::warn!("Weak reference check for {} failed: {}", handle, err);
                false
            }
        })
    }

    fn teardown_rooting(&mut self, handle: ObjectHandle) {
        let strong = self.handles.borrow_mut().take_root(handle);
        self.context.with(|_ctx| drop(strong));
    }

    fn release(&mut self, handle: ObjectHandle) {
        let slot = self.handles.borrow_mut().remove(handle);
        self.context.with(|_ctx| drop(slot));
    }
}

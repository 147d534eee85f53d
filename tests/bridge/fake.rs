//! Scripted [`ScriptRuntime`] for tests that decide what the collector keeps.
//!
//! The state lives behind an `Rc` so tests can inspect it after the engine
//! has shut the runtime down.

use jsbind::{
    BridgeError, ClassSpec, EngineConfig, GcHooks, GcPhase, ObjectHandle, PrivateFinalizer,
    ScriptEngine, ScriptException, ScriptRuntime, Value, WeakReferences,
};
use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

#[derive(Default)]
pub struct FakeObject {
    pub rooted: bool,
    pub children: Vec<ObjectHandle>,
    pub properties: HashMap<String, Value>,
    pub private: Option<(Box<dyn Any>, Option<PrivateFinalizer>)>,
}

#[derive(Default)]
pub struct FakeState {
    next_handle: u32,
    pub objects: BTreeMap<ObjectHandle, FakeObject>,
    /// Unrooted handles the next collection reports as collected
    pub collectable: HashSet<ObjectHandle>,
    pub released: Vec<ObjectHandle>,
    pub torn_down: Vec<ObjectHandle>,
    pub phases: Vec<GcPhase>,
    pub roots: Vec<ObjectHandle>,
    pub unroots: Vec<ObjectHandle>,
    pub attached: Vec<(ObjectHandle, ObjectHandle)>,
    pub detached: Vec<(ObjectHandle, ObjectHandle)>,
    pub installed_classes: Vec<String>,
    pub evaluated: Vec<(String, String)>,
    pub pending: Option<ScriptException>,
    pub finalized: usize,
    pub shut_down: bool,
}

impl FakeState {
    fn insert(&mut self) -> ObjectHandle {
        let handle = ObjectHandle::from_index(self.next_handle);
        self.next_handle += 1;
        self.objects.insert(
            handle,
            FakeObject {
                rooted: true,
                ..FakeObject::default()
            },
        );
        handle
    }

    fn object_mut(&mut self, handle: ObjectHandle) -> Result<&mut FakeObject, BridgeError> {
        if self.shut_down {
            return Err(BridgeError::NotInitialized);
        }
        self.objects
            .get_mut(&handle)
            .ok_or(BridgeError::UnknownHandle(handle))
    }

    pub fn is_live(&self, handle: ObjectHandle) -> bool {
        self.objects.contains_key(&handle)
    }

    pub fn is_rooted(&self, handle: ObjectHandle) -> bool {
        self.objects.get(&handle).is_some_and(|object| object.rooted)
    }
}

pub struct FakeRuntime {
    state: Rc<RefCell<FakeState>>,
    global: ObjectHandle,
}

impl FakeRuntime {
    pub fn new() -> Self {
        let state = Rc::new(RefCell::new(FakeState::default()));
        let global = state.borrow_mut().insert();
        FakeRuntime { state, global }
    }

    pub fn state(&self) -> Rc<RefCell<FakeState>> {
        self.state.clone()
    }

    fn report_cycle(&self, hooks: &mut dyn GcHooks) {
        self.state.borrow_mut().phases.push(GcPhase::Begin);
        hooks.notify_collection_phase(GcPhase::Begin);
        let mut view = FakeWeak { state: &self.state };
        hooks.notify_weak_references_need_update(&mut view);
        self.state.borrow_mut().phases.push(GcPhase::End);
        hooks.notify_collection_phase(GcPhase::End);
    }
}

/// Start an engine over a fresh fake runtime.
#[allow(clippy::expect_used)]
pub fn fake_engine() -> (ScriptEngine<FakeRuntime>, Rc<RefCell<FakeState>>) {
    let runtime = FakeRuntime::new();
    let state = runtime.state();
    let engine =
        ScriptEngine::with_runtime(runtime, EngineConfig::default()).expect("fake engine init");
    (engine, state)
}

struct FakeWeak<'a> {
    state: &'a RefCell<FakeState>,
}

impl WeakReferences for FakeWeak<'_> {
    fn update_after_gc(&mut self, handle: ObjectHandle) -> bool {
        let mut state = self.state.borrow_mut();
        let collected = state.collectable.contains(&handle) && !state.is_rooted(handle);
        if !collected {
            return state.objects.get(&handle).is_none();
        }
        let object = state.objects.remove(&handle);
        drop(state);
        if let Some((payload, Some(finalize))) = object.and_then(|o| o.private) {
            self.state.borrow_mut().finalized += 1;
            finalize(payload);
        }
        true
    }

    fn teardown_rooting(&mut self, handle: ObjectHandle) {
        let mut state = self.state.borrow_mut();
        state.torn_down.push(handle);
        if let Some(object) = state.objects.get_mut(&handle) {
            object.rooted = false;
        }
    }

    fn release(&mut self, handle: ObjectHandle) {
        let mut state = self.state.borrow_mut();
        state.released.push(handle);
        state.objects.remove(&handle);
    }
}

impl ScriptRuntime for FakeRuntime {
    /// `throw <message>` throws, `forceGC()` reports a collection, a number
    /// literal evaluates to itself and everything else to `undefined`.
    fn evaluate(
        &mut self,
        source: &str,
        file_name: &str,
        hooks: &mut dyn GcHooks,
    ) -> Result<Value, BridgeError> {
        {
            let mut state = self.state.borrow_mut();
            if state.shut_down {
                return Err(BridgeError::NotInitialized);
            }
            state
                .evaluated
                .push((source.to_string(), file_name.to_string()));
            if let Some(message) = source.strip_prefix("throw ") {
                state.pending = Some(ScriptException::new(message, Some(file_name), 1));
                return Err(BridgeError::ExceptionPending);
            }
        }
        if source == "forceGC()" {
            self.report_cycle(hooks);
            return Ok(Value::Undefined);
        }
        Ok(source
            .trim()
            .parse::<f64>()
            .map(Value::Number)
            .unwrap_or(Value::Undefined))
    }

    fn has_pending_exception(&self) -> bool {
        self.state.borrow().pending.is_some()
    }

    fn take_pending_exception(&mut self) -> Option<ScriptException> {
        self.state.borrow_mut().pending.take()
    }

    fn collect_garbage(&mut self, hooks: &mut dyn GcHooks) {
        if self.state.borrow().shut_down {
            return;
        }
        self.report_cycle(hooks);
    }

    fn global_object(&mut self) -> Result<ObjectHandle, BridgeError> {
        Ok(self.global)
    }

    fn create_object(&mut self) -> Result<ObjectHandle, BridgeError> {
        let mut state = self.state.borrow_mut();
        if state.shut_down {
            return Err(BridgeError::NotInitialized);
        }
        Ok(state.insert())
    }

    fn get_property(&mut self, target: ObjectHandle, key: &str) -> Result<Value, BridgeError> {
        let mut state = self.state.borrow_mut();
        let object = state.object_mut(target)?;
        Ok(object.properties.get(key).cloned().unwrap_or_default())
    }

    fn set_property(
        &mut self,
        target: ObjectHandle,
        key: &str,
        value: &Value,
    ) -> Result<(), BridgeError> {
        let mut state = self.state.borrow_mut();
        let object = state.object_mut(target)?;
        object.properties.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn root(&mut self, handle: ObjectHandle) -> Result<(), BridgeError> {
        let mut state = self.state.borrow_mut();
        state.object_mut(handle)?.rooted = true;
        state.roots.push(handle);
        Ok(())
    }

    fn unroot(&mut self, handle: ObjectHandle) -> Result<(), BridgeError> {
        let mut state = self.state.borrow_mut();
        state.object_mut(handle)?.rooted = false;
        state.unroots.push(handle);
        Ok(())
    }

    fn release(&mut self, handle: ObjectHandle) {
        let mut state = self.state.borrow_mut();
        state.released.push(handle);
        state.objects.remove(&handle);
    }

    fn attach_child(
        &mut self,
        owner: ObjectHandle,
        child: ObjectHandle,
    ) -> Result<(), BridgeError> {
        let mut state = self.state.borrow_mut();
        state.object_mut(owner)?.children.push(child);
        state.attached.push((owner, child));
        Ok(())
    }

    fn detach_child(
        &mut self,
        owner: ObjectHandle,
        child: ObjectHandle,
    ) -> Result<(), BridgeError> {
        let mut state = self.state.borrow_mut();
        state.object_mut(owner)?.children.retain(|c| *c != child);
        state.detached.push((owner, child));
        Ok(())
    }

    fn set_private_data(
        &mut self,
        handle: ObjectHandle,
        payload: Box<dyn Any>,
        finalize: Option<PrivateFinalizer>,
    ) -> Result<(), BridgeError> {
        let mut state = self.state.borrow_mut();
        state.object_mut(handle)?.private = Some((payload, finalize));
        Ok(())
    }

    fn install_class(&mut self, spec: &ClassSpec) -> Result<(), BridgeError> {
        let mut state = self.state.borrow_mut();
        if state.shut_down {
            return Err(BridgeError::NotInitialized);
        }
        state.installed_classes.push(spec.name.clone());
        Ok(())
    }

    fn shutdown(&mut self) {
        let remaining = {
            let mut state = self.state.borrow_mut();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            std::mem::take(&mut state.objects)
        };
        for (_, object) in remaining {
            if let Some((payload, Some(finalize))) = object.private {
                self.state.borrow_mut().finalized += 1;
                finalize(payload);
            }
        }
    }
}

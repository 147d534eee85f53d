//! Handle table for script objects held by native code.
//!
//! Every slot owns a `WeakRef` to its object, so the table can tell whether
//! the object is still alive without keeping it alive. Rooted slots also own a
//! strong reference. Indices are never reused.

use crate::error::BridgeError;
use crate::value::ObjectHandle;
use rquickjs::function::{Constructor, This};
use rquickjs::{Ctx, Function, Object, Persistent};
use rustc_hash::FxHashMap;

type Saved = Persistent<Object<'static>>;

pub(super) struct Slot {
    weak: Saved,
    strong: Option<Saved>,
}

/// `WeakRef` constructor and `WeakRef.prototype.deref`, captured at startup so
/// scripts replacing the globals cannot break the table.
struct WeakRefApi {
    constructor: Persistent<Constructor<'static>>,
    deref: Persistent<Function<'static>>,
}

#[derive(Default)]
pub(super) struct HandleTable {
    slots: FxHashMap<u32, Slot>,
    next_index: u32,
    api: Option<WeakRefApi>,
}

impl HandleTable {
    pub fn prepare(&mut self, ctx: &Ctx<'_>) -> Result<(), BridgeError> {
        let constructor: Constructor = ctx.globals().get("WeakRef")?;
        let prototype: Object = constructor.get("prototype")?;
        let deref: Function = prototype.get("deref")?;
        self.api = Some(WeakRefApi {
            constructor: Persistent::save(ctx, constructor),
            deref: Persistent::save(ctx, deref),
        });
        Ok(())
    }

    /// Register `object` and return a rooted handle for it.
    pub fn insert<'js>(
        &mut self,
        ctx: &Ctx<'js>,
        object: Object<'js>,
    ) -> Result<ObjectHandle, BridgeError> {
        let api = self.api.as_ref().ok_or(BridgeError::NotInitialized)?;
        let constructor = api.constructor.clone().restore(ctx)?;
        let weak: Object = constructor.construct((object.clone(),))?;

        let index = self.next_index;
        self.next_index = self
            .next_index
            .checked_add(1)
            .ok_or_else(|| BridgeError::engine("object handle space exhausted"))?;
        self.slots.insert(
            index,
            Slot {
                weak: Persistent::save(ctx, weak),
                strong: Some(Persistent::save(ctx, object)),
            },
        );
        Ok(ObjectHandle::from_index(index))
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.slots.contains_key(&handle.index())
    }

    pub fn is_rooted(&self, handle: ObjectHandle) -> bool {
        self.slots
            .get(&handle.index())
            .is_some_and(|slot| slot.strong.is_some())
    }

    /// The object behind `handle`, or `None` once it has been collected.
    pub fn resolve<'js>(
        &self,
        ctx: &Ctx<'js>,
        handle: ObjectHandle,
    ) -> Result<Option<Object<'js>>, BridgeError> {
        let slot = self
            .slots
            .get(&handle.index())
            .ok_or(BridgeError::UnknownHandle(handle))?;
        if let Some(strong) = &slot.strong {
            return Ok(Some(strong.clone().restore(ctx)?));
        }
        let api = self.api.as_ref().ok_or(BridgeError::NotInitialized)?;
        let deref = api.deref.clone().restore(ctx)?;
        let weak = slot.weak.clone().restore(ctx)?;
        let target: rquickjs::Value = deref.call((This(weak),))?;
        Ok(target.into_object())
    }

    /// Like [`resolve`](Self::resolve), treating a collected object as an error.
    pub fn resolve_live<'js>(
        &self,
        ctx: &Ctx<'js>,
        handle: ObjectHandle,
    ) -> Result<Object<'js>, BridgeError> {
        self.resolve(ctx, handle)?
            .ok_or(BridgeError::UnknownHandle(handle))
    }

    pub fn root<'js>(&mut self, ctx: &Ctx<'js>, handle: ObjectHandle) -> Result<(), BridgeError> {
        if self.is_rooted(handle) {
            return Ok(());
        }
        let object = self.resolve_live(ctx, handle)?;
        if let Some(slot) = self.slots.get_mut(&handle.index()) {
            slot.strong = Some(Persistent::save(ctx, object));
        }
        Ok(())
    }

    /// Detach the strong reference. The caller drops it once no borrow of the
    /// table is alive, since dropping may run finalizers.
    pub fn take_root(&mut self, handle: ObjectHandle) -> Option<Saved> {
        self.slots
            .get_mut(&handle.index())
            .and_then(|slot| slot.strong.take())
    }

    pub fn remove(&mut self, handle: ObjectHandle) -> Option<Slot> {
        self.slots.remove(&handle.index())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Empty the table, handing back the slots that still reference the
    /// script heap.
    pub fn drain(&mut self) -> Vec<Slot> {
        self.api = None;
        self.slots.drain().map(|(_, slot)| slot).collect()
    }
}

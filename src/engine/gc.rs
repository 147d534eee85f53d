//! Cross-heap reference maintenance.
//!
//! The runtime reports collections through [`GcHooks`]; [`WeakPass`] answers
//! them by reconciling the wrapper registries with what the script heap still
//! holds. Ownership edges between wrappers are mirrored into the script heap
//! so the collector can see them.

use super::ScriptEngine;
use crate::error::BridgeError;
use crate::object::{NativePtr, ObjectRegistry, RegistryStats, ScriptObject, WrapperId};
use crate::runtime::{GcHooks, GcPhase, PrivateFinalizer, ScriptRuntime, WeakReferences};
use crate::value::ObjectHandle;
use std::any::Any;

// ============================================================================
// Weak-reference pass
// ============================================================================

/// The bridge's collection hooks, borrowed over the object registry for one
/// runtime call.
pub(crate) struct WeakPass<'a> {
    objects: &'a mut ObjectRegistry,
    in_cleanup: bool,
}

impl<'a> WeakPass<'a> {
    pub(crate) fn new(objects: &'a mut ObjectRegistry, in_cleanup: bool) -> Self {
        WeakPass {
            objects,
            in_cleanup,
        }
    }
}

impl GcHooks for WeakPass<'_> {
    fn notify_collection_phase(&mut self, phase: GcPhase) {
        let stats = self.objects.stats();
        match phase {
            GcPhase::Begin => tracing::debug!(
                "GC begin: native map {}, all objects {}",
                stats.native_entries,
                stats.wrappers
            ),
            GcPhase::End => tracing::debug!(
                "GC end: native map {}, all objects {}",
                stats.native_entries,
                stats.wrappers
            ),
        }
    }

    fn notify_weak_references_need_update(&mut self, weak: &mut dyn WeakReferences) {
        // Decide first, mutate after: removal must not disturb the visit.
        let mut doomed: Vec<(WrapperId, ObjectHandle)> = Vec::new();
        for (_native, id) in self.objects.native_entries() {
            let Some(wrapper) = self.objects.get(id) else {
                continue;
            };
            let handle = wrapper.handle();
            if !wrapper.is_rooted() {
                if weak.update_after_gc(handle) {
                    doomed.push((id, handle));
                }
            } else if self.in_cleanup {
                weak.teardown_rooting(handle);
                doomed.push((id, handle));
            }
        }

        if !doomed.is_empty() {
            tracing::trace!("Releasing {} wrappers after GC", doomed.len());
        }
        for (id, handle) in doomed {
            self.objects.clear_roots(id);
            weak.release(handle);
            self.objects.remove(id);
        }
    }
}

// ============================================================================
// Engine operations
// ============================================================================

impl<R: ScriptRuntime> ScriptEngine<R> {
    /// Run a full collection and reconcile the registries.
    pub fn collect_garbage(&mut self) {
        let Some(runtime) = self.runtime.as_mut() else {
            return;
        };
        let mut pass = WeakPass::new(&mut self.objects, self.in_cleanup);
        runtime.collect_garbage(&mut pass);
    }

    /// Final weak pass of a cleanup: rooted wrappers are torn down too, and
    /// whatever survives the pass is released unconditionally.
    pub(super) fn cleanup_objects(&mut self) {
        self.collect_garbage();
        let leftovers = self.objects.drain();
        if let Some(runtime) = self.runtime.as_mut() {
            for wrapper in &leftovers {
                runtime.release(wrapper.handle());
            }
        }
        tracing::debug!("Released {} remaining wrappers", leftovers.len());
    }

    pub fn registry_stats(&self) -> RegistryStats {
        self.objects.stats()
    }

    /// Make the script object of `owner` keep the one of `target` alive.
    /// Unknown identities are ignored, and so are wrappers whose script
    /// object was collected but not yet reconciled by a weak pass.
    pub fn retain_script_object(
        &mut self,
        owner: NativePtr,
        target: NativePtr,
    ) -> Result<(), BridgeError> {
        let Some((owner_id, owner_handle, target_id, target_handle)) =
            self.edge_endpoints(owner, target)
        else {
            return Ok(());
        };
        self.clear_exception();
        match self
            .runtime_or_err()?
            .attach_child(owner_handle, target_handle)
        {
            Ok(()) => {
                self.objects.attach(owner_id, target_id);
                Ok(())
            }
            Err(BridgeError::UnknownHandle(handle)) => {
                tracing::trace!("Retain skipped, script object {} is gone", handle);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Undo [`retain_script_object`](Self::retain_script_object). Unknown
    /// identities and collected script objects are ignored.
    pub fn release_script_object(
        &mut self,
        owner: NativePtr,
        target: NativePtr,
    ) -> Result<(), BridgeError> {
        let Some((owner_id, owner_handle, target_id, target_handle)) =
            self.edge_endpoints(owner, target)
        else {
            return Ok(());
        };
        self.clear_exception();
        match self
            .runtime_or_err()?
            .detach_child(owner_handle, target_handle)
        {
            Ok(()) => {}
            Err(BridgeError::UnknownHandle(handle)) => {
                tracing::trace!("Release skipped, script object {} is gone", handle);
            }
            Err(err) => return Err(err),
        }
        self.objects.detach(owner_id, target_id);
        Ok(())
    }

    fn edge_endpoints(
        &self,
        owner: NativePtr,
        target: NativePtr,
    ) -> Option<(WrapperId, ObjectHandle, WrapperId, ObjectHandle)> {
        let owner_id = self.objects.find(owner)?;
        let target_id = self.objects.find(target)?;
        let owner_handle = self.objects.get(owner_id)?.handle();
        let target_handle = self.objects.get(target_id)?.handle();
        Some((owner_id, owner_handle, target_id, target_handle))
    }

    // ========================================================================
    // Wrapper factory
    // ========================================================================

    /// Register `handle` as the script object of `native`, taking over the
    /// handle. An unrooted wrapper is kept only as long as script code
    /// references the object. Wrapping a native object again with another
    /// handle releases the previous wrapper.
    pub fn wrap_native(
        &mut self,
        native: NativePtr,
        handle: ObjectHandle,
        rooted: bool,
    ) -> Result<WrapperId, BridgeError> {
        let existing = self.objects.find(native);
        if let Some(existing) = existing {
            if self.objects.get(existing).map(ScriptObject::handle) == Some(handle) {
                return Ok(existing);
            }
        }
        let runtime = self.runtime.as_mut().ok_or(BridgeError::NotInitialized)?;
        if !rooted {
            runtime.unroot(handle)?;
        }
        if let Some(previous) = existing.and_then(|id| self.objects.remove(id)) {
            tracing::debug!(
                "Native object {:#x} wrapped again, releasing {}",
                native.addr(),
                previous.handle()
            );
            runtime.release(previous.handle());
        }
        Ok(self.objects.insert(native, handle, rooted))
    }

    /// Create a plain script object for `native`. The wrapper starts rooted.
    pub fn create_object_for_native(&mut self, native: NativePtr) -> Result<WrapperId, BridgeError> {
        let handle = self.runtime_or_err()?.create_object()?;
        self.wrap_native(native, handle, true)
    }

    pub fn root_object(&mut self, native: NativePtr) -> Result<(), BridgeError> {
        let (id, handle) = self.wrapper_of(native)?;
        if self.objects.root(id) == Some(1) {
            self.runtime_or_err()?.root(handle)?;
        }
        Ok(())
    }

    pub fn unroot_object(&mut self, native: NativePtr) -> Result<(), BridgeError> {
        let (id, handle) = self.wrapper_of(native)?;
        let was_rooted = self.objects.get(id).is_some_and(ScriptObject::is_rooted);
        if was_rooted && self.objects.unroot(id) == Some(0) {
            self.runtime_or_err()?.unroot(handle)?;
        }
        Ok(())
    }

    pub fn is_rooted(&self, native: NativePtr) -> bool {
        self.objects
            .find(native)
            .and_then(|id| self.objects.get(id))
            .is_some_and(ScriptObject::is_rooted)
    }

    /// Attach a native payload to the script object of `native`. `finalize`
    /// receives it back when the script object is collected.
    pub fn set_private_data(
        &mut self,
        native: NativePtr,
        payload: Box<dyn Any>,
        finalize: Option<PrivateFinalizer>,
    ) -> Result<(), BridgeError> {
        let (id, handle) = self.wrapper_of(native)?;
        self.runtime_or_err()?
            .set_private_data(handle, payload, finalize)?;
        self.objects.mark_private_data(id);
        Ok(())
    }

    /// Native identity behind a script object handle
    pub fn unwrap_native(&self, handle: ObjectHandle) -> Option<NativePtr> {
        let id = self.objects.find_by_handle(handle)?;
        self.objects.get(id).map(ScriptObject::native)
    }

    pub fn find_wrapper(&self, native: NativePtr) -> Option<WrapperId> {
        self.objects.find(native)
    }

    pub fn object_handle(&self, native: NativePtr) -> Option<ObjectHandle> {
        let id = self.objects.find(native)?;
        self.objects.get(id).map(ScriptObject::handle)
    }

    /// Native identities `native` currently keeps alive
    pub fn children_of(&self, native: NativePtr) -> Vec<NativePtr> {
        let Some(wrapper) = self.objects.find(native).and_then(|id| self.objects.get(id)) else {
            return Vec::new();
        };
        wrapper
            .children()
            .filter_map(|child| self.objects.get(child))
            .map(ScriptObject::native)
            .collect()
    }

    fn wrapper_of(&self, native: NativePtr) -> Result<(WrapperId, ObjectHandle), BridgeError> {
        let id = self
            .objects
            .find(native)
            .ok_or(BridgeError::UnknownNative(native))?;
        let handle = self
            .objects
            .get(id)
            .map(ScriptObject::handle)
            .ok_or(BridgeError::UnknownNative(native))?;
        Ok((id, handle))
    }
}

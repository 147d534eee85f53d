//! Native-side bookkeeping for script-exposed objects.
//!
//! Two registries live here:
//!
//! - native identity → wrapper, the entries the weak-reference pass visits;
//! - every live wrapper, keyed by a never-reused [`WrapperId`], which also
//!   stores the ownership edges between wrappers.
//!
//! Nothing in this module talks to the script runtime. The engine mirrors
//! rooting and edges into the runtime and keeps both sides in step.

use crate::value::ObjectHandle;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;

/// Identity of a native object, taken from its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativePtr(usize);

impl NativePtr {
    pub fn of<T: ?Sized>(native: &T) -> Self {
        NativePtr((native as *const T).cast::<()>().addr())
    }

    pub fn from_raw<T: ?Sized>(ptr: *const T) -> Self {
        NativePtr(ptr.cast::<()>().addr())
    }

    pub const fn from_addr(addr: usize) -> Self {
        NativePtr(addr)
    }

    pub const fn addr(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WrapperId(u64);

impl WrapperId {
    pub const fn index(self) -> u64 {
        self.0
    }
}

/// Bookkeeping for one script object exposed to native code.
#[derive(Debug)]
pub struct ScriptObject {
    native: NativePtr,
    handle: ObjectHandle,
    root_count: u32,
    children: FxHashSet<WrapperId>,
    /// Reverse of `children`, so removal only visits incident edges
    parents: FxHashSet<WrapperId>,
    has_private_data: bool,
}

impl ScriptObject {
    pub fn native(&self) -> NativePtr {
        self.native
    }

    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    pub fn is_rooted(&self) -> bool {
        self.root_count > 0
    }

    pub fn root_count(&self) -> u32 {
        self.root_count
    }

    pub fn has_child(&self, child: WrapperId) -> bool {
        self.children.contains(&child)
    }

    pub fn children(&self) -> impl Iterator<Item = WrapperId> + '_ {
        self.children.iter().copied()
    }

    pub fn has_private_data(&self) -> bool {
        self.has_private_data
    }
}

/// Registry sizes, logged around every collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    /// Entries in the native → wrapper map
    pub native_entries: usize,
    /// Live wrappers
    pub wrappers: usize,
}

#[derive(Debug, Default)]
pub struct ObjectRegistry {
    native_to_wrapper: FxHashMap<NativePtr, WrapperId>,
    by_handle: FxHashMap<ObjectHandle, WrapperId>,
    /// Ids only grow, so key order is creation order
    wrappers: BTreeMap<WrapperId, ScriptObject>,
    next_id: u64,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a wrapper for `native`. A previous mapping for the same native
    /// identity is replaced; removing its wrapper is up to the caller.
    pub fn insert(&mut self, native: NativePtr, handle: ObjectHandle, rooted: bool) -> WrapperId {
        let id = WrapperId(self.next_id);
        self.next_id += 1;
        self.wrappers.insert(
            id,
            ScriptObject {
                native,
                handle,
                root_count: u32::from(rooted),
                children: FxHashSet::default(),
                parents: FxHashSet::default(),
                has_private_data: false,
            },
        );
        self.native_to_wrapper.insert(native, id);
        self.by_handle.insert(handle, id);
        id
    }

    pub fn find(&self, native: NativePtr) -> Option<WrapperId> {
        self.native_to_wrapper.get(&native).copied()
    }

    pub fn find_by_handle(&self, handle: ObjectHandle) -> Option<WrapperId> {
        self.by_handle.get(&handle).copied()
    }

    pub fn get(&self, id: WrapperId) -> Option<&ScriptObject> {
        self.wrappers.get(&id)
    }

    /// Snapshot of the native → wrapper entries
    pub fn native_entries(&self) -> Vec<(NativePtr, WrapperId)> {
        self.native_to_wrapper
            .iter()
            .map(|(native, id)| (*native, *id))
            .collect()
    }

    /// Increment the root count. Returns the new count.
    pub fn root(&mut self, id: WrapperId) -> Option<u32> {
        let wrapper = self.wrappers.get_mut(&id)?;
        wrapper.root_count = wrapper.root_count.saturating_add(1);
        Some(wrapper.root_count)
    }

    /// Decrement the root count. Returns the new count.
    pub fn unroot(&mut self, id: WrapperId) -> Option<u32> {
        let wrapper = self.wrappers.get_mut(&id)?;
        wrapper.root_count = wrapper.root_count.saturating_sub(1);
        Some(wrapper.root_count)
    }

    /// Drop every root at once, as cleanup does.
    pub fn clear_roots(&mut self, id: WrapperId) {
        if let Some(wrapper) = self.wrappers.get_mut(&id) {
            wrapper.root_count = 0;
        }
    }

    /// Add the edge owner → child. Returns `false` if it already existed or
    /// either wrapper is unknown.
    pub fn attach(&mut self, owner: WrapperId, child: WrapperId) -> bool {
        if !self.wrappers.contains_key(&child) {
            return false;
        }
        let added = self
            .wrappers
            .get_mut(&owner)
            .is_some_and(|wrapper| wrapper.children.insert(child));
        if added {
            if let Some(wrapper) = self.wrappers.get_mut(&child) {
                wrapper.parents.insert(owner);
            }
        }
        added
    }

    pub fn detach(&mut self, owner: WrapperId, child: WrapperId) -> bool {
        let removed = self
            .wrappers
            .get_mut(&owner)
            .is_some_and(|wrapper| wrapper.children.remove(&child));
        if removed {
            if let Some(wrapper) = self.wrappers.get_mut(&child) {
                wrapper.parents.remove(&owner);
            }
        }
        removed
    }

    pub fn mark_private_data(&mut self, id: WrapperId) {
        if let Some(wrapper) = self.wrappers.get_mut(&id) {
            wrapper.has_private_data = true;
        }
    }

    /// Remove a wrapper, its native mapping and every edge touching it.
    pub fn remove(&mut self, id: WrapperId) -> Option<ScriptObject> {
        let wrapper = self.wrappers.remove(&id)?;
        if self.native_to_wrapper.get(&wrapper.native) == Some(&id) {
            self.native_to_wrapper.remove(&wrapper.native);
        }
        if self.by_handle.get(&wrapper.handle) == Some(&id) {
            self.by_handle.remove(&wrapper.handle);
        }
        for parent in &wrapper.parents {
            if let Some(other) = self.wrappers.get_mut(parent) {
                other.children.remove(&id);
            }
        }
        for child in &wrapper.children {
            if let Some(other) = self.wrappers.get_mut(child) {
                other.parents.remove(&id);
            }
        }
        Some(wrapper)
    }

    /// Remove everything, returning the wrappers in creation order.
    pub fn drain(&mut self) -> Vec<ScriptObject> {
        self.native_to_wrapper.clear();
        self.by_handle.clear();
        std::mem::take(&mut self.wrappers).into_values().collect()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            native_entries: self.native_to_wrapper.len(),
            wrappers: self.wrappers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.native_to_wrapper.is_empty() && self.wrappers.is_empty()
    }
}

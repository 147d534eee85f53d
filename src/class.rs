//! Native classes exposed to script code.
//!
//! A class is created with a name, an optional parent and an optional native
//! constructor, may get a finalizer, and becomes visible to scripts once it is
//! installed on the global object. Instances built from script carry a
//! private-data carrier so the class finalizer runs when the script object is
//! collected.

use crate::error::BridgeError;
use crate::value::Value;
use indexmap::IndexMap;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Builds the native payload for an instance constructed from script.
///
/// Object arguments arrive as handles that are valid only for the duration
/// of the call. Returning `Ok(None)` creates an instance without a payload.
pub type NativeConstructor = Rc<dyn Fn(&[Value]) -> Result<Option<Box<dyn Any>>, BridgeError>>;

/// Receives the payload of an instance once its script object is collected.
pub type ClassFinalizer = Rc<dyn Fn(Box<dyn Any>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Everything a runtime needs to install a class.
#[derive(Clone)]
pub struct ClassSpec {
    pub name: String,
    /// Name of the parent class, whose prototype is chained
    pub parent: Option<String>,
    pub constructor: Option<NativeConstructor>,
    pub finalizer: Option<ClassFinalizer>,
}

impl fmt::Debug for ClassSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassSpec")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("constructor", &self.constructor.is_some())
            .field("finalizer", &self.finalizer.is_some())
            .finish()
    }
}

#[derive(Debug)]
struct ClassEntry {
    spec: ClassSpec,
    parent: Option<ClassId>,
    installed: bool,
}

/// Classes known to an engine, in creation order.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: IndexMap<ClassId, ClassEntry>,
    next_id: u32,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        name: impl Into<String>,
        parent: Option<ClassId>,
        constructor: Option<NativeConstructor>,
    ) -> Result<ClassId, BridgeError> {
        let parent_name = match parent {
            Some(parent_id) => Some(
                self.classes
                    .get(&parent_id)
                    .map(|entry| entry.spec.name.clone())
                    .ok_or(BridgeError::UnknownClass(parent_id))?,
            ),
            None => None,
        };
        let id = ClassId(self.next_id);
        self.next_id += 1;
        self.classes.insert(
            id,
            ClassEntry {
                spec: ClassSpec {
                    name: name.into(),
                    parent: parent_name,
                    constructor,
                    finalizer: None,
                },
                parent,
                installed: false,
            },
        );
        Ok(id)
    }

    pub fn define_finalize(
        &mut self,
        id: ClassId,
        finalizer: ClassFinalizer,
    ) -> Result<(), BridgeError> {
        let entry = self
            .classes
            .get_mut(&id)
            .ok_or(BridgeError::UnknownClass(id))?;
        entry.spec.finalizer = Some(finalizer);
        Ok(())
    }

    pub fn spec(&self, id: ClassId) -> Option<&ClassSpec> {
        self.classes.get(&id).map(|entry| &entry.spec)
    }

    pub fn parent(&self, id: ClassId) -> Option<ClassId> {
        self.classes.get(&id).and_then(|entry| entry.parent)
    }

    pub fn find(&self, name: &str) -> Option<ClassId> {
        self.classes
            .iter()
            .find(|(_, entry)| entry.spec.name == name)
            .map(|(id, _)| *id)
    }

    pub fn is_installed(&self, id: ClassId) -> bool {
        self.classes.get(&id).is_some_and(|entry| entry.installed)
    }

    pub(crate) fn mark_installed(&mut self, id: ClassId) {
        if let Some(entry) = self.classes.get_mut(&id) {
            entry.installed = true;
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Forget every class. Ids are not reused afterwards.
    pub fn cleanup(&mut self) {
        tracing::debug!("Forgetting {} classes", self.classes.len());
        self.classes.clear();
    }
}

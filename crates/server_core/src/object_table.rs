//! Owning id-to-object table with the free-id allocator.

use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::rc::Rc;

use world_core::ObjectId;

/// Shared handle to a live object.
///
/// The table holds the primary handle; queries hand out clones scoped to the
/// callback invocation. A clone keeps the object alive even if the callback
/// removes it from the manager, so mid-query removal is never a dangling
/// access. Do not hold an entity borrow across a manager call.
pub type ObjectHandle<T> = Rc<RefCell<T>>;

pub struct ObjectTable<T> {
    objects: RefCell<HashMap<ObjectId, ObjectHandle<T>>>,
}

impl<T> ObjectTable<T> {
    pub fn new() -> Self {
        Self {
            objects: RefCell::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.borrow().is_empty()
    }

    /// Insert `object` under `id`. The null id and double insertion are
    /// programmer errors at the call site and panic.
    pub fn put(&self, id: ObjectId, object: T) {
        assert!(!id.is_none(), "put: null object id");
        match self.objects.borrow_mut().entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(Rc::new(RefCell::new(object)));
            }
            Entry::Occupied(_) => panic!("put: object id {} inserted twice", id.0),
        }
    }

    /// Drop the primary handle for `id`; returns whether it was present.
    pub fn remove(&self, id: ObjectId) -> bool {
        self.objects.borrow_mut().remove(&id).is_some()
    }

    pub fn get(&self, id: ObjectId) -> Option<ObjectHandle<T>> {
        self.objects.borrow().get(&id).cloned()
    }

    /// Snapshot of the live ids. Stable for the duration of the caller's
    /// walk regardless of table mutation in between.
    pub fn ids(&self) -> Vec<ObjectId> {
        self.objects.borrow().keys().copied().collect()
    }

    /// Snapshot iterator over `(id, handle)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, ObjectHandle<T>)> {
        let entries: Vec<_> = self
            .objects
            .borrow()
            .iter()
            .map(|(&id, handle)| (id, handle.clone()))
            .collect();
        entries.into_iter()
    }

    pub fn clear(&self) {
        self.objects.borrow_mut().clear();
    }

    pub fn is_free_id(&self, id: ObjectId) -> bool {
        !id.is_none() && !self.objects.borrow().contains_key(&id)
    }

    /// Lowest unused id, or the null id when the entire id space is taken.
    pub fn free_id(&self) -> ObjectId {
        let objects = self.objects.borrow();
        if objects.len() >= usize::from(u16::MAX) {
            return ObjectId::NONE;
        }
        (1..=u16::MAX)
            .map(ObjectId)
            .find(|id| !objects.contains_key(id))
            .unwrap_or(ObjectId::NONE)
    }
}

impl<T> Default for ObjectTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

//! Facade over the object table and the spatial map.
//!
//! Every structural change to the pair goes through this type, which is what
//! keeps the map's entries pointing at live table ids. The one sanctioned
//! exception is [`ActiveObjectMgr::clear_if`]: it leaves the removed ids'
//! map entries behind and every query heals them on first sighting.

use std::collections::HashSet;

use glam::Vec3;
use world_core::geom::Aabb;
use world_core::limits;
use world_core::{ActiveObject, ObjectId, ObjectKind};

use crate::object_table::{ObjectHandle, ObjectTable};
use crate::spatial_map::SpatialMap;

/// Gauge updated with the live object count on every `step`.
const OBJECT_COUNT_GAUGE: &str = "server.active_objects";

pub struct ActiveObjectMgr<T: ActiveObject> {
    objects: ObjectTable<T>,
    spatial: SpatialMap,
}

impl<T: ActiveObject> ActiveObjectMgr<T> {
    pub fn new() -> Self {
        Self {
            objects: ObjectTable::new(),
            spatial: SpatialMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Fetch a handle by id without a spatial query.
    pub fn get_active_object(&self, id: ObjectId) -> Option<ObjectHandle<T>> {
        self.objects.get(id)
    }

    /// Snapshot of the live ids.
    pub fn ids(&self) -> Vec<ObjectId> {
        self.objects.ids()
    }

    /// Take ownership of `object` and index it.
    ///
    /// Allocates an id when the object carries none, otherwise accepts the
    /// supplied id only if it is free. Returns false (with a log line) on id
    /// exhaustion, id collision, or an out-of-range position.
    pub fn register_object(&self, mut object: T) -> bool {
        let id = if object.id().is_none() {
            let new_id = self.objects.free_id();
            if new_id.is_none() {
                log::error!("register_object: no free id available");
                return false;
            }
            object.set_id(new_id);
            new_id
        } else {
            log::trace!("register_object: supplied with id {}", object.id().0);
            object.id()
        };

        if !self.objects.is_free_id(id) {
            log::error!("register_object: id is not free ({})", id.0);
            return false;
        }

        let pos = object.base_position();
        if limits::pos_over_limit(pos) {
            log::warn!(
                "register_object: object position ({}, {}, {}) outside maximum range",
                pos.x,
                pos.y,
                pos.z
            );
            return false;
        }

        self.spatial.insert(id, pos);
        self.objects.put(id, object);
        log::debug!(
            "register_object: added id={}; there are now {} active objects",
            id.0,
            self.objects.len()
        );
        true
    }

    /// Drop the object with `id` from both structures. Unknown ids are
    /// logged at info level and ignored.
    pub fn remove_object(&self, id: ObjectId) {
        log::trace!("remove_object: id={}", id.0);
        let Some(object) = self.objects.get(id) else {
            log::info!("remove_object: id={} not found", id.0);
            return;
        };
        let pos = object.borrow().base_position();
        self.spatial.remove(id, pos);
        self.objects.remove(id);
    }

    /// Re-bucket a moved object. The caller keeps the entity's own position
    /// field up to date; this only maintains the index.
    pub fn update_object_position(&self, id: ObjectId, last_position: Vec3, new_position: Vec3) {
        self.spatial.update_position(id, last_position, new_position);
    }

    /// Walk every live object. Objects registered during the walk are not
    /// visited until the next call; objects removed during the walk are
    /// skipped if not yet visited.
    pub fn step(&self, _dtime: f32, mut f: impl FnMut(&ObjectHandle<T>)) {
        let mut count = 0usize;
        for id in self.objects.ids() {
            if let Some(object) = self.objects.get(id) {
                count += 1;
                f(&object);
            }
        }
        metrics::gauge!(OBJECT_COUNT_GAUGE).set(count as f64);
    }

    /// Drop every object the predicate selects. Spatial entries of the
    /// removed ids are left for the next query's stale-entry cleanup.
    pub fn clear_if(&self, mut predicate: impl FnMut(&ObjectHandle<T>, ObjectId) -> bool) {
        for id in self.objects.ids() {
            if let Some(object) = self.objects.get(id)
                && predicate(&object, id)
            {
                self.objects.remove(id);
            }
        }
    }

    /// Drop all objects and wipe the index.
    pub fn clear(&self) {
        self.objects.clear();
        self.spatial.remove_all();
    }

    /// Collect handles of objects within `radius` of `pos` into `result`,
    /// filtered by `include_obj_cb` when one is given.
    pub fn get_objects_inside_radius(
        &self,
        pos: Vec3,
        radius: f32,
        result: &mut Vec<ObjectHandle<T>>,
        mut include_obj_cb: Option<&mut dyn FnMut(&ObjectHandle<T>) -> bool>,
    ) {
        let r2 = radius * radius;
        self.spatial.get_object_ids_in_radius(pos, radius, |id, guaranteed| {
            let Some(object) = self.objects.get(id) else {
                self.spatial.remove_anywhere(id);
                return;
            };
            if !guaranteed && object.borrow().base_position().distance_squared(pos) > r2 {
                return;
            }
            if include_obj_cb.as_mut().is_none_or(|cb| cb(&object)) {
                result.push(object);
            }
        });
    }

    /// Collect handles of objects whose position lies inside `bounds` into
    /// `result`, filtered by `include_obj_cb` when one is given.
    pub fn get_objects_in_area(
        &self,
        bounds: &Aabb,
        result: &mut Vec<ObjectHandle<T>>,
        mut include_obj_cb: Option<&mut dyn FnMut(&ObjectHandle<T>) -> bool>,
    ) {
        self.spatial.get_relevant_object_ids(bounds, |id| {
            let Some(object) = self.objects.get(id) else {
                self.spatial.remove_anywhere(id);
                return;
            };
            if !bounds.contains_point(object.borrow().base_position()) {
                return;
            }
            if include_obj_cb.as_mut().is_none_or(|cb| cb(&object)) {
                result.push(object);
            }
        });
    }

    /// Visibility diff: ids near `player_pos` that the client does not hold
    /// yet. Players are filtered against `player_radius` (0 disables the
    /// filter), everything else against `radius`; gone objects and ids in
    /// `current_objects` are skipped.
    pub fn get_added_active_objects_around_pos(
        &self,
        player_pos: Vec3,
        radius: f32,
        player_radius: f32,
        current_objects: &HashSet<ObjectId>,
        added_objects: &mut Vec<ObjectId>,
    ) {
        let offset = radius.max(player_radius);
        let bounds = Aabb::around(player_pos, offset);
        self.spatial.get_relevant_object_ids(&bounds, |id| {
            let Some(object) = self.objects.get(id) else {
                self.spatial.remove_anywhere(id);
                return;
            };
            let object = object.borrow();
            if object.is_gone() {
                return;
            }
            let distance = object.base_position().distance(player_pos);
            if object.kind() == ObjectKind::Player {
                if distance > player_radius && player_radius != 0.0 {
                    return;
                }
            } else if distance > radius {
                return;
            }
            if current_objects.contains(&id) {
                return;
            }
            added_objects.push(id);
        });
    }
}

impl<T: ActiveObject> Default for ActiveObjectMgr<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ActiveObject> Drop for ActiveObjectMgr<T> {
    fn drop(&mut self) {
        if !self.objects.is_empty() {
            log::warn!(
                "ActiveObjectMgr dropped with {} objects still registered",
                self.objects.len()
            );
            self.clear();
        }
    }
}

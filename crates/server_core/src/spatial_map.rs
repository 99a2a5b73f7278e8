//! Cell-bucketed spatial multimap from grid cells to active object ids.
//!
//! The map answers "which ids might be inside this box / sphere" and leaves
//! the exact geometric test to the caller. Query traversals are reentrant:
//! a callback may insert into, remove from, or clear the very map it is
//! being called from. While any traversal is active, structural mutations
//! are captured in pending buffers and applied when the outermost traversal
//! unwinds, in the order clear-all, deletes, inserts. Deferred operations
//! become visible to the next query, never to the one in flight.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use glam::Vec3;
use world_core::ObjectId;
use world_core::geom::{self, Aabb};

/// Width of one spatial cell per axis, in world units. Persisted cell keys
/// depend on this value; it must not change silently.
pub const CELL_SIZE: f32 = 16.0;

const CELL_SHIFT: u32 = 4;

/// Radius above which the radius query prunes the y/z cell ranges per
/// x-slice against the sphere cross-section.
const SLICE_PRUNE_MIN_RADIUS: f32 = 60.0;

/// Buckets at or below this population skip sphere classification; the
/// per-cell min/max distance work does not amortise over so few ids.
const SMALL_BUCKET_LEN: usize = 3;

/// Coordinate of one 16-unit cell of the world grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpatialKey {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl SpatialKey {
    /// Key from raw cell coordinates.
    pub const fn raw(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    /// Cell containing a world position.
    ///
    /// Coordinates round away from zero before the shift so that positions
    /// on either side of an axis plane land in different cells: `x = -0.1`
    /// maps to cell `-1` while `x = 0.1` maps to cell `0`. Truncating
    /// instead would fold the two cells adjacent to every zero plane into
    /// one.
    pub fn from_pos(pos: Vec3) -> Self {
        Self::raw(
            Self::cell_coord(pos.x),
            Self::cell_coord(pos.y),
            Self::cell_coord(pos.z),
        )
    }

    fn cell_coord(v: f32) -> i16 {
        let away = if v >= 0.0 { v.ceil() } else { v.floor() } as i32;
        (away >> CELL_SHIFT) as i16
    }

    /// World-space extent of cell `c` along one axis, padded so that every
    /// position mapping to the cell is covered.
    fn axis_extent(c: i16) -> (f32, f32) {
        let base = f32::from(c) * CELL_SIZE;
        (base - 1.0, base + CELL_SIZE)
    }

    /// World-space box covering every position that maps to this cell.
    pub fn bounds(self) -> Aabb {
        let (x0, x1) = Self::axis_extent(self.x);
        let (y0, y1) = Self::axis_extent(self.y);
        let (z0, z1) = Self::axis_extent(self.z);
        Aabb::new(Vec3::new(x0, y0, z0), Vec3::new(x1, y1, z1))
    }
}

#[derive(Default)]
pub struct SpatialMap {
    cells: RefCell<HashMap<SpatialKey, Vec<ObjectId>>>,
    /// Total number of (cell, id) entries; each live id appears exactly once.
    len: Cell<usize>,
    iterators_active: Cell<u32>,
    pending_inserts: RefCell<HashSet<(SpatialKey, ObjectId)>>,
    pending_deletes: RefCell<HashSet<(SpatialKey, ObjectId)>>,
    clear_all_pending: Cell<bool>,
}

impl SpatialMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.len.get()
    }

    pub fn is_empty(&self) -> bool {
        self.len.get() == 0
    }

    /// Index `id` under the cell containing `pos`.
    pub fn insert(&self, id: ObjectId, pos: Vec3) {
        let key = SpatialKey::from_pos(pos);
        if self.iterators_active.get() > 0 {
            self.pending_inserts.borrow_mut().insert((key, id));
            return;
        }
        self.insert_at(key, id);
    }

    /// Drop the entry for `id`, using `pos` as the expected cell. A miss at
    /// that cell falls back to scanning every bucket, since the caller's
    /// position may be newer than the indexed one.
    pub fn remove(&self, id: ObjectId, pos: Vec3) {
        let key = SpatialKey::from_pos(pos);
        if self.iterators_active.get() > 0 {
            self.defer_remove(key, id);
            return;
        }
        self.remove_at(key, id);
    }

    /// Drop the entry for `id` without a position hint.
    pub fn remove_anywhere(&self, id: ObjectId) {
        // An arbitrary hint is fine: a miss degrades to the scan path.
        let key = SpatialKey::raw(0, 0, 0);
        if self.iterators_active.get() > 0 {
            self.defer_remove(key, id);
            return;
        }
        self.remove_at(key, id);
    }

    /// Drop every entry.
    pub fn remove_all(&self) {
        if self.iterators_active.get() > 0 {
            self.clear_all_pending.set(true);
            return;
        }
        self.cells.borrow_mut().clear();
        self.len.set(0);
    }

    /// Re-bucket `id` after a move. No-op when the id is already staged
    /// under the cell of the new position, counting operations a running
    /// traversal has queued but not yet applied.
    pub fn update_position(&self, id: ObjectId, old_pos: Vec3, new_pos: Vec3) {
        let new_key = SpatialKey::from_pos(new_pos);
        if self.staged_contains(new_key, id) {
            return;
        }
        self.remove(id, old_pos);
        self.insert(id, new_pos);
    }

    /// Invoke `cb` for every id indexed under a cell that may intersect
    /// `bounds`. Ids are not deduplicated; each live id is bucketed exactly
    /// once, so no id is yielded twice within one traversal.
    ///
    /// When the candidate cell count exceeds the map population it is
    /// cheaper to walk the whole map and let the caller's geometric
    /// refinement reject the misses.
    pub fn get_relevant_object_ids(&self, bounds: &Aabb, mut cb: impl FnMut(ObjectId)) {
        self.iterators_active.set(self.iterators_active.get() + 1);
        {
            let cells = self.cells.borrow();
            let min = SpatialKey::from_pos(bounds.min);
            let max = SpatialKey::from_pos(bounds.max);
            if Self::candidate_cells(min, max) <= self.len.get() as u64 {
                for x in min.x..=max.x {
                    for y in min.y..=max.y {
                        for z in min.z..=max.z {
                            if let Some(bucket) = cells.get(&SpatialKey::raw(x, y, z)) {
                                for &id in bucket {
                                    cb(id);
                                }
                            }
                        }
                    }
                }
            } else {
                for bucket in cells.values() {
                    for &id in bucket {
                        cb(id);
                    }
                }
            }
        }
        self.end_iteration();
    }

    /// Radius variant of [`Self::get_relevant_object_ids`].
    ///
    /// `cb` receives `(id, guaranteed)`. When `guaranteed` is true the whole
    /// cell lies inside the sphere and the caller may skip its per-id
    /// distance check; otherwise the cell merely intersects the sphere and
    /// the caller must refine. For radii above [`SLICE_PRUNE_MIN_RADIUS`]
    /// the y/z cell ranges are narrowed per x-slice to the sphere
    /// cross-section at that slice.
    pub fn get_object_ids_in_radius(
        &self,
        pos: Vec3,
        radius: f32,
        mut cb: impl FnMut(ObjectId, bool),
    ) {
        let r2 = radius * radius;
        self.iterators_active.set(self.iterators_active.get() + 1);
        {
            let cells = self.cells.borrow();
            let min = SpatialKey::from_pos(pos - Vec3::splat(radius));
            let max = SpatialKey::from_pos(pos + Vec3::splat(radius));
            if Self::candidate_cells(min, max) <= self.len.get() as u64 {
                for x in min.x..=max.x {
                    let mut y_range = (min.y, max.y);
                    let mut z_range = (min.z, max.z);
                    if radius > SLICE_PRUNE_MIN_RADIUS {
                        let (lo, hi) = SpatialKey::axis_extent(x);
                        let dx = (pos.x - pos.x.clamp(lo, hi)).abs();
                        if dx > radius {
                            continue;
                        }
                        let offset = (r2 - dx * dx).max(0.0).sqrt();
                        y_range.0 = y_range.0.max(SpatialKey::cell_coord(pos.y - offset));
                        y_range.1 = y_range.1.min(SpatialKey::cell_coord(pos.y + offset));
                        z_range.0 = z_range.0.max(SpatialKey::cell_coord(pos.z - offset));
                        z_range.1 = z_range.1.min(SpatialKey::cell_coord(pos.z + offset));
                    }
                    for y in y_range.0..=y_range.1 {
                        for z in z_range.0..=z_range.1 {
                            let key = SpatialKey::raw(x, y, z);
                            let Some(bucket) = cells.get(&key) else {
                                continue;
                            };
                            if bucket.len() <= SMALL_BUCKET_LEN {
                                for &id in bucket {
                                    cb(id, false);
                                }
                                continue;
                            }
                            let cell_box = key.bounds();
                            if geom::max_dist_sq(&cell_box, pos) <= r2 {
                                for &id in bucket {
                                    cb(id, true);
                                }
                            } else if geom::min_dist_sq(&cell_box, pos) <= r2 {
                                for &id in bucket {
                                    cb(id, false);
                                }
                            }
                        }
                    }
                }
            } else {
                for bucket in cells.values() {
                    for &id in bucket {
                        cb(id, false);
                    }
                }
            }
        }
        self.end_iteration();
    }

    fn candidate_cells(min: SpatialKey, max: SpatialKey) -> u64 {
        let span = |a: i16, b: i16| (i32::from(b) - i32::from(a)).max(0) as u64 + 1;
        span(min.x, max.x) * span(min.y, max.y) * span(min.z, max.z)
    }

    fn insert_at(&self, key: SpatialKey, id: ObjectId) {
        self.cells.borrow_mut().entry(key).or_default().push(id);
        self.len.set(self.len.get() + 1);
    }

    fn remove_at(&self, key: SpatialKey, id: ObjectId) {
        let mut cells = self.cells.borrow_mut();
        if let Some(bucket) = cells.get_mut(&key)
            && let Some(i) = bucket.iter().position(|&v| v == id)
        {
            bucket.swap_remove(i);
            if bucket.is_empty() {
                cells.remove(&key);
            }
            self.len.set(self.len.get() - 1);
            return;
        }
        // Hint missed: the entry may sit under a stale cell. Erase at most
        // one occurrence.
        let mut emptied = None;
        for (&k, bucket) in cells.iter_mut() {
            if let Some(i) = bucket.iter().position(|&v| v == id) {
                bucket.swap_remove(i);
                self.len.set(self.len.get() - 1);
                if bucket.is_empty() {
                    emptied = Some(k);
                }
                break;
            }
        }
        if let Some(k) = emptied {
            cells.remove(&k);
        }
    }

    /// Whether `id` ends up under `key` once every queued operation has been
    /// applied. With no traversal active the pending buffers are empty and
    /// this is a plain bucket lookup.
    fn staged_contains(&self, key: SpatialKey, id: ObjectId) -> bool {
        if self.pending_inserts.borrow().contains(&(key, id)) {
            return true;
        }
        if self.clear_all_pending.get()
            || self.pending_deletes.borrow().iter().any(|&(_, v)| v == id)
        {
            return false;
        }
        self.cells
            .borrow()
            .get(&key)
            .is_some_and(|bucket| bucket.contains(&id))
    }

    fn defer_remove(&self, key: SpatialKey, id: ObjectId) {
        // A queued insert for the id has not landed yet, so dropping it is
        // the removal; the committed occurrence, if any, still needs the
        // delete. Without the cancellation, a move queued earlier in the
        // same traversal would re-insert the id after this remove.
        self.pending_inserts.borrow_mut().retain(|&(_, v)| v != id);
        self.pending_deletes.borrow_mut().insert((key, id));
    }

    fn end_iteration(&self) {
        let remaining = self.iterators_active.get() - 1;
        self.iterators_active.set(remaining);
        if remaining == 0 {
            self.apply_pending();
        }
    }

    fn apply_pending(&self) {
        if self.clear_all_pending.take() {
            self.cells.borrow_mut().clear();
            self.len.set(0);
        }
        let deletes: Vec<_> = self.pending_deletes.borrow_mut().drain().collect();
        for (key, id) in deletes {
            self.remove_at(key, id);
        }
        let inserts: Vec<_> = self.pending_inserts.borrow_mut().drain().collect();
        for (key, id) in inserts {
            self.insert_at(key, id);
        }
    }

    /// Snapshot of every (cell, id) entry, for invariant checks.
    #[cfg(test)]
    pub(crate) fn entries(&self) -> Vec<(SpatialKey, ObjectId)> {
        let cells = self.cells.borrow();
        cells
            .iter()
            .flat_map(|(&key, bucket)| bucket.iter().map(move |&id| (key, id)))
            .collect()
    }
}

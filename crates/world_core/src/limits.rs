//! World extent limits.

use glam::Vec3;

/// Half-size of the addressable world per axis, in world units. No active
/// object may exist outside `[-WORLD_HALF_EXTENT, WORLD_HALF_EXTENT]`.
pub const WORLD_HALF_EXTENT: f32 = 31_000.0;

/// True when any coordinate of `pos` lies outside the addressable world.
#[inline]
pub fn pos_over_limit(pos: Vec3) -> bool {
    pos.x.abs() > WORLD_HALF_EXTENT
        || pos.y.abs() > WORLD_HALF_EXTENT
        || pos.z.abs() > WORLD_HALF_EXTENT
}

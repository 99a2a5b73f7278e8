//! Small geometry helpers shared by the spatial index and its callers.

use glam::Vec3;

/// Axis-aligned box in world space. Both faces are inclusive.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    #[inline]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Cube of half-size `extent` centred on `center`.
    #[inline]
    pub fn around(center: Vec3, extent: f32) -> Self {
        Self::new(center - Vec3::splat(extent), center + Vec3::splat(extent))
    }

    #[inline]
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }
}

/// Squared distance from `p` to the closest point of `aabb` (zero inside).
#[inline]
pub fn min_dist_sq(aabb: &Aabb, p: Vec3) -> f32 {
    let d = (aabb.min - p).max(Vec3::ZERO).max(p - aabb.max);
    d.length_squared()
}

/// Squared distance from `p` to the farthest point of `aabb`.
#[inline]
pub fn max_dist_sq(aabb: &Aabb, p: Vec3) -> f32 {
    let d = (p - aabb.min).abs().max((p - aabb.max).abs());
    d.length_squared()
}

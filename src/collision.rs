//! Collision world query surface.
//!
//! The controller never talks to a physics engine directly when probing.
//! Backends expose their world through [`CollisionQuery`], and the probe and
//! depenetration code in this crate is written once against that trait.

use bevy::math::bounding::Aabb3d;
use bevy::prelude::*;

/// Information about a raycast/shapecast collision.
///
/// This is the result type of every probe. Ground probes rewrite `distance`
/// into the ground distance of the character (see [`crate::detection`]).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CollisionData {
    /// Distance to the hit point (if hit).
    pub distance: f32,
    /// Normal of the surface at hit point.
    pub normal: Vec3,
    /// World position of the hit point.
    pub point: Vec3,
    /// Collider that was hit (if known).
    pub entity: Option<Entity>,
    /// Linear velocity of the body owning the hit collider. Zero for static geometry.
    pub velocity: Vec3,
}

impl CollisionData {
    /// Create a collision result against static geometry.
    pub fn new(distance: f32, normal: Vec3, point: Vec3, entity: Option<Entity>) -> Self {
        Self {
            distance,
            normal,
            point,
            entity,
            velocity: Vec3::ZERO,
        }
    }

    /// Attach the velocity of the surface that was hit.
    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    /// Angle between the hit normal and `up`, in radians.
    pub fn slope_angle(&self, up: Vec3) -> f32 {
        self.normal.dot(up).clamp(-1.0, 1.0).acos()
    }
}

/// Penetration between one of the character's colliders and another collider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Penetration {
    /// Direction the character collider must move to separate (normalized).
    pub normal: Vec3,
    /// Overlap depth along `normal`.
    pub depth: f32,
}

/// Read-only geometric queries against the collision world.
///
/// Implementations must not report results for geometry they cannot see;
/// filtering of the character's own colliders is done by the callers, so an
/// implementation may, but need not, exclude them itself.
pub trait CollisionQuery {
    /// Sweep a sphere from `origin` along `direction` up to `max_distance`.
    ///
    /// Returns every hit along the sweep, in any order.
    fn sphere_cast_all(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
    ) -> Vec<CollisionData>;

    /// Cast a ray and return the closest hit, with the surface normal.
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<CollisionData>;

    /// Broad-phase: every collider whose bounds overlap `bounds`.
    ///
    /// The order is whatever the underlying world produces and is not
    /// guaranteed to be stable between ticks.
    fn overlapping(&self, bounds: &Aabb3d) -> Vec<Entity>;

    /// Narrow-phase: penetration of collider `own` into collider `other`.
    ///
    /// Returns `None` when the shapes are separated or only touching.
    fn penetration(&self, own: Entity, other: Entity) -> Option<Penetration>;
}

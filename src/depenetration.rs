//! Post-integration overlap correction.
//!
//! After the physics step the character may overlap other colliders. The
//! resolver gathers every overlapping pair first, then pushes the body out
//! along each penetration normal and removes the velocity component that
//! points into the obstacle. This is a positional correction, not a
//! contact solver.
//!
//! Pairs are resolved in the order the broad-phase returns them. That order
//! is not stable across ticks; each correction is small, so the result
//! does not depend on it in practice.

use bevy::math::bounding::{Aabb3d, BoundingVolume};
use bevy::math::Vec3A;
use bevy::prelude::*;

use crate::backend::LocomotionBackend;
use crate::collision::{CollisionQuery, Penetration};
use crate::state::CharacterBody;

/// Result of one depenetration pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    /// Total translation to apply to the body.
    pub translation: Vec3,
    /// Velocity with the inward components removed.
    pub velocity: Vec3,
    /// Number of penetrating pairs that were resolved.
    pub contacts: usize,
}

impl Correction {
    /// A pass that found nothing to correct.
    pub fn none(velocity: Vec3) -> Self {
        Self {
            translation: Vec3::ZERO,
            velocity,
            contacts: 0,
        }
    }

    /// Whether the pass changed anything.
    pub fn is_empty(&self) -> bool {
        self.contacts == 0
    }
}

/// Bounds enclosing every owned collider, grown by `epsilon` on each side.
///
/// Returns `None` when the character owns no colliders.
pub fn owned_bounds(colliders: &[(Entity, Aabb3d)], epsilon: f32) -> Option<Aabb3d> {
    let (_, first) = colliders.first()?;
    let merged = colliders[1..]
        .iter()
        .fold(*first, |bounds, (_, other)| bounds.merge(other));
    Some(merged.grow(Vec3A::splat(epsilon)))
}

/// Compute the correction that separates the owned colliders from the world.
///
/// `colliders` are the character's own colliders with their current world
/// bounds. Broad-phase hits for which `is_own` holds are ignored.
pub fn resolve_penetrations<Q, F>(
    query: &Q,
    colliders: &[(Entity, Aabb3d)],
    velocity: Vec3,
    epsilon: f32,
    is_own: F,
) -> Correction
where
    Q: CollisionQuery + ?Sized,
    F: Fn(Entity) -> bool,
{
    let Some(bounds) = owned_bounds(colliders, epsilon) else {
        return Correction::none(velocity);
    };

    let others: Vec<Entity> = query
        .overlapping(&bounds)
        .into_iter()
        .filter(|&other| !is_own(other))
        .collect();

    // Gather against the current poses before moving anything.
    let mut penetrations: Vec<Penetration> = Vec::new();
    for &(own, _) in colliders {
        for &other in &others {
            if let Some(penetration) = query.penetration(own, other) {
                if penetration.depth > 0.0 {
                    penetrations.push(penetration);
                }
            }
        }
    }

    let mut correction = Correction::none(velocity);
    for Penetration { normal, depth } in penetrations {
        correction.translation += normal * depth;

        let inward = correction.velocity.dot(normal);
        if inward < 0.0 {
            correction.velocity -= normal * inward;
        }
        correction.contacts += 1;
    }

    correction
}

/// Write a correction back to the backend and to the character's body.
pub fn apply_correction<B: LocomotionBackend>(
    world: &mut World,
    entity: Entity,
    correction: Correction,
) {
    if correction.is_empty() {
        return;
    }

    let position = B::get_position(world, entity) + correction.translation;
    B::set_position(world, entity, position);
    B::set_velocity(world, entity, correction.velocity);

    if let Some(mut body) = world.get_mut::<CharacterBody>(entity) {
        body.position = position;
        body.velocity = correction.velocity;
    }

    trace!(
        ?entity,
        contacts = correction.contacts,
        translation = ?correction.translation,
        "depenetrated"
    );
}

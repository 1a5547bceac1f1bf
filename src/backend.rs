//! Physics backend abstraction.
//!
//! This module defines the trait that physics backends must implement
//! to work with the locomotion controller. The controller never integrates
//! motion itself: it reads position and velocity back from the backend and
//! hands it one acceleration and one velocity change per tick.

use bevy::prelude::*;

/// Trait for physics backend implementations.
///
/// All functions are static and operate on the [`World`], so the controller
/// systems can be written once as exclusive systems generic over `B`.
///
/// A backend is also expected to provide, through [`LocomotionBackend::plugin`]:
/// - a sensor system in [`crate::LocomotionSet::Sensors`] that calls
///   [`crate::detection::run_probes`] for every character, and
/// - a depenetration system in [`crate::LocomotionSet::Depenetration`] that
///   runs after the physics step, using [`crate::depenetration`].
///
/// For an example implementation, see the `rapier` module's `Rapier3dBackend`.
pub trait LocomotionBackend: 'static + Send + Sync {
    /// Returns the plugin that sets up this backend.
    fn plugin() -> impl Plugin;

    /// Get the current position of an entity.
    fn get_position(world: &World, entity: Entity) -> Vec3;

    /// Teleport an entity, keeping its velocity.
    fn set_position(world: &mut World, entity: Entity, position: Vec3);

    /// Get the current linear velocity of an entity.
    fn get_velocity(world: &World, entity: Entity) -> Vec3;

    /// Set the linear velocity of an entity.
    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3);

    /// Apply an acceleration over the coming physics step.
    ///
    /// The value is mass independent: backends that work in forces multiply
    /// by the body's mass.
    fn apply_force(world: &mut World, entity: Entity, acceleration: Vec3);

    /// Apply an instantaneous velocity change.
    ///
    /// Mass independent, like [`LocomotionBackend::apply_force`].
    fn apply_impulse(world: &mut World, entity: Entity, velocity_change: Vec3);

    /// Get the fixed timestep delta time.
    fn get_fixed_timestep(world: &World) -> f32 {
        world
            .get_resource::<Time<Fixed>>()
            .map(|t| t.delta_secs())
            .filter(|&d| d > 0.0)
            .unwrap_or(1.0 / 60.0)
    }
}

/// Empty plugin for backends that don't need additional setup.
pub struct NoOpBackendPlugin;

impl Plugin for NoOpBackendPlugin {
    fn build(&self, _app: &mut App) {}
}

//! Rapier3D physics backend implementation.
//!
//! This module provides the physics backend for Bevy Rapier3D.
//! Enable with the `rapier3d` feature.
//!
//! Add the Rapier plugin with `in_fixed_schedule()` so the physics step runs
//! between the controller's force hand-off and its depenetration pass. The
//! backend plugin orders every controller phase in `FixedUpdate` before
//! [`PhysicsSet::SyncBackend`].

use bevy::ecs::system::SystemState;
use bevy::math::bounding::{Aabb3d, BoundingVolume};
use bevy::math::Vec3A;
use bevy::prelude::*;
use bevy_rapier3d::parry::query;
use bevy_rapier3d::parry::shape::SharedShape;
use bevy_rapier3d::prelude::*;
use bevy_rapier3d::rapier::math::{Isometry, Real};

use crate::backend::LocomotionBackend;
use crate::collision::{CollisionData, CollisionQuery, Penetration};
use crate::config::LocomotionConfig;
use crate::depenetration::{apply_correction, resolve_penetrations, Correction};
use crate::detection::run_probes;
use crate::state::CharacterBody;
use crate::systems::prepare_tick;
use crate::LocomotionSet;

/// Most hits collected by one ground sweep.
const MAX_SWEEP_HITS: usize = 8;

/// Rapier3D physics backend for the locomotion controller.
///
/// Accelerations and velocity changes are converted to `ExternalForce` and
/// `ExternalImpulse` using the body's mass. Probing and depenetration are
/// handled by dedicated Rapier systems that receive `RapierContext` as a
/// system parameter.
pub struct Rapier3dBackend;

impl LocomotionBackend for Rapier3dBackend {
    fn plugin() -> impl Plugin {
        Rapier3dBackendPlugin
    }

    fn get_position(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Transform>(entity)
            .map(|t| t.translation)
            .or_else(|| world.get::<GlobalTransform>(entity).map(|t| t.translation()))
            .unwrap_or(Vec3::ZERO)
    }

    fn set_position(world: &mut World, entity: Entity, position: Vec3) {
        if let Some(mut transform) = world.get_mut::<Transform>(entity) {
            transform.translation = position;
        }
    }

    fn get_velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Velocity>(entity)
            .map(|v| v.linvel)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3) {
        if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            vel.linvel = velocity;
        }
    }

    fn apply_force(world: &mut World, entity: Entity, acceleration: Vec3) {
        let force = acceleration * body_mass(world, entity);

        if let Some(mut ext_force) = world.get_mut::<ExternalForce>(entity) {
            ext_force.force += force;
        } else {
            // Fallback: integrate the acceleration ourselves if no ExternalForce component
            let dt = Self::get_fixed_timestep(world);
            if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
                vel.linvel += acceleration * dt;
            }
            return;
        }

        // Remember our contribution so the next tick can take it back out.
        if let Some(mut body) = world.get_mut::<CharacterBody>(entity) {
            body.applied_force += force;
        }
    }

    fn apply_impulse(world: &mut World, entity: Entity, velocity_change: Vec3) {
        let impulse = velocity_change * body_mass(world, entity);

        if let Some(mut ext_impulse) = world.get_mut::<ExternalImpulse>(entity) {
            ext_impulse.impulse += impulse;
        } else if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            // Fallback: apply as velocity change if no ExternalImpulse component
            vel.linvel += velocity_change;
        }
    }
}

/// Mass used to turn accelerations into forces.
///
/// Rapier fills `ReadMassProperties` after the first step; until then, and
/// for bodies without it, a unit mass is assumed.
fn body_mass(world: &World, entity: Entity) -> f32 {
    world
        .get::<ReadMassProperties>(entity)
        .map(|props| props.mass)
        .filter(|&mass| mass > 0.0 && mass.is_finite())
        .unwrap_or(1.0)
}

/// Plugin that sets up Rapier3D-specific systems for the locomotion controller.
pub struct Rapier3dBackendPlugin;

impl Plugin for Rapier3dBackendPlugin {
    fn build(&self, app: &mut App) {
        // The whole controller tick hands off before Rapier syncs and steps.
        // Depenetration runs in FixedPostUpdate, after the Writeback of this tick.
        app.configure_sets(
            FixedUpdate,
            LocomotionSet::FinalApplication.before(PhysicsSet::SyncBackend),
        );

        // Preparation: take last tick's force back out of ExternalForce
        app.add_systems(
            FixedUpdate,
            clear_controller_forces
                .before(prepare_tick::<Rapier3dBackend>)
                .in_set(LocomotionSet::Preparation),
        );

        // Sensors: ground sweep and wall fan against the Rapier world
        app.add_systems(FixedUpdate, rapier_sensors.in_set(LocomotionSet::Sensors));

        app.add_systems(
            FixedPostUpdate,
            rapier_depenetration.in_set(LocomotionSet::Depenetration),
        );
    }
}

/// [`CollisionQuery`] over a Rapier context, as seen by one character.
///
/// Surface velocity and collider poses come from ECS queries, passed in as
/// closures so the adapter does not depend on the caller's query types.
pub struct RapierCollisionWorld<'a> {
    context: &'a RapierContext<'a>,
    character: Entity,
    groups: Option<CollisionGroups>,
    surface_velocity: &'a dyn Fn(Entity) -> Vec3,
    collider_pose: &'a dyn Fn(Entity) -> Option<(SharedShape, Isometry<Real>)>,
}

impl RapierCollisionWorld<'_> {
    /// Filter used by the casts: skips sensors and the character's own body.
    fn cast_filter(&self) -> QueryFilter<'_> {
        let filter = QueryFilter::default()
            .exclude_rigid_body(self.character)
            .exclude_sensors();
        match self.groups {
            Some(groups) => filter.groups(groups),
            None => filter,
        }
    }
}

impl CollisionQuery for RapierCollisionWorld<'_> {
    fn sphere_cast_all(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
    ) -> Vec<CollisionData> {
        let shape = Collider::ball(radius);
        let options = ShapeCastOptions {
            max_time_of_impact: max_distance,
            stop_at_penetration: false,
            ..default()
        };

        // Rapier reports the first hit only; cast again without the colliders already found.
        let mut seen: Vec<Entity> = Vec::new();
        let mut hits = Vec::new();
        while hits.len() < MAX_SWEEP_HITS {
            let unseen = |entity: Entity| !seen.contains(&entity);
            let filter = self.cast_filter().predicate(&unseen);

            let Some((entity, hit)) =
                self.context
                    .cast_shape(origin, Quat::IDENTITY, direction, &shape, options, filter)
            else {
                break;
            };

            let (point, normal) = hit
                .details
                .map(|d| (d.witness1, d.normal1))
                .unwrap_or_else(|| {
                    let center = origin + direction * hit.time_of_impact;
                    (center + direction * radius, -direction)
                });

            seen.push(entity);
            hits.push(
                CollisionData::new(hit.time_of_impact, normal, point, Some(entity))
                    .with_velocity((self.surface_velocity)(entity)),
            );
        }
        hits
    }

    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<CollisionData> {
        self.context
            .cast_ray_and_get_normal(origin, direction, max_distance, true, self.cast_filter())
            .map(|(entity, hit)| {
                CollisionData::new(hit.time_of_impact, hit.normal, hit.point, Some(entity))
                    .with_velocity((self.surface_velocity)(entity))
            })
    }

    fn overlapping(&self, bounds: &Aabb3d) -> Vec<Entity> {
        let center = Vec3::from(bounds.center());
        let half_size = Vec3::from(bounds.half_size());
        let shape = Collider::cuboid(half_size.x, half_size.y, half_size.z);

        let mut filter = QueryFilter::default().exclude_sensors();
        if let Some(groups) = self.groups {
            filter = filter.groups(groups);
        }

        let mut found = Vec::new();
        self.context
            .intersections_with_shape(center, Quat::IDENTITY, &shape, filter, |entity| {
                found.push(entity);
                true
            });
        found
    }

    fn penetration(&self, own: Entity, other: Entity) -> Option<Penetration> {
        let (own_shape, own_iso) = (self.collider_pose)(own)?;
        let (other_shape, other_iso) = (self.collider_pose)(other)?;

        let contact = query::contact(&own_iso, &*own_shape, &other_iso, &*other_shape, 0.0)
            .ok()
            .flatten()?;
        if contact.dist >= 0.0 {
            return None;
        }

        // normal1 points from the own collider toward the other one.
        let n = contact.normal1;
        Some(Penetration {
            normal: -Vec3::new(n.x, n.y, n.z),
            depth: -contact.dist,
        })
    }
}

/// World-space bounds of a collider.
fn collider_bounds(shape: &SharedShape, iso: &Isometry<Real>) -> Aabb3d {
    let aabb = shape.compute_aabb(iso);
    Aabb3d {
        min: Vec3A::new(aabb.mins.x, aabb.mins.y, aabb.mins.z),
        max: Vec3A::new(aabb.maxs.x, aabb.maxs.y, aabb.maxs.z),
    }
}

/// Whether `entity` is `root` or one of its descendants.
fn is_part_of(entity: Entity, root: Entity, parents: &Query<&ChildOf>) -> bool {
    let mut current = entity;
    loop {
        if current == root {
            return true;
        }
        match parents.get(current) {
            Ok(child_of) => current = child_of.parent(),
            Err(_) => return false,
        }
    }
}

/// Linear velocity of the body owning `entity`, walking up to the parent rigid body.
fn surface_velocity(entity: Entity, velocities: &Query<&Velocity>, parents: &Query<&ChildOf>) -> Vec3 {
    let mut current = entity;
    loop {
        if let Ok(velocity) = velocities.get(current) {
            return velocity.linvel;
        }
        match parents.get(current) {
            Ok(child_of) => current = child_of.parent(),
            Err(_) => return Vec3::ZERO,
        }
    }
}

/// Colliders that belong to `root`: its own and those of all its descendants.
fn owned_colliders(
    root: Entity,
    colliders: &Query<Entity, With<Collider>>,
    parents: &Query<&ChildOf>,
) -> Vec<Entity> {
    colliders
        .iter()
        .filter(|&collider| is_part_of(collider, root, parents))
        .collect()
}

/// World pose of `entity`, composed from `Transform` up the hierarchy.
///
/// Rapier's writeback only touches `Transform`; `GlobalTransform` still holds
/// the previous pose until the next propagation.
fn world_transform(
    entity: Entity,
    transforms: &Query<&Transform>,
    parents: &Query<&ChildOf>,
) -> Option<Transform> {
    let mut pose = *transforms.get(entity).ok()?;
    let mut current = entity;
    while let Ok(child_of) = parents.get(current) {
        current = child_of.parent();
        let Ok(parent) = transforms.get(current) else {
            break;
        };
        pose = parent.mul_transform(pose);
    }
    Some(pose)
}

fn transform_iso(transform: &Transform) -> Isometry<Real> {
    Isometry::from_parts(transform.translation.into(), transform.rotation.into())
}

fn collider_pose(
    entity: Entity,
    colliders: &Query<&Collider>,
    transforms: &Query<&Transform>,
    parents: &Query<&ChildOf>,
) -> Option<(SharedShape, Isometry<Real>)> {
    let collider = colliders.get(entity).ok()?;
    let pose = world_transform(entity, transforms, parents)?;
    Some((collider.raw.clone(), transform_iso(&pose)))
}

/// Rapier-specific probe system.
///
/// Probes use the "ideal up" direction derived from the character's gravity,
/// NOT from the Transform rotation.
fn rapier_sensors(
    rapier_context: ReadRapierContext,
    mut q_characters: Query<(
        Entity,
        &mut CharacterBody,
        &LocomotionConfig,
        Option<&CollisionGroups>,
    )>,
    q_velocities: Query<&Velocity>,
    q_parents: Query<&ChildOf>,
    q_colliders: Query<&Collider>,
    q_transforms: Query<&Transform>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };

    let velocity_of = |entity: Entity| surface_velocity(entity, &q_velocities, &q_parents);
    let pose_of = |entity: Entity| collider_pose(entity, &q_colliders, &q_transforms, &q_parents);

    for (entity, mut body, config, groups) in &mut q_characters {
        let world = RapierCollisionWorld {
            context: &context,
            character: entity,
            groups: groups.copied(),
            surface_velocity: &velocity_of,
            collider_pose: &pose_of,
        };

        run_probes(&world, &mut body, config, |other| {
            is_part_of(other, entity, &q_parents)
        });
    }
}

type DepenetrationParams = (
    ReadRapierContext<'static, 'static>,
    Query<
        'static,
        'static,
        (
            Entity,
            &'static LocomotionConfig,
            Option<&'static CollisionGroups>,
        ),
        With<CharacterBody>,
    >,
    Query<'static, 'static, &'static Velocity>,
    Query<'static, 'static, &'static ChildOf>,
    Query<'static, 'static, Entity, With<Collider>>,
    Query<'static, 'static, &'static Collider>,
    Query<'static, 'static, &'static Transform>,
);

/// Rapier-specific depenetration system.
///
/// Runs after the physics step. Corrections are computed against the
/// written-back poses first and applied afterwards.
fn rapier_depenetration(world: &mut World, state: &mut SystemState<DepenetrationParams>) {
    let corrections: Vec<(Entity, Correction)> = {
        let (
            rapier_context,
            q_characters,
            q_velocities,
            q_parents,
            q_collider_entities,
            q_colliders,
            q_transforms,
        ) = state.get_mut(world);
        let Ok(context) = rapier_context.single() else {
            return;
        };

        let velocity_of = |entity: Entity| surface_velocity(entity, &q_velocities, &q_parents);
        let pose_of = |entity: Entity| collider_pose(entity, &q_colliders, &q_transforms, &q_parents);

        q_characters
            .iter()
            .map(|(entity, config, groups)| {
                let owned: Vec<(Entity, Aabb3d)> =
                    owned_colliders(entity, &q_collider_entities, &q_parents)
                        .into_iter()
                        .filter_map(|own| {
                            pose_of(own).map(|(shape, iso)| (own, collider_bounds(&shape, &iso)))
                        })
                        .collect();

                let world = RapierCollisionWorld {
                    context: &context,
                    character: entity,
                    groups: groups.copied(),
                    surface_velocity: &velocity_of,
                    collider_pose: &pose_of,
                };

                let velocity = q_velocities
                    .get(entity)
                    .map(|v| v.linvel)
                    .unwrap_or(Vec3::ZERO);
                let correction = resolve_penetrations(
                    &world,
                    &owned,
                    velocity,
                    config.depenetration_epsilon,
                    |other| is_part_of(other, entity, &q_parents),
                );
                (entity, correction)
            })
            .collect()
    };

    for (entity, correction) in corrections {
        apply_correction::<Rapier3dBackend>(world, entity, correction);
    }
}

/// Subtract the force the controller added last tick.
///
/// Forces applied to `ExternalForce` by other code are left untouched.
pub fn clear_controller_forces(mut q: Query<(&mut ExternalForce, &mut CharacterBody)>) {
    for (mut ext_force, mut body) in &mut q {
        ext_force.force -= std::mem::take(&mut body.applied_force);
    }
}

/// Bundle of Rapier components for a locomotion character.
///
/// Rotation is locked and Rapier gravity is disabled: the controller applies
/// gravity itself. Add a `Collider` whose bottom sits at the entity origin.
#[derive(Bundle)]
pub struct Rapier3dCharacterBundle {
    pub character: CharacterBody,
    pub rigid_body: RigidBody,
    pub velocity: Velocity,
    pub external_force: ExternalForce,
    pub external_impulse: ExternalImpulse,
    pub locked_axes: LockedAxes,
    pub gravity_scale: GravityScale,
    pub mass_properties: ReadMassProperties,
}

impl Default for Rapier3dCharacterBundle {
    fn default() -> Self {
        Self::new()
    }
}

impl Rapier3dCharacterBundle {
    pub fn new() -> Self {
        Self {
            character: CharacterBody::default(),
            rigid_body: RigidBody::Dynamic,
            velocity: Velocity::default(),
            external_force: ExternalForce::default(),
            external_impulse: ExternalImpulse::default(),
            locked_axes: LockedAxes::ROTATION_LOCKED,
            gravity_scale: GravityScale(0.0),
            mass_properties: ReadMassProperties::default(),
        }
    }

    /// Start with the full air-jump budget of `config`.
    pub fn for_config(config: &LocomotionConfig) -> Self {
        Self {
            character: CharacterBody::for_config(config),
            ..Self::new()
        }
    }

    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.character.gravity = gravity;
        self
    }

    pub fn with_body(mut self, body: RigidBody) -> Self {
        self.rigid_body = body;
        self
    }

    pub fn with_locked_axes(mut self, axes: LockedAxes) -> Self {
        self.locked_axes = axes;
        self
    }
}

#[cfg(test)]
mod tests {
    use bevy::ecs::system::RunSystemOnce;

    use super::*;
    use crate::motion::MotionState;

    #[test]
    fn rapier_backend_get_position() {
        let mut world = World::new();
        let entity = world.spawn(Transform::from_xyz(1.0, 2.0, 3.0)).id();

        let pos = Rapier3dBackend::get_position(&world, entity);
        assert!((pos - Vec3::new(1.0, 2.0, 3.0)).length() < 0.01);

        Rapier3dBackend::set_position(&mut world, entity, Vec3::new(4.0, 5.0, 6.0));
        let pos = Rapier3dBackend::get_position(&world, entity);
        assert!((pos - Vec3::new(4.0, 5.0, 6.0)).length() < 0.01);
    }

    #[test]
    fn rapier_backend_velocity() {
        let mut world = World::new();
        let entity = world
            .spawn(Velocity::linear(Vec3::new(5.0, 3.0, -1.0)))
            .id();

        let vel = Rapier3dBackend::get_velocity(&world, entity);
        assert!((vel - Vec3::new(5.0, 3.0, -1.0)).length() < 0.01);

        Rapier3dBackend::set_velocity(&mut world, entity, Vec3::new(10.0, 0.0, 0.0));
        let vel = Rapier3dBackend::get_velocity(&world, entity);
        assert!((vel - Vec3::new(10.0, 0.0, 0.0)).length() < 0.01);
    }

    #[test]
    fn impulse_goes_to_external_impulse() {
        let mut world = World::new();
        let entity = world
            .spawn((Velocity::default(), ExternalImpulse::default()))
            .id();

        Rapier3dBackend::apply_impulse(&mut world, entity, Vec3::new(0.0, 15.0, 0.0));

        let impulse = world.get::<ExternalImpulse>(entity).unwrap();
        assert!((impulse.impulse - Vec3::new(0.0, 15.0, 0.0)).length() < 0.01);
        assert_eq!(world.get::<Velocity>(entity).unwrap().linvel, Vec3::ZERO);
    }

    #[test]
    fn impulse_falls_back_to_velocity() {
        let mut world = World::new();
        let entity = world.spawn(Velocity::default()).id();

        Rapier3dBackend::apply_impulse(&mut world, entity, Vec3::new(0.0, 15.0, 0.0));

        let vel = world.get::<Velocity>(entity).unwrap();
        assert!((vel.linvel - Vec3::new(0.0, 15.0, 0.0)).length() < 0.01);
    }

    #[test]
    fn controller_force_is_cleared_without_touching_user_force() {
        let mut world = World::new();
        let entity = world
            .spawn((
                CharacterBody::default(),
                ExternalForce {
                    force: Vec3::new(1.0, 0.0, 0.0),
                    torque: Vec3::ZERO,
                },
            ))
            .id();

        Rapier3dBackend::apply_force(&mut world, entity, Vec3::new(0.0, -29.43, 0.0));
        {
            let ext = world.get::<ExternalForce>(entity).unwrap();
            assert!((ext.force - Vec3::new(1.0, -29.43, 0.0)).length() < 0.01);
        }

        world.run_system_once(clear_controller_forces).unwrap();

        let ext = world.get::<ExternalForce>(entity).unwrap();
        assert!((ext.force - Vec3::new(1.0, 0.0, 0.0)).length() < 0.01);
        let body = world.get::<CharacterBody>(entity).unwrap();
        assert_eq!(body.applied_force, Vec3::ZERO);
    }

    #[test]
    fn rapier_character_bundle_creates_valid_entity() {
        let mut world = World::new();
        let config = LocomotionConfig::default().with_air_jumps(2);

        let entity = world
            .spawn((
                Transform::default(),
                Rapier3dCharacterBundle::for_config(&config).with_gravity(Vec3::new(0.0, -20.0, 0.0)),
                config,
                Collider::capsule_y(0.5, 0.4),
            ))
            .id();

        assert!(world.get::<RigidBody>(entity).is_some());
        assert!(world.get::<ExternalForce>(entity).is_some());
        assert_eq!(world.get::<GravityScale>(entity).unwrap().0, 0.0);
        assert!(world.get::<MotionState>(entity).is_some());

        let body = world.get::<CharacterBody>(entity).unwrap();
        assert_eq!(body.air_jumps_remaining, 2);
        assert_eq!(body.up(), Vec3::Y);
    }

    #[test]
    fn collider_bounds_follow_transform() {
        let collider = Collider::ball(0.5);
        let iso = transform_iso(&Transform::from_xyz(0.0, 2.0, 0.0));

        let bounds = collider_bounds(&collider.raw, &iso);
        assert!((bounds.min.y - 1.5).abs() < 1e-5);
        assert!((bounds.max.y - 2.5).abs() < 1e-5);
    }

    #[test]
    fn collider_pose_reads_written_back_transform() {
        let mut world = World::new();
        // GlobalTransform still holds the pose from before the step.
        let body = world
            .spawn((Transform::from_xyz(0.0, 9.8, 0.0), GlobalTransform::from_xyz(0.0, 10.0, 0.0)))
            .id();
        let collider = world
            .spawn((
                Collider::ball(0.5),
                Transform::from_xyz(0.0, 0.5, 0.0),
                GlobalTransform::from_xyz(0.0, 10.5, 0.0),
                ChildOf(body),
            ))
            .id();

        let y = world
            .run_system_once(
                move |colliders: Query<&Collider>,
                      transforms: Query<&Transform>,
                      parents: Query<&ChildOf>| {
                    collider_pose(collider, &colliders, &transforms, &parents)
                        .map(|(_, iso)| iso.translation.vector.y)
                },
            )
            .unwrap()
            .expect("collider has a pose");
        assert!((y - 10.3).abs() < 1e-5, "y = {y}");
    }

    #[test]
    fn owned_colliders_include_all_descendants() {
        let mut world = World::new();
        let character = world.spawn(Collider::ball(0.5)).id();
        let limb = world.spawn(ChildOf(character)).id();
        let hand = world.spawn((Collider::ball(0.1), ChildOf(limb))).id();
        let stranger = world.spawn(Collider::ball(0.5)).id();

        let owned = world
            .run_system_once(
                move |colliders: Query<Entity, With<Collider>>, parents: Query<&ChildOf>| {
                    owned_colliders(character, &colliders, &parents)
                },
            )
            .unwrap();

        assert!(owned.contains(&character));
        assert!(owned.contains(&hand));
        assert!(!owned.contains(&limb));
        assert!(!owned.contains(&stranger));
    }
}

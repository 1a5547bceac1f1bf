//! Core controller systems.
//!
//! These systems implement one fixed tick of the locomotion controller.
//! They are generic over the physics backend so the same pipeline runs on
//! Rapier or any other engine. The order is fixed by [`crate::LocomotionSet`]:
//! probes, then ground handling and actions, then forces, then hand-off to
//! the backend; depenetration and publishing follow the physics step.

use bevy::prelude::*;

use crate::actions::{ActionKind, ActionQueue};
use crate::backend::LocomotionBackend;
use crate::config::LocomotionConfig;
use crate::detection::wall_friction_force;
use crate::intent::MovementIntent;
use crate::motion::{CameraShake, MotionState};
use crate::movement::{
    adhesion_spring_force, cancel_fall, gravity_multiplier, ground_pursuit_force, horizontal,
    jump_speed, leap_redirect, slam_force, strafe_force, wall_jump_direction,
};
use crate::state::{Airborne, CharacterBody, Grounded, Slamming, Sliding, TouchingWall};

/// All entities driven by the controller.
fn characters(world: &mut World) -> Vec<Entity> {
    world
        .query_filtered::<Entity, With<CharacterBody>>()
        .iter(world)
        .collect()
}

/// Copy out the body and config of a character.
fn character(world: &World, entity: Entity) -> Option<(CharacterBody, LocomotionConfig)> {
    let body = world.get::<CharacterBody>(entity)?.clone();
    let config = world.get::<LocomotionConfig>(entity).copied().unwrap_or_default();
    Some((body, config))
}

fn store(world: &mut World, entity: Entity, body: CharacterBody) {
    if let Some(mut stored) = world.get_mut::<CharacterBody>(entity) {
        *stored = body;
    }
}

/// Horizontal input of a character, zero inside the deadzone.
fn input_direction(world: &World, entity: Entity, up: Vec3, deadzone: f32) -> Vec3 {
    world
        .get::<MovementIntent>(entity)
        .filter(|intent| intent.is_moving(deadzone))
        .map(|intent| horizontal(intent.direction, up))
        .unwrap_or(Vec3::ZERO)
}

/// Log configs that fail validation when they are added.
pub fn validate_new_configs(q: Query<(Entity, &LocomotionConfig), Added<LocomotionConfig>>) {
    for (entity, config) in &q {
        if let Err(err) = config.validate() {
            warn!(?entity, "invalid locomotion config: {err}");
        }
    }
}

/// Start a tick: mirror the rigid body and clear per-tick state.
pub fn prepare_tick<B: LocomotionBackend>(world: &mut World) {
    for entity in characters(world) {
        let position = B::get_position(world, entity);
        let velocity = B::get_velocity(world, entity);

        if let Some(mut body) = world.get_mut::<CharacterBody>(entity) {
            body.position = position;
            body.velocity = velocity;
            body.begin_tick();
        }
    }
}

/// Apply the ground probe result.
///
/// Handles the grounded/airborne transition and restores the air jumps on
/// landing. While grounded, the body is snapped onto the surface when it is
/// not moving up, and downward velocity is removed.
pub fn update_ground_state<B: LocomotionBackend>(world: &mut World) {
    for entity in characters(world) {
        let Some((mut body, config)) = character(world, entity) else {
            continue;
        };
        let was_grounded = body.grounded;

        let Some(floor) = body.floor else {
            if was_grounded {
                debug!(?entity, "left ground");
            }
            body.grounded = false;
            body.ground_distance = 0.0;
            body.ground_velocity = Vec3::ZERO;
            store(world, entity, body);
            continue;
        };

        body.grounded = true;
        body.ground_distance = floor.distance;
        body.ground_velocity = floor.velocity;

        if !was_grounded {
            body.air_jumps_remaining = config.air_jumps;
            debug!(?entity, ground = ?floor.entity, "landed");
        }

        let up = body.up();
        let vertical = body.velocity.dot(up);

        if vertical <= config.snap_velocity_threshold {
            let snap = floor.distance - config.active_skin(was_grounded);
            if snap != 0.0 {
                body.position += up * snap;
                B::set_position(world, entity, body.position);
            }
        }

        if vertical < 0.0 {
            body.velocity -= up * vertical;
            B::set_velocity(world, entity, body.velocity);
        }

        store(world, entity, body);
    }
}

/// Drain each character's action queue and execute the actions in order.
pub fn execute_actions<B: LocomotionBackend>(world: &mut World) {
    for entity in characters(world) {
        let actions = match world.get_mut::<ActionQueue>(entity) {
            Some(mut queue) if !queue.is_empty() => queue.drain(),
            _ => continue,
        };
        let Some((mut body, config)) = character(world, entity) else {
            continue;
        };
        let direction = input_direction(world, entity, body.up(), config.input_deadzone);

        for action in actions {
            match action {
                ActionKind::Jump => jump(entity, &mut body, &config, direction),
                ActionKind::Slam => start_slam(entity, &mut body),
                ActionKind::SlideStart => body.slide_latched = true,
            }
        }

        store(world, entity, body);
    }
}

/// Wall jump, ground jump or air jump, in that order of preference.
fn jump(entity: Entity, body: &mut CharacterBody, config: &LocomotionConfig, direction: Vec3) {
    let up = body.up();
    let speed = jump_speed(
        body.gravity_magnitude(),
        config.jump_gravity_multiplier,
        config.jump_height,
    );
    let cancel = cancel_fall(body.velocity, up);

    let velocity_change = if let Some(normal) = body.wall_normal() {
        let out = wall_jump_direction(direction, normal, up, config.input_deadzone);
        debug!(?entity, direction = ?out, "wall jump");
        out * config.wall_jump_force + up * speed * config.wall_jump_height_penalty + cancel
    } else {
        if !body.grounded {
            if body.air_jumps_remaining == 0 {
                trace!(?entity, "jump dropped, no air jumps left");
                return;
            }
            body.air_jumps_remaining -= 1;
            debug!(?entity, remaining = body.air_jumps_remaining, "air jump");
        }
        let leap = leap_redirect(
            body.velocity,
            direction,
            up,
            config.jump_leap,
            config.input_deadzone,
        );
        up * speed + cancel + leap
    };

    body.add_impulse(velocity_change);
    body.last_jump_tick = Some(body.tick);
}

fn start_slam(entity: Entity, body: &mut CharacterBody) {
    if body.slamming || body.grounded {
        return;
    }
    body.slamming = true;
    debug!(?entity, "slam started");
}

/// Horizontal movement, slam and wall friction.
///
/// A slam takes over the whole tick: it either lands (clearing the slam and
/// requesting a camera shake) or drives the body down. Otherwise the body
/// strafes in the air, slides, or walks.
pub fn apply_movement<B: LocomotionBackend>(world: &mut World) {
    for entity in characters(world) {
        let Some((mut body, config)) = character(world, entity) else {
            continue;
        };
        let up = body.up();
        let direction = input_direction(world, entity, up, config.input_deadzone);
        let slide_held = world
            .get::<MovementIntent>(entity)
            .is_some_and(|intent| intent.slide_held);

        if body.slamming {
            if body.grounded {
                body.slamming = false;
                debug!(?entity, "slam landed");
                world.send_event(CameraShake {
                    entity,
                    intensity: config.slam_shake_intensity,
                });
            } else {
                body.add_force(slam_force(
                    body.velocity,
                    up,
                    config.slam_speed,
                    config.acceleration_time,
                ));
            }
        } else if !body.grounded {
            body.add_force(strafe_force(
                body.velocity,
                direction,
                up,
                config.max_ground_speed,
                config.acceleration_time,
                config.air_acceleration_penalty,
            ));
            body.sliding = true;
        } else if slide_held || body.slide_latched {
            body.add_force(strafe_force(
                body.velocity,
                direction,
                up,
                config.max_ground_speed,
                config.acceleration_time,
                config.slide_penalty,
            ));
            body.sliding = true;
        } else {
            body.add_force(ground_pursuit_force(
                body.velocity,
                direction,
                body.ground_velocity,
                up,
                config.max_ground_speed,
                config.acceleration_time,
            ));
        }
        body.slide_latched = false;

        if body.on_wall() {
            body.add_force(wall_friction_force(body.velocity, up, config.wall_friction));
        }

        store(world, entity, body);
    }
}

/// Keep a grounded body near the surface with a spring-damper.
///
/// Suppressed for a few ticks after a jump so the spring cannot eat the
/// jump impulse.
pub fn apply_ground_spring<B: LocomotionBackend>(world: &mut World) {
    for entity in characters(world) {
        let Some((body, config)) = character(world, entity) else {
            continue;
        };
        if !body.grounded {
            continue;
        }
        let suppressed = body
            .ticks_since_jump()
            .is_some_and(|ticks| ticks < u64::from(config.spring_suppression_ticks));
        if suppressed {
            continue;
        }

        let contraction = body.ground_distance / config.ground_probe_distance;
        let force = adhesion_spring_force(
            contraction,
            body.vertical_speed(),
            body.up(),
            config.ground_spring,
            config.ground_damper,
        );

        if let Some(mut body) = world.get_mut::<CharacterBody>(entity) {
            body.add_force(force);
        }
    }
}

/// Apply gravity, heavier unless rising with jump held.
pub fn apply_gravity<B: LocomotionBackend>(world: &mut World) {
    for entity in characters(world) {
        let jump_held = world
            .get::<MovementIntent>(entity)
            .is_some_and(|intent| intent.jump_held);
        let Some((body, config)) = character(world, entity) else {
            continue;
        };

        let multiplier = gravity_multiplier(
            body.vertical_speed(),
            jump_held,
            config.jump_gravity_multiplier,
            config.falling_gravity_multiplier,
        );

        if let Some(mut body) = world.get_mut::<CharacterBody>(entity) {
            let gravity = body.gravity * multiplier;
            body.add_force(gravity);
        }
    }
}

/// Hand the tick's accumulated force and velocity change to the backend.
pub fn finalize_forces<B: LocomotionBackend>(world: &mut World) {
    for entity in characters(world) {
        let Some((force, impulse)) = world
            .get_mut::<CharacterBody>(entity)
            .map(|mut body| body.take_pending())
        else {
            continue;
        };

        if force != Vec3::ZERO {
            B::apply_force(world, entity, force);
        }
        if impulse != Vec3::ZERO {
            B::apply_impulse(world, entity, impulse);
        }
    }
}

/// Mirror the post-step rigid body and publish the motion snapshot.
pub fn publish_motion_state<B: LocomotionBackend>(world: &mut World) {
    for entity in characters(world) {
        let position = B::get_position(world, entity);
        let velocity = B::get_velocity(world, entity);
        let Some((mut body, config)) = character(world, entity) else {
            continue;
        };
        body.position = position;
        body.velocity = velocity;

        let snapshot = MotionState::capture(&body, &config);
        store(world, entity, body);

        match world.get_mut::<MotionState>(entity) {
            Some(mut state) => *state = snapshot,
            None => {
                world.entity_mut(entity).insert(snapshot);
            }
        }
    }
}

/// Sync state marker components from the controller's state.
pub fn sync_state_markers(
    mut commands: Commands,
    q: Query<(
        Entity,
        &CharacterBody,
        Has<Grounded>,
        Has<Airborne>,
        Option<&TouchingWall>,
        Has<Sliding>,
        Has<Slamming>,
    )>,
) {
    for (entity, body, has_grounded, has_airborne, wall, has_sliding, has_slamming) in &q {
        let mut entity_commands = commands.entity(entity);

        if body.grounded && !has_grounded {
            entity_commands.insert(Grounded).remove::<Airborne>();
        } else if !body.grounded && !has_airborne {
            entity_commands.insert(Airborne).remove::<Grounded>();
        }

        match (body.wall_normal(), wall) {
            (Some(normal), Some(current)) if current.normal == normal => {}
            (Some(normal), _) => {
                entity_commands.insert(TouchingWall::new(normal));
            }
            (None, Some(_)) => {
                entity_commands.remove::<TouchingWall>();
            }
            (None, None) => {}
        }

        if body.sliding && !has_sliding {
            entity_commands.insert(Sliding);
        } else if !body.sliding && has_sliding {
            entity_commands.remove::<Sliding>();
        }

        if body.slamming && !has_slamming {
            entity_commands.insert(Slamming);
        } else if !body.slamming && has_slamming {
            entity_commands.remove::<Slamming>();
        }
    }
}

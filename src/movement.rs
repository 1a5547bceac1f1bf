//! Force and impulse formulas.
//!
//! Everything here is a pure function of the current state. Forces are
//! accelerations (mass independent); impulses are velocity changes.

use bevy::prelude::*;

/// Remove the component of `v` along `up`.
#[inline]
pub fn horizontal(v: Vec3, up: Vec3) -> Vec3 {
    v - up * v.dot(up)
}

/// Ground movement: pursue the desired velocity over `acceleration_time`.
///
/// The target is `direction * max_speed` plus the horizontal velocity of the
/// ground, so a moving platform carries the character. The velocity gap is
/// clamped to `max_speed` before dividing.
pub fn ground_pursuit_force(
    velocity: Vec3,
    direction: Vec3,
    ground_velocity: Vec3,
    up: Vec3,
    max_speed: f32,
    acceleration_time: f32,
) -> Vec3 {
    let target = direction * max_speed + horizontal(ground_velocity, up);
    let gap = horizontal(target - velocity, up).clamp_length_max(max_speed);
    gap / acceleration_time
}

/// Air strafe and slide: penalized push along the input.
///
/// The push fades out as the velocity along the input approaches
/// `max_speed`, so strafing cannot accelerate without bound in its own
/// direction. It never brakes.
pub fn strafe_force(
    velocity: Vec3,
    direction: Vec3,
    up: Vec3,
    max_speed: f32,
    acceleration_time: f32,
    penalty: f32,
) -> Vec3 {
    let planar = horizontal(direction, up);
    let Some(unit) = planar.try_normalize() else {
        return Vec3::ZERO;
    };
    let aligned = (horizontal(velocity, up).dot(unit) / max_speed).clamp(0.0, 1.0);
    planar * (max_speed * penalty / acceleration_time) * (1.0 - aligned)
}

/// Slam: pursue a straight-down velocity of `slam_speed`.
pub fn slam_force(velocity: Vec3, up: Vec3, slam_speed: f32, acceleration_time: f32) -> Vec3 {
    (-up * slam_speed - velocity) / acceleration_time
}

/// Ground adhesion spring.
///
/// `contraction` is the ground distance as a fraction of the probe distance.
pub fn adhesion_spring_force(
    contraction: f32,
    vertical_speed: f32,
    up: Vec3,
    spring: f32,
    damper: f32,
) -> Vec3 {
    up * (contraction * spring - vertical_speed * damper)
}

/// Gravity multiplier: jump gravity while rising with jump held, falling gravity otherwise.
pub fn gravity_multiplier(
    vertical_speed: f32,
    jump_held: bool,
    jump_multiplier: f32,
    falling_multiplier: f32,
) -> f32 {
    if vertical_speed > 0.0 && jump_held {
        jump_multiplier
    } else {
        falling_multiplier
    }
}

/// Take-off speed that reaches `height` under `gravity * multiplier`.
pub fn jump_speed(gravity: f32, multiplier: f32, height: f32) -> f32 {
    (2.0 * gravity * multiplier * height).sqrt()
}

/// Velocity change that cancels downward motion along `up`.
pub fn cancel_fall(velocity: Vec3, up: Vec3) -> Vec3 {
    let vertical = velocity.dot(up);
    if vertical < 0.0 {
        up * -vertical
    } else {
        Vec3::ZERO
    }
}

/// Jump leap: velocity change that turns horizontal velocity toward the input.
///
/// `leap` is how far (0..1) the horizontal velocity is rotated onto the input
/// direction, keeping its speed. No input means no change.
pub fn leap_redirect(velocity: Vec3, direction: Vec3, up: Vec3, leap: f32, deadzone: f32) -> Vec3 {
    let direction = horizontal(direction, up);
    if direction.length() <= deadzone {
        return Vec3::ZERO;
    }
    let current = horizontal(velocity, up);
    let redirected = direction.normalize() * current.length();
    (redirected - current) * leap
}

/// Horizontal direction of a wall jump.
///
/// Significant input pointing into the wall is mirrored off the wall; input
/// already pointing away is used as is. Without significant input the
/// character jumps straight out along the wall normal.
pub fn wall_jump_direction(direction: Vec3, wall_normal: Vec3, up: Vec3, deadzone: f32) -> Vec3 {
    let normal = horizontal(wall_normal, up).normalize_or(wall_normal);
    let input = horizontal(direction, up);
    if input.length() <= deadzone {
        return normal;
    }

    let into_wall = input.dot(normal);
    let out = if into_wall < 0.0 {
        input - 2.0 * into_wall * normal
    } else {
        input
    };
    out.normalize_or(normal)
}

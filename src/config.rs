//! Controller configuration component.
//!
//! This module defines the tuning for a locomotion controller: movement
//! speeds, jump shape, probe dimensions, wall behaviour, slam, slide and
//! ground adhesion. A config is set when the character is spawned and is not
//! mutated by the controller.

use bevy::prelude::*;
use thiserror::Error;

/// Reasons a [`LocomotionConfig`] is rejected by [`LocomotionConfig::validate`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A value that is used as a divisor or a length was zero or negative.
    #[error("`{field}` must be positive, got {value}")]
    NonPositive { field: &'static str, value: f32 },
    /// A value was NaN or infinite.
    #[error("`{field}` must be finite")]
    NotFinite { field: &'static str },
    /// A value fell outside its allowed range.
    #[error("`{field}` must be within {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
}

/// Configuration parameters for the locomotion controller.
///
/// Defaults are the values the movement was tuned with: a 15 m/s runner
/// with a 4 m jump under tripled gravity.
#[derive(Component, Reflect, Debug, Clone, Copy, PartialEq)]
#[reflect(Component)]
pub struct LocomotionConfig {
    // === Movement Settings ===
    /// Maximum horizontal speed on the ground (units/second).
    pub max_ground_speed: f32,

    /// Time to close the gap between current and desired velocity (seconds).
    pub acceleration_time: f32,

    /// Multiplier on strafe acceleration while airborne (0.0-1.0).
    pub air_acceleration_penalty: f32,

    /// Multiplier on strafe acceleration while sliding (0.0-1.0).
    pub slide_penalty: f32,

    /// Horizontal input below this magnitude counts as no input.
    pub input_deadzone: f32,

    // === Jump Settings ===
    /// Apex height of a jump under jump gravity (units).
    pub jump_height: f32,

    /// Gravity multiplier while rising with jump held.
    pub jump_gravity_multiplier: f32,

    /// Gravity multiplier otherwise (falling, or jump released).
    pub falling_gravity_multiplier: f32,

    /// Jumps available while airborne, restored on landing.
    pub air_jumps: u32,

    /// How much of the horizontal velocity a jump redirects toward the input (0.0-1.0).
    pub jump_leap: f32,

    // === Ground Probe Settings ===
    /// Height above the feet the ground sweep starts from, and the sweep length.
    pub ground_probe_distance: f32,

    /// Extra sweep length while already grounded (hysteresis).
    pub ground_probe_skin: f32,

    /// Radius of the swept sphere.
    pub ground_probe_radius: f32,

    /// Steepest walkable surface (radians).
    pub ground_max_slope: f32,

    /// Upward speed at or below which a grounded body is snapped to the surface.
    pub snap_velocity_threshold: f32,

    // === Wall Probe Settings ===
    /// Length of each wall ray.
    pub wall_probe_distance: f32,

    /// Height above the feet the wall rays start from.
    pub wall_probe_height: f32,

    /// Number of rays in the horizontal fan.
    pub wall_probe_rays: u32,

    /// Upward acceleration per unit of downward speed while on a wall.
    pub wall_friction: f32,

    /// Horizontal velocity change of a wall jump.
    pub wall_jump_force: f32,

    /// Fraction of the normal jump speed a wall jump gets vertically.
    pub wall_jump_height_penalty: f32,

    // === Slam Settings ===
    /// Downward speed a ground slam drives toward.
    pub slam_speed: f32,

    /// Intensity of the camera shake emitted on slam landing.
    pub slam_shake_intensity: f32,

    // === Ground Adhesion Settings ===
    /// Spring constant of the ground adhesion spring.
    pub ground_spring: f32,

    /// Damper constant of the ground adhesion spring.
    pub ground_damper: f32,

    /// Ticks after a jump during which the adhesion spring stays off.
    pub spring_suppression_ticks: u32,

    // === Depenetration Settings ===
    /// Bounds expansion for the overlap query, and the tolerated residual overlap.
    pub depenetration_epsilon: f32,
}

impl Default for LocomotionConfig {
    fn default() -> Self {
        Self {
            // Movement settings
            max_ground_speed: 15.0,
            acceleration_time: 0.1,
            air_acceleration_penalty: 0.2,
            slide_penalty: 0.3,
            input_deadzone: 0.1,

            // Jump settings
            jump_height: 4.0,
            jump_gravity_multiplier: 3.0,
            falling_gravity_multiplier: 3.0,
            air_jumps: 1,
            jump_leap: 0.5,

            // Ground probe settings
            ground_probe_distance: 1.0,
            ground_probe_skin: 0.1,
            ground_probe_radius: 0.4,
            ground_max_slope: 46.0_f32.to_radians(),
            snap_velocity_threshold: 0.01,

            // Wall probe settings
            wall_probe_distance: 0.8,
            wall_probe_height: 1.0,
            wall_probe_rays: 64,
            wall_friction: 10.0,
            wall_jump_force: 12.0,
            wall_jump_height_penalty: 0.8,

            // Slam settings
            slam_speed: 40.0,
            slam_shake_intensity: 1.0,

            // Ground adhesion (tuned for acceleration mode, mass independent)
            ground_spring: 200.0,
            ground_damper: 20.0,
            spring_suppression_ticks: 3,

            depenetration_epsilon: 0.01,
        }
    }
}

impl LocomotionConfig {
    /// Create a config optimized for responsive player control.
    pub fn player() -> Self {
        Self {
            air_jumps: 2,
            jump_leap: 0.8,
            ..default()
        }
    }

    /// Create a config for AI-controlled characters: no air jumps, softer air control.
    pub fn ai() -> Self {
        Self {
            max_ground_speed: 8.0,
            air_acceleration_penalty: 0.1,
            air_jumps: 0,
            jump_leap: 0.0,
            ..default()
        }
    }

    /// Skin used by the ground probe given the previous grounded state.
    ///
    /// Zero while airborne, `ground_probe_skin` once grounded, so a body at
    /// rest does not flicker between states.
    #[inline]
    pub fn active_skin(&self, was_grounded: bool) -> f32 {
        if was_grounded {
            self.ground_probe_skin
        } else {
            0.0
        }
    }

    /// Check every value the controller divides by or sweeps with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_ground_speed", self.max_ground_speed),
            ("acceleration_time", self.acceleration_time),
            ("jump_height", self.jump_height),
            ("jump_gravity_multiplier", self.jump_gravity_multiplier),
            ("falling_gravity_multiplier", self.falling_gravity_multiplier),
            ("ground_probe_distance", self.ground_probe_distance),
            ("ground_probe_radius", self.ground_probe_radius),
            ("wall_probe_distance", self.wall_probe_distance),
            ("slam_speed", self.slam_speed),
        ];
        let non_negative = [
            ("ground_probe_skin", self.ground_probe_skin),
            ("snap_velocity_threshold", self.snap_velocity_threshold),
            ("wall_probe_height", self.wall_probe_height),
            ("wall_friction", self.wall_friction),
            ("wall_jump_force", self.wall_jump_force),
            ("slam_shake_intensity", self.slam_shake_intensity),
            ("ground_spring", self.ground_spring),
            ("ground_damper", self.ground_damper),
            ("depenetration_epsilon", self.depenetration_epsilon),
        ];
        let unit = [
            ("air_acceleration_penalty", self.air_acceleration_penalty),
            ("slide_penalty", self.slide_penalty),
            ("input_deadzone", self.input_deadzone),
            ("jump_leap", self.jump_leap),
            ("wall_jump_height_penalty", self.wall_jump_height_penalty),
        ];

        for (field, value) in positive.into_iter().chain(non_negative).chain(unit) {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { field });
            }
        }
        for (field, value) in positive {
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        for (field, value) in non_negative {
            if value < 0.0 {
                return Err(ConfigError::OutOfRange {
                    field,
                    value,
                    min: 0.0,
                    max: f32::INFINITY,
                });
            }
        }
        for (field, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange {
                    field,
                    value,
                    min: 0.0,
                    max: 1.0,
                });
            }
        }

        let max_slope = std::f32::consts::FRAC_PI_2;
        if !(0.0..=max_slope).contains(&self.ground_max_slope) {
            return Err(ConfigError::OutOfRange {
                field: "ground_max_slope",
                value: self.ground_max_slope,
                min: 0.0,
                max: max_slope,
            });
        }
        if self.wall_probe_rays == 0 {
            return Err(ConfigError::NonPositive {
                field: "wall_probe_rays",
                value: 0.0,
            });
        }

        Ok(())
    }

    /// Consume the config, returning it only if it is valid.
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate().map(|()| self)
    }

    /// Builder: set movement parameters.
    pub fn with_movement(mut self, max_speed: f32, acceleration_time: f32) -> Self {
        self.max_ground_speed = max_speed;
        self.acceleration_time = acceleration_time;
        self
    }

    /// Builder: set jump height and gravity multipliers.
    pub fn with_jump(mut self, height: f32, jump_gravity: f32, falling_gravity: f32) -> Self {
        self.jump_height = height;
        self.jump_gravity_multiplier = jump_gravity;
        self.falling_gravity_multiplier = falling_gravity;
        self
    }

    /// Builder: set the number of air jumps.
    pub fn with_air_jumps(mut self, count: u32) -> Self {
        self.air_jumps = count;
        self
    }

    /// Builder: set the jump leap coefficient.
    pub fn with_jump_leap(mut self, leap: f32) -> Self {
        self.jump_leap = leap;
        self
    }

    /// Builder: set ground probe dimensions.
    pub fn with_ground_probe(mut self, distance: f32, skin: f32, radius: f32) -> Self {
        self.ground_probe_distance = distance;
        self.ground_probe_skin = skin;
        self.ground_probe_radius = radius;
        self
    }

    /// Builder: set the steepest walkable slope (radians).
    pub fn with_max_slope(mut self, angle: f32) -> Self {
        self.ground_max_slope = angle;
        self
    }

    /// Builder: set wall probe reach and ray count.
    pub fn with_wall_probe(mut self, distance: f32, rays: u32) -> Self {
        self.wall_probe_distance = distance;
        self.wall_probe_rays = rays;
        self
    }

    /// Builder: set wall jump impulse shape.
    pub fn with_wall_jump(mut self, force: f32, height_penalty: f32) -> Self {
        self.wall_jump_force = force;
        self.wall_jump_height_penalty = height_penalty;
        self
    }

    /// Builder: set wall friction.
    pub fn with_wall_friction(mut self, friction: f32) -> Self {
        self.wall_friction = friction;
        self
    }

    /// Builder: set slam speed.
    pub fn with_slam_speed(mut self, speed: f32) -> Self {
        self.slam_speed = speed;
        self
    }

    /// Builder: set ground adhesion spring parameters.
    pub fn with_spring(mut self, spring: f32, damper: f32) -> Self {
        self.ground_spring = spring;
        self.ground_damper = damper;
        self
    }
}

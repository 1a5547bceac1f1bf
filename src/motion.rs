//! Published motion state.
//!
//! Camera, animation and AI code read [`MotionState`] instead of the
//! controller's working state. It is refreshed once per tick, after
//! depenetration, and nothing the consumers do flows back into the
//! controller.

use bevy::prelude::*;

use crate::config::LocomotionConfig;
use crate::movement::horizontal;
use crate::state::CharacterBody;

/// Read-only snapshot of a character's motion, published after each tick.
#[derive(Component, Reflect, Debug, Clone, Copy, Default, PartialEq)]
#[reflect(Component)]
pub struct MotionState {
    /// Position after the tick.
    pub position: Vec3,
    /// Velocity after the tick.
    pub velocity: Vec3,
    /// Whether the character stands on walkable ground.
    pub grounded: bool,
    /// Ground distance reported by the ground probe. Zero when airborne.
    pub ground_distance: f32,
    /// Horizontal speed relative to the ground, as a fraction (0-1) of the max ground speed.
    pub speed_fraction: f32,
    /// Normal of the wall being touched, if any.
    pub wall_normal: Option<Vec3>,
    /// Whether the character slid or strafed in the air this tick.
    pub sliding: bool,
    /// Whether a ground slam is in progress.
    pub slamming: bool,
}

impl MotionState {
    /// Build a snapshot from the controller's state.
    pub fn capture(body: &CharacterBody, config: &LocomotionConfig) -> Self {
        let relative = horizontal(body.velocity - body.ground_velocity, body.up());
        Self {
            position: body.position,
            velocity: body.velocity,
            grounded: body.grounded,
            ground_distance: body.ground_distance,
            speed_fraction: (relative.length() / config.max_ground_speed).clamp(0.0, 1.0),
            wall_normal: body.wall_normal(),
            sliding: body.sliding,
            slamming: body.slamming,
        }
    }

    /// Whether the character touches a wall.
    pub fn on_wall(&self) -> bool {
        self.wall_normal.is_some()
    }
}

/// Camera shake requested by a character, fired once when a slam lands.
///
/// The controller only emits the value; whoever composes the controller with
/// a camera decides what to do with it.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct CameraShake {
    /// Character that caused the shake.
    pub entity: Entity,
    /// Shake intensity.
    pub intensity: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_fraction_is_relative_to_ground() {
        let config = LocomotionConfig::default();
        let mut body = CharacterBody::new();
        body.grounded = true;
        body.velocity = Vec3::new(9.0, 0.0, 0.0);
        body.ground_velocity = Vec3::new(1.5, 0.0, 0.0);

        let state = MotionState::capture(&body, &config);
        assert!((state.speed_fraction - 0.5).abs() < 1e-5);
    }

    #[test]
    fn speed_fraction_ignores_vertical_and_clamps() {
        let config = LocomotionConfig::default();
        let mut body = CharacterBody::new();
        body.velocity = Vec3::new(0.0, -50.0, 0.0);
        assert_eq!(MotionState::capture(&body, &config).speed_fraction, 0.0);

        body.velocity = Vec3::new(30.0, 0.0, 0.0);
        assert_eq!(MotionState::capture(&body, &config).speed_fraction, 1.0);
    }

    #[test]
    fn wall_contact_published() {
        let config = LocomotionConfig::default();
        let mut body = CharacterBody::new();
        assert!(!MotionState::capture(&body, &config).on_wall());

        body.wall = Some(crate::collision::CollisionData::new(
            0.3,
            Vec3::NEG_Z,
            Vec3::ZERO,
            None,
        ));
        let state = MotionState::capture(&body, &config);
        assert!(state.on_wall());
        assert_eq!(state.wall_normal, Some(Vec3::NEG_Z));
    }
}

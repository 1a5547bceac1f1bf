//! Per-character state.
//!
//! [`CharacterBody`] is the controller's working state. It is created once
//! when a character is spawned and re-derived every fixed tick from fresh
//! probes and the previous tick's values. The marker components are synced
//! from it after the tick for query-based consumers.

use bevy::prelude::*;

use crate::actions::ActionQueue;
use crate::collision::CollisionData;
use crate::config::LocomotionConfig;
use crate::intent::MovementIntent;
use crate::motion::MotionState;

/// The controller's state for one character.
///
/// Spawning it also adds a default [`LocomotionConfig`], [`ActionQueue`],
/// [`MovementIntent`] and [`MotionState`] unless they are given.
///
/// Only the controller systems write to this component. Collaborators that
/// want to observe the character should read [`crate::motion::MotionState`],
/// which is published after the tick has completed.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
#[require(LocomotionConfig, ActionQueue, MovementIntent, MotionState)]
pub struct CharacterBody {
    // === Mirrored Rigid Body State ===
    /// Position of the body, mirrored from the physics backend.
    pub position: Vec3,
    /// Linear velocity of the body, mirrored from the physics backend.
    ///
    /// Velocity changes requested during the tick are added here immediately,
    /// so later steps of the same tick see them.
    pub velocity: Vec3,

    // === Ground State ===
    /// Whether the ground probe found walkable ground this tick.
    pub grounded: bool,
    /// Ground distance reported by the ground probe. Zero when not grounded.
    pub ground_distance: f32,
    /// Velocity of the surface stood on. Zero on static ground or in the air.
    pub ground_velocity: Vec3,

    // === Probe Results (None = nothing found) ===
    /// Accepted ground hit of this tick.
    #[reflect(ignore)]
    pub floor: Option<CollisionData>,
    /// Closest wall hit of this tick. Only probed while airborne and not slamming.
    #[reflect(ignore)]
    pub wall: Option<CollisionData>,

    // === Locomotion State ===
    /// Air jumps left before the next landing.
    pub air_jumps_remaining: u32,
    /// Transient: set by the movement step when strafing in the air or sliding.
    pub sliding: bool,
    /// Persisted until landing.
    pub slamming: bool,
    /// A slide-start action requests one slide tick even if the button was released.
    pub(crate) slide_latched: bool,
    /// Tick of the last jump of any kind.
    pub last_jump_tick: Option<u64>,
    /// Fixed ticks processed for this character.
    pub tick: u64,

    // === Gravity ===
    /// Base gravity affecting this character. "Up" is the opposite direction.
    pub gravity: Vec3,

    // === Force Accumulation ===
    /// Acceleration accumulated this tick.
    pub(crate) pending_force: Vec3,
    /// Velocity change accumulated this tick.
    pub(crate) pending_impulse: Vec3,
    /// Force last handed to the backend, for backends that must subtract it again.
    pub(crate) applied_force: Vec3,
}

impl Default for CharacterBody {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            grounded: false,
            ground_distance: 0.0,
            ground_velocity: Vec3::ZERO,
            floor: None,
            wall: None,
            air_jumps_remaining: 0,
            sliding: false,
            slamming: false,
            slide_latched: false,
            last_jump_tick: None,
            tick: 0,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            pending_force: Vec3::ZERO,
            pending_impulse: Vec3::ZERO,
            applied_force: Vec3::ZERO,
        }
    }
}

impl CharacterBody {
    /// Create a body with default gravity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a body with the full air-jump budget of `config`.
    pub fn for_config(config: &LocomotionConfig) -> Self {
        Self {
            air_jumps_remaining: config.air_jumps,
            ..default()
        }
    }

    /// Create a body with custom gravity.
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    /// Up direction, opposite to gravity. Falls back to +Y for zero gravity.
    pub fn up(&self) -> Vec3 {
        (-self.gravity).try_normalize().unwrap_or(Vec3::Y)
    }

    /// Magnitude of the base gravity.
    pub fn gravity_magnitude(&self) -> f32 {
        self.gravity.length()
    }

    /// Velocity along the up direction.
    pub fn vertical_speed(&self) -> f32 {
        self.velocity.dot(self.up())
    }

    /// Whether the wall probe found a wall this tick.
    pub fn on_wall(&self) -> bool {
        self.wall.is_some()
    }

    /// Normal of the wall touched this tick, if any.
    pub fn wall_normal(&self) -> Option<Vec3> {
        self.wall.map(|wall| wall.normal)
    }

    /// Entity of the ground stood on, if known.
    pub fn ground_entity(&self) -> Option<Entity> {
        self.floor.and_then(|floor| floor.entity)
    }

    /// Fixed ticks since the last jump. `None` if the character never jumped.
    pub fn ticks_since_jump(&self) -> Option<u64> {
        self.last_jump_tick.map(|t| self.tick.saturating_sub(t))
    }

    /// Accumulate an acceleration for this tick.
    pub fn add_force(&mut self, acceleration: Vec3) {
        self.pending_force += acceleration;
    }

    /// Accumulate a velocity change for this tick.
    ///
    /// The mirrored velocity is updated right away.
    pub fn add_impulse(&mut self, velocity_change: Vec3) {
        self.pending_impulse += velocity_change;
        self.velocity += velocity_change;
    }

    /// Acceleration accumulated so far this tick.
    pub fn pending_force(&self) -> Vec3 {
        self.pending_force
    }

    /// Velocity change accumulated so far this tick.
    pub fn pending_impulse(&self) -> Vec3 {
        self.pending_impulse
    }

    /// Reset per-tick state at the start of a tick.
    pub(crate) fn begin_tick(&mut self) {
        self.tick += 1;
        self.pending_force = Vec3::ZERO;
        self.pending_impulse = Vec3::ZERO;
        self.sliding = false;
    }

    /// Take the accumulated force and velocity change, leaving zero behind.
    pub(crate) fn take_pending(&mut self) -> (Vec3, Vec3) {
        let force = std::mem::take(&mut self.pending_force);
        let impulse = std::mem::take(&mut self.pending_impulse);
        (force, impulse)
    }
}

/// Marker component indicating the character is grounded.
///
/// Mutually exclusive with [`Airborne`].
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Grounded;

/// Marker component indicating the character is airborne.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Airborne;

/// Marker component indicating the character is touching a wall while airborne.
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct TouchingWall {
    /// Normal of the wall surface.
    pub normal: Vec3,
}

impl Default for TouchingWall {
    fn default() -> Self {
        Self { normal: Vec3::X }
    }
}

impl TouchingWall {
    /// Create a new wall touch state.
    pub fn new(normal: Vec3) -> Self {
        Self { normal }
    }
}

/// Marker component present on ticks where the character slid or strafed in the air.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Sliding;

/// Marker component present while a ground slam is in progress.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Slamming;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_is_opposite_gravity() {
        let body = CharacterBody::new();
        assert_eq!(body.up(), Vec3::Y);

        let sideways = CharacterBody::new().with_gravity(Vec3::new(-20.0, 0.0, 0.0));
        assert_eq!(sideways.up(), Vec3::X);
        assert!((sideways.gravity_magnitude() - 20.0).abs() < 1e-5);
    }

    #[test]
    fn zero_gravity_falls_back_to_y() {
        let body = CharacterBody::new().with_gravity(Vec3::ZERO);
        assert_eq!(body.up(), Vec3::Y);
    }

    #[test]
    fn for_config_fills_air_jumps() {
        let config = LocomotionConfig::default().with_air_jumps(2);
        assert_eq!(CharacterBody::for_config(&config).air_jumps_remaining, 2);
    }

    #[test]
    fn impulse_updates_mirrored_velocity() {
        let mut body = CharacterBody::new();
        body.velocity = Vec3::new(1.0, -2.0, 0.0);

        body.add_impulse(Vec3::new(0.0, 5.0, 0.0));
        body.add_force(Vec3::new(0.0, -9.81, 0.0));

        assert_eq!(body.velocity, Vec3::new(1.0, 3.0, 0.0));
        assert_eq!(body.pending_impulse(), Vec3::new(0.0, 5.0, 0.0));
        assert_eq!(body.pending_force(), Vec3::new(0.0, -9.81, 0.0));
    }

    #[test]
    fn take_pending_leaves_zero() {
        let mut body = CharacterBody::new();
        body.add_force(Vec3::X);
        body.add_impulse(Vec3::Y);

        let (force, impulse) = body.take_pending();
        assert_eq!(force, Vec3::X);
        assert_eq!(impulse, Vec3::Y);
        assert_eq!(body.pending_force(), Vec3::ZERO);
        assert_eq!(body.pending_impulse(), Vec3::ZERO);
    }

    #[test]
    fn begin_tick_clears_transient_state() {
        let mut body = CharacterBody::new();
        body.sliding = true;
        body.slamming = true;
        body.add_force(Vec3::ONE);

        body.begin_tick();

        assert_eq!(body.tick, 1);
        assert!(!body.sliding);
        assert!(body.slamming, "slamming persists until landing");
        assert_eq!(body.pending_force(), Vec3::ZERO);
    }

    #[test]
    fn ticks_since_jump() {
        let mut body = CharacterBody::new();
        assert_eq!(body.ticks_since_jump(), None);

        body.tick = 10;
        body.last_jump_tick = Some(7);
        assert_eq!(body.ticks_since_jump(), Some(3));
    }

    #[test]
    fn wall_accessors() {
        let mut body = CharacterBody::new();
        assert!(!body.on_wall());
        assert_eq!(body.wall_normal(), None);

        body.wall = Some(CollisionData::new(0.5, Vec3::X, Vec3::ZERO, None));
        assert!(body.on_wall());
        assert_eq!(body.wall_normal(), Some(Vec3::X));
    }

    #[test]
    fn touching_wall_new() {
        let wall = TouchingWall::new(Vec3::NEG_Z);
        assert_eq!(wall.normal, Vec3::NEG_Z);
    }
}

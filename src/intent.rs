//! Movement intent components.
//!
//! Intents represent the desired movement from player input or AI. Input
//! code writes them at frame rate; the controller reads them at its fixed
//! rate and never writes back, except for the internal press-edge tracking.

use bevy::prelude::*;

use crate::actions::{ActionKind, ActionQueue};

/// Press state of a button, tracked across frames.
///
/// `JustPressed` and `JustReleased` last for exactly one frame.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ButtonState {
    #[default]
    Released,
    JustReleased,
    Pressed,
    JustPressed,
}

impl ButtonState {
    /// Advance the state given whether the button is held this frame.
    pub fn next(self, held: bool) -> Self {
        match (self.is_held(), held) {
            (false, true) => ButtonState::JustPressed,
            (true, true) => ButtonState::Pressed,
            (true, false) => ButtonState::JustReleased,
            (false, false) => ButtonState::Released,
        }
    }

    /// Whether the button is down.
    pub fn is_held(self) -> bool {
        matches!(self, ButtonState::Pressed | ButtonState::JustPressed)
    }

    /// Whether the button went down this frame.
    pub fn just_pressed(self) -> bool {
        self == ButtonState::JustPressed
    }

    /// Whether the button went up this frame.
    pub fn just_released(self) -> bool {
        self == ButtonState::JustReleased
    }
}

/// Desired movement for one character.
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use msg_locomotion::prelude::*;
///
/// let mut intent = MovementIntent::new();
///
/// // Stick pushed forward, camera turned a quarter to the left.
/// intent.set_move_axis(Vec2::Y, std::f32::consts::FRAC_PI_2);
/// assert!((intent.direction - Vec3::NEG_X).length() < 1e-5);
///
/// intent.set_jump(true);
/// assert!(intent.jump_held);
/// ```
#[derive(Component, Reflect, Debug, Clone, Default, PartialEq)]
#[reflect(Component)]
pub struct MovementIntent {
    /// World-space horizontal direction, length at most 1.
    pub direction: Vec3,
    /// Whether the jump button is held. Held jump keeps jump gravity while rising.
    pub jump_held: bool,
    /// Whether the slam button is held.
    pub slam_held: bool,
    /// Whether the slide button is held. Holding it on the ground slides.
    pub slide_held: bool,
    pub(crate) jump: ButtonState,
    pub(crate) slam: ButtonState,
    pub(crate) slide: ButtonState,
}

impl MovementIntent {
    /// Create a new empty movement intent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the movement direction from a 2D stick axis and a camera yaw.
    ///
    /// `axis.y` is forward (-Z at zero yaw), `axis.x` is right. The result is
    /// clamped to unit length so diagonals are not faster.
    pub fn set_move_axis(&mut self, axis: Vec2, yaw: f32) {
        let local = Vec3::new(axis.x, 0.0, -axis.y);
        self.direction = (Quat::from_rotation_y(yaw) * local).clamp_length_max(1.0);
    }

    /// Set the world-space movement direction directly, clamped to unit length.
    pub fn set_direction(&mut self, direction: Vec3) {
        self.direction = direction.clamp_length_max(1.0);
    }

    /// Set whether jump is held.
    pub fn set_jump(&mut self, held: bool) {
        self.jump_held = held;
    }

    /// Set whether slam is held.
    pub fn set_slam(&mut self, held: bool) {
        self.slam_held = held;
    }

    /// Set whether slide is held.
    pub fn set_slide(&mut self, held: bool) {
        self.slide_held = held;
    }

    /// Whether the horizontal input exceeds `deadzone`.
    pub fn is_moving(&self, deadzone: f32) -> bool {
        self.direction.length_squared() > deadzone * deadzone
    }

    /// Jump button state as of the last frame update.
    pub fn jump_state(&self) -> ButtonState {
        self.jump
    }

    /// Slam button state as of the last frame update.
    pub fn slam_state(&self) -> ButtonState {
        self.slam
    }

    /// Slide button state as of the last frame update.
    pub fn slide_state(&self) -> ButtonState {
        self.slide
    }

    /// Advance the button states and return the actions whose button went down.
    pub(crate) fn advance_buttons(&mut self) -> impl Iterator<Item = ActionKind> {
        self.jump = self.jump.next(self.jump_held);
        self.slam = self.slam.next(self.slam_held);
        self.slide = self.slide.next(self.slide_held);

        [
            (self.jump, ActionKind::Jump),
            (self.slam, ActionKind::Slam),
            (self.slide, ActionKind::SlideStart),
        ]
        .into_iter()
        .filter(|(state, _)| state.just_pressed())
        .map(|(_, kind)| kind)
    }

    /// Clear all intent.
    pub fn clear(&mut self) {
        self.direction = Vec3::ZERO;
        self.jump_held = false;
        self.slam_held = false;
        self.slide_held = false;
    }
}

/// Frame-rate system: turn button presses into queued actions.
///
/// Only rising edges are queued, so a held button fires once. This system
/// never touches [`crate::state::CharacterBody`].
pub fn queue_requested_actions(mut q: Query<(&mut MovementIntent, &mut ActionQueue)>) {
    for (mut intent, mut queue) in &mut q {
        for kind in intent.advance_buttons() {
            queue.request(kind);
        }
    }
}

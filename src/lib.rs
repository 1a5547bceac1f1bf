//! # `msg_locomotion`
//!
//! A physics-driven 3D character locomotion controller with physics backend abstraction.
//!
//! This crate provides a responsive, tuneable character controller that:
//! - Finds ground with a slope-filtered sphere sweep, with skin hysteresis
//! - Finds walls with a radial ray fan while airborne
//! - Walks, jumps, air-jumps, wall-jumps, slides and ground-slams
//! - Keeps the body on uneven ground with a spring-damper
//! - Pushes the body out of other colliders after each physics step
//! - Abstracts the physics backend for easy swapping (Rapier3D included)
//!
//! ## Architecture
//!
//! The controller drives a dynamic rigid body:
//! 1. Probes read the collision world (ground sweep, wall rays)
//! 2. The state machine turns probe results, intent and queued actions into
//!    one acceleration and one velocity change per tick
//! 3. The physics engine integrates them
//! 4. A depenetration pass corrects any remaining overlap
//! 5. A read-only [`motion::MotionState`] is published for cameras and animation
//!
//! Input is sampled at frame rate and only ever queues actions; see
//! [`actions::ActionQueue`].
//!
//! ## Usage
//!
//! ```rust
//! use bevy::prelude::*;
//! use msg_locomotion::prelude::*;
//!
//! // Create controller components for a player character
//! let config = LocomotionConfig::player();
//! let body = CharacterBody::for_config(&config);
//! let intent = MovementIntent::default();
//!
//! // These can be spawned together with physics components
//! ```

use bevy::prelude::*;

pub mod actions;
pub mod backend;
pub mod collision;
pub mod config;
pub mod depenetration;
pub mod detection;
pub mod intent;
pub mod motion;
pub mod movement;
pub mod state;
pub mod systems;

#[cfg(feature = "rapier3d")]
pub mod rapier;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::actions::{ActionKind, ActionQueue};
    pub use crate::backend::LocomotionBackend;
    pub use crate::collision::{CollisionData, CollisionQuery, Penetration};
    pub use crate::config::{ConfigError, LocomotionConfig};
    pub use crate::intent::{ButtonState, MovementIntent};
    pub use crate::motion::{CameraShake, MotionState};
    pub use crate::state::{Airborne, CharacterBody, Grounded, Slamming, Sliding, TouchingWall};
    pub use crate::{LocomotionPlugin, LocomotionSet};

    #[cfg(feature = "rapier3d")]
    pub use crate::rapier::{Rapier3dBackend, Rapier3dCharacterBundle};
}

/// Phases of the controller tick.
///
/// The first five run chained in `FixedUpdate`; the last two run chained in
/// `FixedPostUpdate`, after the physics step.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocomotionSet {
    /// Mirror the rigid body, clear per-tick state.
    Preparation,
    /// Backend probe systems.
    Sensors,
    /// Ground transitions, then queued actions.
    Actions,
    /// Movement, adhesion spring and gravity.
    Forces,
    /// Hand accumulated forces to the backend.
    FinalApplication,
    /// Backend depenetration systems.
    Depenetration,
    /// Motion snapshot and state markers.
    Publish,
}

/// Main plugin for the locomotion controller.
///
/// This plugin is generic over a physics backend `B` which provides the actual
/// physics operations (probing, force application, etc.).
///
/// # Type Parameters
/// - `B`: The physics backend implementation (e.g., `Rapier3dBackend`)
///
/// # Examples
///
/// With Rapier3D backend. Rapier must step in `FixedUpdate`, where the
/// backend orders it after the controller's force hand-off:
/// ```rust,no_run
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use msg_locomotion::prelude::*;
///
/// App::new()
///     .add_plugins(DefaultPlugins)
///     .insert_resource(TimestepMode::Fixed { dt: 1.0 / 64.0, substeps: 1 })
///     .add_plugins(RapierPhysicsPlugin::<NoUserData>::default().in_fixed_schedule())
///     .add_plugins(LocomotionPlugin::<Rapier3dBackend>::default())
///     .run();
/// ```
pub struct LocomotionPlugin<B: backend::LocomotionBackend> {
    _marker: std::marker::PhantomData<B>,
}

impl<B: backend::LocomotionBackend> Default for LocomotionPlugin<B> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<B: backend::LocomotionBackend> Plugin for LocomotionPlugin<B> {
    fn build(&self, app: &mut App) {
        // Register core types
        app.register_type::<config::LocomotionConfig>();
        app.register_type::<state::CharacterBody>();
        app.register_type::<state::Grounded>();
        app.register_type::<state::Airborne>();
        app.register_type::<state::TouchingWall>();
        app.register_type::<state::Sliding>();
        app.register_type::<state::Slamming>();
        app.register_type::<intent::MovementIntent>();
        app.register_type::<actions::ActionQueue>();
        app.register_type::<motion::MotionState>();

        app.add_event::<motion::CameraShake>();

        // Add the physics backend plugin
        app.add_plugins(B::plugin());

        app.configure_sets(
            FixedUpdate,
            (
                LocomotionSet::Preparation,
                LocomotionSet::Sensors,
                LocomotionSet::Actions,
                LocomotionSet::Forces,
                LocomotionSet::FinalApplication,
            )
                .chain(),
        );
        app.configure_sets(
            FixedPostUpdate,
            (LocomotionSet::Depenetration, LocomotionSet::Publish).chain(),
        );

        // Input runs at frame rate and only queues actions
        app.add_systems(Update, intent::queue_requested_actions);

        app.add_systems(
            FixedUpdate,
            (systems::validate_new_configs, systems::prepare_tick::<B>)
                .chain()
                .in_set(LocomotionSet::Preparation),
        );
        app.add_systems(
            FixedUpdate,
            (
                systems::update_ground_state::<B>,
                systems::execute_actions::<B>,
            )
                .chain()
                .in_set(LocomotionSet::Actions),
        );
        app.add_systems(
            FixedUpdate,
            (
                systems::apply_movement::<B>,
                systems::apply_ground_spring::<B>,
                systems::apply_gravity::<B>,
            )
                .chain()
                .in_set(LocomotionSet::Forces),
        );
        app.add_systems(
            FixedUpdate,
            systems::finalize_forces::<B>.in_set(LocomotionSet::FinalApplication),
        );
        app.add_systems(
            FixedPostUpdate,
            (
                systems::publish_motion_state::<B>,
                systems::sync_state_markers,
            )
                .chain()
                .in_set(LocomotionSet::Publish),
        );
    }
}

//! Ground and wall probes.
//!
//! Probes are pure queries against a [`CollisionQuery`]. They never move the
//! character; the controller systems decide what to do with the results.
//! Backends call [`run_probes`] from their sensor systems.

use std::f32::consts::TAU;

use bevy::prelude::*;

use crate::collision::{CollisionData, CollisionQuery};
use crate::config::LocomotionConfig;
use crate::state::CharacterBody;

/// Sweep a sphere down from above the feet and return the ground stood on.
///
/// The sweep starts `ground_probe_distance` above `position` and travels
/// `ground_probe_distance + skin`, where the skin is only active when
/// `was_grounded` is set. Hits are considered nearest first. A hit is
/// skipped when it belongs to the character (`is_own`), lies more than the
/// skin below the feet, or is steeper than `ground_max_slope`.
///
/// The returned hit carries the ground distance in `distance`: the height of
/// the hit point above the feet plus the skin. It is never negative.
pub fn probe_ground<Q, F>(
    query: &Q,
    position: Vec3,
    up: Vec3,
    was_grounded: bool,
    config: &LocomotionConfig,
    is_own: F,
) -> Option<CollisionData>
where
    Q: CollisionQuery + ?Sized,
    F: Fn(Entity) -> bool,
{
    let skin = config.active_skin(was_grounded);
    let origin = position + up * config.ground_probe_distance;

    let mut hits = query.sphere_cast_all(
        origin,
        config.ground_probe_radius,
        -up,
        config.ground_probe_distance + skin,
    );
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    hits.into_iter().find_map(|hit| {
        if hit.entity.is_some_and(&is_own) {
            return None;
        }

        // Contacts left inside the depenetration tolerance count as touching.
        let ground_distance = (hit.point - position).dot(up) + skin;
        if ground_distance < -config.depenetration_epsilon {
            return None;
        }

        if hit.slope_angle(up) > config.ground_max_slope {
            return None;
        }

        Some(CollisionData {
            distance: ground_distance.max(0.0),
            ..hit
        })
    })
}

/// Cast a horizontal fan of rays and return the closest wall.
///
/// `wall_probe_rays` rays are spread evenly over a full circle around `up`,
/// starting `wall_probe_height` above `position`.
pub fn probe_wall<Q, F>(
    query: &Q,
    position: Vec3,
    up: Vec3,
    config: &LocomotionConfig,
    is_own: F,
) -> Option<CollisionData>
where
    Q: CollisionQuery + ?Sized,
    F: Fn(Entity) -> bool,
{
    let origin = position + up * config.wall_probe_height;
    let (a, b) = up.any_orthonormal_pair();
    let rays = config.wall_probe_rays.max(1);

    (0..rays)
        .filter_map(|i| {
            let angle = TAU * i as f32 / rays as f32;
            let direction = a * angle.cos() + b * angle.sin();
            query.raycast(origin, direction, config.wall_probe_distance)
        })
        .filter(|hit| !hit.entity.is_some_and(&is_own))
        .min_by(|x, y| x.distance.total_cmp(&y.distance))
}

/// Upward acceleration that slows a fall along a wall.
///
/// Proportional to the downward speed. Zero while rising.
pub fn wall_friction_force(velocity: Vec3, up: Vec3, friction: f32) -> Vec3 {
    let vertical = velocity.dot(up);
    if vertical < 0.0 {
        up * (-vertical * friction)
    } else {
        Vec3::ZERO
    }
}

/// Run both probes for one character and store the results in its body.
///
/// The wall probe only runs when no ground was found and the character is
/// not slamming.
pub fn run_probes<Q, F>(query: &Q, body: &mut CharacterBody, config: &LocomotionConfig, is_own: F)
where
    Q: CollisionQuery + ?Sized,
    F: Fn(Entity) -> bool,
{
    let up = body.up();

    body.floor = probe_ground(query, body.position, up, body.grounded, config, &is_own);

    body.wall = if body.floor.is_none() && !body.slamming {
        probe_wall(query, body.position, up, config, &is_own)
    } else {
        None
    };
}

#[cfg(test)]
mod tests {
    use bevy::math::bounding::Aabb3d;

    use super::*;
    use crate::collision::Penetration;

    /// Canned world: fixed sphere-cast hits and a set of walls as (normal, distance).
    #[derive(Default)]
    struct Canned {
        sweep: Vec<CollisionData>,
        walls: Vec<(Vec3, f32, Option<Entity>)>,
    }

    impl CollisionQuery for Canned {
        fn sphere_cast_all(&self, _: Vec3, _: f32, _: Vec3, max: f32) -> Vec<CollisionData> {
            self.sweep
                .iter()
                .copied()
                .filter(|hit| hit.distance <= max)
                .collect()
        }

        fn raycast(&self, origin: Vec3, direction: Vec3, max: f32) -> Option<CollisionData> {
            // Each wall is an infinite plane facing `normal`, `distance` away.
            self.walls
                .iter()
                .filter_map(|&(normal, distance, entity)| {
                    let approach = -direction.dot(normal);
                    if approach <= 1e-4 {
                        return None;
                    }
                    let t = distance / approach;
                    (t <= max).then(|| {
                        CollisionData::new(t, normal, origin + direction * t, entity)
                    })
                })
                .min_by(|a, b| a.distance.total_cmp(&b.distance))
        }

        fn overlapping(&self, _: &Aabb3d) -> Vec<Entity> {
            Vec::new()
        }

        fn penetration(&self, _: Entity, _: Entity) -> Option<Penetration> {
            None
        }
    }

    fn ground_hit(sweep_distance: f32, height: f32, normal: Vec3) -> CollisionData {
        CollisionData::new(sweep_distance, normal, Vec3::new(0.0, height, 0.0), None)
    }

    fn not_own(_: Entity) -> bool {
        false
    }

    #[test]
    fn ground_at_feet_is_grounded() {
        let config = LocomotionConfig::default();
        let world = Canned {
            sweep: vec![ground_hit(0.6, 0.0, Vec3::Y)],
            ..default()
        };

        let hit = probe_ground(&world, Vec3::ZERO, Vec3::Y, false, &config, not_own)
            .expect("ground at the feet");
        assert!(hit.distance.abs() < 1e-6);

        let hit = probe_ground(&world, Vec3::ZERO, Vec3::Y, true, &config, not_own)
            .expect("ground at the feet");
        assert!((hit.distance - config.ground_probe_skin).abs() < 1e-6);
    }

    #[test]
    fn skin_gives_hysteresis() {
        let config = LocomotionConfig::default();
        // Ground 5cm below the feet.
        let world = Canned {
            sweep: vec![ground_hit(0.65, -0.05, Vec3::Y)],
            ..default()
        };

        assert!(probe_ground(&world, Vec3::ZERO, Vec3::Y, false, &config, not_own).is_none());

        let hit = probe_ground(&world, Vec3::ZERO, Vec3::Y, true, &config, not_own)
            .expect("within skin");
        assert!((hit.distance - 0.05).abs() < 1e-5);
    }

    #[test]
    fn nearest_walkable_hit_wins() {
        let config = LocomotionConfig::default();
        let steep = Vec3::new(1.0, 0.5, 0.0).normalize();
        let far = Entity::from_raw(2);
        let near = Entity::from_raw(1);

        let world = Canned {
            sweep: vec![
                ground_hit(0.7, 0.1, Vec3::Y).with_velocity(Vec3::X),
                CollisionData::new(0.3, steep, Vec3::new(0.0, 0.4, 0.0), None),
                CollisionData::new(0.5, Vec3::Y, Vec3::new(0.0, 0.2, 0.0), Some(near)),
                CollisionData::new(0.9, Vec3::Y, Vec3::ZERO, Some(far)),
            ],
            ..default()
        };

        let hit = probe_ground(&world, Vec3::ZERO, Vec3::Y, false, &config, not_own)
            .expect("walkable ground");
        assert_eq!(hit.entity, Some(near));
        assert!((hit.distance - 0.2).abs() < 1e-5);
    }

    #[test]
    fn steep_slope_rejected() {
        let config = LocomotionConfig::default();
        let fifty_degrees = 50.0_f32.to_radians();
        let normal = Vec3::new(fifty_degrees.sin(), fifty_degrees.cos(), 0.0);
        let world = Canned {
            sweep: vec![ground_hit(0.6, 0.0, normal)],
            ..default()
        };

        assert!(probe_ground(&world, Vec3::ZERO, Vec3::Y, true, &config, not_own).is_none());

        let forty_degrees = 40.0_f32.to_radians();
        let normal = Vec3::new(forty_degrees.sin(), forty_degrees.cos(), 0.0);
        let world = Canned {
            sweep: vec![ground_hit(0.6, 0.0, normal)],
            ..default()
        };
        assert!(probe_ground(&world, Vec3::ZERO, Vec3::Y, true, &config, not_own).is_some());
    }

    #[test]
    fn own_colliders_skipped() {
        let config = LocomotionConfig::default();
        let me = Entity::from_raw(7);
        let world = Canned {
            sweep: vec![
                CollisionData::new(0.1, Vec3::Y, Vec3::new(0.0, 0.5, 0.0), Some(me)),
                ground_hit(0.6, 0.0, Vec3::Y),
            ],
            ..default()
        };

        let hit = probe_ground(&world, Vec3::ZERO, Vec3::Y, false, &config, |e| e == me)
            .expect("ground under own collider");
        assert_eq!(hit.entity, None);
        assert!(hit.distance.abs() < 1e-6);
    }

    #[test]
    fn moving_platform_velocity_carried() {
        let config = LocomotionConfig::default();
        let world = Canned {
            sweep: vec![ground_hit(0.6, 0.0, Vec3::Y).with_velocity(Vec3::new(3.0, 0.0, 0.0))],
            ..default()
        };

        let hit = probe_ground(&world, Vec3::ZERO, Vec3::Y, false, &config, not_own).unwrap();
        assert_eq!(hit.velocity, Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn closest_wall_wins() {
        let config = LocomotionConfig::default();
        let world = Canned {
            walls: vec![(Vec3::NEG_X, 0.6, None), (Vec3::Z, 0.3, None)],
            ..default()
        };

        let hit = probe_wall(&world, Vec3::ZERO, Vec3::Y, &config, not_own).expect("wall");
        assert_eq!(hit.normal, Vec3::Z);
        assert!((hit.distance - 0.3).abs() < 1e-3);
    }

    #[test]
    fn wall_out_of_reach() {
        let config = LocomotionConfig::default();
        let world = Canned {
            walls: vec![(Vec3::NEG_X, config.wall_probe_distance + 0.5, None)],
            ..default()
        };

        assert!(probe_wall(&world, Vec3::ZERO, Vec3::Y, &config, not_own).is_none());
    }

    #[test]
    fn wall_friction_only_when_falling() {
        let falling = wall_friction_force(Vec3::new(2.0, -4.0, 0.0), Vec3::Y, 10.0);
        assert_eq!(falling, Vec3::new(0.0, 40.0, 0.0));

        let rising = wall_friction_force(Vec3::new(0.0, 4.0, 0.0), Vec3::Y, 10.0);
        assert_eq!(rising, Vec3::ZERO);
    }

    #[test]
    fn wall_probe_skipped_when_grounded_or_slamming() {
        let config = LocomotionConfig::default();
        let wall = (Vec3::NEG_X, 0.5, None);

        let grounded_world = Canned {
            sweep: vec![ground_hit(0.6, 0.0, Vec3::Y)],
            walls: vec![wall],
        };
        let mut body = CharacterBody::new();
        run_probes(&grounded_world, &mut body, &config, not_own);
        assert!(body.floor.is_some());
        assert!(body.wall.is_none());

        let air_world = Canned {
            walls: vec![wall],
            ..default()
        };
        let mut body = CharacterBody::new();
        run_probes(&air_world, &mut body, &config, not_own);
        assert!(body.floor.is_none());
        assert!(body.wall.is_some());

        body.slamming = true;
        run_probes(&air_world, &mut body, &config, not_own);
        assert!(body.wall.is_none());
    }
}

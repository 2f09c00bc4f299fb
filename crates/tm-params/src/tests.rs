//! Unit tests for the parameter store.

use tm_core::{ActorId, RoadOption, Vec3};

use crate::ParameterStore;

const V: ActorId = ActorId(42);

#[test]
fn target_velocity_from_percentage() {
    let params = ParameterStore::new();
    // 30% below a 20 m/s limit.
    params.set_percentage_speed_difference(V, 30.0);
    assert!((params.vehicle_target_velocity(V, 20.0) - 14.0).abs() < 1e-5);

    // Negative percentage exceeds the limit.
    params.set_percentage_speed_difference(V, -10.0);
    assert!((params.vehicle_target_velocity(V, 20.0) - 22.0).abs() < 1e-5);
}

#[test]
fn exact_speed_overrides_percentage() {
    let params = ParameterStore::new();
    params.set_percentage_speed_difference(V, 50.0);
    params.set_desired_speed(V, 7.5);
    assert_eq!(params.vehicle_target_velocity(V, 20.0), 7.5);
}

#[test]
fn global_percentage_applies_to_unconfigured_vehicles() {
    let params = ParameterStore::new();
    params.set_global_percentage_speed_difference(50.0);
    assert!((params.vehicle_target_velocity(ActorId(1), 10.0) - 5.0).abs() < 1e-5);
}

#[test]
fn setter_idempotence() {
    let params = ParameterStore::new();
    params.set_distance_to_leading_vehicle(V, 6.0);
    params.set_distance_to_leading_vehicle(V, 6.0);
    assert_eq!(params.distance_to_leading_vehicle(V), 6.0);

    params.set_collision_detection(V, ActorId(9), false);
    params.set_collision_detection(V, ActorId(9), false);
    assert!(params.collision_ignored(V, ActorId(9)));
    params.set_collision_detection(V, ActorId(9), true);
    assert!(!params.collision_ignored(V, ActorId(9)));
}

#[test]
fn force_lane_change_is_one_shot() {
    let params = ParameterStore::new();
    params.set_force_lane_change(V, true);
    let info = params.take_force_lane_change(V).unwrap();
    assert!(info.direction_left);
    assert!(params.take_force_lane_change(V).is_none());
}

#[test]
fn keep_right_disabled_by_default() {
    let params = ParameterStore::new();
    assert!(params.keep_right_percentage(V) < 0.0);
    params.set_keep_right_percentage(V, 80.0);
    assert_eq!(params.keep_right_percentage(V), 80.0);
}

#[test]
fn respawn_boundaries_clamped() {
    let params = ParameterStore::new();
    params.set_respawn_boundaries(5.0, 10_000.0);
    let (lower, upper) = params.respawn_boundaries();
    assert_eq!(lower, 25.0);
    assert_eq!(upper, 700.0);

    // Inverted request collapses to lower == upper.
    params.set_respawn_boundaries(100.0, 30.0);
    let (lower, upper) = params.respawn_boundaries();
    assert!(lower <= upper);
}

#[test]
fn uploaded_path_take_semantics() {
    let params = ParameterStore::new();
    params.upload_path(V, vec![Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)], true);
    assert!(params.has_upload_path(V));
    let path = params.take_upload_path(V).unwrap();
    assert_eq!(path.points.len(), 2);
    assert!(path.empty_buffer);
    assert!(!params.has_upload_path(V));
}

#[test]
fn uploaded_route_take_semantics() {
    let params = ParameterStore::new();
    params.upload_route(V, vec![RoadOption::Left, RoadOption::Straight], false);
    let route = params.take_upload_route(V).unwrap();
    assert_eq!(route.options, vec![RoadOption::Left, RoadOption::Straight]);
    assert!(params.take_upload_route(V).is_none());
}

#[test]
fn remove_actor_purges_everything() {
    let params = ParameterStore::new();
    params.set_percentage_speed_difference(V, 10.0);
    params.set_collision_detection(ActorId(1), V, false);
    params.set_collision_detection(V, ActorId(1), false);
    params.upload_path(V, vec![Vec3::ZERO], false);
    params.set_update_vehicle_lights(V, true);

    params.remove_actor(V);

    assert_eq!(params.vehicle_target_velocity(V, 10.0), 10.0);
    assert!(!params.collision_ignored(V, ActorId(1)));
    assert!(!params.collision_ignored(ActorId(1), V));
    assert!(!params.has_upload_path(V));
    assert!(!params.update_vehicle_lights(V));
}

#[test]
fn setters_safe_across_threads() {
    use std::sync::Arc;

    let params = Arc::new(ParameterStore::new());
    let mut handles = Vec::new();
    for t in 0..4u64 {
        let p = Arc::clone(&params);
        handles.push(std::thread::spawn(move || {
            for i in 0..100u64 {
                let actor = ActorId(t * 1000 + i);
                p.set_percentage_speed_difference(actor, i as f32);
                let _ = p.vehicle_target_velocity(actor, 20.0);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert!((params.vehicle_target_velocity(ActorId(3099), 20.0) - 20.0 * (1.0 - 0.99)).abs() < 1e-4);
}

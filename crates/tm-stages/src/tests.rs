//! Unit tests for the pipeline stages.
//!
//! Scenarios run on small procedural maps: a straight single-lane road and
//! a straight road interrupted by a junction span.

use tm_core::{
    ActorId, ActorKind, ActorRng, ActorSnapshot, Command, GeoGridId, JunctionId, Rotation,
    RoadId, Timestamp, TrafficLightColor, Transform, Vec3, WorldSnapshot,
};
use tm_graph::{MapDescription, RoadGraph};
use tm_params::ParameterStore;
use tm_state::{
    Buffer, BufferMap, KinematicState, OccupancyTracker, SimulationState, StaticAttributes,
    TrafficLightInfo,
};

use crate::frames::{CollisionHazardData, LocalizationData};
use crate::{
    CollisionStage, LifecycleStage, LocalizationStage, MotionPlanStage, TrafficLightStage,
    VehicleLightStage,
};

const V1: ActorId = ActorId(1);
const V2: ActorId = ActorId(2);

fn straight_graph(length: f32) -> RoadGraph {
    let mut desc = MapDescription::new("test-straight");
    desc.add_straight_segment(RoadId(1), 1, Vec3::ZERO, 0.0, length, 5.0);
    RoadGraph::build(&desc).unwrap()
}

/// Approach road, a 20 m junction span, and an exit road.
fn junction_graph() -> RoadGraph {
    let mut desc = MapDescription::new("test-junction");
    let approach = desc.add_straight_segment(RoadId(1), 1, Vec3::ZERO, 0.0, 45.0, 5.0);
    let span = desc.add_straight_segment(RoadId(2), 1, Vec3::new(50.0, 0.0, 0.0), 0.0, 20.0, 5.0);
    let exit = desc.add_straight_segment(RoadId(3), 1, Vec3::new(75.0, 0.0, 0.0), 0.0, 75.0, 5.0);
    desc.segments[span.index()].is_junction = true;
    desc.segments[span.index()].junction_id = JunctionId(7);
    desc.connections.push((approach, span));
    desc.connections.push((span, exit));
    RoadGraph::build(&desc).unwrap()
}

fn add_vehicle(state: &mut SimulationState, id: ActorId, location: Vec3, velocity: Vec3) {
    state.add_actor(
        id,
        KinematicState {
            location,
            rotation: Rotation::from_yaw(0.0),
            velocity,
            speed_limit: 13.9,
            physics_enabled: true,
            is_dormant: false,
            hybrid_end_location: location,
        },
        StaticAttributes {
            kind: ActorKind::Vehicle,
            half_length: 2.3,
            half_width: 1.0,
            half_height: 0.8,
        },
        TrafficLightInfo::default(),
    );
}

/// All waypoints with `x >= from_x`, ordered by x.
fn seed_buffer(graph: &RoadGraph, from_x: f32) -> Buffer {
    let mut wps: Vec<_> = graph.iter().filter(|w| w.location().x >= from_x).collect();
    wps.sort_by(|a, b| a.location().x.total_cmp(&b.location().x));
    wps.iter().map(|w| w.id).collect()
}

fn stamp(frame: u64, elapsed_seconds: f64) -> Timestamp {
    Timestamp { frame, elapsed_seconds }
}

mod geometry {
    use crate::geometry::{polygon_distance, polygons_overlap};
    use tm_core::Vec3;

    fn square(x0: f32, y0: f32, side: f32) -> Vec<Vec3> {
        vec![
            Vec3::new(x0, y0, 0.0),
            Vec3::new(x0 + side, y0, 0.0),
            Vec3::new(x0 + side, y0 + side, 0.0),
            Vec3::new(x0, y0 + side, 0.0),
        ]
    }

    #[test]
    fn separated_squares() {
        let a = square(0.0, 0.0, 2.0);
        let b = square(10.0, 0.0, 2.0);
        assert!(!polygons_overlap(&a, &b));
        assert!((polygon_distance(&a, &b) - 8.0).abs() < 1e-4);
    }

    #[test]
    fn overlapping_squares_have_zero_distance() {
        let a = square(0.0, 0.0, 4.0);
        let b = square(2.0, 2.0, 4.0);
        assert!(polygons_overlap(&a, &b));
        assert_eq!(polygon_distance(&a, &b), 0.0);
    }

    #[test]
    fn containment_counts_as_overlap() {
        let outer = square(0.0, 0.0, 10.0);
        let inner = square(4.0, 4.0, 1.0);
        assert!(polygons_overlap(&outer, &inner));
        assert_eq!(polygon_distance(&inner, &outer), 0.0);
    }
}

mod pid {
    use crate::pid::{run_step, StateEntry};
    use tm_core::constants::pid::{
        LATERAL, LONGITUDINAL, MAX_BRAKE, MAX_STEERING_DIFF, MAX_THROTTLE,
    };

    #[test]
    fn throttle_clamped_at_maximum() {
        let current = StateEntry { angular_deviation: 0.0, velocity_deviation: 1.0, steer: 0.0 };
        let signal = run_step(current, StateEntry::default(), LONGITUDINAL, LATERAL);
        assert_eq!(signal.throttle, MAX_THROTTLE);
        assert_eq!(signal.brake, 0.0);
    }

    #[test]
    fn braking_on_overspeed() {
        let current = StateEntry { angular_deviation: 0.0, velocity_deviation: -1.0, steer: 0.0 };
        let signal = run_step(current, StateEntry::default(), LONGITUDINAL, LATERAL);
        assert_eq!(signal.throttle, 0.0);
        assert_eq!(signal.brake, MAX_BRAKE);
    }

    #[test]
    fn steering_is_slew_limited() {
        let current = StateEntry { angular_deviation: 1.0, velocity_deviation: 0.0, steer: 0.0 };
        let signal = run_step(current, StateEntry::default(), LONGITUDINAL, LATERAL);
        // Raw lateral output far exceeds the per-tick slew allowance.
        assert!((signal.steer - MAX_STEERING_DIFF).abs() < 1e-6);
    }
}

mod localization {
    use super::*;

    #[test]
    fn pops_passed_waypoints() {
        let graph = straight_graph(150.0);
        let mut state = SimulationState::new();
        add_vehicle(&mut state, V1, Vec3::new(18.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0));
        let params = ParameterStore::new();
        let mut buffers = BufferMap::default();
        buffers.insert(V1, seed_buffer(&graph, 0.0));
        let mut occupancy = OccupancyTracker::new();
        let mut rng = ActorRng::new(42, V1);
        let mut marked = Vec::new();
        let mut output = LocalizationData::default();

        let mut stage = LocalizationStage::new();
        stage.update(
            V1, &graph, &state, &params, &mut buffers, &mut occupancy, &mut rng, &mut marked,
            &mut output,
        );

        let buffer = &buffers[&V1];
        let front = graph.get(*buffer.front().unwrap()).unwrap();
        assert!(front.location().x > 18.0, "front must be ahead of the vehicle");
        assert!(buffer.len() > 1, "buffer must cover the horizon");
        assert!(!output.is_at_junction_entrance);
        assert!(marked.is_empty());
    }

    #[test]
    fn reseeds_empty_buffer_from_nearest_waypoint() {
        let graph = straight_graph(150.0);
        let mut state = SimulationState::new();
        add_vehicle(&mut state, V1, Vec3::new(33.0, 0.0, 0.0), Vec3::ZERO);
        let params = ParameterStore::new();
        let mut buffers = BufferMap::default();
        let mut occupancy = OccupancyTracker::new();
        let mut rng = ActorRng::new(42, V1);
        let mut marked = Vec::new();
        let mut output = LocalizationData::default();

        let mut stage = LocalizationStage::new();
        stage.update(
            V1, &graph, &state, &params, &mut buffers, &mut occupancy, &mut rng, &mut marked,
            &mut output,
        );

        let buffer = &buffers[&V1];
        assert!(!buffer.is_empty());
        let front = graph.get(*buffer.front().unwrap()).unwrap();
        assert!((front.location().x - 33.0).abs() <= 5.0);
    }

    #[test]
    fn dead_end_marks_vehicle_for_removal() {
        let graph = straight_graph(150.0);
        let mut state = SimulationState::new();
        add_vehicle(&mut state, V1, Vec3::new(148.0, 0.0, 0.0), Vec3::ZERO);
        let params = ParameterStore::new();
        let mut buffers = BufferMap::default();
        let mut occupancy = OccupancyTracker::new();
        let mut rng = ActorRng::new(42, V1);
        let mut marked = Vec::new();
        let mut output = LocalizationData::default();

        let mut stage = LocalizationStage::new();
        stage.update(
            V1, &graph, &state, &params, &mut buffers, &mut occupancy, &mut rng, &mut marked,
            &mut output,
        );

        assert_eq!(marked, vec![V1]);
    }

    #[test]
    fn junction_entrance_reports_safe_space() {
        let graph = junction_graph();
        let mut state = SimulationState::new();
        add_vehicle(&mut state, V1, Vec3::new(42.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0));
        let params = ParameterStore::new();
        let mut buffers = BufferMap::default();
        buffers.insert(V1, seed_buffer(&graph, 40.0));
        let mut occupancy = OccupancyTracker::new();
        let mut rng = ActorRng::new(42, V1);
        let mut marked = Vec::new();
        let mut output = LocalizationData::default();

        let mut stage = LocalizationStage::new();
        stage.update(
            V1, &graph, &state, &params, &mut buffers, &mut occupancy, &mut rng, &mut marked,
            &mut output,
        );

        assert!(output.is_at_junction_entrance);
        let end = graph.get(output.junction_end.unwrap()).unwrap();
        let safe = graph.get(output.safe_point.unwrap()).unwrap();
        assert!(!end.is_junction);
        assert!(end.location().x >= 75.0);
        assert!(safe.location().x > end.location().x);
    }
}

mod collision {
    use super::*;

    fn two_vehicle_setup() -> (RoadGraph, SimulationState, BufferMap, OccupancyTracker) {
        let graph = straight_graph(150.0);
        let mut state = SimulationState::new();
        add_vehicle(&mut state, V1, Vec3::new(20.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0));
        add_vehicle(&mut state, V2, Vec3::new(30.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0));
        let mut buffers = BufferMap::default();
        buffers.insert(V1, seed_buffer(&graph, 20.0));
        buffers.insert(V2, seed_buffer(&graph, 30.0));
        let mut occupancy = OccupancyTracker::new();
        occupancy.update_grid_position(V1, [GeoGridId(1)]);
        occupancy.update_grid_position(V2, [GeoGridId(1)]);
        (graph, state, buffers, occupancy)
    }

    #[test]
    fn follower_yields_leader_does_not() {
        let (graph, state, buffers, occupancy) = two_vehicle_setup();
        let params = ParameterStore::new();
        let mut stage = CollisionStage::new();
        let mut output = CollisionHazardData::default();

        stage.begin_tick();
        let mut rng = ActorRng::new(42, V1);
        stage.update(V1, &graph, &state, &params, &buffers, &occupancy, &mut rng, &mut output);
        assert!(output.hazard);
        assert_eq!(output.hazard_actor, V2);
        assert!(output.available_distance_margin > 0.0);
        assert!(output.available_distance_margin.is_finite());

        stage.begin_tick();
        let mut rng = ActorRng::new(42, V2);
        stage.update(V2, &graph, &state, &params, &buffers, &occupancy, &mut rng, &mut output);
        assert!(!output.hazard, "the leader must not yield to its follower");
    }

    #[test]
    fn ignored_pair_produces_no_hazard() {
        let (graph, state, buffers, occupancy) = two_vehicle_setup();
        let params = ParameterStore::new();
        params.set_collision_detection(V1, V2, false);
        let mut stage = CollisionStage::new();
        let mut output = CollisionHazardData::default();

        stage.begin_tick();
        let mut rng = ActorRng::new(42, V1);
        stage.update(V1, &graph, &state, &params, &buffers, &occupancy, &mut rng, &mut output);
        assert!(!output.hazard);
    }
}

mod traffic_light {
    use super::*;

    #[test]
    fn red_light_is_a_hazard() {
        let graph = straight_graph(150.0);
        let mut state = SimulationState::new();
        add_vehicle(&mut state, V1, Vec3::new(20.0, 0.0, 0.0), Vec3::ZERO);
        state.update_traffic_light(
            V1,
            TrafficLightInfo { at_traffic_light: true, state: TrafficLightColor::Red },
        );
        let params = ParameterStore::new();
        let buffers = BufferMap::default();
        let mut rng = ActorRng::new(42, V1);

        let mut stage = TrafficLightStage::new();
        let hazard =
            stage.update(V1, &graph, &state, &params, &buffers, &mut rng, stamp(1, 1.0));
        assert!(hazard);
    }

    #[test]
    fn junction_queue_is_first_come_first_served() {
        let graph = junction_graph();
        let mut state = SimulationState::new();
        add_vehicle(&mut state, V1, Vec3::new(42.0, 0.0, 0.0), Vec3::ZERO);
        add_vehicle(&mut state, V2, Vec3::new(38.0, 0.0, 0.0), Vec3::ZERO);
        let params = ParameterStore::new();
        let mut buffers = BufferMap::default();
        buffers.insert(V1, seed_buffer(&graph, 45.0));
        buffers.insert(V2, seed_buffer(&graph, 45.0));
        let mut rng1 = ActorRng::new(42, V1);
        let mut rng2 = ActorRng::new(42, V2);

        let mut stage = TrafficLightStage::new();

        // Arrival: both book a slot and hold.
        assert!(stage.update(V1, &graph, &state, &params, &buffers, &mut rng1, stamp(1, 1.0)));
        assert!(stage.update(V2, &graph, &state, &params, &buffers, &mut rng2, stamp(1, 1.0)));

        // Stop clocks start on the next tick.
        assert!(stage.update(V1, &graph, &state, &params, &buffers, &mut rng1, stamp(2, 1.1)));
        assert!(stage.update(V2, &graph, &state, &params, &buffers, &mut rng2, stamp(2, 1.1)));

        // After the dwell only the queue front may proceed.
        assert!(!stage.update(V1, &graph, &state, &params, &buffers, &mut rng1, stamp(3, 4.0)));
        assert!(stage.update(V2, &graph, &state, &params, &buffers, &mut rng2, stamp(3, 4.0)));

        // V1 crosses; its slot is released and V2 moves to the front.
        buffers.insert(V1, seed_buffer(&graph, 80.0));
        assert!(!stage.update(V1, &graph, &state, &params, &buffers, &mut rng1, stamp(4, 4.1)));
        assert!(!stage.update(V2, &graph, &state, &params, &buffers, &mut rng2, stamp(4, 4.1)));
    }
}

mod motion {
    use super::*;

    #[test]
    fn signal_hazard_forces_emergency_brake() {
        let graph = straight_graph(150.0);
        let mut state = SimulationState::new();
        add_vehicle(&mut state, V1, Vec3::new(20.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0));
        let params = ParameterStore::new();
        let mut buffers = BufferMap::default();
        buffers.insert(V1, seed_buffer(&graph, 20.0));
        let mut occupancy = OccupancyTracker::new();
        let mut rng = ActorRng::new(42, V1);

        let mut stage = MotionPlanStage::new();
        let command = stage.update(
            V1,
            &graph,
            &mut state,
            &params,
            &buffers,
            &mut occupancy,
            &mut rng,
            stamp(1, 1.0),
            Vec3::ZERO,
            &LocalizationData::default(),
            &CollisionHazardData::default(),
            true,
        );

        match command {
            Some(Command::ApplyVehicleControl { actor, control }) => {
                assert_eq!(actor, V1);
                assert_eq!(control.brake, 1.0);
                assert_eq!(control.throttle, 0.0);
            }
            other => panic!("expected a control command, got {other:?}"),
        }
    }

    #[test]
    fn hybrid_vehicle_teleports_along_buffer() {
        let graph = straight_graph(150.0);
        let mut state = SimulationState::new();
        add_vehicle(&mut state, V1, Vec3::new(20.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0));
        state.set_physics_enabled(V1, false);
        let params = ParameterStore::new();
        params.set_synchronous_mode(true);
        let mut buffers = BufferMap::default();
        buffers.insert(V1, seed_buffer(&graph, 20.0));
        let mut occupancy = OccupancyTracker::new();
        let mut rng = ActorRng::new(42, V1);

        let mut stage = MotionPlanStage::new();
        let command = stage.update(
            V1,
            &graph,
            &mut state,
            &params,
            &buffers,
            &mut occupancy,
            &mut rng,
            stamp(1, 1.0),
            Vec3::ZERO,
            &LocalizationData::default(),
            &CollisionHazardData::default(),
            false,
        );

        match command {
            Some(Command::ApplyTransform { actor, transform }) => {
                assert_eq!(actor, V1);
                assert!(transform.location.x > 20.0, "teleport must advance the vehicle");
            }
            other => panic!("expected a teleport command, got {other:?}"),
        }
        assert!(state.hybrid_end_location(V1).x > 20.0);
    }
}

mod lifecycle {
    use super::*;

    fn run_update(
        stage: &mut LifecycleStage,
        snapshot: &WorldSnapshot,
        registered: &[ActorId],
        graph: &RoadGraph,
        state: &mut SimulationState,
        buffers: &mut BufferMap,
        occupancy: &mut OccupancyTracker,
    ) -> crate::LifecycleOutcome {
        let params = ParameterStore::new();
        let mut marked = Vec::new();
        stage.update(snapshot, registered, graph, state, &params, buffers, occupancy, &mut marked)
    }

    fn vehicle_at(id: ActorId, x: f32, speed: f32) -> ActorSnapshot {
        ActorSnapshot::vehicle(
            id,
            Transform::new(Vec3::new(x, 0.0, 0.0), Rotation::from_yaw(0.0)),
            Vec3::new(speed, 0.0, 0.0),
        )
    }

    #[test]
    fn tracks_registered_and_unregistered_actors() {
        let graph = straight_graph(150.0);
        let mut state = SimulationState::new();
        let mut buffers = BufferMap::default();
        let mut occupancy = OccupancyTracker::new();
        let mut stage = LifecycleStage::new();

        let snapshot = WorldSnapshot {
            timestamp: stamp(1, 1.0),
            actors: vec![vehicle_at(V1, 10.0, 3.0), vehicle_at(V2, 30.0, 0.0)],
        };
        let outcome = run_update(
            &mut stage, &snapshot, &[V1], &graph, &mut state, &mut buffers, &mut occupancy,
        );
        assert!(outcome.removed.is_empty());
        assert!(state.contains(V1));
        assert!(state.contains(V2), "unregistered actors are tracked too");
        assert!(occupancy.references(V2), "unregistered actors occupy the road");

        // Both disappear from the world.
        let empty = WorldSnapshot { timestamp: stamp(2, 1.1), actors: Vec::new() };
        let outcome = run_update(
            &mut stage, &empty, &[V1], &graph, &mut state, &mut buffers, &mut occupancy,
        );
        assert_eq!(outcome.removed, vec![V1]);
        assert!(!state.contains(V1));
        assert!(!state.contains(V2));
        assert!(!occupancy.references(V1));
        assert!(!occupancy.references(V2));
    }

    #[test]
    fn stuck_vehicle_is_destroyed() {
        let graph = straight_graph(150.0);
        let mut state = SimulationState::new();
        let mut buffers = BufferMap::default();
        let mut occupancy = OccupancyTracker::new();
        let mut stage = LifecycleStage::new();

        let parked = |t: f64, frame: u64| WorldSnapshot {
            timestamp: stamp(frame, t),
            actors: vec![vehicle_at(V1, 10.0, 0.0)],
        };

        run_update(&mut stage, &parked(1.0, 1), &[V1], &graph, &mut state, &mut buffers, &mut occupancy);

        // Far beyond the blocked-time threshold without moving.
        let outcome = run_update(
            &mut stage, &parked(200.0, 2), &[V1], &graph, &mut state, &mut buffers, &mut occupancy,
        );
        assert!(outcome.removed.contains(&V1));
        assert!(outcome
            .commands
            .iter()
            .any(|c| matches!(c, Command::DestroyActor { actor } if *actor == V1)));
        assert!(!state.contains(V1));
    }

    #[test]
    fn hero_location_is_tracked() {
        let graph = straight_graph(150.0);
        let mut state = SimulationState::new();
        let mut buffers = BufferMap::default();
        let mut occupancy = OccupancyTracker::new();
        let mut stage = LifecycleStage::new();
        assert_eq!(stage.hero_location(), Vec3::ZERO);

        let mut hero = vehicle_at(V2, 77.0, 4.0);
        hero.is_hero = true;
        let snapshot = WorldSnapshot { timestamp: stamp(1, 1.0), actors: vec![hero] };
        run_update(&mut stage, &snapshot, &[], &graph, &mut state, &mut buffers, &mut occupancy);
        assert_eq!(stage.hero_location(), Vec3::new(77.0, 0.0, 0.0));
    }
}

mod lights {
    use super::*;
    use tm_core::{VehicleControl, VehicleLightFlags, Weather};

    fn run_stage(
        stage: &mut VehicleLightStage,
        params: &ParameterStore,
        weather: Weather,
        control: Option<&VehicleControl>,
    ) -> Option<Command> {
        let graph = straight_graph(50.0);
        let buffers = BufferMap::default();
        stage.update(V1, &graph, params, &buffers, weather, control)
    }

    #[test]
    fn disabled_by_default() {
        let mut stage = VehicleLightStage::new();
        let params = ParameterStore::new();
        let weather = Weather { sun_altitude_angle: 0.0, ..Weather::default() };
        assert!(run_stage(&mut stage, &params, weather, None).is_none());
    }

    #[test]
    fn night_turns_on_beams_once() {
        let mut stage = VehicleLightStage::new();
        let params = ParameterStore::new();
        params.set_update_vehicle_lights(V1, true);
        let night = Weather { sun_altitude_angle: 0.0, ..Weather::default() };

        match run_stage(&mut stage, &params, night, None) {
            Some(Command::SetVehicleLightState { lights, .. }) => {
                assert!(lights.contains(VehicleLightFlags::POSITION));
                assert!(lights.contains(VehicleLightFlags::LOW_BEAM));
                assert!(!lights.contains(VehicleLightFlags::HIGH_BEAM));
            }
            other => panic!("expected a light command, got {other:?}"),
        }
        // Unchanged conditions produce no redundant command.
        assert!(run_stage(&mut stage, &params, night, None).is_none());
    }

    #[test]
    fn braking_lights_follow_the_control() {
        let mut stage = VehicleLightStage::new();
        let params = ParameterStore::new();
        params.set_update_vehicle_lights(V1, true);
        let day = Weather { sun_altitude_angle: 90.0, ..Weather::default() };
        let control = VehicleControl { throttle: 0.0, steer: 0.0, brake: 1.0 };

        match run_stage(&mut stage, &params, day, Some(&control)) {
            Some(Command::SetVehicleLightState { lights, .. }) => {
                assert!(lights.contains(VehicleLightFlags::BRAKE));
                assert!(!lights.contains(VehicleLightFlags::LOW_BEAM));
            }
            other => panic!("expected a light command, got {other:?}"),
        }
    }
}

//! Unit tests for shared state, buffers, and occupancy.

use tm_core::{ActorId, GeoGridId, TrafficLightColor, Vec3, WaypointId};

use crate::{KinematicState, OccupancyTracker, SimulationState, StaticAttributes, TrafficLightInfo};

const V1: ActorId = ActorId(1);
const V2: ActorId = ActorId(2);

mod simulation {
    use super::*;

    fn state_with_actor(id: ActorId) -> SimulationState {
        let mut state = SimulationState::new();
        state.add_actor(
            id,
            KinematicState::default(),
            StaticAttributes::default(),
            TrafficLightInfo::default(),
        );
        state
    }

    #[test]
    fn add_update_remove() {
        let mut state = state_with_actor(V1);
        assert!(state.contains(V1));

        let mut kin = KinematicState::default();
        kin.location = Vec3::new(5.0, 0.0, 0.0);
        kin.speed_limit = 13.0;
        state.update_kinematics(V1, kin);
        assert_eq!(state.location(V1), Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(state.speed_limit(V1), 13.0);

        state.remove_actor(V1);
        assert!(!state.contains(V1));
        // Reads of removed actors fall back to neutral values.
        assert_eq!(state.location(V1), Vec3::ZERO);
    }

    #[test]
    fn green_to_yellow_hysteresis() {
        let mut state = state_with_actor(V1);
        state.update_traffic_light(
            V1,
            TrafficLightInfo { at_traffic_light: true, state: TrafficLightColor::Green },
        );
        // A yellow flip while already inside the trigger volume is ignored.
        state.update_traffic_light(
            V1,
            TrafficLightInfo { at_traffic_light: true, state: TrafficLightColor::Yellow },
        );
        assert_eq!(state.traffic_light(V1).state, TrafficLightColor::Green);

        // Yellow observed on approach (not yet at the light) does stick.
        state.update_traffic_light(
            V1,
            TrafficLightInfo { at_traffic_light: false, state: TrafficLightColor::Yellow },
        );
        assert_eq!(state.traffic_light(V1).state, TrafficLightColor::Yellow);

        // And red always sticks.
        state.update_traffic_light(
            V1,
            TrafficLightInfo { at_traffic_light: true, state: TrafficLightColor::Red },
        );
        assert_eq!(state.traffic_light(V1).state, TrafficLightColor::Red);
    }
}

mod occupancy {
    use super::*;

    #[test]
    fn passing_vehicles_tracked() {
        let mut tracker = OccupancyTracker::new();
        let wp = WaypointId(100);
        tracker.update_passing_vehicle(wp, V1);
        tracker.update_passing_vehicle(wp, V2);
        let mut passing: Vec<ActorId> = tracker.passing_vehicles(wp).collect();
        passing.sort_unstable();
        assert_eq!(passing, vec![V1, V2]);

        tracker.remove_passing_vehicle(wp, V1);
        assert_eq!(tracker.passing_vehicles(wp).count(), 1);
        assert!(!tracker.is_waypoint_free(wp));
        tracker.remove_passing_vehicle(wp, V2);
        assert!(tracker.is_waypoint_free(wp));
    }

    #[test]
    fn grid_diff_update() {
        let mut tracker = OccupancyTracker::new();
        tracker.update_grid_position(V1, [GeoGridId(1), GeoGridId(2)]);
        tracker.update_grid_position(V2, [GeoGridId(2)]);
        assert_eq!(tracker.overlapping_actors(V1), vec![V2]);

        // V1 moves out of grid 2 — no longer overlapping.
        tracker.update_grid_position(V1, [GeoGridId(1), GeoGridId(3)]);
        assert!(tracker.overlapping_actors(V1).is_empty());
    }

    #[test]
    fn unassigned_grids_ignored() {
        let mut tracker = OccupancyTracker::new();
        tracker.update_grid_position(V1, [GeoGridId::NONE]);
        assert!(tracker.overlapping_actors(V1).is_empty());
        assert!(tracker.is_grid_free(GeoGridId::NONE, V2));
    }

    #[test]
    fn grid_exclusivity_for_respawn() {
        let mut tracker = OccupancyTracker::new();
        tracker.update_grid_position(V1, [GeoGridId(5)]);
        assert!(tracker.is_grid_free(GeoGridId(5), V1), "own grid counts as free");
        assert!(!tracker.is_grid_free(GeoGridId(5), V2));
    }

    #[test]
    fn remove_actor_leaves_no_references() {
        let mut tracker = OccupancyTracker::new();
        tracker.update_passing_vehicle(WaypointId(7), V1);
        tracker.update_passing_vehicle(WaypointId(8), V1);
        tracker.update_grid_position(V1, [GeoGridId(1)]);

        tracker.remove_actor(V1);
        assert!(!tracker.references(V1));

        // Idempotent.
        tracker.remove_actor(V1);
        assert!(!tracker.references(V1));
    }
}

mod buffer {
    use super::*;
    use crate::target_waypoint;
    use tm_core::RoadId;
    use tm_graph::{MapDescription, RoadGraph};

    fn straight_graph() -> RoadGraph {
        let mut desc = MapDescription::new("straight");
        desc.add_straight_segment(RoadId(1), 1, Vec3::ZERO, 0.0, 100.0, 5.0);
        RoadGraph::build(&desc).unwrap()
    }

    #[test]
    fn target_waypoint_walks_distance() {
        let graph = straight_graph();
        let buffer: crate::Buffer = graph.iter().map(|w| w.id).collect();

        // 12 m ahead at 5 m spacing → third hop (index 3, x = 15).
        let (id, index) = target_waypoint(&buffer, &graph, 12.0).unwrap();
        assert_eq!(index, 3);
        assert!((graph.get(id).unwrap().location().x - 15.0).abs() < 0.01);
    }

    #[test]
    fn target_waypoint_clamps_to_back() {
        let graph = straight_graph();
        let buffer: crate::Buffer = graph.iter().take(3).map(|w| w.id).collect();
        let (_, index) = target_waypoint(&buffer, &graph, 1000.0).unwrap();
        assert_eq!(index, 2);
    }

    #[test]
    fn empty_buffer_has_no_target() {
        let graph = straight_graph();
        let buffer = crate::Buffer::new();
        assert!(target_waypoint(&buffer, &graph, 5.0).is_none());
    }
}

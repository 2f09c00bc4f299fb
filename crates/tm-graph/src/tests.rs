//! Unit tests for graph construction, queries, and the cache codec.

use tm_core::constants::map::MAP_RESOLUTION;
use tm_core::{JunctionId, RoadId, RoadOption, Rotation, SegmentId, Transform, Vec3};

use crate::description::{MapDescription, SegmentSeed};
use crate::graph::RoadGraph;

// ── Fixtures ─────────────────────────────────────────────────────────────────

/// A single straight eastbound road, 100 m long.
fn straight_map() -> MapDescription {
    let mut desc = MapDescription::new("straight");
    desc.add_straight_segment(RoadId(1), 1, Vec3::ZERO, 0.0, 100.0, 10.0);
    desc
}

/// Two parallel eastbound lanes 3.5 m apart on the same road.
fn two_lane_map() -> MapDescription {
    let mut desc = MapDescription::new("twolane");
    desc.add_straight_segment(RoadId(1), 1, Vec3::ZERO, 0.0, 100.0, 10.0);
    desc.add_straight_segment(RoadId(1), 2, Vec3::new(0.0, 3.5, 0.0), 0.0, 100.0, 10.0);
    desc
}

fn junction_seed(id: u32, samples: Vec<Transform>) -> SegmentSeed {
    SegmentSeed {
        id: SegmentId(id),
        road_id: RoadId(90),
        section_id: 0,
        lane_id: 1,
        lane_width: 3.5,
        is_junction: true,
        junction_id: JunctionId(7),
        samples,
    }
}

/// Straight approach → junction arc turning left → straight exit.
fn left_turn_map() -> MapDescription {
    let mut desc = MapDescription::new("leftturn");
    let approach = desc.add_straight_segment(RoadId(1), 1, Vec3::ZERO, 0.0, 50.0, 5.0);

    // Quarter arc from (50,0) east-heading to (60,10) north-heading.
    let arc: Vec<Transform> = (0..=8)
        .map(|i| {
            let t = i as f32 / 8.0 * std::f32::consts::FRAC_PI_2;
            let loc = Vec3::new(50.0 + 10.0 * t.sin(), 10.0 - 10.0 * t.cos(), 0.0);
            Transform::new(loc, Rotation::from_yaw(t.to_degrees()))
        })
        .collect();
    let turn = SegmentId(desc.segments.len() as u32);
    desc.segments.push(junction_seed(turn.0, arc));

    let exit = desc.add_straight_segment(RoadId(2), 1, Vec3::new(60.0, 10.0, 0.0), 90.0, 50.0, 5.0);

    desc.connections.push((approach, turn));
    desc.connections.push((turn, exit));
    desc
}

// ── Build ────────────────────────────────────────────────────────────────────

mod build {
    use super::*;

    #[test]
    fn discretizes_at_resolution() {
        let graph = RoadGraph::build(&straight_map()).unwrap();
        // 100 m at 5 m resolution → 21 samples.
        assert_eq!(graph.len(), 21);

        // Consecutive waypoints are never farther apart than the resolution.
        for wp in graph.iter() {
            for &n in &wp.next {
                let next = graph.get(n).unwrap();
                assert!(next.distance_to(wp.location()) <= MAP_RESOLUTION + 0.01);
            }
        }
    }

    #[test]
    fn chain_linkage_is_symmetric() {
        let graph = RoadGraph::build(&straight_map()).unwrap();
        for wp in graph.iter() {
            for &n in &wp.next {
                assert!(graph.get(n).unwrap().previous.contains(&wp.id));
            }
        }
    }

    #[test]
    fn topology_connects_segments() {
        let graph = RoadGraph::build(&left_turn_map()).unwrap();
        let tails: Vec<_> = graph.iter().filter(|w| w.is_terminal()).collect();
        // Only the exit segment dead-ends.
        assert_eq!(tails.len(), 1);
        assert_eq!(tails[0].road_option, RoadOption::RoadEnd);
    }

    #[test]
    fn degenerate_segment_rejected() {
        let mut desc = MapDescription::new("bad");
        desc.segments.push(SegmentSeed {
            id: SegmentId(0),
            road_id: RoadId(1),
            section_id: 0,
            lane_id: 1,
            lane_width: 3.5,
            is_junction: false,
            junction_id: JunctionId::NONE,
            samples: vec![Transform::default()],
        });
        assert!(RoadGraph::build(&desc).is_err());
    }

    #[test]
    fn lane_change_links_pick_correct_side() {
        let graph = RoadGraph::build(&two_lane_map()).unwrap();
        // Lane 1 runs along y = 0; its neighbor at y = 3.5 is on its left
        // (heading east, +y is left).
        let wp = graph
            .iter()
            .find(|w| w.lane_id == 1 && w.s > 20.0 && w.s < 80.0)
            .unwrap();
        assert!(wp.has_left(), "expected left neighbor on inner lane");
        assert!(!wp.has_right());
        let left = graph.get(wp.left).unwrap();
        assert_eq!(left.lane_id, 2);
        assert!(left.has_right());
    }

    #[test]
    fn grids_are_bounded() {
        use std::collections::HashMap;
        let graph = RoadGraph::build(&straight_map()).unwrap();
        let mut sizes: HashMap<i64, usize> = HashMap::new();
        for wp in graph.iter() {
            assert!(wp.grid_id.is_some(), "every waypoint gets a grid");
            *sizes.entry(wp.grid_id.0).or_default() += 1;
        }
        for (_, n) in sizes {
            assert!(n <= tm_core::constants::map::MAX_GEODESIC_GRID_LENGTH);
        }
    }

    #[test]
    fn left_turn_junction_tagged_left() {
        let graph = RoadGraph::build(&left_turn_map()).unwrap();
        let junction_wps: Vec<_> = graph.iter().filter(|w| w.is_junction).collect();
        assert!(!junction_wps.is_empty());
        for wp in junction_wps {
            assert_eq!(wp.road_option, RoadOption::Left, "at s={}", wp.s);
        }
    }
}

// ── Queries ──────────────────────────────────────────────────────────────────

mod queries {
    use super::*;

    #[test]
    fn nearest_waypoint_snaps() {
        let graph = RoadGraph::build(&straight_map()).unwrap();
        let id = graph.nearest_waypoint(Vec3::new(32.0, 1.0, 0.0)).unwrap();
        let wp = graph.get(id).unwrap();
        assert!((wp.location().x - 30.0).abs() < 2.6);
    }

    #[test]
    fn annulus_respects_radii() {
        let graph = RoadGraph::build(&straight_map()).unwrap();
        let center = Vec3::new(50.0, 0.0, 0.0);
        let found = graph.waypoints_in_annulus(center, 10, 10.0);
        assert!(!found.is_empty());
        for id in found {
            let d = graph.get(id).unwrap().location().distance(center);
            assert!((10.0..=35.0).contains(&d), "distance {d} outside annulus");
        }
    }

    #[test]
    fn annulus_excludes_junctions() {
        let graph = RoadGraph::build(&left_turn_map()).unwrap();
        let center = Vec3::new(55.0, 5.0, 0.0);
        for id in graph.waypoints_in_annulus(center, 50, 0.0) {
            assert!(!graph.get(id).unwrap().is_junction);
        }
    }

    #[test]
    fn swirl_exception_only_on_named_map() {
        let graph = RoadGraph::build(&straight_map()).unwrap();
        assert!(!graph.swirl_exception(Vec3::ZERO));

        let mut named = straight_map();
        named.name = "Carla/Maps/Town03".into();
        let graph = RoadGraph::build(&named).unwrap();
        assert!(graph.swirl_exception(Vec3::new(5.0, 5.0, 0.0)));
        assert!(!graph.swirl_exception(Vec3::new(500.0, 0.0, 0.0)));
    }
}

// ── Cache round-trip ─────────────────────────────────────────────────────────

mod cache {
    use super::*;

    fn roundtrip(desc: &MapDescription) -> (RoadGraph, RoadGraph) {
        let built = RoadGraph::build(desc).unwrap();
        let mut buf = Vec::new();
        built.save_cache(&mut buf).unwrap();
        let loaded = RoadGraph::load_cache(&mut buf.as_slice(), desc).unwrap();
        (built, loaded)
    }

    #[test]
    fn roundtrip_is_isomorphic() {
        let desc = left_turn_map();
        let (built, loaded) = roundtrip(&desc);

        assert_eq!(built.len(), loaded.len());
        for wp in built.iter() {
            let other = loaded.get(wp.id).expect("waypoint survives roundtrip");
            assert_eq!(wp.next, other.next);
            assert_eq!(wp.previous, other.previous);
            assert_eq!(wp.left, other.left);
            assert_eq!(wp.right, other.right);
            assert_eq!(wp.road_option, other.road_option);
            assert_eq!(wp.is_junction, other.is_junction);
            assert_eq!(wp.grid_id, other.grid_id);
            assert!(wp.location().distance(other.location()) < 0.05);
        }
    }

    #[test]
    fn roundtrip_preserves_lane_links() {
        let (built, loaded) = roundtrip(&two_lane_map());
        let with_links = built.iter().filter(|w| w.has_left() || w.has_right()).count();
        let loaded_links = loaded.iter().filter(|w| w.has_left() || w.has_right()).count();
        assert!(with_links > 0);
        assert_eq!(with_links, loaded_links);
    }

    #[test]
    fn truncated_stream_is_io_error() {
        let built = RoadGraph::build(&straight_map()).unwrap();
        let mut buf = Vec::new();
        built.save_cache(&mut buf).unwrap();
        buf.truncate(buf.len() / 2);
        assert!(RoadGraph::load_cache(&mut buf.as_slice(), &straight_map()).is_err());
    }

    #[test]
    fn unknown_segment_is_corrupt() {
        let built = RoadGraph::build(&straight_map()).unwrap();
        let mut buf = Vec::new();
        built.save_cache(&mut buf).unwrap();
        let empty = MapDescription::new("straight");
        let err = RoadGraph::load_cache(&mut buf.as_slice(), &empty).unwrap_err();
        assert!(matches!(err, crate::GraphError::CorruptCache(_)));
    }

    #[test]
    fn nearest_query_works_after_load() {
        let desc = straight_map();
        let (_, loaded) = roundtrip(&desc);
        let id = loaded.nearest_waypoint(Vec3::new(50.0, 0.0, 0.0)).unwrap();
        assert!(loaded.get(id).is_some());
    }
}

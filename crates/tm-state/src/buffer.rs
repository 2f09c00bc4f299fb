//! Per-vehicle waypoint buffers.
//!
//! A buffer is the ordered queue of waypoints a vehicle intends to follow,
//! front = nearest.  The localization stage owns all mutation; collision,
//! junction, motion, and light stages only read.  Buffers store ids, not
//! references — resolve through the road graph.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use tm_core::{ActorId, WaypointId};
use tm_graph::RoadGraph;

/// Ordered upcoming waypoints for one vehicle (front = nearest).
pub type Buffer = VecDeque<WaypointId>;

/// All vehicle buffers, keyed by actor.
pub type BufferMap = FxHashMap<ActorId, Buffer>;

/// Walk the buffer front-to-back until the accumulated inter-waypoint
/// distance reaches `target_distance`; returns the waypoint there and its
/// index.  Falls back to the last element when the buffer is shorter than
/// the requested distance.
pub fn target_waypoint(
    buffer: &Buffer,
    graph: &RoadGraph,
    target_distance: f32,
) -> Option<(WaypointId, usize)> {
    let front = *buffer.front()?;
    let mut cursor = graph.get(front)?;
    let mut travelled = 0.0f32;
    let mut index = 0usize;

    for (i, &id) in buffer.iter().enumerate().skip(1) {
        let wp = graph.get(id)?;
        travelled += wp.distance_to(cursor.location());
        cursor = wp;
        index = i;
        if travelled >= target_distance {
            break;
        }
    }
    Some((cursor.id, index))
}

//! The road-graph node type.
//!
//! Waypoints are built once at map load and read-only afterward.  Adjacency
//! is stored as `WaypointId` values rather than references; stages resolve
//! ids through [`RoadGraph`](crate::RoadGraph), which keeps the graph a plain
//! owned structure with no interior pointers.

use tm_core::{GeoGridId, JunctionId, RoadId, RoadOption, Transform, Vec3, WaypointId};

/// One discretized sample of a lane centerline, with topology metadata.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Waypoint {
    pub id: WaypointId,
    pub transform: Transform,

    // ── Lane identity ─────────────────────────────────────────────────────
    pub road_id: RoadId,
    pub section_id: u32,
    pub lane_id: i32,
    pub lane_width: f32,
    /// Arc length along the owning segment, metres.
    pub s: f32,

    // ── Topology ──────────────────────────────────────────────────────────
    /// Downstream continuations (more than one at branch points).
    pub next: Vec<WaypointId>,
    /// Upstream predecessors.
    pub previous: Vec<WaypointId>,
    /// Adjacent same-direction lane to the left, if changeable.
    pub left: WaypointId,
    /// Adjacent same-direction lane to the right, if changeable.
    pub right: WaypointId,

    // ── Classification ────────────────────────────────────────────────────
    pub is_junction: bool,
    pub junction_id: JunctionId,
    pub grid_id: GeoGridId,
    pub road_option: RoadOption,
}

impl Waypoint {
    #[inline]
    pub fn location(&self) -> Vec3 {
        self.transform.location
    }

    /// Unit heading vector of the lane at this waypoint.
    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.transform.forward_vector()
    }

    #[inline]
    pub fn distance_to(&self, loc: Vec3) -> f32 {
        self.location().distance(loc)
    }

    #[inline]
    pub fn has_left(&self) -> bool {
        self.left != WaypointId::INVALID
    }

    #[inline]
    pub fn has_right(&self) -> bool {
        self.right != WaypointId::INVALID
    }

    /// `true` when the graph ends here (dead end or map edge).
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.next.is_empty()
    }
}

//! Raw map input: lane centerlines and their topology.
//!
//! The host (or a test fixture) describes the map as a set of lane-centerline
//! segments — pose samples at arbitrary spacing plus lane identity — and a
//! list of directed end-to-start connections between segments.  The builder
//! in [`graph`](crate::graph) turns this into the discretized waypoint graph;
//! the cache loader in [`cache`](crate::cache) only needs the description to
//! recover waypoint poses by arc-length interpolation.

use tm_core::{JunctionId, RoadId, Rotation, SegmentId, Transform, Vec3};

/// One lane-centerline segment of the raw map.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentSeed {
    pub id: SegmentId,
    pub road_id: RoadId,
    pub section_id: u32,
    /// Signed lane id; sign encodes driving direction along the road.
    pub lane_id: i32,
    pub lane_width: f32,
    pub is_junction: bool,
    pub junction_id: JunctionId,
    /// Centerline pose samples, ordered in the driving direction.
    pub samples: Vec<Transform>,
}

impl SegmentSeed {
    /// Total centerline length, metres.
    pub fn length(&self) -> f32 {
        self.samples
            .windows(2)
            .map(|w| w[0].location.distance(w[1].location))
            .sum()
    }

    /// Pose at arc length `s`, clamped to the segment's ends.
    ///
    /// Locations are linearly interpolated between samples; the yaw is taken
    /// from the interval's direction so cache loads reproduce the headings
    /// the builder computed.
    pub fn pose_at(&self, s: f32) -> Transform {
        let mut remaining = s.max(0.0);
        for w in self.samples.windows(2) {
            let a = w[0].location;
            let b = w[1].location;
            let step = a.distance(b);
            if remaining <= step && step > f32::EPSILON {
                let t = remaining / step;
                let loc = a + (b - a) * t;
                let dir = (b - a).normalized();
                let yaw = dir.y.atan2(dir.x).to_degrees();
                return Transform::new(loc, Rotation::from_yaw(yaw));
            }
            remaining -= step;
        }
        // Past the end: last sample pose.
        self.samples.last().copied().unwrap_or_default()
    }
}

/// A full raw map: segments plus directed topology connections.
///
/// A connection `(a, b)` means the end of segment `a` flows into the start
/// of segment `b`.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MapDescription {
    /// Host name of the map; used for cache identity and the named
    /// roundabout exception.
    pub name: String,
    pub segments: Vec<SegmentSeed>,
    pub connections: Vec<(SegmentId, SegmentId)>,
}

impl MapDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), segments: Vec::new(), connections: Vec::new() }
    }

    /// Convenience for tests and procedural maps: add a straight
    /// constant-spacing lane segment and return its id.
    pub fn add_straight_segment(
        &mut self,
        road_id: RoadId,
        lane_id: i32,
        start: Vec3,
        heading_deg: f32,
        length: f32,
        sample_spacing: f32,
    ) -> SegmentId {
        let id = SegmentId(self.segments.len() as u32);
        let rotation = Rotation::from_yaw(heading_deg);
        let dir = rotation.forward_vector();
        let count = (length / sample_spacing).ceil() as usize + 1;
        let samples = (0..count)
            .map(|i| {
                let d = (i as f32 * sample_spacing).min(length);
                Transform::new(start + dir * d, rotation)
            })
            .collect();
        self.segments.push(SegmentSeed {
            id,
            road_id,
            section_id: 0,
            lane_id,
            lane_width: 3.5,
            is_junction: false,
            junction_id: JunctionId::NONE,
            samples,
        });
        id
    }

    /// Look up a segment by id.
    pub fn segment(&self, id: SegmentId) -> Option<&SegmentSeed> {
        self.segments.iter().find(|s| s.id == id)
    }
}

//! Road graph construction and spatial queries.
//!
//! # Build pipeline
//!
//! `RoadGraph::build` runs five passes over the raw [`MapDescription`]:
//!
//! 1. **Discretize** every segment at `MAP_RESOLUTION`, inserting
//!    subdivision points where the raw samples are farther apart than the
//!    resolution, and keeping raw vertices where the centerline turns by
//!    more than `MAX_WPT_RADIANS`.
//! 2. **Link topology**: the last waypoint of a segment gains the first
//!    waypoint of every connected segment as a successor.
//! 3. **Lane-change links**: same-road, same-section segments one signed
//!    lane apart contribute left/right neighbors, gated on heading
//!    alignment, lateral distance, and minimum lane width.
//! 4. **Geodesic grids**: bounded BFS chunks of at most
//!    `MAX_GEODESIC_GRID_LENGTH` waypoints, so same-grid waypoints are
//!    within a bounded radius of each other.
//! 5. **Road options**: junction paths classified Straight/Left/Right by
//!    exit-heading deviation; dead ends tagged RoadEnd; everything else
//!    LaneFollow.
//!
//! # Spatial index
//!
//! An R-tree over 3-D waypoint positions answers nearest-waypoint snapping
//! and the annulus query used for randomized vehicle placement.  Indexing in
//! three dimensions keeps stacked geometry (overpasses) unambiguous.

use rstar::{PointDistance, RTree, RTreeObject, AABB};
use rustc_hash::FxHashMap;

use tm_core::constants::map::{
    DELTA, MAP_RESOLUTION, MAX_GEODESIC_GRID_LENGTH, MAX_WPT_RADIANS, MIN_LANE_WIDTH,
    STRAIGHT_DEG, Z_DELTA,
};
use tm_core::geo::{angle_between_deg, cross_sign_2d};
use tm_core::{GeoGridId, RoadOption, SegmentId, Transform, Vec3, WaypointId};

use crate::description::{MapDescription, SegmentSeed};
use crate::error::{GraphError, GraphResult};
use crate::waypoint::Waypoint;

// ── R-tree entry ─────────────────────────────────────────────────────────────

/// Entry stored in the R-tree spatial index: a 3-D point with the associated
/// waypoint's dense index.
#[derive(Clone, Debug)]
struct WaypointEntry {
    point: [f32; 3],
    idx: u32,
}

impl RTreeObject for WaypointEntry {
    type Envelope = AABB<[f32; 3]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for WaypointEntry {
    fn distance_2(&self, point: &[f32; 3]) -> f32 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        let dz = self.point[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

// ── RoadGraph ────────────────────────────────────────────────────────────────

/// The discretized road graph: immutable after build.
///
/// Waypoints are stored densely; `WaypointId` lookups go through a hash
/// index so ids can be sparse (they encode segment and ordinal).
#[derive(Debug)]
pub struct RoadGraph {
    map_name: String,
    waypoints: Vec<Waypoint>,
    id_index: FxHashMap<WaypointId, u32>,
    /// Dense index range `[start, end)` of each segment's waypoints.
    seg_range: FxHashMap<SegmentId, (u32, u32)>,
    spatial_idx: RTree<WaypointEntry>,
}

impl RoadGraph {
    // ── Construction ──────────────────────────────────────────────────────

    /// Discretize `desc` into a waypoint graph.
    pub fn build(desc: &MapDescription) -> GraphResult<Self> {
        let mut graph = RoadGraph {
            map_name: desc.name.clone(),
            waypoints: Vec::new(),
            id_index: FxHashMap::default(),
            seg_range: FxHashMap::default(),
            spatial_idx: RTree::new(),
        };

        for seg in &desc.segments {
            graph.discretize_segment(seg)?;
        }
        graph.link_topology(desc)?;
        graph.link_lane_changes(desc);
        graph.assign_grids();
        graph.assign_road_options();
        graph.rebuild_spatial_index();

        log::debug!(
            "built road graph '{}': {} waypoints from {} segments",
            graph.map_name,
            graph.waypoints.len(),
            desc.segments.len()
        );
        Ok(graph)
    }

    /// Reassemble a graph from already-built waypoints (cache load path).
    pub(crate) fn from_parts(map_name: String, waypoints: Vec<Waypoint>) -> Self {
        let mut graph = RoadGraph {
            map_name,
            waypoints,
            id_index: FxHashMap::default(),
            seg_range: FxHashMap::default(),
            spatial_idx: RTree::new(),
        };
        for (i, wp) in graph.waypoints.iter().enumerate() {
            graph.id_index.insert(wp.id, i as u32);
            let seg = wp.id.segment();
            let entry = graph.seg_range.entry(seg).or_insert((i as u32, i as u32));
            entry.1 = i as u32 + 1;
        }
        graph.rebuild_spatial_index();
        graph
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Waypoint> {
        self.waypoints.iter()
    }

    /// Resolve a waypoint id; `None` for ids the graph never produced.
    #[inline]
    pub fn get(&self, id: WaypointId) -> Option<&Waypoint> {
        self.id_index.get(&id).map(|&i| &self.waypoints[i as usize])
    }

    /// Resolve a waypoint id, reporting an error for stale ids.
    pub fn waypoint(&self, id: WaypointId) -> GraphResult<&Waypoint> {
        self.get(id).ok_or(GraphError::WaypointNotFound(id))
    }

    // ── Spatial queries ───────────────────────────────────────────────────

    /// Nearest waypoint to `loc`, or `None` on an empty graph.
    pub fn nearest_waypoint(&self, loc: Vec3) -> Option<WaypointId> {
        self.spatial_idx
            .nearest_neighbor(&[loc.x, loc.y, loc.z])
            .map(|e| self.waypoints[e.idx as usize].id)
    }

    /// Up to `count` non-junction waypoints whose planar distance from
    /// `center` lies in `[inner_radius, inner_radius + DELTA]`, vertically
    /// within `Z_DELTA`.  Used for randomized vehicle placement.
    pub fn waypoints_in_annulus(
        &self,
        center: Vec3,
        count: usize,
        inner_radius: f32,
    ) -> Vec<WaypointId> {
        let outer = inner_radius + DELTA;
        // 3-D iteration order is ascending; beyond this bound no candidate
        // can still satisfy both the planar and vertical constraints.
        let stop_2 = outer * outer + Z_DELTA * Z_DELTA;

        let mut found = Vec::with_capacity(count);
        for (entry, d2) in self
            .spatial_idx
            .nearest_neighbor_iter_with_distance_2(&[center.x, center.y, center.z])
        {
            if d2 > stop_2 {
                break;
            }
            let wp = &self.waypoints[entry.idx as usize];
            if wp.is_junction {
                continue;
            }
            let planar = wp.location().distance_squared_2d(center).sqrt();
            let dz = (wp.location().z - center.z).abs();
            if planar >= inner_radius && planar <= outer && dz <= Z_DELTA {
                found.push(wp.id);
                if found.len() == count {
                    break;
                }
            }
        }
        found
    }

    /// Named-map exception: the large roundabout at the origin of the
    /// "Town03" layout reports junction entrances too aggressively and is
    /// treated as plain road by the localization stage.
    pub fn swirl_exception(&self, loc: Vec3) -> bool {
        self.map_name.contains("Town03") && loc.distance_squared_2d(Vec3::ZERO) < 900.0
    }

    // ── Build passes ──────────────────────────────────────────────────────

    fn discretize_segment(&mut self, seg: &SegmentSeed) -> GraphResult<()> {
        if seg.samples.len() < 2 {
            return Err(GraphError::DegenerateSegment(seg.id));
        }

        let start = self.waypoints.len() as u32;
        let mut emitted: Vec<(Transform, f32)> = Vec::new();
        let mut s = 0.0f32;
        let mut last_emit_s = 0.0f32;
        let mut last_heading: Option<Vec3> = None;

        emitted.push((seg.samples[0], 0.0));
        for w in seg.samples.windows(2) {
            let a = w[0].location;
            let b = w[1].location;
            let step = a.distance(b);
            if step <= f32::EPSILON {
                continue;
            }
            let dir = (b - a).normalized();

            // Subdivide long intervals at the map resolution.
            let yaw = dir.y.atan2(dir.x).to_degrees();
            let mut target = last_emit_s + MAP_RESOLUTION;
            while target <= s + step {
                let loc = a + dir * (target - s);
                emitted.push((Transform::new(loc, tm_core::Rotation::from_yaw(yaw)), target));
                last_emit_s = target;
                target += MAP_RESOLUTION;
            }
            s += step;

            // Keep raw vertices where the centerline bends sharply.
            let turned = match last_heading {
                Some(prev) => prev.dot(dir).clamp(-1.0, 1.0).acos() > MAX_WPT_RADIANS,
                None => false,
            };
            if turned && s - last_emit_s > f32::EPSILON {
                emitted.push((w[1], s));
                last_emit_s = s;
            }
            last_heading = Some(dir);
        }
        // The segment end is always a waypoint (it anchors topology links).
        if s - last_emit_s > f32::EPSILON || emitted.len() == 1 {
            if let Some(last) = seg.samples.last() {
                emitted.push((*last, s));
            }
        }

        for (ordinal, (transform, arc)) in emitted.iter().enumerate() {
            let id = WaypointId::compose(seg.id, ordinal as u32);
            let dense = self.waypoints.len() as u32;
            self.id_index.insert(id, dense);
            self.waypoints.push(Waypoint {
                id,
                transform: *transform,
                road_id: seg.road_id,
                section_id: seg.section_id,
                lane_id: seg.lane_id,
                lane_width: seg.lane_width,
                s: *arc,
                next: Vec::new(),
                previous: Vec::new(),
                left: WaypointId::INVALID,
                right: WaypointId::INVALID,
                is_junction: seg.is_junction,
                junction_id: seg.junction_id,
                grid_id: GeoGridId::NONE,
                road_option: RoadOption::LaneFollow,
            });
        }

        // Intra-segment chain.
        let end = self.waypoints.len() as u32;
        for i in start..end {
            if i + 1 < end {
                let next_id = self.waypoints[i as usize + 1].id;
                self.waypoints[i as usize].next.push(next_id);
                let this_id = self.waypoints[i as usize].id;
                self.waypoints[i as usize + 1].previous.push(this_id);
            }
        }
        self.seg_range.insert(seg.id, (start, end));
        Ok(())
    }

    fn link_topology(&mut self, desc: &MapDescription) -> GraphResult<()> {
        for &(from, to) in &desc.connections {
            let &(_, from_end) = self
                .seg_range
                .get(&from)
                .ok_or(GraphError::UnknownSegment(from))?;
            let &(to_start, _) = self
                .seg_range
                .get(&to)
                .ok_or(GraphError::UnknownSegment(to))?;

            let tail = (from_end - 1) as usize;
            let head = to_start as usize;
            let head_id = self.waypoints[head].id;
            let tail_id = self.waypoints[tail].id;
            if !self.waypoints[tail].next.contains(&head_id) {
                self.waypoints[tail].next.push(head_id);
                self.waypoints[head].previous.push(tail_id);
            }
        }
        Ok(())
    }

    fn link_lane_changes(&mut self, desc: &MapDescription) {
        for seg in &desc.segments {
            if seg.is_junction || seg.lane_width < MIN_LANE_WIDTH {
                continue;
            }
            for sibling in &desc.segments {
                // Same road section, one signed lane over, same direction.
                if sibling.id == seg.id
                    || sibling.road_id != seg.road_id
                    || sibling.section_id != seg.section_id
                    || sibling.is_junction
                    || sibling.lane_width < MIN_LANE_WIDTH
                    || (sibling.lane_id - seg.lane_id).abs() != 1
                    || sibling.lane_id * seg.lane_id <= 0
                {
                    continue;
                }
                self.link_lane_pair(seg.id, sibling.id);
            }
        }
    }

    /// Assign left/right neighbors from segment `a` toward segment `b`.
    fn link_lane_pair(&mut self, a: SegmentId, b: SegmentId) {
        let (Some(&(a0, a1)), Some(&(b0, b1))) = (self.seg_range.get(&a), self.seg_range.get(&b))
        else {
            return;
        };
        let b_len = (b1 - b0) as usize;
        if b_len == 0 {
            return;
        }
        let a_total = self.waypoints[(a1 - 1) as usize].s.max(f32::EPSILON);

        for i in a0..a1 {
            let (loc, fwd, s, width) = {
                let wp = &self.waypoints[i as usize];
                (wp.location(), wp.forward(), wp.s, wp.lane_width)
            };
            // Arc-length-proportional candidate, refined by local search.
            let guess = ((s / a_total) * (b_len - 1) as f32).round() as i64;
            let mut best: Option<(f32, u32)> = None;
            for di in -2i64..=2 {
                let j = guess + di;
                if j < 0 || j >= b_len as i64 {
                    continue;
                }
                let cand = &self.waypoints[(b0 + j as u32) as usize];
                if cand.forward().dot(fwd) <= 0.0 {
                    continue;
                }
                let d2 = cand.location().distance_squared_2d(loc);
                if best.map_or(true, |(bd, _)| d2 < bd) {
                    best = Some((d2, b0 + j as u32));
                }
            }
            let Some((d2, j)) = best else { continue };
            let max_lateral = width + self.waypoints[j as usize].lane_width;
            if d2 > max_lateral * max_lateral {
                continue;
            }
            let delta = self.waypoints[j as usize].location() - loc;
            let neighbor_id = self.waypoints[j as usize].id;
            if cross_sign_2d(fwd, delta) > 0.0 {
                self.waypoints[i as usize].left = neighbor_id;
            } else {
                self.waypoints[i as usize].right = neighbor_id;
            }
        }
    }

    fn assign_grids(&mut self) {
        let mut grid = 0i64;
        let mut queue: Vec<u32> = Vec::new();
        for start in 0..self.waypoints.len() {
            if self.waypoints[start].grid_id.is_some() {
                continue;
            }
            // Bounded BFS over next/previous adjacency.
            queue.clear();
            queue.push(start as u32);
            self.waypoints[start].grid_id = GeoGridId(grid);
            let mut taken = 1usize;
            let mut head = 0usize;
            while head < queue.len() && taken < MAX_GEODESIC_GRID_LENGTH {
                let i = queue[head] as usize;
                head += 1;
                let neighbors: Vec<WaypointId> = self.waypoints[i]
                    .next
                    .iter()
                    .chain(self.waypoints[i].previous.iter())
                    .copied()
                    .collect();
                for nid in neighbors {
                    if taken >= MAX_GEODESIC_GRID_LENGTH {
                        break;
                    }
                    if let Some(&ni) = self.id_index.get(&nid) {
                        if !self.waypoints[ni as usize].grid_id.is_some() {
                            self.waypoints[ni as usize].grid_id = GeoGridId(grid);
                            queue.push(ni);
                            taken += 1;
                        }
                    }
                }
            }
            grid += 1;
        }
    }

    fn assign_road_options(&mut self) {
        // Dead ends first; junction classification may not overwrite them.
        for wp in &mut self.waypoints {
            if wp.next.is_empty() {
                wp.road_option = RoadOption::RoadEnd;
            }
        }

        // Classify each junction entry path by its exit heading deviation.
        for i in 0..self.waypoints.len() {
            if self.waypoints[i].is_junction {
                continue;
            }
            let entry_forward = self.waypoints[i].forward();
            let successors = self.waypoints[i].next.clone();
            for next_id in successors {
                let Some(&ni) = self.id_index.get(&next_id) else { continue };
                if !self.waypoints[ni as usize].is_junction {
                    continue;
                }

                // Walk the junction chain to its first non-junction exit.
                let mut chain: Vec<u32> = vec![ni];
                let mut cursor = ni as usize;
                let mut exit_forward = self.waypoints[cursor].forward();
                for _ in 0..256 {
                    let Some(&first_next) = self.waypoints[cursor].next.first() else { break };
                    let Some(&ci) = self.id_index.get(&first_next) else { break };
                    if !self.waypoints[ci as usize].is_junction {
                        exit_forward = self.waypoints[ci as usize].forward();
                        break;
                    }
                    chain.push(ci);
                    cursor = ci as usize;
                    exit_forward = self.waypoints[cursor].forward();
                }

                let deviation = angle_between_deg(entry_forward, exit_forward);
                let option = if deviation <= STRAIGHT_DEG {
                    RoadOption::Straight
                } else if cross_sign_2d(entry_forward, exit_forward) > 0.0 {
                    RoadOption::Left
                } else {
                    RoadOption::Right
                };
                for ci in chain {
                    self.waypoints[ci as usize].road_option = option;
                }
            }
        }
    }

    fn rebuild_spatial_index(&mut self) {
        let entries: Vec<WaypointEntry> = self
            .waypoints
            .iter()
            .enumerate()
            .map(|(i, wp)| WaypointEntry {
                point: [wp.location().x, wp.location().y, wp.location().z],
                idx: i as u32,
            })
            .collect();
        self.spatial_idx = RTree::bulk_load(entries);
    }
}

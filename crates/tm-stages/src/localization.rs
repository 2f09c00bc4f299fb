//! Waypoint-buffer maintenance: the first stage of the tick.
//!
//! For each vehicle this prunes passed waypoints, rebuilds the buffer when
//! the vehicle strayed from it, extends it to a speed-scaled horizon
//! (randomly at branches, or along an uploaded path/route), decides lane
//! changes, and detects junction entrances with the safe-space scan the
//! junction and motion stages rely on.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use tm_core::constants::lane_change::{
    FIFTYPERC, INTER_LANE_CHANGE_DISTANCE, MAXIMUM_LANE_OBSTACLE_CURVATURE,
    MAXIMUM_LANE_OBSTACLE_DISTANCE, MAX_WPT_DISTANCE, MINIMUM_LANE_CHANGE_DISTANCE,
    MIN_LANE_CHANGE_SPEED, MIN_WPT_DISTANCE,
};
use tm_core::constants::path::{
    HIGH_SPEED_HORIZON_RATE, HORIZON_RATE, MAX_START_DISTANCE, MINIMUM_HORIZON_LENGTH,
};
use tm_core::constants::speed::HIGHWAY_SPEED;
use tm_core::constants::waypoint::{
    JUNCTION_LOOK_AHEAD, MIN_JUNCTION_LENGTH, SAFE_DISTANCE_AFTER_JUNCTION,
};
use tm_core::{ActorId, ActorRng, Vec3, WaypointId};
use tm_graph::RoadGraph;
use tm_params::{ParameterStore, UploadedPath, UploadedRoute};
use tm_state::{target_waypoint, Buffer, BufferMap, OccupancyTracker, SimulationState};

use crate::frames::LocalizationData;

/// Projection of the vector to `target` onto `heading`; non-positive means
/// the point is beside or behind the vehicle.
pub(crate) fn deviation_dot(location: Vec3, heading: Vec3, target: Vec3) -> f32 {
    heading.flatten().dot((target - location).flatten().normalized())
}

pub(crate) fn push_waypoint(
    occupancy: &mut OccupancyTracker,
    actor: ActorId,
    buffer: &mut Buffer,
    id: WaypointId,
) {
    occupancy.update_passing_vehicle(id, actor);
    buffer.push_back(id);
}

pub(crate) fn pop_front(occupancy: &mut OccupancyTracker, actor: ActorId, buffer: &mut Buffer) {
    if let Some(id) = buffer.pop_front() {
        occupancy.remove_passing_vehicle(id, actor);
    }
}

pub(crate) fn pop_back(occupancy: &mut OccupancyTracker, actor: ActorId, buffer: &mut Buffer) {
    if let Some(id) = buffer.pop_back() {
        occupancy.remove_passing_vehicle(id, actor);
    }
}

pub struct LocalizationStage {
    /// Change-over point of the last executed lane change per vehicle.
    last_lane_change: FxHashMap<ActorId, WaypointId>,
    /// Safe-space scan result cached while a vehicle waits at an entrance.
    junction_safe_space: FxHashMap<ActorId, (Option<WaypointId>, Option<WaypointId>)>,
    dead_end_warned: bool,
}

impl Default for LocalizationStage {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalizationStage {
    pub fn new() -> Self {
        Self {
            last_lane_change: FxHashMap::default(),
            junction_safe_space: FxHashMap::default(),
            dead_end_warned: false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        actor: ActorId,
        graph: &RoadGraph,
        state: &SimulationState,
        params: &ParameterStore,
        buffers: &mut BufferMap,
        occupancy: &mut OccupancyTracker,
        rng: &mut ActorRng,
        marked_for_removal: &mut Vec<ActorId>,
        output: &mut LocalizationData,
    ) {
        let location = state.location(actor);
        let heading = state.heading(actor);
        let speed = state.velocity(actor).length();

        let mut horizon = (speed * HORIZON_RATE).max(MINIMUM_HORIZON_LENGTH);
        if speed > HIGHWAY_SPEED {
            horizon = (speed * HIGH_SPEED_HORIZON_RATE).max(MINIMUM_HORIZON_LENGTH);
        }
        let horizon_square = horizon * horizon;

        let mut buffer = buffers.remove(&actor).unwrap_or_default();

        // Rebuild from scratch when the vehicle strayed from its route.
        if let Some(front) = buffer.front().and_then(|&id| graph.get(id)) {
            if front.location().distance_squared(location) > MAX_START_DISTANCE * MAX_START_DISTANCE
            {
                while !buffer.is_empty() {
                    pop_front(occupancy, actor, &mut buffer);
                }
            }
        }

        let mut is_at_junction_entrance = false;
        if !buffer.is_empty() {
            // Drop waypoints already passed (beside or behind the vehicle).
            while let Some(&front_id) = buffer.front() {
                match graph.get(front_id) {
                    Some(wp) if deviation_dot(location, heading, wp.location()) > 0.0 => break,
                    _ => pop_front(occupancy, actor, &mut buffer),
                }
            }

            is_at_junction_entrance = self.detect_junction_entrance(&buffer, graph, location);

            // Trim the far end, but never while parked at an entrance: the
            // safe-space scan needs the waypoints across the junction.
            while !is_at_junction_entrance {
                let Some(&front_id) = buffer.front() else { break };
                let Some(&back_id) = buffer.back() else { break };
                let (Some(front_wp), Some(back_wp)) = (graph.get(front_id), graph.get(back_id))
                else {
                    break;
                };
                if back_wp.location().distance_squared(front_wp.location())
                    > horizon_square + horizon_square
                    && !back_wp.is_junction
                {
                    pop_back(occupancy, actor, &mut buffer);
                } else {
                    break;
                }
            }
        }

        // Reseed from the nearest graph waypoint when nothing is left.
        if buffer.is_empty() {
            if let Some(id) = graph.nearest_waypoint(location) {
                push_waypoint(occupancy, actor, &mut buffer, id);
            }
        }

        // ── Lane-change decision ──────────────────────────────────────────
        let forced = params.take_force_lane_change(actor);
        let mut force_lane_change = forced.is_some();
        let mut direction_left = forced.is_some_and(|info| info.direction_left);

        if !force_lane_change && speed > MIN_LANE_CHANGE_SPEED {
            let keep_right = params.keep_right_percentage(actor);
            let random_left = params.random_left_lane_change_percentage(actor);
            let random_right = params.random_right_lane_change_percentage(actor);
            let is_keep_right = keep_right > rng.next_percentage();
            let is_random_left = random_left >= rng.next_percentage();
            let is_random_right = random_right >= rng.next_percentage();

            if is_keep_right || is_random_right {
                force_lane_change = true;
                direction_left = false;
            }
            if is_random_left {
                if !force_lane_change {
                    force_lane_change = true;
                    direction_left = true;
                } else {
                    // Both sides requested; flip a coin.
                    direction_left = rng.next_percentage() >= FIFTYPERC;
                }
            }
        }

        let lane_change_distance_sq = {
            let d = (10.0 * speed).max(INTER_LANE_CHANGE_DISTANCE);
            d * d
        };
        let no_recent_change = !self.last_lane_change.contains_key(&actor);
        let mut done_with_previous = true;
        if !no_recent_change {
            match self.last_lane_change.get(&actor).and_then(|&id| graph.get(id)) {
                Some(wp) => {
                    done_with_previous =
                        wp.location().distance_squared(location) > lane_change_distance_sq;
                    if done_with_previous {
                        self.last_lane_change.remove(&actor);
                    }
                }
                None => {
                    self.last_lane_change.remove(&actor);
                }
            }
        }
        let wants_change = params.auto_lane_change(actor) || force_lane_change;
        let front_not_junction = buffer
            .front()
            .and_then(|&id| graph.get(id))
            .is_some_and(|wp| !wp.is_junction);

        if wants_change && front_not_junction && (no_recent_change || done_with_previous) {
            let change_over = assign_lane_change(
                actor,
                location,
                speed,
                force_lane_change,
                direction_left,
                &buffer,
                buffers,
                graph,
                occupancy,
            );
            if let Some(change_pt) = change_over {
                self.last_lane_change.insert(actor, change_pt);
                while !buffer.is_empty() {
                    pop_front(occupancy, actor, &mut buffer);
                }
                push_waypoint(occupancy, actor, &mut buffer, change_pt);
            }
        }

        // ── Horizon extension ─────────────────────────────────────────────
        if let Some(mut path) = params.take_upload_path(actor) {
            self.import_path(
                actor,
                &mut path,
                &mut buffer,
                graph,
                occupancy,
                params,
                horizon_square,
                marked_for_removal,
            );
            if !path.points.is_empty() {
                // Keep the unconsumed tail for the next tick.
                params.upload_path(actor, path.points, false);
            }
        } else if let Some(mut route) = params.take_upload_route(actor) {
            self.import_route(
                actor,
                &mut route,
                &mut buffer,
                graph,
                occupancy,
                params,
                horizon_square,
                marked_for_removal,
            );
            if !route.options.is_empty() {
                params.upload_route(actor, route.options, false);
            }
        } else {
            self.extend_randomly(
                actor,
                &mut buffer,
                graph,
                occupancy,
                params,
                rng,
                horizon_square,
                marked_for_removal,
            );
        }

        self.extend_and_find_safe_space(actor, is_at_junction_entrance, &mut buffer, graph, occupancy);

        output.is_at_junction_entrance = is_at_junction_entrance;
        if is_at_junction_entrance {
            let (end, safe) = self
                .junction_safe_space
                .get(&actor)
                .copied()
                .unwrap_or((None, None));
            output.junction_end = end;
            output.safe_point = safe;
        } else {
            output.junction_end = None;
            output.safe_point = None;
        }

        occupancy.update_grid_position(
            actor,
            buffer.iter().filter_map(|&id| graph.get(id).map(|wp| wp.grid_id)),
        );
        buffers.insert(actor, buffer);
    }

    fn detect_junction_entrance(&self, buffer: &Buffer, graph: &RoadGraph, location: Vec3) -> bool {
        let Some(&front_id) = buffer.front() else { return false };
        let Some(front_wp) = graph.get(front_id) else { return false };
        let Some((look_id, _)) = target_waypoint(buffer, graph, JUNCTION_LOOK_AHEAD) else {
            return false;
        };
        let Some(look_wp) = graph.get(look_id) else { return false };

        let mut at_entrance = !front_wp.is_junction && look_wp.is_junction;
        if !at_entrance && front_wp.previous.len() == 1 {
            if let Some(prev) = graph.get(front_wp.previous[0]) {
                at_entrance = !prev.is_junction && front_wp.is_junction;
            }
        }
        // Large-roundabout maps misreport entrances near their center ring.
        if at_entrance && graph.swirl_exception(location) {
            at_entrance = false;
        }
        at_entrance
    }

    #[allow(clippy::too_many_arguments)]
    fn extend_randomly(
        &mut self,
        actor: ActorId,
        buffer: &mut Buffer,
        graph: &RoadGraph,
        occupancy: &mut OccupancyTracker,
        params: &ParameterStore,
        rng: &mut ActorRng,
        horizon_square: f32,
        marked_for_removal: &mut Vec<ActorId>,
    ) {
        loop {
            let Some(&front_id) = buffer.front() else { break };
            let Some(&back_id) = buffer.back() else { break };
            let (Some(front_wp), Some(back_wp)) = (graph.get(front_id), graph.get(back_id)) else {
                break;
            };
            if back_wp.location().distance_squared(front_wp.location()) > horizon_square {
                break;
            }
            if back_wp.next.is_empty() {
                self.handle_dead_end(actor, params, marked_for_removal);
                break;
            }
            let mut index = 0usize;
            if back_wp.next.len() > 1 {
                // Pseudo-random branch selection.
                index = (rng.next_percentage() * back_wp.next.len() as f32 * 0.01) as usize;
                index = index.min(back_wp.next.len() - 1);
            }
            let selection = back_wp.next[index];
            push_waypoint(occupancy, actor, buffer, selection);
            if selection == front_id {
                // Closed a loop; stop before re-walking it.
                break;
            }
        }
    }

    fn handle_dead_end(
        &mut self,
        actor: ActorId,
        params: &ParameterStore,
        marked_for_removal: &mut Vec<ActorId>,
    ) {
        if !params.osm_mode() && !self.dead_end_warned {
            log::warn!("map has dead-end roads; enable open-graph mode to keep vehicles alive");
            self.dead_end_warned = true;
        }
        marked_for_removal.push(actor);
    }

    #[allow(clippy::too_many_arguments)]
    fn import_path(
        &mut self,
        actor: ActorId,
        path: &mut UploadedPath,
        buffer: &mut Buffer,
        graph: &RoadGraph,
        occupancy: &mut OccupancyTracker,
        params: &ParameterStore,
        horizon_square: f32,
        marked_for_removal: &mut Vec<ActorId>,
    ) {
        if path.empty_buffer {
            // Restart from the vehicle's current anchor point.
            while buffer.len() > 1 {
                pop_back(occupancy, actor, buffer);
            }
            path.empty_buffer = false;
        }

        while !path.points.is_empty() {
            let Some(&front_id) = buffer.front() else { break };
            let Some(&back_id) = buffer.back() else { break };
            let (Some(front_wp), Some(back_wp)) = (graph.get(front_id), graph.get(back_id)) else {
                break;
            };
            if back_wp.location().distance_squared(front_wp.location()) > horizon_square {
                break;
            }

            let target_loc = path.points[0];
            let Some(target_id) = graph.nearest_waypoint(target_loc) else {
                path.points.remove(0);
                continue;
            };
            if back_wp.next.is_empty() {
                self.handle_dead_end(actor, params, marked_for_removal);
                break;
            }

            // At branches head toward the next imported point.
            let mut selection = back_wp.next[0];
            if back_wp.next.len() > 1 {
                let mut best = f32::INFINITY;
                for &cand in &back_wp.next {
                    if let Some(cw) = graph.get(cand) {
                        let d = cw.location().distance_squared(target_loc);
                        if d < best {
                            best = d;
                            selection = cand;
                        }
                    }
                }
            }
            let Some(sel_wp) = graph.get(selection) else { break };

            if sel_wp.location().distance_squared(target_loc) < 30.0 {
                // Reached the imported point; consume it.
                path.points.remove(0);
                if sel_wp.next.contains(&target_id) {
                    push_waypoint(occupancy, actor, buffer, selection);
                }
                if target_id != selection {
                    push_waypoint(occupancy, actor, buffer, target_id);
                } else {
                    push_waypoint(occupancy, actor, buffer, selection);
                }
            } else {
                push_waypoint(occupancy, actor, buffer, selection);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn import_route(
        &mut self,
        actor: ActorId,
        route: &mut UploadedRoute,
        buffer: &mut Buffer,
        graph: &RoadGraph,
        occupancy: &mut OccupancyTracker,
        params: &ParameterStore,
        horizon_square: f32,
        marked_for_removal: &mut Vec<ActorId>,
    ) {
        if route.empty_buffer {
            while buffer.len() > 1 {
                pop_back(occupancy, actor, buffer);
            }
            route.empty_buffer = false;
        }

        while !route.options.is_empty() {
            let Some(&front_id) = buffer.front() else { break };
            let Some(&back_id) = buffer.back() else { break };
            let (Some(front_wp), Some(back_wp)) = (graph.get(front_id), graph.get(back_id)) else {
                break;
            };
            if back_wp.location().distance_squared(front_wp.location()) > horizon_square {
                break;
            }

            let next_option = route.options[0];
            let last_option = back_wp.road_option;
            if back_wp.next.is_empty() {
                self.handle_dead_end(actor, params, marked_for_removal);
                break;
            }

            let mut selection = back_wp.next[0];
            if back_wp.next.len() > 1 {
                let mut found = false;
                for &cand in &back_wp.next {
                    if graph.get(cand).is_some_and(|cw| cw.road_option == next_option) {
                        selection = cand;
                        found = true;
                        break;
                    }
                }
                if !found {
                    log::warn!(
                        "vehicle {actor}: no branch matches route option {next_option:?}; \
                         route may diverge"
                    );
                }
            }
            push_waypoint(occupancy, actor, buffer, selection);

            let sel_option = graph.get(selection).map(|wp| wp.road_option);
            if sel_option == Some(next_option) && last_option != next_option {
                // Entered the requested maneuver; it is now fully imported.
                route.options.remove(0);
            }
        }
    }

    /// Scan (and if needed extend) the buffer across an upcoming junction to
    /// find its exit and a point a safe distance beyond it.
    fn extend_and_find_safe_space(
        &mut self,
        actor: ActorId,
        is_at_junction_entrance: bool,
        buffer: &mut Buffer,
        graph: &RoadGraph,
        occupancy: &mut OccupancyTracker,
    ) {
        if !is_at_junction_entrance {
            self.junction_safe_space.remove(&actor);
            return;
        }
        if self.junction_safe_space.contains_key(&actor) {
            return;
        }

        let safe_d2 = SAFE_DISTANCE_AFTER_JUNCTION * SAFE_DISTANCE_AFTER_JUNCTION;
        let mut entered = false;
        let mut past = false;
        let mut safe_found = false;
        let mut junction_begin: Option<WaypointId> = None;
        let mut junction_end: Option<WaypointId> = None;
        let mut safe_point: Option<WaypointId> = None;
        let mut cursor: Option<WaypointId> = None;

        for &id in buffer.iter() {
            if safe_found {
                break;
            }
            let Some(wp) = graph.get(id) else { continue };
            cursor = Some(id);
            if !entered && wp.is_junction {
                entered = true;
                junction_begin = Some(id);
            }
            if entered && !past && !wp.is_junction {
                past = true;
                junction_end = Some(id);
            }
            if past {
                if let Some(end_wp) = junction_end.and_then(|j| graph.get(j)) {
                    if end_wp.location().distance_squared(wp.location()) > safe_d2 {
                        safe_found = true;
                        safe_point = Some(id);
                    }
                }
            }
        }

        if !safe_found {
            let mut abort = false;
            // Push waypoints until the far side of the junction.
            while !past && !abort {
                let next = cursor
                    .and_then(|c| graph.get(c))
                    .and_then(|wp| wp.next.first().copied());
                match next {
                    Some(nid) => {
                        push_waypoint(occupancy, actor, buffer, nid);
                        cursor = Some(nid);
                        if graph.get(nid).is_some_and(|wp| !wp.is_junction) {
                            past = true;
                            junction_end = Some(nid);
                        }
                    }
                    None => abort = true,
                }
            }
            // Then until a safe point, a branch, or the next junction.
            while !safe_found && !abort {
                let Some(cur_id) = cursor else { break };
                let Some(cur) = graph.get(cur_id) else { break };
                let past_safe = junction_end
                    .and_then(|j| graph.get(j))
                    .is_some_and(|end| end.location().distance_squared(cur.location()) > safe_d2);
                if past_safe || cur.next.len() > 1 || cur.is_junction {
                    safe_found = true;
                    safe_point = Some(cur_id);
                } else {
                    match cur.next.first().copied() {
                        Some(nid) => {
                            push_waypoint(occupancy, actor, buffer, nid);
                            cursor = Some(nid);
                        }
                        None => abort = true,
                    }
                }
            }
        }

        // Tiny junctions do not block; report no safe space to respect.
        if let (Some(begin), Some(end)) = (junction_begin, junction_end) {
            if let (Some(bw), Some(ew)) = (graph.get(begin), graph.get(end)) {
                if bw.location().distance_squared(ew.location())
                    < MIN_JUNCTION_LENGTH * MIN_JUNCTION_LENGTH
                {
                    junction_end = None;
                    safe_point = None;
                }
            }
        }
        self.junction_safe_space.insert(actor, (junction_end, safe_point));
    }

    pub fn remove_actor(&mut self, actor: ActorId) {
        self.last_lane_change.remove(&actor);
        self.junction_safe_space.remove(&actor);
    }

    pub fn reset(&mut self) {
        self.last_lane_change.clear();
        self.junction_safe_space.clear();
    }
}

/// Pick the waypoint a lane change should restart the buffer from, or `None`
/// when changing is unsafe or impossible.
#[allow(clippy::too_many_arguments)]
fn assign_lane_change(
    actor: ActorId,
    location: Vec3,
    speed: f32,
    force: bool,
    direction_left: bool,
    buffer: &Buffer,
    buffers: &BufferMap,
    graph: &RoadGraph,
    occupancy: &OccupancyTracker,
) -> Option<WaypointId> {
    let &front_id = buffer.front()?;
    let current = graph.get(front_id)?;
    let left = current.has_left().then_some(current.left);
    let right = current.has_right().then_some(current.right);

    let mut change_over: Option<WaypointId> = None;

    if force {
        change_over = if direction_left { left } else { right };
    } else {
        // Find the nearest same-lane obstacle ahead.
        let mut obstacle_too_close = false;
        let mut min_d2 = f32::INFINITY;
        let mut obstacle: Option<ActorId> = None;
        for other in occupancy.overlapping_actors(actor) {
            if obstacle_too_close {
                break;
            }
            let Some(other_wp) = buffers
                .get(&other)
                .and_then(|b| b.front())
                .and_then(|&id| graph.get(id))
            else {
                continue;
            };
            let reference_heading = current.forward();
            let to_other = other_wp.location() - current.location();
            if !current.is_junction
                && !other_wp.is_junction
                && other_wp.road_id == current.road_id
                && other_wp.lane_id == current.lane_id
                && reference_heading.dot(to_other) > 0.0
                && reference_heading.dot(other_wp.forward()) > MAXIMUM_LANE_OBSTACLE_CURVATURE
            {
                let d2 = location.distance_squared(other_wp.location());
                if d2 > MINIMUM_LANE_CHANGE_DISTANCE * MINIMUM_LANE_CHANGE_DISTANCE {
                    if d2 < min_d2 && d2 < MAXIMUM_LANE_OBSTACLE_DISTANCE * MAXIMUM_LANE_OBSTACLE_DISTANCE
                    {
                        min_d2 = d2;
                        obstacle = Some(other);
                    }
                } else {
                    obstacle_too_close = true;
                }
            }
        }

        if !obstacle_too_close {
            if let Some(ob) = obstacle {
                let other_wp = buffers
                    .get(&ob)
                    .and_then(|b| b.front())
                    .and_then(|&id| graph.get(id));
                if let Some(ow) = other_wp {
                    // Change only into a lane that is clear both here and
                    // next to the obstacle.
                    let distant_left_free = ow.has_left() && occupancy.is_waypoint_free(ow.left);
                    let distant_right_free = ow.has_right() && occupancy.is_waypoint_free(ow.right);

                    if distant_right_free {
                        if let Some(r) = right {
                            if occupancy.is_waypoint_free(r) {
                                change_over = Some(r);
                            }
                        }
                    }
                    if change_over.is_none() && distant_left_free {
                        if let Some(l) = left {
                            if occupancy.is_waypoint_free(l) {
                                change_over = Some(l);
                            }
                        }
                    }
                }
            }
        }
    }

    // Move the change-over point forward so the merge is gradual.
    if let Some(start_id) = change_over {
        let change_over_distance = (1.5 * speed).clamp(MIN_WPT_DISTANCE, MAX_WPT_DISTANCE);
        let start_loc = graph.get(start_id)?.location();
        let mut cursor = start_id;
        loop {
            let Some(wp) = graph.get(cursor) else { break };
            if wp.location().distance_squared(start_loc) >= change_over_distance * change_over_distance
                || wp.is_junction
            {
                break;
            }
            match wp.next.first().copied() {
                Some(n) => cursor = n,
                None => break,
            }
        }
        change_over = Some(cursor);
    }
    change_over
}

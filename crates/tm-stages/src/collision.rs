//! Pairwise collision avoidance.
//!
//! Each vehicle is tested against the vehicles and walkers sharing its
//! geodesic grid cells.  Candidates inside a speed-scaled radius are sorted
//! nearest-first and negotiated one by one until the first hazard.
//! Negotiation compares extended "geodesic" boundaries (the bounding box
//! swept along the waypoint buffer) and breaks symmetric conflicts with a
//! path-priority then angular-priority cascade, so exactly one side of a
//! crossing yields.
//!
//! Boundaries and pairwise geometry are cached per tick; `begin_tick` must
//! run before the per-vehicle loop.

use rustc_hash::FxHashMap;

use tm_core::constants::collision::{
    BOUNDARY_EXTENSION_MINIMUM, COLLISION_RADIUS_MIN, COLLISION_RADIUS_RATE,
    COLLISION_RADIUS_STOP, COS_10_DEGREES, LOCKING_DISTANCE_PADDING, MAX_LOCKING_EXTENSION,
    MIN_REFERENCE_DISTANCE, OVERLAP_THRESHOLD, SQUARE_ROOT_OF_TWO, VEL_EXT_FACTOR,
    VERTICAL_OVERLAP_THRESHOLD, WALKER_TIME_EXTENSION,
};
use tm_core::constants::waypoint::JUNCTION_LOOK_AHEAD;
use tm_core::{ActorId, ActorKind, ActorRng, TrafficLightColor, Vec3};
use tm_graph::RoadGraph;
use tm_params::ParameterStore;
use tm_state::{target_waypoint, BufferMap, OccupancyTracker, SimulationState};

use crate::frames::CollisionHazardData;
use crate::geometry::polygon_distance;

/// Following lock against a lead vehicle, held while the hazard persists.
#[derive(Copy, Clone, Debug)]
struct CollisionLock {
    distance_to_lead_vehicle: f32,
    initial_lock_distance: f32,
    lead_vehicle: ActorId,
}

/// Pairwise distances between two vehicles' plain and geodesic boundaries.
#[derive(Copy, Clone, Debug)]
struct GeometryComparison {
    reference_vehicle_to_other_geodesic: f32,
    other_vehicle_to_reference_geodesic: f32,
    inter_geodesic_distance: f32,
    inter_bbox_distance: f32,
}

pub struct CollisionStage {
    collision_locks: FxHashMap<ActorId, CollisionLock>,
    // Cleared every tick.
    geodesic_boundaries: FxHashMap<ActorId, Vec<Vec3>>,
    geometry_cache: FxHashMap<(ActorId, ActorId), GeometryComparison>,
}

impl Default for CollisionStage {
    fn default() -> Self {
        Self::new()
    }
}

impl CollisionStage {
    pub fn new() -> Self {
        Self {
            collision_locks: FxHashMap::default(),
            geodesic_boundaries: FxHashMap::default(),
            geometry_cache: FxHashMap::default(),
        }
    }

    /// Drop the per-tick boundary and geometry caches.
    pub fn begin_tick(&mut self) {
        self.geodesic_boundaries.clear();
        self.geometry_cache.clear();
    }

    /// Build every vehicle's geodesic boundary up front on the Rayon pool.
    ///
    /// Purely a warm-up for the per-tick cache: `update` produces identical
    /// results with or without it.  Must run after [`begin_tick`].
    ///
    /// [`begin_tick`]: CollisionStage::begin_tick
    #[cfg(feature = "parallel")]
    pub fn prepare_boundaries(
        &mut self,
        vehicles: &[ActorId],
        graph: &RoadGraph,
        state: &SimulationState,
        params: &ParameterStore,
        buffers: &BufferMap,
    ) {
        use rayon::prelude::*;

        // Extensions read the collision locks, so resolve them before
        // fanning out.
        let extensions: Vec<f32> = vehicles
            .iter()
            .map(|&vehicle| {
                params
                    .distance_to_leading_vehicle(vehicle)
                    .max(self.bounding_box_extension(vehicle, state))
            })
            .collect();

        let boundaries: Vec<(ActorId, Vec<Vec3>)> = vehicles
            .par_iter()
            .zip(extensions.par_iter())
            .map(|(&vehicle, &extension)| {
                (vehicle, build_geodesic_boundary(vehicle, extension, graph, state, buffers))
            })
            .collect();
        self.geodesic_boundaries.extend(boundaries);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        actor: ActorId,
        graph: &RoadGraph,
        state: &SimulationState,
        params: &ParameterStore,
        buffers: &BufferMap,
        occupancy: &OccupancyTracker,
        rng: &mut ActorRng,
        output: &mut CollisionHazardData,
    ) {
        *output = CollisionHazardData::default();
        let Some(buffer) = buffers.get(&actor) else { return };
        if buffer.is_empty() {
            return;
        }

        let location = state.location(actor);
        let speed = state.velocity(actor).length();
        let look_ahead_index = target_waypoint(buffer, graph, JUNCTION_LOOK_AHEAD)
            .map(|(_, index)| index)
            .unwrap_or(0);

        let mut radius_square = {
            let r = COLLISION_RADIUS_RATE * speed + COLLISION_RADIUS_MIN;
            r * r
        };
        if speed < 2.0 {
            let r = COLLISION_RADIUS_STOP + state.attributes(actor).half_length;
            radius_square = r * r;
        }
        let leading_distance = params.distance_to_leading_vehicle(actor);
        if leading_distance > radius_square {
            radius_square = leading_distance * leading_distance;
        }

        // Nearest-first candidate list from the shared grid cells.
        let mut candidates: Vec<(f32, ActorId)> = Vec::new();
        for other in occupancy.overlapping_actors(actor) {
            if other == actor || !state.contains(other) {
                continue;
            }
            let other_location = state.location(other);
            let d2 = location.distance_squared(other_location);
            if d2 < radius_square
                && (location.z - other_location.z).abs() < VERTICAL_OVERLAP_THRESHOLD
            {
                candidates.push((d2, other));
            }
        }
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

        for (_, other) in candidates {
            if params.collision_ignored(actor, other) {
                continue;
            }
            let (hazard, margin) = self.negotiate_collision(
                actor,
                other,
                look_ahead_index,
                graph,
                state,
                params,
                buffers,
            );
            if hazard {
                let ignore = match state.kind(other) {
                    ActorKind::Vehicle => {
                        params.percentage_ignore_vehicles(actor) > rng.next_percentage()
                    }
                    ActorKind::Walker => {
                        params.percentage_ignore_walkers(actor) > rng.next_percentage()
                    }
                    _ => true,
                };
                if !ignore {
                    output.hazard = true;
                    output.hazard_actor = other;
                    output.available_distance_margin = margin;
                    break;
                }
            }
        }
    }

    /// Decide whether `reference` must yield to `other`.
    #[allow(clippy::too_many_arguments)]
    fn negotiate_collision(
        &mut self,
        reference: ActorId,
        other: ActorId,
        look_ahead_index: usize,
        graph: &RoadGraph,
        state: &SimulationState,
        params: &ParameterStore,
        buffers: &BufferMap,
    ) -> (bool, f32) {
        let reference_location = state.location(reference);
        let other_location = state.location(other);
        let reference_heading = state.heading(reference);
        let other_heading = state.heading(other);

        let reference_length = state.attributes(reference).half_length * SQUARE_ROOT_OF_TWO;
        let other_length = state.attributes(other).half_length * SQUARE_ROOT_OF_TWO;
        let reference_extension = self.bounding_box_extension(reference, state);
        let other_extension = self.bounding_box_extension(other, state);
        let inter_vehicle_length = reference_length + other_length;

        let ego_detection_range = {
            let r = reference_extension + inter_vehicle_length;
            r * r
        };
        let cross_detection_range = {
            let r = reference_extension + inter_vehicle_length + other_extension;
            r * r
        };

        let to_other = other_location - reference_location;
        let to_reference = reference_location - other_location;
        let inter_vehicle_distance = to_other.length_squared();
        let other_in_front = reference_heading.dot(to_other.normalized()) > 0.0;

        let buffer = buffers.get(&reference);
        let front_junction = buffer
            .and_then(|b| b.front())
            .and_then(|&id| graph.get(id))
            .is_some_and(|wp| wp.is_junction);
        let look_ahead_junction = buffer
            .and_then(|b| b.get(look_ahead_index))
            .and_then(|&id| graph.get(id))
            .is_some_and(|wp| wp.is_junction);
        let ego_inside_junction = front_junction;
        let ego_at_junction_entrance = !front_junction && look_ahead_junction;

        let tl = state.traffic_light(reference);
        let ego_stopped_by_light =
            tl.state != TrafficLightColor::Green && tl.state != TrafficLightColor::Off;

        let relevant = !(ego_at_junction_entrance && tl.at_traffic_light && ego_stopped_by_light)
            && ((ego_inside_junction && inter_vehicle_distance < cross_detection_range)
                || (!ego_inside_junction
                    && other_in_front
                    && inter_vehicle_distance < ego_detection_range));
        if !relevant {
            return (false, f32::INFINITY);
        }

        let geometry =
            self.geometry_between_actors(reference, other, graph, state, params, buffers);

        let geodesic_touching = geometry.inter_geodesic_distance < OVERLAP_THRESHOLD;
        let bbox_touching = geometry.inter_bbox_distance < OVERLAP_THRESHOLD;
        let ego_path_clear = geometry.other_vehicle_to_reference_geodesic > OVERLAP_THRESHOLD;
        let other_path_clear = geometry.reference_vehicle_to_other_geodesic > OVERLAP_THRESHOLD;
        let ego_path_priority = geometry.reference_vehicle_to_other_geodesic
            < geometry.other_vehicle_to_reference_geodesic;
        let other_path_priority = geometry.reference_vehicle_to_other_geodesic
            > geometry.other_vehicle_to_reference_geodesic;
        let ego_angular_priority = reference_heading.dot(to_other.normalized())
            < other_heading.dot(to_reference.normalized());

        let lower_priority = !ego_path_priority && (other_path_priority || !ego_angular_priority);
        let blocked_by_other = !ego_path_clear || (other_path_clear && lower_priority);
        let yield_pre_crossing = !bbox_touching && blocked_by_other;
        let yield_while_crossing = bbox_touching && !ego_angular_priority;

        let hazard = geodesic_touching && (yield_pre_crossing || yield_while_crossing);

        if hazard {
            let specific = params
                .distance_to_leading_vehicle(reference)
                .max(MIN_REFERENCE_DISTANCE);
            let margin =
                (geometry.reference_vehicle_to_other_geodesic - specific).max(0.0);

            match self.collision_locks.get_mut(&reference) {
                Some(lock) if lock.lead_vehicle == other => {
                    lock.distance_to_lead_vehicle =
                        if geometry.other_vehicle_to_reference_geodesic < OVERLAP_THRESHOLD {
                            geometry.inter_bbox_distance
                        } else {
                            geometry.reference_vehicle_to_other_geodesic
                        };
                }
                Some(lock) => {
                    *lock = CollisionLock {
                        distance_to_lead_vehicle: geometry.inter_bbox_distance,
                        initial_lock_distance: geometry.inter_bbox_distance,
                        lead_vehicle: other,
                    };
                }
                None => {
                    self.collision_locks.insert(
                        reference,
                        CollisionLock {
                            distance_to_lead_vehicle: geometry.inter_bbox_distance,
                            initial_lock_distance: geometry.inter_bbox_distance,
                            lead_vehicle: other,
                        },
                    );
                }
            }
            (true, margin)
        } else {
            self.collision_locks.remove(&reference);
            (false, f32::INFINITY)
        }
    }

    /// How far the bounding box extends ahead of the vehicle this tick.
    fn bounding_box_extension(&self, actor: ActorId, state: &SimulationState) -> f32 {
        let forward_speed = state.velocity(actor).dot(state.heading(actor));
        let speed_term = VEL_EXT_FACTOR * forward_speed;
        let mut extension = BOUNDARY_EXTENSION_MINIMUM + speed_term * speed_term;

        // A held lock keeps the boundary touching the lead vehicle so the
        // hazard does not flicker as the gap breathes.
        if let Some(lock) = self.collision_locks.get(&actor) {
            let lock_extension = lock.distance_to_lead_vehicle + LOCKING_DISTANCE_PADDING;
            if lock_extension - lock.initial_lock_distance < MAX_LOCKING_EXTENSION {
                extension = lock_extension;
            }
        }
        extension
    }

    /// Bounding box swept along the waypoint buffer up to the extension
    /// distance, cached per actor per tick.
    fn geodesic_boundary(
        &mut self,
        actor: ActorId,
        graph: &RoadGraph,
        state: &SimulationState,
        params: &ParameterStore,
        buffers: &BufferMap,
    ) -> Vec<Vec3> {
        if let Some(cached) = self.geodesic_boundaries.get(&actor) {
            return cached.clone();
        }
        let extension = params
            .distance_to_leading_vehicle(actor)
            .max(self.bounding_box_extension(actor, state));
        let polygon = build_geodesic_boundary(actor, extension, graph, state, buffers);
        self.geodesic_boundaries.insert(actor, polygon.clone());
        polygon
    }

    /// All four boundary distances for a pair, order-independent and cached
    /// per tick.
    fn geometry_between_actors(
        &mut self,
        reference: ActorId,
        other: ActorId,
        graph: &RoadGraph,
        state: &SimulationState,
        params: &ParameterStore,
        buffers: &BufferMap,
    ) -> GeometryComparison {
        let swapped = other < reference;
        let key = if swapped { (other, reference) } else { (reference, other) };

        let mut geometry = match self.geometry_cache.get(&key) {
            Some(cached) => *cached,
            None => {
                let reference_polygon = plain_boundary(reference, state);
                let other_polygon = plain_boundary(other, state);
                let reference_geodesic =
                    self.geodesic_boundary(reference, graph, state, params, buffers);
                let other_geodesic = self.geodesic_boundary(other, graph, state, params, buffers);

                let computed = GeometryComparison {
                    reference_vehicle_to_other_geodesic: polygon_distance(
                        &reference_polygon,
                        &other_geodesic,
                    ),
                    other_vehicle_to_reference_geodesic: polygon_distance(
                        &other_polygon,
                        &reference_geodesic,
                    ),
                    inter_geodesic_distance: polygon_distance(
                        &reference_geodesic,
                        &other_geodesic,
                    ),
                    inter_bbox_distance: polygon_distance(&reference_polygon, &other_polygon),
                };
                // Store under the canonical order.
                let stored = if swapped {
                    GeometryComparison {
                        reference_vehicle_to_other_geodesic: computed
                            .other_vehicle_to_reference_geodesic,
                        other_vehicle_to_reference_geodesic: computed
                            .reference_vehicle_to_other_geodesic,
                        ..computed
                    }
                } else {
                    computed
                };
                self.geometry_cache.insert(key, stored);
                stored
            }
        };

        if swapped {
            std::mem::swap(
                &mut geometry.reference_vehicle_to_other_geodesic,
                &mut geometry.other_vehicle_to_reference_geodesic,
            );
        }
        geometry
    }

    pub fn remove_actor(&mut self, actor: ActorId) {
        self.collision_locks.remove(&actor);
    }

    pub fn reset(&mut self) {
        self.collision_locks.clear();
        self.geodesic_boundaries.clear();
        self.geometry_cache.clear();
    }
}

/// Plain bounding-box footprint, widened for walkers by their travel over
/// the next lock-on window.
fn plain_boundary(actor: ActorId, state: &SimulationState) -> Vec<Vec3> {
    let location = state.location(actor);
    let heading = state.heading(actor);
    let attrs = state.attributes(actor);

    let forward_extension = if state.kind(actor) == ActorKind::Walker {
        state.velocity(actor).length() * WALKER_TIME_EXTENSION
    } else {
        0.0
    };

    let x_vec = heading * (attrs.half_length + forward_extension);
    let perpendicular = Vec3::new(-heading.y, heading.x, 0.0).normalized();
    let y_vec = perpendicular * (attrs.half_width + forward_extension);

    vec![
        location + x_vec - y_vec,
        location - x_vec - y_vec,
        location - x_vec + y_vec,
        location + x_vec + y_vec,
    ]
}

/// Sweep the bounding box along the waypoint buffer for `extension` metres,
/// producing the path polygon used for geodesic distance tests.
fn build_geodesic_boundary(
    actor: ActorId,
    extension: f32,
    graph: &RoadGraph,
    state: &SimulationState,
    buffers: &BufferMap,
) -> Vec<Vec3> {
    let bbox = plain_boundary(actor, state);

    let Some(buffer) = buffers.get(&actor).filter(|b| !b.is_empty()) else {
        return bbox;
    };
    let attrs = state.attributes(actor);
    let extension_square = extension * extension;

    let start = target_waypoint(buffer, graph, attrs.half_length);
    let Some((start_location, start_index)) =
        start.and_then(|(id, index)| graph.get(id).map(|wp| (wp.location(), index)))
    else {
        return bbox;
    };

    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut end_forward: Option<Vec3> = None;
    let last = buffer.len() - 1;

    for j in start_index..buffer.len() {
        let Some(wp) = graph.get(buffer[j]) else { continue };
        let reached =
            start_location.distance_squared(wp.location()) > extension_square || j == last;
        // Sample only where the road bends enough to matter.
        let bends = end_forward.is_none_or(|f| f.dot(wp.forward()) < COS_10_DEGREES);
        if bends || reached {
            let perpendicular = wp.transform.rotation.right_vector();
            left.push(wp.location() + perpendicular * attrs.half_width);
            right.push(wp.location() - perpendicular * attrs.half_width);
            end_forward = Some(wp.forward());
        }
        if reached {
            break;
        }
    }

    let mut polygon = Vec::with_capacity(left.len() + right.len() + bbox.len());
    polygon.extend(right.iter().rev().copied());
    polygon.extend(bbox.iter().copied());
    polygon.extend(left);
    polygon
}

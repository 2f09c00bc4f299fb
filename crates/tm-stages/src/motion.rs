//! Motion planning: turns the hazard flags and the waypoint buffer into one
//! host command per vehicle per tick.
//!
//! Physics-driven vehicles get a PID-actuated `ApplyVehicleControl`;
//! hybrid-mode vehicles outside the physics radius get an `ApplyTransform`
//! teleport along their buffer; dormant vehicles are respawned near the
//! hero when that is enabled.  Target velocity is the configured ceiling
//! lowered by junction approach, turn curvature, and lead-vehicle
//! following, with a per-tick deceleration cap so braking stays smooth.

use rustc_hash::FxHashMap;

use tm_core::constants::hybrid::HYBRID_MODE_DT;
use tm_core::constants::motion::{
    ATTEMPTS_TO_TELEPORT, CRITICAL_BRAKING_MARGIN, EPSILON_RELATIVE_SPEED, FOLLOW_LEAD_FACTOR,
    FRICTION, GRAVITY, LANDMARK_DETECTION_TIME, MAX_JUNCTION_BLOCK_DISTANCE,
    MIN_FOLLOW_LEAD_DISTANCE, PERC_MAX_SLOWDOWN, RELATIVE_APPROACH_SPEED, TL_TARGET_VELOCITY,
};
use tm_core::constants::pid::{
    LATERAL, LATERAL_HIGHWAY, LONGITUDINAL, LONGITUDINAL_HIGHWAY,
};
use tm_core::constants::speed::{AFTER_JUNCTION_MIN_SPEED, HIGHWAY_SPEED};
use tm_core::constants::waypoint::{
    MIN_SAFE_INTERVAL_LENGTH, MIN_TARGET_WAYPOINT_DISTANCE, TARGET_WAYPOINT_TIME_HORIZON,
};
use tm_core::{
    ActorId, ActorRng, Command, Timestamp, Transform, Vec3, VehicleControl,
};
use tm_graph::RoadGraph;
use tm_params::ParameterStore;
use tm_state::{
    target_waypoint, Buffer, BufferMap, KinematicState, OccupancyTracker, SimulationState,
};

use crate::frames::{CollisionHazardData, LocalizationData};
use crate::pid::{self, StateEntry};

pub struct MotionPlanStage {
    pid_state: FxHashMap<ActorId, StateEntry>,
    /// Elapsed-seconds stamp of the last teleport per hybrid vehicle.
    teleportation_instance: FxHashMap<ActorId, f64>,
}

impl Default for MotionPlanStage {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionPlanStage {
    pub fn new() -> Self {
        Self {
            pid_state: FxHashMap::default(),
            teleportation_instance: FxHashMap::default(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        actor: ActorId,
        graph: &RoadGraph,
        state: &mut SimulationState,
        params: &ParameterStore,
        buffers: &BufferMap,
        occupancy: &mut OccupancyTracker,
        rng: &mut ActorRng,
        timestamp: Timestamp,
        hero_location: Vec3,
        localization: &LocalizationData,
        collision: &CollisionHazardData,
        tl_hazard: bool,
    ) -> Option<Command> {
        let location = state.location(actor);
        let velocity = state.velocity(actor);
        let speed = velocity.length();
        let heading = state.heading(actor);
        let rotation = state.rotation(actor);
        let physics_enabled = state.physics_enabled(actor);
        let speed_limit = state.speed_limit(actor);
        let is_dormant = state.is_dormant(actor);

        let hero_alive = hero_location != Vec3::ZERO;
        if is_dormant && params.respawn_dormant_vehicles() && hero_alive {
            self.pid_state.insert(actor, StateEntry::default());

            let stamp = *self
                .teleportation_instance
                .entry(actor)
                .or_insert(timestamp.elapsed_seconds);
            let (lower_bound, upper_bound) = params.respawn_boundaries();
            let dilate_factor = (upper_bound - lower_bound) / 100.0;
            let elapsed = timestamp.elapsed_seconds - stamp;

            let mut teleportation_transform = Transform::new(location, rotation);
            if params.synchronous_mode() || elapsed > HYBRID_MODE_DT as f64 {
                let random_sample = rng.next_percentage() * dilate_factor + lower_bound;
                let candidates =
                    graph.waypoints_in_annulus(hero_location, ATTEMPTS_TO_TELEPORT, random_sample);
                for id in candidates {
                    let Some(wp) = graph.get(id) else { continue };
                    if occupancy.is_grid_free(wp.grid_id, actor) {
                        teleportation_transform = wp.transform;
                        teleportation_transform.location.z += 0.5;
                        occupancy.update_grid_position(actor, [wp.grid_id]);
                        self.teleportation_instance.insert(actor, timestamp.elapsed_seconds);
                        break;
                    }
                }
            }

            state.update_kinematics(
                actor,
                KinematicState {
                    location: teleportation_transform.location,
                    rotation: teleportation_transform.rotation,
                    velocity,
                    speed_limit,
                    physics_enabled,
                    is_dormant,
                    hybrid_end_location: teleportation_transform.location,
                },
            );
            return Some(Command::ApplyTransform { actor, transform: teleportation_transform });
        }

        let buffer = buffers.get(&actor)?;
        if buffer.is_empty() {
            return None;
        }

        let mut max_target_velocity = params.vehicle_target_velocity(actor, speed_limit);
        max_target_velocity = max_target_velocity
            .min(self.junction_approach_velocity(buffer, graph, location, max_target_velocity))
            .min(turn_target_velocity(buffer, graph, max_target_velocity));

        let (collision_emergency_stop, dynamic_target_velocity) = self.collision_handling(
            collision,
            tl_hazard,
            velocity,
            heading,
            max_target_velocity,
            state,
        );

        let safe_after_junction =
            safe_after_junction(localization, tl_hazard, collision_emergency_stop, state, occupancy, graph);

        let emergency_stop = tl_hazard || collision_emergency_stop || !safe_after_junction;

        if physics_enabled && !is_dormant {
            let target_point_distance =
                (speed * TARGET_WAYPOINT_TIME_HORIZON).max(MIN_TARGET_WAYPOINT_DISTANCE);
            let target = target_waypoint(buffer, graph, target_point_distance)
                .and_then(|(id, _)| graph.get(id))?;
            let offset = params.lane_offset(actor);
            let right_vector = target.transform.rotation.right_vector();
            let target_location = target.location()
                + Vec3::new(offset * right_vector.x, offset * right_vector.y, 0.0);

            let dot =
                heading.flatten().dot((target_location - location).flatten().normalized());
            let cross = heading.x * (target_location.y - location.y)
                - heading.y * (target_location.x - location.x);
            let mut angular_deviation = dot.clamp(-1.0, 1.0).acos() / std::f32::consts::PI;
            if cross < 0.0 {
                angular_deviation *= -1.0;
            }
            let velocity_deviation = if dynamic_target_velocity > 0.0 {
                (dynamic_target_velocity - speed) / dynamic_target_velocity
            } else {
                -1.0
            };

            let previous_state = *self.pid_state.entry(actor).or_default();
            let (longitudinal, lateral) = if speed > HIGHWAY_SPEED {
                (LONGITUDINAL_HIGHWAY, LATERAL_HIGHWAY)
            } else {
                (LONGITUDINAL, LATERAL)
            };

            let mut current_state =
                StateEntry { angular_deviation, velocity_deviation, steer: 0.0 };
            let mut actuation = pid::run_step(current_state, previous_state, longitudinal, lateral);
            if emergency_stop {
                actuation.throttle = 0.0;
                actuation.brake = 1.0;
            }

            current_state.steer = actuation.steer;
            self.pid_state.insert(actor, current_state);

            Some(Command::ApplyVehicleControl {
                actor,
                control: VehicleControl {
                    throttle: actuation.throttle,
                    steer: actuation.steer,
                    brake: actuation.brake,
                },
            })
        } else {
            // Hybrid-driven vehicle: flush the controller and step the
            // transform along the buffer instead.
            self.pid_state.insert(actor, StateEntry::default());
            let stamp = *self
                .teleportation_instance
                .entry(actor)
                .or_insert(timestamp.elapsed_seconds);
            let elapsed = timestamp.elapsed_seconds - stamp;

            let teleportation_transform = if !emergency_stop
                && (params.synchronous_mode() || elapsed > HYBRID_MODE_DT as f64)
            {
                self.teleportation_instance.insert(actor, timestamp.elapsed_seconds);
                let target_displacement = dynamic_target_velocity * HYBRID_MODE_DT;
                let front = buffer.front().and_then(|&id| graph.get(id))?;
                let target_base = front.transform;
                let target_heading = target_base.forward_vector();
                let correct_heading = (target_base.location - location).normalized();

                let teleport_location =
                    if location.distance(target_base.location) < target_displacement {
                        location + target_heading.normalized() * target_displacement
                    } else {
                        location + correct_heading * target_displacement
                    };
                Transform::new(teleport_location, target_base.rotation)
            } else {
                // Hold position between hybrid windows and on emergencies.
                Transform::new(location, rotation)
            };

            state.set_hybrid_end_location(actor, teleportation_transform.location);
            Some(Command::ApplyTransform { actor, transform: teleportation_transform })
        }
    }

    /// Ceiling from an upcoming junction, ramping linearly down to the
    /// junction crawl speed over the detection window.
    fn junction_approach_velocity(
        &self,
        buffer: &Buffer,
        graph: &RoadGraph,
        location: Vec3,
        max_target_velocity: f32,
    ) -> f32 {
        let max_distance = LANDMARK_DETECTION_TIME * max_target_velocity;
        for &id in buffer.iter() {
            let Some(wp) = graph.get(id) else { continue };
            let distance = wp.location().distance(location);
            if distance > max_distance {
                break;
            }
            if wp.is_junction {
                let minimum = TL_TARGET_VELOCITY;
                let ramp =
                    ((max_target_velocity - minimum) / max_distance) * distance + minimum;
                return ramp.max(minimum);
            }
        }
        f32::MAX
    }

    /// Lower the target velocity behind a lead vehicle; emergency-brake
    /// inside the critical margin.
    fn collision_handling(
        &self,
        collision: &CollisionHazardData,
        tl_hazard: bool,
        velocity: Vec3,
        heading: Vec3,
        max_target_velocity: f32,
        state: &SimulationState,
    ) -> (bool, f32) {
        let mut collision_emergency_stop = false;
        let mut dynamic_target_velocity = max_target_velocity;
        let speed = velocity.length();

        if collision.hazard && !tl_hazard {
            let other_velocity = state.velocity(collision.hazard_actor);
            let relative_speed = (velocity - other_velocity).length();
            let margin = collision.available_distance_margin;
            let other_speed_along_heading = other_velocity.dot(heading);

            // Only brake while actually closing the gap.
            if relative_speed > EPSILON_RELATIVE_SPEED {
                let follow_lead_distance = FOLLOW_LEAD_FACTOR * speed + MIN_FOLLOW_LEAD_DISTANCE;
                if margin > follow_lead_distance {
                    dynamic_target_velocity = other_speed_along_heading;
                } else if margin > CRITICAL_BRAKING_MARGIN {
                    dynamic_target_velocity =
                        other_speed_along_heading.max(RELATIVE_APPROACH_SPEED);
                } else {
                    collision_emergency_stop = true;
                }
            }
            if margin < CRITICAL_BRAKING_MARGIN {
                collision_emergency_stop = true;
            }
        }

        // Cap the per-tick slowdown.
        let max_gradual_velocity = PERC_MAX_SLOWDOWN * speed;
        if dynamic_target_velocity < speed - max_gradual_velocity {
            dynamic_target_velocity = speed - max_gradual_velocity;
        }
        (collision_emergency_stop, dynamic_target_velocity.min(max_target_velocity))
    }

    pub fn remove_actor(&mut self, actor: ActorId) {
        self.pid_state.remove(&actor);
        self.teleportation_instance.remove(&actor);
    }

    pub fn reset(&mut self) {
        self.pid_state.clear();
        self.teleportation_instance.clear();
    }
}

/// Hold at a junction entrance while slow traffic blocks the stretch just
/// past its exit.
fn safe_after_junction(
    localization: &LocalizationData,
    tl_hazard: bool,
    collision_emergency_stop: bool,
    state: &SimulationState,
    occupancy: &OccupancyTracker,
    graph: &RoadGraph,
) -> bool {
    if tl_hazard || collision_emergency_stop || !localization.is_at_junction_entrance {
        return true;
    }
    let (Some(end_id), Some(safe_id)) = (localization.junction_end, localization.safe_point)
    else {
        return true;
    };
    let (Some(end_wp), Some(safe_wp)) = (graph.get(end_id), graph.get(safe_id)) else {
        return true;
    };
    if end_wp.location().distance_squared(safe_wp.location())
        <= MIN_SAFE_INTERVAL_LENGTH * MIN_SAFE_INTERVAL_LENGTH
    {
        return true;
    }

    let mid_point = (end_wp.location() + safe_wp.location()) * 0.5;
    for blocking in occupancy.passing_vehicles(safe_id) {
        // Vehicles still crossing the junction end are leaving, not parked.
        if occupancy.passing_vehicles(end_id).any(|v| v == blocking) {
            continue;
        }
        let blocking_location = state.location(blocking);
        if blocking_location.distance_squared(mid_point)
            < MAX_JUNCTION_BLOCK_DISTANCE * MAX_JUNCTION_BLOCK_DISTANCE
            && state.velocity(blocking).length_squared()
                < AFTER_JUNCTION_MIN_SPEED * AFTER_JUNCTION_MIN_SPEED
        {
            return false;
        }
    }
    true
}

/// Curvature-limited speed from a three-point circle through the buffer.
fn turn_target_velocity(buffer: &Buffer, graph: &RoadGraph, max_target_velocity: f32) -> f32 {
    if buffer.len() < 3 {
        return max_target_velocity;
    }
    let first = buffer.front().and_then(|&id| graph.get(id));
    let middle = buffer.get(buffer.len() / 2).and_then(|&id| graph.get(id));
    let last = buffer.back().and_then(|&id| graph.get(id));
    let (Some(first), Some(middle), Some(last)) = (first, middle, last) else {
        return max_target_velocity;
    };
    let radius =
        three_point_circle_radius(first.location(), middle.location(), last.location());
    (radius * FRICTION * GRAVITY).sqrt()
}

fn three_point_circle_radius(first: Vec3, middle: Vec3, last: Vec3) -> f32 {
    let (x1, y1) = (first.x, first.y);
    let (x2, y2) = (middle.x, middle.y);
    let (x3, y3) = (last.x, last.y);

    let x12 = x1 - x2;
    let x13 = x1 - x3;
    let y12 = y1 - y2;
    let y13 = y1 - y3;
    let y31 = y3 - y1;
    let y21 = y2 - y1;
    let x31 = x3 - x1;
    let x21 = x2 - x1;

    let sx13 = x1 * x1 - x3 * x3;
    let sy13 = y1 * y1 - y3 * y3;
    let sx21 = x2 * x2 - x1 * x1;
    let sy21 = y2 * y2 - y1 * y1;

    let f_denom = 2.0 * (y31 * x12 - y21 * x13);
    let g_denom = 2.0 * (x31 * y12 - x21 * y13);
    // Collinear points mean a straight road.
    if f_denom == 0.0 || g_denom == 0.0 {
        return f32::MAX;
    }

    let f = (sx13 * x12 + sy13 * x12 + sx21 * x13 + sy21 * x13) / f_denom;
    let g = (sx13 * y12 + sy13 * y12 + sx21 * y13 + sy21 * y13) / g_denom;
    let c = -(x1 * x1) - y1 * y1 - 2.0 * g * x1 - 2.0 * f * y1;

    (g * g + f * f - c).max(0.0).sqrt()
}

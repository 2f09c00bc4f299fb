//! Tuned numeric constants, grouped by the subsystem that owns them.
//!
//! These values are behavioral calibration, not physics: changing them
//! changes how traffic looks, not whether it is correct.  Distances are
//! metres, speeds m/s, times seconds, angles degrees unless noted.

/// Remote façade networking.
pub mod networking {
    /// Bounded retry count for binding the server socket at startup.
    pub const MIN_TRY_COUNT: u32 = 20;
    /// Default port a manager instance advertises on.
    pub const DEFAULT_PORT: u16 = 8000;
    /// Request timeout for remote calls, milliseconds.
    pub const RPC_TIMEOUT_MS: u64 = 2000;
}

/// Stuck-vehicle eviction.
pub mod removal {
    /// Below this speed a vehicle counts as stopped.
    pub const STOPPED_VELOCITY_THRESHOLD: f32 = 0.8;
    /// Idle seconds before a stopped vehicle is evicted.
    pub const BLOCKED_TIME_THRESHOLD: f64 = 90.0;
    /// Longer grace period while held at a red light.
    pub const RED_TL_BLOCKED_TIME_THRESHOLD: f64 = 180.0;
    /// Minimum seconds between two evictions.
    pub const DELTA_TIME_BETWEEN_DESTRUCTIONS: f64 = 10.0;
}

/// Hybrid physics mode.
pub mod hybrid {
    /// Fixed timestep assumed for kinematic teleport projection.
    pub const HYBRID_MODE_DT: f32 = 0.05;
    /// Physics stays enabled within this radius of a hero actor.
    pub const PHYSICS_RADIUS: f32 = 50.0;
    pub const PHYSICS_RADIUS_SQUARED: f32 = PHYSICS_RADIUS * PHYSICS_RADIUS;
}

/// Speed classification thresholds.
pub mod speed {
    /// Above this a vehicle uses the highway PID gain set (60 km/h).
    pub const HIGHWAY_SPEED: f32 = 60.0 / 3.6;
    /// Floor applied right after leaving a junction (5 km/h).
    pub const AFTER_JUNCTION_MIN_SPEED: f32 = 5.0 / 3.6;
}

/// Waypoint-buffer maintenance.
pub mod path {
    /// Max distance between a vehicle and its buffer front before a rebuild.
    pub const MAX_START_DISTANCE: f32 = 20.0;
    /// Buffer horizon = clamp(speed * rate, min, ...).
    pub const MINIMUM_HORIZON_LENGTH: f32 = 15.0;
    pub const HORIZON_RATE: f32 = 2.0;
    pub const HIGH_SPEED_HORIZON_RATE: f32 = 4.0;
}

/// Target-point and junction look-ahead selection.
pub mod waypoint {
    /// Seconds of travel used to pick the steering target waypoint.
    pub const TARGET_WAYPOINT_TIME_HORIZON: f32 = 0.3;
    pub const MIN_TARGET_WAYPOINT_DISTANCE: f32 = 3.0;
    /// Look-ahead used to detect an upcoming junction entrance.
    pub const JUNCTION_LOOK_AHEAD: f32 = 5.0;
    /// Distance past a junction that counts as clear of it.
    pub const SAFE_DISTANCE_AFTER_JUNCTION: f32 = 4.0;
    /// Junctions shorter than this are treated as non-blocking.
    pub const MIN_JUNCTION_LENGTH: f32 = 8.0;
    pub const MIN_SAFE_INTERVAL_LENGTH: f32 = 0.5 * MIN_JUNCTION_LENGTH;
}

/// Lane-change decision making.
pub mod lane_change {
    pub const MINIMUM_LANE_CHANGE_DISTANCE: f32 = 20.0;
    pub const MAXIMUM_LANE_OBSTACLE_DISTANCE: f32 = 50.0;
    pub const MAXIMUM_LANE_OBSTACLE_CURVATURE: f32 = 0.6;
    pub const INTER_LANE_CHANGE_DISTANCE: f32 = 10.0;
    /// Sample window on the target lane, waypoints ahead/behind.
    pub const MIN_WPT_DISTANCE: f32 = 5.0;
    pub const MAX_WPT_DISTANCE: f32 = 20.0;
    /// No voluntary changes below this speed (m/s).
    pub const MIN_LANE_CHANGE_SPEED: f32 = 5.0;
    pub const FIFTYPERC: f32 = 50.0;
}

/// Collision detection and negotiation.
pub mod collision {
    pub const BOUNDARY_EXTENSION_MINIMUM: f32 = 2.5;
    pub const COS_10_DEGREES: f32 = 0.9848;
    pub const OVERLAP_THRESHOLD: f32 = 0.1;
    pub const LOCKING_DISTANCE_PADDING: f32 = 4.0;
    pub const COLLISION_RADIUS_STOP: f32 = 8.0;
    pub const COLLISION_RADIUS_MIN: f32 = 20.0;
    pub const COLLISION_RADIUS_RATE: f32 = 2.65;
    pub const MAX_LOCKING_EXTENSION: f32 = 10.0;
    pub const WALKER_TIME_EXTENSION: f32 = 1.5;
    pub const SQUARE_ROOT_OF_TWO: f32 = 1.414;
    pub const VERTICAL_OVERLAP_THRESHOLD: f32 = 4.0;
    pub const MIN_REFERENCE_DISTANCE: f32 = 0.5;
    pub const VEL_EXT_FACTOR: f32 = 0.36;
}

/// Per-tick frame allocation.
pub mod frame {
    pub const INITIAL_SIZE: usize = 50;
    pub const GROWTH_STEP_SIZE: usize = 50;
}

/// Road-graph construction.
pub mod map {
    /// Waypoints per geodesic grid cell.
    pub const MAX_GEODESIC_GRID_LENGTH: usize = 20;
    /// Sampling resolution of the discretized graph.
    pub const MAP_RESOLUTION: f32 = 5.0;
    /// Subdivide where successive samples turn more than this (radians).
    pub const MAX_WPT_RADIANS: f32 = 0.087;
    /// Annulus width for randomized-placement queries.
    pub const DELTA: f32 = 25.0;
    /// Vertical tolerance for annulus membership.
    pub const Z_DELTA: f32 = 5.0;
    /// Junction exits within ±this of straight keep the Straight tag.
    pub const STRAIGHT_DEG: f32 = 19.0;
    /// Lanes narrower than this get no lane-change links.
    pub const MIN_LANE_WIDTH: f32 = 1.0;
}

/// Unsignalized junction arbitration.
pub mod traffic_light {
    /// A queue head must have been stationary at least this long.
    pub const MINIMUM_STOP_TIME: f64 = 2.0;
}

/// Motion planning.
pub mod motion {
    pub const RELATIVE_APPROACH_SPEED: f32 = 12.0 / 3.6;
    pub const MIN_FOLLOW_LEAD_DISTANCE: f32 = 2.0;
    pub const CRITICAL_BRAKING_MARGIN: f32 = 0.2;
    pub const EPSILON_RELATIVE_SPEED: f32 = 0.001;
    pub const MAX_JUNCTION_BLOCK_DISTANCE: f32 = 4.0;
    pub const ATTEMPTS_TO_TELEPORT: usize = 5;
    pub const LANDMARK_DETECTION_TIME: f32 = 3.5;
    pub const TL_TARGET_VELOCITY: f32 = 15.0 / 3.6;
    pub const STOP_TARGET_VELOCITY: f32 = 10.0 / 3.6;
    pub const YIELD_TARGET_VELOCITY: f32 = 10.0 / 3.6;
    pub const FRICTION: f32 = 0.6;
    pub const GRAVITY: f32 = 9.81;
    /// Max fraction of current speed shed per tick by landmark slowdown.
    pub const PERC_MAX_SLOWDOWN: f32 = 0.08;
    pub const FOLLOW_LEAD_FACTOR: f32 = 2.0;
}

/// Vehicle light inference.
pub mod light {
    pub const SUN_ALTITUDE_DEGREES_BEFORE_DAWN: f32 = 15.0;
    pub const SUN_ALTITUDE_DEGREES_AFTER_SUNSET: f32 = 165.0;
    pub const SUN_ALTITUDE_DEGREES_JUST_AFTER_DAWN: f32 = 35.0;
    pub const SUN_ALTITUDE_DEGREES_JUST_BEFORE_SUNSET: f32 = 145.0;
    pub const HEAVY_PRECIPITATION_THRESHOLD: f32 = 80.0;
    pub const FOG_DENSITY_THRESHOLD: f32 = 20.0;
    /// Squared distance bound for the turn-indicator buffer scan.
    pub const MAX_DISTANCE_LIGHT_CHECK: f32 = 225.0;
}

/// PID gains and actuation clamps.
pub mod pid {
    pub const MAX_THROTTLE: f32 = 0.85;
    pub const MAX_BRAKE: f32 = 0.7;
    pub const MAX_STEERING: f32 = 0.8;
    /// Steering slew limit per tick.
    pub const MAX_STEERING_DIFF: f32 = 0.15;
    pub const DT: f32 = 0.05;
    /// Longitudinal gains (kp, ki, kd) — urban and highway sets.
    pub const LONGITUDINAL: [f32; 3] = [12.0, 0.05, 0.02];
    pub const LONGITUDINAL_HIGHWAY: [f32; 3] = [20.0, 0.05, 0.01];
    /// Lateral gains (kp, ki, kd) — urban and highway sets.
    pub const LATERAL: [f32; 3] = [4.0, 0.02, 0.08];
    pub const LATERAL_HIGHWAY: [f32; 3] = [2.0, 0.02, 0.04];
}

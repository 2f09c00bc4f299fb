//! Per-tick stage output frames.
//!
//! Each stage writes one slot per registered vehicle, indexed by the
//! vehicle's position in the registration list for that tick.  Frames are
//! plain `Vec`s owned by the scheduler and resized ahead of the stage loop,
//! so stages never allocate on the hot path.

use tm_core::{ActorId, Command, WaypointId};

/// Localization result for one vehicle.
#[derive(Clone, Debug, Default)]
pub struct LocalizationData {
    /// The vehicle's buffer front is just short of a junction boundary.
    pub is_at_junction_entrance: bool,
    /// First non-junction waypoint after the upcoming junction.
    pub junction_end: Option<WaypointId>,
    /// Waypoint a safe distance past the junction end.
    pub safe_point: Option<WaypointId>,
}

/// Collision result for one vehicle.
#[derive(Clone, Debug)]
pub struct CollisionHazardData {
    pub hazard: bool,
    /// The obstacle that caused the hazard; `INVALID` when none.
    pub hazard_actor: ActorId,
    /// Distance the vehicle may still close before reaching its configured
    /// following distance behind the obstacle.
    pub available_distance_margin: f32,
}

impl Default for CollisionHazardData {
    fn default() -> Self {
        Self {
            hazard: false,
            hazard_actor: ActorId::INVALID,
            available_distance_margin: f32::INFINITY,
        }
    }
}

pub type LocalizationFrame = Vec<LocalizationData>;
pub type CollisionFrame = Vec<CollisionHazardData>;
/// One flag per vehicle: stopped by a signal or junction arbitration.
pub type TrafficLightFrame = Vec<bool>;
/// Ordered host commands for the tick; one actuation or teleport per
/// vehicle, plus any light-state changes appended by the light stage.
pub type ControlFrame = Vec<Command>;

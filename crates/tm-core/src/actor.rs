//! Host-side world observation types.
//!
//! The traffic manager reads the world exclusively through snapshots: once
//! per tick the host hands over the full actor list with kinematics, and the
//! lifecycle reconciler diffs it against the previous tick.  Nothing in the
//! pipeline holds a live reference into the host.

use crate::{ActorId, BoundingBox, Timestamp, TrafficLightColor, Transform, Vec3};

/// What kind of actor a snapshot row describes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ActorKind {
    Vehicle,
    Walker,
    TrafficLight,
    Other,
}

/// One actor's state as observed by the host this frame.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActorSnapshot {
    pub id: ActorId,
    pub kind: ActorKind,
    pub transform: Transform,
    pub velocity: Vec3,
    pub bounds: BoundingBox,
    /// Posted speed limit in m/s (vehicles only).
    pub speed_limit: f32,
    /// Host has deprioritized this actor (e.g. out of streaming range).
    pub is_dormant: bool,
    /// Actor carries the "hero"/ego role name.
    pub is_hero: bool,
    /// Vehicle is inside a signal's trigger volume.
    pub at_traffic_light: bool,
    /// Color of the affecting signal (vehicles), or of the head itself
    /// (traffic-light actors).
    pub light_state: TrafficLightColor,
}

impl ActorSnapshot {
    /// Minimal vehicle snapshot for construction sites and tests.
    pub fn vehicle(id: ActorId, transform: Transform, velocity: Vec3) -> Self {
        Self {
            id,
            kind: ActorKind::Vehicle,
            transform,
            velocity,
            bounds: BoundingBox::new(Vec3::ZERO, Vec3::new(2.3, 1.0, 0.8)),
            speed_limit: 30.0 / 3.6,
            is_dormant: false,
            is_hero: false,
            at_traffic_light: false,
            light_state: TrafficLightColor::Unknown,
        }
    }
}

/// Ambient weather inputs for the light stage.
#[derive(Copy, Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Weather {
    /// Sun altitude angle in degrees; low/high values mean night.
    pub sun_altitude_angle: f32,
    /// Precipitation intensity, 0–100.
    pub precipitation: f32,
    /// Fog density, 0–100.
    pub fog_density: f32,
}

/// Full world observation for one host frame.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorldSnapshot {
    pub timestamp: Timestamp,
    pub actors: Vec<ActorSnapshot>,
}

//! Host-facing command batch and its payload types.
//!
//! One tick of the pipeline produces an ordered `CommandBatch` which the
//! scheduler submits to the host simulator in a single call.  Commands are a
//! closed sum type: the host matches on the variant and applies the effect;
//! the manager never observes the result directly (it shows up in the next
//! world snapshot).

use crate::{ActorId, Transform};

// ── Actuation payloads ───────────────────────────────────────────────────────

/// Normalized vehicle actuation, all components in `[0, 1]` except steer
/// which is `[-1, 1]`.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VehicleControl {
    pub throttle: f32,
    pub steer: f32,
    pub brake: f32,
}

impl VehicleControl {
    pub fn new(throttle: f32, steer: f32, brake: f32) -> Self {
        Self { throttle, steer, brake }
    }

    /// Full brake, zero throttle, straight wheel.
    pub fn full_stop() -> Self {
        Self { throttle: 0.0, steer: 0.0, brake: 1.0 }
    }
}

/// Bit set of vehicle light groups.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VehicleLightFlags(pub u32);

impl VehicleLightFlags {
    pub const POSITION: u32 = 1 << 0;
    pub const LOW_BEAM: u32 = 1 << 1;
    pub const HIGH_BEAM: u32 = 1 << 2;
    pub const BRAKE: u32 = 1 << 3;
    pub const RIGHT_BLINKER: u32 = 1 << 4;
    pub const LEFT_BLINKER: u32 = 1 << 5;
    pub const FOG: u32 = 1 << 6;

    /// Set or clear one light group.
    #[inline]
    pub fn set(&mut self, group: u32, on: bool) {
        if on {
            self.0 |= group;
        } else {
            self.0 &= !group;
        }
    }

    #[inline]
    pub fn contains(self, group: u32) -> bool {
        self.0 & group != 0
    }
}

/// Signal head color as reported by the host.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrafficLightColor {
    Red,
    Yellow,
    Green,
    Off,
    #[default]
    Unknown,
}

/// Tag describing how a waypoint continues the route.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum RoadOption {
    #[default]
    Void = 0,
    Left = 1,
    Right = 2,
    Straight = 3,
    LaneFollow = 4,
    ChangeLaneLeft = 5,
    ChangeLaneRight = 6,
    RoadEnd = 7,
}

impl RoadOption {
    /// Decode the cache-file byte; unknown values collapse to `Void`.
    pub fn from_u8(b: u8) -> RoadOption {
        match b {
            1 => RoadOption::Left,
            2 => RoadOption::Right,
            3 => RoadOption::Straight,
            4 => RoadOption::LaneFollow,
            5 => RoadOption::ChangeLaneLeft,
            6 => RoadOption::ChangeLaneRight,
            7 => RoadOption::RoadEnd,
            _ => RoadOption::Void,
        }
    }
}

// ── Command ──────────────────────────────────────────────────────────────────

/// One host-side effect requested by the pipeline.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// Ask the host to spawn an actor from a blueprint string at a pose.
    SpawnActor { blueprint: String, transform: Transform },
    /// Remove an actor from the world (stuck-vehicle eviction).
    DestroyActor { actor: ActorId },
    /// Closed-loop actuation for a physics-enabled vehicle.
    ApplyVehicleControl { actor: ActorId, control: VehicleControl },
    /// Toggle physics simulation for an actor (hybrid mode).
    SetSimulatePhysics { actor: ActorId, enabled: bool },
    /// Kinematic teleport for a physics-disabled vehicle.
    ApplyTransform { actor: ActorId, transform: Transform },
    /// Update a vehicle's light groups.
    SetVehicleLightState { actor: ActorId, lights: VehicleLightFlags },
    /// Force a signal head to a color.
    SetTrafficLightState { actor: ActorId, state: TrafficLightColor },
    /// Free-form console command forwarded to the host.
    ConsoleCommand { command: String },
}

/// The ordered per-tick output submitted to the host in one call.
pub type CommandBatch = Vec<Command>;

//! `tm-core` — foundational types for the traffic-manager workspace.
//!
//! This crate is a dependency of every other `tm-*` crate.  It intentionally
//! has no `tm-*` dependencies and minimal external ones (only `rand` and
//! `thiserror`, plus optional `serde`).
//!
//! # What lives here
//!
//! | Module        | Contents                                                |
//! |---------------|---------------------------------------------------------|
//! | [`ids`]       | `ActorId`, `WaypointId`, `SegmentId`, `RoadId`, …       |
//! | [`geo`]       | `Vec3`, `Rotation`, `Transform`, `BoundingBox`          |
//! | [`time`]      | `Timestamp` (host frame counter + elapsed seconds)      |
//! | [`rng`]       | `ActorRng` (per-vehicle deterministic RNG)              |
//! | [`command`]   | `Command` batch variants, `VehicleControl`, light flags |
//! | [`actor`]     | `ActorSnapshot`, `WorldSnapshot`, `Weather`             |
//! | [`constants`] | Tuned numeric constants, grouped by subsystem           |
//! | [`error`]     | `TmError`, `TmResult`                                   |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                       |
//! |---------|--------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to all public value types.    |
//!           | Required by `tm-remote`.                                     |

pub mod actor;
pub mod command;
pub mod constants;
pub mod error;
pub mod geo;
pub mod ids;
pub mod rng;
pub mod time;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use actor::{ActorKind, ActorSnapshot, Weather, WorldSnapshot};
pub use command::{Command, CommandBatch, RoadOption, TrafficLightColor, VehicleControl, VehicleLightFlags};
pub use error::{TmError, TmResult};
pub use geo::{BoundingBox, Rotation, Transform, Vec3};
pub use ids::{ActorId, GeoGridId, JunctionId, RoadId, SegmentId, WaypointId};
pub use rng::ActorRng;
pub use time::Timestamp;

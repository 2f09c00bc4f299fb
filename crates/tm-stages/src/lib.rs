//! `tm-stages` — the per-vehicle pipeline stages and the lifecycle
//! reconciler that feeds them.
//!
//! Stage order within a tick is fixed: lifecycle reconciliation first, then
//! per vehicle localization → collision → traffic light → motion plan →
//! vehicle lights.  Stages communicate only through the frame types in
//! [`frames`]; persistent per-vehicle state (locks, queues, controller
//! memory) lives inside each stage struct and is dropped through its
//! `remove_actor` when the lifecycle stage reports a departure.
//!
//! # Crate layout
//!
//! | Module           | Contents                                           |
//! |------------------|----------------------------------------------------|
//! | [`lifecycle`]    | `LifecycleStage` — snapshot diffing, stuck eviction|
//! | [`localization`] | `LocalizationStage` — buffers, lane changes        |
//! | [`collision`]    | `CollisionStage` — pairwise hazard negotiation     |
//! | [`traffic_light`]| `TrafficLightStage` — signals + junction FIFO      |
//! | [`motion`]       | `MotionPlanStage` — PID drive / hybrid teleport    |
//! | [`lights`]       | `VehicleLightStage` — blinkers, beams, brake lights|
//! | [`frames`]       | Per-tick output frames shared between stages       |
//! | [`geometry`]     | Planar polygon distance for collision boundaries   |
//! | [`pid`]          | The actuation controller used by the motion stage  |

pub mod collision;
pub mod frames;
pub mod geometry;
pub mod lifecycle;
pub mod lights;
pub mod localization;
pub mod motion;
pub mod pid;
pub mod traffic_light;

#[cfg(test)]
mod tests;

pub use collision::CollisionStage;
pub use frames::{
    CollisionFrame, CollisionHazardData, ControlFrame, LocalizationData, LocalizationFrame,
    TrafficLightFrame,
};
pub use lifecycle::{LifecycleOutcome, LifecycleStage};
pub use lights::VehicleLightStage;
pub use localization::LocalizationStage;
pub use motion::MotionPlanStage;
pub use traffic_light::TrafficLightStage;

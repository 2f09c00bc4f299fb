//! `tm-state` — shared bookkeeping that couples the pipeline stages.
//!
//! # Crate layout
//!
//! | Module         | Contents                                              |
//! |----------------|-------------------------------------------------------|
//! | [`simulation`] | `SimulationState` — per-actor kinematic/static cache  |
//! | [`buffer`]     | `Buffer`, `BufferMap`, target-waypoint selection      |
//! | [`occupancy`]  | `OccupancyTracker` — waypoint/grid ↔ vehicle mapping  |
//!
//! Everything here is mutated only by the tick worker; external threads
//! never touch these structures (registration and parameters go through
//! their own synchronized paths).

pub mod buffer;
pub mod occupancy;
pub mod simulation;

#[cfg(test)]
mod tests;

pub use buffer::{target_waypoint, Buffer, BufferMap};
pub use occupancy::OccupancyTracker;
pub use simulation::{KinematicState, SimulationState, StaticAttributes, TrafficLightInfo};

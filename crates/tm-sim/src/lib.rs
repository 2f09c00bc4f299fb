//! `tm-sim` — the tick scheduler and in-process control facade.
//!
//! One [`TrafficManager`] owns a dedicated worker thread that drives the
//! pipeline once per host frame:
//!
//! ```text
//! loop:
//!   ① Lifecycle — diff the world snapshot, refresh shared state, evict
//!                 stuck vehicles, fan removals out to every stage cache.
//!   ② Frames    — size per-tick output frames (geometric growth).
//!   ③ Localization, ④ collision, ⑤ junction arbitration — one pass per
//!                 stage over all registered vehicles.
//!   ⑥ Motion plan + vehicle lights in a single pass.
//!   ⑦ Submit    — apply the accumulated command batch to the host.
//! ```
//!
//! Two timing modes: synchronous, where [`TrafficControl::synchronous_tick`]
//! gates every tick through a condition variable, and free-running, which
//! skips ticks while the host frame counter stalls and is throttled to the
//! hybrid timestep when hybrid physics is on.
//!
//! # Cargo features
//!
//! | Feature    | Effect                                                  |
//! |------------|---------------------------------------------------------|
//! | `parallel` | Warms the collision boundary cache on Rayon's pool.     |
//! | `serde`    | Serde derives on the value types of the lower layers.   |
//!
//! # Quick-start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tm_sim::{TrafficControl, TrafficManager};
//!
//! let graph = Arc::new(RoadGraph::build(&description)?);
//! let mut manager = TrafficManager::new(host, graph, seed)?;
//! manager.register_vehicles(&vehicles);
//! manager.set_synchronous_mode(true);
//! while manager.synchronous_tick() { /* host advances its own frame */ }
//! manager.shutdown();
//! ```

pub mod control;
pub mod error;
pub mod frames;
pub mod host;
pub mod manager;
mod worker;

#[cfg(test)]
mod tests;

pub use control::TrafficControl;
pub use error::{SimError, SimResult};
pub use frames::TickFrames;
pub use host::WorldHost;
pub use manager::TrafficManager;

//! `tm-graph` — discretized road graph, spatial index, and map cache.
//!
//! # Crate layout
//!
//! | Module          | Contents                                                |
//! |-----------------|---------------------------------------------------------|
//! | [`waypoint`]    | `Waypoint` — the immutable-after-build graph node       |
//! | [`description`] | `MapDescription`, `SegmentSeed` — raw lane centerlines  |
//! | [`graph`]       | `RoadGraph` — builder, R-tree queries, lane links       |
//! | [`cache`]       | Binary record codec to skip rebuilding unchanged maps   |
//! | [`error`]       | `GraphError`, `GraphResult<T>`                          |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                       |
//! |---------|--------------------------------------------------------------|
//! | `serde` | Derives `Serialize`/`Deserialize` on public types.           |

pub mod cache;
pub mod description;
pub mod error;
pub mod graph;
pub mod waypoint;

#[cfg(test)]
mod tests;

pub use description::{MapDescription, SegmentSeed};
pub use error::{GraphError, GraphResult};
pub use graph::RoadGraph;
pub use waypoint::Waypoint;

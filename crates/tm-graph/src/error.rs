//! Road-graph error type.

use thiserror::Error;

use tm_core::{SegmentId, WaypointId};

/// Errors produced by `tm-graph`.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("segment {0} referenced by topology but not described")]
    UnknownSegment(SegmentId),

    #[error("segment {0} has fewer than two centerline samples")]
    DegenerateSegment(SegmentId),

    #[error("waypoint {0} not found in graph")]
    WaypointNotFound(WaypointId),

    #[error("map cache is corrupt: {0}")]
    CorruptCache(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GraphResult<T> = Result<T, GraphError>;

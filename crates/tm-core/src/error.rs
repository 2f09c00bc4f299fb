//! Workspace error type.
//!
//! Sub-crates define their own error enums and either convert into `TmError`
//! via `From` impls or wrap it as one variant.  Transient per-tick anomalies
//! (empty buffer, missing occupancy entry) are handled locally inside the
//! stages and never surface through this type.

use thiserror::Error;

use crate::{ActorId, WaypointId};

/// The top-level error type for `tm-core` and a common base for sub-crates.
#[derive(Debug, Error)]
pub enum TmError {
    #[error("actor {0} not found")]
    ActorNotFound(ActorId),

    #[error("waypoint {0} not found")]
    WaypointNotFound(WaypointId),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand result type for all `tm-*` crates.
pub type TmResult<T> = Result<T, TmError>;

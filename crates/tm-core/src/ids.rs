//! Strongly typed, zero-cost identifier wrappers.
//!
//! All IDs are `Copy + Ord + Hash` so they can be used as map keys and sorted
//! collection elements without ceremony.  `ActorId` values come from the host
//! simulator and are opaque; `WaypointId`/`SegmentId`/`RoadId` are assigned by
//! the road-graph builder.  Junction and geodesic-grid ids are signed because
//! "-1" is their established not-attached sentinel.

use std::fmt;

/// Generate a typed ID wrapper around an unsigned primitive integer.
macro_rules! typed_id {
    ($(#[$attr:meta])* $vis:vis struct $name:ident($inner:ty);) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        $vis struct $name(pub $inner);

        impl $name {
            /// Sentinel meaning "no valid ID" — the type's maximum value.
            pub const INVALID: $name = $name(<$inner>::MAX);

            /// Cast to `usize` for direct use as a `Vec` index.
            #[inline(always)]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl Default for $name {
            /// Returns the `INVALID` sentinel so uninitialized IDs are visibly invalid.
            #[inline(always)]
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<$name> for u64 {
            #[inline(always)]
            fn from(id: $name) -> u64 {
                id.0 as u64
            }
        }
    };
}

typed_id! {
    /// Host-assigned actor handle (vehicles, walkers, traffic lights).
    pub struct ActorId(u64);
}

typed_id! {
    /// Identifier of a discretized road-graph waypoint.
    ///
    /// Encodes its origin: `segment_id << 24 | ordinal within the segment`,
    /// so cached graphs reconnect without a separate position table.
    pub struct WaypointId(u64);
}

typed_id! {
    /// Identifier of one lane-centerline segment of the map description.
    pub struct SegmentId(u32);
}

typed_id! {
    /// OpenDRIVE-style road identifier.
    pub struct RoadId(u32);
}

impl WaypointId {
    /// Bits reserved for the per-segment ordinal.
    const ORDINAL_BITS: u32 = 24;

    /// Compose an id from the owning segment and the waypoint's ordinal.
    #[inline]
    pub fn compose(segment: SegmentId, ordinal: u32) -> WaypointId {
        debug_assert!(ordinal < (1 << Self::ORDINAL_BITS));
        WaypointId(((segment.0 as u64) << Self::ORDINAL_BITS) | ordinal as u64)
    }

    /// The segment this waypoint was sampled from.
    #[inline]
    pub fn segment(self) -> SegmentId {
        SegmentId((self.0 >> Self::ORDINAL_BITS) as u32)
    }
}

// ── Signed ids with a −1 sentinel ────────────────────────────────────────────

/// Identifier of a junction, or `NONE` (−1) when a waypoint belongs to none.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JunctionId(pub i64);

/// Identifier of a geodesic grid cell, or `NONE` (−1) before assignment.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoGridId(pub i64);

macro_rules! signed_id_impls {
    ($name:ident) => {
        impl $name {
            /// "Not attached" sentinel.
            pub const NONE: $name = $name(-1);

            #[inline(always)]
            pub fn is_some(self) -> bool {
                self.0 >= 0
            }
        }

        impl Default for $name {
            #[inline(always)]
            fn default() -> Self {
                Self::NONE
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

signed_id_impls!(JunctionId);
signed_id_impls!(GeoGridId);

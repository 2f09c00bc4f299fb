//! Host time model.
//!
//! The host simulator owns time: every world snapshot carries a frame
//! counter and the elapsed simulated seconds.  The traffic manager never
//! integrates time itself — all dwell/idle/cooldown logic compares elapsed
//! seconds between two snapshots, which keeps the pipeline correct under
//! both fixed-step and variable-step hosts.

/// A host timestamp: monotonically increasing frame counter plus elapsed
/// simulated seconds since episode start.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestamp {
    pub frame: u64,
    pub elapsed_seconds: f64,
}

impl Timestamp {
    #[inline]
    pub fn new(frame: u64, elapsed_seconds: f64) -> Self {
        Self { frame, elapsed_seconds }
    }

    /// Seconds elapsed from `earlier` to `self` (negative if out of order).
    #[inline]
    pub fn seconds_since(self, earlier: Timestamp) -> f64 {
        self.elapsed_seconds - earlier.elapsed_seconds
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "F{} ({:.3}s)", self.frame, self.elapsed_seconds)
    }
}

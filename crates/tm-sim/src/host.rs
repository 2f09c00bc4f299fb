//! The boundary to the simulator that owns the actors.

use tm_core::{CommandBatch, Weather, WorldSnapshot};

/// Everything the traffic manager needs from the host simulator.
///
/// The manager drives these calls from its own worker thread, so
/// implementations must be safe to use off the host's main thread.  The
/// manager never mutates actors directly; all mutation flows back through
/// [`apply_batch`].
///
/// [`apply_batch`]: WorldHost::apply_batch
pub trait WorldHost: Send + 'static {
    /// Monotonic frame counter of the host simulation.
    ///
    /// The free-running loop skips ticks while this has not advanced.
    /// Counting starts at 1; the manager treats frame 0 as "not yet
    /// simulating".
    fn frame_count(&self) -> u64;

    /// Full actor snapshot for the current frame.
    fn snapshot(&self) -> WorldSnapshot;

    /// Ambient weather, read once per tick for the vehicle light stage.
    fn weather(&self) -> Weather;

    /// Apply one tick's accumulated commands.  Called exactly once per
    /// tick, possibly with an empty batch.
    fn apply_batch(&self, batch: CommandBatch);
}

//! Per-tick frame allocation with geometric growth.

use tm_core::constants::frame::{GROWTH_STEP_SIZE, INITIAL_SIZE};
use tm_stages::{CollisionFrame, LocalizationFrame, TrafficLightFrame};

/// The stage output frames for one tick, one slot per registered vehicle.
///
/// Capacity only ever grows, in `GROWTH_STEP_SIZE` increments, so steady
/// vehicle counts never reallocate on the hot path.
pub struct TickFrames {
    capacity: usize,
    pub localization: LocalizationFrame,
    pub collision: CollisionFrame,
    pub traffic_light: TrafficLightFrame,
}

impl Default for TickFrames {
    fn default() -> Self {
        Self::new()
    }
}

impl TickFrames {
    pub fn new() -> Self {
        Self {
            capacity: INITIAL_SIZE,
            localization: vec![Default::default(); INITIAL_SIZE],
            collision: vec![Default::default(); INITIAL_SIZE],
            traffic_light: vec![false; INITIAL_SIZE],
        }
    }

    /// Smallest capacity covering `required` slots, growing `current` in
    /// whole steps.
    pub fn grown_capacity(current: usize, required: usize) -> usize {
        let mut capacity = current.max(INITIAL_SIZE);
        while capacity < required {
            capacity += GROWTH_STEP_SIZE;
        }
        capacity
    }

    /// Make room for `vehicle_count` slots ahead of the stage loops.
    pub fn resize(&mut self, vehicle_count: usize) {
        let capacity = Self::grown_capacity(self.capacity, vehicle_count);
        if capacity != self.capacity {
            self.localization.resize(capacity, Default::default());
            self.collision.resize(capacity, Default::default());
            self.traffic_light.resize(capacity, false);
            self.capacity = capacity;
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

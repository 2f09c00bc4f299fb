//! Discrete PID actuation controller.
//!
//! One step per vehicle per tick against the fixed control timestep.  The
//! longitudinal term drives throttle/brake from the relative velocity
//! deviation, the lateral term drives steering from the angular deviation
//! toward the target waypoint.  Gains come in urban and highway sets,
//! selected per tick by the motion stage.

use tm_core::constants::pid::{DT, MAX_BRAKE, MAX_STEERING, MAX_STEERING_DIFF, MAX_THROTTLE};

/// Controller state carried per vehicle between ticks.
#[derive(Copy, Clone, Debug, Default)]
pub struct StateEntry {
    /// Signed fraction of a half-turn toward the target point.
    pub angular_deviation: f32,
    /// `(target - current) / target` speed error.
    pub velocity_deviation: f32,
    /// Steering actually commanded, for the slew limit.
    pub steer: f32,
}

/// One actuation output.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ActuationSignal {
    pub throttle: f32,
    pub brake: f32,
    pub steer: f32,
}

/// Run one PID step.  `longitudinal` and `lateral` are `(kp, ki, kd)`.
pub fn run_step(
    current: StateEntry,
    previous: StateEntry,
    longitudinal: [f32; 3],
    lateral: [f32; 3],
) -> ActuationSignal {
    let expr_v = longitudinal[0] * current.velocity_deviation
        + longitudinal[1] * (current.velocity_deviation + previous.velocity_deviation) * DT
        + longitudinal[2] * (current.velocity_deviation - previous.velocity_deviation) / DT;

    let (throttle, brake) = if expr_v > 0.0 {
        (expr_v.min(MAX_THROTTLE), 0.0)
    } else {
        (0.0, expr_v.abs().min(MAX_BRAKE))
    };

    let mut steer = lateral[0] * current.angular_deviation
        + lateral[1] * (current.angular_deviation + previous.angular_deviation) * DT
        + lateral[2] * (current.angular_deviation - previous.angular_deviation) / DT;

    // Slew-limit against the last commanded steer, then hard clamp.
    steer = steer.clamp(previous.steer - MAX_STEERING_DIFF, previous.steer + MAX_STEERING_DIFF);
    steer = steer.clamp(-MAX_STEERING, MAX_STEERING);

    ActuationSignal { throttle, brake, steer }
}

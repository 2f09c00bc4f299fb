//! The control facade shared by the in-process manager and the remote
//! client.

use tm_core::{ActorId, RoadOption, Vec3};

/// Operations a host uses to drive a traffic manager instance.
///
/// Two implementations exist: [`TrafficManager`](crate::TrafficManager)
/// (in-process) and the TCP client in `tm-remote`.  Parameter setters are
/// fire-and-forget and safe to call from any thread while a tick is
/// running; they take effect no later than the next tick.
pub trait TrafficControl {
    // ── Registration ──────────────────────────────────────────────────────

    /// Hand a set of vehicles over to the manager.  Already registered ids
    /// are ignored.
    fn register_vehicles(&self, actors: &[ActorId]);

    /// Take vehicles back from the manager.  Their per-actor state is
    /// dropped from every stage before the next tick starts.
    fn unregister_vehicles(&self, actors: &[ActorId]);

    // ── Speed ─────────────────────────────────────────────────────────────

    /// Percentage deviation from the speed limit (negative drives faster).
    fn set_percentage_speed_difference(&self, actor: ActorId, percentage: f32);
    fn set_global_percentage_speed_difference(&self, percentage: f32);
    /// Exact target speed in m/s, overriding the percentage deviation.
    fn set_desired_speed(&self, actor: ActorId, speed: f32);

    // ── Spacing and lanes ─────────────────────────────────────────────────

    fn set_distance_to_leading_vehicle(&self, actor: ActorId, distance: f32);
    fn set_global_distance_to_leading_vehicle(&self, distance: f32);
    /// Lateral displacement from the lane center (positive is right).
    fn set_lane_offset(&self, actor: ActorId, offset: f32);
    fn set_global_lane_offset(&self, offset: f32);
    fn set_auto_lane_change(&self, actor: ActorId, enable: bool);
    /// One-shot forced lane change, consumed by the next localization pass.
    fn set_force_lane_change(&self, actor: ActorId, direction_left: bool);
    fn set_keep_right_percentage(&self, actor: ActorId, percentage: f32);
    fn set_random_left_lane_change_percentage(&self, actor: ActorId, percentage: f32);
    fn set_random_right_lane_change_percentage(&self, actor: ActorId, percentage: f32);

    // ── Rule compliance ───────────────────────────────────────────────────

    fn set_percentage_running_light(&self, actor: ActorId, percentage: f32);
    fn set_percentage_running_sign(&self, actor: ActorId, percentage: f32);
    fn set_percentage_ignore_vehicles(&self, actor: ActorId, percentage: f32);
    fn set_percentage_ignore_walkers(&self, actor: ActorId, percentage: f32);
    /// Enable or disable collision negotiation of `reference` against
    /// `other`.
    fn set_collision_detection(&self, reference: ActorId, other: ActorId, detect: bool);

    // ── Lights, hybrid physics, respawning ────────────────────────────────

    fn set_update_vehicle_lights(&self, actor: ActorId, update: bool);
    fn set_hybrid_physics_mode(&self, enabled: bool);
    fn set_hybrid_physics_radius(&self, radius: f32);
    fn set_osm_mode(&self, enabled: bool);
    fn set_respawn_dormant_vehicles(&self, enabled: bool);
    fn set_respawn_boundaries(&self, lower: f32, upper: f32);

    // ── Custom paths and routes ───────────────────────────────────────────

    fn upload_path(&self, actor: ActorId, points: Vec<Vec3>, empty_buffer: bool);
    fn upload_route(&self, actor: ActorId, options: Vec<RoadOption>, empty_buffer: bool);

    // ── Determinism ───────────────────────────────────────────────────────

    /// Reseed every per-vehicle RNG.  Takes effect at the next tick start.
    fn set_random_device_seed(&self, seed: u64);

    // ── Tick control ──────────────────────────────────────────────────────

    fn set_synchronous_mode(&self, enabled: bool);
    fn set_synchronous_mode_timeout_ms(&self, timeout: u64);

    /// Run exactly one tick and block until it completes.  Returns `false`
    /// when the manager is shut down or not in synchronous mode.
    fn synchronous_tick(&self) -> bool;

    /// Drop every registered vehicle and all per-actor state, keeping the
    /// worker alive for further use.
    fn reset(&self);

    /// Stop the worker thread and clear all shared structures.  Idempotent.
    fn shutdown(&mut self);
}

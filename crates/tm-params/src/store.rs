//! The parameter store.
//!
//! Every map is keyed by `ActorId` and guarded by one `RwLock` over the
//! whole store: writes are rare (host configuration calls), reads are
//! per-vehicle per-tick, and none of the critical sections do more than a
//! hash probe.  Percentages are expressed in `[0, 100]` and compared against
//! [`ActorRng::next_percentage`](tm_core::ActorRng::next_percentage).

use std::sync::RwLock;

use rustc_hash::{FxHashMap, FxHashSet};

use tm_core::{ActorId, RoadOption, Vec3};

/// Clamp bounds for the dormant-respawn annulus.
const RESPAWN_LOWER_MIN: f32 = 25.0;
const RESPAWN_UPPER_MAX: f32 = 700.0;

/// A pending forced lane change.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChangeLaneInfo {
    /// `true` = change left, `false` = change right.
    pub direction_left: bool,
}

/// A literal-location path uploaded for one vehicle.
#[derive(Clone, Debug, Default)]
pub struct UploadedPath {
    pub points: Vec<Vec3>,
    /// Restart the vehicle's buffer from the path's first point.
    pub empty_buffer: bool,
}

/// A road-option route uploaded for one vehicle.
#[derive(Clone, Debug, Default)]
pub struct UploadedRoute {
    pub options: Vec<RoadOption>,
    pub empty_buffer: bool,
}

#[derive(Default)]
struct Inner {
    // ── Speed ─────────────────────────────────────────────────────────────
    percentage_difference_from_limit: FxHashMap<ActorId, f32>,
    exact_desired_speed: FxHashMap<ActorId, f32>,
    global_percentage_difference: f32,

    // ── Spacing / lanes ───────────────────────────────────────────────────
    distance_to_leading: FxHashMap<ActorId, f32>,
    global_distance_to_leading: f32,
    lane_offset: FxHashMap<ActorId, f32>,
    global_lane_offset: f32,
    auto_lane_change: FxHashMap<ActorId, bool>,
    force_lane_change: FxHashMap<ActorId, ChangeLaneInfo>,
    keep_right_percentage: FxHashMap<ActorId, f32>,
    random_left_lane_change: FxHashMap<ActorId, f32>,
    random_right_lane_change: FxHashMap<ActorId, f32>,

    // ── Rule violation probabilities ──────────────────────────────────────
    percentage_running_light: FxHashMap<ActorId, f32>,
    percentage_running_sign: FxHashMap<ActorId, f32>,
    percentage_ignore_vehicles: FxHashMap<ActorId, f32>,
    percentage_ignore_walkers: FxHashMap<ActorId, f32>,

    // ── Collision pairs ───────────────────────────────────────────────────
    ignore_collision: FxHashMap<ActorId, FxHashSet<ActorId>>,

    // ── Lights ────────────────────────────────────────────────────────────
    update_vehicle_lights: FxHashMap<ActorId, bool>,

    // ── Modes ─────────────────────────────────────────────────────────────
    hybrid_physics_mode: bool,
    hybrid_physics_radius: f32,
    osm_mode: bool,
    respawn_dormant_vehicles: bool,
    respawn_lower_bound: f32,
    respawn_upper_bound: f32,
    synchronous_mode: bool,
    synchronous_timeout_ms: u64,

    // ── Uploaded paths / routes ───────────────────────────────────────────
    upload_path: FxHashMap<ActorId, UploadedPath>,
    imported_route: FxHashMap<ActorId, UploadedRoute>,
}

/// Thread-safe behavioral configuration for one manager instance.
pub struct ParameterStore {
    inner: RwLock<Inner>,
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterStore {
    pub fn new() -> Self {
        let inner = Inner {
            global_distance_to_leading: 2.0,
            hybrid_physics_radius: 70.0,
            respawn_lower_bound: RESPAWN_LOWER_MIN,
            respawn_upper_bound: RESPAWN_UPPER_MAX,
            synchronous_timeout_ms: 10,
            ..Inner::default()
        };
        Self { inner: RwLock::new(inner) }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        // A poisoned lock means a setter panicked mid-probe; the maps are
        // still structurally sound, so continue with the recovered guard.
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    // ── Speed ─────────────────────────────────────────────────────────────

    /// Per-vehicle percentage deviation from the posted limit.  Positive
    /// slows the vehicle down, negative exceeds the limit.
    pub fn set_percentage_speed_difference(&self, actor: ActorId, percentage: f32) {
        self.write().percentage_difference_from_limit.insert(actor, percentage);
    }

    pub fn set_global_percentage_speed_difference(&self, percentage: f32) {
        self.write().global_percentage_difference = percentage;
    }

    /// Exact target speed in m/s, overriding the percentage knobs.
    pub fn set_desired_speed(&self, actor: ActorId, speed: f32) {
        self.write().exact_desired_speed.insert(actor, speed);
    }

    /// Target speed for a vehicle given its posted limit.
    pub fn vehicle_target_velocity(&self, actor: ActorId, speed_limit: f32) -> f32 {
        let inner = self.read();
        if let Some(&exact) = inner.exact_desired_speed.get(&actor) {
            return exact;
        }
        let percentage = inner
            .percentage_difference_from_limit
            .get(&actor)
            .copied()
            .unwrap_or(inner.global_percentage_difference);
        speed_limit * (1.0 - percentage / 100.0)
    }

    // ── Spacing / lanes ───────────────────────────────────────────────────

    pub fn set_distance_to_leading_vehicle(&self, actor: ActorId, distance: f32) {
        self.write().distance_to_leading.insert(actor, distance.max(0.0));
    }

    pub fn set_global_distance_to_leading_vehicle(&self, distance: f32) {
        self.write().global_distance_to_leading = distance.max(0.0);
    }

    pub fn distance_to_leading_vehicle(&self, actor: ActorId) -> f32 {
        let inner = self.read();
        inner
            .distance_to_leading
            .get(&actor)
            .copied()
            .unwrap_or(inner.global_distance_to_leading)
    }

    /// Lateral offset from the lane centerline, metres (positive = right).
    pub fn set_lane_offset(&self, actor: ActorId, offset: f32) {
        self.write().lane_offset.insert(actor, offset);
    }

    pub fn set_global_lane_offset(&self, offset: f32) {
        self.write().global_lane_offset = offset;
    }

    pub fn lane_offset(&self, actor: ActorId) -> f32 {
        let inner = self.read();
        inner.lane_offset.get(&actor).copied().unwrap_or(inner.global_lane_offset)
    }

    pub fn set_auto_lane_change(&self, actor: ActorId, enable: bool) {
        self.write().auto_lane_change.insert(actor, enable);
    }

    pub fn auto_lane_change(&self, actor: ActorId) -> bool {
        self.read().auto_lane_change.get(&actor).copied().unwrap_or(true)
    }

    /// Queue a one-shot forced lane change; consumed by localization.
    pub fn set_force_lane_change(&self, actor: ActorId, direction_left: bool) {
        self.write().force_lane_change.insert(actor, ChangeLaneInfo { direction_left });
    }

    /// Take (and clear) a pending forced lane change.
    pub fn take_force_lane_change(&self, actor: ActorId) -> Option<ChangeLaneInfo> {
        self.write().force_lane_change.remove(&actor)
    }

    pub fn set_keep_right_percentage(&self, actor: ActorId, percentage: f32) {
        self.write().keep_right_percentage.insert(actor, percentage);
    }

    pub fn keep_right_percentage(&self, actor: ActorId) -> f32 {
        self.read().keep_right_percentage.get(&actor).copied().unwrap_or(-1.0)
    }

    pub fn set_random_left_lane_change_percentage(&self, actor: ActorId, percentage: f32) {
        self.write().random_left_lane_change.insert(actor, percentage);
    }

    pub fn random_left_lane_change_percentage(&self, actor: ActorId) -> f32 {
        self.read().random_left_lane_change.get(&actor).copied().unwrap_or(0.0)
    }

    pub fn set_random_right_lane_change_percentage(&self, actor: ActorId, percentage: f32) {
        self.write().random_right_lane_change.insert(actor, percentage);
    }

    pub fn random_right_lane_change_percentage(&self, actor: ActorId) -> f32 {
        self.read().random_right_lane_change.get(&actor).copied().unwrap_or(0.0)
    }

    // ── Rule violation probabilities ──────────────────────────────────────

    pub fn set_percentage_running_light(&self, actor: ActorId, percentage: f32) {
        self.write().percentage_running_light.insert(actor, percentage);
    }

    pub fn percentage_running_light(&self, actor: ActorId) -> f32 {
        self.read().percentage_running_light.get(&actor).copied().unwrap_or(0.0)
    }

    pub fn set_percentage_running_sign(&self, actor: ActorId, percentage: f32) {
        self.write().percentage_running_sign.insert(actor, percentage);
    }

    pub fn percentage_running_sign(&self, actor: ActorId) -> f32 {
        self.read().percentage_running_sign.get(&actor).copied().unwrap_or(0.0)
    }

    pub fn set_percentage_ignore_vehicles(&self, actor: ActorId, percentage: f32) {
        self.write().percentage_ignore_vehicles.insert(actor, percentage);
    }

    pub fn percentage_ignore_vehicles(&self, actor: ActorId) -> f32 {
        self.read().percentage_ignore_vehicles.get(&actor).copied().unwrap_or(0.0)
    }

    pub fn set_percentage_ignore_walkers(&self, actor: ActorId, percentage: f32) {
        self.write().percentage_ignore_walkers.insert(actor, percentage);
    }

    pub fn percentage_ignore_walkers(&self, actor: ActorId) -> f32 {
        self.read().percentage_ignore_walkers.get(&actor).copied().unwrap_or(0.0)
    }

    // ── Collision pairs ───────────────────────────────────────────────────

    /// Enable/disable collision checks of `reference` against `other`.
    pub fn set_collision_detection(&self, reference: ActorId, other: ActorId, detect: bool) {
        let mut inner = self.write();
        if detect {
            if let Some(set) = inner.ignore_collision.get_mut(&reference) {
                set.remove(&other);
            }
        } else {
            inner.ignore_collision.entry(reference).or_default().insert(other);
        }
    }

    pub fn collision_ignored(&self, reference: ActorId, other: ActorId) -> bool {
        self.read()
            .ignore_collision
            .get(&reference)
            .is_some_and(|set| set.contains(&other))
    }

    // ── Lights ────────────────────────────────────────────────────────────

    pub fn set_update_vehicle_lights(&self, actor: ActorId, update: bool) {
        self.write().update_vehicle_lights.insert(actor, update);
    }

    pub fn update_vehicle_lights(&self, actor: ActorId) -> bool {
        self.read().update_vehicle_lights.get(&actor).copied().unwrap_or(false)
    }

    // ── Modes ─────────────────────────────────────────────────────────────

    pub fn set_hybrid_physics_mode(&self, enabled: bool) {
        self.write().hybrid_physics_mode = enabled;
    }

    pub fn hybrid_physics_mode(&self) -> bool {
        self.read().hybrid_physics_mode
    }

    pub fn set_hybrid_physics_radius(&self, radius: f32) {
        self.write().hybrid_physics_radius = radius.max(0.0);
    }

    pub fn hybrid_physics_radius(&self) -> f32 {
        self.read().hybrid_physics_radius
    }

    /// Open-graph mode: dead ends only warn instead of marking for removal.
    pub fn set_osm_mode(&self, enabled: bool) {
        self.write().osm_mode = enabled;
    }

    pub fn osm_mode(&self) -> bool {
        self.read().osm_mode
    }

    pub fn set_respawn_dormant_vehicles(&self, enabled: bool) {
        self.write().respawn_dormant_vehicles = enabled;
    }

    pub fn respawn_dormant_vehicles(&self) -> bool {
        self.read().respawn_dormant_vehicles
    }

    /// Clamped to `[25, 700]` metres, lower ≤ upper.
    pub fn set_respawn_boundaries(&self, lower: f32, upper: f32) {
        let mut inner = self.write();
        inner.respawn_lower_bound = lower.max(RESPAWN_LOWER_MIN);
        inner.respawn_upper_bound = upper.min(RESPAWN_UPPER_MAX).max(inner.respawn_lower_bound);
    }

    pub fn respawn_boundaries(&self) -> (f32, f32) {
        let inner = self.read();
        (inner.respawn_lower_bound, inner.respawn_upper_bound)
    }

    pub fn set_synchronous_mode(&self, enabled: bool) {
        self.write().synchronous_mode = enabled;
    }

    pub fn synchronous_mode(&self) -> bool {
        self.read().synchronous_mode
    }

    pub fn set_synchronous_mode_timeout_ms(&self, timeout: u64) {
        self.write().synchronous_timeout_ms = timeout;
    }

    pub fn synchronous_mode_timeout_ms(&self) -> u64 {
        self.read().synchronous_timeout_ms
    }

    // ── Uploaded paths / routes ───────────────────────────────────────────

    pub fn upload_path(&self, actor: ActorId, points: Vec<Vec3>, empty_buffer: bool) {
        self.write().upload_path.insert(actor, UploadedPath { points, empty_buffer });
    }

    /// Take (and clear) a pending custom path for `actor`.
    pub fn take_upload_path(&self, actor: ActorId) -> Option<UploadedPath> {
        self.write().upload_path.remove(&actor)
    }

    pub fn has_upload_path(&self, actor: ActorId) -> bool {
        self.read().upload_path.contains_key(&actor)
    }

    pub fn upload_route(&self, actor: ActorId, options: Vec<RoadOption>, empty_buffer: bool) {
        self.write().imported_route.insert(actor, UploadedRoute { options, empty_buffer });
    }

    /// Take (and clear) a pending imported route for `actor`.
    pub fn take_upload_route(&self, actor: ActorId) -> Option<UploadedRoute> {
        self.write().imported_route.remove(&actor)
    }

    pub fn has_upload_route(&self, actor: ActorId) -> bool {
        self.read().imported_route.contains_key(&actor)
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Purge every per-actor entry (cascading removal).
    pub fn remove_actor(&self, actor: ActorId) {
        let mut inner = self.write();
        inner.percentage_difference_from_limit.remove(&actor);
        inner.exact_desired_speed.remove(&actor);
        inner.distance_to_leading.remove(&actor);
        inner.lane_offset.remove(&actor);
        inner.auto_lane_change.remove(&actor);
        inner.force_lane_change.remove(&actor);
        inner.keep_right_percentage.remove(&actor);
        inner.random_left_lane_change.remove(&actor);
        inner.random_right_lane_change.remove(&actor);
        inner.percentage_running_light.remove(&actor);
        inner.percentage_running_sign.remove(&actor);
        inner.percentage_ignore_vehicles.remove(&actor);
        inner.percentage_ignore_walkers.remove(&actor);
        inner.ignore_collision.remove(&actor);
        for set in inner.ignore_collision.values_mut() {
            set.remove(&actor);
        }
        inner.update_vehicle_lights.remove(&actor);
        inner.upload_path.remove(&actor);
        inner.imported_route.remove(&actor);
    }

    /// Drop all per-actor state, keeping global knobs (scheduler reset).
    pub fn clear_actors(&self) {
        let mut inner = self.write();
        inner.percentage_difference_from_limit.clear();
        inner.exact_desired_speed.clear();
        inner.distance_to_leading.clear();
        inner.lane_offset.clear();
        inner.auto_lane_change.clear();
        inner.force_lane_change.clear();
        inner.keep_right_percentage.clear();
        inner.random_left_lane_change.clear();
        inner.random_right_lane_change.clear();
        inner.percentage_running_light.clear();
        inner.percentage_running_sign.clear();
        inner.percentage_ignore_vehicles.clear();
        inner.percentage_ignore_walkers.clear();
        inner.ignore_collision.clear();
        inner.update_vehicle_lights.clear();
        inner.upload_path.clear();
        inner.imported_route.clear();
    }
}

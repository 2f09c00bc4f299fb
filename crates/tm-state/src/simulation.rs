//! Per-actor state cache, refreshed once per tick by the lifecycle
//! reconciler.
//!
//! Stages read from here instead of querying the host, so one tick sees one
//! consistent world.  The traffic-light entry carries the one-tick
//! hysteresis rule: a green→yellow transition observed while the vehicle is
//! already inside the signal's trigger volume is suppressed, because
//! stopping mid-intersection is worse than continuing through.

use rustc_hash::FxHashMap;

use tm_core::{ActorId, ActorKind, Rotation, TrafficLightColor, Vec3};

/// Mutable kinematic state, refreshed every tick.
#[derive(Clone, Debug)]
pub struct KinematicState {
    pub location: Vec3,
    pub rotation: Rotation,
    pub velocity: Vec3,
    pub speed_limit: f32,
    pub physics_enabled: bool,
    pub is_dormant: bool,
    /// Where a hybrid-driven vehicle is heading between physics windows.
    pub hybrid_end_location: Vec3,
}

/// Immutable per-actor attributes, captured at registration.
#[derive(Clone, Copy, Debug)]
pub struct StaticAttributes {
    pub kind: ActorKind,
    pub half_length: f32,
    pub half_width: f32,
    pub half_height: f32,
}

/// Signal state affecting a vehicle.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrafficLightInfo {
    pub at_traffic_light: bool,
    pub state: TrafficLightColor,
}

#[derive(Default)]
struct ActorEntry {
    kinematics: KinematicState,
    attributes: StaticAttributes,
    traffic_light: TrafficLightInfo,
}

impl Default for KinematicState {
    fn default() -> Self {
        Self {
            location: Vec3::ZERO,
            rotation: Rotation::default(),
            velocity: Vec3::ZERO,
            speed_limit: 0.0,
            physics_enabled: true,
            is_dormant: false,
            hybrid_end_location: Vec3::ZERO,
        }
    }
}

impl Default for StaticAttributes {
    fn default() -> Self {
        Self { kind: ActorKind::Other, half_length: 0.0, half_width: 0.0, half_height: 0.0 }
    }
}

/// The shared simulation state: one entry per tracked actor.
#[derive(Default)]
pub struct SimulationState {
    entries: FxHashMap<ActorId, ActorEntry>,
}

impl SimulationState {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    pub fn add_actor(
        &mut self,
        id: ActorId,
        kinematics: KinematicState,
        attributes: StaticAttributes,
        traffic_light: TrafficLightInfo,
    ) {
        self.entries.insert(id, ActorEntry { kinematics, attributes, traffic_light });
    }

    pub fn remove_actor(&mut self, id: ActorId) {
        self.entries.remove(&id);
    }

    pub fn contains(&self, id: ActorId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ── Per-tick refresh ──────────────────────────────────────────────────

    pub fn update_kinematics(&mut self, id: ActorId, kinematics: KinematicState) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.kinematics = kinematics;
        }
    }

    /// Refresh signal state, applying the green→yellow hysteresis rule.
    pub fn update_traffic_light(&mut self, id: ActorId, update: TrafficLightInfo) {
        if let Some(entry) = self.entries.get_mut(&id) {
            let previous = entry.traffic_light;
            if previous.at_traffic_light
                && update.at_traffic_light
                && previous.state == TrafficLightColor::Green
                && update.state == TrafficLightColor::Yellow
            {
                return;
            }
            entry.traffic_light = update;
        }
    }

    pub fn set_physics_enabled(&mut self, id: ActorId, enabled: bool) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.kinematics.physics_enabled = enabled;
        }
    }

    pub fn set_hybrid_end_location(&mut self, id: ActorId, location: Vec3) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.kinematics.hybrid_end_location = location;
        }
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    #[inline]
    pub fn location(&self, id: ActorId) -> Vec3 {
        self.entries.get(&id).map_or(Vec3::ZERO, |e| e.kinematics.location)
    }

    #[inline]
    pub fn rotation(&self, id: ActorId) -> Rotation {
        self.entries.get(&id).map_or_else(Rotation::default, |e| e.kinematics.rotation)
    }

    #[inline]
    pub fn heading(&self, id: ActorId) -> Vec3 {
        self.rotation(id).forward_vector()
    }

    #[inline]
    pub fn velocity(&self, id: ActorId) -> Vec3 {
        self.entries.get(&id).map_or(Vec3::ZERO, |e| e.kinematics.velocity)
    }

    #[inline]
    pub fn speed_limit(&self, id: ActorId) -> f32 {
        self.entries.get(&id).map_or(0.0, |e| e.kinematics.speed_limit)
    }

    #[inline]
    pub fn physics_enabled(&self, id: ActorId) -> bool {
        self.entries.get(&id).is_some_and(|e| e.kinematics.physics_enabled)
    }

    #[inline]
    pub fn is_dormant(&self, id: ActorId) -> bool {
        self.entries.get(&id).is_some_and(|e| e.kinematics.is_dormant)
    }

    #[inline]
    pub fn hybrid_end_location(&self, id: ActorId) -> Vec3 {
        self.entries.get(&id).map_or(Vec3::ZERO, |e| e.kinematics.hybrid_end_location)
    }

    #[inline]
    pub fn kind(&self, id: ActorId) -> ActorKind {
        self.entries.get(&id).map_or(ActorKind::Other, |e| e.attributes.kind)
    }

    #[inline]
    pub fn attributes(&self, id: ActorId) -> StaticAttributes {
        self.entries.get(&id).map_or_else(StaticAttributes::default, |e| e.attributes)
    }

    #[inline]
    pub fn traffic_light(&self, id: ActorId) -> TrafficLightInfo {
        self.entries.get(&id).map_or_else(TrafficLightInfo::default, |e| e.traffic_light)
    }

    pub fn actor_ids(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.entries.keys().copied()
    }
}

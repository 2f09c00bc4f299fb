//! Actor lifecycle reconciliation, run once per tick ahead of the stages.
//!
//! Diffs the host's world snapshot against the registered and unregistered
//! actor sets: refreshes the shared simulation state, tracks heroes and the
//! hybrid physics radius, books unregistered actors into the occupancy
//! tracker so registered vehicles avoid them, and evicts vehicles that have
//! been stuck long enough to block traffic.

use rustc_hash::{FxHashMap, FxHashSet};

use tm_core::constants::hybrid::HYBRID_MODE_DT;
use tm_core::constants::removal::{
    BLOCKED_TIME_THRESHOLD, DELTA_TIME_BETWEEN_DESTRUCTIONS, RED_TL_BLOCKED_TIME_THRESHOLD,
    STOPPED_VELOCITY_THRESHOLD,
};
use tm_core::{
    ActorId, ActorKind, ActorSnapshot, Command, TrafficLightColor, Vec3, WorldSnapshot,
};
use tm_graph::RoadGraph;
use tm_params::ParameterStore;
use tm_state::{
    BufferMap, KinematicState, OccupancyTracker, SimulationState, StaticAttributes,
    TrafficLightInfo,
};

/// What changed this tick: vehicles whose stage state must be dropped, and
/// commands for the host.
#[derive(Debug, Default)]
pub struct LifecycleOutcome {
    pub removed: Vec<ActorId>,
    pub commands: Vec<Command>,
}

pub struct LifecycleStage {
    unregistered: FxHashSet<ActorId>,
    heroes: FxHashMap<ActorId, Vec3>,
    /// Elapsed-seconds stamp of the last observed movement per vehicle.
    idle_time: FxHashMap<ActorId, f64>,
    has_physics_enabled: FxHashMap<ActorId, bool>,
    elapsed_last_destruction: f64,
    hero_location: Vec3,
}

impl Default for LifecycleStage {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleStage {
    pub fn new() -> Self {
        Self {
            unregistered: FxHashSet::default(),
            heroes: FxHashMap::default(),
            idle_time: FxHashMap::default(),
            has_physics_enabled: FxHashMap::default(),
            elapsed_last_destruction: 0.0,
            hero_location: Vec3::ZERO,
        }
    }

    /// Hero location captured during the last update; `ZERO` when no hero
    /// vehicle is alive.
    pub fn hero_location(&self) -> Vec3 {
        self.hero_location
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        snapshot: &WorldSnapshot,
        registered: &[ActorId],
        graph: &RoadGraph,
        state: &mut SimulationState,
        params: &ParameterStore,
        buffers: &mut BufferMap,
        occupancy: &mut OccupancyTracker,
        marked_for_removal: &mut Vec<ActorId>,
    ) -> LifecycleOutcome {
        let mut outcome = LifecycleOutcome::default();
        let now = snapshot.timestamp.elapsed_seconds;

        let world: FxHashMap<ActorId, &ActorSnapshot> =
            snapshot.actors.iter().map(|a| (a.id, a)).collect();

        // Registered vehicles destroyed by the host.
        for &actor in registered {
            if !world.contains_key(&actor) {
                self.destroy_bookkeeping(actor, state, buffers, occupancy);
                outcome.removed.push(actor);
            }
        }

        // Unregistered actors destroyed by the host.
        let gone: Vec<ActorId> = self
            .unregistered
            .iter()
            .copied()
            .filter(|id| !world.contains_key(id))
            .collect();
        for actor in gone {
            self.unregistered.remove(&actor);
            self.heroes.remove(&actor);
            state.remove_actor(actor);
            occupancy.remove_actor(actor);
        }
        self.heroes.retain(|id, _| world.contains_key(id));

        // Newly appeared actors.
        let registered_set: FxHashSet<ActorId> = registered.iter().copied().collect();
        for actor in &snapshot.actors {
            if actor.kind == ActorKind::Vehicle && actor.is_hero {
                self.heroes.insert(actor.id, actor.transform.location);
            }
            if matches!(actor.kind, ActorKind::Vehicle | ActorKind::Walker)
                && !registered_set.contains(&actor.id)
            {
                self.unregistered.insert(actor.id);
            }
        }
        self.hero_location = self.heroes.values().next().copied().unwrap_or(Vec3::ZERO);

        // ── Registered vehicle data ───────────────────────────────────────
        let hybrid = params.hybrid_physics_mode();
        let radius = params.hybrid_physics_radius();
        let radius_square = radius * radius;

        let mut max_idle: Option<(ActorId, f64)> = None;
        for &actor in registered {
            let Some(&snap) = world.get(&actor) else { continue };
            self.update_registered(
                actor,
                snap,
                hybrid,
                radius_square,
                now,
                state,
                &mut outcome.commands,
            );
            if !self.heroes.contains_key(&actor) {
                if let Some(&stamp) = self.idle_time.get(&actor) {
                    if max_idle.is_none_or(|(_, best)| stamp < best) {
                        max_idle = Some((actor, stamp));
                    }
                }
            }
        }

        // Evict the longest-idle vehicle once it counts as stuck.
        if let Some((actor, stamp)) = max_idle {
            if self.is_vehicle_stuck(stamp, now, state.traffic_light(actor).state)
                && now - self.elapsed_last_destruction > DELTA_TIME_BETWEEN_DESTRUCTIONS
            {
                log::info!("destroying stuck vehicle {actor}");
                self.destroy_bookkeeping(actor, state, buffers, occupancy);
                outcome.removed.push(actor);
                outcome.commands.push(Command::DestroyActor { actor });
                self.elapsed_last_destruction = now;
            }
        }

        // Vehicles that ran out of road.
        if params.osm_mode() {
            for actor in marked_for_removal.drain(..) {
                self.destroy_bookkeeping(actor, state, buffers, occupancy);
                outcome.removed.push(actor);
                outcome.commands.push(Command::DestroyActor { actor });
            }
        } else {
            marked_for_removal.clear();
        }

        // ── Unregistered actor data ───────────────────────────────────────
        for &actor in &self.unregistered {
            let Some(&snap) = world.get(&actor) else { continue };
            update_unregistered(actor, snap, graph, state, occupancy);
        }

        outcome
    }

    #[allow(clippy::too_many_arguments)]
    fn update_registered(
        &mut self,
        actor: ActorId,
        snap: &ActorSnapshot,
        hybrid: bool,
        radius_square: f32,
        now: f64,
        state: &mut SimulationState,
        commands: &mut Vec<Command>,
    ) {
        let location = snap.transform.location;
        if now != 0.0 {
            self.idle_time.entry(actor).or_insert(now);
        }

        let in_range_of_hero = self
            .heroes
            .values()
            .any(|hero| hero.distance_squared(location) < radius_square);
        let enable_physics = if hybrid { in_range_of_hero } else { true };
        let is_hero = self.heroes.contains_key(&actor);

        if !is_hero && self.has_physics_enabled.get(&actor) != Some(&enable_physics) {
            commands.push(Command::SetSimulatePhysics { actor, enabled: enable_physics });
            self.has_physics_enabled.insert(actor, enable_physics);
        }

        // Hybrid-driven vehicles report no physics velocity; derive it from
        // the teleport displacement instead.
        let velocity = if state.contains(actor) && !state.physics_enabled(actor) {
            (state.hybrid_end_location(actor) - location) * (1.0 / HYBRID_MODE_DT)
        } else {
            snap.velocity
        };
        let hybrid_end_location = if state.contains(actor) {
            state.hybrid_end_location(actor)
        } else {
            location
        };

        let kinematics = KinematicState {
            location,
            rotation: snap.transform.rotation,
            velocity,
            speed_limit: snap.speed_limit,
            physics_enabled: enable_physics,
            is_dormant: snap.is_dormant,
            hybrid_end_location,
        };
        let traffic_light =
            TrafficLightInfo { at_traffic_light: snap.at_traffic_light, state: snap.light_state };

        if state.contains(actor) {
            state.update_kinematics(actor, kinematics);
            state.update_traffic_light(actor, traffic_light);
        } else {
            state.add_actor(actor, kinematics, attributes_of(snap), traffic_light);
        }

        // A moving vehicle is not idle.
        let speed_square = velocity.length_squared();
        if speed_square > STOPPED_VELOCITY_THRESHOLD * STOPPED_VELOCITY_THRESHOLD {
            self.idle_time.insert(actor, now);
        }
    }

    fn is_vehicle_stuck(&self, idle_since: f64, now: f64, light: TrafficLightColor) -> bool {
        let delta = now - idle_since;
        delta >= RED_TL_BLOCKED_TIME_THRESHOLD
            || (delta >= BLOCKED_TIME_THRESHOLD && light != TrafficLightColor::Red)
    }

    fn destroy_bookkeeping(
        &mut self,
        actor: ActorId,
        state: &mut SimulationState,
        buffers: &mut BufferMap,
        occupancy: &mut OccupancyTracker,
    ) {
        buffers.remove(&actor);
        occupancy.remove_actor(actor);
        state.remove_actor(actor);
        self.idle_time.remove(&actor);
        self.has_physics_enabled.remove(&actor);
        self.heroes.remove(&actor);
    }

    pub fn reset(&mut self) {
        self.unregistered.clear();
        self.heroes.clear();
        self.idle_time.clear();
        self.has_physics_enabled.clear();
        self.elapsed_last_destruction = 0.0;
        self.hero_location = Vec3::ZERO;
    }
}

fn attributes_of(snap: &ActorSnapshot) -> StaticAttributes {
    StaticAttributes {
        kind: snap.kind,
        half_length: snap.bounds.half_length(),
        half_width: snap.bounds.half_width(),
        half_height: snap.bounds.extent.z,
    }
}

/// Refresh one unregistered actor and stamp its footprint into the
/// occupancy tracker.
fn update_unregistered(
    actor: ActorId,
    snap: &ActorSnapshot,
    graph: &RoadGraph,
    state: &mut SimulationState,
    occupancy: &mut OccupancyTracker,
) {
    let location = snap.transform.location;
    let heading = snap.transform.forward_vector();
    let speed_limit = if snap.kind == ActorKind::Walker { -1.0 } else { snap.speed_limit };

    let kinematics = KinematicState {
        location,
        rotation: snap.transform.rotation,
        velocity: snap.velocity,
        speed_limit,
        physics_enabled: true,
        is_dormant: snap.is_dormant,
        hybrid_end_location: location,
    };
    let traffic_light =
        TrafficLightInfo { at_traffic_light: snap.at_traffic_light, state: snap.light_state };
    if state.contains(actor) {
        state.update_kinematics(actor, kinematics);
        state.update_traffic_light(actor, traffic_light);
    } else {
        state.add_actor(actor, kinematics, attributes_of(snap), traffic_light);
    }

    // Vehicles occupy front, center, and rear; walkers just their location.
    let half_length = snap.bounds.half_length();
    let probes: &[Vec3] = match snap.kind {
        ActorKind::Vehicle => &[
            location + heading * half_length,
            location,
            location - heading * half_length,
        ],
        _ => &[location],
    };

    occupancy.remove_actor(actor);
    let mut grids = Vec::with_capacity(probes.len());
    for &probe in probes {
        if let Some(id) = graph.nearest_waypoint(probe) {
            occupancy.update_passing_vehicle(id, actor);
            if let Some(wp) = graph.get(id) {
                grids.push(wp.grid_id);
            }
        }
    }
    occupancy.update_grid_position(actor, grids);
}

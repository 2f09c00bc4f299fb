//! The dedicated tick worker: one full pipeline pass per host frame.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use tm_core::constants::hybrid::HYBRID_MODE_DT;
use tm_core::{ActorId, ActorRng, Command, CommandBatch, Weather, WorldSnapshot};
use tm_graph::RoadGraph;
use tm_params::ParameterStore;
use tm_state::{BufferMap, OccupancyTracker, SimulationState};
use tm_stages::{
    CollisionStage, LifecycleStage, LocalizationStage, MotionPlanStage, TrafficLightStage,
    VehicleLightStage,
};

use crate::frames::TickFrames;
use crate::host::WorldHost;
use crate::manager::{lock, Registry, StepGate, StepWait};

/// Poll interval while the host frame counter has not advanced.
const FRAME_POLL: Duration = Duration::from_millis(1);

pub(crate) struct TickWorker<H: WorldHost> {
    host: H,
    graph: Arc<RoadGraph>,
    params: Arc<ParameterStore>,
    registry: Arc<Mutex<Registry>>,
    gate: Arc<StepGate>,
    reset_pending: Arc<std::sync::atomic::AtomicBool>,

    state: SimulationState,
    buffers: BufferMap,
    occupancy: OccupancyTracker,
    rngs: FxHashMap<ActorId, ActorRng>,
    seed: u64,

    lifecycle: LifecycleStage,
    localization: LocalizationStage,
    collision: CollisionStage,
    traffic_light: TrafficLightStage,
    motion: MotionPlanStage,
    lights: VehicleLightStage,

    frames: TickFrames,
    marked_for_removal: Vec<ActorId>,
    last_frame: u64,
    last_tick: Instant,
}

impl<H: WorldHost> TickWorker<H> {
    pub(crate) fn new(
        host: H,
        graph: Arc<RoadGraph>,
        params: Arc<ParameterStore>,
        registry: Arc<Mutex<Registry>>,
        gate: Arc<StepGate>,
        reset_pending: Arc<std::sync::atomic::AtomicBool>,
        seed: u64,
    ) -> Self {
        Self {
            host,
            graph,
            params,
            registry,
            gate,
            reset_pending,
            state: SimulationState::new(),
            buffers: BufferMap::default(),
            occupancy: OccupancyTracker::new(),
            rngs: FxHashMap::default(),
            seed,
            lifecycle: LifecycleStage::new(),
            localization: LocalizationStage::new(),
            collision: CollisionStage::new(),
            traffic_light: TrafficLightStage::new(),
            motion: MotionPlanStage::new(),
            lights: VehicleLightStage::new(),
            frames: TickFrames::new(),
            marked_for_removal: Vec::new(),
            last_frame: 0,
            last_tick: Instant::now(),
        }
    }

    pub(crate) fn run(mut self) {
        log::debug!("tick worker started on map {}", self.graph.map_name());
        loop {
            if self.gate.is_shut_down() {
                break;
            }
            if self.params.synchronous_mode() {
                let timeout = Duration::from_millis(self.params.synchronous_mode_timeout_ms());
                match self.gate.wait_for_step(timeout) {
                    StepWait::Shutdown => break,
                    StepWait::TimedOut => continue,
                    StepWait::Step => {
                        self.run_tick();
                        self.gate.finish_step();
                    }
                }
            } else {
                // Hybrid teleports are timed against HYBRID_MODE_DT, so
                // bound the tick rate to it.
                if self.params.hybrid_physics_mode() {
                    let interval = Duration::from_secs_f32(HYBRID_MODE_DT);
                    let since = self.last_tick.elapsed();
                    if since < interval {
                        std::thread::sleep(interval - since);
                    }
                }
                if self.host.frame_count() == self.last_frame {
                    std::thread::sleep(FRAME_POLL);
                    continue;
                }
                self.run_tick();
            }
        }
        log::debug!("tick worker stopped");
    }

    fn run_tick(&mut self) {
        if self.reset_pending.swap(false, Ordering::SeqCst) {
            self.reset_state();
        }

        // Registration fence: reconfiguration lands between ticks only.
        let registered = {
            let mut registry = lock(&self.registry);
            let pending: Vec<ActorId> = registry.pending_removal.drain(..).collect();
            let seed = registry.seed;
            let vehicles = registry.vehicles.clone();
            drop(registry);

            for actor in pending {
                self.drop_actor(actor);
            }
            if seed != self.seed {
                self.seed = seed;
                self.rngs.clear();
            }
            vehicles
        };

        let snapshot = self.host.snapshot();
        let weather = self.host.weather();
        self.last_frame = snapshot.timestamp.frame;
        self.last_tick = Instant::now();

        let commands = self.process_tick(&registered, &snapshot, weather);
        self.host.apply_batch(commands);
    }

    fn process_tick(
        &mut self,
        registered: &[ActorId],
        snapshot: &WorldSnapshot,
        weather: Weather,
    ) -> CommandBatch {
        // ── Phase 1: lifecycle reconciliation ─────────────────────────────
        let outcome = self.lifecycle.update(
            snapshot,
            registered,
            &self.graph,
            &mut self.state,
            &self.params,
            &mut self.buffers,
            &mut self.occupancy,
            &mut self.marked_for_removal,
        );
        for &actor in &outcome.removed {
            self.drop_actor(actor);
        }
        let registered: Vec<ActorId> = registered
            .iter()
            .copied()
            .filter(|actor| !outcome.removed.contains(actor))
            .collect();
        if !outcome.removed.is_empty() {
            let mut registry = lock(&self.registry);
            registry.vehicles.retain(|vehicle| !outcome.removed.contains(vehicle));
        }
        let hero_location = self.lifecycle.hero_location();
        let mut commands: CommandBatch = outcome.commands;

        // ── Phase 2: frame sizing ─────────────────────────────────────────
        self.frames.resize(registered.len());

        // ── Phase 3: localization ─────────────────────────────────────────
        for (i, &actor) in registered.iter().enumerate() {
            let rng = self
                .rngs
                .entry(actor)
                .or_insert_with(|| ActorRng::new(self.seed, actor));
            self.localization.update(
                actor,
                &self.graph,
                &self.state,
                &self.params,
                &mut self.buffers,
                &mut self.occupancy,
                rng,
                &mut self.marked_for_removal,
                &mut self.frames.localization[i],
            );
        }

        // ── Phase 4: collision negotiation ────────────────────────────────
        self.collision.begin_tick();
        #[cfg(feature = "parallel")]
        self.collision.prepare_boundaries(
            &registered,
            &self.graph,
            &self.state,
            &self.params,
            &self.buffers,
        );
        for (i, &actor) in registered.iter().enumerate() {
            let Some(rng) = self.rngs.get_mut(&actor) else { continue };
            self.collision.update(
                actor,
                &self.graph,
                &self.state,
                &self.params,
                &self.buffers,
                &self.occupancy,
                rng,
                &mut self.frames.collision[i],
            );
        }

        // ── Phase 5: signals and junction arbitration ─────────────────────
        for (i, &actor) in registered.iter().enumerate() {
            let Some(rng) = self.rngs.get_mut(&actor) else { continue };
            self.frames.traffic_light[i] = self.traffic_light.update(
                actor,
                &self.graph,
                &self.state,
                &self.params,
                &self.buffers,
                rng,
                snapshot.timestamp,
            );
        }

        // ── Phase 6: actuation and lights ─────────────────────────────────
        for (i, &actor) in registered.iter().enumerate() {
            let Some(rng) = self.rngs.get_mut(&actor) else { continue };
            let control_command = self.motion.update(
                actor,
                &self.graph,
                &mut self.state,
                &self.params,
                &self.buffers,
                &mut self.occupancy,
                rng,
                snapshot.timestamp,
                hero_location,
                &self.frames.localization[i],
                &self.frames.collision[i],
                self.frames.traffic_light[i],
            );
            let control = match &control_command {
                Some(Command::ApplyVehicleControl { control, .. }) => Some(control),
                _ => None,
            };
            if let Some(light_command) = self.lights.update(
                actor,
                &self.graph,
                &self.params,
                &self.buffers,
                weather,
                control,
            ) {
                commands.push(light_command);
            }
            if let Some(command) = control_command {
                commands.push(command);
            }
        }

        commands
    }

    /// Cascade one vehicle's removal through every per-actor structure.
    fn drop_actor(&mut self, actor: ActorId) {
        self.localization.remove_actor(actor);
        self.collision.remove_actor(actor);
        self.traffic_light.remove_actor(actor);
        self.motion.remove_actor(actor);
        self.lights.remove_actor(actor);
        self.buffers.remove(&actor);
        self.occupancy.remove_actor(actor);
        self.state.remove_actor(actor);
        self.params.remove_actor(actor);
        self.rngs.remove(&actor);
    }

    fn reset_state(&mut self) {
        self.lifecycle.reset();
        self.localization.reset();
        self.collision.reset();
        self.traffic_light.reset();
        self.motion.reset();
        self.lights.reset();
        self.state.clear();
        self.buffers.clear();
        self.occupancy.clear();
        self.rngs.clear();
        self.marked_for_removal.clear();
    }
}

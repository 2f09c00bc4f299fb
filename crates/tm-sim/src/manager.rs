//! The in-process traffic manager: owns the worker thread and implements
//! the control facade.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tm_core::{ActorId, RoadOption, Vec3};
use tm_graph::RoadGraph;
use tm_params::ParameterStore;

use crate::control::TrafficControl;
use crate::error::SimResult;
use crate::host::WorldHost;
use crate::worker::TickWorker;

/// Lock a mutex, recovering the guard if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registration state shared between the facade and the worker.  The worker
/// locks it once at every tick start, so registration changes never land
/// mid-tick.
#[derive(Default)]
pub(crate) struct Registry {
    pub vehicles: Vec<ActorId>,
    /// Unregistered vehicles awaiting per-actor cleanup by the worker.
    pub pending_removal: Vec<ActorId>,
    pub seed: u64,
}

/// Outcome of one worker wait on the step gate.
pub(crate) enum StepWait {
    Step,
    TimedOut,
    Shutdown,
}

#[derive(Default)]
struct GateState {
    step_requested: bool,
    tick_done: bool,
    shutdown: bool,
}

/// Condition-variable gate coordinating synchronous stepping and shutdown.
pub(crate) struct StepGate {
    state: Mutex<GateState>,
    cv: Condvar,
}

impl StepGate {
    pub(crate) fn new() -> Self {
        Self { state: Mutex::new(GateState::default()), cv: Condvar::new() }
    }

    /// Facade side: request one tick and block until the worker finishes it.
    pub(crate) fn request_step_and_wait(&self) -> bool {
        let mut state = lock(&self.state);
        if state.shutdown {
            return false;
        }
        state.step_requested = true;
        self.cv.notify_all();
        while !state.tick_done && !state.shutdown {
            state = self.cv.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        let completed = state.tick_done;
        state.tick_done = false;
        completed
    }

    /// Worker side: wait for the next step request.  Times out so the
    /// worker can notice a mode change without being woken.
    pub(crate) fn wait_for_step(&self, timeout: Duration) -> StepWait {
        let mut state = lock(&self.state);
        loop {
            if state.shutdown {
                return StepWait::Shutdown;
            }
            if state.step_requested {
                state.step_requested = false;
                return StepWait::Step;
            }
            let (guard, result) = self
                .cv
                .wait_timeout(state, timeout)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
            if result.timed_out() && !state.step_requested && !state.shutdown {
                return StepWait::TimedOut;
            }
        }
    }

    /// Worker side: report a finished tick to a blocked step caller.
    pub(crate) fn finish_step(&self) {
        let mut state = lock(&self.state);
        state.tick_done = true;
        self.cv.notify_all();
    }

    pub(crate) fn shutdown(&self) {
        let mut state = lock(&self.state);
        state.shutdown = true;
        self.cv.notify_all();
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        lock(&self.state).shutdown
    }
}

/// The in-process traffic manager.
///
/// Construction spawns the tick worker; dropping the manager shuts it down.
/// All behavioral knobs go through the [`TrafficControl`] facade.
pub struct TrafficManager {
    params: Arc<ParameterStore>,
    registry: Arc<Mutex<Registry>>,
    gate: Arc<StepGate>,
    reset_pending: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl TrafficManager {
    /// Spawn a manager driving `host` over the prebuilt road graph.
    pub fn new<H: WorldHost>(host: H, graph: Arc<RoadGraph>, seed: u64) -> SimResult<Self> {
        let params = Arc::new(ParameterStore::new());
        let registry = Arc::new(Mutex::new(Registry { seed, ..Registry::default() }));
        let gate = Arc::new(StepGate::new());
        let reset_pending = Arc::new(AtomicBool::new(false));

        let worker = TickWorker::new(
            host,
            graph,
            Arc::clone(&params),
            Arc::clone(&registry),
            Arc::clone(&gate),
            Arc::clone(&reset_pending),
            seed,
        );
        let handle = std::thread::Builder::new()
            .name("tm-tick".into())
            .spawn(move || worker.run())?;

        Ok(Self { params, registry, gate, reset_pending, worker: Some(handle) })
    }

    /// Read access to the parameter store, e.g. for hosts that mirror
    /// settings into their own UI.
    pub fn parameters(&self) -> &ParameterStore {
        &self.params
    }

    /// Snapshot of the currently registered vehicles, in registration
    /// order.
    pub fn registered_vehicles(&self) -> Vec<ActorId> {
        lock(&self.registry).vehicles.clone()
    }

    fn shutdown_impl(&mut self) {
        self.gate.shutdown();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::warn!("tick worker panicked during shutdown");
            }
            let mut registry = lock(&self.registry);
            registry.vehicles.clear();
            registry.pending_removal.clear();
            self.params.clear_actors();
        }
    }
}

impl TrafficControl for TrafficManager {
    fn register_vehicles(&self, actors: &[ActorId]) {
        let mut registry = lock(&self.registry);
        for &actor in actors {
            if !registry.vehicles.contains(&actor) {
                registry.vehicles.push(actor);
            }
        }
    }

    fn unregister_vehicles(&self, actors: &[ActorId]) {
        let mut registry = lock(&self.registry);
        registry.vehicles.retain(|vehicle| !actors.contains(vehicle));
        registry.pending_removal.extend_from_slice(actors);
    }

    fn set_percentage_speed_difference(&self, actor: ActorId, percentage: f32) {
        self.params.set_percentage_speed_difference(actor, percentage);
    }

    fn set_global_percentage_speed_difference(&self, percentage: f32) {
        self.params.set_global_percentage_speed_difference(percentage);
    }

    fn set_desired_speed(&self, actor: ActorId, speed: f32) {
        self.params.set_desired_speed(actor, speed);
    }

    fn set_distance_to_leading_vehicle(&self, actor: ActorId, distance: f32) {
        self.params.set_distance_to_leading_vehicle(actor, distance);
    }

    fn set_global_distance_to_leading_vehicle(&self, distance: f32) {
        self.params.set_global_distance_to_leading_vehicle(distance);
    }

    fn set_lane_offset(&self, actor: ActorId, offset: f32) {
        self.params.set_lane_offset(actor, offset);
    }

    fn set_global_lane_offset(&self, offset: f32) {
        self.params.set_global_lane_offset(offset);
    }

    fn set_auto_lane_change(&self, actor: ActorId, enable: bool) {
        self.params.set_auto_lane_change(actor, enable);
    }

    fn set_force_lane_change(&self, actor: ActorId, direction_left: bool) {
        self.params.set_force_lane_change(actor, direction_left);
    }

    fn set_keep_right_percentage(&self, actor: ActorId, percentage: f32) {
        self.params.set_keep_right_percentage(actor, percentage);
    }

    fn set_random_left_lane_change_percentage(&self, actor: ActorId, percentage: f32) {
        self.params.set_random_left_lane_change_percentage(actor, percentage);
    }

    fn set_random_right_lane_change_percentage(&self, actor: ActorId, percentage: f32) {
        self.params.set_random_right_lane_change_percentage(actor, percentage);
    }

    fn set_percentage_running_light(&self, actor: ActorId, percentage: f32) {
        self.params.set_percentage_running_light(actor, percentage);
    }

    fn set_percentage_running_sign(&self, actor: ActorId, percentage: f32) {
        self.params.set_percentage_running_sign(actor, percentage);
    }

    fn set_percentage_ignore_vehicles(&self, actor: ActorId, percentage: f32) {
        self.params.set_percentage_ignore_vehicles(actor, percentage);
    }

    fn set_percentage_ignore_walkers(&self, actor: ActorId, percentage: f32) {
        self.params.set_percentage_ignore_walkers(actor, percentage);
    }

    fn set_collision_detection(&self, reference: ActorId, other: ActorId, detect: bool) {
        self.params.set_collision_detection(reference, other, detect);
    }

    fn set_update_vehicle_lights(&self, actor: ActorId, update: bool) {
        self.params.set_update_vehicle_lights(actor, update);
    }

    fn set_hybrid_physics_mode(&self, enabled: bool) {
        self.params.set_hybrid_physics_mode(enabled);
    }

    fn set_hybrid_physics_radius(&self, radius: f32) {
        self.params.set_hybrid_physics_radius(radius);
    }

    fn set_osm_mode(&self, enabled: bool) {
        self.params.set_osm_mode(enabled);
    }

    fn set_respawn_dormant_vehicles(&self, enabled: bool) {
        self.params.set_respawn_dormant_vehicles(enabled);
    }

    fn set_respawn_boundaries(&self, lower: f32, upper: f32) {
        self.params.set_respawn_boundaries(lower, upper);
    }

    fn upload_path(&self, actor: ActorId, points: Vec<Vec3>, empty_buffer: bool) {
        self.params.upload_path(actor, points, empty_buffer);
    }

    fn upload_route(&self, actor: ActorId, options: Vec<RoadOption>, empty_buffer: bool) {
        self.params.upload_route(actor, options, empty_buffer);
    }

    fn set_random_device_seed(&self, seed: u64) {
        lock(&self.registry).seed = seed;
    }

    fn set_synchronous_mode(&self, enabled: bool) {
        self.params.set_synchronous_mode(enabled);
    }

    fn set_synchronous_mode_timeout_ms(&self, timeout: u64) {
        self.params.set_synchronous_mode_timeout_ms(timeout);
    }

    fn synchronous_tick(&self) -> bool {
        if !self.params.synchronous_mode() {
            return false;
        }
        self.gate.request_step_and_wait()
    }

    fn reset(&self) {
        {
            let mut registry = lock(&self.registry);
            registry.vehicles.clear();
            registry.pending_removal.clear();
        }
        self.params.clear_actors();
        self.reset_pending.store(true, Ordering::SeqCst);
    }

    fn shutdown(&mut self) {
        self.shutdown_impl();
    }
}

impl Drop for TrafficManager {
    fn drop(&mut self) {
        self.shutdown_impl();
    }
}

//! Signal and junction arbitration.
//!
//! Signalised junctions are gated by the host's traffic-light state: a
//! vehicle held at a non-green light is a hazard unless its run-the-light
//! dice say otherwise.  Non-signalised junctions are arbitrated here with a
//! per-junction FIFO: a vehicle books a slot when it approaches, must come
//! to a full stop for a minimum dwell, and may only proceed once it reaches
//! the front of the queue.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use tm_core::constants::motion::EPSILON_RELATIVE_SPEED;
use tm_core::constants::traffic_light::MINIMUM_STOP_TIME;
use tm_core::constants::waypoint::JUNCTION_LOOK_AHEAD;
use tm_core::{ActorId, ActorRng, JunctionId, Timestamp, TrafficLightColor};
use tm_graph::RoadGraph;
use tm_params::ParameterStore;
use tm_state::{target_waypoint, Buffer, BufferMap, SimulationState};

pub struct TrafficLightStage {
    /// Arrival order per non-signalised junction.
    entering_vehicles: FxHashMap<JunctionId, VecDeque<ActorId>>,
    /// The junction each vehicle currently holds a slot in.
    vehicle_last_junction: FxHashMap<ActorId, JunctionId>,
    /// Elapsed-seconds timestamp of the vehicle's full stop at its junction.
    vehicle_stop_time: FxHashMap<ActorId, f64>,
}

impl Default for TrafficLightStage {
    fn default() -> Self {
        Self::new()
    }
}

impl TrafficLightStage {
    pub fn new() -> Self {
        Self {
            entering_vehicles: FxHashMap::default(),
            vehicle_last_junction: FxHashMap::default(),
            vehicle_stop_time: FxHashMap::default(),
        }
    }

    /// `true` when the vehicle must hold for a signal or for its turn at a
    /// non-signalised junction.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        actor: ActorId,
        graph: &RoadGraph,
        state: &SimulationState,
        params: &ParameterStore,
        buffers: &BufferMap,
        rng: &mut ActorRng,
        timestamp: Timestamp,
    ) -> bool {
        if state.is_dormant(actor) {
            return false;
        }

        let current_junction = self
            .vehicle_last_junction
            .get(&actor)
            .copied()
            .unwrap_or(JunctionId::NONE);
        let affected_junction = buffers
            .get(&actor)
            .map_or(JunctionId::NONE, |b| affected_junction_id(current_junction, b, graph));

        let tl = state.traffic_light(actor);
        let held_by_light = tl.at_traffic_light
            && tl.state != TrafficLightColor::Green
            && tl.state != TrafficLightColor::Off;

        let mut hazard = false;
        if held_by_light && params.percentage_running_light(actor) <= rng.next_percentage() {
            // A signal supersedes any slot held at a non-signalised junction.
            if current_junction.is_some() {
                self.remove_actor(actor);
            }
            hazard = true;
        } else if current_junction.is_some() {
            if !affected_junction.is_some() || affected_junction != current_junction {
                // Left the junction; release the slot.
                self.remove_actor(actor);
            } else {
                hazard = self.handle_non_signalised_junction(
                    actor,
                    affected_junction,
                    state.velocity(actor).length(),
                    timestamp,
                );
            }
        } else if affected_junction.is_some()
            && !tl.at_traffic_light
            && tl.state != TrafficLightColor::Green
            && params.percentage_running_sign(actor) <= rng.next_percentage()
        {
            self.add_actor_to_non_signalised_junction(actor, affected_junction);
            hazard = true;
        }
        hazard
    }

    fn add_actor_to_non_signalised_junction(&mut self, actor: ActorId, junction: JunctionId) {
        let queue = self.entering_vehicles.entry(junction).or_default();
        if !queue.contains(&actor) {
            queue.push_back(actor);
        }
        // A stale slot in another junction must be released first.
        if let Some(&previous) = self.vehicle_last_junction.get(&actor) {
            if previous != junction {
                if let Some(old_queue) = self.entering_vehicles.get_mut(&previous) {
                    old_queue.retain(|&v| v != actor);
                }
                self.vehicle_stop_time.remove(&actor);
            }
        }
        self.vehicle_last_junction.insert(actor, junction);
    }

    fn handle_non_signalised_junction(
        &mut self,
        actor: ActorId,
        junction: JunctionId,
        speed: f32,
        timestamp: Timestamp,
    ) -> bool {
        match self.vehicle_stop_time.get(&actor) {
            None => {
                // The dwell clock starts only at a full stop.
                if speed < EPSILON_RELATIVE_SPEED {
                    self.vehicle_stop_time.insert(actor, timestamp.elapsed_seconds);
                }
                true
            }
            Some(&stop_time) => {
                let at_front = self
                    .entering_vehicles
                    .get(&junction)
                    .and_then(|q| q.front())
                    == Some(&actor);
                if at_front {
                    timestamp.elapsed_seconds - stop_time < MINIMUM_STOP_TIME
                } else {
                    true
                }
            }
        }
    }

    pub fn remove_actor(&mut self, actor: ActorId) {
        if let Some(junction) = self.vehicle_last_junction.remove(&actor) {
            if let Some(queue) = self.entering_vehicles.get_mut(&junction) {
                queue.retain(|&v| v != actor);
            }
        }
        self.vehicle_stop_time.remove(&actor);
    }

    pub fn reset(&mut self) {
        self.entering_vehicles.clear();
        self.vehicle_last_junction.clear();
        self.vehicle_stop_time.clear();
    }
}

/// The junction about to constrain this vehicle, if any.
///
/// While a slot is held the vehicle keeps reporting its junction until both
/// the look-ahead point and the buffer front have left it.
fn affected_junction_id(current: JunctionId, buffer: &Buffer, graph: &RoadGraph) -> JunctionId {
    let look_ahead_junction = target_waypoint(buffer, graph, JUNCTION_LOOK_AHEAD)
        .and_then(|(id, _)| graph.get(id))
        .map_or(JunctionId::NONE, |wp| wp.junction_id);

    if !current.is_some() {
        return look_ahead_junction;
    }
    if look_ahead_junction == current || look_ahead_junction.is_some() {
        return look_ahead_junction;
    }
    let front_junction = buffer
        .front()
        .and_then(|&id| graph.get(id))
        .map_or(JunctionId::NONE, |wp| wp.junction_id);
    if front_junction == current {
        front_junction
    } else {
        JunctionId::NONE
    }
}

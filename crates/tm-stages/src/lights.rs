//! Vehicle light management, opt-in per vehicle.
//!
//! Blinkers follow the next maneuver in the waypoint buffer, brake lights
//! follow this tick's actuation, and beams follow sun altitude and weather.
//! A `SetVehicleLightState` command is appended only when the computed
//! state differs from the last one sent.

use rustc_hash::FxHashMap;

use tm_core::constants::light::{
    FOG_DENSITY_THRESHOLD, HEAVY_PRECIPITATION_THRESHOLD, MAX_DISTANCE_LIGHT_CHECK,
    SUN_ALTITUDE_DEGREES_AFTER_SUNSET, SUN_ALTITUDE_DEGREES_BEFORE_DAWN,
    SUN_ALTITUDE_DEGREES_JUST_AFTER_DAWN, SUN_ALTITUDE_DEGREES_JUST_BEFORE_SUNSET,
};
use tm_core::{ActorId, Command, RoadOption, VehicleControl, VehicleLightFlags, Weather};
use tm_graph::RoadGraph;
use tm_params::ParameterStore;
use tm_state::BufferMap;

pub struct VehicleLightStage {
    /// Last state sent per vehicle, to suppress redundant commands.
    light_states: FxHashMap<ActorId, VehicleLightFlags>,
}

impl Default for VehicleLightStage {
    fn default() -> Self {
        Self::new()
    }
}

impl VehicleLightStage {
    pub fn new() -> Self {
        Self { light_states: FxHashMap::default() }
    }

    pub fn update(
        &mut self,
        actor: ActorId,
        graph: &RoadGraph,
        params: &ParameterStore,
        buffers: &BufferMap,
        weather: Weather,
        control: Option<&VehicleControl>,
    ) -> Option<Command> {
        if !params.update_vehicle_lights(actor) {
            return None;
        }

        let mut left_blinker = false;
        let mut right_blinker = false;
        if let Some(buffer) = buffers.get(&actor) {
            if let Some(front) = buffer.front().and_then(|&id| graph.get(id)) {
                for &id in buffer.iter() {
                    let Some(wp) = graph.get(id) else { continue };
                    // MAX_DISTANCE_LIGHT_CHECK is already squared.
                    if front.location().distance_squared(wp.location()) > MAX_DISTANCE_LIGHT_CHECK
                    {
                        break;
                    }
                    if wp.is_junction {
                        match wp.road_option {
                            RoadOption::Left => left_blinker = true,
                            RoadOption::Right => right_blinker = true,
                            _ => {}
                        }
                        break;
                    }
                }
            }
        }

        let brake_lights = control.is_some_and(|c| c.brake > 0.5);

        let altitude = weather.sun_altitude_angle;
        let night = altitude < SUN_ALTITUDE_DEGREES_BEFORE_DAWN
            || altitude > SUN_ALTITUDE_DEGREES_AFTER_SUNSET;
        let dusk = !night
            && (altitude < SUN_ALTITUDE_DEGREES_JUST_AFTER_DAWN
                || altitude > SUN_ALTITUDE_DEGREES_JUST_BEFORE_SUNSET);
        let heavy_rain = weather.precipitation > HEAVY_PRECIPITATION_THRESHOLD;
        let fog = weather.fog_density > FOG_DENSITY_THRESHOLD;

        let current = self.light_states.get(&actor).copied().unwrap_or_default();
        let mut next = current;
        next.set(VehicleLightFlags::LEFT_BLINKER, left_blinker);
        next.set(VehicleLightFlags::RIGHT_BLINKER, right_blinker);
        next.set(VehicleLightFlags::BRAKE, brake_lights);
        next.set(VehicleLightFlags::POSITION, night || dusk || heavy_rain || fog);
        next.set(VehicleLightFlags::LOW_BEAM, night || heavy_rain || fog);
        next.set(VehicleLightFlags::FOG, fog);

        if next != current {
            self.light_states.insert(actor, next);
            Some(Command::SetVehicleLightState { actor, lights: next })
        } else {
            None
        }
    }

    pub fn remove_actor(&mut self, actor: ActorId) {
        self.light_states.remove(&actor);
    }

    pub fn reset(&mut self) {
        self.light_states.clear();
    }
}

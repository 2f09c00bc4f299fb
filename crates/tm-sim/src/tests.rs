//! Scheduler and facade tests, all driven through the synchronous step
//! gate so ticks are deterministic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tm_core::{
    ActorId, ActorSnapshot, Command, CommandBatch, RoadId, Rotation, Timestamp, Transform, Vec3,
    Weather, WorldSnapshot,
};
use tm_graph::{MapDescription, RoadGraph};

use crate::{TrafficControl, TrafficManager, WorldHost};

const V1: ActorId = ActorId(1);
const V2: ActorId = ActorId(2);

struct HostInner {
    frame: AtomicU64,
    actors: Mutex<Vec<ActorSnapshot>>,
    batches: Mutex<Vec<CommandBatch>>,
}

/// Host double shared between the test and the worker thread.
#[derive(Clone)]
struct SharedHost(Arc<HostInner>);

impl SharedHost {
    fn new() -> Self {
        Self(Arc::new(HostInner {
            frame: AtomicU64::new(0),
            actors: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
        }))
    }

    fn set_actors(&self, actors: Vec<ActorSnapshot>) {
        *self.0.actors.lock().unwrap() = actors;
    }

    fn batch_count(&self) -> usize {
        self.0.batches.lock().unwrap().len()
    }

    fn last_batch(&self) -> CommandBatch {
        self.0.batches.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

impl WorldHost for SharedHost {
    fn frame_count(&self) -> u64 {
        self.0.frame.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> WorldSnapshot {
        let frame = self.0.frame.load(Ordering::SeqCst);
        WorldSnapshot {
            timestamp: Timestamp { frame, elapsed_seconds: frame as f64 * 0.05 },
            actors: self.0.actors.lock().unwrap().clone(),
        }
    }

    fn weather(&self) -> Weather {
        Weather::default()
    }

    fn apply_batch(&self, batch: CommandBatch) {
        self.0.batches.lock().unwrap().push(batch);
    }
}

fn straight_graph() -> Arc<RoadGraph> {
    let mut desc = MapDescription::new("straight");
    desc.add_straight_segment(RoadId(1), 1, Vec3::ZERO, 0.0, 100.0, 5.0);
    Arc::new(RoadGraph::build(&desc).unwrap())
}

/// Manager in synchronous mode over the straight test map.
fn sync_manager(host: &SharedHost) -> TrafficManager {
    let manager = TrafficManager::new(host.clone(), straight_graph(), 42).unwrap();
    manager.set_synchronous_mode(true);
    manager
}

fn vehicle_at(id: ActorId, x: f32, speed: f32) -> ActorSnapshot {
    ActorSnapshot::vehicle(
        id,
        Transform::new(Vec3::new(x, 0.0, 0.0), Rotation::from_yaw(0.0)),
        Vec3::new(speed, 0.0, 0.0),
    )
}

mod frames {
    use crate::TickFrames;
    use tm_core::constants::frame::{GROWTH_STEP_SIZE, INITIAL_SIZE};

    #[test]
    fn capacity_grows_in_whole_steps() {
        assert_eq!(TickFrames::grown_capacity(INITIAL_SIZE, 0), INITIAL_SIZE);
        assert_eq!(TickFrames::grown_capacity(INITIAL_SIZE, INITIAL_SIZE), INITIAL_SIZE);
        assert_eq!(
            TickFrames::grown_capacity(INITIAL_SIZE, INITIAL_SIZE + 1),
            INITIAL_SIZE + GROWTH_STEP_SIZE
        );
        assert_eq!(TickFrames::grown_capacity(INITIAL_SIZE, 140), 150);
    }

    #[test]
    fn frames_never_shrink() {
        let mut frames = TickFrames::new();
        assert_eq!(frames.capacity(), INITIAL_SIZE);
        frames.resize(INITIAL_SIZE + 1);
        assert_eq!(frames.capacity(), INITIAL_SIZE + GROWTH_STEP_SIZE);
        frames.resize(3);
        assert_eq!(frames.capacity(), INITIAL_SIZE + GROWTH_STEP_SIZE);
        assert_eq!(frames.localization.len(), frames.capacity());
        assert_eq!(frames.collision.len(), frames.capacity());
    }
}

mod scheduler {
    use super::*;

    #[test]
    fn synchronous_tick_runs_exactly_one_tick() {
        let host = SharedHost::new();
        let mut manager = sync_manager(&host);

        assert!(manager.synchronous_tick());
        assert_eq!(host.batch_count(), 1);
        assert!(manager.synchronous_tick());
        assert_eq!(host.batch_count(), 2);

        manager.shutdown();
        assert!(!manager.synchronous_tick());
        assert_eq!(host.batch_count(), 2);
    }

    #[test]
    fn synchronous_tick_requires_synchronous_mode() {
        let host = SharedHost::new();
        let manager = TrafficManager::new(host.clone(), straight_graph(), 42).unwrap();
        assert!(!manager.synchronous_tick());
    }

    #[test]
    fn registered_vehicle_receives_a_control_command() {
        let host = SharedHost::new();
        let manager = sync_manager(&host);

        host.set_actors(vec![vehicle_at(V1, 2.0, 5.0)]);
        manager.register_vehicles(&[V1]);
        assert!(manager.synchronous_tick());

        let accelerating = host.last_batch().iter().any(|command| {
            matches!(command,
                Command::ApplyVehicleControl { actor, control }
                    if *actor == V1 && control.throttle > 0.0)
        });
        assert!(accelerating, "free road below the limit should produce throttle");
    }

    #[test]
    fn destroyed_vehicle_leaves_the_registry() {
        let host = SharedHost::new();
        let manager = sync_manager(&host);

        host.set_actors(vec![vehicle_at(V1, 2.0, 5.0), vehicle_at(V2, 40.0, 5.0)]);
        manager.register_vehicles(&[V1, V2]);
        assert!(manager.synchronous_tick());
        assert_eq!(manager.registered_vehicles(), vec![V1, V2]);

        // The host destroys V1; the lifecycle stage must drop it.
        host.set_actors(vec![vehicle_at(V2, 40.0, 5.0)]);
        assert!(manager.synchronous_tick());
        assert_eq!(manager.registered_vehicles(), vec![V2]);
    }

    #[test]
    fn unregistered_vehicle_is_no_longer_driven() {
        let host = SharedHost::new();
        let manager = sync_manager(&host);

        host.set_actors(vec![vehicle_at(V1, 2.0, 5.0)]);
        manager.register_vehicles(&[V1]);
        assert!(manager.synchronous_tick());

        manager.unregister_vehicles(&[V1]);
        assert!(manager.registered_vehicles().is_empty());
        assert!(manager.synchronous_tick());
        let driven = host.last_batch().iter().any(|command| {
            matches!(command, Command::ApplyVehicleControl { actor, .. } if *actor == V1)
        });
        assert!(!driven);
    }

    #[test]
    fn reset_clears_registrations() {
        let host = SharedHost::new();
        let manager = sync_manager(&host);

        host.set_actors(vec![vehicle_at(V1, 2.0, 5.0)]);
        manager.register_vehicles(&[V1]);
        assert!(manager.synchronous_tick());

        manager.reset();
        assert!(manager.registered_vehicles().is_empty());
        assert!(manager.synchronous_tick());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let host = SharedHost::new();
        let mut manager = sync_manager(&host);
        manager.shutdown();
        manager.shutdown();
        assert!(!manager.synchronous_tick());
    }
}

mod facade {
    use super::*;

    #[test]
    fn setters_are_idempotent() {
        let host = SharedHost::new();
        let manager = sync_manager(&host);

        manager.set_distance_to_leading_vehicle(V1, 6.0);
        manager.set_distance_to_leading_vehicle(V1, 6.0);
        assert_eq!(manager.parameters().distance_to_leading_vehicle(V1), 6.0);

        manager.set_percentage_speed_difference(V1, 30.0);
        manager.set_percentage_speed_difference(V1, 30.0);
        // 30 % below a 10 m/s limit.
        assert!((manager.parameters().vehicle_target_velocity(V1, 10.0) - 7.0).abs() < 1e-5);
    }

    #[test]
    fn global_settings_reach_the_store() {
        let host = SharedHost::new();
        let manager = sync_manager(&host);

        manager.set_hybrid_physics_radius(55.0);
        assert_eq!(manager.parameters().hybrid_physics_radius(), 55.0);
        manager.set_respawn_boundaries(30.0, 90.0);
        assert_eq!(manager.parameters().respawn_boundaries(), (30.0, 90.0));
    }
}

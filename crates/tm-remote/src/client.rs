//! TCP client implementing the control facade against a remote instance.

use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tm_core::constants::networking::RPC_TIMEOUT_MS;
use tm_core::{ActorId, RoadOption, Vec3};
use tm_sim::TrafficControl;

use crate::error::{RemoteError, RemoteResult};
use crate::lock;
use crate::protocol::{read_message, write_message, Request, Response};

/// Gap between liveness probes issued by the watchdog.
const LIVENESS_INTERVAL: Duration = Duration::from_millis(1000);
/// Watchdog wake granularity, kept short so shutdown joins promptly.
const WATCHDOG_POLL: Duration = Duration::from_millis(50);

struct ClientInner {
    stream: Mutex<TcpStream>,
    pending_error: Mutex<Option<String>>,
}

impl ClientInner {
    fn call(&self, request: &Request) -> RemoteResult<Response> {
        let mut stream = lock(&self.stream);
        write_message(&mut *stream, request)?;
        let response: Response = read_message(&mut *stream)?;
        if let Response::Error { message } = response {
            return Err(RemoteError::Remote(message));
        }
        Ok(response)
    }

    /// Keep the first failure; the host polls and clears it.
    fn record_error(&self, message: String) {
        log::warn!("{message}");
        let mut pending = lock(&self.pending_error);
        if pending.is_none() {
            *pending = Some(message);
        }
    }
}

/// Facade over a traffic manager hosted in another process.
///
/// Setters are fire-and-forget like their in-process counterparts: a failed
/// RPC is recorded as a pending error rather than surfaced at the call
/// site, so the host's tick path stays exception-free.
pub struct RemoteClient {
    inner: Arc<ClientInner>,
    watchdog_stop: Arc<AtomicBool>,
    watchdog: Option<JoinHandle<()>>,
    port: u16,
}

impl RemoteClient {
    /// Connect to the instance on `port`, verify it answers a liveness
    /// probe, and start the background watchdog.
    pub fn connect(port: u16) -> RemoteResult<Self> {
        let stream = open_stream(port)?;
        let inner = Arc::new(ClientInner {
            stream: Mutex::new(stream),
            pending_error: Mutex::new(None),
        });
        match inner.call(&Request::Ping)? {
            Response::Ok => {}
            _ => return Err(RemoteError::UnexpectedReply { request: "ping" }),
        }

        // The watchdog probes on its own connection so it never queues
        // behind a running synchronous tick.
        let watchdog_stream = open_stream(port)?;
        let watchdog_stop = Arc::new(AtomicBool::new(false));
        let watchdog_inner = Arc::clone(&inner);
        let stop = Arc::clone(&watchdog_stop);
        let watchdog = std::thread::Builder::new()
            .name("tm-remote-watchdog".into())
            .spawn(move || watchdog_loop(watchdog_inner, watchdog_stream, stop))?;

        Ok(Self { inner, watchdog_stop, watchdog: Some(watchdog), port })
    }

    /// Whether an instance on `port` answers a liveness probe right now.
    pub fn probe(port: u16) -> bool {
        let response = open_stream(port).and_then(|mut stream| {
            write_message(&mut stream, &Request::Ping)?;
            read_message::<_, Response>(&mut stream)
        });
        matches!(response, Ok(Response::Ok))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The first connectivity failure since the last poll, if any.
    pub fn take_pending_error(&self) -> Option<String> {
        lock(&self.inner.pending_error).take()
    }

    fn send(&self, name: &'static str, request: Request) {
        match self.inner.call(&request) {
            Ok(Response::Ok) => {}
            Ok(_) => self.inner.record_error(format!("{name}: unexpected reply")),
            Err(error) => self.inner.record_error(format!("{name} failed: {error}")),
        }
    }

    fn stop_watchdog(&mut self) {
        self.watchdog_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.watchdog.take() {
            let _ = handle.join();
        }
    }
}

impl TrafficControl for RemoteClient {
    fn register_vehicles(&self, actors: &[ActorId]) {
        self.send("register_vehicles", Request::RegisterVehicles { actors: actors.to_vec() });
    }

    fn unregister_vehicles(&self, actors: &[ActorId]) {
        self.send("unregister_vehicles", Request::UnregisterVehicles { actors: actors.to_vec() });
    }

    fn set_percentage_speed_difference(&self, actor: ActorId, percentage: f32) {
        self.send(
            "set_percentage_speed_difference",
            Request::SetPercentageSpeedDifference { actor, percentage },
        );
    }

    fn set_global_percentage_speed_difference(&self, percentage: f32) {
        self.send(
            "set_global_percentage_speed_difference",
            Request::SetGlobalPercentageSpeedDifference { percentage },
        );
    }

    fn set_desired_speed(&self, actor: ActorId, speed: f32) {
        self.send("set_desired_speed", Request::SetDesiredSpeed { actor, speed });
    }

    fn set_distance_to_leading_vehicle(&self, actor: ActorId, distance: f32) {
        self.send(
            "set_distance_to_leading_vehicle",
            Request::SetDistanceToLeadingVehicle { actor, distance },
        );
    }

    fn set_global_distance_to_leading_vehicle(&self, distance: f32) {
        self.send(
            "set_global_distance_to_leading_vehicle",
            Request::SetGlobalDistanceToLeadingVehicle { distance },
        );
    }

    fn set_lane_offset(&self, actor: ActorId, offset: f32) {
        self.send("set_lane_offset", Request::SetLaneOffset { actor, offset });
    }

    fn set_global_lane_offset(&self, offset: f32) {
        self.send("set_global_lane_offset", Request::SetGlobalLaneOffset { offset });
    }

    fn set_auto_lane_change(&self, actor: ActorId, enable: bool) {
        self.send("set_auto_lane_change", Request::SetAutoLaneChange { actor, enable });
    }

    fn set_force_lane_change(&self, actor: ActorId, direction_left: bool) {
        self.send("set_force_lane_change", Request::SetForceLaneChange { actor, direction_left });
    }

    fn set_keep_right_percentage(&self, actor: ActorId, percentage: f32) {
        self.send(
            "set_keep_right_percentage",
            Request::SetKeepRightPercentage { actor, percentage },
        );
    }

    fn set_random_left_lane_change_percentage(&self, actor: ActorId, percentage: f32) {
        self.send(
            "set_random_left_lane_change_percentage",
            Request::SetRandomLeftLaneChangePercentage { actor, percentage },
        );
    }

    fn set_random_right_lane_change_percentage(&self, actor: ActorId, percentage: f32) {
        self.send(
            "set_random_right_lane_change_percentage",
            Request::SetRandomRightLaneChangePercentage { actor, percentage },
        );
    }

    fn set_percentage_running_light(&self, actor: ActorId, percentage: f32) {
        self.send(
            "set_percentage_running_light",
            Request::SetPercentageRunningLight { actor, percentage },
        );
    }

    fn set_percentage_running_sign(&self, actor: ActorId, percentage: f32) {
        self.send(
            "set_percentage_running_sign",
            Request::SetPercentageRunningSign { actor, percentage },
        );
    }

    fn set_percentage_ignore_vehicles(&self, actor: ActorId, percentage: f32) {
        self.send(
            "set_percentage_ignore_vehicles",
            Request::SetPercentageIgnoreVehicles { actor, percentage },
        );
    }

    fn set_percentage_ignore_walkers(&self, actor: ActorId, percentage: f32) {
        self.send(
            "set_percentage_ignore_walkers",
            Request::SetPercentageIgnoreWalkers { actor, percentage },
        );
    }

    fn set_collision_detection(&self, reference: ActorId, other: ActorId, detect: bool) {
        self.send(
            "set_collision_detection",
            Request::SetCollisionDetection { reference, other, detect },
        );
    }

    fn set_update_vehicle_lights(&self, actor: ActorId, update: bool) {
        self.send("set_update_vehicle_lights", Request::SetUpdateVehicleLights { actor, update });
    }

    fn set_hybrid_physics_mode(&self, enabled: bool) {
        self.send("set_hybrid_physics_mode", Request::SetHybridPhysicsMode { enabled });
    }

    fn set_hybrid_physics_radius(&self, radius: f32) {
        self.send("set_hybrid_physics_radius", Request::SetHybridPhysicsRadius { radius });
    }

    fn set_osm_mode(&self, enabled: bool) {
        self.send("set_osm_mode", Request::SetOsmMode { enabled });
    }

    fn set_respawn_dormant_vehicles(&self, enabled: bool) {
        self.send(
            "set_respawn_dormant_vehicles",
            Request::SetRespawnDormantVehicles { enabled },
        );
    }

    fn set_respawn_boundaries(&self, lower: f32, upper: f32) {
        self.send("set_respawn_boundaries", Request::SetRespawnBoundaries { lower, upper });
    }

    fn upload_path(&self, actor: ActorId, points: Vec<Vec3>, empty_buffer: bool) {
        self.send("upload_path", Request::UploadPath { actor, points, empty_buffer });
    }

    fn upload_route(&self, actor: ActorId, options: Vec<RoadOption>, empty_buffer: bool) {
        self.send("upload_route", Request::UploadRoute { actor, options, empty_buffer });
    }

    fn set_random_device_seed(&self, seed: u64) {
        self.send("set_random_device_seed", Request::SetRandomDeviceSeed { seed });
    }

    fn set_synchronous_mode(&self, enabled: bool) {
        self.send("set_synchronous_mode", Request::SetSynchronousMode { enabled });
    }

    fn set_synchronous_mode_timeout_ms(&self, timeout: u64) {
        self.send(
            "set_synchronous_mode_timeout_ms",
            Request::SetSynchronousModeTimeoutMs { timeout },
        );
    }

    fn synchronous_tick(&self) -> bool {
        match self.inner.call(&Request::SynchronousTick) {
            Ok(Response::TickDone { success }) => success,
            Ok(_) => {
                self.inner.record_error("synchronous_tick: unexpected reply".into());
                false
            }
            Err(error) => {
                self.inner.record_error(format!("synchronous_tick failed: {error}"));
                false
            }
        }
    }

    fn reset(&self) {
        self.send("reset", Request::Reset);
    }

    fn shutdown(&mut self) {
        self.stop_watchdog();
        self.send("shutdown", Request::Shutdown);
    }
}

impl Drop for RemoteClient {
    fn drop(&mut self) {
        // Dropping a client leaves the remote instance running; only an
        // explicit shutdown stops it.
        self.stop_watchdog();
    }
}

fn open_stream(port: u16) -> RemoteResult<TcpStream> {
    let address = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let timeout = Duration::from_millis(RPC_TIMEOUT_MS);
    let stream = TcpStream::connect_timeout(&address, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

fn watchdog_loop(inner: Arc<ClientInner>, mut stream: TcpStream, stop: Arc<AtomicBool>) {
    let mut since_probe = Duration::ZERO;
    loop {
        std::thread::sleep(WATCHDOG_POLL);
        if stop.load(Ordering::SeqCst) {
            return;
        }
        since_probe += WATCHDOG_POLL;
        if since_probe < LIVENESS_INTERVAL {
            continue;
        }
        since_probe = Duration::ZERO;

        let alive = write_message(&mut stream, &Request::Ping)
            .and_then(|()| read_message::<_, Response>(&mut stream))
            .is_ok();
        if !alive && !stop.load(Ordering::SeqCst) {
            inner.record_error(
                "liveness probe failed; remote traffic manager is unresponsive".into(),
            );
            return;
        }
    }
}

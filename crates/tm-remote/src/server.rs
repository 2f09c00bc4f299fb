//! TCP server hosting an in-process traffic manager instance.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tm_core::constants::networking::MIN_TRY_COUNT;
use tm_sim::{TrafficControl, TrafficManager};

use crate::error::{RemoteError, RemoteResult};
use crate::lock;
use crate::protocol::{read_message, write_message, Request, Response};

const ACCEPT_POLL: Duration = Duration::from_millis(10);
/// Per-connection read timeout, so handler threads notice a server stop.
const CONNECTION_POLL: Duration = Duration::from_millis(100);
const BIND_BACKOFF: Duration = Duration::from_millis(10);

/// Serves one [`TrafficManager`] to any number of remote clients.
///
/// Each accepted connection gets its own handler thread; requests across
/// connections serialize on the manager mutex.
pub struct RemoteServer {
    port: u16,
    manager: Arc<Mutex<TrafficManager>>,
    stop: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

impl RemoteServer {
    /// Bind `port` on loopback and serve `manager` until [`shutdown`].
    ///
    /// The bind is retried with linear backoff up to `MIN_TRY_COUNT` times
    /// before reporting a hard startup failure.
    ///
    /// [`shutdown`]: RemoteServer::shutdown
    pub fn serve(manager: TrafficManager, port: u16) -> RemoteResult<Self> {
        let listener = bind_with_retry(port)?;
        listener.set_nonblocking(true)?;

        let manager = Arc::new(Mutex::new(manager));
        let stop = Arc::new(AtomicBool::new(false));
        let accept_manager = Arc::clone(&manager);
        let accept_stop = Arc::clone(&stop);
        let accept_thread = std::thread::Builder::new()
            .name("tm-remote-accept".into())
            .spawn(move || accept_loop(listener, accept_manager, accept_stop))?;

        log::debug!("remote traffic manager listening on port {port}");
        Ok(Self { port, manager, stop, accept_thread: Some(accept_thread) })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop accepting, drop live connections, and shut the hosted manager
    /// down.  Idempotent.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.accept_thread.take() {
            if handle.join().is_err() {
                log::warn!("remote accept thread panicked during shutdown");
            }
        }
        lock(&self.manager).shutdown();
    }
}

impl Drop for RemoteServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn bind_with_retry(port: u16) -> RemoteResult<TcpListener> {
    let address = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    for attempt in 1..=MIN_TRY_COUNT {
        match TcpListener::bind(address) {
            Ok(listener) => return Ok(listener),
            Err(error) => {
                log::warn!("bind attempt {attempt}/{MIN_TRY_COUNT} on port {port} failed: {error}");
                std::thread::sleep(BIND_BACKOFF * attempt);
            }
        }
    }
    Err(RemoteError::BindExhausted { port, attempts: MIN_TRY_COUNT })
}

fn accept_loop(listener: TcpListener, manager: Arc<Mutex<TrafficManager>>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                log::debug!("remote client connected from {peer}");
                let connection_manager = Arc::clone(&manager);
                let connection_stop = Arc::clone(&stop);
                let spawned = std::thread::Builder::new()
                    .name("tm-remote-conn".into())
                    .spawn(move || serve_connection(stream, &connection_manager, &connection_stop));
                if let Err(error) = spawned {
                    log::warn!("could not spawn connection handler: {error}");
                }
            }
            Err(error) if error.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(error) => {
                log::warn!("accept failed: {error}");
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn serve_connection(stream: TcpStream, manager: &Mutex<TrafficManager>, stop: &AtomicBool) {
    let mut stream = stream;
    if stream.set_read_timeout(Some(CONNECTION_POLL)).is_err() || stream.set_nodelay(true).is_err()
    {
        return;
    }

    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let request: Request = match read_message(&mut stream) {
            Ok(request) => request,
            Err(RemoteError::Io(error))
                if matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(RemoteError::Io(error)) if error.kind() == ErrorKind::UnexpectedEof => break,
            Err(error) => {
                log::warn!("dropping remote connection: {error}");
                break;
            }
        };

        let stopping = matches!(request, Request::Shutdown);
        let response = dispatch(request, manager, stop);
        if write_message(&mut stream, &response).is_err() || stopping {
            break;
        }
    }
}

fn dispatch(request: Request, manager: &Mutex<TrafficManager>, stop: &AtomicBool) -> Response {
    // Liveness probes must answer even while another connection holds the
    // manager through a long synchronous tick.
    if matches!(request, Request::Ping) {
        return Response::Ok;
    }
    let mut manager = lock(manager);
    match request {
        Request::Ping => Response::Ok,
        Request::RegisterVehicles { actors } => {
            manager.register_vehicles(&actors);
            Response::Ok
        }
        Request::UnregisterVehicles { actors } => {
            manager.unregister_vehicles(&actors);
            Response::Ok
        }
        Request::SetPercentageSpeedDifference { actor, percentage } => {
            manager.set_percentage_speed_difference(actor, percentage);
            Response::Ok
        }
        Request::SetGlobalPercentageSpeedDifference { percentage } => {
            manager.set_global_percentage_speed_difference(percentage);
            Response::Ok
        }
        Request::SetDesiredSpeed { actor, speed } => {
            manager.set_desired_speed(actor, speed);
            Response::Ok
        }
        Request::SetDistanceToLeadingVehicle { actor, distance } => {
            manager.set_distance_to_leading_vehicle(actor, distance);
            Response::Ok
        }
        Request::SetGlobalDistanceToLeadingVehicle { distance } => {
            manager.set_global_distance_to_leading_vehicle(distance);
            Response::Ok
        }
        Request::SetLaneOffset { actor, offset } => {
            manager.set_lane_offset(actor, offset);
            Response::Ok
        }
        Request::SetGlobalLaneOffset { offset } => {
            manager.set_global_lane_offset(offset);
            Response::Ok
        }
        Request::SetAutoLaneChange { actor, enable } => {
            manager.set_auto_lane_change(actor, enable);
            Response::Ok
        }
        Request::SetForceLaneChange { actor, direction_left } => {
            manager.set_force_lane_change(actor, direction_left);
            Response::Ok
        }
        Request::SetKeepRightPercentage { actor, percentage } => {
            manager.set_keep_right_percentage(actor, percentage);
            Response::Ok
        }
        Request::SetRandomLeftLaneChangePercentage { actor, percentage } => {
            manager.set_random_left_lane_change_percentage(actor, percentage);
            Response::Ok
        }
        Request::SetRandomRightLaneChangePercentage { actor, percentage } => {
            manager.set_random_right_lane_change_percentage(actor, percentage);
            Response::Ok
        }
        Request::SetPercentageRunningLight { actor, percentage } => {
            manager.set_percentage_running_light(actor, percentage);
            Response::Ok
        }
        Request::SetPercentageRunningSign { actor, percentage } => {
            manager.set_percentage_running_sign(actor, percentage);
            Response::Ok
        }
        Request::SetPercentageIgnoreVehicles { actor, percentage } => {
            manager.set_percentage_ignore_vehicles(actor, percentage);
            Response::Ok
        }
        Request::SetPercentageIgnoreWalkers { actor, percentage } => {
            manager.set_percentage_ignore_walkers(actor, percentage);
            Response::Ok
        }
        Request::SetCollisionDetection { reference, other, detect } => {
            manager.set_collision_detection(reference, other, detect);
            Response::Ok
        }
        Request::SetUpdateVehicleLights { actor, update } => {
            manager.set_update_vehicle_lights(actor, update);
            Response::Ok
        }
        Request::SetHybridPhysicsMode { enabled } => {
            manager.set_hybrid_physics_mode(enabled);
            Response::Ok
        }
        Request::SetHybridPhysicsRadius { radius } => {
            manager.set_hybrid_physics_radius(radius);
            Response::Ok
        }
        Request::SetOsmMode { enabled } => {
            manager.set_osm_mode(enabled);
            Response::Ok
        }
        Request::SetRespawnDormantVehicles { enabled } => {
            manager.set_respawn_dormant_vehicles(enabled);
            Response::Ok
        }
        Request::SetRespawnBoundaries { lower, upper } => {
            manager.set_respawn_boundaries(lower, upper);
            Response::Ok
        }
        Request::UploadPath { actor, points, empty_buffer } => {
            manager.upload_path(actor, points, empty_buffer);
            Response::Ok
        }
        Request::UploadRoute { actor, options, empty_buffer } => {
            manager.upload_route(actor, options, empty_buffer);
            Response::Ok
        }
        Request::SetRandomDeviceSeed { seed } => {
            manager.set_random_device_seed(seed);
            Response::Ok
        }
        Request::SetSynchronousMode { enabled } => {
            manager.set_synchronous_mode(enabled);
            Response::Ok
        }
        Request::SetSynchronousModeTimeoutMs { timeout } => {
            manager.set_synchronous_mode_timeout_ms(timeout);
            Response::Ok
        }
        Request::SynchronousTick => {
            Response::TickDone { success: manager.synchronous_tick() }
        }
        Request::Reset => {
            manager.reset();
            Response::Ok
        }
        Request::Shutdown => {
            manager.shutdown();
            stop.store(true, Ordering::SeqCst);
            Response::Ok
        }
    }
}

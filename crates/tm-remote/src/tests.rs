//! Wire codec tests plus loopback end-to-end coverage.
//!
//! Each networked test uses its own port so the suite can run in parallel.

use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tm_core::{
    ActorId, ActorSnapshot, CommandBatch, RoadId, RoadOption, Rotation, Timestamp, Transform,
    Vec3, Weather, WorldSnapshot,
};
use tm_graph::{MapDescription, RoadGraph};
use tm_sim::{TrafficControl, TrafficManager, WorldHost};

use crate::protocol::{read_message, write_message, Request, Response, MAX_MESSAGE_BYTES};
use crate::{Directory, RemoteClient, RemoteError, RemoteServer};

const V1: ActorId = ActorId(1);

struct HostInner {
    frame: AtomicU64,
    actors: Mutex<Vec<ActorSnapshot>>,
    batches: Mutex<Vec<CommandBatch>>,
}

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

fn test_manager(host: &SharedHost) -> TrafficManager {
    let mut desc = MapDescription::new("straight");
    desc.add_straight_segment(RoadId(1), 1, Vec3::ZERO, 0.0, 100.0, 5.0);
    let graph = Arc::new(RoadGraph::build(&desc).unwrap());
    TrafficManager::new(host.clone(), graph, 42).unwrap()
}

mod wire {
    use super::*;

    fn roundtrip(request: &Request) -> Request {
        let mut buffer = Vec::new();
        write_message(&mut buffer, request).unwrap();
        read_message(&mut Cursor::new(buffer)).unwrap()
    }

    #[test]
    fn representative_requests_roundtrip() {
        let requests = vec![
            Request::Ping,
            Request::RegisterVehicles { actors: vec![V1, ActorId(9)] },
            Request::SetDesiredSpeed { actor: V1, speed: 12.5 },
            Request::SetCollisionDetection { reference: V1, other: ActorId(2), detect: false },
            Request::UploadPath {
                actor: V1,
                points: vec![Vec3::new(1.0, 2.0, 0.0), Vec3::new(3.0, 4.0, 0.0)],
                empty_buffer: true,
            },
            Request::UploadRoute {
                actor: V1,
                options: vec![RoadOption::Straight, RoadOption::Left],
                empty_buffer: false,
            },
            Request::SetSynchronousMode { enabled: true },
            Request::SynchronousTick,
            Request::Shutdown,
        ];
        for request in &requests {
            assert_eq!(&roundtrip(request), request);
        }
    }

    #[test]
    fn responses_roundtrip() {
        for response in [
            Response::Ok,
            Response::TickDone { success: true },
            Response::Error { message: "no such instance".into() },
        ] {
            let mut buffer = Vec::new();
            write_message(&mut buffer, &response).unwrap();
            let back: Response = read_message(&mut Cursor::new(buffer)).unwrap();
            assert_eq!(back, response);
        }
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let prefix = ((MAX_MESSAGE_BYTES + 1) as u32).to_le_bytes();
        let result: Result<Request, _> = read_message(&mut Cursor::new(prefix.to_vec()));
        assert!(matches!(result, Err(RemoteError::Oversized(_))));
    }

    #[test]
    fn truncated_message_is_an_io_error() {
        let mut buffer = Vec::new();
        write_message(&mut buffer, &Request::Ping).unwrap();
        buffer.truncate(buffer.len() - 1);
        let result: Result<Request, _> = read_message(&mut Cursor::new(buffer));
        assert!(matches!(result, Err(RemoteError::Io(_))));
    }
}

mod end_to_end {
    use super::*;

    #[test]
    fn client_drives_a_hosted_instance() {
        let host = SharedHost::new();
        let server = RemoteServer::serve(test_manager(&host), 28801).unwrap();

        let mut client = RemoteClient::connect(server.port()).unwrap();
        client.set_synchronous_mode(true);
        host.set_actors(vec![ActorSnapshot::vehicle(
            V1,
            Transform::new(Vec3::new(2.0, 0.0, 0.0), Rotation::from_yaw(0.0)),
            Vec3::new(5.0, 0.0, 0.0),
        )]);
        client.register_vehicles(&[V1]);

        assert!(client.synchronous_tick());
        assert_eq!(host.batch_count(), 1);
        assert!(client.take_pending_error().is_none());

        client.shutdown();
        drop(server);
    }

    #[test]
    fn failed_rpc_becomes_a_pending_error() {
        let host = SharedHost::new();
        let server = RemoteServer::serve(test_manager(&host), 28802).unwrap();
        let client = RemoteClient::connect(28802).unwrap();

        // Stop the remote side out from under the client and give its
        // connection handlers time to wind down.
        drop(server);
        std::thread::sleep(std::time::Duration::from_millis(300));

        client.set_desired_speed(V1, 10.0);
        let error = client.take_pending_error();
        assert!(error.is_some(), "dead remote should surface as a pending error");
        // The error channel is poll-and-clear.
        assert!(client.take_pending_error().is_none());
    }

    #[test]
    fn probe_reports_liveness() {
        assert!(!RemoteClient::probe(28803));
        let host = SharedHost::new();
        let _server = RemoteServer::serve(test_manager(&host), 28803).unwrap();
        assert!(RemoteClient::probe(28803));
    }
}

mod directory {
    use super::*;

    #[test]
    fn hosts_locally_then_attaches() {
        let directory = Directory::new();
        let host = SharedHost::new();

        let first = directory.connect(28804, || Ok(test_manager(&host))).unwrap();
        assert!(directory.hosts(28804));

        // A second connect finds the live instance and must not build
        // another manager.
        let second = directory
            .connect(28804, || -> tm_sim::SimResult<TrafficManager> {
                panic!("expected to attach to the existing instance")
            })
            .unwrap();
        assert_eq!(second.port(), first.port());

        directory.shutdown_all();
        assert!(!directory.hosts(28804));
    }
}

//! Port-to-instance directory: attach to a running remote instance or host
//! one locally.

use std::sync::Mutex;

use rustc_hash::FxHashMap;

use tm_core::constants::networking::DEFAULT_PORT;
use tm_sim::{SimResult, TrafficManager};

use crate::client::RemoteClient;
use crate::error::RemoteResult;
use crate::lock;
use crate::server::RemoteServer;

/// Tracks which ports this process is hosting a traffic manager on.
///
/// `connect` implements the local-or-remote selection protocol: if a live
/// instance already answers on the port, attach to it; otherwise build a
/// local manager, advertise it on that port, and connect to our own server.
pub struct Directory {
    servers: Mutex<FxHashMap<u16, RemoteServer>>,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory {
    pub fn new() -> Self {
        Self { servers: Mutex::new(FxHashMap::default()) }
    }

    /// Connect on the well-known default port.
    pub fn connect_default<F>(&self, make_manager: F) -> RemoteResult<RemoteClient>
    where
        F: FnOnce() -> SimResult<TrafficManager>,
    {
        self.connect(DEFAULT_PORT, make_manager)
    }

    /// Attach to the instance on `port`, building and hosting one with
    /// `make_manager` when nothing answers the probe.
    pub fn connect<F>(&self, port: u16, make_manager: F) -> RemoteResult<RemoteClient>
    where
        F: FnOnce() -> SimResult<TrafficManager>,
    {
        if RemoteClient::probe(port) {
            log::debug!("attaching to live traffic manager on port {port}");
            return RemoteClient::connect(port);
        }

        log::debug!("no instance on port {port}; hosting locally");
        let manager = make_manager()?;
        let server = RemoteServer::serve(manager, port)?;
        lock(&self.servers).insert(port, server);
        RemoteClient::connect(port)
    }

    /// Whether this directory hosts the instance on `port`.
    pub fn hosts(&self, port: u16) -> bool {
        lock(&self.servers).contains_key(&port)
    }

    /// Shut down every locally hosted instance.
    pub fn shutdown_all(&self) {
        for (_, mut server) in lock(&self.servers).drain() {
            server.shutdown();
        }
    }
}

impl Drop for Directory {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}

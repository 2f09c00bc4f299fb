//! `tm-remote` — the request/response facade over TCP.
//!
//! The in-process [`tm_sim::TrafficManager`] and the [`RemoteClient`] here
//! implement the same [`tm_sim::TrafficControl`] trait, so a host can drive
//! either without caring where the instance lives.  Messages are JSON with
//! a `u32` length prefix; every request gets exactly one response.
//!
//! # Crate layout
//!
//! | Module        | Contents                                             |
//! |---------------|------------------------------------------------------|
//! | [`protocol`]  | `Request`/`Response` enums and the wire framing      |
//! | [`server`]    | `RemoteServer` — hosts a local manager on a port     |
//! | [`client`]    | `RemoteClient` — facade impl plus liveness watchdog  |
//! | [`directory`] | `Directory` — attach-or-host selection per port      |

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod client;
pub mod directory;
pub mod error;
pub mod protocol;
pub mod server;

#[cfg(test)]
mod tests;

pub use client::RemoteClient;
pub use directory::Directory;
pub use error::{RemoteError, RemoteResult};
pub use protocol::{Request, Response};
pub use server::RemoteServer;

/// Lock a mutex, recovering the guard if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

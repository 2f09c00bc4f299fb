//! The wire protocol: one JSON document per message, length-prefixed.
//!
//! Framing is a little-endian `u32` byte count followed by the JSON body.
//! Every request receives exactly one response on the same connection.

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use tm_core::{ActorId, RoadOption, Vec3};

use crate::error::{RemoteError, RemoteResult};

/// Upper bound on a single message body; a custom path upload of tens of
/// thousands of points stays far below this.
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// One facade call, mirroring [`tm_sim::TrafficControl`] method for method.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Liveness probe; also issued by the client watchdog.
    Ping,
    RegisterVehicles { actors: Vec<ActorId> },
    UnregisterVehicles { actors: Vec<ActorId> },
    SetPercentageSpeedDifference { actor: ActorId, percentage: f32 },
    SetGlobalPercentageSpeedDifference { percentage: f32 },
    SetDesiredSpeed { actor: ActorId, speed: f32 },
    SetDistanceToLeadingVehicle { actor: ActorId, distance: f32 },
    SetGlobalDistanceToLeadingVehicle { distance: f32 },
    SetLaneOffset { actor: ActorId, offset: f32 },
    SetGlobalLaneOffset { offset: f32 },
    SetAutoLaneChange { actor: ActorId, enable: bool },
    SetForceLaneChange { actor: ActorId, direction_left: bool },
    SetKeepRightPercentage { actor: ActorId, percentage: f32 },
    SetRandomLeftLaneChangePercentage { actor: ActorId, percentage: f32 },
    SetRandomRightLaneChangePercentage { actor: ActorId, percentage: f32 },
    SetPercentageRunningLight { actor: ActorId, percentage: f32 },
    SetPercentageRunningSign { actor: ActorId, percentage: f32 },
    SetPercentageIgnoreVehicles { actor: ActorId, percentage: f32 },
    SetPercentageIgnoreWalkers { actor: ActorId, percentage: f32 },
    SetCollisionDetection { reference: ActorId, other: ActorId, detect: bool },
    SetUpdateVehicleLights { actor: ActorId, update: bool },
    SetHybridPhysicsMode { enabled: bool },
    SetHybridPhysicsRadius { radius: f32 },
    SetOsmMode { enabled: bool },
    SetRespawnDormantVehicles { enabled: bool },
    SetRespawnBoundaries { lower: f32, upper: f32 },
    UploadPath { actor: ActorId, points: Vec<Vec3>, empty_buffer: bool },
    UploadRoute { actor: ActorId, options: Vec<RoadOption>, empty_buffer: bool },
    SetRandomDeviceSeed { seed: u64 },
    SetSynchronousMode { enabled: bool },
    SetSynchronousModeTimeoutMs { timeout: u64 },
    SynchronousTick,
    Reset,
    Shutdown,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok,
    TickDone { success: bool },
    Error { message: String },
}

/// Write one length-prefixed message.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> RemoteResult<()> {
    let body = serde_json::to_vec(message)?;
    if body.len() > MAX_MESSAGE_BYTES {
        return Err(RemoteError::Oversized(body.len()));
    }
    writer.write_all(&(body.len() as u32).to_le_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed message.
pub fn read_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> RemoteResult<T> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix)?;
    let length = u32::from_le_bytes(prefix) as usize;
    if length > MAX_MESSAGE_BYTES {
        return Err(RemoteError::Oversized(length));
    }
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;
    Ok(serde_json::from_slice(&body)?)
}

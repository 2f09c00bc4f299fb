//! Binary map cache codec.
//!
//! Rebuilding the graph for a large map costs seconds; the cache skips the
//! discretization, lane-link, grid, and road-option passes on repeated loads
//! of an unchanged map.  The format is a little-endian record stream:
//!
//! ```text
//! u32  waypoint count
//! per waypoint:
//!   u64  waypoint id          u32  road id        u32  section id
//!   i32  lane id              f32  arc length s
//!   u16  next count,  u64 × count
//!   u16  previous count,  u64 × count
//!   u64  left id              u64  right id
//!   i64  geodesic grid id     u8   junction flag  u8   road option
//! ```
//!
//! Poses are not stored: the loader recovers each waypoint's transform by
//! arc-length interpolation along its segment's raw samples, so the cache
//! stays valid as long as the map description itself is unchanged.

use std::io::{Read, Write};

use tm_core::{GeoGridId, RoadId, RoadOption, WaypointId};

use crate::description::MapDescription;
use crate::error::{GraphError, GraphResult};
use crate::graph::RoadGraph;
use crate::waypoint::Waypoint;

// ── Little-endian primitives ─────────────────────────────────────────────────

fn write_u16<W: Write>(w: &mut W, v: u16) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}
fn write_u32<W: Write>(w: &mut W, v: u32) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}
fn write_u64<W: Write>(w: &mut W, v: u64) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u8<R: Read>(r: &mut R) -> std::io::Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}
fn read_u16<R: Read>(r: &mut R) -> std::io::Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}
fn read_u32<R: Read>(r: &mut R) -> std::io::Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}
fn read_u64<R: Read>(r: &mut R) -> std::io::Result<u64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}

// ── Codec ────────────────────────────────────────────────────────────────────

impl RoadGraph {
    /// Serialize the built graph as a flat record stream.
    pub fn save_cache<W: Write>(&self, w: &mut W) -> GraphResult<()> {
        write_u32(w, self.len() as u32)?;
        for wp in self.iter() {
            write_u64(w, wp.id.0)?;
            write_u32(w, wp.road_id.0)?;
            write_u32(w, wp.section_id)?;
            w.write_all(&wp.lane_id.to_le_bytes())?;
            w.write_all(&wp.s.to_le_bytes())?;

            write_u16(w, wp.next.len() as u16)?;
            for n in &wp.next {
                write_u64(w, n.0)?;
            }
            write_u16(w, wp.previous.len() as u16)?;
            for p in &wp.previous {
                write_u64(w, p.0)?;
            }

            write_u64(w, wp.left.0)?;
            write_u64(w, wp.right.0)?;
            w.write_all(&wp.grid_id.0.to_le_bytes())?;
            w.write_all(&[wp.is_junction as u8, wp.road_option as u8])?;
        }
        Ok(())
    }

    /// Reconstruct a graph from a cache stream plus the map description the
    /// cache was built from.  Adjacency, grids, and road options come from
    /// the records; poses are re-interpolated from the description.
    pub fn load_cache<R: Read>(r: &mut R, desc: &MapDescription) -> GraphResult<Self> {
        let count = read_u32(r)? as usize;
        let mut waypoints = Vec::with_capacity(count);

        for _ in 0..count {
            let id = WaypointId(read_u64(r)?);
            let road_id = RoadId(read_u32(r)?);
            let section_id = read_u32(r)?;
            let lane_id = {
                let mut b = [0u8; 4];
                r.read_exact(&mut b)?;
                i32::from_le_bytes(b)
            };
            let s = {
                let mut b = [0u8; 4];
                r.read_exact(&mut b)?;
                f32::from_le_bytes(b)
            };

            let n_next = read_u16(r)? as usize;
            let mut next = Vec::with_capacity(n_next);
            for _ in 0..n_next {
                next.push(WaypointId(read_u64(r)?));
            }
            let n_prev = read_u16(r)? as usize;
            let mut previous = Vec::with_capacity(n_prev);
            for _ in 0..n_prev {
                previous.push(WaypointId(read_u64(r)?));
            }

            let left = WaypointId(read_u64(r)?);
            let right = WaypointId(read_u64(r)?);
            let grid_id = {
                let mut b = [0u8; 8];
                r.read_exact(&mut b)?;
                GeoGridId(i64::from_le_bytes(b))
            };
            let is_junction = read_u8(r)? != 0;
            let road_option = RoadOption::from_u8(read_u8(r)?);

            let seed = desc.segment(id.segment()).ok_or_else(|| {
                GraphError::CorruptCache(format!("cache references unknown {}", id.segment()))
            })?;

            waypoints.push(Waypoint {
                id,
                transform: seed.pose_at(s),
                road_id,
                section_id,
                lane_id,
                lane_width: seed.lane_width,
                s,
                next,
                previous,
                left,
                right,
                is_junction,
                junction_id: seed.junction_id,
                grid_id,
                road_option,
            });
        }

        Ok(RoadGraph::from_parts(desc.name.clone(), waypoints))
    }
}

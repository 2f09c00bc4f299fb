//! Occupancy tracker: who is routed through which waypoints and grids.
//!
//! Two bidirectional mappings, never persisted:
//!
//! - waypoint ↔ vehicles whose buffers pass through it (fine-grained, used
//!   for lane-change safety windows and junction safe-space checks);
//! - geodesic grid ↔ vehicles currently inside it (coarse, used to shortlist
//!   collision candidates and to keep dormant respawns exclusive per grid).
//!
//! Unregistered actors get footprints too — the collision stage must see
//! them even though no stage drives them.

use rustc_hash::{FxHashMap, FxHashSet};

use tm_core::{ActorId, GeoGridId, WaypointId};

#[derive(Default)]
pub struct OccupancyTracker {
    waypoint_occupancy: FxHashMap<WaypointId, FxHashSet<ActorId>>,
    actor_waypoints: FxHashMap<ActorId, FxHashSet<WaypointId>>,
    grid_occupancy: FxHashMap<GeoGridId, FxHashSet<ActorId>>,
    actor_grids: FxHashMap<ActorId, FxHashSet<GeoGridId>>,
}

impl OccupancyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Waypoint occupancy ────────────────────────────────────────────────

    /// Record that `actor`'s buffer now passes through `wp`.
    pub fn update_passing_vehicle(&mut self, wp: WaypointId, actor: ActorId) {
        self.waypoint_occupancy.entry(wp).or_default().insert(actor);
        self.actor_waypoints.entry(actor).or_default().insert(wp);
    }

    /// Record that `actor`'s buffer no longer passes through `wp`.
    pub fn remove_passing_vehicle(&mut self, wp: WaypointId, actor: ActorId) {
        if let Some(set) = self.waypoint_occupancy.get_mut(&wp) {
            set.remove(&actor);
            if set.is_empty() {
                self.waypoint_occupancy.remove(&wp);
            }
        }
        if let Some(set) = self.actor_waypoints.get_mut(&actor) {
            set.remove(&wp);
        }
    }

    /// Vehicles whose buffers pass through `wp`.
    pub fn passing_vehicles(&self, wp: WaypointId) -> impl Iterator<Item = ActorId> + '_ {
        self.waypoint_occupancy.get(&wp).into_iter().flatten().copied()
    }

    pub fn is_waypoint_free(&self, wp: WaypointId) -> bool {
        self.waypoint_occupancy.get(&wp).is_none_or(|s| s.is_empty())
    }

    // ── Grid occupancy ────────────────────────────────────────────────────

    /// Replace `actor`'s grid membership with `grids` (diff-updated).
    pub fn update_grid_position<I>(&mut self, actor: ActorId, grids: I)
    where
        I: IntoIterator<Item = GeoGridId>,
    {
        let new: FxHashSet<GeoGridId> = grids.into_iter().filter(|g| g.is_some()).collect();
        let old = self.actor_grids.entry(actor).or_default();

        for gone in old.difference(&new) {
            if let Some(set) = self.grid_occupancy.get_mut(gone) {
                set.remove(&actor);
                if set.is_empty() {
                    self.grid_occupancy.remove(gone);
                }
            }
        }
        for added in new.difference(old) {
            self.grid_occupancy.entry(*added).or_default().insert(actor);
        }
        *old = new;
    }

    /// All actors sharing at least one grid with `actor` (excluding it).
    pub fn overlapping_actors(&self, actor: ActorId) -> Vec<ActorId> {
        let mut found = FxHashSet::default();
        if let Some(grids) = self.actor_grids.get(&actor) {
            for grid in grids {
                if let Some(occupants) = self.grid_occupancy.get(grid) {
                    found.extend(occupants.iter().copied());
                }
            }
        }
        found.remove(&actor);
        let mut out: Vec<ActorId> = found.into_iter().collect();
        // Deterministic candidate order regardless of hash iteration.
        out.sort_unstable();
        out
    }

    /// Grid exclusivity test for dormant respawns: free when nobody (or only
    /// `actor` itself) occupies the grid.
    pub fn is_grid_free(&self, grid: GeoGridId, actor: ActorId) -> bool {
        self.grid_occupancy
            .get(&grid)
            .is_none_or(|set| set.is_empty() || (set.len() == 1 && set.contains(&actor)))
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Erase every trace of `actor` (idempotent).
    pub fn remove_actor(&mut self, actor: ActorId) {
        if let Some(wps) = self.actor_waypoints.remove(&actor) {
            for wp in wps {
                if let Some(set) = self.waypoint_occupancy.get_mut(&wp) {
                    set.remove(&actor);
                    if set.is_empty() {
                        self.waypoint_occupancy.remove(&wp);
                    }
                }
            }
        }
        if let Some(grids) = self.actor_grids.remove(&actor) {
            for grid in grids {
                if let Some(set) = self.grid_occupancy.get_mut(&grid) {
                    set.remove(&actor);
                    if set.is_empty() {
                        self.grid_occupancy.remove(&grid);
                    }
                }
            }
        }
    }

    /// `true` when no structure references `actor` (removal invariant).
    pub fn references(&self, actor: ActorId) -> bool {
        self.actor_waypoints.contains_key(&actor)
            || self.actor_grids.contains_key(&actor)
            || self.waypoint_occupancy.values().any(|s| s.contains(&actor))
            || self.grid_occupancy.values().any(|s| s.contains(&actor))
    }

    pub fn clear(&mut self) {
        self.waypoint_occupancy.clear();
        self.actor_waypoints.clear();
        self.grid_occupancy.clear();
        self.actor_grids.clear();
    }
}

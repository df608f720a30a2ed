//! The mutable world container: keyed entity maps, grid and scale
//! parameters, and the world-level strategy defaults. Cross-entity
//! references are always by id (§9 "Cyclic back-references"), so
//! [`WorldState::snapshot`] is a plain deep copy of these maps.

use std::collections::HashMap;

use serde::Serialize;

use super::entities::{Battery, BatteryId, BatteryLocation, Position, Scooter, ScooterId, ScooterState, Station, StationId};
use super::strategy::{ActivityStrategyKind, MovementStrategyKind};

/// Static metadata about a configured scooter group, carried through to
/// snapshots for the visualization client.
#[derive(Debug, Clone, Serialize)]
pub struct ScooterGroupMeta {
    pub id: String,
    pub name: String,
    pub color: String,
}

pub struct WorldState {
    pub current_time: f64,
    pub grid_width: u32,
    pub grid_height: u32,
    pub meters_per_grid_unit: f64,
    pub time_scale: f64,

    pub scooters: HashMap<ScooterId, Scooter>,
    pub batteries: HashMap<BatteryId, Battery>,
    pub stations: HashMap<StationId, Station>,

    pub default_movement: MovementStrategyKind,
    pub default_activity: ActivityStrategyKind,
    /// Per-scooter assigned destination for scooters resolved to the
    /// Directed movement strategy; see [`super::strategy`].
    pub directed_destinations: HashMap<ScooterId, Position>,

    pub scooter_groups: Vec<ScooterGroupMeta>,
}

impl WorldState {
    pub fn new(grid_width: u32, grid_height: u32, meters_per_grid_unit: f64, time_scale: f64) -> Self {
        Self {
            current_time: 0.0,
            grid_width,
            grid_height,
            meters_per_grid_unit,
            time_scale,
            scooters: HashMap::new(),
            batteries: HashMap::new(),
            stations: HashMap::new(),
            default_movement: MovementStrategyKind::RandomWalk,
            default_activity: ActivityStrategyKind::AlwaysActive,
            directed_destinations: HashMap::new(),
            scooter_groups: Vec::new(),
        }
    }

    /// Linear-scan nearest station to `position`; ties break by smallest
    /// station id. Fleet size is modest (§1 Non-goals: no spatial index).
    pub fn nearest_station(&self, position: Position) -> Option<StationId> {
        self.stations
            .values()
            .map(|st| (st.id, st.position.manhattan_distance(position)))
            .min_by(|(id_a, dist_a), (id_b, dist_b)| dist_a.cmp(dist_b).then_with(|| id_a.cmp(id_b)))
            .map(|(id, _)| id)
    }

    /// Deep-copied, serialization-ready view that shares no mutable
    /// structure with the live world.
    pub fn snapshot(&self) -> WorldSnapshot {
        let mut scooters: Vec<ScooterSnapshot> = self
            .scooters
            .values()
            .map(|s| {
                let battery_level = self
                    .batteries
                    .get(&s.battery_id)
                    .map(|b| b.charge_level())
                    .unwrap_or(0.0);
                ScooterSnapshot {
                    id: s.id,
                    position: s.position,
                    battery_id: s.battery_id,
                    battery_level,
                    state: s.state,
                    target_station_id: s.target_station_id,
                    target_position: s.target_position,
                    group_id: s.group_id.clone(),
                    distance_traveled_today: s.distance_traveled_today,
                }
            })
            .collect();
        scooters.sort_by_key(|s| s.id);

        let mut stations: Vec<StationSnapshot> = self
            .stations
            .values()
            .map(|st| {
                let slots: Vec<SlotSnapshot> = st
                    .slots
                    .iter()
                    .enumerate()
                    .map(|(i, slot)| SlotSnapshot {
                        index: i,
                        battery_id: slot.battery_id,
                        is_charging: slot.is_charging,
                        charge_level: slot.battery_id.and_then(|b| self.batteries.get(&b)).map(Battery::charge_level),
                    })
                    .collect();
                StationSnapshot {
                    id: st.id,
                    position: st.position,
                    num_slots: st.num_slots(),
                    charge_rate_kw: st.charge_rate_kw,
                    available_batteries: st.available_batteries().count(),
                    full_batteries: st
                        .available_batteries()
                        .filter(|(_, b)| self.batteries.get(b).is_some_and(Battery::is_full))
                        .count(),
                    empty_slots: st.empty_slots().count(),
                    slots,
                }
            })
            .collect();
        stations.sort_by_key(|s| s.id);

        let mut batteries: Vec<BatterySnapshot> = self
            .batteries
            .values()
            .map(|b| BatterySnapshot {
                id: b.id,
                capacity_kwh: b.capacity_kwh,
                current_charge_kwh: b.current_charge_kwh,
                charge_level: b.charge_level(),
                is_full: b.is_full(),
                location: b.location,
                station_id: b.station_id,
                scooter_id: b.scooter_id,
            })
            .collect();
        batteries.sort_by_key(|b| b.id);

        WorldSnapshot {
            simulation_time: self.current_time,
            grid_width: self.grid_width,
            grid_height: self.grid_height,
            scooters,
            stations,
            batteries,
            scooter_groups: self.scooter_groups.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScooterSnapshot {
    pub id: ScooterId,
    pub position: Position,
    pub battery_id: BatteryId,
    pub battery_level: f64,
    pub state: ScooterState,
    pub target_station_id: Option<StationId>,
    pub target_position: Option<Position>,
    pub group_id: Option<String>,
    pub distance_traveled_today: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotSnapshot {
    pub index: usize,
    pub battery_id: Option<BatteryId>,
    pub is_charging: bool,
    pub charge_level: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StationSnapshot {
    pub id: StationId,
    pub position: Position,
    pub num_slots: usize,
    pub charge_rate_kw: f64,
    pub available_batteries: usize,
    pub full_batteries: usize,
    pub empty_slots: usize,
    pub slots: Vec<SlotSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatterySnapshot {
    pub id: BatteryId,
    pub capacity_kwh: f64,
    pub current_charge_kwh: f64,
    pub charge_level: f64,
    pub is_full: bool,
    pub location: BatteryLocation,
    pub station_id: Option<StationId>,
    pub scooter_id: Option<ScooterId>,
}

/// Serialization-ready snapshot of the whole world, independent of the
/// live `WorldState` (§4.A). Mirrors the `/snapshot` and WS `state_update`
/// payload shape in §6.
#[derive(Debug, Clone, Serialize)]
pub struct WorldSnapshot {
    pub simulation_time: f64,
    pub grid_width: u32,
    pub grid_height: u32,
    pub scooters: Vec<ScooterSnapshot>,
    pub stations: Vec<StationSnapshot>,
    pub batteries: Vec<BatterySnapshot>,
    pub scooter_groups: Vec<ScooterGroupMeta>,
}

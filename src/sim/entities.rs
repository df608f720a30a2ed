//! Value types for the simulation's entities: grid positions, batteries,
//! charging slots, stations, and scooters. Cross-entity references are by
//! id, never by pointer, so a [`WorldState`](super::world::WorldState)
//! snapshot is a plain deep copy of its keyed maps.

use std::collections::HashMap;

use serde::Serialize;

use super::strategy::{ActivityStrategyKind, MovementStrategyKind};

pub type ScooterId = u64;
pub type BatteryId = u64;
pub type StationId = u64;

/// A point on the grid, clipped to `[0, width) x [0, height)` by
/// construction at the call sites that place entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan_distance(&self, other: Position) -> i64 {
        (self.x as i64 - other.x as i64).abs() + (self.y as i64 - other.y as i64).abs()
    }

    /// The 4-connected neighbors of this position, clipped to the grid.
    pub fn neighbors(&self, grid_width: u32, grid_height: u32) -> Vec<Position> {
        let mut out = Vec::with_capacity(4);
        let candidates = [
            (self.x - 1, self.y),
            (self.x + 1, self.y),
            (self.x, self.y - 1),
            (self.x, self.y + 1),
        ];
        for (x, y) in candidates {
            if x >= 0 && y >= 0 && (x as u32) < grid_width && (y as u32) < grid_height {
                out.push(Position::new(x, y));
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryLocation {
    InScooter,
    InStation,
}

/// A battery that alternates between being carried by a scooter and sitting
/// in a station slot. Never destroyed once created at initialization.
#[derive(Debug, Clone)]
pub struct Battery {
    pub id: BatteryId,
    pub capacity_kwh: f64,
    pub max_charge_rate_kw: f64,
    pub current_charge_kwh: f64,
    pub location: BatteryLocation,
    pub scooter_id: Option<ScooterId>,
    pub station_id: Option<StationId>,
    pub slot_index: Option<usize>,
}

const FULL_CHARGE_EPSILON: f64 = 1e-4;

impl Battery {
    pub fn new_in_scooter(id: BatteryId, capacity_kwh: f64, max_charge_rate_kw: f64, charge_kwh: f64, scooter_id: ScooterId) -> Self {
        Self {
            id,
            capacity_kwh,
            max_charge_rate_kw,
            current_charge_kwh: charge_kwh.clamp(0.0, capacity_kwh),
            location: BatteryLocation::InScooter,
            scooter_id: Some(scooter_id),
            station_id: None,
            slot_index: None,
        }
    }

    pub fn new_in_station(id: BatteryId, capacity_kwh: f64, max_charge_rate_kw: f64, station_id: StationId, slot_index: usize) -> Self {
        Self {
            id,
            capacity_kwh,
            max_charge_rate_kw,
            current_charge_kwh: capacity_kwh,
            location: BatteryLocation::InStation,
            scooter_id: None,
            station_id: Some(station_id),
            slot_index: Some(slot_index),
        }
    }

    pub fn charge_level(&self) -> f64 {
        if self.capacity_kwh <= 0.0 {
            return 0.0;
        }
        self.current_charge_kwh / self.capacity_kwh
    }

    pub fn is_full(&self) -> bool {
        self.capacity_kwh - self.current_charge_kwh < FULL_CHARGE_EPSILON
    }

    /// Consumes `kwh` of charge, clamped at 0.
    pub fn consume(&mut self, kwh: f64) {
        self.current_charge_kwh = (self.current_charge_kwh - kwh).max(0.0);
    }

    /// Adds `kwh` of charge, clamped at capacity.
    pub fn add_charge(&mut self, kwh: f64) {
        self.current_charge_kwh = (self.current_charge_kwh + kwh).min(self.capacity_kwh);
    }

    pub fn set_full(&mut self) {
        self.current_charge_kwh = self.capacity_kwh;
    }

    /// Seconds until this battery reaches full capacity at `charge_rate_kw`.
    pub fn time_to_full_charge(&self, charge_rate_kw: f64) -> f64 {
        if charge_rate_kw <= 0.0 {
            return f64::INFINITY;
        }
        ((self.capacity_kwh - self.current_charge_kwh) / charge_rate_kw * 3600.0).max(0.0)
    }

    pub fn move_to_scooter(&mut self, scooter_id: ScooterId) {
        self.location = BatteryLocation::InScooter;
        self.scooter_id = Some(scooter_id);
        self.station_id = None;
        self.slot_index = None;
    }

    pub fn move_to_station(&mut self, station_id: StationId, slot_index: usize) {
        self.location = BatteryLocation::InStation;
        self.scooter_id = None;
        self.station_id = Some(station_id);
        self.slot_index = Some(slot_index);
    }
}

/// A slot within a station. `battery_id = None` means the slot is empty.
#[derive(Debug, Clone, Default)]
pub struct ChargingSlot {
    pub battery_id: Option<BatteryId>,
    pub is_charging: bool,
}

#[derive(Debug, Clone)]
pub struct Station {
    pub id: StationId,
    pub position: Position,
    pub charge_rate_kw: f64,
    pub slots: Vec<ChargingSlot>,
}

impl Station {
    pub fn new(id: StationId, position: Position, charge_rate_kw: f64, num_slots: usize) -> Self {
        Self {
            id,
            position,
            charge_rate_kw,
            slots: vec![ChargingSlot::default(); num_slots],
        }
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn available_batteries(&self) -> impl Iterator<Item = (usize, BatteryId)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.battery_id.map(|b| (i, b)))
    }

    pub fn empty_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.battery_id.is_none())
            .map(|(i, _)| i)
    }

    /// Slot holding the battery with the highest charge level; ties break
    /// by smallest slot index.
    pub fn best_battery_slot(&self, batteries: &HashMap<BatteryId, Battery>) -> Option<usize> {
        self.available_batteries()
            .filter_map(|(i, b)| batteries.get(&b).map(|battery| (i, battery.charge_level())))
            .max_by(|(i_a, level_a), (i_b, level_b)| {
                level_a
                    .partial_cmp(level_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| i_b.cmp(i_a))
            })
            .map(|(i, _)| i)
    }

    /// Smallest slot index that is empty.
    pub fn first_empty_slot(&self) -> Option<usize> {
        self.empty_slots().next()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScooterState {
    Moving,
    TravelingToStation,
    Swapping,
    WaitingForBattery,
    Idle,
}

#[derive(Debug, Clone)]
pub struct Scooter {
    pub id: ScooterId,
    pub position: Position,
    pub battery_id: BatteryId,
    pub state: ScooterState,
    pub speed: f64,
    pub consumption_rate: f64,
    pub swap_threshold: f64,
    pub target_station_id: Option<StationId>,
    pub target_position: Option<Position>,
    pub group_id: Option<String>,
    pub distance_traveled_today: f64,
    pub idle_until: Option<f64>,
    /// Overrides [`WorldState::default_movement`](super::world::WorldState) when set.
    pub movement_strategy: Option<MovementStrategyKind>,
    /// Overrides [`WorldState::default_activity`](super::world::WorldState) when set.
    pub activity_strategy: Option<ActivityStrategyKind>,
}

impl Scooter {
    /// Simulated seconds to cross one grid unit at this scooter's speed.
    pub fn travel_time_per_unit(&self) -> f64 {
        1.0 / self.speed
    }
}

//! Tagged event kinds and the single dispatch function that mutates the
//! world and returns follow-up `(event, time)` pairs (§4.C, §9 "Dynamic
//! dispatch over event kinds").
//!
//! Every event is processed atomically: no suspension point exists inside
//! [`process`], so the world is never observed half-mutated.

use super::entities::{BatteryId, BatteryLocation, Position, ScooterId, ScooterState, StationId};
use super::metrics::{MetricsCollector, MissType};
use super::scheduler::Scheduler;
use super::strategy::{self, ActivityDecision};
use super::world::WorldState;

/// Duration of an in-progress battery swap, in simulated seconds.
pub const SWAP_DURATION: f64 = 30.0;
/// Cadence of the coarse-grained charging tick.
pub const CHARGE_TICK_INTERVAL: f64 = 60.0;
/// Scheduling delay for a zero-distance move, so the clock always advances
/// and the run loop cannot live-lock on a stationary scooter.
const DEGENERATE_MOVE_DELAY: f64 = 0.1;
const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy)]
pub enum Event {
    ScooterMove {
        scooter_id: ScooterId,
        new_position: Position,
    },
    ScooterArriveAtStation {
        scooter_id: ScooterId,
        station_id: StationId,
    },
    BatterySwap {
        scooter_id: ScooterId,
        station_id: StationId,
        take_from_slot: usize,
        deposit_to_slot: usize,
    },
    BatteryChargingTick {
        station_id: StationId,
    },
    BatteryFullyCharged {
        battery_id: BatteryId,
        station_id: StationId,
        slot_index: usize,
    },
    ScooterGoIdle {
        scooter_id: ScooterId,
        wake_up_time: f64,
    },
    ScooterWakeUp {
        scooter_id: ScooterId,
    },
    ScooterSwapThenIdle {
        scooter_id: ScooterId,
        wake_up_time: f64,
    },
    DailyReset {
        day_number: u64,
    },
}

/// Mutates `world` to reflect `event` and returns the follow-up events this
/// processing schedules. Missing entities (§7 "internal invariant
/// violations") are treated defensively: the event is a no-op rather than
/// a panic.
pub fn process(event: Event, world: &mut WorldState, scheduler: &mut Scheduler, metrics: &mut MetricsCollector) -> Vec<(Event, f64)> {
    match event {
        Event::ScooterMove { scooter_id, new_position } => process_scooter_move(scooter_id, new_position, world, scheduler),
        Event::ScooterArriveAtStation { scooter_id, station_id } => {
            process_arrive_at_station(scooter_id, station_id, world, metrics)
        }
        Event::BatterySwap {
            scooter_id,
            station_id,
            take_from_slot,
            deposit_to_slot,
        } => process_battery_swap(scooter_id, station_id, take_from_slot, deposit_to_slot, world, scheduler, metrics),
        Event::BatteryChargingTick { station_id } => process_charging_tick(station_id, world),
        Event::BatteryFullyCharged {
            battery_id,
            station_id,
            slot_index,
        } => process_fully_charged(battery_id, station_id, slot_index, world),
        Event::ScooterGoIdle { scooter_id, wake_up_time } => process_go_idle(scooter_id, wake_up_time, world),
        Event::ScooterWakeUp { scooter_id } => process_wake_up(scooter_id, world, scheduler),
        Event::ScooterSwapThenIdle { scooter_id, wake_up_time } => process_swap_then_idle(scooter_id, wake_up_time, world),
        Event::DailyReset { day_number } => process_daily_reset(day_number, world, scheduler),
    }
}

fn process_scooter_move(scooter_id: ScooterId, new_position: Position, world: &mut WorldState, scheduler: &mut Scheduler) -> Vec<(Event, f64)> {
    let Some(old_position) = world.scooters.get(&scooter_id).map(|s| s.position) else {
        return Vec::new();
    };
    let distance = old_position.manhattan_distance(new_position) as f64;

    let battery_id = world.scooters[&scooter_id].battery_id;
    let consumption_rate = world.scooters[&scooter_id].consumption_rate;
    if let Some(battery) = world.batteries.get_mut(&battery_id) {
        battery.consume(distance * consumption_rate);
    }
    let charge_level = world.batteries.get(&battery_id).map(|b| b.charge_level()).unwrap_or(1.0);

    let (state, swap_threshold) = {
        let scooter = world.scooters.get_mut(&scooter_id).expect("checked above");
        scooter.distance_traveled_today += distance;
        scooter.position = new_position;
        (scooter.state, scooter.swap_threshold)
    };

    if state == ScooterState::Moving && charge_level < swap_threshold
        && let Some(station_id) = world.nearest_station(new_position)
    {
        let target_position = world.stations[&station_id].position;
        let scooter = world.scooters.get_mut(&scooter_id).expect("checked above");
        scooter.state = ScooterState::TravelingToStation;
        scooter.target_station_id = Some(station_id);
        scooter.target_position = Some(target_position);
    }

    let state = world.scooters[&scooter_id].state;
    match state {
        ScooterState::Moving => schedule_next_move(scooter_id, world, scheduler),
        ScooterState::TravelingToStation => schedule_station_step(scooter_id, world),
        _ => Vec::new(),
    }
}

fn process_arrive_at_station(scooter_id: ScooterId, station_id: StationId, world: &mut WorldState, metrics: &mut MetricsCollector) -> Vec<(Event, f64)> {
    if !world.scooters.contains_key(&scooter_id) {
        return Vec::new();
    }
    let Some(station) = world.stations.get(&station_id) else {
        return Vec::new();
    };
    let has_battery = station.available_batteries().next().is_some();
    let has_empty_slot = station.first_empty_slot().is_some();

    if has_battery && has_empty_slot {
        let take_from_slot = station.best_battery_slot(&world.batteries).expect("has_battery checked");
        let deposit_to_slot = station.first_empty_slot().expect("has_empty_slot checked");
        let scooter = world.scooters.get_mut(&scooter_id).expect("checked above");
        scooter.state = ScooterState::Swapping;
        vec![(
            Event::BatterySwap {
                scooter_id,
                station_id,
                take_from_slot,
                deposit_to_slot,
            },
            world.current_time + SWAP_DURATION,
        )]
    } else {
        let charge_level = {
            let scooter = world.scooters.get_mut(&scooter_id).expect("checked above");
            scooter.state = ScooterState::WaitingForBattery;
            world.batteries.get(&scooter.battery_id).map(|b| b.charge_level())
        };
        metrics.record_miss(world.current_time, scooter_id, station_id, MissType::NoBattery, charge_level);
        Vec::new()
    }
}

#[allow(clippy::too_many_arguments)]
fn process_battery_swap(
    scooter_id: ScooterId,
    station_id: StationId,
    take_from_slot: usize,
    deposit_to_slot: usize,
    world: &mut WorldState,
    scheduler: &mut Scheduler,
    metrics: &mut MetricsCollector,
) -> Vec<(Event, f64)> {
    if !world.scooters.contains_key(&scooter_id) || !world.stations.contains_key(&station_id) {
        return Vec::new();
    }

    let (take_from_slot, deposit_to_slot) = {
        let station = &world.stations[&station_id];
        let take_stale = station.slots[take_from_slot].battery_id.is_none();
        let deposit_stale = station.slots[deposit_to_slot].battery_id.is_some();
        if take_stale || deposit_stale {
            let resolved_take = station.best_battery_slot(&world.batteries);
            let resolved_deposit = station.first_empty_slot();
            match (resolved_take, resolved_deposit) {
                (Some(t), Some(d)) => (t, d),
                _ => {
                    let charge_level = {
                        let scooter = world.scooters.get_mut(&scooter_id).expect("checked above");
                        scooter.state = ScooterState::WaitingForBattery;
                        world.batteries.get(&scooter.battery_id).map(|b| b.charge_level())
                    };
                    metrics.record_miss(world.current_time, scooter_id, station_id, MissType::NoBattery, charge_level);
                    return Vec::new();
                }
            }
        } else {
            (take_from_slot, deposit_to_slot)
        }
    };

    let old_battery_id = world.scooters[&scooter_id].battery_id;
    let new_battery_id = world.stations[&station_id].slots[take_from_slot]
        .battery_id
        .expect("resolved non-stale above");

    let old_level = world.batteries[&old_battery_id].charge_level();
    let new_level = world.batteries[&new_battery_id].charge_level();

    if let Some(b) = world.batteries.get_mut(&old_battery_id) {
        b.move_to_station(station_id, deposit_to_slot);
    }
    if let Some(b) = world.batteries.get_mut(&new_battery_id) {
        b.move_to_scooter(scooter_id);
    }
    {
        let station = world.stations.get_mut(&station_id).expect("checked above");
        station.slots[deposit_to_slot].battery_id = Some(old_battery_id);
        station.slots[deposit_to_slot].is_charging = true;
        station.slots[take_from_slot].battery_id = None;
        station.slots[take_from_slot].is_charging = false;
    }

    let idle_until = {
        let scooter = world.scooters.get_mut(&scooter_id).expect("checked above");
        scooter.battery_id = new_battery_id;
        scooter.state = ScooterState::Moving;
        scooter.target_station_id = None;
        scooter.target_position = None;
        scooter.idle_until.take()
    };

    metrics.record_swap(world.current_time, scooter_id, station_id, old_level, new_level);

    let mut follow_ups = Vec::new();
    let charge_rate_kw = world.stations[&station_id].charge_rate_kw;
    let deposited = &world.batteries[&old_battery_id];
    if !deposited.is_full() {
        let eta = deposited.time_to_full_charge(charge_rate_kw);
        follow_ups.push((
            Event::BatteryFullyCharged {
                battery_id: old_battery_id,
                station_id,
                slot_index: deposit_to_slot,
            },
            world.current_time + eta,
        ));
    }

    if let Some(wake_up_time) = idle_until {
        follow_ups.push((Event::ScooterGoIdle { scooter_id, wake_up_time }, world.current_time));
    } else {
        strategy::on_scooter_activated(scooter_id, world, scheduler);
        follow_ups.extend(schedule_next_move(scooter_id, world, scheduler));
    }
    follow_ups
}

fn process_charging_tick(station_id: StationId, world: &mut WorldState) -> Vec<(Event, f64)> {
    if let Some(station) = world.stations.get(&station_id) {
        let charge_rate_kw = station.charge_rate_kw;
        let slot_batteries: Vec<BatteryId> = station
            .slots
            .iter()
            .filter(|s| s.is_charging)
            .filter_map(|s| s.battery_id)
            .collect();
        let added_kwh = charge_rate_kw * CHARGE_TICK_INTERVAL / 3600.0;
        for battery_id in slot_batteries {
            if let Some(battery) = world.batteries.get_mut(&battery_id) {
                battery.add_charge(added_kwh);
            }
        }
    }
    vec![(Event::BatteryChargingTick { station_id }, world.current_time + CHARGE_TICK_INTERVAL)]
}

fn process_fully_charged(battery_id: BatteryId, station_id: StationId, slot_index: usize, world: &mut WorldState) -> Vec<(Event, f64)> {
    if let Some(battery) = world.batteries.get_mut(&battery_id) {
        battery.set_full();
    } else {
        return Vec::new();
    }
    if let Some(station) = world.stations.get_mut(&station_id)
        && let Some(slot) = station.slots.get_mut(slot_index)
        && slot.battery_id == Some(battery_id)
    {
        slot.is_charging = false;
    }

    let waiting_scooter = world
        .scooters
        .values()
        .filter(|s| s.state == ScooterState::WaitingForBattery && s.target_station_id == Some(station_id))
        .map(|s| s.id)
        .min();

    let Some(scooter_id) = waiting_scooter else {
        return Vec::new();
    };
    let Some(deposit_to_slot) = world.stations.get(&station_id).and_then(|st| st.first_empty_slot()) else {
        return Vec::new();
    };

    let scooter = world.scooters.get_mut(&scooter_id).expect("filtered above");
    scooter.state = ScooterState::Swapping;

    vec![(
        Event::BatterySwap {
            scooter_id,
            station_id,
            take_from_slot: slot_index,
            deposit_to_slot,
        },
        world.current_time + SWAP_DURATION,
    )]
}

fn process_go_idle(scooter_id: ScooterId, wake_up_time: f64, world: &mut WorldState) -> Vec<(Event, f64)> {
    let Some(scooter) = world.scooters.get_mut(&scooter_id) else {
        return Vec::new();
    };
    scooter.state = ScooterState::Idle;
    scooter.idle_until = Some(wake_up_time);
    scooter.target_station_id = None;
    scooter.target_position = None;
    vec![(Event::ScooterWakeUp { scooter_id }, wake_up_time)]
}

fn process_wake_up(scooter_id: ScooterId, world: &mut WorldState, scheduler: &mut Scheduler) -> Vec<(Event, f64)> {
    let Some(scooter) = world.scooters.get(&scooter_id) else {
        return Vec::new();
    };
    if scooter.state != ScooterState::Idle {
        return Vec::new();
    }

    if !strategy::should_wake_up(scooter, world, world.current_time) {
        let decision = strategy::check_activity(scooter, world);
        return match decision {
            ActivityDecision::GoIdle { wake_up_time, .. } | ActivityDecision::SwapThenIdle { wake_up_time, .. } => {
                let scooter = world.scooters.get_mut(&scooter_id).expect("checked above");
                scooter.idle_until = Some(wake_up_time);
                vec![(Event::ScooterWakeUp { scooter_id }, wake_up_time)]
            }
            ActivityDecision::ContinueActive => Vec::new(),
        };
    }

    {
        let scooter = world.scooters.get_mut(&scooter_id).expect("checked above");
        scooter.state = ScooterState::Moving;
        scooter.idle_until = None;
    }
    strategy::on_scooter_activated(scooter_id, world, scheduler);
    schedule_next_move(scooter_id, world, scheduler)
}

fn process_swap_then_idle(scooter_id: ScooterId, wake_up_time: f64, world: &mut WorldState) -> Vec<(Event, f64)> {
    let Some(position) = world.scooters.get(&scooter_id).map(|s| s.position) else {
        return Vec::new();
    };
    let Some(station_id) = world.nearest_station(position) else {
        return Vec::new();
    };
    let target_position = world.stations[&station_id].position;

    let scooter = world.scooters.get_mut(&scooter_id).expect("checked above");
    scooter.idle_until = Some(wake_up_time);
    scooter.state = ScooterState::TravelingToStation;
    scooter.target_station_id = Some(station_id);
    scooter.target_position = Some(target_position);

    schedule_station_step(scooter_id, world)
}

fn process_daily_reset(day_number: u64, world: &mut WorldState, scheduler: &mut Scheduler) -> Vec<(Event, f64)> {
    for scooter in world.scooters.values_mut() {
        strategy::on_day_reset(scooter);
    }

    // Sort before reactivating: `world.scooters.values()` iterates in
    // `HashMap` order, and the reactivation loop below draws from
    // `scheduler.rng()` per scooter, so an unsorted order would make every
    // midnight reset's event sequence depend on hash-table layout rather
    // than just the seed (§5 determinism).
    let mut wakeable: Vec<ScooterId> = world
        .scooters
        .values()
        .filter(|s| s.state == ScooterState::Idle && strategy::should_wake_up(s, world, world.current_time))
        .map(|s| s.id)
        .collect();
    wakeable.sort_unstable();

    let mut follow_ups = Vec::new();
    for scooter_id in wakeable {
        {
            let scooter = world.scooters.get_mut(&scooter_id).expect("collected above");
            scooter.state = ScooterState::Moving;
            scooter.idle_until = None;
        }
        strategy::on_scooter_activated(scooter_id, world, scheduler);
        follow_ups.extend(schedule_next_move(scooter_id, world, scheduler));
    }

    follow_ups.push((Event::DailyReset { day_number: day_number + 1 }, world.current_time + SECONDS_PER_DAY));
    follow_ups
}

/// Shared "schedule the next free-roam move, or go idle" dispatch used by
/// `ScooterMove`, post-swap reactivation, wake-up, and daily reset.
pub(crate) fn schedule_next_move(scooter_id: ScooterId, world: &mut WorldState, scheduler: &mut Scheduler) -> Vec<(Event, f64)> {
    let Some(scooter) = world.scooters.get(&scooter_id) else {
        return Vec::new();
    };
    match strategy::check_activity(scooter, world) {
        ActivityDecision::ContinueActive => {
            let destination = strategy::next_destination(scooter, world, scheduler);
            let dt = step_delay(scooter.position, destination, scooter.speed);
            vec![(Event::ScooterMove { scooter_id, new_position: destination }, world.current_time + dt)]
        }
        ActivityDecision::GoIdle { wake_up_time, .. } => vec![(Event::ScooterGoIdle { scooter_id, wake_up_time }, world.current_time)],
        ActivityDecision::SwapThenIdle { wake_up_time, .. } => {
            vec![(Event::ScooterSwapThenIdle { scooter_id, wake_up_time }, world.current_time)]
        }
    }
}

/// Shared "take one greedy step toward the target station, or arrive"
/// dispatch used by `ScooterMove` (once `TRAVELING_TO_STATION`) and the
/// first step out of `ScooterSwapThenIdleEvent`.
fn schedule_station_step(scooter_id: ScooterId, world: &mut WorldState) -> Vec<(Event, f64)> {
    let Some(scooter) = world.scooters.get(&scooter_id) else {
        return Vec::new();
    };
    let Some(target) = scooter.target_position else {
        return Vec::new();
    };
    if scooter.position == target {
        let Some(station_id) = scooter.target_station_id else {
            return Vec::new();
        };
        return vec![(Event::ScooterArriveAtStation { scooter_id, station_id }, world.current_time)];
    }
    let next = strategy::greedy_step(scooter.position, target);
    let dt = step_delay(scooter.position, next, scooter.speed);
    vec![(Event::ScooterMove { scooter_id, new_position: next }, world.current_time + dt)]
}

fn step_delay(from: Position, to: Position, speed: f64) -> f64 {
    if from == to {
        DEGENERATE_MOVE_DELAY
    } else {
        1.0 / speed
    }
}

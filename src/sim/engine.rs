//! Owns the world, scheduler, and metrics collector; drives the event loop
//! and exposes synchronous and real-time-paced run modes (§4.G).

use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;
use tracing::warn;

use super::entities::{Battery, Position, Scooter, ScooterState, Station};
use super::event::{self, Event};
use super::metrics::MetricsCollector;
use super::scheduler::Scheduler;
use super::strategy::{ActivityStrategyKind, MovementStrategyKind, ScheduledActivityParams};
use super::world::{ScooterGroupMeta, WorldSnapshot, WorldState};
use crate::config::{MovementStrategyName, SimulationConfig};

/// Engine run status (§4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Idle,
    Running,
    Paused,
    Stopped,
    Completed,
}

/// Charge fraction a newly created scooter's battery starts at.
const INITIAL_SCOOTER_CHARGE_FRACTION: f64 = 0.8;
/// World-level distance scale carried for scooter groups that don't
/// override it through their own activity schedule.
const DEFAULT_METERS_PER_GRID_UNIT: f64 = 10.0;
/// Simulated time of the first per-station charging tick.
const FIRST_CHARGE_TICK_AT: f64 = 60.0;
const SECONDS_PER_DAY: f64 = 86_400.0;
/// Real-time cap on a single pacing sleep, so a paused/slow client can't
/// starve the run loop of a chance to notice a status change.
const MAX_PACED_SLEEP: Duration = Duration::from_millis(100);

pub type Observer = Box<dyn FnMut(&WorldState, &Event) + Send>;

/// Handle returned by [`Engine::register_observer`], usable to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(usize);

struct StationPlacement {
    position: Position,
    num_slots: usize,
    initial_batteries: usize,
}

struct ScooterSpec {
    speed: f64,
    swap_threshold: f64,
    movement_strategy: Option<MovementStrategyKind>,
    activity_strategy: Option<ActivityStrategyKind>,
    group_id: Option<String>,
}

pub struct Engine {
    world: WorldState,
    scheduler: Scheduler,
    metrics: MetricsCollector,
    status: Status,
    max_duration_seconds: f64,
    tick: u64,
    observers: Vec<Option<Observer>>,
}

impl Engine {
    /// Builds a fresh world from `config`: places stations, creates
    /// batteries and scooters, and seeds the scheduler with the initial
    /// move/charging-tick/daily-reset events (§4.G Initialization).
    pub fn new(config: &SimulationConfig) -> Self {
        let seed = config.random_seed.unwrap_or_else(|| rand::rng().random());
        let mut scheduler = Scheduler::new(seed);
        let mut world = WorldState::new(config.grid.width, config.grid.height, DEFAULT_METERS_PER_GRID_UNIT, 1.0);
        world.default_movement = match config.movement_strategy {
            MovementStrategyName::RandomWalk => MovementStrategyKind::RandomWalk,
            MovementStrategyName::Directed => MovementStrategyKind::Directed,
        };

        let mut next_battery_id: u64 = 0;

        for (i, placement) in place_stations(config).into_iter().enumerate() {
            let station_id = i as u64 + 1;
            let mut station = Station::new(station_id, placement.position, config.station_charge_rate_kw, placement.num_slots);
            for slot_index in 0..placement.initial_batteries.min(placement.num_slots) {
                let battery_id = next_battery_id;
                next_battery_id += 1;
                world.batteries.insert(
                    battery_id,
                    Battery::new_in_station(battery_id, config.scooters.battery_spec.capacity_kwh, config.scooters.battery_spec.charge_rate_kw, station_id, slot_index),
                );
                station.slots[slot_index].battery_id = Some(battery_id);
            }
            world.stations.insert(station_id, station);
        }

        for (i, spec) in expand_scooter_groups(config).into_iter().enumerate() {
            let scooter_id = i as u64;
            let battery_id = next_battery_id;
            next_battery_id += 1;
            let capacity = config.scooters.battery_spec.capacity_kwh;
            world.batteries.insert(
                battery_id,
                Battery::new_in_scooter(battery_id, capacity, config.scooters.battery_spec.charge_rate_kw, capacity * INITIAL_SCOOTER_CHARGE_FRACTION, scooter_id),
            );

            let position = Position::new(
                scheduler.rng().random_range(0..config.grid.width as i32),
                scheduler.rng().random_range(0..config.grid.height as i32),
            );

            world.scooters.insert(scooter_id, Scooter {
                id: scooter_id,
                position,
                battery_id,
                state: ScooterState::Moving,
                speed: spec.speed,
                consumption_rate: config.scooters.battery_spec.consumption_rate,
                swap_threshold: spec.swap_threshold,
                target_station_id: None,
                target_position: None,
                group_id: spec.group_id,
                distance_traveled_today: 0.0,
                idle_until: None,
                movement_strategy: spec.movement_strategy,
                activity_strategy: spec.activity_strategy,
            });
        }

        world.scooter_groups = config
            .scooter_groups
            .iter()
            .enumerate()
            .map(|(i, g)| ScooterGroupMeta {
                id: format!("group-{i}"),
                name: g.name.clone(),
                color: g.color.clone(),
            })
            .collect();

        let max_duration_seconds = config.max_duration_seconds();

        // Iterate ids in sorted order, not `HashMap` order: both loops draw
        // from `scheduler.rng()` (`RandomWalk` destinations) and assign
        // tie-break sequence numbers, so a `HashMap`-order iteration would
        // make the resulting event sequence depend on hash-table layout
        // rather than just the seed, breaking §5's determinism guarantee.
        let mut scooter_ids: Vec<_> = world.scooters.keys().copied().collect();
        scooter_ids.sort_unstable();
        let mut seed_events = Vec::new();
        for scooter_id in scooter_ids {
            seed_events.extend(event::schedule_next_move(scooter_id, &mut world, &mut scheduler));
        }
        for (ev, time) in seed_events {
            scheduler.schedule(ev, time);
        }

        let mut station_ids: Vec<_> = world.stations.keys().copied().collect();
        station_ids.sort_unstable();
        for station_id in station_ids {
            scheduler.schedule(Event::BatteryChargingTick { station_id }, FIRST_CHARGE_TICK_AT);
        }

        if SECONDS_PER_DAY <= max_duration_seconds {
            scheduler.schedule(Event::DailyReset { day_number: 0 }, SECONDS_PER_DAY);
        }

        Self {
            world,
            scheduler,
            metrics: MetricsCollector::new(),
            status: Status::Idle,
            max_duration_seconds,
            tick: 0,
            observers: Vec::new(),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn simulation_time(&self) -> f64 {
        self.world.current_time
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        self.world.snapshot()
    }

    pub fn begin(&mut self) {
        self.status = Status::Running;
    }

    pub fn pause(&mut self) {
        self.status = Status::Paused;
    }

    pub fn resume(&mut self) {
        self.status = Status::Running;
    }

    pub fn stop(&mut self) {
        self.status = Status::Stopped;
    }

    pub fn register_observer(&mut self, observer: Observer) -> ObserverId {
        self.observers.push(Some(observer));
        ObserverId(self.observers.len() - 1)
    }

    pub fn unregister_observer(&mut self, id: ObserverId) {
        if let Some(slot) = self.observers.get_mut(id.0) {
            *slot = None;
        }
    }

    /// Pops and processes the single earliest-scheduled event. Returns
    /// `false` (and transitions to `COMPLETED`) once the queue is empty or
    /// the next event falls beyond `max_duration_seconds`.
    pub fn step(&mut self) -> bool {
        let Some(next_time) = self.scheduler.peek_time() else {
            self.status = Status::Completed;
            return false;
        };
        if next_time > self.max_duration_seconds {
            self.status = Status::Completed;
            return false;
        }
        let (ev, time) = self.scheduler.pop().expect("peeked Some above");
        self.world.current_time = time;

        let follow_ups = event::process(ev, &mut self.world, &mut self.scheduler, &mut self.metrics);
        for (follow_event, follow_time) in follow_ups {
            self.scheduler.schedule(follow_event, follow_time);
        }

        self.tick += 1;
        self.metrics.maybe_sample(self.world.current_time);
        self.notify_observers(&ev);
        true
    }

    fn notify_observers(&mut self, ev: &Event) {
        let world = &self.world;
        for slot in self.observers.iter_mut() {
            let Some(observer) = slot else { continue };
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| observer(world, ev)));
            if outcome.is_err() {
                warn!("observer panicked while handling an event; continuing run");
            }
        }
    }

    /// Runs to completion without yielding: loops [`Self::step`] until it
    /// returns `false` or [`Self::status`] leaves `RUNNING`.
    pub fn run_sync(&mut self) {
        self.status = Status::Running;
        while self.status == Status::Running {
            if !self.step() {
                break;
            }
        }
    }

    /// Runs in real time, sleeping between events so that simulated time
    /// advances at `speed_multiplier` times wall-clock speed. Invokes
    /// `update_cb` at most once per `update_interval` of real time and
    /// cooperatively yields after each invocation (§5 "Suspension points").
    pub async fn run_paced<F>(&mut self, speed_multiplier: f64, mut update_cb: F, update_interval: Duration)
    where
        F: FnMut(&WorldState) + Send,
    {
        self.status = Status::Running;
        let mut last_update: Option<Instant> = None;

        while self.status == Status::Running {
            let Some(next_time) = self.scheduler.peek_time() else {
                break;
            };
            if speed_multiplier > 0.0 {
                let dt_sim = (next_time - self.world.current_time).max(0.0);
                let real_delay = Duration::from_secs_f64(dt_sim / speed_multiplier).min(MAX_PACED_SLEEP);
                if !real_delay.is_zero() {
                    tokio::time::sleep(real_delay).await;
                }
            }

            if !self.step() {
                break;
            }

            let due = last_update.is_none_or(|t| t.elapsed() >= update_interval);
            if due {
                update_cb(&self.world);
                last_update = Some(Instant::now());
            }
            tokio::task::yield_now().await;
        }
    }
}

fn place_stations(config: &SimulationConfig) -> Vec<StationPlacement> {
    if !config.stations.is_empty() {
        return config
            .stations
            .iter()
            .map(|s| StationPlacement {
                position: Position::new(s.position.x, s.position.y),
                num_slots: s.num_slots,
                initial_batteries: s.initial_batteries,
            })
            .collect();
    }

    let n = config.effective_num_stations();
    if n == 0 {
        return Vec::new();
    }
    let cols = (n as f64).sqrt().floor() as usize + 1;
    let rows = n.div_ceil(cols);
    let x_step = config.grid.width as f64 / (cols + 1) as f64;
    let y_step = config.grid.height as f64 / (rows + 1) as f64;

    let mut placements = Vec::with_capacity(n);
    'placement: for r in 0..rows {
        for c in 0..cols {
            if placements.len() >= n {
                break 'placement;
            }
            let x = (x_step * (c as f64 + 1.0)).round() as i32;
            let y = (y_step * (r as f64 + 1.0)).round() as i32;
            placements.push(StationPlacement {
                position: Position::new(x, y),
                num_slots: config.slots_per_station,
                initial_batteries: config.initial_batteries_per_station,
            });
        }
    }
    placements
}

fn expand_scooter_groups(config: &SimulationConfig) -> Vec<ScooterSpec> {
    let mut specs = Vec::with_capacity(config.scooters.count);
    let mut remaining = config.scooters.count;

    for (i, group) in config.scooter_groups.iter().enumerate() {
        let n = group.count.min(remaining);
        let group_id = format!("group-{i}");
        let movement_strategy = group.movement_strategy.map(|m| match m {
            MovementStrategyName::RandomWalk => MovementStrategyKind::RandomWalk,
            MovementStrategyName::Directed => MovementStrategyKind::Directed,
        });
        let activity_strategy = group.activity.as_ref().map(|a| {
            ActivityStrategyKind::Scheduled(ScheduledActivityParams {
                activity_start_hour: a.activity_start_hour,
                activity_end_hour: a.activity_end_hour,
                max_distance_per_day_km: a.max_distance_per_day_km,
                low_battery_threshold: a.low_battery_threshold,
                meters_per_grid_unit: a.meters_per_grid_unit,
            })
        });

        for _ in 0..n {
            specs.push(ScooterSpec {
                speed: group.speed.unwrap_or(config.scooters.speed),
                swap_threshold: group.swap_threshold.unwrap_or(config.scooters.swap_threshold),
                movement_strategy,
                activity_strategy: activity_strategy.clone(),
                group_id: Some(group_id.clone()),
            });
        }
        remaining -= n;
    }

    for _ in 0..remaining {
        specs.push(ScooterSpec {
            speed: config.scooters.speed,
            swap_threshold: config.scooters.swap_threshold,
            movement_strategy: None,
            activity_strategy: None,
            group_id: None,
        });
    }
    specs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> SimulationConfig {
        let mut cfg = SimulationConfig::default();
        cfg.grid.width = 10;
        cfg.grid.height = 10;
        cfg.num_stations = 1;
        cfg.slots_per_station = 1;
        cfg.initial_batteries_per_station = 1;
        cfg.scooters.count = 1;
        cfg.scooters.speed = 1.0;
        cfg.scooters.swap_threshold = 0.3;
        cfg.scooters.battery_spec.capacity_kwh = 1.0;
        cfg.scooters.battery_spec.consumption_rate = 0.05;
        cfg.duration_hours = 600.0 / 3600.0;
        cfg.random_seed = Some(42);
        cfg
    }

    #[test]
    fn minimal_run_completes_with_events_processed() {
        let mut engine = Engine::new(&minimal_config());
        engine.run_sync();
        assert_eq!(engine.status(), Status::Completed);
        assert!(engine.tick() > 0);
    }

    #[test]
    fn same_seed_yields_identical_trajectory() {
        let mut a = Engine::new(&minimal_config());
        let mut b = Engine::new(&minimal_config());
        a.run_sync();
        b.run_sync();
        assert_eq!(a.tick(), b.tick());
        assert_eq!(a.simulation_time(), b.simulation_time());
        assert_eq!(a.metrics().total_swaps(), b.metrics().total_swaps());
        let snap_a = a.snapshot();
        let snap_b = b.snapshot();
        for (sa, sb) in snap_a.scooters.iter().zip(snap_b.scooters.iter()) {
            assert_eq!(sa.position, sb.position);
        }
    }

    #[test]
    fn station_grid_placement_is_near_square() {
        let mut cfg = SimulationConfig::default();
        cfg.num_stations = 4;
        cfg.stations.clear();
        let placements = place_stations(&cfg);
        assert_eq!(placements.len(), 4);
        for p in &placements {
            assert!(p.position.x >= 0 && (p.position.x as u32) < cfg.grid.width);
            assert!(p.position.y >= 0 && (p.position.y as u32) < cfg.grid.height);
        }
    }

    #[test]
    fn scooter_groups_consume_from_total_count_and_leftover_uses_base() {
        let mut cfg = SimulationConfig::default();
        cfg.scooters.count = 10;
        cfg.scooter_groups.push(crate::config::ScooterGroupConfig {
            name: "night".into(),
            count: 4,
            color: "#00ff00".into(),
            speed: Some(2.0),
            swap_threshold: None,
            movement_strategy: None,
            activity: None,
        });
        let specs = expand_scooter_groups(&cfg);
        assert_eq!(specs.len(), 10);
        assert_eq!(specs.iter().filter(|s| s.group_id.is_some()).count(), 4);
        assert_eq!(specs.iter().filter(|s| s.group_id.is_none()).count(), 6);
        assert!(specs.iter().take(4).all(|s| s.speed == 2.0));
    }

    #[test]
    fn engine_starts_idle_and_transitions_on_begin() {
        let mut engine = Engine::new(&minimal_config());
        assert_eq!(engine.status(), Status::Idle);
        engine.begin();
        assert_eq!(engine.status(), Status::Running);
        engine.pause();
        assert_eq!(engine.status(), Status::Paused);
    }

    #[test]
    fn observer_panic_does_not_abort_the_run() {
        let mut engine = Engine::new(&minimal_config());
        engine.register_observer(Box::new(|_world, _ev| panic!("boom")));
        let prior_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));
        engine.run_sync();
        std::panic::set_hook(prior_hook);
        assert_eq!(engine.status(), Status::Completed);
    }

    #[test]
    fn new_scooter_battery_starts_at_eighty_percent() {
        let engine = Engine::new(&minimal_config());
        let scooter = engine.world().scooters.values().next().expect("one scooter configured");
        assert_eq!(scooter.state, ScooterState::Moving);
        let battery = &engine.world().batteries[&scooter.battery_id];
        assert!((battery.charge_level() - 0.8).abs() < 1e-9);
    }
}

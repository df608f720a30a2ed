//! Pluggable "where next?" and "am I allowed to be active?" behaviors.
//!
//! Strategies are represented as small tagged enums rather than trait
//! objects: the set of kinds is closed, dispatch is a single match, and the
//! per-scooter override vs. world-default lookup (§4.D/§4.E selection
//! order) is a plain field read instead of a vtable indirection.

use super::entities::{Position, Scooter, ScooterId};
use super::scheduler::Scheduler;
use super::world::WorldState;
use rand::Rng;

/// Movement strategy for a free-roaming (`MOVING`) scooter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementStrategyKind {
    /// Uniformly samples one of the 4-connected neighbors.
    RandomWalk,
    /// Walks toward an assigned destination, one greedy step at a time.
    Directed,
}

/// Fleet- or group-level activity gating.
#[derive(Debug, Clone)]
pub enum ActivityStrategyKind {
    /// Always permitted to roam; never self-idles.
    AlwaysActive,
    /// Time-of-day window plus an optional daily-distance cap.
    Scheduled(ScheduledActivityParams),
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduledActivityParams {
    pub activity_start_hour: f64,
    pub activity_end_hour: f64,
    pub max_distance_per_day_km: Option<f64>,
    pub low_battery_threshold: f64,
    pub meters_per_grid_unit: f64,
}

/// Outcome of an activity check (§4.E).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivityDecision {
    ContinueActive,
    GoIdle { wake_up_time: f64, reason: &'static str },
    SwapThenIdle { wake_up_time: f64, reason: &'static str },
}

const SECONDS_PER_HOUR: f64 = 3600.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Picks the next free-roam destination for `scooter`, resolving the
/// per-scooter override before falling back to the world default.
pub fn next_destination(scooter: &Scooter, world: &WorldState, scheduler: &mut Scheduler) -> Position {
    let kind = scooter.movement_strategy.unwrap_or(world.default_movement);
    match kind {
        MovementStrategyKind::RandomWalk => random_walk_destination(scooter, world, scheduler),
        MovementStrategyKind::Directed => directed_destination(scooter, world),
    }
}

fn random_walk_destination(scooter: &Scooter, world: &WorldState, scheduler: &mut Scheduler) -> Position {
    let neighbors = scooter.position.neighbors(world.grid_width, world.grid_height);
    if neighbors.is_empty() {
        return scooter.position;
    }
    let idx = scheduler.rng().random_range(0..neighbors.len());
    neighbors[idx]
}

/// Directed strategy keeps its assigned destination in
/// [`WorldState::directed_destinations`]; once reached it clears the entry
/// and falls back to holding position (no idle-behavior hook is wired up
/// by this engine, so an unassigned scooter simply stays put).
fn directed_destination(scooter: &Scooter, world: &WorldState) -> Position {
    let Some(dest) = world.directed_destinations.get(&scooter.id).copied() else {
        return scooter.position;
    };
    let (dx, dy) = (dest.x - scooter.position.x, dest.y - scooter.position.y);
    if dx == 0 && dy == 0 {
        return scooter.position;
    }
    greedy_step(scooter.position, dest)
}

/// One greedy step toward `target`: reduce `dx` before `dy`. Shared by the
/// Directed movement strategy and the station-seeking behavior (§4.D).
pub fn greedy_step(from: Position, target: Position) -> Position {
    let (dx, dy) = (target.x - from.x, target.y - from.y);
    if dx != 0 {
        Position::new(from.x + dx.signum(), from.y)
    } else if dy != 0 {
        Position::new(from.x, from.y + dy.signum())
    } else {
        from
    }
}

/// Hook invoked when a scooter transitions back into `MOVING` (post-swap or
/// post-wake-up). Only the Directed strategy assigns a fresh destination;
/// `RandomWalk` has no per-activation state.
pub fn on_scooter_activated(scooter_id: ScooterId, world: &mut WorldState, scheduler: &mut Scheduler) {
    let kind = world
        .scooters
        .get(&scooter_id)
        .and_then(|s| s.movement_strategy)
        .unwrap_or(world.default_movement);
    if kind != MovementStrategyKind::Directed {
        return;
    }
    if world.directed_destinations.contains_key(&scooter_id) {
        return;
    }
    let pos = Position::new(
        scheduler.rng().random_range(0..world.grid_width as i32),
        scheduler.rng().random_range(0..world.grid_height as i32),
    );
    world.directed_destinations.insert(scooter_id, pos);
}

/// Evaluates whether `scooter` may keep roaming right now.
pub fn check_activity(scooter: &Scooter, world: &WorldState) -> ActivityDecision {
    let kind = scooter.activity_strategy.clone().unwrap_or_else(|| world.default_activity.clone());
    match kind {
        ActivityStrategyKind::AlwaysActive => ActivityDecision::ContinueActive,
        ActivityStrategyKind::Scheduled(params) => check_scheduled(scooter, world, &params),
    }
}

fn hour_of_day(simulation_time: f64) -> f64 {
    (simulation_time / SECONDS_PER_HOUR).rem_euclid(HOURS_PER_DAY)
}

fn in_active_window(hour: f64, start: f64, end: f64) -> bool {
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

fn next_window_start(current_time: f64, start_hour: f64) -> f64 {
    let day = (current_time / (SECONDS_PER_HOUR * HOURS_PER_DAY)).floor();
    let hour = hour_of_day(current_time);
    let candidate = day * HOURS_PER_DAY * SECONDS_PER_HOUR + start_hour * SECONDS_PER_HOUR;
    if hour < start_hour {
        candidate
    } else {
        candidate + HOURS_PER_DAY * SECONDS_PER_HOUR
    }
}

/// Next midnight plus `start_hour`, unconditionally one day boundary ahead
/// of the current one regardless of where `start_hour` falls in the active
/// window. Used for the distance-cap wake time, which tracks the daily
/// reset rather than the window boundary `next_window_start` computes; the
/// two coincide for non-wrapping windows but diverge once `start_hour` is
/// on the far side of a wrap-around window (e.g. `[22, 4)`).
fn next_midnight_plus(current_time: f64, start_hour: f64) -> f64 {
    let day = (current_time / (SECONDS_PER_HOUR * HOURS_PER_DAY)).floor();
    day * HOURS_PER_DAY * SECONDS_PER_HOUR + HOURS_PER_DAY * SECONDS_PER_HOUR + start_hour * SECONDS_PER_HOUR
}

fn check_scheduled(scooter: &Scooter, world: &WorldState, params: &ScheduledActivityParams) -> ActivityDecision {
    let hour = hour_of_day(world.current_time);
    let within_hours = in_active_window(hour, params.activity_start_hour, params.activity_end_hour);

    let distance_km = scooter.distance_traveled_today * params.meters_per_grid_unit / 1000.0;
    let over_distance_cap = params
        .max_distance_per_day_km
        .is_some_and(|cap| distance_km >= cap);

    if within_hours && !over_distance_cap {
        return ActivityDecision::ContinueActive;
    }

    let wake_up_time = if over_distance_cap {
        next_midnight_plus(world.current_time, params.activity_start_hour)
    } else {
        next_window_start(world.current_time, params.activity_start_hour)
    };
    let reason = if over_distance_cap { "distance_cap_reached" } else { "out_of_hours" };
    let battery_level = world
        .batteries
        .get(&scooter.battery_id)
        .map(|b| b.charge_level())
        .unwrap_or(1.0);

    if battery_level < params.low_battery_threshold {
        ActivityDecision::SwapThenIdle { wake_up_time, reason }
    } else {
        ActivityDecision::GoIdle { wake_up_time, reason }
    }
}

/// Whether an IDLE scooter should wake up now (called by
/// `ScooterWakeUpEvent` and `DailyResetEvent`).
pub fn should_wake_up(scooter: &Scooter, world: &WorldState, current_time: f64) -> bool {
    let kind = scooter.activity_strategy.clone().unwrap_or_else(|| world.default_activity.clone());
    match kind {
        ActivityStrategyKind::AlwaysActive => true,
        ActivityStrategyKind::Scheduled(params) => {
            let hour = hour_of_day(current_time);
            let within_hours = in_active_window(hour, params.activity_start_hour, params.activity_end_hour);
            let distance_km = scooter.distance_traveled_today * params.meters_per_grid_unit / 1000.0;
            let over_distance_cap = params
                .max_distance_per_day_km
                .is_some_and(|cap| distance_km >= cap);
            within_hours && !over_distance_cap
        }
    }
}

/// Resets per-day bookkeeping on `scooter`. Every built-in strategy zeroes
/// `distance_traveled_today`; kept as a strategy hook (rather than inlined
/// in the event) because a future strategy may want day-rollover side
/// effects beyond the distance reset.
pub fn on_day_reset(scooter: &mut Scooter) {
    scooter.distance_traveled_today = 0.0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greedy_step_prefers_x_first() {
        let from = Position::new(0, 0);
        let target = Position::new(2, 3);
        let next = greedy_step(from, target);
        assert_eq!(next, Position::new(1, 0));
    }

    #[test]
    fn greedy_step_then_y_once_x_matches() {
        let from = Position::new(2, 0);
        let target = Position::new(2, 3);
        let next = greedy_step(from, target);
        assert_eq!(next, Position::new(2, 1));
    }

    #[test]
    fn greedy_step_noop_at_target() {
        let p = Position::new(5, 5);
        assert_eq!(greedy_step(p, p), p);
    }

    #[test]
    fn window_wraps_across_midnight() {
        assert!(in_active_window(23.0, 22.0, 4.0));
        assert!(in_active_window(1.0, 22.0, 4.0));
        assert!(!in_active_window(10.0, 22.0, 4.0));
    }

    #[test]
    fn hour_of_day_ignores_time_scale() {
        assert_eq!(hour_of_day(8.0 * 3600.0), 8.0);
        assert_eq!(hour_of_day(32.0 * 3600.0), 8.0);
    }
}

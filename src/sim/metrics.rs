//! Service-quality metrics: swap/miss event logs, per-station breakdowns,
//! wait-time bookkeeping, and periodic miss-rate sampling (§4.F).

use std::collections::HashMap;

use serde::Serialize;

use super::entities::{ScooterId, StationId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissType {
    NoBattery,
    PartialCharge,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwapEvent {
    pub time: f64,
    pub scooter_id: ScooterId,
    pub station_id: StationId,
    pub old_level: f64,
    pub new_level: f64,
    pub was_partial: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissEvent {
    pub time: f64,
    pub scooter_id: ScooterId,
    pub station_id: StationId,
    pub miss_type: MissType,
    pub charge_level: Option<f64>,
}

/// A `new_level` more than this far below 1.0 counts as a partial charge.
const FULL_CHARGE_EPSILON: f64 = 1e-4;
/// Periodic miss-rate sampling cadence, driven by the engine after every
/// processed event.
pub const SAMPLE_INTERVAL_SECONDS: f64 = 60.0;

#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    pub swap_events: Vec<SwapEvent>,
    pub miss_events: Vec<MissEvent>,
    pub swaps_per_station: HashMap<StationId, u64>,
    pub misses_per_station: HashMap<StationId, (u64, u64)>,
    wait_start: HashMap<ScooterId, f64>,
    pub wait_durations: Vec<f64>,
    pub miss_rate_history: Vec<(f64, f64)>,
    last_sample_time: Option<f64>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a swap; a `new_level` below full additionally records a
    /// `PARTIAL_CHARGE` miss (§4.C `BatterySwapEvent` step 4, §4.F note: a
    /// partial-charge swap counts as both a swap and a miss).
    pub fn record_swap(&mut self, time: f64, scooter_id: ScooterId, station_id: StationId, old_level: f64, new_level: f64) {
        let was_partial = new_level < 1.0 - FULL_CHARGE_EPSILON;
        self.swap_events.push(SwapEvent {
            time,
            scooter_id,
            station_id,
            old_level,
            new_level,
            was_partial,
        });
        *self.swaps_per_station.entry(station_id).or_insert(0) += 1;

        if let Some(start) = self.wait_start.remove(&scooter_id) {
            self.wait_durations.push(time - start);
        }

        if was_partial {
            self.record_miss(time, scooter_id, station_id, MissType::PartialCharge, Some(new_level));
        }
    }

    /// Records a miss. `NO_BATTERY` misses additionally start the
    /// scooter's wait-time clock.
    pub fn record_miss(&mut self, time: f64, scooter_id: ScooterId, station_id: StationId, miss_type: MissType, charge_level: Option<f64>) {
        self.miss_events.push(MissEvent {
            time,
            scooter_id,
            station_id,
            miss_type,
            charge_level,
        });
        let entry = self.misses_per_station.entry(station_id).or_insert((0, 0));
        match miss_type {
            MissType::NoBattery => {
                entry.0 += 1;
                self.wait_start.insert(scooter_id, time);
            }
            MissType::PartialCharge => entry.1 += 1,
        }
    }

    pub fn total_swaps(&self) -> u64 {
        self.swap_events.len() as u64
    }

    pub fn total_misses(&self) -> u64 {
        self.miss_events.len() as u64
    }

    pub fn no_battery_misses(&self) -> u64 {
        self.miss_events.iter().filter(|m| m.miss_type == MissType::NoBattery).count() as u64
    }

    pub fn partial_charge_misses(&self) -> u64 {
        self.miss_events.iter().filter(|m| m.miss_type == MissType::PartialCharge).count() as u64
    }

    /// `total_misses / max(1, total_swaps)`; can exceed 1.0 under heavy
    /// contention because partial-charge misses double-count (§9 open
    /// question, intentional per spec).
    pub fn current_miss_rate(&self) -> f64 {
        self.total_misses() as f64 / (self.total_swaps().max(1)) as f64
    }

    pub fn average_wait_time(&self) -> f64 {
        if self.wait_durations.is_empty() {
            return 0.0;
        }
        self.wait_durations.iter().sum::<f64>() / self.wait_durations.len() as f64
    }

    pub fn max_wait_time(&self) -> f64 {
        self.wait_durations.iter().copied().fold(0.0, f64::max)
    }

    /// Appends a `(time, miss_rate)` sample at most once per
    /// [`SAMPLE_INTERVAL_SECONDS`], called by the engine after each step.
    /// Monotone in time: a sample is only taken once `time` has advanced
    /// past the last sampled boundary.
    pub fn maybe_sample(&mut self, time: f64) {
        let due = match self.last_sample_time {
            None => true,
            Some(last) => time - last >= SAMPLE_INTERVAL_SECONDS,
        };
        if due {
            self.miss_rate_history.push((time, self.current_miss_rate()));
            self.last_sample_time = Some(time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_swap_records_no_miss() {
        let mut m = MetricsCollector::new();
        m.record_swap(10.0, 1, 1, 0.1, 1.0);
        assert_eq!(m.total_swaps(), 1);
        assert_eq!(m.total_misses(), 0);
    }

    #[test]
    fn partial_swap_counts_as_swap_and_miss() {
        let mut m = MetricsCollector::new();
        m.record_swap(10.0, 1, 1, 0.1, 0.6);
        assert_eq!(m.total_swaps(), 1);
        assert_eq!(m.total_misses(), 1);
        assert_eq!(m.partial_charge_misses(), 1);
        assert!(m.current_miss_rate() > 0.0);
    }

    #[test]
    fn wait_time_recorded_between_miss_and_next_swap() {
        let mut m = MetricsCollector::new();
        m.record_miss(5.0, 7, 1, MissType::NoBattery, None);
        m.record_swap(35.0, 7, 1, 0.0, 1.0);
        assert_eq!(m.wait_durations, vec![30.0]);
        assert_eq!(m.average_wait_time(), 30.0);
        assert_eq!(m.max_wait_time(), 30.0);
    }

    #[test]
    fn miss_rate_can_exceed_one() {
        let mut m = MetricsCollector::new();
        m.record_swap(1.0, 1, 1, 0.0, 0.5);
        assert!(m.current_miss_rate() >= 1.0);
    }

    #[test]
    fn sampling_is_monotone_and_not_double_sampled() {
        let mut m = MetricsCollector::new();
        m.maybe_sample(0.0);
        m.maybe_sample(10.0);
        assert_eq!(m.miss_rate_history.len(), 1);
        m.maybe_sample(61.0);
        assert_eq!(m.miss_rate_history.len(), 2);
    }
}

//! Control surface sitting in front of a single [`Engine`] (§4.H): owns the
//! current configuration, launches and supervises the background pacing
//! task, and fans out snapshots to subscribers (the HTTP/WS layer in
//! [`crate::api`]). Constructed once per process and shared behind an `Arc`;
//! not a process-global — callers thread it through explicitly.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::SimulationConfig;
use crate::error::{FieldError, SimError};
use crate::sim::{Engine, MetricsCollector, Status, WorldSnapshot};

/// Events pushed to WebSocket subscribers; carries enough for both the
/// periodic `state_update` broadcast and one-off acks (§6).
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    StateUpdate(Box<StatusInfo>, Box<WorldSnapshot>, Box<MetricsSnapshot>),
}

const SPEED_MIN: f64 = 0.1;
const SPEED_MAX: f64 = 100.0;
/// Background loop batches up to this many events per slice before
/// broadcasting, mirroring the originating control plane's batching.
const MAX_EVENTS_PER_SLICE: u32 = 100;
const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(100);
const MIN_SLEEP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub status: Status,
    pub session_id: Option<String>,
    pub simulation_time: f64,
    pub tick: u64,
    pub speed_multiplier: f64,
    pub start_time: Option<u64>,
}

/// A point-in-time copy of the counters exposed by [`MetricsCollector`],
/// safe to hand across the lock boundary.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_swaps: u64,
    pub total_misses: u64,
    pub no_battery_misses: u64,
    pub partial_charge_misses: u64,
    pub current_miss_rate: f64,
    pub average_wait_time: f64,
    pub max_wait_time: f64,
}

/// The fuller payload behind `GET /metrics/summary`: current counters plus
/// per-station breakdowns and the miss-rate history.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    #[serde(flatten)]
    pub current: MetricsSnapshot,
    pub swaps_per_station: Vec<(u64, u64)>,
    pub misses_per_station: Vec<(u64, u64, u64)>,
    pub miss_rate_history: Vec<(f64, f64)>,
}

impl From<&MetricsCollector> for MetricsSnapshot {
    fn from(m: &MetricsCollector) -> Self {
        Self {
            total_swaps: m.total_swaps(),
            total_misses: m.total_misses(),
            no_battery_misses: m.no_battery_misses(),
            partial_charge_misses: m.partial_charge_misses(),
            current_miss_rate: m.current_miss_rate(),
            average_wait_time: m.average_wait_time(),
            max_wait_time: m.max_wait_time(),
        }
    }
}

struct Inner {
    config: Option<SimulationConfig>,
    engine: Option<Engine>,
    session_id: Option<String>,
    start_time: Option<SystemTime>,
    speed_multiplier: f64,
    update_interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            config: None,
            engine: None,
            session_id: None,
            start_time: None,
            speed_multiplier: 1.0,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            task: None,
        }
    }
}

/// Single-writer control surface: every control method and the background
/// loop serialize through `inner`, so a `step()` driven from one caller and
/// a `pause()` issued by another never interleave mid-event (§5).
pub struct Manager {
    inner: Mutex<Inner>,
    events: broadcast::Sender<ManagerEvent>,
}

impl Manager {
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(64);
        Self {
            inner: Mutex::new(Inner::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    /// Validates and installs a new configuration, rebuilding the engine.
    /// Refused while a run is in progress.
    pub fn set_config(&self, config: SimulationConfig) -> Result<(), SimError> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(SimError::InvalidConfig(errors));
        }
        let mut guard = self.inner.lock();
        if guard.engine.as_ref().map(Engine::status) == Some(Status::Running) {
            return Err(SimError::IllegalTransition(
                "cannot change configuration while the simulation is running".to_string(),
            ));
        }
        guard.engine = Some(Engine::new(&config));
        guard.config = Some(config);
        guard.session_id = None;
        guard.start_time = None;
        Ok(())
    }

    /// Current configuration, or the default if none has been set yet.
    pub fn config(&self) -> SimulationConfig {
        self.inner.lock().config.clone().unwrap_or_default()
    }

    /// Validates `config` without installing it.
    pub fn validate_config(config: &SimulationConfig) -> Vec<FieldError> {
        config.validate()
    }

    pub fn status_info(&self) -> StatusInfo {
        let guard = self.inner.lock();
        StatusInfo {
            status: guard.engine.as_ref().map(Engine::status).unwrap_or(Status::Idle),
            session_id: guard.session_id.clone(),
            simulation_time: guard.engine.as_ref().map(Engine::simulation_time).unwrap_or(0.0),
            tick: guard.engine.as_ref().map(Engine::tick).unwrap_or(0),
            speed_multiplier: guard.speed_multiplier,
            start_time: guard.start_time.and_then(|t| t.duration_since(UNIX_EPOCH).ok()).map(|d| d.as_millis() as u64),
        }
    }

    pub fn snapshot(&self) -> Result<WorldSnapshot, SimError> {
        let guard = self.inner.lock();
        guard.engine.as_ref().map(Engine::snapshot).ok_or(SimError::NoEngine)
    }

    pub fn metrics_current(&self) -> MetricsSnapshot {
        let guard = self.inner.lock();
        guard.engine.as_ref().map(|e| MetricsSnapshot::from(e.metrics())).unwrap_or(MetricsSnapshot {
            total_swaps: 0,
            total_misses: 0,
            no_battery_misses: 0,
            partial_charge_misses: 0,
            current_miss_rate: 0.0,
            average_wait_time: 0.0,
            max_wait_time: 0.0,
        })
    }

    pub fn metrics_summary(&self) -> Result<MetricsSummary, SimError> {
        let guard = self.inner.lock();
        let engine = guard.engine.as_ref().ok_or(SimError::NoEngine)?;
        let metrics = engine.metrics();
        let mut swaps_per_station: Vec<(u64, u64)> = metrics.swaps_per_station.iter().map(|(&k, &v)| (k, v)).collect();
        swaps_per_station.sort_by_key(|(id, _)| *id);
        let mut misses_per_station: Vec<(u64, u64, u64)> = metrics
            .misses_per_station
            .iter()
            .map(|(&id, &(no_battery, partial))| (id, no_battery, partial))
            .collect();
        misses_per_station.sort_by_key(|(id, _, _)| *id);
        Ok(MetricsSummary {
            current: MetricsSnapshot::from(metrics),
            swaps_per_station,
            misses_per_station,
            miss_rate_history: metrics.miss_rate_history.clone(),
        })
    }

    /// Single step, independent of run/pause status. Returns `false` once
    /// the run has completed.
    pub fn step(&self) -> Result<bool, SimError> {
        let mut guard = self.inner.lock();
        let engine = guard.engine.as_mut().ok_or(SimError::NoEngine)?;
        Ok(engine.step())
    }

    /// Begins (or resumes from a stopped/completed state) the run and
    /// spawns the background pacing task. Refused if already running or if
    /// no configuration has been set.
    pub fn start(self: &Arc<Self>) -> Result<String, SimError> {
        let mut guard = self.inner.lock();
        if guard.engine.as_ref().map(Engine::status) == Some(Status::Running) {
            return Err(SimError::IllegalTransition("already running".to_string()));
        }
        if guard.config.is_none() {
            return Err(SimError::NoConfig);
        }
        let engine = guard.engine.as_mut().ok_or(SimError::NoEngine)?;
        engine.begin();
        let session_id = Uuid::new_v4().to_string();
        guard.session_id = Some(session_id.clone());
        guard.start_time = Some(SystemTime::now());
        self.spawn_background_loop(&mut guard);
        Ok(session_id)
    }

    /// Pauses a running simulation; the background task notices the status
    /// flip and lets itself wind down rather than being aborted mid-slice.
    pub fn pause(&self) -> Result<(), SimError> {
        let mut guard = self.inner.lock();
        let engine = guard.engine.as_mut().ok_or(SimError::NoEngine)?;
        if engine.status() != Status::Running {
            return Err(SimError::IllegalTransition("not running".to_string()));
        }
        engine.pause();
        Ok(())
    }

    /// Resumes a paused simulation and spawns a fresh background task.
    pub fn resume(self: &Arc<Self>) -> Result<(), SimError> {
        let mut guard = self.inner.lock();
        let engine = guard.engine.as_mut().ok_or(SimError::NoEngine)?;
        if engine.status() != Status::Paused {
            return Err(SimError::IllegalTransition("not paused".to_string()));
        }
        engine.resume();
        self.spawn_background_loop(&mut guard);
        Ok(())
    }

    /// Stops the run unconditionally: aborts any in-flight background task
    /// and marks the engine `STOPPED`. A no-op (not an error) from any
    /// status, matching the control API's fire-and-forget semantics.
    pub fn stop(&self) -> Result<(), SimError> {
        let mut guard = self.inner.lock();
        if let Some(task) = guard.task.take() {
            task.abort();
        }
        if let Some(engine) = guard.engine.as_mut() {
            engine.stop();
        }
        Ok(())
    }

    /// Stops the run and rebuilds a fresh engine from the current
    /// configuration, also a no-op-safe fire-and-forget operation.
    pub fn reset(&self) -> Result<(), SimError> {
        self.stop()?;
        let mut guard = self.inner.lock();
        if let Some(config) = guard.config.clone() {
            guard.engine = Some(Engine::new(&config));
        }
        guard.session_id = None;
        guard.start_time = None;
        Ok(())
    }

    /// Clamps `speed` into `[0.1, 100]` and stores it; never errors (the
    /// HTTP layer validates the raw request before calling this).
    pub fn set_speed(&self, speed: f64) -> f64 {
        let clamped = speed.clamp(SPEED_MIN, SPEED_MAX);
        self.inner.lock().speed_multiplier = clamped;
        clamped
    }

    pub fn speed_in_range(speed: f64) -> bool {
        (SPEED_MIN..=SPEED_MAX).contains(&speed)
    }

    fn spawn_background_loop(self: &Arc<Self>, guard: &mut Inner) {
        if let Some(old) = guard.task.take() {
            old.abort();
        }
        let manager = Arc::clone(self);
        guard.task = Some(tokio::spawn(async move { manager.background_loop().await }));
    }

    /// Processes events in slices of at most [`MAX_EVENTS_PER_SLICE`],
    /// stopping a slice early once the simulated time it has consumed
    /// reaches the current speed multiplier, then broadcasts a snapshot and
    /// sleeps for `update_interval / speed_multiplier` (floored at
    /// [`MIN_SLEEP`]) before the next slice.
    async fn background_loop(self: Arc<Self>) {
        loop {
            let (keep_going, completed) = {
                let mut guard = self.inner.lock();
                let Some(engine) = guard.engine.as_mut() else {
                    break;
                };
                if engine.status() != Status::Running {
                    break;
                }
                let slice_start = engine.simulation_time();
                let speed = guard.speed_multiplier;
                let mut produced = false;
                for _ in 0..MAX_EVENTS_PER_SLICE {
                    if engine.status() != Status::Running {
                        break;
                    }
                    if !engine.step() {
                        break;
                    }
                    produced = true;
                    if engine.simulation_time() - slice_start >= speed {
                        break;
                    }
                }
                (produced, engine.status() != Status::Running)
            };

            self.broadcast_update();

            if !keep_going || completed {
                break;
            }

            let (update_interval, speed) = {
                let guard = self.inner.lock();
                (guard.update_interval, guard.speed_multiplier)
            };
            let sleep_for = Duration::from_secs_f64((update_interval.as_secs_f64() / speed).max(MIN_SLEEP.as_secs_f64()));
            tokio::time::sleep(sleep_for).await;
        }
    }

    fn broadcast_update(&self) {
        let status = self.status_info();
        let snapshot = match self.snapshot() {
            Ok(s) => s,
            Err(_) => return,
        };
        let metrics = self.metrics_current();
        let _ = self.events.send(ManagerEvent::StateUpdate(Box::new(status), Box::new(snapshot), Box::new(metrics)));
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> SimulationConfig {
        let mut cfg = SimulationConfig::default();
        cfg.grid.width = 10;
        cfg.grid.height = 10;
        cfg.num_stations = 1;
        cfg.slots_per_station = 1;
        cfg.initial_batteries_per_station = 1;
        cfg.scooters.count = 1;
        cfg.duration_hours = 600.0 / 3600.0;
        cfg.random_seed = Some(7);
        cfg
    }

    #[test]
    fn rejects_invalid_config() {
        let manager = Manager::new();
        let mut cfg = SimulationConfig::default();
        cfg.duration_hours = 0.0;
        assert!(matches!(manager.set_config(cfg), Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn start_without_config_is_an_error() {
        let manager = Arc::new(Manager::new());
        assert!(matches!(manager.start(), Err(SimError::NoConfig)));
    }

    #[test]
    fn step_without_engine_is_an_error() {
        let manager = Manager::new();
        assert!(matches!(manager.step(), Err(SimError::NoEngine)));
    }

    #[test]
    fn set_config_then_step_advances_tick() {
        let manager = Manager::new();
        manager.set_config(tiny_config()).expect("valid config");
        assert_eq!(manager.status_info().tick, 0);
        assert!(manager.step().expect("engine exists"), "one event should be available");
        assert_eq!(manager.status_info().tick, 1);
    }

    #[test]
    fn pause_refused_when_not_running() {
        let manager = Manager::new();
        manager.set_config(tiny_config()).expect("valid config");
        assert!(matches!(manager.pause(), Err(SimError::IllegalTransition(_))));
    }

    #[test]
    fn set_speed_clamps_into_range() {
        let manager = Manager::new();
        assert_eq!(manager.set_speed(1000.0), 100.0);
        assert_eq!(manager.set_speed(0.0001), 0.1);
    }

    #[test]
    fn stop_and_reset_are_never_errors() {
        let manager = Manager::new();
        assert!(manager.stop().is_ok());
        manager.set_config(tiny_config()).expect("valid config");
        assert!(manager.reset().is_ok());
    }

    #[tokio::test]
    async fn start_runs_in_background_and_advances_time() {
        let manager = Arc::new(Manager::new());
        manager.set_config(tiny_config()).expect("valid config");
        manager.start().expect("starts cleanly");
        for _ in 0..50 {
            if manager.status_info().status == Status::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(manager.status_info().status, Status::Completed);
    }
}

//! Simulation kernel: entities, the event scheduler, event dispatch,
//! pluggable movement/activity strategies, metrics, and the run-loop engine.

pub mod engine;
pub mod entities;
pub mod event;
pub mod metrics;
pub mod scheduler;
pub mod strategy;
pub mod world;

pub use engine::{Engine, Status};
pub use entities::{Battery, BatteryLocation, ChargingSlot, Position, Scooter, ScooterState, Station};
pub use event::Event;
pub use metrics::MetricsCollector;
pub use scheduler::Scheduler;
pub use world::{WorldSnapshot, WorldState};

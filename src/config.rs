//! Simulation configuration: grid layout, station and scooter specs, and
//! validation. The same [`SimulationConfig`] deserializes from a TOML
//! preset file (CLI convenience) or a JSON body posted to the control API
//! (`PUT /config`, `POST /config/validate`) — one struct, two entry points.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::FieldError;

/// Top-level simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub grid: GridConfig,
    /// Explicit station placements. When non-empty, takes precedence over
    /// `num_stations` for both placement and count.
    pub stations: Vec<StationSpec>,
    pub num_stations: usize,
    pub slots_per_station: usize,
    pub station_charge_rate_kw: f64,
    pub initial_batteries_per_station: usize,
    pub scooters: ScootersConfig,
    pub scooter_groups: Vec<ScooterGroupConfig>,
    /// Run length in hours; converted to `max_duration_seconds` at engine
    /// construction time.
    pub duration_hours: f64,
    pub random_seed: Option<u64>,
    pub movement_strategy: MovementStrategyName,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            stations: Vec::new(),
            num_stations: 5,
            slots_per_station: 10,
            station_charge_rate_kw: 0.5,
            initial_batteries_per_station: 8,
            scooters: ScootersConfig::default(),
            scooter_groups: Vec::new(),
            duration_hours: 24.0,
            random_seed: None,
            movement_strategy: MovementStrategyName::RandomWalk,
        }
    }
}

/// Grid dimensions, in grid units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 100,
            height: 100,
        }
    }
}

/// An explicit station placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StationSpec {
    pub position: GridPosition,
    pub num_slots: usize,
    pub initial_batteries: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridPosition {
    pub x: i32,
    pub y: i32,
}

/// Fleet-wide scooter parameters; individual groups may override a subset
/// of these via [`ScooterGroupConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScootersConfig {
    pub count: usize,
    pub speed: f64,
    pub swap_threshold: f64,
    pub battery_spec: BatterySpecConfig,
}

impl Default for ScootersConfig {
    fn default() -> Self {
        Self {
            count: 50,
            speed: 5.0,
            swap_threshold: 0.2,
            battery_spec: BatterySpecConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatterySpecConfig {
    pub capacity_kwh: f64,
    pub charge_rate_kw: f64,
    pub consumption_rate: f64,
}

impl Default for BatterySpecConfig {
    fn default() -> Self {
        Self {
            capacity_kwh: 1.5,
            charge_rate_kw: 0.5,
            consumption_rate: 0.001,
        }
    }
}

/// A named cohort of scooters sharing overrides on top of the fleet
/// defaults — e.g. a "night shift" group with a different activity window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScooterGroupConfig {
    pub name: String,
    pub count: usize,
    /// `#RRGGBB`, validated against `^#[0-9A-Fa-f]{6}$`.
    pub color: String,
    pub speed: Option<f64>,
    pub swap_threshold: Option<f64>,
    pub movement_strategy: Option<MovementStrategyName>,
    pub activity: Option<ActivityScheduleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivityScheduleConfig {
    pub activity_start_hour: f64,
    pub activity_end_hour: f64,
    pub max_distance_per_day_km: Option<f64>,
    pub low_battery_threshold: f64,
    pub meters_per_grid_unit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementStrategyName {
    RandomWalk,
    Directed,
}

static COLOR_RE_CHARS: &str = "0123456789abcdefABCDEF";

fn is_valid_hex_color(s: &str) -> bool {
    let Some(rest) = s.strip_prefix('#') else {
        return false;
    };
    rest.len() == 6 && rest.chars().all(|c| COLOR_RE_CHARS.contains(c))
}

impl SimulationConfig {
    /// Effective station count: the length of explicit `stations` if any
    /// were given, otherwise `num_stations`.
    pub fn effective_num_stations(&self) -> usize {
        if self.stations.is_empty() {
            self.num_stations
        } else {
            self.stations.len()
        }
    }

    pub fn max_duration_seconds(&self) -> f64 {
        self.duration_hours * 3600.0
    }

    /// Parses configuration from a TOML file on disk.
    ///
    /// # Errors
    ///
    /// Returns a single [`FieldError`] if the file cannot be read or parsed.
    pub fn from_toml_file(path: &Path) -> Result<Self, FieldError> {
        let content = fs::read_to_string(path)
            .map_err(|e| FieldError::new("scenario", format!("cannot read \"{}\": {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a single [`FieldError`] if the TOML is malformed or contains
    /// unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, FieldError> {
        toml::from_str(s).map_err(|e| FieldError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns every violation found; an empty
    /// vector means the configuration is acceptable.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if !(10..=1000).contains(&self.grid.width) {
            errors.push(FieldError::new("grid.width", "must be in [10, 1000]"));
        }
        if !(10..=1000).contains(&self.grid.height) {
            errors.push(FieldError::new("grid.height", "must be in [10, 1000]"));
        }

        let num_stations = self.effective_num_stations();
        if !(1..=50).contains(&num_stations) {
            errors.push(FieldError::new("num_stations", "must be in [1, 50]"));
        }

        for (i, spec) in self.stations.iter().enumerate() {
            if spec.position.x < 0
                || spec.position.y < 0
                || spec.position.x as u32 >= self.grid.width
                || spec.position.y as u32 >= self.grid.height
            {
                errors.push(FieldError::new(
                    format!("stations[{i}].position"),
                    "must be within the grid",
                ));
            }
            if spec.initial_batteries > spec.num_slots {
                errors.push(FieldError::new(
                    format!("stations[{i}].initial_batteries"),
                    "must be <= num_slots",
                ));
            }
        }
        if self.stations.is_empty() && self.initial_batteries_per_station > self.slots_per_station {
            errors.push(FieldError::new(
                "initial_batteries_per_station",
                "must be <= slots_per_station",
            ));
        }
        if self.station_charge_rate_kw <= 0.0 {
            errors.push(FieldError::new("station_charge_rate_kw", "must be > 0"));
        }

        if !(1..=10000).contains(&self.scooters.count) {
            errors.push(FieldError::new("scooters.count", "must be in [1, 10000]"));
        }
        if self.scooters.speed <= 0.0 {
            errors.push(FieldError::new("scooters.speed", "must be > 0"));
        }
        if !(0.05..=0.5).contains(&self.scooters.swap_threshold) {
            errors.push(FieldError::new(
                "scooters.swap_threshold",
                "must be in [0.05, 0.5]",
            ));
        }
        let b = &self.scooters.battery_spec;
        if b.capacity_kwh <= 0.0 {
            errors.push(FieldError::new(
                "scooters.battery_spec.capacity_kwh",
                "must be > 0",
            ));
        }
        if b.charge_rate_kw <= 0.0 {
            errors.push(FieldError::new(
                "scooters.battery_spec.charge_rate_kw",
                "must be > 0",
            ));
        }
        if b.consumption_rate <= 0.0 {
            errors.push(FieldError::new(
                "scooters.battery_spec.consumption_rate",
                "must be > 0",
            ));
        }

        for (i, group) in self.scooter_groups.iter().enumerate() {
            if !is_valid_hex_color(&group.color) {
                errors.push(FieldError::new(
                    format!("scooter_groups[{i}].color"),
                    "must match #[0-9A-Fa-f]{6}",
                ));
            }
            if let Some(threshold) = group.swap_threshold
                && !(0.05..=0.5).contains(&threshold)
            {
                errors.push(FieldError::new(
                    format!("scooter_groups[{i}].swap_threshold"),
                    "must be in [0.05, 0.5]",
                ));
            }
        }

        if !(0.0..=168.0).contains(&self.duration_hours) || self.duration_hours <= 0.0 {
            errors.push(FieldError::new("duration_hours", "must be in (0, 168]"));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = SimulationConfig::default();
        let errors = cfg.validate();
        assert!(errors.is_empty(), "default config should be valid: {errors:?}");
    }

    #[test]
    fn validation_catches_zero_duration() {
        let mut cfg = SimulationConfig::default();
        cfg.duration_hours = 0.0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "duration_hours"));
    }

    #[test]
    fn validation_catches_swap_threshold_out_of_range() {
        let mut cfg = SimulationConfig::default();
        cfg.scooters.swap_threshold = 0.9;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "scooters.swap_threshold"));
    }

    #[test]
    fn validation_catches_bad_group_color() {
        let mut cfg = SimulationConfig::default();
        cfg.scooter_groups.push(ScooterGroupConfig {
            name: "night".into(),
            count: 5,
            color: "blue".into(),
            speed: None,
            swap_threshold: None,
            movement_strategy: None,
            activity: None,
        });
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "scooter_groups[0].color"));
    }

    #[test]
    fn validation_catches_station_outside_grid() {
        let mut cfg = SimulationConfig::default();
        cfg.stations.push(StationSpec {
            position: GridPosition { x: 500, y: 0 },
            num_slots: 4,
            initial_batteries: 2,
        });
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "stations[0].position"));
    }

    #[test]
    fn explicit_stations_override_num_stations_count() {
        let mut cfg = SimulationConfig::default();
        cfg.stations.push(StationSpec {
            position: GridPosition { x: 1, y: 1 },
            num_slots: 4,
            initial_batteries: 2,
        });
        assert_eq!(cfg.effective_num_stations(), 1);
    }

    #[test]
    fn from_toml_str_parses_partial_overrides() {
        let toml = r#"
duration_hours = 12.0
random_seed = 7

[grid]
width = 50
height = 50
"#;
        let cfg = SimulationConfig::from_toml_str(toml).expect("valid toml");
        assert_eq!(cfg.duration_hours, 12.0);
        assert_eq!(cfg.random_seed, Some(7));
        assert_eq!(cfg.grid.width, 50);
        assert_eq!(cfg.num_stations, 5, "unset fields keep defaults");
    }

    #[test]
    fn from_toml_str_rejects_unknown_field() {
        let toml = "bogus_field = true";
        assert!(SimulationConfig::from_toml_str(toml).is_err());
    }
}

//! Named scenario presets and scenario-file resolution for the CLI.
//!
//! A preset is either a built-in, code-defined [`SimulationConfig`] or a
//! TOML file under `scenarios/`; `--scenario <path>` loads a file directly,
//! falling back to `scenarios/<path>` when `path` doesn't resolve as given.

use std::path::{Path, PathBuf};

use scooter_swap_sim::config::SimulationConfig;
use scooter_swap_sim::error::FieldError;

/// Resolves a built-in preset name, falling back to `scenarios/<name>.toml`
/// on disk before giving up.
pub fn load_preset(name: &str) -> Result<SimulationConfig, FieldError> {
    let scenario_path = PathBuf::from("scenarios").join(format!("{name}.toml"));
    if scenario_path.exists() {
        return SimulationConfig::from_toml_file(&scenario_path);
    }

    match name {
        "demo" => Ok(SimulationConfig::default()),
        "dense" => Ok(dense_preset()),
        "sparse" => Ok(sparse_preset()),
        _ => Err(FieldError::new(
            "preset",
            format!("unknown preset \"{name}\" (expected demo, dense, sparse, or scenarios/{name}.toml)"),
        )),
    }
}

/// Loads a scenario from an explicit path, trying `scenarios/<path>` if the
/// path as given doesn't exist.
pub fn load_file(path: &Path) -> Result<SimulationConfig, FieldError> {
    SimulationConfig::from_toml_file(&resolve_scenario_path(path))
}

fn resolve_scenario_path(path: &Path) -> PathBuf {
    if path.exists() {
        return path.to_path_buf();
    }
    let fallback = PathBuf::from("scenarios").join(path);
    if fallback.exists() {
        fallback
    } else {
        path.to_path_buf()
    }
}

/// A busier fleet on fewer, larger stations — stresses swap contention.
fn dense_preset() -> SimulationConfig {
    let mut cfg = SimulationConfig::default();
    cfg.scooters.count = 200;
    cfg.num_stations = 8;
    cfg.slots_per_station = 6;
    cfg.initial_batteries_per_station = 4;
    cfg
}

/// A small fleet on plentiful, well-stocked stations — near-zero misses.
fn sparse_preset() -> SimulationConfig {
    let mut cfg = SimulationConfig::default();
    cfg.scooters.count = 15;
    cfg.num_stations = 2;
    cfg.slots_per_station = 12;
    cfg.initial_batteries_per_station = 10;
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_preset_is_valid() {
        let cfg = load_preset("demo").expect("demo preset resolves");
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn dense_preset_has_more_scooters_than_sparse() {
        let dense = load_preset("dense").expect("dense preset resolves");
        let sparse = load_preset("sparse").expect("sparse preset resolves");
        assert!(dense.scooters.count > sparse.scooters.count);
        assert!(dense.validate().is_empty());
        assert!(sparse.validate().is_empty());
    }

    #[test]
    fn unknown_preset_is_an_error() {
        assert!(load_preset("no-such-preset").is_err());
    }

    #[test]
    fn missing_scenario_file_is_an_error() {
        assert!(load_file(Path::new("/nonexistent/path/to/scenario.toml")).is_err());
    }
}

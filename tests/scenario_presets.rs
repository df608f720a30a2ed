//! Runs the compiled binary against its built-in presets and checks that
//! they produce measurably different swap/miss dynamics, the way
//! `--scenario`/`--preset` are meant to be used from a shell.

use std::process::Command;

fn run_preset(name: &str) -> String {
    let output = Command::new(env!("CARGO_BIN_EXE_scooter-swap-sim"))
        .args(["--preset", name])
        .output()
        .expect("failed to spawn scooter-swap-sim binary");

    assert!(
        output.status.success(),
        "preset {name} exited with {:?}\nstderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("stdout should be valid utf-8")
}

/// Finds a line starting with `label`, splits on `:`, and parses the
/// remainder (after stripping a trailing ` <unit>` suffix, if any) as f64.
fn parse_metric(stdout: &str, label: &str) -> f64 {
    let line = stdout
        .lines()
        .find(|line| line.trim_start().starts_with(label))
        .unwrap_or_else(|| panic!("no line starting with \"{label}\" in:\n{stdout}"));
    let value_part = line
        .split_once(':')
        .unwrap_or_else(|| panic!("line \"{line}\" has no ':' separator"))
        .1
        .trim();
    let number = value_part.split_whitespace().next().unwrap_or(value_part);
    number
        .parse::<f64>()
        .unwrap_or_else(|e| panic!("could not parse \"{number}\" from line \"{line}\": {e}"))
}

#[test]
fn scenario_presets_run_via_cli_and_produce_distinct_dynamics() {
    let demo = run_preset("demo");
    let dense = run_preset("dense");
    let sparse = run_preset("sparse");

    for stdout in [&demo, &dense, &sparse] {
        assert!(stdout.contains("--- Simulation Summary ---"));
    }

    let dense_swaps = parse_metric(&dense, "Total swaps");
    let sparse_swaps = parse_metric(&sparse, "Total swaps");
    let dense_miss_rate = parse_metric(&dense, "Miss rate");
    let sparse_miss_rate = parse_metric(&sparse, "Miss rate");

    assert_ne!(
        dense_swaps, sparse_swaps,
        "a busier fleet on fewer stations should not produce an identical swap count to a sparse one"
    );
    assert!(
        dense_miss_rate >= sparse_miss_rate,
        "dense preset (8 stations, 200 scooters) should miss at least as often as sparse (2 stations, 15 scooters): dense={dense_miss_rate} sparse={sparse_miss_rate}"
    );
}

#[test]
fn unknown_preset_is_rejected_with_a_nonzero_exit_code() {
    let output = Command::new(env!("CARGO_BIN_EXE_scooter-swap-sim"))
        .args(["--preset", "no-such-preset"])
        .output()
        .expect("failed to spawn scooter-swap-sim binary");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown preset"));
}

//! Prints a human-readable summary of a completed simulation run.

use scooter_swap_sim::sim::Engine;

pub fn print_summary(engine: &Engine) {
    let metrics = engine.metrics();
    println!("\n--- Simulation Summary ---");
    println!("Status: {:?}", engine.status());
    println!("Simulated time: {:.1} s", engine.simulation_time());
    println!("Ticks processed: {}", engine.tick());
    println!("Total swaps: {}", metrics.total_swaps());
    println!(
        "Total misses: {} (no_battery: {}, partial_charge: {})",
        metrics.total_misses(),
        metrics.no_battery_misses(),
        metrics.partial_charge_misses()
    );
    println!("Miss rate: {:.3}", metrics.current_miss_rate());
    println!("Average wait time: {:.1} s", metrics.average_wait_time());
    println!("Max wait time: {:.1} s", metrics.max_wait_time());
}

//! Scooter-swap simulator entry point — CLI wiring, config-driven engine
//! construction, and the optional control-API server.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use scooter_swap_sim::config::SimulationConfig;
use scooter_swap_sim::error::FieldError;
use scooter_swap_sim::io::export::export_events_csv;
use scooter_swap_sim::manager::Manager;
use scooter_swap_sim::sim::Engine;

mod cli;
mod reporting;
mod scenario;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let options = match cli::parse_args() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("error: {e}");
            cli::print_usage();
            return ExitCode::FAILURE;
        }
    };

    let config = match load_config(&options) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let errors = config.validate();
    if !errors.is_empty() {
        eprintln!("configuration rejected:");
        for e in &errors {
            eprintln!("  {e}");
        }
        return ExitCode::FAILURE;
    }

    if let Some(bind) = &options.api_bind {
        return serve(config, bind).await;
    }

    let mut engine = Engine::new(&config);
    engine.run_sync();
    reporting::print_summary(&engine);

    if let Some(path) = &options.telemetry_out
        && let Err(e) = export_events_csv(engine.metrics(), path)
    {
        eprintln!("error writing telemetry to {}: {e}", path.display());
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn load_config(options: &cli::CliOptions) -> Result<SimulationConfig, String> {
    let loaded: Result<SimulationConfig, FieldError> = if let Some(path) = &options.scenario {
        scenario::load_file(path)
    } else {
        scenario::load_preset(options.preset.as_deref().unwrap_or("demo"))
    };
    loaded.map_err(|e| e.to_string())
}

async fn serve(config: SimulationConfig, bind: &str) -> ExitCode {
    let addr: SocketAddr = match bind.parse() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: invalid --api-bind address \"{bind}\": {e}");
            return ExitCode::FAILURE;
        }
    };

    let manager = Arc::new(Manager::new());
    if let Err(e) = manager.set_config(config) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    scooter_swap_sim::api::serve(manager, addr).await;
    ExitCode::SUCCESS
}

//! Closed-loop ADR-Lite simulation.
//!
//! Runs a set of LoRaWAN end devices against a network server with the
//! ADR-Lite controller and prints a JSON summary of the run.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin adr-sim                  # built-in defaults
//! cargo run --bin adr-sim -- run.json      # JSON configuration
//! RUST_LOG=debug cargo run --bin adr-sim   # per-decision detail
//! ```

use log::{error, info};
use lorawan_adr_lite::{Simulation, SimulationConfig};

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => match SimulationConfig::load(&path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path);
                config
            }
            Err(e) => {
                error!("{}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => {
            info!("No configuration given, using defaults");
            SimulationConfig::default()
        }
    };

    let mut simulation = match Simulation::new(config) {
        Ok(simulation) => simulation,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let stats = simulation.run();

    match serde_json::to_string_pretty(stats) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("Failed to serialize summary: {}", e);
            std::process::exit(1);
        }
    }
}

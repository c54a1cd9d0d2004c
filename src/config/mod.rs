//! Simulation configuration.
//!
//! Configuration is plain data loaded from JSON with `serde`. Each section
//! validates itself; [`SimulationConfig::from_json_str`] and
//! [`SimulationConfig::load`] parse and validate in one step.

mod simulation;

pub use simulation::{AdrLiteConfig, EndDeviceConfig, LinkConfig, SimulationConfig};

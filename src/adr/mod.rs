//! ADR-Lite: binary-search adaptive data rate.
//!
//! This module contains:
//! - [`config_space`]: the energy-sorted configuration space
//! - [`state`]: per-device assignment state
//! - [`engine`]: the decision law and failure escalation
//! - [`component`]: the [`AdrLite`] network controller component

mod component;
pub mod config_space;
pub mod engine;
mod state;

pub use component::AdrLite;
pub use config_space::{energy_index, Configuration, ConfigurationSpace, TX_POWER_LEVELS_DBM};
pub use engine::Decision;
pub use state::{DeviceAdrState, DeviceStates};

//! Discrete-event simulation.
//!
//! This module contains:
//! - [`event`]: the event queue in simulated time
//! - [`link`]: the propagation model between devices and the gateway
//! - [`stats`]: counters collected during a run
//! - [`simulation`]: the orchestrator that wires devices, link and server

mod event;
mod link;
mod simulation;
mod stats;

pub use event::{EventQueue, TimerId};
pub use link::{LinkBudget, LinkModel, Reception};
pub use simulation::{device_address, Simulation, RECEIVE_DELAY_1};
pub use stats::{DeviceStats, NetworkStats};

//! LoRaWAN ADR-Lite library.
//!
//! Binary-search adaptive data rate on the network side, the Class A MAC it
//! talks to on the device side, and a discrete-event simulator that closes
//! the loop between them.
//!
//! ```no_run
//! use lorawan_adr_lite::{Simulation, SimulationConfig};
//!
//! let mut simulation = Simulation::new(SimulationConfig::default())?;
//! let stats = simulation.run();
//! println!("{:.1}% delivered", 100.0 * stats.delivery_ratio());
//! # Ok::<(), lorawan_adr_lite::ConfigError>(())
//! ```

pub mod adr;
pub mod config;
pub mod error;
pub mod lora;
pub mod mac;
pub mod server;
pub mod sim;

// Re-export commonly used items
pub use adr::{AdrLite, Configuration, ConfigurationSpace};
pub use config::{AdrLiteConfig, EndDeviceConfig, LinkConfig, SimulationConfig};
pub use error::{CommandError, ConfigError, FrameError};
pub use lora::{calculate_airtime_ms, calculate_airtime_us, CodingRate, LoRaParams};
pub use mac::{DeliveryReport, DeviceAddress, EndDeviceMac, LinkAdrAns, LinkAdrReq, MacCommand};
pub use server::{ControllerComponent, NetworkServer};
pub use sim::{NetworkStats, Simulation};

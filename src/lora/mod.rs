//! LoRa physical-layer and regional support.
//!
//! This module contains:
//! - [`airtime`]: Time-on-air calculation for LoRa frames
//! - [`region`]: EU868 data rate, power, payload and sub-band tables
//! - [`channel`]: Logical channels and duty-cycle bookkeeping

mod airtime;
mod channel;
pub mod region;

pub use airtime::{
    calculate_airtime_ms, calculate_airtime_us, time_on_air, CodingRate, LoRaParams,
};
pub use channel::{ChannelPlan, LogicalChannel, SimTime, SubBand};
pub use region::SubBandSpec;

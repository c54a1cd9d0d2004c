//! LoRaWAN MAC layer.
//!
//! This module contains:
//! - [`command`]: MAC command types and their FOpts encoding
//! - [`frame`]: MHDR, FHDR and data frame encoding
//! - [`retransmission`]: delivery tracking for confirmed uplinks
//! - [`end_device`]: the device-side MAC driven through [`MacContext`]

pub mod command;
mod end_device;
pub mod frame;
mod retransmission;

pub use command::{
    decode_margin, encode_margin, Direction, LinkAdrAns, LinkAdrReq, MacCommand, NewChannelReq,
    PowerSource, RxParamSetupAns, RxParamSetupReq, IGNORE_FIELD,
};
pub use end_device::{EndDeviceMac, MacContext, MacTimer, Uplink};
pub use frame::{DeviceAddress, Frame, FrameHeader, MType, MacHeader};
pub use retransmission::{DeliveryReport, RetxParams, RetxState};

//! Network server.
//!
//! This module contains:
//! - [`status`]: per-device records and the reply under construction
//! - [`controller`]: the component trait, its dispatcher and the ACK and
//!   link-check components
//!
//! [`NetworkServer`] owns all device records and the controller. The
//! simulator calls [`NetworkServer::receive`] when an uplink is decoded,
//! [`NetworkServer::prepare_reply`] when the RX1 window opens and
//! [`NetworkServer::reply_failed`] when the reply is lost.

mod controller;
mod status;

pub use controller::{ConfirmedMessages, ControllerComponent, LinkCheck, NetworkController};
pub use status::{EndDeviceStatus, Reply, TxParams};

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::lora::CodingRate;
use crate::mac::{DeviceAddress, Frame};

/// Network server state.
#[derive(Debug, Default)]
pub struct NetworkServer {
    devices: HashMap<DeviceAddress, EndDeviceStatus>,
    controller: NetworkController,
}

impl NetworkServer {
    pub fn new(controller: NetworkController) -> Self {
        Self {
            devices: HashMap::new(),
            controller,
        }
    }

    pub fn device(&self, address: DeviceAddress) -> Option<&EndDeviceStatus> {
        self.devices.get(&address)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Record an uplink and let every component look at it.
    pub fn receive(&mut self, frame: Frame, tx_params: TxParams, snr_db: f64) {
        let address = frame.frame_header.address;
        let status = self.devices.entry(address).or_insert_with(|| {
            info!("server: first uplink from {}", address);
            EndDeviceStatus::new(address)
        });
        debug!(
            "server: uplink from {} FCnt {} SF{} SNR {:.1} dB",
            address, frame.frame_header.f_cnt, tx_params.spreading_factor, snr_db
        );
        status.record_uplink(frame, tx_params, snr_db);
        self.controller.on_new_packet(status);
    }

    /// Run the pre-reply hooks and return the downlink, if one is needed.
    ///
    /// The second element is a coding rate to apply on the device together
    /// with the frame.
    pub fn prepare_reply(&mut self, address: DeviceAddress) -> Option<(Frame, Option<CodingRate>)> {
        let status = self.devices.get_mut(&address)?;
        self.controller.before_sending_reply(status);
        if !status.reply().needs_reply {
            return None;
        }
        Some(status.take_reply_frame())
    }

    /// The last reply to `address` did not reach it.
    pub fn reply_failed(&mut self, address: DeviceAddress) {
        match self.devices.get_mut(&address) {
            Some(status) => {
                warn!("server: reply to {} lost", address);
                self.controller.failed_reply(status);
            }
            None => debug!("server: failed reply for unknown device {}", address),
        }
    }
}

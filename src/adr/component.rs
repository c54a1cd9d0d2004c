//! ADR-Lite as a network controller component.

use log::{debug, error, info, warn};

use super::config_space::ConfigurationSpace;
use super::engine;
use super::state::{DeviceAdrState, DeviceStates};
use crate::config::AdrLiteConfig;
use crate::lora::region::{self, DEFAULT_CHANNEL_FREQUENCIES_HZ};
use crate::mac::{DeviceAddress, LinkAdrReq, MacCommand};
use crate::server::{ControllerComponent, EndDeviceStatus, TxParams};

/// Binary-search ADR controller.
///
/// Decisions are taken right before a reply is built, from the last uplink
/// that had its ADR bit set. A changed assignment is sent as a LinkADRReq.
/// A lost reply moves the assignment towards the robust end without waiting
/// for the next uplink.
#[derive(Debug)]
pub struct AdrLite {
    config: AdrLiteConfig,
    space: ConfigurationSpace,
    states: DeviceStates,
}

impl AdrLite {
    pub fn new(config: AdrLiteConfig) -> Self {
        let space = ConfigurationSpace::build(&config);
        Self {
            config,
            space,
            states: DeviceStates::new(),
        }
    }

    pub fn config(&self) -> &AdrLiteConfig {
        &self.config
    }

    pub fn configuration_space(&self) -> &ConfigurationSpace {
        &self.space
    }

    pub fn device_state(&self, address: DeviceAddress) -> Option<&DeviceAdrState> {
        self.states.get(address)
    }

    pub fn device_states(&self) -> &DeviceStates {
        &self.states
    }

    /// Put a LinkADRReq for configuration `index` into the pending reply.
    fn issue(&self, status: &mut EndDeviceStatus, index: usize, observed: &TxParams) {
        let configuration = &self.space[index];
        let tx_power_dbm = if self.config.change_tx_power {
            configuration.tx_power_dbm
        } else {
            observed.tx_power_dbm
        };
        let channels: Vec<usize> = match configuration.channel {
            Some(channel) if self.config.change_channel => vec![channel as usize],
            _ => (0..DEFAULT_CHANNEL_FREQUENCIES_HZ.len()).collect(),
        };

        let req = match LinkAdrReq::for_channels(
            configuration.data_rate(),
            region::tx_power_index(tx_power_dbm),
            &channels,
            self.config.nb_trans,
        ) {
            Ok(req) => req,
            Err(e) => {
                error!("ADR-Lite: cannot build LinkADRReq: {}", e);
                return;
            }
        };

        info!(
            "ADR-Lite: LinkADRReq to {}: DR{} ({}) channels {:?}",
            status.address(),
            req.data_rate(),
            configuration,
            channels
        );
        let reply = status.reply_mut();
        reply.frame_header.commands.push(MacCommand::LinkAdrReq(req));
        if self.config.change_coding_rate {
            reply.coding_rate_override = configuration.coding_rate;
        }
        reply.needs_reply = true;
    }
}

impl ControllerComponent for AdrLite {
    fn name(&self) -> &'static str {
        "adr-lite"
    }

    fn on_received_packet(&mut self, _status: &mut EndDeviceStatus) {
        // Decisions wait until the reply is built
    }

    fn before_sending_reply(&mut self, status: &mut EndDeviceStatus) {
        let Some(uplink) = status.last_uplink() else {
            return;
        };
        if !uplink.frame_header.adr {
            debug!("ADR-Lite: ADR bit not set for {}, skipping", status.address());
            return;
        }
        let Some(observed) = status.last_tx_params().cloned() else {
            return;
        };

        let address = status.address();
        let state = self.states.get_or_insert(address, &self.space);
        let decision = engine::decide(state.current_index, &observed, &self.space, &self.config);

        if decision.index != decision.previous_index {
            state.assign(decision.index, &self.space);
        }

        if decision.changed {
            info!(
                "ADR-Lite: {} config {} -> {} ({})",
                address, decision.previous_index, decision.index, self.space[decision.index]
            );
            self.issue(status, decision.index, &observed);
        } else if !decision.success {
            // Device has not applied the assignment yet, tell it again
            debug!(
                "ADR-Lite: {} still off its assignment, re-issuing config {}",
                address, decision.index
            );
            self.issue(status, decision.index, &observed);
        } else {
            debug!(
                "ADR-Lite: no change for {} (config {})",
                address, decision.index
            );
        }
    }

    fn on_failed_reply(&mut self, status: &mut EndDeviceStatus) {
        let address = status.address();
        let Some(state) = self.states.get_mut(address) else {
            return;
        };
        let index = engine::escalate(state.current_index, self.space.len());
        warn!(
            "ADR-Lite: reply to {} failed, moving to more robust config {} -> {}",
            address, state.current_index, index
        );
        state.assign(index, &self.space);
    }
}

//! Controller components and their dispatcher.
//!
//! Each concern of the network server (acknowledgments, link checks, ADR)
//! is a [`ControllerComponent`]. The [`NetworkController`] calls every
//! installed component, in installation order, at three points:
//!
//! 1. an uplink was received
//! 2. the reply to it is about to be built
//! 3. a reply is known not to have reached the device

use log::debug;

use super::status::EndDeviceStatus;
use crate::mac::MacCommand;

/// Hooks a network-side component can implement.
pub trait ControllerComponent {
    fn name(&self) -> &'static str;

    /// Called once per received uplink, after it has been recorded in `status`.
    fn on_received_packet(&mut self, status: &mut EndDeviceStatus);

    /// Called before the reply is finalized; may add commands to it.
    fn before_sending_reply(&mut self, status: &mut EndDeviceStatus);

    /// Called when the reply could not be delivered.
    fn on_failed_reply(&mut self, status: &mut EndDeviceStatus);
}

/// Ordered set of installed components.
#[derive(Default)]
pub struct NetworkController {
    components: Vec<Box<dyn ControllerComponent>>,
}

impl NetworkController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&mut self, component: Box<dyn ControllerComponent>) {
        debug!("controller: installing {}", component.name());
        self.components.push(component);
    }

    pub fn component_names(&self) -> Vec<&'static str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    pub fn on_new_packet(&mut self, status: &mut EndDeviceStatus) {
        for component in &mut self.components {
            component.on_received_packet(status);
        }
    }

    pub fn before_sending_reply(&mut self, status: &mut EndDeviceStatus) {
        for component in &mut self.components {
            component.before_sending_reply(status);
        }
    }

    pub fn failed_reply(&mut self, status: &mut EndDeviceStatus) {
        for component in &mut self.components {
            component.on_failed_reply(status);
        }
    }
}

impl std::fmt::Debug for NetworkController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkController")
            .field("components", &self.component_names())
            .finish()
    }
}

/// Acknowledges every confirmed uplink.
#[derive(Debug, Default)]
pub struct ConfirmedMessages;

impl ControllerComponent for ConfirmedMessages {
    fn name(&self) -> &'static str {
        "confirmed-messages"
    }

    fn on_received_packet(&mut self, status: &mut EndDeviceStatus) {
        let confirmed = status
            .last_uplink()
            .is_some_and(|frame| frame.mac_header.mtype.is_confirmed());
        if confirmed {
            let reply = status.reply_mut();
            reply.frame_header.ack = true;
            reply.needs_reply = true;
        }
    }

    fn before_sending_reply(&mut self, _status: &mut EndDeviceStatus) {}

    fn on_failed_reply(&mut self, _status: &mut EndDeviceStatus) {}
}

/// Answers LinkCheckReq with the uplink's margin.
#[derive(Debug, Default)]
pub struct LinkCheck;

impl ControllerComponent for LinkCheck {
    fn name(&self) -> &'static str {
        "link-check"
    }

    fn on_received_packet(&mut self, status: &mut EndDeviceStatus) {
        let requested = status.last_uplink().is_some_and(|frame| {
            frame
                .frame_header
                .commands
                .contains(&MacCommand::LinkCheckReq)
        });
        if !requested {
            return;
        }
        let margin = status
            .last_link_margin_db()
            .map_or(0, |db| db.round().clamp(0.0, 254.0) as u8);
        debug!("link check for {}: margin {} dB", status.address(), margin);
        let reply = status.reply_mut();
        reply.frame_header.commands.push(MacCommand::LinkCheckAns {
            margin,
            gateway_count: 1,
        });
        reply.needs_reply = true;
    }

    fn before_sending_reply(&mut self, _status: &mut EndDeviceStatus) {}

    fn on_failed_reply(&mut self, _status: &mut EndDeviceStatus) {}
}

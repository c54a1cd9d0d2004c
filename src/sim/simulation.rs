//! Closed-loop simulation of devices, one gateway and the network server.
//!
//! Everything happens on one thread in simulated time. Each device MAC is
//! driven through a short-lived [`MacContext`] that borrows the shared event
//! queue and random source; whatever the MAC emits is collected and handled
//! once the call returns, so no device ever touches another's state.

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_core::RngCore;

use super::event::{EventQueue, TimerId};
use super::link::{LinkBudget, LinkModel};
use super::stats::NetworkStats;
use crate::adr::AdrLite;
use crate::config::SimulationConfig;
use crate::error::ConfigError;
use crate::lora::SimTime;
use crate::mac::{
    DeliveryReport, DeviceAddress, EndDeviceMac, Frame, MacCommand, MacContext, MacTimer, Uplink,
};
use crate::server::{ConfirmedMessages, LinkCheck, NetworkController, NetworkServer, TxParams};

/// Delay between the end of an uplink and the RX1 window.
pub const RECEIVE_DELAY_1: Duration = Duration::from_secs(1);

/// Address given to the device with index `index`.
pub fn device_address(index: usize) -> DeviceAddress {
    DeviceAddress(0x0100_0000 + index as u32)
}

#[derive(Debug)]
enum Event {
    Traffic { device: usize },
    Mac { device: usize, timer: MacTimer },
    UplinkEnd { device: usize, uplink: Box<Uplink> },
    ReceiveWindow { device: usize, spreading_factor: u8 },
}

enum MacOutput {
    Transmit(Uplink),
    Delivery(DeliveryReport),
    Blocked,
}

struct DeviceContext<'a> {
    device: usize,
    queue: &'a mut EventQueue<Event>,
    rng: &'a mut StdRng,
    outputs: &'a mut Vec<MacOutput>,
}

impl MacContext for DeviceContext<'_> {
    fn now(&self) -> SimTime {
        self.queue.now()
    }

    fn schedule(&mut self, delay: Duration, timer: MacTimer) -> TimerId {
        self.queue.schedule(
            delay,
            Event::Mac {
                device: self.device,
                timer,
            },
        )
    }

    fn cancel(&mut self, id: TimerId) {
        self.queue.cancel(id);
    }

    fn rng(&mut self) -> &mut dyn RngCore {
        &mut *self.rng
    }

    fn transmit(&mut self, uplink: Uplink) {
        self.outputs.push(MacOutput::Transmit(uplink));
    }

    fn on_delivery_outcome(&mut self, report: DeliveryReport) {
        self.outputs.push(MacOutput::Delivery(report));
    }

    fn on_duty_cycle_blocked(&mut self, _payload: &[u8]) {
        self.outputs.push(MacOutput::Blocked);
    }
}

/// A complete run: devices, link, server and statistics.
pub struct Simulation<L = LinkBudget> {
    config: SimulationConfig,
    queue: EventQueue<Event>,
    rng: StdRng,
    devices: Vec<EndDeviceMac>,
    addresses: HashMap<DeviceAddress, usize>,
    server: NetworkServer,
    link: L,
    stats: NetworkStats,
}

impl Simulation<LinkBudget> {
    /// Build a run with the stub link budget, seeded from `config.seed`.
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let link = LinkBudget::new(&config.link, config.devices, &mut rng);
        Ok(Self::build(config, link, rng))
    }
}

impl<L: LinkModel> Simulation<L> {
    /// Build a run with a custom link model.
    pub fn with_link(config: SimulationConfig, link: L) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self::build(config, link, rng))
    }

    fn build(config: SimulationConfig, link: L, mut rng: StdRng) -> Self {
        let devices: Vec<EndDeviceMac> = (0..config.devices)
            .map(|i| EndDeviceMac::new(device_address(i), &config.end_device))
            .collect();
        let addresses = devices
            .iter()
            .enumerate()
            .map(|(i, mac)| (mac.address(), i))
            .collect();

        let mut controller = NetworkController::new();
        controller.install(Box::new(ConfirmedMessages));
        controller.install(Box::new(LinkCheck));
        controller.install(Box::new(AdrLite::new(config.adr.clone())));

        let mut queue = EventQueue::new();
        let interval_ms = config.traffic_interval_secs * 1000;
        for device in 0..devices.len() {
            let offset = Duration::from_millis(rng.gen_range(0..interval_ms));
            queue.schedule(offset, Event::Traffic { device });
        }

        let stats = NetworkStats::new(devices.iter().map(|mac| mac.address().to_string()));
        info!(
            "simulation: {} devices, {} s, seed {}",
            devices.len(),
            config.duration_secs,
            config.seed
        );
        Self {
            config,
            queue,
            rng,
            devices,
            addresses,
            server: NetworkServer::new(controller),
            link,
            stats,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn now(&self) -> SimTime {
        self.queue.now()
    }

    pub fn devices(&self) -> &[EndDeviceMac] {
        &self.devices
    }

    pub fn server(&self) -> &NetworkServer {
        &self.server
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    /// Index of the device with `address`.
    pub fn device_index(&self, address: DeviceAddress) -> Option<usize> {
        self.addresses.get(&address).copied()
    }

    /// Queue a LinkCheckReq on a device's next uplink.
    pub fn request_link_check(&mut self, device: usize) {
        if let Some(mac) = self.devices.get_mut(device) {
            mac.queue_command(MacCommand::LinkCheckReq);
        }
    }

    /// Process events until the configured duration has elapsed.
    pub fn run(&mut self) -> &NetworkStats {
        let end = Duration::from_secs(self.config.duration_secs);
        self.run_until(end)
    }

    /// Process events up to and including `end`.
    pub fn run_until(&mut self, end: SimTime) -> &NetworkStats {
        while self.queue.peek_time().is_some_and(|at| at <= end) {
            if let Some((_, _, event)) = self.queue.pop() {
                self.handle(event);
            }
        }
        self.refresh_device_stats();
        info!(
            "simulation: {:?} elapsed, {} uplinks, {:.1}% decoded, {:.1}% delivered",
            self.queue.now(),
            self.stats.uplinks_sent,
            100.0 * self.stats.uplink_success_ratio(),
            100.0 * self.stats.delivery_ratio()
        );
        &self.stats
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Traffic { device } => self.on_traffic(device),
            Event::Mac { device, timer } => {
                self.with_device(device, |mac, ctx| mac.handle_timer(ctx, timer));
            }
            Event::UplinkEnd { device, uplink } => self.on_uplink_end(device, *uplink),
            Event::ReceiveWindow {
                device,
                spreading_factor,
            } => self.on_receive_window(device, spreading_factor),
        }
    }

    fn on_traffic(&mut self, device: usize) {
        let payload = vec![device as u8; self.config.payload_bytes];
        self.with_device(device, |mac, ctx| mac.send(ctx, payload));
        let interval = Duration::from_secs(self.config.traffic_interval_secs);
        self.queue.schedule(interval, Event::Traffic { device });
    }

    fn on_uplink_end(&mut self, device: usize, uplink: Uplink) {
        let spreading_factor = uplink.spreading_factor();
        let reception = self
            .link
            .uplink(device, spreading_factor, uplink.tx_power_dbm, &mut self.rng);
        self.stats.record_reception(device, reception.received);
        if !reception.received {
            debug!(
                "simulation: uplink of device {} lost (SNR {:.1} dB at SF{})",
                device, reception.snr_db, spreading_factor
            );
            return;
        }

        let frame = match over_the_air(&uplink.frame) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("simulation: gateway could not decode uplink: {}", e);
                return;
            }
        };
        let tx_params = TxParams {
            spreading_factor,
            tx_power_dbm: uplink.tx_power_dbm,
            data_rate: uplink.data_rate,
            channel_index: uplink.channel_index,
            frequency_hz: uplink.frequency_hz,
            coding_rate: uplink.coding_rate,
        };
        self.server.receive(frame, tx_params, reception.snr_db);
        self.queue.schedule(
            RECEIVE_DELAY_1,
            Event::ReceiveWindow {
                device,
                spreading_factor,
            },
        );
    }

    fn on_receive_window(&mut self, device: usize, spreading_factor: u8) {
        let Some(address) = self.devices.get(device).map(EndDeviceMac::address) else {
            return;
        };
        let Some((reply, coding_rate)) = self.server.prepare_reply(address) else {
            return;
        };
        let reception = self.link.downlink(device, spreading_factor, &mut self.rng);
        self.stats.record_downlink(reception.received);
        if !reception.received {
            self.server.reply_failed(address);
            return;
        }

        let frame = match over_the_air(&reply) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("simulation: device could not decode downlink: {}", e);
                self.server.reply_failed(address);
                return;
            }
        };
        self.with_device(device, |mac, ctx| {
            mac.receive_downlink(ctx, &frame, reception.snr_db);
            if let Some(coding_rate) = coding_rate {
                mac.set_coding_rate(coding_rate);
            }
        });
    }

    /// Call into one device's MAC, then act on what it emitted.
    fn with_device<F>(&mut self, device: usize, f: F)
    where
        F: FnOnce(&mut EndDeviceMac, &mut dyn MacContext),
    {
        let Some(mac) = self.devices.get_mut(device) else {
            return;
        };
        let mut outputs = Vec::new();
        let mut ctx = DeviceContext {
            device,
            queue: &mut self.queue,
            rng: &mut self.rng,
            outputs: &mut outputs,
        };
        f(mac, &mut ctx);

        for output in outputs {
            match output {
                MacOutput::Transmit(uplink) => {
                    self.stats.record_uplink(device, uplink.retransmission);
                    let airtime = uplink.airtime;
                    self.queue.schedule(
                        airtime,
                        Event::UplinkEnd {
                            device,
                            uplink: Box::new(uplink),
                        },
                    );
                }
                MacOutput::Delivery(report) => self.stats.record_delivery(device, &report),
                MacOutput::Blocked => self.stats.record_blocked(),
            }
        }
    }

    fn refresh_device_stats(&mut self) {
        for (stats, mac) in self.stats.devices.iter_mut().zip(&self.devices) {
            stats.data_rate = mac.data_rate();
            stats.tx_power_dbm = mac.tx_power_dbm();
            stats.coding_rate = mac.coding_rate().to_string();
        }
    }
}

/// Encode and decode a frame, as a radio link would.
fn over_the_air(frame: &Frame) -> Result<Frame, crate::error::FrameError> {
    Frame::decode(&frame.encode()?)
}

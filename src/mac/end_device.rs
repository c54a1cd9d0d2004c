//! Device-side LoRaWAN MAC.
//!
//! [`EndDeviceMac`] owns everything a Class A device decides on its own:
//!
//! - validation and application of network MAC commands, with the answer
//!   queued for the next uplink
//! - the send path: duty-cycle deferral, channel choice, frame building
//! - the delivery state machine for confirmed uplinks
//!
//! The MAC never touches a clock, a timer wheel or a radio directly. All of
//! that goes through [`MacContext`], so the same code runs inside the
//! simulator and inside unit tests.
//!
//! # Delivery state machine
//!
//! ```text
//!            send (confirmed)                 ACK in downlink
//!   IDLE ───────────────────▶ AWAITING_ACK ──────────────────▶ IDLE  (delivered)
//!     ▲                        │    ▲
//!     │   attempts exhausted   │    │ retransmit after backoff
//!     └────────────────────────┘    │ (same payload, fresh FOpts)
//!                              ack timeout ──┘
//! ```
//!
//! A new application message while awaiting an ACK reports the old one as
//! failed before the new one goes out.

use std::time::Duration;

use log::{debug, error, info, warn};
use rand::Rng;
use rand_core::RngCore;

use crate::config::EndDeviceConfig;
use crate::lora::region::{self, MAX_CHANNELS};
use crate::lora::{time_on_air, ChannelPlan, CodingRate, LogicalChannel, SimTime};
use crate::sim::TimerId;

use super::command::{
    encode_margin, LinkAdrAns, LinkAdrReq, MacCommand, NewChannelReq, PowerSource,
    RxParamSetupAns, RxParamSetupReq, IGNORE_FIELD,
};
use super::frame::{DeviceAddress, Frame, FrameHeader, MType, MacHeader, MAX_FOPTS_LEN};
use super::retransmission::{DeliveryReport, RetxParams, RetxState};

/// Application port used for every uplink.
const APP_PORT: u8 = 1;

/// Highest RX1 data rate offset in EU868.
const MAX_RX1_DR_OFFSET: u8 = 5;

/// SNR reported before any downlink was received.
const INITIAL_RX_SNR_DB: f64 = 32.0;

/// Timers a MAC instance arms through its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacTimer {
    /// A send postponed by the duty cycle
    DeferredSend,
    /// RX windows closed without an ACK
    AckTimeout,
    /// Backoff before a retransmission elapsed
    Retransmit,
}

/// What the MAC needs from its environment.
pub trait MacContext {
    /// Current simulated time.
    fn now(&self) -> SimTime;

    /// Arm a timer that calls [`EndDeviceMac::handle_timer`] after `delay`.
    fn schedule(&mut self, delay: Duration, timer: MacTimer) -> TimerId;

    /// Disarm a timer. A cancelled timer never fires.
    fn cancel(&mut self, id: TimerId);

    fn rng(&mut self) -> &mut dyn RngCore;

    /// Put a frame on the air.
    fn transmit(&mut self, uplink: Uplink);

    /// A confirmed message was delivered or gave up. Called once per message.
    fn on_delivery_outcome(&mut self, report: DeliveryReport);

    /// No channel could take the frame.
    fn on_duty_cycle_blocked(&mut self, payload: &[u8]);
}

/// A frame leaving the device, with the radio settings used.
#[derive(Debug, Clone)]
pub struct Uplink {
    pub frame: Frame,
    pub channel_index: usize,
    pub frequency_hz: u32,
    pub data_rate: u8,
    pub tx_power_dbm: f64,
    pub coding_rate: CodingRate,
    pub airtime: Duration,
    pub retransmission: bool,
}

impl Uplink {
    pub fn spreading_factor(&self) -> u8 {
        region::sf_for_data_rate(self.data_rate).unwrap_or(12)
    }
}

#[derive(Debug, Clone)]
enum PendingSend {
    New(Vec<u8>),
    Retransmission,
}

/// MAC layer of one end device.
#[derive(Debug)]
pub struct EndDeviceMac {
    address: DeviceAddress,
    mtype: MType,
    adr_enabled: bool,
    data_rate: u8,
    tx_power_dbm: f64,
    coding_rate: CodingRate,
    nb_trans: u8,
    channels: ChannelPlan,
    rx1_dr_offset: u8,
    rx2_data_rate: u8,
    rx2_frequency_hz: u32,
    power_source: PowerSource,
    ack_timeout: Duration,
    retx_backoff_ms: (u64, u64),
    last_rx_snr_db: f64,
    last_known_link_margin_db: u8,
    last_known_gateway_count: u8,
    f_cnt: u16,
    pending_commands: Vec<MacCommand>,
    retx: RetxParams,
    deferred: Option<(TimerId, PendingSend)>,
    ack_timer: Option<TimerId>,
    retx_timer: Option<TimerId>,
}

impl EndDeviceMac {
    pub fn new(address: DeviceAddress, config: &EndDeviceConfig) -> Self {
        Self {
            address,
            mtype: if config.confirmed {
                MType::ConfirmedDataUp
            } else {
                MType::UnconfirmedDataUp
            },
            adr_enabled: config.adr_enabled,
            data_rate: config.initial_data_rate,
            tx_power_dbm: config.initial_tx_power_dbm,
            coding_rate: CodingRate::default(),
            nb_trans: config.max_transmissions.max(1),
            channels: ChannelPlan::eu868(),
            rx1_dr_offset: 0,
            rx2_data_rate: region::DEFAULT_RX2_DATA_RATE,
            rx2_frequency_hz: region::DEFAULT_RX2_FREQUENCY_HZ,
            power_source: config.power_source,
            ack_timeout: config.ack_timeout(),
            retx_backoff_ms: (config.retx_backoff_min_ms, config.retx_backoff_max_ms),
            last_rx_snr_db: INITIAL_RX_SNR_DB,
            last_known_link_margin_db: 0,
            last_known_gateway_count: 0,
            f_cnt: 0,
            pending_commands: Vec::new(),
            retx: RetxParams::default(),
            deferred: None,
            ack_timer: None,
            retx_timer: None,
        }
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    pub fn data_rate(&self) -> u8 {
        self.data_rate
    }

    pub fn tx_power_dbm(&self) -> f64 {
        self.tx_power_dbm
    }

    pub fn coding_rate(&self) -> CodingRate {
        self.coding_rate
    }

    /// Apply a coding rate chosen by the network. LoRaWAN has no command for
    /// this, so the simulator calls it directly when the reply arrives.
    pub fn set_coding_rate(&mut self, coding_rate: CodingRate) {
        debug!("{}: coding rate {} -> {}", self.address, self.coding_rate, coding_rate);
        self.coding_rate = coding_rate;
    }

    pub fn nb_trans(&self) -> u8 {
        self.nb_trans
    }

    pub fn adr_enabled(&self) -> bool {
        self.adr_enabled
    }

    pub fn set_adr_enabled(&mut self, enabled: bool) {
        self.adr_enabled = enabled;
    }

    pub fn channels(&self) -> &ChannelPlan {
        &self.channels
    }

    pub fn aggregated_duty_cycle(&self) -> f64 {
        self.channels.aggregated_duty_cycle()
    }

    pub fn rx_params(&self) -> (u8, u8, u32) {
        (self.rx1_dr_offset, self.rx2_data_rate, self.rx2_frequency_hz)
    }

    pub fn last_known_link_margin_db(&self) -> u8 {
        self.last_known_link_margin_db
    }

    pub fn last_known_gateway_count(&self) -> u8 {
        self.last_known_gateway_count
    }

    pub fn f_cnt(&self) -> u16 {
        self.f_cnt
    }

    pub fn retx_state(&self) -> RetxState {
        self.retx.state()
    }

    /// Commands waiting for the next uplink.
    pub fn pending_commands(&self) -> &[MacCommand] {
        &self.pending_commands
    }

    /// Queue a device-initiated command such as `LinkCheckReq`.
    pub fn queue_command(&mut self, command: MacCommand) {
        self.pending_commands.push(command);
    }

    // ==================== Sending ====================

    /// Hand a new application message to the MAC.
    pub fn send(&mut self, ctx: &mut dyn MacContext, payload: Vec<u8>) {
        self.attempt(ctx, PendingSend::New(payload));
    }

    /// React to a timer armed through [`MacContext::schedule`].
    pub fn handle_timer(&mut self, ctx: &mut dyn MacContext, timer: MacTimer) {
        match timer {
            MacTimer::DeferredSend => {
                if let Some((_, pending)) = self.deferred.take() {
                    self.attempt(ctx, pending);
                }
            }
            MacTimer::AckTimeout => {
                self.ack_timer = None;
                self.on_ack_timeout(ctx);
            }
            MacTimer::Retransmit => {
                self.retx_timer = None;
                if self.retx.is_waiting_ack() {
                    self.attempt(ctx, PendingSend::Retransmission);
                }
            }
        }
    }

    fn attempt(&mut self, ctx: &mut dyn MacContext, pending: PendingSend) {
        let now = ctx.now();
        match self.channels.next_transmission_delay(now) {
            Some(delay) if delay > Duration::ZERO => {
                self.postpone(ctx, delay, pending);
                return;
            }
            Some(_) => {}
            None => {
                warn!("{}: no usable channel enabled", self.address);
                let payload = self.pending_payload(&pending);
                ctx.on_duty_cycle_blocked(&payload);
                return;
            }
        }

        let Some(slot) = self.channels.pick_channel(self.data_rate, now, ctx.rng()) else {
            warn!(
                "{}: no free channel supports DR{}, frame dropped",
                self.address, self.data_rate
            );
            let payload = self.pending_payload(&pending);
            ctx.on_duty_cycle_blocked(&payload);
            return;
        };
        let Some(channel) = self.channels.channel(slot).cloned() else {
            return;
        };
        if let Some(limit) = self.channels.max_tx_power_dbm(&channel) {
            assert!(
                self.tx_power_dbm <= limit,
                "tx power {} dBm is above the {} dBm allowed on {} Hz",
                self.tx_power_dbm,
                limit,
                channel.frequency_hz
            );
        }

        match pending {
            PendingSend::New(payload) => self.send_new(ctx, payload, slot, &channel),
            PendingSend::Retransmission => self.send_retransmission(ctx, slot, &channel),
        }
    }

    fn pending_payload(&self, pending: &PendingSend) -> Vec<u8> {
        match pending {
            PendingSend::New(payload) => payload.clone(),
            PendingSend::Retransmission => self.retx.payload().unwrap_or_default().to_vec(),
        }
    }

    fn postpone(&mut self, ctx: &mut dyn MacContext, delay: Duration, pending: PendingSend) {
        // A deferred new message supersedes the retransmission anyway
        if matches!(pending, PendingSend::Retransmission)
            && matches!(self.deferred, Some((_, PendingSend::New(_))))
        {
            debug!("{}: retransmission dropped, new message pending", self.address);
            return;
        }
        if let Some((id, replaced)) = self.deferred.take() {
            ctx.cancel(id);
            if let PendingSend::New(payload) = replaced {
                warn!(
                    "{}: deferred message of {} bytes replaced before it was sent",
                    self.address,
                    payload.len()
                );
            }
        }
        let id = ctx.schedule(delay, MacTimer::DeferredSend);
        self.deferred = Some((id, pending));
        warn!(
            "{}: duty cycle does not allow sending now, retrying in {:?}",
            self.address, delay
        );
    }

    fn send_new(
        &mut self,
        ctx: &mut dyn MacContext,
        payload: Vec<u8>,
        slot: usize,
        channel: &LogicalChannel,
    ) {
        self.f_cnt = self.f_cnt.wrapping_add(1);
        let frame = self.build_uplink_frame(payload.clone());

        let max_payload = region::max_mac_payload(self.data_rate).unwrap_or(0);
        match frame.mac_payload_len() {
            Ok(len) if len <= max_payload => {}
            Ok(len) => {
                warn!(
                    "{}: MAC payload of {} bytes exceeds {} at DR{}, transmission canceled",
                    self.address, len, max_payload, self.data_rate
                );
                return;
            }
            Err(e) => {
                error!("{}: cannot encode uplink: {}", self.address, e);
                return;
            }
        }

        self.pending_commands.clear();

        if let Some(report) = self.retx.finish(false, self.nb_trans) {
            debug!(
                "{}: new message supersedes the one in flight after {} of {} transmissions",
                self.address, report.transmissions, self.nb_trans
            );
            ctx.on_delivery_outcome(report);
        }
        self.reset_retransmission(ctx);

        if self.mtype.is_confirmed() {
            self.retx.begin(payload, self.nb_trans, ctx.now());
        }
        self.transmit(ctx, frame, slot, channel, false);
    }

    fn send_retransmission(&mut self, ctx: &mut dyn MacContext, slot: usize, channel: &LogicalChannel) {
        let Some(payload) = self.retx.payload().map(<[u8]>::to_vec) else {
            return;
        };
        if !self.retx.consume_attempt() {
            return;
        }
        debug!(
            "{}: retransmitting FCnt {}, {} attempts left",
            self.address,
            self.f_cnt,
            self.retx.attempts_left()
        );
        let frame = self.build_uplink_frame(payload);
        self.transmit(ctx, frame, slot, channel, true);
    }

    fn transmit(
        &mut self,
        ctx: &mut dyn MacContext,
        frame: Frame,
        slot: usize,
        channel: &LogicalChannel,
        retransmission: bool,
    ) {
        let Some(params) = region::lora_params_for_data_rate(self.data_rate) else {
            error!("{}: DR{} has no modulation", self.address, self.data_rate);
            return;
        };
        let phy_len = match frame.phy_payload_len() {
            Ok(len) => len,
            Err(e) => {
                error!("{}: cannot encode uplink: {}", self.address, e);
                return;
            }
        };
        let airtime = time_on_air(phy_len, &params.with_coding_rate(self.coding_rate));
        let now = ctx.now();
        self.channels
            .record_transmission(channel.frequency_hz, airtime, now);

        if self.retx.is_waiting_ack() {
            self.ack_timer = Some(ctx.schedule(airtime + self.ack_timeout, MacTimer::AckTimeout));
        }

        info!(
            "{}: uplink FCnt {} on ch{} DR{} {} dBm CR {} ({:?} on air{})",
            self.address,
            frame.frame_header.f_cnt,
            slot,
            self.data_rate,
            self.tx_power_dbm,
            self.coding_rate,
            airtime,
            if retransmission { ", retransmission" } else { "" }
        );
        ctx.transmit(Uplink {
            frame,
            channel_index: slot,
            frequency_hz: channel.frequency_hz,
            data_rate: self.data_rate,
            tx_power_dbm: self.tx_power_dbm,
            coding_rate: self.coding_rate,
            airtime,
            retransmission,
        });
    }

    fn build_uplink_frame(&self, payload: Vec<u8>) -> Frame {
        Frame {
            mac_header: self.build_mac_header(),
            frame_header: self.build_frame_header(),
            f_port: Some(APP_PORT),
            payload,
        }
    }

    fn build_mac_header(&self) -> MacHeader {
        MacHeader::new(self.mtype)
    }

    fn build_frame_header(&self) -> FrameHeader {
        let mut commands = Vec::new();
        let mut used = 0;
        for command in &self.pending_commands {
            let len = command.encoded_len();
            if used + len > MAX_FOPTS_LEN {
                warn!("{}: FOpts full, {:?} not sent", self.address, command);
                continue;
            }
            used += len;
            commands.push(command.clone());
        }
        FrameHeader {
            address: self.address,
            adr: self.adr_enabled,
            adr_ack_req: false,
            ack: false,
            f_pending: false,
            f_cnt: self.f_cnt,
            commands,
        }
    }

    // ==================== Delivery ====================

    fn on_ack_timeout(&mut self, ctx: &mut dyn MacContext) {
        if !self.retx.is_waiting_ack() {
            return;
        }
        if self.retx.attempts_left() > 0 {
            let (min, max) = self.retx_backoff_ms;
            let backoff = Duration::from_millis(ctx.rng().gen_range(min..=max));
            debug!("{}: no ACK, retransmitting in {:?}", self.address, backoff);
            self.retx_timer = Some(ctx.schedule(backoff, MacTimer::Retransmit));
        } else if let Some(report) = self.retx.finish(false, self.nb_trans) {
            info!(
                "{}: giving up after {} transmissions",
                self.address, report.transmissions
            );
            self.reset_retransmission(ctx);
            ctx.on_delivery_outcome(report);
        }
    }

    /// Forget the message in flight and disarm its timers.
    pub fn reset_retransmission(&mut self, ctx: &mut dyn MacContext) {
        self.retx.reset();
        if let Some(id) = self.ack_timer.take() {
            ctx.cancel(id);
        }
        if let Some(id) = self.retx_timer.take() {
            ctx.cancel(id);
        }
        if matches!(self.deferred, Some((_, PendingSend::Retransmission))) {
            if let Some((id, _)) = self.deferred.take() {
                ctx.cancel(id);
            }
        }
    }

    // ==================== Receiving ====================

    /// Process a downlink addressed to this device.
    pub fn receive_downlink(&mut self, ctx: &mut dyn MacContext, frame: &Frame, snr_db: f64) {
        if frame.frame_header.address != self.address {
            debug!(
                "{}: ignoring downlink for {}",
                self.address, frame.frame_header.address
            );
            return;
        }
        self.last_rx_snr_db = snr_db;
        self.parse_commands(ctx, &frame.frame_header);
    }

    /// Handle the ACK bit, then every MAC command in the header.
    pub fn parse_commands(&mut self, ctx: &mut dyn MacContext, header: &FrameHeader) {
        if self.retx.is_waiting_ack() {
            if header.ack {
                if let Some(report) = self.retx.finish(true, self.nb_trans) {
                    info!(
                        "{}: ACK received after {} transmissions",
                        self.address, report.transmissions
                    );
                    self.reset_retransmission(ctx);
                    ctx.on_delivery_outcome(report);
                }
            } else {
                error!(
                    "{}: downlink without ACK while waiting for one",
                    self.address
                );
            }
        }

        for command in &header.commands {
            self.handle_command(command);
        }
    }

    pub fn handle_command(&mut self, command: &MacCommand) {
        match command {
            MacCommand::LinkCheckAns {
                margin,
                gateway_count,
            } => self.on_link_check_ans(*margin, *gateway_count),
            MacCommand::LinkAdrReq(req) => {
                self.on_link_adr_req(req);
            }
            MacCommand::DutyCycleReq { max_duty_cycle } => self.on_duty_cycle_req(*max_duty_cycle),
            MacCommand::RxParamSetupReq(req) => {
                self.on_rx_param_setup_req(req);
            }
            MacCommand::DevStatusReq => self.on_dev_status_req(),
            MacCommand::NewChannelReq(req) => {
                self.on_new_channel_req(req);
            }
            MacCommand::Unsupported { cid, .. } => {
                error!("{}: CID 0x{:02x} not supported", self.address, cid);
            }
            MacCommand::LinkCheckReq
            | MacCommand::LinkAdrAns(_)
            | MacCommand::DutyCycleAns
            | MacCommand::RxParamSetupAns(_)
            | MacCommand::DevStatusAns { .. }
            | MacCommand::NewChannelAns { .. } => {
                error!("{}: uplink command {:?} in a downlink", self.address, command);
            }
        }
    }

    pub fn on_link_check_ans(&mut self, margin: u8, gateway_count: u8) {
        debug!(
            "{}: link margin {} dB, {} gateways",
            self.address, margin, gateway_count
        );
        self.last_known_link_margin_db = margin;
        self.last_known_gateway_count = gateway_count;
    }

    /// Validate a LinkADRReq field by field and apply what passes.
    ///
    /// With ADR enabled the three fields commit together or not at all. With
    /// ADR disabled the device keeps its own data rate and power and only
    /// takes the channel mask, provided its current data rate stays usable.
    pub fn on_link_adr_req(&mut self, req: &LinkAdrReq) -> LinkAdrAns {
        let defined = self.channels.defined_mask();
        let mut mask = req.channel_mask();
        let mut channel_mask_ack = true;
        let mut data_rate_ack = true;
        let mut power_ack = true;

        match req.channel_mask_control() {
            0 => {
                if mask & !defined != 0 {
                    warn!("{}: channel mask enables undefined channels", self.address);
                    channel_mask_ack = false;
                }
            }
            6 => mask = defined,
            other => {
                warn!("{}: invalid ChMaskCntl {}", self.address, other);
                channel_mask_ack = false;
            }
        }
        if mask == 0 {
            warn!("{}: channel mask disables every channel", self.address);
            channel_mask_ack = false;
        }

        if !self.adr_enabled {
            if channel_mask_ack && self.mask_supports(mask, self.data_rate) {
                self.channels.apply_channel_mask(mask);
            } else if channel_mask_ack {
                warn!(
                    "{}: channel mask incompatible with DR{} (ADR off)",
                    self.address, self.data_rate
                );
                channel_mask_ack = false;
            }
            data_rate_ack = false;
            power_ack = false;
        } else {
            if req.data_rate() != IGNORE_FIELD && !self.mask_supports(mask, req.data_rate()) {
                warn!("{}: DR{} not supported", self.address, req.data_rate());
                data_rate_ack = false;
            }
            if req.tx_power() != IGNORE_FIELD && region::tx_power_dbm(req.tx_power()).is_none() {
                warn!("{}: invalid tx power index {}", self.address, req.tx_power());
                power_ack = false;
            }

            if channel_mask_ack && data_rate_ack && power_ack {
                self.channels.apply_channel_mask(mask);
                if let Some(dbm) = region::tx_power_dbm(req.tx_power()) {
                    self.tx_power_dbm = dbm;
                }
                if req.data_rate() != IGNORE_FIELD {
                    self.data_rate = req.data_rate();
                }
                self.nb_trans = req.nb_trans().max(1);
                info!(
                    "{}: LinkADRReq applied: DR{} {} dBm NbTrans {} mask {:016b}",
                    self.address, self.data_rate, self.tx_power_dbm, self.nb_trans, mask
                );
            }
        }

        let ans = LinkAdrAns {
            power_ack,
            data_rate_ack,
            channel_mask_ack,
        };
        self.pending_commands.push(MacCommand::LinkAdrAns(ans));
        ans
    }

    // A mask bit on an undefined slot falls back to the generic data rate table.
    fn mask_supports(&self, mask: u16, data_rate: u8) -> bool {
        (0..MAX_CHANNELS)
            .filter(|i| mask & (1 << i) != 0)
            .any(|i| match self.channels.channel(i) {
                Some(channel) => channel.supports_data_rate(data_rate),
                None => {
                    region::sf_for_data_rate(data_rate).is_some()
                        && region::bandwidth_for_data_rate(data_rate).is_some()
                }
            })
    }

    pub fn on_duty_cycle_req(&mut self, max_duty_cycle: u8) {
        let duty_cycle = 1.0 / f64::from(1u32 << (max_duty_cycle & 0x0F));
        debug!("{}: aggregated duty cycle {}", self.address, duty_cycle);
        self.channels.set_aggregated_duty_cycle(duty_cycle);
        self.pending_commands.push(MacCommand::DutyCycleAns);
    }

    pub fn on_rx_param_setup_req(&mut self, req: &RxParamSetupReq) -> RxParamSetupAns {
        let ans = RxParamSetupAns {
            rx1_dr_offset_ack: req.rx1_dr_offset() <= MAX_RX1_DR_OFFSET,
            rx2_data_rate_ack: region::sf_for_data_rate(req.rx2_data_rate()).is_some(),
            channel_ack: self.channels.is_frequency_valid(req.frequency_hz()),
        };
        if ans.rx1_dr_offset_ack && ans.rx2_data_rate_ack && ans.channel_ack {
            self.rx1_dr_offset = req.rx1_dr_offset();
            self.rx2_data_rate = req.rx2_data_rate();
            self.rx2_frequency_hz = req.frequency_hz();
        } else {
            warn!("{}: RXParamSetupReq rejected: {:?}", self.address, ans);
        }
        self.pending_commands.push(MacCommand::RxParamSetupAns(ans));
        ans
    }

    pub fn on_dev_status_req(&mut self) {
        let battery = self.power_source.battery_byte();
        let margin = encode_margin(self.last_rx_snr_db);
        self.pending_commands
            .push(MacCommand::DevStatusAns { battery, margin });
    }

    /// Returns `(data_rate_range_ok, frequency_ok)`.
    pub fn on_new_channel_req(&mut self, req: &NewChannelReq) -> (bool, bool) {
        let index = req.channel_index() as usize;
        let frequency_hz = req.frequency_hz();
        let (min_dr, max_dr) = (req.min_data_rate(), req.max_data_rate());
        let mut data_rate_range_ok = true;
        let mut frequency_ok = true;

        if index < region::DEFAULT_CHANNEL_FREQUENCIES_HZ.len() || index >= MAX_CHANNELS {
            warn!("{}: channel index {} cannot be changed", self.address, index);
            data_rate_range_ok = false;
            frequency_ok = false;
        }
        if frequency_hz != 0 && !self.channels.is_frequency_valid(frequency_hz) {
            warn!("{}: invalid frequency {} Hz", self.address, frequency_hz);
            frequency_ok = false;
        }
        if region::sf_for_data_rate(min_dr).is_none()
            || region::sf_for_data_rate(max_dr).is_none()
            || max_dr < min_dr
        {
            warn!("{}: invalid DR range {}..{}", self.address, min_dr, max_dr);
            data_rate_range_ok = false;
        }

        if data_rate_range_ok && frequency_ok {
            let channel = (frequency_hz != 0).then(|| LogicalChannel::new(frequency_hz, min_dr, max_dr));
            debug!("{}: channel {} set to {:?}", self.address, index, channel);
            self.channels.set_channel(index, channel);
        }
        self.pending_commands.push(MacCommand::NewChannelAns {
            data_rate_range_ok,
            frequency_ok,
        });
        (data_rate_range_ok, frequency_ok)
    }
}

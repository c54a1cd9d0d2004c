//! LoRaWAN MAC commands.
//!
//! Every command the simulator exchanges is one variant of [`MacCommand`].
//! Commands travel in the FOpts field of a frame header as
//! `[CID: 1 byte][payload: N bytes]`, where N depends on the CID and on the
//! direction of the frame:
//!
//! ```text
//! CID   name          uplink   downlink
//! 0x02  LinkCheck     0        2
//! 0x03  LinkADR       1        4
//! 0x04  DutyCycle     0        1
//! 0x05  RXParamSetup  1        4
//! 0x06  DevStatus     2        0
//! 0x07  NewChannel    1        5
//! 0x08  RXTimingSetup 0        1
//! 0x09  TxParamSetup  0        1
//! 0x0A  DlChannel     1        4
//! ```
//!
//! Requests flow downlink and answers uplink, except `LinkCheckReq` (uplink)
//! and `LinkCheckAns` (downlink).
//!
//! # LinkADRReq layout
//!
//! ```text
//! [DataRate:4 | TXPower:4][ChMask: 2 bytes LE][RFU:1 | ChMaskCntl:3 | NbTrans:4]
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CommandError, FrameError};

/// Data rate or power value meaning "keep the current setting".
pub const IGNORE_FIELD: u8 = 0x0F;

const CID_LINK_CHECK: u8 = 0x02;
const CID_LINK_ADR: u8 = 0x03;
const CID_DUTY_CYCLE: u8 = 0x04;
const CID_RX_PARAM_SETUP: u8 = 0x05;
const CID_DEV_STATUS: u8 = 0x06;
const CID_NEW_CHANNEL: u8 = 0x07;
const CID_RX_TIMING_SETUP: u8 = 0x08;
const CID_TX_PARAM_SETUP: u8 = 0x09;
const CID_DL_CHANNEL: u8 = 0x0A;

/// Direction of the frame carrying the commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Uplink,
    Downlink,
}

/// Configuration change request from the network (CID 0x03).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAdrReq {
    data_rate: u8,
    tx_power: u8,
    channel_mask: u16,
    channel_mask_control: u8,
    nb_trans: u8,
}

impl LinkAdrReq {
    /// Build a request, rejecting fields wider than their wire allotment.
    pub fn new(
        data_rate: u8,
        tx_power: u8,
        channel_mask: u16,
        channel_mask_control: u8,
        nb_trans: u8,
    ) -> Result<Self, CommandError> {
        CommandError::check("dataRate", data_rate.into(), 4)?;
        CommandError::check("txPower", tx_power.into(), 4)?;
        CommandError::check("chMaskCntl", channel_mask_control.into(), 3)?;
        CommandError::check("nbTrans", nb_trans.into(), 4)?;
        Ok(Self {
            data_rate,
            tx_power,
            channel_mask,
            channel_mask_control,
            nb_trans,
        })
    }

    /// Request enabling exactly `channels` (ChMaskCntl 0).
    pub fn for_channels(
        data_rate: u8,
        tx_power: u8,
        channels: &[usize],
        nb_trans: u8,
    ) -> Result<Self, CommandError> {
        let mut mask = 0u16;
        for &channel in channels {
            CommandError::check("channel", channel as u32, 4)?;
            mask |= 1 << channel;
        }
        Self::new(data_rate, tx_power, mask, 0, nb_trans)
    }

    pub fn data_rate(&self) -> u8 {
        self.data_rate
    }

    pub fn tx_power(&self) -> u8 {
        self.tx_power
    }

    pub fn channel_mask(&self) -> u16 {
        self.channel_mask
    }

    pub fn channel_mask_control(&self) -> u8 {
        self.channel_mask_control
    }

    pub fn nb_trans(&self) -> u8 {
        self.nb_trans
    }

    /// Slot indices whose mask bit is set.
    pub fn enabled_channels(&self) -> Vec<usize> {
        (0..16).filter(|i| self.channel_mask & (1 << i) != 0).collect()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.data_rate << 4 | self.tx_power);
        out.extend_from_slice(&self.channel_mask.to_le_bytes());
        out.push(self.channel_mask_control << 4 | self.nb_trans);
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            data_rate: bytes[0] >> 4,
            tx_power: bytes[0] & 0x0F,
            channel_mask: u16::from_le_bytes([bytes[1], bytes[2]]),
            channel_mask_control: (bytes[3] >> 4) & 0x07,
            nb_trans: bytes[3] & 0x0F,
        }
    }
}

/// Per-field answer to a [`LinkAdrReq`] (CID 0x03).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkAdrAns {
    pub power_ack: bool,
    pub data_rate_ack: bool,
    pub channel_mask_ack: bool,
}

impl LinkAdrAns {
    pub fn all_accepted(&self) -> bool {
        self.power_ack && self.data_rate_ack && self.channel_mask_ack
    }

    fn to_byte(self) -> u8 {
        (self.power_ack as u8) << 2 | (self.data_rate_ack as u8) << 1 | self.channel_mask_ack as u8
    }

    fn from_byte(byte: u8) -> Self {
        Self {
            power_ack: byte & 0b100 != 0,
            data_rate_ack: byte & 0b010 != 0,
            channel_mask_ack: byte & 0b001 != 0,
        }
    }
}

/// RX window configuration request (CID 0x05).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxParamSetupReq {
    rx1_dr_offset: u8,
    rx2_data_rate: u8,
    frequency_hz: u32,
}

impl RxParamSetupReq {
    pub fn new(rx1_dr_offset: u8, rx2_data_rate: u8, frequency_hz: u32) -> Result<Self, CommandError> {
        CommandError::check("rx1DrOffset", rx1_dr_offset.into(), 3)?;
        CommandError::check("rx2DataRate", rx2_data_rate.into(), 4)?;
        CommandError::check("frequency", frequency_hz / 100, 24)?;
        Ok(Self {
            rx1_dr_offset,
            rx2_data_rate,
            frequency_hz,
        })
    }

    pub fn rx1_dr_offset(&self) -> u8 {
        self.rx1_dr_offset
    }

    pub fn rx2_data_rate(&self) -> u8 {
        self.rx2_data_rate
    }

    pub fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }
}

/// Per-field answer to an [`RxParamSetupReq`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RxParamSetupAns {
    pub rx1_dr_offset_ack: bool,
    pub rx2_data_rate_ack: bool,
    pub channel_ack: bool,
}

/// Channel definition or removal request (CID 0x07).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChannelReq {
    channel_index: u8,
    frequency_hz: u32,
    min_data_rate: u8,
    max_data_rate: u8,
}

impl NewChannelReq {
    /// A frequency of zero asks the device to drop the channel.
    pub fn new(
        channel_index: u8,
        frequency_hz: u32,
        min_data_rate: u8,
        max_data_rate: u8,
    ) -> Result<Self, CommandError> {
        CommandError::check("frequency", frequency_hz / 100, 24)?;
        CommandError::check("minDataRate", min_data_rate.into(), 4)?;
        CommandError::check("maxDataRate", max_data_rate.into(), 4)?;
        Ok(Self {
            channel_index,
            frequency_hz,
            min_data_rate,
            max_data_rate,
        })
    }

    pub fn channel_index(&self) -> u8 {
        self.channel_index
    }

    pub fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }

    pub fn min_data_rate(&self) -> u8 {
        self.min_data_rate
    }

    pub fn max_data_rate(&self) -> u8 {
        self.max_data_rate
    }
}

/// All MAC commands known to the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacCommand {
    LinkCheckReq,
    /// `margin` is dB above the demodulation floor of the last uplink.
    LinkCheckAns { margin: u8, gateway_count: u8 },
    LinkAdrReq(LinkAdrReq),
    LinkAdrAns(LinkAdrAns),
    /// New aggregated duty cycle is `1 / 2^max_duty_cycle`.
    DutyCycleReq { max_duty_cycle: u8 },
    DutyCycleAns,
    RxParamSetupReq(RxParamSetupReq),
    RxParamSetupAns(RxParamSetupAns),
    DevStatusReq,
    /// `margin` holds a 6-bit two's complement SNR, see [`encode_margin`].
    DevStatusAns { battery: u8, margin: u8 },
    NewChannelReq(NewChannelReq),
    NewChannelAns { data_rate_range_ok: bool, frequency_ok: bool },
    /// Recognised CID the device does not act on.
    Unsupported { cid: u8, payload: Vec<u8> },
}

impl MacCommand {
    /// Command identifier.
    pub fn cid(&self) -> u8 {
        match self {
            Self::LinkCheckReq | Self::LinkCheckAns { .. } => CID_LINK_CHECK,
            Self::LinkAdrReq(_) | Self::LinkAdrAns(_) => CID_LINK_ADR,
            Self::DutyCycleReq { .. } | Self::DutyCycleAns => CID_DUTY_CYCLE,
            Self::RxParamSetupReq(_) | Self::RxParamSetupAns(_) => CID_RX_PARAM_SETUP,
            Self::DevStatusReq | Self::DevStatusAns { .. } => CID_DEV_STATUS,
            Self::NewChannelReq(_) | Self::NewChannelAns { .. } => CID_NEW_CHANNEL,
            Self::Unsupported { cid, .. } => *cid,
        }
    }

    /// Encoded size including the CID byte.
    pub fn encoded_len(&self) -> usize {
        let mut out = Vec::new();
        self.encode(&mut out);
        out.len()
    }

    /// Append CID and payload to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.cid());
        match self {
            Self::LinkCheckReq | Self::DutyCycleAns | Self::DevStatusReq => {}
            Self::LinkCheckAns {
                margin,
                gateway_count,
            } => out.extend_from_slice(&[*margin, *gateway_count]),
            Self::LinkAdrReq(req) => req.encode(out),
            Self::LinkAdrAns(ans) => out.push(ans.to_byte()),
            Self::DutyCycleReq { max_duty_cycle } => out.push(*max_duty_cycle & 0x0F),
            Self::RxParamSetupReq(req) => {
                out.push((req.rx1_dr_offset & 0x07) << 4 | (req.rx2_data_rate & 0x0F));
                push_frequency(out, req.frequency_hz);
            }
            Self::RxParamSetupAns(ans) => out.push(
                (ans.rx1_dr_offset_ack as u8) << 2
                    | (ans.rx2_data_rate_ack as u8) << 1
                    | ans.channel_ack as u8,
            ),
            Self::DevStatusAns { battery, margin } => out.extend_from_slice(&[*battery, *margin & 0x3F]),
            Self::NewChannelReq(req) => {
                out.push(req.channel_index);
                push_frequency(out, req.frequency_hz);
                out.push(req.max_data_rate << 4 | req.min_data_rate);
            }
            Self::NewChannelAns {
                data_rate_range_ok,
                frequency_ok,
            } => out.push((*data_rate_range_ok as u8) << 1 | *frequency_ok as u8),
            Self::Unsupported { payload, .. } => out.extend_from_slice(payload),
        }
    }

    /// Encode a command list into FOpts bytes.
    pub fn encode_all(commands: &[MacCommand]) -> Vec<u8> {
        let mut out = Vec::new();
        for command in commands {
            command.encode(&mut out);
        }
        out
    }

    /// Decode every command in an FOpts field.
    pub fn decode_all(mut bytes: &[u8], direction: Direction) -> Result<Vec<MacCommand>, FrameError> {
        let mut commands = Vec::new();
        while let Some((&cid, rest)) = bytes.split_first() {
            let len = payload_len(cid, direction).ok_or(FrameError::UnknownCommand(cid))?;
            if rest.len() < len {
                return Err(FrameError::Truncated {
                    needed: len,
                    available: rest.len(),
                });
            }
            let (payload, tail) = rest.split_at(len);
            commands.push(Self::decode_one(cid, payload, direction));
            bytes = tail;
        }
        Ok(commands)
    }

    // `payload` already has the length `payload_len` reported for this CID.
    fn decode_one(cid: u8, payload: &[u8], direction: Direction) -> MacCommand {
        use Direction::*;
        match (cid, direction) {
            (CID_LINK_CHECK, Uplink) => Self::LinkCheckReq,
            (CID_LINK_CHECK, Downlink) => Self::LinkCheckAns {
                margin: payload[0],
                gateway_count: payload[1],
            },
            (CID_LINK_ADR, Downlink) => Self::LinkAdrReq(LinkAdrReq::decode(payload)),
            (CID_LINK_ADR, Uplink) => Self::LinkAdrAns(LinkAdrAns::from_byte(payload[0])),
            (CID_DUTY_CYCLE, Downlink) => Self::DutyCycleReq {
                max_duty_cycle: payload[0] & 0x0F,
            },
            (CID_DUTY_CYCLE, Uplink) => Self::DutyCycleAns,
            (CID_RX_PARAM_SETUP, Downlink) => Self::RxParamSetupReq(RxParamSetupReq {
                rx1_dr_offset: (payload[0] >> 4) & 0x07,
                rx2_data_rate: payload[0] & 0x0F,
                frequency_hz: read_frequency(&payload[1..4]),
            }),
            (CID_RX_PARAM_SETUP, Uplink) => Self::RxParamSetupAns(RxParamSetupAns {
                rx1_dr_offset_ack: payload[0] & 0b100 != 0,
                rx2_data_rate_ack: payload[0] & 0b010 != 0,
                channel_ack: payload[0] & 0b001 != 0,
            }),
            (CID_DEV_STATUS, Downlink) => Self::DevStatusReq,
            (CID_DEV_STATUS, Uplink) => Self::DevStatusAns {
                battery: payload[0],
                margin: payload[1] & 0x3F,
            },
            (CID_NEW_CHANNEL, Downlink) => Self::NewChannelReq(NewChannelReq {
                channel_index: payload[0],
                frequency_hz: read_frequency(&payload[1..4]),
                min_data_rate: payload[4] & 0x0F,
                max_data_rate: payload[4] >> 4,
            }),
            (CID_NEW_CHANNEL, Uplink) => Self::NewChannelAns {
                data_rate_range_ok: payload[0] & 0b10 != 0,
                frequency_ok: payload[0] & 0b01 != 0,
            },
            _ => Self::Unsupported {
                cid,
                payload: payload.to_vec(),
            },
        }
    }
}

fn payload_len(cid: u8, direction: Direction) -> Option<usize> {
    let (uplink, downlink) = match cid {
        CID_LINK_CHECK => (0, 2),
        CID_LINK_ADR => (1, 4),
        CID_DUTY_CYCLE => (0, 1),
        CID_RX_PARAM_SETUP => (1, 4),
        CID_DEV_STATUS => (2, 0),
        CID_NEW_CHANNEL => (1, 5),
        CID_RX_TIMING_SETUP => (0, 1),
        CID_TX_PARAM_SETUP => (0, 1),
        CID_DL_CHANNEL => (1, 4),
        _ => return None,
    };
    Some(match direction {
        Direction::Uplink => uplink,
        Direction::Downlink => downlink,
    })
}

// Frequencies travel as 24-bit little-endian multiples of 100 Hz.
fn push_frequency(out: &mut Vec<u8>, frequency_hz: u32) {
    let bytes = (frequency_hz / 100).to_le_bytes();
    out.extend_from_slice(&bytes[..3]);
}

fn read_frequency(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]) * 100
}

/// Encode an SNR in dB as the 6-bit two's complement DevStatusAns margin.
///
/// The value is rounded to the nearest integer and clamped to [-32, 31].
pub fn encode_margin(snr_db: f64) -> u8 {
    let clamped = snr_db.round().clamp(-32.0, 31.0) as i8;
    (clamped as u8) & 0x3F
}

/// Inverse of [`encode_margin`].
pub fn decode_margin(margin: u8) -> i8 {
    // Shift the sign bit of the 6-bit field into bit 7, then back.
    ((margin << 2) as i8) >> 2
}

/// How a device is powered, as reported in DevStatusAns.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSource {
    /// Mains or other external supply
    #[default]
    External,
    /// Battery with remaining energy fraction in [0, 1]
    Battery(f64),
    /// Battery whose level cannot be measured
    Unknown,
}

impl PowerSource {
    /// DevStatusAns battery byte: 0 external, 1..=254 level, 255 unknown.
    pub fn battery_byte(self) -> u8 {
        match self {
            Self::External => 0,
            Self::Battery(fraction) => (fraction.clamp(0.0, 1.0) * 253.0 + 1.5) as u8,
            Self::Unknown => 255,
        }
    }
}

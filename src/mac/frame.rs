//! LoRaWAN data frame headers.
//!
//! ```text
//! PHYPayload = MHDR | MACPayload | MIC
//! MHDR       = [MType:3 | RFU:3 | Major:2]
//! MACPayload = FHDR | FPort? | FRMPayload
//! FHDR       = DevAddr (4 LE) | FCtrl (1) | FCnt (2 LE) | FOpts (0..15)
//! FCtrl      = [ADR | ADRACKReq | ACK | FPending | FOptsLen:4]
//! ```
//!
//! The MIC is not computed. Its four bytes are counted when sizing a frame
//! for time-on-air.

use std::fmt;

use crate::error::FrameError;

use super::command::{Direction, MacCommand};

/// Message integrity code length, counted for airtime only.
pub const MIC_LEN: usize = 4;

/// FOpts carries at most 15 bytes of MAC commands.
pub const MAX_FOPTS_LEN: usize = 15;

const FCTRL_ADR: u8 = 0x80;
const FCTRL_ADR_ACK_REQ: u8 = 0x40;
const FCTRL_ACK: u8 = 0x20;
const FCTRL_FPENDING: u8 = 0x10;

/// 32-bit network address of an end device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DeviceAddress(pub u32);

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// MHDR message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MType {
    UnconfirmedDataUp,
    UnconfirmedDataDown,
    ConfirmedDataUp,
    ConfirmedDataDown,
}

impl MType {
    fn bits(self) -> u8 {
        match self {
            Self::UnconfirmedDataUp => 0b010,
            Self::UnconfirmedDataDown => 0b011,
            Self::ConfirmedDataUp => 0b100,
            Self::ConfirmedDataDown => 0b101,
        }
    }

    fn from_bits(bits: u8) -> Result<Self, FrameError> {
        match bits {
            0b010 => Ok(Self::UnconfirmedDataUp),
            0b011 => Ok(Self::UnconfirmedDataDown),
            0b100 => Ok(Self::ConfirmedDataUp),
            0b101 => Ok(Self::ConfirmedDataDown),
            other => Err(FrameError::UnsupportedMessageType(other)),
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            Self::UnconfirmedDataUp | Self::ConfirmedDataUp => Direction::Uplink,
            Self::UnconfirmedDataDown | Self::ConfirmedDataDown => Direction::Downlink,
        }
    }

    pub fn is_confirmed(self) -> bool {
        matches!(self, Self::ConfirmedDataUp | Self::ConfirmedDataDown)
    }
}

/// MHDR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacHeader {
    pub mtype: MType,
    pub major: u8,
}

impl MacHeader {
    /// LoRaWAN R1 header for the given message type.
    pub fn new(mtype: MType) -> Self {
        Self { mtype, major: 0 }
    }

    fn to_byte(self) -> u8 {
        self.mtype.bits() << 5 | (self.major & 0x03)
    }

    fn from_byte(byte: u8) -> Result<Self, FrameError> {
        Ok(Self {
            mtype: MType::from_bits(byte >> 5)?,
            major: byte & 0x03,
        })
    }
}

/// FHDR.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameHeader {
    pub address: DeviceAddress,
    pub adr: bool,
    pub adr_ack_req: bool,
    pub ack: bool,
    /// Only meaningful downlink
    pub f_pending: bool,
    pub f_cnt: u16,
    pub commands: Vec<MacCommand>,
}

impl FrameHeader {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), FrameError> {
        let fopts = MacCommand::encode_all(&self.commands);
        if fopts.len() > MAX_FOPTS_LEN {
            return Err(FrameError::FOptsTooLong(fopts.len()));
        }
        let mut fctrl = fopts.len() as u8;
        if self.adr {
            fctrl |= FCTRL_ADR;
        }
        if self.adr_ack_req {
            fctrl |= FCTRL_ADR_ACK_REQ;
        }
        if self.ack {
            fctrl |= FCTRL_ACK;
        }
        if self.f_pending {
            fctrl |= FCTRL_FPENDING;
        }
        out.extend_from_slice(&self.address.0.to_le_bytes());
        out.push(fctrl);
        out.extend_from_slice(&self.f_cnt.to_le_bytes());
        out.extend_from_slice(&fopts);
        Ok(())
    }

    fn decode(bytes: &[u8], direction: Direction) -> Result<(Self, usize), FrameError> {
        need(bytes, 7)?;
        let address = DeviceAddress(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
        let fctrl = bytes[4];
        let f_cnt = u16::from_le_bytes([bytes[5], bytes[6]]);
        let fopts_len = (fctrl & 0x0F) as usize;
        need(bytes, 7 + fopts_len)?;
        let commands = MacCommand::decode_all(&bytes[7..7 + fopts_len], direction)?;
        let header = Self {
            address,
            adr: fctrl & FCTRL_ADR != 0,
            adr_ack_req: fctrl & FCTRL_ADR_ACK_REQ != 0,
            ack: fctrl & FCTRL_ACK != 0,
            f_pending: direction == Direction::Downlink && fctrl & FCTRL_FPENDING != 0,
            f_cnt,
            commands,
        };
        Ok((header, 7 + fopts_len))
    }
}

fn need(bytes: &[u8], needed: usize) -> Result<(), FrameError> {
    if bytes.len() < needed {
        return Err(FrameError::Truncated {
            needed,
            available: bytes.len(),
        });
    }
    Ok(())
}

/// A complete data frame without MIC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub mac_header: MacHeader,
    pub frame_header: FrameHeader,
    /// Absent when the frame carries no application payload
    pub f_port: Option<u8>,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let mut out = Vec::with_capacity(8 + self.payload.len());
        out.push(self.mac_header.to_byte());
        self.frame_header.encode(&mut out)?;
        if let Some(port) = self.f_port {
            out.push(port);
            out.extend_from_slice(&self.payload);
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        need(bytes, 1)?;
        let mac_header = MacHeader::from_byte(bytes[0])?;
        let (frame_header, used) = FrameHeader::decode(&bytes[1..], mac_header.mtype.direction())?;
        let rest = &bytes[1 + used..];
        let (f_port, payload) = match rest.split_first() {
            Some((&port, payload)) => (Some(port), payload.to_vec()),
            None => (None, Vec::new()),
        };
        Ok(Self {
            mac_header,
            frame_header,
            f_port,
            payload,
        })
    }

    /// MACPayload size: everything between MHDR and MIC.
    pub fn mac_payload_len(&self) -> Result<usize, FrameError> {
        Ok(self.encode()?.len() - 1)
    }

    /// PHY payload size used for time-on-air.
    pub fn phy_payload_len(&self) -> Result<usize, FrameError> {
        Ok(self.encode()?.len() + MIC_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::command::LinkAdrAns;

    fn uplink() -> Frame {
        Frame {
            mac_header: MacHeader::new(MType::ConfirmedDataUp),
            frame_header: FrameHeader {
                address: DeviceAddress(0x2601_1234),
                adr: true,
                f_cnt: 0x0102,
                commands: vec![MacCommand::LinkAdrAns(LinkAdrAns {
                    power_ack: true,
                    data_rate_ack: true,
                    channel_mask_ack: true,
                })],
                ..Default::default()
            },
            f_port: Some(1),
            payload: vec![0xAA; 10],
        }
    }

    #[test]
    fn test_uplink_byte_layout() {
        let bytes = uplink().encode().unwrap();
        assert_eq!(bytes[0], 0x80, "confirmed data up, major 0");
        assert_eq!(&bytes[1..5], &[0x34, 0x12, 0x01, 0x26]);
        assert_eq!(bytes[5], 0x80 | 2, "ADR bit and FOptsLen 2");
        assert_eq!(&bytes[6..8], &[0x02, 0x01]);
        assert_eq!(&bytes[8..10], &[0x03, 0x07]);
        assert_eq!(bytes[10], 1);
        assert_eq!(bytes.len(), 11 + 10);
    }

    #[test]
    fn test_decode_restores_frame() {
        let frame = uplink();
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_downlink_without_port() {
        let frame = Frame {
            mac_header: MacHeader::new(MType::UnconfirmedDataDown),
            frame_header: FrameHeader {
                address: DeviceAddress(7),
                ack: true,
                f_pending: true,
                commands: vec![MacCommand::DevStatusReq],
                ..Default::default()
            },
            f_port: None,
            payload: Vec::new(),
        };
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes[5], FCTRL_ACK | FCTRL_FPENDING | 1);
        let decoded = Frame::decode(&bytes).unwrap();
        assert!(decoded.frame_header.ack);
        assert!(decoded.frame_header.f_pending);
        assert_eq!(decoded.f_port, None);
        assert_eq!(decoded.frame_header.commands, vec![MacCommand::DevStatusReq]);
    }

    #[test]
    fn test_fopts_overflow_is_rejected() {
        let mut frame = uplink();
        frame.frame_header.commands = vec![MacCommand::DevStatusAns { battery: 0, margin: 0 }; 6];
        assert_eq!(frame.encode().unwrap_err(), FrameError::FOptsTooLong(18));
    }

    #[test]
    fn test_truncated_and_unsupported_frames() {
        assert!(matches!(
            Frame::decode(&[0x80, 0x00]),
            Err(FrameError::Truncated { .. })
        ));
        // Join request MType
        assert_eq!(
            Frame::decode(&[0x00; 12]).unwrap_err(),
            FrameError::UnsupportedMessageType(0)
        );
    }

    #[test]
    fn test_payload_sizes() {
        let frame = uplink();
        assert_eq!(frame.mac_payload_len().unwrap(), 20);
        assert_eq!(frame.phy_payload_len().unwrap(), 25);
    }

    #[test]
    fn test_address_display() {
        assert_eq!(DeviceAddress(0xABC).to_string(), "00000ABC");
    }
}

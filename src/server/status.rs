//! What the network server knows about one end device.

use crate::lora::{region, CodingRate};
use crate::mac::{DeviceAddress, Frame, FrameHeader, MType, MacHeader};

/// Radio settings of a received uplink, as observed by the network.
#[derive(Debug, Clone, PartialEq)]
pub struct TxParams {
    pub spreading_factor: u8,
    pub tx_power_dbm: f64,
    pub data_rate: u8,
    pub channel_index: usize,
    pub frequency_hz: u32,
    pub coding_rate: CodingRate,
}

/// Downlink being assembled for one device.
///
/// Components add to it while the reply is prepared. It is only sent when
/// some component set `needs_reply`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub needs_reply: bool,
    pub mac_header: MacHeader,
    pub frame_header: FrameHeader,
    /// Coding rate to apply on the device alongside the frame. LoRaWAN has no
    /// command for it, so it travels out of band.
    pub coding_rate_override: Option<CodingRate>,
}

impl Reply {
    pub fn new(address: DeviceAddress) -> Self {
        Self {
            needs_reply: false,
            mac_header: MacHeader::new(MType::UnconfirmedDataDown),
            frame_header: FrameHeader {
                address,
                ..Default::default()
            },
            coding_rate_override: None,
        }
    }

    /// Frame to put on the air, without application payload.
    pub fn to_frame(&self) -> Frame {
        Frame {
            mac_header: self.mac_header,
            frame_header: self.frame_header.clone(),
            f_port: None,
            payload: Vec::new(),
        }
    }
}

/// Per-device record kept by the network server.
#[derive(Debug, Clone)]
pub struct EndDeviceStatus {
    address: DeviceAddress,
    last_uplink: Option<Frame>,
    last_tx_params: Option<TxParams>,
    last_snr_db: f64,
    received_packets: u64,
    downlink_f_cnt: u16,
    reply: Reply,
}

impl EndDeviceStatus {
    pub fn new(address: DeviceAddress) -> Self {
        Self {
            address,
            last_uplink: None,
            last_tx_params: None,
            last_snr_db: 0.0,
            received_packets: 0,
            downlink_f_cnt: 0,
            reply: Reply::new(address),
        }
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    pub fn last_uplink(&self) -> Option<&Frame> {
        self.last_uplink.as_ref()
    }

    pub fn last_tx_params(&self) -> Option<&TxParams> {
        self.last_tx_params.as_ref()
    }

    pub fn last_snr_db(&self) -> f64 {
        self.last_snr_db
    }

    /// SNR above the demodulation floor of the last uplink's spreading factor.
    pub fn last_link_margin_db(&self) -> Option<f64> {
        self.last_tx_params
            .as_ref()
            .map(|tx| self.last_snr_db - region::required_snr_db(tx.spreading_factor))
    }

    pub fn received_packets(&self) -> u64 {
        self.received_packets
    }

    /// Store a new uplink and start an empty reply for it.
    pub fn record_uplink(&mut self, frame: Frame, tx_params: TxParams, snr_db: f64) {
        self.last_uplink = Some(frame);
        self.last_tx_params = Some(tx_params);
        self.last_snr_db = snr_db;
        self.received_packets += 1;
        self.reply = Reply::new(self.address);
    }

    pub fn reply(&self) -> &Reply {
        &self.reply
    }

    pub fn reply_mut(&mut self) -> &mut Reply {
        &mut self.reply
    }

    /// Number the reply and hand it out as a frame.
    pub(crate) fn take_reply_frame(&mut self) -> (Frame, Option<CodingRate>) {
        self.downlink_f_cnt = self.downlink_f_cnt.wrapping_add(1);
        self.reply.frame_header.f_cnt = self.downlink_f_cnt;
        let frame = self.reply.to_frame();
        let coding_rate = self.reply.coding_rate_override;
        self.reply = Reply::new(self.address);
        (frame, coding_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx() -> TxParams {
        TxParams {
            spreading_factor: 9,
            tx_power_dbm: 14.0,
            data_rate: 3,
            channel_index: 0,
            frequency_hz: 868_100_000,
            coding_rate: CodingRate::Cr4_5,
        }
    }

    #[test]
    fn test_new_uplink_resets_reply() {
        let address = DeviceAddress(0x42);
        let mut status = EndDeviceStatus::new(address);
        status.reply_mut().needs_reply = true;
        status.reply_mut().frame_header.ack = true;

        let frame = Reply::new(address).to_frame();
        status.record_uplink(frame, tx(), -3.0);

        assert!(!status.reply().needs_reply);
        assert!(!status.reply().frame_header.ack);
        assert_eq!(status.reply().frame_header.address, address);
        assert_eq!(status.received_packets(), 1);
        assert_eq!(status.last_link_margin_db(), Some(9.5));
    }

    #[test]
    fn test_reply_frames_are_numbered() {
        let mut status = EndDeviceStatus::new(DeviceAddress(1));
        status.reply_mut().coding_rate_override = Some(CodingRate::Cr4_7);
        let (first, coding_rate) = status.take_reply_frame();
        let (second, _) = status.take_reply_frame();

        assert_eq!(first.frame_header.f_cnt, 1);
        assert_eq!(second.frame_header.f_cnt, 2);
        assert_eq!(first.mac_header.mtype, MType::UnconfirmedDataDown);
        assert_eq!(coding_rate, Some(CodingRate::Cr4_7));
        assert_eq!(status.reply().coding_rate_override, None);
    }
}

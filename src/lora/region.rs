//! EU868 regional parameters.
//!
//! Only the single region modeled by the simulator is described here: the
//! data rate table, the transmit power table, the maximum MAC payload per
//! data rate, the three mandatory join channels and the regulatory sub-bands.

use super::LoRaParams;

/// Number of logical channel slots addressable by a 16-bit channel mask.
pub const MAX_CHANNELS: usize = 16;

/// Highest LoRa data rate index in EU868 (DR7 is FSK and not modeled).
pub const MAX_DATA_RATE: u8 = 6;

/// Highest valid TX power index (14 dBm down to 0 dBm in 2 dB steps).
pub const MAX_TX_POWER_INDEX: u8 = 7;

/// Maximum EIRP in dBm, corresponding to TX power index 0.
pub const MAX_EIRP_DBM: f64 = 14.0;

/// Lowest and highest frequency allowed for a channel, in Hz.
pub const MIN_FREQUENCY_HZ: u32 = 863_000_000;
pub const MAX_FREQUENCY_HZ: u32 = 870_000_000;

/// Default RX2 window parameters.
pub const DEFAULT_RX2_FREQUENCY_HZ: u32 = 869_525_000;
pub const DEFAULT_RX2_DATA_RATE: u8 = 0;

/// Frequencies of the three mandatory channels every device knows at boot.
pub const DEFAULT_CHANNEL_FREQUENCIES_HZ: [u32; 3] = [868_100_000, 868_300_000, 868_500_000];

/// Spreading factors that ADR may choose from.
pub const SPREADING_FACTORS: std::ops::RangeInclusive<u8> = 7..=12;

// DR0..=DR6: (spreading factor, bandwidth)
const DATA_RATES: [(u8, u32); 7] = [
    (12, 125_000),
    (11, 125_000),
    (10, 125_000),
    (9, 125_000),
    (8, 125_000),
    (7, 125_000),
    (7, 250_000),
];

// Maximum MAC payload (FHDR + FPort + FRMPayload) per data rate.
const MAX_MAC_PAYLOAD: [usize; 8] = [59, 59, 59, 123, 230, 230, 230, 230];

/// Spreading factor for a data rate, or `None` if the data rate is undefined.
pub fn sf_for_data_rate(data_rate: u8) -> Option<u8> {
    DATA_RATES.get(data_rate as usize).map(|&(sf, _)| sf)
}

/// Bandwidth in Hz for a data rate.
pub fn bandwidth_for_data_rate(data_rate: u8) -> Option<u32> {
    DATA_RATES.get(data_rate as usize).map(|&(_, bw)| bw)
}

/// 125 kHz data rate that uses the given spreading factor (SF12 = DR0 ... SF7 = DR5).
pub fn data_rate_for_sf(spreading_factor: u8) -> Option<u8> {
    match spreading_factor {
        7..=12 => Some(12 - spreading_factor),
        _ => None,
    }
}

/// Modulation parameters for an uplink at the given data rate.
pub fn lora_params_for_data_rate(data_rate: u8) -> Option<LoRaParams> {
    let (spreading_factor, bandwidth_hz) = *DATA_RATES.get(data_rate as usize)?;
    Some(LoRaParams {
        spreading_factor,
        bandwidth_hz,
        ..Default::default()
    })
}

/// TX power in dBm for a power index; `None` for indices outside 0..=7.
pub fn tx_power_dbm(index: u8) -> Option<f64> {
    if index > MAX_TX_POWER_INDEX {
        return None;
    }
    Some(MAX_EIRP_DBM - 2.0 * index as f64)
}

/// Nearest TX power index for a dBm value, clamped to the table.
pub fn tx_power_index(dbm: f64) -> u8 {
    let index = ((MAX_EIRP_DBM - dbm) / 2.0).round();
    index.clamp(0.0, MAX_TX_POWER_INDEX as f64) as u8
}

/// Maximum MAC payload size in bytes at a data rate.
pub fn max_mac_payload(data_rate: u8) -> Option<usize> {
    MAX_MAC_PAYLOAD.get(data_rate as usize).copied()
}

/// Whether a frequency lies inside the EU868 band.
pub fn is_valid_frequency(frequency_hz: u32) -> bool {
    (MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&frequency_hz)
}

/// Minimum SNR in dB needed to demodulate a given spreading factor.
pub fn required_snr_db(spreading_factor: u8) -> f64 {
    match spreading_factor {
        7 => -7.5,
        8 => -10.0,
        9 => -12.5,
        10 => -15.0,
        11 => -17.5,
        _ => -20.0,
    }
}

/// Regulatory sub-band with its own duty cycle and power ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct SubBandSpec {
    pub first_frequency_hz: u32,
    pub last_frequency_hz: u32,
    /// Allowed fraction of time on air (0.01 = 1%)
    pub duty_cycle: f64,
    pub max_tx_power_dbm: f64,
}

/// The three EU868 sub-bands used by the default and network-defined channels.
pub fn default_sub_bands() -> Vec<SubBandSpec> {
    vec![
        SubBandSpec {
            first_frequency_hz: 868_000_000,
            last_frequency_hz: 868_600_000,
            duty_cycle: 0.01,
            max_tx_power_dbm: 14.0,
        },
        SubBandSpec {
            first_frequency_hz: 868_700_000,
            last_frequency_hz: 869_200_000,
            duty_cycle: 0.001,
            max_tx_power_dbm: 14.0,
        },
        SubBandSpec {
            first_frequency_hz: 869_400_000,
            last_frequency_hz: 869_650_000,
            duty_cycle: 0.1,
            max_tx_power_dbm: 27.0,
        },
    ]
}

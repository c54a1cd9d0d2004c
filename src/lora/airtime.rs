//! LoRa time-on-air calculation.
//!
//! Calculates the transmission duration of a LoRa frame from payload size and
//! modulation parameters, using the Semtech preamble + payload symbol formula.
//! The same formula feeds both the duty-cycle bookkeeping of the end device
//! and the energy ordering of the ADR configuration space.
//!
//! # Example
//!
//! ```
//! use lorawan_adr_lite::lora::{calculate_airtime_us, LoRaParams};
//!
//! let params = LoRaParams::for_spreading_factor(9);
//! let airtime = calculate_airtime_us(20, &params);
//! println!("20-byte frame at SF9 takes {} us", airtime);
//! ```

use std::time::Duration;

/// Forward error correction rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum CodingRate {
    #[default]
    Cr4_5,
    Cr4_6,
    Cr4_7,
    Cr4_8,
}

impl CodingRate {
    pub const ALL: [CodingRate; 4] = [Self::Cr4_5, Self::Cr4_6, Self::Cr4_7, Self::Cr4_8];

    /// Denominator of the 4/x ratio (5-8).
    pub fn denominator(self) -> u8 {
        match self {
            Self::Cr4_5 => 5,
            Self::Cr4_6 => 6,
            Self::Cr4_7 => 7,
            Self::Cr4_8 => 8,
        }
    }
}

impl std::fmt::Display for CodingRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "4/{}", self.denominator())
    }
}

/// LoRa modulation parameters for airtime calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoRaParams {
    /// Spreading factor (7-12)
    pub spreading_factor: u8,
    /// Bandwidth in Hz (125000 or 250000 in EU868)
    pub bandwidth_hz: u32,
    /// Coding rate denominator (5-8 for 4/5 to 4/8)
    pub coding_rate: u8,
    /// Preamble length in symbols (LoRaWAN uses 8)
    pub preamble_symbols: u8,
    /// Whether explicit header mode is used
    pub explicit_header: bool,
    /// Whether CRC is enabled
    pub crc_enabled: bool,
}

impl Default for LoRaParams {
    /// LoRaWAN uplink defaults: SF7, 125 kHz, 4/5, explicit header, CRC on.
    fn default() -> Self {
        Self {
            spreading_factor: 7,
            bandwidth_hz: 125_000,
            coding_rate: 5,
            preamble_symbols: 8,
            explicit_header: true,
            crc_enabled: true,
        }
    }
}

impl LoRaParams {
    /// Default uplink parameters at the given spreading factor.
    pub fn for_spreading_factor(spreading_factor: u8) -> Self {
        Self {
            spreading_factor,
            ..Default::default()
        }
    }

    /// Same parameters with a different coding rate.
    pub fn with_coding_rate(self, coding_rate: CodingRate) -> Self {
        Self {
            coding_rate: coding_rate.denominator(),
            ..self
        }
    }

    /// Check if low data rate optimization should be enabled.
    ///
    /// Required when symbol time exceeds 16ms (SF11/SF12 at 125kHz).
    pub fn low_data_rate_optimize(&self) -> bool {
        self.symbol_duration_us() > 16_000
    }

    /// Calculate symbol duration in microseconds.
    pub fn symbol_duration_us(&self) -> u64 {
        // T_sym = 2^SF / BW
        let sf = self.spreading_factor as u64;
        let bw = self.bandwidth_hz as u64;
        if bw == 0 {
            return 0;
        }
        (1u64 << sf) * 1_000_000 / bw
    }
}

/// Calculate LoRa frame airtime in microseconds.
///
/// # Arguments
///
/// * `payload_bytes` - PHY payload size in bytes
/// * `params` - LoRa modulation parameters
pub fn calculate_airtime_us(payload_bytes: usize, params: &LoRaParams) -> u64 {
    let sf = params.spreading_factor as f64;
    let bw = params.bandwidth_hz as f64;

    if bw == 0.0 {
        return 0;
    }

    let t_sym_us = (2.0_f64.powf(sf) / bw) * 1_000_000.0;

    // Preamble duration: (preamble_symbols + 4.25) * symbol_duration
    let preamble = params.preamble_symbols as f64;
    let t_preamble_us = (preamble + 4.25) * t_sym_us;

    let de = if params.low_data_rate_optimize() {
        1.0
    } else {
        0.0
    };
    let h = if params.explicit_header { 0.0 } else { 1.0 };
    let crc_bits = if params.crc_enabled { 16.0 } else { 0.0 };

    // Numerator: 8*PL - 4*SF + 28 + 16*CRC - 20*H
    let pl = payload_bytes as f64;
    let numerator = 8.0 * pl - 4.0 * sf + 28.0 + crc_bits - 20.0 * h;

    // Denominator: 4 * (SF - 2*DE)
    let denominator = 4.0 * (sf - 2.0 * de);

    // Payload symbols = 8 + max(ceil(numerator/denominator) * CR, 0)
    let cr = params.coding_rate as f64;
    let payload_symbols = if denominator > 0.0 {
        8.0 + ((numerator / denominator).ceil() * cr).max(0.0)
    } else {
        8.0
    };

    let t_payload_us = payload_symbols * t_sym_us;

    (t_preamble_us + t_payload_us) as u64
}

/// Calculate airtime in milliseconds.
pub fn calculate_airtime_ms(payload_bytes: usize, params: &LoRaParams) -> f64 {
    calculate_airtime_us(payload_bytes, params) as f64 / 1000.0
}

/// Airtime as a [`Duration`], for scheduling in simulated time.
pub fn time_on_air(payload_bytes: usize, params: &LoRaParams) -> Duration {
    Duration::from_micros(calculate_airtime_us(payload_bytes, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_duration_sf7_125khz() {
        let params = LoRaParams::for_spreading_factor(7);
        // 2^7 / 125000 = 1.024 ms
        assert_eq!(params.symbol_duration_us(), 1024);
    }

    #[test]
    fn test_symbol_duration_sf12_125khz() {
        let params = LoRaParams::for_spreading_factor(12);
        assert_eq!(params.symbol_duration_us(), 32768);
    }

    #[test]
    fn test_low_data_rate_optimize_only_at_high_sf() {
        for sf in 7..=10 {
            assert!(!LoRaParams::for_spreading_factor(sf).low_data_rate_optimize());
        }
        assert!(LoRaParams::for_spreading_factor(11).low_data_rate_optimize());
        assert!(LoRaParams::for_spreading_factor(12).low_data_rate_optimize());

        // SF11 at 250kHz: 8.192ms, no LDRO
        let params = LoRaParams {
            spreading_factor: 11,
            bandwidth_hz: 250_000,
            ..Default::default()
        };
        assert!(!params.low_data_rate_optimize());

        // SF12 at 250kHz: 16.384ms, still above the threshold
        let params = LoRaParams {
            spreading_factor: 12,
            ..params
        };
        assert!(params.low_data_rate_optimize());
    }

    #[test]
    fn test_known_airtime_sf7_20_bytes() {
        // 20 bytes, SF7, 4/5: 8 + ceil(176/28)*5 = 43 payload symbols
        // (12.25 + 43) * 1.024ms = 56.576ms
        let params = LoRaParams::default();
        let airtime = calculate_airtime_us(20, &params);
        assert!(airtime.abs_diff(56_576) <= 1, "got {} us", airtime);
    }

    #[test]
    fn test_known_airtime_sf12_20_bytes() {
        // LDRO on: 8 + ceil(156/40)*5 = 28 payload symbols
        // (12.25 + 28) * 32.768ms = 1318.912ms
        let params = LoRaParams::for_spreading_factor(12);
        let airtime = calculate_airtime_us(20, &params);
        assert!(airtime.abs_diff(1_318_912) <= 1, "got {} us", airtime);
    }

    #[test]
    fn test_airtime_increases_with_sf() {
        let mut previous = 0;
        for sf in 7..=12 {
            let airtime = calculate_airtime_us(20, &LoRaParams::for_spreading_factor(sf));
            assert!(
                airtime > previous,
                "SF{} should take longer than SF{}: {} > {}",
                sf,
                sf - 1,
                airtime,
                previous
            );
            previous = airtime;
        }
    }

    #[test]
    fn test_airtime_increases_with_coding_rate() {
        let fast = LoRaParams {
            coding_rate: 5,
            ..Default::default()
        };
        let slow = LoRaParams {
            coding_rate: 8,
            ..Default::default()
        };
        assert!(calculate_airtime_us(20, &slow) > calculate_airtime_us(20, &fast));
    }

    #[test]
    fn test_coding_rate_enum_maps_to_denominator() {
        let params = LoRaParams::default().with_coding_rate(CodingRate::Cr4_8);
        assert_eq!(params.coding_rate, 8);
        assert_eq!(CodingRate::Cr4_6.to_string(), "4/6");
        assert!(CodingRate::Cr4_5 < CodingRate::Cr4_8);
    }

    #[test]
    fn test_implicit_header_is_shorter() {
        // SF7, 20 bytes: ceil(176/28) = 7 groups explicit, ceil(156/28) = 6 implicit
        let explicit = LoRaParams::for_spreading_factor(7);
        let implicit = LoRaParams {
            explicit_header: false,
            ..explicit
        };
        assert!(calculate_airtime_us(20, &implicit) < calculate_airtime_us(20, &explicit));
    }

    #[test]
    fn test_zero_bandwidth_is_safe() {
        let params = LoRaParams {
            bandwidth_hz: 0,
            ..Default::default()
        };
        assert_eq!(params.symbol_duration_us(), 0);
        assert_eq!(calculate_airtime_us(50, &params), 0);
    }

    #[test]
    fn test_duration_matches_us() {
        let params = LoRaParams::for_spreading_factor(10);
        assert_eq!(
            time_on_air(33, &params),
            Duration::from_micros(calculate_airtime_us(33, &params))
        );
        let ms = calculate_airtime_ms(33, &params);
        assert!((ms - calculate_airtime_us(33, &params) as f64 / 1000.0).abs() < 0.001);
    }
}

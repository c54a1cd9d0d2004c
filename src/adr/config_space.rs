//! Energy-ordered configuration space.
//!
//! Every combination of the adjustable transmission parameters is generated
//! once, costed as `power_mW × time_on_air`, and sorted ascending. Index 0 is
//! the cheapest (least robust) configuration, the last index the most
//! expensive. Indices are the only handle the rest of ADR-Lite uses.
//!
//! Generation order is fixed (SF ascending, power descending, channel
//! ascending, coding rate ascending) and the sort is stable, so equal-cost
//! configurations always keep that order.

use std::fmt;
use std::ops::Index;

use log::{debug, info};

use crate::config::AdrLiteConfig;
use crate::lora::region::{self, DEFAULT_CHANNEL_FREQUENCIES_HZ, SPREADING_FACTORS};
use crate::lora::{calculate_airtime_ms, CodingRate, LoRaParams};

/// EU868 power levels ADR-Lite chooses from, highest first.
pub const TX_POWER_LEVELS_DBM: [f64; 7] = [14.0, 12.0, 10.0, 8.0, 6.0, 4.0, 2.0];

/// One point of the configuration space.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub spreading_factor: u8,
    pub tx_power_dbm: f64,
    /// Single channel slot, when channels are adjusted
    pub channel: Option<u8>,
    /// Coding rate, when coding rates are adjusted
    pub coding_rate: Option<CodingRate>,
    /// Relative energy per frame, only meaningful for ordering
    pub energy: f64,
}

impl Configuration {
    /// 125 kHz data rate carrying this spreading factor.
    pub fn data_rate(&self) -> u8 {
        region::data_rate_for_sf(self.spreading_factor).unwrap_or(0)
    }

    pub fn tx_power_index(&self) -> u8 {
        region::tx_power_index(self.tx_power_dbm)
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SF{} {} dBm", self.spreading_factor, self.tx_power_dbm)?;
        if let Some(channel) = self.channel {
            write!(f, " ch{}", channel)?;
        }
        if let Some(coding_rate) = self.coding_rate {
            write!(f, " CR {}", coding_rate)?;
        }
        Ok(())
    }
}

/// Energy index of a frame: transmit power in mW times time on air in ms.
pub fn energy_index(
    spreading_factor: u8,
    tx_power_dbm: f64,
    coding_rate: CodingRate,
    payload_bytes: usize,
) -> f64 {
    let params = LoRaParams::for_spreading_factor(spreading_factor).with_coding_rate(coding_rate);
    let time_on_air_ms = calculate_airtime_ms(payload_bytes, &params);
    let power_mw = 10f64.powf(tx_power_dbm / 10.0);
    time_on_air_ms * power_mw
}

/// All configurations, sorted by energy.
#[derive(Debug, Clone)]
pub struct ConfigurationSpace {
    configurations: Vec<Configuration>,
}

impl ConfigurationSpace {
    /// Build the space for the parameter classes enabled in `config`.
    ///
    /// Spreading factor and power are always part of the product. Power
    /// stays in even when it is not adjusted; the decision then ignores it.
    pub fn build(config: &AdrLiteConfig) -> Self {
        let channels: Vec<Option<u8>> = if config.change_channel {
            (0..DEFAULT_CHANNEL_FREQUENCIES_HZ.len() as u8).map(Some).collect()
        } else {
            vec![None]
        };
        let coding_rates: Vec<Option<CodingRate>> = if config.change_coding_rate {
            CodingRate::ALL.iter().copied().map(Some).collect()
        } else {
            vec![None]
        };

        let mut configurations = Vec::new();
        for spreading_factor in SPREADING_FACTORS {
            for tx_power_dbm in TX_POWER_LEVELS_DBM {
                for &channel in &channels {
                    for &coding_rate in &coding_rates {
                        configurations.push(Configuration {
                            spreading_factor,
                            tx_power_dbm,
                            channel,
                            coding_rate,
                            energy: energy_index(
                                spreading_factor,
                                tx_power_dbm,
                                coding_rate.unwrap_or_default(),
                                config.reference_payload_bytes,
                            ),
                        });
                    }
                }
            }
        }
        configurations.sort_by(|a, b| a.energy.total_cmp(&b.energy));

        let space = Self { configurations };
        if let (Some(first), Some(last)) = (space.configurations.first(), space.configurations.last()) {
            info!(
                "ADR-Lite: {} configurations, cheapest {} (energy {:.2}), most robust {} (energy {:.2})",
                space.len(),
                first,
                first.energy,
                last,
                last.energy
            );
        }
        for (index, configuration) in space.iter().enumerate() {
            debug!("ADR-Lite: config {}: {}", index, configuration);
        }
        space
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    /// Index of the most robust configuration.
    pub fn max_index(&self) -> usize {
        self.len().saturating_sub(1)
    }

    pub fn get(&self, index: usize) -> Option<&Configuration> {
        self.configurations.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Configuration> {
        self.configurations.iter()
    }
}

impl Index<usize> for ConfigurationSpace {
    type Output = Configuration;

    fn index(&self, index: usize) -> &Configuration {
        &self.configurations[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_space() -> ConfigurationSpace {
        ConfigurationSpace::build(&AdrLiteConfig::default())
    }

    #[test]
    fn test_default_space_has_42_configurations() {
        let space = default_space();
        assert_eq!(space.len(), 42);
        assert_eq!(space.max_index(), 41);
        assert!(space.iter().all(|c| c.channel.is_none() && c.coding_rate.is_none()));
    }

    #[test]
    fn test_energy_is_non_decreasing() {
        let space = default_space();
        for pair in space.configurations.windows(2) {
            assert!(
                pair[0].energy <= pair[1].energy,
                "{} costs more than {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_extremes() {
        let space = default_space();
        assert_eq!(space[0].spreading_factor, 7);
        assert_eq!(space[0].tx_power_dbm, 2.0);
        assert_eq!(space[41].spreading_factor, 12);
        assert_eq!(space[41].tx_power_dbm, 14.0);
        assert_eq!(space[41].data_rate(), 0);
        assert_eq!(space[41].tx_power_index(), 0);
        assert_eq!(space[0].tx_power_index(), 6);
    }

    #[test]
    fn test_build_is_deterministic() {
        let config = AdrLiteConfig {
            change_channel: true,
            ..Default::default()
        };
        let a = ConfigurationSpace::build(&config);
        let b = ConfigurationSpace::build(&config);
        assert_eq!(a.configurations, b.configurations);
    }

    #[test]
    fn test_equal_cost_keeps_channel_order() {
        let space = ConfigurationSpace::build(&AdrLiteConfig {
            change_channel: true,
            ..Default::default()
        });
        assert_eq!(space.len(), 126);
        // Channel does not affect energy, so each triple sits together in slot order
        for triple in space.configurations.chunks(3) {
            let channels: Vec<_> = triple.iter().map(|c| c.channel).collect();
            assert_eq!(channels, vec![Some(0), Some(1), Some(2)]);
            assert_eq!(triple[0].energy, triple[2].energy);
        }
    }

    #[test]
    fn test_coding_rate_dimension() {
        let space = ConfigurationSpace::build(&AdrLiteConfig {
            change_coding_rate: true,
            ..Default::default()
        });
        assert_eq!(space.len(), 42 * 4);
        assert_eq!(space[0].coding_rate, Some(CodingRate::Cr4_5));
        assert_eq!(space[space.max_index()].coding_rate, Some(CodingRate::Cr4_8));
    }

    #[test]
    fn test_fixed_power_space_keeps_every_power_level() {
        let space = ConfigurationSpace::build(&AdrLiteConfig {
            change_tx_power: false,
            ..Default::default()
        });
        assert_eq!(space.len(), 42);
        let default = default_space();
        assert!(space.iter().eq(default.iter()));
        assert_eq!(space[41].spreading_factor, 12);
        assert_eq!(space[41].tx_power_dbm, 14.0);
    }

    #[test]
    fn test_energy_grows_with_power_and_sf() {
        let low = energy_index(7, 2.0, CodingRate::Cr4_5, 20);
        let louder = energy_index(7, 14.0, CodingRate::Cr4_5, 20);
        let slower = energy_index(12, 2.0, CodingRate::Cr4_5, 20);
        let redundant = energy_index(7, 2.0, CodingRate::Cr4_8, 20);
        assert!(louder > low);
        assert!(slower > low);
        assert!(redundant > low);
    }

    #[test]
    fn test_display() {
        let space = ConfigurationSpace::build(&AdrLiteConfig {
            change_channel: true,
            change_coding_rate: true,
            ..Default::default()
        });
        assert_eq!(space[0].to_string(), "SF7 2 dBm ch0 CR 4/5");
    }
}

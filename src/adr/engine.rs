//! Binary-search decision engine.
//!
//! ADR-Lite keeps no link-quality history. Each round it only asks whether
//! the device transmitted with the configuration assigned last round:
//!
//! - yes: search `[0, k]` for something cheaper
//! - no: search `[k, |K| - 1]` for something more robust
//!
//! The next index is the floor of the midpoint of that range. On the robust
//! side this can settle one short of `|K| - 1`; the component re-issues the
//! current assignment when that happens, and a lost reply escalates with a
//! `+1` that does reach the end.

use log::debug;

use super::config_space::{Configuration, ConfigurationSpace};
use crate::config::AdrLiteConfig;
use crate::server::TxParams;

/// Outcome of one decision round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Device transmitted with the assigned configuration
    pub success: bool,
    pub previous_index: usize,
    pub index: usize,
    /// The new configuration differs in a parameter the controller adjusts
    pub changed: bool,
}

/// Next index after a round, for a space of `len` configurations.
pub fn next_index(previous: usize, success: bool, len: usize) -> usize {
    let max = len.saturating_sub(1);
    let previous = previous.min(max);
    if success {
        previous / 2
    } else {
        (previous + max) / 2
    }
}

/// Index after a reply is known to have been lost: halfway to the most
/// robust configuration, plus one.
pub fn escalate(previous: usize, len: usize) -> usize {
    let max = len.saturating_sub(1);
    ((previous.min(max) + max) / 2 + 1).min(max)
}

/// Whether the observed transmission used the assigned configuration.
///
/// Spreading factor always counts; power, channel and coding rate only when
/// the controller adjusts them.
pub fn matches_assignment(
    observed: &TxParams,
    assigned: &Configuration,
    config: &AdrLiteConfig,
) -> bool {
    let sf_matches = observed.spreading_factor == assigned.spreading_factor;
    let power_matches = !config.change_tx_power
        || (observed.tx_power_dbm - assigned.tx_power_dbm).abs() < config.power_tolerance_db;
    let channel_matches = !config.change_channel
        || assigned.channel == Some(observed.channel_index as u8);
    let coding_rate_matches =
        !config.change_coding_rate || assigned.coding_rate == Some(observed.coding_rate);
    sf_matches && power_matches && channel_matches && coding_rate_matches
}

/// Whether moving from `old` to `new` changes anything the device is told.
pub fn configuration_changed(
    old: &Configuration,
    new: &Configuration,
    config: &AdrLiteConfig,
) -> bool {
    let mut changed = old.spreading_factor != new.spreading_factor;
    if config.change_tx_power {
        changed |= (old.tx_power_dbm - new.tx_power_dbm).abs() > config.power_tolerance_db;
    }
    if config.change_channel {
        changed |= old.channel != new.channel;
    }
    if config.change_coding_rate {
        changed |= old.coding_rate != new.coding_rate;
    }
    changed
}

/// Run one round for a device currently at `previous_index`.
pub fn decide(
    previous_index: usize,
    observed: &TxParams,
    space: &ConfigurationSpace,
    config: &AdrLiteConfig,
) -> Decision {
    let previous_index = previous_index.min(space.max_index());
    let success = matches_assignment(observed, &space[previous_index], config);
    let index = next_index(previous_index, success, space.len());
    let changed = configuration_changed(&space[previous_index], &space[index], config);
    debug!(
        "ADR-Lite: {} k_prev={} k_new={} changed={}",
        if success { "match" } else { "mismatch" },
        previous_index,
        index,
        changed
    );
    Decision {
        success,
        previous_index,
        index,
        changed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lora::CodingRate;

    const K: usize = 42;

    fn observed(spreading_factor: u8, tx_power_dbm: f64) -> TxParams {
        TxParams {
            spreading_factor,
            tx_power_dbm,
            data_rate: 12 - spreading_factor,
            channel_index: 0,
            frequency_hz: 868_100_000,
            coding_rate: CodingRate::Cr4_5,
        }
    }

    #[test]
    fn test_first_success_halves_from_max() {
        assert_eq!(next_index(K - 1, true, K), (K - 1) / 2);
        assert_eq!(next_index(41, true, K), 20);
    }

    #[test]
    fn test_constant_failure_from_max_stays_at_max() {
        let mut index = K - 1;
        for _ in 0..6 {
            index = next_index(index, false, K);
        }
        assert_eq!(index, 41);
    }

    #[test]
    fn test_failure_midpoint_rounds_down() {
        assert_eq!(next_index(20, false, K), 30);
        assert_eq!(next_index(40, false, K), 40);
        assert_eq!(next_index(41, false, K), 41);

        let mut index = 0;
        let mut trace = Vec::new();
        for _ in 0..6 {
            index = next_index(index, false, K);
            trace.push(index);
        }
        assert_eq!(trace, vec![20, 30, 35, 38, 39, 40]);
    }

    #[test]
    fn test_success_converges_within_log2_bound() {
        let bound = (K as f64).log2().ceil() as usize;
        for start in 0..K {
            let mut index = start;
            let mut rounds = 0;
            while index > 0 {
                let next = next_index(index, true, K);
                assert!(next < index, "success must strictly decrease from {}", index);
                index = next;
                rounds += 1;
            }
            assert!(rounds <= bound, "start {} took {} rounds", start, rounds);
            assert_eq!(next_index(0, true, K), 0);
        }
    }

    #[test]
    fn test_failure_converges_within_log2_bound() {
        let bound = (K as f64).log2().ceil() as usize;
        for start in 0..K {
            let mut index = start;
            let mut rounds = 0;
            while index < K - 2 {
                let next = next_index(index, false, K);
                assert!(next > index, "failure must increase from {}", index);
                index = next;
                rounds += 1;
            }
            assert!(rounds <= bound, "start {} took {} rounds", start, rounds);
            assert!(next_index(index, false, K) >= index);
        }
    }

    #[test]
    fn test_out_of_range_previous_is_clamped() {
        assert_eq!(next_index(100, false, K), 41);
        assert_eq!(next_index(100, true, K), 20);
        assert_eq!(next_index(0, true, 1), 0);
        assert_eq!(next_index(0, false, 1), 0);
    }

    #[test]
    fn test_escalation() {
        assert_eq!(escalate(0, K), 21);
        assert_eq!(escalate(20, K), 31);
        assert_eq!(escalate(40, K), 41);
        assert_eq!(escalate(41, K), 41);
    }

    #[test]
    fn test_power_match_uses_tolerance() {
        let config = AdrLiteConfig::default();
        let space = ConfigurationSpace::build(&config);
        let assigned = &space[41];
        assert!(matches_assignment(&observed(12, 14.05), assigned, &config));
        assert!(!matches_assignment(&observed(12, 12.0), assigned, &config));
        assert!(!matches_assignment(&observed(11, 14.0), assigned, &config));

        let sf_only = AdrLiteConfig {
            change_tx_power: false,
            ..Default::default()
        };
        assert!(matches_assignment(&observed(12, 2.0), assigned, &sf_only));
    }

    #[test]
    fn test_channel_and_coding_rate_match_when_adjusted() {
        let config = AdrLiteConfig {
            change_channel: true,
            change_coding_rate: true,
            ..Default::default()
        };
        let space = ConfigurationSpace::build(&config);
        let assigned = &space[0];
        let mut tx = observed(assigned.spreading_factor, assigned.tx_power_dbm);
        tx.channel_index = assigned.channel.unwrap_or(0) as usize;
        tx.coding_rate = assigned.coding_rate.unwrap_or_default();
        assert!(matches_assignment(&tx, assigned, &config));

        tx.channel_index = 2;
        assert!(!matches_assignment(&tx, assigned, &config));
    }

    #[test]
    fn test_change_detection() {
        let config = AdrLiteConfig::default();
        let space = ConfigurationSpace::build(&config);
        assert!(!configuration_changed(&space[5], &space[5], &config));
        for i in 1..space.len() {
            assert!(
                configuration_changed(&space[i - 1], &space[i], &config),
                "{} and {} differ",
                space[i - 1],
                space[i]
            );
        }
    }

    #[test]
    fn test_decide_success_and_mismatch() {
        let config = AdrLiteConfig::default();
        let space = ConfigurationSpace::build(&config);

        let decision = decide(41, &observed(12, 14.0), &space, &config);
        assert_eq!(
            decision,
            Decision {
                success: true,
                previous_index: 41,
                index: 20,
                changed: true,
            }
        );

        // Device still on its boot settings: stays at the most robust
        let decision = decide(41, &observed(7, 14.0), &space, &config);
        assert!(!decision.success);
        assert_eq!(decision.index, 41);
        assert!(!decision.changed);
    }
}

//! Run statistics, owned by the simulation.

use serde::Serialize;

use crate::mac::DeliveryReport;

/// Counters for one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceStats {
    pub address: String,
    pub uplinks_sent: u64,
    pub uplinks_received: u64,
    pub messages_delivered: u64,
    pub messages_failed: u64,
    /// Transmissions used by confirmed messages, delivered or not
    pub transmissions_used: u64,
    pub data_rate: u8,
    pub tx_power_dbm: f64,
    pub coding_rate: String,
}

/// Counters for the whole network.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkStats {
    pub uplinks_sent: u64,
    pub uplinks_received: u64,
    pub uplinks_lost: u64,
    pub retransmissions: u64,
    pub downlinks_sent: u64,
    pub downlinks_lost: u64,
    pub duty_cycle_blocked: u64,
    pub devices: Vec<DeviceStats>,
}

impl NetworkStats {
    pub fn new(addresses: impl IntoIterator<Item = String>) -> Self {
        Self {
            devices: addresses
                .into_iter()
                .map(|address| DeviceStats {
                    address,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn record_uplink(&mut self, device: usize, retransmission: bool) {
        self.uplinks_sent += 1;
        if retransmission {
            self.retransmissions += 1;
        }
        if let Some(stats) = self.devices.get_mut(device) {
            stats.uplinks_sent += 1;
        }
    }

    pub fn record_reception(&mut self, device: usize, received: bool) {
        if received {
            self.uplinks_received += 1;
            if let Some(stats) = self.devices.get_mut(device) {
                stats.uplinks_received += 1;
            }
        } else {
            self.uplinks_lost += 1;
        }
    }

    pub fn record_downlink(&mut self, received: bool) {
        self.downlinks_sent += 1;
        if !received {
            self.downlinks_lost += 1;
        }
    }

    pub fn record_delivery(&mut self, device: usize, report: &DeliveryReport) {
        if let Some(stats) = self.devices.get_mut(device) {
            if report.delivered {
                stats.messages_delivered += 1;
            } else {
                stats.messages_failed += 1;
            }
            stats.transmissions_used += u64::from(report.transmissions);
        }
    }

    pub fn record_blocked(&mut self) {
        self.duty_cycle_blocked += 1;
    }

    pub fn messages_delivered(&self) -> u64 {
        self.devices.iter().map(|d| d.messages_delivered).sum()
    }

    pub fn messages_failed(&self) -> u64 {
        self.devices.iter().map(|d| d.messages_failed).sum()
    }

    /// Share of confirmed messages that were acknowledged.
    pub fn delivery_ratio(&self) -> f64 {
        let total = self.messages_delivered() + self.messages_failed();
        if total == 0 {
            return 0.0;
        }
        self.messages_delivered() as f64 / total as f64
    }

    /// Share of uplinks the gateway decoded.
    pub fn uplink_success_ratio(&self) -> f64 {
        if self.uplinks_sent == 0 {
            return 0.0;
        }
        self.uplinks_received as f64 / self.uplinks_sent as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn report(delivered: bool, transmissions: u8) -> DeliveryReport {
        DeliveryReport {
            transmissions,
            delivered,
            first_attempt: Duration::ZERO,
            payload: vec![],
        }
    }

    #[test]
    fn test_counters() {
        let mut stats = NetworkStats::new(["A".to_string(), "B".to_string()]);
        stats.record_uplink(0, false);
        stats.record_uplink(0, true);
        stats.record_uplink(1, false);
        stats.record_reception(0, true);
        stats.record_reception(1, false);
        stats.record_downlink(false);
        stats.record_delivery(0, &report(true, 2));
        stats.record_delivery(1, &report(false, 1));

        assert_eq!(stats.uplinks_sent, 3);
        assert_eq!(stats.retransmissions, 1);
        assert_eq!(stats.uplinks_lost, 1);
        assert_eq!(stats.downlinks_lost, 1);
        assert_eq!(stats.devices[0].uplinks_sent, 2);
        assert_eq!(stats.devices[0].transmissions_used, 2);
        assert_relative_eq!(stats.delivery_ratio(), 0.5);
        assert_relative_eq!(stats.uplink_success_ratio(), 1.0 / 3.0);
    }

    #[test]
    fn test_empty_ratios_are_zero() {
        let stats = NetworkStats::default();
        assert_eq!(stats.delivery_ratio(), 0.0);
        assert_eq!(stats.uplink_success_ratio(), 0.0);
    }

    #[test]
    fn test_serializes_to_json() {
        let stats = NetworkStats::new(["0100000A".to_string()]);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["devices"][0]["address"], "0100000A");
        assert_eq!(json["uplinks_sent"], 0);
    }
}

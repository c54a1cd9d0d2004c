//! Stub propagation between devices and the single gateway.
//!
//! Each device gets a fixed path loss, drawn once per run. Every frame then
//! sees uniform shadowing on top:
//!
//! ```text
//! SNR = P_tx - path_loss + shadowing - noise_floor
//! ```
//!
//! A frame is received when its SNR reaches the demodulation floor of its
//! spreading factor.

use rand::Rng;
use rand_core::RngCore;

use crate::config::LinkConfig;
use crate::lora::region;

/// Result of putting one frame on the air.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reception {
    pub snr_db: f64,
    pub received: bool,
}

/// Decides whether frames between a device and the gateway get through.
pub trait LinkModel {
    fn uplink(
        &self,
        device: usize,
        spreading_factor: u8,
        tx_power_dbm: f64,
        rng: &mut dyn RngCore,
    ) -> Reception;

    fn downlink(&self, device: usize, spreading_factor: u8, rng: &mut dyn RngCore) -> Reception;
}

/// Link budget with per-device path loss and uniform shadowing.
#[derive(Debug, Clone)]
pub struct LinkBudget {
    config: LinkConfig,
    path_loss_db: Vec<f64>,
}

impl LinkBudget {
    /// Draw a path loss for each of `devices` devices.
    pub fn new(config: &LinkConfig, devices: usize, rng: &mut dyn RngCore) -> Self {
        let path_loss_db = (0..devices)
            .map(|_| {
                if config.max_path_loss_db > config.min_path_loss_db {
                    rng.gen_range(config.min_path_loss_db..=config.max_path_loss_db)
                } else {
                    config.min_path_loss_db
                }
            })
            .collect();
        Self {
            config: config.clone(),
            path_loss_db,
        }
    }

    /// Same path loss for every device.
    pub fn uniform(config: &LinkConfig, devices: usize, path_loss_db: f64) -> Self {
        Self {
            config: config.clone(),
            path_loss_db: vec![path_loss_db; devices],
        }
    }

    pub fn path_loss_db(&self, device: usize) -> f64 {
        self.path_loss_db
            .get(device)
            .copied()
            .unwrap_or(self.config.max_path_loss_db)
    }

    fn snr_db(&self, device: usize, tx_power_dbm: f64, rng: &mut dyn RngCore) -> f64 {
        let shadowing = if self.config.shadowing_db > 0.0 {
            rng.gen_range(-self.config.shadowing_db..=self.config.shadowing_db)
        } else {
            0.0
        };
        tx_power_dbm - self.path_loss_db(device) + shadowing - self.config.noise_floor_dbm
    }
}

impl LinkModel for LinkBudget {
    fn uplink(
        &self,
        device: usize,
        spreading_factor: u8,
        tx_power_dbm: f64,
        rng: &mut dyn RngCore,
    ) -> Reception {
        let snr_db = self.snr_db(device, tx_power_dbm, rng);
        Reception {
            snr_db,
            received: snr_db >= region::required_snr_db(spreading_factor),
        }
    }

    fn downlink(&self, device: usize, spreading_factor: u8, rng: &mut dyn RngCore) -> Reception {
        let snr_db = self.snr_db(device, self.config.gateway_tx_power_dbm, rng);
        let lost = self.config.downlink_loss_probability > 0.0
            && rng.gen_bool(self.config.downlink_loss_probability);
        Reception {
            snr_db,
            received: !lost && snr_db >= region::required_snr_db(spreading_factor),
        }
    }
}

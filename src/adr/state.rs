//! Per-device ADR-Lite state.

use std::collections::HashMap;

use log::info;

use super::config_space::{Configuration, ConfigurationSpace};
use crate::mac::DeviceAddress;

/// What the controller last assigned to one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceAdrState {
    /// Index into the configuration space
    pub current_index: usize,
    /// Parameters last communicated to the device
    pub assigned: Configuration,
    /// Set once the state has been created for the device
    pub initialized: bool,
}

impl DeviceAdrState {
    /// Fresh state at the most robust configuration.
    pub fn new(space: &ConfigurationSpace) -> Self {
        let index = space.max_index();
        Self {
            current_index: index,
            assigned: space[index].clone(),
            initialized: true,
        }
    }

    pub fn assign(&mut self, index: usize, space: &ConfigurationSpace) {
        self.current_index = index;
        self.assigned = space[index].clone();
    }
}

/// States of every device the controller has heard from. Entries are never removed.
#[derive(Debug, Clone, Default)]
pub struct DeviceStates {
    states: HashMap<DeviceAddress, DeviceAdrState>,
}

impl DeviceStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `address`, created at the most robust configuration on first contact.
    pub fn get_or_insert(
        &mut self,
        address: DeviceAddress,
        space: &ConfigurationSpace,
    ) -> &mut DeviceAdrState {
        self.states.entry(address).or_insert_with(|| {
            let state = DeviceAdrState::new(space);
            info!(
                "ADR-Lite: new device {} initialized with config {} ({})",
                address, state.current_index, state.assigned
            );
            state
        })
    }

    pub fn get(&self, address: DeviceAddress) -> Option<&DeviceAdrState> {
        self.states.get(&address)
    }

    pub fn get_mut(&mut self, address: DeviceAddress) -> Option<&mut DeviceAdrState> {
        self.states.get_mut(&address)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeviceAddress, &DeviceAdrState)> {
        self.states.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdrLiteConfig;

    #[test]
    fn test_first_contact_starts_most_robust() {
        let space = ConfigurationSpace::build(&AdrLiteConfig::default());
        let mut states = DeviceStates::new();
        let state = states.get_or_insert(DeviceAddress(1), &space);

        assert!(state.initialized);
        assert_eq!(state.current_index, 41);
        assert_eq!(state.assigned.spreading_factor, 12);
        assert_eq!(state.assigned.tx_power_dbm, 14.0);
    }

    #[test]
    fn test_existing_state_is_kept() {
        let space = ConfigurationSpace::build(&AdrLiteConfig::default());
        let mut states = DeviceStates::new();
        states.get_or_insert(DeviceAddress(1), &space).assign(3, &space);
        states.get_or_insert(DeviceAddress(2), &space);

        let state = states.get_or_insert(DeviceAddress(1), &space);
        assert_eq!(state.current_index, 3);
        assert_eq!(state.assigned, space[3]);
        assert_eq!(states.len(), 2);
        assert!(states.get(DeviceAddress(3)).is_none());
    }
}

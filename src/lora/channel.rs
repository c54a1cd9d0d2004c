//! Logical channels and duty-cycle bookkeeping.
//!
//! A device knows up to sixteen logical channels. Each channel belongs to a
//! regulatory sub-band, and every transmission closes its sub-band for
//! `airtime / duty_cycle - airtime`. An aggregated duty cycle, set by the
//! network through `DutyCycleReq`, closes every channel in the same way.
//!
//! Time is simulated: callers pass the current instant as a [`Duration`]
//! since the start of the run instead of reading a wall clock.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use lorawan_adr_lite::lora::ChannelPlan;
//!
//! let mut plan = ChannelPlan::eu868();
//! let now = Duration::from_secs(10);
//!
//! // 100 ms on 868.1 MHz closes the 1% sub-band for 9.9 s
//! plan.record_transmission(868_100_000, Duration::from_millis(100), now);
//! assert_eq!(
//!     plan.next_transmission_delay(now),
//!     Some(Duration::from_millis(9_900))
//! );
//! ```

use std::time::Duration;

use log::debug;
use rand::Rng;
use rand_core::RngCore;

use super::region::{self, SubBandSpec, MAX_CHANNELS};

/// Simulated time since the start of a run.
pub type SimTime = Duration;

/// A frequency a device may transmit on, with the data rates it supports.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalChannel {
    pub frequency_hz: u32,
    pub min_data_rate: u8,
    pub max_data_rate: u8,
    pub enabled_for_uplink: bool,
}

impl LogicalChannel {
    /// Create a channel, enabled for uplink.
    pub fn new(frequency_hz: u32, min_data_rate: u8, max_data_rate: u8) -> Self {
        Self {
            frequency_hz,
            min_data_rate,
            max_data_rate,
            enabled_for_uplink: true,
        }
    }

    /// Whether `data_rate` falls inside this channel's range.
    pub fn supports_data_rate(&self, data_rate: u8) -> bool {
        (self.min_data_rate..=self.max_data_rate).contains(&data_rate)
    }
}

/// A regulatory sub-band together with the earliest instant it may be used again.
#[derive(Debug, Clone)]
pub struct SubBand {
    spec: SubBandSpec,
    next_transmission: SimTime,
}

impl SubBand {
    pub fn new(spec: SubBandSpec) -> Self {
        Self {
            spec,
            next_transmission: Duration::ZERO,
        }
    }

    pub fn contains(&self, frequency_hz: u32) -> bool {
        (self.spec.first_frequency_hz..=self.spec.last_frequency_hz).contains(&frequency_hz)
    }

    pub fn duty_cycle(&self) -> f64 {
        self.spec.duty_cycle
    }

    pub fn max_tx_power_dbm(&self) -> f64 {
        self.spec.max_tx_power_dbm
    }

    pub fn next_transmission(&self) -> SimTime {
        self.next_transmission
    }
}

/// Off period that follows a transmission of `airtime` under `duty_cycle`.
fn off_period(airtime: Duration, duty_cycle: f64) -> Duration {
    if duty_cycle <= 0.0 || duty_cycle >= 1.0 {
        return Duration::ZERO;
    }
    let total_ns = (airtime.as_nanos() as f64 / duty_cycle).round() as u64;
    Duration::from_nanos(total_ns).saturating_sub(airtime)
}

/// The device's channel table plus all duty-cycle state.
#[derive(Debug, Clone)]
pub struct ChannelPlan {
    channels: [Option<LogicalChannel>; MAX_CHANNELS],
    sub_bands: Vec<SubBand>,
    aggregated_duty_cycle: f64,
    aggregated_next_transmission: SimTime,
}

impl ChannelPlan {
    /// EU868 plan: the three mandatory channels (DR0-DR5) and the three sub-bands.
    pub fn eu868() -> Self {
        let mut channels: [Option<LogicalChannel>; MAX_CHANNELS] = Default::default();
        for (slot, frequency_hz) in region::DEFAULT_CHANNEL_FREQUENCIES_HZ.iter().enumerate() {
            channels[slot] = Some(LogicalChannel::new(*frequency_hz, 0, 5));
        }
        Self {
            channels,
            sub_bands: region::default_sub_bands().into_iter().map(SubBand::new).collect(),
            aggregated_duty_cycle: 1.0,
            aggregated_next_transmission: Duration::ZERO,
        }
    }

    /// All sixteen slots, `None` where no channel is defined.
    pub fn channels(&self) -> &[Option<LogicalChannel>] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&LogicalChannel> {
        self.channels.get(index).and_then(Option::as_ref)
    }

    /// Define, replace or remove (`None`) the channel in a slot.
    ///
    /// # Panics
    ///
    /// If `index` is not below [`MAX_CHANNELS`].
    pub fn set_channel(&mut self, index: usize, channel: Option<LogicalChannel>) {
        assert!(index < MAX_CHANNELS, "channel index {} out of range", index);
        self.channels[index] = channel;
    }

    /// Bit `i` set when slot `i` holds a channel.
    pub fn defined_mask(&self) -> u16 {
        self.mask_where(|_| true)
    }

    /// Bit `i` set when slot `i` holds a channel enabled for uplink.
    pub fn enabled_mask(&self) -> u16 {
        self.mask_where(|c| c.enabled_for_uplink)
    }

    fn mask_where(&self, predicate: impl Fn(&LogicalChannel) -> bool) -> u16 {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.as_ref().is_some_and(&predicate))
            .fold(0u16, |mask, (i, _)| mask | (1 << i))
    }

    /// Enable every defined channel whose bit is set and disable the others.
    pub fn apply_channel_mask(&mut self, mask: u16) {
        for (i, slot) in self.channels.iter_mut().enumerate() {
            if let Some(channel) = slot {
                channel.enabled_for_uplink = mask & (1 << i) != 0;
            }
        }
    }

    /// Iterate over channels that are defined and enabled for uplink.
    pub fn enabled_channels(&self) -> impl Iterator<Item = (usize, &LogicalChannel)> {
        self.channels
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (i, c)))
            .filter(|(_, c)| c.enabled_for_uplink)
    }

    /// A frequency is usable when it falls inside a known sub-band.
    pub fn is_frequency_valid(&self, frequency_hz: u32) -> bool {
        region::is_valid_frequency(frequency_hz) && self.sub_band_for(frequency_hz).is_some()
    }

    pub fn sub_band_for(&self, frequency_hz: u32) -> Option<&SubBand> {
        self.sub_bands.iter().find(|b| b.contains(frequency_hz))
    }

    fn sub_band_for_mut(&mut self, frequency_hz: u32) -> Option<&mut SubBand> {
        self.sub_bands.iter_mut().find(|b| b.contains(frequency_hz))
    }

    /// Power ceiling of the sub-band a channel lives in.
    pub fn max_tx_power_dbm(&self, channel: &LogicalChannel) -> Option<f64> {
        self.sub_band_for(channel.frequency_hz).map(SubBand::max_tx_power_dbm)
    }

    pub fn aggregated_duty_cycle(&self) -> f64 {
        self.aggregated_duty_cycle
    }

    pub fn set_aggregated_duty_cycle(&mut self, duty_cycle: f64) {
        self.aggregated_duty_cycle = duty_cycle;
    }

    /// Time until `channel` may be used, or `None` if its frequency belongs to no sub-band.
    pub fn waiting_time(&self, channel: &LogicalChannel, now: SimTime) -> Option<Duration> {
        let band = self.sub_band_for(channel.frequency_hz)?;
        let band_wait = band.next_transmission.saturating_sub(now);
        let aggregated_wait = self.aggregated_next_transmission.saturating_sub(now);
        Some(band_wait.max(aggregated_wait))
    }

    /// Minimum wait across all enabled channels.
    ///
    /// `None` when no enabled channel can ever be used, which callers treat
    /// like a duty-cycle block.
    pub fn next_transmission_delay(&self, now: SimTime) -> Option<Duration> {
        self.enabled_channels()
            .filter_map(|(_, c)| self.waiting_time(c, now))
            .min()
    }

    /// Pick uniformly among enabled channels that support `data_rate` and are
    /// free right now. Returns the slot index.
    pub fn pick_channel(&self, data_rate: u8, now: SimTime, rng: &mut dyn RngCore) -> Option<usize> {
        let candidates: Vec<usize> = self
            .enabled_channels()
            .filter(|(_, c)| c.supports_data_rate(data_rate))
            .filter(|(_, c)| self.waiting_time(c, now) == Some(Duration::ZERO))
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            debug!("no suitable channel for DR{}", data_rate);
            return None;
        }
        Some(candidates[rng.gen_range(0..candidates.len())])
    }

    /// Close the sub-band of `frequency_hz` and the aggregated budget after a
    /// transmission that starts at `now`.
    pub fn record_transmission(&mut self, frequency_hz: u32, airtime: Duration, now: SimTime) {
        if let Some(band) = self.sub_band_for_mut(frequency_hz) {
            band.next_transmission = now + off_period(airtime, band.duty_cycle());
            debug!(
                "sub-band of {} Hz closed until {:?}",
                frequency_hz, band.next_transmission
            );
        }
        self.aggregated_next_transmission =
            now + off_period(airtime, self.aggregated_duty_cycle);
    }
}

impl Default for ChannelPlan {
    fn default() -> Self {
        Self::eu868()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_default_plan_has_three_enabled_channels() {
        let plan = ChannelPlan::eu868();
        assert_eq!(plan.defined_mask(), 0b111);
        assert_eq!(plan.enabled_mask(), 0b111);
        assert_eq!(plan.enabled_channels().count(), 3);
        assert!(plan.channel(3).is_none());
    }

    #[test]
    fn test_mask_only_touches_defined_channels() {
        let mut plan = ChannelPlan::eu868();
        plan.apply_channel_mask(0b1010);
        assert_eq!(plan.enabled_mask(), 0b010);
        assert_eq!(plan.defined_mask(), 0b111);
    }

    #[test]
    fn test_fresh_plan_can_transmit_immediately() {
        let plan = ChannelPlan::eu868();
        assert_eq!(plan.next_transmission_delay(Duration::ZERO), Some(Duration::ZERO));
    }

    #[test]
    fn test_transmission_closes_sub_band() {
        let mut plan = ChannelPlan::eu868();
        let now = Duration::from_secs(5);
        plan.record_transmission(868_100_000, Duration::from_millis(50), now);

        // All three default channels share the 1% sub-band
        let delay = plan.next_transmission_delay(now).unwrap();
        assert_eq!(delay, Duration::from_millis(4_950));

        let later = now + delay;
        assert_eq!(plan.next_transmission_delay(later), Some(Duration::ZERO));
    }

    #[test]
    fn test_aggregated_duty_cycle_applies_across_sub_bands() {
        let mut plan = ChannelPlan::eu868();
        plan.set_channel(3, Some(LogicalChannel::new(869_500_000, 0, 5)));
        plan.set_aggregated_duty_cycle(1.0 / 4.0);
        let now = Duration::ZERO;
        plan.record_transmission(868_100_000, Duration::from_millis(100), now);

        // The 10% sub-band is free but the aggregated budget needs 300 ms
        let high = plan.channel(3).unwrap().clone();
        assert_eq!(plan.waiting_time(&high, now), Some(Duration::from_millis(300)));
        assert_eq!(plan.next_transmission_delay(now), Some(Duration::from_millis(300)));
    }

    #[test]
    fn test_no_enabled_channel_means_no_delay_value() {
        let mut plan = ChannelPlan::eu868();
        plan.apply_channel_mask(0);
        assert_eq!(plan.next_transmission_delay(Duration::ZERO), None);
    }

    #[test]
    fn test_pick_channel_respects_data_rate_and_wait() {
        let mut plan = ChannelPlan::eu868();
        let mut rng = StdRng::seed_from_u64(7);
        plan.set_channel(3, Some(LogicalChannel::new(869_500_000, 6, 6)));

        for _ in 0..20 {
            let slot = plan.pick_channel(5, Duration::ZERO, &mut rng).unwrap();
            assert!(slot < 3, "DR5 must not land on the DR6-only channel");
        }
        assert_eq!(plan.pick_channel(6, Duration::ZERO, &mut rng), Some(3));

        plan.record_transmission(868_100_000, Duration::from_millis(10), Duration::ZERO);
        assert_eq!(plan.pick_channel(5, Duration::ZERO, &mut rng), None);
    }

    #[test]
    fn test_pick_channel_is_spread_over_candidates() {
        let plan = ChannelPlan::eu868();
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = [0u32; 3];
        for _ in 0..300 {
            seen[plan.pick_channel(0, Duration::ZERO, &mut rng).unwrap()] += 1;
        }
        assert!(seen.iter().all(|&n| n > 50), "uneven pick: {:?}", seen);
    }

    #[test]
    fn test_frequency_validity_requires_sub_band() {
        let plan = ChannelPlan::eu868();
        assert!(plan.is_frequency_valid(868_300_000));
        assert!(plan.is_frequency_valid(869_525_000));
        assert!(!plan.is_frequency_valid(867_100_000));
        assert!(!plan.is_frequency_valid(915_000_000));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_set_channel_beyond_slots_panics() {
        let mut plan = ChannelPlan::eu868();
        plan.set_channel(MAX_CHANNELS, None);
    }
}

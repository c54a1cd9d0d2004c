//! Delivery tracking for confirmed uplinks.
//!
//! At most one confirmed message is in flight per device. Its attempts are
//! counted down from NbTrans; the first transmission is counted when it is
//! sent. The outcome is reported exactly once, as a [`DeliveryReport`], when
//! an ACK arrives, when attempts run out, or when a new application message
//! supersedes it.

use crate::lora::SimTime;

/// Externally visible state of the delivery state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetxState {
    /// No confirmed message in flight
    Idle,
    /// Sent, waiting for an ACK
    AwaitingAck { attempts_left: u8 },
}

/// Outcome of a confirmed message.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    /// Transmissions actually used
    pub transmissions: u8,
    pub delivered: bool,
    pub first_attempt: SimTime,
    /// Application payload of the message
    pub payload: Vec<u8>,
}

/// Retransmission bookkeeping for the message in flight.
#[derive(Debug, Clone, Default)]
pub struct RetxParams {
    in_flight: Option<InFlight>,
}

#[derive(Debug, Clone)]
struct InFlight {
    first_attempt: SimTime,
    payload: Vec<u8>,
    attempts_left: u8,
}

impl RetxParams {
    pub fn state(&self) -> RetxState {
        match &self.in_flight {
            None => RetxState::Idle,
            Some(flight) => RetxState::AwaitingAck {
                attempts_left: flight.attempts_left,
            },
        }
    }

    pub fn is_waiting_ack(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn attempts_left(&self) -> u8 {
        self.in_flight.as_ref().map_or(0, |f| f.attempts_left)
    }

    /// Payload awaiting acknowledgment, if any.
    pub fn payload(&self) -> Option<&[u8]> {
        self.in_flight.as_ref().map(|f| f.payload.as_slice())
    }

    /// Start tracking a freshly sent message. The first attempt is already counted.
    ///
    /// # Panics
    ///
    /// If a message is still in flight; call [`RetxParams::finish`] first.
    pub fn begin(&mut self, payload: Vec<u8>, nb_trans: u8, now: SimTime) {
        assert!(
            self.in_flight.is_none(),
            "a confirmed message is already in flight"
        );
        self.in_flight = Some(InFlight {
            first_attempt: now,
            payload,
            attempts_left: nb_trans.max(1) - 1,
        });
    }

    /// Count one retransmission. Returns `false` if none were left.
    pub fn consume_attempt(&mut self) -> bool {
        match &mut self.in_flight {
            Some(flight) if flight.attempts_left > 0 => {
                flight.attempts_left -= 1;
                true
            }
            _ => false,
        }
    }

    /// Close the message in flight and produce its report.
    ///
    /// `nb_trans` is the device's current NbTrans; transmissions used are
    /// `nb_trans - attempts_left`.
    pub fn finish(&mut self, delivered: bool, nb_trans: u8) -> Option<DeliveryReport> {
        let flight = self.in_flight.take()?;
        Some(DeliveryReport {
            transmissions: nb_trans.max(1).saturating_sub(flight.attempts_left),
            delivered,
            first_attempt: flight.first_attempt,
            payload: flight.payload,
        })
    }

    /// Drop the message in flight without reporting.
    pub fn reset(&mut self) {
        self.in_flight = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_idle_by_default() {
        let params = RetxParams::default();
        assert_eq!(params.state(), RetxState::Idle);
        assert!(!params.is_waiting_ack());
        assert_eq!(params.payload(), None);
    }

    #[test]
    fn test_first_attempt_is_counted() {
        let mut params = RetxParams::default();
        params.begin(vec![1, 2, 3], 3, Duration::from_secs(1));
        assert_eq!(params.state(), RetxState::AwaitingAck { attempts_left: 2 });
        assert_eq!(params.payload(), Some(&[1, 2, 3][..]));
    }

    #[test]
    fn test_ack_after_second_attempt() {
        let mut params = RetxParams::default();
        params.begin(vec![9], 3, Duration::from_secs(2));
        assert!(params.consume_attempt());

        let report = params.finish(true, 3).unwrap();
        assert_eq!(report.transmissions, 2);
        assert!(report.delivered);
        assert_eq!(report.first_attempt, Duration::from_secs(2));
        assert_eq!(report.payload, vec![9]);
        assert_eq!(params.state(), RetxState::Idle);
    }

    #[test]
    fn test_exhaustion() {
        let mut params = RetxParams::default();
        params.begin(vec![], 2, Duration::ZERO);
        assert!(params.consume_attempt());
        assert!(!params.consume_attempt(), "no attempts beyond NbTrans");

        let report = params.finish(false, 2).unwrap();
        assert_eq!(report.transmissions, 2);
        assert!(!report.delivered);
    }

    #[test]
    fn test_finish_when_idle_reports_nothing() {
        let mut params = RetxParams::default();
        assert_eq!(params.finish(true, 1), None);
    }

    #[test]
    fn test_nb_trans_zero_behaves_like_one() {
        let mut params = RetxParams::default();
        params.begin(vec![], 0, Duration::ZERO);
        assert_eq!(params.attempts_left(), 0);
        assert_eq!(params.finish(false, 0).unwrap().transmissions, 1);
    }

    #[test]
    #[should_panic(expected = "already in flight")]
    fn test_double_begin_panics() {
        let mut params = RetxParams::default();
        params.begin(vec![], 1, Duration::ZERO);
        params.begin(vec![], 1, Duration::ZERO);
    }
}

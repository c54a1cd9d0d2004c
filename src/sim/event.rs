//! Discrete-event queue in simulated time.
//!
//! Events are popped in non-decreasing time order; events scheduled for the
//! same instant pop in scheduling order. A cancelled event never pops.

use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

use crate::lora::SimTime;

/// Handle returned by [`EventQueue::schedule`], used to cancel the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Scheduled<E> {
    at: SimTime,
    id: TimerId,
    event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Min-heap: earliest time first, then lowest id
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority queue of future events with cancellation.
#[derive(Debug)]
pub struct EventQueue<E> {
    now: SimTime,
    next_id: u64,
    heap: BinaryHeap<Scheduled<E>>,
    cancelled: HashSet<TimerId>,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_id: 0,
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
        }
    }

    /// Time of the last popped event.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedule `event` to fire `delay` after now.
    pub fn schedule(&mut self, delay: Duration, event: E) -> TimerId {
        self.schedule_at(self.now + delay, event)
    }

    /// Schedule `event` at an absolute time, never earlier than now.
    pub fn schedule_at(&mut self, at: SimTime, event: E) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.heap.push(Scheduled {
            at: at.max(self.now),
            id,
            event,
        });
        id
    }

    /// Cancel a pending event. Cancelling a fired or unknown id is a no-op.
    pub fn cancel(&mut self, id: TimerId) {
        if self.heap.iter().any(|s| s.id == id) {
            self.cancelled.insert(id);
        }
    }

    /// Pop the next live event and advance the clock to its time.
    pub fn pop(&mut self) -> Option<(SimTime, TimerId, E)> {
        while let Some(scheduled) = self.heap.pop() {
            if self.cancelled.remove(&scheduled.id) {
                continue;
            }
            self.now = scheduled.at;
            return Some((scheduled.at, scheduled.id, scheduled.event));
        }
        None
    }

    /// Time of the next live event without popping it.
    pub fn peek_time(&mut self) -> Option<SimTime> {
        while let Some(top) = self.heap.peek() {
            if self.cancelled.contains(&top.id) {
                let id = top.id;
                self.heap.pop();
                self.cancelled.remove(&id);
                continue;
            }
            return Some(top.at);
        }
        None
    }

    /// Number of live events.
    pub fn len(&self) -> usize {
        self.heap.len() - self.cancelled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_pop_in_time_order() {
        let mut queue = EventQueue::new();
        queue.schedule(Duration::from_secs(3), "c");
        queue.schedule(Duration::from_secs(1), "a");
        queue.schedule(Duration::from_secs(2), "b");

        let order: Vec<_> = std::iter::from_fn(|| queue.pop().map(|(_, _, e)| e)).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(queue.now(), Duration::from_secs(3));
    }

    #[test]
    fn test_same_time_pops_in_scheduling_order() {
        let mut queue = EventQueue::new();
        for i in 0..5 {
            queue.schedule(Duration::from_secs(1), i);
        }
        let order: Vec<_> = std::iter::from_fn(|| queue.pop().map(|(_, _, e)| e)).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_cancelled_event_never_fires() {
        let mut queue = EventQueue::new();
        let keep = queue.schedule(Duration::from_secs(2), "keep");
        let drop = queue.schedule(Duration::from_secs(1), "drop");
        queue.cancel(drop);
        assert_eq!(queue.len(), 1);

        let (at, id, event) = queue.pop().unwrap();
        assert_eq!((at, id, event), (Duration::from_secs(2), keep, "keep"));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let mut queue = EventQueue::new();
        let id = queue.schedule(Duration::ZERO, ());
        queue.pop();
        queue.cancel(id);
        assert!(queue.is_empty());
        queue.schedule(Duration::ZERO, ());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_delay_is_relative_to_last_pop() {
        let mut queue = EventQueue::new();
        queue.schedule(Duration::from_secs(10), 0);
        queue.pop();
        queue.schedule(Duration::from_secs(5), 1);
        assert_eq!(queue.peek_time(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_schedule_in_the_past_is_clamped_to_now() {
        let mut queue = EventQueue::new();
        queue.schedule(Duration::from_secs(10), 0);
        queue.pop();
        queue.schedule_at(Duration::from_secs(1), 1);
        assert_eq!(queue.pop().unwrap().0, Duration::from_secs(10));
    }
}

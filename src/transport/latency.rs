//! Ack round-trip latency tracking for the socket transport.
//!
//! Each send records the wire-format position the relay's ack will reach
//! once it has received the frame. When a matching ack arrives, the elapsed
//! time becomes a sample in a fixed-size ring; every time the ring wraps,
//! the rolling average is reported upstream.

use std::time::{Duration, Instant};

use crate::core::constants::LATENCY_WINDOW;

/// Fixed-size ring of observed ack round-trip times.
///
/// Only one send is tracked at a time: a new send replaces any pending
/// measurement, so retransmission bursts do not produce stale samples.
#[derive(Debug)]
pub(crate) struct AckLatencyTracker {
    samples: [Duration; LATENCY_WINDOW],
    next: usize,
    /// Expected wire ack value and send instant of the pending measurement.
    pending: Option<(u32, Instant)>,
}

impl AckLatencyTracker {
    pub(crate) fn new() -> Self {
        Self {
            samples: [Duration::ZERO; LATENCY_WINDOW],
            next: 0,
            pending: None,
        }
    }

    /// Record a send expecting `expected_ack` back from the relay.
    pub(crate) fn on_send(&mut self, expected_ack: u32, now: Instant) {
        self.pending = Some((expected_ack, now));
    }

    /// Process an inbound ack.
    ///
    /// If it completes the pending measurement, the sample is stored;
    /// when the ring wraps the rolling average over the full window is
    /// returned for reporting.
    pub(crate) fn on_ack(&mut self, ack: u32, now: Instant) -> Option<Duration> {
        let (expected, sent_at) = self.pending?;
        if ack != expected {
            return None;
        }
        self.pending = None;

        self.samples[self.next] = now.duration_since(sent_at);
        self.next += 1;
        if self.next == LATENCY_WINDOW {
            self.next = 0;
            return Some(self.average());
        }
        None
    }

    /// Rolling average over the sample window.
    pub(crate) fn average(&self) -> Duration {
        let total: Duration = self.samples.iter().sum();
        total / LATENCY_WINDOW as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_ack_produces_sample() {
        let mut tracker = AckLatencyTracker::new();
        let start = Instant::now();

        tracker.on_send(1000, start);
        let avg = tracker.on_ack(1000, start + Duration::from_millis(40));

        // One sample does not wrap the ring.
        assert!(avg.is_none());
        assert_eq!(tracker.samples[0], Duration::from_millis(40));
    }

    #[test]
    fn test_mismatched_ack_keeps_pending() {
        let mut tracker = AckLatencyTracker::new();
        let start = Instant::now();

        tracker.on_send(1000, start);
        assert!(tracker.on_ack(999, start + Duration::from_millis(5)).is_none());
        assert!(tracker.pending.is_some());

        // The real ack still completes the measurement.
        assert!(tracker.on_ack(1000, start + Duration::from_millis(9)).is_none());
        assert!(tracker.pending.is_none());
    }

    #[test]
    fn test_new_send_replaces_pending() {
        let mut tracker = AckLatencyTracker::new();
        let start = Instant::now();

        tracker.on_send(100, start);
        tracker.on_send(200, start + Duration::from_millis(1));

        // The superseded ack no longer matches.
        assert!(tracker.on_ack(100, start + Duration::from_millis(2)).is_none());
        assert!(tracker.on_ack(200, start + Duration::from_millis(3)).is_none());
        assert_eq!(tracker.samples[0], Duration::from_millis(2));
    }

    #[test]
    fn test_average_on_wrap() {
        let mut tracker = AckLatencyTracker::new();
        let start = Instant::now();

        let mut reported = None;
        for i in 0..LATENCY_WINDOW as u32 {
            let sent = start + Duration::from_secs(u64::from(i));
            tracker.on_send(i, sent);
            reported = tracker.on_ack(i, sent + Duration::from_millis(20));
        }

        // Ten samples of 20ms each: the wrap reports a 20ms average.
        assert_eq!(reported, Some(Duration::from_millis(20)));

        // The ring keeps rolling after the wrap.
        tracker.on_send(99, start);
        assert!(tracker.on_ack(99, start + Duration::from_millis(1)).is_none());
    }
}

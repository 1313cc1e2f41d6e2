//! Exponential backoff policy for relay request failures.
//!
//! The delay sequence is fixed by the protocol: 1 ms after the first
//! failure, then `previous * 2 + 13`, with any value over 10000 remapped to
//! `10000 - (value % 9000)`. The remap is non-monotonic near the cap and is
//! preserved as-is; it acts as the protocol's jitter policy. A success at
//! any point resets the delay to zero.

use std::time::Duration;

use crate::core::constants::{
    BACKOFF_CAP_MS, BACKOFF_INCREMENT_MS, BACKOFF_INITIAL_MS, BACKOFF_MULTIPLIER,
    BACKOFF_REMAP_MOD_MS,
};

/// Backoff state shared by both relay transports.
///
/// `delay_ms == 0` means healthy; `scheduled` means a one-shot retry timer
/// is pending and no new send/receive attempt may be issued.
#[derive(Debug, Default)]
pub(crate) struct Backoff {
    delay_ms: u64,
    scheduled: bool,
}

impl Backoff {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Compute the next delay and mark a timer as pending.
    pub(crate) fn begin(&mut self) -> Duration {
        self.delay_ms = if self.delay_ms == 0 {
            BACKOFF_INITIAL_MS
        } else {
            self.delay_ms * BACKOFF_MULTIPLIER + BACKOFF_INCREMENT_MS
        };
        if self.delay_ms > BACKOFF_CAP_MS {
            self.delay_ms = BACKOFF_CAP_MS - (self.delay_ms % BACKOFF_REMAP_MOD_MS);
        }
        self.scheduled = true;
        Duration::from_millis(self.delay_ms)
    }

    /// The pending timer fired; attempts may be issued again. The delay is
    /// kept so the next consecutive failure keeps growing.
    pub(crate) fn timer_fired(&mut self) {
        self.scheduled = false;
    }

    /// A request succeeded; connectivity is restored.
    pub(crate) fn reset(&mut self) {
        self.delay_ms = 0;
        self.scheduled = false;
    }

    /// Whether a retry timer is pending.
    pub(crate) fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// Current delay in milliseconds (0 when healthy).
    pub(crate) fn delay_ms(&self) -> u64 {
        self.delay_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence() {
        let mut backoff = Backoff::new();

        assert_eq!(backoff.begin(), Duration::from_millis(1));
        backoff.timer_fired();
        assert_eq!(backoff.begin(), Duration::from_millis(15));
        backoff.timer_fired();
        assert_eq!(backoff.begin(), Duration::from_millis(43));
        backoff.timer_fired();
        assert_eq!(backoff.begin(), Duration::from_millis(99));
    }

    #[test]
    fn test_backoff_cap_remap() {
        let mut backoff = Backoff::new();

        // Walk the sequence until it crosses the cap.
        let mut last = 0;
        for _ in 0..16 {
            last = backoff.begin().as_millis() as u64;
            backoff.timer_fired();
            assert!(last <= BACKOFF_CAP_MS);
        }

        // 1, 15, 43, 99, 211, 435, 883, 1779, 3571, 7155 -> 14323 remaps to
        // 10000 - (14323 % 9000) = 4677.
        let mut expected = Backoff::new();
        for _ in 0..10 {
            expected.begin();
            expected.timer_fired();
        }
        assert_eq!(expected.delay_ms(), 7155);
        expected.begin();
        assert_eq!(expected.delay_ms(), 4677);

        let _ = last;
    }

    #[test]
    fn test_success_resets() {
        let mut backoff = Backoff::new();
        backoff.begin();
        backoff.timer_fired();
        backoff.begin();
        assert_eq!(backoff.delay_ms(), 15);

        backoff.reset();
        assert_eq!(backoff.delay_ms(), 0);
        assert!(!backoff.is_scheduled());

        // The sequence restarts from the beginning.
        assert_eq!(backoff.begin(), Duration::from_millis(1));
    }

    #[test]
    fn test_scheduled_flag() {
        let mut backoff = Backoff::new();
        assert!(!backoff.is_scheduled());

        backoff.begin();
        assert!(backoff.is_scheduled());

        backoff.timer_fired();
        assert!(!backoff.is_scheduled());
        assert_eq!(backoff.delay_ms(), 1);
    }
}

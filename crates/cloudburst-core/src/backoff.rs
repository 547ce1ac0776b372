//! Exponential backoff.
//!
//! Doubles the delay on every step up to a cap. Used for readiness polling
//! against a deadline and for the cooldown between failed scale-out attempts.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            current: initial,
            max,
        }
    }

    /// Return the current delay and double it for the next call.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Delay after `failures` consecutive failures: `initial * 2^(failures - 1)`, capped.
    ///
    /// Zero failures means no delay.
    pub fn delay_for(initial: Duration, max: Duration, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(failures - 1);
        initial.saturating_mul(factor).min(max.max(initial))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_cap() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(b.next_delay(), Duration::from_secs(1));
        assert_eq!(b.next_delay(), Duration::from_secs(2));
        assert_eq!(b.next_delay(), Duration::from_secs(4));
        assert_eq!(b.next_delay(), Duration::from_secs(5));
        assert_eq!(b.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn delay_for_failures() {
        let base = Duration::from_secs(60);
        let cap = Duration::from_secs(600);
        assert_eq!(Backoff::delay_for(base, cap, 0), Duration::ZERO);
        assert_eq!(Backoff::delay_for(base, cap, 1), Duration::from_secs(60));
        assert_eq!(Backoff::delay_for(base, cap, 3), Duration::from_secs(240));
        assert_eq!(Backoff::delay_for(base, cap, 40), cap);
    }
}

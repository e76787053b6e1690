//! Jittered exponential backoff for device reconnection.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with multiplicative jitter.
///
/// The base delay grows geometrically up to a ceiling; each wait is the
/// current base scaled by a uniform factor in `0.8..=1.2` so a fleet of hubs
/// probing the same bus does not sync up.
pub struct Backoff {
    initial: Duration,
    factor: f64,
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, factor: f64, ceiling: Duration) -> Self {
        Self {
            initial,
            factor,
            ceiling,
            current: initial,
        }
    }

    /// Back to the initial delay, called after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// Returns the current base delay and advances the sequence.
    pub fn next_base(&mut self) -> Duration {
        let base = self.current;
        let next = base.mul_f64(self.factor);
        self.current = next.min(self.ceiling);
        base
    }

    /// Returns the next jittered delay.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.next_base();
        let jitter = rand::thread_rng().gen_range(0.8..=1.2);
        base.mul_f64(jitter)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(500),
            1.7,
            Duration::from_secs(10),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_grows_geometrically_to_ceiling() {
        let mut b = Backoff::new(Duration::from_millis(500), 1.7, Duration::from_secs(10));

        assert_eq!(b.next_base(), Duration::from_millis(500));
        assert_eq!(b.next_base(), Duration::from_millis(850));
        assert_eq!(b.next_base(), Duration::from_millis(1445));

        // Run it out; the base must clamp at the ceiling and stay there.
        for _ in 0..20 {
            b.next_base();
        }
        assert_eq!(b.next_base(), Duration::from_secs(10));
        assert_eq!(b.next_base(), Duration::from_secs(10));
    }

    #[test]
    fn test_reset_returns_to_initial() {
        let mut b = Backoff::new(Duration::from_millis(500), 1.7, Duration::from_secs(10));
        b.next_base();
        b.next_base();

        b.reset();

        assert_eq!(b.next_base(), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_twenty_percent() {
        let mut b = Backoff::new(Duration::from_millis(1000), 1.7, Duration::from_secs(10));

        for _ in 0..100 {
            b.reset();
            let d = b.next_delay();
            assert!(d >= Duration::from_millis(800), "delay {d:?} below jitter floor");
            assert!(d <= Duration::from_millis(1200), "delay {d:?} above jitter cap");
        }
    }
}

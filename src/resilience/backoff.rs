//! Exponential backoff for the accept loop.

use std::time::Duration;

/// Doubling delay between a floor and a ceiling.
///
/// Each temporary accept error sleeps for [`AcceptBackoff::next_delay`];
/// every successful accept calls [`AcceptBackoff::reset`].
#[derive(Debug, Clone)]
pub struct AcceptBackoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl AcceptBackoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            current: floor,
        }
    }

    /// Delay to sleep now; advances the delay for the next error.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn doubles_from_floor_to_ceiling() {
        let mut backoff = AcceptBackoff::new(ms(10), ms(100));
        let delays: Vec<_> = (0..6).map(|_| backoff.next_delay()).collect();
        assert_eq!(delays, vec![ms(10), ms(20), ms(40), ms(80), ms(100), ms(100)]);
    }

    #[test]
    fn reset_returns_to_floor() {
        let mut backoff = AcceptBackoff::new(ms(10), ms(1000));
        backoff.next_delay();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), ms(10));
    }

    #[test]
    fn ceiling_below_floor_is_clamped() {
        let mut backoff = AcceptBackoff::new(ms(50), ms(5));
        assert_eq!(backoff.next_delay(), ms(50));
        assert_eq!(backoff.next_delay(), ms(50));
    }

    proptest! {
        #[test]
        fn delays_stay_within_bounds(floor in 1u64..500, extra in 0u64..10_000, errors in 1usize..64) {
            let floor = ms(floor);
            let ceiling = floor + ms(extra);
            let mut backoff = AcceptBackoff::new(floor, ceiling);

            let mut previous: Option<Duration> = None;
            for _ in 0..errors {
                let delay = backoff.next_delay();
                prop_assert!(delay >= floor && delay <= ceiling);
                if let Some(prev) = previous {
                    prop_assert_eq!(delay, (prev * 2).min(ceiling));
                } else {
                    prop_assert_eq!(delay, floor);
                }
                previous = Some(delay);
            }

            backoff.reset();
            prop_assert_eq!(backoff.next_delay(), floor);
        }
    }
}

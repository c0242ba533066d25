//! How long to wait before re-polling after a failed poll cycle.
//!
//! The channel counts consecutive failed cycles and asks the policy for the
//! delay before the next one. Any successful cycle resets the count.
//!
//! # Example
//!
//! ```
//! use core::time::Duration;
//! use webio_longpoll::retry::{Backoff, RetryPolicy};
//!
//! assert_eq!(RetryPolicy::Immediate.delay(3), Duration::ZERO);
//!
//! let fixed = RetryPolicy::default();
//! assert_eq!(fixed.delay(1), Duration::from_millis(2500));
//! assert_eq!(fixed.delay(10), Duration::from_millis(2500));
//!
//! let exp = RetryPolicy::Exponential(Backoff::new(
//!     Duration::from_millis(100),
//!     Duration::from_secs(1),
//!     2.0,
//!     0.0,
//! ));
//! assert_eq!(exp.delay(1), Duration::from_millis(100));
//! assert_eq!(exp.delay(3), Duration::from_millis(400));
//! assert_eq!(exp.delay(9), Duration::from_secs(1));
//! ```

use core::time::Duration;

use rand::Rng;

/// Fixed delay between a failed poll and its retry, unless configured
/// otherwise.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(2500);

/// Retry policy for failed poll cycles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryPolicy {
    /// Re-poll immediately. A server that keeps failing fast turns this
    /// into a tight request loop.
    Immediate,

    /// Wait a fixed delay before every retry.
    Fixed(Duration),

    /// Capped exponential backoff with jitter.
    Exponential(Backoff),
}

impl RetryPolicy {
    /// Delay before the retry that follows the `consecutive_failures`-th
    /// failure in a row (counting from 1).
    #[must_use]
    pub fn delay(&self, consecutive_failures: u32) -> Duration {
        match self {
            Self::Immediate => Duration::ZERO,
            Self::Fixed(delay) => *delay,
            Self::Exponential(backoff) => backoff.delay(consecutive_failures),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Fixed(DEFAULT_RETRY_DELAY)
    }
}

/// Exponential backoff with jitter.
///
/// Delay for attempt `n` is `min(base * factor^(n-1), max)`, scaled by a
/// random factor in `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    factor: f64,
    jitter: f64,
}

impl Backoff {
    /// Create a new backoff.
    ///
    /// * `base` - delay after the first failure
    /// * `max` - cap on the un-jittered delay
    /// * `factor` - multiplier per consecutive failure (typically 2.0)
    /// * `jitter` - randomization factor, clamped to `0.0..=1.0`
    #[must_use]
    pub fn new(base: Duration, max: Duration, factor: f64, jitter: f64) -> Self {
        Self {
            base,
            max,
            factor,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Delay for the given attempt (counting from 1; 0 is treated as 1).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let multiplier = self.factor.powi(exp);

        let capped = if multiplier.is_finite() && multiplier >= 0.0 {
            self.base.mul_f64(multiplier.min(self.max_multiplier())).min(self.max)
        } else {
            self.max
        };

        if self.jitter.is_nan() || self.jitter <= 0.0 {
            return capped;
        }

        let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        capped.mul_f64(1.0 + spread)
    }

    /// Largest multiplier that cannot overflow `Duration::mul_f64`.
    fn max_multiplier(&self) -> f64 {
        if self.base.is_zero() {
            return 1.0;
        }
        self.max.as_secs_f64() / self.base.as_secs_f64()
    }
}

impl Default for Backoff {
    /// 100 ms doubling up to 30 s, ±10% jitter.
    fn default() -> Self {
        Self::new(
            Duration::from_millis(100),
            Duration::from_secs(30),
            2.0,
            0.1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(base_ms: u64, max_ms: u64) -> Backoff {
        Backoff::new(
            Duration::from_millis(base_ms),
            Duration::from_millis(max_ms),
            2.0,
            0.0,
        )
    }

    #[test]
    fn immediate_never_waits() {
        for n in [0, 1, 2, 100, u32::MAX] {
            assert_eq!(RetryPolicy::Immediate.delay(n), Duration::ZERO);
        }
    }

    #[test]
    fn default_is_fixed_two_and_a_half_seconds() {
        assert_eq!(
            RetryPolicy::default(),
            RetryPolicy::Fixed(Duration::from_millis(2500))
        );
        assert_eq!(RetryPolicy::default().delay(7), DEFAULT_RETRY_DELAY);
    }

    #[test]
    fn exponential_doubles_until_capped() {
        let b = no_jitter(100, 500);
        assert_eq!(b.delay(1), Duration::from_millis(100));
        assert_eq!(b.delay(2), Duration::from_millis(200));
        assert_eq!(b.delay(3), Duration::from_millis(400));
        assert_eq!(b.delay(4), Duration::from_millis(500));
        assert_eq!(b.delay(50), Duration::from_millis(500));
        assert_eq!(b.delay(u32::MAX), Duration::from_millis(500));
    }

    #[test]
    fn attempt_zero_is_first_attempt() {
        let b = no_jitter(100, 500);
        assert_eq!(b.delay(0), b.delay(1));
    }

    #[test]
    fn jitter_stays_in_band() {
        let b = Backoff::new(
            Duration::from_millis(1000),
            Duration::from_secs(30),
            2.0,
            0.2,
        );
        for _ in 0..100 {
            let d = b.delay(1);
            assert!(d >= Duration::from_millis(800), "{d:?} below band");
            assert!(d <= Duration::from_millis(1200), "{d:?} above band");
        }
    }

    #[test]
    fn jitter_is_clamped() {
        let b = Backoff::new(Duration::from_millis(100), Duration::from_secs(1), 2.0, 5.0);
        for _ in 0..100 {
            assert!(b.delay(1) <= Duration::from_millis(200));
        }
    }
}

//! Delay smearing and exponential backoff.
//!
//! Smearing spreads out delays that would otherwise synchronize across
//! clients, e.g. heartbeats from many clients started by the same event.
//! The exponential backoff generator drives token-acquisition and
//! persistence retries.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;

/// Default smear fraction when the caller does not specify one.
pub const DEFAULT_SMEAR_FRACTION: f64 = 0.2;

/// Applies multiplicative jitter to delays.
///
/// For a delay `d` and fraction `f`, returns a value uniformly
/// distributed in `[d * (1 - f), d * (1 + f)]`.
pub struct Smearer {
    rng: StdRng,
    fraction: f64,
}

impl Smearer {
    /// Create a smearer. `fraction` must be in `(0, 1]`.
    pub fn new(rng: StdRng, fraction: f64) -> Self {
        assert!(
            fraction > 0.0 && fraction <= 1.0,
            "smear fraction must be in (0, 1], got {fraction}"
        );
        Smearer { rng, fraction }
    }

    /// Return `delay` jittered by up to `fraction` in either direction.
    pub fn smear(&mut self, delay: Duration) -> Duration {
        let factor = (2.0 * self.rng.gen::<f64>() - 1.0) * self.fraction;
        Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
    }
}

/// Generates smeared, exponentially growing delays with a cap.
///
/// `next_delay` returns the smeared current delay and then doubles the
/// current delay, capped at `max`. `reset` restores the initial delay
/// after a success.
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    smearer: Smearer,
}

impl ExponentialBackoff {
    /// Create a generator starting at `initial` and capped at `max`.
    pub fn new(smearer: Smearer, initial: Duration, max: Duration) -> Self {
        ExponentialBackoff {
            initial,
            max,
            current: initial,
            smearer,
        }
    }

    /// Return the next delay and advance the generator.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.smearer.smear(self.current);
        self.current = std::cmp::min(self.current * 2, self.max);
        delay
    }

    /// Restore the initial delay.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

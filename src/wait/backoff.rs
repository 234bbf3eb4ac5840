//! Backoff delays between poll attempts.
//!
//! Delays grow multiplicatively from the initial delay and are capped at the
//! maximum delay. There is no jitter and no attempt limit; the total wait is
//! bounded only by the caller's context.

use std::time::Duration;

/// Per-call polling options.
///
/// Zero values are placeholders for "use the call site's default" and are
/// replaced by [`PollOptions::normalized`] before a poll starts.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PollOptions {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay between attempts.
    pub max_delay: Duration,
    /// Multiplicative growth applied after every delay.
    pub backoff_factor: f64,
}

impl PollOptions {
    /// Defaults for fast-converging resources (credentials, installations).
    pub const FAST: Self = Self {
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(10),
        backoff_factor: 1.1,
    };

    /// Defaults for readiness waits on running workloads.
    pub const READINESS: Self = Self {
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(30),
        backoff_factor: 1.1,
    };

    /// Defaults for slow operations such as recreation or order fulfilment.
    pub const SLOW: Self = Self {
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(60),
        backoff_factor: 1.1,
    };

    /// Creates options with explicit values.
    #[must_use]
    pub const fn new(initial_delay: Duration, max_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_factor,
        }
    }

    /// Replaces zero values with `defaults` and enforces the growth invariants.
    ///
    /// A factor below 1.0 is raised to 1.0 and an initial delay above the
    /// maximum is lowered to the maximum, so delays never shrink and never
    /// exceed the cap.
    #[must_use]
    pub fn normalized(self, defaults: Self) -> Self {
        let max_delay = if self.max_delay.is_zero() {
            defaults.max_delay
        } else {
            self.max_delay
        };
        let initial_delay = if self.initial_delay.is_zero() {
            defaults.initial_delay
        } else {
            self.initial_delay
        };
        let backoff_factor = if self.backoff_factor.is_nan() || self.backoff_factor <= 0.0 {
            defaults.backoff_factor
        } else {
            self.backoff_factor
        };

        Self {
            initial_delay: initial_delay.min(max_delay),
            max_delay,
            backoff_factor: backoff_factor.max(1.0),
        }
    }
}

/// Stateful delay generator.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    next: Duration,
    max: Duration,
    factor: f64,
}

impl BackoffPolicy {
    /// Creates a generator from options that have already been normalized.
    #[must_use]
    pub const fn new(options: &PollOptions) -> Self {
        Self {
            next: options.initial_delay,
            max: options.max_delay,
            factor: options.backoff_factor,
        }
    }

    /// Returns the delay to wait before the next attempt and advances the state.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        let grown = Duration::from_secs_f64(
            (delay.as_secs_f64() * self.factor).min(self.max.as_secs_f64()),
        );
        self.next = grown.max(delay).min(self.max);
        delay
    }

    /// Returns the delay the next call to [`Self::next_delay`] will produce.
    #[must_use]
    pub const fn peek(&self) -> Duration {
        self.next
    }
}

impl Iterator for BackoffPolicy {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_delay())
    }
}

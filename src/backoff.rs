use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use rand::Rng;

use crate::{clock::SystemClock, Clock, FluentError, Result};

/// Configures exponential backoff between attempts.
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Growth factor applied per retry. Must be at least 1.
    pub multiplier: f64,
    /// Jitter ratio in `[0, 1]`; each delay is drawn uniformly from
    /// `delay * (1 ± randomization_factor)`.
    pub randomization_factor: f64,
    /// Upper bound for any single delay.
    pub max_interval: Duration,
    /// Upper bound for the whole run, measured from the first attempt.
    /// `None` or a zero duration disables the bound.
    pub max_elapsed_time: Option<Duration>,
    /// Time source for elapsed-time bookkeeping and sleeping.
    pub clock: Arc<dyn Clock>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_interval: Duration::from_secs(60),
            max_elapsed_time: Some(Duration::from_secs(15 * 60)),
            clock: Arc::new(SystemClock),
        }
    }
}

impl BackoffPolicy {
    pub fn validate(&self) -> Result<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(FluentError::Config(format!(
                "backoff multiplier must be a finite value >= 1, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.randomization_factor) {
            return Err(FluentError::Config(format!(
                "randomization factor must be within [0, 1], got {}",
                self.randomization_factor
            )));
        }
        Ok(())
    }

    /// Un-randomized delay before retry number `attempt_index` (0-based),
    /// capped at [`BackoffPolicy::max_interval`].
    pub fn interval_for(&self, attempt_index: u32) -> Duration {
        if self.initial_interval.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt_index).unwrap_or(i32::MAX);
        let delay = self.initial_interval.as_nanos() as f64 * self.multiplier.powi(exponent);
        if !delay.is_finite() || delay >= self.max_interval.as_nanos() as f64 {
            return self.max_interval;
        }
        from_nanos_f64(delay)
    }

    /// Starts a fresh schedule for one run, reading the start time from the
    /// policy clock.
    pub fn start(&self) -> ExponentialBackoff<'_> {
        ExponentialBackoff {
            policy: self,
            started_at: self.clock.now(),
            attempt_index: 0,
        }
    }
}

/// Draws a delay uniformly from `base * (1 ± factor)`, never above `max`.
pub(crate) fn randomize<R: Rng + ?Sized>(
    base: Duration,
    factor: f64,
    max: Duration,
    rng: &mut R,
) -> Duration {
    if factor <= 0.0 || base.is_zero() {
        return base.min(max);
    }
    let base = base.as_nanos() as f64;
    let low = base * (1.0 - factor);
    let high = base * (1.0 + factor);
    let sampled = rng.gen_range(low..=high);
    from_nanos_f64(sampled).min(max)
}

fn from_nanos_f64(nanos: f64) -> Duration {
    Duration::from_nanos(nanos.round() as u64)
}

/// Per-run backoff state.
#[derive(Debug)]
pub struct ExponentialBackoff<'a> {
    policy: &'a BackoffPolicy,
    started_at: Instant,
    attempt_index: u32,
}

impl ExponentialBackoff<'_> {
    /// Number of delays handed out so far.
    pub fn attempt_index(&self) -> u32 {
        self.attempt_index
    }

    pub fn elapsed(&self) -> Duration {
        self.policy
            .clock
            .now()
            .saturating_duration_since(self.started_at)
    }

    /// Returns the next delay, or `None` when waiting it out would push the
    /// run past `max_elapsed_time`.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.next_delay_with(&mut rand::thread_rng())
    }

    pub(crate) fn next_delay_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Duration> {
        let base = self.policy.interval_for(self.attempt_index);
        let delay = randomize(
            base,
            self.policy.randomization_factor,
            self.policy.max_interval,
            rng,
        );

        if let Some(limit) = self.policy.max_elapsed_time.filter(|limit| !limit.is_zero()) {
            if self.elapsed().saturating_add(delay) > limit {
                return None;
            }
        }

        self.attempt_index = self.attempt_index.saturating_add(1);
        Some(delay)
    }

    /// Blocks for `delay` using the policy clock.
    pub fn wait(&self, delay: Duration) {
        self.policy.clock.sleep(delay);
    }
}

//! Retry policy configuration and the backoff schedule it produces.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Errors rejected when building or deserializing a [`RetryPolicy`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// At least one attempt is required.
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    /// The backoff multiplier must be finite and not shrink the interval.
    #[error("multiplier must be a finite number >= 1.0 (got {0})")]
    InvalidMultiplier(f64),

    /// Jitter is a fraction of the wait and must lie in `[0, 1]`.
    #[error("jitter must be a finite fraction between 0 and 1 (got {0})")]
    InvalidJitter(f64),

    /// The first wait may not exceed the cap.
    #[error("initial interval {initial:?} exceeds max interval {max:?}")]
    IntervalOrder {
        /// Configured initial interval.
        initial: Duration,
        /// Configured cap.
        max: Duration,
    },
}

/// Bounded exponential backoff with symmetric jitter.
///
/// Instances are always valid: the only ways to obtain one are
/// [`RetryPolicy::builder`], the constructors on this type, and
/// deserialization, which runs the same validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "RetryPolicyConfig", try_from = "RetryPolicyConfig")]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_interval: Duration,
    max_interval: Duration,
    multiplier: f64,
    jitter: f64,
}

impl Default for RetryPolicy {
    /// 3 attempts, 100ms doubling up to 10s, 10% jitter.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Start building a policy from the defaults.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// A policy that runs the operation exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Total number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait before the second attempt, before jitter.
    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    /// Upper bound for the un-jittered wait.
    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// Growth factor applied after every attempt.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Fraction of the wait used as the jitter radius.
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// A fresh backoff schedule for one run.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            current: self.initial_interval,
            max: self.max_interval,
            multiplier: self.multiplier,
        }
    }

    /// Perturb `base` uniformly within `base ± jitter * base`.
    pub fn jittered<R: Rng>(&self, base: Duration, rng: &mut R) -> Duration {
        if self.jitter == 0.0 || base.is_zero() {
            return base;
        }
        let nanos = base.as_nanos() as f64;
        let radius = nanos * self.jitter;
        let sampled = rng.random_range((nanos - radius)..=(nanos + radius));
        Duration::from_nanos(sampled.max(0.0) as u64)
    }
}

/// Deterministic part of the retry schedule.
///
/// Each call to [`Backoff::next_base`] yields `min(current, max)` and then
/// grows `current` by the multiplier, saturating at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
    multiplier: f64,
}

impl Backoff {
    /// The next un-jittered wait.
    pub fn next_base(&mut self) -> Duration {
        let wait = self.current.min(self.max);
        let max_nanos = self.max.as_nanos() as f64;
        let grown = (self.current.as_nanos() as f64 * self.multiplier).min(max_nanos);
        self.current = Duration::from_nanos(grown as u64);
        wait
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_base())
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicyBuilder {
    /// Create a builder seeded with [`RetryPolicy::default`].
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::default(),
        }
    }

    /// Total number of attempts, including the first.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    /// Wait before the second attempt.
    pub fn initial_interval(mut self, interval: Duration) -> Self {
        self.policy.initial_interval = interval;
        self
    }

    /// Cap for the un-jittered wait.
    pub fn max_interval(mut self, interval: Duration) -> Self {
        self.policy.max_interval = interval;
        self
    }

    /// Growth factor between attempts.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.policy.multiplier = multiplier;
        self
    }

    /// Jitter radius as a fraction of the wait; `0.0` disables jitter.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.policy.jitter = jitter;
        self
    }

    /// Validate and produce the policy.
    pub fn build(self) -> Result<RetryPolicy, PolicyError> {
        let p = self.policy;
        if p.max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if !p.multiplier.is_finite() || p.multiplier < 1.0 {
            return Err(PolicyError::InvalidMultiplier(p.multiplier));
        }
        if !p.jitter.is_finite() || !(0.0..=1.0).contains(&p.jitter) {
            return Err(PolicyError::InvalidJitter(p.jitter));
        }
        if p.initial_interval > p.max_interval {
            return Err(PolicyError::IntervalOrder {
                initial: p.initial_interval,
                max: p.max_interval,
            });
        }
        Ok(p)
    }
}

/// Serialized form of a [`RetryPolicy`], with intervals in milliseconds.
///
/// Sub-millisecond precision lives in the `*_extra_ns` fields, which are
/// omitted when zero, so a policy survives a save and reload unchanged.
/// Missing fields fall back to the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    /// Total number of attempts.
    pub max_attempts: u32,
    /// Initial wait in whole milliseconds.
    pub initial_interval_ms: u64,
    /// Nanoseconds added to `initial_interval_ms`.
    #[serde(skip_serializing_if = "is_zero")]
    pub initial_interval_extra_ns: u32,
    /// Wait cap in whole milliseconds.
    pub max_interval_ms: u64,
    /// Nanoseconds added to `max_interval_ms`.
    #[serde(skip_serializing_if = "is_zero")]
    pub max_interval_extra_ns: u32,
    /// Growth factor.
    pub multiplier: f64,
    /// Jitter fraction.
    pub jitter: f64,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// Split `d` into whole milliseconds and the nanosecond remainder.
fn split_millis(d: Duration) -> (u64, u32) {
    let millis = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
    (millis, d.subsec_nanos() % 1_000_000)
}

fn join_millis(millis: u64, extra_ns: u32) -> Duration {
    Duration::from_millis(millis).saturating_add(Duration::from_nanos(u64::from(extra_ns)))
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        RetryPolicy::default().into()
    }
}

impl From<RetryPolicy> for RetryPolicyConfig {
    fn from(p: RetryPolicy) -> Self {
        let (initial_interval_ms, initial_interval_extra_ns) = split_millis(p.initial_interval);
        let (max_interval_ms, max_interval_extra_ns) = split_millis(p.max_interval);
        Self {
            max_attempts: p.max_attempts,
            initial_interval_ms,
            initial_interval_extra_ns,
            max_interval_ms,
            max_interval_extra_ns,
            multiplier: p.multiplier,
            jitter: p.jitter,
        }
    }
}

impl TryFrom<RetryPolicyConfig> for RetryPolicy {
    type Error = PolicyError;

    fn try_from(c: RetryPolicyConfig) -> Result<Self, Self::Error> {
        RetryPolicy::builder()
            .max_attempts(c.max_attempts)
            .initial_interval(join_millis(c.initial_interval_ms, c.initial_interval_extra_ns))
            .max_interval(join_millis(c.max_interval_ms, c.max_interval_extra_ns))
            .multiplier(c.multiplier)
            .jitter(c.jitter)
            .build()
    }
}

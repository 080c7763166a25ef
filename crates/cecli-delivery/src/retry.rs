//! Fixed-delay retry policy.
//!
//! A delivery makes up to `attempts` submissions separated by a constant
//! delay. [`decide`] maps an attempt's outcome to what the manager does next.
//! Hard failures are reserved for the final attempt, so every earlier failure
//! is retried regardless of its kind.

use std::time::Duration;

use cecli_core::{EventError, Result};

use crate::{client::DeliveryOutcome, manager::DeliveryState};

/// Attempts made when none are configured.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Delay between attempts when none is configured.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1000);

/// Retry policy for a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    attempts: u32,
    delay: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self { attempts: DEFAULT_ATTEMPTS, delay: DEFAULT_DELAY }
    }
}

impl DeliveryPolicy {
    /// Creates a policy of `attempts` submissions spaced by `delay`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if `attempts` is zero.
    pub fn new(attempts: u32, delay: Duration) -> Result<Self> {
        if attempts == 0 {
            return Err(EventError::invalid_format("retry count must be at least 1"));
        }
        Ok(Self { attempts, delay })
    }

    /// Like [`DeliveryPolicy::new`] with the delay in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if `attempts` is zero.
    pub fn from_millis(attempts: u32, delay_ms: u64) -> Result<Self> {
        Self::new(attempts, Duration::from_millis(delay_ms))
    }

    /// Total number of submissions, including the first.
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Wait between consecutive submissions.
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    pub(crate) fn set_attempts(&mut self, attempts: u32) -> Result<()> {
        *self = Self::new(attempts, self.delay)?;
        Ok(())
    }

    pub(crate) fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    /// Returns true if the zero-based `index` is the last allowed attempt.
    pub const fn is_final_attempt(&self, index: u32) -> bool {
        index.saturating_add(1) >= self.attempts
    }
}

/// What to do after an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// The receiver acknowledged the event.
    Delivered,
    /// Wait `delay` and try again.
    Retry {
        /// Time to wait before the next attempt.
        delay: Duration,
    },
    /// Attempts ran out without an acknowledgement or a hard failure.
    Exhausted,
    /// Stop with an error.
    Fail {
        /// State the delivery ends in.
        state: DeliveryState,
        /// Error returned to the caller.
        error: EventError,
    },
}

/// Decides the next step after the attempt at zero-based `index`.
pub fn decide(outcome: &DeliveryOutcome, index: u32, policy: &DeliveryPolicy) -> RetryDecision {
    if outcome.is_ack() {
        return RetryDecision::Delivered;
    }

    if !policy.is_final_attempt(index) {
        return RetryDecision::Retry { delay: policy.delay() };
    }

    match outcome {
        DeliveryOutcome::Nack { .. } => RetryDecision::Fail {
            state: DeliveryState::NotAccepted,
            error: EventError::not_accepted(format!("event not accepted: {outcome}")),
        },
        DeliveryOutcome::Undelivered { reason } => RetryDecision::Fail {
            state: DeliveryState::SendFailed,
            error: EventError::send_failed(format!("failed to send event: {reason}")),
        },
        DeliveryOutcome::Ack { .. } | DeliveryOutcome::Indeterminate { .. } => {
            RetryDecision::Exhausted
        },
    }
}

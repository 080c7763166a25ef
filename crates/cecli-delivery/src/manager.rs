//! Retry-send state machine for a single event.
//!
//! A [`DeliveryManager`] owns one event and its [`DeliveryPolicy`]. Each call
//! to [`DeliveryManager::send`] walks the event from `Sending` to a terminal
//! state, waiting the policy delay between attempts. The wait only suspends
//! the calling task.

use std::time::Duration;

use cecli_core::{Event, EventError, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    client::EventSender,
    retry::{self, DeliveryPolicy, RetryDecision},
};

/// Where a delivery is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryState {
    /// No send has been started.
    Idle,
    /// An attempt is in flight.
    Sending,
    /// Waiting out the delay before the next attempt.
    Retrying,
    /// The receiver acknowledged the event.
    Acked,
    /// Attempts ran out on an indeterminate outcome.
    Exhausted,
    /// The final attempt never reached the receiver, or sending was cancelled.
    SendFailed,
    /// The receiver rejected the final attempt.
    NotAccepted,
}

impl DeliveryState {
    /// Returns true once no further attempt will be made.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Acked | Self::Exhausted | Self::SendFailed | Self::NotAccepted)
    }
}

/// Summary of a send that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Terminal state, either `Acked` or `Exhausted`.
    pub state: DeliveryState,
    /// Number of attempts made.
    pub attempts: u32,
}

/// Sends one event with retries.
#[derive(Debug, Clone)]
pub struct DeliveryManager {
    event: Event,
    policy: DeliveryPolicy,
    state: DeliveryState,
}

impl DeliveryManager {
    /// Creates a manager for `event` with the default policy.
    pub fn new(event: Event) -> Self {
        Self::with_policy(event, DeliveryPolicy::default())
    }

    /// Creates a manager for `event` with an explicit policy.
    pub const fn with_policy(event: Event, policy: DeliveryPolicy) -> Self {
        Self { event, policy, state: DeliveryState::Idle }
    }

    /// Returns the event being delivered.
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Returns the retry policy in effect.
    pub const fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    /// Returns the current lifecycle state.
    pub const fn state(&self) -> DeliveryState {
        self.state
    }

    /// Sets the total number of attempts.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if `attempts` is zero.
    pub fn set_attempts(&mut self, attempts: u32) -> Result<()> {
        self.policy.set_attempts(attempts)
    }

    /// Sets the wait between attempts.
    pub fn set_delay(&mut self, delay: Duration) {
        self.policy.set_delay(delay);
    }

    /// Replaces the event payload with the JSON document in `raw`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if `raw` is not valid JSON. The previous
    /// payload is kept.
    pub fn load_json_data(&mut self, raw: &[u8]) -> Result<()> {
        self.event.load_json_data(raw)
    }

    /// Returns the structured-mode JSON encoding of the event.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the event cannot be serialized.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        self.event.to_json()
    }

    /// Sends the event until it is acknowledged or attempts run out.
    ///
    /// # Errors
    ///
    /// Returns `NotAccepted` if the final attempt was rejected and
    /// `SendFailed` if it never reached the receiver. An indeterminate final
    /// attempt is not an error; the report's state is `Exhausted`.
    pub async fn send<S>(&mut self, sender: &S) -> Result<DeliveryReport>
    where
        S: EventSender + ?Sized,
    {
        self.send_with_shutdown(sender, &CancellationToken::new()).await
    }

    /// Like [`DeliveryManager::send`], but stops waiting for the next attempt
    /// once `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Same as [`DeliveryManager::send`], plus `SendFailed` on cancellation.
    pub async fn send_with_shutdown<S>(
        &mut self,
        sender: &S,
        shutdown: &CancellationToken,
    ) -> Result<DeliveryReport>
    where
        S: EventSender + ?Sized,
    {
        let attempts = self.policy.attempts();

        for index in 0..attempts {
            let attempt = index + 1;
            self.state = DeliveryState::Sending;
            debug!(event_id = %self.event.id(), attempt, attempts, "sending event");

            let outcome = sender.send(&self.event).await;

            match retry::decide(&outcome, index, &self.policy) {
                RetryDecision::Delivered => {
                    self.state = DeliveryState::Acked;
                    info!(event_id = %self.event.id(), attempt, %outcome, "event delivered");
                    return Ok(DeliveryReport { state: self.state, attempts: attempt });
                },
                RetryDecision::Exhausted => {
                    self.state = DeliveryState::Exhausted;
                    warn!(event_id = %self.event.id(), attempts, %outcome, "attempts exhausted");
                    return Ok(DeliveryReport { state: self.state, attempts: attempt });
                },
                RetryDecision::Fail { state, error } => {
                    self.state = state;
                    error!(event_id = %self.event.id(), attempts, %outcome, "delivery failed");
                    return Err(error);
                },
                RetryDecision::Retry { delay } => {
                    self.state = DeliveryState::Retrying;
                    warn!(
                        event_id = %self.event.id(),
                        attempt,
                        delay_ms = delay.as_millis(),
                        %outcome,
                        "delivery attempt failed"
                    );

                    tokio::select! {
                        biased;
                        () = shutdown.cancelled() => {
                            self.state = DeliveryState::SendFailed;
                            return Err(EventError::send_failed(format!(
                                "delivery cancelled after {attempt} attempt(s)"
                            )));
                        },
                        () = tokio::time::sleep(delay) => {},
                    }

                    info!(attempt = attempt + 1, attempts, "retrying event delivery");
                },
            }
        }

        // Only reachable if the policy allowed zero attempts.
        self.state = DeliveryState::Exhausted;
        Ok(DeliveryReport { state: self.state, attempts })
    }
}

//! Retry scheduling after a terminal call outcome.

use chrono::{DateTime, Duration, Utc};

use crate::campaign::Pacing;
use crate::contact::CampaignContact;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Eligible again at the given instant.
    Retry { next_attempt_at: DateTime<Utc> },
    /// Retryable status but the attempt budget is spent.
    Exhausted,
    /// The outcome is not retryable.
    Final,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryScheduler {
    max_attempts: u32,
    retry_delay: Duration,
}

impl RetryScheduler {
    pub fn new(pacing: &Pacing) -> Self {
        Self {
            max_attempts: pacing.max_attempts_per_contact,
            retry_delay: pacing.retry_delay(),
        }
    }

    /// Attempts are counted at dispatch, so `contact.attempts` already
    /// includes the attempt that just ended.
    pub fn decide(&self, contact: &CampaignContact, outcome_at: DateTime<Utc>) -> RetryDecision {
        if !contact.status.is_retryable() {
            return RetryDecision::Final;
        }
        if contact.attempts >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        RetryDecision::Retry {
            next_attempt_at: outcome_at + self.retry_delay,
        }
    }

    /// Decide and write `next_attempt_at`.
    pub fn apply(&self, contact: &mut CampaignContact, outcome_at: DateTime<Utc>) -> RetryDecision {
        let decision = self.decide(contact, outcome_at);
        contact.next_attempt_at = match decision {
            RetryDecision::Retry { next_attempt_at } => Some(next_attempt_at),
            RetryDecision::Exhausted | RetryDecision::Final => None,
        };
        decision
    }
}

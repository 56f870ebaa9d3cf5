//! Campaign contact rows.
//!
//! A `CampaignContact` joins a campaign with an external CRM contact. The
//! campaign owns the row; the CRM owns the person.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::campaign::CampaignId;

use super::Disposition;

/// Identifier of a campaign-contact row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CampaignContactId(pub Uuid);

impl CampaignContactId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for CampaignContactId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CampaignContactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CampaignContactId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Reference to a contact record held by the CRM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactRef(pub i64);

impl std::fmt::Display for ContactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-contact dialing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    #[default]
    Pending,
    Calling,
    Completed,
    Failed,
    NoAnswer,
    Busy,
    Skipped,
}

impl ContactStatus {
    pub const ALL: [ContactStatus; 7] = [
        ContactStatus::Pending,
        ContactStatus::Calling,
        ContactStatus::Completed,
        ContactStatus::Failed,
        ContactStatus::NoAnswer,
        ContactStatus::Busy,
        ContactStatus::Skipped,
    ];

    /// Outcome statuses that may schedule another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ContactStatus::Failed | ContactStatus::NoAnswer | ContactStatus::Busy
        )
    }
}

impl std::fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContactStatus::Pending => write!(f, "pending"),
            ContactStatus::Calling => write!(f, "calling"),
            ContactStatus::Completed => write!(f, "completed"),
            ContactStatus::Failed => write!(f, "failed"),
            ContactStatus::NoAnswer => write!(f, "no_answer"),
            ContactStatus::Busy => write!(f, "busy"),
            ContactStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// A contact attached to a campaign, with its dialing history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignContact {
    pub id: CampaignContactId,
    pub campaign_id: CampaignId,
    pub contact_id: ContactRef,
    pub phone_number: String,
    pub status: ContactStatus,
    /// Attempts in the current cycle. `reset` clears it.
    pub attempts: u32,
    /// Calls placed over the row's lifetime, across resets.
    #[serde(default)]
    pub calls_made: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Set only while a retry is scheduled.
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_call_duration_seconds: Option<u32>,
    pub last_call_outcome: Option<String>,
    /// Talk time over the row's lifetime, across resets.
    pub total_call_duration_seconds: u64,
    pub priority: i32,
    /// Insertion order within the campaign; breaks selection ties.
    pub sequence: u64,
    pub disposition: Option<Disposition>,
    pub disposition_notes: Option<String>,
    pub callback_requested_at: Option<DateTime<Utc>>,
    pub added_at: DateTime<Utc>,
}

impl CampaignContact {
    pub fn new(
        campaign_id: CampaignId,
        contact_id: ContactRef,
        phone_number: &str,
        priority: i32,
        sequence: u64,
    ) -> Self {
        Self {
            id: CampaignContactId::new(),
            campaign_id,
            contact_id,
            phone_number: phone_number.to_string(),
            status: ContactStatus::Pending,
            attempts: 0,
            calls_made: 0,
            last_attempt_at: None,
            next_attempt_at: None,
            last_call_duration_seconds: None,
            last_call_outcome: None,
            total_call_duration_seconds: 0,
            priority,
            sequence,
            disposition: None,
            disposition_notes: None,
            callback_requested_at: None,
            added_at: Utc::now(),
        }
    }

    /// Eligible for admission at `now` under an attempt budget of `max_attempts`.
    pub fn is_selectable(&self, now: DateTime<Utc>, max_attempts: u32) -> bool {
        if self.attempts >= max_attempts {
            return false;
        }
        match self.status {
            ContactStatus::Pending => true,
            status if status.is_retryable() => self.next_attempt_at.is_some_and(|at| at <= now),
            _ => false,
        }
    }

    /// Whether the contact may still be dialed at some point.
    pub fn has_remaining_work(&self, max_attempts: u32) -> bool {
        if self.attempts >= max_attempts {
            return false;
        }
        match self.status {
            ContactStatus::Pending => true,
            status if status.is_retryable() => self.next_attempt_at.is_some(),
            _ => false,
        }
    }

    /// Start a fresh dialing cycle. Dispositions and the lifetime
    /// `calls_made` and talk-time totals are kept.
    pub fn reset(&mut self) {
        self.status = ContactStatus::Pending;
        self.attempts = 0;
        self.last_attempt_at = None;
        self.next_attempt_at = None;
        self.last_call_duration_seconds = None;
        self.last_call_outcome = None;
    }
}

//! Campaign statistics.
//!
//! `StatsAggregator` keeps counters up to date as rows change.
//! `CampaignStats::from_contacts` recomputes the same figures from scratch;
//! the two must always agree.

use serde::{Deserialize, Serialize};

use crate::contact::{CampaignContact, ContactStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignStats {
    pub total_contacts: u32,
    pub contacts_pending: u32,
    pub contacts_calling: u32,
    pub contacts_completed: u32,
    pub contacts_failed: u32,
    pub contacts_no_answer: u32,
    pub contacts_busy: u32,
    pub contacts_skipped: u32,
    /// Calls placed to attached contacts, including cycles before a
    /// restart or re-arm.
    pub total_calls_made: u64,
    pub total_call_duration_seconds: u64,
    pub average_call_duration_seconds: f64,
    /// Completed contacts over total contacts, in `[0, 1]`.
    pub completion_rate: f64,
}

impl CampaignStats {
    pub fn from_contacts<'a>(contacts: impl IntoIterator<Item = &'a CampaignContact>) -> Self {
        let mut stats = Self::default();
        for c in contacts {
            stats.add(&ContactTally::of(c));
        }
        stats.derive();
        stats
    }

    pub fn count(&self, status: ContactStatus) -> u32 {
        match status {
            ContactStatus::Pending => self.contacts_pending,
            ContactStatus::Calling => self.contacts_calling,
            ContactStatus::Completed => self.contacts_completed,
            ContactStatus::Failed => self.contacts_failed,
            ContactStatus::NoAnswer => self.contacts_no_answer,
            ContactStatus::Busy => self.contacts_busy,
            ContactStatus::Skipped => self.contacts_skipped,
        }
    }

    fn count_mut(&mut self, status: ContactStatus) -> &mut u32 {
        match status {
            ContactStatus::Pending => &mut self.contacts_pending,
            ContactStatus::Calling => &mut self.contacts_calling,
            ContactStatus::Completed => &mut self.contacts_completed,
            ContactStatus::Failed => &mut self.contacts_failed,
            ContactStatus::NoAnswer => &mut self.contacts_no_answer,
            ContactStatus::Busy => &mut self.contacts_busy,
            ContactStatus::Skipped => &mut self.contacts_skipped,
        }
    }

    fn add(&mut self, tally: &ContactTally) {
        self.total_contacts += 1;
        *self.count_mut(tally.status) += 1;
        self.total_calls_made += tally.calls_made as u64;
        self.total_call_duration_seconds += tally.duration_seconds;
    }

    fn subtract(&mut self, tally: &ContactTally) {
        self.total_contacts = self.total_contacts.saturating_sub(1);
        let count = self.count_mut(tally.status);
        *count = count.saturating_sub(1);
        self.total_calls_made = self.total_calls_made.saturating_sub(tally.calls_made as u64);
        self.total_call_duration_seconds = self
            .total_call_duration_seconds
            .saturating_sub(tally.duration_seconds);
    }

    fn derive(&mut self) {
        self.average_call_duration_seconds = if self.total_calls_made > 0 {
            self.total_call_duration_seconds as f64 / self.total_calls_made as f64
        } else {
            0.0
        };
        self.completion_rate = if self.total_contacts > 0 {
            self.contacts_completed as f64 / self.total_contacts as f64
        } else {
            0.0
        };
    }
}

/// The parts of a contact row that statistics depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactTally {
    pub status: ContactStatus,
    pub calls_made: u32,
    pub duration_seconds: u64,
}

impl ContactTally {
    pub fn of(contact: &CampaignContact) -> Self {
        Self {
            status: contact.status,
            calls_made: contact.calls_made,
            duration_seconds: contact.total_call_duration_seconds,
        }
    }
}

/// Incrementally maintained statistics.
#[derive(Debug, Clone, Default)]
pub struct StatsAggregator {
    stats: CampaignStats,
}

impl StatsAggregator {
    /// Fold a row change in. `None` before means the row was added; `None`
    /// after means it was removed.
    pub fn record(&mut self, before: Option<ContactTally>, after: Option<ContactTally>) {
        if before == after {
            return;
        }
        if let Some(before) = before {
            self.stats.subtract(&before);
        }
        if let Some(after) = after {
            self.stats.add(&after);
        }
        self.stats.derive();
    }

    pub fn snapshot(&self) -> CampaignStats {
        self.stats.clone()
    }

    /// Replace the counters with a full recomputation.
    pub fn reset_to(&mut self, stats: CampaignStats) {
        self.stats = stats;
    }
}

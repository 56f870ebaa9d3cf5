//! Contact selection and bulk-add planning.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contact::{CampaignContact, CampaignContactId, ContactRef, ContactStatus};
use crate::crm::CrmContact;

/// Picks the next contacts to dial.
///
/// Order is priority descending, then `next_attempt_at` ascending with
/// never-scheduled contacts first, then insertion order. The order is
/// total, so selection is deterministic for a given roster and instant.
pub struct ContactSelector;

impl ContactSelector {
    pub fn select<'a>(
        contacts: impl IntoIterator<Item = &'a CampaignContact>,
        limit: usize,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Vec<CampaignContactId> {
        if limit == 0 {
            return Vec::new();
        }
        let mut eligible: Vec<&CampaignContact> = contacts
            .into_iter()
            .filter(|c| c.is_selectable(now, max_attempts))
            .collect();
        eligible.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.next_attempt_at.cmp(&b.next_attempt_at))
                .then(a.sequence.cmp(&b.sequence))
        });
        eligible.into_iter().take(limit).map(|c| c.id).collect()
    }

    /// Split CRM matches into new contacts and contacts already attached.
    ///
    /// Preview and commit both go through this, so their counts agree for
    /// the same roster and matches. Repeated CRM ids count once, first
    /// occurrence wins.
    pub fn plan_bulk_add(
        existing: &HashMap<ContactRef, &CampaignContact>,
        matching: Vec<CrmContact>,
        exclude_existing: bool,
    ) -> BulkAddPlan {
        let mut seen = HashSet::new();
        let matching: Vec<CrmContact> = matching.into_iter().filter(|c| seen.insert(c.id)).collect();
        let total_matching = matching.len() as u32;
        let mut plan = BulkAddPlan {
            total_matching,
            ..Default::default()
        };
        for crm in matching {
            match existing.get(&crm.id) {
                None => plan.new_contacts.push(crm),
                Some(attached) => {
                    plan.already_in_campaign += 1;
                    if !exclude_existing && attached.status != ContactStatus::Calling {
                        plan.rearm.push(attached.id);
                    }
                }
            }
        }
        plan
    }
}

#[derive(Debug, Clone, Default)]
pub struct BulkAddPlan {
    pub total_matching: u32,
    pub already_in_campaign: u32,
    pub new_contacts: Vec<CrmContact>,
    /// Attached contacts, not in flight, to return to pending.
    pub rearm: Vec<CampaignContactId>,
}

impl BulkAddPlan {
    pub fn will_be_added(&self) -> u32 {
        (self.new_contacts.len() + self.rearm.len()) as u32
    }

    pub fn preview(&self) -> FilterPreview {
        FilterPreview {
            total_matching: self.total_matching,
            already_in_campaign: self.already_in_campaign,
            will_be_added: self.will_be_added(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPreview {
    pub total_matching: u32,
    pub already_in_campaign: u32,
    pub will_be_added: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkAddResult {
    pub added: u32,
    pub total_matching: u32,
}

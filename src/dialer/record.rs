//! Per-campaign aggregate.
//!
//! `CampaignRecord` owns everything about one campaign: lifecycle, roster,
//! pacing history, in-flight calls and statistics. Every method takes the
//! current instant explicitly and none of them block, so the admission
//! loop, the outcome pump and operator commands serialize on a single lock
//! around the record.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::campaign::{Campaign, CampaignCommand, CampaignId, CampaignSpec, CampaignState, CampaignStatus};
use crate::config::RestartPolicy;
use crate::contact::{
    CampaignContact, CampaignContactId, ContactRef, ContactStatus, DispositionRecord,
    DispositionStats, DispositionUpdate,
};
use crate::crm::CrmContact;
use crate::error::{Error, Result};
use crate::telephony::{CallHandle, CallOutcome, PlacementRequest};
use crate::util::to_std;
use crate::{campaign, dlog, dlog_debug, dlog_warn};

use super::dispatcher::DialDispatcher;
use super::events::DialerEvent;
use super::outcome::{Classification, OutcomeClassifier};
use super::pacing::{CallingWindow, PacingGovernor};
use super::retry::RetryScheduler;
use super::selector::{BulkAddResult, ContactSelector, FilterPreview};
use super::stats::{CampaignStats, ContactTally, StatsAggregator};

pub struct CampaignRecord {
    state: CampaignState,
    contacts: HashMap<CampaignContactId, CampaignContact>,
    by_ref: HashMap<ContactRef, CampaignContactId>,
    next_sequence: u64,
    governor: PacingGovernor,
    window: CallingWindow,
    retry: RetryScheduler,
    dispatcher: DialDispatcher,
    stats: StatsAggregator,
    consecutive_placement_failures: u32,
    events: Vec<DialerEvent>,
}

impl CampaignRecord {
    pub fn new(campaign: Campaign) -> Result<Self> {
        let window = CallingWindow::from_schedule(&campaign.schedule)?;
        Ok(Self {
            governor: PacingGovernor::new(&campaign.pacing),
            retry: RetryScheduler::new(&campaign.pacing),
            window,
            state: CampaignState::new(campaign),
            contacts: HashMap::new(),
            by_ref: HashMap::new(),
            next_sequence: 0,
            dispatcher: DialDispatcher::new(),
            stats: StatsAggregator::default(),
            consecutive_placement_failures: 0,
            events: Vec::new(),
        })
    }

    pub fn id(&self) -> CampaignId {
        self.state.campaign().id
    }

    pub fn campaign(&self) -> &Campaign {
        self.state.campaign()
    }

    pub fn state(&self) -> &CampaignState {
        &self.state
    }

    pub fn status(&self) -> CampaignStatus {
        self.state.status()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Replace name, schedule, pacing and the rest of the definition.
    ///
    /// The attempt budget may not drop below attempts already made by any
    /// contact. Contacts left exactly at the new budget lose their
    /// scheduled retry.
    pub fn reconfigure(&mut self, spec: CampaignSpec) -> Result<()> {
        if self.is_running() {
            return Err(Error::CampaignRunning(self.id()));
        }
        let max_attempts = spec.pacing.max_attempts_per_contact;
        let most_attempts = self.contacts.values().map(|c| c.attempts).max().unwrap_or(0);
        if most_attempts > max_attempts {
            return Err(Error::Validation(format!(
                "max_attempts_per_contact {} is below the {} attempts already made by a contact",
                max_attempts, most_attempts
            )));
        }
        let window = CallingWindow::from_schedule(&spec.schedule)?;
        self.state.campaign_mut().reconfigure(spec)?;
        let pacing = self.state.campaign().pacing;
        self.window = window;
        self.governor.reconfigure(&pacing);
        self.retry = RetryScheduler::new(&pacing);

        let exhausted: Vec<CampaignContactId> = self
            .contacts
            .values()
            .filter(|c| c.attempts >= max_attempts && c.next_attempt_at.is_some())
            .map(|c| c.id)
            .collect();
        for id in exhausted {
            self.update_contact(id, |c| {
                c.next_attempt_at = None;
                Ok(())
            })?;
        }
        Ok(())
    }

    // --- roster ---

    /// Attach one CRM contact. Returns `None` if it is already attached.
    pub fn add_contact(&mut self, crm: &CrmContact, priority: i32) -> Result<Option<CampaignContactId>> {
        campaign::validate_phone_number(&crm.phone_number)?;
        if self.by_ref.contains_key(&crm.id) {
            return Ok(None);
        }
        let contact = CampaignContact::new(
            self.id(),
            crm.id,
            &crm.phone_number,
            priority,
            self.next_sequence,
        );
        self.next_sequence += 1;
        let id = contact.id;
        self.stats.record(None, Some(ContactTally::of(&contact)));
        self.by_ref.insert(crm.id, id);
        self.contacts.insert(id, contact);
        Ok(Some(id))
    }

    /// Attach many contacts. Already-attached contacts and contacts with an
    /// unusable phone number are skipped.
    pub fn add_contacts(&mut self, contacts: &[CrmContact]) -> u32 {
        let mut added = 0;
        for crm in contacts {
            match self.add_contact(crm, 0) {
                Ok(Some(_)) => added += 1,
                Ok(None) => {}
                Err(e) => dlog_warn!(
                    "Campaign {}: not adding contact {}: {}",
                    self.id().short(),
                    crm.id,
                    e
                ),
            }
        }
        added
    }

    pub fn remove_contact(&mut self, id: CampaignContactId) -> Result<CampaignContact> {
        if self.dispatcher.is_in_flight(&id) {
            return Err(Error::ContactInFlight(id));
        }
        let contact = self.contacts.remove(&id).ok_or(Error::ContactNotFound(id))?;
        self.by_ref.remove(&contact.contact_id);
        self.stats.record(Some(ContactTally::of(&contact)), None);
        Ok(contact)
    }

    pub fn skip_contact(&mut self, id: CampaignContactId) -> Result<()> {
        if self.dispatcher.is_in_flight(&id) {
            return Err(Error::ContactInFlight(id));
        }
        self.update_contact(id, |c| {
            c.status = ContactStatus::Skipped;
            c.next_attempt_at = None;
            Ok(())
        })
    }

    /// Return a skipped contact to pending. Its attempt count is kept.
    pub fn unskip_contact(&mut self, id: CampaignContactId) -> Result<()> {
        self.update_contact(id, |c| {
            if c.status != ContactStatus::Skipped {
                return Err(Error::Validation(format!(
                    "contact {} is {}, not skipped",
                    c.id.short(),
                    c.status
                )));
            }
            c.status = ContactStatus::Pending;
            Ok(())
        })
    }

    pub fn set_priority(&mut self, id: CampaignContactId, priority: i32) -> Result<()> {
        self.update_contact(id, |c| {
            c.priority = priority;
            Ok(())
        })
    }

    pub fn contact(&self, id: CampaignContactId) -> Result<&CampaignContact> {
        self.contacts.get(&id).ok_or(Error::ContactNotFound(id))
    }

    pub fn contact_by_ref(&self, contact_ref: ContactRef) -> Option<&CampaignContact> {
        self.by_ref.get(&contact_ref).and_then(|id| self.contacts.get(id))
    }

    /// Contacts in insertion order, optionally filtered by status.
    pub fn contacts(&self, status: Option<ContactStatus>) -> Vec<CampaignContact> {
        let mut list: Vec<CampaignContact> = self
            .contacts
            .values()
            .filter(|c| status.map_or(true, |s| c.status == s))
            .cloned()
            .collect();
        list.sort_by_key(|c| c.sequence);
        list
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Counts for a bulk attach without changing anything. Matches without
    /// a dialable phone number are left out of every count.
    pub fn preview_bulk_add(&self, matching: Vec<CrmContact>, exclude_existing: bool) -> FilterPreview {
        let matching = dialable(matching);
        let existing = self.attached_by_ref();
        ContactSelector::plan_bulk_add(&existing, matching, exclude_existing).preview()
    }

    pub fn commit_bulk_add(&mut self, matching: Vec<CrmContact>, exclude_existing: bool) -> BulkAddResult {
        let matching = dialable(matching);
        let plan = {
            let existing = self.attached_by_ref();
            ContactSelector::plan_bulk_add(&existing, matching, exclude_existing)
        };
        let mut added = 0;
        for id in &plan.rearm {
            if self.update_contact(*id, |c| {
                c.reset();
                Ok(())
            })
            .is_ok()
            {
                added += 1;
            }
        }
        added += self.add_contacts(&plan.new_contacts);
        dlog!(
            "Campaign {}: bulk add matched {}, added {}",
            self.id().short(),
            plan.total_matching,
            added
        );
        BulkAddResult {
            added,
            total_matching: plan.total_matching,
        }
    }

    fn attached_by_ref(&self) -> HashMap<ContactRef, &CampaignContact> {
        self.contacts.values().map(|c| (c.contact_id, c)).collect()
    }

    /// Mutate one row and keep statistics in step.
    fn update_contact<F>(&mut self, id: CampaignContactId, f: F) -> Result<()>
    where
        F: FnOnce(&mut CampaignContact) -> Result<()>,
    {
        let contact = self.contacts.get_mut(&id).ok_or(Error::ContactNotFound(id))?;
        let before = ContactTally::of(contact);
        let result = f(contact);
        self.stats.record(Some(before), Some(ContactTally::of(contact)));
        result
    }

    // --- lifecycle ---

    pub fn command(&mut self, command: CampaignCommand, now: DateTime<Utc>, policy: RestartPolicy) -> Result<()> {
        if matches!(command, CampaignCommand::Start | CampaignCommand::Restart) && self.contacts.is_empty() {
            return Err(Error::Validation(format!(
                "cannot {} campaign with no contacts",
                command
            )));
        }
        self.state.apply(command, now)?;
        match command {
            CampaignCommand::Resume => self.consecutive_placement_failures = 0,
            CampaignCommand::Restart => {
                self.consecutive_placement_failures = 0;
                if policy == RestartPolicy::ResetAll {
                    self.reset_all();
                }
            }
            _ => {}
        }
        dlog!("Campaign {}: {} -> {}", self.id().short(), command, self.status());
        self.push_status_event(None);
        Ok(())
    }

    fn reset_all(&mut self) {
        for contact in self.contacts.values_mut() {
            if contact.status == ContactStatus::Skipped || self.dispatcher.is_in_flight(&contact.id) {
                continue;
            }
            let before = ContactTally::of(contact);
            contact.reset();
            self.stats.record(Some(before), Some(ContactTally::of(contact)));
        }
    }

    fn complete(&mut self, now: DateTime<Utc>, reason: &str) -> bool {
        match self.state.complete(now, reason) {
            Ok(()) => {
                dlog!("Campaign {}: completed ({})", self.id().short(), reason);
                self.push_status_event(Some(reason));
                true
            }
            Err(_) => false,
        }
    }

    /// Complete the campaign if nothing is left to do. Returns whether it
    /// transitioned.
    pub fn check_completion(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_running() {
            return false;
        }
        if self.window.has_closed(now) {
            return self.complete(now, "calling window closed");
        }
        let max_attempts = self.campaign().pacing.max_attempts_per_contact;
        let work_left = self.contacts.values().any(|c| c.has_remaining_work(max_attempts));
        if !work_left && self.dispatcher.in_flight_count() == 0 {
            return self.complete(now, "all contacts processed");
        }
        false
    }

    // --- admission ---

    /// Admit as many contacts as pacing allows and return their placement
    /// requests, in selection order.
    pub fn admit(&mut self, now: DateTime<Utc>) -> Vec<PlacementRequest> {
        if !self.is_running() || !self.window.is_open(now) {
            return Vec::new();
        }
        let slots = self
            .governor
            .available_slots(self.dispatcher.in_flight_count(), now);
        let max_attempts = self.campaign().pacing.max_attempts_per_contact;
        let selected = ContactSelector::select(self.contacts.values(), slots, now, max_attempts);

        let mut requests = Vec::with_capacity(selected.len());
        for id in selected {
            let Some(contact) = self.contacts.get_mut(&id) else {
                continue;
            };
            let before = ContactTally::of(contact);
            let request = self.dispatcher.begin(self.state.campaign(), contact, now);
            self.stats.record(Some(before), Some(ContactTally::of(contact)));
            self.governor.record_admission(now);
            requests.push(request);
        }
        if !requests.is_empty() {
            dlog_debug!(
                "Campaign {}: admitted {} of {} slots",
                self.id().short(),
                requests.len(),
                slots
            );
        }
        requests
    }

    /// Fold in the provider's answer to a placement request.
    ///
    /// A rejection settles the attempt as failed. `failure_threshold`
    /// consecutive rejections pause a running campaign.
    pub fn record_placement(
        &mut self,
        request: &PlacementRequest,
        result: Result<CallHandle>,
        now: DateTime<Utc>,
        failure_threshold: u32,
    ) {
        let campaign_id = self.id();
        match result {
            Ok(handle) => {
                self.consecutive_placement_failures = 0;
                self.dispatcher
                    .attach_handle(request.contact_id, request.attempt, handle);
                self.events.push(DialerEvent::CallPlaced {
                    campaign_id,
                    contact_id: request.contact_id,
                    attempt: request.attempt,
                });
            }
            Err(e) => {
                self.consecutive_placement_failures += 1;
                let reason = e.to_string();
                dlog_warn!(
                    "Campaign {}: placement to {} failed: {}",
                    campaign_id.short(),
                    request.to_number,
                    reason
                );
                let classification = OutcomeClassifier::placement_failure(&reason);
                if let Err(settle_err) = self.settle(request.contact_id, request.attempt, classification, now) {
                    dlog_debug!(
                        "Campaign {}: placement failure for settled attempt: {}",
                        campaign_id.short(),
                        settle_err
                    );
                }
                self.events.push(DialerEvent::PlacementFailed {
                    campaign_id,
                    contact_id: request.contact_id,
                    attempt: request.attempt,
                    reason: reason.clone(),
                });
                if self.consecutive_placement_failures >= failure_threshold && self.is_running() {
                    let why = format!(
                        "{} consecutive placement failures, last: {}",
                        self.consecutive_placement_failures, reason
                    );
                    if self.state.self_pause(now, &why).is_ok() {
                        dlog_warn!("Campaign {}: paused: {}", campaign_id.short(), why);
                        self.push_status_event(Some(&why));
                    }
                }
            }
        }
    }

    /// Apply an asynchronous call outcome. Valid in any campaign status, so
    /// calls that were live at pause or stop still land.
    pub fn apply_outcome(&mut self, outcome: &CallOutcome) -> Result<ContactStatus> {
        if outcome.campaign_id != self.id() {
            return Err(Error::OutcomeDelivery(format!(
                "outcome for campaign {} delivered to {}",
                outcome.campaign_id.short(),
                self.id().short()
            )));
        }
        let classification = OutcomeClassifier::classify(&outcome.signal, outcome.duration_seconds);
        self.settle(outcome.contact_id, outcome.attempt, classification, outcome.ended_at)
    }

    /// Fail every attempt that has waited longer than `timeout` for an outcome.
    pub fn reconcile(&mut self, now: DateTime<Utc>, timeout: chrono::Duration) -> Vec<CampaignContactId> {
        let mut reconciled = Vec::new();
        for (id, attempt) in self.dispatcher.overdue(now, timeout) {
            if self.settle(id, attempt, OutcomeClassifier::timed_out(), now).is_ok() {
                dlog_warn!(
                    "Campaign {}: no outcome for contact {} attempt {}, marked failed",
                    self.id().short(),
                    id.short(),
                    attempt
                );
                self.events.push(DialerEvent::CallTimedOut {
                    campaign_id: self.id(),
                    contact_id: id,
                    attempt,
                });
                reconciled.push(id);
            }
        }
        reconciled
    }

    fn settle(
        &mut self,
        id: CampaignContactId,
        attempt: u32,
        classification: Classification,
        at: DateTime<Utc>,
    ) -> Result<ContactStatus> {
        if !self.contacts.contains_key(&id) {
            return Err(Error::ContactNotFound(id));
        }
        self.dispatcher.finish(id, attempt)?;
        let retry = self.retry;
        let mut status = classification.status;
        self.update_contact(id, |c| {
            c.status = classification.status;
            c.last_call_duration_seconds = Some(classification.duration_seconds);
            c.total_call_duration_seconds += classification.duration_seconds as u64;
            c.last_call_outcome = Some(classification.outcome.clone());
            if let Some(update) = &classification.disposition {
                update.apply_to(c);
            }
            retry.apply(c, at);
            status = c.status;
            Ok(())
        })?;
        self.events.push(DialerEvent::OutcomeApplied {
            campaign_id: self.id(),
            contact_id: id,
            attempt,
            status,
        });
        Ok(status)
    }

    // --- dispositions ---

    pub fn disposition(&self, id: CampaignContactId) -> Result<DispositionRecord> {
        self.contact(id).map(DispositionRecord::from)
    }

    /// Write a disposition. Status, attempts and scheduling are untouched.
    pub fn update_disposition(&mut self, id: CampaignContactId, update: &DispositionUpdate) -> Result<DispositionRecord> {
        let contact = self.contacts.get_mut(&id).ok_or(Error::ContactNotFound(id))?;
        update.apply_to(contact);
        Ok(DispositionRecord::from(&*contact))
    }

    pub fn disposition_stats(&self, now: DateTime<Utc>) -> DispositionStats {
        DispositionStats::from_contacts(self.contacts.values(), now)
    }

    // --- statistics ---

    pub fn stats(&self) -> CampaignStats {
        self.stats.snapshot()
    }

    /// Recompute statistics from the roster and reset the running counters.
    pub fn recompute_stats(&mut self) -> CampaignStats {
        let stats = CampaignStats::from_contacts(self.contacts.values());
        self.stats.reset_to(stats.clone());
        stats
    }

    pub fn in_flight_count(&self) -> usize {
        self.dispatcher.in_flight_count()
    }

    pub fn consecutive_placement_failures(&self) -> u32 {
        self.consecutive_placement_failures
    }

    // --- scheduling ---

    /// How long the admission loop may sleep before its next tick.
    ///
    /// Inside the window this is the tick interval. Outside it the loop
    /// sleeps until the window opens, the campaign ends, or the oldest
    /// in-flight call is due for reconciliation, whichever is first.
    pub fn next_wake(&self, now: DateTime<Utc>, tick: Duration, reconcile_timeout: chrono::Duration) -> Duration {
        if self.window.is_open(now) {
            return tick;
        }
        let deadlines = [
            self.window.next_open(now),
            self.campaign().schedule.end_at.filter(|end| *end > now),
            self.dispatcher
                .earliest_admission()
                .map(|at| at + reconcile_timeout),
        ];
        match deadlines.into_iter().flatten().min() {
            Some(at) => to_std(at - now),
            None => tick,
        }
    }

    /// Drain events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<DialerEvent> {
        std::mem::take(&mut self.events)
    }

    fn push_status_event(&mut self, reason: Option<&str>) {
        self.events.push(DialerEvent::StatusChanged {
            campaign_id: self.id(),
            status: self.status(),
            reason: reason.map(str::to_string),
        });
    }
}

fn dialable(matching: Vec<CrmContact>) -> Vec<CrmContact> {
    matching
        .into_iter()
        .filter(|c| campaign::validate_phone_number(&c.phone_number).is_ok())
        .collect()
}

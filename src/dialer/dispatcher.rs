//! Dial dispatcher.
//!
//! Tracks which attempts are in flight and drives placement requests to the
//! telephony provider. Placement runs outside the campaign lock; the
//! in-flight bookkeeping happens under it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::campaign::Campaign;
use crate::contact::{CampaignContact, CampaignContactId, ContactStatus};
use crate::error::{Error, Result};
use crate::telephony::{CallHandle, PlacementRequest, Telephony};
use crate::dlog_debug;
use crate::util::with_timeout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightCall {
    pub attempt: u32,
    pub admitted_at: DateTime<Utc>,
    pub handle: Option<CallHandle>,
}

#[derive(Debug, Default)]
pub struct DialDispatcher {
    in_flight: HashMap<CampaignContactId, InFlightCall>,
}

impl DialDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `contact` as being dialed and build its placement request.
    ///
    /// The attempt counter moves here, at dispatch, so the per-contact
    /// budget holds even if the outcome never arrives.
    pub fn begin(
        &mut self,
        campaign: &Campaign,
        contact: &mut CampaignContact,
        now: DateTime<Utc>,
    ) -> PlacementRequest {
        contact.status = ContactStatus::Calling;
        contact.attempts += 1;
        contact.calls_made += 1;
        contact.last_attempt_at = Some(now);
        contact.next_attempt_at = None;
        self.in_flight.insert(
            contact.id,
            InFlightCall {
                attempt: contact.attempts,
                admitted_at: now,
                handle: None,
            },
        );
        PlacementRequest {
            campaign_id: campaign.id,
            contact_id: contact.id,
            attempt: contact.attempts,
            agent_id: campaign.agent_id.clone(),
            from_number: campaign.from_phone_number.clone(),
            to_number: contact.phone_number.clone(),
        }
    }

    /// Remember the provider handle for a live attempt.
    pub fn attach_handle(&mut self, contact_id: CampaignContactId, attempt: u32, handle: CallHandle) {
        if let Some(call) = self.in_flight.get_mut(&contact_id) {
            if call.attempt == attempt {
                call.handle = Some(handle);
            }
        }
    }

    /// Remove the in-flight entry for exactly this attempt.
    pub fn finish(&mut self, contact_id: CampaignContactId, attempt: u32) -> Result<InFlightCall> {
        match self.in_flight.get(&contact_id) {
            Some(call) if call.attempt == attempt => {}
            Some(call) => {
                return Err(Error::OutcomeDelivery(format!(
                    "contact {} is on attempt {}, outcome is for attempt {}",
                    contact_id.short(),
                    call.attempt,
                    attempt
                )));
            }
            None => {
                return Err(Error::OutcomeDelivery(format!(
                    "contact {} has no call in flight",
                    contact_id.short()
                )));
            }
        }
        self.in_flight
            .remove(&contact_id)
            .ok_or_else(|| Error::OutcomeDelivery(format!("contact {} vanished", contact_id.short())))
    }

    pub fn is_in_flight(&self, contact_id: &CampaignContactId) -> bool {
        self.in_flight.contains_key(contact_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Admission time of the oldest call still in flight.
    pub fn earliest_admission(&self) -> Option<DateTime<Utc>> {
        self.in_flight.values().map(|call| call.admitted_at).min()
    }

    /// Attempts admitted at or before `now - timeout`.
    pub fn overdue(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> Vec<(CampaignContactId, u32)> {
        let mut overdue: Vec<(CampaignContactId, u32, DateTime<Utc>)> = self
            .in_flight
            .iter()
            .filter(|(_, call)| call.admitted_at + timeout <= now)
            .map(|(id, call)| (*id, call.attempt, call.admitted_at))
            .collect();
        overdue.sort_by_key(|(id, _, at)| (*at, *id));
        overdue.into_iter().map(|(id, attempt, _)| (id, attempt)).collect()
    }
}

/// Place every request concurrently.
///
/// At most `slots` placements are in progress across the process, and each
/// one is bounded by `timeout`. Results come back in request order.
pub async fn place_all(
    telephony: Arc<dyn Telephony>,
    slots: Arc<Semaphore>,
    requests: Vec<PlacementRequest>,
    timeout: Duration,
) -> Vec<(PlacementRequest, Result<CallHandle>)> {
    let placements = requests.into_iter().map(|request| {
        let telephony = Arc::clone(&telephony);
        let slots = Arc::clone(&slots);
        async move {
            let result = match slots.acquire_owned().await {
                Ok(_permit) => with_timeout(timeout, telephony.place_call(&request)).await,
                Err(e) => Err(Error::PlacementFailure(e.to_string())),
            };
            dlog_debug!(
                "place_all: contact {} attempt {} -> {}",
                request.contact_id.short(),
                request.attempt,
                if result.is_ok() { "placed" } else { "failed" }
            );
            (request, result)
        }
    });
    join_all(placements).await
}

//! Events emitted by the dialer for observers (CLI progress, tests).

use tokio::sync::mpsc;

use crate::campaign::{CampaignId, CampaignStatus};
use crate::contact::{CampaignContactId, ContactStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialerEvent {
    CallPlaced {
        campaign_id: CampaignId,
        contact_id: CampaignContactId,
        attempt: u32,
    },
    PlacementFailed {
        campaign_id: CampaignId,
        contact_id: CampaignContactId,
        attempt: u32,
        reason: String,
    },
    OutcomeApplied {
        campaign_id: CampaignId,
        contact_id: CampaignContactId,
        attempt: u32,
        status: ContactStatus,
    },
    OutcomeRejected {
        campaign_id: CampaignId,
        contact_id: CampaignContactId,
        reason: String,
    },
    CallTimedOut {
        campaign_id: CampaignId,
        contact_id: CampaignContactId,
        attempt: u32,
    },
    StatusChanged {
        campaign_id: CampaignId,
        status: CampaignStatus,
        reason: Option<String>,
    },
}

pub type EventSender = mpsc::UnboundedSender<DialerEvent>;

/// Optional event sink. Sending never blocks and a dropped receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<EventSender>,
}

impl EventSink {
    pub fn new(tx: EventSender) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn none() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: DialerEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn emit_all(&self, events: Vec<DialerEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}

//! Telephony collaborator seam.
//!
//! The dialer asks the provider to place a call and gets back either a
//! handle or an immediate failure. How the call ends is reported later, as
//! a `CallOutcome` on the outcome channel.

mod simulated;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::campaign::CampaignId;
use crate::contact::{CampaignContactId, Disposition};
use crate::error::Result;

pub use simulated::{ScriptStep, SimulatedTelephony};

/// Provider-side identifier of a placed call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallHandle(pub String);

impl std::fmt::Display for CallHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything the provider needs to place one attempt, plus the keys it
/// must echo back in the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub campaign_id: CampaignId,
    pub contact_id: CampaignContactId,
    pub attempt: u32,
    pub agent_id: String,
    pub from_number: String,
    pub to_number: String,
}

#[async_trait]
pub trait Telephony: Send + Sync {
    /// Request placement. `Err(Error::PlacementFailure)` means the provider
    /// rejected the call synchronously and no outcome will follow.
    async fn place_call(&self, request: &PlacementRequest) -> Result<CallHandle>;
}

/// How a call ended, as reported by the provider or the agent pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CallSignal {
    Answered,
    NoAnswer,
    Busy,
    Failed {
        reason: String,
    },
    /// The conversational agent finished the call and classified it.
    AgentReported {
        disposition: Disposition,
        notes: Option<String>,
        callback_at: Option<DateTime<Utc>>,
    },
}

/// Asynchronous end-of-call report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub campaign_id: CampaignId,
    pub contact_id: CampaignContactId,
    pub attempt: u32,
    pub handle: Option<CallHandle>,
    pub signal: CallSignal,
    pub duration_seconds: u32,
    pub ended_at: DateTime<Utc>,
}

impl CallOutcome {
    /// Outcome for the attempt described by `request`.
    pub fn for_request(
        request: &PlacementRequest,
        signal: CallSignal,
        duration_seconds: u32,
        ended_at: DateTime<Utc>,
    ) -> Self {
        Self {
            campaign_id: request.campaign_id,
            contact_id: request.contact_id,
            attempt: request.attempt,
            handle: None,
            signal,
            duration_seconds,
            ended_at,
        }
    }
}

pub type OutcomeSender = mpsc::Sender<CallOutcome>;
pub type OutcomeReceiver = mpsc::Receiver<CallOutcome>;

/// Channel the provider uses to deliver outcomes to the dialer.
pub fn outcome_channel(capacity: usize) -> (OutcomeSender, OutcomeReceiver) {
    mpsc::channel(capacity)
}

//! Maps raw call signals onto contact status updates.

use crate::contact::{ContactStatus, DispositionUpdate};
use crate::telephony::CallSignal;

/// What an ended attempt does to its contact row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: ContactStatus,
    /// Short label stored as `last_call_outcome`.
    pub outcome: String,
    pub duration_seconds: u32,
    /// Set when the agent classified the conversation.
    pub disposition: Option<DispositionUpdate>,
}

pub struct OutcomeClassifier;

impl OutcomeClassifier {
    pub fn classify(signal: &CallSignal, duration_seconds: u32) -> Classification {
        match signal {
            CallSignal::Answered => Classification {
                status: ContactStatus::Completed,
                outcome: "answered".to_string(),
                duration_seconds,
                disposition: None,
            },
            CallSignal::NoAnswer => Classification {
                status: ContactStatus::NoAnswer,
                outcome: "no_answer".to_string(),
                duration_seconds,
                disposition: None,
            },
            CallSignal::Busy => Classification {
                status: ContactStatus::Busy,
                outcome: "busy".to_string(),
                duration_seconds,
                disposition: None,
            },
            CallSignal::Failed { reason } => Classification {
                status: ContactStatus::Failed,
                outcome: format!("failed: {}", reason),
                duration_seconds,
                disposition: None,
            },
            CallSignal::AgentReported {
                disposition,
                notes,
                callback_at,
            } => Classification {
                status: ContactStatus::Completed,
                outcome: "answered".to_string(),
                duration_seconds,
                disposition: Some(DispositionUpdate {
                    disposition: Some(*disposition),
                    notes: notes.clone(),
                    callback_requested_at: *callback_at,
                }),
            },
        }
    }

    /// The provider rejected the placement outright.
    pub fn placement_failure(reason: &str) -> Classification {
        Classification {
            status: ContactStatus::Failed,
            outcome: format!("placement_failed: {}", reason),
            duration_seconds: 0,
            disposition: None,
        }
    }

    /// No outcome arrived within the reconciliation timeout.
    pub fn timed_out() -> Classification {
        Classification {
            status: ContactStatus::Failed,
            outcome: "timeout".to_string(),
            duration_seconds: 0,
            disposition: None,
        }
    }
}

//! Campaign lifecycle with transition validation.
//!
//! `CampaignState` wraps a `Campaign` and only lets its status move along
//! the defined edges:
//!
//! draft -> running (start), running -> paused (pause), paused -> running
//! (resume), running | paused -> canceled (stop), completed | canceled ->
//! running (restart), running -> completed (roster exhausted or window closed).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::{Campaign, CampaignStatus};

/// Operator commands against the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignCommand {
    Start,
    Pause,
    Resume,
    Stop,
    Restart,
}

impl CampaignCommand {
    pub fn target(&self) -> CampaignStatus {
        match self {
            CampaignCommand::Start | CampaignCommand::Resume | CampaignCommand::Restart => {
                CampaignStatus::Running
            }
            CampaignCommand::Pause => CampaignStatus::Paused,
            CampaignCommand::Stop => CampaignStatus::Canceled,
        }
    }

    /// Whether this command is valid from `from`.
    pub fn allowed_from(&self, from: CampaignStatus) -> bool {
        use CampaignStatus::*;
        match self {
            CampaignCommand::Start => from == Draft,
            CampaignCommand::Pause => from == Running,
            CampaignCommand::Resume => from == Paused,
            CampaignCommand::Stop => matches!(from, Running | Paused),
            CampaignCommand::Restart => matches!(from, Completed | Canceled),
        }
    }
}

impl std::fmt::Display for CampaignCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignCommand::Start => write!(f, "start"),
            CampaignCommand::Pause => write!(f, "pause"),
            CampaignCommand::Resume => write!(f, "resume"),
            CampaignCommand::Stop => write!(f, "stop"),
            CampaignCommand::Restart => write!(f, "restart"),
        }
    }
}

/// A record of a status change with timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: CampaignStatus,
    pub entered_at: DateTime<Utc>,
    /// Why the status was entered, for system-initiated changes.
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignState {
    campaign: Campaign,
    history: Vec<StatusHistoryEntry>,
}

impl CampaignState {
    pub fn new(campaign: Campaign) -> Self {
        let initial = StatusHistoryEntry {
            status: campaign.status,
            entered_at: campaign.created_at,
            reason: None,
        };
        Self {
            campaign,
            history: vec![initial],
        }
    }

    pub fn status(&self) -> CampaignStatus {
        self.campaign.status
    }

    pub fn is_running(&self) -> bool {
        self.campaign.status == CampaignStatus::Running
    }

    /// Check an edge without applying it.
    pub fn can_transition(&self, target: CampaignStatus) -> bool {
        use CampaignStatus::*;
        matches!(
            (self.campaign.status, target),
            (Draft, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Canceled)
                | (Paused, Canceled)
                | (Running, Completed)
                | (Completed, Running)
                | (Canceled, Running)
        )
    }

    /// Apply an operator command. The status is unchanged on error.
    pub fn apply(&mut self, command: CampaignCommand, now: DateTime<Utc>) -> Result<()> {
        if !command.allowed_from(self.campaign.status) {
            return Err(self.invalid(command.target()));
        }
        self.enter(command.target(), now, None)
    }

    /// Mark the campaign completed (roster exhausted or window closed).
    pub fn complete(&mut self, now: DateTime<Utc>, reason: &str) -> Result<()> {
        if !self.can_transition(CampaignStatus::Completed) {
            return Err(self.invalid(CampaignStatus::Completed));
        }
        self.enter(CampaignStatus::Completed, now, Some(reason))
    }

    /// Pause on the engine's own initiative, recording the reason as an error.
    pub fn self_pause(&mut self, now: DateTime<Utc>, reason: &str) -> Result<()> {
        if !self.can_transition(CampaignStatus::Paused) {
            return Err(self.invalid(CampaignStatus::Paused));
        }
        self.campaign.record_error(reason);
        self.enter(CampaignStatus::Paused, now, Some(reason))
    }

    fn enter(&mut self, target: CampaignStatus, now: DateTime<Utc>, reason: Option<&str>) -> Result<()> {
        if !self.can_transition(target) {
            return Err(self.invalid(target));
        }
        let from = self.campaign.status;
        match target {
            CampaignStatus::Running if from == CampaignStatus::Draft => {
                self.campaign.started_at = Some(now);
            }
            CampaignStatus::Running
                if matches!(from, CampaignStatus::Completed | CampaignStatus::Canceled) =>
            {
                self.campaign.completed_at = None;
            }
            CampaignStatus::Completed | CampaignStatus::Canceled => {
                self.campaign.completed_at = Some(now);
            }
            _ => {}
        }
        self.campaign.status = target;
        self.history.push(StatusHistoryEntry {
            status: target,
            entered_at: now,
            reason: reason.map(str::to_string),
        });
        Ok(())
    }

    fn invalid(&self, target: CampaignStatus) -> Error {
        Error::InvalidStateTransition {
            from: self.campaign.status.to_string(),
            to: target.to_string(),
        }
    }

    pub fn history(&self) -> &[StatusHistoryEntry] {
        &self.history
    }

    pub fn campaign(&self) -> &Campaign {
        &self.campaign
    }

    pub fn campaign_mut(&mut self) -> &mut Campaign {
        &mut self.campaign
    }
}

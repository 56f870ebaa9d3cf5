//! Disposition taxonomy.
//!
//! Dispositions classify the conversation, not the connection. They feed
//! analytics and downstream workflows (callbacks, do-not-call, escalation)
//! and never influence scheduling.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CampaignContact;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispositionCategory {
    Positive,
    Neutral,
    Negative,
    Technical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    // positive
    Interested,
    AppointmentBooked,
    SaleMade,
    CallbackRequested,
    // neutral
    InformationRequested,
    LeftVoicemail,
    FollowUpNeeded,
    Escalated,
    // negative
    NotInterested,
    DoNotCall,
    WrongNumber,
    Hostile,
    // technical
    VoicemailFull,
    LineDisconnected,
    PoorConnection,
    AnsweringMachine,
}

impl Disposition {
    pub const ALL: [Disposition; 16] = [
        Disposition::Interested,
        Disposition::AppointmentBooked,
        Disposition::SaleMade,
        Disposition::CallbackRequested,
        Disposition::InformationRequested,
        Disposition::LeftVoicemail,
        Disposition::FollowUpNeeded,
        Disposition::Escalated,
        Disposition::NotInterested,
        Disposition::DoNotCall,
        Disposition::WrongNumber,
        Disposition::Hostile,
        Disposition::VoicemailFull,
        Disposition::LineDisconnected,
        Disposition::PoorConnection,
        Disposition::AnsweringMachine,
    ];

    pub fn category(&self) -> DispositionCategory {
        use Disposition::*;
        match self {
            Interested | AppointmentBooked | SaleMade | CallbackRequested => {
                DispositionCategory::Positive
            }
            InformationRequested | LeftVoicemail | FollowUpNeeded | Escalated => {
                DispositionCategory::Neutral
            }
            NotInterested | DoNotCall | WrongNumber | Hostile => DispositionCategory::Negative,
            VoicemailFull | LineDisconnected | PoorConnection | AnsweringMachine => {
                DispositionCategory::Technical
            }
        }
    }

    pub fn label(&self) -> &'static str {
        use Disposition::*;
        match self {
            Interested => "Interested",
            AppointmentBooked => "Appointment booked",
            SaleMade => "Sale made",
            CallbackRequested => "Callback requested",
            InformationRequested => "Information requested",
            LeftVoicemail => "Left voicemail",
            FollowUpNeeded => "Follow-up needed",
            Escalated => "Escalated",
            NotInterested => "Not interested",
            DoNotCall => "Do not call",
            WrongNumber => "Wrong number",
            Hostile => "Hostile",
            VoicemailFull => "Voicemail full",
            LineDisconnected => "Line disconnected",
            PoorConnection => "Poor connection",
            AnsweringMachine => "Answering machine",
        }
    }
}

/// One selectable option in the taxonomy listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispositionOption {
    pub value: Disposition,
    pub label: String,
}

/// The taxonomy grouped by category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DispositionOptions {
    pub positive: Vec<DispositionOption>,
    pub neutral: Vec<DispositionOption>,
    pub negative: Vec<DispositionOption>,
    pub technical: Vec<DispositionOption>,
}

pub fn disposition_options() -> DispositionOptions {
    let mut options = DispositionOptions::default();
    for d in Disposition::ALL {
        let option = DispositionOption {
            value: d,
            label: d.label().to_string(),
        };
        match d.category() {
            DispositionCategory::Positive => options.positive.push(option),
            DispositionCategory::Neutral => options.neutral.push(option),
            DispositionCategory::Negative => options.negative.push(option),
            DispositionCategory::Technical => options.technical.push(option),
        }
    }
    options
}

/// Late or manual disposition write. Fields left `None` are not touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispositionUpdate {
    pub disposition: Option<Disposition>,
    pub notes: Option<String>,
    pub callback_requested_at: Option<DateTime<Utc>>,
}

impl DispositionUpdate {
    pub fn new(disposition: Disposition) -> Self {
        Self {
            disposition: Some(disposition),
            ..Default::default()
        }
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }

    pub fn with_callback(mut self, at: DateTime<Utc>) -> Self {
        self.callback_requested_at = Some(at);
        self
    }

    /// Write the provided fields onto the row. Status and attempts are untouched.
    pub fn apply_to(&self, contact: &mut CampaignContact) {
        if let Some(d) = self.disposition {
            contact.disposition = Some(d);
        }
        if let Some(notes) = &self.notes {
            contact.disposition_notes = Some(notes.clone());
        }
        if let Some(at) = self.callback_requested_at {
            contact.callback_requested_at = Some(at);
        }
    }
}

/// Current disposition of a single contact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispositionRecord {
    pub disposition: Option<Disposition>,
    pub notes: Option<String>,
    pub callback_requested_at: Option<DateTime<Utc>>,
}

impl From<&CampaignContact> for DispositionRecord {
    fn from(c: &CampaignContact) -> Self {
        Self {
            disposition: c.disposition,
            notes: c.disposition_notes.clone(),
            callback_requested_at: c.callback_requested_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DispositionStats {
    pub total: u32,
    pub by_disposition: BTreeMap<Disposition, u32>,
    pub by_category: BTreeMap<DispositionCategory, u32>,
    /// Callbacks requested for a time still in the future.
    pub callbacks_pending: u32,
}

impl DispositionStats {
    pub fn from_contacts<'a>(
        contacts: impl IntoIterator<Item = &'a CampaignContact>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut stats = Self::default();
        for c in contacts {
            if let Some(d) = c.disposition {
                stats.total += 1;
                *stats.by_disposition.entry(d).or_insert(0) += 1;
                *stats.by_category.entry(d.category()).or_insert(0) += 1;
            }
            if c.callback_requested_at.is_some_and(|at| at > now) {
                stats.callbacks_pending += 1;
            }
        }
        stats
    }
}

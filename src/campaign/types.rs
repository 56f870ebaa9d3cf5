//! Core campaign type definitions.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Upper bound on `calls_per_minute` accepted at create/update.
pub const MAX_CALLS_PER_MINUTE: u32 = 30;
pub const MAX_CONCURRENT_CALLS: u32 = 100;
pub const MAX_ATTEMPTS_PER_CONTACT: u32 = 10;

const PHONE_PATTERN: &str = r"^\+?[1-9]\d{6,14}$";

static PHONE_REGEX: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(PHONE_PATTERN));

/// Unique identifier for a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CampaignId(pub Uuid);

impl CampaignId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for CampaignId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CampaignId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CampaignId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle status of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    #[default]
    Draft,
    Running,
    Paused,
    Completed,
    Canceled,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "draft"),
            CampaignStatus::Running => write!(f, "running"),
            CampaignStatus::Paused => write!(f, "paused"),
            CampaignStatus::Completed => write!(f, "completed"),
            CampaignStatus::Canceled => write!(f, "canceled"),
        }
    }
}

/// Pacing budget for a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pacing {
    pub calls_per_minute: u32,
    pub max_concurrent_calls: u32,
    pub max_attempts_per_contact: u32,
    pub retry_delay_minutes: u32,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            calls_per_minute: 5,
            max_concurrent_calls: 5,
            max_attempts_per_contact: 3,
            retry_delay_minutes: 60,
        }
    }
}

impl Pacing {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_CALLS_PER_MINUTE).contains(&self.calls_per_minute) {
            return Err(Error::Validation(format!(
                "calls_per_minute must be between 1 and {}",
                MAX_CALLS_PER_MINUTE
            )));
        }
        if !(1..=MAX_CONCURRENT_CALLS).contains(&self.max_concurrent_calls) {
            return Err(Error::Validation(format!(
                "max_concurrent_calls must be between 1 and {}",
                MAX_CONCURRENT_CALLS
            )));
        }
        if !(1..=MAX_ATTEMPTS_PER_CONTACT).contains(&self.max_attempts_per_contact) {
            return Err(Error::Validation(format!(
                "max_attempts_per_contact must be between 1 and {}",
                MAX_ATTEMPTS_PER_CONTACT
            )));
        }
        if self.retry_delay_minutes == 0 {
            return Err(Error::Validation("retry_delay_minutes must be positive".into()));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.retry_delay_minutes as i64)
    }
}

/// When a campaign may dial.
///
/// Hours are local to `timezone` (UTC when absent). Missing hours mean the
/// whole day; an empty `calling_days` means every day (0 = Monday). A start
/// later than the end wraps past midnight.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Schedule {
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    #[serde(with = "hhmm")]
    pub calling_hours_start: Option<NaiveTime>,
    #[serde(with = "hhmm")]
    pub calling_hours_end: Option<NaiveTime>,
    pub calling_days: Vec<u8>,
    pub timezone: Option<String>,
}

impl Schedule {
    pub fn tz(&self) -> Result<Tz> {
        let name = self.timezone.as_deref().unwrap_or("UTC");
        name.parse::<Tz>()
            .map_err(|e| Error::Validation(format!("unknown timezone {}: {}", name, e)))
    }

    /// Configured hours, if both ends are set.
    pub fn hours(&self) -> Option<(NaiveTime, NaiveTime)> {
        match (self.calling_hours_start, self.calling_hours_end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.tz()?;
        if let Some(day) = self.calling_days.iter().find(|d| **d > 6) {
            return Err(Error::Validation(format!(
                "calling_days must be within 0..=6, got {}",
                day
            )));
        }
        match (self.calling_hours_start, self.calling_hours_end) {
            (Some(start), Some(end)) if start == end => {
                return Err(Error::Validation(
                    "calling_hours_start and calling_hours_end must differ".into(),
                ));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(Error::Validation(
                    "calling_hours_start and calling_hours_end must be set together".into(),
                ));
            }
            _ => {}
        }
        if let (Some(start), Some(end)) = (self.start_at, self.end_at) {
            if end <= start {
                return Err(Error::Validation("end_at must be after start_at".into()));
            }
        }
        Ok(())
    }
}

/// Operator-supplied definition used to create or reconfigure a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSpec {
    pub name: String,
    pub workspace_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub from_phone_number: String,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub pacing: Pacing,
}

impl CampaignSpec {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("name is required".into()));
        }
        if self.agent_id.trim().is_empty() {
            return Err(Error::Validation("agent_id is required".into()));
        }
        validate_phone_number(&self.from_phone_number)?;
        self.pacing.validate()?;
        self.schedule.validate()
    }
}

pub fn validate_phone_number(number: &str) -> Result<()> {
    let pattern = PHONE_REGEX
        .as_ref()
        .map_err(|e| Error::Validation(e.to_string()))?;
    if !pattern.is_match(number) {
        return Err(Error::Validation(format!("invalid phone number: {}", number)));
    }
    Ok(())
}

/// An outbound campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub workspace_id: String,
    pub agent_id: String,
    pub name: String,
    pub description: Option<String>,
    pub from_phone_number: String,
    pub status: CampaignStatus,
    pub schedule: Schedule,
    pub pacing: Pacing,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub last_error: Option<String>,
}

impl Campaign {
    /// Create a draft campaign from a validated spec.
    pub fn new(spec: CampaignSpec) -> Result<Self> {
        spec.validate()?;
        Ok(Self {
            id: CampaignId::new(),
            workspace_id: spec.workspace_id,
            agent_id: spec.agent_id,
            name: spec.name,
            description: spec.description,
            from_phone_number: spec.from_phone_number,
            status: CampaignStatus::Draft,
            schedule: spec.schedule,
            pacing: spec.pacing,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_count: 0,
            last_error: None,
        })
    }

    /// Replace the configurable fields. Identity and lifecycle are untouched.
    pub fn reconfigure(&mut self, spec: CampaignSpec) -> Result<()> {
        spec.validate()?;
        self.workspace_id = spec.workspace_id;
        self.agent_id = spec.agent_id;
        self.name = spec.name;
        self.description = spec.description;
        self.from_phone_number = spec.from_phone_number;
        self.schedule = spec.schedule;
        self.pacing = spec.pacing;
        Ok(())
    }

    pub fn record_error(&mut self, message: &str) {
        self.error_count += 1;
        self.last_error = Some(message.to_string());
    }
}

/// `HH:MM` / `HH:MM:SS` serde for optional local times.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => s.serialize_str(&t.format("%H:%M").to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw {
            None => Ok(None),
            Some(s) => NaiveTime::parse_from_str(&s, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M:%S"))
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

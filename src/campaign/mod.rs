//! Campaign definitions and lifecycle.

mod state;
mod types;

pub use state::{CampaignCommand, CampaignState, StatusHistoryEntry};
pub use types::{
    validate_phone_number, Campaign, CampaignId, CampaignSpec, CampaignStatus, Pacing, Schedule,
    MAX_ATTEMPTS_PER_CONTACT, MAX_CALLS_PER_MINUTE, MAX_CONCURRENT_CALLS,
};

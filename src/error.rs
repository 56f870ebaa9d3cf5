use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Call placement failed: {0}")]
    PlacementFailure(String),

    #[error("Outcome delivery error: {0}")]
    OutcomeDelivery(String),

    #[error("Campaign not found: {0}")]
    CampaignNotFound(crate::campaign::CampaignId),

    #[error("Contact not found: {0}")]
    ContactNotFound(crate::contact::CampaignContactId),

    #[error("Contact has a call in flight: {0}")]
    ContactInFlight(crate::contact::CampaignContactId),

    #[error("Cannot modify a running campaign: {0}")]
    CampaignRunning(crate::campaign::CampaignId),

    #[error("CRM error: {0}")]
    Crm(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod campaign;
pub mod config;
pub mod contact;
pub mod crm;
pub mod dialer;
pub mod error;
pub mod log;
pub mod telephony;
pub mod util;

pub use campaign::{Campaign, CampaignId, CampaignSpec, CampaignStatus};
pub use contact::{CampaignContact, CampaignContactId, ContactRef, ContactStatus};
pub use dialer::{CampaignRegistry, CampaignStats};
pub use error::{Error, Result};

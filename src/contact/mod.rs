//! Campaign contacts and the disposition taxonomy.

mod disposition;
mod types;

pub use disposition::{
    disposition_options, Disposition, DispositionCategory, DispositionOption, DispositionOptions,
    DispositionRecord, DispositionStats, DispositionUpdate,
};
pub use types::{CampaignContact, CampaignContactId, ContactRef, ContactStatus};

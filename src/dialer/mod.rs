//! The dialing engine.
//!
//! `CampaignRegistry` is the entry point. Each running campaign gets a
//! `CampaignRunner` loop; a single `OutcomePump` feeds call outcomes back
//! into the per-campaign `CampaignRecord`.

pub mod dispatcher;
pub mod events;
pub mod outcome;
pub mod pacing;
pub mod pump;
pub mod record;
pub mod registry;
pub mod retry;
pub mod runner;
pub mod selector;
pub mod stats;

pub use dispatcher::{place_all, DialDispatcher, InFlightCall};
pub use events::{DialerEvent, EventSender, EventSink};
pub use outcome::{Classification, OutcomeClassifier};
pub use pacing::{CallingWindow, PacingGovernor};
pub use pump::OutcomePump;
pub use record::CampaignRecord;
pub use registry::{CampaignRegistry, RegistryBuilder};
pub use retry::{RetryDecision, RetryScheduler};
pub use runner::{CampaignRunner, LoopHandle, RunningLoops, TickOutcome};
pub use selector::{BulkAddPlan, BulkAddResult, ContactSelector, FilterPreview};
pub use stats::{CampaignStats, ContactTally, StatsAggregator};

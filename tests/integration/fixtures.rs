//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - A manually advanced clock
//! - A telephony fake that records placements and never reports outcomes
//! - Campaign specs, CRM contacts and running campaign records

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use dialer::campaign::{Campaign, CampaignCommand, CampaignSpec, Pacing, Schedule};
use dialer::config::{EngineConfig, RestartPolicy};
use dialer::contact::ContactRef;
use dialer::crm::{CrmContact, InMemoryCrm};
use dialer::dialer::{CampaignRecord, CampaignRegistry};
use dialer::telephony::{CallHandle, CallOutcome, CallSignal, PlacementRequest, Telephony};
use dialer::util::Clock;
use dialer::{Error, Result};

pub fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

/// Monday 2026-03-02, 12:00 UTC.
pub fn t0() -> DateTime<Utc> {
    at("2026-03-02T12:00:00Z")
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

/// Accepts or rejects placements and records them. Outcomes are delivered
/// by the test itself.
#[derive(Default)]
pub struct FakeTelephony {
    placed: Mutex<Vec<PlacementRequest>>,
    reject: AtomicBool,
}

impl FakeTelephony {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn placed(&self) -> Vec<PlacementRequest> {
        self.placed.lock().expect("placed lock").clone()
    }
}

#[async_trait]
impl Telephony for FakeTelephony {
    async fn place_call(&self, request: &PlacementRequest) -> Result<CallHandle> {
        self.placed.lock().expect("placed lock").push(request.clone());
        if self.reject.load(Ordering::SeqCst) {
            return Err(Error::PlacementFailure("fake carrier down".to_string()));
        }
        Ok(CallHandle(format!("fake-{}", request.contact_id.short())))
    }
}

pub fn pacing(calls_per_minute: u32, max_concurrent_calls: u32) -> Pacing {
    Pacing {
        calls_per_minute,
        max_concurrent_calls,
        ..Pacing::default()
    }
}

pub fn spec(pacing: Pacing) -> CampaignSpec {
    CampaignSpec {
        name: "Spring outreach".to_string(),
        workspace_id: "ws-test".to_string(),
        agent_id: "agent-test".to_string(),
        description: Some("integration".to_string()),
        from_phone_number: "+15551234567".to_string(),
        schedule: Schedule::default(),
        pacing,
    }
}

pub fn crm_contact(id: i64, status: &str, tags: &[&str]) -> CrmContact {
    CrmContact {
        id: ContactRef(id),
        phone_number: format!("+1555{:07}", id),
        first_name: Some(format!("Contact{}", id)),
        last_name: Some("Test".to_string()),
        status: status.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

pub fn crm_contacts(n: i64) -> Vec<CrmContact> {
    (1..=n).map(|i| crm_contact(i, "new", &[])).collect()
}

/// Draft record with `contacts` attached.
pub fn draft_record(spec: CampaignSpec, contacts: i64) -> CampaignRecord {
    let mut record = CampaignRecord::new(Campaign::new(spec).expect("valid spec")).expect("record");
    record.add_contacts(&crm_contacts(contacts));
    record
}

/// Running record with `contacts` attached, started at `now`.
pub fn running_record(spec: CampaignSpec, contacts: i64, now: DateTime<Utc>) -> CampaignRecord {
    let mut record = draft_record(spec, contacts);
    record
        .command(CampaignCommand::Start, now, RestartPolicy::Rearm)
        .expect("start");
    record
}

pub fn outcome(request: &PlacementRequest, signal: CallSignal, duration: u32, at: DateTime<Utc>) -> CallOutcome {
    CallOutcome::for_request(request, signal, duration, at)
}

/// Engine config with a fast tick for loop tests.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        tick_interval_ms: 10,
        placement_timeout_ms: 500,
        ..EngineConfig::default()
    }
}

pub fn registry(telephony: Arc<dyn Telephony>, contacts: Vec<CrmContact>) -> CampaignRegistry {
    CampaignRegistry::builder(fast_config(), telephony, Arc::new(InMemoryCrm::new(contacts))).build()
}

/// Poll `check` until it returns true or `timeout` passes.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

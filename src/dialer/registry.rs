//! Campaign registry: the operator surface over every campaign.
//!
//! The registry owns one `CampaignRecord` per campaign behind its own lock,
//! spawns and tears down admission loops as campaigns start and stop, and
//! routes call outcomes to the right record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{RwLock, Semaphore};

use crate::campaign::{Campaign, CampaignCommand, CampaignId, CampaignSpec, CampaignStatus};
use crate::config::EngineConfig;
use crate::contact::{
    disposition_options, CampaignContact, CampaignContactId, ContactRef, ContactStatus,
    DispositionOptions, DispositionRecord, DispositionStats, DispositionUpdate,
};
use crate::crm::{ContactFilter, Crm};
use crate::error::{Error, Result};
use crate::telephony::{CallOutcome, OutcomeReceiver, Telephony};
use crate::util::{Clock, SystemClock};
use crate::{dlog, dlog_debug};

use super::events::{DialerEvent, EventSender, EventSink};
use super::pump::OutcomePump;
use super::record::CampaignRecord;
use super::runner::{CampaignRunner, LoopHandle, RunningLoops};
use super::selector::{BulkAddResult, FilterPreview};
use super::stats::CampaignStats;

type Records = RwLock<HashMap<CampaignId, Arc<RwLock<CampaignRecord>>>>;

pub struct RegistryBuilder {
    config: EngineConfig,
    telephony: Arc<dyn Telephony>,
    crm: Arc<dyn Crm>,
    clock: Arc<dyn Clock>,
    events: EventSink,
}

impl RegistryBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn events(mut self, tx: EventSender) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    pub fn build(self) -> CampaignRegistry {
        let placement_slots = Arc::new(Semaphore::new(self.config.max_parallel_placements.max(1)));
        CampaignRegistry {
            inner: Arc::new(Inner {
                config: self.config,
                telephony: self.telephony,
                crm: self.crm,
                clock: self.clock,
                events: self.events,
                placement_slots,
                campaigns: RwLock::new(HashMap::new()),
                running: Arc::new(RwLock::new(HashMap::new())),
                generation: AtomicU64::new(1),
                pump: RwLock::new(None),
            }),
        }
    }
}

struct Inner {
    config: EngineConfig,
    telephony: Arc<dyn Telephony>,
    crm: Arc<dyn Crm>,
    clock: Arc<dyn Clock>,
    events: EventSink,
    placement_slots: Arc<Semaphore>,
    campaigns: Records,
    running: RunningLoops,
    generation: AtomicU64,
    pump: RwLock<Option<LoopHandle>>,
}

/// Cheap to clone; clones share the same campaigns.
#[derive(Clone)]
pub struct CampaignRegistry {
    inner: Arc<Inner>,
}

impl CampaignRegistry {
    pub fn builder(config: EngineConfig, telephony: Arc<dyn Telephony>, crm: Arc<dyn Crm>) -> RegistryBuilder {
        RegistryBuilder {
            config,
            telephony,
            crm,
            clock: Arc::new(SystemClock),
            events: EventSink::none(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Start draining `rx` into the registry. Replaces any earlier pump.
    pub async fn spawn_outcome_pump(&self, rx: OutcomeReceiver) {
        let handle = OutcomePump::new(rx, self.clone()).spawn();
        if let Some(old) = self.inner.pump.write().await.replace(handle) {
            old.shutdown();
        }
    }

    /// Stop every campaign loop and the outcome pump. Campaign state is kept.
    pub async fn shutdown(&self) {
        let mut running = self.inner.running.write().await;
        for (_, handle) in running.drain() {
            handle.shutdown();
        }
        if let Some(pump) = self.inner.pump.write().await.take() {
            pump.shutdown();
        }
        dlog_debug!("CampaignRegistry: shut down");
    }

    // --- campaign CRUD ---

    pub async fn create_campaign(&self, spec: CampaignSpec) -> Result<Campaign> {
        let campaign = Campaign::new(spec)?;
        let snapshot = campaign.clone();
        let record = CampaignRecord::new(campaign)?;
        self.inner
            .campaigns
            .write()
            .await
            .insert(snapshot.id, Arc::new(RwLock::new(record)));
        dlog!("Campaign {} created: {}", snapshot.id.short(), snapshot.name);
        Ok(snapshot)
    }

    pub async fn update_campaign(&self, id: CampaignId, spec: CampaignSpec) -> Result<Campaign> {
        let record = self.record(id).await?;
        let mut record = record.write().await;
        record.reconfigure(spec)?;
        Ok(record.campaign().clone())
    }

    pub async fn delete_campaign(&self, id: CampaignId) -> Result<()> {
        let mut campaigns = self.inner.campaigns.write().await;
        let record = campaigns.get(&id).cloned().ok_or(Error::CampaignNotFound(id))?;
        if record.read().await.is_running() {
            return Err(Error::CampaignRunning(id));
        }
        campaigns.remove(&id);
        if let Some(handle) = self.inner.running.write().await.remove(&id) {
            handle.shutdown();
        }
        dlog!("Campaign {} deleted", id.short());
        Ok(())
    }

    pub async fn campaign(&self, id: CampaignId) -> Result<Campaign> {
        Ok(self.record(id).await?.read().await.campaign().clone())
    }

    /// All campaigns, oldest first.
    pub async fn list_campaigns(&self) -> Vec<Campaign> {
        let records: Vec<Arc<RwLock<CampaignRecord>>> =
            self.inner.campaigns.read().await.values().cloned().collect();
        let mut campaigns = Vec::with_capacity(records.len());
        for record in records {
            campaigns.push(record.read().await.campaign().clone());
        }
        campaigns.sort_by_key(|c| c.created_at);
        campaigns
    }

    // --- lifecycle ---

    pub async fn start(&self, id: CampaignId) -> Result<Campaign> {
        self.command(id, CampaignCommand::Start).await
    }

    pub async fn pause(&self, id: CampaignId) -> Result<Campaign> {
        self.command(id, CampaignCommand::Pause).await
    }

    pub async fn resume(&self, id: CampaignId) -> Result<Campaign> {
        self.command(id, CampaignCommand::Resume).await
    }

    pub async fn stop(&self, id: CampaignId) -> Result<Campaign> {
        self.command(id, CampaignCommand::Stop).await
    }

    pub async fn restart(&self, id: CampaignId) -> Result<Campaign> {
        self.command(id, CampaignCommand::Restart).await
    }

    async fn command(&self, id: CampaignId, command: CampaignCommand) -> Result<Campaign> {
        let record = self.record(id).await?;
        let mut running = self.inner.running.write().await;

        let (snapshot, in_flight) = {
            let mut guard = record.write().await;
            guard.command(command, self.inner.clock.now(), self.inner.config.restart_policy)?;
            self.inner.events.emit_all(guard.take_events());
            (guard.campaign().clone(), guard.in_flight_count())
        };

        if let Some(old) = running.remove(&id) {
            old.shutdown();
        }
        // A paused or stopped campaign keeps a loop until its live calls end.
        if snapshot.status == CampaignStatus::Running || in_flight > 0 {
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst);
            let runner = CampaignRunner::new(
                record,
                Arc::clone(&self.inner.telephony),
                Arc::clone(&self.inner.placement_slots),
                self.inner.config.clone(),
                Arc::clone(&self.inner.clock),
                self.inner.events.clone(),
            );
            let handle = runner.spawn(id, Arc::clone(&self.inner.running), generation);
            running.insert(id, handle);
        }
        Ok(snapshot)
    }

    /// Whether the campaign is running with an admission loop alive.
    pub async fn is_dialing(&self, id: CampaignId) -> bool {
        self.has_loop(id).await && self.is_running(id).await
    }

    /// Whether a loop is still sweeping in-flight calls for a campaign that
    /// is no longer running.
    pub async fn is_draining(&self, id: CampaignId) -> bool {
        self.has_loop(id).await && !self.is_running(id).await
    }

    async fn has_loop(&self, id: CampaignId) -> bool {
        self.inner.running.read().await.contains_key(&id)
    }

    async fn is_running(&self, id: CampaignId) -> bool {
        match self.record(id).await {
            Ok(record) => record.read().await.is_running(),
            Err(_) => false,
        }
    }

    pub async fn in_flight(&self, id: CampaignId) -> Result<usize> {
        Ok(self.record(id).await?.read().await.in_flight_count())
    }

    // --- roster ---

    /// Attach CRM contacts by id. Returns how many were newly attached.
    pub async fn add_contacts(&self, id: CampaignId, contacts: &[ContactRef]) -> Result<u32> {
        let record = self.record(id).await?;
        let found = self.inner.crm.get_contacts(contacts).await?;
        let added = record.write().await.add_contacts(&found);
        dlog!("Campaign {}: added {} contacts", id.short(), added);
        Ok(added)
    }

    pub async fn remove_contact(&self, id: CampaignId, contact_id: CampaignContactId) -> Result<()> {
        self.record(id).await?.write().await.remove_contact(contact_id)?;
        Ok(())
    }

    pub async fn skip_contact(&self, id: CampaignId, contact_id: CampaignContactId) -> Result<()> {
        self.record(id).await?.write().await.skip_contact(contact_id)
    }

    pub async fn unskip_contact(&self, id: CampaignId, contact_id: CampaignContactId) -> Result<()> {
        self.record(id).await?.write().await.unskip_contact(contact_id)
    }

    pub async fn set_priority(&self, id: CampaignId, contact_id: CampaignContactId, priority: i32) -> Result<()> {
        self.record(id).await?.write().await.set_priority(contact_id, priority)
    }

    pub async fn list_contacts(&self, id: CampaignId, status: Option<ContactStatus>) -> Result<Vec<CampaignContact>> {
        Ok(self.record(id).await?.read().await.contacts(status))
    }

    pub async fn contact(&self, id: CampaignId, contact_id: CampaignContactId) -> Result<CampaignContact> {
        Ok(self.record(id).await?.read().await.contact(contact_id)?.clone())
    }

    pub async fn preview_filter(&self, id: CampaignId, filter: &ContactFilter) -> Result<FilterPreview> {
        let record = self.record(id).await?;
        let matching = self.inner.crm.query(filter).await?;
        let preview = record
            .read()
            .await
            .preview_bulk_add(matching, filter.exclude_existing);
        Ok(preview)
    }

    pub async fn commit_filter(&self, id: CampaignId, filter: &ContactFilter) -> Result<BulkAddResult> {
        let record = self.record(id).await?;
        let matching = self.inner.crm.query(filter).await?;
        let result = record
            .write()
            .await
            .commit_bulk_add(matching, filter.exclude_existing);
        Ok(result)
    }

    // --- statistics ---

    pub async fn stats(&self, id: CampaignId) -> Result<CampaignStats> {
        Ok(self.record(id).await?.read().await.stats())
    }

    pub async fn recompute_stats(&self, id: CampaignId) -> Result<CampaignStats> {
        Ok(self.record(id).await?.write().await.recompute_stats())
    }

    // --- dispositions ---

    pub fn disposition_options(&self) -> DispositionOptions {
        disposition_options()
    }

    pub async fn disposition(&self, id: CampaignId, contact_id: CampaignContactId) -> Result<DispositionRecord> {
        self.record(id).await?.read().await.disposition(contact_id)
    }

    pub async fn set_disposition(
        &self,
        id: CampaignId,
        contact_id: CampaignContactId,
        update: &DispositionUpdate,
    ) -> Result<DispositionRecord> {
        self.record(id).await?.write().await.update_disposition(contact_id, update)
    }

    /// Entry point for the conversational agent to classify a finished
    /// call after the fact, keyed by the ids it received with the call.
    pub async fn report_disposition(
        &self,
        id: CampaignId,
        contact_id: CampaignContactId,
        update: &DispositionUpdate,
    ) -> Result<DispositionRecord> {
        let record = self.set_disposition(id, contact_id, update).await?;
        dlog_debug!(
            "Campaign {}: agent reported {:?} for contact {}",
            id.short(),
            record.disposition,
            contact_id.short()
        );
        Ok(record)
    }

    pub async fn disposition_stats(&self, id: CampaignId) -> Result<DispositionStats> {
        let now = self.inner.clock.now();
        Ok(self.record(id).await?.read().await.disposition_stats(now))
    }

    // --- outcomes ---

    /// Apply one call outcome to its campaign and wake that campaign's loop
    /// so freed capacity is reused promptly.
    pub async fn deliver_outcome(&self, outcome: &CallOutcome) -> Result<ContactStatus> {
        let record = self.record(outcome.campaign_id).await?;
        let result = {
            let mut guard = record.write().await;
            let result = guard.apply_outcome(outcome);
            if result.is_ok() {
                guard.check_completion(self.inner.clock.now());
            }
            self.inner.events.emit_all(guard.take_events());
            result
        };
        if let Err(e) = &result {
            self.inner.events.emit(DialerEvent::OutcomeRejected {
                campaign_id: outcome.campaign_id,
                contact_id: outcome.contact_id,
                reason: e.to_string(),
            });
        }
        if let Some(handle) = self.inner.running.read().await.get(&outcome.campaign_id) {
            handle.wake();
        }
        result
    }

    async fn record(&self, id: CampaignId) -> Result<Arc<RwLock<CampaignRecord>>> {
        self.inner
            .campaigns
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::CampaignNotFound(id))
    }
}

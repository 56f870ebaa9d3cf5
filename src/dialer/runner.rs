//! Per-campaign admission loop.
//!
//! One loop runs per running campaign. Each tick reconciles overdue calls,
//! checks for completion, admits what pacing allows and hands those calls
//! to a placement task that runs outside the campaign lock. Outside the
//! calling window the loop sleeps until the window opens instead of polling.
//!
//! Once the campaign leaves `running` with calls still in flight, the loop
//! keeps ticking without admitting until every call has an outcome or has
//! been reconciled as failed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::campaign::CampaignId;
use crate::config::EngineConfig;
use crate::telephony::{PlacementRequest, Telephony};
use crate::util::Clock;
use crate::{dlog_debug, dlog_trace};

use super::dispatcher::place_all;
use super::events::EventSink;
use super::record::CampaignRecord;

/// Campaign loops currently alive, keyed by campaign.
pub type RunningLoops = Arc<RwLock<HashMap<CampaignId, LoopHandle>>>;

/// Handle to a background loop, used to wake it early or shut it down.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    cancel: CancellationToken,
    wake: Arc<Notify>,
    generation: u64,
}

impl LoopHandle {
    pub fn new(generation: u64) -> Self {
        Self {
            cancel: CancellationToken::new(),
            wake: Arc::new(Notify::new()),
            generation,
        }
    }

    /// Signal the loop to stop after its current step.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once `shutdown` has been called.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Cut the current sleep short.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tick again after this long.
    Continue(Duration),
    /// The campaign is no longer running and has nothing in flight.
    Stop,
}

pub struct CampaignRunner {
    record: Arc<RwLock<CampaignRecord>>,
    telephony: Arc<dyn Telephony>,
    placement_slots: Arc<Semaphore>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    events: EventSink,
}

impl CampaignRunner {
    pub fn new(
        record: Arc<RwLock<CampaignRecord>>,
        telephony: Arc<dyn Telephony>,
        placement_slots: Arc<Semaphore>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        events: EventSink,
    ) -> Self {
        Self {
            record,
            telephony,
            placement_slots,
            config,
            clock,
            events,
        }
    }

    /// Run the loop on the tokio runtime.
    ///
    /// On exit the loop removes its own entry from `running`, unless a newer
    /// loop for the same campaign has already replaced it.
    pub fn spawn(self, campaign_id: CampaignId, running: RunningLoops, generation: u64) -> LoopHandle {
        let handle = LoopHandle::new(generation);
        let cancel = handle.cancel.clone();
        let wake = Arc::clone(&handle.wake);
        dlog_debug!("CampaignRunner::spawn {} gen {}", campaign_id.short(), generation);

        tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let wait = match self.tick().await {
                    TickOutcome::Continue(wait) => wait,
                    TickOutcome::Stop => break,
                };
                tokio::select! {
                    _ = cancel.cancelled() => {
                        dlog_debug!("CampaignRunner {} cancelled", campaign_id.short());
                        break;
                    }
                    _ = tokio::time::sleep(wait) => {}
                    _ = wake.notified() => {
                        dlog_trace!("CampaignRunner {} woken", campaign_id.short());
                    }
                }
            }

            let mut running = running.write().await;
            if running
                .get(&campaign_id)
                .is_some_and(|h| h.generation == generation)
            {
                running.remove(&campaign_id);
            }
            dlog_debug!("CampaignRunner {} exited", campaign_id.short());
        });

        handle
    }

    /// One pass of the admission loop.
    pub async fn tick(&self) -> TickOutcome {
        let now = self.clock.now();
        let requests = {
            let mut record = self.record.write().await;
            record.reconcile(now, self.config.reconcile_timeout());
            let requests = if record.is_running() && !record.check_completion(now) {
                record.admit(now)
            } else {
                Vec::new()
            };
            self.events.emit_all(record.take_events());
            requests
        };

        if !requests.is_empty() {
            self.spawn_placements(requests);
        }

        let record = self.record.read().await;
        if record.is_running() {
            return TickOutcome::Continue(record.next_wake(
                self.clock.now(),
                self.config.tick_interval(),
                self.config.reconcile_timeout(),
            ));
        }
        if record.in_flight_count() > 0 {
            dlog_trace!(
                "CampaignRunner {}: {} draining, {} in flight",
                record.id().short(),
                record.status(),
                record.in_flight_count()
            );
            return TickOutcome::Continue(self.config.tick_interval());
        }
        TickOutcome::Stop
    }

    /// Place `requests` on a task of their own and fold the provider's
    /// answers back into the record when they arrive.
    fn spawn_placements(&self, requests: Vec<PlacementRequest>) {
        let record = Arc::clone(&self.record);
        let telephony = Arc::clone(&self.telephony);
        let slots = Arc::clone(&self.placement_slots);
        let clock = Arc::clone(&self.clock);
        let events = self.events.clone();
        let timeout = self.config.placement_timeout();
        let threshold = self.config.placement_failure_threshold;

        tokio::spawn(async move {
            let results = place_all(telephony, slots, requests, timeout).await;
            let now = clock.now();
            let mut record = record.write().await;
            for (request, result) in results {
                record.record_placement(&request, result, now, threshold);
            }
            events.emit_all(record.take_events());
        });
    }
}

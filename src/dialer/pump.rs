//! Outcome pump: drains the telephony outcome channel into the registry.
//!
//! The pump is independent of campaign loops, so outcomes for calls that
//! were live when a campaign paused or stopped are still applied.

use crate::telephony::OutcomeReceiver;
use crate::{dlog_debug, dlog_warn};

use super::registry::CampaignRegistry;
use super::runner::LoopHandle;

pub struct OutcomePump {
    rx: OutcomeReceiver,
    registry: CampaignRegistry,
}

impl OutcomePump {
    pub fn new(rx: OutcomeReceiver, registry: CampaignRegistry) -> Self {
        Self { rx, registry }
    }

    pub fn spawn(mut self) -> LoopHandle {
        let handle = LoopHandle::new(0);
        let cancel = handle.clone();
        dlog_debug!("OutcomePump::spawn");

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        dlog_debug!("OutcomePump cancelled");
                        break;
                    }
                    outcome = self.rx.recv() => {
                        let Some(outcome) = outcome else {
                            dlog_debug!("OutcomePump: channel closed");
                            break;
                        };
                        if let Err(e) = self.registry.deliver_outcome(&outcome).await {
                            dlog_warn!(
                                "OutcomePump: dropped outcome for contact {}: {}",
                                outcome.contact_id.short(),
                                e
                            );
                        }
                    }
                }
            }
        });

        handle
    }
}

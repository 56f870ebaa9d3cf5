//! Scripted telephony provider for the CLI and tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{dlog_debug, dlog_trace};

use super::{CallHandle, CallOutcome, CallSignal, OutcomeSender, PlacementRequest, Telephony};

/// What happens to the n-th placed call. The script cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "step")]
pub enum ScriptStep {
    Answer { duration_seconds: u32 },
    NoAnswer,
    Busy,
    Fail,
    /// Reject at placement time; no outcome follows.
    Reject,
    /// Accept the call but never report an outcome.
    Silent,
}

pub struct SimulatedTelephony {
    outcome_tx: OutcomeSender,
    script: Vec<ScriptStep>,
    delay: Duration,
    counter: AtomicU64,
    placed: Mutex<Vec<PlacementRequest>>,
}

impl SimulatedTelephony {
    pub fn new(outcome_tx: OutcomeSender, script: Vec<ScriptStep>) -> Self {
        let script = if script.is_empty() {
            vec![ScriptStep::Answer { duration_seconds: 30 }]
        } else {
            script
        };
        Self {
            outcome_tx,
            script,
            delay: Duration::ZERO,
            counter: AtomicU64::new(0),
            placed: Mutex::new(Vec::new()),
        }
    }

    /// Delay between placement and outcome delivery.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Requests accepted or rejected so far, in placement order.
    pub fn placed(&self) -> Vec<PlacementRequest> {
        self.placed.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Telephony for SimulatedTelephony {
    async fn place_call(&self, request: &PlacementRequest) -> Result<CallHandle> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let step = self.script[(n as usize) % self.script.len()].clone();
        if let Ok(mut placed) = self.placed.lock() {
            placed.push(request.clone());
        }
        dlog_trace!(
            "SimulatedTelephony: call #{} to {} -> {:?}",
            n,
            request.to_number,
            step
        );

        let (signal, duration) = match step {
            ScriptStep::Reject => {
                return Err(Error::PlacementFailure(format!(
                    "simulated rejection for {}",
                    request.to_number
                )));
            }
            ScriptStep::Silent => return Ok(CallHandle(format!("sim-{}", n))),
            ScriptStep::Answer { duration_seconds } => (CallSignal::Answered, duration_seconds),
            ScriptStep::NoAnswer => (CallSignal::NoAnswer, 0),
            ScriptStep::Busy => (CallSignal::Busy, 0),
            ScriptStep::Fail => (
                CallSignal::Failed {
                    reason: "simulated network failure".to_string(),
                },
                0,
            ),
        };

        let handle = CallHandle(format!("sim-{}", n));
        let mut outcome = CallOutcome::for_request(request, signal, duration, Utc::now());
        outcome.handle = Some(handle.clone());
        let tx = self.outcome_tx.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            outcome.ended_at = Utc::now();
            if tx.send(outcome).await.is_err() {
                dlog_debug!("SimulatedTelephony: outcome channel closed");
            }
        });

        Ok(handle)
    }
}

//! Registry tests: real admission loops, the outcome pump and the operator
//! surface.

use std::sync::Arc;
use std::time::Duration;

use dialer::campaign::{CampaignSpec, Pacing};
use dialer::contact::{Disposition, DispositionCategory, DispositionUpdate};
use dialer::crm::InMemoryCrm;
use dialer::dialer::{CampaignRegistry, DialerEvent};
use dialer::telephony::{outcome_channel, CallSignal, ScriptStep, SimulatedTelephony};
use dialer::util::Clock;
use dialer::{CampaignId, CampaignStatus, ContactRef, ContactStatus, Error};

use crate::fixtures::*;

const WAIT: Duration = Duration::from_secs(5);

fn manual_registry(telephony: Arc<FakeTelephony>, contacts: i64, clock: Arc<ManualClock>) -> CampaignRegistry {
    CampaignRegistry::builder(fast_config(), telephony, Arc::new(InMemoryCrm::new(crm_contacts(contacts))))
        .clock(clock)
        .build()
}

async fn create_with_contacts(registry: &CampaignRegistry, spec: CampaignSpec, contacts: i64) -> CampaignId {
    let campaign = registry.create_campaign(spec).await.unwrap();
    let refs: Vec<ContactRef> = (1..=contacts).map(ContactRef).collect();
    assert_eq!(registry.add_contacts(campaign.id, &refs).await.unwrap(), contacts as u32);
    campaign.id
}

async fn status_is(registry: &CampaignRegistry, id: CampaignId, status: CampaignStatus) -> bool {
    registry.campaign(id).await.unwrap().status == status
}

#[tokio::test]
async fn test_campaign_runs_to_completion() {
    let (outcome_tx, outcome_rx) = outcome_channel(64);
    let script = vec![
        ScriptStep::Answer { duration_seconds: 40 },
        ScriptStep::Answer { duration_seconds: 20 },
    ];
    let telephony = Arc::new(SimulatedTelephony::new(outcome_tx, script).with_delay(Duration::from_millis(10)));
    let registry = registry(telephony.clone(), crm_contacts(10));
    registry.spawn_outcome_pump(outcome_rx).await;

    let id = create_with_contacts(&registry, spec(pacing(30, 4)), 10).await;
    registry.start(id).await.unwrap();
    assert!(registry.is_dialing(id).await);

    assert!(
        wait_until(WAIT, || status_is(&registry, id, CampaignStatus::Completed)).await,
        "campaign did not complete"
    );

    let stats = registry.stats(id).await.unwrap();
    assert_eq!(stats.contacts_completed, 10);
    assert_eq!(stats.total_calls_made, 10);
    assert_eq!(stats.total_call_duration_seconds, 300);
    assert!((stats.average_call_duration_seconds - 30.0).abs() < f64::EPSILON);
    assert!((stats.completion_rate - 1.0).abs() < f64::EPSILON);
    assert_eq!(registry.recompute_stats(id).await.unwrap(), stats);
    assert_eq!(telephony.placed().len(), 10);

    assert!(wait_until(WAIT, || async { !registry.is_dialing(id).await }).await);
    registry.shutdown().await;
}

#[tokio::test]
async fn test_loop_respects_rate_until_clock_moves() {
    let clock = ManualClock::new(t0());
    let telephony = FakeTelephony::new();
    let registry = manual_registry(telephony.clone(), 20, clock.clone());
    let id = create_with_contacts(&registry, spec(pacing(5, 10)), 20).await;

    registry.start(id).await.unwrap();
    assert!(wait_until(WAIT, || async { telephony.placed().len() == 5 }).await);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(telephony.placed().len(), 5);
    assert_eq!(registry.in_flight(id).await.unwrap(), 5);

    clock.advance(chrono::Duration::seconds(60));
    assert!(wait_until(WAIT, || async { telephony.placed().len() == 10 }).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(telephony.placed().len(), 10);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_pause_stops_admission_but_outcomes_apply() {
    let clock = ManualClock::new(t0());
    let telephony = FakeTelephony::new();
    let registry = manual_registry(telephony.clone(), 10, clock.clone());
    let id = create_with_contacts(&registry, spec(Pacing::default()), 10).await;

    registry.start(id).await.unwrap();
    assert!(wait_until(WAIT, || async { telephony.placed().len() == 5 }).await);

    registry.pause(id).await.unwrap();
    assert!(!registry.is_dialing(id).await);

    for request in telephony.placed() {
        let status = registry
            .deliver_outcome(&outcome(&request, CallSignal::Answered, 15, clock.now()))
            .await
            .unwrap();
        assert_eq!(status, ContactStatus::Completed);
    }
    assert_eq!(registry.in_flight(id).await.unwrap(), 0);

    clock.advance(chrono::Duration::minutes(2));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(telephony.placed().len(), 5);
    assert_eq!(registry.campaign(id).await.unwrap().status, CampaignStatus::Paused);

    registry.resume(id).await.unwrap();
    assert!(wait_until(WAIT, || async { telephony.placed().len() == 10 }).await);
    registry.shutdown().await;
}

#[tokio::test]
async fn test_consecutive_rejections_pause_campaign() {
    let telephony = FakeTelephony::new();
    telephony.set_reject(true);
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let registry = CampaignRegistry::builder(
        fast_config(),
        telephony.clone(),
        Arc::new(InMemoryCrm::new(crm_contacts(10))),
    )
    .events(event_tx)
    .build();
    let id = create_with_contacts(&registry, spec(pacing(30, 10)), 10).await;

    registry.start(id).await.unwrap();
    assert!(wait_until(WAIT, || status_is(&registry, id, CampaignStatus::Paused)).await);

    let campaign = registry.campaign(id).await.unwrap();
    assert_eq!(campaign.error_count, 1);
    assert!(campaign
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("consecutive placement failures")));
    assert_eq!(registry.in_flight(id).await.unwrap(), 0);
    assert!(wait_until(WAIT, || async { !registry.is_dialing(id).await }).await);

    let mut saw_pause = false;
    while let Ok(event) = event_rx.try_recv() {
        if let DialerEvent::StatusChanged {
            status: CampaignStatus::Paused,
            reason: Some(_),
            ..
        } = event
        {
            saw_pause = true;
        }
    }
    assert!(saw_pause);
    registry.shutdown().await;
}

#[tokio::test]
async fn test_silent_calls_reconciled_as_failed() {
    let clock = ManualClock::new(t0());
    let telephony = FakeTelephony::new();
    let registry = manual_registry(telephony.clone(), 10, clock.clone());
    let id = create_with_contacts(&registry, spec(Pacing::default()), 10).await;

    registry.start(id).await.unwrap();
    assert!(wait_until(WAIT, || async { telephony.placed().len() == 5 }).await);

    clock.advance(chrono::Duration::hours(2));
    assert!(wait_until(WAIT, || async { telephony.placed().len() == 10 }).await);

    let failed = registry
        .list_contacts(id, Some(ContactStatus::Failed))
        .await
        .unwrap();
    assert_eq!(failed.len(), 5);
    assert!(failed
        .iter()
        .all(|c| c.last_call_outcome.as_deref() == Some("timeout") && c.next_attempt_at.is_some()));
    registry.shutdown().await;
}

#[tokio::test]
async fn test_stopped_campaign_reconciles_silent_calls() {
    let clock = ManualClock::new(t0());
    let telephony = FakeTelephony::new();
    let registry = manual_registry(telephony.clone(), 10, clock.clone());
    let id = create_with_contacts(&registry, spec(Pacing::default()), 10).await;

    registry.start(id).await.unwrap();
    assert!(wait_until(WAIT, || async { telephony.placed().len() == 5 }).await);
    registry.stop(id).await.unwrap();
    assert!(!registry.is_dialing(id).await);
    assert!(registry.is_draining(id).await);

    let live = telephony.placed()[0].contact_id;
    assert!(matches!(
        registry.remove_contact(id, live).await,
        Err(Error::ContactInFlight(_))
    ));

    clock.advance(chrono::Duration::days(30));
    assert!(wait_until(WAIT, || async { registry.in_flight(id).await.unwrap() == 0 }).await);
    assert!(wait_until(WAIT, || async { !registry.is_draining(id).await }).await);

    let stats = registry.stats(id).await.unwrap();
    assert_eq!(stats.contacts_calling, 0);
    assert_eq!(stats.contacts_failed, 5);
    assert_eq!(registry.campaign(id).await.unwrap().status, CampaignStatus::Canceled);
    assert_eq!(telephony.placed().len(), 5);
    registry.remove_contact(id, live).await.unwrap();
    registry.shutdown().await;
}

#[tokio::test]
async fn test_stale_outcome_rejected() {
    let clock = ManualClock::new(t0());
    let telephony = FakeTelephony::new();
    let registry = manual_registry(telephony.clone(), 1, clock.clone());
    let id = create_with_contacts(&registry, spec(Pacing::default()), 1).await;
    registry.start(id).await.unwrap();
    assert!(wait_until(WAIT, || async { telephony.placed().len() == 1 }).await);

    let request = telephony.placed().remove(0);
    let mut stale = outcome(&request, CallSignal::Answered, 5, t0());
    stale.attempt += 1;
    assert!(matches!(
        registry.deliver_outcome(&stale).await,
        Err(Error::OutcomeDelivery(_))
    ));

    let mut foreign = outcome(&request, CallSignal::Answered, 5, t0());
    foreign.campaign_id = CampaignId::new();
    assert!(matches!(
        registry.deliver_outcome(&foreign).await,
        Err(Error::CampaignNotFound(_))
    ));

    assert_eq!(
        registry.contact(id, request.contact_id).await.unwrap().status,
        ContactStatus::Calling
    );
    registry.shutdown().await;
}

#[tokio::test]
async fn test_running_campaign_cannot_be_edited_or_deleted() {
    let registry = registry(FakeTelephony::new(), crm_contacts(3));
    let id = create_with_contacts(&registry, spec(pacing(1, 1)), 3).await;
    registry.start(id).await.unwrap();

    assert!(matches!(
        registry.update_campaign(id, spec(pacing(2, 2))).await,
        Err(Error::CampaignRunning(_))
    ));
    assert!(matches!(
        registry.delete_campaign(id).await,
        Err(Error::CampaignRunning(_))
    ));

    registry.stop(id).await.unwrap();
    assert!(!registry.is_dialing(id).await);
    let updated = registry.update_campaign(id, spec(pacing(2, 2))).await.unwrap();
    assert_eq!(updated.pacing.calls_per_minute, 2);
    registry.delete_campaign(id).await.unwrap();
    assert!(matches!(
        registry.campaign(id).await,
        Err(Error::CampaignNotFound(_))
    ));
    assert!(registry.list_campaigns().await.is_empty());
    registry.shutdown().await;
}

#[tokio::test]
async fn test_start_empty_campaign_fails() {
    let registry = registry(FakeTelephony::new(), Vec::new());
    let campaign = registry.create_campaign(spec(Pacing::default())).await.unwrap();
    assert!(matches!(
        registry.start(campaign.id).await,
        Err(Error::Validation(_))
    ));
    assert!(!registry.is_dialing(campaign.id).await);
}

#[tokio::test]
async fn test_invalid_spec_rejected() {
    let registry = registry(FakeTelephony::new(), Vec::new());
    let mut bad = spec(pacing(31, 5));
    assert!(registry.create_campaign(bad.clone()).await.is_err());
    bad.pacing.calls_per_minute = 5;
    bad.from_phone_number = "call me".to_string();
    assert!(registry.create_campaign(bad).await.is_err());
    assert!(registry.list_campaigns().await.is_empty());
}

#[tokio::test]
async fn test_restart_after_stop_spawns_new_loop() {
    let clock = ManualClock::new(t0());
    let telephony = FakeTelephony::new();
    let registry = manual_registry(telephony.clone(), 4, clock.clone());
    let id = create_with_contacts(&registry, spec(pacing(2, 2)), 4).await;

    registry.start(id).await.unwrap();
    assert!(wait_until(WAIT, || async { telephony.placed().len() == 2 }).await);
    registry.stop(id).await.unwrap();
    for request in telephony.placed() {
        registry
            .deliver_outcome(&outcome(&request, CallSignal::NoAnswer, 0, t0()))
            .await
            .unwrap();
    }

    clock.advance(chrono::Duration::minutes(1));
    registry.restart(id).await.unwrap();
    assert!(registry.is_dialing(id).await);
    assert!(wait_until(WAIT, || async { telephony.placed().len() == 4 }).await);
    registry.shutdown().await;
}

#[tokio::test]
async fn test_agent_disposition_hook() {
    let clock = ManualClock::new(t0());
    let telephony = FakeTelephony::new();
    let registry = manual_registry(telephony.clone(), 2, clock.clone());
    let id = create_with_contacts(&registry, spec(Pacing::default()), 2).await;
    registry.start(id).await.unwrap();
    assert!(wait_until(WAIT, || async { telephony.placed().len() == 2 }).await);

    let placed = telephony.placed();
    let callback = t0() + chrono::Duration::days(1);
    let status = registry
        .deliver_outcome(&outcome(
            &placed[0],
            CallSignal::AgentReported {
                disposition: Disposition::CallbackRequested,
                notes: Some("call after lunch".to_string()),
                callback_at: Some(callback),
            },
            95,
            t0(),
        ))
        .await
        .unwrap();
    assert_eq!(status, ContactStatus::Completed);

    let record = registry.disposition(id, placed[0].contact_id).await.unwrap();
    assert_eq!(record.disposition, Some(Disposition::CallbackRequested));
    assert_eq!(record.callback_requested_at, Some(callback));

    registry
        .deliver_outcome(&outcome(&placed[1], CallSignal::Answered, 30, t0()))
        .await
        .unwrap();
    registry
        .report_disposition(
            id,
            placed[1].contact_id,
            &DispositionUpdate::new(Disposition::NotInterested).with_notes("already has a plan"),
        )
        .await
        .unwrap();

    let stats = registry.disposition_stats(id).await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.by_category.get(&DispositionCategory::Positive), Some(&1));
    assert_eq!(stats.by_category.get(&DispositionCategory::Negative), Some(&1));
    assert_eq!(stats.callbacks_pending, 1);

    let options = registry.disposition_options();
    assert_eq!(options.positive.len(), 4);
    assert_eq!(options.technical.len(), 4);
    registry.shutdown().await;
}

#[tokio::test]
async fn test_remove_and_skip_through_registry() {
    let clock = ManualClock::new(t0());
    let telephony = FakeTelephony::new();
    let registry = manual_registry(telephony.clone(), 3, clock.clone());
    let id = create_with_contacts(&registry, spec(pacing(1, 1)), 3).await;
    registry.start(id).await.unwrap();
    assert!(wait_until(WAIT, || async { telephony.placed().len() == 1 }).await);

    let live = telephony.placed().remove(0).contact_id;
    assert!(matches!(
        registry.remove_contact(id, live).await,
        Err(Error::ContactInFlight(_))
    ));

    let pending = registry
        .list_contacts(id, Some(ContactStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);
    registry.skip_contact(id, pending[0].id).await.unwrap();
    registry.remove_contact(id, pending[1].id).await.unwrap();

    let stats = registry.stats(id).await.unwrap();
    assert_eq!(stats.total_contacts, 2);
    assert_eq!(stats.contacts_skipped, 1);
    assert_eq!(stats.contacts_calling, 1);
    registry.shutdown().await;
}

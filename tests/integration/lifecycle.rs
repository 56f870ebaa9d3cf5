//! Campaign lifecycle tests: transitions, pause, stop and restart.

use chrono::Duration;

use dialer::campaign::{CampaignCommand, Pacing};
use dialer::config::RestartPolicy;
use dialer::contact::{Disposition, DispositionUpdate};
use dialer::telephony::CallSignal;
use dialer::{CampaignStatus, ContactStatus, Error};

use crate::fixtures::*;

#[test]
fn test_invalid_transitions_rejected() {
    let now = t0();
    let mut record = draft_record(spec(Pacing::default()), 2);

    for command in [CampaignCommand::Pause, CampaignCommand::Resume, CampaignCommand::Restart] {
        let err = record
            .command(command, now, RestartPolicy::Rearm)
            .unwrap_err();
        assert!(
            matches!(err, Error::InvalidStateTransition { .. }),
            "{} from draft: {}",
            command,
            err
        );
    }
    assert_eq!(record.status(), CampaignStatus::Draft);

    record.command(CampaignCommand::Start, now, RestartPolicy::Rearm).unwrap();
    assert!(record
        .command(CampaignCommand::Start, now, RestartPolicy::Rearm)
        .is_err());
    assert!(record
        .command(CampaignCommand::Resume, now, RestartPolicy::Rearm)
        .is_err());
}

#[test]
fn test_transitions_recorded_in_history() {
    let now = t0();
    let mut record = running_record(spec(Pacing::default()), 1, now);
    record.command(CampaignCommand::Pause, now + Duration::minutes(1), RestartPolicy::Rearm).unwrap();
    record.command(CampaignCommand::Stop, now + Duration::minutes(2), RestartPolicy::Rearm).unwrap();

    let statuses: Vec<CampaignStatus> = record.state().history().iter().map(|h| h.status).collect();
    assert_eq!(
        statuses,
        vec![
            CampaignStatus::Draft,
            CampaignStatus::Running,
            CampaignStatus::Paused,
            CampaignStatus::Canceled,
        ]
    );
    assert_eq!(record.campaign().started_at, Some(now));
}

#[test]
fn test_pause_mid_run_lets_live_calls_finish() {
    let now = t0();
    let mut record = running_record(spec(Pacing::default()), 10, now);
    let live = record.admit(now);
    assert_eq!(live.len(), 5);

    record.command(CampaignCommand::Pause, now, RestartPolicy::Rearm).unwrap();
    assert!(record.admit(now + Duration::minutes(5)).is_empty());

    for request in &live {
        let status = record
            .apply_outcome(&outcome(request, CallSignal::Answered, 10, now + Duration::minutes(1)))
            .unwrap();
        assert_eq!(status, ContactStatus::Completed);
    }
    assert_eq!(record.in_flight_count(), 0);
    assert_eq!(record.stats().contacts_completed, 5);
    assert_eq!(record.stats().contacts_pending, 5);
    assert_eq!(record.status(), CampaignStatus::Paused);
    assert!(!record.check_completion(now + Duration::minutes(2)));

    record
        .command(CampaignCommand::Resume, now + Duration::minutes(5), RestartPolicy::Rearm)
        .unwrap();
    assert_eq!(record.admit(now + Duration::minutes(5)).len(), 5);
}

#[test]
fn test_stop_is_terminal_until_restart() {
    let now = t0();
    let mut record = running_record(spec(Pacing::default()), 3, now);
    let live = record.admit(now);

    record.command(CampaignCommand::Stop, now, RestartPolicy::Rearm).unwrap();
    assert_eq!(record.status(), CampaignStatus::Canceled);
    assert!(record.admit(now + Duration::hours(1)).is_empty());

    // Outcomes for calls live at stop still land.
    record
        .apply_outcome(&outcome(&live[0], CallSignal::Busy, 0, now))
        .unwrap();
    assert_eq!(record.stats().contacts_busy, 1);
    assert!(!record.check_completion(now));
    assert_eq!(record.status(), CampaignStatus::Canceled);
}

fn completed_record() -> dialer::dialer::CampaignRecord {
    let now = t0();
    let mut record = running_record(spec(Pacing::default()), 3, now);
    for request in record.admit(now) {
        record
            .apply_outcome(&outcome(&request, CallSignal::Answered, 30, now))
            .unwrap();
    }
    let id = record.contacts(None)[0].id;
    record
        .update_disposition(id, &DispositionUpdate::new(Disposition::Interested))
        .unwrap();
    assert!(record.check_completion(now));
    assert_eq!(record.status(), CampaignStatus::Completed);
    record
}

#[test]
fn test_restart_rearm_keeps_terminal_contacts() {
    let mut record = completed_record();
    let later = t0() + Duration::hours(1);
    record
        .command(CampaignCommand::Restart, later, RestartPolicy::Rearm)
        .unwrap();
    assert_eq!(record.status(), CampaignStatus::Running);

    assert!(record.admit(later).is_empty());
    assert!(record
        .contacts(None)
        .iter()
        .all(|c| c.status == ContactStatus::Completed && c.attempts == 1));
    assert!(record.check_completion(later));
}

#[test]
fn test_restart_reset_all_redials_everyone() {
    let mut record = completed_record();
    let later = t0() + Duration::hours(1);
    record
        .command(CampaignCommand::Restart, later, RestartPolicy::ResetAll)
        .unwrap();

    let contacts = record.contacts(None);
    assert!(contacts
        .iter()
        .all(|c| c.status == ContactStatus::Pending && c.attempts == 0));
    assert_eq!(contacts[0].disposition, Some(Disposition::Interested));
    assert_eq!(record.stats().contacts_pending, 3);
    assert_eq!(record.stats().total_calls_made, 3);

    let requests = record.admit(later);
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| r.attempt == 1));
}

#[test]
fn test_reset_all_keeps_skipped() {
    let now = t0();
    let mut record = running_record(spec(Pacing::default()), 2, now);
    let skipped = record.contacts(None)[1].id;
    record.skip_contact(skipped).unwrap();
    for request in record.admit(now) {
        record
            .apply_outcome(&outcome(&request, CallSignal::Answered, 5, now))
            .unwrap();
    }
    assert!(record.check_completion(now));

    record
        .command(CampaignCommand::Restart, now, RestartPolicy::ResetAll)
        .unwrap();
    assert_eq!(record.contact(skipped).unwrap().status, ContactStatus::Skipped);
    assert_eq!(record.admit(now + Duration::minutes(1)).len(), 1);
}

#[test]
fn test_start_without_contacts_rejected() {
    let mut record = draft_record(spec(Pacing::default()), 0);
    let err = record
        .command(CampaignCommand::Start, t0(), RestartPolicy::Rearm)
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(record.status(), CampaignStatus::Draft);
}

#[test]
fn test_reconfigure_while_paused_applies_new_pacing() {
    let now = t0();
    let mut record = running_record(spec(pacing(2, 2)), 10, now);
    assert_eq!(record.admit(now).len(), 2);

    assert!(matches!(
        record.reconfigure(spec(pacing(10, 10))),
        Err(Error::CampaignRunning(_))
    ));

    record.command(CampaignCommand::Pause, now, RestartPolicy::Rearm).unwrap();
    record.reconfigure(spec(pacing(10, 10))).unwrap();
    record.command(CampaignCommand::Resume, now, RestartPolicy::Rearm).unwrap();

    // Two admissions already count against the trailing minute.
    assert_eq!(record.admit(now).len(), 8);
}

fn budget(max_attempts_per_contact: u32) -> Pacing {
    Pacing {
        max_attempts_per_contact,
        retry_delay_minutes: 1,
        ..Pacing::default()
    }
}

#[test]
fn test_attempt_budget_cannot_drop_below_attempts_made() {
    let mut now = t0();
    let mut record = running_record(spec(budget(3)), 1, now);
    for _ in 0..2 {
        let request = record.admit(now).remove(0);
        record
            .apply_outcome(&outcome(&request, CallSignal::NoAnswer, 0, now))
            .unwrap();
        now += Duration::minutes(1);
    }
    let id = record.contacts(None)[0].id;
    assert_eq!(record.contact(id).unwrap().attempts, 2);
    assert!(record.contact(id).unwrap().next_attempt_at.is_some());

    record.command(CampaignCommand::Pause, now, RestartPolicy::Rearm).unwrap();
    assert!(matches!(record.reconfigure(spec(budget(1))), Err(Error::Validation(_))));
    assert_eq!(record.campaign().pacing.max_attempts_per_contact, 3);
    assert!(record.contact(id).unwrap().next_attempt_at.is_some());

    // At exactly the new budget the pending retry is dropped.
    record.reconfigure(spec(budget(2))).unwrap();
    let contact = record.contact(id).unwrap();
    assert_eq!(contact.status, ContactStatus::NoAnswer);
    assert_eq!(contact.next_attempt_at, None);
    assert!(!contact.has_remaining_work(2));

    record.command(CampaignCommand::Resume, now, RestartPolicy::Rearm).unwrap();
    assert!(record.admit(now + Duration::hours(1)).is_empty());
    assert!(record.check_completion(now + Duration::hours(1)));
    assert_eq!(record.stats(), record.recompute_stats());
}

#[test]
fn test_skip_and_unskip() {
    let now = t0();
    let mut record = running_record(spec(Pacing::default()), 2, now);
    let id = record.contacts(None)[0].id;

    record.skip_contact(id).unwrap();
    assert_eq!(record.stats().contacts_skipped, 1);
    let admitted = record.admit(now);
    assert_eq!(admitted.len(), 1);
    assert_ne!(admitted[0].contact_id, id);

    record.unskip_contact(id).unwrap();
    assert_eq!(record.contact(id).unwrap().status, ContactStatus::Pending);
    assert!(record.unskip_contact(id).is_err());
    assert_eq!(record.admit(now + Duration::minutes(1))[0].contact_id, id);
}

#[test]
fn test_priority_orders_admission() {
    let now = t0();
    let mut record = running_record(spec(pacing(1, 1)), 5, now);
    let last = record.contacts(None)[4].id;
    record.set_priority(last, 10).unwrap();

    let first = record.admit(now);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].contact_id, last);
}

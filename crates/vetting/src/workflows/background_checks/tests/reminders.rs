use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::common::*;
use crate::workflows::background_checks::clock::{Clock, ManualClock};
use crate::workflows::background_checks::domain::{CheckId, CheckStatus, CheckType, ResultStatus};
use crate::workflows::background_checks::error::WorkflowError;
use crate::workflows::background_checks::reminders::{
    evaluate_referee, ConsentStatus, RefereeState, RefereeStatus, ReminderDecision, ReminderKind,
    ReminderUpdate,
};
use crate::workflows::background_checks::repository::{
    CheckRepository, NotificationCategory, ReminderRepository,
};
use crate::workflows::background_checks::service::BackgroundCheckService;

fn referee(id: &str, check_id: &str, invited: DateTime<Utc>) -> RefereeState {
    RefereeState {
        id: id.to_string(),
        check_id: CheckId::new(check_id),
        candidate_name: "Morgan Ellis".to_string(),
        name: "Casey Holt".to_string(),
        email: format!("{id}@example.com"),
        status: RefereeStatus::Invited,
        invited_date: invited,
        last_reminder_date: None,
        last_reminder_kind: None,
        reminders_sent: 0,
        responded_date: None,
    }
}

#[test]
fn referee_cadence_sends_first_then_second_reminder() {
    let harness = build_service();
    let check = harness.in_progress_check(&[CheckType::Reference]);
    let invited = harness
        .service
        .invite_referee(&check.id, "Casey Holt", "casey@example.com")
        .expect("invite");

    harness.clock.set(at(9, 9));
    let day_four = harness
        .service
        .process_scheduled_reminders()
        .expect("reminder sweep");
    assert_eq!(day_four.referee_reminders, 1);
    let stored = harness
        .store
        .fetch_referee(&invited.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.last_reminder_kind, Some(ReminderKind::First));
    assert_eq!(stored.last_reminder_date, Some(at(9, 9)));

    let rerun = harness
        .service
        .process_scheduled_reminders()
        .expect("reminder sweep");
    assert_eq!(rerun.referee_reminders, 0);
    assert_eq!(rerun.suppressed, 1);

    harness.clock.set(at(13, 9));
    let day_eight = harness
        .service
        .process_scheduled_reminders()
        .expect("reminder sweep");
    assert_eq!(day_eight.referee_reminders, 1);
    let stored = harness
        .store
        .fetch_referee(&invited.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.last_reminder_kind, Some(ReminderKind::Second));
    assert_eq!(stored.reminders_sent, 2);

    let reminders = harness.notifier.of_category(NotificationCategory::ReminderDue);
    assert_eq!(reminders.len(), 2);
    assert!(reminders
        .iter()
        .all(|notification| notification.recipient_id == "casey@example.com"));
    assert!(reminders[0].message.contains("first reminder"));
    assert!(reminders[1].message.contains("second reminder"));
}

#[test]
fn second_reminder_respects_the_gap_after_a_late_first() {
    let mut late = referee("ref-gap", "bc-gap", at(5, 9));
    late.last_reminder_date = Some(at(11, 9));
    late.last_reminder_kind = Some(ReminderKind::First);

    assert_eq!(evaluate_referee(&late, at(13, 9)), ReminderDecision::Suppressed);
    assert_eq!(
        evaluate_referee(&late, at(15, 9)),
        ReminderDecision::Send(ReminderKind::Second)
    );
    assert_eq!(
        evaluate_referee(&referee("ref-early", "bc-gap", at(5, 9)), at(7, 9)),
        ReminderDecision::NotDue
    );
}

#[test]
fn silent_referees_become_overdue_after_two_weeks() {
    let harness = build_service();
    let check = harness.in_progress_check(&[CheckType::Reference]);
    let invited = harness
        .service
        .invite_referee(&check.id, "Casey Holt", "casey@example.com")
        .expect("invite");

    harness.clock.set(at(19, 9));
    let day_fourteen = harness
        .service
        .process_scheduled_reminders()
        .expect("sweep");
    assert_eq!(day_fourteen.referees_overdue, 0);

    harness.clock.set(at(20, 9));
    let report = harness.service.process_scheduled_reminders().expect("sweep");
    assert_eq!(report.referees_overdue, 1);
    assert_eq!(report.referee_reminders, 0);

    let stored = harness
        .store
        .fetch_referee(&invited.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.status, RefereeStatus::Overdue);
}

#[test]
fn responses_stop_reminders() {
    let harness = build_service();
    let check = harness.in_progress_check(&[CheckType::Reference]);
    let invited = harness
        .service
        .invite_referee(&check.id, "Casey Holt", "casey@example.com")
        .expect("invite");

    harness.clock.set(at(7, 12));
    let responded = harness
        .service
        .record_referee_response(&invited.id)
        .expect("response");
    assert_eq!(responded.status, RefereeStatus::Responded);
    assert_eq!(responded.responded_date, Some(at(7, 12)));

    harness.clock.set(at(9, 9));
    let report = harness.service.process_scheduled_reminders().expect("sweep");
    assert_eq!(report.referee_reminders, 0);

    let err = harness
        .service
        .record_referee_response(&invited.id)
        .expect_err("already responded");
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
}

#[test]
fn consent_reminders_follow_three_and_six_days_then_expire() {
    let harness = build_service();
    let check = harness
        .service
        .initiate(request(&[CheckType::Criminal]))
        .expect("initiate");
    let consent = harness
        .service
        .request_consent(&check.id, "recruiter-9", monday() + Duration::days(10))
        .expect("consent request");

    harness.clock.set(at(8, 9));
    let first = harness.service.process_scheduled_reminders().expect("sweep");
    assert_eq!(first.consent_reminders, 1);

    harness.clock.set(at(10, 9));
    let between = harness.service.process_scheduled_reminders().expect("sweep");
    assert_eq!(between.consent_reminders, 0);

    harness.clock.set(at(11, 9));
    let second = harness.service.process_scheduled_reminders().expect("sweep");
    assert_eq!(second.consent_reminders, 1);

    harness.clock.set(at(16, 9));
    let expired = harness.service.process_scheduled_reminders().expect("sweep");
    assert_eq!(expired.consents_expired, 1);
    assert_eq!(expired.consent_reminders, 0);

    let stored = harness
        .store
        .list_consents(Some(&check.id))
        .expect("consents");
    assert_eq!(stored[0].id, consent.id);
    assert_eq!(stored[0].status, ConsentStatus::Expired);
    assert_eq!(stored[0].reminders_sent, 2);

    let reminders = harness.notifier.of_category(NotificationCategory::ReminderDue);
    assert_eq!(reminders.len(), 2);
    assert!(reminders
        .iter()
        .all(|notification| notification.recipient_id == "cand-42"));
}

#[test]
fn one_failing_referee_does_not_abort_the_sweep() {
    let store = Arc::new(FlakyStore::new("bc-broken"));
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(ManualClock::new(at(9, 9)));
    let service = BackgroundCheckService::new(
        Arc::clone(&store),
        Arc::clone(&notifier),
        clock as Arc<dyn Clock>,
    );

    for id in ["bc-broken", "bc-healthy"] {
        store
            .insert_check(stored_check(id, CheckStatus::InProgress, at(5, 9)))
            .expect("insert check");
    }
    store
        .insert_referee(referee("ref-broken", "bc-broken", at(5, 9)))
        .expect("insert");
    store
        .insert_referee(referee("ref-healthy", "bc-healthy", at(5, 9)))
        .expect("insert");

    let report = service.process_scheduled_reminders().expect("sweep");
    assert_eq!(report.failures, 1);
    assert_eq!(report.referee_reminders, 1);
    assert_eq!(notifier.sent().len(), 1);
    assert_eq!(notifier.sent()[0].recipient_id, "ref-healthy@example.com");
}

#[test]
fn cancelling_withdraws_open_requests() {
    let harness = build_service();
    let check = harness
        .service
        .initiate(request(&[CheckType::Criminal, CheckType::Reference]))
        .expect("initiate");
    let consent = harness
        .service
        .request_consent(&check.id, "recruiter-9", monday() + Duration::days(10))
        .expect("consent request");
    let invited = harness
        .service
        .invite_referee(&check.id, "Casey Holt", "casey@example.com")
        .expect("invite");

    harness.clock.set(at(6, 9));
    harness
        .service
        .cancel(&check.id, "recruiter-9", "Candidate withdrew")
        .expect("cancel");

    harness.clock.set(at(9, 9));
    let report = harness.service.process_scheduled_reminders().expect("sweep");
    assert_eq!(report.consent_reminders, 0);
    assert_eq!(report.referee_reminders, 0);

    harness.clock.set(at(21, 9));
    let later = harness.service.process_scheduled_reminders().expect("sweep");
    assert_eq!(later.referees_overdue, 0);
    assert_eq!(later.consents_expired, 0);

    let consents = harness.store.list_consents(Some(&check.id)).expect("consents");
    assert_eq!(consents[0].id, consent.id);
    assert_eq!(consents[0].status, ConsentStatus::Withdrawn);
    let referee = harness
        .store
        .fetch_referee(&invited.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(referee.status, RefereeStatus::Withdrawn);
    assert_eq!(referee.responded_date, Some(at(6, 9)));
    assert!(harness
        .notifier
        .of_category(NotificationCategory::ReminderDue)
        .is_empty());
}

#[test]
fn referees_of_finished_checks_are_left_alone() {
    let harness = build_service();
    let check = harness.in_progress_check(&[CheckType::Criminal]);
    let invited = harness
        .service
        .invite_referee(&check.id, "Casey Holt", "casey@example.com")
        .expect("invite");
    harness
        .service
        .record_result(&check.id, result(CheckType::Criminal, ResultStatus::Clear))
        .expect("record");

    harness.clock.set(at(9, 9));
    let reminders = harness.service.process_scheduled_reminders().expect("sweep");
    assert_eq!(reminders.referee_reminders, 0);

    harness.clock.set(at(21, 9));
    let overdue = harness.service.process_scheduled_reminders().expect("sweep");
    assert_eq!(overdue.referees_overdue, 0);

    let stored = harness
        .store
        .fetch_referee(&invited.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.status, RefereeStatus::Invited);
    assert_eq!(stored.reminders_sent, 0);
}

#[test]
fn sweep_does_not_undo_a_response_recorded_mid_sweep() {
    let store = Arc::new(FlakyStore::new("bc-none"));
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(ManualClock::new(monday()));
    let service = BackgroundCheckService::new(
        Arc::clone(&store),
        Arc::clone(&notifier),
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    store
        .insert_check(stored_check("bc-race", CheckStatus::InProgress, monday()))
        .expect("insert check");
    let invited = service
        .invite_referee(&CheckId::new("bc-race"), "Casey Holt", "casey@example.com")
        .expect("invite");

    clock.set(at(9, 9));
    let referee_id = invited.id.clone();
    store.interleave(move |inner| {
        inner
            .apply_referee_update(&referee_id, ReminderUpdate::Responded { at: at(9, 8) })
            .expect("concurrent response")
            .expect("referee still open");
    });

    let report = service.process_scheduled_reminders().expect("sweep");
    assert_eq!(report.referee_reminders, 0);
    assert_eq!(report.failures, 0);

    let stored = store
        .fetch_referee(&invited.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.status, RefereeStatus::Responded);
    assert_eq!(stored.responded_date, Some(at(9, 8)));
    assert_eq!(stored.reminders_sent, 0);
    assert!(notifier.sent().is_empty());
}

#[test]
fn reminder_updates_only_apply_to_open_requests() {
    let mut open = referee("ref-open", "bc-1", monday());
    assert!(open.apply(ReminderUpdate::Reminded {
        kind: ReminderKind::First,
        at: at(8, 9),
    }));
    assert!(!open.apply(ReminderUpdate::Reminded {
        kind: ReminderKind::First,
        at: at(8, 10),
    }));
    assert_eq!(open.reminders_sent, 1);

    assert!(open.apply(ReminderUpdate::Lapsed));
    assert_eq!(open.status, RefereeStatus::Overdue);
    assert!(open.apply(ReminderUpdate::Responded { at: at(21, 9) }));
    assert!(!open.apply(ReminderUpdate::Withdrawn { at: at(22, 9) }));
    assert_eq!(open.status, RefereeStatus::Responded);
}

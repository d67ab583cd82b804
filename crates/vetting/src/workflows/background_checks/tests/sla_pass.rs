use std::sync::Arc;

use super::common::*;
use crate::workflows::background_checks::clock::{Clock, ManualClock};
use crate::workflows::background_checks::domain::{
    CheckId, CheckStatus, CheckType, OverallStatus, Priority, ResultStatus,
};
use crate::workflows::background_checks::repository::{CheckRepository, NotificationCategory};
use crate::workflows::background_checks::service::BackgroundCheckService;
use crate::workflows::background_checks::sla::SlaClassification;

#[test]
fn sla_status_reflects_business_day_target() {
    let harness = build_service();
    let check = harness.in_progress_check(&[CheckType::Criminal]);

    harness.clock.set(at(12, 9));
    let sla = harness
        .service
        .sla_status(&check.id)
        .expect("sla")
        .expect("in-progress has a target");
    assert_eq!(sla.elapsed_days, 5);
    assert_eq!(sla.target_days, 10);
    assert_eq!(sla.target_date, at(19, 9));
    assert_eq!(sla.classification, SlaClassification::OnTrack);
}

#[test]
fn terminal_checks_have_no_sla() {
    let harness = build_service();
    let check = harness.in_progress_check(&[CheckType::Criminal]);
    harness
        .service
        .record_result(&check.id, result(CheckType::Criminal, ResultStatus::Clear))
        .expect("record");

    assert!(harness.service.sla_status(&check.id).expect("sla").is_none());
}

#[test]
fn each_classification_is_announced_once() {
    let harness = build_service();
    let check = harness.in_progress_check(&[CheckType::Criminal]);

    harness.clock.set(at(15, 9));
    let report = harness
        .service
        .process_sla_notifications()
        .expect("sla pass");
    assert_eq!(report.notified, 1);
    let repeat = harness
        .service
        .process_sla_notifications()
        .expect("sla pass");
    assert_eq!(repeat.evaluated, 1);
    assert_eq!(repeat.notified, 0);

    let warnings = harness.notifier.of_category(NotificationCategory::SlaWarning);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].recipient_id, "recruiter-9");
    assert_eq!(warnings[0].check_id, check.id);

    harness.clock.set(at(16, 9));
    harness
        .service
        .process_sla_notifications()
        .expect("sla pass");
    assert_eq!(
        harness
            .notifier
            .of_category(NotificationCategory::SlaCritical)
            .len(),
        1
    );

    harness.clock.set(at(20, 9));
    harness
        .service
        .process_sla_notifications()
        .expect("sla pass");
    let breaches = harness.notifier.of_category(NotificationCategory::SlaBreached);
    assert_eq!(breaches.len(), 1);
    assert_eq!(breaches[0].priority, Priority::Urgent);

    let stored = harness.service.get(&check.id).expect("check");
    assert_eq!(stored.last_sla_alert, Some(SlaClassification::Breached));
}

#[test]
fn entering_a_new_status_resets_the_alert_marker() {
    let harness = build_service();
    let check = stored_check("bc-sla-reset", CheckStatus::NotStarted, at(5, 9));
    harness.store.insert_check(check.clone()).expect("insert");

    // Not-started targets two calendar days.
    harness.clock.set(at(8, 9));
    harness
        .service
        .process_sla_notifications()
        .expect("sla pass");
    let flagged = harness.service.get(&check.id).expect("check");
    assert_eq!(flagged.last_sla_alert, Some(SlaClassification::Breached));

    let moved = harness
        .service
        .handle_consent_received(&check.id)
        .expect("consent");
    assert_eq!(moved.status, CheckStatus::InProgress);
    assert!(moved.last_sla_alert.is_none());
}

#[test]
fn sla_pass_keeps_a_completion_committed_mid_sweep() {
    let store = Arc::new(FlakyStore::new("bc-none"));
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(ManualClock::new(at(15, 9)));
    let service = BackgroundCheckService::new(
        Arc::clone(&store),
        Arc::clone(&notifier),
        clock as Arc<dyn Clock>,
    );
    service.seed_defaults().expect("seed");
    store
        .insert_check(stored_check("bc-race", CheckStatus::InProgress, monday()))
        .expect("insert");

    store.interleave(|inner| {
        let id = CheckId::new("bc-race");
        let mut check = inner.fetch_check(&id).expect("fetch").expect("present");
        check.upsert_result(result(CheckType::Criminal, ResultStatus::Clear));
        check.transition_to(CheckStatus::Completed, at(15, 8));
        inner.update_check(check).expect("concurrent completion");
    });

    let report = service.process_sla_notifications().expect("sla pass");
    assert_eq!(report.evaluated, 1);
    assert_eq!(report.notified, 0);
    assert_eq!(report.failures, 0);
    assert!(notifier.sent().is_empty());

    let stored = service.get(&CheckId::new("bc-race")).expect("check");
    assert_eq!(stored.status, CheckStatus::Completed);
    assert_eq!(stored.completed_date, Some(at(15, 8)));
    assert_eq!(stored.overall_status, Some(OverallStatus::Clear));
    assert!(stored.last_sla_alert.is_none());
    assert_completion_invariant(&stored);
}

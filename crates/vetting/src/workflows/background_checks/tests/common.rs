use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::background_checks::clock::{Clock, ManualClock};
use crate::workflows::background_checks::domain::{
    BackgroundCheck, CheckId, CheckResult, CheckStatus, CheckType, RequestedCheck, ResultStatus,
};
use crate::workflows::background_checks::escalation::{EscalationEvent, EscalationRule};
use crate::workflows::background_checks::history::{HistoryFilter, StatusChangeRecord};
use crate::workflows::background_checks::memory::InMemoryScreeningStore;
use crate::workflows::background_checks::reminders::{
    ConsentRequest, RefereeState, ReminderUpdate,
};
use crate::workflows::background_checks::repository::{
    CheckFilter, CheckRepository, EscalationEventFilter, EscalationRepository, HistoryRepository,
    Notification, NotificationCategory, Notifier, NotifyError, ReminderRepository,
    RepositoryError, SlaConfigRepository,
};
use crate::workflows::background_checks::service::{BackgroundCheckService, NewBackgroundCheck};
use crate::workflows::background_checks::sla::{SlaClassification, SlaConfiguration};

/// October 2026 calendar: the 5th is a Monday.
pub(super) fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn monday() -> DateTime<Utc> {
    at(5, 9)
}

pub(super) fn result(check_type: CheckType, status: ResultStatus) -> CheckResult {
    CheckResult {
        check_type,
        status,
        completed_date: None,
        details: None,
    }
}

pub(super) fn request(types: &[CheckType]) -> NewBackgroundCheck {
    NewBackgroundCheck {
        candidate_id: "cand-42".to_string(),
        candidate_name: "Morgan Ellis".to_string(),
        requested_checks: types.iter().copied().map(RequestedCheck::required).collect(),
        initiated_by: "recruiter-9".to_string(),
        total_cost_cents: 12_500,
    }
}

/// A stored check sitting in `status` since `since`.
pub(super) fn stored_check(id: &str, status: CheckStatus, since: DateTime<Utc>) -> BackgroundCheck {
    let mut check = BackgroundCheck::new(
        CheckId::new(id),
        format!("cand-{id}"),
        format!("Candidate {id}"),
        vec![RequestedCheck::required(CheckType::Criminal)],
        "recruiter-3",
        since,
    );
    check.transition_to(status, since);
    check
}

pub(super) type TestService = BackgroundCheckService<InMemoryScreeningStore, RecordingNotifier>;

pub(super) struct Harness {
    pub(super) service: TestService,
    pub(super) store: Arc<InMemoryScreeningStore>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) clock: Arc<ManualClock>,
}

pub(super) fn build_service() -> Harness {
    build_service_at(monday())
}

pub(super) fn build_service_at(now: DateTime<Utc>) -> Harness {
    let store = Arc::new(InMemoryScreeningStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(ManualClock::new(now));
    let service = BackgroundCheckService::new(
        Arc::clone(&store),
        Arc::clone(&notifier),
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    service.seed_defaults().expect("seed defaults");
    Harness {
        service,
        store,
        notifier,
        clock,
    }
}

impl Harness {
    /// Initiates a check and moves it to in-progress via consent.
    pub(super) fn in_progress_check(&self, types: &[CheckType]) -> BackgroundCheck {
        let check = self.service.initiate(request(types)).expect("initiate");
        self.service
            .handle_consent_received(&check.id)
            .expect("consent")
    }

    pub(super) fn history(&self, check_id: &CheckId) -> Vec<StatusChangeRecord> {
        self.service
            .history_for_check(check_id)
            .expect("history query")
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn of_category(&self, category: NotificationCategory) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|notification| notification.category == category)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, _notification: Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp relay offline".to_string()))
    }
}

type ConcurrentWrite = Box<dyn FnOnce(&InMemoryScreeningStore) + Send>;

/// Delegates to an in-memory store but fails every operation touching one check.
///
/// A concurrent writer can also be queued; it runs once, right after the first
/// listing that returns any records, imitating a request that commits mid-sweep.
#[derive(Clone)]
pub(super) struct FlakyStore {
    pub(super) inner: InMemoryScreeningStore,
    pub(super) broken: CheckId,
    concurrent_write: Arc<Mutex<Option<ConcurrentWrite>>>,
}

impl FlakyStore {
    pub(super) fn new(broken: &str) -> Self {
        Self {
            inner: InMemoryScreeningStore::default(),
            broken: CheckId::new(broken),
            concurrent_write: Arc::new(Mutex::new(None)),
        }
    }

    pub(super) fn interleave(&self, write: impl FnOnce(&InMemoryScreeningStore) + Send + 'static) {
        *self
            .concurrent_write
            .lock()
            .expect("interleave mutex poisoned") = Some(Box::new(write));
    }

    fn after_listing<T>(&self, listed: Vec<T>) -> Result<Vec<T>, RepositoryError> {
        if !listed.is_empty() {
            let write = self
                .concurrent_write
                .lock()
                .expect("interleave mutex poisoned")
                .take();
            if let Some(write) = write {
                write(&self.inner);
            }
        }
        Ok(listed)
    }

    fn offline() -> RepositoryError {
        RepositoryError::Unavailable("shard offline".to_string())
    }
}

impl CheckRepository for FlakyStore {
    fn insert_check(&self, check: BackgroundCheck) -> Result<BackgroundCheck, RepositoryError> {
        self.inner.insert_check(check)
    }

    fn update_check(&self, check: BackgroundCheck) -> Result<(), RepositoryError> {
        if check.id == self.broken {
            return Err(Self::offline());
        }
        self.inner.update_check(check)
    }

    fn fetch_check(&self, id: &CheckId) -> Result<Option<BackgroundCheck>, RepositoryError> {
        if id == &self.broken {
            return Err(Self::offline());
        }
        self.inner.fetch_check(id)
    }

    fn record_sla_alert(
        &self,
        id: &CheckId,
        status: CheckStatus,
        status_since: DateTime<Utc>,
        classification: SlaClassification,
    ) -> Result<bool, RepositoryError> {
        if id == &self.broken {
            return Err(Self::offline());
        }
        self.inner
            .record_sla_alert(id, status, status_since, classification)
    }

    fn list_checks(&self, filter: &CheckFilter) -> Result<Vec<BackgroundCheck>, RepositoryError> {
        let listed = self.inner.list_checks(filter)?;
        self.after_listing(listed)
    }
}

impl SlaConfigRepository for FlakyStore {
    fn upsert_sla_config(&self, config: SlaConfiguration) -> Result<(), RepositoryError> {
        self.inner.upsert_sla_config(config)
    }

    fn sla_config_for(
        &self,
        status: CheckStatus,
    ) -> Result<Option<SlaConfiguration>, RepositoryError> {
        self.inner.sla_config_for(status)
    }

    fn list_sla_configs(&self) -> Result<Vec<SlaConfiguration>, RepositoryError> {
        self.inner.list_sla_configs()
    }
}

impl EscalationRepository for FlakyStore {
    fn insert_rule(&self, rule: EscalationRule) -> Result<EscalationRule, RepositoryError> {
        self.inner.insert_rule(rule)
    }

    fn update_rule(&self, rule: EscalationRule) -> Result<(), RepositoryError> {
        self.inner.update_rule(rule)
    }

    fn list_rules(&self) -> Result<Vec<EscalationRule>, RepositoryError> {
        self.inner.list_rules()
    }

    fn insert_event(&self, event: EscalationEvent) -> Result<EscalationEvent, RepositoryError> {
        if event.check_id == self.broken {
            return Err(Self::offline());
        }
        self.inner.insert_event(event)
    }

    fn update_event(&self, event: EscalationEvent) -> Result<(), RepositoryError> {
        self.inner.update_event(event)
    }

    fn fetch_event(&self, id: &str) -> Result<Option<EscalationEvent>, RepositoryError> {
        self.inner.fetch_event(id)
    }

    fn list_events(
        &self,
        filter: &EscalationEventFilter,
    ) -> Result<Vec<EscalationEvent>, RepositoryError> {
        self.inner.list_events(filter)
    }
}

impl HistoryRepository for FlakyStore {
    fn append_history(&self, record: StatusChangeRecord) -> Result<(), RepositoryError> {
        self.inner.append_history(record)
    }

    fn list_history(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<StatusChangeRecord>, RepositoryError> {
        self.inner.list_history(filter)
    }
}

impl ReminderRepository for FlakyStore {
    fn insert_referee(&self, referee: RefereeState) -> Result<RefereeState, RepositoryError> {
        self.inner.insert_referee(referee)
    }

    fn apply_referee_update(
        &self,
        id: &str,
        update: ReminderUpdate,
    ) -> Result<Option<RefereeState>, RepositoryError> {
        let broken = self
            .inner
            .fetch_referee(id)?
            .is_some_and(|referee| referee.check_id == self.broken);
        if broken {
            return Err(Self::offline());
        }
        self.inner.apply_referee_update(id, update)
    }

    fn fetch_referee(&self, id: &str) -> Result<Option<RefereeState>, RepositoryError> {
        self.inner.fetch_referee(id)
    }

    fn list_referees(
        &self,
        check_id: Option<&CheckId>,
    ) -> Result<Vec<RefereeState>, RepositoryError> {
        let listed = self.inner.list_referees(check_id)?;
        self.after_listing(listed)
    }

    fn insert_consent(&self, consent: ConsentRequest) -> Result<ConsentRequest, RepositoryError> {
        self.inner.insert_consent(consent)
    }

    fn apply_consent_update(
        &self,
        id: &str,
        update: ReminderUpdate,
    ) -> Result<Option<ConsentRequest>, RepositoryError> {
        let broken = self
            .inner
            .list_consents(Some(&self.broken))?
            .iter()
            .any(|consent| consent.id == id);
        if broken {
            return Err(Self::offline());
        }
        self.inner.apply_consent_update(id, update)
    }

    fn list_consents(
        &self,
        check_id: Option<&CheckId>,
    ) -> Result<Vec<ConsentRequest>, RepositoryError> {
        let listed = self.inner.list_consents(check_id)?;
        self.after_listing(listed)
    }
}

pub(super) fn assert_completion_invariant(check: &BackgroundCheck) {
    assert_eq!(
        check.status.is_terminal(),
        check.completed_date.is_some(),
        "completed_date must track terminal status for {}",
        check.id
    );
    assert_eq!(
        check.completed_date.is_some(),
        check.overall_status.is_some(),
        "overall_status must track completed_date for {}",
        check.id
    );
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) async fn read_text_body(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    String::from_utf8(body.to_vec()).expect("utf-8 body")
}

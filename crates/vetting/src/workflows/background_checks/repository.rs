use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::{BackgroundCheck, CheckId, CheckStatus, Priority};
use super::escalation::{EscalationEvent, EscalationRule, RuleId};
use super::history::{HistoryFilter, StatusChangeRecord};
use super::reminders::{ConsentRequest, RefereeState, ReminderUpdate};
use super::sla::{SlaClassification, SlaConfiguration};

/// Listing criteria for background checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckFilter {
    pub status: Option<CheckStatus>,
    pub candidate_id: Option<String>,
}

impl CheckFilter {
    pub fn with_status(status: CheckStatus) -> Self {
        Self {
            status: Some(status),
            candidate_id: None,
        }
    }

    pub fn matches(&self, check: &BackgroundCheck) -> bool {
        self.status.map_or(true, |status| check.status == status)
            && self
                .candidate_id
                .as_deref()
                .map_or(true, |candidate| check.candidate_id == candidate)
    }
}

/// Listing criteria for escalation events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscalationEventFilter {
    pub rule_id: Option<RuleId>,
    pub check_id: Option<CheckId>,
    pub unresolved_only: bool,
}

impl EscalationEventFilter {
    pub fn for_pair(rule_id: &RuleId, check_id: &CheckId) -> Self {
        Self {
            rule_id: Some(rule_id.clone()),
            check_id: Some(check_id.clone()),
            unresolved_only: false,
        }
    }

    pub fn matches(&self, event: &EscalationEvent) -> bool {
        self.rule_id.as_ref().map_or(true, |id| &event.rule_id == id)
            && self.check_id.as_ref().map_or(true, |id| &event.check_id == id)
            && (!self.unresolved_only || !event.resolved)
    }
}

/// Storage for background check records.
pub trait CheckRepository: Send + Sync {
    fn insert_check(&self, check: BackgroundCheck) -> Result<BackgroundCheck, RepositoryError>;
    fn update_check(&self, check: BackgroundCheck) -> Result<(), RepositoryError>;
    /// Narrow write used by the SLA pass; see [`BackgroundCheck::record_sla_alert`].
    /// `Ok(false)` means the stored check moved on and nothing was written.
    fn record_sla_alert(
        &self,
        id: &CheckId,
        status: CheckStatus,
        status_since: DateTime<Utc>,
        classification: SlaClassification,
    ) -> Result<bool, RepositoryError>;
    fn fetch_check(&self, id: &CheckId) -> Result<Option<BackgroundCheck>, RepositoryError>;
    fn list_checks(&self, filter: &CheckFilter) -> Result<Vec<BackgroundCheck>, RepositoryError>;
}

/// Storage for per-status SLA targets; at most one configuration per status.
pub trait SlaConfigRepository: Send + Sync {
    fn upsert_sla_config(&self, config: SlaConfiguration) -> Result<(), RepositoryError>;
    fn sla_config_for(
        &self,
        status: CheckStatus,
    ) -> Result<Option<SlaConfiguration>, RepositoryError>;
    fn list_sla_configs(&self) -> Result<Vec<SlaConfiguration>, RepositoryError>;
}

/// Storage for escalation rules and the events they produce.
pub trait EscalationRepository: Send + Sync {
    fn insert_rule(&self, rule: EscalationRule) -> Result<EscalationRule, RepositoryError>;
    fn update_rule(&self, rule: EscalationRule) -> Result<(), RepositoryError>;
    fn list_rules(&self) -> Result<Vec<EscalationRule>, RepositoryError>;
    fn insert_event(&self, event: EscalationEvent) -> Result<EscalationEvent, RepositoryError>;
    fn update_event(&self, event: EscalationEvent) -> Result<(), RepositoryError>;
    fn fetch_event(&self, id: &str) -> Result<Option<EscalationEvent>, RepositoryError>;
    /// Events matching `filter`, oldest first.
    fn list_events(
        &self,
        filter: &EscalationEventFilter,
    ) -> Result<Vec<EscalationEvent>, RepositoryError>;
}

/// Append-only storage for status change records.
pub trait HistoryRepository: Send + Sync {
    fn append_history(&self, record: StatusChangeRecord) -> Result<(), RepositoryError>;
    /// Records matching `filter` in insertion order.
    fn list_history(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<StatusChangeRecord>, RepositoryError>;
}

/// Storage for referee invitations and consent requests.
pub trait ReminderRepository: Send + Sync {
    fn insert_referee(&self, referee: RefereeState) -> Result<RefereeState, RepositoryError>;
    /// Applies `update` to the stored referee; `Ok(None)` when it no longer accepts it.
    fn apply_referee_update(
        &self,
        id: &str,
        update: ReminderUpdate,
    ) -> Result<Option<RefereeState>, RepositoryError>;
    fn fetch_referee(&self, id: &str) -> Result<Option<RefereeState>, RepositoryError>;
    fn list_referees(
        &self,
        check_id: Option<&CheckId>,
    ) -> Result<Vec<RefereeState>, RepositoryError>;
    fn insert_consent(&self, consent: ConsentRequest) -> Result<ConsentRequest, RepositoryError>;
    fn apply_consent_update(
        &self,
        id: &str,
        update: ReminderUpdate,
    ) -> Result<Option<ConsentRequest>, RepositoryError>;
    fn list_consents(
        &self,
        check_id: Option<&CheckId>,
    ) -> Result<Vec<ConsentRequest>, RepositoryError>;
}

/// Everything the background check engine persists.
pub trait ScreeningStore:
    CheckRepository + SlaConfigRepository + EscalationRepository + HistoryRepository + ReminderRepository
{
}

impl<T> ScreeningStore for T where
    T: CheckRepository
        + SlaConfigRepository
        + EscalationRepository
        + HistoryRepository
        + ReminderRepository
{
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound delivery hook (e-mail, in-app feed, chat adapters).
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationCategory {
    StatusChanged,
    SlaWarning,
    SlaCritical,
    SlaBreached,
    EscalationTriggered,
    ReminderDue,
}

/// Structured event handed to the notifier; delivery channel is the notifier's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub category: NotificationCategory,
    pub priority: Priority,
    pub recipient_id: String,
    pub title: String,
    pub message: String,
    pub check_id: CheckId,
    pub link: String,
}

impl Notification {
    pub fn for_check(
        check: &BackgroundCheck,
        category: NotificationCategory,
        priority: Priority,
        recipient_id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            priority,
            recipient_id: recipient_id.into(),
            title: title.into(),
            message: message.into(),
            check_id: check.id.clone(),
            link: check.link(),
        }
    }
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Best-effort delivery: failures are logged and never undo the state change.
pub(crate) fn deliver<N: Notifier + ?Sized>(notifier: &N, notification: Notification) -> bool {
    let category = notification.category;
    let recipient = notification.recipient_id.clone();
    let check_id = notification.check_id.clone();
    match notifier.notify(notification) {
        Ok(()) => true,
        Err(err) => {
            warn!(
                error = %err,
                ?category,
                %recipient,
                %check_id,
                "notification delivery failed"
            );
            false
        }
    }
}

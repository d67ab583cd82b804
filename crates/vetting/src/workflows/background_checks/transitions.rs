use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::domain::{
    BackgroundCheck, CheckId, CheckResult, CheckStatus, Priority, ResultStatus,
};
use super::error::WorkflowError;
use super::history::{StatusChange, StatusChangeRecord, StatusHistoryRecorder};
use super::reminders::{ConsentRequest, ConsentStatus, RefereeState, ReminderUpdate};
use super::repository::{deliver, Notification, NotificationCategory, Notifier, ScreeningStore};

/// Status changes the engine may apply without a human in the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomaticTransition {
    ConsentReceived,
    ResultsClear,
    ResultsFlagged,
}

impl AutomaticTransition {
    pub const fn target(self) -> CheckStatus {
        match self {
            Self::ConsentReceived => CheckStatus::InProgress,
            Self::ResultsClear => CheckStatus::Completed,
            Self::ResultsFlagged => CheckStatus::IssuesFound,
        }
    }

    pub const fn reason(self) -> &'static str {
        match self {
            Self::ConsentReceived => "Candidate consent received",
            Self::ResultsClear => "All check results received",
            Self::ResultsFlagged => "Check results include a not-clear finding",
        }
    }
}

/// First automatic transition that applies to the check's persisted state.
///
/// Neither terminal transition fires until every requested type has exactly
/// one final result; a not-clear result alongside pending ones stays in progress.
pub fn next_transition(check: &BackgroundCheck) -> Option<AutomaticTransition> {
    match check.status {
        CheckStatus::PendingConsent if check.consent_given => {
            Some(AutomaticTransition::ConsentReceived)
        }
        CheckStatus::InProgress if check.results_complete() => {
            if check.has_result(ResultStatus::NotClear) {
                Some(AutomaticTransition::ResultsFlagged)
            } else {
                Some(AutomaticTransition::ResultsClear)
            }
        }
        CheckStatus::NotStarted
        | CheckStatus::PendingConsent
        | CheckStatus::InProgress
        | CheckStatus::Completed
        | CheckStatus::IssuesFound
        | CheckStatus::Cancelled => None,
    }
}

/// Applies automatic and explicit status transitions, recording each one.
pub struct TransitionEngine<R, N> {
    repository: Arc<R>,
    notifier: Arc<N>,
    history: StatusHistoryRecorder<R>,
    clock: Arc<dyn Clock>,
}

impl<R, N> TransitionEngine<R, N>
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(repository: Arc<R>, notifier: Arc<N>, clock: Arc<dyn Clock>) -> Self {
        let history = StatusHistoryRecorder::new(Arc::clone(&repository), Arc::clone(&clock));
        Self {
            repository,
            notifier,
            history,
            clock,
        }
    }

    /// Post-mutation hook; unknown ids and non-matching states are no-ops.
    pub fn evaluate_and_apply(
        &self,
        check_id: &CheckId,
    ) -> Result<Option<StatusChangeRecord>, WorkflowError> {
        let Some(mut check) = self.repository.fetch_check(check_id)? else {
            warn!(%check_id, "skipping transition evaluation for unknown check");
            return Ok(None);
        };

        let Some(transition) = next_transition(&check) else {
            debug!(%check_id, status = %check.status, "no automatic transition applies");
            return Ok(None);
        };

        let from = check.status;
        check.transition_to(transition.target(), self.clock.now());
        self.repository.update_check(check.clone())?;

        let record = self.history.record(
            StatusChange::automated(&check, from)
                .reason(transition.reason())
                .meta("trigger", format!("{transition:?}")),
        )?;

        info!(%check_id, %from, to = %check.status, "automatic transition applied");
        self.announce(&check);
        Ok(Some(record))
    }

    /// Consent arriving through a dedicated channel moves the check straight to in-progress.
    pub fn handle_consent_received(
        &self,
        check_id: &CheckId,
    ) -> Result<BackgroundCheck, WorkflowError> {
        let mut check = self.load(check_id)?;
        if check.status.is_terminal() {
            return Err(invalid_check_transition(&check, "record consent for"));
        }

        let now = self.clock.now();
        check.consent_given = true;
        check.consent_date = Some(now);

        let from = check.status;
        let changed = from != CheckStatus::InProgress;
        if changed {
            check.transition_to(CheckStatus::InProgress, now);
        }
        self.repository.update_check(check.clone())?;
        self.close_consent_requests(&check.id, ReminderUpdate::Responded { at: now });

        if changed {
            self.history.record(
                StatusChange::automated(&check, from)
                    .reason(AutomaticTransition::ConsentReceived.reason())
                    .meta("channel", "consent"),
            )?;
            info!(%check_id, %from, "consent received");
            self.announce(&check);
        }

        Ok(check)
    }

    /// Explicit cancellation from any non-terminal status.
    pub fn cancel(
        &self,
        check_id: &CheckId,
        actor: &str,
        reason: &str,
    ) -> Result<BackgroundCheck, WorkflowError> {
        let mut check = self.load(check_id)?;
        if check.status.is_terminal() {
            return Err(invalid_check_transition(&check, "cancel"));
        }

        let from = check.status;
        let now = self.clock.now();
        check.transition_to(CheckStatus::Cancelled, now);
        self.repository.update_check(check.clone())?;
        self.history
            .record(StatusChange::manual(&check, from, actor).reason(reason))?;
        self.close_consent_requests(check_id, ReminderUpdate::Withdrawn { at: now });
        self.withdraw_referees(check_id, now);

        info!(%check_id, %from, %actor, "background check cancelled");
        self.announce(&check);
        Ok(check)
    }

    /// Sends the consent request and moves a fresh check to pending-consent.
    pub fn request_consent(
        &self,
        check_id: &CheckId,
        actor: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<ConsentRequest, WorkflowError> {
        let mut check = self.load(check_id)?;
        if check.status != CheckStatus::NotStarted {
            return Err(invalid_check_transition(&check, "request consent for"));
        }

        let now = self.clock.now();
        let consent = self
            .repository
            .insert_consent(ConsentRequest::new(&check, now, expires_at))?;

        let from = check.status;
        check.transition_to(CheckStatus::PendingConsent, now);
        self.repository.update_check(check.clone())?;
        self.history.record(
            StatusChange::manual(&check, from, actor)
                .reason("Consent request sent")
                .meta("consent_request", consent.id.clone()),
        )?;

        info!(%check_id, consent = %consent.id, "consent requested");
        self.announce(&check);
        Ok(consent)
    }

    /// Stores a vendor result, then runs the automatic transition hook.
    pub fn record_result(
        &self,
        check_id: &CheckId,
        result: CheckResult,
    ) -> Result<Option<StatusChangeRecord>, WorkflowError> {
        let mut check = self.load(check_id)?;
        if check.status.is_terminal() {
            return Err(invalid_check_transition(&check, "record a result for"));
        }
        if !check.is_requested(result.check_type) {
            return Err(WorkflowError::InvalidResult {
                check_id: check.id.clone(),
                check_type: result.check_type,
            });
        }

        let mut result = result;
        if result.status.is_terminal() && result.completed_date.is_none() {
            result.completed_date = Some(self.clock.now());
        }
        debug!(%check_id, check_type = ?result.check_type, status = ?result.status, "result recorded");
        check.upsert_result(result);
        self.repository.update_check(check)?;

        self.evaluate_and_apply(check_id)
    }

    fn load(&self, check_id: &CheckId) -> Result<BackgroundCheck, WorkflowError> {
        self.repository
            .fetch_check(check_id)?
            .ok_or_else(|| WorkflowError::check_not_found(check_id))
    }

    fn close_consent_requests(&self, check_id: &CheckId, update: ReminderUpdate) {
        let consents = match self.repository.list_consents(Some(check_id)) {
            Ok(consents) => consents,
            Err(err) => {
                warn!(%check_id, error = %err, "could not load consent requests");
                return;
            }
        };

        for consent in consents
            .into_iter()
            .filter(|consent| consent.status == ConsentStatus::Pending)
        {
            if let Err(err) = self.repository.apply_consent_update(&consent.id, update) {
                warn!(%check_id, consent = %consent.id, error = %err, "could not close consent request");
            }
        }
    }

    fn withdraw_referees(&self, check_id: &CheckId, now: DateTime<Utc>) {
        let referees = match self.repository.list_referees(Some(check_id)) {
            Ok(referees) => referees,
            Err(err) => {
                warn!(%check_id, error = %err, "could not load referees");
                return;
            }
        };

        for referee in referees.into_iter().filter(RefereeState::is_open) {
            let update = ReminderUpdate::Withdrawn { at: now };
            if let Err(err) = self.repository.apply_referee_update(&referee.id, update) {
                warn!(%check_id, referee = %referee.id, error = %err, "could not withdraw referee");
            }
        }
    }

    fn announce(&self, check: &BackgroundCheck) {
        let priority = match check.status {
            CheckStatus::IssuesFound => Priority::High,
            CheckStatus::Cancelled | CheckStatus::Completed => Priority::Medium,
            CheckStatus::NotStarted | CheckStatus::PendingConsent | CheckStatus::InProgress => {
                Priority::Low
            }
        };

        deliver(
            self.notifier.as_ref(),
            Notification::for_check(
                check,
                NotificationCategory::StatusChanged,
                priority,
                check.initiated_by.clone(),
                "Background check status updated",
                format!(
                    "Background check for {} is now {}",
                    check.candidate_name,
                    check.status.label()
                ),
            ),
        );
    }
}

fn invalid_check_transition(check: &BackgroundCheck, action: &'static str) -> WorkflowError {
    WorkflowError::InvalidTransition {
        entity: "background check",
        id: check.id.to_string(),
        state: check.status.to_string(),
        action,
    }
}

//! Referee and consent reminder cadence.
//!
//! Both tracks keep their own "sent" and "last reminder" timestamps, so the
//! scheduler can run at any interval without double-sending a threshold.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::domain::{check_link, record_id, BackgroundCheck, CheckId, Priority};
use super::error::WorkflowError;
use super::repository::{
    deliver, Notification, NotificationCategory, Notifier, RepositoryError, ScreeningStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReminderKind {
    First,
    Second,
}

impl ReminderKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Second => "second",
        }
    }
}

/// Day thresholds for one reminder track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderCadence {
    pub first_after_days: i64,
    pub second_after_days: i64,
    /// Invitations older than this are overdue and stop receiving reminders.
    pub overdue_after_days: Option<i64>,
}

pub const REFEREE_CADENCE: ReminderCadence = ReminderCadence {
    first_after_days: 3,
    second_after_days: 7,
    overdue_after_days: Some(14),
};

pub const CONSENT_CADENCE: ReminderCadence = ReminderCadence {
    first_after_days: 3,
    second_after_days: 6,
    overdue_after_days: None,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderDecision {
    Send(ReminderKind),
    /// The current threshold was already covered by an earlier reminder.
    Suppressed,
    NotDue,
    Overdue,
    Expired,
    Inactive,
}

/// Partial update applied to a referee invitation or consent request.
///
/// Repositories apply it against the stored record, so a sweep holding an older
/// copy can never roll back a response or withdrawal committed in the meantime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderUpdate {
    Reminded {
        kind: ReminderKind,
        at: DateTime<Utc>,
    },
    /// Referee overdue, consent expired.
    Lapsed,
    Responded {
        at: DateTime<Utc>,
    },
    /// The check was cancelled before the request was answered.
    Withdrawn {
        at: DateTime<Utc>,
    },
}

impl ReminderCadence {
    /// Minimum spacing between the first and second reminder.
    pub const fn gap_days(&self) -> i64 {
        self.second_after_days - self.first_after_days
    }

    pub fn evaluate(
        &self,
        sent_at: DateTime<Utc>,
        last_reminder_at: Option<DateTime<Utc>>,
        last_kind: Option<ReminderKind>,
        now: DateTime<Utc>,
    ) -> ReminderDecision {
        let days_since_sent = (now - sent_at).num_days();

        if let Some(overdue_after) = self.overdue_after_days {
            if days_since_sent > overdue_after {
                return ReminderDecision::Overdue;
            }
        }

        if days_since_sent < self.first_after_days {
            return ReminderDecision::NotDue;
        }

        match last_kind {
            Some(ReminderKind::Second) => ReminderDecision::Suppressed,
            _ if days_since_sent >= self.second_after_days => {
                let since_last = (now - last_reminder_at.unwrap_or(sent_at)).num_days();
                if since_last >= self.gap_days() {
                    ReminderDecision::Send(ReminderKind::Second)
                } else {
                    ReminderDecision::Suppressed
                }
            }
            Some(ReminderKind::First) => ReminderDecision::Suppressed,
            None => ReminderDecision::Send(ReminderKind::First),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefereeStatus {
    Invited,
    Responded,
    Declined,
    Overdue,
    Withdrawn,
}

/// A third party asked to complete a reference questionnaire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefereeState {
    pub id: String,
    pub check_id: CheckId,
    pub candidate_name: String,
    pub name: String,
    pub email: String,
    pub status: RefereeStatus,
    pub invited_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reminder_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reminder_kind: Option<ReminderKind>,
    #[serde(default)]
    pub reminders_sent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_date: Option<DateTime<Utc>>,
}

impl RefereeState {
    /// Applies `update` if the invitation is still in a state that accepts it.
    pub fn apply(&mut self, update: ReminderUpdate) -> bool {
        match update {
            ReminderUpdate::Reminded { kind, at } => {
                if self.status != RefereeStatus::Invited || self.last_reminder_kind == Some(kind) {
                    return false;
                }
                self.last_reminder_date = Some(at);
                self.last_reminder_kind = Some(kind);
                self.reminders_sent = self.reminders_sent.saturating_add(1);
            }
            ReminderUpdate::Lapsed => {
                if self.status != RefereeStatus::Invited {
                    return false;
                }
                self.status = RefereeStatus::Overdue;
            }
            ReminderUpdate::Responded { at } => {
                if !self.is_open() {
                    return false;
                }
                self.status = RefereeStatus::Responded;
                self.responded_date = Some(at);
            }
            ReminderUpdate::Withdrawn { at } => {
                if !self.is_open() {
                    return false;
                }
                self.status = RefereeStatus::Withdrawn;
                self.responded_date = Some(at);
            }
        }
        true
    }

    /// Overdue referees may still answer late.
    pub fn is_open(&self) -> bool {
        matches!(self.status, RefereeStatus::Invited | RefereeStatus::Overdue)
    }
}

pub fn evaluate_referee(referee: &RefereeState, now: DateTime<Utc>) -> ReminderDecision {
    if referee.status != RefereeStatus::Invited {
        return ReminderDecision::Inactive;
    }

    REFEREE_CADENCE.evaluate(
        referee.invited_date,
        referee.last_reminder_date,
        referee.last_reminder_kind,
        now,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsentStatus {
    Pending,
    Given,
    Declined,
    Expired,
    Withdrawn,
}

/// Outstanding request for a candidate's background check consent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRequest {
    pub id: String,
    pub check_id: CheckId,
    pub candidate_id: String,
    pub candidate_name: String,
    pub status: ConsentStatus,
    pub sent_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reminder_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reminder_kind: Option<ReminderKind>,
    #[serde(default)]
    pub reminders_sent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_date: Option<DateTime<Utc>>,
}

impl ConsentRequest {
    pub fn new(check: &BackgroundCheck, sent_date: DateTime<Utc>, expiry_date: DateTime<Utc>) -> Self {
        Self {
            id: record_id("consent"),
            check_id: check.id.clone(),
            candidate_id: check.candidate_id.clone(),
            candidate_name: check.candidate_name.clone(),
            status: ConsentStatus::Pending,
            sent_date,
            expiry_date,
            last_reminder_date: None,
            last_reminder_kind: None,
            reminders_sent: 0,
            responded_date: None,
        }
    }
}

impl ConsentRequest {
    /// Applies `update` while the request is still pending.
    pub fn apply(&mut self, update: ReminderUpdate) -> bool {
        if self.status != ConsentStatus::Pending {
            return false;
        }
        match update {
            ReminderUpdate::Reminded { kind, at } => {
                if self.last_reminder_kind == Some(kind) {
                    return false;
                }
                self.last_reminder_date = Some(at);
                self.last_reminder_kind = Some(kind);
                self.reminders_sent = self.reminders_sent.saturating_add(1);
            }
            ReminderUpdate::Lapsed => self.status = ConsentStatus::Expired,
            ReminderUpdate::Responded { at } => {
                self.status = ConsentStatus::Given;
                self.responded_date = Some(at);
            }
            ReminderUpdate::Withdrawn { at } => {
                self.status = ConsentStatus::Withdrawn;
                self.responded_date = Some(at);
            }
        }
        true
    }
}

pub fn evaluate_consent(consent: &ConsentRequest, now: DateTime<Utc>) -> ReminderDecision {
    if consent.status != ConsentStatus::Pending {
        return ReminderDecision::Inactive;
    }
    if now > consent.expiry_date {
        return ReminderDecision::Expired;
    }

    CONSENT_CADENCE.evaluate(
        consent.sent_date,
        consent.last_reminder_date,
        consent.last_reminder_kind,
        now,
    )
}

/// Per-run tally of the reminder sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReminderSweepReport {
    pub referee_reminders: usize,
    pub consent_reminders: usize,
    pub referees_overdue: usize,
    pub consents_expired: usize,
    pub suppressed: usize,
    pub failures: usize,
}

enum ReminderOutcome {
    Sent,
    Overdue,
    Expired,
    Suppressed,
    Idle,
}

/// Sends due reminders and ages out stale invitations.
pub struct ReminderScheduler<R, N> {
    repository: Arc<R>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
}

impl<R, N> ReminderScheduler<R, N>
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(repository: Arc<R>, notifier: Arc<N>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            notifier,
            clock,
        }
    }

    pub fn invite_referee(
        &self,
        check_id: &CheckId,
        name: &str,
        email: &str,
    ) -> Result<RefereeState, WorkflowError> {
        let check = self
            .repository
            .fetch_check(check_id)?
            .ok_or_else(|| WorkflowError::check_not_found(check_id))?;

        let referee = RefereeState {
            id: record_id("ref"),
            check_id: check.id.clone(),
            candidate_name: check.candidate_name.clone(),
            name: name.to_string(),
            email: email.to_string(),
            status: RefereeStatus::Invited,
            invited_date: self.clock.now(),
            last_reminder_date: None,
            last_reminder_kind: None,
            reminders_sent: 0,
            responded_date: None,
        };
        let referee = self.repository.insert_referee(referee)?;
        info!(referee = %referee.id, check_id = %check.id, "referee invited");
        Ok(referee)
    }

    pub fn record_referee_response(&self, referee_id: &str) -> Result<RefereeState, WorkflowError> {
        let not_found = || WorkflowError::NotFound {
            entity: "referee",
            id: referee_id.to_string(),
        };
        let update = ReminderUpdate::Responded {
            at: self.clock.now(),
        };

        match self.repository.apply_referee_update(referee_id, update) {
            Ok(Some(referee)) => {
                info!(referee = %referee.id, check_id = %referee.check_id, "referee responded");
                Ok(referee)
            }
            Ok(None) => {
                let referee = self.repository.fetch_referee(referee_id)?.ok_or_else(not_found)?;
                Err(WorkflowError::InvalidTransition {
                    entity: "referee",
                    id: referee.id,
                    state: format!("{:?}", referee.status).to_lowercase(),
                    action: "record a response for",
                })
            }
            Err(RepositoryError::NotFound) => Err(not_found()),
            Err(err) => Err(err.into()),
        }
    }

    /// Walks both reminder tracks; a failure on one entry never stops the sweep.
    pub fn process_scheduled_reminders(&self) -> Result<ReminderSweepReport, WorkflowError> {
        let now = self.clock.now();
        let mut report = ReminderSweepReport::default();

        for referee in self.repository.list_referees(None)? {
            match self.process_referee(referee.clone(), now) {
                Ok(ReminderOutcome::Sent) => report.referee_reminders += 1,
                Ok(ReminderOutcome::Overdue) => report.referees_overdue += 1,
                Ok(ReminderOutcome::Suppressed) => report.suppressed += 1,
                Ok(ReminderOutcome::Expired | ReminderOutcome::Idle) => {}
                Err(err) => {
                    warn!(referee = %referee.id, error = %err, "referee reminder failed");
                    report.failures += 1;
                }
            }
        }

        for consent in self.repository.list_consents(None)? {
            match self.process_consent(consent.clone(), now) {
                Ok(ReminderOutcome::Sent) => report.consent_reminders += 1,
                Ok(ReminderOutcome::Expired) => report.consents_expired += 1,
                Ok(ReminderOutcome::Suppressed) => report.suppressed += 1,
                Ok(ReminderOutcome::Overdue | ReminderOutcome::Idle) => {}
                Err(err) => {
                    warn!(consent = %consent.id, error = %err, "consent reminder failed");
                    report.failures += 1;
                }
            }
        }

        info!(
            referee_reminders = report.referee_reminders,
            consent_reminders = report.consent_reminders,
            referees_overdue = report.referees_overdue,
            consents_expired = report.consents_expired,
            failures = report.failures,
            "reminder sweep finished"
        );
        Ok(report)
    }

    /// Open requests whose check has finished, or no longer exists, are left alone.
    fn check_is_active(&self, check_id: &CheckId) -> Result<bool, WorkflowError> {
        let active = self
            .repository
            .fetch_check(check_id)?
            .is_some_and(|check| !check.status.is_terminal());
        if !active {
            debug!(%check_id, "skipping reminders for inactive check");
        }
        Ok(active)
    }

    fn process_referee(
        &self,
        referee: RefereeState,
        now: DateTime<Utc>,
    ) -> Result<ReminderOutcome, WorkflowError> {
        let decision = evaluate_referee(&referee, now);
        if matches!(decision, ReminderDecision::Send(_) | ReminderDecision::Overdue)
            && !self.check_is_active(&referee.check_id)?
        {
            return Ok(ReminderOutcome::Idle);
        }

        match decision {
            ReminderDecision::Send(kind) => {
                let update = ReminderUpdate::Reminded { kind, at: now };
                let Some(referee) = self.repository.apply_referee_update(&referee.id, update)? else {
                    debug!(referee = %referee.id, "referee changed since the sweep listed it");
                    return Ok(ReminderOutcome::Idle);
                };

                info!(referee = %referee.id, kind = kind.label(), "referee reminder sent");
                deliver(
                    self.notifier.as_ref(),
                    Notification {
                        category: NotificationCategory::ReminderDue,
                        priority: Priority::Low,
                        recipient_id: referee.email.clone(),
                        title: format!("Reference request for {}", referee.candidate_name),
                        message: format!(
                            "Hi {}, this is a {} reminder to complete the reference for {}",
                            referee.name,
                            kind.label(),
                            referee.candidate_name
                        ),
                        check_id: referee.check_id.clone(),
                        link: check_link(&referee.check_id),
                    },
                );
                Ok(ReminderOutcome::Sent)
            }
            ReminderDecision::Overdue => {
                if self
                    .repository
                    .apply_referee_update(&referee.id, ReminderUpdate::Lapsed)?
                    .is_none()
                {
                    return Ok(ReminderOutcome::Idle);
                }
                info!(referee = %referee.id, "referee marked overdue");
                Ok(ReminderOutcome::Overdue)
            }
            ReminderDecision::Suppressed => {
                debug!(referee = %referee.id, "referee reminder already sent for threshold");
                Ok(ReminderOutcome::Suppressed)
            }
            ReminderDecision::Expired | ReminderDecision::NotDue | ReminderDecision::Inactive => {
                Ok(ReminderOutcome::Idle)
            }
        }
    }

    fn process_consent(
        &self,
        consent: ConsentRequest,
        now: DateTime<Utc>,
    ) -> Result<ReminderOutcome, WorkflowError> {
        let decision = evaluate_consent(&consent, now);
        if matches!(decision, ReminderDecision::Send(_)) && !self.check_is_active(&consent.check_id)? {
            return Ok(ReminderOutcome::Idle);
        }

        match decision {
            ReminderDecision::Send(kind) => {
                let update = ReminderUpdate::Reminded { kind, at: now };
                let Some(consent) = self.repository.apply_consent_update(&consent.id, update)? else {
                    debug!(consent = %consent.id, "consent request changed since the sweep listed it");
                    return Ok(ReminderOutcome::Idle);
                };

                info!(consent = %consent.id, kind = kind.label(), "consent reminder sent");
                deliver(
                    self.notifier.as_ref(),
                    Notification {
                        category: NotificationCategory::ReminderDue,
                        priority: Priority::Medium,
                        recipient_id: consent.candidate_id.clone(),
                        title: "Background check consent needed".to_string(),
                        message: format!(
                            "Hi {}, your background check cannot start until you give consent. \
                             The request expires on {}.",
                            consent.candidate_name,
                            consent.expiry_date.format("%Y-%m-%d")
                        ),
                        check_id: consent.check_id.clone(),
                        link: check_link(&consent.check_id),
                    },
                );
                Ok(ReminderOutcome::Sent)
            }
            ReminderDecision::Expired => {
                if self
                    .repository
                    .apply_consent_update(&consent.id, ReminderUpdate::Lapsed)?
                    .is_none()
                {
                    return Ok(ReminderOutcome::Idle);
                }
                info!(consent = %consent.id, "consent request expired");
                Ok(ReminderOutcome::Expired)
            }
            ReminderDecision::Suppressed => Ok(ReminderOutcome::Suppressed),
            ReminderDecision::Overdue | ReminderDecision::NotDue | ReminderDecision::Inactive => {
                Ok(ReminderOutcome::Idle)
            }
        }
    }
}

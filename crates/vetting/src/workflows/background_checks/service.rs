use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::domain::{
    record_id, BackgroundCheck, CheckId, CheckResult, CheckStatus, Priority, RequestedCheck,
};
use super::error::WorkflowError;
use super::escalation::{EscalationEngine, EscalationEvent, EscalationSummary, EscalationSweepReport};
use super::history::{
    export_csv, HistoryFilter, HistoryStats, StatusChangeRecord, StatusHistoryRecorder,
};
use super::reminders::{ConsentRequest, RefereeState, ReminderScheduler, ReminderSweepReport};
use super::repository::{
    deliver, CheckFilter, Notification, NotificationCategory, Notifier, ScreeningStore,
};
use super::seed::{seed_defaults, SeedSummary};
use super::sla::{self, SlaClassification, SlaStatus};
use super::transitions::TransitionEngine;

/// Input for opening a new background check.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewBackgroundCheck {
    pub candidate_id: String,
    pub candidate_name: String,
    pub requested_checks: Vec<RequestedCheck>,
    pub initiated_by: String,
    #[serde(default)]
    pub total_cost_cents: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlaSweepReport {
    pub evaluated: usize,
    pub notified: usize,
    pub failures: usize,
}

/// Combined result of one scheduled tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub ran_at: DateTime<Utc>,
    pub escalations: EscalationSweepReport,
    pub sla: SlaSweepReport,
    pub reminders: ReminderSweepReport,
}

/// Entry point composing the transition, SLA, escalation, reminder, and history engines.
pub struct BackgroundCheckService<R, N> {
    repository: Arc<R>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
    transitions: TransitionEngine<R, N>,
    escalations: EscalationEngine<R, N>,
    reminders: ReminderScheduler<R, N>,
    history: StatusHistoryRecorder<R>,
}

impl<R, N> BackgroundCheckService<R, N>
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(repository: Arc<R>, notifier: Arc<N>, clock: Arc<dyn Clock>) -> Self {
        Self {
            transitions: TransitionEngine::new(
                Arc::clone(&repository),
                Arc::clone(&notifier),
                Arc::clone(&clock),
            ),
            escalations: EscalationEngine::new(
                Arc::clone(&repository),
                Arc::clone(&notifier),
                Arc::clone(&clock),
            ),
            reminders: ReminderScheduler::new(
                Arc::clone(&repository),
                Arc::clone(&notifier),
                Arc::clone(&clock),
            ),
            history: StatusHistoryRecorder::new(Arc::clone(&repository), Arc::clone(&clock)),
            repository,
            notifier,
            clock,
        }
    }

    pub fn seed_defaults(&self) -> Result<SeedSummary, WorkflowError> {
        Ok(seed_defaults(self.repository.as_ref())?)
    }

    pub fn initiate(&self, request: NewBackgroundCheck) -> Result<BackgroundCheck, WorkflowError> {
        let mut check = BackgroundCheck::new(
            CheckId(record_id("bc")),
            request.candidate_id,
            request.candidate_name,
            request.requested_checks,
            request.initiated_by,
            self.clock.now(),
        );
        check.total_cost_cents = request.total_cost_cents;
        let check = self.repository.insert_check(check)?;
        info!(check_id = %check.id, candidate = %check.candidate_id, "background check initiated");
        Ok(check)
    }

    pub fn get(&self, check_id: &CheckId) -> Result<BackgroundCheck, WorkflowError> {
        self.repository
            .fetch_check(check_id)?
            .ok_or_else(|| WorkflowError::check_not_found(check_id))
    }

    pub fn list(&self, filter: &CheckFilter) -> Result<Vec<BackgroundCheck>, WorkflowError> {
        Ok(self.repository.list_checks(filter)?)
    }

    pub fn evaluate_and_apply(
        &self,
        check_id: &CheckId,
    ) -> Result<Option<StatusChangeRecord>, WorkflowError> {
        self.transitions.evaluate_and_apply(check_id)
    }

    pub fn handle_consent_received(
        &self,
        check_id: &CheckId,
    ) -> Result<BackgroundCheck, WorkflowError> {
        self.transitions.handle_consent_received(check_id)
    }

    pub fn cancel(
        &self,
        check_id: &CheckId,
        actor: &str,
        reason: &str,
    ) -> Result<BackgroundCheck, WorkflowError> {
        self.transitions.cancel(check_id, actor, reason)
    }

    pub fn request_consent(
        &self,
        check_id: &CheckId,
        actor: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<ConsentRequest, WorkflowError> {
        self.transitions.request_consent(check_id, actor, expires_at)
    }

    pub fn record_result(
        &self,
        check_id: &CheckId,
        result: CheckResult,
    ) -> Result<Option<StatusChangeRecord>, WorkflowError> {
        self.transitions.record_result(check_id, result)
    }

    pub fn invite_referee(
        &self,
        check_id: &CheckId,
        name: &str,
        email: &str,
    ) -> Result<RefereeState, WorkflowError> {
        self.reminders.invite_referee(check_id, name, email)
    }

    pub fn record_referee_response(&self, referee_id: &str) -> Result<RefereeState, WorkflowError> {
        self.reminders.record_referee_response(referee_id)
    }

    /// SLA snapshot for the check's current status, `None` when no enabled target exists.
    pub fn sla_status(&self, check_id: &CheckId) -> Result<Option<SlaStatus>, WorkflowError> {
        let check = self.get(check_id)?;
        let Some(config) = self.repository.sla_config_for(check.status)? else {
            return Ok(None);
        };
        Ok(sla::compute(&check, &config, self.clock.now()))
    }

    pub fn acknowledge_escalation(
        &self,
        event_id: &str,
        actor: &str,
    ) -> Result<EscalationEvent, WorkflowError> {
        self.escalations.acknowledge(event_id, actor)
    }

    pub fn resolve_escalation(
        &self,
        event_id: &str,
        actor: &str,
        notes: Option<String>,
    ) -> Result<EscalationEvent, WorkflowError> {
        self.escalations.resolve(event_id, actor, notes)
    }

    pub fn unresolved_escalations(&self) -> Result<Vec<EscalationEvent>, WorkflowError> {
        self.escalations.unresolved()
    }

    pub fn escalations_for_check(
        &self,
        check_id: &CheckId,
    ) -> Result<Vec<EscalationEvent>, WorkflowError> {
        self.escalations.events_for_check(check_id)
    }

    pub fn escalation_summary(&self) -> Result<EscalationSummary, WorkflowError> {
        self.escalations.summary()
    }

    pub fn history(&self, filter: &HistoryFilter) -> Result<Vec<StatusChangeRecord>, WorkflowError> {
        Ok(self.history.query(filter)?)
    }

    pub fn history_for_check(
        &self,
        check_id: &CheckId,
    ) -> Result<Vec<StatusChangeRecord>, WorkflowError> {
        Ok(self.history.for_check(check_id)?)
    }

    pub fn history_for_candidate(
        &self,
        candidate_id: &str,
    ) -> Result<Vec<StatusChangeRecord>, WorkflowError> {
        Ok(self.history.for_candidate(candidate_id)?)
    }

    pub fn history_stats(&self, filter: &HistoryFilter) -> Result<HistoryStats, WorkflowError> {
        Ok(self.history.stats(filter)?)
    }

    pub fn export_history(&self, filter: &HistoryFilter) -> Result<String, WorkflowError> {
        let records = self.history.query(filter)?;
        Ok(export_csv(&records)?)
    }

    pub fn process_escalations(&self) -> Result<EscalationSweepReport, WorkflowError> {
        self.escalations.process_escalations()
    }

    pub fn process_scheduled_reminders(&self) -> Result<ReminderSweepReport, WorkflowError> {
        self.reminders.process_scheduled_reminders()
    }

    /// Announces each SLA classification at most once per status stint.
    pub fn process_sla_notifications(&self) -> Result<SlaSweepReport, WorkflowError> {
        let now = self.clock.now();
        let mut report = SlaSweepReport::default();

        for config in self.repository.list_sla_configs()? {
            if !config.enabled {
                continue;
            }
            let checks = match self
                .repository
                .list_checks(&CheckFilter::with_status(config.status))
            {
                Ok(checks) => checks,
                Err(err) => {
                    warn!(status = %config.status, error = %err, "failed to list checks for SLA pass");
                    report.failures += 1;
                    continue;
                }
            };

            for check in checks {
                let Some(status) = sla::compute(&check, &config, now) else {
                    continue;
                };
                report.evaluated += 1;

                let classification = status.classification;
                let already_sent = check
                    .last_sla_alert
                    .is_some_and(|sent| sent >= classification);
                if !config.notifies_on(classification) || already_sent {
                    continue;
                }

                match self.repository.record_sla_alert(
                    &check.id,
                    check.status,
                    check.status_since,
                    classification,
                ) {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(check_id = %check.id, "check changed since the SLA pass listed it");
                        continue;
                    }
                    Err(err) => {
                        warn!(check_id = %check.id, error = %err, "failed to record SLA alert");
                        report.failures += 1;
                        continue;
                    }
                }

                deliver(self.notifier.as_ref(), sla_notification(&check, &status));
                report.notified += 1;
            }
        }

        info!(
            evaluated = report.evaluated,
            notified = report.notified,
            failures = report.failures,
            "SLA notification pass finished"
        );
        Ok(report)
    }

    /// Runs every periodic sweep; a failing sweep is logged and the others still run.
    pub fn process_tick(&self) -> TickReport {
        let ran_at = self.clock.now();

        let escalations = self.process_escalations().unwrap_or_else(|err| {
            warn!(error = %err, "escalation sweep aborted");
            EscalationSweepReport {
                failures: 1,
                ..EscalationSweepReport::default()
            }
        });
        let sla = self.process_sla_notifications().unwrap_or_else(|err| {
            warn!(error = %err, "SLA notification pass aborted");
            SlaSweepReport {
                failures: 1,
                ..SlaSweepReport::default()
            }
        });
        let reminders = self.process_scheduled_reminders().unwrap_or_else(|err| {
            warn!(error = %err, "reminder sweep aborted");
            ReminderSweepReport {
                failures: 1,
                ..ReminderSweepReport::default()
            }
        });

        TickReport {
            ran_at,
            escalations,
            sla,
            reminders,
        }
    }
}

fn sla_notification(check: &BackgroundCheck, status: &SlaStatus) -> Notification {
    let (category, priority, title) = match status.classification {
        SlaClassification::Breached => (
            NotificationCategory::SlaBreached,
            Priority::Urgent,
            "SLA breached",
        ),
        SlaClassification::Critical => (
            NotificationCategory::SlaCritical,
            Priority::High,
            "SLA critical",
        ),
        SlaClassification::Warning | SlaClassification::OnTrack => (
            NotificationCategory::SlaWarning,
            Priority::Medium,
            "SLA warning",
        ),
    };

    let message = if status.classification == SlaClassification::Breached {
        format!(
            "Background check for {} exceeded its {}-day {} target on {}",
            check.candidate_name,
            status.target_days,
            status_phrase(check.status),
            status.target_date.format("%Y-%m-%d")
        )
    } else {
        format!(
            "Background check for {} is {:.0}% through its {}-day {} target ({} days remaining)",
            check.candidate_name,
            status.percent_complete,
            status.target_days,
            status_phrase(check.status),
            status.remaining_days
        )
    };

    Notification::for_check(
        check,
        category,
        priority,
        check.initiated_by.clone(),
        title,
        message,
    )
}

fn status_phrase(status: CheckStatus) -> String {
    status.label().to_lowercase()
}

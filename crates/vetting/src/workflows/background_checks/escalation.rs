use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::domain::{record_id, BackgroundCheck, CheckId, CheckStatus, Priority};
use super::error::WorkflowError;
use super::repository::{
    deliver, CheckFilter, EscalationEventFilter, Notification, NotificationCategory, Notifier,
    ScreeningStore,
};

/// Minimum spacing between two firings of one rule against one check.
pub const ESCALATION_COOLDOWN_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Policy notifying extra parties when a check lingers in one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRule {
    pub id: RuleId,
    pub name: String,
    pub status: CheckStatus,
    pub days_threshold: u32,
    pub escalate_to: Vec<String>,
    pub notify_original_initiator: bool,
    pub priority: Priority,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EscalationState {
    Unacknowledged,
    Acknowledged,
    Resolved,
}

/// Record of one rule firing against one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub id: String,
    pub rule_id: RuleId,
    pub rule_name: String,
    pub check_id: CheckId,
    pub candidate_name: String,
    pub days_pending: i64,
    pub escalated_to: Vec<String>,
    pub triggered_at: DateTime<Utc>,
    pub acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
}

impl EscalationEvent {
    pub fn state(&self) -> EscalationState {
        if self.resolved {
            EscalationState::Resolved
        } else if self.acknowledged {
            EscalationState::Acknowledged
        } else {
            EscalationState::Unacknowledged
        }
    }
}

/// Outcome of matching a rule against a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationDecision {
    Fire { days_pending: i64 },
    /// Eligible, but the same rule fired for this check inside the cooldown.
    Suppressed { last_fired: DateTime<Utc> },
    Ineligible,
}

/// Pure rule evaluation; `prior` holds earlier events for the same rule and check.
pub fn evaluate_rule(
    rule: &EscalationRule,
    check: &BackgroundCheck,
    prior: &[EscalationEvent],
    now: DateTime<Utc>,
) -> EscalationDecision {
    if !rule.enabled || check.status != rule.status {
        return EscalationDecision::Ineligible;
    }

    let days_pending = check.days_in_status(now);
    if days_pending < i64::from(rule.days_threshold) {
        return EscalationDecision::Ineligible;
    }

    let cooldown = Duration::hours(ESCALATION_COOLDOWN_HOURS);
    let last_fired = prior
        .iter()
        .filter(|event| event.rule_id == rule.id && event.check_id == check.id)
        .map(|event| event.triggered_at)
        .max();

    match last_fired {
        Some(last_fired) if now - last_fired < cooldown => {
            EscalationDecision::Suppressed { last_fired }
        }
        _ => EscalationDecision::Fire { days_pending },
    }
}

/// Per-run tally of the escalation sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EscalationSweepReport {
    pub rules_evaluated: usize,
    pub fired: Vec<EscalationEvent>,
    pub suppressed: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EscalationSummary {
    pub total: usize,
    pub unacknowledged: usize,
    pub acknowledged: usize,
    pub resolved: usize,
}

/// Matches enabled rules against lingering checks and manages event acknowledgement.
pub struct EscalationEngine<R, N> {
    repository: Arc<R>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
}

impl<R, N> EscalationEngine<R, N>
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

    /// Runs every enabled rule; per-check failures are logged and skipped.
    pub fn process_escalations(&self) -> Result<EscalationSweepReport, WorkflowError> {
        let now = self.clock.now();
        let rules = self.repository.list_rules()?;
        let mut report = EscalationSweepReport::default();

        for rule in rules.iter().filter(|rule| rule.enabled) {
            report.rules_evaluated += 1;
            let checks = match self
                .repository
                .list_checks(&CheckFilter::with_status(rule.status))
            {
                Ok(checks) => checks,
                Err(err) => {
                    warn!(rule = %rule.id, error = %err, "failed to list checks for escalation rule");
                    report.failures += 1;
                    continue;
                }
            };

            for check in &checks {
                match self.escalate_check(rule, check, now) {
                    Ok(CheckEscalation::Fired(event)) => report.fired.push(event),
                    Ok(CheckEscalation::Suppressed) => report.suppressed += 1,
                    Ok(CheckEscalation::Skipped) => {}
                    Err(err) => {
                        warn!(
                            rule = %rule.id,
                            check_id = %check.id,
                            error = %err,
                            "escalation failed for check"
                        );
                        report.failures += 1;
                    }
                }
            }
        }

        info!(
            rules = report.rules_evaluated,
            fired = report.fired.len(),
            suppressed = report.suppressed,
            failures = report.failures,
            "escalation sweep finished"
        );
        Ok(report)
    }

    fn escalate_check(
        &self,
        rule: &EscalationRule,
        check: &BackgroundCheck,
        now: DateTime<Utc>,
    ) -> Result<CheckEscalation, WorkflowError> {
        let prior = self
            .repository
            .list_events(&EscalationEventFilter::for_pair(&rule.id, &check.id))?;

        let days_pending = match evaluate_rule(rule, check, &prior, now) {
            EscalationDecision::Fire { days_pending } => days_pending,
            EscalationDecision::Suppressed { last_fired } => {
                debug!(rule = %rule.id, check_id = %check.id, %last_fired, "escalation within cooldown");
                return Ok(CheckEscalation::Suppressed);
            }
            EscalationDecision::Ineligible => return Ok(CheckEscalation::Skipped),
        };

        let event = EscalationEvent {
            id: record_id("esc"),
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            check_id: check.id.clone(),
            candidate_name: check.candidate_name.clone(),
            days_pending,
            escalated_to: rule.escalate_to.clone(),
            triggered_at: now,
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved: false,
            resolved_by: None,
            resolved_at: None,
            resolution_notes: None,
        };
        let event = self.repository.insert_event(event)?;

        info!(
            event = %event.id,
            rule = %rule.id,
            check_id = %check.id,
            days_pending,
            "escalation triggered"
        );

        for recipient in escalation_recipients(rule, check) {
            deliver(
                self.notifier.as_ref(),
                Notification::for_check(
                    check,
                    NotificationCategory::EscalationTriggered,
                    rule.priority,
                    recipient,
                    format!("Escalation: {}", rule.name),
                    format!(
                        "Background check for {} has been {} for {} days",
                        check.candidate_name,
                        check.status.label().to_lowercase(),
                        days_pending
                    ),
                ),
            );
        }

        Ok(CheckEscalation::Fired(event))
    }

    pub fn acknowledge(&self, event_id: &str, actor: &str) -> Result<EscalationEvent, WorkflowError> {
        let mut event = self.fetch_event(event_id)?;
        if event.state() != EscalationState::Unacknowledged {
            return Err(invalid_event_transition(&event, "acknowledge"));
        }

        event.acknowledged = true;
        event.acknowledged_by = Some(actor.to_string());
        event.acknowledged_at = Some(self.clock.now());
        self.repository.update_event(event.clone())?;
        info!(event = %event.id, %actor, "escalation acknowledged");
        Ok(event)
    }

    /// Resolves an event; acknowledging first is not required.
    pub fn resolve(
        &self,
        event_id: &str,
        actor: &str,
        notes: Option<String>,
    ) -> Result<EscalationEvent, WorkflowError> {
        let mut event = self.fetch_event(event_id)?;
        if event.resolved {
            return Err(invalid_event_transition(&event, "resolve"));
        }

        event.resolved = true;
        event.resolved_by = Some(actor.to_string());
        event.resolved_at = Some(self.clock.now());
        event.resolution_notes = notes;
        self.repository.update_event(event.clone())?;
        info!(event = %event.id, %actor, "escalation resolved");
        Ok(event)
    }

    pub fn unresolved(&self) -> Result<Vec<EscalationEvent>, WorkflowError> {
        let filter = EscalationEventFilter {
            unresolved_only: true,
            ..EscalationEventFilter::default()
        };
        Ok(self.repository.list_events(&filter)?)
    }

    pub fn events_for_check(&self, check_id: &CheckId) -> Result<Vec<EscalationEvent>, WorkflowError> {
        let filter = EscalationEventFilter {
            check_id: Some(check_id.clone()),
            ..EscalationEventFilter::default()
        };
        Ok(self.repository.list_events(&filter)?)
    }

    pub fn summary(&self) -> Result<EscalationSummary, WorkflowError> {
        let events = self
            .repository
            .list_events(&EscalationEventFilter::default())?;
        let mut summary = EscalationSummary {
            total: events.len(),
            ..EscalationSummary::default()
        };
        for event in &events {
            match event.state() {
                EscalationState::Unacknowledged => summary.unacknowledged += 1,
                EscalationState::Acknowledged => summary.acknowledged += 1,
                EscalationState::Resolved => summary.resolved += 1,
            }
        }
        Ok(summary)
    }

    fn fetch_event(&self, event_id: &str) -> Result<EscalationEvent, WorkflowError> {
        self.repository
            .fetch_event(event_id)?
            .ok_or_else(|| WorkflowError::NotFound {
                entity: "escalation event",
                id: event_id.to_string(),
            })
    }
}

enum CheckEscalation {
    Fired(EscalationEvent),
    Suppressed,
    Skipped,
}

fn escalation_recipients(rule: &EscalationRule, check: &BackgroundCheck) -> Vec<String> {
    let mut recipients = rule.escalate_to.clone();
    if rule.notify_original_initiator {
        recipients.push(check.initiated_by.clone());
    }
    recipients
}

fn invalid_event_transition(event: &EscalationEvent, action: &'static str) -> WorkflowError {
    let state = match event.state() {
        EscalationState::Unacknowledged => "unacknowledged",
        EscalationState::Acknowledged => "acknowledged",
        EscalationState::Resolved => "resolved",
    };
    WorkflowError::InvalidTransition {
        entity: "escalation event",
        id: event.id.clone(),
        state: state.to_string(),
        action,
    }
}

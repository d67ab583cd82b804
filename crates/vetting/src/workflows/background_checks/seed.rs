use serde::Serialize;
use tracing::info;

use super::domain::{CheckStatus, Priority};
use super::escalation::{EscalationRule, RuleId};
use super::repository::{EscalationRepository, RepositoryError, SlaConfigRepository};
use super::sla::SlaConfiguration;

fn sla(status: CheckStatus, target_days: u32, business_days_only: bool) -> SlaConfiguration {
    SlaConfiguration {
        status,
        target_days,
        business_days_only,
        warning_threshold: 75.0,
        critical_threshold: 90.0,
        notify_on_warning: true,
        notify_on_critical: true,
        notify_on_breach: true,
        enabled: true,
    }
}

pub fn default_sla_configurations() -> Vec<SlaConfiguration> {
    vec![
        sla(CheckStatus::NotStarted, 2, false),
        sla(CheckStatus::PendingConsent, 5, true),
        sla(CheckStatus::InProgress, 10, true),
        sla(CheckStatus::IssuesFound, 3, true),
    ]
}

pub fn default_escalation_rules() -> Vec<EscalationRule> {
    vec![
        EscalationRule {
            id: RuleId("rule-consent-pending".to_string()),
            name: "Consent pending for 5 days".to_string(),
            status: CheckStatus::PendingConsent,
            days_threshold: 5,
            escalate_to: vec!["hr-manager".to_string()],
            notify_original_initiator: true,
            priority: Priority::Medium,
            enabled: true,
        },
        EscalationRule {
            id: RuleId("rule-in-progress-stalled".to_string()),
            name: "Check in progress for 14 days".to_string(),
            status: CheckStatus::InProgress,
            days_threshold: 14,
            escalate_to: vec!["hr-manager".to_string(), "compliance-officer".to_string()],
            notify_original_initiator: true,
            priority: Priority::High,
            enabled: true,
        },
        EscalationRule {
            id: RuleId("rule-issues-unreviewed".to_string()),
            name: "Issues found and unreviewed for 3 days".to_string(),
            status: CheckStatus::IssuesFound,
            days_threshold: 3,
            escalate_to: vec!["hiring-manager".to_string(), "hr-director".to_string()],
            notify_original_initiator: false,
            priority: Priority::Urgent,
            enabled: true,
        },
    ]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub sla_configurations: usize,
    pub escalation_rules: usize,
}

/// First-run seeding; each table is only filled when it is empty.
pub fn seed_defaults<R>(repository: &R) -> Result<SeedSummary, RepositoryError>
where
    R: SlaConfigRepository + EscalationRepository + ?Sized,
{
    let mut summary = SeedSummary::default();

    if repository.list_sla_configs()?.is_empty() {
        for config in default_sla_configurations() {
            repository.upsert_sla_config(config)?;
            summary.sla_configurations += 1;
        }
    }

    if repository.list_rules()?.is_empty() {
        for rule in default_escalation_rules() {
            repository.insert_rule(rule)?;
            summary.escalation_rules += 1;
        }
    }

    info!(
        sla_configurations = summary.sla_configurations,
        escalation_rules = summary.escalation_rules,
        "default SLA and escalation configuration seeded"
    );
    Ok(summary)
}
